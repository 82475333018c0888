//! Colored summary tree for `--inspect`.

use colored::Colorize;
use llsd_core::Value;

/// Render the value as an indented tree, one node per line.
pub fn render(value: &Value) -> String {
    let mut out = String::new();
    node(&mut out, None, value, 0);
    out
}

fn node(out: &mut String, label: Option<&str>, value: &Value, depth: usize) {
    for _ in 0..depth {
        out.push_str("  ");
    }
    if let Some(label) = label {
        out.push_str(&format!("{}: ", label.cyan()));
    }
    match value {
        Value::Array(items) => {
            out.push_str(&format!(
                "{} {}\n",
                "array".yellow(),
                format!("({} items)", items.len()).dimmed()
            ));
            for item in items {
                node(out, None, item, depth + 1);
            }
        }
        Value::Map(map) => {
            out.push_str(&format!(
                "{} {}\n",
                "map".yellow(),
                format!("({} entries)", map.len()).dimmed()
            ));
            for (key, entry) in map {
                node(out, Some(key), entry, depth + 1);
            }
        }
        scalar => {
            out.push_str(&format!(
                "{} {}\n",
                scalar.kind_name().yellow(),
                scalar_text(scalar).green()
            ));
        }
    }
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::Undef => "~".to_string(),
        Value::Boolean(b) => b.to_string(),
        Value::String(s) => format!("{s:?}"),
        Value::Uri(u) => format!("{u:?}"),
        Value::Binary(b) => format!("{} bytes", b.len()),
        other => other.to_string(),
    }
}
