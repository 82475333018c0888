mod inspect;

use std::fs;
use std::io::{self, IsTerminal, Read, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use colored::Colorize;
use llsd_core::{Format, Value};
use tracing_subscriber::{filter::LevelFilter, EnvFilter};

const LONG_ABOUT: &str = r#"
Convert LLSD documents between their three wire forms.

The input form is detected automatically (binary header, <?xml prolog, or
notation sigils). Pick the output form with --to; XML output can be
indented with --pretty.

EXAMPLES:
  llsd '[i1,i2,i3]'                Notation literal to XML (the default)
  llsd -t notation @doc.xml        Convert a file to notation
  llsd -t binary @doc.xml -o doc.bin
  cat doc.bin | llsd -t xml -p     Convert binary stdin to indented XML
  llsd -i @doc.xml                 Show a colored summary tree
  llsd -j @doc.xml                 Show the tree as JSON

Verbose logging goes to stderr: -v for debug, -vv for trace."#;

#[derive(Parser)]
#[command(name = "llsd")]
#[command(version)]
#[command(about = "Convert LLSD documents between binary, XML and notation")]
#[command(long_about = LONG_ABOUT)]
struct Cli {
    /// The document to convert
    ///
    /// Use @path to read a file, @- (or no argument) to read stdin;
    /// anything else is taken as a literal document.
    #[arg(value_name = "INPUT")]
    input: Option<String>,

    /// Output wire form
    #[arg(long, short = 't', value_enum, default_value_t = Target::Xml)]
    to: Target,

    /// Indent XML output
    #[arg(long, short = 'p')]
    pretty: bool,

    /// Write the converted document to a file instead of stdout
    #[arg(long, short = 'o', value_name = "FILE")]
    output: Option<PathBuf>,

    /// Print a colored summary tree instead of converting
    #[arg(long, short = 'i')]
    inspect: bool,

    /// Print the parsed value as JSON (for scripting/piping)
    #[arg(long, short = 'j')]
    json: bool,

    /// Disable colored output
    #[arg(long, short = 'C')]
    no_color: bool,

    /// Enable verbose logging (use multiple times for more detail)
    #[arg(long, short = 'v', action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Target {
    Xml,
    Binary,
    Notation,
}

impl Target {
    fn format(self) -> Format {
        match self {
            Target::Xml => Format::Xml,
            Target::Binary => Format::Binary,
            Target::Notation => Format::Notation,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.no_color || !io::stdout().is_terminal() {
        colored::control::set_override(false);
    }

    let level = match cli.verbose {
        0 => LevelFilter::OFF,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };
    if level != LevelFilter::OFF {
        let filter = EnvFilter::builder()
            .with_default_directive(level.into())
            .from_env_lossy();
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(io::stderr)
            .init();
    }

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("{}: {}", "error".red().bold(), message);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<(), String> {
    let bytes = read_input(cli.input.as_deref())?;
    let value = llsd_core::parse(&bytes).map_err(|e| e.to_string())?;
    tracing::debug!(kind = value.kind_name(), "parsed document");

    if cli.json {
        let json = serde_json::to_string_pretty(&value).map_err(|e| e.to_string())?;
        println!("{json}");
        return Ok(());
    }
    if cli.inspect {
        print!("{}", inspect::render(&value));
        return Ok(());
    }

    let out = convert(&value, cli.to, cli.pretty)?;
    match &cli.output {
        Some(path) => fs::write(path, out)
            .map_err(|e| format!("cannot write {}: {e}", path.display()))?,
        None => {
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            handle.write_all(&out).map_err(|e| e.to_string())?;
            // keep the shell prompt off the document's last line
            if !matches!(cli.to, Target::Binary) && !out.ends_with(b"\n") {
                handle.write_all(b"\n").map_err(|e| e.to_string())?;
            }
        }
    }
    Ok(())
}

fn convert(value: &Value, target: Target, pretty: bool) -> Result<Vec<u8>, String> {
    let result = match target {
        Target::Xml => llsd_core::format_xml(value, pretty),
        _ => llsd_core::format(value, target.format()),
    };
    result.map_err(|e| e.to_string())
}

fn read_input(input: Option<&str>) -> Result<Vec<u8>, String> {
    match input {
        None | Some("-") | Some("@-") => {
            let mut buffer = Vec::new();
            io::stdin()
                .read_to_end(&mut buffer)
                .map_err(|e| format!("cannot read stdin: {e}"))?;
            Ok(buffer)
        }
        Some(arg) if arg.starts_with('@') => {
            let path = &arg[1..];
            fs::read(path).map_err(|e| format!("cannot read {path}: {e}"))
        }
        Some(literal) => Ok(literal.as_bytes().to_vec()),
    }
}
