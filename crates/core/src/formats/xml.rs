//! The XML wire form.
//!
//! Decoding is event-driven over a `quick-xml` tokenizer with an explicit
//! container stack, so document depth costs heap, not native stack.
//! DOCTYPE declarations, processing instructions and unresolvable entity
//! references are refused outright; this parser routinely sees untrusted
//! service traffic.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::{Error, ErrorKind, Result};
use crate::scalar;
use crate::value::{Map, Value};
use crate::ParseOptions;

pub(crate) fn parse(bytes: &[u8], options: &ParseOptions) -> Result<Value> {
    options.check_input(bytes.len())?;
    let mut reader = Reader::from_reader(bytes);
    reader.expand_empty_elements(true);

    let mut parser = XmlParser {
        options,
        stack: Vec::new(),
        names: Vec::new(),
        pending: None,
        root: None,
        saw_llsd: false,
    };

    loop {
        let at = reader.buffer_position() as usize;
        let event = match reader.read_event() {
            Ok(event) => event,
            Err(_) => {
                let byte = bytes.get(at).copied().unwrap_or(0);
                return Err(parser.err(ErrorKind::UnexpectedByte(byte), at));
            }
        };
        match event {
            Event::Decl(_) | Event::Comment(_) => {}
            Event::PI(_) => {
                return Err(parser.err(ErrorKind::ForbiddenConstruct("processing instruction"), at))
            }
            Event::DocType(_) => {
                return Err(parser.err(ErrorKind::ForbiddenConstruct("DOCTYPE declaration"), at))
            }
            Event::Start(e) => parser.start(&e, at)?,
            Event::Empty(e) => {
                parser.start(&e, at)?;
                if let Some(root) = parser.end(e.name().as_ref(), at)? {
                    return Ok(root);
                }
            }
            Event::End(e) => {
                if let Some(root) = parser.end(e.name().as_ref(), at)? {
                    return Ok(root);
                }
            }
            Event::Text(t) => {
                let raw: &[u8] = &t;
                if parser.pending.is_some() {
                    std::str::from_utf8(raw)
                        .map_err(|_| parser.err(ErrorKind::InvalidUtf8, at))?;
                    let unescaped = t.unescape().map_err(|_| {
                        parser.err(ErrorKind::ForbiddenConstruct("entity reference"), at)
                    })?;
                    parser.append_text(&unescaped);
                } else if !raw.iter().all(u8::is_ascii_whitespace) {
                    return Err(parser.err(ErrorKind::UnexpectedElement("#text".into()), at));
                }
            }
            Event::CData(c) => {
                if parser.pending.is_some() {
                    let text = std::str::from_utf8(&c)
                        .map_err(|_| parser.err(ErrorKind::InvalidUtf8, at))?
                        .to_string();
                    parser.append_text(&text);
                } else {
                    return Err(parser.err(ErrorKind::UnexpectedElement("#cdata".into()), at));
                }
            }
            Event::Eof => return Err(parser.err(ErrorKind::Truncated, at)),
        }
    }
}

#[derive(Clone, Copy, PartialEq)]
enum ScalarKind {
    Undef,
    Boolean,
    Integer,
    Real,
    Uuid,
    String,
    Uri,
    Date,
    Binary,
}

enum Pending {
    Key { text: String },
    Scalar { kind: ScalarKind, text: String, at: usize },
}

enum Frame {
    Array(Vec<Value>),
    Map { map: Map, key: Option<String> },
}

struct XmlParser<'a> {
    options: &'a ParseOptions,
    stack: Vec<Frame>,
    names: Vec<String>,
    pending: Option<Pending>,
    root: Option<Value>,
    saw_llsd: bool,
}

impl XmlParser<'_> {
    fn err(&self, kind: ErrorKind, at: usize) -> Error {
        let error = Error::new(kind, at);
        if self.names.is_empty() {
            error
        } else {
            error.with_path(self.names.join("/"))
        }
    }

    /// Nothing but a `<key>` may appear while a map waits for one, and a
    /// second root value is as unwelcome as a value inside a scalar.
    fn check_value_position(&self, name: &str, at: usize) -> Result<()> {
        match self.stack.last() {
            None if self.root.is_some() => {
                Err(self.err(ErrorKind::UnexpectedElement(name.into()), at))
            }
            Some(Frame::Map { key: None, .. }) => {
                Err(self.err(ErrorKind::UnexpectedElement(name.into()), at))
            }
            _ => Ok(()),
        }
    }

    fn start(&mut self, e: &BytesStart, at: usize) -> Result<()> {
        let name = std::str::from_utf8(e.name().as_ref())
            .map_err(|_| self.err(ErrorKind::InvalidUtf8, at))?
            .to_string();
        if self.pending.is_some() {
            return Err(self.err(ErrorKind::UnexpectedElement(name), at));
        }
        if !self.saw_llsd {
            if name != "llsd" {
                return Err(self.err(ErrorKind::UnexpectedElement(name), at));
            }
            self.saw_llsd = true;
            self.names.push(name);
            return Ok(());
        }

        let kind = match name.as_str() {
            "llsd" => return Err(self.err(ErrorKind::UnexpectedElement(name), at)),
            "key" => {
                match self.stack.last() {
                    Some(Frame::Map { key: None, .. }) => {}
                    _ => return Err(self.err(ErrorKind::UnexpectedElement(name), at)),
                }
                self.pending = Some(Pending::Key {
                    text: String::new(),
                });
                self.names.push(name);
                return Ok(());
            }
            "array" => {
                self.check_value_position(&name, at)?;
                self.push_frame(Frame::Array(Vec::new()), at)?;
                self.names.push(name);
                return Ok(());
            }
            "map" => {
                self.check_value_position(&name, at)?;
                self.push_frame(
                    Frame::Map {
                        map: Map::new(),
                        key: None,
                    },
                    at,
                )?;
                self.names.push(name);
                return Ok(());
            }
            "undef" => ScalarKind::Undef,
            "boolean" => ScalarKind::Boolean,
            "integer" => ScalarKind::Integer,
            "real" => ScalarKind::Real,
            "uuid" => ScalarKind::Uuid,
            "string" => ScalarKind::String,
            "uri" => ScalarKind::Uri,
            "date" => ScalarKind::Date,
            "binary" => {
                if let Ok(Some(attr)) = e.try_get_attribute("encoding") {
                    if attr.value.as_ref() != b"base64" {
                        return Err(self.err(ErrorKind::UnexpectedElement(name), at));
                    }
                }
                ScalarKind::Binary
            }
            _ => return Err(self.err(ErrorKind::UnexpectedElement(name), at)),
        };
        self.check_value_position(&name, at)?;
        self.pending = Some(Pending::Scalar {
            kind,
            text: String::new(),
            at,
        });
        self.names.push(name);
        Ok(())
    }

    /// Handle an end tag; `Some` carries the root value once `</llsd>`
    /// closes the document.
    fn end(&mut self, name: &[u8], at: usize) -> Result<Option<Value>> {
        let result = self.end_inner(name, at);
        if result.is_ok() {
            self.names.pop();
        }
        result
    }

    fn end_inner(&mut self, name: &[u8], at: usize) -> Result<Option<Value>> {
        match self.pending.take() {
            Some(Pending::Key { text }) => {
                if let Some(Frame::Map { key, .. }) = self.stack.last_mut() {
                    *key = Some(text);
                }
                Ok(None)
            }
            Some(Pending::Scalar { kind, text, at }) => {
                let value = self.finish_scalar(kind, &text, at)?;
                self.attach(value);
                Ok(None)
            }
            None => match name {
                b"array" | b"map" => {
                    let Some(frame) = self.stack.pop() else {
                        return Err(self.err(ErrorKind::UnexpectedTerminator, at));
                    };
                    let value = match frame {
                        Frame::Array(items) => Value::Array(items),
                        Frame::Map { key: Some(_), .. } => {
                            return Err(self.err(ErrorKind::UnexpectedElement("map".into()), at))
                        }
                        Frame::Map { map, .. } => Value::Map(map),
                    };
                    self.attach(value);
                    Ok(None)
                }
                b"llsd" => match self.root.take() {
                    Some(root) => Ok(Some(root)),
                    None => Err(self.err(ErrorKind::Truncated, at)),
                },
                other => Err(self.err(
                    ErrorKind::UnexpectedElement(String::from_utf8_lossy(other).into_owned()),
                    at,
                )),
            },
        }
    }

    fn append_text(&mut self, piece: &str) {
        match &mut self.pending {
            Some(Pending::Key { text }) | Some(Pending::Scalar { text, .. }) => {
                text.push_str(piece)
            }
            None => {}
        }
    }

    fn push_frame(&mut self, frame: Frame, at: usize) -> Result<()> {
        if self.stack.len() >= self.options.max_depth {
            return Err(self.err(ErrorKind::ResourceLimit("nesting depth"), at));
        }
        self.stack.push(frame);
        Ok(())
    }

    fn attach(&mut self, value: Value) {
        match self.stack.last_mut() {
            None => self.root = Some(value),
            Some(Frame::Array(items)) => items.push(value),
            Some(Frame::Map { map, key }) => {
                if let Some(key) = key.take() {
                    map.insert(key, value);
                }
            }
        }
    }

    fn finish_scalar(&self, kind: ScalarKind, text: &str, at: usize) -> Result<Value> {
        let trimmed = text.trim();
        let value = match kind {
            ScalarKind::Undef => Value::Undef,
            ScalarKind::Boolean => match trimmed {
                "" | "0" | "false" => Value::Boolean(false),
                "1" | "true" => Value::Boolean(true),
                _ => return Err(self.err(ErrorKind::InvalidBoolean, at)),
            },
            ScalarKind::Integer => {
                if trimmed.is_empty() {
                    Value::Integer(0)
                } else {
                    Value::Integer(
                        trimmed
                            .parse()
                            .map_err(|_| self.err(ErrorKind::InvalidNumber, at))?,
                    )
                }
            }
            ScalarKind::Real => {
                if trimmed.is_empty() {
                    Value::Real(0.0)
                } else {
                    Value::Real(
                        trimmed
                            .parse()
                            .map_err(|_| self.err(ErrorKind::InvalidNumber, at))?,
                    )
                }
            }
            ScalarKind::Uuid => {
                if trimmed.is_empty() {
                    Value::Uuid(uuid::Uuid::nil())
                } else {
                    Value::Uuid(
                        scalar::uuid_from_str(trimmed)
                            .ok_or_else(|| self.err(ErrorKind::InvalidUuid, at))?,
                    )
                }
            }
            ScalarKind::String => Value::String(text.to_string()),
            ScalarKind::Uri => Value::Uri(text.to_string()),
            ScalarKind::Date => {
                if trimmed.is_empty() {
                    Value::Date(scalar::epoch())
                } else {
                    Value::Date(
                        scalar::date_from_str(trimmed)
                            .ok_or_else(|| self.err(ErrorKind::InvalidDate, at))?,
                    )
                }
            }
            ScalarKind::Binary => {
                if trimmed.is_empty() {
                    Value::Binary(Vec::new())
                } else {
                    Value::Binary(
                        scalar::base64_decode(text)
                            .ok_or_else(|| self.err(ErrorKind::InvalidBase64, at))?,
                    )
                }
            }
        };
        Ok(value)
    }
}

enum Task<'a> {
    Value(&'a Value, usize),
    Entry(&'a str, &'a Value, usize),
    Close(&'static str, usize),
}

/// Encode `value` inside the fixed `<?xml version="1.0" ?><llsd>` shell.
/// `pretty` adds newlines and two-space indentation; the compact form emits
/// no whitespace at all.
pub(crate) fn emit(value: &Value, pretty: bool) -> Vec<u8> {
    let mut out = String::with_capacity(64);
    out.push_str("<?xml version=\"1.0\" ?>");
    line_break(&mut out, pretty);
    out.push_str("<llsd>");
    line_break(&mut out, pretty);

    let mut stack = vec![Task::Value(value, 1)];
    while let Some(task) = stack.pop() {
        match task {
            Task::Close(tag, depth) => {
                indent(&mut out, pretty, depth);
                out.push_str("</");
                out.push_str(tag);
                out.push('>');
                line_break(&mut out, pretty);
            }
            Task::Entry(key, value, depth) => {
                indent(&mut out, pretty, depth);
                if key.is_empty() {
                    out.push_str("<key />");
                } else {
                    out.push_str("<key>");
                    escape_into(&mut out, key);
                    out.push_str("</key>");
                }
                line_break(&mut out, pretty);
                stack.push(Task::Value(value, depth));
            }
            Task::Value(value, depth) => match value {
                Value::Array(items) => {
                    indent(&mut out, pretty, depth);
                    out.push_str("<array>");
                    line_break(&mut out, pretty);
                    stack.push(Task::Close("array", depth));
                    for item in items.iter().rev() {
                        stack.push(Task::Value(item, depth + 1));
                    }
                }
                Value::Map(map) => {
                    indent(&mut out, pretty, depth);
                    out.push_str("<map>");
                    line_break(&mut out, pretty);
                    stack.push(Task::Close("map", depth));
                    for (key, value) in map.iter().rev() {
                        stack.push(Task::Entry(key, value, depth + 1));
                    }
                }
                scalar_value => {
                    indent(&mut out, pretty, depth);
                    write_scalar(&mut out, scalar_value);
                    line_break(&mut out, pretty);
                }
            },
        }
    }

    out.push_str("</llsd>");
    line_break(&mut out, pretty);
    out.into_bytes()
}

fn line_break(out: &mut String, pretty: bool) {
    if pretty {
        out.push('\n');
    }
}

fn indent(out: &mut String, pretty: bool, depth: usize) {
    if pretty {
        for _ in 0..depth {
            out.push_str("  ");
        }
    }
}

fn write_scalar(out: &mut String, value: &Value) {
    let (tag, body): (&str, String) = match value {
        Value::Undef => ("undef", String::new()),
        Value::Boolean(b) => ("boolean", if *b { "true" } else { "false" }.to_string()),
        Value::Integer(i) => ("integer", i.to_string()),
        Value::Real(r) => ("real", scalar::real_to_string(*r)),
        Value::Uuid(u) => ("uuid", u.to_string()),
        Value::String(s) => ("string", s.clone()),
        Value::Uri(u) => ("uri", u.clone()),
        Value::Date(d) => ("date", scalar::date_to_string(d)),
        Value::Binary(b) => ("binary", scalar::base64_encode(b)),
        Value::Array(_) | Value::Map(_) => return,
    };
    if body.is_empty() {
        out.push('<');
        out.push_str(tag);
        out.push_str(" />");
    } else {
        out.push('<');
        out.push_str(tag);
        out.push('>');
        escape_into(out, &body);
        out.push_str("</");
        out.push_str(tag);
        out.push('>');
    }
}

/// `&`, `<` and `>` become entities; C0 controls other than tab, LF and CR
/// become numeric character references.
fn escape_into(out: &mut String, text: &str) {
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\t' | '\n' | '\r' => out.push(ch),
            c if (c as u32) < 0x20 => {
                out.push_str("&#x");
                out.push_str(&format!("{:02x}", c as u32));
                out.push(';');
            }
            c => out.push(c),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use uuid::Uuid;

    fn parse_default(bytes: &[u8]) -> Result<Value> {
        parse(bytes, &ParseOptions::default())
    }

    fn wrap(body: &str) -> Vec<u8> {
        format!("<?xml version=\"1.0\" ?><llsd>{body}</llsd>").into_bytes()
    }

    #[test]
    fn undef_encoding_is_exact() {
        assert_eq!(
            emit(&Value::Undef, false),
            b"<?xml version=\"1.0\" ?><llsd><undef /></llsd>"
        );
    }

    #[test]
    fn scalars_decode() {
        assert_eq!(parse_default(&wrap("<integer>42</integer>")).unwrap(), Value::Integer(42));
        assert_eq!(parse_default(&wrap("<integer> -7 </integer>")).unwrap(), Value::Integer(-7));
        assert_eq!(parse_default(&wrap("<real>nan</real>")).unwrap().to_real().is_nan(), true);
        assert_eq!(parse_default(&wrap("<real>-inf</real>")).unwrap(), Value::Real(f64::NEG_INFINITY));
        assert_eq!(parse_default(&wrap("<boolean>1</boolean>")).unwrap(), Value::Boolean(true));
        assert_eq!(parse_default(&wrap("<boolean>true</boolean>")).unwrap(), Value::Boolean(true));
        assert_eq!(parse_default(&wrap("<string>hi there</string>")).unwrap(), Value::from("hi there"));
        assert_eq!(parse_default(&wrap("<uri>http://e.com/</uri>")).unwrap(), Value::uri("http://e.com/"));
        assert_eq!(
            parse_default(&wrap("<binary>SGVsbG8=</binary>")).unwrap(),
            Value::Binary(b"Hello".to_vec())
        );
        assert_eq!(
            parse_default(&wrap("<binary encoding=\"base64\">SGVsbG8=</binary>")).unwrap(),
            Value::Binary(b"Hello".to_vec())
        );
        assert_eq!(
            parse_default(&wrap("<date>2009-01-01T20:00:10.100000Z</date>"))
                .unwrap()
                .to_string(),
            "2009-01-01T20:00:10.100000Z"
        );
    }

    #[test]
    fn empty_elements_take_defaults() {
        assert_eq!(parse_default(&wrap("<undef/>")).unwrap(), Value::Undef);
        assert_eq!(parse_default(&wrap("<string/>")).unwrap(), Value::from(""));
        assert_eq!(parse_default(&wrap("<integer/>")).unwrap(), Value::Integer(0));
        assert_eq!(parse_default(&wrap("<real/>")).unwrap(), Value::Real(0.0));
        assert_eq!(parse_default(&wrap("<boolean/>")).unwrap(), Value::Boolean(false));
        assert_eq!(parse_default(&wrap("<uuid/>")).unwrap(), Value::Uuid(Uuid::nil()));
        assert_eq!(parse_default(&wrap("<date/>")).unwrap(), Value::Date(crate::scalar::epoch()));
        assert_eq!(parse_default(&wrap("<binary/>")).unwrap(), Value::Binary(vec![]));
    }

    #[test]
    fn duplicate_map_keys_keep_the_last_value() {
        let doc = wrap("<map><key>a</key><integer>1</integer><key>a</key><integer>2</integer></map>");
        let mut expected = Map::new();
        expected.insert("a".to_string(), Value::Integer(2));
        assert_eq!(parse_default(&doc).unwrap(), Value::Map(expected));
    }

    #[test]
    fn string_whitespace_is_preserved() {
        assert_eq!(
            parse_default(&wrap("<string>  a  b  </string>")).unwrap(),
            Value::from("  a  b  ")
        );
        assert_eq!(
            parse_default(&wrap("<string><![CDATA[<raw&stuff>]]></string>")).unwrap(),
            Value::from("<raw&stuff>")
        );
    }

    #[test]
    fn escapes_round_trip() {
        let text = "a<b>&c\u{1}\td";
        let out = emit(&Value::from(text), false);
        let body = String::from_utf8(out.clone()).unwrap();
        assert!(body.contains("a&lt;b&gt;&amp;c&#x01;\td"));
        assert_eq!(parse_default(&out).unwrap(), Value::from(text));
    }

    #[test]
    fn forbidden_constructs_are_rejected() {
        let doc = b"<?xml version=\"1.0\" ?><!DOCTYPE llsd [<!ENTITY x \"y\">]><llsd><undef /></llsd>";
        let err = parse_default(doc).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::ForbiddenConstruct(_)));

        let doc = wrap("<string>&external;</string>");
        let err = parse_default(&doc).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::ForbiddenConstruct(_)));

        let doc = b"<?xml version=\"1.0\" ?><?php evil ?><llsd><undef /></llsd>";
        let err = parse_default(doc).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::ForbiddenConstruct(_)));
    }

    #[test]
    fn numeric_character_references_resolve() {
        assert_eq!(
            parse_default(&wrap("<string>&#65;&#x42;</string>")).unwrap(),
            Value::from("AB")
        );
    }

    #[test]
    fn misplaced_elements_carry_a_path() {
        let err = parse_default(&wrap("<key>a</key>")).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::UnexpectedElement(e) if e == "key"));
        assert_eq!(err.path(), Some("llsd"));

        // a value where a key is expected
        let err = parse_default(&wrap("<map><integer>1</integer></map>")).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::UnexpectedElement(_)));
        assert_eq!(err.path(), Some("llsd/map"));

        // a dangling key at map close
        let err = parse_default(&wrap("<map><key>a</key></map>")).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::UnexpectedElement(_)));

        // two root values
        let err = parse_default(&wrap("<integer>1</integer><integer>2</integer>")).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::UnexpectedElement(_)));

        let err = parse_default(&wrap("<widget>1</widget>")).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::UnexpectedElement(e) if e == "widget"));
    }

    #[test]
    fn unsupported_binary_encoding_is_rejected() {
        let err = parse_default(&wrap("<binary encoding=\"base16\">0fa1</binary>")).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::UnexpectedElement(e) if e == "binary"));
    }

    #[test]
    fn truncated_documents_are_reported() {
        let err = parse_default(b"<?xml version=\"1.0\" ?><llsd><array>").unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Truncated));
        let err = parse_default(&wrap("")).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Truncated));
    }

    #[test]
    fn depth_limit_is_enforced() {
        let depth = 40;
        let mut body = String::new();
        for _ in 0..depth {
            body.push_str("<array>");
        }
        body.push_str("<undef />");
        for _ in 0..depth {
            body.push_str("</array>");
        }
        let doc = wrap(&body);

        let options = ParseOptions {
            max_depth: depth,
            ..ParseOptions::default()
        };
        assert!(parse(&doc, &options).is_ok());

        let options = ParseOptions {
            max_depth: depth - 1,
            ..ParseOptions::default()
        };
        let err = parse(&doc, &options).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::ResourceLimit(_)));
    }

    #[test]
    fn pretty_output_parses_back() {
        let mut map = Map::new();
        map.insert("a".to_string(), Value::Integer(1));
        map.insert("b".to_string(), Value::Array(vec![Value::from("x"), Value::Undef]));
        let value = Value::Map(map);

        let compact = emit(&value, false);
        let pretty = emit(&value, true);
        assert_eq!(parse_default(&compact).unwrap(), value);
        assert_eq!(parse_default(&pretty).unwrap(), value);
        assert!(String::from_utf8(pretty).unwrap().contains("\n  <map>"));
    }

    #[test]
    fn pretty_layout_is_indented() {
        let value = Value::Array(vec![Value::Integer(1)]);
        let text = String::from_utf8(emit(&value, true)).unwrap();
        assert_eq!(
            text,
            "<?xml version=\"1.0\" ?>\n<llsd>\n  <array>\n    <integer>1</integer>\n  </array>\n</llsd>\n"
        );
    }
}
