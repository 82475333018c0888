//! The textual notation wire form.
//!
//! Each value opens with a type sigil; containers bracket comma-separated
//! entries. Sized string and binary literals state their byte count up
//! front and may therefore embed delimiter characters freely.

use crate::error::{Error, ErrorKind, Result};
use crate::scalar;
use crate::value::{Map, Value};
use crate::ParseOptions;

pub(crate) fn parse(bytes: &[u8], options: &ParseOptions) -> Result<Value> {
    options.check_input(bytes.len())?;
    let start = super::skip_wire_header(bytes, b"llsd/notation")?;
    let mut cur = Cursor { bytes, pos: start };
    parse_root(&mut cur, options)
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn next(&mut self) -> Result<u8> {
        let b = *self
            .bytes
            .get(self.pos)
            .ok_or_else(|| Error::new(ErrorKind::Truncated, self.pos))?;
        self.pos += 1;
        Ok(b)
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        if len > self.bytes.len() - self.pos {
            return Err(Error::new(ErrorKind::Truncated, self.pos));
        }
        let slice = &self.bytes[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(b' ' | b'\t' | b'\n' | b'\r')) {
            self.pos += 1;
        }
    }

    fn at_end(&self) -> bool {
        self.pos == self.bytes.len()
    }
}

enum Frame {
    Array(Vec<Value>),
    Map { map: Map, key: Option<String> },
}

fn parse_root(cur: &mut Cursor, options: &ParseOptions) -> Result<Value> {
    let mut stack: Vec<Frame> = Vec::new();
    let mut done: Option<Value> = None;
    loop {
        // Attach a finished value to its parent, consuming the separator or
        // terminator that follows it.
        while let Some(value) = done.take() {
            match stack.last_mut() {
                None => {
                    cur.skip_ws();
                    if !cur.at_end() {
                        let at = cur.pos;
                        return Err(Error::new(ErrorKind::UnexpectedByte(cur.bytes[at]), at));
                    }
                    return Ok(value);
                }
                Some(Frame::Array(items)) => {
                    items.push(value);
                    cur.skip_ws();
                    let at = cur.pos;
                    match cur.next()? {
                        b',' => {}
                        b']' => {
                            if let Some(Frame::Array(items)) = stack.pop() {
                                done = Some(Value::Array(items));
                            }
                        }
                        other => return Err(Error::new(ErrorKind::UnexpectedByte(other), at)),
                    }
                }
                Some(Frame::Map { map, key }) => {
                    if let Some(key) = key.take() {
                        map.insert(key, value);
                    }
                    cur.skip_ws();
                    let at = cur.pos;
                    match cur.next()? {
                        b',' => {}
                        b'}' => {
                            if let Some(Frame::Map { map, .. }) = stack.pop() {
                                done = Some(Value::Map(map));
                            }
                        }
                        other => return Err(Error::new(ErrorKind::UnexpectedByte(other), at)),
                    }
                }
            }
        }

        cur.skip_ws();

        // An empty container, or one ending with a trailing comma.
        match (stack.last(), cur.peek()) {
            (Some(Frame::Array(_)), Some(b']')) => {
                cur.pos += 1;
                if let Some(Frame::Array(items)) = stack.pop() {
                    done = Some(Value::Array(items));
                }
                continue;
            }
            (Some(Frame::Map { .. }), Some(b'}')) => {
                cur.pos += 1;
                if let Some(Frame::Map { map, .. }) = stack.pop() {
                    done = Some(Value::Map(map));
                }
                continue;
            }
            _ => {}
        }

        // A map entry opens with its key.
        if let Some(Frame::Map { key, .. }) = stack.last_mut() {
            let at = cur.pos;
            let first = cur.next()?;
            let text = match first {
                b'\'' | b'"' | b's' => read_string(cur, first, at)?,
                other => return Err(Error::new(ErrorKind::UnexpectedByte(other), at)),
            };
            *key = Some(text);
            cur.skip_ws();
            let at = cur.pos;
            let sep = cur.next()?;
            if sep != b':' {
                return Err(Error::new(ErrorKind::UnexpectedByte(sep), at));
            }
            cur.skip_ws();
        }

        if let Some(value) = next_value(cur, &mut stack, options)? {
            done = Some(value);
        }
    }
}

/// Read one value, or push a container frame and return `None`.
fn next_value(cur: &mut Cursor, stack: &mut Vec<Frame>, options: &ParseOptions) -> Result<Option<Value>> {
    let at = cur.pos;
    let first = cur.next()?;
    let value = match first {
        b'!' => Value::Undef,
        b'1' => Value::Boolean(true),
        b'0' => Value::Boolean(false),
        b't' | b'T' | b'f' | b'F' => {
            let mut word = vec![first];
            while cur.peek().is_some_and(|b| b.is_ascii_alphabetic()) {
                word.push(cur.next()?);
            }
            match word.as_slice() {
                b"t" | b"T" | b"true" | b"TRUE" => Value::Boolean(true),
                b"f" | b"F" | b"false" | b"FALSE" => Value::Boolean(false),
                _ => return Err(Error::new(ErrorKind::InvalidBoolean, at)),
            }
        }
        b'i' => {
            let text = take_while(cur, |b| b.is_ascii_digit() || b == b'+' || b == b'-');
            let parsed = std::str::from_utf8(text)
                .ok()
                .and_then(|t| t.parse::<i32>().ok())
                .ok_or_else(|| Error::new(ErrorKind::InvalidNumber, at))?;
            Value::Integer(parsed)
        }
        b'r' => {
            let text = take_while(cur, |b| {
                b.is_ascii_alphanumeric() || b == b'+' || b == b'-' || b == b'.'
            });
            let parsed = std::str::from_utf8(text)
                .ok()
                .and_then(|t| t.parse::<f64>().ok())
                .ok_or_else(|| Error::new(ErrorKind::InvalidNumber, at))?;
            Value::Real(parsed)
        }
        b'u' => {
            let raw = cur.take(36)?;
            let uuid = std::str::from_utf8(raw)
                .ok()
                .and_then(scalar::uuid_from_str)
                .ok_or_else(|| Error::new(ErrorKind::InvalidUuid, at))?;
            Value::Uuid(uuid)
        }
        b'd' => {
            let text = read_delimited(cur, at)?;
            let dt = scalar::date_from_str(&text)
                .ok_or_else(|| Error::new(ErrorKind::InvalidDate, at))?;
            Value::Date(dt)
        }
        b'l' => Value::Uri(read_delimited(cur, at)?),
        b'\'' | b'"' | b's' => Value::String(read_string(cur, first, at)?),
        b'b' => read_binary(cur, at)?,
        b'[' => {
            push_frame(stack, Frame::Array(Vec::new()), options, at)?;
            return Ok(None);
        }
        b'{' => {
            push_frame(
                stack,
                Frame::Map {
                    map: Map::new(),
                    key: None,
                },
                options,
                at,
            )?;
            return Ok(None);
        }
        other => return Err(Error::new(ErrorKind::UnexpectedByte(other), at)),
    };
    Ok(Some(value))
}

fn push_frame(
    stack: &mut Vec<Frame>,
    frame: Frame,
    options: &ParseOptions,
    at: usize,
) -> Result<()> {
    if stack.len() >= options.max_depth {
        return Err(Error::new(ErrorKind::ResourceLimit("nesting depth"), at));
    }
    stack.push(frame);
    Ok(())
}

fn take_while<'a>(cur: &mut Cursor<'a>, pred: impl Fn(u8) -> bool) -> &'a [u8] {
    let start = cur.pos;
    while cur.peek().is_some_and(&pred) {
        cur.pos += 1;
    }
    &cur.bytes[start..cur.pos]
}

/// A string literal whose opening byte has been consumed: quoted with
/// escapes, or the sized `s(LEN)"…"` form that takes LEN raw bytes.
fn read_string(cur: &mut Cursor, first: u8, at: usize) -> Result<String> {
    let raw = match first {
        b'\'' | b'"' => super::decode_quoted(cur.bytes, &mut cur.pos, first)?,
        _ => read_sized_payload(cur)?.to_vec(),
    };
    String::from_utf8(raw).map_err(|_| Error::new(ErrorKind::InvalidUtf8, at))
}

/// `(LEN)` then a delimiter, LEN raw bytes, and the same delimiter again.
fn read_sized_payload<'a>(cur: &mut Cursor<'a>) -> Result<&'a [u8]> {
    let at = cur.pos;
    let open = cur.next()?;
    if open != b'(' {
        return Err(Error::new(ErrorKind::UnexpectedByte(open), at));
    }
    let digits = take_while(cur, |b| b.is_ascii_digit());
    if digits.is_empty() {
        let at = cur.pos;
        let b = cur.next()?;
        return Err(Error::new(ErrorKind::UnexpectedByte(b), at));
    }
    let mut len: usize = 0;
    for &d in digits {
        len = len
            .checked_mul(10)
            .and_then(|l| l.checked_add(usize::from(d - b'0')))
            .ok_or_else(|| Error::new(ErrorKind::LengthTooLarge, at))?;
    }
    let close_at = cur.pos;
    let close = cur.next()?;
    if close != b')' {
        return Err(Error::new(ErrorKind::UnexpectedByte(close), close_at));
    }
    let delim_at = cur.pos;
    let delim = cur.next()?;
    if delim != b'\'' && delim != b'"' {
        return Err(Error::new(ErrorKind::UnexpectedByte(delim), delim_at));
    }
    let payload = cur.take(len)?;
    let end_at = cur.pos;
    if cur.next()? != delim {
        return Err(Error::new(ErrorKind::SizedLengthMismatch, end_at));
    }
    Ok(payload)
}

/// A quoted literal with escapes, decoded to UTF-8 text (dates and URIs).
fn read_delimited(cur: &mut Cursor, at: usize) -> Result<String> {
    let delim_at = cur.pos;
    let delim = cur.next()?;
    if delim != b'\'' && delim != b'"' {
        return Err(Error::new(ErrorKind::UnexpectedByte(delim), delim_at));
    }
    let raw = super::decode_quoted(cur.bytes, &mut cur.pos, delim)?;
    String::from_utf8(raw).map_err(|_| Error::new(ErrorKind::InvalidUtf8, at))
}

/// The `b` literals: `b64"…"`, `b16"…"`, or raw `b(LEN)"…"`.
fn read_binary(cur: &mut Cursor, at: usize) -> Result<Value> {
    if cur.peek() == Some(b'(') {
        return Ok(Value::Binary(read_sized_payload(cur)?.to_vec()));
    }
    let base = cur.take(2)?;
    let base = [base[0], base[1]];
    let delim_at = cur.pos;
    let delim = cur.next()?;
    if delim != b'\'' && delim != b'"' {
        return Err(Error::new(ErrorKind::UnexpectedByte(delim), delim_at));
    }
    let start = cur.pos;
    let len = cur.bytes[start..]
        .iter()
        .position(|&b| b == delim)
        .ok_or_else(|| Error::new(ErrorKind::Truncated, cur.bytes.len()))?;
    let content = cur.take(len)?;
    cur.pos += 1; // closing delimiter
    match &base {
        b"64" => {
            let text = std::str::from_utf8(content)
                .map_err(|_| Error::new(ErrorKind::InvalidBase64, start))?;
            let bytes = scalar::base64_decode(text)
                .ok_or_else(|| Error::new(ErrorKind::InvalidBase64, start))?;
            Ok(Value::Binary(bytes))
        }
        b"16" => Ok(Value::Binary(decode_hex(content, start)?)),
        _ => Err(Error::new(ErrorKind::UnexpectedByte(base[0]), at + 1)),
    }
}

fn decode_hex(content: &[u8], base_off: usize) -> Result<Vec<u8>> {
    let mut digits = Vec::with_capacity(content.len());
    for (i, &b) in content.iter().enumerate() {
        if b.is_ascii_whitespace() {
            continue;
        }
        if !b.is_ascii_hexdigit() {
            return Err(Error::new(ErrorKind::UnexpectedByte(b), base_off + i));
        }
        digits.push(b);
    }
    if digits.len() % 2 != 0 {
        return Err(Error::new(ErrorKind::Truncated, base_off + content.len()));
    }
    let mut out = Vec::with_capacity(digits.len() / 2);
    for pair in digits.chunks_exact(2) {
        let hi = (pair[0] as char).to_digit(16).unwrap_or(0) as u8;
        let lo = (pair[1] as char).to_digit(16).unwrap_or(0) as u8;
        out.push(hi * 16 + lo);
    }
    Ok(out)
}

enum Task<'a> {
    Value(&'a Value),
    Item { value: &'a Value, first: bool },
    Entry { key: &'a str, value: &'a Value, first: bool },
    Raw(&'static str),
}

/// Encode `value`. No header; the root value starts at byte zero.
pub(crate) fn emit(value: &Value) -> Vec<u8> {
    let mut out = Vec::with_capacity(32);
    let mut stack = vec![Task::Value(value)];
    while let Some(task) = stack.pop() {
        match task {
            Task::Raw(text) => out.extend_from_slice(text.as_bytes()),
            Task::Item { value, first } => {
                if !first {
                    out.push(b',');
                }
                stack.push(Task::Value(value));
            }
            Task::Entry { key, value, first } => {
                if !first {
                    out.push(b',');
                }
                write_string(&mut out, key);
                out.push(b':');
                stack.push(Task::Value(value));
            }
            Task::Value(value) => match value {
                Value::Undef => out.push(b'!'),
                Value::Boolean(true) => out.push(b'1'),
                Value::Boolean(false) => out.push(b'0'),
                Value::Integer(i) => {
                    out.push(b'i');
                    out.extend_from_slice(i.to_string().as_bytes());
                }
                Value::Real(r) => {
                    out.push(b'r');
                    out.extend_from_slice(scalar::real_to_string(*r).as_bytes());
                }
                Value::Uuid(u) => {
                    out.push(b'u');
                    out.extend_from_slice(u.to_string().as_bytes());
                }
                Value::String(s) => write_string(&mut out, s),
                Value::Uri(u) => {
                    out.push(b'l');
                    write_escaped_quoted(&mut out, u, b'"');
                }
                Value::Date(d) => {
                    out.push(b'd');
                    out.push(b'"');
                    out.extend_from_slice(scalar::date_to_string(d).as_bytes());
                    out.push(b'"');
                }
                Value::Binary(b) => {
                    out.extend_from_slice(b"b64\"");
                    out.extend_from_slice(scalar::base64_encode(b).as_bytes());
                    out.push(b'"');
                }
                Value::Array(items) => {
                    out.push(b'[');
                    stack.push(Task::Raw("]"));
                    for (i, item) in items.iter().enumerate().rev() {
                        stack.push(Task::Item {
                            value: item,
                            first: i == 0,
                        });
                    }
                }
                Value::Map(map) => {
                    out.push(b'{');
                    stack.push(Task::Raw("}"));
                    for (i, (key, value)) in map.iter().enumerate().rev() {
                        stack.push(Task::Entry {
                            key,
                            value,
                            first: i == 0,
                        });
                    }
                }
            },
        }
    }
    out
}

/// Quoted when the text needs no escapes, sized otherwise: the sized form
/// sidesteps escape ambiguity for embedded quotes and control bytes.
fn write_string(out: &mut Vec<u8>, s: &str) {
    let needs_sizing = s
        .bytes()
        .any(|b| b < 0x20 || b == 0x7f || b == b'\'' || b == b'"' || b == b'\\');
    if needs_sizing {
        out.push(b's');
        out.push(b'(');
        out.extend_from_slice(s.len().to_string().as_bytes());
        out.extend_from_slice(b")\"");
        out.extend_from_slice(s.as_bytes());
        out.push(b'"');
    } else {
        out.push(b'\'');
        out.extend_from_slice(s.as_bytes());
        out.push(b'\'');
    }
}

fn write_escaped_quoted(out: &mut Vec<u8>, s: &str, delim: u8) {
    out.push(delim);
    for b in s.bytes() {
        if b == delim || b == b'\\' {
            out.push(b'\\');
        }
        out.push(b);
    }
    out.push(delim);
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use uuid::Uuid;

    fn parse_default(bytes: &[u8]) -> Result<Value> {
        parse(bytes, &ParseOptions::default())
    }

    #[test]
    fn integer_array_is_exact_both_ways() {
        let value = Value::Array(vec![
            Value::Integer(1),
            Value::Integer(2),
            Value::Integer(3),
        ]);
        assert_eq!(parse_default(b"[i1,i2,i3]").unwrap(), value);
        assert_eq!(emit(&value), b"[i1,i2,i3]");
    }

    #[test]
    fn whitespace_and_header_are_tolerated() {
        let value = parse_default(b"<? llsd/notation ?>\n[ i1 , i2 ,\n\ti3 ]").unwrap();
        assert_eq!(
            value,
            Value::Array(vec![
                Value::Integer(1),
                Value::Integer(2),
                Value::Integer(3)
            ])
        );
        assert_eq!(parse_default(b" [ ] ").unwrap(), Value::Array(vec![]));
        assert_eq!(parse_default(b"[i1,]").unwrap(), Value::Array(vec![Value::Integer(1)]));
    }

    #[test]
    fn string_forms_agree() {
        assert_eq!(parse_default(b"s(5)\"hello\"").unwrap(), Value::from("hello"));
        assert_eq!(parse_default(b"\"hello\"").unwrap(), Value::from("hello"));
        assert_eq!(parse_default(b"'hello'").unwrap(), Value::from("hello"));
        // the emitter prefers the shorter quoted form
        assert_eq!(emit(&Value::from("hello")), b"'hello'");
        // embedded quotes push it to the sized form
        assert_eq!(emit(&Value::from("it's")), b"s(4)\"it's\"");
    }

    #[test]
    fn sized_literals_may_embed_delimiters() {
        assert_eq!(
            parse_default(b"s(7)\"a\"b'c\"d\"").unwrap(),
            Value::from("a\"b'c\"d")
        );
        let err = parse_default(b"s(4)\"hello\"").unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::SizedLengthMismatch));
        let err = parse_default(b"s(99)\"hello\"").unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Truncated));
        let err = parse_default(b"s(99999999999999999999999999)\"x\"").unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::LengthTooLarge));
    }

    #[test]
    fn escapes_decode() {
        assert_eq!(
            parse_default(br#"'a\'b\n\t\x41'"#).unwrap(),
            Value::from("a'b\n\tA")
        );
    }

    #[test]
    fn boolean_spellings() {
        for text in [&b"1"[..], b"t", b"T", b"true", b"TRUE"] {
            assert_eq!(parse_default(text).unwrap(), Value::Boolean(true), "{text:?}");
        }
        for text in [&b"0"[..], b"f", b"F", b"false", b"FALSE"] {
            assert_eq!(parse_default(text).unwrap(), Value::Boolean(false), "{text:?}");
        }
        let err = parse_default(b"truthy").unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::InvalidBoolean));
    }

    #[test]
    fn numbers_parse_and_reject() {
        assert_eq!(parse_default(b"i-12").unwrap(), Value::Integer(-12));
        assert_eq!(parse_default(b"r3.14").unwrap(), Value::Real(3.14));
        assert_eq!(parse_default(b"r-0.5e2").unwrap(), Value::Real(-50.0));
        assert!(matches!(
            parse_default(b"rnan").unwrap(),
            Value::Real(r) if r.is_nan()
        ));
        assert_eq!(parse_default(b"r-inf").unwrap(), Value::Real(f64::NEG_INFINITY));
        // 2^31 overflows i32
        let err = parse_default(b"i2147483648").unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::InvalidNumber));
        let err = parse_default(b"i").unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::InvalidNumber));
    }

    #[test]
    fn scalar_literals() {
        let uuid = "6bad258e-06f0-4a87-a659-493117c9c162";
        assert_eq!(
            parse_default(format!("u{uuid}").as_bytes()).unwrap(),
            Value::Uuid(uuid.parse::<Uuid>().unwrap())
        );
        let err = parse_default(b"unot-a-uuid-at-all-not-a-uuid-at-all-").unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::InvalidUuid));

        assert_eq!(
            parse_default(b"d\"2009-01-01T20:00:10.100000Z\"").unwrap().to_string(),
            "2009-01-01T20:00:10.100000Z"
        );
        assert_eq!(
            parse_default(b"l\"http://example.com/?a=b\"").unwrap(),
            Value::uri("http://example.com/?a=b")
        );
    }

    #[test]
    fn binary_literals() {
        assert_eq!(
            parse_default(b"b64\"SGVsbG8=\"").unwrap(),
            Value::Binary(b"Hello".to_vec())
        );
        assert_eq!(
            parse_default(b"b16\"0FA1\"").unwrap(),
            Value::Binary(vec![0x0f, 0xa1])
        );
        assert_eq!(
            parse_default(b"b(3)\"\x00\x01\x02\"").unwrap(),
            Value::Binary(vec![0, 1, 2])
        );
        let err = parse_default(b"b64\"not base64!\"").unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::InvalidBase64));
        let err = parse_default(b"b16\"0G\"").unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::UnexpectedByte(b'G')));

        assert_eq!(emit(&Value::Binary(b"Hello".to_vec())), b"b64\"SGVsbG8=\"");
    }

    #[test]
    fn maps_round_trip_and_keep_last_duplicate() {
        let mut map = Map::new();
        map.insert("b".to_string(), Value::Integer(1));
        map.insert("a".to_string(), Value::from("x"));
        let value = Value::Map(map);
        let text = emit(&value);
        assert_eq!(text, b"{'b':i1,'a':'x'}");
        assert_eq!(parse_default(&text).unwrap(), value);

        let mut expected = Map::new();
        expected.insert("a".to_string(), Value::Integer(2));
        assert_eq!(
            parse_default(b"{'a':i1,'a':i2}").unwrap(),
            Value::Map(expected)
        );
    }

    #[test]
    fn trailing_garbage_is_rejected() {
        let err = parse_default(b"i1 i2").unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::UnexpectedByte(b'i')));
        let err = parse_default(b"[i1]]").unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::UnexpectedByte(b']')));
    }

    #[test]
    fn depth_limit_is_enforced() {
        let depth = 40;
        let mut text = Vec::new();
        text.extend(std::iter::repeat(b'[').take(depth));
        text.push(b'!');
        text.extend(std::iter::repeat(b']').take(depth));

        let options = ParseOptions {
            max_depth: depth,
            ..ParseOptions::default()
        };
        assert!(parse(&text, &options).is_ok());

        let options = ParseOptions {
            max_depth: depth - 1,
            ..ParseOptions::default()
        };
        let err = parse(&text, &options).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::ResourceLimit(_)));
    }

    #[test]
    fn emitter_handles_nested_containers() {
        let mut inner = Map::new();
        inner.insert("k".to_string(), Value::Array(vec![Value::Undef]));
        let value = Value::Array(vec![
            Value::Map(inner),
            Value::Boolean(true),
            Value::Real(f64::NAN),
        ]);
        assert_eq!(emit(&value), b"[{'k':[!]},1,rnan]");
    }
}
