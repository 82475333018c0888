//! The length-prefixed binary wire form.
//!
//! Every multi-byte quantity is big-endian. A document is one value;
//! containers carry their entry count up front and still close with a
//! terminator byte. An optional `<? llsd/binary ?>` header line precedes
//! the root.

use uuid::Uuid;

use crate::error::{Error, ErrorKind, Result};
use crate::scalar;
use crate::value::{Map, Value};
use crate::ParseOptions;

pub(crate) const HEADER: &[u8] = b"<? llsd/binary ?>\n";

pub(crate) fn parse(bytes: &[u8], options: &ParseOptions) -> Result<Value> {
    options.check_input(bytes.len())?;
    let start = super::skip_wire_header(bytes, b"llsd/binary")?;
    let mut cur = Cursor { bytes, pos: start };
    parse_root(&mut cur, options)
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn offset(&self) -> usize {
        self.pos
    }

    fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    fn read_u8(&mut self) -> Result<u8> {
        let b = *self
            .bytes
            .get(self.pos)
            .ok_or_else(|| Error::new(ErrorKind::Truncated, self.pos))?;
        self.pos += 1;
        Ok(b)
    }

    fn read_exact(&mut self, len: usize) -> Result<&'a [u8]> {
        if len > self.remaining() {
            return Err(Error::new(ErrorKind::Truncated, self.pos));
        }
        let slice = &self.bytes[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn read_u32(&mut self) -> Result<u32> {
        let raw = self.read_exact(4)?;
        Ok(u32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]))
    }

    fn read_i32(&mut self) -> Result<i32> {
        let raw = self.read_exact(4)?;
        Ok(i32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]))
    }

    fn read_f64(&mut self) -> Result<f64> {
        let raw = self.read_exact(8)?;
        let mut b = [0u8; 8];
        b.copy_from_slice(raw);
        Ok(f64::from_be_bytes(b))
    }

    /// A 4-byte length followed by that many bytes.
    fn read_sized(&mut self) -> Result<&'a [u8]> {
        let at = self.pos;
        let len = self.read_u32()? as usize;
        if len > self.remaining() {
            return Err(Error::new(ErrorKind::Truncated, at));
        }
        self.read_exact(len)
    }

    fn read_sized_utf8(&mut self) -> Result<String> {
        let at = self.pos;
        let raw = self.read_sized()?;
        std::str::from_utf8(raw)
            .map(str::to_string)
            .map_err(|_| Error::new(ErrorKind::InvalidUtf8, at))
    }
}

enum Frame {
    Array { remaining: u32, items: Vec<Value> },
    Map { remaining: u32, map: Map, key: Option<String> },
}

impl Frame {
    fn is_complete(&self) -> bool {
        match self {
            Frame::Array { remaining, .. } | Frame::Map { remaining, .. } => *remaining == 0,
        }
    }

    fn attach(&mut self, value: Value) {
        match self {
            Frame::Array { remaining, items } => {
                items.push(value);
                *remaining -= 1;
            }
            Frame::Map { remaining, map, key } => {
                if let Some(key) = key.take() {
                    map.insert(key, value);
                }
                *remaining -= 1;
            }
        }
    }
}

fn parse_root(cur: &mut Cursor, options: &ParseOptions) -> Result<Value> {
    let mut stack: Vec<Frame> = Vec::new();
    loop {
        // Close containers whose declared count has been consumed.
        loop {
            match stack.last() {
                Some(frame) if frame.is_complete() => {}
                _ => break,
            }
            let at = cur.offset();
            let term = cur.read_u8()?;
            let Some(frame) = stack.pop() else { break };
            let closed = match frame {
                Frame::Array { items, .. } => {
                    if term != b']' {
                        return Err(Error::new(ErrorKind::UnexpectedTerminator, at));
                    }
                    Value::Array(items)
                }
                Frame::Map { map, .. } => {
                    if term != b'}' {
                        return Err(Error::new(ErrorKind::UnexpectedTerminator, at));
                    }
                    Value::Map(map)
                }
            };
            match stack.last_mut() {
                None => return Ok(closed),
                Some(parent) => parent.attach(closed),
            }
        }

        // A map entry starts with a `k`-prefixed key.
        if let Some(Frame::Map { key, .. }) = stack.last_mut() {
            if key.is_none() {
                let at = cur.offset();
                let prefix = cur.read_u8()?;
                if prefix != b'k' {
                    return Err(Error::new(ErrorKind::UnexpectedByte(prefix), at));
                }
                *key = Some(cur.read_sized_utf8()?);
            }
        }

        if let Some(value) = next_value(cur, &mut stack, options)? {
            match stack.last_mut() {
                None => return Ok(value),
                Some(parent) => parent.attach(value),
            }
        }
    }
}

/// Read one value, or push a container frame and return `None`.
fn next_value(cur: &mut Cursor, stack: &mut Vec<Frame>, options: &ParseOptions) -> Result<Option<Value>> {
    let at = cur.offset();
    let tag = cur.read_u8()?;
    let value = match tag {
        b'!' => Value::Undef,
        b'1' => Value::Boolean(true),
        b'0' => Value::Boolean(false),
        b'i' => Value::Integer(cur.read_i32()?),
        b'r' => Value::Real(cur.read_f64()?),
        b'u' => {
            let raw = cur.read_exact(16)?;
            let mut b = [0u8; 16];
            b.copy_from_slice(raw);
            Value::Uuid(Uuid::from_bytes(b))
        }
        b's' => Value::String(cur.read_sized_utf8()?),
        b'l' => Value::Uri(cur.read_sized_utf8()?),
        b'b' => Value::Binary(cur.read_sized()?.to_vec()),
        b'd' => {
            let secs = cur.read_f64()?;
            let dt = scalar::date_from_epoch_seconds(secs)
                .ok_or_else(|| Error::new(ErrorKind::InvalidDate, at))?;
            Value::Date(dt)
        }
        // Historical traffic also carries notation-style quoted strings.
        b'\'' | b'"' => {
            let raw = super::decode_quoted(cur.bytes, &mut cur.pos, tag)?;
            let text =
                String::from_utf8(raw).map_err(|_| Error::new(ErrorKind::InvalidUtf8, at))?;
            Value::String(text)
        }
        b'[' => {
            let count = cur.read_u32()?;
            if count as usize > cur.remaining() {
                return Err(Error::new(ErrorKind::Truncated, at));
            }
            push_frame(
                stack,
                Frame::Array {
                    remaining: count,
                    items: Vec::new(),
                },
                options,
                at,
            )?;
            return Ok(None);
        }
        b'{' => {
            let count = cur.read_u32()?;
            if count as usize > cur.remaining() {
                return Err(Error::new(ErrorKind::Truncated, at));
            }
            push_frame(
                stack,
                Frame::Map {
                    remaining: count,
                    map: Map::new(),
                    key: None,
                },
                options,
                at,
            )?;
            return Ok(None);
        }
        b']' | b'}' => return Err(Error::new(ErrorKind::UnexpectedTerminator, at)),
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

enum Task<'a> {
    Value(&'a Value),
    Entry(&'a str, &'a Value),
    Close(u8),
}

/// Encode `value`, header included. Iterative so that document depth never
/// translates into native stack depth.
pub(crate) fn emit(value: &Value) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(64);
    out.extend_from_slice(HEADER);
    let mut stack = vec![Task::Value(value)];
    while let Some(task) = stack.pop() {
        match task {
            Task::Close(term) => out.push(term),
            Task::Entry(key, value) => {
                out.push(b'k');
                write_len(&mut out, key.len())?;
                out.extend_from_slice(key.as_bytes());
                stack.push(Task::Value(value));
            }
            Task::Value(value) => match value {
                Value::Undef => out.push(b'!'),
                Value::Boolean(true) => out.push(b'1'),
                Value::Boolean(false) => out.push(b'0'),
                Value::Integer(i) => {
                    out.push(b'i');
                    out.extend_from_slice(&i.to_be_bytes());
                }
                Value::Real(r) => {
                    out.push(b'r');
                    out.extend_from_slice(&r.to_be_bytes());
                }
                Value::Uuid(u) => {
                    out.push(b'u');
                    out.extend_from_slice(u.as_bytes());
                }
                Value::String(s) => {
                    out.push(b's');
                    write_len(&mut out, s.len())?;
                    out.extend_from_slice(s.as_bytes());
                }
                Value::Uri(u) => {
                    out.push(b'l');
                    write_len(&mut out, u.len())?;
                    out.extend_from_slice(u.as_bytes());
                }
                Value::Binary(b) => {
                    out.push(b'b');
                    write_len(&mut out, b.len())?;
                    out.extend_from_slice(b);
                }
                Value::Date(d) => {
                    out.push(b'd');
                    out.extend_from_slice(&scalar::date_to_epoch_seconds(d).to_be_bytes());
                }
                Value::Array(items) => {
                    out.push(b'[');
                    write_len(&mut out, items.len())?;
                    stack.push(Task::Close(b']'));
                    for item in items.iter().rev() {
                        stack.push(Task::Value(item));
                    }
                }
                Value::Map(map) => {
                    out.push(b'{');
                    write_len(&mut out, map.len())?;
                    stack.push(Task::Close(b'}'));
                    for (key, value) in map.iter().rev() {
                        stack.push(Task::Entry(key, value));
                    }
                }
            },
        }
    }
    Ok(out)
}

fn write_len(out: &mut Vec<u8>, len: usize) -> Result<()> {
    let len =
        u32::try_from(len).map_err(|_| Error::new(ErrorKind::LengthTooLarge, out.len()))?;
    out.extend_from_slice(&len.to_be_bytes());
    Ok(())
}
