//! The three wire-form codecs.

pub(crate) mod binary;
pub(crate) mod notation;
pub(crate) mod xml;

use crate::error::{Error, ErrorKind, Result};

/// Skip leading whitespace and an optional `<? MARKER ?>` header line,
/// returning the offset of the first payload byte. Whitespace inside the
/// marker is insignificant. A `<?…?>` header that names anything else is an
/// error; input claiming one wire form cannot open with another's marker.
pub(crate) fn skip_wire_header(bytes: &[u8], marker: &[u8]) -> Result<usize> {
    let mut pos = 0;
    while pos < bytes.len() && bytes[pos].is_ascii_whitespace() {
        pos += 1;
    }
    if !bytes[pos..].starts_with(b"<?") {
        return Ok(pos);
    }
    let body_start = pos + 2;
    let end = bytes[body_start..]
        .windows(2)
        .position(|w| w == b"?>")
        .ok_or_else(|| Error::new(ErrorKind::Truncated, pos))?;
    let compact: Vec<u8> = bytes[body_start..body_start + end]
        .iter()
        .copied()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    if compact != marker {
        return Err(Error::new(ErrorKind::UnknownFormat, pos));
    }
    let mut p = body_start + end + 2;
    if bytes.get(p) == Some(&b'\r') {
        p += 1;
    }
    if bytes.get(p) == Some(&b'\n') {
        p += 1;
    }
    Ok(p)
}

/// Decode a quoted byte string starting just past its opening delimiter,
/// advancing `pos` past the closing delimiter. Escapes are the C-style set
/// both text forms share (`\n \r \t \a \b \f \v \xHH`); an escaped byte
/// outside that set stands for itself, which covers `\\`, `\'` and `\"`.
pub(crate) fn decode_quoted(bytes: &[u8], pos: &mut usize, delim: u8) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    loop {
        let b = *bytes
            .get(*pos)
            .ok_or_else(|| Error::new(ErrorKind::Truncated, *pos))?;
        *pos += 1;
        if b == delim {
            return Ok(out);
        }
        if b != b'\\' {
            out.push(b);
            continue;
        }
        let esc = *bytes
            .get(*pos)
            .ok_or_else(|| Error::new(ErrorKind::Truncated, *pos))?;
        *pos += 1;
        match esc {
            b'n' => out.push(b'\n'),
            b'r' => out.push(b'\r'),
            b't' => out.push(b'\t'),
            b'a' => out.push(0x07),
            b'b' => out.push(0x08),
            b'f' => out.push(0x0c),
            b'v' => out.push(0x0b),
            b'x' => {
                let hi = hex_digit(bytes, *pos)?;
                let lo = hex_digit(bytes, *pos + 1)?;
                *pos += 2;
                out.push(hi * 16 + lo);
            }
            other => out.push(other),
        }
    }
}

fn hex_digit(bytes: &[u8], pos: usize) -> Result<u8> {
    let b = *bytes
        .get(pos)
        .ok_or_else(|| Error::new(ErrorKind::Truncated, pos))?;
    (b as char)
        .to_digit(16)
        .map(|d| d as u8)
        .ok_or_else(|| Error::new(ErrorKind::UnexpectedByte(b), pos))
}
