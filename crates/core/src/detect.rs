//! Wire-form detection.
//!
//! The dispatcher looks at a bounded window of leading bytes and decides
//! which codec should read the document. Headers always win; without one,
//! the byte that opens the root value decides.

use serde::Serialize;
use tracing::trace;

/// The three LLSD wire forms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Format {
    Binary,
    Xml,
    Notation,
}

/// How many leading bytes [`sniff`] may examine.
pub const SNIFF_WINDOW: usize = 64;

/// Identify the wire form carried by `bytes`, or `None` when no codec
/// claims it.
///
/// Every binary tag byte is also a notation sigil, so headerless input that
/// opens with a shared sigil goes to the notation codec unless the window
/// holds a NUL byte — text never does, binary payloads almost always do.
/// The binary emitter always writes its header, so its output is never
/// subject to that heuristic.
pub fn sniff(bytes: &[u8]) -> Option<Format> {
    let window = &bytes[..bytes.len().min(SNIFF_WINDOW)];
    let start = window
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(window.len());
    let lead = &window[start..];
    if lead.is_empty() {
        return None;
    }

    if lead.starts_with(b"<?") {
        let format = match header_marker(&lead[2..]) {
            Some(Marker::Xml) => Some(Format::Xml),
            Some(Marker::Binary) => Some(Format::Binary),
            Some(Marker::Notation) => Some(Format::Notation),
            None => None,
        };
        trace!(?format, "header sniff");
        return format;
    }
    if lead[0] == b'<' {
        // XML without a declaration is not in the grammar
        return None;
    }

    let format = match lead[0] {
        // unambiguous notation sigils
        b'[' | b'{' | b'\'' | b'"' | b't' | b'f' | b'T' | b'F' => Some(Format::Notation),
        // sigils shared with the binary tag set
        b'!' | b'0' | b'1' | b'i' | b'r' | b'u' | b'b' | b's' | b'l' | b'd' => {
            if lead.contains(&0) {
                Some(Format::Binary)
            } else {
                Some(Format::Notation)
            }
        }
        _ => None,
    };
    trace!(?format, first_byte = lead[0], "sigil sniff");
    format
}

enum Marker {
    Xml,
    Binary,
    Notation,
}

/// Classify the `<?…` header whose body starts at `body`. Whitespace inside
/// an llsd marker is insignificant; the marker may be cut off by the sniff
/// window, so a prefix match on the compacted body is enough.
fn header_marker(body: &[u8]) -> Option<Marker> {
    if body.starts_with(b"xml") {
        return Some(Marker::Xml);
    }
    let end = body
        .windows(2)
        .position(|w| w == b"?>")
        .unwrap_or(body.len());
    let compact: Vec<u8> = body[..end]
        .iter()
        .copied()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    if matches(&compact, b"llsd/binary") {
        Some(Marker::Binary)
    } else if matches(&compact, b"llsd/notation") {
        Some(Marker::Notation)
    } else if matches(&compact, b"llsd/xml") {
        Some(Marker::Xml)
    } else {
        None
    }
}

/// Exact match, or prefix match when the body ran past the window.
fn matches(compact: &[u8], marker: &[u8]) -> bool {
    if compact.len() >= marker.len() {
        compact == marker
    } else {
        marker.starts_with(compact) && !compact.is_empty()
    }
}
