//! Scalar codecs shared by the wire formats: dates, UUIDs, base64 and
//! real-number text.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use uuid::Uuid;

/// The LLSD epoch, 1970-01-01T00:00:00Z.
pub(crate) fn epoch() -> DateTime<Utc> {
    DateTime::<Utc>::UNIX_EPOCH
}

/// Drop any precision below a microsecond.
pub(crate) fn truncate_to_micros(dt: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_micros(dt.timestamp_micros()).unwrap_or(dt)
}

/// Parse `YYYY-MM-DDTHH:MM:SS[.f...]Z`. Up to six fractional digits are
/// significant; further digits are truncated. The `Z` suffix is required.
pub(crate) fn date_from_str(s: &str) -> Option<DateTime<Utc>> {
    let rest = s.strip_suffix('Z')?;
    let (base, frac) = match rest.split_once('.') {
        Some((base, frac)) => (base, Some(frac)),
        None => (rest, None),
    };
    let naive = NaiveDateTime::parse_from_str(base, "%Y-%m-%dT%H:%M:%S").ok()?;
    let mut micros = 0i64;
    if let Some(frac) = frac {
        if frac.is_empty() || !frac.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        for (i, b) in frac.bytes().take(6).enumerate() {
            micros += i64::from(b - b'0') * 10i64.pow(5 - i as u32);
        }
    }
    Some(naive.and_utc() + Duration::microseconds(micros))
}

/// Emit ISO-8601 with microseconds when the sub-second field is non-zero,
/// second precision otherwise.
pub(crate) fn date_to_string(dt: &DateTime<Utc>) -> String {
    let micros = dt.timestamp_subsec_micros();
    if micros == 0 {
        dt.format("%Y-%m-%dT%H:%M:%SZ").to_string()
    } else {
        format!("{}.{:06}Z", dt.format("%Y-%m-%dT%H:%M:%S"), micros)
    }
}

/// Interpret a seconds-since-epoch real as an instant, rounded to the
/// nearest microsecond. Non-finite and out-of-range values are rejected.
pub(crate) fn date_from_epoch_seconds(secs: f64) -> Option<DateTime<Utc>> {
    if !secs.is_finite() {
        return None;
    }
    let micros = (secs * 1_000_000.0).round();
    if micros < i64::MIN as f64 || micros > i64::MAX as f64 {
        return None;
    }
    DateTime::from_timestamp_micros(micros as i64)
}

/// The seconds-since-epoch real carried by the binary form.
pub(crate) fn date_to_epoch_seconds(dt: &DateTime<Utc>) -> f64 {
    dt.timestamp_micros() as f64 / 1_000_000.0
}

/// Parse exactly the canonical 8-4-4-4-12 hyphenated form, any case.
/// The `uuid` crate alone is too permissive here: it also takes braced,
/// simple and URN spellings, which LLSD does not.
pub(crate) fn uuid_from_str(s: &str) -> Option<Uuid> {
    let bytes = s.as_bytes();
    if bytes.len() != 36 {
        return None;
    }
    for (i, &b) in bytes.iter().enumerate() {
        let ok = match i {
            8 | 13 | 18 | 23 => b == b'-',
            _ => b.is_ascii_hexdigit(),
        };
        if !ok {
            return None;
        }
    }
    Uuid::parse_str(s).ok()
}

/// RFC 4648 decode, tolerating embedded ASCII whitespace.
pub(crate) fn base64_decode(text: &str) -> Option<Vec<u8>> {
    let compact: String = text.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    STANDARD.decode(compact).ok()
}

/// RFC 4648 encode, no line breaks.
pub(crate) fn base64_encode(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Canonical text for a real: Rust's shortest round-trip rendering for
/// finite values, `nan`/`inf`/`-inf` otherwise.
pub(crate) fn real_to_string(v: f64) -> String {
    if v.is_nan() {
        "nan".to_string()
    } else if v == f64::INFINITY {
        "inf".to_string()
    } else if v == f64::NEG_INFINITY {
        "-inf".to_string()
    } else {
        v.to_string()
    }
}
