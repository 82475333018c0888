//! LLSD Core
//!
//! Encode and decode LLSD (Linden Lab Structured Data) across its three
//! wire forms: a compact binary form, an XML form and a human-oriented
//! notation form. Documents round-trip losslessly through the shared
//! [`Value`] model within each form's documented precision.
//!
//! ```
//! use llsd_core::{parse, format_notation};
//!
//! let value = parse(b"[i1,i2,i3]").unwrap();
//! assert_eq!(value.as_array().unwrap().len(), 3);
//! assert_eq!(format_notation(&value).unwrap(), b"[i1,i2,i3]");
//! ```

mod detect;
mod error;
mod formats;
mod scalar;
mod value;

pub use detect::{sniff, Format};
pub use error::{Error, ErrorKind, Result};
pub use value::{Map, Value};

use std::io::Write;

use tracing::debug;

/// Limits applied while decoding. The defaults put no bound on input size
/// and allow 1024 levels of container nesting; exceeding either limit is
/// [`ErrorKind::ResourceLimit`].
#[derive(Debug, Clone)]
pub struct ParseOptions {
    /// Largest input the decoder will accept, in bytes.
    pub max_bytes: Option<usize>,
    /// Deepest container nesting the decoder will build.
    pub max_depth: usize,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            max_bytes: None,
            max_depth: 1024,
        }
    }
}

impl ParseOptions {
    pub(crate) fn check_input(&self, len: usize) -> Result<()> {
        match self.max_bytes {
            Some(max) if len > max => Err(Error::new(
                ErrorKind::ResourceLimit("input byte budget"),
                max,
            )),
            _ => Ok(()),
        }
    }
}

/// Decode a document of any wire form, deciding by the leading bytes.
pub fn parse(bytes: &[u8]) -> Result<Value> {
    parse_with(bytes, &ParseOptions::default())
}

/// [`parse`] under explicit limits.
pub fn parse_with(bytes: &[u8], options: &ParseOptions) -> Result<Value> {
    match sniff(bytes) {
        Some(format) => {
            debug!(?format, len = bytes.len(), "dispatching document");
            match format {
                Format::Binary => formats::binary::parse(bytes, options),
                Format::Xml => formats::xml::parse(bytes, options),
                Format::Notation => formats::notation::parse(bytes, options),
            }
        }
        None => Err(Error::new(ErrorKind::UnknownFormat, 0)),
    }
}

/// Decode the binary wire form.
pub fn parse_binary(bytes: &[u8]) -> Result<Value> {
    formats::binary::parse(bytes, &ParseOptions::default())
}

/// [`parse_binary`] under explicit limits.
pub fn parse_binary_with(bytes: &[u8], options: &ParseOptions) -> Result<Value> {
    formats::binary::parse(bytes, options)
}

/// Decode the XML wire form.
pub fn parse_xml(bytes: &[u8]) -> Result<Value> {
    formats::xml::parse(bytes, &ParseOptions::default())
}

/// [`parse_xml`] under explicit limits.
pub fn parse_xml_with(bytes: &[u8], options: &ParseOptions) -> Result<Value> {
    formats::xml::parse(bytes, options)
}

/// Decode the notation wire form.
pub fn parse_notation(bytes: &[u8]) -> Result<Value> {
    formats::notation::parse(bytes, &ParseOptions::default())
}

/// [`parse_notation`] under explicit limits.
pub fn parse_notation_with(bytes: &[u8], options: &ParseOptions) -> Result<Value> {
    formats::notation::parse(bytes, options)
}

/// Encode in the requested wire form (XML in its compact layout).
pub fn format(value: &Value, format: Format) -> Result<Vec<u8>> {
    match format {
        Format::Binary => format_binary(value),
        Format::Xml => format_xml(value, false),
        Format::Notation => format_notation(value),
    }
}

/// Encode the binary wire form, header line included.
pub fn format_binary(value: &Value) -> Result<Vec<u8>> {
    formats::binary::emit(value)
}

/// Encode the XML wire form; `pretty` adds indentation.
pub fn format_xml(value: &Value, pretty: bool) -> Result<Vec<u8>> {
    Ok(formats::xml::emit(value, pretty))
}

/// Encode the notation wire form.
pub fn format_notation(value: &Value) -> Result<Vec<u8>> {
    Ok(formats::notation::emit(value))
}

/// Encode the binary wire form into `sink`.
pub fn write_binary<W: Write>(sink: &mut W, value: &Value) -> Result<()> {
    let buf = format_binary(value)?;
    sink.write_all(&buf)?;
    Ok(())
}

/// Encode the XML wire form into `sink`.
pub fn write_xml<W: Write>(sink: &mut W, value: &Value, pretty: bool) -> Result<()> {
    let buf = format_xml(value, pretty)?;
    sink.write_all(&buf)?;
    Ok(())
}

/// Encode the notation wire form into `sink`.
pub fn write_notation<W: Write>(sink: &mut W, value: &Value) -> Result<()> {
    let buf = format_notation(value)?;
    sink.write_all(&buf)?;
    Ok(())
}
