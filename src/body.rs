//! Locates and decodes the plaintext inside a decompressed note body.
//!
//! The body is a nested, tag/length-prefixed message with no published
//! schema. Rather than parsing it, the scanner relies on two byte sequences
//! that always surround the text field:
//!
//! ```text
//! 08 00 10 00 1a  ..  12 <len>  <utf-8 text>  04 08 00 10 00 10 00 1a 04 08 00
//! \____________/      \_____/                 \_______________________________/
//!  body header        text tag                 empty attribute run
//! ```
//!
//! The length byte after the text tag is skipped, not read; the attribute run
//! bounds the payload instead.

use crate::error::{BodyError, Marker};

pub const BODY_HEADER: &[u8] = &[0x08, 0x00, 0x10, 0x00, 0x1a];
pub const TEXT_TAG: u8 = 0x12;
pub const ATTRIBUTE_RUN: &[u8] = &[
    0x04, 0x08, 0x00, 0x10, 0x00, 0x10, 0x00, 0x1a, 0x04, 0x08, 0x00,
];

/// Tag byte plus one length byte.
const TEXT_FIELD_PREFIX: usize = 2;

/// Byte range of the plaintext inside a decompressed body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaintextSpan {
    pub start: usize,
    pub end: usize,
    /// The length byte that was skipped after the text tag.
    pub length_byte: u8,
}

impl PlaintextSpan {
    /// True when the skipped length byte is the first byte of a multi-byte
    /// varint. The payload then starts one or more bytes too early.
    pub fn has_multibyte_length(&self) -> bool {
        self.length_byte & 0x80 != 0
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// First index at or after `from` where `needle` occurs in `haystack`.
pub fn find_subsequence(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if needle.is_empty() {
        return (from <= haystack.len()).then_some(from);
    }
    haystack
        .get(from..)?
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|i| i + from)
}

/// Find the plaintext span of a decompressed note body.
pub fn locate_plaintext_span(buf: &[u8]) -> Result<PlaintextSpan, BodyError> {
    let header = find_subsequence(buf, BODY_HEADER, 0)
        .ok_or_else(|| BodyError::missing(Marker::BodyHeader))?;

    let tag = find_subsequence(buf, &[TEXT_TAG], header + 1)
        .ok_or_else(|| BodyError::missing(Marker::TextTag))?;

    let start = tag + TEXT_FIELD_PREFIX;
    let end = find_subsequence(buf, ATTRIBUTE_RUN, start)
        .ok_or_else(|| BodyError::missing(Marker::AttributeRun))?;

    Ok(PlaintextSpan {
        start,
        end,
        // `start <= end <= buf.len()`, so the byte after the tag exists.
        length_byte: buf[tag + 1],
    })
}

/// Unicode whitespace plus the U+001C..U+001F separators, which existing
/// exports also strip.
fn is_trimmed(c: char) -> bool {
    c.is_whitespace() || ('\u{1c}'..='\u{1f}').contains(&c)
}

/// Decode a span as UTF-8 and trim surrounding whitespace.
pub fn decode_text(buf: &[u8], span: &PlaintextSpan) -> Result<String, BodyError> {
    let text = std::str::from_utf8(&buf[span.start..span.end])?;
    Ok(text.trim_matches(is_trimmed).to_string())
}
