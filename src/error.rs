//! Per-record failures of the note-body decoder.

use std::fmt;
use thiserror::Error;

/// The structural marker a failed scan was looking for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Marker {
    /// `08 00 10 00 1a`, the header of the note-body sub-message.
    BodyHeader,
    /// The `0x12` length-delimited text field tag after the header.
    TextTag,
    /// `04 08 00 10 00 10 00 1a 04 08 00`, the empty attribute run after the text.
    AttributeRun,
}

impl fmt::Display for Marker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Marker::BodyHeader => write!(f, "body header"),
            Marker::TextTag => write!(f, "text field tag"),
            Marker::AttributeRun => write!(f, "attribute run"),
        }
    }
}

/// Failure to extract the plaintext of a single note.
///
/// None of these abort a run; the caller picks what to do with the record.
#[derive(Debug, Error)]
pub enum BodyError {
    #[error("corrupt compressed stream: {0}")]
    CorruptStream(#[source] std::io::Error),

    #[error("no plaintext found: missing {marker} marker")]
    NoPlaintextFound { marker: Marker },

    #[error("plaintext is not valid UTF-8: {0}")]
    InvalidEncoding(#[from] std::str::Utf8Error),
}

impl BodyError {
    pub(crate) fn missing(marker: Marker) -> Self {
        BodyError::NoPlaintextFound { marker }
    }
}
