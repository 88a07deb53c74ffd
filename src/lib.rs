//! # notes-body-export
//!
//! A CLI tool that exports the plaintext bodies of notes from the desktop
//! notes application's local database (`NoteStore.sqlite`).
//!
//! ## What it does
//!
//! The application stores each note body as a gzip-compressed blob holding an
//! undocumented, tag/length-prefixed binary message. This tool reads the
//! database, inflates each blob, finds the plaintext between two fixed byte
//! markers, and writes one record per note to standard output, either as
//! line-delimited JSON or as bare body text.
//!
//! The database is opened **read-only**. Your notes are never modified.
//!
//! ## Usage
//!
//! ```sh
//! # JSON lines with id, folderName, title, isoDate and text
//! notes-body-export -o jsonl > notes.jsonl
//!
//! # Only the bodies, from a copied database, stopping on the first bad note
//! notes-body-export -o bodytext -i ./NoteStore.sqlite --on-error abort
//! ```
//!
//! Preferences can be persisted in `~/.config/notes-body-export/config.toml`.
//!
//! ## Compatibility
//!
//! Tracks the application's internal (undocumented) schema and body format.
//! Notes whose body does not carry the expected markers are reported and,
//! by default, skipped.
pub mod body;
pub mod error;
pub mod exporter;
pub mod importer;
pub mod parallel;
#[cfg(feature = "sequential")]
pub mod sequential;
pub mod utils;

pub use error::{BodyError, Marker};
pub use importer::NoteRecord;
