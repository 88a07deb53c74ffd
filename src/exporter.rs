use crate::error::BodyError;
use crate::importer::NoteRecord;
use crate::utils::{ExportSummary, ProcessResult};
use chrono::{DateTime, TimeZone};
use clap::ValueEnum;
use eyre::{Result, eyre};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::io::Write;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// One JSON object per line.
    Jsonl,
    /// The note's plaintext followed by a newline.
    Bodytext,
}

/// What to do with a note whose plaintext cannot be extracted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorPolicy {
    /// Leave the note out and keep going.
    #[default]
    Skip,
    /// Write the note with empty text.
    Empty,
    /// Stop at the first failing note.
    Abort,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct JsonNote<'a> {
    id: i64,
    folder_name: &'a str,
    title: &'a str,
    iso_date: Option<String>,
    text: &'a str,
}

/// Local wall-clock time without an offset, e.g. `2001-01-01T00:00:00`.
pub fn iso_date<Tz: TimeZone>(dt: &DateTime<Tz>) -> String
where
    Tz::Offset: Display,
{
    dt.format("%Y-%m-%dT%H:%M:%S").to_string()
}

pub fn write_note<W: Write>(
    writer: &mut W,
    note: &NoteRecord,
    text: &str,
    format: OutputFormat,
) -> std::io::Result<()> {
    match format {
        OutputFormat::Jsonl => {
            let json = JsonNote {
                id: note.id(),
                folder_name: note.folder_name(),
                title: note.title(),
                iso_date: note.creation_date().map(|dt| iso_date(&dt)),
                text,
            };
            serde_json::to_writer(&mut *writer, &json)?;
            writeln!(writer)
        }
        OutputFormat::Bodytext => writeln!(writer, "{}", text),
    }
}

/// Write one decoded note, applying `policy` if decoding failed.
pub fn emit<W: Write>(
    writer: &mut W,
    note: &NoteRecord,
    decoded: Result<String, BodyError>,
    format: OutputFormat,
    policy: ErrorPolicy,
) -> Result<ProcessResult> {
    match decoded {
        Ok(text) => {
            write_note(writer, note, &text, format)?;
            Ok(ProcessResult::Written)
        }
        Err(e) => match policy {
            ErrorPolicy::Skip => {
                tracing::warn!(id = note.id(), title = note.title(), "Skipping note: {e}");
                Ok(ProcessResult::Skipped)
            }
            ErrorPolicy::Empty => {
                tracing::warn!(id = note.id(), title = note.title(), "Writing empty text: {e}");
                write_note(writer, note, "", format)?;
                Ok(ProcessResult::Placeholder)
            }
            ErrorPolicy::Abort => Err(eyre!(e).wrap_err(format!(
                "Failed to extract plaintext of note {} ({:?})",
                note.id(),
                note.title()
            ))),
        },
    }
}

pub fn log_summary(summary: &ExportSummary) {
    let failed = summary.failed();
    if failed > 0 {
        tracing::warn!(
            "Done. {} exported. Completed with {} error(s): {} skipped, {} written empty.",
            summary.written,
            failed,
            summary.skipped,
            summary.placeholders
        );
    } else {
        tracing::info!("Done. {} exported.", summary.written);
    }
}
