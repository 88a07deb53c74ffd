use crate::exporter::{self, ErrorPolicy, OutputFormat};
use crate::importer::{self, NoteRecord};
use crate::utils::{ExportConfig, ExportSummary};
use eyre::{Context, Result};
use std::io::{BufWriter, Write};

/// The main entry point for the single-threaded export.
pub fn execute(config: ExportConfig) -> Result<()> {
    let notes = importer::load_notes(&config)?;
    tracing::info!("Found {} notes.", notes.len());

    let stdout = std::io::stdout();
    let mut writer = BufWriter::new(stdout.lock());
    let summary = export_notes(&notes, config.format, config.on_error, &mut writer)?;
    writer.flush().wrap_err("Failed to flush output")?;

    exporter::log_summary(&summary);
    Ok(())
}

/// Decode and write each note in turn.
pub fn export_notes<W: Write>(
    notes: &[NoteRecord],
    format: OutputFormat,
    policy: ErrorPolicy,
    writer: &mut W,
) -> Result<ExportSummary> {
    let mut summary = ExportSummary::default();
    for note in notes {
        let result = exporter::emit(writer, note, note.plaintext(), format, policy)?;
        summary.record(result);
    }
    Ok(summary)
}
