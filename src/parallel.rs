use crate::error::BodyError;
use crate::exporter::{self, ErrorPolicy, OutputFormat};
use crate::importer::{self, NoteRecord};
use crate::utils::{ExportConfig, ExportSummary};
use crossbeam_channel::{SendTimeoutError, bounded};
use eyre::{Context, Result};
use std::collections::BTreeMap;
use std::io::{BufWriter, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

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

/// Holds out-of-order results until every earlier index has arrived.
pub struct ReorderBuffer<T> {
    next: usize,
    pending: BTreeMap<usize, T>,
}

impl<T> ReorderBuffer<T> {
    pub fn new() -> Self {
        Self {
            next: 0,
            pending: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, index: usize, item: T) {
        self.pending.insert(index, item);
    }

    /// The next item in index order, if it has arrived.
    pub fn pop_ready(&mut self) -> Option<(usize, T)> {
        let item = self.pending.remove(&self.next)?;
        let index = self.next;
        self.next += 1;
        Some((index, item))
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

impl<T> Default for ReorderBuffer<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Decode `notes` on a worker pool and write them to `writer` in input order.
pub fn export_notes<W: Write>(
    notes: &[NoteRecord],
    format: OutputFormat,
    policy: ErrorPolicy,
    writer: &mut W,
) -> Result<ExportSummary> {
    let n_workers = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(8)
        .min(notes.len())
        .max(1);
    let should_stop = AtomicBool::new(false);

    std::thread::scope(|s| {
        // Channels live in this closure so an early return disconnects them
        // before the scope joins the workers.
        let (job_tx, job_rx) = bounded::<usize>(512);
        let (result_tx, result_rx) = bounded::<(usize, Result<String, BodyError>)>(512);

        for _ in 0..n_workers {
            let job_rx = job_rx.clone();
            let result_tx = result_tx.clone();
            let should_stop = &should_stop;

            s.spawn(move || {
                while let Ok(index) = job_rx.recv() {
                    if should_stop.load(Ordering::Relaxed) {
                        break;
                    }
                    let decoded = notes[index].plaintext();
                    if result_tx.send((index, decoded)).is_err() {
                        break;
                    }
                }
            });
        }

        drop(job_rx);
        drop(result_tx);

        let should_stop_feeder = &should_stop;
        s.spawn(move || {
            'outer: for index in 0..notes.len() {
                let mut pending = index;
                loop {
                    if should_stop_feeder.load(Ordering::Relaxed) {
                        break 'outer;
                    }
                    match job_tx.send_timeout(pending, Duration::from_millis(50)) {
                        Ok(()) => break,
                        Err(SendTimeoutError::Disconnected(_)) => break 'outer,
                        Err(SendTimeoutError::Timeout(r)) => {
                            pending = r;
                        }
                    }
                }
            }
        });

        let mut reorder = ReorderBuffer::new();
        let mut summary = ExportSummary::default();

        for (index, decoded) in result_rx.iter() {
            reorder.insert(index, decoded);
            while let Some((index, decoded)) = reorder.pop_ready() {
                match exporter::emit(writer, &notes[index], decoded, format, policy) {
                    Ok(result) => summary.record(result),
                    Err(e) => {
                        should_stop.store(true, Ordering::Relaxed);
                        return Err(e);
                    }
                }
            }
        }

        debug_assert!(reorder.is_empty());
        Ok(summary)
    })
}
