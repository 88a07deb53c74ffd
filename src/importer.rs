//! Note records as read from the host application's Core Data store.
//!
//! Storage format: gzip-compressed, tag/length-prefixed message blobs in
//! `ZICNOTEDATA.ZDATA`. Note metadata lives in `ZICCLOUDSYNCINGOBJECT`,
//! which also holds folders.
//!
//! Tables touched (only the columns read here):
//! ```sql
//! ZICCLOUDSYNCINGOBJECT (
//!     Z_PK            INTEGER PRIMARY KEY,
//!     Z_ENT           INTEGER,   -- entity type, 8/9 for notes
//!     ZFOLDER         INTEGER,   -- -> ZICCLOUDSYNCINGOBJECT.Z_PK
//!     ZNOTEDATA       INTEGER,   -- -> ZICNOTEDATA.Z_PK
//!     ZCREATIONDATE1  TIMESTAMP, -- seconds since 2001-01-01T00:00:00Z
//!     ZTITLE1         VARCHAR,   -- note title
//!     ZTITLE2         VARCHAR    -- folder title
//! );
//! ZICNOTEDATA (
//!     Z_PK   INTEGER PRIMARY KEY,
//!     ZDATA  BLOB
//! );
//! ```

use crate::body;
use crate::error::BodyError;
use crate::utils::{self, ExportConfig};
use chrono::{DateTime, Local, TimeZone};
use eyre::{Context, Result};
use rusqlite::{Connection, params_from_iter};

/// A single note row. Immutable once read; the plaintext is derived on demand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteRecord {
    id: i64,
    folder_name: String,
    title: String,
    creation_timestamp: i64,
    raw_body: Vec<u8>,
}

impl NoteRecord {
    pub fn new(
        id: i64,
        folder_name: impl Into<String>,
        title: impl Into<String>,
        creation_timestamp: i64,
        raw_body: Vec<u8>,
    ) -> Self {
        Self {
            id,
            folder_name: folder_name.into(),
            title: title.into(),
            creation_timestamp,
            raw_body,
        }
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn folder_name(&self) -> &str {
        &self.folder_name
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    /// Seconds since 2001-01-01T00:00:00Z.
    pub fn creation_timestamp(&self) -> i64 {
        self.creation_timestamp
    }

    pub fn raw_body(&self) -> &[u8] {
        &self.raw_body
    }

    /// Decode the note's plaintext body.
    ///
    /// A body that decompresses to nothing is an empty note, not an error.
    /// Every call recomputes from `raw_body`.
    pub fn plaintext(&self) -> Result<String, BodyError> {
        let data = utils::decompress(&self.raw_body)?;
        if data.is_empty() {
            return Ok(String::new());
        }
        let span = body::locate_plaintext_span(&data)?;
        if span.has_multibyte_length() {
            tracing::warn!(
                id = self.id,
                length_byte = span.length_byte,
                "text length prefix spans several bytes, payload may start early"
            );
        }
        body::decode_text(&data, &span)
    }

    /// Creation time in the local time zone.
    pub fn creation_date(&self) -> Option<DateTime<Local>> {
        self.creation_date_in(&Local)
    }

    pub fn creation_date_in<Tz: TimeZone>(&self, tz: &Tz) -> Option<DateTime<Tz>> {
        utils::vendor_timestamp(self.creation_timestamp, tz)
    }
}

const NOTES_QUERY: &str = "
SELECT
  Z.Z_PK,
  F.ZTITLE2,
  D.ZDATA,
  CAST(Z.ZCREATIONDATE1 AS INTEGER),
  Z.ZTITLE1
FROM
  ZICCLOUDSYNCINGOBJECT AS Z
  INNER JOIN ZICCLOUDSYNCINGOBJECT AS F ON Z.ZFOLDER = F.Z_PK
  INNER JOIN ZICNOTEDATA AS D ON Z.ZNOTEDATA = D.Z_PK
WHERE
  Z.Z_ENT IN";

/// Read every note row whose entity type is in `entity_types`.
///
/// Rows come back in the store's order. Missing titles, folder names and
/// bodies read as empty; a missing creation date reads as the vendor epoch.
pub fn read_notes(conn: &Connection, entity_types: &[i64]) -> Result<Vec<NoteRecord>> {
    if entity_types.is_empty() {
        return Ok(Vec::new());
    }
    let placeholders = vec!["?"; entity_types.len()].join(", ");
    let sql = format!("{NOTES_QUERY} ({placeholders})");

    let mut stmt = conn.prepare(&sql).wrap_err("Failed to prepare notes query")?;
    let rows = stmt
        .query_map(params_from_iter(entity_types.iter()), |row| {
            Ok(NoteRecord::new(
                row.get(0)?,
                row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                row.get::<_, Option<String>>(4)?.unwrap_or_default(),
                row.get::<_, Option<i64>>(3)?.unwrap_or_default(),
                row.get::<_, Option<Vec<u8>>>(2)?.unwrap_or_default(),
            ))
        })
        .wrap_err("Failed to execute notes query")?;

    rows.collect::<rusqlite::Result<Vec<_>>>()
        .wrap_err("Failed to read note row")
}

/// Open the configured store, read all notes, and release the connection.
pub fn load_notes(config: &ExportConfig) -> Result<Vec<NoteRecord>> {
    if !config.snapshot {
        let conn = utils::open_db(&config.db_path)?;
        return read_notes(&conn, &config.entity_types);
    }

    let snapshot = utils::backup_database(&config.db_path, config.quiet)?;
    tracing::debug!(path = %snapshot.path().display(), "Reading from snapshot");
    let conn = utils::open_db(snapshot.path())?;
    read_notes(&conn, &config.entity_types)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::{ATTRIBUTE_RUN, BODY_HEADER};
    use crate::error::Marker;
    use chrono::{FixedOffset, Utc};
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::io::Write;

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    fn note_body(text: &str) -> Vec<u8> {
        let mut buf = BODY_HEADER.to_vec();
        buf.extend_from_slice(&[0x22, 0x12, text.len() as u8]);
        buf.extend_from_slice(text.as_bytes());
        buf.extend_from_slice(ATTRIBUTE_RUN);
        gzip(&buf)
    }

    #[test]
    fn plaintext_of_hello_world() {
        let note = NoteRecord::new(1, "Notes", "Greeting", 0, note_body("Hello world"));
        assert_eq!(note.plaintext().unwrap(), "Hello world");
    }

    #[test]
    fn plaintext_is_idempotent() {
        let note = NoteRecord::new(1, "Notes", "", 0, note_body("  same twice \n"));
        let first = note.plaintext().unwrap();
        let second = note.plaintext().unwrap();
        assert_eq!(first, "same twice");
        assert_eq!(first, second);
    }

    #[test]
    fn empty_decompression_is_empty_text() {
        let note = NoteRecord::new(2, "Notes", "Blank", 0, gzip(b""));
        assert_eq!(note.plaintext().unwrap(), "");
    }

    #[test]
    fn corrupt_blob_fails_only_this_record() {
        let bad = NoteRecord::new(3, "Notes", "Bad", 0, b"garbage".to_vec());
        let good = NoteRecord::new(4, "Notes", "Good", 0, note_body("fine"));
        assert!(matches!(bad.plaintext(), Err(BodyError::CorruptStream(_))));
        assert_eq!(good.plaintext().unwrap(), "fine");
    }

    #[test]
    fn long_note_keeps_second_length_byte() {
        // 200 encodes as the two-byte varint c8 01; only c8 is skipped.
        let text = "a".repeat(200);
        let mut data = BODY_HEADER.to_vec();
        data.extend_from_slice(&[0x00, 0x12, 0xc8, 0x01]);
        data.extend_from_slice(text.as_bytes());
        data.extend_from_slice(ATTRIBUTE_RUN);
        let note = NoteRecord::new(6, "Notes", "Long", 0, gzip(&data));

        let plaintext = note.plaintext().unwrap();
        assert_eq!(plaintext, format!("\u{1}{text}"));
        assert_eq!(note.plaintext().unwrap(), plaintext);
    }

    #[test]
    fn missing_markers_surface_as_errors() {
        let mut data = BODY_HEADER.to_vec();
        data.extend_from_slice(&[0x00, 0x12, 0x05]);
        data.extend_from_slice(b"words");
        let note = NoteRecord::new(5, "Notes", "", 0, gzip(&data));
        assert!(matches!(
            note.plaintext(),
            Err(BodyError::NoPlaintextFound {
                marker: Marker::AttributeRun
            })
        ));
    }

    #[test]
    fn creation_date_at_vendor_epoch() {
        let note = NoteRecord::new(1, "Notes", "", 0, Vec::new());
        let utc = note.creation_date_in(&Utc).unwrap();
        assert_eq!(utc.format("%Y-%m-%dT%H:%M:%S").to_string(), "2001-01-01T00:00:00");

        let tz = FixedOffset::west_opt(5 * 3600).unwrap();
        let local = note.creation_date_in(&tz).unwrap();
        assert_eq!(local.format("%Y-%m-%dT%H:%M:%S").to_string(), "2000-12-31T19:00:00");
        assert_eq!(local, utc);

        let here = note.creation_date().unwrap();
        assert_eq!(here.timestamp(), utils::VENDOR_EPOCH_OFFSET);
    }

    #[test]
    fn read_notes_with_no_entity_types() {
        let conn = Connection::open_in_memory().unwrap();
        assert!(read_notes(&conn, &[]).unwrap().is_empty());
    }
}
