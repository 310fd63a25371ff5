use std::io::{Read, Write};
use tracing::{debug, info, warn};

use crate::errors::CoreError;
use crate::models::transaction::TransactionRow;

use super::format::{self, SchemaVersion};

/// Result of reading a transaction file.
#[derive(Debug, Default)]
pub struct LoadedLedger {
    /// Rows that decoded cleanly, in file order
    pub rows: Vec<TransactionRow>,

    /// Layout the file was written in, `None` for a missing or empty file
    pub version: Option<SchemaVersion>,

    /// One error per row that could not be decoded and was skipped
    pub skipped: Vec<CoreError>,
}

impl LoadedLedger {
    /// `true` when the file predates the current layout and the next save
    /// will rewrite it.
    pub fn needs_migration(&self) -> bool {
        self.version.is_some_and(|v| v != SchemaVersion::CURRENT)
    }
}

/// Flat-file CSV store for the transaction ledger.
///
/// Every save rewrites the whole file in the current layout; loads accept
/// every older layout and backfill the columns it lacks.
pub struct TransactionStore;

impl TransactionStore {
    /// Read a ledger from any CSV source.
    ///
    /// An unrecognized header fails the whole load; a malformed row is
    /// skipped (and reported in `LoadedLedger::skipped`) so one bad line
    /// never hides the rest of the portfolio.
    pub fn load_from_reader<R: Read>(reader: R) -> Result<LoadedLedger, CoreError> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let header = rdr.headers()?.clone();
        if header.iter().all(|h| h.trim().is_empty()) {
            return Ok(LoadedLedger::default());
        }
        let version = SchemaVersion::detect(&header)?;

        let mut ledger = LoadedLedger {
            version: Some(version),
            ..LoadedLedger::default()
        };

        for result in rdr.records() {
            let record = match result {
                Ok(record) => record,
                Err(e) => {
                    warn!(error = %e, "skipping unreadable transaction row");
                    ledger.skipped.push(e.into());
                    continue;
                }
            };
            if record.iter().all(|f| f.trim().is_empty()) {
                continue;
            }

            let line = record.position().map(|p| p.line()).unwrap_or_default();
            match format::decode_row(&record, version, line) {
                Ok(row) => ledger.rows.push(row),
                Err(e) => {
                    warn!(line, error = %e, "skipping malformed transaction row");
                    ledger.skipped.push(e);
                }
            }
        }

        debug!(
            rows = ledger.rows.len(),
            skipped = ledger.skipped.len(),
            %version,
            "loaded transactions"
        );
        Ok(ledger)
    }

    /// Read a ledger from CSV text.
    pub fn load_from_str(data: &str) -> Result<LoadedLedger, CoreError> {
        Self::load_from_reader(data.as_bytes())
    }

    /// Write the full ledger, header first, in the current layout.
    pub fn save_to_writer<W: Write>(rows: &[TransactionRow], writer: W) -> Result<(), CoreError> {
        let mut wtr = csv::Writer::from_writer(writer);
        wtr.write_record(SchemaVersion::CURRENT.columns())?;
        for row in rows {
            wtr.write_record(format::encode_row(row))?;
        }
        wtr.flush()?;
        Ok(())
    }

    /// Serialize the full ledger to CSV text.
    pub fn save_to_string(rows: &[TransactionRow]) -> Result<String, CoreError> {
        let mut buf = Vec::new();
        Self::save_to_writer(rows, &mut buf)?;
        String::from_utf8(buf)
            .map_err(|e| CoreError::Serialization(format!("Transaction CSV is not UTF-8: {e}")))
    }

    /// Load the ledger from a file on disk (native only).
    /// A missing file is an empty ledger, not an error.
    #[cfg(not(target_arch = "wasm32"))]
    pub fn load_from_file(path: &str) -> Result<LoadedLedger, CoreError> {
        match std::fs::File::open(path) {
            Ok(file) => Self::load_from_reader(std::io::BufReader::new(file)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path, "no transaction file yet");
                Ok(LoadedLedger::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Overwrite the file on disk with the full ledger (native only).
    ///
    /// Writes to a sibling temp file first and renames it into place, so an
    /// interrupted save leaves the previous file intact.
    #[cfg(not(target_arch = "wasm32"))]
    pub fn save_to_file(rows: &[TransactionRow], path: &str) -> Result<(), CoreError> {
        let tmp_path = format!("{path}.tmp");
        {
            let file = std::fs::File::create(&tmp_path)?;
            Self::save_to_writer(rows, std::io::BufWriter::new(file))?;
        }
        std::fs::rename(&tmp_path, path)?;
        info!(path, rows = rows.len(), "saved transactions");
        Ok(())
    }
}
