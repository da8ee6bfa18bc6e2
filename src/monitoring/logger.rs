use chrono::{DateTime, SecondsFormat};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::PathBuf;
use crate::strategies::types::{Action, Observation};

/// Column order of the log file.
pub const HEADER: [&str; 11] = [
    "timestamp",
    "datetime",
    "venue_a_price",
    "venue_b_price",
    "spread",
    "action",
    "estimated_profit",
    "venue_a_volume",
    "venue_b_volume",
    "venue_a_simulated",
    "venue_b_simulated",
];

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("observation log {0:?} does not exist")]
    Missing(PathBuf),

    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error on {path:?}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("unexpected header in {path:?}: {found}")]
    HeaderMismatch { path: PathBuf, found: String },

    #[error("corrupt row at line {line} of {path:?}: {reason}")]
    Corrupt { path: PathBuf, line: u64, reason: String },
}

/// On-disk shape of one observation.
#[derive(Debug, Serialize, Deserialize)]
struct ObservationRow {
    timestamp: String,
    datetime: String,
    venue_a_price: f64,
    venue_b_price: f64,
    spread: f64,
    action: Action,
    estimated_profit: f64,
    venue_a_volume: u64,
    venue_b_volume: u64,
    venue_a_simulated: bool,
    venue_b_simulated: bool,
}

impl From<&Observation> for ObservationRow {
    fn from(obs: &Observation) -> Self {
        Self {
            timestamp: obs.captured_at.to_rfc3339_opts(SecondsFormat::Secs, false),
            datetime: obs.captured_at.format("%Y-%m-%d %H:%M").to_string(),
            venue_a_price: obs.venue_a_price,
            venue_b_price: obs.venue_b_price,
            spread: obs.spread,
            action: obs.action,
            estimated_profit: obs.estimated_profit,
            venue_a_volume: obs.venue_a_volume,
            venue_b_volume: obs.venue_b_volume,
            venue_a_simulated: obs.venue_a_simulated,
            venue_b_simulated: obs.venue_b_simulated,
        }
    }
}

impl TryFrom<ObservationRow> for Observation {
    type Error = String;

    fn try_from(row: ObservationRow) -> Result<Self, Self::Error> {
        let captured_at = DateTime::parse_from_rfc3339(&row.timestamp)
            .map_err(|e| format!("bad timestamp {:?}: {}", row.timestamp, e))?;

        Ok(Observation {
            captured_at,
            venue_a_price: row.venue_a_price,
            venue_b_price: row.venue_b_price,
            spread: row.spread,
            action: row.action,
            estimated_profit: row.estimated_profit,
            venue_a_volume: row.venue_a_volume,
            venue_b_volume: row.venue_b_volume,
            venue_a_simulated: row.venue_a_simulated,
            venue_b_simulated: row.venue_b_simulated,
        })
    }
}

/// Append-only CSV of observations, one row per sample.
pub struct ObservationLog {
    log_path: PathBuf,
}

impl ObservationLog {
    pub fn new(log_path: impl Into<PathBuf>) -> Self {
        Self {
            log_path: log_path.into(),
        }
    }

    /// Create the file with its header if it is missing or empty. Safe to call every run.
    pub fn ensure_initialized(&self) -> Result<(), StorageError> {
        let is_empty = match fs::metadata(&self.log_path) {
            Ok(meta) => meta.len() == 0,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => true,
            Err(e) => return Err(self.io_err(e)),
        };
        if !is_empty {
            return Ok(());
        }

        if let Some(parent) = self.log_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| self.io_err(e))?;
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&self.log_path)
            .map_err(|e| self.io_err(e))?;

        let mut writer = csv::Writer::from_writer(file);
        writer.write_record(HEADER).map_err(|e| self.csv_err(e))?;
        writer.flush().map_err(|e| self.io_err(e))?;

        tracing::info!("Observation log created: {}", self.log_path.display());
        Ok(())
    }

    /// Add exactly one row at the end of the file. A partial last line left by
    /// an interrupted write is terminated first so the new row stays intact.
    pub fn append(&self, observation: &Observation) -> Result<(), StorageError> {
        let mut file = OpenOptions::new()
            .read(true)
            .append(true)
            .open(&self.log_path)
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => StorageError::Missing(self.log_path.clone()),
                _ => self.io_err(e),
            })?;

        if !ends_with_newline(&mut file).map_err(|e| self.io_err(e))? {
            tracing::warn!("Observation log {} ends mid-row, terminating it", self.log_path.display());
            file.write_all(b"\n").map_err(|e| self.io_err(e))?;
        }

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);

        writer
            .serialize(ObservationRow::from(observation))
            .map_err(|e| self.csv_err(e))?;
        writer.flush().map_err(|e| self.io_err(e))?;

        Ok(())
    }

    /// All rows, in append order.
    pub fn read_all(&self) -> Result<Vec<Observation>, StorageError> {
        if !self.log_path.exists() {
            return Err(StorageError::Missing(self.log_path.clone()));
        }

        let mut reader = csv::Reader::from_path(&self.log_path).map_err(|e| self.csv_err(e))?;

        let headers = reader.headers().map_err(|e| self.csv_err(e))?.clone();
        if !headers.iter().eq(HEADER.iter().copied()) {
            return Err(StorageError::HeaderMismatch {
                path: self.log_path.clone(),
                found: headers.iter().collect::<Vec<_>>().join(","),
            });
        }

        let mut observations = Vec::new();
        for result in reader.deserialize::<ObservationRow>() {
            let row = result.map_err(|e| StorageError::Corrupt {
                path: self.log_path.clone(),
                line: e.position().map(|p| p.line()).unwrap_or(0),
                reason: e.to_string(),
            })?;
            let line = observations.len() as u64 + 2;
            let observation = Observation::try_from(row).map_err(|reason| StorageError::Corrupt {
                path: self.log_path.clone(),
                line,
                reason,
            })?;
            observations.push(observation);
        }

        Ok(observations)
    }

    /// Newest readable row, if any. Used to seed the scheduler after a restart,
    /// so unreadable rows are skipped with a warning instead of failing.
    pub fn last(&self) -> Result<Option<Observation>, StorageError> {
        if !self.log_path.exists() {
            return Err(StorageError::Missing(self.log_path.clone()));
        }

        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_path(&self.log_path)
            .map_err(|e| self.csv_err(e))?;

        let headers = reader.headers().map_err(|e| self.csv_err(e))?.clone();
        if !headers.iter().eq(HEADER.iter().copied()) {
            return Err(StorageError::HeaderMismatch {
                path: self.log_path.clone(),
                found: headers.iter().collect::<Vec<_>>().join(","),
            });
        }

        let mut last = None;
        for result in reader.records() {
            let record = match result {
                Ok(record) => record,
                Err(e) if e.is_io_error() => return Err(self.csv_err(e)),
                Err(e) => {
                    tracing::warn!("Skipping unreadable row in {}: {}", self.log_path.display(), e);
                    continue;
                }
            };
            let line = record.position().map(|p| p.line()).unwrap_or(0);

            let parsed = if record.len() == HEADER.len() {
                record
                    .deserialize::<ObservationRow>(Some(&headers))
                    .map_err(|e| e.to_string())
                    .and_then(Observation::try_from)
            } else {
                Err(format!("expected {} fields, found {}", HEADER.len(), record.len()))
            };

            match parsed {
                Ok(observation) => last = Some(observation),
                Err(reason) => tracing::warn!(
                    "Skipping corrupt row at line {} of {}: {}",
                    line,
                    self.log_path.display(),
                    reason
                ),
            }
        }

        Ok(last)
    }

    fn io_err(&self, source: std::io::Error) -> StorageError {
        StorageError::Io {
            path: self.log_path.clone(),
            source,
        }
    }

    fn csv_err(&self, source: csv::Error) -> StorageError {
        StorageError::Csv {
            path: self.log_path.clone(),
            source,
        }
    }
}

fn ends_with_newline(file: &mut File) -> std::io::Result<bool> {
    if file.metadata()?.len() == 0 {
        return Ok(true);
    }
    file.seek(SeekFrom::End(-1))?;
    let mut byte = [0u8; 1];
    file.read_exact(&mut byte)?;
    Ok(byte[0] == b'\n')
}
