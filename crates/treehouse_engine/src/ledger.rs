use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use engine_logging::{engine_debug, engine_info};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::persist::{AtomicFileWriter, PersistError};

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("ledger path {0:?} has no file name")]
    InvalidPath(PathBuf),
    #[error("failed to read ledger {path:?}: {source}")]
    Read { path: PathBuf, source: io::Error },
    #[error("failed to parse ledger {path:?}: {message}")]
    Parse { path: PathBuf, message: String },
    #[error("failed to serialize ledger: {0}")]
    Serialize(String),
    #[error("failed to write ledger: {0}")]
    Persist(#[from] PersistError),
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PersistedLedger {
    downloaded: Vec<String>,
}

/// Durable record of video URLs that were downloaded completely.
///
/// Entries are compared by exact string equality and are never removed.
/// The store does not reject duplicates; inserting a URL twice keeps both rows.
#[derive(Debug)]
pub struct DownloadLedger {
    dir: PathBuf,
    filename: String,
    entries: Vec<String>,
}

impl DownloadLedger {
    /// Open the ledger at `path`, creating an empty one if it does not exist.
    ///
    /// Opening an existing ledger never rewrites it. A ledger that exists but
    /// cannot be parsed is an error rather than being replaced.
    pub fn open(path: &Path) -> Result<Self, LedgerError> {
        let filename = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| LedgerError::InvalidPath(path.to_path_buf()))?
            .to_string();
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let mut ledger = Self {
            dir,
            filename,
            entries: Vec::new(),
        };

        match fs::read_to_string(path) {
            Ok(content) => {
                let state: PersistedLedger =
                    ron::from_str(&content).map_err(|err| LedgerError::Parse {
                        path: path.to_path_buf(),
                        message: err.to_string(),
                    })?;
                ledger.entries = state.downloaded;
                engine_info!(
                    "Loaded download ledger {:?} with {} entries",
                    path,
                    ledger.entries.len()
                );
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                ledger.save()?;
                engine_info!("Created empty download ledger {:?}", path);
            }
            Err(err) => {
                return Err(LedgerError::Read {
                    path: path.to_path_buf(),
                    source: err,
                })
            }
        }

        Ok(ledger)
    }

    pub fn contains(&self, url: &str) -> bool {
        self.entries.iter().any(|entry| entry == url)
    }

    /// Append `url` and persist the ledger. On a failed write the in-memory
    /// state is rolled back so it keeps matching the file.
    pub fn insert(&mut self, url: &str) -> Result<(), LedgerError> {
        self.entries.push(url.to_string());
        if let Err(err) = self.save() {
            self.entries.pop();
            return Err(err);
        }
        engine_debug!("Recorded {} in download ledger", url);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(&self.filename)
    }

    fn save(&self) -> Result<(), LedgerError> {
        let state = PersistedLedger {
            downloaded: self.entries.clone(),
        };
        let pretty = ron::ser::PrettyConfig::new();
        let content = ron::ser::to_string_pretty(&state, pretty)
            .map_err(|err| LedgerError::Serialize(err.to_string()))?;
        AtomicFileWriter::new(self.dir.clone()).write(&self.filename, content.as_bytes())?;
        Ok(())
    }
}
