use std::fs::{self, ReadDir};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use atomic_write_file::AtomicWriteFile;
use thiserror::Error;

use super::layout::RECORD_EXTENSION;
use super::models::AssetRecord;

const RETRY_BASE_DELAY: Duration = Duration::from_millis(10);
const RETRY_MAX_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("Asset not found: {0}")]
    NotFound(String),
    #[error("Invalid asset id: {0:?}")]
    InvalidId(String),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Malformed metadata for asset {id}: {source}")]
    Decode {
        id: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("Serialization error: {0}")]
    Encode(#[from] serde_json::Error),
}

/// One JSON file per asset record, named by the asset id.
pub struct MetadataStore {
    dir: PathBuf,
    io_retries: u32,
}

impl MetadataStore {
    /// Open (creating if needed) the metadata directory.
    pub fn open<P: AsRef<Path>>(dir: P, io_retries: u32) -> Result<Self, MetadataError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir, io_retries })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.{RECORD_EXTENSION}"))
    }

    /// Serialize and atomically write the record, overwriting any previous version.
    pub fn save(&self, record: &AssetRecord) -> Result<(), MetadataError> {
        if !is_valid_id(&record.id) {
            return Err(MetadataError::InvalidId(record.id.clone()));
        }
        let data = serde_json::to_vec_pretty(record)?;
        let path = self.record_path(&record.id);

        self.with_retries("save", &record.id, || {
            let mut file = AtomicWriteFile::open(&path)?;
            file.write_all(&data)?;
            file.commit()
        })?;
        Ok(())
    }

    /// Load a record by id.
    pub fn load(&self, id: &str) -> Result<AssetRecord, MetadataError> {
        if !is_valid_id(id) {
            return Err(MetadataError::NotFound(id.to_string()));
        }
        let path = self.record_path(id);

        let data = match self.with_retries("load", id, || fs::read(&path)) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(MetadataError::NotFound(id.to_string()))
            }
            Err(e) => return Err(e.into()),
        };

        serde_json::from_slice(&data).map_err(|source| MetadataError::Decode {
            id: id.to_string(),
            source,
        })
    }

    /// Remove the record file.
    pub fn remove(&self, id: &str) -> Result<(), MetadataError> {
        if !is_valid_id(id) {
            return Err(MetadataError::NotFound(id.to_string()));
        }
        match fs::remove_file(self.record_path(id)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(MetadataError::NotFound(id.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Walk every persisted record. Each call starts a fresh directory listing;
    /// entries that cannot be read or decoded are logged and skipped.
    pub fn scan_all(&self) -> Result<ScanAll<'_>, MetadataError> {
        let entries = fs::read_dir(&self.dir)?;
        Ok(ScanAll {
            store: self,
            entries,
        })
    }

    /// Run an I/O operation, retrying transient failures with exponential backoff.
    /// Not-found errors are returned immediately.
    fn with_retries<T>(
        &self,
        op: &str,
        id: &str,
        mut f: impl FnMut() -> io::Result<T>,
    ) -> io::Result<T> {
        let mut attempt = 0;
        loop {
            match f() {
                Ok(value) => return Ok(value),
                Err(e) if e.kind() == io::ErrorKind::NotFound || attempt >= self.io_retries => {
                    return Err(e)
                }
                Err(e) => {
                    let delay = retry_delay(attempt);
                    attempt += 1;
                    tracing::warn!(
                        asset_id = %id,
                        op,
                        attempt,
                        error = %e,
                        "Metadata I/O failed, retrying in {:?}",
                        delay
                    );
                    thread::sleep(delay);
                }
            }
        }
    }
}

/// Lazy iterator over `(id, record)` pairs in the metadata directory.
pub struct ScanAll<'a> {
    store: &'a MetadataStore,
    entries: ReadDir,
}

impl Iterator for ScanAll<'_> {
    type Item = (String, AssetRecord);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let entry = match self.entries.next()? {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!(error = %e, "Skipping unreadable metadata directory entry");
                    continue;
                }
            };

            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(RECORD_EXTENSION) {
                continue;
            }
            let Some(id) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if !is_valid_id(id) || !path.is_file() {
                continue;
            }

            match self.store.load(id) {
                Ok(record) if record.id == id => return Some((id.to_string(), record)),
                Ok(record) => {
                    tracing::warn!(
                        file = %path.display(),
                        record_id = %record.id,
                        "Skipping metadata file whose name does not match its id"
                    );
                }
                Err(e) => {
                    tracing::warn!(file = %path.display(), error = %e, "Skipping corrupt metadata file");
                }
            }
        }
    }
}

/// Exponential backoff from `RETRY_BASE_DELAY`, capped at `RETRY_MAX_DELAY`.
fn retry_delay(attempt: u32) -> Duration {
    RETRY_BASE_DELAY
        .saturating_mul(2u32.saturating_pow(attempt))
        .min(RETRY_MAX_DELAY)
}

/// Ids become file names, so they must not be able to escape the directory.
fn is_valid_id(id: &str) -> bool {
    !id.is_empty()
        && id != "."
        && id != ".."
        && !id.contains(['/', '\\', '\0'])
}
