use std::path::{Path, PathBuf};

/// Asset records: `<data_dir>/metadata/<id>.json`
pub const METADATA_DIR: &str = "metadata";

/// Extension of a single asset record file
pub const RECORD_EXTENSION: &str = "json";

/// Index snapshot: `<data_dir>/index.json`
pub const SNAPSHOT_FILE: &str = "index.json";

pub fn metadata_dir(data_dir: &Path) -> PathBuf {
    data_dir.join(METADATA_DIR)
}

pub fn snapshot_path(data_dir: &Path) -> PathBuf {
    data_dir.join(SNAPSHOT_FILE)
}
