use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use thiserror::Error;

use super::cache::LruCache;
use super::index::{IndexError, IndexSet, RebuildStats};
use super::layout;
use super::metadata::{MetadataError, MetadataStore};
use super::models::{AssetRecord, AssetUpdate, NewAsset};
use super::query::{self, AssetQuery, PageLimits, QueryResult, SortKey};

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error(transparent)]
    Metadata(#[from] MetadataError),
    #[error(transparent)]
    Index(#[from] IndexError),
}

impl CatalogError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, CatalogError::Metadata(MetadataError::NotFound(_)))
    }
}

/// Settings the catalog needs at open time.
#[derive(Debug, Clone)]
pub struct CatalogOptions {
    pub data_dir: PathBuf,
    pub cache_capacity: usize,
    pub io_retries: u32,
    pub page_limits: PageLimits,
}

impl CatalogOptions {
    pub fn new<P: AsRef<Path>>(data_dir: P) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
            cache_capacity: 1000,
            io_retries: 2,
            page_limits: PageLimits::default(),
        }
    }
}

/// Point-in-time counters for health reporting.
#[derive(Debug, Clone, Serialize)]
pub struct CatalogStats {
    pub records: usize,
    pub cache_entries: usize,
    pub cache_capacity: usize,
    pub dirty: bool,
}

/// The asset metadata store: authoritative JSON records on disk, derived
/// indexes and a record cache in memory.
///
/// Locking:
/// - `writer` serializes every mutation, including a rebuild scan. Reads never
///   take it.
/// - `indexes` is shared for queries and exclusive only while an index
///   mutation or a rebuild swap is applied.
/// - `cache` is held for a single operation and is always acquired after
///   `indexes`, never before.
pub struct Catalog {
    store: MetadataStore,
    snapshot_path: PathBuf,
    writer: Mutex<()>,
    indexes: RwLock<IndexSet>,
    cache: Mutex<LruCache<String, Arc<AssetRecord>>>,
    dirty: AtomicBool,
    page_limits: PageLimits,
}

impl Catalog {
    /// Open the catalog, loading the index snapshot or rebuilding it from the
    /// metadata files when the snapshot is missing or unreadable.
    pub fn open(options: CatalogOptions) -> Result<Self, CatalogError> {
        std::fs::create_dir_all(&options.data_dir).map_err(MetadataError::from)?;
        let store = MetadataStore::open(
            layout::metadata_dir(&options.data_dir),
            options.io_retries,
        )?;
        let snapshot_path = layout::snapshot_path(&options.data_dir);

        let (indexes, dirty) = match IndexSet::load(&snapshot_path) {
            Ok(indexes) => {
                tracing::info!(records = indexes.len(), "Loaded index snapshot");
                (indexes, false)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Could not load index snapshot, rebuilding");
                let (indexes, _) = IndexSet::build(&store)?;
                (indexes, true)
            }
        };

        Ok(Self {
            store,
            snapshot_path,
            writer: Mutex::new(()),
            indexes: RwLock::new(indexes),
            cache: Mutex::new(LruCache::new(options.cache_capacity)),
            dirty: AtomicBool::new(dirty),
            page_limits: options.page_limits,
        })
    }

    pub fn page_limits(&self) -> PageLimits {
        self.page_limits
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::Release);
    }

    pub fn stats(&self) -> CatalogStats {
        let records = self.indexes.read().len();
        let cache = self.cache.lock();
        CatalogStats {
            records,
            cache_entries: cache.len(),
            cache_capacity: cache.capacity(),
            dirty: self.is_dirty(),
        }
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Persist a newly ingested asset and index it.
    pub fn create(&self, asset: NewAsset) -> Result<AssetRecord, CatalogError> {
        let record = asset.into_record(uuid::Uuid::new_v4().to_string(), Utc::now());

        let _writer = self.writer.lock();
        self.store.save(&record)?;

        let mut indexes = self.indexes.write();
        indexes.insert(&record);
        self.cache
            .lock()
            .put(record.id.clone(), Arc::new(record.clone()));
        drop(indexes);
        self.mark_dirty();

        tracing::debug!(asset_id = %record.id, user_id = record.user_id, "Created asset");
        Ok(record)
    }

    /// Apply a partial update. The current version is read from disk rather
    /// than the cache so the index diff is computed against durable state.
    pub fn update(&self, id: &str, update: &AssetUpdate) -> Result<AssetRecord, CatalogError> {
        let _writer = self.writer.lock();
        let current = self.store.load(id)?;
        let updated = update.apply_to(&current, Utc::now());
        self.store.save(&updated)?;

        let mut indexes = self.indexes.write();
        if indexes.apply_update(&current, &updated) {
            self.mark_dirty();
        }
        self.cache
            .lock()
            .put(updated.id.clone(), Arc::new(updated.clone()));
        drop(indexes);

        tracing::debug!(asset_id = %id, "Updated asset");
        Ok(updated)
    }

    /// Remove an asset's metadata file and every index and cache reference to it.
    pub fn delete(&self, id: &str) -> Result<AssetRecord, CatalogError> {
        let _writer = self.writer.lock();
        let record = self.store.load(id)?;
        self.store.remove(id)?;

        let mut indexes = self.indexes.write();
        indexes.remove(&record);
        self.cache.lock().remove(&record.id);
        drop(indexes);
        self.mark_dirty();

        tracing::debug!(asset_id = %id, "Deleted asset");
        Ok(record)
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Fetch a record through the cache, falling back to the metadata store.
    pub fn get(&self, id: &str) -> Result<Arc<AssetRecord>, CatalogError> {
        let _indexes = self.indexes.read();
        self.load_cached(id)
    }

    /// Cache lookup with store fallback. The caller must hold the index lock
    /// (shared is enough) so a stale disk read cannot overwrite a newer cache
    /// entry installed by a concurrent writer.
    fn load_cached(&self, id: &str) -> Result<Arc<AssetRecord>, CatalogError> {
        let key = id.to_string();
        if let Some(record) = self.cache.lock().get(&key) {
            return Ok(record);
        }
        let record = Arc::new(self.store.load(id)?);
        self.cache.lock().put(key, Arc::clone(&record));
        Ok(record)
    }

    /// Run a structured query: seed candidates from one index, re-check every
    /// predicate against the loaded records, sort, then paginate.
    pub fn query(&self, query: &AssetQuery) -> Result<QueryResult, CatalogError> {
        let started = std::time::Instant::now();
        let indexes = self.indexes.read();
        let candidates = query::select_candidates(&indexes, query);

        let mut matched = Vec::with_capacity(candidates.len());
        for id in &candidates {
            match self.load_cached(id) {
                Ok(record) if query.matches(&record) => matched.push(record),
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(asset_id = %id, error = %e, "Skipping indexed asset that failed to load");
                }
            }
        }
        drop(indexes);

        query::sort_records(&mut matched, query.order_by, query.order_desc);
        let result = query::paginate(matched, query, self.page_limits);

        tracing::debug!(
            candidates = candidates.len(),
            total = result.total_count,
            returned = result.assets.len(),
            elapsed_us = started.elapsed().as_micros() as u64,
            "Query executed"
        );
        Ok(result)
    }

    /// Free-text search over display names, ordered by id.
    pub fn search(&self, text: &str) -> Result<Vec<Arc<AssetRecord>>, CatalogError> {
        let query = AssetQuery {
            text_search: Some(text.to_string()),
            limit: i64::try_from(self.page_limits.max_size).unwrap_or(i64::MAX),
            ..Default::default()
        };
        Ok(self.query(&query)?.assets)
    }

    /// Newest assets matching both flags.
    pub fn favorites_by_visibility(
        &self,
        favorite: bool,
        hidden: bool,
        limit: i64,
    ) -> Result<Vec<Arc<AssetRecord>>, CatalogError> {
        let query = AssetQuery {
            is_favorite: Some(favorite),
            is_hidden: Some(hidden),
            limit,
            order_by: Some(SortKey::Date),
            order_desc: true,
            ..Default::default()
        };
        Ok(self.query(&query)?.assets)
    }

    /// Newest assets shot with `camera_model`.
    pub fn by_camera_model(
        &self,
        camera_model: &str,
        hidden: bool,
        limit: i64,
    ) -> Result<Vec<Arc<AssetRecord>>, CatalogError> {
        let query = AssetQuery {
            camera_model: Some(camera_model.to_string()),
            is_hidden: Some(hidden),
            limit,
            order_by: Some(SortKey::Date),
            order_desc: true,
            ..Default::default()
        };
        Ok(self.query(&query)?.assets)
    }

    /// Ids currently referenced by the given token in the text index.
    pub fn text_index_ids(&self, token: &str) -> Vec<String> {
        self.indexes.read().token_ids(token).to_vec()
    }

    /// Copy of the live index set, for consistency checks.
    pub fn index_snapshot(&self) -> IndexSet {
        self.indexes.read().clone()
    }

    // ========================================================================
    // Maintenance
    // ========================================================================

    /// Rebuild every index from the metadata files. The replacement is built
    /// while the current indexes keep serving queries and is swapped in under
    /// a short exclusive lock; writers wait for the whole rebuild.
    pub fn rebuild_indexes(&self) -> Result<RebuildStats, CatalogError> {
        let _writer = self.writer.lock();
        tracing::info!("Starting index rebuild");
        let (fresh, stats) = IndexSet::build(&self.store)?;

        *self.indexes.write() = fresh;
        self.mark_dirty();
        Ok(stats)
    }

    /// Write the index snapshot if anything changed since the last flush.
    /// Returns whether a snapshot was written.
    pub fn flush_snapshot(&self) -> Result<bool, CatalogError> {
        if !self.dirty.swap(false, Ordering::AcqRel) {
            return Ok(false);
        }

        let result = {
            let indexes = self.indexes.read();
            indexes.save(&self.snapshot_path)
        };
        if let Err(e) = result {
            self.mark_dirty();
            return Err(e.into());
        }

        tracing::info!(path = %self.snapshot_path.display(), "Index snapshot saved");
        Ok(true)
    }
}
