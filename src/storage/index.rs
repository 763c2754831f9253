//! In-memory lookup structures derived from the metadata store.
//!
//! The indexes are never authoritative: every query re-checks candidates
//! against the loaded records, and a full rebuild from the metadata store is
//! the only repair path for drift.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::io::{self, Write};
use std::ops::Bound;
use std::path::Path;
use std::time::Instant;

use atomic_write_file::AtomicWriteFile;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize, Serializer};
use thiserror::Error;

use super::metadata::MetadataStore;
use super::models::{tokenize, AssetRecord};

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("Index snapshot unusable: {0}")]
    State(String),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Serialization error: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Counters reported by a full rebuild.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RebuildStats {
    pub records: u64,
}

/// The six asset indexes. Serialized as-is to form the snapshot file.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexSet {
    /// id -> storage filename
    asset_index: HashMap<String, String>,
    /// owner -> ids in insertion order
    user_index: HashMap<i64, PostingList>,
    /// `YYYY-MM-DD` -> ids; ordered so date ranges are range scans
    date_index: BTreeMap<String, PostingList>,
    /// token -> ids
    text_index: HashMap<String, PostingList>,
    favorite_index: HashMap<String, bool>,
    hidden_index: HashMap<String, bool>,
}

impl IndexSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a fresh index set from every readable record in `store`.
    pub fn build(store: &MetadataStore) -> Result<(Self, RebuildStats), IndexError> {
        let started = Instant::now();
        let mut index = Self::new();
        let mut stats = RebuildStats::default();

        let scan = store
            .scan_all()
            .map_err(|e| IndexError::State(format!("cannot scan metadata: {e}")))?;
        for (_, record) in scan {
            index.insert(&record);
            stats.records += 1;
            if stats.records % 5000 == 0 {
                tracing::debug!(records = stats.records, "Index rebuild progress");
            }
        }

        tracing::info!(
            records = stats.records,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Index rebuild completed"
        );
        Ok((index, stats))
    }

    pub fn len(&self) -> usize {
        self.asset_index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.asset_index.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.asset_index.contains_key(id)
    }

    pub fn filename(&self, id: &str) -> Option<&str> {
        self.asset_index.get(id).map(String::as_str)
    }

    // ========================================================================
    // Mutation
    // ========================================================================

    /// Add a record to every index. Re-inserting an id does not duplicate it.
    pub fn insert(&mut self, record: &AssetRecord) {
        let id = &record.id;
        self.asset_index.insert(id.clone(), record.filename.clone());
        self.user_index.entry(record.user_id).or_default().push(id);
        self.date_index.entry(record.day_key()).or_default().push(id);
        for token in tokenize(&record.named) {
            self.text_index.entry(token).or_default().push(id);
        }
        self.favorite_index.insert(id.clone(), record.is_favorite);
        self.hidden_index.insert(id.clone(), record.is_hidden);
    }

    /// Reconcile the indexes after `old` was replaced by `new`. Only indexes
    /// whose source field changed are touched. Returns whether anything changed.
    pub fn apply_update(&mut self, old: &AssetRecord, new: &AssetRecord) -> bool {
        debug_assert_eq!(old.id, new.id, "update must not change the asset id");
        let id = &new.id;
        let mut changed = false;

        if old.named != new.named {
            let old_tokens = tokenize(&old.named);
            let new_tokens = tokenize(&new.named);
            for token in old_tokens.iter().filter(|t| !new_tokens.contains(*t)) {
                self.text_index.remove_id(token, id);
            }
            for token in new_tokens {
                self.text_index.entry(token).or_default().push(id);
            }
            changed = true;
        }

        if old.is_favorite != new.is_favorite {
            self.favorite_index.insert(id.clone(), new.is_favorite);
            changed = true;
        }

        if old.is_hidden != new.is_hidden {
            self.hidden_index.insert(id.clone(), new.is_hidden);
            changed = true;
        }

        changed
    }

    /// Excise a record from every index.
    pub fn remove(&mut self, record: &AssetRecord) {
        let id = &record.id;
        self.asset_index.remove(id);
        self.user_index.remove_id(&record.user_id, id);
        self.date_index.remove_id(&record.day_key(), id);
        for token in tokenize(&record.named) {
            self.text_index.remove_id(&token, id);
        }
        self.favorite_index.remove(id);
        self.hidden_index.remove(id);
    }

    // ========================================================================
    // Candidate lookups
    // ========================================================================

    pub fn all_ids(&self) -> BTreeSet<String> {
        self.asset_index.keys().cloned().collect()
    }

    pub fn ids_for_user(&self, user_id: i64) -> BTreeSet<String> {
        self.user_index
            .get(&user_id)
            .map(|ids| ids.as_slice().iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Ids created on any day in `[start, end]`. Either bound may be open.
    pub fn ids_for_date_range(
        &self,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> BTreeSet<String> {
        if let (Some(start), Some(end)) = (start, end) {
            if start > end {
                return BTreeSet::new();
            }
        }

        let lower = start.map_or(Bound::Unbounded, |d| Bound::Included(day_key(d)));
        let upper = end.map_or(Bound::Unbounded, |d| Bound::Included(day_key(d)));
        self.date_index
            .range((lower, upper))
            .flat_map(|(_, ids)| ids.as_slice().iter().cloned())
            .collect()
    }

    /// Ids whose name contains every token of `text`.
    pub fn ids_for_text(&self, text: &str) -> BTreeSet<String> {
        let tokens = tokenize(text);
        let mut lists = Vec::with_capacity(tokens.len());
        for token in &tokens {
            match self.text_index.get(token) {
                Some(ids) => lists.push(ids),
                None => return BTreeSet::new(),
            }
        }
        // Intersect starting from the shortest posting list
        lists.sort_by_key(|ids| ids.len());
        let Some((first, rest)) = lists.split_first() else {
            return BTreeSet::new();
        };
        first
            .as_slice()
            .iter()
            .filter(|id| rest.iter().all(|ids| ids.contains(id.as_str())))
            .cloned()
            .collect()
    }

    pub fn ids_with_favorite(&self, favorite: bool) -> BTreeSet<String> {
        flag_matches(&self.favorite_index, favorite)
    }

    pub fn ids_with_hidden(&self, hidden: bool) -> BTreeSet<String> {
        flag_matches(&self.hidden_index, hidden)
    }

    /// Ids referenced by a single text token (empty if the token is unknown).
    pub fn token_ids(&self, token: &str) -> &[String] {
        self.text_index
            .get(token)
            .map(PostingList::as_slice)
            .unwrap_or(&[])
    }

    // ========================================================================
    // Snapshot persistence
    // ========================================================================

    /// Write every index to a single JSON snapshot file.
    pub fn save(&self, path: &Path) -> Result<(), IndexError> {
        let data = serde_json::to_vec_pretty(self)?;
        let mut file = AtomicWriteFile::open(path)?;
        file.write_all(&data)?;
        file.commit()?;
        Ok(())
    }

    /// Read a snapshot. Any failure means the caller must rebuild from the
    /// metadata store.
    pub fn load(path: &Path) -> Result<Self, IndexError> {
        let data = std::fs::read(path).map_err(|e| {
            IndexError::State(format!("cannot read snapshot {}: {e}", path.display()))
        })?;
        serde_json::from_slice(&data).map_err(|e| {
            IndexError::State(format!("cannot parse snapshot {}: {e}", path.display()))
        })
    }
}

fn day_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn flag_matches(index: &HashMap<String, bool>, wanted: bool) -> BTreeSet<String> {
    index
        .iter()
        .filter(|(_, &flag)| flag == wanted)
        .map(|(id, _)| id.clone())
        .collect()
}

/// Ids in append order, with a hashed membership set alongside so inserts
/// and intersections stay O(1) per id. Serialized as a plain array; equality
/// ignores order, since a rebuild visits records in directory order.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(from = "Vec<String>")]
struct PostingList {
    ids: Vec<String>,
    members: HashSet<String>,
}

impl PostingList {
    /// Append `id` unless it is already present.
    fn push(&mut self, id: &str) -> bool {
        if self.members.contains(id) {
            return false;
        }
        self.members.insert(id.to_string());
        self.ids.push(id.to_string());
        true
    }

    fn remove(&mut self, id: &str) -> bool {
        if !self.members.remove(id) {
            return false;
        }
        if let Some(pos) = self.ids.iter().position(|existing| existing == id) {
            self.ids.remove(pos);
        }
        true
    }

    fn contains(&self, id: &str) -> bool {
        self.members.contains(id)
    }

    fn len(&self) -> usize {
        self.ids.len()
    }

    fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    fn as_slice(&self) -> &[String] {
        &self.ids
    }
}

impl From<Vec<String>> for PostingList {
    fn from(ids: Vec<String>) -> Self {
        let mut list = Self::default();
        for id in &ids {
            list.push(id);
        }
        list
    }
}

impl Serialize for PostingList {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.ids.serialize(serializer)
    }
}

impl PartialEq for PostingList {
    fn eq(&self, other: &Self) -> bool {
        self.members == other.members
    }
}

/// Maps from a key to a posting list; empty lists are dropped on removal.
trait PostingMap<K> {
    fn remove_id(&mut self, key: &K, id: &str);
}

impl<K: std::hash::Hash + Eq> PostingMap<K> for HashMap<K, PostingList> {
    fn remove_id(&mut self, key: &K, id: &str) {
        if let Some(ids) = self.get_mut(key) {
            ids.remove(id);
            if ids.is_empty() {
                self.remove(key);
            }
        }
    }
}

impl<K: Ord> PostingMap<K> for BTreeMap<K, PostingList> {
    fn remove_id(&mut self, key: &K, id: &str) {
        if let Some(ids) = self.get_mut(key) {
            ids.remove(id);
            if ids.is_empty() {
                self.remove(key);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn record(id: &str, user_id: i64, named: &str, day: u32) -> AssetRecord {
        AssetRecord {
            id: id.to_string(),
            user_id,
            filename: format!("{id}.jpg"),
            creation_date: Utc.with_ymd_and_hms(2024, 5, day, 12, 0, 0).unwrap(),
            modification_date: None,
            named: named.to_string(),
            format: ".jpg".to_string(),
            media_type: "image".to_string(),
            camera_make: None,
            camera_model: None,
            pixel_width: 100,
            pixel_height: 100,
            albums: BTreeSet::new(),
            persons: BTreeSet::new(),
            is_favorite: false,
            is_hidden: false,
        }
    }

    fn ids(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_insert_populates_all_indexes() {
        let mut index = IndexSet::new();
        index.insert(&record("a", 1, "Trip to Paris", 3));

        assert_eq!(index.filename("a"), Some("a.jpg"));
        assert_eq!(index.ids_for_user(1), ids(&["a"]));
        assert_eq!(index.ids_for_text("paris"), ids(&["a"]));
        assert_eq!(index.ids_with_favorite(false), ids(&["a"]));
        assert_eq!(index.ids_with_hidden(false), ids(&["a"]));
        assert!(index.ids_for_text("to").is_empty());
    }

    #[test]
    fn test_reinsert_does_not_duplicate() {
        let mut index = IndexSet::new();
        let a = record("a", 1, "Paris Paris", 3);
        index.insert(&a);
        index.insert(&a);

        assert_eq!(index.user_index[&1].as_slice(), ["a".to_string()]);
        assert_eq!(index.token_ids("paris"), ["a".to_string()]);
    }

    #[test]
    fn test_update_rename_moves_tokens() {
        let mut index = IndexSet::new();
        let old = record("a", 1, "Trip to Paris", 3);
        index.insert(&old);

        let mut new = old.clone();
        new.named = "Rome trip".to_string();
        assert!(index.apply_update(&old, &new));

        assert!(index.token_ids("paris").is_empty());
        assert_eq!(index.ids_for_text("rome trip"), ids(&["a"]));
        assert_eq!(index.token_ids("trip"), ["a".to_string()]);
    }

    #[test]
    fn test_update_without_indexed_change_is_noop() {
        let mut index = IndexSet::new();
        let old = record("a", 1, "Beach", 3);
        index.insert(&old);

        let mut new = old.clone();
        new.albums.insert(9);
        let before = index.clone();
        assert!(!index.apply_update(&old, &new));
        assert_eq!(index, before);
    }

    #[test]
    fn test_update_flags() {
        let mut index = IndexSet::new();
        let old = record("a", 1, "Beach", 3);
        index.insert(&old);

        let mut new = old.clone();
        new.is_favorite = true;
        new.is_hidden = true;
        assert!(index.apply_update(&old, &new));
        assert_eq!(index.ids_with_favorite(true), ids(&["a"]));
        assert_eq!(index.ids_with_hidden(true), ids(&["a"]));
        assert!(index.ids_with_favorite(false).is_empty());
    }

    #[test]
    fn test_text_lookup_is_and_across_tokens() {
        let mut index = IndexSet::new();
        index.insert(&record("a", 1, "Paris trip", 1));
        index.insert(&record("b", 1, "Paris again", 2));
        index.insert(&record("c", 1, "Road trip", 3));

        assert_eq!(index.ids_for_text("paris trip"), ids(&["a"]));
        assert_eq!(index.ids_for_text("PARIS"), ids(&["a", "b"]));
        assert!(index.ids_for_text("paris unknown").is_empty());
    }

    #[test]
    fn test_date_range_is_inclusive() {
        let mut index = IndexSet::new();
        index.insert(&record("a", 1, "one", 1));
        index.insert(&record("b", 1, "two", 2));
        index.insert(&record("c", 1, "three", 3));

        let d = |day| NaiveDate::from_ymd_opt(2024, 5, day);
        assert_eq!(index.ids_for_date_range(d(2), d(3)), ids(&["b", "c"]));
        assert_eq!(index.ids_for_date_range(None, d(1)), ids(&["a"]));
        assert_eq!(index.ids_for_date_range(d(3), None), ids(&["c"]));
        assert!(index.ids_for_date_range(d(3), d(2)).is_empty());
    }

    #[test]
    fn test_remove_excises_everywhere() {
        let mut index = IndexSet::new();
        let a = record("a", 1, "Trip to Paris", 3);
        index.insert(&a);
        index.insert(&record("b", 1, "Paris again", 3));

        index.remove(&a);
        assert!(!index.contains("a"));
        assert_eq!(index.ids_for_user(1), ids(&["b"]));
        assert!(index.token_ids("trip").is_empty());
        assert!(!index.text_index.contains_key("trip"));
        assert_eq!(index.all_ids(), ids(&["b"]));
    }

    #[test]
    fn test_snapshot_round_trip_and_corruption() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.json");

        let mut index = IndexSet::new();
        index.insert(&record("a", 1, "Trip to Paris", 3));
        index.save(&path).unwrap();
        assert_eq!(IndexSet::load(&path).unwrap(), index);

        std::fs::write(&path, b"{ not json").unwrap();
        assert!(matches!(IndexSet::load(&path), Err(IndexError::State(_))));

        std::fs::remove_file(&path).unwrap();
        assert!(matches!(IndexSet::load(&path), Err(IndexError::State(_))));
    }

    #[test]
    fn test_snapshot_uses_named_keys() {
        let mut index = IndexSet::new();
        index.insert(&record("a", 1, "Trip", 3));
        let json = serde_json::to_value(&index).unwrap();
        for key in [
            "assetIndex",
            "userIndex",
            "dateIndex",
            "textIndex",
            "favoriteIndex",
            "hiddenIndex",
        ] {
            assert!(json.get(key).is_some(), "missing {key}");
        }
        assert_eq!(json["dateIndex"]["2024-05-03"][0], "a");
    }

    #[test]
    fn test_single_owner_library_builds_in_linear_time() {
        let records: Vec<AssetRecord> = (0..40_000)
            .map(|i| record(&format!("id-{i:05}"), 1, "Beach holiday", 1 + (i % 28) as u32))
            .collect();

        let started = Instant::now();
        let mut index = IndexSet::new();
        for record in &records {
            index.insert(record);
        }
        let elapsed = started.elapsed();

        assert_eq!(index.len(), 40_000);
        assert_eq!(index.ids_for_user(1).len(), 40_000);
        assert_eq!(index.ids_for_text("beach holiday").len(), 40_000);
        assert_eq!(index.token_ids("beach")[0], "id-00000");
        assert!(
            elapsed < std::time::Duration::from_secs(5),
            "inserting 40k records for one owner took {elapsed:?}"
        );

        // Removal keeps append order of the survivors
        index.remove(&records[0]);
        assert_eq!(index.token_ids("beach")[0], "id-00001");
        assert_eq!(index.ids_for_user(1).len(), 39_999);
    }

    #[test]
    fn test_snapshot_posting_lists_are_deduplicated() {
        let json = r#"{
            "assetIndex": {"a": "a.jpg"},
            "userIndex": {"1": ["a", "a"]},
            "dateIndex": {"2024-05-01": ["a"]},
            "textIndex": {"trip": ["a", "a"]},
            "favoriteIndex": {"a": false},
            "hiddenIndex": {"a": false}
        }"#;
        let index: IndexSet = serde_json::from_str(json).unwrap();
        assert_eq!(index.user_index[&1].as_slice(), ["a".to_string()]);
        assert_eq!(index.token_ids("trip"), ["a".to_string()]);

        let mut expected = IndexSet::new();
        expected.insert(&record("a", 1, "Trip", 1));
        assert_eq!(index, expected);
    }
}
