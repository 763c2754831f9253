use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::index::IndexSet;
use super::models::{tokenize, AssetRecord};

/// Minimum length (in characters) a free-text search needs before the text
/// index is used to seed candidates.
const MIN_TEXT_SEED_LEN: usize = 3;

/// A multi-predicate asset query. Every predicate is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_favorite: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_hidden: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub camera_make: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub camera_model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_search: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub album_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub person_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_height: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_height: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_by: Option<SortKey>,
    #[serde(default)]
    pub order_desc: bool,
    #[serde(default)]
    pub offset: i64,
    #[serde(default)]
    pub limit: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortKey {
    /// Creation date
    Date,
    /// Display name
    Name,
    /// Pixel width
    #[serde(alias = "size")]
    Width,
}

/// One page of query results.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
    pub assets: Vec<Arc<AssetRecord>>,
    pub total_count: usize,
    pub page: usize,
    pub page_size: usize,
}

/// Page size limits applied to every query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageLimits {
    pub default_size: usize,
    pub max_size: usize,
}

impl Default for PageLimits {
    fn default() -> Self {
        Self {
            default_size: 50,
            max_size: 1000,
        }
    }
}

/// Indexes able to seed a candidate set, in priority order. The first one
/// whose predicate is present in the query is used, and only that one.
pub const SEED_PRIORITY: [SeedIndex; 5] = [
    SeedIndex::User,
    SeedIndex::DateRange,
    SeedIndex::Text,
    SeedIndex::Favorite,
    SeedIndex::Hidden,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedIndex {
    User,
    DateRange,
    Text,
    Favorite,
    Hidden,
}

impl SeedIndex {
    fn applies(self, query: &AssetQuery) -> bool {
        match self {
            SeedIndex::User => query.user_id.is_some(),
            SeedIndex::DateRange => query.start_date.is_some() || query.end_date.is_some(),
            SeedIndex::Text => query
                .text_search
                .as_deref()
                .is_some_and(|text| {
                    text.chars().count() >= MIN_TEXT_SEED_LEN && !tokenize(text).is_empty()
                }),
            SeedIndex::Favorite => query.is_favorite.is_some(),
            SeedIndex::Hidden => query.is_hidden.is_some(),
        }
    }

    fn candidates(self, index: &IndexSet, query: &AssetQuery) -> BTreeSet<String> {
        match self {
            SeedIndex::User => query
                .user_id
                .map(|user_id| index.ids_for_user(user_id))
                .unwrap_or_default(),
            SeedIndex::DateRange => index.ids_for_date_range(
                query.start_date.map(|d| d.date_naive()),
                query.end_date.map(|d| d.date_naive()),
            ),
            SeedIndex::Text => query
                .text_search
                .as_deref()
                .map(|text| index.ids_for_text(text))
                .unwrap_or_default(),
            SeedIndex::Favorite => query
                .is_favorite
                .map(|flag| index.ids_with_favorite(flag))
                .unwrap_or_default(),
            SeedIndex::Hidden => query
                .is_hidden
                .map(|flag| index.ids_with_hidden(flag))
                .unwrap_or_default(),
        }
    }
}

/// The seeding index for `query`, or `None` for a full index scan.
pub fn choose_seed(query: &AssetQuery) -> Option<SeedIndex> {
    SEED_PRIORITY.into_iter().find(|seed| seed.applies(query))
}

/// Select the candidate set for `query` from a single index.
pub fn select_candidates(index: &IndexSet, query: &AssetQuery) -> BTreeSet<String> {
    match choose_seed(query) {
        Some(seed) => {
            let candidates = seed.candidates(index, query);
            tracing::debug!(?seed, candidates = candidates.len(), "Seeded query candidates");
            candidates
        }
        None => {
            tracing::debug!(candidates = index.len(), "Query has no seeding predicate, scanning all ids");
            index.all_ids()
        }
    }
}

impl AssetQuery {
    /// Evaluate every predicate against a loaded record.
    pub fn matches(&self, record: &AssetRecord) -> bool {
        if self.user_id.is_some_and(|u| record.user_id != u) {
            return false;
        }
        if self.is_favorite.is_some_and(|f| record.is_favorite != f) {
            return false;
        }
        if self.is_hidden.is_some_and(|h| record.is_hidden != h) {
            return false;
        }
        if self
            .media_type
            .as_deref()
            .is_some_and(|m| record.media_type != m)
        {
            return false;
        }
        if self
            .camera_make
            .as_deref()
            .is_some_and(|m| record.camera_make.as_deref() != Some(m))
        {
            return false;
        }
        if self
            .camera_model
            .as_deref()
            .is_some_and(|m| record.camera_model.as_deref() != Some(m))
        {
            return false;
        }
        if self.start_date.is_some_and(|s| record.creation_date < s) {
            return false;
        }
        if self.end_date.is_some_and(|e| record.creation_date > e) {
            return false;
        }
        if let Some(ref text) = self.text_search {
            let name_tokens = tokenize(&record.named);
            if !tokenize(text).iter().all(|t| name_tokens.contains(t)) {
                return false;
            }
        }
        if self.album_id.is_some_and(|a| !record.albums.contains(&a)) {
            return false;
        }
        if self.person_id.is_some_and(|p| !record.persons.contains(&p)) {
            return false;
        }
        if self.min_width.is_some_and(|w| record.pixel_width < w)
            || self.max_width.is_some_and(|w| record.pixel_width > w)
            || self.min_height.is_some_and(|h| record.pixel_height < h)
            || self.max_height.is_some_and(|h| record.pixel_height > h)
        {
            return false;
        }
        true
    }

    /// Effective page size after applying defaults and the cap.
    pub fn page_size(&self, limits: PageLimits) -> usize {
        if self.limit <= 0 {
            return limits.default_size;
        }
        usize::try_from(self.limit)
            .unwrap_or(usize::MAX)
            .min(limits.max_size)
    }

    pub fn effective_offset(&self) -> usize {
        usize::try_from(self.offset.max(0)).unwrap_or(usize::MAX)
    }
}

/// Stable sort by the requested key; ties, and queries without a key, fall
/// back to id ascending so repeated queries paginate identically.
pub fn sort_records(records: &mut [Arc<AssetRecord>], order_by: Option<SortKey>, desc: bool) {
    records.sort_by(|a, b| {
        let primary = match order_by {
            Some(SortKey::Date) => a.creation_date.cmp(&b.creation_date),
            Some(SortKey::Name) => a.named.cmp(&b.named),
            Some(SortKey::Width) => a.pixel_width.cmp(&b.pixel_width),
            None => Ordering::Equal,
        };
        let primary = if desc { primary.reverse() } else { primary };
        primary.then_with(|| a.id.cmp(&b.id))
    });
}

/// Cut one page out of the sorted, filtered records.
pub fn paginate(
    mut records: Vec<Arc<AssetRecord>>,
    query: &AssetQuery,
    limits: PageLimits,
) -> QueryResult {
    let total_count = records.len();
    let page_size = query.page_size(limits);
    let offset = query.effective_offset();

    let assets = if offset >= total_count {
        Vec::new()
    } else {
        let end = offset.saturating_add(page_size).min(total_count);
        records.truncate(end);
        records.split_off(offset)
    };

    QueryResult {
        assets,
        total_count,
        page: offset / page_size + 1,
        page_size,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record(id: &str, user_id: i64, named: &str, width: u32) -> AssetRecord {
        AssetRecord {
            id: id.to_string(),
            user_id,
            filename: format!("{id}.jpg"),
            creation_date: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            modification_date: None,
            named: named.to_string(),
            format: ".jpg".to_string(),
            media_type: "image".to_string(),
            camera_make: Some("Canon".to_string()),
            camera_model: Some("EOS R5".to_string()),
            pixel_width: width,
            pixel_height: 100,
            albums: [1, 2].into_iter().collect(),
            persons: BTreeSet::new(),
            is_favorite: false,
            is_hidden: false,
        }
    }

    #[test]
    fn test_seed_priority_order() {
        let mut query = AssetQuery {
            is_hidden: Some(false),
            ..Default::default()
        };
        assert_eq!(choose_seed(&query), Some(SeedIndex::Hidden));

        query.is_favorite = Some(true);
        assert_eq!(choose_seed(&query), Some(SeedIndex::Favorite));

        query.text_search = Some("ab".to_string());
        assert_eq!(choose_seed(&query), Some(SeedIndex::Favorite));
        query.text_search = Some("to a".to_string());
        assert_eq!(choose_seed(&query), Some(SeedIndex::Favorite));
        query.text_search = Some("abc".to_string());
        assert_eq!(choose_seed(&query), Some(SeedIndex::Text));

        query.end_date = Some(Utc::now());
        assert_eq!(choose_seed(&query), Some(SeedIndex::DateRange));

        query.user_id = Some(1);
        assert_eq!(choose_seed(&query), Some(SeedIndex::User));
    }

    #[test]
    fn test_unindexed_predicates_scan_everything() {
        let query = AssetQuery {
            media_type: Some("video".to_string()),
            album_id: Some(3),
            ..Default::default()
        };
        assert_eq!(choose_seed(&query), None);
    }

    #[test]
    fn test_matches_all_predicates() {
        let r = record("a", 1, "Trip to Paris", 640);
        let base = AssetQuery::default();
        assert!(base.matches(&r));

        let q = |f: fn(&mut AssetQuery)| {
            let mut q = AssetQuery::default();
            f(&mut q);
            q
        };
        assert!(q(|q| q.user_id = Some(1)).matches(&r));
        assert!(!q(|q| q.user_id = Some(2)).matches(&r));
        assert!(!q(|q| q.is_favorite = Some(true)).matches(&r));
        assert!(q(|q| q.camera_make = Some("Canon".into())).matches(&r));
        assert!(!q(|q| q.camera_model = Some("EOS R6".into())).matches(&r));
        assert!(q(|q| q.album_id = Some(2)).matches(&r));
        assert!(!q(|q| q.person_id = Some(2)).matches(&r));
        assert!(q(|q| q.min_width = Some(640)).matches(&r));
        assert!(!q(|q| q.max_width = Some(639)).matches(&r));
        assert!(q(|q| q.text_search = Some("PARIS trip".into())).matches(&r));
        assert!(!q(|q| q.text_search = Some("paris rome".into())).matches(&r));
        // No usable tokens means no text restriction
        assert!(q(|q| q.text_search = Some("to".into())).matches(&r));
    }

    #[test]
    fn test_sorting_breaks_ties_by_id() {
        let mut records: Vec<Arc<AssetRecord>> = vec![
            Arc::new(record("c", 1, "same", 10)),
            Arc::new(record("a", 1, "same", 30)),
            Arc::new(record("b", 1, "same", 20)),
        ];

        sort_records(&mut records, Some(SortKey::Name), true);
        let ids: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);

        sort_records(&mut records, Some(SortKey::Width), true);
        let ids: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);

        sort_records(&mut records, Some(SortKey::Width), false);
        let ids: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "b", "a"]);
    }

    #[test]
    fn test_pagination_bounds() {
        let records: Vec<Arc<AssetRecord>> = (0..7)
            .map(|i| Arc::new(record(&format!("id-{i}"), 1, "x", 1)))
            .collect();
        let limits = PageLimits::default();

        let page = |offset, limit| {
            let query = AssetQuery {
                offset,
                limit,
                ..Default::default()
            };
            paginate(records.clone(), &query, limits)
        };

        let result = page(0, 3);
        assert_eq!((result.assets.len(), result.page, result.page_size), (3, 1, 3));
        assert_eq!(result.total_count, 7);

        let result = page(6, 3);
        assert_eq!((result.assets.len(), result.page), (1, 3));
        assert_eq!(result.assets[0].id, "id-6");

        assert!(page(7, 3).assets.is_empty());
        assert!(page(100, 3).assets.is_empty());
        assert_eq!(page(-5, 3).assets[0].id, "id-0");

        let result = page(0, 0);
        assert_eq!((result.assets.len(), result.page_size), (7, 50));
        assert_eq!(page(0, 5000).page_size, 1000);
    }

    #[test]
    fn test_sort_key_wire_names() {
        let query: AssetQuery =
            serde_json::from_str(r#"{"orderBy":"size","orderDesc":true,"textSearch":"paris"}"#)
                .unwrap();
        assert_eq!(query.order_by, Some(SortKey::Width));
        assert!(query.order_desc);
        assert_eq!(query.text_search.as_deref(), Some("paris"));
    }
}
