use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An asset record stored as one JSON file in the metadata directory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetRecord {
    // System fields
    pub id: String,
    pub user_id: i64,
    pub filename: String,
    pub creation_date: DateTime<Utc>,
    #[serde(default)]
    pub modification_date: Option<DateTime<Utc>>,

    // Media characteristics
    pub named: String,
    #[serde(default)]
    pub format: String,
    #[serde(default)]
    pub media_type: String,
    #[serde(default)]
    pub camera_make: Option<String>,
    #[serde(default)]
    pub camera_model: Option<String>,
    #[serde(default)]
    pub pixel_width: u32,
    #[serde(default)]
    pub pixel_height: u32,

    // Library membership and flags
    #[serde(default)]
    pub albums: BTreeSet<i64>,
    #[serde(default)]
    pub persons: BTreeSet<i64>,
    #[serde(default)]
    pub is_favorite: bool,
    #[serde(default)]
    pub is_hidden: bool,
}

impl AssetRecord {
    /// Calendar day key (`YYYY-MM-DD`, UTC) used by the date index.
    pub fn day_key(&self) -> String {
        self.creation_date.format("%Y-%m-%d").to_string()
    }
}

/// A decoded asset handed over by the ingestion pipeline. The catalog assigns
/// the id.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAsset {
    pub user_id: i64,
    pub filename: String,
    pub named: String,
    #[serde(default)]
    pub format: String,
    #[serde(default)]
    pub media_type: String,
    #[serde(default)]
    pub camera_make: Option<String>,
    #[serde(default)]
    pub camera_model: Option<String>,
    /// Defaults to the ingestion time when absent.
    #[serde(default)]
    pub creation_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub pixel_width: u32,
    #[serde(default)]
    pub pixel_height: u32,
    #[serde(default)]
    pub albums: BTreeSet<i64>,
    #[serde(default)]
    pub persons: BTreeSet<i64>,
    #[serde(default)]
    pub is_favorite: bool,
    #[serde(default)]
    pub is_hidden: bool,
}

impl NewAsset {
    pub fn into_record(self, id: String, now: DateTime<Utc>) -> AssetRecord {
        AssetRecord {
            id,
            user_id: self.user_id,
            filename: self.filename,
            creation_date: self.creation_date.unwrap_or(now),
            modification_date: None,
            named: self.named,
            format: self.format,
            media_type: self.media_type,
            camera_make: self.camera_make,
            camera_model: self.camera_model,
            pixel_width: self.pixel_width,
            pixel_height: self.pixel_height,
            albums: self.albums,
            persons: self.persons,
            is_favorite: self.is_favorite,
            is_hidden: self.is_hidden,
        }
    }
}

/// Partial update payload. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub named: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub albums: Option<BTreeSet<i64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persons: Option<BTreeSet<i64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_favorite: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_hidden: Option<bool>,
}

impl AssetUpdate {
    pub fn is_empty(&self) -> bool {
        self.named.is_none()
            && self.albums.is_none()
            && self.persons.is_none()
            && self.is_favorite.is_none()
            && self.is_hidden.is_none()
    }

    /// Apply the provided fields to `record`, returning the updated copy.
    pub fn apply_to(&self, record: &AssetRecord, now: DateTime<Utc>) -> AssetRecord {
        let mut updated = record.clone();
        if let Some(ref named) = self.named {
            updated.named = named.clone();
        }
        if let Some(ref albums) = self.albums {
            updated.albums = albums.clone();
        }
        if let Some(ref persons) = self.persons {
            updated.persons = persons.clone();
        }
        if let Some(is_favorite) = self.is_favorite {
            updated.is_favorite = is_favorite;
        }
        if let Some(is_hidden) = self.is_hidden {
            updated.is_hidden = is_hidden;
        }
        updated.modification_date = Some(now);
        updated
    }
}

/// Split a display name into index tokens: whitespace separated, lower-cased,
/// longer than two characters. Order of first occurrence is kept and
/// duplicates are dropped.
pub fn tokenize(text: &str) -> Vec<String> {
    let mut tokens: Vec<String> = Vec::new();
    for word in text.split_whitespace() {
        let word = word.to_lowercase();
        if word.chars().count() > 2 && !tokens.contains(&word) {
            tokens.push(word);
        }
    }
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_filters_short_words() {
        assert_eq!(tokenize("Trip to Paris"), vec!["trip", "paris"]);
        assert_eq!(tokenize("a an ox"), Vec::<String>::new());
    }

    #[test]
    fn test_tokenize_dedupes_and_lowercases() {
        assert_eq!(tokenize("PARIS paris  Paris\tagain"), vec!["paris", "again"]);
    }

    #[test]
    fn test_record_wire_format_is_camel_case() {
        let record = NewAsset {
            user_id: 7,
            filename: "a.jpg".to_string(),
            named: "Beach".to_string(),
            is_favorite: true,
            ..Default::default()
        }
        .into_record("id-1".to_string(), Utc::now());

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["userId"], 7);
        assert_eq!(json["isFavorite"], true);
        assert!(json.get("creationDate").is_some());
    }
}
