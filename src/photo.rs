//! Photo records as they are stored and served.
//!
//! Older store files used `src`/`alt`/`favorite`; [`migrate_legacy`] maps
//! those onto the current names before a record is decoded.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{GalleryError, GalleryResult};

pub const DEFAULT_TITLE: &str = "New photo";

const LEGACY_FIELDS: [(&str, &str); 3] = [("src", "url"), ("alt", "title"), ("favorite", "isFavorite")];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhotoRecord {
    pub id: u64,
    pub url: String,
    #[serde(default = "default_title")]
    pub title: String,
    #[serde(default)]
    pub is_favorite: bool,
    /// Keys this version does not know about, kept so a rewrite of the
    /// collection does not drop them.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_title() -> String {
    DEFAULT_TITLE.to_string()
}

/// Fields accepted by `create`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPhoto {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_favorite: Option<bool>,
}

impl NewPhoto {
    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Self::default()
        }
    }

    pub fn into_record(self, id: u64) -> GalleryResult<PhotoRecord> {
        let url = match self.url {
            Some(url) if !url.trim().is_empty() => url,
            _ => return Err(GalleryError::invalid("url is required")),
        };

        Ok(PhotoRecord {
            id,
            url,
            title: self.title.unwrap_or_else(default_title),
            is_favorite: self.is_favorite.unwrap_or(false),
            extra: Map::new(),
        })
    }
}

/// Partial update. Absent fields leave the record untouched; `id` is never
/// part of a patch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhotoPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_favorite: Option<bool>,
}

impl PhotoPatch {
    pub fn favorite(is_favorite: bool) -> Self {
        Self {
            is_favorite: Some(is_favorite),
            ..Self::default()
        }
    }

    pub fn apply_to(&self, record: &mut PhotoRecord) -> GalleryResult<()> {
        if let Some(ref url) = self.url {
            if url.trim().is_empty() {
                return Err(GalleryError::invalid("url cannot be empty"));
            }
            record.url = url.clone();
        }
        if let Some(ref title) = self.title {
            record.title = title.clone();
        }
        if let Some(is_favorite) = self.is_favorite {
            record.is_favorite = is_favorite;
        }
        Ok(())
    }
}

/// Rename legacy keys in place. A current key already present wins over its
/// legacy counterpart, which is then dropped.
pub fn migrate_legacy(object: &mut Map<String, Value>) {
    for (legacy, current) in LEGACY_FIELDS {
        if let Some(value) = object.remove(legacy) {
            object.entry(current).or_insert(value);
        }
    }
}

/// Decode a stored collection, accepting both field shapes.
///
/// The document must be a JSON array; anything else is an error. Elements
/// that do not decode are skipped, as are repeated ids.
pub fn decode_collection(contents: &str) -> anyhow::Result<Vec<PhotoRecord>> {
    let document: Value = serde_json::from_str(contents)?;
    let Value::Array(items) = document else {
        anyhow::bail!("photo collection is not a JSON array");
    };

    let mut records: Vec<PhotoRecord> = Vec::with_capacity(items.len());
    for (index, item) in items.into_iter().enumerate() {
        let Value::Object(mut object) = item else {
            tracing::warn!("Skipping stored photo #{}: not an object", index);
            continue;
        };
        migrate_legacy(&mut object);

        match serde_json::from_value::<PhotoRecord>(Value::Object(object)) {
            Ok(record) if records.iter().any(|r| r.id == record.id) => {
                tracing::warn!("Skipping stored photo #{}: duplicate id {}", index, record.id);
            }
            Ok(record) => records.push(record),
            Err(e) => tracing::warn!("Skipping stored photo #{}: {}", index, e),
        }
    }

    Ok(records)
}

pub fn encode_collection(records: &[PhotoRecord]) -> anyhow::Result<String> {
    Ok(serde_json::to_string_pretty(records)?)
}
