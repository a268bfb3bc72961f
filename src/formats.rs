use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub const DESCRIPTION_PLACEHOLDER: &str = "PLACE_HOLDER";

/// Key → item, iterated in ascending key order.
pub type ItemIndex = BTreeMap<i64, Item>;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionStatus {
    #[default]
    Pending,
    Complete,
    Incomplete,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Item {
    pub key: i64,
    pub source_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_duration_secs: Option<u64>,
    pub description: String,
    #[serde(default)]
    pub media: Vec<MediaRef>,
    #[serde(default)]
    pub status: ExtractionStatus,
}

impl Item {
    pub fn discovered(key: i64, source_url: impl Into<String>) -> Self {
        Self {
            key,
            source_url: source_url.into(),
            audio_url: None,
            audio_duration_secs: None,
            description: DESCRIPTION_PLACEHOLDER.to_owned(),
            media: Vec::new(),
            status: ExtractionStatus::Pending,
        }
    }

    pub fn mirror_file_name(&self) -> String {
        mirror_file_name(self.key)
    }

    /// Appends every occurrence in `extracted`, in order, unless the stored
    /// list already holds that exact sequence from an earlier run. Returns
    /// whether the list grew.
    pub fn record_media(&mut self, extracted: Vec<MediaRef>) -> bool {
        if extracted.is_empty()
            || self.media.starts_with(&extracted)
            || self.media.ends_with(&extracted)
        {
            return false;
        }
        self.media.extend(extracted);
        true
    }
}

pub fn mirror_file_name(key: i64) -> String {
    format!("{key}.html")
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MediaRef {
    pub raw_url: String,
    pub caption: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestRecord {
    pub key: i64,
    pub source_url: String,
    pub status: ExtractionStatus,
    pub generated_at: String,
    pub mirror_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cover: Option<AssetRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio: Option<AudioRecord>,
    pub images: Vec<ImageRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetRecord {
    pub url: String,
    pub path: String,
    pub cached: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioRecord {
    pub url: String,
    pub path: String,
    pub cached: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageRecord {
    pub url: String,
    pub path: String,
    pub cached: bool,
    pub caption: String,
}
