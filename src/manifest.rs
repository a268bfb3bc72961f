use std::path::{Path, PathBuf};

use anyhow::Context as _;

use crate::cache::{ResourceCache, cache_key, canonicalize, is_cached};
use crate::formats::{AssetRecord, AudioRecord, ImageRecord, Item, ManifestRecord};
use crate::item_store::write_json_atomic;

pub const MANIFEST_FILE_NAME: &str = "manifest.json";

pub fn manifest_path(out_dir: &Path, key: i64) -> PathBuf {
    out_dir.join(key.to_string()).join(MANIFEST_FILE_NAME)
}

/// Describes the cached assets of `item` for the downstream video tool.
pub async fn build_record(
    cache: &ResourceCache,
    item: &Item,
    cover_url: Option<&str>,
) -> ManifestRecord {
    let cover = match cover_url {
        Some(url) => Some(asset(cache, url).await),
        None => None,
    };

    let audio = match item.audio_url.as_deref() {
        Some(url) => {
            let AssetRecord { url, path, cached } = asset(cache, url).await;
            Some(AudioRecord {
                url,
                path,
                cached,
                duration_secs: item.audio_duration_secs,
            })
        }
        None => None,
    };

    let mut images = Vec::with_capacity(item.media.len());
    for media in &item.media {
        let AssetRecord { url, path, cached } = asset(cache, &media.raw_url).await;
        images.push(ImageRecord {
            url,
            path,
            cached,
            caption: media.caption.clone(),
        });
    }

    ManifestRecord {
        key: item.key,
        source_url: item.source_url.clone(),
        status: item.status,
        generated_at: chrono::Utc::now().to_rfc3339(),
        mirror_path: cache
            .path_for(&item.mirror_file_name())
            .to_string_lossy()
            .to_string(),
        cover,
        audio,
        images,
    }
}

pub async fn write(out_dir: &Path, record: &ManifestRecord) -> anyhow::Result<PathBuf> {
    let path = manifest_path(out_dir, record.key);
    write_json_atomic(&path, record)
        .await
        .with_context(|| format!("write manifest: {}", path.display()))?;
    Ok(path)
}

async fn asset(cache: &ResourceCache, url: &str) -> AssetRecord {
    let path = cache.path_for(&cache_key(url));
    AssetRecord {
        url: canonicalize(url).to_owned(),
        cached: is_cached(&path).await,
        path: path.to_string_lossy().to_string(),
    }
}
