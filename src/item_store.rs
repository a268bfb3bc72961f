use std::path::{Path, PathBuf};

use anyhow::Context as _;
use tokio::fs;

use crate::error::StoreError;
use crate::formats::ItemIndex;

pub const SNAPSHOT_FILE_NAME: &str = "items.json";

/// Whole-collection persistence for discovered items.
#[derive(Debug, Clone)]
pub struct ItemStore {
    path: PathBuf,
}

impl ItemStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn in_dir(work_dir: &Path) -> Self {
        Self::new(work_dir.join(SNAPSHOT_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn load(&self) -> Result<ItemIndex, StoreError> {
        let bytes = match fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(self.path.clone()));
            }
            Err(source) => {
                return Err(StoreError::Read {
                    path: self.path.clone(),
                    source,
                });
            }
        };
        serde_json::from_slice(&bytes).map_err(|source| StoreError::Parse {
            path: self.path.clone(),
            source,
        })
    }

    /// Replaces the snapshot with `items`.
    pub async fn save(&self, items: &ItemIndex) -> anyhow::Result<()> {
        write_json_atomic(&self.path, items)
            .await
            .with_context(|| format!("save item snapshot: {}", self.path.display()))
    }
}

/// One-shot index lifecycle. `Building` is entered only from `NoIndex`;
/// `Built` is terminal.
#[derive(Debug)]
pub enum IndexState {
    NoIndex,
    Building,
    Built(ItemIndex),
}

impl IndexState {
    pub fn begin_build(self) -> anyhow::Result<Self> {
        match self {
            Self::NoIndex => Ok(Self::Building),
            Self::Building => anyhow::bail!("item index is already being built"),
            Self::Built(_) => anyhow::bail!("item index is already built"),
        }
    }

    pub fn finish(self, items: ItemIndex) -> anyhow::Result<Self> {
        match self {
            Self::Building => Ok(Self::Built(items)),
            other => anyhow::bail!("cannot finish item index from state {}", other.name()),
        }
    }

    pub fn into_built(self) -> anyhow::Result<ItemIndex> {
        match self {
            Self::Built(items) => Ok(items),
            other => anyhow::bail!("item index is not built (state {})", other.name()),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::NoIndex => "no_index",
            Self::Building => "building",
            Self::Built(_) => "built",
        }
    }
}

pub(crate) async fn write_json_atomic<T: serde::Serialize>(
    path: &Path,
    value: &T,
) -> anyhow::Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| anyhow::anyhow!("path has no parent: {}", path.display()))?;
    fs::create_dir_all(parent)
        .await
        .with_context(|| format!("create parent dir: {}", parent.display()))?;

    let tmp_path = path.with_extension(format!("tmp.{}", uuid::Uuid::new_v4().simple()));
    let data = serde_json::to_vec_pretty(value).context("serialize json")?;
    fs::write(&tmp_path, &data)
        .await
        .with_context(|| format!("write tmp: {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path)
        .await
        .with_context(|| format!("rename tmp to final: {}", path.display()))?;
    Ok(())
}
