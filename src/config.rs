use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context as _;
use url::Url;

use crate::extract::{CaptionSource, parse_selector};

/// Which navigation link discovery follows, and how keys move with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Direction {
    /// Follow "next" links; keys ascend.
    Next,
    /// Follow "previous" links; keys descend.
    Previous,
}

impl Direction {
    /// Key of the page after `key`, or `None` once the `i64` range is used up.
    pub fn step(self, key: i64) -> Option<i64> {
        match self {
            Self::Next => key.checked_add(1),
            Self::Previous => key.checked_sub(1),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ArchiveConfig {
    pub work_dir: PathBuf,
    pub out_dir: PathBuf,

    pub seed_url: Url,
    pub link_selector: String,
    pub direction: Direction,
    pub initial_key: i64,
    pub max_hops: usize,

    pub concurrency: usize,
    pub fetch_timeout: Duration,

    pub image_selector: String,
    pub caption: CaptionSource,
    pub audio_scope_selector: String,
    pub audio_suffix: String,
    pub cover_url: Option<String>,

    pub ffprobe_bin: String,
}

impl ArchiveConfig {
    /// Rejects values that would fail later in a less obvious place.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.seed_url.scheme() != "http" && self.seed_url.scheme() != "https" {
            anyhow::bail!("seed url must be http/https: {}", self.seed_url);
        }
        if self.max_hops == 0 {
            anyhow::bail!("max hops must be at least 1");
        }
        if self.concurrency == 0 {
            anyhow::bail!("concurrency must be at least 1");
        }
        if self.fetch_timeout.is_zero() {
            anyhow::bail!("fetch timeout must be positive");
        }
        if self.audio_suffix.trim().is_empty() {
            anyhow::bail!("audio suffix must not be empty");
        }
        if let Some(cover) = self.cover_url.as_deref() {
            Url::parse(cover).with_context(|| format!("parse cover url: {cover}"))?;
        }

        parse_selector(&self.link_selector).context("link selector")?;
        parse_selector(&self.image_selector).context("image selector")?;
        parse_selector(&self.audio_scope_selector).context("audio scope selector")?;
        if let CaptionSource::Text(selector) = &self.caption {
            parse_selector(selector).context("caption selector")?;
        }

        Ok(())
    }

    /// Creates the working and output directories and proves the working
    /// directory is writable.
    pub fn prepare_dirs(&self) -> anyhow::Result<()> {
        for dir in [&self.work_dir, &self.out_dir] {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("create dir: {}", dir.display()))?;
        }

        let probe = self
            .work_dir
            .join(format!(".write-check.{}", uuid::Uuid::new_v4().simple()));
        std::fs::write(&probe, b"ok")
            .with_context(|| format!("working dir is not writable: {}", self.work_dir.display()))?;
        std::fs::remove_file(&probe)
            .with_context(|| format!("remove write check: {}", probe.display()))?;
        Ok(())
    }
}
