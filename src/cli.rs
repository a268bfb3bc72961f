use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context as _;
use clap::{Args, Parser, Subcommand};
use url::Url;

use crate::config::{ArchiveConfig, Direction};
use crate::extract::CaptionSource;

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Build (or load) the item index only.
    Discover(ArchiveArgs),
    /// Discover, mirror, extract, cache media and write manifests.
    Archive(ArchiveArgs),
    /// Print the cache file name for a URL.
    CacheKey(CacheKeyArgs),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum CaptionMode {
    /// Text of the caption element inside each image container.
    Text,
    /// The image's `alt` attribute.
    Alt,
}

#[derive(Debug, Args)]
pub struct ArchiveArgs {
    /// Working directory (item snapshot, page mirrors, cached media).
    #[arg(long)]
    pub work_dir: String,

    /// Output directory for per-item manifests (default: <work-dir>/out).
    #[arg(long)]
    pub out_dir: Option<String>,

    /// First page of the chain (must be http/https).
    #[arg(long)]
    pub seed_url: String,

    /// CSS selector of the navigation link to follow.
    #[arg(
        long,
        default_value = ".post-navigation-inner .post-nav-next a[title^=Next]"
    )]
    pub link_selector: String,

    /// Whether the followed link moves to the next or the previous post.
    #[arg(long, value_enum, default_value_t = Direction::Next)]
    pub direction: Direction,

    /// Key assigned to the seed page.
    #[arg(long, default_value_t = 1, allow_negative_numbers = true)]
    pub initial_key: i64,

    /// Maximum pages to walk.
    #[arg(long, default_value_t = 300)]
    pub max_hops: usize,

    /// Maximum concurrent HTTP requests.
    #[arg(long, default_value_t = 2)]
    pub concurrency: usize,

    /// Per-request timeout in seconds.
    #[arg(long, default_value_t = 60)]
    pub timeout_secs: u64,

    /// CSS selector of an image container (holding the img and its caption).
    #[arg(long, default_value = ".post-content [id^=attachment_]")]
    pub image_selector: String,

    /// Where captions come from.
    #[arg(long, value_enum, default_value_t = CaptionMode::Text)]
    pub caption_mode: CaptionMode,

    /// CSS selector of the caption element (with --caption-mode text).
    #[arg(long, default_value = ".wp-caption-text")]
    pub caption_selector: String,

    /// CSS selector of the region searched for the audio link.
    #[arg(long, default_value = ".post-content")]
    pub audio_scope: String,

    /// Suffix identifying the audio link.
    #[arg(long, default_value = "mp3")]
    pub audio_suffix: String,

    /// Cover image shared by every item.
    #[arg(long)]
    pub cover_url: Option<String>,

    /// ffprobe binary used for audio durations.
    #[arg(long, default_value = "ffprobe")]
    pub ffprobe: String,
}

#[derive(Debug, Args)]
pub struct CacheKeyArgs {
    /// Resource URL.
    #[arg(long)]
    pub url: String,
}

impl ArchiveArgs {
    pub fn into_config(self) -> anyhow::Result<ArchiveConfig> {
        let seed_url = Url::parse(&self.seed_url).context("parse --seed-url")?;
        let work_dir = PathBuf::from(&self.work_dir);
        let out_dir = match self.out_dir {
            Some(out_dir) => PathBuf::from(out_dir),
            None => work_dir.join("out"),
        };
        let caption = match self.caption_mode {
            CaptionMode::Text => CaptionSource::Text(self.caption_selector),
            CaptionMode::Alt => CaptionSource::Alt,
        };

        Ok(ArchiveConfig {
            work_dir,
            out_dir,
            seed_url,
            link_selector: self.link_selector,
            direction: self.direction,
            initial_key: self.initial_key,
            max_hops: self.max_hops,
            concurrency: self.concurrency,
            fetch_timeout: Duration::from_secs(self.timeout_secs),
            image_selector: self.image_selector,
            caption,
            audio_scope_selector: self.audio_scope,
            audio_suffix: self.audio_suffix,
            cover_url: self.cover_url,
            ffprobe_bin: self.ffprobe,
        })
    }
}
