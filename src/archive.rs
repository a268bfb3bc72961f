use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context as _;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use url::Url;

use crate::cache::{FetchOutcome, ResourceCache, cache_key};
use crate::config::ArchiveConfig;
use crate::crawl::{TraversalPlan, Traverser, index_from_pages};
use crate::error::StoreError;
use crate::extract::{MediaRules, PageExtractor};
use crate::formats::{ExtractionStatus, Item, ItemIndex, MediaRef};
use crate::http::HttpFetcher;
use crate::item_store::{IndexState, ItemStore};
use crate::probe::DurationProber;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub items: usize,
    pub complete: usize,
    pub incomplete: usize,
    pub manifests: Vec<PathBuf>,
}

/// Owns one archiving run: index, per-item extraction, snapshot, manifests.
pub struct Archiver {
    config: ArchiveConfig,
    http: HttpFetcher,
    store: ItemStore,
    worker: ItemWorker,
}

impl Archiver {
    /// Validates `config` and prepares its directories; both failures are fatal.
    pub fn new(
        config: ArchiveConfig,
        extractor: Arc<dyn PageExtractor>,
        prober: Arc<dyn DurationProber>,
    ) -> anyhow::Result<Self> {
        config.validate().context("validate config")?;
        config.prepare_dirs().context("prepare directories")?;

        let http = HttpFetcher::new(config.concurrency, config.fetch_timeout)?;
        let cache = Arc::new(ResourceCache::new(config.work_dir.clone(), http.clone()));
        let store = ItemStore::in_dir(&config.work_dir);
        let worker = ItemWorker {
            cache,
            extractor,
            prober,
            rules: Arc::new(MediaRules {
                image_selector: config.image_selector.clone(),
                caption: config.caption.clone(),
                audio_scope_selector: config.audio_scope_selector.clone(),
                audio_suffix: config.audio_suffix.clone(),
            }),
        };

        Ok(Self {
            config,
            http,
            store,
            worker,
        })
    }

    pub fn store(&self) -> &ItemStore {
        &self.store
    }

    /// Loads the item index, walking the link chain only when no snapshot
    /// exists yet. An existing snapshot is used as is, without network access.
    pub async fn ensure_index(&self) -> anyhow::Result<ItemIndex> {
        let state = match self.store.load().await {
            Ok(items) => {
                tracing::info!(items = items.len(), path = %self.store.path().display(), "loaded item index");
                IndexState::Built(items)
            }
            Err(StoreError::NotFound(_)) => IndexState::NoIndex,
            Err(err) => return Err(err).context("load item index"),
        };

        let state = match state {
            IndexState::NoIndex => self.build_index(state).await?,
            other => other,
        };
        state.into_built()
    }

    async fn build_index(&self, state: IndexState) -> anyhow::Result<IndexState> {
        let building = state.begin_build()?;
        tracing::warn!(seed = %self.config.seed_url, "no item index; discovering items");

        let traverser = Traverser::new(self.http.clone(), Arc::clone(&self.worker.extractor));
        let plan = TraversalPlan::from_config(&self.config);
        let pages = traverser
            .discover(&self.config.seed_url, &plan)
            .await
            .context("discover items")?;

        let items = index_from_pages(&pages)?;
        self.store.save(&items).await.context("persist item index")?;
        tracing::info!(items = items.len(), "item index built");

        building.finish(items)
    }

    pub async fn run(&self) -> anyhow::Result<RunSummary> {
        let mut items = self.ensure_index().await?;

        let cover_url = self.config.cover_url.as_deref();
        if let Some(cover) = cover_url {
            if let FetchOutcome::Unavailable(err) = self.worker.cache.fetch_url(cover).await? {
                tracing::warn!(%cover, error = %err, "cover image unavailable");
            }
        }

        for item in self.process_all(&items).await? {
            items.insert(item.key, item);
        }
        self.store.save(&items).await.context("persist item index")?;

        let mut summary = RunSummary {
            items: items.len(),
            ..RunSummary::default()
        };
        for item in items.values() {
            match item.status {
                ExtractionStatus::Complete => summary.complete += 1,
                _ => summary.incomplete += 1,
            }
            let record = crate::manifest::build_record(&self.worker.cache, item, cover_url).await;
            let path = crate::manifest::write(&self.config.out_dir, &record).await?;
            summary.manifests.push(path);
        }

        tracing::info!(
            items = summary.items,
            complete = summary.complete,
            incomplete = summary.incomplete,
            "archive run finished"
        );
        Ok(summary)
    }

    /// Runs every item through the worker, at most `concurrency` at a time,
    /// and hands the updated items back in ascending key order.
    async fn process_all(&self, items: &ItemIndex) -> anyhow::Result<Vec<Item>> {
        let permits = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let mut tasks = JoinSet::new();

        for item in items.values().cloned() {
            let worker = self.worker.clone();
            let permits = Arc::clone(&permits);
            tasks.spawn(async move {
                let _permit = permits
                    .acquire_owned()
                    .await
                    .expect("item worker semaphore is closed");
                worker.process(item).await
            });
        }

        let mut updated = ItemIndex::new();
        while let Some(joined) = tasks.join_next().await {
            let item = joined.context("item worker panicked")??;
            updated.insert(item.key, item);
        }
        Ok(updated.into_values().collect())
    }
}

#[derive(Clone)]
struct ItemWorker {
    cache: Arc<ResourceCache>,
    extractor: Arc<dyn PageExtractor>,
    prober: Arc<dyn DurationProber>,
    rules: Arc<MediaRules>,
}

impl ItemWorker {
    /// Mirrors, extracts and caches one item. Recoverable problems mark the
    /// item incomplete; `Err` means the cache directory itself failed.
    async fn process(&self, mut item: Item) -> anyhow::Result<Item> {
        let key = item.key;
        let mirror_name = item.mirror_file_name();

        if let FetchOutcome::Unavailable(err) =
            self.cache.fetch(&item.source_url, &mirror_name).await?
        {
            tracing::warn!(key, error = %err, "page mirror unavailable; skipping extraction");
            item.status = ExtractionStatus::Incomplete;
            return Ok(item);
        }

        let mirror_path = self.cache.path_for(&mirror_name);
        let bytes = tokio::fs::read(&mirror_path)
            .await
            .with_context(|| format!("read page mirror: {}", mirror_path.display()))?;
        let html = String::from_utf8_lossy(&bytes);

        let page = Url::parse(&item.source_url)
            .context("parse item url")
            .and_then(|base| self.extractor.find_media(&html, &base, &self.rules));
        let page = match page {
            Ok(page) => page,
            Err(err) => {
                tracing::warn!(key, ?err, "extraction failed");
                item.status = ExtractionStatus::Incomplete;
                return Ok(item);
            }
        };

        let mut complete = true;

        // Record media in document order before any fetch completes.
        item.record_media(
            page.images
                .iter()
                .map(|image| MediaRef {
                    raw_url: image.image_url.clone(),
                    caption: image.caption.clone(),
                })
                .collect(),
        );

        let mut image_fetches = JoinSet::new();
        for image in page.images {
            let cache = Arc::clone(&self.cache);
            image_fetches.spawn(async move { cache.fetch_url(&image.image_url).await });
        }

        match page.audio {
            Some(audio_url) => {
                if !self.cache_audio(&mut item, audio_url).await? {
                    complete = false;
                }
            }
            None => {
                tracing::warn!(key, "no audio link found");
                complete = false;
            }
        }

        while let Some(joined) = image_fetches.join_next().await {
            let outcome = joined.context("image fetch task panicked")??;
            if !outcome.is_available() {
                complete = false;
            }
        }

        item.status = if complete {
            ExtractionStatus::Complete
        } else {
            ExtractionStatus::Incomplete
        };
        tracing::info!(key, media = item.media.len(), status = ?item.status, "item processed");
        Ok(item)
    }

    /// Returns whether the audio file is cached and its duration known.
    async fn cache_audio(&self, item: &mut Item, audio_url: String) -> anyhow::Result<bool> {
        if item.audio_url.as_deref() != Some(audio_url.as_str()) {
            item.audio_duration_secs = None;
        }
        item.audio_url = Some(audio_url.clone());

        if !self.cache.fetch_url(&audio_url).await?.is_available() {
            return Ok(false);
        }
        if item.audio_duration_secs.is_some() {
            return Ok(true);
        }

        let path = self.cache.path_for(&cache_key(&audio_url));
        match self.prober.probe(&path).await {
            Ok(secs) => {
                item.audio_duration_secs = Some(secs);
                Ok(true)
            }
            Err(err) => {
                tracing::warn!(key = item.key, ?err, "audio duration probe failed");
                Ok(false)
            }
        }
    }
}
