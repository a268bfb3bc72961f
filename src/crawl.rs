use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Context as _;
use url::Url;

use crate::config::{ArchiveConfig, Direction};
use crate::extract::PageExtractor;
use crate::formats::{Item, ItemIndex};
use crate::http::HttpFetcher;

#[derive(Debug, Clone)]
pub struct TraversalPlan {
    pub link_selector: String,
    pub max_hops: usize,
    pub initial_key: i64,
    pub direction: Direction,
}

impl TraversalPlan {
    pub fn from_config(config: &ArchiveConfig) -> Self {
        Self {
            link_selector: config.link_selector.clone(),
            max_hops: config.max_hops,
            initial_key: config.initial_key,
            direction: config.direction,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredPage {
    pub key: i64,
    pub url: Url,
}

/// Walks a chain of navigation links from a seed page.
///
/// Each page is fetched live (the walk is not cached). The next URL is only
/// known once the current page is parsed, so one chain is strictly
/// sequential; the shared [`HttpFetcher`] bounds it together with any other
/// traffic in flight. Nothing is persisted here: a walk that fails midway
/// returns an error and the caller keeps no partial index.
pub struct Traverser {
    http: HttpFetcher,
    extractor: Arc<dyn PageExtractor>,
}

impl Traverser {
    pub fn new(http: HttpFetcher, extractor: Arc<dyn PageExtractor>) -> Self {
        Self { http, extractor }
    }

    pub async fn discover(
        &self,
        seed: &Url,
        plan: &TraversalPlan,
    ) -> anyhow::Result<Vec<DiscoveredPage>> {
        let mut pages = Vec::new();
        let mut visited = HashSet::new();
        let mut current = seed.clone();
        let mut key = plan.initial_key;

        loop {
            visited.insert(current.clone());
            let html = self
                .fetch_page(&current)
                .await
                .with_context(|| format!("load page for item {key}"))?;

            tracing::info!(key, url = %current, "discovered item");
            pages.push(DiscoveredPage {
                key,
                url: current.clone(),
            });

            if pages.len() >= plan.max_hops {
                tracing::warn!(max_hops = plan.max_hops, "max hops reached; stopping discovery");
                break;
            }

            let next = self
                .extractor
                .find_link(&html, &current, &plan.link_selector)
                .with_context(|| format!("find navigation link on {current}"))?;
            let Some(next) = next else {
                tracing::info!(url = %current, "no navigation link; end of chain");
                break;
            };
            if visited.contains(&next) {
                tracing::warn!(from = %current, to = %next, "navigation link cycles back; stopping discovery");
                break;
            }

            let Some(next_key) = plan.direction.step(key) else {
                tracing::warn!(key, to = %next, "item key range exhausted; stopping discovery");
                break;
            };
            key = next_key;
            current = next;
        }

        Ok(pages)
    }

    async fn fetch_page(&self, url: &Url) -> anyhow::Result<String> {
        let download = self.http.get(url.as_str()).await?;
        let html = download.text().await?;
        Ok(html)
    }
}

pub fn index_from_pages(pages: &[DiscoveredPage]) -> anyhow::Result<ItemIndex> {
    let mut items = ItemIndex::new();
    for page in pages {
        let item = Item::discovered(page.key, page.url.as_str());
        if items.insert(page.key, item).is_some() {
            anyhow::bail!("duplicate item key {}", page.key);
        }
    }
    Ok(items)
}
