//! Page queries used by discovery and media extraction.
//!
//! The pipeline only talks to [`PageExtractor`]; [`HtmlExtractor`] is the
//! `scraper`-backed implementation used by the binary.

use anyhow::Context as _;
use scraper::{ElementRef, Html, Selector};
use url::Url;

/// Where an image's caption comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptionSource {
    /// Text content of the first element matching this selector inside the
    /// image container.
    Text(String),
    /// The `alt` attribute of the image.
    Alt,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageOccurrence {
    /// Absolute URL, query string preserved.
    pub image_url: String,
    pub caption: String,
}

/// Where an item's images and audio link live on its page.
#[derive(Debug, Clone)]
pub struct MediaRules {
    pub image_selector: String,
    pub caption: CaptionSource,
    pub audio_scope_selector: String,
    pub audio_suffix: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageMedia {
    pub images: Vec<ImageOccurrence>,
    pub audio: Option<String>,
}

pub trait PageExtractor: Send + Sync {
    /// First element matching `selector` that carries an `href`, resolved
    /// against `base`.
    fn find_link(&self, html: &str, base: &Url, selector: &str) -> anyhow::Result<Option<Url>>;

    /// One occurrence per container with an `img[src]`, in document order.
    fn find_all(
        &self,
        html: &str,
        base: &Url,
        container_selector: &str,
        caption: &CaptionSource,
    ) -> anyhow::Result<Vec<ImageOccurrence>>;

    /// First `href` ending in `suffix` inside elements matching `scope_selector`.
    fn find_audio_link(
        &self,
        html: &str,
        base: &Url,
        scope_selector: &str,
        suffix: &str,
    ) -> anyhow::Result<Option<String>>;

    /// Images and audio link of one page.
    fn find_media(&self, html: &str, base: &Url, rules: &MediaRules) -> anyhow::Result<PageMedia> {
        let images = self
            .find_all(html, base, &rules.image_selector, &rules.caption)
            .context("find images")?;
        let audio = self
            .find_audio_link(html, base, &rules.audio_scope_selector, &rules.audio_suffix)
            .context("find audio link")?;
        Ok(PageMedia { images, audio })
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlExtractor;

impl PageExtractor for HtmlExtractor {
    fn find_link(&self, html: &str, base: &Url, selector: &str) -> anyhow::Result<Option<Url>> {
        let selector = parse_selector(selector)?;
        let document = Html::parse_document(html);

        let href = document
            .select(&selector)
            .find_map(|el| el.value().attr("href"))
            .map(str::trim)
            .filter(|href| !href.is_empty());

        let Some(href) = href else {
            return Ok(None);
        };
        match base.join(href) {
            Ok(url) => Ok(Some(url)),
            Err(err) => {
                tracing::warn!(%base, href, ?err, "navigation link is not a valid url");
                Ok(None)
            }
        }
    }

    fn find_all(
        &self,
        html: &str,
        base: &Url,
        container_selector: &str,
        caption: &CaptionSource,
    ) -> anyhow::Result<Vec<ImageOccurrence>> {
        images_in(&Html::parse_document(html), base, container_selector, caption)
    }

    fn find_audio_link(
        &self,
        html: &str,
        base: &Url,
        scope_selector: &str,
        suffix: &str,
    ) -> anyhow::Result<Option<String>> {
        audio_link_in(&Html::parse_document(html), base, scope_selector, suffix)
    }

    fn find_media(&self, html: &str, base: &Url, rules: &MediaRules) -> anyhow::Result<PageMedia> {
        let document = Html::parse_document(html);
        let images = images_in(&document, base, &rules.image_selector, &rules.caption)
            .context("find images")?;
        let audio = audio_link_in(
            &document,
            base,
            &rules.audio_scope_selector,
            &rules.audio_suffix,
        )
        .context("find audio link")?;
        Ok(PageMedia { images, audio })
    }
}

fn images_in(
    document: &Html,
    base: &Url,
    container_selector: &str,
    caption: &CaptionSource,
) -> anyhow::Result<Vec<ImageOccurrence>> {
    let container = parse_selector(container_selector)?;
    let img = parse_selector("img[src]")?;
    let caption_selector = match caption {
        CaptionSource::Text(selector) => Some(parse_selector(selector)?),
        CaptionSource::Alt => None,
    };

    let mut out = Vec::new();
    for el in document.select(&container) {
        let Some(image) = el.select(&img).next() else {
            tracing::debug!(%base, "image container without img[src]");
            continue;
        };
        let Some(src) = image.value().attr("src").map(str::trim) else {
            continue;
        };
        let image_url = match base.join(src) {
            Ok(url) => url.to_string(),
            Err(err) => {
                tracing::warn!(%base, src, ?err, "skipping image with invalid src");
                continue;
            }
        };

        let caption = match &caption_selector {
            Some(selector) => el
                .select(selector)
                .next()
                .map(element_text)
                .unwrap_or_default(),
            None => image.value().attr("alt").unwrap_or_default().trim().to_owned(),
        };

        out.push(ImageOccurrence { image_url, caption });
    }
    Ok(out)
}

fn audio_link_in(
    document: &Html,
    base: &Url,
    scope_selector: &str,
    suffix: &str,
) -> anyhow::Result<Option<String>> {
    let scope = parse_selector(scope_selector)?;
    let anchors = parse_selector("[href]")?;

    let href = document
        .select(&scope)
        .flat_map(|el| el.select(&anchors))
        .filter_map(|el| el.value().attr("href"))
        .map(str::trim)
        .find(|href| href.ends_with(suffix));

    Ok(href.and_then(|href| match base.join(href) {
        Ok(url) => Some(url.to_string()),
        Err(err) => {
            tracing::warn!(%base, href, ?err, "skipping audio link with invalid href");
            None
        }
    }))
}

/// Parses a CSS selector, turning the borrowed parser error into an owned one.
pub fn parse_selector(css: &str) -> anyhow::Result<Selector> {
    Selector::parse(css).map_err(|err| anyhow::anyhow!("invalid css selector {css:?}: {err:?}"))
}

fn element_text(el: ElementRef<'_>) -> String {
    el.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    const POST: &str = r#"<!doctype html>
<html><body>
  <nav class="post-navigation-inner">
    <div class="post-nav-prev"><a href="/2013/02/ep-4/" title="Previous: Ep 4">prev</a></div>
    <div class="post-nav-next"><a href="../ep-6/" title="Next: Ep 6">next</a></div>
  </nav>
  <div class="post-content">
    <p><a href="https://cdn.test/audio/ep5.mp3">Download</a></p>
    <div id="attachment_11" class="wp-caption">
      <img src="/wp-content/uploads/map.png?w=300" alt="alt map">
      <p class="wp-caption-text">A  map of
        Kyushu</p>
    </div>
    <div id="attachment_12" class="wp-caption">
      <img src="https://cdn.test/castle.jpg" alt="alt castle">
      <p class="wp-caption-text">Castle</p>
    </div>
    <div id="attachment_13"><p class="wp-caption-text">No image here</p></div>
  </div>
  <div class="sidebar"><a href="https://cdn.test/other.mp3">Other</a></div>
</body></html>"#;

    fn base() -> Url {
        Url::parse("http://blog.test/2013/03/ep-5/").unwrap()
    }

    #[test]
    fn find_link_resolves_relative_href() -> anyhow::Result<()> {
        let link = HtmlExtractor.find_link(
            POST,
            &base(),
            ".post-navigation-inner .post-nav-next a[title^=Next]",
        )?;
        assert_eq!(
            link.map(|u| u.to_string()),
            Some("http://blog.test/2013/03/ep-6/".to_owned())
        );

        let missing = HtmlExtractor.find_link(POST, &base(), ".no-such-nav a")?;
        assert!(missing.is_none());
        Ok(())
    }

    #[test]
    fn find_all_keeps_document_order_and_caption_text() -> anyhow::Result<()> {
        let images = HtmlExtractor.find_all(
            POST,
            &base(),
            ".post-content [id^=attachment_]",
            &CaptionSource::Text(".wp-caption-text".to_owned()),
        )?;
        assert_eq!(
            images,
            vec![
                ImageOccurrence {
                    image_url: "http://blog.test/wp-content/uploads/map.png?w=300".to_owned(),
                    caption: "A map of Kyushu".to_owned(),
                },
                ImageOccurrence {
                    image_url: "https://cdn.test/castle.jpg".to_owned(),
                    caption: "Castle".to_owned(),
                },
            ]
        );
        Ok(())
    }

    #[test]
    fn find_all_can_read_alt_captions() -> anyhow::Result<()> {
        let images = HtmlExtractor.find_all(
            POST,
            &base(),
            ".post-content [id^=attachment_]",
            &CaptionSource::Alt,
        )?;
        let captions: Vec<_> = images.iter().map(|i| i.caption.as_str()).collect();
        assert_eq!(captions, ["alt map", "alt castle"]);
        Ok(())
    }

    #[test]
    fn find_audio_link_is_scoped_to_content() -> anyhow::Result<()> {
        let audio = HtmlExtractor.find_audio_link(POST, &base(), ".post-content", "mp3")?;
        assert_eq!(audio.as_deref(), Some("https://cdn.test/audio/ep5.mp3"));

        let none = HtmlExtractor.find_audio_link(POST, &base(), ".post-content", "ogg")?;
        assert!(none.is_none());
        Ok(())
    }

    #[test]
    fn find_media_matches_the_single_queries() -> anyhow::Result<()> {
        let rules = MediaRules {
            image_selector: ".post-content [id^=attachment_]".to_owned(),
            caption: CaptionSource::Text(".wp-caption-text".to_owned()),
            audio_scope_selector: ".post-content".to_owned(),
            audio_suffix: "mp3".to_owned(),
        };
        let media = HtmlExtractor.find_media(POST, &base(), &rules)?;
        assert_eq!(
            media.images,
            HtmlExtractor.find_all(POST, &base(), &rules.image_selector, &rules.caption)?
        );
        assert_eq!(media.audio.as_deref(), Some("https://cdn.test/audio/ep5.mp3"));

        let bad = MediaRules {
            audio_scope_selector: "a[[[".to_owned(),
            ..rules
        };
        let err = format!("{:#}", HtmlExtractor.find_media(POST, &base(), &bad).unwrap_err());
        assert!(err.contains("find audio link"), "{err}");
        Ok(())
    }

    #[test]
    fn invalid_selector_is_an_error() {
        let err = HtmlExtractor
            .find_link(POST, &base(), "a[[[")
            .unwrap_err()
            .to_string();
        assert!(err.contains("invalid css selector"), "{err}");
    }
}
