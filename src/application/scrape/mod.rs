//! Offline refresher for the external post cache.
//!
//! `fetch -> extract -> sanitize -> emit`: one author page is downloaded,
//! cards are pulled out with streaming selectors, excerpts are whitelisted
//! and the result replaces the cache file atomically.

pub mod cache;
pub mod dates;
pub mod extract;
pub mod fetch;
pub mod sanitize;
pub mod tags;

use std::path::{Path, PathBuf};

use reqwest::StatusCode;
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{info, warn};
use url::Url;

use crate::{
    application::markdown::escape_html,
    config::{ScrapeSettings, SiteSettings},
    domain::entities::{ExternalPost, ExternalPostCache},
};

pub use sanitize::sanitize_excerpt;

use self::{
    extract::{ExtractOptions, RawCard},
    fetch::PageFetcher,
    sanitize::plain_text,
};

pub const UNTITLED: &str = "Untitled";
pub const EXCERPT_LIMIT: usize = 200;

#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("no author page configured; set `scrape.url` or pass `--url`")]
    MissingUrl,
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("request failed after {attempts} attempt(s): {source}")]
    Transport {
        attempts: u32,
        #[source]
        source: reqwest::Error,
    },
    #[error("`{url}` answered {status} after {attempts} attempt(s)")]
    Status {
        url: String,
        status: StatusCode,
        attempts: u32,
    },
    #[error("invalid selector `{selector}`: {message}")]
    Selector { selector: String, message: String },
    #[error("failed to parse author page: {0}")]
    Parse(String),
    #[error("no posts extracted from `{url}` ({cards} card(s) inspected)")]
    NoPosts { url: String, cards: usize },
    #[error("failed to serialize cache: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("failed to write `{}`: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ScrapeError {
    pub fn write(path: &Path, source: std::io::Error) -> Self {
        Self::Write {
            path: path.to_path_buf(),
            source,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrapeReport {
    pub output: PathBuf,
    pub posts: usize,
    pub skipped: usize,
    pub undated: usize,
}

/// Cache contents plus the bookkeeping a run reports.
#[derive(Debug, Clone)]
pub struct ScrapeOutcome {
    pub cache: ExternalPostCache,
    pub skipped: usize,
    pub undated: usize,
}

pub struct Scraper {
    url: Url,
    output: PathBuf,
    source: String,
    options: ExtractOptions,
    fetcher: PageFetcher,
}

impl Scraper {
    pub fn from_settings(settings: &ScrapeSettings, site: &SiteSettings) -> Result<Self, ScrapeError> {
        let url = settings.url.clone().ok_or(ScrapeError::MissingUrl)?;
        Ok(Self {
            url,
            output: settings.output.clone(),
            source: settings.source.clone(),
            options: ExtractOptions {
                card_selectors: settings.card_selectors.clone(),
                date_selectors: settings.date_selectors.clone(),
                link_path_prefix: settings.link_path_prefix.clone(),
            },
            fetcher: PageFetcher::new(settings, site)?,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    /// Fetch, extract and persist. The cache file is only replaced when at
    /// least one post was extracted.
    pub async fn run(&self) -> Result<ScrapeReport, ScrapeError> {
        info!(
            target = "folio::scrape",
            url = %self.url,
            output = %self.output.display(),
            "scrape started"
        );

        let html = self.fetcher.fetch(&self.url).await?;
        let outcome = self.build_cache(&html, OffsetDateTime::now_utc())?;
        cache::write_cache(&self.output, &outcome.cache)?;

        for post in &outcome.cache.posts {
            info!(
                target = "folio::scrape",
                title = post.title.as_str(),
                date = ?post.date,
                image = post.image.is_some(),
                tags = %post.tags.join(","),
                url = post.url.as_str(),
                "post cached"
            );
        }

        let report = ScrapeReport {
            output: self.output.clone(),
            posts: outcome.cache.posts.len(),
            skipped: outcome.skipped,
            undated: outcome.undated,
        };
        metrics::counter!("folio_scrape_posts_total").increment(report.posts as u64);
        info!(
            target = "folio::scrape",
            posts = report.posts,
            skipped = report.skipped,
            undated = report.undated,
            output = %report.output.display(),
            "scrape finished"
        );
        Ok(report)
    }

    /// Turn a downloaded page into cache contents.
    pub fn build_cache(
        &self,
        html: &str,
        generated_at: OffsetDateTime,
    ) -> Result<ScrapeOutcome, ScrapeError> {
        let scan = extract::scan_cards(html, &self.url, &self.options)?;
        let inspected = scan.cards.len();
        metrics::counter!("folio_scrape_cards_total").increment(inspected as u64);

        let mut skipped = 0;
        let mut undated = 0;
        let mut posts = Vec::with_capacity(inspected);
        for (index, card) in scan.cards.into_iter().enumerate() {
            match self.to_post(index, card) {
                Some(post) => {
                    if post.date.is_none() {
                        undated += 1;
                    }
                    posts.push(post);
                }
                None => skipped += 1,
            }
        }

        if posts.is_empty() {
            return Err(ScrapeError::NoPosts {
                url: self.url.to_string(),
                cards: inspected,
            });
        }

        Ok(ScrapeOutcome {
            cache: ExternalPostCache {
                generated_at,
                source_url: self.url.to_string(),
                posts,
            },
            skipped,
            undated,
        })
    }

    fn to_post(&self, index: usize, card: RawCard) -> Option<ExternalPost> {
        let title = card.title.unwrap_or_else(|| UNTITLED.to_string());
        let Some(url) = card.url else {
            metrics::counter!("folio_scrape_cards_skipped_total").increment(1);
            warn!(
                target = "folio::scrape",
                card = index,
                title = title.as_str(),
                "card has no usable link; skipped"
            );
            return None;
        };

        let date = dates::first_parsable(card.date_candidates.iter().map(String::as_str));
        if date.is_none() {
            metrics::counter!("folio_scrape_date_fallback_total").increment(1);
            warn!(
                target = "folio::scrape",
                card = index,
                title = title.as_str(),
                candidates = ?card.date_candidates,
                "no recognizable date; cache generation time will be used"
            );
        }

        let excerpt = card
            .excerpt_html
            .as_deref()
            .map(bounded_excerpt)
            .unwrap_or_default();
        let tags = tags::derive_tags(&title, &plain_text(&excerpt));

        Some(ExternalPost {
            title,
            url: url.to_string(),
            date,
            image: card.image.map(String::from),
            excerpt,
            source: self.source.clone(),
            tags,
        })
    }
}

/// Sanitized excerpt, or an escaped plain-text cut when it exceeds
/// [`EXCERPT_LIMIT`] characters.
pub fn bounded_excerpt(html: &str) -> String {
    let sanitized = sanitize_excerpt(html);
    if sanitized.chars().count() <= EXCERPT_LIMIT {
        return sanitized;
    }

    let text = plain_text(&sanitized);
    if text.chars().count() <= EXCERPT_LIMIT {
        return escape_html(&text);
    }
    let cut: String = text.chars().take(EXCERPT_LIMIT).collect();
    escape_html(&format!("{}…", cut.trim_end()))
}
