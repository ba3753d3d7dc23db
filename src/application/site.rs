//! Static build: every listing page, one page per personal post, the feed
//! and the embedded assets.

use std::{
    path::{Path, PathBuf},
    time::Instant,
};

use thiserror::Error;
use time::OffsetDateTime;
use tokio::fs;
use tracing::{debug, info};

use crate::{
    application::{
        aggregate::{Aggregate, Category, aggregate},
        listing::{ListingError, ListingService},
        sources::{ExternalPosts, LocalCollection, Publications, SourceError},
        syndication::{FEED_PATH, SyndicationError, SyndicationService},
    },
    config::{ContentSettings, Settings},
    infra::assets,
};

const STATIC_PREFIX: &str = "static";

#[derive(Debug, Error)]
pub enum BuildError {
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    Listing(#[from] ListingError),
    #[error(transparent)]
    Syndication(#[from] SyndicationError),
    #[error("failed to write `{}`: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl BuildError {
    fn write(path: &Path, source: std::io::Error) -> Self {
        Self::Write {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// The three loaded content sources.
#[derive(Debug, Clone)]
pub struct SiteContent {
    pub personal: LocalCollection,
    pub external: ExternalPosts,
    pub publications: Publications,
}

impl SiteContent {
    pub fn load(content: &ContentSettings) -> Result<Self, SourceError> {
        Ok(Self {
            personal: LocalCollection::load(&content.posts_dir)?,
            external: ExternalPosts::load(&content.external_cache)?,
            publications: Publications::load(&content.publications)?,
        })
    }

    pub fn aggregate(&self) -> Aggregate {
        aggregate(&self.personal, &self.external, &self.publications)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildSummary {
    pub out_dir: PathBuf,
    pub records: usize,
    pub pages: usize,
    pub posts: usize,
    pub assets: usize,
}

#[derive(Debug, Clone)]
pub struct SiteBuilder {
    listing: ListingService,
    syndication: SyndicationService,
}

impl SiteBuilder {
    pub fn new(settings: &Settings) -> Self {
        Self {
            listing: ListingService::new(settings.site.clone()),
            syndication: SyndicationService::new(settings.site.clone(), &settings.feed),
        }
    }

    pub fn listing(&self) -> &ListingService {
        &self.listing
    }

    pub fn syndication(&self) -> &SyndicationService {
        &self.syndication
    }

    /// Write the whole site under `out_dir`. Stops at the first failure;
    /// files written before it stay in place.
    pub async fn build(
        &self,
        aggregate: &Aggregate,
        out_dir: &Path,
        built_at: OffsetDateTime,
    ) -> Result<BuildSummary, BuildError> {
        let started = Instant::now();
        info!(
            target = "folio::build",
            out_dir = %out_dir.display(),
            records = aggregate.len(),
            "build started"
        );

        let pages = self.listing.render_all(aggregate)?;
        for page in &pages {
            let path = page_path(out_dir, &page.route);
            write_file(&path, page.html.as_bytes()).await?;
            debug!(
                target = "folio::build",
                route = page.route.as_str(),
                path = %path.display(),
                "listing written"
            );
            if page.category == Category::All {
                write_file(&out_dir.join("index.html"), page.html.as_bytes()).await?;
            }
        }
        let posts = self.listing.render_posts(aggregate)?;
        for post in &posts {
            let path = page_path(out_dir, &post.route);
            write_file(&path, post.html.as_bytes()).await?;
            debug!(
                target = "folio::build",
                route = post.route.as_str(),
                path = %path.display(),
                "post page written"
            );
        }
        metrics::counter!("folio_build_pages_total").increment((pages.len() + posts.len()) as u64);

        let feed = self.syndication.rss_feed(aggregate, built_at)?;
        write_file(&out_dir.join(FEED_PATH.trim_start_matches('/')), feed.as_bytes()).await?;

        let mut asset_count = 0;
        for (relative, contents) in assets::files() {
            let path = out_dir.join(STATIC_PREFIX).join(relative);
            write_file(&path, contents).await?;
            asset_count += 1;
        }

        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        metrics::histogram!("folio_build_ms").record(elapsed_ms);

        let summary = BuildSummary {
            out_dir: out_dir.to_path_buf(),
            records: aggregate.len(),
            pages: pages.len(),
            posts: posts.len(),
            assets: asset_count,
        };
        info!(
            target = "folio::build",
            out_dir = %summary.out_dir.display(),
            records = summary.records,
            pages = summary.pages,
            posts = summary.posts,
            assets = summary.assets,
            elapsed_ms = elapsed_ms,
            "build finished"
        );
        Ok(summary)
    }
}

/// `/blog/tags/rust/` -> `<out>/blog/tags/rust/index.html`.
pub fn page_path(out_dir: &Path, route: &str) -> PathBuf {
    route
        .split('/')
        .filter(|segment| !segment.is_empty())
        .fold(out_dir.to_path_buf(), |path, segment| path.join(segment))
        .join("index.html")
}

async fn write_file(path: &Path, contents: &[u8]) -> Result<(), BuildError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|source| BuildError::write(parent, source))?;
    }
    fs::write(path, contents)
        .await
        .map_err(|source| BuildError::write(path, source))
}
