use std::path::Path;

use tracing::{info, warn};

use crate::domain::{
    entities::{ExternalPostCache, PostRecord},
    types::SourceKind,
};

use super::{PostSource, SourceError, read_optional};

/// Posts published elsewhere, read from the scraper's cache file.
#[derive(Debug, Clone, Default)]
pub struct ExternalPosts {
    posts: Vec<PostRecord>,
}

impl ExternalPosts {
    /// Load the cache file. A missing file yields an empty source; a file
    /// that fails to parse is an error.
    pub fn load(path: &Path) -> Result<Self, SourceError> {
        let Some(contents) = read_optional(path)? else {
            warn!(
                target = "folio::sources::external",
                path = %path.display(),
                "external post cache not found; run `folio scrape` to create it"
            );
            return Ok(Self::default());
        };

        let cache: ExternalPostCache =
            toml::from_str(&contents).map_err(|source| SourceError::Data {
                path: path.to_path_buf(),
                source,
            })?;

        info!(
            target = "folio::sources::external",
            path = %path.display(),
            generated_at = %cache.generated_at,
            posts = cache.posts.len(),
            "loaded external post cache"
        );

        Ok(Self::from_cache(cache))
    }

    pub fn from_records(posts: Vec<PostRecord>) -> Self {
        Self { posts }
    }

    /// Project cache entries into records, dating undated entries with the
    /// cache's generation date.
    pub fn from_cache(cache: ExternalPostCache) -> Self {
        let fallback = cache.generated_at.date();
        let posts = cache
            .posts
            .into_iter()
            .map(|post| {
                let published_at = post.date.unwrap_or_else(|| {
                    warn!(
                        target = "folio::sources::external",
                        title = %post.title,
                        url = %post.url,
                        fallback = %fallback,
                        "external post has no date; using cache generation date"
                    );
                    fallback
                });

                PostRecord {
                    title: post.title,
                    published_at,
                    url: post.url,
                    excerpt: post.excerpt,
                    tags: post.tags,
                    source: SourceKind::External,
                    hero_image: None,
                    draft: false,
                    body: None,
                    slug: None,
                    venue: None,
                }
            })
            .collect();

        Self { posts }
    }
}

impl PostSource for ExternalPosts {
    fn kind(&self) -> SourceKind {
        SourceKind::External
    }

    fn list(&self) -> Vec<PostRecord> {
        self.posts.clone()
    }
}
