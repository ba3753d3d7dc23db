//! Domain entities shared by every content source.

use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime};

use crate::domain::types::SourceKind;

/// Normalised, read-only projection of one piece of content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostRecord {
    pub title: String,
    pub published_at: Date,
    /// Site-relative path for personal posts, absolute URL otherwise.
    pub url: String,
    pub excerpt: String,
    pub tags: Vec<String>,
    pub source: SourceKind,
    pub hero_image: Option<String>,
    pub draft: bool,
    /// Raw Markdown body; only personal posts carry one.
    pub body: Option<String>,
    pub slug: Option<String>,
    pub venue: Option<String>,
}

impl PostRecord {
    pub fn is_personal(&self) -> bool {
        self.source == SourceKind::Personal
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|candidate| candidate == tag)
    }
}

/// One entry of the scraped external post cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalPost {
    pub title: String,
    pub url: String,
    /// `None` when the scraper could not parse the upstream date.
    #[serde(
        default,
        with = "crate::domain::posts::iso_date::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub date: Option<Date>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default)]
    pub excerpt: String,
    pub source: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Generated cache file owned by the scraper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalPostCache {
    #[serde(with = "crate::domain::posts::timestamp")]
    pub generated_at: OffsetDateTime,
    pub source_url: String,
    #[serde(default)]
    pub posts: Vec<ExternalPost>,
}

/// Hand-curated publication entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Publication {
    pub title: String,
    pub url: String,
    pub venue: String,
    #[serde(with = "crate::domain::posts::iso_date")]
    pub date: Date,
    #[serde(default)]
    pub excerpt: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicationList {
    #[serde(default)]
    pub publications: Vec<Publication>,
}
