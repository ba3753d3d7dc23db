use std::path::Path;

use tracing::{debug, warn};

use crate::domain::{
    entities::{PostRecord, PublicationList},
    types::SourceKind,
};

use super::{PostSource, SourceError, read_optional};

pub const DEFAULT_PUBLICATION_TAG: &str = "publication";

/// Hand-curated list of papers, talks and articles.
#[derive(Debug, Clone, Default)]
pub struct Publications {
    posts: Vec<PostRecord>,
}

impl Publications {
    pub fn load(path: &Path) -> Result<Self, SourceError> {
        let Some(contents) = read_optional(path)? else {
            warn!(
                target = "folio::sources::publications",
                path = %path.display(),
                "publications file not found; no publications loaded"
            );
            return Ok(Self::default());
        };

        let list: PublicationList =
            toml::from_str(&contents).map_err(|source| SourceError::Data {
                path: path.to_path_buf(),
                source,
            })?;

        debug!(
            target = "folio::sources::publications",
            path = %path.display(),
            count = list.publications.len(),
            "loaded publications"
        );

        Ok(Self::from_list(list))
    }

    pub fn from_records(posts: Vec<PostRecord>) -> Self {
        Self { posts }
    }

    pub fn from_list(list: PublicationList) -> Self {
        let posts = list
            .publications
            .into_iter()
            .map(|publication| {
                let tags = if publication.tags.is_empty() {
                    vec![DEFAULT_PUBLICATION_TAG.to_string()]
                } else {
                    publication.tags
                };
                let excerpt = publication
                    .excerpt
                    .filter(|excerpt| !excerpt.trim().is_empty())
                    .unwrap_or_else(|| default_excerpt(&publication.venue));

                PostRecord {
                    title: publication.title,
                    published_at: publication.date,
                    url: publication.url,
                    excerpt,
                    tags,
                    source: SourceKind::Publication,
                    hero_image: None,
                    draft: false,
                    body: None,
                    slug: None,
                    venue: Some(publication.venue),
                }
            })
            .collect();

        Self { posts }
    }
}

/// Excerpt used when a publication entry has none of its own.
pub fn default_excerpt(venue: &str) -> String {
    format!("Published in {venue}.")
}

impl PostSource for Publications {
    fn kind(&self) -> SourceKind {
        SourceKind::Publication
    }

    fn list(&self) -> Vec<PostRecord> {
        self.posts.clone()
    }
}

#[cfg(test)]
mod tests {
    use time::macros::date;

    use super::*;

    #[test]
    fn defaults_tags_and_excerpt() {
        let list: PublicationList = toml::from_str(
            r#"
[[publications]]
title = "Consensus in Practice"
url = "https://example.org/papers/consensus.pdf"
venue = "SoCC 2020"
date = "2020-06-01"
"#,
        )
        .expect("valid list");

        let posts = Publications::from_list(list).list();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].published_at, date!(2020 - 06 - 01));
        assert_eq!(posts[0].tags, vec![DEFAULT_PUBLICATION_TAG]);
        assert_eq!(posts[0].excerpt, "Published in SoCC 2020.");
        assert_eq!(posts[0].venue.as_deref(), Some("SoCC 2020"));
    }

    #[test]
    fn keeps_explicit_tags() {
        let list: PublicationList = toml::from_str(
            r#"
[[publications]]
title = "Talk"
url = "https://example.org/talk"
venue = "QCon"
date = "2021-03-04"
excerpt = "Slides and recording."
tags = ["talks", "reliability"]
"#,
        )
        .expect("valid list");

        let posts = Publications::from_list(list).list();
        assert_eq!(posts[0].tags, vec!["talks", "reliability"]);
        assert_eq!(posts[0].excerpt, "Slides and recording.");
    }

    #[test]
    fn missing_file_is_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let source = Publications::load(&dir.path().join("nope.toml")).expect("load");
        assert!(source.list().is_empty());
        assert_eq!(source.kind(), SourceKind::Publication);
    }
}
