//! Content sources feeding the aggregate.
//!
//! Each adapter loads its backing files once and hands out owned
//! [`PostRecord`] projections; the rest of the pipeline never touches disk.

mod external;
mod local;
mod publications;

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::domain::{entities::PostRecord, error::DomainError, slug::SlugError, types::SourceKind};

pub use external::ExternalPosts;
pub use local::{LocalCollection, parse_post};
pub use publications::{Publications, default_excerpt as default_publication_excerpt};

/// Read-only view over one origin of content.
pub trait PostSource {
    fn kind(&self) -> SourceKind;

    /// Every record the source knows about, drafts included.
    fn list(&self) -> Vec<PostRecord>;
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to read `{}`: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to walk `{}`: {source}", path.display())]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },
    #[error("`{}` does not start with a `+++` front matter block", path.display())]
    MissingFrontMatter { path: PathBuf },
    #[error("`{}` has malformed front matter: {source}", path.display())]
    FrontMatter {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("`{}`: {source}", path.display())]
    Invalid {
        path: PathBuf,
        #[source]
        source: DomainError,
    },
    #[error("`{}`: cannot derive a slug: {source}", path.display())]
    Slug {
        path: PathBuf,
        #[source]
        source: SlugError,
    },
    #[error("`{}` reuses slug `{slug}` already taken by `{}`", path.display(), other.display())]
    DuplicateSlug {
        path: PathBuf,
        other: PathBuf,
        slug: String,
    },
    #[error("`{}` uses slug `{slug}`, which is reserved for listing routes", path.display())]
    ReservedSlug { path: PathBuf, slug: String },
    #[error("`{}` is not a valid data file: {source}", path.display())]
    Data {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

impl SourceError {
    pub(crate) fn read(path: &Path, source: std::io::Error) -> Self {
        Self::Read {
            path: path.to_path_buf(),
            source,
        }
    }

    pub(crate) fn invalid(path: &Path, source: DomainError) -> Self {
        Self::Invalid {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Reads an optional data file; a missing file yields `None`.
pub(crate) fn read_optional(path: &Path) -> Result<Option<String>, SourceError> {
    match std::fs::read_to_string(path) {
        Ok(contents) => Ok(Some(contents)),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(SourceError::read(path, err)),
    }
}
