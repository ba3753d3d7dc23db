use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use serde::Deserialize;
use time::Date;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::domain::{
    entities::PostRecord, error::DomainError, posts::parse_iso_date, slug::derive_slug,
    types::SourceKind,
};

use super::{PostSource, SourceError};

const FRONT_MATTER_DELIMITER: &str = "+++";
const DESCRIPTION_MAX_CHARS: usize = 200;
const POST_EXTENSIONS: &[&str] = &["md", "mdx"];
const TAGS_SEGMENT: &str = "tags";

/// Markdown posts authored in the repository.
#[derive(Debug, Clone, Default)]
pub struct LocalCollection {
    posts: Vec<PostRecord>,
}

impl LocalCollection {
    /// Walk `dir` for Markdown files and validate every one of them.
    ///
    /// A missing directory is treated as an empty collection.
    pub fn load(dir: &Path) -> Result<Self, SourceError> {
        if !dir.exists() {
            warn!(
                target = "folio::sources::local",
                path = %dir.display(),
                "posts directory does not exist; no personal posts loaded"
            );
            return Ok(Self::default());
        }

        let mut posts = Vec::new();
        let mut seen: HashMap<String, PathBuf> = HashMap::new();

        for entry in WalkDir::new(dir).sort_by_file_name() {
            let entry = entry.map_err(|source| SourceError::Walk {
                path: dir.to_path_buf(),
                source,
            })?;
            let path = entry.path();
            if !entry.file_type().is_file() || !is_post_file(path) {
                continue;
            }

            let contents =
                std::fs::read_to_string(path).map_err(|err| SourceError::read(path, err))?;
            let record = parse_post(path, &contents)?;

            if let Some(slug) = record.slug.as_ref() {
                if let Some(other) = seen.get(slug) {
                    return Err(SourceError::DuplicateSlug {
                        path: path.to_path_buf(),
                        other: other.clone(),
                        slug: slug.clone(),
                    });
                }
                seen.insert(slug.clone(), path.to_path_buf());
            }

            debug!(
                target = "folio::sources::local",
                path = %path.display(),
                slug = record.slug.as_deref().unwrap_or_default(),
                draft = record.draft,
                "loaded post"
            );
            posts.push(record);
        }

        Ok(Self { posts })
    }

    pub fn from_records(posts: Vec<PostRecord>) -> Self {
        Self { posts }
    }
}

impl PostSource for LocalCollection {
    fn kind(&self) -> SourceKind {
        SourceKind::Personal
    }

    fn list(&self) -> Vec<PostRecord> {
        self.posts.clone()
    }
}

fn is_post_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| POST_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawFrontMatter {
    title: Option<String>,
    #[serde(alias = "pubDate")]
    date: Option<toml::Value>,
    description: Option<String>,
    tags: Option<Vec<String>>,
    #[serde(alias = "heroImage")]
    image: Option<String>,
    #[serde(default)]
    draft: bool,
}

/// Parse one post file. The slug comes from the file stem, or from the
/// parent directory for `<slug>/index.md` layouts.
pub fn parse_post(path: &Path, contents: &str) -> Result<PostRecord, SourceError> {
    let (front, body) = split_front_matter(contents).ok_or_else(|| {
        SourceError::MissingFrontMatter {
            path: path.to_path_buf(),
        }
    })?;

    let raw: RawFrontMatter = toml::from_str(front).map_err(|source| SourceError::FrontMatter {
        path: path.to_path_buf(),
        source,
    })?;

    let slug = derive_slug(slug_source(path)).map_err(|source| SourceError::Slug {
        path: path.to_path_buf(),
        source,
    })?;
    if is_reserved_slug(&slug) {
        return Err(SourceError::ReservedSlug {
            path: path.to_path_buf(),
            slug,
        });
    }

    let invalid = |err| SourceError::invalid(path, err);

    let title = required_text(raw.title, "title").map_err(invalid)?;
    let published_at = front_matter_date(raw.date).map_err(invalid)?;
    let description = required_text(raw.description, "description").map_err(invalid)?;
    if description.chars().count() > DESCRIPTION_MAX_CHARS {
        return Err(invalid(DomainError::validation(
            "description",
            format!("must be at most {DESCRIPTION_MAX_CHARS} characters"),
        )));
    }
    let tags = validate_tags(raw.tags).map_err(invalid)?;
    let hero_image = validate_image(raw.image).map_err(invalid)?;

    Ok(PostRecord {
        title,
        published_at,
        url: format!("/blog/{slug}/"),
        excerpt: description,
        tags,
        source: SourceKind::Personal,
        hero_image,
        draft: raw.draft,
        body: Some(body.to_string()),
        slug: Some(slug),
        venue: None,
    })
}

/// Slugs that would shadow a listing route under `/blog/`.
fn is_reserved_slug(slug: &str) -> bool {
    slug == TAGS_SEGMENT
        || SourceKind::ALL
            .iter()
            .any(|kind| kind.route_segment() == slug)
}

fn slug_source(path: &Path) -> &str {
    let stem = path.file_stem().and_then(|stem| stem.to_str()).unwrap_or_default();
    if stem.eq_ignore_ascii_case("index")
        && let Some(parent) = path
            .parent()
            .and_then(|parent| parent.file_name())
            .and_then(|name| name.to_str())
    {
        return parent;
    }
    stem
}

/// Split `+++`-delimited front matter from the body.
fn split_front_matter(contents: &str) -> Option<(&str, &str)> {
    let contents = contents.trim_start_matches('\u{feff}');
    let first_line_end = contents.find('\n')?;
    if contents[..first_line_end].trim_end() != FRONT_MATTER_DELIMITER {
        return None;
    }

    let rest = &contents[first_line_end + 1..];
    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end() == FRONT_MATTER_DELIMITER {
            return Some((&rest[..offset], &rest[offset + line.len()..]));
        }
        offset += line.len();
    }
    None
}

fn required_text(value: Option<String>, field: &'static str) -> Result<String, DomainError> {
    let value = value.ok_or_else(|| DomainError::validation(field, "is required"))?;
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(DomainError::validation(field, "must not be empty"));
    }
    Ok(trimmed.to_string())
}

fn front_matter_date(value: Option<toml::Value>) -> Result<Date, DomainError> {
    let text = match value {
        None => return Err(DomainError::validation("date", "is required")),
        Some(toml::Value::String(text)) => text,
        Some(toml::Value::Datetime(datetime)) => datetime.to_string(),
        Some(other) => {
            return Err(DomainError::validation(
                "date",
                format!("expected a YYYY-MM-DD date, found {}", other.type_str()),
            ));
        }
    };

    parse_iso_date(&text).map_err(|err| {
        DomainError::validation("date", format!("`{text}` is not a YYYY-MM-DD date: {err}"))
    })
}

fn validate_tags(tags: Option<Vec<String>>) -> Result<Vec<String>, DomainError> {
    let tags = tags.ok_or_else(|| DomainError::validation("tags", "is required"))?;
    if tags.is_empty() {
        return Err(DomainError::validation("tags", "must list at least one tag"));
    }

    tags.into_iter()
        .map(|tag| {
            let trimmed = tag.trim();
            if trimmed.is_empty() {
                Err(DomainError::validation("tags", "must not contain empty tags"))
            } else {
                Ok(trimmed.to_string())
            }
        })
        .collect()
}

fn validate_image(image: Option<String>) -> Result<Option<String>, DomainError> {
    let Some(image) = image else {
        return Ok(None);
    };
    let trimmed = image.trim();
    if trimmed.is_empty() {
        return Err(DomainError::validation("image", "must not be empty when present"));
    }
    if !(trimmed.starts_with('/')
        || trimmed.starts_with("https://")
        || trimmed.starts_with("http://"))
    {
        return Err(DomainError::validation(
            "image",
            "must be a root-relative path or an http(s) URL",
        ));
    }
    Ok(Some(trimmed.to_string()))
}
