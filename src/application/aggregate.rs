//! Merge of every content source into one date-ordered stream.

use std::collections::{BTreeSet, HashSet};

use tracing::warn;

use crate::domain::{
    entities::PostRecord, slug::generate_unique_slug, types::SourceKind,
};

use super::sources::PostSource;

/// Date-descending, draft-free union of all sources.
#[derive(Debug, Clone, Default)]
pub struct Aggregate {
    records: Vec<PostRecord>,
}

/// Filtered view over the aggregate, each with a stable route.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Category {
    All,
    Source(SourceKind),
    Tag { name: String, slug: String },
}

/// Merge the three sources. Drafts are dropped and ties keep source order
/// (personal, external, publications).
pub fn aggregate(
    personal: &dyn PostSource,
    external: &dyn PostSource,
    publications: &dyn PostSource,
) -> Aggregate {
    let mut records: Vec<PostRecord> = [personal, external, publications]
        .into_iter()
        .flat_map(|source| source.list())
        .filter(|record| !record.draft)
        .collect();

    records.sort_by(|a, b| b.published_at.cmp(&a.published_at));

    Aggregate { records }
}

impl Aggregate {
    pub fn records(&self) -> &[PostRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Every projection: all, one per source, then one per distinct tag in
    /// lexical order.
    pub fn categories(&self) -> Vec<Category> {
        let mut categories = vec![Category::All];
        categories.extend(SourceKind::ALL.into_iter().map(Category::Source));

        let mut taken: HashSet<String> = HashSet::new();
        for (index, name) in self.tags().into_iter().enumerate() {
            let slug = generate_unique_slug(name, |candidate| !taken.contains(candidate))
                .unwrap_or_else(|err| {
                    warn!(
                        target = "folio::aggregate",
                        tag = name,
                        error = %err,
                        "tag cannot be slugified; using positional slug"
                    );
                    format!("tag-{}", index + 1)
                });
            taken.insert(slug.clone());
            categories.push(Category::Tag {
                name: name.to_string(),
                slug,
            });
        }

        categories
    }

    /// Records belonging to `category`, in aggregate order.
    pub fn project<'a>(
        &'a self,
        category: &'a Category,
    ) -> impl Iterator<Item = &'a PostRecord> + 'a {
        self.records
            .iter()
            .filter(move |record| category.matches(record))
    }

    pub fn count(&self, category: &Category) -> usize {
        self.project(category).count()
    }

    /// Distinct tags across all records, sorted.
    pub fn tags(&self) -> BTreeSet<&str> {
        self.records
            .iter()
            .flat_map(|record| record.tags.iter().map(String::as_str))
            .collect()
    }
}

impl Category {
    pub fn matches(&self, record: &PostRecord) -> bool {
        match self {
            Category::All => true,
            Category::Source(kind) => record.source == *kind,
            Category::Tag { name, .. } => record.has_tag(name),
        }
    }

    /// Site-relative path, always with a trailing slash.
    pub fn route(&self) -> String {
        match self {
            Category::All => "/blog/".to_string(),
            Category::Source(kind) => format!("/blog/{}/", kind.route_segment()),
            Category::Tag { slug, .. } => format!("/blog/tags/{slug}/"),
        }
    }

    pub fn title(&self) -> String {
        match self {
            Category::All => "All posts".to_string(),
            Category::Source(SourceKind::Personal) => "Personal posts".to_string(),
            Category::Source(SourceKind::External) => "Posts published elsewhere".to_string(),
            Category::Source(SourceKind::Publication) => "Publications".to_string(),
            Category::Tag { name, .. } => format!("Tagged “{name}”"),
        }
    }

    pub fn empty_message(&self) -> &'static str {
        match self {
            Category::All => "Nothing has been published yet.",
            Category::Source(SourceKind::Personal) => "No personal posts yet.",
            Category::Source(SourceKind::External) => "No external posts yet.",
            Category::Source(SourceKind::Publication) => "No publications yet.",
            Category::Tag { .. } => "No posts carry this tag.",
        }
    }

    pub fn is_tag(&self) -> bool {
        matches!(self, Category::Tag { .. })
    }
}
