//! HTML listing pages, one per category projection.

use std::collections::HashMap;

use serde_json::json;
use thiserror::Error;

use crate::{
    application::{
        aggregate::{Aggregate, Category},
        markdown::{escape_html, post_body_html},
        scrape::sanitize_excerpt,
        syndication::{FEED_PATH, absolute_url},
    },
    config::SiteSettings,
    domain::{
        entities::PostRecord,
        posts::{format_human_date, format_iso_date},
        types::SourceKind,
    },
    presentation::views::{
        CardView, LayoutView, ListingContent, ListingTemplate, NavLink, PostTemplate, PostView,
        TagBadge, TemplateRenderError, build_tag_badges, render_page,
    },
};

pub const STYLESHEET_PATH: &str = "/static/site.css";

#[derive(Debug, Error)]
pub enum ListingError {
    #[error("failed to render listing `{route}`: {source}")]
    Template {
        route: String,
        #[source]
        source: TemplateRenderError,
    },
    #[error("failed to encode structured data for `{route}`: {source}")]
    StructuredData {
        route: String,
        #[source]
        source: serde_json::Error,
    },
}

/// One rendered listing.
#[derive(Debug, Clone)]
pub struct RenderedPage {
    pub category: Category,
    pub route: String,
    pub html: String,
}

/// One rendered personal post page.
#[derive(Debug, Clone)]
pub struct RenderedPost {
    pub route: String,
    pub html: String,
}

#[derive(Debug, Clone)]
pub struct ListingService {
    site: SiteSettings,
}

impl ListingService {
    pub fn new(site: SiteSettings) -> Self {
        Self { site }
    }

    /// Render a single category page.
    pub fn render(&self, aggregate: &Aggregate, category: &Category) -> Result<String, ListingError> {
        let categories = aggregate.categories();
        self.render_with(aggregate, &categories, category)
    }

    /// Render every category page of the aggregate.
    pub fn render_all(&self, aggregate: &Aggregate) -> Result<Vec<RenderedPage>, ListingError> {
        let categories = aggregate.categories();
        categories
            .iter()
            .map(|category| {
                Ok(RenderedPage {
                    category: category.clone(),
                    route: category.route(),
                    html: self.render_with(aggregate, &categories, category)?,
                })
            })
            .collect()
    }

    /// Render the page every personal record links to.
    pub fn render_post(
        &self,
        aggregate: &Aggregate,
        record: &PostRecord,
    ) -> Result<String, ListingError> {
        let categories = aggregate.categories();
        let tag_routes = tag_routes(&categories);

        let template = PostTemplate {
            layout: self.layout_for(aggregate, &record.title, &record.url),
            post: PostView {
                title: record.title.clone(),
                date_label: format_human_date(record.published_at),
                date_iso: format_iso_date(record.published_at),
                tags: tag_badges(record, &tag_routes),
                body_html: post_body_html(record),
            },
        };

        render_page(&template).map_err(|source| ListingError::Template {
            route: record.url.clone(),
            source,
        })
    }

    /// Render a page for every personal record in the aggregate.
    pub fn render_posts(&self, aggregate: &Aggregate) -> Result<Vec<RenderedPost>, ListingError> {
        aggregate
            .records()
            .iter()
            .filter(|record| record.is_personal())
            .map(|record| {
                Ok(RenderedPost {
                    route: record.url.clone(),
                    html: self.render_post(aggregate, record)?,
                })
            })
            .collect()
    }

    /// Chrome for pages that are not listings, such as the 404 page.
    pub fn layout_for(&self, aggregate: &Aggregate, page_title: &str, route: &str) -> LayoutView {
        let categories = aggregate.categories();
        LayoutView {
            site_title: self.site.title.clone(),
            page_title: format!("{page_title} · {}", self.site.title),
            description: self.site.description.clone(),
            lang: self.site.language.clone(),
            canonical: absolute_url(&self.site.origin(), route),
            feed_href: FEED_PATH.to_string(),
            stylesheet_href: STYLESHEET_PATH.to_string(),
            nav: source_nav(aggregate, &categories, None),
        }
    }

    fn render_with(
        &self,
        aggregate: &Aggregate,
        categories: &[Category],
        category: &Category,
    ) -> Result<String, ListingError> {
        let route = category.route();
        let origin = self.site.origin();
        let tag_routes = tag_routes(categories);

        let records: Vec<&PostRecord> = aggregate.project(category).collect();
        let cards = records
            .iter()
            .map(|record| card_for(record, &tag_routes))
            .collect();

        let ld_json = item_list_json(&origin, &route, &category.title(), &records).map_err(
            |source| ListingError::StructuredData {
                route: route.clone(),
                source,
            },
        )?;

        let tag_links = categories
            .iter()
            .filter(|candidate| candidate.is_tag())
            .map(|candidate| NavLink {
                label: match candidate {
                    Category::Tag { name, .. } => name.clone(),
                    _ => String::new(),
                },
                href: candidate.route(),
                count: aggregate.count(candidate),
                is_active: candidate == category,
            })
            .collect();

        let template = ListingTemplate {
            layout: LayoutView {
                site_title: self.site.title.clone(),
                page_title: format!("{} · {}", category.title(), self.site.title),
                description: self.site.description.clone(),
                lang: self.site.language.clone(),
                canonical: absolute_url(&origin, &route),
                feed_href: FEED_PATH.to_string(),
                stylesheet_href: STYLESHEET_PATH.to_string(),
                nav: source_nav(aggregate, categories, Some(category)),
            },
            content: ListingContent {
                heading: category.title(),
                cards,
                empty_message: category.empty_message(),
                tag_links,
                ld_json,
            },
        };

        render_page(&template).map_err(|source| ListingError::Template { route, source })
    }
}

fn source_nav(
    aggregate: &Aggregate,
    categories: &[Category],
    active: Option<&Category>,
) -> Vec<NavLink> {
    categories
        .iter()
        .filter(|candidate| !candidate.is_tag())
        .map(|candidate| NavLink {
            label: match candidate {
                Category::All => "All".to_string(),
                Category::Source(SourceKind::Publication) => "Publications".to_string(),
                Category::Source(kind) => kind.label().to_string(),
                Category::Tag { name, .. } => name.clone(),
            },
            href: candidate.route(),
            count: aggregate.count(candidate),
            is_active: active == Some(candidate),
        })
        .collect()
}

fn tag_routes(categories: &[Category]) -> HashMap<&str, String> {
    categories
        .iter()
        .filter_map(|candidate| match candidate {
            Category::Tag { name, .. } => Some((name.as_str(), candidate.route())),
            _ => None,
        })
        .collect()
}

fn tag_badges(record: &PostRecord, tag_routes: &HashMap<&str, String>) -> Vec<TagBadge> {
    build_tag_badges(record.tags.iter().filter_map(|tag| {
        tag_routes
            .get(tag.as_str())
            .map(|route| (tag.as_str(), route.clone()))
    }))
}

fn card_for(record: &PostRecord, tag_routes: &HashMap<&str, String>) -> CardView {
    let excerpt_html = match record.source {
        SourceKind::External => sanitize_excerpt(&record.excerpt),
        SourceKind::Personal | SourceKind::Publication => escape_html(&record.excerpt),
    };

    CardView {
        title: record.title.clone(),
        href: record.url.clone(),
        is_external: !record.is_personal(),
        date_label: format_human_date(record.published_at),
        date_iso: format_iso_date(record.published_at),
        source_label: record.source.label(),
        source_class: record.source.as_str(),
        venue: record.venue.clone(),
        excerpt_html,
        tags: tag_badges(record, tag_routes),
    }
}

/// schema.org `ItemList`, escaped for embedding inside a `<script>` element.
fn item_list_json(
    origin: &str,
    route: &str,
    name: &str,
    records: &[&PostRecord],
) -> Result<String, serde_json::Error> {
    let elements: Vec<_> = records
        .iter()
        .enumerate()
        .map(|(index, record)| {
            json!({
                "@type": "ListItem",
                "position": index + 1,
                "url": absolute_url(origin, &record.url),
                "name": record.title,
            })
        })
        .collect();

    let document = json!({
        "@context": "https://schema.org",
        "@type": "ItemList",
        "name": name,
        "url": absolute_url(origin, route),
        "numberOfItems": records.len(),
        "itemListElement": elements,
    });

    Ok(serde_json::to_string(&document)?.replace("</", "<\\/"))
}
