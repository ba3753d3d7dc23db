use askama::{Error as AskamaError, Template};
use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use thiserror::Error;

use crate::application::error::{ErrorReport, HttpError};

#[derive(Debug, Error)]
#[error("{public_message}")]
pub struct TemplateRenderError {
    pub(crate) source: &'static str,
    pub(crate) public_message: &'static str,
    #[source]
    pub(crate) error: AskamaError,
}

impl TemplateRenderError {
    pub fn new(source: &'static str, public_message: &'static str, error: AskamaError) -> Self {
        Self {
            source,
            public_message,
            error,
        }
    }
}

impl From<TemplateRenderError> for HttpError {
    fn from(err: TemplateRenderError) -> Self {
        let TemplateRenderError {
            source,
            public_message,
            error,
        } = err;

        HttpError::from_error(
            source,
            StatusCode::INTERNAL_SERVER_ERROR,
            public_message,
            &error,
        )
    }
}

/// Render a template to a string for static output.
pub fn render_page<T: Template>(template: &T) -> Result<String, TemplateRenderError> {
    template.render().map_err(|err| {
        TemplateRenderError::new(
            "presentation::views::render_page",
            "Template rendering failed",
            err,
        )
    })
}

pub fn render_template_response<T: Template>(template: T, status: StatusCode) -> Response {
    match render_page(&template) {
        Ok(html) => (status, Html(html)).into_response(),
        Err(err) => HttpError::from(err).into_response(),
    }
}

pub fn render_not_found_response(layout: LayoutView, path: &str) -> Response {
    let template = NotFoundTemplate {
        layout,
        path: path.to_string(),
    };
    let mut response = render_template_response(template, StatusCode::NOT_FOUND);
    ErrorReport::from_message(
        "presentation::views::render_not_found_response",
        StatusCode::NOT_FOUND,
        format!("No page for `{path}`"),
    )
    .attach(&mut response);
    response
}

/// Page chrome shared by every template.
#[derive(Debug, Clone)]
pub struct LayoutView {
    pub site_title: String,
    pub page_title: String,
    pub description: String,
    pub lang: String,
    pub canonical: String,
    pub feed_href: String,
    pub stylesheet_href: String,
    pub nav: Vec<NavLink>,
}

#[derive(Debug, Clone)]
pub struct NavLink {
    pub label: String,
    pub href: String,
    pub count: usize,
    pub is_active: bool,
}

#[derive(Debug, Clone)]
pub struct TagBadge {
    pub label: String,
    pub href: String,
}

#[derive(Debug, Clone)]
pub struct CardView {
    pub title: String,
    pub href: String,
    /// Outbound links get a marker and open in a new tab.
    pub is_external: bool,
    pub date_label: String,
    pub date_iso: String,
    pub source_label: &'static str,
    pub source_class: &'static str,
    pub venue: Option<String>,
    /// Safe HTML: escaped text, or sanitized markup for scraped posts.
    pub excerpt_html: String,
    pub tags: Vec<TagBadge>,
}

#[derive(Debug, Clone)]
pub struct ListingContent {
    pub heading: String,
    pub cards: Vec<CardView>,
    pub empty_message: &'static str,
    pub tag_links: Vec<NavLink>,
    pub ld_json: String,
}

#[derive(Template)]
#[template(path = "listing.html")]
pub struct ListingTemplate {
    pub layout: LayoutView,
    pub content: ListingContent,
}

/// A personal post rendered as its own page.
#[derive(Debug, Clone)]
pub struct PostView {
    pub title: String,
    pub date_label: String,
    pub date_iso: String,
    pub tags: Vec<TagBadge>,
    /// Converted Markdown; text is escaped during conversion.
    pub body_html: String,
}

#[derive(Template)]
#[template(path = "post.html")]
pub struct PostTemplate {
    pub layout: LayoutView,
    pub post: PostView,
}

#[derive(Template)]
#[template(path = "not_found.html")]
pub struct NotFoundTemplate {
    pub layout: LayoutView,
    pub path: String,
}

pub fn build_tag_badges<'a, T>(tags: T) -> Vec<TagBadge>
where
    T: IntoIterator<Item = (&'a str, String)>,
{
    tags.into_iter()
        .map(|(name, href)| TagBadge {
            label: format!("#{name}"),
            href,
        })
        .collect()
}
