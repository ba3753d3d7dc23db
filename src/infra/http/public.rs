use std::{collections::HashMap, sync::Arc};

use axum::{
    Router,
    body::Body,
    extract::State,
    http::{
        Request, StatusCode,
        header::{CACHE_CONTROL, CONTENT_TYPE},
    },
    middleware,
    response::{Html, IntoResponse, Redirect, Response},
    routing::get,
};
use time::OffsetDateTime;

use crate::{
    application::{
        aggregate::{Aggregate, Category},
        error::HttpError,
        listing::ListingService,
        site::SiteBuilder,
        syndication::{FEED_PATH, SyndicationService},
    },
    domain::{entities::PostRecord, types::SourceKind},
    presentation::views::render_not_found_response,
};

use super::middleware::log_responses;

const RSS_CONTENT_TYPE: &str = "application/rss+xml; charset=utf-8";

/// Shared, read-only state: the aggregate is built once at startup.
#[derive(Clone)]
pub struct HttpState {
    pub aggregate: Arc<Aggregate>,
    pub listing: Arc<ListingService>,
    pub syndication: Arc<SyndicationService>,
    routes: Arc<HashMap<String, Category>>,
    posts: Arc<HashMap<String, PostRecord>>,
}

impl HttpState {
    pub fn new(aggregate: Aggregate, builder: &SiteBuilder) -> Self {
        let routes = aggregate
            .categories()
            .into_iter()
            .map(|category| (category.route(), category))
            .collect();
        let posts = aggregate
            .records()
            .iter()
            .filter(|record| record.source == SourceKind::Personal)
            .map(|record| (record.url.clone(), record.clone()))
            .collect();

        Self {
            aggregate: Arc::new(aggregate),
            listing: Arc::new(builder.listing().clone()),
            syndication: Arc::new(builder.syndication().clone()),
            routes: Arc::new(routes),
            posts: Arc::new(posts),
        }
    }

    fn category_for(&self, path: &str) -> Option<&Category> {
        self.routes.get(path)
    }

    fn post_for(&self, path: &str) -> Option<&PostRecord> {
        self.posts.get(path)
    }

    fn is_page(&self, path: &str) -> bool {
        self.category_for(path).is_some() || self.post_for(path).is_some()
    }
}

pub fn build_router(state: HttpState) -> Router {
    Router::new()
        .route("/", get(index))
        .route(FEED_PATH, get(rss_feed))
        .route("/static/{*path}", get(crate::infra::assets::serve_static))
        .fallback(fallback_router)
        .with_state(state)
        .layer(middleware::from_fn(log_responses))
}

async fn index() -> Redirect {
    Redirect::to(&Category::All.route())
}

async fn rss_feed(State(state): State<HttpState>) -> Response {
    match state
        .syndication
        .rss_feed(&state.aggregate, OffsetDateTime::now_utc())
    {
        Ok(body) => xml_response(body, RSS_CONTENT_TYPE),
        Err(err) => HttpError::from_error(
            "infra::http::public::rss_feed",
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to generate RSS feed",
            &err,
        )
        .into_response(),
    }
}

async fn fallback_router(State(state): State<HttpState>, request: Request<Body>) -> Response {
    let path = request.uri().path();

    if let Some(category) = state.category_for(path) {
        return match state.listing.render(&state.aggregate, category) {
            Ok(html) => Html(html).into_response(),
            Err(err) => HttpError::from_error(
                "infra::http::public::listing",
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to render listing",
                &err,
            )
            .into_response(),
        };
    }

    if let Some(record) = state.post_for(path) {
        return match state.listing.render_post(&state.aggregate, record) {
            Ok(html) => Html(html).into_response(),
            Err(err) => HttpError::from_error(
                "infra::http::public::post",
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to render post",
                &err,
            )
            .into_response(),
        };
    }

    let with_slash = format!("{path}/");
    if !path.ends_with('/') && state.is_page(&with_slash) {
        return Redirect::permanent(&with_slash).into_response();
    }

    let layout = state
        .listing
        .layout_for(&state.aggregate, "Page not found", path);
    let mut response = render_not_found_response(layout, path);
    response.headers_mut().insert(
        CACHE_CONTROL,
        axum::http::HeaderValue::from_static("no-store"),
    );
    response
}

fn xml_response(body: String, content_type: &'static str) -> Response {
    Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, content_type)
        .body(Body::from(body))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

#[cfg(test)]
mod tests {
    use axum::body::to_bytes;
    use time::macros::date;
    use tower::ServiceExt;

    use super::*;
    use crate::{
        application::{
            aggregate::aggregate,
            sources::{ExternalPosts, LocalCollection, Publications, parse_post},
        },
        config::{CliArgs, load},
    };

    fn state() -> HttpState {
        let settings = load(&<CliArgs as clap::Parser>::parse_from(["folio", "serve"]))
            .expect("settings");
        let external = ExternalPosts::from_records(vec![PostRecord {
            title: "Getting Started with AI".to_string(),
            published_at: date!(2024 - 10 - 01),
            url: "https://www.cockroachlabs.com/blog/ai/".to_string(),
            excerpt: "Vectors.".to_string(),
            tags: vec!["databases".to_string()],
            source: SourceKind::External,
            hero_image: None,
            draft: false,
            body: None,
            slug: None,
            venue: None,
        }]);
        let personal = parse_post(
            std::path::Path::new("content/blog/surviving-failures.md"),
            "+++\ntitle = \"Surviving Failures\"\ndate = 2024-10-05\ndescription = \"Replicas.\"\ntags = [\"reliability\"]\n+++\n\nKeep **serving**.\n",
        )
        .expect("post");
        let aggregate = aggregate(
            &LocalCollection::from_records(vec![personal]),
            &external,
            &Publications::default(),
        );
        HttpState::new(aggregate, &SiteBuilder::new(&settings))
    }

    async fn get(uri: &str) -> Response {
        build_router(state())
            .oneshot(Request::builder().uri(uri).body(Body::empty()).expect("request"))
            .await
            .expect("response")
    }

    #[tokio::test]
    async fn serves_feed_with_rss_content_type() {
        let response = get("/rss.xml").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(CONTENT_TYPE).and_then(|v| v.to_str().ok()),
            Some(RSS_CONTENT_TYPE)
        );
        let body = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        let body = String::from_utf8(body.to_vec()).expect("utf8");
        assert!(body.contains("<title>Getting Started with AI</title>"));
    }

    #[tokio::test]
    async fn serves_listings_and_tag_pages() {
        assert_eq!(get("/blog/").await.status(), StatusCode::OK);
        assert_eq!(get("/blog/tags/databases/").await.status(), StatusCode::OK);
        assert_eq!(get("/blog/publications/").await.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn redirects_root_and_slashless_routes() {
        let root = get("/").await;
        assert_eq!(root.status(), StatusCode::SEE_OTHER);
        assert_eq!(root.headers().get("location").and_then(|v| v.to_str().ok()), Some("/blog/"));

        let slashless = get("/blog/external").await;
        assert_eq!(slashless.status(), StatusCode::PERMANENT_REDIRECT);
    }

    #[tokio::test]
    async fn serves_personal_post_pages() {
        let response = get("/blog/surviving-failures/").await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        let body = String::from_utf8(body.to_vec()).expect("utf8");
        assert!(body.contains("Surviving Failures"));
        assert!(body.contains("Keep <strong>serving</strong>."));

        let slashless = get("/blog/surviving-failures").await;
        assert_eq!(slashless.status(), StatusCode::PERMANENT_REDIRECT);
    }

    #[tokio::test]
    async fn unknown_paths_render_not_found() {
        let response = get("/nope/").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            response.headers().get(CACHE_CONTROL).and_then(|v| v.to_str().ok()),
            Some("no-store")
        );
    }

    #[tokio::test]
    async fn serves_embedded_stylesheet() {
        let response = get("/static/site.css").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(CONTENT_TYPE).and_then(|v| v.to_str().ok()),
            Some("text/css")
        );
    }
}
