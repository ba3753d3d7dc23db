use std::error::Error as StdError;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::{
    application::{scrape::ScrapeError, site::BuildError, sources::SourceError},
    config::LoadError,
    infra::error::InfraError,
};

/// Diagnostic detail carried in response extensions for the logging
/// middleware; never rendered to clients.
#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub source: &'static str,
    pub status: StatusCode,
    pub messages: Vec<String>,
}

impl ErrorReport {
    /// Captures `error` and every `source()` below it, outermost first.
    pub fn from_error(source: &'static str, status: StatusCode, error: &dyn StdError) -> Self {
        let mut messages = vec![error.to_string()];
        let mut current = error.source();
        while let Some(inner) = current {
            messages.push(inner.to_string());
            current = inner.source();
        }
        Self {
            source,
            status,
            messages,
        }
    }

    pub fn from_message(
        source: &'static str,
        status: StatusCode,
        message: impl Into<String>,
    ) -> Self {
        Self {
            source,
            status,
            messages: vec![message.into()],
        }
    }

    pub fn attach(self, response: &mut Response) {
        response.extensions_mut().insert(self);
    }
}

#[derive(Debug)]
pub struct HttpError {
    status: StatusCode,
    public_message: &'static str,
    report: ErrorReport,
}

impl HttpError {
    pub fn from_error(
        source: &'static str,
        status: StatusCode,
        public_message: &'static str,
        error: &dyn StdError,
    ) -> Self {
        let report = ErrorReport::from_error(source, status, error);
        Self {
            status,
            public_message,
            report,
        }
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let mut response = (self.status, self.public_message).into_response();
        self.report.attach(&mut response);
        response
    }
}

/// Failure of a CLI command; `main` logs it and exits non-zero.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error("configuration could not be loaded: {0}")]
    Config(#[from] LoadError),
    #[error("content could not be loaded: {0}")]
    Source(#[from] SourceError),
    #[error("scrape failed: {0}")]
    Scrape(#[from] ScrapeError),
    #[error("build failed: {0}")]
    Build(#[from] BuildError),
}

#[cfg(test)]
mod tests {
    use axum::body::to_bytes;

    use super::*;
    use crate::application::syndication::SyndicationError;

    #[tokio::test]
    async fn http_errors_hide_details_but_keep_a_report() {
        let error = BuildError::Write {
            path: "out/rss.xml".into(),
            source: std::io::Error::other("disk full"),
        };
        let response = HttpError::from_error(
            "infra::http::public::rss_feed",
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to generate RSS feed",
            &error,
        )
        .into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let report = response
            .extensions()
            .get::<ErrorReport>()
            .cloned()
            .expect("report attached");
        assert_eq!(report.messages.len(), 2);
        assert_eq!(report.messages[1], "disk full");

        let body = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        assert_eq!(&body[..], b"Failed to generate RSS feed");
    }

    #[test]
    fn feed_failures_surface_as_build_errors() {
        let error = AppError::from(BuildError::from(SyndicationError::Rewrite {
            title: "Surviving Failures".to_string(),
            message: "bad markup".to_string(),
        }));

        assert!(matches!(
            error,
            AppError::Build(BuildError::Syndication(SyndicationError::Rewrite { .. }))
        ));
        assert_eq!(
            error.to_string(),
            "build failed: failed to rewrite content links for `Surviving Failures`: bad markup"
        );
    }
}
