//! HTTP fetching with bounded retries.

use std::time::Duration;

use reqwest::{
    Client, StatusCode, Url,
    header::{ACCEPT, ACCEPT_LANGUAGE, HeaderMap, HeaderValue},
};
use tracing::{debug, info, warn};

use crate::config::{ScrapeSettings, SiteSettings};

use super::ScrapeError;

const ACCEPT_HTML: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";
const ACCEPT_LANGUAGES: &str = "en-US,en;q=0.9";

const RETRYABLE_STATUSES: [StatusCode; 5] = [
    StatusCode::TOO_MANY_REQUESTS,
    StatusCode::INTERNAL_SERVER_ERROR,
    StatusCode::BAD_GATEWAY,
    StatusCode::SERVICE_UNAVAILABLE,
    StatusCode::GATEWAY_TIMEOUT,
];

#[derive(Debug, Clone)]
pub struct PageFetcher {
    client: Client,
    max_retries: u32,
    backoff: Duration,
}

enum Attempt {
    Done(String),
    Retry(ScrapeError),
    Fail(ScrapeError),
}

impl PageFetcher {
    pub fn new(settings: &ScrapeSettings, site: &SiteSettings) -> Result<Self, ScrapeError> {
        let user_agent = settings
            .user_agent
            .clone()
            .unwrap_or_else(|| default_user_agent(&site.origin()));

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(ACCEPT_HTML));
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static(ACCEPT_LANGUAGES));

        let client = Client::builder()
            .user_agent(user_agent)
            .default_headers(headers)
            .timeout(settings.timeout)
            .build()
            .map_err(ScrapeError::Client)?;

        Ok(Self {
            client,
            max_retries: settings.max_retries,
            backoff: settings.backoff,
        })
    }

    /// GET `url`, retrying transport errors and transient statuses with
    /// exponential backoff.
    pub async fn fetch(&self, url: &Url) -> Result<String, ScrapeError> {
        let total = self.max_retries + 1;
        let mut attempt = 0;

        loop {
            metrics::counter!("folio_scrape_fetch_attempts_total").increment(1);
            debug!(
                target = "folio::scrape",
                url = %url,
                attempt = attempt + 1,
                of = total,
                "fetching author page"
            );

            let error = match self.attempt(url, attempt + 1).await {
                Attempt::Done(body) => {
                    info!(
                        target = "folio::scrape",
                        url = %url,
                        bytes = body.len(),
                        attempts = attempt + 1,
                        "fetched author page"
                    );
                    return Ok(body);
                }
                Attempt::Fail(error) => return Err(error),
                Attempt::Retry(error) => error,
            };

            if attempt + 1 >= total {
                return Err(error);
            }

            let delay = self.delay_for(attempt);
            warn!(
                target = "folio::scrape",
                url = %url,
                attempt = attempt + 1,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "fetch failed; retrying"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    async fn attempt(&self, url: &Url, attempts: u32) -> Attempt {
        let response = match self.client.get(url.clone()).send().await {
            Ok(response) => response,
            Err(source) if source.is_builder() => {
                return Attempt::Fail(ScrapeError::Transport { attempts, source });
            }
            Err(source) => return Attempt::Retry(ScrapeError::Transport { attempts, source }),
        };

        let status = response.status();
        if status.is_success() {
            return match response.text().await {
                Ok(body) => Attempt::Done(body),
                Err(source) => Attempt::Retry(ScrapeError::Transport { attempts, source }),
            };
        }

        let error = ScrapeError::Status {
            url: url.to_string(),
            status,
            attempts,
        };
        if RETRYABLE_STATUSES.contains(&status) {
            Attempt::Retry(error)
        } else {
            Attempt::Fail(error)
        }
    }

    fn delay_for(&self, attempt: u32) -> Duration {
        self.backoff.saturating_mul(2u32.saturating_pow(attempt))
    }
}

pub fn default_user_agent(origin: &str) -> String {
    format!(
        "folio-scraper/{} (+{origin})",
        env!("CARGO_PKG_VERSION")
    )
}
