use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
/// Output goes to stderr; stdout is reserved for command output.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .with_writer(std::io::stderr)
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .with_writer(std::io::stderr)
            .compact()
            .with_target(true)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "folio_scrape_fetch_attempts_total",
            Unit::Count,
            "Total number of HTTP attempts made while fetching the author page."
        );
        describe_counter!(
            "folio_scrape_cards_total",
            Unit::Count,
            "Candidate post cards found on the author page."
        );
        describe_counter!(
            "folio_scrape_cards_skipped_total",
            Unit::Count,
            "Candidate post cards skipped because no usable link was found."
        );
        describe_counter!(
            "folio_scrape_date_fallback_total",
            Unit::Count,
            "Scraped posts whose date could not be parsed."
        );
        describe_counter!(
            "folio_scrape_posts_total",
            Unit::Count,
            "Posts written to the external post cache."
        );
        describe_counter!(
            "folio_build_pages_total",
            Unit::Count,
            "Listing pages written by the static build."
        );
        describe_histogram!(
            "folio_build_ms",
            Unit::Milliseconds,
            "Static build latency in milliseconds."
        );
    });
}
