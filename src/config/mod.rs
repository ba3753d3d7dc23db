//! Configuration layer: typed settings with layered precedence (file → env → CLI).

mod cli;

use std::{
    net::SocketAddr,
    num::NonZeroUsize,
    path::PathBuf,
    str::FromStr,
    time::Duration,
};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

pub use cli::{BuildArgs, CliArgs, Command, FeedArgs, ScrapeArgs, ServeArgs, SiteOverride};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "folio";
const DEFAULT_SITE_TITLE: &str = "Notebook";
const DEFAULT_SITE_DESCRIPTION: &str = "Writing on software, systems and product.";
const DEFAULT_SITE_URL: &str = "http://localhost:4321";
const DEFAULT_SITE_LANGUAGE: &str = "en-us";
const DEFAULT_POSTS_DIR: &str = "content/blog";
const DEFAULT_EXTERNAL_CACHE: &str = "data/external_posts.toml";
const DEFAULT_PUBLICATIONS: &str = "data/publications.toml";
const DEFAULT_OUTPUT_DIR: &str = "dist";
const DEFAULT_SCRAPE_SOURCE: &str = "external";
const DEFAULT_SCRAPE_TIMEOUT_SECS: u64 = 30;
const DEFAULT_SCRAPE_MAX_RETRIES: u32 = 3;
const DEFAULT_SCRAPE_BACKOFF_MILLIS: u64 = 1_000;
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 4321;

const DEFAULT_CARD_SELECTORS: &[&str] = &[
    "article",
    "div[class*=\"post\"], div[class*=\"article\"], div[class*=\"card\"]",
];
const DEFAULT_DATE_SELECTORS: &[&str] =
    &["time", "span[class*=\"date\"]", "[datetime]"];

/// Fully-resolved settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub site: SiteSettings,
    pub content: ContentSettings,
    pub feed: FeedSettings,
    pub scrape: ScrapeSettings,
    pub server: ServerSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone)]
pub struct SiteSettings {
    pub title: String,
    pub description: String,
    /// Canonical origin, always without a trailing slash.
    pub url: Url,
    pub author: Option<String>,
    pub language: String,
}

impl SiteSettings {
    /// Origin string without a trailing slash, e.g. `https://example.com`.
    pub fn origin(&self) -> String {
        self.url.as_str().trim_end_matches('/').to_string()
    }
}

#[derive(Debug, Clone)]
pub struct ContentSettings {
    pub posts_dir: PathBuf,
    pub external_cache: PathBuf,
    pub publications: PathBuf,
    pub output_dir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct FeedSettings {
    pub limit: Option<NonZeroUsize>,
}

#[derive(Debug, Clone)]
pub struct ScrapeSettings {
    pub url: Option<Url>,
    pub output: PathBuf,
    pub source: String,
    pub user_agent: Option<String>,
    pub timeout: Duration,
    pub max_retries: u32,
    pub backoff: Duration,
    pub card_selectors: Vec<String>,
    pub date_selectors: Vec<String>,
    pub link_path_prefix: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix("FOLIO").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;
    raw.apply_cli_overrides(cli);

    Settings::from_raw(raw)
}

/// Resolve configuration using the process arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    site: RawSiteSettings,
    content: RawContentSettings,
    feed: RawFeedSettings,
    scrape: RawScrapeSettings,
    server: RawServerSettings,
    logging: RawLoggingSettings,
}

impl RawSettings {
    fn apply_cli_overrides(&mut self, cli: &CliArgs) {
        if let Some(level) = cli.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = cli.log_json {
            self.logging.json = Some(json);
        }

        match cli.command.as_ref() {
            Some(Command::Build(args)) => {
                self.apply_site_override(&args.site);
                if let Some(out) = args.out.as_ref() {
                    self.content.output_dir = Some(out.clone());
                }
            }
            Some(Command::Feed(args)) => self.apply_site_override(&args.site),
            Some(Command::Scrape(args)) => self.apply_scrape_overrides(args),
            Some(Command::Serve(args)) => self.apply_serve_overrides(args),
            None => {}
        }
    }

    fn apply_site_override(&mut self, overrides: &SiteOverride) {
        if let Some(url) = overrides.site_url.as_ref() {
            self.site.url = Some(url.clone());
        }
    }

    fn apply_scrape_overrides(&mut self, overrides: &ScrapeArgs) {
        if let Some(url) = overrides.url.as_ref() {
            self.scrape.url = Some(url.clone());
        }
        if let Some(output) = overrides.output.as_ref() {
            self.scrape.output = Some(output.clone());
        }
    }

    fn apply_serve_overrides(&mut self, overrides: &ServeArgs) {
        self.apply_site_override(&overrides.site);
        if let Some(host) = overrides.host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.port {
            self.server.port = Some(port);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            site,
            content,
            feed,
            scrape,
            server,
            logging,
        } = raw;

        let site = build_site_settings(site)?;
        let content = build_content_settings(content)?;
        let feed = build_feed_settings(feed)?;
        let scrape = build_scrape_settings(scrape, &content)?;
        let server = build_server_settings(server)?;
        let logging = build_logging_settings(logging)?;

        Ok(Self {
            site,
            content,
            feed,
            scrape,
            server,
            logging,
        })
    }
}

fn build_site_settings(site: RawSiteSettings) -> Result<SiteSettings, LoadError> {
    let title = non_empty_or(site.title, DEFAULT_SITE_TITLE);
    let description = non_empty_or(site.description, DEFAULT_SITE_DESCRIPTION);
    let language = non_empty_or(site.language, DEFAULT_SITE_LANGUAGE);

    let raw_url = site.url.unwrap_or_else(|| DEFAULT_SITE_URL.to_string());
    let url = parse_http_url(&raw_url).map_err(|reason| LoadError::invalid("site.url", reason))?;
    if url.path() != "/" || url.query().is_some() || url.fragment().is_some() {
        return Err(LoadError::invalid(
            "site.url",
            "must be a bare origin without path, query or fragment",
        ));
    }

    let author = site.author.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    });

    Ok(SiteSettings {
        title,
        description,
        url,
        author,
        language,
    })
}

fn build_content_settings(content: RawContentSettings) -> Result<ContentSettings, LoadError> {
    let posts_dir = non_empty_path(content.posts_dir, DEFAULT_POSTS_DIR, "content.posts_dir")?;
    let external_cache = non_empty_path(
        content.external_cache,
        DEFAULT_EXTERNAL_CACHE,
        "content.external_cache",
    )?;
    let publications = non_empty_path(
        content.publications,
        DEFAULT_PUBLICATIONS,
        "content.publications",
    )?;
    let output_dir = non_empty_path(content.output_dir, DEFAULT_OUTPUT_DIR, "content.output_dir")?;

    Ok(ContentSettings {
        posts_dir,
        external_cache,
        publications,
        output_dir,
    })
}

fn build_feed_settings(feed: RawFeedSettings) -> Result<FeedSettings, LoadError> {
    let limit = match feed.limit {
        None => None,
        Some(value) => Some(
            NonZeroUsize::new(value)
                .ok_or_else(|| LoadError::invalid("feed.limit", "must be greater than zero"))?,
        ),
    };

    Ok(FeedSettings { limit })
}

fn build_scrape_settings(
    scrape: RawScrapeSettings,
    content: &ContentSettings,
) -> Result<ScrapeSettings, LoadError> {
    let url = match scrape.url.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(value) => {
            Some(parse_http_url(value).map_err(|reason| LoadError::invalid("scrape.url", reason))?)
        }
    };

    let output = scrape
        .output
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| content.external_cache.clone());

    let source = non_empty_or(scrape.source, DEFAULT_SCRAPE_SOURCE);

    let user_agent = scrape.user_agent.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    });

    let timeout_secs = scrape
        .timeout_seconds
        .unwrap_or(DEFAULT_SCRAPE_TIMEOUT_SECS);
    if timeout_secs == 0 {
        return Err(LoadError::invalid(
            "scrape.timeout_seconds",
            "must be greater than zero",
        ));
    }

    let max_retries = scrape.max_retries.unwrap_or(DEFAULT_SCRAPE_MAX_RETRIES);
    if max_retries > 10 {
        return Err(LoadError::invalid(
            "scrape.max_retries",
            "must not exceed 10",
        ));
    }

    let backoff = Duration::from_millis(
        scrape
            .backoff_millis
            .unwrap_or(DEFAULT_SCRAPE_BACKOFF_MILLIS),
    );

    let card_selectors = selector_list(
        scrape.card_selectors,
        DEFAULT_CARD_SELECTORS,
        "scrape.card_selectors",
    )?;
    let date_selectors = selector_list(
        scrape.date_selectors,
        DEFAULT_DATE_SELECTORS,
        "scrape.date_selectors",
    )?;

    let link_path_prefix = scrape.link_path_prefix.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    });

    Ok(ScrapeSettings {
        url,
        output,
        source,
        user_agent,
        timeout: Duration::from_secs(timeout_secs),
        max_retries,
        backoff,
        card_selectors,
        date_selectors,
        link_path_prefix,
    })
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());
    let port = server.port.unwrap_or(DEFAULT_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "port must be greater than zero",
        ));
    }

    let addr = parse_socket_addr(&host, port)
        .map_err(|reason| LoadError::invalid("server.addr", reason))?;

    Ok(ServerSettings { addr })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSiteSettings {
    title: Option<String>,
    description: Option<String>,
    url: Option<String>,
    author: Option<String>,
    language: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawContentSettings {
    posts_dir: Option<PathBuf>,
    external_cache: Option<PathBuf>,
    publications: Option<PathBuf>,
    output_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawFeedSettings {
    limit: Option<usize>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawScrapeSettings {
    url: Option<String>,
    output: Option<PathBuf>,
    source: Option<String>,
    user_agent: Option<String>,
    timeout_seconds: Option<u64>,
    max_retries: Option<u32>,
    backoff_millis: Option<u64>,
    card_selectors: Option<Vec<String>>,
    date_selectors: Option<Vec<String>>,
    link_path_prefix: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

fn non_empty_or(value: Option<String>, default: &str) -> String {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn non_empty_path(
    value: Option<PathBuf>,
    default: &str,
    key: &'static str,
) -> Result<PathBuf, LoadError> {
    let path = value.unwrap_or_else(|| PathBuf::from(default));
    if path.as_os_str().is_empty() {
        return Err(LoadError::invalid(key, "path must not be empty"));
    }
    Ok(path)
}

fn parse_http_url(value: &str) -> Result<Url, String> {
    let url = Url::parse(value.trim()).map_err(|err| format!("invalid URL `{value}`: {err}"))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(format!("unsupported scheme `{other}`, expected http or https")),
    }
}

/// Selectors are parsed up front so the scraper never meets an invalid one.
fn selector_list(
    value: Option<Vec<String>>,
    defaults: &[&str],
    key: &'static str,
) -> Result<Vec<String>, LoadError> {
    let selectors: Vec<String> = match value {
        Some(list) => list
            .into_iter()
            .map(|selector| selector.trim().to_string())
            .filter(|selector| !selector.is_empty())
            .collect(),
        None => defaults.iter().map(|selector| (*selector).to_string()).collect(),
    };

    if selectors.is_empty() {
        return Err(LoadError::invalid(key, "at least one selector is required"));
    }

    for selector in &selectors {
        selector
            .parse::<lol_html::Selector>()
            .map_err(|err| LoadError::invalid(key, format!("`{selector}`: {err}")))?;
    }

    Ok(selectors)
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}
