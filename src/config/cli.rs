use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};

/// Command-line arguments for the folio binary.
#[derive(Debug, Parser)]
#[command(
    name = "folio",
    version,
    about = "Aggregate blog content, render listing pages and syndicate an RSS feed"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "FOLIO_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new(),
        global = true
    )]
    pub log_json: Option<bool>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Render every listing page and the RSS feed into the output directory.
    Build(BuildArgs),
    /// Write only the RSS document.
    Feed(FeedArgs),
    /// Refresh the external post cache from the configured author page.
    Scrape(ScrapeArgs),
    /// Serve the aggregated site over HTTP.
    Serve(ServeArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct SiteOverride {
    /// Override the canonical site origin used for absolute links.
    #[arg(long = "site-url", value_name = "URL")]
    pub site_url: Option<String>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct BuildArgs {
    #[command(flatten)]
    pub site: SiteOverride,

    /// Override the output directory.
    #[arg(long = "out", value_name = "DIR", value_hint = ValueHint::DirPath)]
    pub out: Option<PathBuf>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct FeedArgs {
    #[command(flatten)]
    pub site: SiteOverride,

    /// Destination file; the feed is written to stdout when omitted.
    #[arg(long = "out", value_name = "FILE", value_hint = ValueHint::FilePath)]
    pub out: Option<PathBuf>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ScrapeArgs {
    /// Override the author page to scrape.
    #[arg(long = "url", value_name = "URL")]
    pub url: Option<String>,

    /// Override the cache file written by the scraper.
    #[arg(long = "output", value_name = "FILE", value_hint = ValueHint::FilePath)]
    pub output: Option<PathBuf>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub site: SiteOverride,

    /// Override the listener host.
    #[arg(long = "host", value_name = "HOST")]
    pub host: Option<String>,

    /// Override the listener port.
    #[arg(long = "port", value_name = "PORT")]
    pub port: Option<u16>,
}
