use std::{
    io::{self, Write},
    path::Path,
    process,
};

use folio::{
    application::{
        error::AppError,
        scrape::Scraper,
        site::{BuildError, SiteBuilder, SiteContent},
    },
    config::{self, Command},
    infra::{
        error::InfraError,
        http::{self, HttpState},
        telemetry,
    },
};
use time::OffsetDateTime;
use tracing::{Dispatch, Level, dispatcher, error, info};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt()
        .with_writer(io::stderr)
        .with_max_level(Level::ERROR)
        .finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()?;

    let command = cli_args
        .command
        .unwrap_or_else(|| Command::Build(config::BuildArgs::default()));

    telemetry::init(&settings.logging)?;

    match command {
        Command::Build(_) => run_build(settings).await,
        Command::Feed(args) => run_feed(settings, args).await,
        Command::Scrape(_) => run_scrape(settings).await,
        Command::Serve(_) => run_serve(settings).await,
    }
}

async fn run_build(settings: config::Settings) -> Result<(), AppError> {
    let content = SiteContent::load(&settings.content)?;
    let builder = SiteBuilder::new(&settings);
    builder
        .build(
            &content.aggregate(),
            &settings.content.output_dir,
            OffsetDateTime::now_utc(),
        )
        .await?;
    Ok(())
}

async fn run_feed(settings: config::Settings, args: config::FeedArgs) -> Result<(), AppError> {
    let content = SiteContent::load(&settings.content)?;
    let aggregate = content.aggregate();
    let builder = SiteBuilder::new(&settings);
    let feed = builder
        .syndication()
        .rss_feed(&aggregate, OffsetDateTime::now_utc())
        .map_err(BuildError::from)?;

    match args.out {
        Some(path) => {
            write_feed_file(&path, &feed).await?;
            info!(
                target = "folio::build",
                path = %path.display(),
                items = aggregate.len(),
                "feed written"
            );
        }
        None => {
            let mut stdout = io::stdout().lock();
            stdout
                .write_all(feed.as_bytes())
                .and_then(|()| stdout.flush())
                .map_err(InfraError::from)?;
        }
    }
    Ok(())
}

async fn write_feed_file(path: &Path, feed: &str) -> Result<(), InfraError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|err| InfraError::write(parent, err))?;
    }
    tokio::fs::write(path, feed)
        .await
        .map_err(|err| InfraError::write(path, err))
}

async fn run_scrape(settings: config::Settings) -> Result<(), AppError> {
    let scraper = Scraper::from_settings(&settings.scrape, &settings.site)?;
    scraper.run().await?;
    Ok(())
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let content = SiteContent::load(&settings.content)?;
    let builder = SiteBuilder::new(&settings);
    let state = HttpState::new(content.aggregate(), &builder);
    let router = http::build_router(state);

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(InfraError::from)?;
    info!(
        target = "folio::serve",
        addr = %settings.server.addr,
        "listening"
    );

    axum::serve(listener, router.into_make_service())
        .await
        .map_err(InfraError::from)?;

    Ok(())
}
