//! Application services: sources, aggregation, rendering and scraping.

pub mod aggregate;
pub mod error;
pub mod listing;
pub mod markdown;
pub mod scrape;
pub mod site;
pub mod sources;
pub mod syndication;
