use std::{fs, path::Path};

use folio::{
    application::{
        aggregate::Category,
        site::{SiteBuilder, SiteContent},
    },
    config::{CliArgs, Settings, load},
    domain::types::SourceKind,
};
use tempfile::TempDir;
use time::macros::datetime;

const SURVIVING_FAILURES: &str = r#"+++
title = "Surviving Failures"
description = "Replication, quorum and a region going dark."
date = 2024-10-05
tags = ["reliability", "distributed-systems"]
image = "/images/blog/x.jpg"
+++

Body with ![diagram](/images/blog/diagram.png) and a [link](/blog/other/).
"#;

const DRAFT: &str = r#"+++
title = "Secret Draft"
description = "Not ready."
date = 2025-01-01
tags = ["reliability"]
draft = true
+++

Nothing to see.
"#;

const EXTERNAL_CACHE: &str = r#"
generated_at = "2024-10-06T12:00:00+00:00"
source_url = "https://www.cockroachlabs.com/author/someone/"

[[posts]]
title = "Getting Started with AI"
url = "https://www.cockroachlabs.com/blog/getting-started-with-ai/"
date = "2024-10-01"
excerpt = "Embeddings <script>alert(1)</script><b onclick=\"x()\">everywhere</b>."
source = "cockroach-labs"
tags = ["databases"]
"#;

const EXTERNAL_SURVIVING_FAILURES: &str = r#"
generated_at = "2024-10-06T12:00:00+00:00"
source_url = "https://www.cockroachlabs.com/author/someone/"

[[posts]]
title = "Surviving Failures"
url = "https://www.cockroachlabs.com/blog/surviving-failures/"
date = "2024-10-05"
excerpt = "Replication, quorum and a region going dark."
source = "cockroach-labs"
tags = ["reliability"]
"#;

const GETTING_STARTED: &str = r#"+++
title = "Getting Started with AI"
description = "Embeddings from first principles."
date = 2024-10-01
tags = ["ai"]
+++

## Setup

Install the driver.
"#;

const PUBLICATIONS: &str = r#"
[[publications]]
title = "Consensus Under Partial Partitions"
url = "https://example.org/paper.pdf"
venue = "SoCC"
date = "2020-06-01"
"#;

struct Fixture {
    dir: TempDir,
    settings: Settings,
}

impl Fixture {
    fn new() -> Self {
        Self::with(
            &[
                ("surviving-failures.md", SURVIVING_FAILURES),
                ("secret-draft.md", DRAFT),
            ],
            EXTERNAL_CACHE,
        )
    }

    fn with(posts: &[(&str, &str)], external_cache: &str) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path();
        fs::create_dir_all(root.join("content/blog")).expect("content dir");
        fs::create_dir_all(root.join("data")).expect("data dir");
        for (name, contents) in posts {
            fs::write(root.join("content/blog").join(name), contents).expect("post");
        }
        fs::write(root.join("data/external_posts.toml"), external_cache).expect("cache");
        fs::write(root.join("data/publications.toml"), PUBLICATIONS).expect("publications");

        let config = root.join("folio-test.toml");
        fs::write(&config, config_file(root)).expect("config");

        let cli = <CliArgs as clap::Parser>::parse_from([
            "folio",
            "--config-file",
            config.to_str().expect("utf8 path"),
            "build",
        ]);
        let settings = load(&cli).expect("settings");
        Self { dir, settings }
    }

    fn content(&self) -> SiteContent {
        SiteContent::load(&self.settings.content).expect("content")
    }
}

fn config_file(root: &Path) -> String {
    format!(
        r#"
[site]
title = "Notebook"
description = "Writing"
url = "https://example.com"

[content]
posts_dir = "{posts}"
external_cache = "{cache}"
publications = "{publications}"
output_dir = "{out}"
"#,
        posts = root.join("content/blog").display(),
        cache = root.join("data/external_posts.toml").display(),
        publications = root.join("data/publications.toml").display(),
        out = root.join("dist").display(),
    )
}

#[test]
fn aggregate_orders_every_source_by_date() {
    let fixture = Fixture::new();
    let aggregate = fixture.content().aggregate();

    let titles: Vec<&str> = aggregate
        .records()
        .iter()
        .map(|record| record.title.as_str())
        .collect();
    assert_eq!(
        titles,
        vec![
            "Surviving Failures",
            "Getting Started with AI",
            "Consensus Under Partial Partitions",
        ]
    );
    assert_eq!(
        aggregate
            .records()
            .iter()
            .map(|record| record.source)
            .collect::<Vec<_>>(),
        vec![SourceKind::Personal, SourceKind::External, SourceKind::Publication]
    );
}

#[test]
fn feed_starts_with_latest_post_and_absolutizes_hero() {
    let fixture = Fixture::new();
    let aggregate = fixture.content().aggregate();
    let builder = SiteBuilder::new(&fixture.settings);

    let xml = builder
        .syndication()
        .rss_feed(&aggregate, datetime!(2024-11-01 00:00 UTC))
        .expect("feed");

    let first_item = xml.split("<item>").nth(1).expect("first item");
    assert!(first_item.contains("<title>Surviving Failures</title>"));
    assert!(first_item.contains(
        "<enclosure url=\"https://example.com/images/blog/x.jpg\" type=\"image/jpeg\" length=\"0\"/>"
    ));
    assert!(first_item.contains("src=&quot;https://example.com/images/blog/x.jpg&quot;"));
    assert!(first_item.contains("src=&quot;https://example.com/images/blog/diagram.png&quot;"));
    assert!(!xml.contains("Secret Draft"));
    assert!(!xml.contains("alert(1)"));
    assert!(!xml.contains("onclick"));
}

#[test]
fn newer_external_post_leads_the_feed() {
    let fixture = Fixture::with(
        &[("getting-started-with-ai.md", GETTING_STARTED)],
        EXTERNAL_SURVIVING_FAILURES,
    );
    let aggregate = fixture.content().aggregate();

    let sources: Vec<(&str, SourceKind)> = aggregate
        .records()
        .iter()
        .map(|record| (record.title.as_str(), record.source))
        .collect();
    assert_eq!(
        sources,
        vec![
            ("Surviving Failures", SourceKind::External),
            ("Getting Started with AI", SourceKind::Personal),
            ("Consensus Under Partial Partitions", SourceKind::Publication),
        ]
    );

    let xml = SiteBuilder::new(&fixture.settings)
        .syndication()
        .rss_feed(&aggregate, datetime!(2024-11-01 00:00 UTC))
        .expect("feed");
    let first_item = xml.split("<item>").nth(1).expect("first item");
    assert!(first_item.contains("<title>Surviving Failures</title>"));
    assert!(
        first_item.contains("<link>https://www.cockroachlabs.com/blog/surviving-failures/</link>")
    );
    let second_item = xml.split("<item>").nth(2).expect("second item");
    assert!(second_item.contains("<title>Getting Started with AI</title>"));
    assert!(
        second_item.contains("<link>https://example.com/blog/getting-started-with-ai/</link>")
    );
}

#[test]
fn feed_is_idempotent_apart_from_build_date() {
    let fixture = Fixture::new();
    let builder = SiteBuilder::new(&fixture.settings);

    let render = |at| {
        builder
            .syndication()
            .rss_feed(&fixture.content().aggregate(), at)
            .expect("feed")
            .lines()
            .filter(|line| !line.contains("<lastBuildDate>"))
            .collect::<Vec<_>>()
            .join("\n")
    };

    assert_eq!(
        render(datetime!(2024-11-01 00:00 UTC)),
        render(datetime!(2030-01-01 09:30 UTC))
    );
}

#[tokio::test]
async fn build_writes_every_listing_without_drafts() {
    let fixture = Fixture::new();
    let aggregate = fixture.content().aggregate();
    let builder = SiteBuilder::new(&fixture.settings);
    let out = fixture.dir.path().join("dist");

    let summary = builder
        .build(&aggregate, &out, datetime!(2024-11-01 00:00 UTC))
        .await
        .expect("build");
    assert_eq!(summary.records, 3);

    for category in aggregate.categories() {
        let route = category.route();
        let path = out.join(route.trim_matches('/')).join("index.html");
        let html = fs::read_to_string(&path).unwrap_or_else(|_| panic!("missing {route}"));
        assert!(!html.contains("Secret Draft"), "draft leaked into {route}");
        assert!(!html.contains("<script>alert(1)"), "script leaked into {route}");
    }

    let all = fs::read_to_string(out.join("blog/index.html")).expect("all listing");
    let first = all.find("Surviving Failures").expect("personal card");
    let second = all.find("Getting Started with AI").expect("external card");
    let third = all.find("Consensus Under Partial Partitions").expect("publication");
    assert!(first < second && second < third);

    let publications = fs::read_to_string(out.join("blog/publications/index.html"))
        .expect("publications listing");
    assert!(publications.contains("SoCC"));
    assert!(!publications.contains("Surviving Failures"));

    let post = fs::read_to_string(out.join("blog/surviving-failures/index.html"))
        .expect("post page");
    assert!(post.contains("Surviving Failures"));
    assert!(post.contains("/images/blog/diagram.png"));
    assert!(!out.join("blog/secret-draft/index.html").exists());
    assert_eq!(summary.posts, 1);

    assert!(out.join("rss.xml").is_file());
    assert!(out.join("static/site.css").is_file());
    assert!(
        aggregate
            .categories()
            .iter()
            .any(|category| matches!(category, Category::Tag { name, .. } if name == "reliability"))
    );
}
