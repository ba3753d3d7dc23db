//! RSS 2.0 feed generation.
//!
//! The document is assembled with `format!` so output is byte-stable for a
//! given aggregate; only `lastBuildDate` varies between runs.

use std::{cell::RefCell, num::NonZeroUsize, rc::Rc};

use lol_html::{RewriteStrSettings, element, rewrite_str};
use thiserror::Error;
use time::OffsetDateTime;
use url::Url;

use crate::{
    application::{
        aggregate::Aggregate,
        markdown::{escape_html, post_body_html},
        scrape::{sanitize::plain_text, sanitize_excerpt},
        sources::default_publication_excerpt,
    },
    config::{FeedSettings, SiteSettings},
    domain::{
        entities::PostRecord,
        posts::{rfc2822_date, rfc2822_timestamp},
        types::SourceKind,
    },
};

const CONTENT_NAMESPACE: &str = "http://purl.org/rss/1.0/modules/content/";
const ATOM_NAMESPACE: &str = "http://www.w3.org/2005/Atom";
pub const FEED_PATH: &str = "/rss.xml";

#[derive(Debug, Error)]
pub enum SyndicationError {
    #[error("failed to rewrite content links for `{title}`: {message}")]
    Rewrite { title: String, message: String },
}

/// Renders the aggregate as an RSS 2.0 channel.
#[derive(Debug, Clone)]
pub struct SyndicationService {
    site: SiteSettings,
    limit: Option<NonZeroUsize>,
}

impl SyndicationService {
    pub fn new(site: SiteSettings, feed: &FeedSettings) -> Self {
        Self {
            site,
            limit: feed.limit,
        }
    }

    pub fn rss_feed(
        &self,
        aggregate: &Aggregate,
        built_at: OffsetDateTime,
    ) -> Result<String, SyndicationError> {
        let origin = self.site.origin();
        let limit = self.limit.map_or(usize::MAX, NonZeroUsize::get);

        let mut items = String::new();
        for record in aggregate.records().iter().take(limit) {
            items.push_str(&self.render_item(record, &origin)?);
        }

        Ok(format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<rss version=\"2.0\" xmlns:content=\"{CONTENT_NAMESPACE}\" xmlns:atom=\"{ATOM_NAMESPACE}\">\n  <channel>\n    <title>{}</title>\n    <description>{}</description>\n    <link>{}/</link>\n    <language>{}</language>\n    <lastBuildDate>{}</lastBuildDate>\n    <atom:link href=\"{}{FEED_PATH}\" rel=\"self\" type=\"application/rss+xml\"/>\n{}  </channel>\n</rss>\n",
            xml_escape(&self.site.title),
            xml_escape(&self.site.description),
            xml_escape(&origin),
            xml_escape(&self.site.language),
            rfc2822_timestamp(built_at),
            xml_escape(&origin),
            items,
        ))
    }

    fn render_item(&self, record: &PostRecord, origin: &str) -> Result<String, SyndicationError> {
        let link = absolute_url(origin, &record.url);
        let content = match record.source {
            SourceKind::Personal => self.personal_content(record, origin, &link)?,
            SourceKind::External => external_content(record, &link),
            SourceKind::Publication => publication_content(record, &link),
        };

        let mut item = String::new();
        item.push_str("    <item>\n");
        item.push_str(&format!("      <title>{}</title>\n", xml_escape(&record.title)));
        let description = match record.source {
            SourceKind::External => plain_text(&record.excerpt),
            _ => record.excerpt.clone(),
        };
        item.push_str(&format!(
            "      <description>{}</description>\n",
            xml_escape(&description)
        ));
        item.push_str(&format!(
            "      <content:encoded>{}</content:encoded>\n",
            xml_escape(&content)
        ));
        item.push_str(&format!(
            "      <pubDate>{}</pubDate>\n",
            rfc2822_date(record.published_at)
        ));
        item.push_str(&format!("      <link>{}</link>\n", xml_escape(&link)));
        item.push_str(&format!(
            "      <guid isPermaLink=\"true\">{}</guid>\n",
            xml_escape(&link)
        ));
        for tag in &record.tags {
            item.push_str(&format!("      <category>{}</category>\n", xml_escape(tag)));
        }
        item.push_str(&format!("      <author>{}</author>\n", xml_escape(self.author())));
        if record.is_personal()
            && let Some(image) = record.hero_image.as_deref()
        {
            item.push_str(&format!(
                "      <enclosure url=\"{}\" type=\"image/jpeg\" length=\"0\"/>\n",
                xml_escape(&absolute_url(origin, image))
            ));
        }
        item.push_str("    </item>\n");

        Ok(item)
    }

    fn author(&self) -> &str {
        self.site.author.as_deref().unwrap_or(&self.site.title)
    }

    fn personal_content(
        &self,
        record: &PostRecord,
        origin: &str,
        link: &str,
    ) -> Result<String, SyndicationError> {
        let mut html = post_body_html(record);
        html.push_str(&format!(
            "<p><a href=\"{}\">Read the full post on {}</a></p>",
            escape_html(link),
            escape_html(&self.site.title)
        ));

        absolutize_links(&html, origin).map_err(|message| SyndicationError::Rewrite {
            title: record.title.clone(),
            message,
        })
    }
}

/// External excerpts are HTML from the scraper cache and are re-sanitized on the way out.
fn external_content(record: &PostRecord, link: &str) -> String {
    let host = Url::parse(link)
        .ok()
        .and_then(|url| url.host_str().map(|host| host.trim_start_matches("www.").to_string()))
        .unwrap_or_else(|| "the original site".to_string());

    let mut html = String::new();
    if !record.excerpt.trim().is_empty() {
        html.push_str(&format!("<p>{}</p>\n", sanitize_excerpt(&record.excerpt)));
    }
    html.push_str(&format!(
        "<p><a href=\"{}\">Read “{}” on {}</a></p>",
        escape_html(link),
        escape_html(&record.title),
        escape_html(&host)
    ));
    html
}

fn publication_content(record: &PostRecord, link: &str) -> String {
    let mut html = format!("<p>{}</p>\n", escape_html(&record.excerpt));
    if let Some(venue) = record.venue.as_deref()
        && record.excerpt != default_publication_excerpt(venue)
    {
        html.push_str(&format!("<p>Published in <em>{}</em>.</p>\n", escape_html(venue)));
    }
    html.push_str(&format!(
        "<p><a href=\"{}\">Read the publication</a></p>",
        escape_html(link)
    ));
    html
}

/// Rewrite every root-relative `src`/`href` to an absolute URL on `origin`.
fn absolutize_links(html: &str, origin: &str) -> Result<String, String> {
    let origin = Rc::new(origin.to_string());
    let rewritten = Rc::new(RefCell::new(0usize));

    let output = rewrite_str(
        html,
        RewriteStrSettings {
            element_content_handlers: vec![
                element!("img[src]", {
                    let origin = Rc::clone(&origin);
                    let rewritten = Rc::clone(&rewritten);
                    move |el| {
                        if let Some(src) = el.get_attribute("src")
                            && is_root_relative(&src)
                        {
                            el.set_attribute("src", &format!("{origin}{src}"))?;
                            *rewritten.borrow_mut() += 1;
                        }
                        Ok(())
                    }
                }),
                element!("a[href]", {
                    let origin = Rc::clone(&origin);
                    let rewritten = Rc::clone(&rewritten);
                    move |el| {
                        if let Some(href) = el.get_attribute("href")
                            && is_root_relative(&href)
                        {
                            el.set_attribute("href", &format!("{origin}{href}"))?;
                            *rewritten.borrow_mut() += 1;
                        }
                        Ok(())
                    }
                }),
            ],
            ..RewriteStrSettings::default()
        },
    )
    .map_err(|err| err.to_string())?;

    tracing::trace!(
        target = "folio::syndication",
        rewritten = *rewritten.borrow(),
        "absolutized content links"
    );

    Ok(output)
}

fn is_root_relative(value: &str) -> bool {
    value.starts_with('/') && !value.starts_with("//")
}

/// Absolute form of a site path; absolute URLs pass through.
pub fn absolute_url(origin: &str, value: &str) -> String {
    if value.starts_with("http://") || value.starts_with("https://") {
        value.to_string()
    } else if value.starts_with('/') {
        format!("{origin}{value}")
    } else {
        format!("{origin}/{value}")
    }
}

pub fn xml_escape(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

#[cfg(test)]
mod tests {
    use time::{
        Date,
        macros::{date, datetime},
    };

    use super::*;
    use crate::application::{
        aggregate::aggregate,
        sources::{ExternalPosts, LocalCollection, Publications},
    };

    fn site() -> SiteSettings {
        SiteSettings {
            title: "Notebook".to_string(),
            description: "Writing & notes".to_string(),
            url: Url::parse("https://example.com").expect("url"),
            author: Some("Ada".to_string()),
            language: "en-us".to_string(),
        }
    }

    fn personal(title: &str, published_at: Date, draft: bool) -> PostRecord {
        let slug = title.to_lowercase().replace(' ', "-");
        PostRecord {
            title: title.to_string(),
            published_at,
            url: format!("/blog/{slug}/"),
            excerpt: format!("About {title}"),
            tags: vec!["reliability".to_string()],
            source: SourceKind::Personal,
            hero_image: Some("/images/blog/x.jpg".to_string()),
            draft,
            body: Some("Intro with ![chart](/images/blog/chart.png).\n\nSee [more](/blog/other/).".to_string()),
            slug: Some(slug),
            venue: None,
        }
    }

    fn sample() -> Aggregate {
        let personal = LocalCollection::from_records(vec![
            personal("Surviving Failures", date!(2024 - 10 - 05), false),
            personal("Secret Draft", date!(2024 - 12 - 01), true),
        ]);
        let external = ExternalPosts::from_records(vec![PostRecord {
            title: "Getting Started with AI".to_string(),
            published_at: date!(2024 - 10 - 01),
            url: "https://www.cockroachlabs.com/blog/ai/".to_string(),
            excerpt: "A <em>primer</em>.".to_string(),
            tags: vec!["databases".to_string()],
            source: SourceKind::External,
            hero_image: None,
            draft: false,
            body: None,
            slug: None,
            venue: None,
        }]);
        let publications = Publications::from_records(vec![PostRecord {
            title: "Consensus in Practice".to_string(),
            published_at: date!(2020 - 06 - 01),
            url: "https://example.org/paper.pdf".to_string(),
            excerpt: "Published in SoCC.".to_string(),
            tags: vec!["publication".to_string()],
            source: SourceKind::Publication,
            hero_image: None,
            draft: false,
            body: None,
            slug: None,
            venue: Some("SoCC".to_string()),
        }]);
        aggregate(&personal, &external, &publications)
    }

    fn service(limit: Option<usize>) -> SyndicationService {
        SyndicationService::new(
            site(),
            &FeedSettings {
                limit: limit.and_then(NonZeroUsize::new),
            },
        )
    }

    #[test]
    fn channel_carries_namespaces_and_self_link() {
        let xml = service(None)
            .rss_feed(&sample(), datetime!(2024-11-01 12:00:00 UTC))
            .expect("feed");

        assert!(xml.contains("xmlns:content=\"http://purl.org/rss/1.0/modules/content/\""));
        assert!(xml.contains("xmlns:atom=\"http://www.w3.org/2005/Atom\""));
        assert!(xml.contains(
            "<atom:link href=\"https://example.com/rss.xml\" rel=\"self\" type=\"application/rss+xml\"/>"
        ));
        assert!(xml.contains("<lastBuildDate>Fri, 01 Nov 2024 12:00:00 +0000</lastBuildDate>"));
        assert!(xml.contains("<description>Writing &amp; notes</description>"));
        assert!(xml.contains("<language>en-us</language>"));
    }

    #[test]
    fn items_follow_aggregate_order_without_drafts() {
        let xml = service(None)
            .rss_feed(&sample(), datetime!(2024-11-01 12:00:00 UTC))
            .expect("feed");

        assert!(!xml.contains("Secret Draft"));
        let first = xml.find("<title>Surviving Failures</title>").expect("personal item");
        let second = xml.find("<title>Getting Started with AI</title>").expect("external item");
        let third = xml.find("<title>Consensus in Practice</title>").expect("publication");
        assert!(first < second && second < third);
        assert!(xml.contains("<pubDate>Sat, 05 Oct 2024 00:00:00 +0000</pubDate>"));
        assert!(xml.contains(
            "<guid isPermaLink=\"true\">https://example.com/blog/surviving-failures/</guid>"
        ));
        assert!(xml.contains("<author>Ada</author>"));
    }

    #[test]
    fn hero_image_becomes_absolute_enclosure_and_content() {
        let xml = service(None)
            .rss_feed(&sample(), datetime!(2024-11-01 12:00:00 UTC))
            .expect("feed");

        assert!(xml.contains(
            "<enclosure url=\"https://example.com/images/blog/x.jpg\" type=\"image/jpeg\" length=\"0\"/>"
        ));
        assert!(xml.contains("&lt;img src=&quot;https://example.com/images/blog/x.jpg&quot;"));
        assert!(xml.contains("src=&quot;https://example.com/images/blog/chart.png&quot;"));
        assert!(xml.contains("href=&quot;https://example.com/blog/other/&quot;"));
        assert!(!xml.contains("src=&quot;/images/"));
        assert_eq!(xml.matches("<enclosure").count(), 1);
    }

    #[test]
    fn content_is_escaped_not_cdata() {
        let xml = service(None)
            .rss_feed(&sample(), datetime!(2024-11-01 12:00:00 UTC))
            .expect("feed");

        assert!(!xml.contains("CDATA"));
        assert!(xml.contains("&lt;p&gt;A &lt;em&gt;primer&lt;/em&gt;.&lt;/p&gt;"));
        assert_eq!(xml.matches("Published in").count(), 2);
        assert!(!xml.contains("Published in &lt;em&gt;SoCC&lt;/em&gt;."));
        assert!(xml.contains("<description>A primer.</description>"));
    }

    #[test]
    fn publication_venue_is_stated_once() {
        let mut talk = PostRecord {
            title: "Resilience Talk".to_string(),
            published_at: date!(2021 - 03 - 04),
            url: "https://example.org/talk".to_string(),
            excerpt: "Slides and recording.".to_string(),
            tags: vec!["talks".to_string()],
            source: SourceKind::Publication,
            hero_image: None,
            draft: false,
            body: None,
            slug: None,
            venue: Some("QCon".to_string()),
        };
        let with_excerpt = publication_content(&talk, &talk.url);
        assert!(with_excerpt.contains("<p>Slides and recording.</p>"));
        assert!(with_excerpt.contains("Published in <em>QCon</em>."));

        talk.excerpt = default_publication_excerpt("QCon");
        let defaulted = publication_content(&talk, &talk.url);
        assert_eq!(defaulted.matches("Published in").count(), 1);
        assert!(defaulted.starts_with("<p>Published in QCon.</p>"));
    }

    #[test]
    fn output_is_stable_apart_from_build_date() {
        let aggregate = sample();
        let service = service(None);
        let first = service
            .rss_feed(&aggregate, datetime!(2024-11-01 12:00:00 UTC))
            .expect("feed");
        let second = service
            .rss_feed(&aggregate, datetime!(2025-01-01 08:00:00 UTC))
            .expect("feed");

        let strip = |xml: &str| {
            xml.lines()
                .filter(|line| !line.contains("<lastBuildDate>"))
                .collect::<Vec<_>>()
                .join("\n")
        };
        assert_ne!(first, second);
        assert_eq!(strip(&first), strip(&second));
    }

    #[test]
    fn limit_caps_items() {
        let xml = service(Some(1))
            .rss_feed(&sample(), datetime!(2024-11-01 12:00:00 UTC))
            .expect("feed");
        assert_eq!(xml.matches("<item>").count(), 1);
    }

    #[test]
    fn absolute_url_handles_all_shapes() {
        assert_eq!(
            absolute_url("https://example.com", "/images/a.jpg"),
            "https://example.com/images/a.jpg"
        );
        assert_eq!(
            absolute_url("https://example.com", "images/a.jpg"),
            "https://example.com/images/a.jpg"
        );
        assert_eq!(
            absolute_url("https://example.com", "https://cdn.example.net/a.jpg"),
            "https://cdn.example.net/a.jpg"
        );
    }
}
