//! Streaming, selector-driven extraction of post cards from an author page.

use std::{cell::RefCell, collections::HashMap, rc::Rc};

use lol_html::{
    EndTagHandler, RewriteStrSettings, Selector, element, html_content::EndTag, rewrite_str, text,
};
use tracing::debug;
use url::Url;

use super::{
    ScrapeError,
    sanitize::{collapse_whitespace, decode_entities},
};

const SUMMARY_SELECTOR: &str =
    "div[class*=\"excerpt\"], div[class*=\"description\"], div[class*=\"summary\"]";
const SKIPPED_LINK_PREFIXES: [&str; 4] = ["#", "mailto:", "javascript:", "tel:"];

/// Selector configuration for one extraction run.
#[derive(Debug, Clone)]
pub struct ExtractOptions {
    /// Tried in order; the first selector that yields any card wins.
    pub card_selectors: Vec<String>,
    pub date_selectors: Vec<String>,
    /// Only links whose resolved path starts with this prefix count.
    pub link_path_prefix: Option<String>,
}

/// Everything captured from one card before validation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawCard {
    pub title: Option<String>,
    pub url: Option<Url>,
    pub image: Option<Url>,
    pub date_candidates: Vec<String>,
    pub excerpt_html: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct CardScan {
    /// Selector that produced the cards, if any did.
    pub selector: Option<String>,
    pub cards: Vec<RawCard>,
}

/// Scan `html` with the card selector chain.
pub fn scan_cards(
    html: &str,
    page_url: &Url,
    options: &ExtractOptions,
) -> Result<CardScan, ScrapeError> {
    for selector in &options.card_selectors {
        let cards = scan_with(html, page_url, selector, options)?;
        debug!(
            target = "folio::scrape",
            selector = selector.as_str(),
            cards = cards.len(),
            "card selector evaluated"
        );
        if !cards.is_empty() {
            return Ok(CardScan {
                selector: Some(selector.clone()),
                cards,
            });
        }
    }

    Ok(CardScan::default())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    H2,
    H3,
    AnchorText,
    Paragraph,
    Summary,
    Date(usize),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum Phase {
    #[default]
    Idle,
    Active,
    Done,
}

#[derive(Debug, Default)]
struct Capture {
    phase: Phase,
    buffer: String,
}

#[derive(Debug, Default)]
struct CardState {
    h2: Capture,
    h3: Capture,
    anchor_text: Capture,
    paragraph: Capture,
    summary: Capture,
    dates: Vec<Capture>,
    date_attributes: Vec<Option<String>>,
    url: Option<Url>,
    image: Option<Url>,
}

impl CardState {
    fn new(date_selectors: usize) -> Self {
        Self {
            dates: (0..date_selectors).map(|_| Capture::default()).collect(),
            date_attributes: vec![None; date_selectors],
            ..Self::default()
        }
    }

    fn capture(&mut self, slot: Slot) -> Option<&mut Capture> {
        match slot {
            Slot::H2 => Some(&mut self.h2),
            Slot::H3 => Some(&mut self.h3),
            Slot::AnchorText => Some(&mut self.anchor_text),
            Slot::Paragraph => Some(&mut self.paragraph),
            Slot::Summary => Some(&mut self.summary),
            Slot::Date(index) => self.dates.get_mut(index),
        }
    }

    fn into_raw(self) -> RawCard {
        let title = [&self.h2, &self.h3, &self.anchor_text]
            .into_iter()
            .map(|capture| collapse_whitespace(&decode_entities(&capture.buffer)))
            .find(|text| !text.is_empty());

        let date_candidates = self
            .date_attributes
            .into_iter()
            .zip(self.dates)
            .flat_map(|(attribute, capture)| {
                let text = collapse_whitespace(&decode_entities(&capture.buffer));
                attribute.into_iter().chain((!text.is_empty()).then_some(text))
            })
            .collect();

        let excerpt_html = [self.paragraph.buffer, self.summary.buffer]
            .into_iter()
            .map(|html| html.trim().to_string())
            .find(|html| !html.is_empty());

        RawCard {
            title,
            url: self.url,
            image: self.image,
            date_candidates,
            excerpt_html,
        }
    }
}

/// A card closed during the scan, with its document position and nesting.
#[derive(Debug)]
struct ClosedCard {
    seq: usize,
    depth: usize,
    card: RawCard,
}

/// Open cards form a stack: nested selector matches each get their own
/// captures, and every capture handler feeds all open cards.
#[derive(Debug, Default)]
struct ScanState {
    open: Vec<(usize, CardState)>,
    next_seq: usize,
    closed: Vec<ClosedCard>,
}

impl ScanState {
    fn cards(&mut self) -> impl Iterator<Item = &mut CardState> {
        self.open.iter_mut().map(|(_, card)| card)
    }

    fn open_card(&mut self, date_selectors: usize) {
        self.open.push((self.next_seq, CardState::new(date_selectors)));
        self.next_seq += 1;
    }

    fn close_card(&mut self) {
        if let Some((seq, card)) = self.open.pop() {
            self.closed.push(ClosedCard {
                seq,
                depth: self.open.len(),
                card: card.into_raw(),
            });
        }
    }

    /// Activates idle captures; returns the stack positions that started.
    fn start(&mut self, slot: Slot) -> Vec<usize> {
        self.cards()
            .enumerate()
            .filter_map(|(position, card)| match card.capture(slot) {
                Some(capture) if capture.phase == Phase::Idle => {
                    capture.phase = Phase::Active;
                    Some(position)
                }
                _ => None,
            })
            .collect()
    }

    fn finish(&mut self, slot: Slot) {
        for card in self.cards() {
            if let Some(capture) = card.capture(slot)
                && capture.phase == Phase::Active
            {
                capture.phase = Phase::Done;
            }
        }
    }

    fn append(&mut self, slot: Slot, fragment: &str) {
        for card in self.cards() {
            if let Some(capture) = card.capture(slot)
                && capture.phase == Phase::Active
            {
                capture.buffer.push_str(fragment);
            }
        }
    }

    /// Markup captures that are currently recording nested elements.
    fn active_markup_slots(&mut self) -> Vec<Slot> {
        [Slot::Paragraph, Slot::Summary]
            .into_iter()
            .filter(|slot| {
                self.cards().any(|card| {
                    card.capture(*slot)
                        .is_some_and(|capture| capture.phase == Phase::Active)
                })
            })
            .collect()
    }

    /// Cards in document order. A link claimed by several nested matches
    /// stays with the innermost one; link-less matches nested inside another
    /// card are fragments of it and are dropped.
    fn into_cards(mut self) -> Vec<RawCard> {
        while !self.open.is_empty() {
            self.close_card();
        }

        let mut owners: HashMap<Url, (usize, usize)> = HashMap::new();
        for closed in &self.closed {
            if let Some(url) = closed.card.url.as_ref() {
                let owner = owners
                    .entry(url.clone())
                    .or_insert((closed.depth, closed.seq));
                if closed.depth > owner.0 || (closed.depth == owner.0 && closed.seq < owner.1) {
                    *owner = (closed.depth, closed.seq);
                }
            }
        }

        let mut kept: Vec<ClosedCard> = self
            .closed
            .into_iter()
            .filter(|closed| match closed.card.url.as_ref() {
                Some(url) => owners.get(url) == Some(&(closed.depth, closed.seq)),
                None => closed.depth == 0,
            })
            .collect();
        kept.sort_by_key(|closed| closed.seq);
        kept.into_iter().map(|closed| closed.card).collect()
    }
}

fn scan_with(
    html: &str,
    page_url: &Url,
    card_selector: &str,
    options: &ExtractOptions,
) -> Result<Vec<RawCard>, ScrapeError> {
    let date_count = options.date_selectors.len();
    let state = Rc::new(RefCell::new(ScanState::default()));

    let mut captures: Vec<(Slot, String)> = vec![
        (Slot::H2, descendant(card_selector, "h2")),
        (Slot::H3, descendant(card_selector, "h3")),
        (Slot::AnchorText, descendant(card_selector, "a")),
        (Slot::Paragraph, descendant(card_selector, "p")),
        (Slot::Summary, descendant(card_selector, SUMMARY_SELECTOR)),
    ];
    captures.extend(
        options
            .date_selectors
            .iter()
            .enumerate()
            .map(|(index, selector)| (Slot::Date(index), descendant(card_selector, selector))),
    );
    let link_selector = descendant(card_selector, "a[href]");
    let image_selector = descendant(card_selector, "img[src]");
    let markup_selector = format!(
        "{}, {}",
        descendant(card_selector, "p *"),
        descendant(card_selector, &format!("{SUMMARY_SELECTOR} *"))
    );

    for selector in [card_selector, &link_selector, &image_selector, &markup_selector]
        .into_iter()
        .chain(captures.iter().map(|(_, selector)| selector.as_str()))
    {
        validate_selector(selector)?;
    }

    let mut handlers = vec![
        element!(card_selector, {
            let state = Rc::clone(&state);
            move |el| {
                state.borrow_mut().open_card(date_count);
                match el.end_tag_handlers() {
                    Some(handlers) => {
                        let state = Rc::clone(&state);
                        let on_end: EndTagHandler<'static> =
                            Box::new(move |_end: &mut EndTag<'_>| {
                                state.borrow_mut().close_card();
                                Ok(())
                            });
                        handlers.push(on_end);
                    }
                    None => state.borrow_mut().close_card(),
                }
                Ok(())
            }
        }),
        element!(link_selector.as_str(), {
            let state = Rc::clone(&state);
            let page_url = page_url.clone();
            let prefix = options.link_path_prefix.clone();
            move |el| {
                let Some(href) = el.get_attribute("href") else {
                    return Ok(());
                };
                let Some(url) = resolve_link(&page_url, &href, prefix.as_deref()) else {
                    return Ok(());
                };
                for card in state.borrow_mut().cards() {
                    if card.url.is_none() {
                        card.url = Some(url.clone());
                    }
                }
                Ok(())
            }
        }),
        element!(image_selector.as_str(), {
            let state = Rc::clone(&state);
            let page_url = page_url.clone();
            move |el| {
                let Some(image) = el
                    .get_attribute("src")
                    .and_then(|src| resolve_http(&page_url, &src))
                else {
                    return Ok(());
                };
                for card in state.borrow_mut().cards() {
                    if card.image.is_none() {
                        card.image = Some(image.clone());
                    }
                }
                Ok(())
            }
        }),
        element!(markup_selector.as_str(), {
            let state = Rc::clone(&state);
            move |el| {
                let slots = state.borrow_mut().active_markup_slots();
                if slots.is_empty() {
                    return Ok(());
                }

                let tag = el.tag_name();
                let mut start = format!("<{tag}");
                for attribute in el.attributes() {
                    start.push_str(&format!(
                        " {}=\"{}\"",
                        attribute.name(),
                        attribute.value().replace('"', "&quot;")
                    ));
                }
                start.push('>');

                {
                    let mut state = state.borrow_mut();
                    for slot in &slots {
                        state.append(*slot, &start);
                    }
                }

                if let Some(handlers) = el.end_tag_handlers() {
                    let state = Rc::clone(&state);
                    let on_end: EndTagHandler<'static> = Box::new(move |_end: &mut EndTag<'_>| {
                        let mut state = state.borrow_mut();
                        for slot in &slots {
                            state.append(*slot, &format!("</{tag}>"));
                        }
                        Ok(())
                    });
                    handlers.push(on_end);
                }
                Ok(())
            }
        }),
    ];

    for (slot, selector) in &captures {
        let slot = *slot;
        handlers.push(element!(selector.as_str(), {
            let state = Rc::clone(&state);
            move |el| {
                let started = state.borrow_mut().start(slot);
                if started.is_empty() {
                    return Ok(());
                }

                if let Slot::Date(index) = slot
                    && let Some(datetime) = el.get_attribute("datetime")
                {
                    let mut state = state.borrow_mut();
                    for position in started {
                        if let Some((_, card)) = state.open.get_mut(position)
                            && let Some(entry) = card.date_attributes.get_mut(index)
                            && entry.is_none()
                        {
                            *entry = Some(datetime.clone());
                        }
                    }
                }

                match el.end_tag_handlers() {
                    Some(handlers) => {
                        let state = Rc::clone(&state);
                        let on_end: EndTagHandler<'static> =
                            Box::new(move |_end: &mut EndTag<'_>| {
                                state.borrow_mut().finish(slot);
                                Ok(())
                            });
                        handlers.push(on_end);
                    }
                    None => state.borrow_mut().finish(slot),
                }
                Ok(())
            }
        }));
        handlers.push(text!(selector.as_str(), {
            let state = Rc::clone(&state);
            move |chunk| {
                state.borrow_mut().append(slot, chunk.as_str());
                Ok(())
            }
        }));
    }

    rewrite_str(
        html,
        RewriteStrSettings {
            element_content_handlers: handlers,
            ..RewriteStrSettings::default()
        },
    )
    .map_err(|err| ScrapeError::Parse(err.to_string()))?;

    let state = std::mem::take(&mut *state.borrow_mut());
    Ok(state.into_cards())
}

fn validate_selector(selector: &str) -> Result<(), ScrapeError> {
    selector
        .parse::<Selector>()
        .map(|_| ())
        .map_err(|err| ScrapeError::Selector {
            selector: selector.to_string(),
            message: err.to_string(),
        })
}

/// Scope every alternative of `child` under every alternative of `scope`.
pub fn descendant(scope: &str, child: &str) -> String {
    let scopes = split_selector_list(scope);
    let children = split_selector_list(child);
    scopes
        .iter()
        .flat_map(|scope| children.iter().map(move |child| format!("{scope} {child}")))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Split on top-level commas, ignoring those inside brackets or quotes.
fn split_selector_list(list: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut start = 0;

    for (index, ch) in list.char_indices() {
        match (quote, ch) {
            (Some(open), ch) if ch == open => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(ch),
            (None, '[' | '(') => depth += 1,
            (None, ']' | ')') => depth = depth.saturating_sub(1),
            (None, ',') if depth == 0 => {
                parts.push(list[start..index].trim());
                start = index + 1;
            }
            _ => {}
        }
    }
    parts.push(list[start..].trim());
    parts.retain(|part| !part.is_empty());
    parts
}

fn resolve_link(page_url: &Url, href: &str, prefix: Option<&str>) -> Option<Url> {
    let href = href.trim();
    if href.is_empty()
        || SKIPPED_LINK_PREFIXES
            .iter()
            .any(|skipped| href.to_ascii_lowercase().starts_with(skipped))
    {
        return None;
    }

    let url = resolve_http(page_url, href)?;
    match prefix {
        Some(prefix) if !url.path().starts_with(prefix) => None,
        _ => Some(url),
    }
}

fn resolve_http(page_url: &Url, value: &str) -> Option<Url> {
    let url = page_url.join(value.trim()).ok()?;
    matches!(url.scheme(), "http" | "https").then_some(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> ExtractOptions {
        ExtractOptions {
            card_selectors: vec![
                "article".to_string(),
                "div[class*=\"post\"], div[class*=\"article\"], div[class*=\"card\"]".to_string(),
            ],
            date_selectors: vec![
                "time".to_string(),
                "span[class*=\"date\"]".to_string(),
                "[datetime]".to_string(),
            ],
            link_path_prefix: None,
        }
    }

    fn page() -> Url {
        Url::parse("https://www.cockroachlabs.com/author/someone/").expect("url")
    }

    #[test]
    fn extracts_article_cards() {
        let html = r#"
            <main>
              <article>
                <img src="/images/hero.png">
                <h2><a href="/blog/surviving-failures/">Surviving &amp; Thriving</a></h2>
                <time datetime="2024-10-05">October 5, 2024</time>
                <p>Replicas <em onclick="x()">keep</em> serving.</p>
                <p>Second paragraph.</p>
              </article>
              <article>
                <h3>Second</h3>
                <a href="https://other.example.com/post">read</a>
                <span class="post-date">Oct 1, 2024</span>
              </article>
            </main>"#;

        let scan = scan_cards(html, &page(), &options()).expect("scan");
        assert_eq!(scan.selector.as_deref(), Some("article"));
        assert_eq!(scan.cards.len(), 2);

        let first = &scan.cards[0];
        assert_eq!(first.title.as_deref(), Some("Surviving & Thriving"));
        assert_eq!(
            first.url.as_ref().map(Url::as_str),
            Some("https://www.cockroachlabs.com/blog/surviving-failures/")
        );
        assert_eq!(
            first.image.as_ref().map(Url::as_str),
            Some("https://www.cockroachlabs.com/images/hero.png")
        );
        assert_eq!(first.date_candidates[0], "2024-10-05");
        assert_eq!(
            first.excerpt_html.as_deref(),
            Some("Replicas <em onclick=\"x()\">keep</em> serving.")
        );

        let second = &scan.cards[1];
        assert_eq!(second.title.as_deref(), Some("Second"));
        assert_eq!(second.date_candidates, vec!["Oct 1, 2024"]);
        assert!(second.excerpt_html.is_none());
    }

    #[test]
    fn falls_back_to_div_cards_and_ignores_nested_matches() {
        let html = r#"
            <div class="post-card">
              <div class="post-meta"><span class="date">01/05/2024</span></div>
              <h3><a href="/blog/one/">One</a></h3>
              <div class="post-summary">Summary <b>text</b></div>
            </div>
            <div class="card"><h2>No link here</h2></div>"#;

        let scan = scan_cards(html, &page(), &options()).expect("scan");
        assert_eq!(scan.cards.len(), 2);
        assert_eq!(scan.cards[0].title.as_deref(), Some("One"));
        assert_eq!(scan.cards[0].date_candidates, vec!["01/05/2024"]);
        assert_eq!(
            scan.cards[0].excerpt_html.as_deref(),
            Some("Summary <b>text</b>")
        );
        assert!(scan.cards[1].url.is_none());
    }

    #[test]
    fn wrapper_divs_do_not_swallow_their_cards() {
        let html = r#"
            <div class="post-list">
              <h2>Latest posts</h2>
              <div class="post-card">
                <h3><a href="/blog/one/">One</a></h3>
                <span class="date">Oct 1, 2024</span>
              </div>
              <div class="post-card">
                <h3><a href="/blog/two/">Two</a></h3>
                <span class="date">Sep 1, 2024</span>
              </div>
              <div class="post-card">
                <h3><a href="/blog/three/">Three</a></h3>
                <span class="date">Aug 1, 2024</span>
              </div>
            </div>"#;

        let scan = scan_cards(html, &page(), &options()).expect("scan");
        let titles: Vec<_> = scan
            .cards
            .iter()
            .map(|card| card.title.as_deref().unwrap_or_default())
            .collect();
        assert_eq!(titles, vec!["One", "Two", "Three"]);
        assert_eq!(scan.cards[1].date_candidates, vec!["Sep 1, 2024"]);
        assert_eq!(
            scan.cards[2].url.as_ref().map(Url::path),
            Some("/blog/three/")
        );
    }

    #[test]
    fn skips_anchor_and_mailto_links() {
        let html = r##"
            <article>
              <a href="#top">Top</a>
              <a href="mailto:me@example.com">Mail</a>
              <a href="/blog/real/">Real</a>
            </article>"##;

        let scan = scan_cards(html, &page(), &options()).expect("scan");
        assert_eq!(
            scan.cards[0].url.as_ref().map(Url::path),
            Some("/blog/real/")
        );
        assert_eq!(scan.cards[0].title.as_deref(), Some("Top"));
    }

    #[test]
    fn link_prefix_filters_links() {
        let mut options = options();
        options.link_path_prefix = Some("/blog/".to_string());
        let html = r#"<article><a href="/author/x/">Author</a><a href="/blog/y/">Post</a></article>"#;

        let scan = scan_cards(html, &page(), &options).expect("scan");
        assert_eq!(scan.cards[0].url.as_ref().map(Url::path), Some("/blog/y/"));
    }

    #[test]
    fn no_cards_yields_empty_scan() {
        let scan = scan_cards("<html><body><p>nothing</p></body></html>", &page(), &options())
            .expect("scan");
        assert!(scan.cards.is_empty());
        assert!(scan.selector.is_none());
    }

    #[test]
    fn descendant_distributes_selector_lists() {
        assert_eq!(
            descendant("div[class*=\"a,b\"], article", "h2, h3"),
            "div[class*=\"a,b\"] h2, div[class*=\"a,b\"] h3, article h2, article h3"
        );
    }
}
