//! Whitelist sanitization for scraped excerpts.

use std::collections::{HashMap, HashSet};

use ammonia::Builder;
use once_cell::sync::Lazy;

const ALLOWED_TAGS: [&str; 9] = ["a", "b", "strong", "i", "em", "code", "br", "span", "p"];
const STRIPPED_CONTENT_TAGS: [&str; 9] = [
    "script", "style", "iframe", "object", "embed", "form", "input", "noscript", "template",
];
const ALLOWED_SCHEMES: [&str; 3] = ["http", "https", "mailto"];

static EXCERPT_SANITIZER: Lazy<Builder<'static>> = Lazy::new(|| {
    let mut builder = Builder::empty();
    builder
        .tags(HashSet::from(ALLOWED_TAGS))
        .tag_attributes(HashMap::from([("a", HashSet::from(["href", "title"]))]))
        .clean_content_tags(HashSet::from(STRIPPED_CONTENT_TAGS))
        .url_schemes(HashSet::from(ALLOWED_SCHEMES))
        .link_rel(Some("noopener noreferrer nofollow"))
        .strip_comments(true);
    builder
});

static TEXT_ONLY: Lazy<Builder<'static>> = Lazy::new(|| {
    let mut builder = Builder::empty();
    builder.clean_content_tags(HashSet::from(STRIPPED_CONTENT_TAGS));
    builder
});

/// Keep only inline formatting; drop active content and every `on*`
/// attribute.
pub fn sanitize_excerpt(html: &str) -> String {
    EXCERPT_SANITIZER.clean(html).to_string()
}

/// Visible text of an HTML fragment with entities decoded and whitespace
/// collapsed.
pub fn plain_text(html: &str) -> String {
    let stripped = TEXT_ONLY.clean(html).to_string();
    collapse_whitespace(&decode_entities(&stripped))
}

pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Decode the character references a scraped page commonly carries.
pub fn decode_entities(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find('&') {
        out.push_str(&rest[..start]);
        let candidate = &rest[start..];
        let decoded = candidate
            .find(';')
            .filter(|end| *end <= 10)
            .and_then(|end| decode_reference(&candidate[1..end]).map(|ch| (ch, end)));

        match decoded {
            Some((ch, end)) => {
                out.push(ch);
                rest = &candidate[end + 1..];
            }
            None => {
                out.push('&');
                rest = &candidate[1..];
            }
        }
    }

    out.push_str(rest);
    out
}

fn decode_reference(name: &str) -> Option<char> {
    if let Some(numeric) = name.strip_prefix('#') {
        let code = match numeric.strip_prefix(['x', 'X']) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => numeric.parse().ok()?,
        };
        return char::from_u32(code);
    }

    let ch = match name {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        "nbsp" => '\u{a0}',
        "ndash" => '–',
        "mdash" => '—',
        "hellip" => '…',
        "rsquo" => '’',
        "lsquo" => '‘',
        "rdquo" => '”',
        "ldquo" => '“',
        _ => return None,
    };
    Some(ch)
}
