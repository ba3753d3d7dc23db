//! Date recognition for scraped cards.

use time::{Date, format_description::FormatItem, macros::format_description};

use super::sanitize::collapse_whitespace;

/// Tried in order; the first format that parses the whole candidate wins.
const DATE_FORMATS: &[&[FormatItem<'static>]] = &[
    format_description!("[month repr:long case_sensitive:false] [day padding:none], [year]"),
    format_description!("[month repr:short case_sensitive:false] [day padding:none], [year]"),
    format_description!("[year]-[month]-[day]"),
    format_description!("[month padding:none]/[day padding:none]/[year]"),
];

const ISO_PREFIX_LEN: usize = "YYYY-MM-DD".len();

/// Parse one candidate string against the known formats.
pub fn parse_date(candidate: &str) -> Option<Date> {
    let normalized = collapse_whitespace(candidate);
    if normalized.is_empty() {
        return None;
    }

    DATE_FORMATS
        .iter()
        .find_map(|format| Date::parse(&normalized, *format).ok())
        .or_else(|| iso_datetime_prefix(&normalized))
}

/// `2024-10-05T09:00:00Z` and similar ISO-8601 datetimes.
fn iso_datetime_prefix(value: &str) -> Option<Date> {
    let prefix = value.get(..ISO_PREFIX_LEN)?;
    let rest = &value[ISO_PREFIX_LEN..];
    if !(rest.starts_with('T') || rest.starts_with(' ')) {
        return None;
    }
    Date::parse(prefix, DATE_FORMATS[2]).ok()
}

/// First candidate that parses, in the order supplied.
pub fn first_parsable<'a, I>(candidates: I) -> Option<Date>
where
    I: IntoIterator<Item = &'a str>,
{
    candidates.into_iter().find_map(parse_date)
}
