//! Date formats and helpers shared by content sources, listings and feeds.

use time::{
    Date, OffsetDateTime, format_description::FormatItem,
    format_description::well_known::Rfc2822, macros::format_description,
};

pub const HUMAN_DATE_FORMAT: &[FormatItem<'static>] =
    format_description!("[month repr:long] [day padding:none], [year]");
pub const ISO_DATE_FORMAT: &[FormatItem<'static>] =
    format_description!("[year]-[month]-[day]");

time::serde::format_description!(pub iso_date, Date, "[year]-[month]-[day]");
time::serde::format_description!(
    pub timestamp,
    OffsetDateTime,
    "[year]-[month]-[day]T[hour]:[minute]:[second][offset_hour sign:mandatory]:[offset_minute]"
);

pub fn format_human_date(date: Date) -> String {
    date.format(HUMAN_DATE_FORMAT)
        .unwrap_or_else(|_| date.to_string())
}

pub fn format_iso_date(date: Date) -> String {
    date.format(ISO_DATE_FORMAT)
        .unwrap_or_else(|_| date.to_string())
}

pub fn parse_iso_date(value: &str) -> Result<Date, time::error::Parse> {
    Date::parse(value.trim(), ISO_DATE_FORMAT)
}

/// RFC 2822 rendering of a calendar date at midnight UTC.
pub fn rfc2822_date(date: Date) -> String {
    rfc2822_timestamp(date.midnight().assume_utc())
}

pub fn rfc2822_timestamp(at: OffsetDateTime) -> String {
    at.format(&Rfc2822).unwrap_or_else(|_| at.to_string())
}

#[cfg(test)]
mod tests {
    use time::macros::{date, datetime};

    use super::*;

    #[test]
    fn human_date_drops_day_padding() {
        assert_eq!(format_human_date(date!(2024 - 01 - 05)), "January 5, 2024");
    }

    #[test]
    fn rfc2822_renders_midnight_utc() {
        assert_eq!(
            rfc2822_date(date!(2024 - 10 - 05)),
            "Sat, 05 Oct 2024 00:00:00 +0000"
        );
    }

    #[test]
    fn rfc2822_timestamp_keeps_time_of_day() {
        let at = datetime!(2024-10-05 13:45:10 UTC);
        assert_eq!(rfc2822_timestamp(at), "Sat, 05 Oct 2024 13:45:10 +0000");
    }

    #[test]
    fn parse_iso_date_trims_whitespace() {
        assert_eq!(
            parse_iso_date(" 2020-06-01 ").expect("valid date"),
            date!(2020 - 06 - 01)
        );
        assert!(parse_iso_date("2020-13-01").is_err());
    }
}
