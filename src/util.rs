//! Small helpers shared by the store, the query layer and the CLI.
//!
//! Id generation, string sanitisation and truncation, tag normalisation,
//! and due-date parsing/formatting.

use chrono::{Datelike, Duration, NaiveDate};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::fields::Status;

/// Maximum title length after sanitisation.
pub const MAX_TITLE_LEN: usize = 200;
/// Maximum length of a single tag.
pub const MAX_TAG_LEN: usize = 20;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Generate a fresh task identifier. UUID v7 keeps ids unique and time-ordered.
pub fn generate_id() -> String {
    Uuid::now_v7().to_string()
}

/// `part` as a rounded percentage of `total`; 0 when `total` is 0.
pub fn percentage(part: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    (100.0 * part as f64 / total as f64).round() as u8
}

/// Escape the characters that are significant in HTML markup.
pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#039;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Reverse [`escape_html`].
pub fn unescape_html(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#039;", "'")
        .replace("&amp;", "&")
}

/// Trim surrounding whitespace and escape markup.
pub fn sanitize(s: &str) -> String {
    escape_html(s.trim())
}

/// Cut a string down to at most `max` characters.
pub fn truncate(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

/// Truncate a string to a display width, adding an ellipsis if needed.
pub fn ellipsize(s: &str, width: usize) -> String {
    if s.chars().count() <= width {
        s.to_string()
    } else {
        let mut out: String = s.chars().take(width.saturating_sub(1)).collect();
        out.push('…');
        out
    }
}

/// Sanitise and bound a title, failing if nothing is left.
pub fn clean_title(raw: &str) -> Result<String> {
    let title = truncate(&sanitize(raw), MAX_TITLE_LEN);
    if title.is_empty() {
        return Err(Error::Validation("title cannot be empty".into()));
    }
    Ok(title)
}

/// Normalise a tag: trimmed, lowercase, spaces to hyphens, at most 20 chars.
pub fn normalise_tag(s: &str) -> String {
    truncate(&s.trim().to_lowercase().replace(' ', "-"), MAX_TAG_LEN)
}

/// Normalise a list of tags, splitting comma-separated entries.
/// Order is kept and duplicates are not removed.
pub fn normalise_tags<S: AsRef<str>>(inputs: &[S]) -> Vec<String> {
    inputs
        .iter()
        .flat_map(|raw| raw.as_ref().split(','))
        .map(normalise_tag)
        .filter(|t| !t.is_empty())
        .collect()
}

/// Parse a strict ISO `YYYY-MM-DD` date.
pub fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), DATE_FORMAT)
        .map_err(|_| Error::Validation(format!("invalid due date '{}'", s.trim())))
}

/// Format a date as `YYYY-MM-DD`.
pub fn format_date(d: NaiveDate) -> String {
    d.format(DATE_FORMAT).to_string()
}

/// An active task is overdue when its due date is strictly before today.
pub fn is_overdue(due: Option<NaiveDate>, status: Status, today: NaiveDate) -> bool {
    status == Status::Active && due.is_some_and(|d| d < today)
}

/// Parse human-friendly due date input into a date.
///
/// Supports "today", "tomorrow", "yesterday", "end of week", "end of month",
/// "in 3d" / "in 2w", weekday names and `YYYY-MM-DD`.
pub fn parse_due_input(s: &str, today: NaiveDate) -> Option<NaiveDate> {
    let s = s.trim().to_lowercase();

    match s.as_str() {
        "today" => return Some(today),
        "tomorrow" => return Some(today + Duration::days(1)),
        "yesterday" => return Some(today - Duration::days(1)),
        "end of week" | "eow" => {
            let weekday = today.weekday().num_days_from_monday() as i64;
            return Some(today + Duration::days(6 - weekday));
        }
        "end of month" | "eom" => {
            let (year, month) = if today.month() == 12 {
                (today.year() + 1, 1)
            } else {
                (today.year(), today.month() + 1)
            };
            return NaiveDate::from_ymd_opt(year, month, 1).map(|d| d - Duration::days(1));
        }
        _ => {}
    }

    if let Some(rest) = s.strip_prefix("in ") {
        if let Some(n) = rest.strip_suffix('d').and_then(|n| n.trim().parse::<i64>().ok()) {
            return Some(today + Duration::days(n));
        }
        if let Some(n) = rest.strip_suffix('w').and_then(|n| n.trim().parse::<i64>().ok()) {
            return Some(today + Duration::weeks(n));
        }
    }

    let weekdays = [
        ("monday", 0), ("tuesday", 1), ("wednesday", 2), ("thursday", 3),
        ("friday", 4), ("saturday", 5), ("sunday", 6),
        ("mon", 0), ("tue", 1), ("wed", 2), ("thu", 3),
        ("fri", 4), ("sat", 5), ("sun", 6),
    ];
    let current = today.weekday().num_days_from_monday() as i64;
    for (name, target) in weekdays {
        let ahead = (target + 7 - current) % 7;
        if s == name {
            return Some(today + Duration::days(ahead));
        }
        if s == format!("next {name}") {
            return Some(today + Duration::days(ahead + 7));
        }
    }

    NaiveDate::parse_from_str(&s, DATE_FORMAT).ok()
}

/// Format a due date relative to today ("today", "tomorrow", "in 3d", "2d late").
pub fn format_due_relative(due: Option<NaiveDate>, today: NaiveDate) -> String {
    match due {
        None => "-".into(),
        Some(d) => {
            let delta = (d - today).num_days();
            match delta {
                0 => "today".into(),
                1 => "tomorrow".into(),
                n if n > 1 => format!("in {n}d"),
                n => format!("{}d late", -n),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_sanitize_escapes_markup() {
        assert_eq!(sanitize("  <b>Tom & \"Jerry\"</b> "), "&lt;b&gt;Tom &amp; &quot;Jerry&quot;&lt;/b&gt;");
        assert_eq!(sanitize("it's"), "it&#039;s");
    }

    #[test]
    fn test_unescape_reverses_escape() {
        let raw = "a < b && \"c\" > 'd' &lt;";
        assert_eq!(unescape_html(&escape_html(raw)), raw);
        assert_eq!(sanitize(&unescape_html(&sanitize(raw))), sanitize(raw));
    }

    #[test]
    fn test_percentage() {
        assert_eq!(percentage(0, 0), 0);
        assert_eq!(percentage(1, 3), 33);
        assert_eq!(percentage(1, 6), 17);
        assert_eq!(percentage(2, 2), 100);
    }

    #[test]
    fn test_clean_title() {
        assert!(matches!(clean_title("   "), Err(Error::Validation(_))));
        let long = "x".repeat(250);
        assert_eq!(clean_title(&long).unwrap().chars().count(), MAX_TITLE_LEN);
    }

    #[test]
    fn test_normalise_tags_keeps_duplicates() {
        let tags = normalise_tags(&["Work, home", "work", " ", "a very long tag name that overflows"]);
        assert_eq!(tags, vec!["work", "home", "work", "a-very-long-tag-name"]);
        assert!(tags.iter().all(|t| t.chars().count() <= MAX_TAG_LEN));
    }

    #[test]
    fn test_parse_date() {
        assert_eq!(parse_date("2024-02-29").unwrap(), date("2024-02-29"));
        assert!(parse_date("2023-02-29").is_err());
        assert!(parse_date("next week").is_err());
    }

    #[test]
    fn test_parse_due_input() {
        let today = date("2024-06-05"); // Wednesday
        assert_eq!(parse_due_input("today", today), Some(today));
        assert_eq!(parse_due_input("in 3d", today), Some(date("2024-06-08")));
        assert_eq!(parse_due_input("in 2w", today), Some(date("2024-06-19")));
        assert_eq!(parse_due_input("friday", today), Some(date("2024-06-07")));
        assert_eq!(parse_due_input("next monday", today), Some(date("2024-06-17")));
        assert_eq!(parse_due_input("eom", today), Some(date("2024-06-30")));
        assert_eq!(parse_due_input("eow", today), Some(date("2024-06-09")));
        assert_eq!(parse_due_input("2024-07-01", today), Some(date("2024-07-01")));
        assert_eq!(parse_due_input("someday", today), None);
    }

    #[test]
    fn test_is_overdue() {
        let today = date("2024-06-01");
        assert!(is_overdue(Some(date("2024-05-31")), Status::Active, today));
        assert!(!is_overdue(Some(today), Status::Active, today));
        assert!(!is_overdue(Some(date("2024-05-31")), Status::Completed, today));
        assert!(!is_overdue(None, Status::Active, today));
    }

    #[test]
    fn test_format_due_relative() {
        let today = date("2024-06-01");
        assert_eq!(format_due_relative(None, today), "-");
        assert_eq!(format_due_relative(Some(today), today), "today");
        assert_eq!(format_due_relative(Some(date("2024-06-02")), today), "tomorrow");
        assert_eq!(format_due_relative(Some(date("2024-06-04")), today), "in 3d");
        assert_eq!(format_due_relative(Some(date("2024-05-30")), today), "2d late");
    }

    #[test]
    fn test_ellipsize() {
        assert_eq!(ellipsize("short", 10), "short");
        assert_eq!(ellipsize("abcdefghij", 5), "abcd…");
    }
}
