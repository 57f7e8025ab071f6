// src/ingest/normalize.rs
//! Raw record -> canonical `Event`. Pure; never fails a whole batch.

use chrono::{DateTime, Datelike, NaiveDate};
use once_cell::sync::OnceCell;
use regex::Regex;
use reqwest::Url;
use serde_json::Value;

use crate::event::{DateRange, Event, UNKNOWN_LOCATION};
use crate::ingest::dedup::IdentityKey;
use crate::ingest::types::RawRecord;

const TITLE_MAX_CHARS: usize = 300;
const DESCRIPTION_MAX_CHARS: usize = 1500;
/// Double-escaped feeds need more than one decode; bounded against hostile input.
const MAX_DECODE_ROUNDS: usize = 8;

/// Output of a normalization pass.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Normalized {
    pub events: Vec<Event>,
    /// Records discarded for lacking a usable title or link.
    pub dropped: usize,
}

/// Normalize every record in order. `today` anchors year-less dates.
pub fn normalize(raw: &[RawRecord], today: NaiveDate) -> Normalized {
    let mut out = Normalized {
        events: Vec::with_capacity(raw.len()),
        dropped: 0,
    };
    for rec in raw {
        match normalize_record(rec, today) {
            Some(ev) => out.events.push(ev),
            None => {
                out.dropped += 1;
                tracing::debug!(
                    target: "ingest",
                    source = %rec.source,
                    "dropping record without title/link"
                );
            }
        }
    }
    out
}

/// `None` when the record lacks a title or an absolute link.
pub fn normalize_record(rec: &RawRecord, today: NaiveDate) -> Option<Event> {
    let title = clean_text(&rec.first_text(&["title", "name"])?, TITLE_MAX_CHARS);
    if title.is_empty() {
        return None;
    }
    let link = resolve_link(
        &rec.first_text(&["link", "url", "href"])?,
        rec.base_url.as_deref(),
    )?;

    let cfp_deadline = rec
        .first_text(&["cfp_deadline", "cfpEndDate", "deadline"])
        .and_then(|s| parse_date(&s, today));

    let id = IdentityKey::of(&title, &link).short_id();
    Some(Event {
        id,
        cfp_deadline,
        event_dates: event_dates(rec, today),
        location: location(rec),
        source: rec.source.clone(),
        tags: tags(rec),
        description: clean_text(
            &rec.first_text(&["description", "summary"]).unwrap_or_default(),
            DESCRIPTION_MAX_CHARS,
        ),
        title,
        link,
    })
}

/// Decode entities, strip markup, fold quotes and whitespace, cap length.
pub fn clean_text(s: &str, max_chars: usize) -> String {
    // 1) HTML entity decode, until nothing decodes further
    let mut out = s.to_string();
    for _ in 0..MAX_DECODE_ROUNDS {
        let decoded = html_escape::decode_html_entities(&out);
        if decoded == out {
            break;
        }
        out = decoded.into_owned();
    }

    // 2) Strip HTML tags
    static RE_TAGS: OnceCell<Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| Regex::new(r"(?is)</?[a-z][^>]*>").unwrap());
    out = re_tags.replace_all(&out, " ").to_string();

    // 3) Normalize “ ” ‘ ’ « » to ASCII quotes
    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    // 4) Collapse whitespace (covers \u{00A0})
    out = out.split_whitespace().collect::<Vec<_>>().join(" ");

    if out.chars().count() > max_chars {
        out = out.chars().take(max_chars).collect::<String>().trim_end().to_string();
    }
    out
}

fn resolve_link(raw: &str, base: Option<&str>) -> Option<String> {
    let link = raw.trim();
    if link.is_empty() {
        return None;
    }
    let link = if link.starts_with("//") {
        format!("https:{link}")
    } else {
        link.to_string()
    };
    match Url::parse(&link) {
        // Absolute links keep their original spelling; identity folding happens in dedup.
        Ok(u) if is_web(&u) => Some(link),
        Ok(_) => None,
        Err(_) => {
            let joined = Url::parse(base?).ok()?.join(&link).ok()?;
            is_web(&joined).then(|| joined.to_string())
        }
    }
}

fn is_web(u: &Url) -> bool {
    matches!(u.scheme(), "http" | "https") && u.host_str().is_some()
}

fn location(rec: &RawRecord) -> String {
    if let Some(loc) = rec.first_text(&["location"]) {
        // listing sites append the date after a "・" separator
        let head = loc.split('・').next().unwrap_or_default();
        let cleaned = clean_text(head, TITLE_MAX_CHARS);
        if !cleaned.is_empty() {
            return cleaned;
        }
    }
    let parts: Vec<String> = ["city", "country"]
        .iter()
        .filter_map(|k| rec.first_text(&[k]))
        .map(|s| clean_text(&s, TITLE_MAX_CHARS))
        .filter(|s| !s.is_empty() && !s.eq_ignore_ascii_case("null"))
        .collect();
    if !parts.is_empty() {
        return parts.join(", ");
    }
    if rec.flag("online") {
        return "Online".to_string();
    }
    UNKNOWN_LOCATION.to_string()
}

fn tags(rec: &RawRecord) -> Vec<String> {
    let items: Vec<String> = match rec.get("tags").or_else(|| rec.get("topics")) {
        Some(Value::Array(xs)) => xs
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        Some(Value::String(s)) => s.split(',').map(str::to_string).collect(),
        _ => Vec::new(),
    };
    let mut out: Vec<String> = Vec::with_capacity(items.len());
    for it in items {
        let t = it
            .trim_start_matches(|c: char| c == '#' || c.is_whitespace())
            .trim_end()
            .to_lowercase();
        if !t.is_empty() && !out.contains(&t) {
            out.push(t);
        }
    }
    out
}

fn event_dates(rec: &RawRecord, today: NaiveDate) -> Option<DateRange> {
    let start = rec.first_text(&["start_date", "startDate"]);
    let end = rec.first_text(&["end_date", "endDate"]);
    if start.is_some() || end.is_some() {
        let end = end.and_then(|s| parse_date(&s, today));
        let start = start.and_then(|s| parse_date_with(&s, today, end.map(|d| d.year())));
        return match (start, end) {
            (Some(s), Some(e)) => Some(DateRange::new(s, e)),
            (Some(d), None) | (None, Some(d)) => Some(DateRange::single(d)),
            (None, None) => None,
        };
    }
    rec.first_text(&["event_dates", "dates"])
        .and_then(|s| parse_date_range(&s, today))
}

/// "A to B", "A - B", "A – B"; a single date yields a one-day range.
pub fn parse_date_range(s: &str, today: NaiveDate) -> Option<DateRange> {
    static RE_SEP: OnceCell<Regex> = OnceCell::new();
    let re = RE_SEP.get_or_init(|| Regex::new(r"(?i)\s+(?:to|until|-|–|—)\s+").unwrap());
    let mut parts = re.splitn(s, 2);
    let left = parts.next().unwrap_or_default();
    match parts.next() {
        Some(right) => {
            let end = parse_date(right, today);
            let start = parse_date_with(left, today, end.map(|d| d.year()));
            match (start, end) {
                (Some(a), Some(b)) => Some(DateRange::new(a, b)),
                (Some(a), None) => Some(DateRange::single(a)),
                (None, Some(b)) => Some(DateRange::single(b)),
                (None, None) => None,
            }
        }
        None => parse_date(left, today).map(DateRange::single),
    }
}

/// Best-effort date parse; `None` on anything unrecognized.
pub fn parse_date(s: &str, today: NaiveDate) -> Option<NaiveDate> {
    parse_date_with(s, today, None)
}

fn parse_date_with(s: &str, today: NaiveDate, year_hint: Option<i32>) -> Option<NaiveDate> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.date_naive());
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Some(dt.date_naive());
    }
    // ISO date, possibly followed by a time component
    if let Some(d) = s.get(0..10).and_then(|h| NaiveDate::parse_from_str(h, "%Y-%m-%d").ok()) {
        return Some(d);
    }

    let text = simplify_date_text(s);
    const WITH_YEAR: &[&str] = &["%Y/%m/%d", "%B %d %Y", "%d %B %Y", "%A %B %d %Y", "%A %d %B %Y"];
    for fmt in WITH_YEAR {
        if let Ok(d) = NaiveDate::parse_from_str(&text, fmt) {
            return Some(d);
        }
    }

    // Year-less ("June 15"): hinted year, else the next occurrence from `today`.
    let year = year_hint.unwrap_or(today.year());
    let with_year = format!("{text} {year}");
    let d = ["%B %d %Y", "%d %B %Y"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(&with_year, fmt).ok())?;
    if year_hint.is_none() && d < today {
        return d.with_year(year + 1);
    }
    Some(d)
}

/// Drops "CFP closes" prefixes, ordinal suffixes and commas.
fn simplify_date_text(s: &str) -> String {
    static RE_PREFIX: OnceCell<Regex> = OnceCell::new();
    static RE_ORDINAL: OnceCell<Regex> = OnceCell::new();
    let re_prefix = RE_PREFIX
        .get_or_init(|| Regex::new(r"(?i)^\s*(?:cfp\s+closes|closes|deadline)\s*:?\s*").unwrap());
    let re_ordinal =
        RE_ORDINAL.get_or_init(|| Regex::new(r"(?i)\b(\d{1,2})(?:st|nd|rd|th)\b").unwrap());

    let t = re_prefix.replace(s, "");
    let t = re_ordinal.replace_all(&t, "$1");
    t.replace([',', '.'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 1).unwrap()
    }

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn clean_text_strips_markup_and_whitespace() {
        let s = "  <b>Rust</b>&nbsp;&amp;\n\t“Friends”  ";
        assert_eq!(clean_text(s, 100), r#"Rust & "Friends""#);
    }

    #[test]
    fn clean_text_decodes_double_escaped_entities() {
        assert_eq!(clean_text("Rust &amp;amp; Friends", 100), "Rust & Friends");
        assert_eq!(clean_text("&amp;lt;b&amp;gt;Bold&amp;lt;/b&amp;gt;", 100), "Bold");
        let once = clean_text("A &amp;amp;amp; B", 100);
        assert_eq!(clean_text(&once, 100), once);
    }

    #[test]
    fn clean_text_caps_length() {
        let s = "x".repeat(400);
        assert_eq!(clean_text(&s, TITLE_MAX_CHARS).chars().count(), TITLE_MAX_CHARS);
    }

    #[test]
    fn parses_common_deadline_shapes() {
        let t = today();
        assert_eq!(parse_date("2025-06-15", t), Some(ymd(2025, 6, 15)));
        assert_eq!(parse_date("2025-06-15T23:59:00Z", t), Some(ymd(2025, 6, 15)));
        assert_eq!(parse_date("June 15, 2025", t), Some(ymd(2025, 6, 15)));
        assert_eq!(parse_date("Jun 15th 2025", t), Some(ymd(2025, 6, 15)));
        assert_eq!(parse_date("15 June 2025", t), Some(ymd(2025, 6, 15)));
        assert_eq!(parse_date("CFP closes June 15", t), Some(ymd(2025, 6, 15)));
        assert_eq!(parse_date("Sat, 14 Jun 2025 10:00:00 +0000", t), Some(ymd(2025, 6, 14)));
    }

    #[test]
    fn yearless_date_in_the_past_rolls_to_next_year() {
        assert_eq!(parse_date("Jan 10", today()), Some(ymd(2026, 1, 10)));
    }

    #[test]
    fn garbage_dates_are_absent() {
        assert_eq!(parse_date("soon-ish", today()), None);
        assert_eq!(parse_date("", today()), None);
        assert_eq!(parse_date("2025-13-45", today()), None);
    }

    #[test]
    fn ranges_borrow_year_from_end() {
        let r = parse_date_range("June 15 - June 17, 2027", today()).unwrap();
        assert_eq!(r.start, ymd(2027, 6, 15));
        assert_eq!(r.end, ymd(2027, 6, 17));
        let r = parse_date_range("2025-09-01 to 2025-09-03", today()).unwrap();
        assert_eq!((r.start, r.end), (ymd(2025, 9, 1), ymd(2025, 9, 3)));
    }

    #[test]
    fn relative_link_needs_base() {
        let with_base = RawRecord::new("s")
            .with_base_url("https://confs.tech/")
            .with("title", "X")
            .with("link", "/conf/x");
        assert_eq!(
            normalize_record(&with_base, today()).unwrap().link,
            "https://confs.tech/conf/x"
        );
        let without = RawRecord::new("s").with("title", "X").with("link", "/conf/x");
        assert!(normalize_record(&without, today()).is_none());
    }

    #[test]
    fn non_web_links_are_rejected() {
        let r = RawRecord::new("s").with("title", "X").with("link", "mailto:cfp@x.org");
        assert!(normalize_record(&r, today()).is_none());
    }

    #[test]
    fn location_falls_back_through_city_country_online() {
        let r = RawRecord::new("s").with("city", "Berlin").with("country", "Germany");
        assert_eq!(location(&r), "Berlin, Germany");
        let r = RawRecord::new("s").with("city", "null").with("online", true);
        assert_eq!(location(&r), "Online");
        let r = RawRecord::new("s").with("location", "Lisbon, Portugal・Jun 3-5");
        assert_eq!(location(&r), "Lisbon, Portugal");
        assert_eq!(location(&RawRecord::new("s")), UNKNOWN_LOCATION);
    }

    #[test]
    fn tags_are_folded_and_unique() {
        let r = RawRecord::new("s").with("topics", json!(["#Rust", "rust", " WebAssembly ", ""]));
        assert_eq!(tags(&r), vec!["rust".to_string(), "webassembly".to_string()]);
        let r = RawRecord::new("s").with("tags", "AI, ml ,AI");
        assert_eq!(tags(&r), vec!["ai".to_string(), "ml".to_string()]);
        let r = RawRecord::new("s").with("tags", json!(["# #rust", "c#"]));
        assert_eq!(tags(&r), vec!["rust".to_string(), "c#".to_string()]);
    }

    #[test]
    fn separate_start_end_fields_form_a_range() {
        let r = RawRecord::new("s")
            .with("title", "T")
            .with("link", "https://t.dev")
            .with("startDate", "2025-10-02")
            .with("endDate", "2025-10-01");
        let ev = normalize_record(&r, today()).unwrap();
        let range = ev.event_dates.unwrap();
        assert_eq!(range.start, ymd(2025, 10, 1));
        assert_eq!(range.end, ymd(2025, 10, 2));
    }
}
