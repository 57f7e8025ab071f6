//! Digest rendering (plain text + HTML) for included events.

use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use html_escape::{encode_double_quoted_attribute, encode_text};

use crate::event::FilteredEvent;

const MAX_TAGS: usize = 5;
const MAX_DESCRIPTION_CHARS: usize = 200;

#[derive(Debug, Clone, PartialEq)]
pub struct Digest {
    pub subject: String,
    pub text: String,
    pub html: String,
}

impl Digest {
    /// Events are listed by score, highest first; ties keep pipeline order.
    pub fn build(events: &[FilteredEvent], generated_at: DateTime<Utc>) -> Self {
        let mut sorted: Vec<&FilteredEvent> = events.iter().collect();
        sorted.sort_by(|a, b| b.relevance_score.total_cmp(&a.relevance_score));

        let subject = format!(
            "CFP Scout: {} relevant CFP{} ({})",
            sorted.len(),
            if sorted.len() == 1 { "" } else { "s" },
            generated_at.format("%Y-%m-%d")
        );
        Self {
            text: render_text(&sorted, generated_at),
            html: render_html(&sorted, generated_at),
            subject,
        }
    }
}

fn deadline(fe: &FilteredEvent) -> String {
    fe.event
        .cfp_deadline
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "Unknown".to_string())
}

fn short_description(s: &str) -> Option<String> {
    if s.is_empty() {
        return None;
    }
    if s.chars().count() > MAX_DESCRIPTION_CHARS {
        let head: String = s.chars().take(MAX_DESCRIPTION_CHARS).collect();
        Some(format!("{}...", head.trim_end()))
    } else {
        Some(s.to_string())
    }
}

fn tag_list(fe: &FilteredEvent) -> Option<String> {
    if fe.event.tags.is_empty() {
        return None;
    }
    Some(
        fe.event
            .tags
            .iter()
            .take(MAX_TAGS)
            .cloned()
            .collect::<Vec<_>>()
            .join(", "),
    )
}

fn render_text(events: &[&FilteredEvent], generated_at: DateTime<Utc>) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "CFP Scout daily report");
    let _ = writeln!(out, "Generated: {}", generated_at.format("%Y-%m-%d %H:%M UTC"));
    let _ = writeln!(out, "Found {} relevant CFP events.", events.len());
    for (i, fe) in events.iter().enumerate() {
        let ev = &fe.event;
        let _ = writeln!(out);
        let _ = writeln!(out, "{:2}. {}", i + 1, ev.title);
        let _ = writeln!(out, "    Location:  {}", ev.location);
        let _ = writeln!(out, "    Deadline:  {}", deadline(fe));
        let _ = writeln!(out, "    Link:      {}", ev.link);
        let _ = writeln!(out, "    Relevance: {:.2}/1.0", fe.relevance_score);
        if let Some(tags) = tag_list(fe) {
            let _ = writeln!(out, "    Topics:    {tags}");
        }
        if let Some(d) = short_description(&ev.description) {
            let _ = writeln!(out, "    {d}");
        }
    }
    out
}

fn render_html(events: &[&FilteredEvent], generated_at: DateTime<Utc>) -> String {
    let mut out = String::from(
        "<html><body style=\"font-family: Arial, sans-serif; color: #333\">\
<h1>CFP Scout Daily Report</h1>",
    );
    let _ = write!(
        out,
        "<p>Found <strong>{}</strong> relevant CFP events ({}).</p>",
        events.len(),
        generated_at.format("%Y-%m-%d")
    );
    if events.is_empty() {
        out.push_str("<p>No relevant CFP events found.</p>");
    }
    for (i, fe) in events.iter().enumerate() {
        let ev = &fe.event;
        let _ = write!(
            out,
            "<div style=\"border:1px solid #ddd;margin:12px 0;padding:12px\">\
<div><strong>{n}. {title}</strong></div>\
<div>Location: {location}</div>\
<div>CFP deadline: {deadline}</div>\
<div>Link: <a href=\"{href}\">{link}</a></div>\
<div>Relevance: {score:.2}/1.0</div>",
            n = i + 1,
            title = encode_text(&ev.title),
            location = encode_text(&ev.location),
            deadline = deadline(fe),
            href = encode_double_quoted_attribute(&ev.link),
            link = encode_text(&ev.link),
            score = fe.relevance_score,
        );
        if let Some(tags) = tag_list(fe) {
            let _ = write!(out, "<div>Topics: {}</div>", encode_text(&tags));
        }
        if let Some(d) = short_description(&ev.description) {
            let _ = write!(out, "<div>{}</div>", encode_text(&d));
        }
        out.push_str("</div>");
    }
    out.push_str("</body></html>");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{Event, UNKNOWN_LOCATION};
    use chrono::{NaiveDate, TimeZone};

    fn fe(title: &str, score: f32) -> FilteredEvent {
        FilteredEvent {
            event: Event {
                id: title.to_lowercase(),
                title: title.into(),
                link: format!("https://{}.dev/?a=1&b=2", title.to_lowercase()),
                cfp_deadline: NaiveDate::from_ymd_opt(2025, 6, 15),
                event_dates: None,
                location: UNKNOWN_LOCATION.into(),
                source: "t".into(),
                tags: (0..8).map(|i| format!("t{i}")).collect(),
                description: "d".repeat(250),
            },
            relevance_score: score,
            included: true,
        }
    }

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 8, 0, 0).unwrap()
    }

    #[test]
    fn sorted_by_score_with_capped_tags_and_description() {
        let d = Digest::build(&[fe("Low", 0.61), fe("High", 0.93)], at());
        assert_eq!(d.subject, "CFP Scout: 2 relevant CFPs (2025-03-01)");
        let hi = d.text.find("High").unwrap();
        let lo = d.text.find("Low").unwrap();
        assert!(hi < lo);
        assert!(d.text.contains("Topics:    t0, t1, t2, t3, t4\n"));
        assert!(!d.text.contains("t5"));
        assert!(d.text.contains(&format!("{}...", "d".repeat(200))));
        assert!(d.text.contains("Deadline:  2025-06-15"));
    }

    #[test]
    fn html_is_escaped() {
        let mut e = fe("X", 0.7);
        e.event.title = "<script>alert(1)</script>".into();
        let d = Digest::build(&[e], at());
        assert!(!d.html.contains("<script>"));
        assert!(d.html.contains("&lt;script&gt;"));
        assert!(d.html.contains("href=\"https://x.dev/?a=1&amp;b=2\""));
        assert_eq!(d.subject, "CFP Scout: 1 relevant CFP (2025-03-01)");
    }
}
