// src/event.rs
//! Canonical event shapes shared by every pipeline stage.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ingest::types::RawRecord;

/// Location used when a record does not say where the event happens.
pub const UNKNOWN_LOCATION: &str = "Unknown";

/// Score assigned when relevance could not be determined.
pub const NEUTRAL_SCORE: f32 = 0.5;

/// Default inclusion threshold for relevance scores.
pub const DEFAULT_MIN_SCORE: f32 = 0.6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    /// Builds a range, swapping the bounds when they arrive reversed.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        if end < start {
            Self { start: end, end: start }
        } else {
            Self { start, end }
        }
    }

    pub fn single(day: NaiveDate) -> Self {
        Self { start: day, end: day }
    }
}

/// A normalized CFP listing. `title` and `link` are never empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub title: String,
    pub link: String,
    pub cfp_deadline: Option<NaiveDate>,
    pub event_dates: Option<DateRange>,
    pub location: String,
    pub source: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub description: String,
}

impl From<&Event> for RawRecord {
    /// Re-expresses a canonical event in raw form (dates as ISO text).
    fn from(ev: &Event) -> Self {
        let mut raw = RawRecord::new(ev.source.clone())
            .with("title", ev.title.clone())
            .with("link", ev.link.clone())
            .with("location", ev.location.clone())
            .with(
                "tags",
                Value::Array(ev.tags.iter().cloned().map(Value::String).collect()),
            )
            .with("description", ev.description.clone());
        if let Some(d) = ev.cfp_deadline {
            raw = raw.with("cfp_deadline", d.to_string());
        }
        if let Some(r) = ev.event_dates {
            raw = raw
                .with("start_date", r.start.to_string())
                .with("end_date", r.end.to_string());
        }
        raw
    }
}

/// An event after relevance scoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilteredEvent {
    #[serde(flatten)]
    pub event: Event,
    pub relevance_score: f32,
    pub included: bool,
}

impl FilteredEvent {
    /// Neutral pass-through: relevant by default, mid score.
    pub fn neutral(event: Event) -> Self {
        Self {
            event,
            relevance_score: NEUTRAL_SCORE,
            included: true,
        }
    }
}

/// What the user cares about, plus the cut-off for `included`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default)]
    pub interests: Vec<String>,
    #[serde(default = "default_min_score")]
    pub min_score: f32,
}

fn default_min_score() -> f32 {
    DEFAULT_MIN_SCORE
}

impl Default for UserProfile {
    fn default() -> Self {
        Self {
            interests: vec![
                "AI".to_string(),
                "machine learning".to_string(),
                "software engineering".to_string(),
            ],
            min_score: DEFAULT_MIN_SCORE,
        }
    }
}

impl UserProfile {
    /// Parses a comma-separated interest list, dropping blanks.
    pub fn parse_interests(raw: &str) -> Vec<String> {
        raw.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }
}
