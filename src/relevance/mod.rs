// src/relevance/mod.rs
//! Relevance scoring: the filter contract, output validation, and the
//! offline keyword scorer. The LLM-backed scorer lives in `ollama`.

pub mod ollama;

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Result;
use regex::Regex;

use crate::config::OllamaConfig;
use crate::event::{Event, FilteredEvent, UserProfile};

pub use ollama::OllamaFilter;

/// Scores events against a profile. May fail; the coordinator then falls back
/// to a neutral pass-through.
#[async_trait::async_trait]
pub trait RelevanceFilter: Send + Sync {
    async fn filter(&self, events: &[Event], profile: &UserProfile) -> Result<Vec<FilteredEvent>>;
    fn name(&self) -> &'static str;
}

pub type DynFilter = Arc<dyn RelevanceFilter>;

/// Ollama when enabled, keyword scoring otherwise.
pub fn build_filter(cfg: &OllamaConfig) -> Result<DynFilter> {
    if cfg.enabled {
        Ok(Arc::new(OllamaFilter::new(cfg)?))
    } else {
        Ok(Arc::new(KeywordFilter))
    }
}

/// Checks that a filter answered for exactly the events it was given,
/// with usable scores. `Err` carries a short reason for the run log.
pub fn validate_filtered(input: &[Event], output: &[FilteredEvent]) -> std::result::Result<(), String> {
    if input.len() != output.len() {
        return Err(format!(
            "filter returned {} events for {} inputs",
            output.len(),
            input.len()
        ));
    }
    let known: HashSet<&str> = input.iter().map(|e| e.id.as_str()).collect();
    let mut seen: HashSet<&str> = HashSet::with_capacity(output.len());
    for fe in output {
        let id = fe.event.id.as_str();
        if !known.contains(id) {
            return Err(format!("filter returned unknown event {id}"));
        }
        if !seen.insert(id) {
            return Err(format!("filter returned event {id} twice"));
        }
        if !fe.relevance_score.is_finite() || !(0.0..=1.0).contains(&fe.relevance_score) {
            return Err(format!("score {} for {id} is out of range", fe.relevance_score));
        }
    }
    Ok(())
}

/// Every event included with the neutral score.
pub fn neutral_pass_through(events: &[Event]) -> Vec<FilteredEvent> {
    events.iter().cloned().map(FilteredEvent::neutral).collect()
}

/// Always neutral; used when no scorer is wanted at all.
pub struct PassThroughFilter;

#[async_trait::async_trait]
impl RelevanceFilter for PassThroughFilter {
    async fn filter(&self, events: &[Event], _profile: &UserProfile) -> Result<Vec<FilteredEvent>> {
        Ok(neutral_pass_through(events))
    }
    fn name(&self) -> &'static str {
        "pass-through"
    }
}

/// Offline scorer: an interest matches when all of its words appear in the
/// event's title, tags or description. First match scores 0.6, each further
/// match adds 0.2.
pub struct KeywordFilter;

impl KeywordFilter {
    pub fn score(event: &Event, interests: &[String]) -> f32 {
        let mut haystack: HashSet<String> = tokenize(&event.title).into_iter().collect();
        haystack.extend(tokenize(&event.description));
        for t in &event.tags {
            haystack.extend(tokenize(t));
        }

        let matches = interests
            .iter()
            .map(|i| tokenize(i))
            .filter(|words| !words.is_empty() && words.iter().all(|w| haystack.contains(w)))
            .count();
        match matches {
            0 => 0.0,
            n => (0.6 + 0.2 * (n as f32 - 1.0)).min(1.0),
        }
    }
}

#[async_trait::async_trait]
impl RelevanceFilter for KeywordFilter {
    async fn filter(&self, events: &[Event], profile: &UserProfile) -> Result<Vec<FilteredEvent>> {
        Ok(events
            .iter()
            .map(|ev| {
                let score = Self::score(ev, &profile.interests);
                FilteredEvent {
                    event: ev.clone(),
                    relevance_score: score,
                    included: score >= profile.min_score,
                }
            })
            .collect())
    }
    fn name(&self) -> &'static str {
        "keyword"
    }
}

/// Lowercased Unicode word tokens.
pub fn tokenize(input: &str) -> Vec<String> {
    static RE: once_cell::sync::OnceCell<Regex> = once_cell::sync::OnceCell::new();
    // \w covers [A-Za-z0-9_]; (?u) enables Unicode
    let re = RE.get_or_init(|| Regex::new(r"(?u)\b\w+\b").expect("tokenizer regex"));
    re.find_iter(input)
        .map(|m| m.as_str().to_lowercase())
        .collect()
}
