//! Ollama-backed relevance scoring: one `/api/generate` call per event.

use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use once_cell::sync::OnceCell;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::RelevanceFilter;
use crate::config::OllamaConfig;
use crate::event::{Event, FilteredEvent, UserProfile};

pub struct OllamaFilter {
    http: reqwest::Client,
    host: String,
    model: String,
}

impl OllamaFilter {
    pub fn new(cfg: &OllamaConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent("cfp-scout/0.1")
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(cfg.timeout_secs.max(1)))
            .build()
            .context("building ollama http client")?;
        Ok(Self {
            http,
            host: cfg.host.trim_end_matches('/').to_string(),
            model: cfg.model.clone(),
        })
    }

    /// Host reachable and model pulled.
    pub async fn check_model(&self) -> Result<()> {
        #[derive(Deserialize)]
        struct Tags {
            #[serde(default)]
            models: Vec<Model>,
        }
        #[derive(Deserialize)]
        struct Model {
            name: String,
        }

        let tags: Tags = self
            .http
            .get(format!("{}/api/tags", self.host))
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .with_context(|| format!("cannot reach ollama at {}", self.host))?
            .error_for_status()
            .context("ollama /api/tags status")?
            .json()
            .await
            .context("ollama /api/tags body")?;

        let wanted = self.model.as_str();
        let found = tags.models.iter().any(|m| {
            m.name == wanted || m.name.strip_suffix(":latest").is_some_and(|n| n == wanted)
        });
        if !found {
            let names: Vec<&str> = tags.models.iter().map(|m| m.name.as_str()).collect();
            bail!("model {wanted} not available (have: {})", names.join(", "));
        }
        Ok(())
    }

    async fn score_event(&self, ev: &Event, profile: &UserProfile) -> Result<f32> {
        #[derive(Serialize)]
        struct Options {
            temperature: f32,
            top_p: f32,
            num_predict: u32,
        }
        #[derive(Serialize)]
        struct Req<'a> {
            model: &'a str,
            prompt: &'a str,
            stream: bool,
            options: Options,
        }
        #[derive(Deserialize)]
        struct Resp {
            #[serde(default)]
            response: String,
        }

        let prompt = build_prompt(ev, &profile.interests);
        let req = Req {
            model: &self.model,
            prompt: &prompt,
            stream: false,
            options: Options {
                temperature: 0.1,
                top_p: 0.9,
                num_predict: 100,
            },
        };

        let body: Resp = self
            .http
            .post(format!("{}/api/generate", self.host))
            .json(&req)
            .send()
            .await
            .context("ollama /api/generate")?
            .error_for_status()
            .context("ollama /api/generate status")?
            .json()
            .await
            .context("ollama /api/generate body")?;

        parse_score(&body.response)
            .ok_or_else(|| anyhow!("no score in response {:?}", body.response.trim()))
    }
}

#[async_trait::async_trait]
impl RelevanceFilter for OllamaFilter {
    async fn filter(&self, events: &[Event], profile: &UserProfile) -> Result<Vec<FilteredEvent>> {
        if events.is_empty() {
            return Ok(Vec::new());
        }
        self.check_model().await?;

        let mut out = Vec::with_capacity(events.len());
        let mut failures = 0usize;
        for (i, ev) in events.iter().enumerate() {
            let fe = match self.score_event(ev, profile).await {
                Ok(score) => FilteredEvent {
                    event: ev.clone(),
                    relevance_score: score,
                    included: score >= profile.min_score,
                },
                Err(e) => {
                    // An unscored event is kept rather than silently lost.
                    failures += 1;
                    tracing::warn!(target: "relevance", error = ?e, id = %ev.id, "scoring failed, using neutral score");
                    FilteredEvent::neutral(ev.clone())
                }
            };
            tracing::debug!(
                target: "relevance",
                n = i + 1,
                total = events.len(),
                id = %ev.id,
                score = fe.relevance_score,
                included = fe.included,
                "scored"
            );
            out.push(fe);
        }

        if failures == events.len() {
            bail!("all {failures} scoring calls failed");
        }
        tracing::info!(
            target: "relevance",
            included = out.iter().filter(|f| f.included).count(),
            total = out.len(),
            failures,
            "ollama filtering done"
        );
        Ok(out)
    }

    fn name(&self) -> &'static str {
        "ollama"
    }
}

pub fn build_prompt(ev: &Event, interests: &[String]) -> String {
    let deadline = ev
        .cfp_deadline
        .map(|d| d.to_string())
        .unwrap_or_else(|| "Unknown".to_string());
    let description = if ev.description.is_empty() {
        "No description available"
    } else {
        ev.description.as_str()
    };
    format!(
        "You are a conference recommendation system. Rate how relevant this conference CFP is \
to someone interested in: {interests}.\n\n\
Event Title: {title}\nLocation: {location}\nTopics/Tags: {tags}\nDescription: {description}\nCFP Deadline: {deadline}\n\n\
Rate the relevance on a scale of 0.0 to 1.0 where:\n\
- 0.0 = Not relevant at all\n- 0.3 = Somewhat relevant\n- 0.6 = Moderately relevant\n\
- 0.8 = Highly relevant\n- 1.0 = Extremely relevant\n\n\
Respond with ONLY a number between 0.0 and 1.0, nothing else.",
        interests = interests.join(", "),
        title = ev.title,
        location = ev.location,
        tags = ev.tags.join(", "),
    )
}

/// First number in the reply, clamped to 0.0..=1.0. Integers above 1 are rejected.
pub fn parse_score(reply: &str) -> Option<f32> {
    static RE: OnceCell<Regex> = OnceCell::new();
    let re = RE.get_or_init(|| Regex::new(r"\d*\.\d+|\d+").unwrap());
    let m = re.find(reply)?;
    let v: f32 = m.as_str().parse().ok()?;
    if !v.is_finite() || (v > 1.0 && !m.as_str().contains('.')) {
        return None;
    }
    Some(v.clamp(0.0, 1.0))
}
