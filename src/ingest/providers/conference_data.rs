//! Conference listings from the open `tech-conferences/conference-data` dataset
//! (the data behind confs.tech). One JSON file per topic and year.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::HashMap;

use chrono::{NaiveDate, Utc};
use serde_json::{Map, Value};

use crate::ingest::types::{EventSource, RawRecord};

pub const DATASET_BASE: &str =
    "https://raw.githubusercontent.com/tech-conferences/conference-data/main/conferences";

pub struct ConferenceDataSource {
    name: String,
    mode: Mode,
}

enum Mode {
    Fixture { topic: String, json: String },
    Http {
        base: String,
        year: i32,
        topics: Vec<String>,
        client: reqwest::Client,
    },
}

impl ConferenceDataSource {
    pub fn from_fixture(name: impl Into<String>, topic: impl Into<String>, json: &str) -> Self {
        Self {
            name: name.into(),
            mode: Mode::Fixture {
                topic: topic.into(),
                json: json.to_string(),
            },
        }
    }

    pub fn from_dataset(
        name: impl Into<String>,
        base: impl Into<String>,
        year: i32,
        topics: Vec<String>,
        client: reqwest::Client,
    ) -> Self {
        Self {
            name: name.into(),
            mode: Mode::Http {
                base: base.into(),
                year,
                topics,
                client,
            },
        }
    }

    /// Keeps conferences whose CFP is still open on `today`.
    fn parse_topic(&self, json: &str, topic: &str, today: NaiveDate) -> Result<Vec<RawRecord>> {
        let items: Vec<Map<String, Value>> =
            serde_json::from_str(json).with_context(|| format!("parsing {topic} conference data"))?;

        let mut out = Vec::with_capacity(items.len());
        for mut fields in items {
            let open = fields
                .get("cfpEndDate")
                .and_then(Value::as_str)
                .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
                .is_some_and(|d| d >= today);
            if !open {
                continue;
            }
            fields.insert(
                "topics".to_string(),
                Value::Array(vec![Value::String(topic.to_string())]),
            );
            out.push(RawRecord {
                source: self.name.clone(),
                base_url: Some("https://confs.tech/".to_string()),
                fields,
            });
        }
        Ok(out)
    }
}

#[async_trait]
impl EventSource for ConferenceDataSource {
    async fn fetch(&self) -> Result<Vec<RawRecord>> {
        let today = Utc::now().date_naive();
        match &self.mode {
            Mode::Fixture { topic, json } => self.parse_topic(json, topic, today),
            Mode::Http {
                base,
                year,
                topics,
                client,
            } => {
                let mut out = Vec::new();
                for topic in topics {
                    let url = format!("{}/{}/{}.json", base.trim_end_matches('/'), year, topic);
                    // One missing topic file should not hide the others.
                    let body = match fetch_text(client, &url).await {
                        Ok(b) => b,
                        Err(e) => {
                            tracing::warn!(target: "ingest", error = ?e, %url, "topic fetch failed");
                            continue;
                        }
                    };
                    out.extend(self.parse_topic(&body, topic, today)?);
                }
                Ok(merge_topics(out))
            }
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// A conference listed under several topics becomes one record carrying
/// every topic, in first-seen order.
fn merge_topics(records: Vec<RawRecord>) -> Vec<RawRecord> {
    let mut out: Vec<RawRecord> = Vec::with_capacity(records.len());
    let mut by_url: HashMap<String, usize> = HashMap::new();
    for rec in records {
        let Some(url) = rec.first_text(&["url"]) else {
            out.push(rec);
            continue;
        };
        match by_url.get(&url).copied() {
            Some(i) => {
                let extra = match rec.get("topics") {
                    Some(Value::Array(xs)) => xs.clone(),
                    _ => Vec::new(),
                };
                if let Some(Value::Array(topics)) = out[i].fields.get_mut("topics") {
                    for t in extra {
                        if !topics.contains(&t) {
                            topics.push(t);
                        }
                    }
                }
            }
            None => {
                by_url.insert(url, out.len());
                out.push(rec);
            }
        }
    }
    out
}

async fn fetch_text(client: &reqwest::Client, url: &str) -> Result<String> {
    client
        .get(url)
        .send()
        .await
        .context("conference data get()")?
        .error_for_status()
        .context("conference data status")?
        .text()
        .await
        .context("conference data .text()")
}
