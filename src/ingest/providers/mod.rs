// src/ingest/providers/mod.rs
pub mod conference_data;
pub mod rss;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{Datelike, Utc};

use crate::config::SourceConfig;
use crate::ingest::types::{EventSource, RawRecord};

pub use conference_data::ConferenceDataSource;
pub use rss::RssSource;

/// Shared HTTP client for sources.
pub fn http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent("cfp-scout/0.1")
        .connect_timeout(Duration::from_secs(5))
        .timeout(Duration::from_secs(20))
        .build()
        .context("building http client")
}

/// Instantiates sources in configuration order (which is also dedup precedence).
pub fn build_sources(cfgs: &[SourceConfig]) -> Result<Vec<Box<dyn EventSource>>> {
    let client = http_client()?;
    let mut out: Vec<Box<dyn EventSource>> = Vec::with_capacity(cfgs.len());
    for cfg in cfgs {
        let src: Box<dyn EventSource> = match cfg {
            SourceConfig::ConferenceData {
                name,
                topics,
                year,
                base_url,
            } => Box::new(ConferenceDataSource::from_dataset(
                name.clone(),
                base_url
                    .clone()
                    .unwrap_or_else(|| conference_data::DATASET_BASE.to_string()),
                year.unwrap_or_else(|| Utc::now().year()),
                topics.clone(),
                client.clone(),
            )),
            SourceConfig::Rss { name, url } => {
                Box::new(RssSource::from_url(name.clone(), url.clone(), client.clone()))
            }
            SourceConfig::File { name, path } => Box::new(FileSource::new(name.clone(), path.clone())),
        };
        out.push(src);
    }
    Ok(out)
}

/// Fixed records; handy for demos and tests.
pub struct StaticSource {
    name: String,
    records: Vec<RawRecord>,
}

impl StaticSource {
    pub fn new(name: impl Into<String>, records: Vec<RawRecord>) -> Self {
        Self {
            name: name.into(),
            records,
        }
    }
}

#[async_trait]
impl EventSource for StaticSource {
    async fn fetch(&self) -> Result<Vec<RawRecord>> {
        Ok(self.records.clone())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// A JSON array of loose objects on disk (hand-curated CFPs).
pub struct FileSource {
    name: String,
    path: PathBuf,
}

impl FileSource {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }
}

#[async_trait]
impl EventSource for FileSource {
    async fn fetch(&self) -> Result<Vec<RawRecord>> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("reading {}", self.path.display()))?;
        let items: Vec<serde_json::Map<String, serde_json::Value>> = serde_json::from_str(&content)
            .with_context(|| format!("parsing {}", self.path.display()))?;
        Ok(items
            .into_iter()
            .map(|fields| RawRecord {
                source: self.name.clone(),
                base_url: None,
                fields,
            })
            .collect())
    }

    fn name(&self) -> &str {
        &self.name
    }
}
