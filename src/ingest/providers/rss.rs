use anyhow::{Context, Result};
use async_trait::async_trait;
use metrics::histogram;
use once_cell::sync::OnceCell;
use quick_xml::de::from_str;
use regex::Regex;
use serde::Deserialize;

use crate::ingest::types::{EventSource, RawRecord};

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}
#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    item: Vec<Item>,
}
#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    description: Option<String>,
    #[serde(rename = "category", default)]
    category: Vec<String>,
}

/// CFP listings published as an RSS 2.0 feed (one item per call).
pub struct RssSource {
    name: String,
    mode: Mode,
}

enum Mode {
    Fixture(String),
    Http { url: String, client: reqwest::Client },
}

impl RssSource {
    pub fn from_fixture(name: impl Into<String>, xml: &str) -> Self {
        Self {
            name: name.into(),
            mode: Mode::Fixture(xml.to_string()),
        }
    }

    pub fn from_url(name: impl Into<String>, url: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            name: name.into(),
            mode: Mode::Http {
                url: url.into(),
                client,
            },
        }
    }

    fn parse_items_from_str(&self, s: &str, base_url: Option<&str>) -> Result<Vec<RawRecord>> {
        let t0 = std::time::Instant::now();
        let xml_clean = scrub_html_entities_for_xml(s);
        let rss: Rss = from_str(&xml_clean).context("parsing cfp rss xml")?;

        let mut out = Vec::with_capacity(rss.channel.item.len());
        for it in rss.channel.item {
            let mut rec = RawRecord::new(self.name.clone());
            if let Some(base) = base_url {
                rec = rec.with_base_url(base);
            }
            if let Some(deadline) = it.description.as_deref().and_then(extract_deadline) {
                rec = rec.with("cfp_deadline", deadline);
            }
            if let Some(t) = it.title {
                rec = rec.with("title", t);
            }
            if let Some(l) = it.link {
                rec = rec.with("link", l);
            }
            if let Some(d) = it.description {
                rec = rec.with("description", d);
            }
            if let Some(p) = it.pub_date {
                rec = rec.with("published", p);
            }
            if !it.category.is_empty() {
                rec = rec.with("tags", it.category);
            }
            out.push(rec);
        }

        let ms = t0.elapsed().as_secs_f64() * 1_000.0;
        histogram!("cfp_source_parse_ms", "source" => self.name.clone()).record(ms);
        Ok(out)
    }
}

#[async_trait]
impl EventSource for RssSource {
    async fn fetch(&self) -> Result<Vec<RawRecord>> {
        match &self.mode {
            Mode::Fixture(s) => self.parse_items_from_str(s, None),
            Mode::Http { url, client } => {
                let body = client
                    .get(url.as_str())
                    .send()
                    .await
                    .with_context(|| format!("rss get {url}"))?
                    .error_for_status()
                    .with_context(|| format!("rss status {url}"))?
                    .text()
                    .await
                    .context("rss .text()")?;
                self.parse_items_from_str(&body, Some(url))
            }
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Pulls "CFP closes June 15" style deadlines out of free text.
pub fn extract_deadline(text: &str) -> Option<String> {
    static RE: OnceCell<Regex> = OnceCell::new();
    let re = RE.get_or_init(|| {
        Regex::new(r"(?i)cfp\s+(?:closes|deadline)\s*:?\s*([A-Za-z]+\s+\d{1,2}(?:st|nd|rd|th)?(?:,?\s+\d{4})?|\d{4}-\d{2}-\d{2})")
            .unwrap()
    });
    re.captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
}
