// src/ingest/mod.rs
pub mod dedup;
pub mod normalize;
pub mod providers;
pub mod types;

pub use dedup::{deduplicate, Deduplicated, IdentityKey};
pub use normalize::{clean_text, normalize, parse_date, Normalized};

use crate::ingest::types::{EventSource, RawRecord};
use metrics::counter;

/// A source that failed or came back empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DegradedSource {
    pub source: String,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct Collected {
    pub records: Vec<RawRecord>,
    pub degraded: Vec<DegradedSource>,
}

impl Collected {
    pub fn all_degraded(&self, total_sources: usize) -> bool {
        self.degraded.len() >= total_sources
    }
}

/// Calls every source in order and concatenates their records.
/// Each source's records keep their own order and get tagged with the source name.
pub async fn collect(sources: &[Box<dyn EventSource>]) -> Collected {
    crate::metrics::ensure_described();

    let mut out = Collected::default();
    for src in sources {
        let name = src.name().to_string();
        match src.fetch().await {
            Ok(v) if v.is_empty() => {
                tracing::warn!(target: "ingest", source = %name, "source returned no records");
                out.degraded.push(DegradedSource {
                    source: name,
                    reason: "no records".to_string(),
                });
            }
            Ok(v) => {
                tracing::info!(target: "ingest", source = %name, records = v.len(), "source collected");
                counter!("cfp_source_records_total", "source" => name.clone())
                    .increment(v.len() as u64);
                out.records.extend(v.into_iter().map(|mut r| {
                    r.source = name.clone();
                    r
                }));
            }
            Err(e) => {
                tracing::warn!(target: "ingest", error = ?e, source = %name, "source error");
                counter!("cfp_source_errors_total", "source" => name.clone()).increment(1);
                out.degraded.push(DegradedSource {
                    source: name,
                    reason: format!("{e:#}"),
                });
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::providers::StaticSource;
    use anyhow::anyhow;

    struct Failing;

    #[async_trait::async_trait]
    impl EventSource for Failing {
        async fn fetch(&self) -> anyhow::Result<Vec<RawRecord>> {
            Err(anyhow!("connection refused"))
        }
        fn name(&self) -> &str {
            "failing"
        }
    }

    #[tokio::test]
    async fn collect_keeps_source_order_and_tags_records() {
        let sources: Vec<Box<dyn EventSource>> = vec![
            Box::new(StaticSource::new(
                "first",
                vec![RawRecord::new("whatever").with("title", "A"), RawRecord::new("x").with("title", "B")],
            )),
            Box::new(Failing),
            Box::new(StaticSource::new("second", vec![RawRecord::new("").with("title", "C")])),
            Box::new(StaticSource::new("empty", vec![])),
        ];
        let got = collect(&sources).await;

        let titles: Vec<_> = got
            .records
            .iter()
            .map(|r| r.first_text(&["title"]).unwrap())
            .collect();
        assert_eq!(titles, vec!["A", "B", "C"]);
        assert_eq!(got.records[0].source, "first");
        assert_eq!(got.records[2].source, "second");

        let degraded: Vec<_> = got.degraded.iter().map(|d| d.source.as_str()).collect();
        assert_eq!(degraded, vec!["failing", "empty"]);
        assert!(!got.all_degraded(sources.len()));
    }
}
