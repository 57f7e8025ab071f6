// src/ingest/types.rs
use anyhow::Result;
use serde_json::{Map, Value};

/// Loosely structured record as produced by a source.
/// Field names vary per source; the normalizer knows the aliases.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Default)]
pub struct RawRecord {
    pub source: String, // e.g., "confs.tech", "papercall-rss"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>, // for resolving relative links
    #[serde(default)]
    pub fields: Map<String, Value>,
}

impl RawRecord {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            base_url: None,
            fields: Map::new(),
        }
    }

    pub fn with_base_url(mut self, base: impl Into<String>) -> Self {
        self.base_url = Some(base.into());
        self
    }

    /// Builder-style insert; `Value::Null` is stored as-is (treated as absent).
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key).filter(|v| !v.is_null())
    }

    /// First non-empty textual value among `keys`. Numbers and bools are stringified.
    pub fn first_text(&self, keys: &[&str]) -> Option<String> {
        keys.iter().find_map(|k| match self.get(k)? {
            Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        })
    }

    pub fn flag(&self, key: &str) -> bool {
        match self.get(key) {
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) => matches!(s.trim().to_ascii_lowercase().as_str(), "true" | "yes" | "1"),
            _ => false,
        }
    }
}

/// A place CFP listings come from. Failures are reported, never panicked;
/// the coordinator treats an error as "zero records, source degraded".
#[async_trait::async_trait]
pub trait EventSource: Send + Sync {
    async fn fetch(&self) -> Result<Vec<RawRecord>>;
    fn name(&self) -> &str;
}
