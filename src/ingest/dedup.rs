// src/ingest/dedup.rs
use std::collections::HashSet;

use sha2::{Digest, Sha256};

use crate::event::Event;

/// Folded `(title, link)` pair. Two events with equal keys are the same CFP.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdentityKey {
    title: String,
    link: String,
}

impl IdentityKey {
    pub fn of(title: &str, link: &str) -> Self {
        Self {
            title: fold(title),
            link: fold(link).trim_end_matches('/').to_string(),
        }
    }

    pub fn for_event(ev: &Event) -> Self {
        Self::of(&ev.title, &ev.link)
    }

    /// 12 hex chars of SHA-256 over the folded pair.
    pub fn short_id(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.title.as_bytes());
        hasher.update([0x1f]);
        hasher.update(self.link.as_bytes());
        let digest = hasher.finalize();
        let mut out = String::with_capacity(12);
        for b in digest.iter().take(6) {
            use std::fmt::Write as _;
            let _ = write!(&mut out, "{:02x}", b);
        }
        out
    }
}

fn fold(s: &str) -> String {
    s.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Deduplicated {
    pub events: Vec<Event>,
    pub removed: usize,
}

/// Keeps the first event per identity key; order is preserved.
pub fn deduplicate(events: Vec<Event>) -> Deduplicated {
    let mut seen: HashSet<IdentityKey> = HashSet::with_capacity(events.len());
    let mut keep = Vec::with_capacity(events.len());
    let mut removed = 0usize;

    for ev in events {
        if !seen.insert(IdentityKey::for_event(&ev)) {
            tracing::debug!(target: "ingest", id = %ev.id, source = %ev.source, "duplicate dropped");
            removed += 1;
            continue;
        }
        keep.push(ev);
    }

    Deduplicated {
        events: keep,
        removed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_folds_case_whitespace_and_trailing_slash() {
        let a = IdentityKey::of("Rust  Nation\nUK", "https://RustNation.uk/cfp/");
        let b = IdentityKey::of("rust nation uk", "https://rustnation.uk/cfp");
        assert_eq!(a, b);
        assert_eq!(a.short_id(), b.short_id());
        assert_eq!(a.short_id().len(), 12);
    }

    #[test]
    fn different_links_are_different_cfps() {
        let a = IdentityKey::of("DevConf", "https://devconf.cz/cfp");
        let b = IdentityKey::of("DevConf", "https://devconf.us/cfp");
        assert_ne!(a, b);
    }
}
