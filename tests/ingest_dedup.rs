// tests/ingest_dedup.rs
//
// Deduplication properties:
// - dedup(dedup(x)) == dedup(x), identity keys unique afterwards
// - duplicate-free input passes through unchanged and in order
// - first occurrence wins (location of the first copy survives)
// - case / trailing-slash variants from two sources collapse to one event

use std::collections::HashSet;

use chrono::NaiveDate;

use cfp_scout::event::UNKNOWN_LOCATION;
use cfp_scout::ingest::{deduplicate, normalize, IdentityKey};
use cfp_scout::{Event, RawRecord};

fn ev(title: &str, link: &str, location: &str, source: &str) -> Event {
    Event {
        id: IdentityKey::of(title, link).short_id(),
        title: title.into(),
        link: link.into(),
        cfp_deadline: None,
        event_dates: None,
        location: location.into(),
        source: source.into(),
        tags: vec![],
        description: String::new(),
    }
}

fn sample() -> Vec<Event> {
    vec![
        ev("RustConf", "https://rustconf.com", "Seattle", "a"),
        ev("PyCon", "https://pycon.org/", UNKNOWN_LOCATION, "a"),
        ev("rustconf", "https://RUSTCONF.com/", "Portland", "b"),
        ev("KubeCon", "https://kubecon.io", "Paris", "b"),
        ev("PyCon ", "https://pycon.org", "Pittsburgh", "b"),
    ]
}

#[test]
fn dedup_is_idempotent_and_keys_are_unique() {
    let once = deduplicate(sample());
    let twice = deduplicate(once.events.clone());
    assert_eq!(twice.events, once.events);
    assert_eq!(twice.removed, 0);
    assert_eq!(once.removed, 2);

    let keys: HashSet<IdentityKey> = once.events.iter().map(IdentityKey::for_event).collect();
    assert_eq!(keys.len(), once.events.len());
}

#[test]
fn duplicate_free_input_is_unchanged() {
    let input = vec![
        ev("A", "https://a.dev", "X", "s"),
        ev("B", "https://b.dev", "Y", "s"),
        ev("C", "https://c.dev", "Z", "s"),
    ];
    let out = deduplicate(input.clone());
    assert_eq!(out.events, input);
    assert!(deduplicate(Vec::new()).events.is_empty());
}

#[test]
fn first_occurrence_wins() {
    let out = deduplicate(sample());
    let titles: Vec<&str> = out.events.iter().map(|e| e.title.as_str()).collect();
    assert_eq!(titles, vec!["RustConf", "PyCon", "KubeCon"]);
    assert_eq!(out.events[0].location, "Seattle");
    assert_eq!(out.events[1].location, UNKNOWN_LOCATION);
}

#[test]
fn devconf_variants_from_two_sources_collapse() {
    let today = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
    let raw = vec![
        RawRecord::new("first")
            .with("title", "DevConf")
            .with("link", "http://a/cfp"),
        RawRecord::new("second")
            .with("title", "devconf")
            .with("link", "http://A/cfp/"),
    ];
    let normalized = normalize(&raw, today);
    assert_eq!(normalized.events.len(), 2);
    assert_eq!(normalized.events[0].id, normalized.events[1].id);

    let out = deduplicate(normalized.events);
    assert_eq!(out.events.len(), 1);
    assert_eq!(out.events[0].title, "DevConf");
    assert_eq!(out.events[0].source, "first");
}
