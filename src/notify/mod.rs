// src/notify/mod.rs
//! Delivery of the daily digest. Each channel implements [`Notifier`];
//! [`NotifierMux`] fans out to every configured one.

pub mod digest;
pub mod email;
pub mod slack;

use std::sync::Arc;

use anyhow::{bail, Result};
use chrono::Utc;

use crate::config::NotifyConfig;
use crate::event::FilteredEvent;

pub use digest::Digest;
pub use email::EmailNotifier;
pub use slack::SlackNotifier;

#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    /// `events` are the included events of one run, in pipeline order.
    async fn notify(&self, events: &[FilteredEvent]) -> Result<()>;
    fn name(&self) -> &'static str;
}

pub type DynNotifier = Arc<dyn Notifier>;

/// Writes the text digest to the log instead of sending it anywhere.
pub struct LogNotifier;

#[async_trait::async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, events: &[FilteredEvent]) -> Result<()> {
        let digest = Digest::build(events, Utc::now());
        tracing::info!(target: "notify", subject = %digest.subject, "digest preview\n{}", digest.text);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "log"
    }
}

pub struct NotifierMux {
    channels: Vec<Box<dyn Notifier>>,
}

impl NotifierMux {
    pub fn new(channels: Vec<Box<dyn Notifier>>) -> Self {
        Self { channels }
    }

    /// Email and Slack when configured, log preview when enabled. With nothing
    /// configured the preview is used so a run never vanishes silently.
    pub fn from_config(cfg: &NotifyConfig) -> Result<Self> {
        let mut channels: Vec<Box<dyn Notifier>> = Vec::new();
        if let Some(email) = &cfg.email {
            channels.push(Box::new(EmailNotifier::from_config(email)?));
        }
        if let Some(url) = cfg.slack_webhook.as_deref().filter(|u| !u.trim().is_empty()) {
            channels.push(Box::new(SlackNotifier::new(url.to_string())));
        }
        if cfg.preview || channels.is_empty() {
            channels.push(Box::new(LogNotifier));
        }
        tracing::info!(
            target: "notify",
            channels = ?channels.iter().map(|c| c.name()).collect::<Vec<_>>(),
            "notifiers configured"
        );
        Ok(Self { channels })
    }

    pub fn channel_names(&self) -> Vec<&'static str> {
        self.channels.iter().map(|c| c.name()).collect()
    }
}

#[async_trait::async_trait]
impl Notifier for NotifierMux {
    /// Every channel is attempted; the error lists the ones that failed.
    async fn notify(&self, events: &[FilteredEvent]) -> Result<()> {
        let mut failed = Vec::new();
        for ch in &self.channels {
            match ch.notify(events).await {
                Ok(()) => tracing::info!(target: "notify", channel = ch.name(), events = events.len(), "sent"),
                Err(e) => {
                    tracing::warn!(target: "notify", channel = ch.name(), error = ?e, "send failed");
                    failed.push(format!("{}: {e:#}", ch.name()));
                }
            }
        }
        if !failed.is_empty() {
            bail!("{}", failed.join("; "));
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "mux"
    }
}
