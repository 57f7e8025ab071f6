use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use reqwest::Client;

use super::{Digest, Notifier};
use crate::event::FilteredEvent;

pub struct SlackNotifier {
    webhook_url: String,
    client: Client,
    timeout: Duration,
}

impl SlackNotifier {
    pub fn new(url: String) -> Self {
        Self {
            webhook_url: url,
            client: Client::new(),
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }
}

/// Slack mrkdwn body: subject in bold, then the plain digest in a code block.
pub fn slack_text(digest: &Digest) -> String {
    format!("*{}*\n```{}```", digest.subject, digest.text.trim_end())
}

#[async_trait::async_trait]
impl Notifier for SlackNotifier {
    async fn notify(&self, events: &[FilteredEvent]) -> Result<()> {
        let digest = Digest::build(events, Utc::now());
        let body = serde_json::json!({ "text": slack_text(&digest) });

        self.client
            .post(&self.webhook_url)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .context("slack post")?
            .error_for_status()
            .context("slack non-2xx")?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "slack"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_wraps_digest() {
        let d = Digest {
            subject: "CFP Scout: 0 relevant CFPs (2025-01-01)".into(),
            text: "body\n".into(),
            html: String::new(),
        };
        assert_eq!(
            slack_text(&d),
            "*CFP Scout: 0 relevant CFPs (2025-01-01)*\n```body```"
        );
    }

    #[tokio::test]
    async fn unreachable_webhook_is_an_error() {
        let n = SlackNotifier::new("http://127.0.0.1:9/hook".into()).with_timeout(1);
        assert!(n.notify(&[]).await.is_err());
    }
}
