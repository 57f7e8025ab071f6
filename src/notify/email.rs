use anyhow::{Context, Result};
use chrono::Utc;
use lettre::message::{Mailbox, Message, MultiPart};
use lettre::transport::smtp::{authentication::Credentials, AsyncSmtpTransport};
use lettre::{AsyncTransport, Tokio1Executor};

use super::{Digest, Notifier};
use crate::config::EmailConfig;
use crate::event::FilteredEvent;

pub struct EmailNotifier {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Mailbox,
}

impl EmailNotifier {
    /// `cfg.smtp_pass` must already be resolved (config sanitizing does that).
    pub fn from_config(cfg: &EmailConfig) -> Result<Self> {
        let creds = Credentials::new(cfg.smtp_user.clone(), cfg.smtp_pass.clone());
        let mailer = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&cfg.smtp_host)
            .with_context(|| format!("invalid smtp host {}", cfg.smtp_host))?
            .port(cfg.smtp_port)
            .credentials(creds)
            .build();

        let from = cfg
            .from
            .parse()
            .with_context(|| format!("invalid from address {}", cfg.from))?;
        let to = cfg
            .to
            .parse()
            .with_context(|| format!("invalid to address {}", cfg.to))?;

        Ok(Self { mailer, from, to })
    }

    pub fn build_message(&self, digest: &Digest) -> Result<Message> {
        Message::builder()
            .from(self.from.clone())
            .to(self.to.clone())
            .subject(digest.subject.clone())
            .multipart(MultiPart::alternative_plain_html(
                digest.text.clone(),
                digest.html.clone(),
            ))
            .context("build email")
    }
}

#[async_trait::async_trait]
impl Notifier for EmailNotifier {
    async fn notify(&self, events: &[FilteredEvent]) -> Result<()> {
        let digest = Digest::build(events, Utc::now());
        let msg = self.build_message(&digest)?;
        self.mailer.send(msg).await.context("send email")?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "email"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> EmailConfig {
        EmailConfig {
            smtp_host: "smtp.example.com".into(),
            smtp_port: 587,
            smtp_user: "bot".into(),
            smtp_pass: "secret".into(),
            from: "CFP Scout <bot@example.com>".into(),
            to: "me@example.com".into(),
        }
    }

    #[tokio::test]
    async fn builds_multipart_message() {
        let n = EmailNotifier::from_config(&cfg()).unwrap();
        let digest = Digest::build(&[], Utc::now());
        let msg = n.build_message(&digest).unwrap();
        let raw = String::from_utf8(msg.formatted()).unwrap();
        assert!(raw.contains("multipart/alternative"));
        assert!(raw.contains("Subject: CFP Scout: 0 relevant CFPs"));
    }

    #[tokio::test]
    async fn bad_address_is_an_error() {
        let mut c = cfg();
        c.to = "not an address".into();
        assert!(EmailNotifier::from_config(&c).is_err());
    }
}
