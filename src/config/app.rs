// src/config/app.rs
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

use super::ConfigError;
use crate::event::UserProfile;

fn default_storage_dir() -> PathBuf {
    PathBuf::from("data")
}
fn default_true() -> bool {
    true
}
fn default_ollama_host() -> String {
    "http://localhost:11434".to_string()
}
fn default_ollama_model() -> String {
    "llama3.2:3b".to_string()
}
fn default_ollama_timeout() -> u64 {
    30
}
fn default_schedule_time() -> String {
    "08:00".to_string()
}
fn default_smtp_port() -> u16 {
    587
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_storage_dir")]
    pub storage_dir: PathBuf,
    #[serde(default)]
    pub profile: UserProfile,
    /// Order matters: earlier sources win duplicate conflicts.
    #[serde(default = "default_sources")]
    pub sources: Vec<SourceConfig>,
    #[serde(default)]
    pub ollama: OllamaConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            storage_dir: default_storage_dir(),
            profile: UserProfile::default(),
            sources: default_sources(),
            ollama: OllamaConfig::default(),
            schedule: ScheduleConfig::default(),
            notify: NotifyConfig::default(),
        }
    }
}

fn default_sources() -> Vec<SourceConfig> {
    vec![SourceConfig::ConferenceData {
        name: "confs.tech".to_string(),
        topics: ["general", "javascript", "python", "devops", "data", "rust"]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        year: None,
        base_url: None,
    }]
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceConfig {
    ConferenceData {
        name: String,
        topics: Vec<String>,
        #[serde(default)]
        year: Option<i32>,
        #[serde(default)]
        base_url: Option<String>,
    },
    Rss {
        name: String,
        url: String,
    },
    File {
        name: String,
        path: PathBuf,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_ollama_host")]
    pub host: String,
    #[serde(default = "default_ollama_model")]
    pub model: String,
    #[serde(default = "default_ollama_timeout")]
    pub timeout_secs: u64,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: default_ollama_host(),
            model: default_ollama_model(),
            timeout_secs: default_ollama_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// "HH:MM", UTC.
    #[serde(default = "default_schedule_time")]
    pub time: String,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            time: default_schedule_time(),
        }
    }
}

impl ScheduleConfig {
    pub fn at(&self) -> Result<NaiveTime, ConfigError> {
        NaiveTime::parse_from_str(self.time.trim(), "%H:%M")
            .map_err(|_| ConfigError::Invalid(format!("schedule time {:?} is not HH:MM", self.time)))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyConfig {
    /// Log the digest text as well (preview mode).
    #[serde(default = "default_true")]
    pub preview: bool,
    #[serde(default)]
    pub email: Option<EmailConfig>,
    #[serde(default)]
    pub slack_webhook: Option<String>,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            preview: true,
            email: None,
            slack_webhook: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    pub smtp_host: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    pub smtp_user: String,
    /// "ENV" means: read from SMTP_PASS
    pub smtp_pass: String,
    pub from: String,
    pub to: String,
}

impl AppConfig {
    /// Environment wins over the file for deploy-specific values.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(v) = env::var("STORAGE_DIR") {
            if !v.trim().is_empty() {
                self.storage_dir = PathBuf::from(v.trim());
            }
        }
        if let Ok(v) = env::var("USER_INTERESTS") {
            let interests = UserProfile::parse_interests(&v);
            if !interests.is_empty() {
                self.profile.interests = interests;
            }
        }
        if let Some(score) = parse_score_env(env::var("MIN_RELEVANCE_SCORE").ok()) {
            self.profile.min_score = score;
        }
        if let Ok(v) = env::var("OLLAMA_HOST") {
            self.ollama.host = v;
        }
        if let Ok(v) = env::var("OLLAMA_MODEL") {
            self.ollama.model = v;
        }
        if let Ok(v) = env::var("SCHEDULE_TIME") {
            self.schedule.time = v;
        }
        if let Ok(v) = env::var("SLACK_WEBHOOK_URL") {
            if !v.trim().is_empty() {
                self.notify.slack_webhook = Some(v);
            }
        }
        if self.notify.email.is_none() {
            if let Ok(host) = env::var("SMTP_HOST") {
                self.notify.email = Some(EmailConfig {
                    smtp_host: host,
                    smtp_port: env::var("SMTP_PORT")
                        .ok()
                        .and_then(|p| p.trim().parse().ok())
                        .unwrap_or_else(default_smtp_port),
                    smtp_user: require_env("SMTP_USER")?,
                    smtp_pass: "ENV".to_string(),
                    from: require_env("NOTIFY_EMAIL_FROM")?,
                    to: require_env("NOTIFY_EMAIL_TO")?,
                });
            }
        }
        Ok(())
    }

    /// Resolve "ENV" secrets and keep values in range.
    pub fn sanitize(&mut self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.profile.min_score) || self.profile.min_score.is_nan() {
            tracing::warn!(
                min_score = self.profile.min_score,
                "min_score out of range, clamping"
            );
            self.profile.min_score = if self.profile.min_score.is_nan() {
                crate::event::DEFAULT_MIN_SCORE
            } else {
                self.profile.min_score.clamp(0.0, 1.0)
            };
        }
        if self.profile.interests.is_empty() {
            tracing::warn!("no interests configured, using defaults");
            self.profile.interests = UserProfile::default().interests;
        }
        if let Some(email) = self.notify.email.as_mut() {
            if email.smtp_pass.trim().eq_ignore_ascii_case("env") {
                email.smtp_pass = require_env("SMTP_PASS")?;
            }
        }
        self.schedule.at()?;
        Ok(())
    }
}

fn require_env(name: &'static str) -> Result<String, ConfigError> {
    env::var(name).map_err(|_| ConfigError::MissingEnv(name))
}

// parse optional float env and clamp to <0.0..=1.0>
fn parse_score_env(raw: Option<String>) -> Option<f32> {
    raw.and_then(|s| s.trim().parse::<f32>().ok())
        .filter(|v| !v.is_nan())
        .map(|v| v.clamp(0.0, 1.0))
}
