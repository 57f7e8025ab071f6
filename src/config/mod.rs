// src/config/mod.rs
pub mod app;

pub use app::{AppConfig, EmailConfig, NotifyConfig, OllamaConfig, ScheduleConfig, SourceConfig};

use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const ENV_CONFIG_PATH: &str = "CFP_SCOUT_CONFIG_PATH";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading config from {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing config {path}: {message}")]
    Parse { path: PathBuf, message: String },
    #[error("{0} points to a non-existent path")]
    MissingPath(&'static str),
    #[error("missing {0} env var")]
    MissingEnv(&'static str),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Load config from an explicit path. Supports TOML or JSON formats.
pub fn load_from(path: &Path) -> Result<AppConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    parse_config(&content, ext.as_str()).map_err(|message| ConfigError::Parse {
        path: path.to_path_buf(),
        message,
    })
}

/// Load config using env var + fallbacks, then apply env overrides:
/// 1) $CFP_SCOUT_CONFIG_PATH
/// 2) config/cfp_scout.toml
/// 3) config/cfp_scout.json
/// 4) built-in defaults
pub fn load_default() -> Result<AppConfig, ConfigError> {
    let mut cfg = locate_and_load()?;
    cfg.apply_env_overrides()?;
    cfg.sanitize()?;
    Ok(cfg)
}

fn locate_and_load() -> Result<AppConfig, ConfigError> {
    if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
        let pb = PathBuf::from(p);
        if pb.exists() {
            return load_from(&pb);
        }
        return Err(ConfigError::MissingPath(ENV_CONFIG_PATH));
    }
    let toml_p = PathBuf::from("config/cfp_scout.toml");
    if toml_p.exists() {
        return load_from(&toml_p);
    }
    let json_p = PathBuf::from("config/cfp_scout.json");
    if json_p.exists() {
        return load_from(&json_p);
    }
    Ok(AppConfig::default())
}

fn parse_config(s: &str, hint_ext: &str) -> Result<AppConfig, String> {
    if hint_ext == "json" {
        return serde_json::from_str(s).map_err(|e| e.to_string());
    }
    match toml::from_str::<AppConfig>(s) {
        Ok(v) => Ok(v),
        // Unknown extension: JSON is the only other accepted shape.
        Err(e) if hint_ext != "toml" => serde_json::from_str(s).map_err(|_| e.to_string()),
        Err(e) => Err(e.to_string()),
    }
}
