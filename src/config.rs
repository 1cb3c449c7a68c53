use std::{path::PathBuf, str::FromStr};
use thiserror::Error;

pub const DEMO_KEY: &str = "DEMO_KEY";

#[derive(Debug, Error)]
#[error("invalid value for {key}: '{value}'")]
pub struct ConfigError {
    key: &'static str,
    value: String,
}

/// Runtime configuration, resolved once in `main` and shared as `Arc<Config>`.
///
/// | Env Var                  | Default                                            |
/// |--------------------------|----------------------------------------------------|
/// | `GEMINI_API_KEY`         | `DEMO_KEY` (offline demo mode)                     |
/// | `GEMINI_API_BASE`        | `https://generativelanguage.googleapis.com/v1beta` |
/// | `VISION_MODEL`           | `gemini-2.5-flash`                                 |
/// | `TEXT_MODEL`             | `gemini-2.5-flash`                                 |
/// | `PRIMARY_IMAGE_MODEL`    | `gemini-3-pro-image-preview`                       |
/// | `FALLBACK_IMAGE_MODEL`   | `gemini-2.5-flash-image`                           |
/// | `CORS_PROXY_URL`         | `https://api.allorigins.win/raw`                   |
/// | `FETCH_TIMEOUT_SECS`     | `15`                                               |
/// | `MAX_PHOTO_DIMENSION`    | `1024`                                             |
/// | `MAX_TEMPLATE_DIMENSION` | `1024`                                             |
/// | `TEMPLATES_FILE`         | `templates.json`                                   |
/// | `UPLOAD_DIR`             | `uploads`                                          |
/// | `MAX_UPLOAD_BYTES`       | `5242880`                                          |
/// | `DRAFT_TTL_SECS`         | `3600`                                             |
/// | `MAX_DRAFTS`             | `500`                                              |
/// | `HOST`                   | `0.0.0.0`                                          |
/// | `PORT`                   | `8080`                                             |
#[derive(Debug, Clone)]
pub struct Config {
    pub gemini_api_key: String,
    pub gemini_api_base: String,
    pub vision_model: String,
    pub text_model: String,
    pub primary_image_model: String,
    pub fallback_image_model: String,
    /// Relay used when a direct template download fails; the target is passed as `?url=`.
    pub cors_proxy_url: String,
    pub fetch_timeout_secs: u64,
    pub max_photo_dimension: u32,
    pub max_template_dimension: u32,
    pub templates_file: PathBuf,
    pub upload_dir: PathBuf,
    pub max_upload_bytes: usize,
    /// Drafts untouched for this long are dropped.
    pub draft_ttl_secs: u64,
    pub max_drafts: usize,
    pub host: String,
    pub port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            gemini_api_key: DEMO_KEY.into(),
            gemini_api_base: "https://generativelanguage.googleapis.com/v1beta".into(),
            vision_model: "gemini-2.5-flash".into(),
            text_model: "gemini-2.5-flash".into(),
            primary_image_model: "gemini-3-pro-image-preview".into(),
            fallback_image_model: "gemini-2.5-flash-image".into(),
            cors_proxy_url: "https://api.allorigins.win/raw".into(),
            fetch_timeout_secs: 15,
            max_photo_dimension: 1024,
            max_template_dimension: 1024,
            templates_file: PathBuf::from("templates.json"),
            upload_dir: PathBuf::from("uploads"),
            max_upload_bytes: 5 * 1024 * 1024,
            draft_ttl_secs: 60 * 60,
            max_drafts: 500,
            host: "0.0.0.0".into(),
            port: 8080,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from an arbitrary key lookup; unset keys keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let d = Self::default();
        let text = |key: &str, default: String| {
            lookup(key).filter(|v| !v.trim().is_empty()).unwrap_or(default)
        };

        Ok(Self {
            gemini_api_key: text("GEMINI_API_KEY", d.gemini_api_key),
            gemini_api_base: text("GEMINI_API_BASE", d.gemini_api_base)
                .trim_end_matches('/')
                .to_string(),
            vision_model: text("VISION_MODEL", d.vision_model),
            text_model: text("TEXT_MODEL", d.text_model),
            primary_image_model: text("PRIMARY_IMAGE_MODEL", d.primary_image_model),
            fallback_image_model: text("FALLBACK_IMAGE_MODEL", d.fallback_image_model),
            cors_proxy_url: text("CORS_PROXY_URL", d.cors_proxy_url),
            fetch_timeout_secs: parsed(&lookup, "FETCH_TIMEOUT_SECS", d.fetch_timeout_secs)?,
            max_photo_dimension: parsed(&lookup, "MAX_PHOTO_DIMENSION", d.max_photo_dimension)?,
            max_template_dimension: parsed(&lookup, "MAX_TEMPLATE_DIMENSION", d.max_template_dimension)?,
            templates_file: lookup("TEMPLATES_FILE").map(PathBuf::from).unwrap_or(d.templates_file),
            upload_dir: lookup("UPLOAD_DIR").map(PathBuf::from).unwrap_or(d.upload_dir),
            max_upload_bytes: parsed(&lookup, "MAX_UPLOAD_BYTES", d.max_upload_bytes)?,
            draft_ttl_secs: parsed(&lookup, "DRAFT_TTL_SECS", d.draft_ttl_secs)?,
            max_drafts: parsed(&lookup, "MAX_DRAFTS", d.max_drafts)?,
            host: text("HOST", d.host),
            port: parsed(&lookup, "PORT", d.port)?,
        })
    }

    pub fn demo_mode(&self) -> bool {
        self.gemini_api_key == DEMO_KEY
    }
}

fn parsed<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(key) {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|_| ConfigError { key, value }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_run_in_demo_mode() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert!(config.demo_mode());
        assert_eq!(config.port, 8080);
        assert_eq!(config.max_photo_dimension, 1024);
    }

    #[test]
    fn overrides_are_applied() {
        let config = Config::from_lookup(lookup(&[
            ("GEMINI_API_KEY", "real-key"),
            ("GEMINI_API_BASE", "http://localhost:9000/v1beta/"),
            ("PORT", "3000"),
            ("FALLBACK_IMAGE_MODEL", "imagen-lite"),
            ("MAX_DRAFTS", "25"),
        ]))
        .unwrap();
        assert!(!config.demo_mode());
        assert_eq!(config.gemini_api_base, "http://localhost:9000/v1beta");
        assert_eq!(config.port, 3000);
        assert_eq!(config.fallback_image_model, "imagen-lite");
        assert_eq!(config.max_drafts, 25);
        assert_eq!(config.draft_ttl_secs, 3600);
    }

    #[test]
    fn bad_numbers_are_rejected() {
        let err = Config::from_lookup(lookup(&[("MAX_PHOTO_DIMENSION", "huge")])).unwrap_err();
        assert!(err.to_string().contains("MAX_PHOTO_DIMENSION"));
    }
}
