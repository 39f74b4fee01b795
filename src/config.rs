//! Agent configuration.
//!
//! Deployment-specific values only: model location, classifier threshold and
//! the external lookup endpoints. Security and quality limits are constants
//! in `validation::checks`.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

const ENV_PREFIX: &str = "STREETLIGHT_";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Directory holding `manifest.json` (and `model.safetensors`).
    pub model_dir: PathBuf,
    /// Minimum softmax probability for a valid issue, in [0, 1].
    pub confidence_threshold: f64,
    pub max_photo_age_days: i64,

    // Reverse geocoding
    pub nominatim_url: String,
    pub user_agent: String,
    pub geocoding_timeout_secs: u64,
    /// Minimum spacing between geocoding requests (fair-use policy).
    pub geocoding_delay_ms: u64,

    // Landmarks
    pub overpass_url: String,
    pub landmark_timeout_secs: u64,
    pub landmark_radius_m: u32,
    pub max_landmarks: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            model_dir: PathBuf::from("models/"),
            confidence_threshold: 0.5,
            max_photo_age_days: 30,
            nominatim_url: "https://nominatim.openstreetmap.org/reverse".to_string(),
            user_agent: "StreetLight-Pakistan-Civic-Reporting/1.0".to_string(),
            geocoding_timeout_secs: 10,
            geocoding_delay_ms: 1000,
            overpass_url: "https://overpass-api.de/api/interpreter".to_string(),
            landmark_timeout_secs: 15,
            landmark_radius_m: 500,
            max_landmarks: 5,
        }
    }
}

impl AgentConfig {
    /// Parse a JSON document; absent keys keep their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overridden by `STREETLIGHT_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each
    /// `STREETLIGHT_*` key.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(&format!("{}{}", ENV_PREFIX, name));
        let mut config = Self::default();

        if let Some(v) = get("MODEL_DIR") {
            config.model_dir = PathBuf::from(v);
        }
        if let Some(v) = get("CONFIDENCE_THRESHOLD") {
            config.confidence_threshold = parse_var("CONFIDENCE_THRESHOLD", &v)?;
        }
        if let Some(v) = get("MAX_PHOTO_AGE_DAYS") {
            config.max_photo_age_days = parse_var("MAX_PHOTO_AGE_DAYS", &v)?;
        }
        if let Some(v) = get("NOMINATIM_URL") {
            config.nominatim_url = v;
        }
        if let Some(v) = get("USER_AGENT") {
            config.user_agent = v;
        }
        if let Some(v) = get("GEOCODING_TIMEOUT_SECS") {
            config.geocoding_timeout_secs = parse_var("GEOCODING_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = get("GEOCODING_DELAY_MS") {
            config.geocoding_delay_ms = parse_var("GEOCODING_DELAY_MS", &v)?;
        }
        if let Some(v) = get("OVERPASS_URL") {
            config.overpass_url = v;
        }
        if let Some(v) = get("LANDMARK_TIMEOUT_SECS") {
            config.landmark_timeout_secs = parse_var("LANDMARK_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = get("LANDMARK_RADIUS_M") {
            config.landmark_radius_m = parse_var("LANDMARK_RADIUS_M", &v)?;
        }
        if let Some(v) = get("MAX_LANDMARKS") {
            config.max_landmarks = parse_var("MAX_LANDMARKS", &v)?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(CoreError::Config(format!(
                "confidence_threshold must be within [0, 1], got {}",
                self.confidence_threshold
            )));
        }
        if self.max_photo_age_days <= 0 {
            return Err(CoreError::Config(
                "max_photo_age_days must be positive".to_string(),
            ));
        }
        if self.landmark_radius_m == 0 {
            return Err(CoreError::Config("landmark_radius_m must be > 0".to_string()));
        }
        if self.max_landmarks == 0 {
            return Err(CoreError::Config("max_landmarks must be > 0".to_string()));
        }
        for (name, value) in [
            ("nominatim_url", &self.nominatim_url),
            ("overpass_url", &self.overpass_url),
            ("user_agent", &self.user_agent),
        ] {
            if value.trim().is_empty() {
                return Err(CoreError::Config(format!("{} must not be empty", name)));
            }
        }
        Ok(())
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T> {
    raw.trim().parse().map_err(|_| {
        CoreError::Config(format!("{}{} has invalid value '{}'", ENV_PREFIX, name, raw))
    })
}
