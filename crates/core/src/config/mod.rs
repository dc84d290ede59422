use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{Location, MindbeatError, PlaybackPolicy, Result};

/// Top-level configuration structure for the application.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub capture: CaptureConfig,
    pub sampler: SamplerConfig,
    pub session: SessionConfig,
    pub network: NetworkConfig,
    pub classifier: ClassifierConfig,
    pub chat: ChatConfig,
}

impl AppConfig {
    /// Reads a TOML file. Missing sections and keys keep their defaults.
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads `path` when given, otherwise returns the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                let source = std::fs::read_to_string(path)?;
                Self::from_toml_str(&source)
            }
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.session.duration_seconds > 0.0) {
            return Err(MindbeatError::InvalidInput(
                "session.duration_seconds must be positive",
            ));
        }
        if self.session.sample_rate == 0 {
            return Err(MindbeatError::InvalidInput(
                "session.sample_rate must be positive",
            ));
        }
        if self.sampler.debounce_ms == 0 {
            return Err(MindbeatError::InvalidInput(
                "sampler.debounce_ms must be positive",
            ));
        }
        if self.network.search_radius_m == 0 {
            return Err(MindbeatError::InvalidInput(
                "network.search_radius_m must be positive",
            ));
        }
        if self.chat.history_exchanges == 0 {
            return Err(MindbeatError::InvalidInput(
                "chat.history_exchanges must be positive",
            ));
        }
        Ok(())
    }
}

/// Webcam and preview window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub camera_index: i32,
    pub window_title: String,
    /// Keyboard poll timeout per loop iteration.
    pub key_poll_ms: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            camera_index: 0,
            window_title: "MindBeat".to_string(),
            key_poll_ms: 1,
        }
    }
}

impl CaptureConfig {
    pub fn key_poll(&self) -> Duration {
        Duration::from_millis(self.key_poll_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerConfig {
    pub debounce_ms: u64,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self { debounce_ms: 1200 }
    }
}

impl SamplerConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

/// Binaural session rendering and playback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub playback_policy: PlaybackPolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            duration_seconds: 60.0,
            sample_rate: 44_100,
            playback_policy: PlaybackPolicy::default(),
        }
    }
}

/// Geolocation and provider lookup collaborators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub geolocation_url: String,
    pub geolocation_timeout_secs: u64,
    pub provider_url: String,
    pub provider_timeout_secs: u64,
    pub search_radius_m: u32,
    pub fallback_location: Location,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            geolocation_url: "https://ipinfo.io/json".to_string(),
            geolocation_timeout_secs: 5,
            provider_url: "https://overpass-api.de/api/interpreter".to_string(),
            provider_timeout_secs: 20,
            search_radius_m: 1000,
            fallback_location: Location::fallback(),
        }
    }
}

impl NetworkConfig {
    pub fn geolocation_timeout(&self) -> Duration {
        Duration::from_secs(self.geolocation_timeout_secs)
    }

    pub fn provider_timeout(&self) -> Duration {
        Duration::from_secs(self.provider_timeout_secs)
    }
}

/// External emotion recognition service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub endpoint: String,
    /// `0` disables the timeout; classification then blocks until the
    /// service answers.
    pub timeout_secs: u64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:5005/analyze".to_string(),
            timeout_secs: 0,
        }
    }
}

impl ClassifierConfig {
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }
}

/// OpenAI-compatible chat completion service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    pub endpoint: String,
    pub model: String,
    pub max_tokens: u32,
    pub history_exchanges: usize,
    pub api_key_env: String,
    pub timeout_secs: u64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://openrouter.ai/api/v1/chat/completions".to_string(),
            model: "mistralai/mistral-7b-instruct".to_string(),
            max_tokens: 500,
            history_exchanges: 10,
            api_key_env: "OPENROUTER_API_KEY".to_string(),
            timeout_secs: 20,
        }
    }
}

impl ChatConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
