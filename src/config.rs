//! Configuration management for time-announcer.
//!
//! Loads config from YAML files in standard locations. Every section and
//! field has a default, so an empty or missing file is valid.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{error, info};

use crate::announcer::schedule::TimeFormat;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AnnouncerConfig {
    pub time_format: TimeFormat,
    /// IANA zone name such as "Europe/Paris"; the system zone when unset.
    pub timezone: Option<String>,
    /// Start announcing as soon as a personal voice is available.
    pub auto_start: bool,
}

impl Default for AnnouncerConfig {
    fn default() -> Self {
        Self {
            time_format: TimeFormat::TwelveHour,
            timezone: None,
            auto_start: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    pub engine: String,
    /// Words per minute.
    pub rate: u32,
    /// 0-99.
    pub pitch: u32,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            engine: "espeak-ng".into(),
            rate: 175,
            pitch: 50,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VoicesConfig {
    pub personal_dir: PathBuf,
}

impl Default for VoicesConfig {
    fn default() -> Self {
        Self {
            personal_dir: dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("time-announcer/voices"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Consent {
    #[default]
    Allow,
    Deny,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AuthorizationConfig {
    pub consent: Consent,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FeedbackConfig {
    pub notifications: bool,
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self { notifications: true }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub announcer: AnnouncerConfig,
    pub speech: SpeechConfig,
    pub voices: VoicesConfig,
    pub authorization: AuthorizationConfig,
    pub feedback: FeedbackConfig,
}

impl Config {
    /// Load configuration from YAML file.
    ///
    /// Searches standard locations if no path is provided:
    /// 1. ./config.yaml
    /// 2. ~/.config/time-announcer/config.yaml
    /// 3. /etc/time-announcer/config.yaml
    pub fn load(path: Option<&Path>) -> Self {
        let resolved = path.map(PathBuf::from).or_else(|| {
            let candidates = [
                std::env::current_dir().ok().map(|d| d.join("config.yaml")),
                dirs::home_dir().map(|h| h.join(".config/time-announcer/config.yaml")),
                Some(PathBuf::from("/etc/time-announcer/config.yaml")),
            ];
            candidates.into_iter().flatten().find(|p| p.exists())
        });

        let Some(config_path) = resolved else {
            info!("No config file found, using defaults");
            return Self::default();
        };

        match std::fs::read_to_string(&config_path) {
            Ok(contents) => match Self::parse(&contents) {
                Ok(config) => {
                    info!("Loaded config from {}", config_path.display());
                    config
                }
                Err(e) => {
                    error!("Failed to parse {}: {e}, using defaults without consent", config_path.display());
                    Self::unusable_file_fallback()
                }
            },
            Err(e) => {
                error!("Failed to read {}: {e}, using defaults without consent", config_path.display());
                Self::unusable_file_fallback()
            }
        }
    }

    /// Defaults for a config file that exists but cannot be used. The file may
    /// have withheld personal voice consent, so it stays withheld.
    fn unusable_file_fallback() -> Self {
        let mut config = Self::default();
        config.authorization.consent = Consent::Deny;
        config
    }

    pub fn parse(contents: &str) -> Result<Self, serde_yml::Error> {
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yml::from_str(contents)
    }
}
