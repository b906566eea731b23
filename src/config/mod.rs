// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Configuration module

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::streaming::StreamingConfig;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Application name
    pub app_name: String,

    /// Application version
    pub version: String,

    /// Log level
    pub log_level: String,

    /// Directory exported accident reports are written to
    pub report_dir: PathBuf,

    /// Crash detection configuration
    pub detection: DetectionConfig,

    /// Confirmation countdown and alarm configuration
    pub alert: AlertConfig,

    /// Emergency dispatch configuration
    pub dispatch: DispatchConfig,

    /// Siren / haptic output configuration
    pub feedback: FeedbackConfig,

    /// Damage assessment service configuration
    pub assessment: AssessmentConfig,

    /// Location lookup configuration
    pub location: LocationConfig,

    /// Streaming configuration
    pub streaming: StreamingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            app_name: "CrashDoc".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            log_level: "info".to_string(),
            report_dir: PathBuf::from("./reports"),
            detection: DetectionConfig::default(),
            alert: AlertConfig::default(),
            dispatch: DispatchConfig::default(),
            feedback: FeedbackConfig::default(),
            assessment: AssessmentConfig::default(),
            location: LocationConfig::default(),
            streaming: StreamingConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Load or create default configuration
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            let config = Self::default();

            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            config.save(path)?;
            Ok(config)
        }
    }

    /// Get configuration directory
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|d| d.join("crashdoc"))
            .unwrap_or_else(|| PathBuf::from("./config"))
    }

    /// Get default configuration path
    pub fn default_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }
}

/// Crash detection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Magnitude delta between consecutive samples that counts as an impact (m/s²)
    pub threshold: f64,

    /// Sample rate for simulated and replayed sources in Hz
    pub sample_rate: f64,

    /// Start detection automatically with the monitor
    pub auto_start: bool,

    /// Use the simulated accelerometer
    pub demo_mode: bool,

    /// Probability per sample that the simulator injects an impact
    pub demo_impact_probability: f64,

    /// Replay samples from a JSON-lines file instead of simulating
    pub replay_file: Option<PathBuf>,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            threshold: 20.0,
            sample_rate: 50.0,
            auto_start: true,
            demo_mode: true,
            demo_impact_probability: 0.0,
            replay_file: None,
        }
    }
}

/// Confirmation countdown configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    /// Seconds before an unanswered crash alert escalates
    pub countdown_secs: u32,

    /// Seconds of countdown before a manual SOS dispatches (0 = immediate)
    pub sos_countdown_secs: u32,

    /// Siren retrigger period in milliseconds
    pub siren_period_ms: u64,

    /// Haptic alarm repeat period in milliseconds
    pub haptic_period_ms: u64,

    /// Vibration pattern played while the countdown runs (on/off ms)
    pub alarm_pattern_ms: Vec<u64>,

    /// Pulse played each second of the manual SOS countdown
    pub sos_tick_pattern_ms: Vec<u64>,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            countdown_secs: 10,
            sos_countdown_secs: 0,
            siren_period_ms: 1000,
            haptic_period_ms: 1500,
            alarm_pattern_ms: vec![200, 100, 200, 100, 500],
            sos_tick_pattern_ms: vec![50],
        }
    }
}

impl AlertConfig {
    pub fn siren_period(&self) -> Duration {
        Duration::from_millis(self.siren_period_ms)
    }

    pub fn haptic_period(&self) -> Duration {
        Duration::from_millis(self.haptic_period_ms)
    }
}

/// A personal emergency contact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmergencyContact {
    pub name: String,
    pub phone: String,
    #[serde(default)]
    pub relation: String,
}

/// Emergency dispatch configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Delay from dispatch start until police are notified (ms)
    pub police_delay_ms: u64,

    /// Delay from dispatch start until ambulance is notified (ms)
    pub ambulance_delay_ms: u64,

    /// Delay from dispatch start until contacts are notified (ms)
    pub contacts_delay_ms: u64,

    /// Police number shown in dispatch status
    pub police_number: String,

    /// Ambulance number shown in dispatch status
    pub ambulance_number: String,

    /// Pattern played when dispatch starts
    pub start_pattern_ms: Vec<u64>,

    /// Pattern played once every channel is notified
    pub success_pattern_ms: Vec<u64>,

    /// Personal contacts notified on the contacts channel
    pub contacts: Vec<EmergencyContact>,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            police_delay_ms: 1500,
            ambulance_delay_ms: 2500,
            contacts_delay_ms: 3500,
            police_number: "119".to_string(),
            ambulance_number: "1990".to_string(),
            start_pattern_ms: vec![500, 200, 500, 200, 500],
            success_pattern_ms: vec![100, 50, 100],
            contacts: vec![EmergencyContact {
                name: "Home".to_string(),
                phone: "+94771234567".to_string(),
                relation: "Family".to_string(),
            }],
        }
    }
}

/// Siren and haptic output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedbackConfig {
    /// Play the siren through the default audio device (needs the `audio` feature)
    pub audio_enabled: bool,

    /// Emit haptic patterns
    pub haptics_enabled: bool,

    /// Siren start frequency in Hz
    pub siren_high_hz: f32,

    /// Siren end frequency in Hz
    pub siren_low_hz: f32,

    /// Duration of one siren sweep in milliseconds
    pub siren_sweep_ms: u64,

    /// Siren output gain (0-1)
    pub siren_gain: f32,
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            audio_enabled: true,
            haptics_enabled: true,
            siren_high_hz: 880.0,
            siren_low_hz: 440.0,
            siren_sweep_ms: 500,
            siren_gain: 0.3,
        }
    }
}

/// Damage assessment service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AssessmentConfig {
    /// Enable calls to the assessment service
    pub enabled: bool,

    /// Base URL of the generative language API
    pub endpoint: String,

    /// Model name
    pub model: String,

    /// API key; falls back to the GEMINI_API_KEY environment variable
    pub api_key: Option<String>,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for AssessmentConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            model: "gemini-2.5-flash".to_string(),
            api_key: None,
            timeout_secs: 60,
        }
    }
}

impl AssessmentConfig {
    /// Resolve the API key from config or environment
    pub fn resolved_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|k| !k.is_empty())
            .or_else(|| std::env::var("GEMINI_API_KEY").ok().filter(|k| !k.is_empty()))
    }
}

/// Location lookup configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocationConfig {
    /// Upper bound on a location lookup in milliseconds
    pub timeout_ms: u64,

    /// Fixed latitude reported by the static provider
    pub latitude: Option<f64>,

    /// Fixed longitude reported by the static provider
    pub longitude: Option<f64>,
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 3000,
            latitude: None,
            longitude: None,
        }
    }
}

impl LocationConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_alert_timings() {
        let config = Config::default();
        assert_eq!(config.detection.threshold, 20.0);
        assert_eq!(config.alert.countdown_secs, 10);
        assert_eq!(config.dispatch.police_delay_ms, 1500);
        assert_eq!(config.dispatch.ambulance_delay_ms, 2500);
        assert_eq!(config.dispatch.contacts_delay_ms, 3500);
        assert_eq!(config.location.timeout(), Duration::from_secs(3));
    }

    #[test]
    fn test_load_or_create_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let created = Config::load_or_create(&path).unwrap();
        assert!(path.exists());

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.alert.countdown_secs, created.alert.countdown_secs);
        assert_eq!(loaded.dispatch.contacts, created.dispatch.contacts);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[alert]\ncountdown_secs = 5\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.alert.countdown_secs, 5);
        assert_eq!(config.alert.haptic_period_ms, 1500);
        assert_eq!(config.detection.threshold, 20.0);
    }
}
