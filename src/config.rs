//! Pipeline configuration
//!
//! `PipelineSettings` holds the two knobs a participant can turn while the
//! pipeline runs. `AppConfig` bundles them with the fixed tunables of the
//! store and the receiver, and is what the binary loads from disk.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

pub const SAMPLING_INTERVAL_RANGE_MS: (u64, u64) = (5, 100);
pub const BATCH_INTERVAL_RANGE_MS: (u64, u64) = (100, 5000);

/// Errors raised while loading or validating configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{field} must be within {min}..={max}, got {value}")]
    OutOfRange {
        field: &'static str,
        value: u64,
        min: u64,
        max: u64,
    },

    #[error("spring {field} is out of range, got {value}")]
    InvalidSpring { field: &'static str, value: f64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

fn check_range(field: &'static str, value: u64, (min, max): (u64, u64)) -> Result<(), ConfigError> {
    if value < min || value > max {
        return Err(ConfigError::OutOfRange {
            field,
            value,
            min,
            max,
        });
    }
    Ok(())
}

/// Runtime-adjustable sampling and batching cadence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PipelineSettings {
    /// Minimum gap between two recorded movement samples
    pub sampling_interval_ms: u64,
    /// Period of the batch timer
    pub batch_interval_ms: u64,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            sampling_interval_ms: 10,
            batch_interval_ms: 1000,
        }
    }
}

impl PipelineSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_range(
            "samplingIntervalMs",
            self.sampling_interval_ms,
            SAMPLING_INTERVAL_RANGE_MS,
        )?;
        check_range(
            "batchIntervalMs",
            self.batch_interval_ms,
            BATCH_INTERVAL_RANGE_MS,
        )
    }
}

/// Settings shared between the UI side and the running loops.
///
/// Readers take a copy on every use, so an update lands on the next sample
/// or the next batch tick.
#[derive(Debug, Clone, Default)]
pub struct SharedSettings {
    inner: Arc<RwLock<PipelineSettings>>,
}

impl SharedSettings {
    pub fn new(settings: PipelineSettings) -> Result<Self, ConfigError> {
        settings.validate()?;
        Ok(Self {
            inner: Arc::new(RwLock::new(settings)),
        })
    }

    pub fn get(&self) -> PipelineSettings {
        *self.inner.read()
    }

    /// Validate and install new settings. Invalid settings leave the current ones in place.
    pub fn update(&self, settings: PipelineSettings) -> Result<(), ConfigError> {
        settings.validate()?;
        *self.inner.write() = settings;
        tracing::info!(
            "Pipeline settings updated (sampling={}ms, batch={}ms)",
            settings.sampling_interval_ms,
            settings.batch_interval_ms
        );
        Ok(())
    }

    pub fn set_sampling_interval(&self, ms: u64) -> Result<(), ConfigError> {
        let mut next = self.get();
        next.sampling_interval_ms = ms;
        self.update(next)
    }

    pub fn set_batch_interval(&self, ms: u64) -> Result<(), ConfigError> {
        let mut next = self.get();
        next.batch_interval_ms = ms;
        self.update(next)
    }
}

/// Damped spring parameters for render-side smoothing
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpringConfig {
    pub stiffness: f64,
    pub damping: f64,
    pub mass: f64,
}

impl SpringConfig {
    /// Rejects parameters the spring step cannot integrate
    pub fn validate(&self) -> Result<(), ConfigError> {
        let checks = [
            ("stiffness", self.stiffness, self.stiffness > 0.0),
            ("damping", self.damping, self.damping >= 0.0),
            ("mass", self.mass, self.mass > 0.0),
        ];
        for (field, value, ok) in checks {
            if !ok || !value.is_finite() {
                return Err(ConfigError::InvalidSpring { field, value });
            }
        }
        Ok(())
    }
}

impl Default for SpringConfig {
    fn default() -> Self {
        Self {
            stiffness: 470.0,
            damping: 70.0,
            mass: 3.0,
        }
    }
}

/// Full configuration of one participant's pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppConfig {
    pub settings: PipelineSettings,
    /// Actions kept per stored batch; later actions are dropped
    pub max_actions_per_batch: usize,
    /// How recently an identity must have been active to be listed
    pub active_window_ms: u64,
    /// How often the receiver re-lists active participants
    pub presence_poll_ms: u64,
    /// Animation frame period on the receiver
    pub frame_interval_ms: u64,
    /// Upper bound applied to an action's offset before comparing it with elapsed playback time
    pub max_action_offset_ms: u64,
    /// Lifetime of the click pulse effect
    pub pulse_duration_ms: u64,
    /// Spring smoothing for rendered cursors; `None` renders replayed positions as-is
    pub smoothing: Option<SpringConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            settings: PipelineSettings::default(),
            max_actions_per_batch: 200,
            active_window_ms: 30_000,
            presence_poll_ms: 1000,
            frame_interval_ms: 16,
            max_action_offset_ms: 1000,
            pulse_duration_ms: 350,
            smoothing: None,
        }
    }
}

impl AppConfig {
    /// Read a JSON config file. Missing fields take their defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: AppConfig = serde_json::from_str(&content)?;
        config.validate()?;
        tracing::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.settings.validate()?;
        check_range(
            "maxActionsPerBatch",
            self.max_actions_per_batch as u64,
            (1, 100_000),
        )?;
        check_range("presencePollMs", self.presence_poll_ms, (10, 60_000))?;
        check_range("frameIntervalMs", self.frame_interval_ms, (1, 1000))?;
        check_range("maxActionOffsetMs", self.max_action_offset_ms, (1, 60_000))?;
        if let Some(spring) = &self.smoothing {
            spring.validate()?;
        }
        Ok(())
    }
}
