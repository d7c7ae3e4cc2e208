use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Runtime configuration for the decision engine and plan builder
///
/// All thresholds are fractions or absolute values consumed directly by the
/// domain logic. Defaults mirror the values the system was tuned with; a TOML
/// file can override any subset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Recovery-breach thresholds
    pub recovery: RecoveryThresholds,

    /// Per-exercise weight progression tuning
    pub progression: ProgressionSettings,

    /// Block-builder seeding and validation tuning
    pub block: BlockSettings,
}

/// Allowed deviations of recent averages from dynamic baselines
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryThresholds {
    /// Allowed resting-HR increase over baseline, as a fraction
    pub rhr_allowed_increase: f64,

    /// Allowed sleep decrease below baseline, as a fraction
    pub sleep_allowed_decrease: f64,

    /// Allowed HRV decrease below baseline, as a fraction
    pub hrv_allowed_decrease: f64,
}

impl Default for RecoveryThresholds {
    fn default() -> Self {
        Self {
            rhr_allowed_increase: 0.10,
            sleep_allowed_decrease: 0.10,
            hrv_allowed_decrease: 0.12,
        }
    }
}

/// Base increment/decrement fractions for working-weight targets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgressionSettings {
    pub increment: f64,
    pub decrement: f64,
}

impl Default for ProgressionSettings {
    fn default() -> Self {
        Self {
            increment: 0.05,
            decrement: 0.05,
        }
    }
}

/// Thresholds consumed by the periodization builder and validator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlockSettings {
    /// Mean nightly sleep below this many minutes prefers a lighter block
    pub sleep_floor_minutes: f64,

    /// Mean resting HR above this many bpm prefers a lighter block
    pub rhr_ceiling: f64,

    /// Tolerance on the max/min required-group set ratio (0.25 allows 1.25x)
    pub balance_tolerance: f64,
}

impl Default for BlockSettings {
    fn default() -> Self {
        Self {
            sleep_floor_minutes: 420.0,
            rhr_ceiling: 60.0,
            balance_tolerance: 0.25,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            recovery: RecoveryThresholds::default(),
            progression: ProgressionSettings::default(),
            block: BlockSettings::default(),
        }
    }
}

impl Settings {
    /// Load settings from a TOML file, falling back to defaults for any
    /// missing section or key
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let settings: Settings = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(settings)
    }

    /// Write settings to a TOML file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {}", parent.display()))?;
        }
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Load from the given path if present, else defaults
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) if p.exists() => Self::load(p),
            _ => Ok(Self::default()),
        }
    }
}
