use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

use crate::gradient::MagneticReference;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read filter config {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse filter config {path:?}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("{name} must be finite and non-negative (got {value})")]
    InvalidGain { name: &'static str, value: f64 },
    #[error("magnetic inclination must lie within [-90, 90] degrees (got {0})")]
    InvalidInclination(f64),
}

/// Tuning for the Madgwick filter driver.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Fusion gain. Larger values trust the accelerometer/magnetometer
    /// correction more than gyro integration.
    pub beta: f64,
    /// Step scale for accelerometer/magnetometer-only correction.
    pub alpha: f64,
    /// Magnetic dip angle at the operating site, degrees (+D/-U). The default
    /// of 0 assumes the inclination was already removed during calibration,
    /// giving a reference field of (1, 0, 0).
    pub mag_inclination_deg: f64,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            beta: 0.04,
            alpha: 0.01,
            mag_inclination_deg: 0.0,
        }
    }
}

impl FilterConfig {
    pub fn magnetic_reference(&self) -> MagneticReference<f64> {
        MagneticReference::from_inclination_deg(self.mag_inclination_deg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [("beta", self.beta), ("alpha", self.alpha)] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::InvalidGain { name, value });
            }
        }
        if !(-90.0..=90.0).contains(&self.mag_inclination_deg) {
            return Err(ConfigError::InvalidInclination(self.mag_inclination_deg));
        }
        Ok(())
    }
}

/// Loads and validates a TOML filter config. Missing keys take their default
/// values.
pub fn load_config(path: &Path) -> Result<FilterConfig, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let config: FilterConfig = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    config.validate()?;
    info!(?path, ?config, "Loaded filter config");
    Ok(config)
}
