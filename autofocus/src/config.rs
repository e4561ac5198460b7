//! Scan configuration.
//!
//! One [`ScanConfig`] is supplied per run and never modified during it.
//! Stored as pretty-printed JSON.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::fit::ModelKind;
use crate::scanner::scan_bounds;

/// Errors loading or validating a [`ScanConfig`]
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value for `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("Failed to read or write config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Parameters of one autofocus run.
///
/// Defaults follow the historical focusing script: 10 s exposures, 20
/// attempts, at least 15 stars per frame and a target FWHM of 3.5 pixels for
/// the linear fallback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Integration time per focus frame (seconds)
    pub exposure_time_s: f64,
    /// Distance between consecutive scan offsets (ticks)
    pub step_size: i64,
    /// Number of exposures per scan
    pub attempt_count: u32,
    /// Focuser the run drives
    pub focuser_id: String,
    /// Scan center relative to the focuser baseline (ticks)
    pub center_offset: i64,
    /// Frames with fewer detected stars are discarded
    pub min_stars: u32,
    /// FWHM the linear fallback solves for (pixels)
    pub target_fwhm: f64,
    /// Distance from the mean sampled offset at which a fit optimum is
    /// distrusted. Defaults to `step_size * attempt_count` when unset.
    pub fallback_distance_threshold: Option<f64>,
    /// Model fitted on every pass before any fallback
    pub default_model: ModelKind,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            exposure_time_s: 10.0,
            step_size: 20,
            attempt_count: 20,
            focuser_id: "F0".to_string(),
            center_offset: 0,
            min_stars: 15,
            target_fwhm: 3.5,
            fallback_distance_threshold: None,
            default_model: ModelKind::Quadratic,
        }
    }
}

impl ScanConfig {
    /// Integration time as a [`Duration`]
    ///
    /// Only meaningful on a validated config.
    pub fn exposure_time(&self) -> Duration {
        Duration::from_secs_f64(self.exposure_time_s.max(0.0))
    }

    /// Distance threshold used by the validity gate
    pub fn fallback_threshold(&self) -> f64 {
        self.fallback_distance_threshold
            .unwrap_or(self.step_size as f64 * self.attempt_count as f64)
    }

    /// Check every field for a usable value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.exposure_time_s.is_finite() && self.exposure_time_s > 0.0) {
            return Err(ConfigError::Invalid {
                field: "exposure_time_s",
                reason: format!("must be positive, got {}", self.exposure_time_s),
            });
        }
        if self.step_size <= 0 {
            return Err(ConfigError::Invalid {
                field: "step_size",
                reason: format!("must be positive, got {}", self.step_size),
            });
        }
        if self.attempt_count == 0 {
            return Err(ConfigError::Invalid {
                field: "attempt_count",
                reason: "at least one exposure is required".to_string(),
            });
        }
        if self
            .step_size
            .checked_mul(self.attempt_count as i64)
            .is_none()
        {
            return Err(ConfigError::Invalid {
                field: "step_size",
                reason: format!(
                    "{} attempts of {} ticks overflow the focuser range",
                    self.attempt_count, self.step_size
                ),
            });
        }
        // The retry pass is centered on the corrected baseline
        for center in [self.center_offset, 0] {
            if scan_bounds(center, self.step_size, self.attempt_count).is_none() {
                return Err(ConfigError::Invalid {
                    field: "center_offset",
                    reason: format!(
                        "scan around {} with step {} overflows the focuser range",
                        center, self.step_size
                    ),
                });
            }
        }
        if self.focuser_id.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "focuser_id",
                reason: "must not be empty".to_string(),
            });
        }
        if !(self.target_fwhm.is_finite() && self.target_fwhm > 0.0) {
            return Err(ConfigError::Invalid {
                field: "target_fwhm",
                reason: format!("must be positive, got {}", self.target_fwhm),
            });
        }
        if let Some(threshold) = self.fallback_distance_threshold {
            if !(threshold.is_finite() && threshold > 0.0) {
                return Err(ConfigError::Invalid {
                    field: "fallback_distance_threshold",
                    reason: format!("must be positive, got {threshold}"),
                });
            }
        }
        Ok(())
    }

    /// Save to JSON file
    pub fn save_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load from JSON file and validate
    ///
    /// Missing fields take their default values.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&json)?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_defaults_are_valid() {
        let config = ScanConfig::default();
        config.validate().unwrap();
        assert_eq!(config.default_model, ModelKind::Quadratic);
        assert_eq!(config.exposure_time(), Duration::from_secs(10));
    }

    #[test]
    fn test_threshold_defaults_to_scanned_span() {
        let config = ScanConfig {
            step_size: 25,
            attempt_count: 8,
            ..Default::default()
        };
        assert_relative_eq!(config.fallback_threshold(), 200.0);

        let explicit = ScanConfig {
            fallback_distance_threshold: Some(75.0),
            ..config
        };
        assert_relative_eq!(explicit.fallback_threshold(), 75.0);
    }

    #[test]
    fn test_threshold_of_huge_span_does_not_overflow() {
        let config = ScanConfig {
            step_size: i64::MAX / 4,
            attempt_count: 20,
            ..Default::default()
        };
        assert!(config.fallback_threshold() > i64::MAX as f64);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_fields() {
        let cases = [
            (
                ScanConfig {
                    exposure_time_s: 0.0,
                    ..Default::default()
                },
                "exposure_time_s",
            ),
            (
                ScanConfig {
                    step_size: -5,
                    ..Default::default()
                },
                "step_size",
            ),
            (
                ScanConfig {
                    attempt_count: 0,
                    ..Default::default()
                },
                "attempt_count",
            ),
            (
                ScanConfig {
                    step_size: i64::MAX / 4,
                    attempt_count: 20,
                    ..Default::default()
                },
                "step_size",
            ),
            (
                ScanConfig {
                    center_offset: i64::MAX - 10,
                    ..Default::default()
                },
                "center_offset",
            ),
            (
                ScanConfig {
                    target_fwhm: f64::NAN,
                    ..Default::default()
                },
                "target_fwhm",
            ),
            (
                ScanConfig {
                    fallback_distance_threshold: Some(-1.0),
                    ..Default::default()
                },
                "fallback_distance_threshold",
            ),
        ];

        for (config, expected) in cases {
            match config.validate() {
                Err(ConfigError::Invalid { field, .. }) => assert_eq!(field, expected),
                other => panic!("expected invalid {expected}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_json_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("focus.json");

        let config = ScanConfig {
            step_size: 15,
            focuser_id: "F1".to_string(),
            default_model: ModelKind::Quartic,
            fallback_distance_threshold: Some(120.0),
            ..Default::default()
        };
        config.save_to_file(&path).unwrap();

        let loaded = ScanConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.json");
        std::fs::write(&path, r#"{ "step_size": 40, "default_model": "linear" }"#).unwrap();

        let loaded = ScanConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded.step_size, 40);
        assert_eq!(loaded.default_model, ModelKind::Linear);
        assert_eq!(loaded.attempt_count, 20);
    }

    #[test]
    fn test_load_rejects_invalid_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, r#"{ "attempt_count": 0 }"#).unwrap();

        assert!(matches!(
            ScanConfig::load_from_file(&path),
            Err(ConfigError::Invalid {
                field: "attempt_count",
                ..
            })
        ));
    }
}
