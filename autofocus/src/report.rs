//! Record of a completed autofocus run.

use std::path::Path;

use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::fit::{FitResult, ModelKind};
use crate::sample::FocusSeries;

/// One scan and the fit resolved from it
#[derive(Debug, Clone, Serialize)]
pub struct PassReport {
    /// 1 for the initial scan, 2 for the retry after a fallback
    pub pass: u32,
    /// Absolute position commanded before the scan, if the run moved the
    /// baseline
    pub baseline: Option<i64>,
    pub samples: FocusSeries,
    pub fit: FitResult,
    /// True when `fit` is the linear fallback
    pub fallback: bool,
    /// Primary fit replaced by the fallback
    pub rejected: Option<FitResult>,
}

impl PassReport {
    /// Log the measured FWHM table alongside the fitted curve
    pub fn log_fwhm_table(&self) {
        match self.baseline {
            Some(baseline) => info!(
                "pass {} around {}: {} samples, {} fit",
                self.pass,
                baseline,
                self.samples.len(),
                self.fit.kind()
            ),
            None => info!(
                "pass {}: {} samples, {} fit",
                self.pass,
                self.samples.len(),
                self.fit.kind()
            ),
        }
        info!("{:>10} {:>8} {:>8} {:>6}", "offset", "fwhm", "model", "stars");
        for sample in self.samples.iter() {
            info!(
                "{:>10} {:>8.3} {:>8.3} {:>6}",
                sample.offset,
                sample.fwhm,
                self.fit.evaluate(sample.offset as f64),
                sample.star_count
            );
        }
    }
}

/// Errors writing a [`FocusRunReport`]
#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Failed to write report: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize report: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Serialize)]
pub struct FocusRunReport {
    pub focuser_id: String,
    pub default_model: ModelKind,
    /// Position the focuser reported before the first scan
    pub starting_position: i64,
    pub passes: Vec<PassReport>,
    /// Best-focus position as fitted, before rounding
    pub resolved_optimum: f64,
    /// Absolute position the focuser was finally commanded to
    pub committed_position: i64,
}

impl FocusRunReport {
    /// True if any pass resolved through the linear fallback
    pub fn fallback_used(&self) -> bool {
        self.passes.iter().any(|p| p.fallback)
    }

    /// Fit the committed position came from
    pub fn final_fit(&self) -> Option<&FitResult> {
        self.passes.last().map(|p| &p.fit)
    }

    /// Samples kept across every pass
    pub fn sample_count(&self) -> usize {
        self.passes.iter().map(|p| p.samples.len()).sum()
    }

    /// Save to JSON file
    pub fn save_to_file(&self, path: &Path) -> Result<(), ReportError> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}
