//! Focus samples and the series a scan produces.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// One measured point of the focus curve
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FocusSample {
    /// Focuser position reported during the exposure (ticks)
    pub offset: i64,
    /// Measured FWHM (pixels)
    pub fwhm: f64,
    /// Stars the measurement was based on
    #[serde(alias = "stars")]
    pub star_count: u32,
}

impl FocusSample {
    pub fn new(offset: i64, fwhm: f64, star_count: u32) -> Self {
        Self {
            offset,
            fwhm,
            star_count,
        }
    }

    /// True if the sample may enter a series fitted with the given star minimum
    pub fn is_usable(&self, min_stars: u32) -> bool {
        self.fwhm.is_finite() && self.fwhm > 0.0 && self.star_count >= min_stars
    }
}

/// Samples ordered by offset, at most one per offset.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FocusSeries {
    samples: Vec<FocusSample>,
}

impl FocusSeries {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a sample keeping offset order.
    ///
    /// A sample at an offset already present replaces the old one, which is
    /// returned.
    pub fn push(&mut self, sample: FocusSample) -> Option<FocusSample> {
        match self
            .samples
            .binary_search_by_key(&sample.offset, |s| s.offset)
        {
            Ok(i) => Some(std::mem::replace(&mut self.samples[i], sample)),
            Err(i) => {
                self.samples.insert(i, sample);
                None
            }
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> &[FocusSample] {
        &self.samples
    }

    pub fn iter(&self) -> impl Iterator<Item = &FocusSample> {
        self.samples.iter()
    }

    /// Offsets as floats, in order
    pub fn offsets(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.offset as f64).collect()
    }

    /// FWHM values, in offset order
    pub fn fwhms(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.fwhm).collect()
    }

    /// Mean of the sampled offsets, `None` for an empty series
    pub fn mean_offset(&self) -> Option<f64> {
        if self.samples.is_empty() {
            return None;
        }
        let sum: f64 = self.samples.iter().map(|s| s.offset as f64).sum();
        Some(sum / self.samples.len() as f64)
    }

    /// Sample with the lowest FWHM; the lowest offset wins ties
    pub fn best_sample(&self) -> Option<&FocusSample> {
        self.samples.iter().fold(None, |best, s| match best {
            Some(b) if b.fwhm <= s.fwhm => Some(b),
            _ => Some(s),
        })
    }
}

impl FromIterator<FocusSample> for FocusSeries {
    fn from_iter<I: IntoIterator<Item = FocusSample>>(iter: I) -> Self {
        let mut series = FocusSeries::new();
        for sample in iter {
            series.push(sample);
        }
        series
    }
}

/// Read recorded samples from a CSV file with an `offset,fwhm,stars` header.
///
/// Rows are returned in file order and are not filtered.
pub fn load_samples_csv(path: &Path) -> Result<Vec<FocusSample>, csv::Error> {
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_path(path)?;
    reader.deserialize().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_push_keeps_offset_order() {
        let series: FocusSeries = [
            FocusSample::new(20, 3.0, 30),
            FocusSample::new(-20, 4.0, 30),
            FocusSample::new(0, 2.5, 30),
        ]
        .into_iter()
        .collect();

        let offsets: Vec<i64> = series.iter().map(|s| s.offset).collect();
        assert_eq!(offsets, vec![-20, 0, 20]);
    }

    #[test]
    fn test_duplicate_offset_replaces() {
        let mut series = FocusSeries::new();
        assert!(series.push(FocusSample::new(5, 3.0, 20)).is_none());
        let replaced = series.push(FocusSample::new(5, 2.0, 25));

        assert_eq!(replaced, Some(FocusSample::new(5, 3.0, 20)));
        assert_eq!(series.len(), 1);
        assert_relative_eq!(series.samples()[0].fwhm, 2.0);
    }

    #[test]
    fn test_best_sample_and_mean() {
        let series: FocusSeries = [
            FocusSample::new(-2, 5.0, 20),
            FocusSample::new(-1, 2.0, 20),
            FocusSample::new(0, 3.0, 20),
            FocusSample::new(1, 2.0, 20),
            FocusSample::new(4, 5.0, 20),
        ]
        .into_iter()
        .collect();

        assert_eq!(series.best_sample().map(|s| s.offset), Some(-1));
        assert_relative_eq!(series.mean_offset().unwrap(), 0.4);
    }

    #[test]
    fn test_empty_series() {
        let series = FocusSeries::new();
        assert!(series.is_empty());
        assert!(series.mean_offset().is_none());
        assert!(series.best_sample().is_none());
    }

    #[test]
    fn test_load_samples_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("samples.csv");
        std::fs::write(&path, "offset,fwhm,stars\n-20, 3.1, 40\n0,2.2,55\n20,3.4,38\n").unwrap();

        let samples = load_samples_csv(&path).unwrap();
        assert_eq!(samples.len(), 3);
        assert_eq!(samples[1], FocusSample::new(0, 2.2, 55));
    }

    #[test]
    fn test_load_samples_csv_rejects_bad_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.csv");
        std::fs::write(&path, "offset,fwhm,stars\nten,3.1,40\n").unwrap();

        assert!(load_samples_csv(&path).is_err());
    }

    #[test]
    fn test_usable_sample() {
        assert!(FocusSample::new(0, 2.0, 15).is_usable(15));
        assert!(!FocusSample::new(0, 2.0, 14).is_usable(15));
        assert!(!FocusSample::new(0, 0.0, 40).is_usable(15));
        assert!(!FocusSample::new(0, f64::NAN, 40).is_usable(15));
    }
}
