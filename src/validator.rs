//! Bar series validation
//!
//! Every series is checked once before any pattern sees it. Broken bars are
//! rejected, never repaired; thin volume only produces a warning that the
//! scorer reads later.

use crate::{BarSeries, OHLCVExt};

/// Trailing bars inspected for missing volume
pub const DEFAULT_VOLUME_WINDOW: usize = 20;

/// Share of zero-volume bars above which volume is treated as absent
pub const DEFAULT_EMPTY_VOLUME_RATIO: f64 = 0.5;

/// Why a series was rejected
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("insufficient data: need {need} bars, got {got}")]
    InsufficientData { need: usize, got: usize },

    #[error("malformed bar at index {index}: {reason}")]
    MalformedBar { index: usize, reason: &'static str },

    #[error("timestamp at index {index} does not increase")]
    NonMonotonicTimestamp { index: usize },
}

/// Non-fatal findings attached to a validated series
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValidationWarning {
    EmptyVolume { zero_bars: usize, window: usize },
}

/// A series that passed validation. Only [`SeriesValidator`] builds one.
#[derive(Debug, Clone)]
pub struct ValidatedSeries {
    series: BarSeries,
    warnings: Vec<ValidationWarning>,
}

impl ValidatedSeries {
    #[inline]
    pub fn series(&self) -> &BarSeries {
        &self.series
    }

    #[inline]
    pub fn symbol(&self) -> &str {
        self.series.symbol()
    }

    #[inline]
    pub fn bars(&self) -> &[crate::Bar] {
        self.series.bars()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.series.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    pub fn warnings(&self) -> &[ValidationWarning] {
        &self.warnings
    }

    pub fn has_empty_volume(&self) -> bool {
        self.warnings
            .iter()
            .any(|w| matches!(w, ValidationWarning::EmptyVolume { .. }))
    }

    /// Length check for a wider pattern; the bars were already walked
    pub fn require(&self, min_length: usize) -> Result<&Self, ValidationError> {
        if self.len() < min_length {
            return Err(ValidationError::InsufficientData {
                need: min_length,
                got: self.len(),
            });
        }
        Ok(self)
    }
}

/// Checks bar invariants, ordering and volume coverage
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct SeriesValidator {
    pub volume_window: usize,
    pub empty_volume_ratio: f64,
}

impl Default for SeriesValidator {
    fn default() -> Self {
        Self {
            volume_window: DEFAULT_VOLUME_WINDOW,
            empty_volume_ratio: DEFAULT_EMPTY_VOLUME_RATIO,
        }
    }
}

impl SeriesValidator {
    pub fn validate(&self, series: &BarSeries, min_length: usize) -> Result<ValidatedSeries, ValidationError> {
        self.validate_owned(series.clone(), min_length)
    }

    /// Same as [`validate`](Self::validate) without copying the bars
    pub fn validate_owned(&self, series: BarSeries, min_length: usize) -> Result<ValidatedSeries, ValidationError> {
        if series.len() < min_length {
            return Err(ValidationError::InsufficientData {
                need: min_length,
                got: series.len(),
            });
        }

        let bars = series.bars();
        for (index, bar) in bars.iter().enumerate() {
            if let Some(reason) = bar.invariant_violation() {
                return Err(ValidationError::MalformedBar { index, reason });
            }
            if index > 0 && bar.timestamp <= bars[index - 1].timestamp {
                return Err(ValidationError::NonMonotonicTimestamp { index });
            }
        }

        let mut warnings = Vec::new();
        let window = series.tail(self.volume_window);
        if !window.is_empty() {
            let zero_bars = window.iter().filter(|b| b.volume == 0).count();
            if zero_bars as f64 / window.len() as f64 > self.empty_volume_ratio {
                tracing::debug!(symbol = series.symbol(), zero_bars, window = window.len(), "volume mostly empty");
                warnings.push(ValidationWarning::EmptyVolume {
                    zero_bars,
                    window: window.len(),
                });
            }
        }

        Ok(ValidatedSeries { series, warnings })
    }
}
