//! Parameter metadata for tunable components
//!
//! Pattern thresholds and scoring parameters describe their knobs through
//! [`ParamMeta`] so configuration overrides can be validated by name before
//! anything is built from them.
//!
//! # Example
//!
//! ```rust
//! use candlescan::params::Parameterized;
//! use candlescan::detectors::Thresholds;
//!
//! for param in Thresholds::param_meta() {
//!     println!("{}: {:?} (default: {})", param.name, param.param_type, param.default);
//! }
//! ```

use std::collections::HashMap;

use crate::{PatternError, Period, Ratio, Result};

// ============================================================
// PARAMETER TYPES
// ============================================================

/// Type of parameter value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
  /// Ratio value (0.0..=1.0 typically, but factors such as long_shadow_factor exceed 1.0)
  Ratio,
  /// Period value (positive integer)
  Period,
}

/// Metadata for a single parameter
#[derive(Debug, Clone)]
pub struct ParamMeta {
  /// Parameter name (e.g., "doji_body")
  pub name: &'static str,
  pub param_type: ParamType,
  pub default: f64,
  /// Accepted values: (min, max, step)
  pub range: (f64, f64, f64),
  pub description: &'static str,
}

impl ParamMeta {
  pub const fn ratio(
    name: &'static str,
    default: f64,
    range: (f64, f64, f64),
    description: &'static str,
  ) -> Self {
    Self { name, param_type: ParamType::Ratio, default, range, description }
  }

  pub const fn period(
    name: &'static str,
    default: f64,
    range: (f64, f64, f64),
    description: &'static str,
  ) -> Self {
    Self { name, param_type: ParamType::Period, default, range, description }
  }

  /// Validate a value for this parameter
  pub fn validate(&self, value: f64) -> Result<()> {
    if !value.is_finite() {
      return Err(PatternError::InvalidValue("parameter must be finite"));
    }
    let (min, max, _) = self.range;
    if value < min || value > max {
      return Err(PatternError::OutOfRange { field: self.name, value, min, max });
    }
    match self.param_type {
      ParamType::Ratio => Ok(()),
      ParamType::Period => {
        if value < 1.0 || value.fract() != 0.0 {
          return Err(PatternError::InvalidValue("Period must be a positive integer"));
        }
        Ok(())
      },
    }
  }
}

// ============================================================
// PARAMETERIZED TRAIT
// ============================================================

/// Components that can be rebuilt from a name -> value override map
pub trait Parameterized: Sized {
  /// Metadata for all configurable parameters
  fn param_meta() -> &'static [ParamMeta];

  /// Build with overrides; missing parameters keep their defaults.
  fn with_params(params: &HashMap<&str, f64>) -> Result<Self>;

  /// Reject names that no parameter answers to, then range-check the rest
  fn check_params(params: &HashMap<&str, f64>) -> Result<()> {
    let meta = Self::param_meta();
    for (name, value) in params {
      let Some(m) = meta.iter().find(|m| m.name == *name) else {
        return Err(PatternError::InvalidConfig(format!("unknown parameter '{name}'")));
      };
      m.validate(*value)?;
    }
    Ok(())
  }
}

// ============================================================
// PARAMETER VALUE HELPERS
// ============================================================

/// Get a Ratio from params with default fallback
pub fn get_ratio(params: &HashMap<&str, f64>, key: &str, default: f64) -> Result<Ratio> {
  let value = params.get(key).copied().unwrap_or(default);
  Ratio::new(value)
}

/// Get a Period from params with default fallback
pub fn get_period(params: &HashMap<&str, f64>, key: &str, default: usize) -> Result<Period> {
  let value = params.get(key).copied().unwrap_or(default as f64);
  Period::new(value as usize)
}

/// Get a raw factor (may exceed 1.0) from params with default fallback
pub fn get_factor(params: &HashMap<&str, f64>, key: &str, default: f64) -> f64 {
  params.get(key).copied().unwrap_or(default)
}

// ============================================================
// TESTS
// ============================================================
