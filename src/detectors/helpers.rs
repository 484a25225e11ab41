//! Shared candle primitives for pattern matchers
//!
//! Every numeric tie-break used by a matcher lives here as a named constant
//! and is collected into [`Thresholds`], so boundary cases stay deterministic
//! for a fixed configuration.

use std::collections::HashMap;

use crate::{
  params::{get_factor, get_ratio, ParamMeta, Parameterized},
  OHLCVExt, Result, OHLCV,
};

// ============================================================
// THRESHOLDS
// ============================================================

/// Doji: body / range strictly below this
pub const DOJI_BODY_RATIO: f64 = 0.1;
/// Short (small) body: body / range at most this
pub const SHORT_BODY_RATIO: f64 = 0.3;
/// Long body: body / range at least this
pub const LONG_BODY_RATIO: f64 = 0.6;
/// Long shadow: shadow >= factor * body (and > 0)
pub const LONG_SHADOW_FACTOR: f64 = 2.0;
/// Shadow that takes at least this share of the range counts as tall
pub const TALL_SHADOW_RATIO: f64 = 0.3;
/// Short shadow: shadow / range at most this
pub const SHORT_SHADOW_RATIO: f64 = 0.1;
/// Marubozu: both shadows at most this share of the range
pub const MARUBOZU_SHADOW_RATIO: f64 = 0.05;
/// Shadow dominating the range (takuri and friends)
pub const DOMINANT_SHADOW_RATIO: f64 = 0.6;
/// Prices equal within this share of the window's average range
pub const EQUAL_FACTOR: f64 = 0.05;
/// Prices near within this share of the window's average range
pub const NEAR_FACTOR: f64 = 0.2;
/// Prices far apart beyond this share of the window's average range
pub const FAR_FACTOR: f64 = 0.6;
/// Share of a prior body a star/cover candle must penetrate
pub const PENETRATION: f64 = 0.3;

/// Matcher thresholds. Defaults are the constants above.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct Thresholds {
  pub doji_body: f64,
  pub short_body: f64,
  pub long_body: f64,
  pub long_shadow_factor: f64,
  pub tall_shadow: f64,
  pub short_shadow: f64,
  pub marubozu_shadow: f64,
  pub dominant_shadow: f64,
  pub equal: f64,
  pub near: f64,
  pub far: f64,
  pub penetration: f64,
}

impl Default for Thresholds {
  fn default() -> Self {
    Self {
      doji_body: DOJI_BODY_RATIO,
      short_body: SHORT_BODY_RATIO,
      long_body: LONG_BODY_RATIO,
      long_shadow_factor: LONG_SHADOW_FACTOR,
      tall_shadow: TALL_SHADOW_RATIO,
      short_shadow: SHORT_SHADOW_RATIO,
      marubozu_shadow: MARUBOZU_SHADOW_RATIO,
      dominant_shadow: DOMINANT_SHADOW_RATIO,
      equal: EQUAL_FACTOR,
      near: NEAR_FACTOR,
      far: FAR_FACTOR,
      penetration: PENETRATION,
    }
  }
}

const THRESHOLD_PARAMS: &[ParamMeta] = &[
  ParamMeta::ratio("doji_body", DOJI_BODY_RATIO, (0.01, 0.3, 0.01), "Doji body/range ceiling"),
  ParamMeta::ratio("short_body", SHORT_BODY_RATIO, (0.05, 0.5, 0.05), "Short body/range ceiling"),
  ParamMeta::ratio("long_body", LONG_BODY_RATIO, (0.4, 0.95, 0.05), "Long body/range floor"),
  ParamMeta::ratio("long_shadow_factor", LONG_SHADOW_FACTOR, (1.0, 5.0, 0.5), "Long shadow as multiple of body"),
  ParamMeta::ratio("tall_shadow", TALL_SHADOW_RATIO, (0.1, 0.5, 0.05), "Tall shadow share of range"),
  ParamMeta::ratio("short_shadow", SHORT_SHADOW_RATIO, (0.0, 0.3, 0.01), "Short shadow share of range"),
  ParamMeta::ratio("marubozu_shadow", MARUBOZU_SHADOW_RATIO, (0.0, 0.2, 0.01), "Marubozu shadow share of range"),
  ParamMeta::ratio("dominant_shadow", DOMINANT_SHADOW_RATIO, (0.4, 0.9, 0.05), "Dominant shadow share of range"),
  ParamMeta::ratio("equal", EQUAL_FACTOR, (0.0, 0.2, 0.01), "Equal-price tolerance"),
  ParamMeta::ratio("near", NEAR_FACTOR, (0.05, 0.5, 0.05), "Near-price tolerance"),
  ParamMeta::ratio("far", FAR_FACTOR, (0.3, 1.0, 0.1), "Far-price distance"),
  ParamMeta::ratio("penetration", PENETRATION, (0.0, 1.0, 0.1), "Required body penetration"),
];

impl Parameterized for Thresholds {
  fn param_meta() -> &'static [ParamMeta] {
    THRESHOLD_PARAMS
  }

  fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
    Self::check_params(params)?;
    let d = Self::default();
    let t = Self {
      doji_body: get_ratio(params, "doji_body", d.doji_body)?.get(),
      short_body: get_ratio(params, "short_body", d.short_body)?.get(),
      long_body: get_ratio(params, "long_body", d.long_body)?.get(),
      long_shadow_factor: get_factor(params, "long_shadow_factor", d.long_shadow_factor),
      tall_shadow: get_ratio(params, "tall_shadow", d.tall_shadow)?.get(),
      short_shadow: get_ratio(params, "short_shadow", d.short_shadow)?.get(),
      marubozu_shadow: get_ratio(params, "marubozu_shadow", d.marubozu_shadow)?.get(),
      dominant_shadow: get_ratio(params, "dominant_shadow", d.dominant_shadow)?.get(),
      equal: get_ratio(params, "equal", d.equal)?.get(),
      near: get_ratio(params, "near", d.near)?.get(),
      far: get_ratio(params, "far", d.far)?.get(),
      penetration: get_ratio(params, "penetration", d.penetration)?.get(),
    };
    t.validate()?;
    Ok(t)
  }
}

impl Thresholds {
  /// Cross-field checks; per-field ranges come from [`ParamMeta`]
  pub fn validate(&self) -> Result<()> {
    for meta in THRESHOLD_PARAMS {
      meta.validate(self.get(meta.name))?;
    }
    if self.doji_body >= self.short_body {
      return Err(crate::PatternError::InvalidConfig(
        "doji_body must be below short_body".into(),
      ));
    }
    if self.short_body >= self.long_body {
      return Err(crate::PatternError::InvalidConfig(
        "short_body must be below long_body".into(),
      ));
    }
    Ok(())
  }

  fn get(&self, name: &str) -> f64 {
    match name {
      "doji_body" => self.doji_body,
      "short_body" => self.short_body,
      "long_body" => self.long_body,
      "long_shadow_factor" => self.long_shadow_factor,
      "tall_shadow" => self.tall_shadow,
      "short_shadow" => self.short_shadow,
      "marubozu_shadow" => self.marubozu_shadow,
      "dominant_shadow" => self.dominant_shadow,
      "equal" => self.equal,
      "near" => self.near,
      "far" => self.far,
      "penetration" => self.penetration,
      _ => f64::NAN,
    }
  }

  // ===========================================
  // Body primitives
  // ===========================================

  /// Flat bars (range 0) count as doji.
  #[inline]
  pub fn is_doji<T: OHLCV>(&self, bar: &T) -> bool {
    bar.body_ratio().map_or(true, |r| r < self.doji_body)
  }

  #[inline]
  pub fn is_short_body<T: OHLCV>(&self, bar: &T) -> bool {
    bar.body_ratio().map_or(true, |r| r <= self.short_body)
  }

  #[inline]
  pub fn is_long_body<T: OHLCV>(&self, bar: &T) -> bool {
    bar.body_ratio().is_some_and(|r| r >= self.long_body)
  }

  // ===========================================
  // Shadow primitives
  // ===========================================

  #[inline]
  pub fn has_long_lower_shadow<T: OHLCV>(&self, bar: &T) -> bool {
    let shadow = bar.lower_shadow();
    shadow > 0.0 && shadow >= bar.body() * self.long_shadow_factor
  }

  #[inline]
  pub fn has_long_upper_shadow<T: OHLCV>(&self, bar: &T) -> bool {
    let shadow = bar.upper_shadow();
    shadow > 0.0 && shadow >= bar.body() * self.long_shadow_factor
  }

  #[inline]
  pub fn has_short_upper_shadow<T: OHLCV>(&self, bar: &T) -> bool {
    bar.upper_shadow_ratio().map_or(true, |r| r <= self.short_shadow)
  }

  #[inline]
  pub fn has_short_lower_shadow<T: OHLCV>(&self, bar: &T) -> bool {
    bar.lower_shadow_ratio().map_or(true, |r| r <= self.short_shadow)
  }

  #[inline]
  pub fn has_tall_upper_shadow<T: OHLCV>(&self, bar: &T) -> bool {
    bar.upper_shadow_ratio().is_some_and(|r| r >= self.tall_shadow)
  }

  #[inline]
  pub fn has_tall_lower_shadow<T: OHLCV>(&self, bar: &T) -> bool {
    bar.lower_shadow_ratio().is_some_and(|r| r >= self.tall_shadow)
  }

  /// Long body with (almost) no shadows
  #[inline]
  pub fn is_marubozu<T: OHLCV>(&self, bar: &T) -> bool {
    match (bar.upper_shadow_ratio(), bar.lower_shadow_ratio()) {
      (Some(u), Some(l)) => u <= self.marubozu_shadow && l <= self.marubozu_shadow,
      _ => false,
    }
  }

  /// Short shadow on the side the candle closed on
  #[inline]
  pub fn closes_on_extreme<T: OHLCV>(&self, bar: &T) -> bool {
    if bar.is_bullish() {
      self.has_short_upper_shadow(bar)
    } else if bar.is_bearish() {
      self.has_short_lower_shadow(bar)
    } else {
      false
    }
  }

  /// Short shadow on the side the candle opened on
  #[inline]
  pub fn opens_on_extreme<T: OHLCV>(&self, bar: &T) -> bool {
    if bar.is_bullish() {
      self.has_short_lower_shadow(bar)
    } else if bar.is_bearish() {
      self.has_short_upper_shadow(bar)
    } else {
      false
    }
  }

  // ===========================================
  // Price comparisons, scaled by the window's average range
  // ===========================================

  #[inline]
  pub fn equal(&self, a: f64, b: f64, scale: f64) -> bool {
    (a - b).abs() <= self.equal * scale
  }

  #[inline]
  pub fn near(&self, a: f64, b: f64, scale: f64) -> bool {
    (a - b).abs() <= self.near * scale
  }

  #[inline]
  pub fn far(&self, a: f64, b: f64, scale: f64) -> bool {
    (a - b).abs() > self.far * scale
  }
}

// ============================================================
// WINDOW AGGREGATES
// ============================================================

/// Average high-low range over a window; 0.0 for an empty slice
#[inline]
pub fn avg_range<T: OHLCV>(bars: &[T]) -> f64 {
  if bars.is_empty() {
    return 0.0;
  }
  bars.iter().map(|b| b.range()).sum::<f64>() / bars.len() as f64
}

/// Average real body over a window; 0.0 for an empty slice
#[inline]
pub fn avg_body<T: OHLCV>(bars: &[T]) -> f64 {
  if bars.is_empty() {
    return 0.0;
  }
  bars.iter().map(|b| b.body()).sum::<f64>() / bars.len() as f64
}

// ============================================================
// GAPS
// ============================================================

/// Real body of `cur` sits entirely above the real body of `prev`
#[inline]
pub fn body_gap_up<T: OHLCV>(prev: &T, cur: &T) -> bool {
  cur.body_bottom() > prev.body_top()
}

/// Real body of `cur` sits entirely below the real body of `prev`
#[inline]
pub fn body_gap_down<T: OHLCV>(prev: &T, cur: &T) -> bool {
  cur.body_top() < prev.body_bottom()
}

/// Whole bar above the previous high (rising window)
#[inline]
pub fn gap_up<T: OHLCV>(prev: &T, cur: &T) -> bool {
  cur.low() > prev.high()
}

/// Whole bar below the previous low (falling window)
#[inline]
pub fn gap_down<T: OHLCV>(prev: &T, cur: &T) -> bool {
  cur.high() < prev.low()
}

/// Body of `inner` contained in body of `outer`, not identical to it
#[inline]
pub fn body_inside<T: OHLCV>(outer: &T, inner: &T) -> bool {
  inner.body_top() <= outer.body_top()
    && inner.body_bottom() >= outer.body_bottom()
    && inner.body() < outer.body()
}

/// Range of `inner` strictly inside the range of `outer`
#[inline]
pub fn inside_bar<T: OHLCV>(outer: &T, inner: &T) -> bool {
  inner.high() < outer.high() && inner.low() > outer.low()
}

// ============================================================
// TESTS
// ============================================================
