//! # candlescan
//!
//! Candlestick pattern scanning engine: validates OHLCV bar series, matches
//! them against a catalog of 61 TA-Lib style formations, scores every match
//! with volume/trend/support-resistance context and serves scans through a
//! result cache and a per-client rate governor.
//!
//! ## Quick Start
//!
//! ```rust
//! use candlescan::prelude::*;
//!
//! let catalog = CatalogBuilder::new().with_all_defaults().build().unwrap();
//!
//! // open == close within a wide range: a doji
//! let series = BarSeries::new("DEMO", vec![Bar::new(1, 100.0, 101.0, 99.0, 100.05, 1_000)]);
//! assert!(catalog.evaluate("CDLDOJI", &series).unwrap());
//!
//! let validated = SeriesValidator::default().validate(&series, 1).unwrap();
//! let scorer = ConfidenceScorer::new(catalog.into(), ScoringConfig::default()).unwrap();
//! let score = scorer.score(&validated, "CDLDOJI", true).unwrap();
//! assert_eq!(score.factors["pattern_match"], 0.5);
//! ```

pub mod cache;
pub mod catalog;
pub mod clock;
pub mod config;
pub mod detectors;
pub mod governor;
pub mod params;
pub mod provider;
pub mod scan;
pub mod scoring;
pub mod service;
pub mod shard;
pub mod timeframe;
pub mod validator;

pub mod prelude {
    pub use crate::{
        // Cache
        cache::{CacheError, CacheStore, MemoryStore, NoopStore, ResultCache, ValueCategory},
        // Catalog
        catalog::{CatalogBuilder, PatternCatalog, PatternDefinition, PatternInfo, PatternMatcher},
        // Infrastructure
        clock::{Clock, ManualClock, SystemClock},
        config::ScannerConfig,
        detectors::Thresholds,
        governor::{EndpointTier, RateGovernor, RateLimit, RateLimitExceeded},
        // Parameters
        params::{get_period, get_ratio, ParamMeta, ParamType, Parameterized},
        provider::{DataProvider, ProviderError},
        scan::{DetectionResult, ScanLimits, ScanOrchestrator, ScanParams, ScanResult},
        scoring::{ConfidenceScorer, Reliability, Score, ScoringConfig, ScoringWeights},
        service::{PatternScanner, ScanRequest, ScanResponse},
        timeframe::Timeframe,
        validator::{SeriesValidator, ValidatedSeries, ValidationError, ValidationWarning},
        // Core types
        Bar,
        BarSeries,
        Category,
        Direction,
        OHLCVExt,
        // Errors
        PatternError,
        PatternId,
        Period,
        Ratio,
        Result,
        ScanError,
        Trend,
        OHLCV,
    };
}

pub use scan::ScanError;

// ============================================================
// ERRORS
// ============================================================

pub type Result<T> = std::result::Result<T, PatternError>;

/// Errors raised by the pattern library and its configuration
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PatternError {
    #[error("Invalid value: {0}")]
    InvalidValue(&'static str),

    #[error("{field} = {value} out of range [{min}, {max}]")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Insufficient data: need {need} bars, got {got}")]
    InsufficientData { need: usize, got: usize },

    #[error("Unknown pattern: {0}")]
    UnknownPattern(String),

    #[error("Pattern registered twice: {0}")]
    DuplicatePattern(&'static str),
}

// ============================================================
// VALIDATED TYPES
// ============================================================

/// Normalized value in range 0.0..=1.0
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Ratio(f64);

impl Ratio {
    /// Create a new Ratio, validating the value is in [0.0, 1.0]
    pub fn new(value: f64) -> Result<Self> {
        if value.is_nan() || value.is_infinite() {
            return Err(PatternError::InvalidValue(
                "Ratio cannot be NaN or infinite",
            ));
        }
        if !(0.0..=1.0).contains(&value) {
            return Err(PatternError::OutOfRange {
                field: "Ratio",
                value,
                min: 0.0,
                max: 1.0,
            });
        }
        Ok(Self(value))
    }

    #[doc(hidden)]
    pub const fn new_const(value: f64) -> Self {
        Self(value)
    }

    #[inline]
    pub fn get(self) -> f64 {
        self.0
    }
}

impl serde::Serialize for Ratio {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(s)
    }
}

impl<'de> serde::Deserialize<'de> for Ratio {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let value = f64::deserialize(d)?;
        Ratio::new(value).map_err(serde::de::Error::custom)
    }
}

/// Period (must be > 0)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Period(usize);

impl Period {
    /// Create a new Period, validating value is > 0
    pub fn new(value: usize) -> Result<Self> {
        if value == 0 {
            return Err(PatternError::InvalidValue("Period must be > 0"));
        }
        Ok(Self(value))
    }

    #[doc(hidden)]
    pub const fn new_const(value: usize) -> Self {
        Self(value)
    }

    #[inline]
    pub fn get(self) -> usize {
        self.0
    }
}

impl serde::Serialize for Period {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(s)
    }
}

impl<'de> serde::Deserialize<'de> for Period {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let value = usize::deserialize(d)?;
        Period::new(value).map_err(serde::de::Error::custom)
    }
}

// ============================================================
// OHLCV TRAITS
// ============================================================

/// Core OHLCV data trait
pub trait OHLCV {
    fn open(&self) -> f64;
    fn high(&self) -> f64;
    fn low(&self) -> f64;
    fn close(&self) -> f64;
    fn volume(&self) -> f64;

    fn timestamp(&self) -> Option<i64> {
        None
    }
}

/// Extension trait with computed properties for OHLCV data
pub trait OHLCVExt: OHLCV {
    #[inline]
    fn body(&self) -> f64 {
        (self.close() - self.open()).abs()
    }

    #[inline]
    fn range(&self) -> f64 {
        self.high() - self.low()
    }

    #[inline]
    fn upper_shadow(&self) -> f64 {
        self.high() - self.open().max(self.close())
    }

    #[inline]
    fn lower_shadow(&self) -> f64 {
        self.open().min(self.close()) - self.low()
    }

    #[inline]
    fn body_top(&self) -> f64 {
        self.open().max(self.close())
    }

    #[inline]
    fn body_bottom(&self) -> f64 {
        self.open().min(self.close())
    }

    #[inline]
    fn body_mid(&self) -> f64 {
        (self.open() + self.close()) / 2.0
    }

    #[inline]
    fn is_bullish(&self) -> bool {
        self.close() > self.open()
    }

    #[inline]
    fn is_bearish(&self) -> bool {
        self.close() < self.open()
    }

    /// Candle color as a direction; `None` when open == close
    #[inline]
    fn color(&self) -> Option<Direction> {
        if self.is_bullish() {
            Some(Direction::Bullish)
        } else if self.is_bearish() {
            Some(Direction::Bearish)
        } else {
            None
        }
    }

    /// Body as ratio of range. Returns None if range ≈ 0
    #[inline]
    fn body_ratio(&self) -> Option<f64> {
        let range = self.range();
        (range > f64::EPSILON).then(|| self.body() / range)
    }

    #[inline]
    fn upper_shadow_ratio(&self) -> Option<f64> {
        let range = self.range();
        (range > f64::EPSILON).then(|| self.upper_shadow() / range)
    }

    #[inline]
    fn lower_shadow_ratio(&self) -> Option<f64> {
        let range = self.range();
        (range > f64::EPSILON).then(|| self.lower_shadow() / range)
    }

    /// First broken price invariant, if any
    fn invariant_violation(&self) -> Option<&'static str> {
        let prices = [self.open(), self.high(), self.low(), self.close()];
        if prices.iter().any(|p| p.is_nan()) {
            return Some("NaN in OHLC");
        }
        if prices.iter().any(|p| p.is_infinite()) {
            return Some("infinite value in OHLC");
        }
        if prices.iter().any(|p| *p <= 0.0) {
            return Some("non-positive price");
        }
        if self.high() < self.low() {
            return Some("high < low");
        }
        if self.low() > self.body_bottom() {
            return Some("low above body");
        }
        if self.high() < self.body_top() {
            return Some("high below body");
        }
        if self.volume().is_nan() || self.volume() < 0.0 {
            return Some("negative volume");
        }
        None
    }
}

impl<T: OHLCV> OHLCVExt for T {}

// ============================================================
// BAR MODEL
// ============================================================

/// One OHLCV observation; `timestamp` is unix seconds
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Bar {
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

impl Bar {
    pub fn new(timestamp: i64, open: f64, high: f64, low: f64, close: f64, volume: u64) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        }
    }
}

impl OHLCV for Bar {
    fn open(&self) -> f64 {
        self.open
    }

    fn high(&self) -> f64 {
        self.high
    }

    fn low(&self) -> f64 {
        self.low
    }

    fn close(&self) -> f64 {
        self.close
    }

    fn volume(&self) -> f64 {
        self.volume as f64
    }

    fn timestamp(&self) -> Option<i64> {
        Some(self.timestamp)
    }
}

/// Ordered bars for one symbol. Immutable once built; run it through
/// [`validator::SeriesValidator`] before analysis.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct BarSeries {
    symbol: String,
    bars: Vec<Bar>,
}

impl BarSeries {
    pub fn new(symbol: impl Into<String>, bars: Vec<Bar>) -> Self {
        Self {
            symbol: symbol.into(),
            bars,
        }
    }

    /// Copy any OHLCV source. Missing timestamps fall back to the bar index.
    pub fn from_ohlcv<T: OHLCV>(symbol: impl Into<String>, source: &[T]) -> Self {
        let bars = source
            .iter()
            .enumerate()
            .map(|(i, b)| Bar {
                timestamp: b.timestamp().unwrap_or(i as i64),
                open: b.open(),
                high: b.high(),
                low: b.low(),
                close: b.close(),
                volume: b.volume().max(0.0) as u64,
            })
            .collect();
        Self::new(symbol, bars)
    }

    #[inline]
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    #[inline]
    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.bars.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    #[inline]
    pub fn last(&self) -> Option<&Bar> {
        self.bars.last()
    }

    /// The most recent `n` bars (all of them when shorter)
    #[inline]
    pub fn tail(&self, n: usize) -> &[Bar] {
        &self.bars[self.bars.len().saturating_sub(n)..]
    }
}

// ============================================================
// PATTERN TYPES
// ============================================================

/// Unique identifier for a pattern, e.g. `CDLHAMMER`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize)]
pub struct PatternId(pub &'static str);

impl PatternId {
    #[inline]
    pub fn as_str(&self) -> &'static str {
        self.0
    }
}

impl std::fmt::Display for PatternId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.0)
    }
}

/// Direction/bias of a pattern, also used as the reported signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Bullish,
    Neutral,
    Bearish,
}

impl Direction {
    #[inline]
    pub fn is_bullish(self) -> bool {
        matches!(self, Direction::Bullish)
    }

    #[inline]
    pub fn is_bearish(self) -> bool {
        matches!(self, Direction::Bearish)
    }

    #[inline]
    pub fn opposite(self) -> Self {
        match self {
            Direction::Bullish => Direction::Bearish,
            Direction::Bearish => Direction::Bullish,
            Direction::Neutral => Direction::Neutral,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Bullish => "bullish",
            Direction::Neutral => "neutral",
            Direction::Bearish => "bearish",
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a formation says about the prevailing move
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Reversal,
    Continuation,
    Indecision,
}

// ============================================================
// MARKET CONTEXT
// ============================================================

/// Market trend classification
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Up,
    #[default]
    Sideways,
    Down,
}

impl Trend {
    /// Direction a move in this trend points to; `None` when sideways
    pub fn direction(self) -> Option<Direction> {
        match self {
            Trend::Up => Some(Direction::Bullish),
            Trend::Down => Some(Direction::Bearish),
            Trend::Sideways => None,
        }
    }
}

// ============================================================
// TESTS
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone)]
    struct RawBar {
        o: f64,
        h: f64,
        l: f64,
        c: f64,
        v: f64,
    }

    impl OHLCV for RawBar {
        fn open(&self) -> f64 {
            self.o
        }

        fn high(&self) -> f64 {
            self.h
        }

        fn low(&self) -> f64 {
            self.l
        }

        fn close(&self) -> f64 {
            self.c
        }

        fn volume(&self) -> f64 {
            self.v
        }
    }

    #[test]
    fn test_ratio_validation() {
        assert!(Ratio::new(0.0).is_ok());
        assert!(Ratio::new(1.0).is_ok());
        assert!(Ratio::new(0.5).is_ok());
        assert!(Ratio::new(-0.1).is_err());
        assert!(Ratio::new(1.1).is_err());
        assert!(Ratio::new(f64::NAN).is_err());
        assert!(Ratio::new(f64::INFINITY).is_err());
    }

    #[test]
    fn test_period_validation() {
        assert!(Period::new(1).is_ok());
        assert!(Period::new(100).is_ok());
        assert!(Period::new(0).is_err());
    }

    #[test]
    fn test_ratio_deserialize_rejects_out_of_range() {
        assert!(serde_json::from_str::<Ratio>("0.25").is_ok());
        assert!(serde_json::from_str::<Ratio>("1.5").is_err());
        assert!(serde_json::from_str::<Period>("0").is_err());
    }

    #[test]
    fn test_ohlcv_ext() {
        let bar = Bar::new(0, 100.0, 110.0, 90.0, 105.0, 1000);
        assert_eq!(bar.body(), 5.0);
        assert_eq!(bar.range(), 20.0);
        assert_eq!(bar.body_top(), 105.0);
        assert_eq!(bar.body_bottom(), 100.0);
        assert_eq!(bar.body_mid(), 102.5);
        assert!(bar.is_bullish());
        assert!(!bar.is_bearish());
        assert_eq!(bar.color(), Some(Direction::Bullish));
        assert!((bar.body_ratio().unwrap() - 0.25).abs() < 0.001);
    }

    #[test]
    fn test_flat_bar_has_no_ratios() {
        let bar = Bar::new(0, 10.0, 10.0, 10.0, 10.0, 1);
        assert!(bar.body_ratio().is_none());
        assert!(bar.color().is_none());
        assert!(bar.invariant_violation().is_none());
    }

    #[test]
    fn test_invariant_violations() {
        assert_eq!(
            Bar::new(0, 100.0, 99.0, 98.0, 100.5, 1).invariant_violation(),
            Some("high below body")
        );
        assert_eq!(
            Bar::new(0, 100.0, 101.0, 100.2, 100.5, 1).invariant_violation(),
            Some("low above body")
        );
        assert_eq!(
            Bar::new(0, 0.0, 1.0, 0.0, 0.5, 1).invariant_violation(),
            Some("non-positive price")
        );
        assert_eq!(
            Bar::new(0, f64::NAN, 1.0, 0.5, 0.5, 1).invariant_violation(),
            Some("NaN in OHLC")
        );
    }

    #[test]
    fn test_series_from_ohlcv() {
        let raw = vec![
            RawBar { o: 1.0, h: 2.0, l: 0.5, c: 1.5, v: 10.0 },
            RawBar { o: 1.5, h: 2.5, l: 1.0, c: 2.0, v: 12.0 },
        ];
        let series = BarSeries::from_ohlcv("TEST", &raw);
        assert_eq!(series.symbol(), "TEST");
        assert_eq!(series.len(), 2);
        assert_eq!(series.bars()[1].timestamp, 1);
        assert_eq!(series.bars()[1].volume, 12);
        assert_eq!(series.tail(5).len(), 2);
        assert_eq!(series.tail(1)[0].close, 2.0);
    }

    #[test]
    fn test_direction_serializes_lowercase() {
        let json = serde_json::to_string(&Direction::Bullish).unwrap();
        assert_eq!(json, "\"bullish\"");
        assert_eq!(Direction::Bearish.opposite(), Direction::Bullish);
        assert_eq!(Direction::Neutral.opposite(), Direction::Neutral);
        assert_eq!(Trend::Down.direction(), Some(Direction::Bearish));
    }
}
