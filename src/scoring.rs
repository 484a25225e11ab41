//! Confidence scoring
//!
//! A matched pattern earns a weighted sum of four factors:
//!
//! | factor | default weight | full credit when |
//! |---|---|---|
//! | `pattern_match` | 0.5 | always (the pattern matched) |
//! | `volume_confirmation` | 0.2 | last volume >= mean of the prior bars |
//! | `trend_context` | 0.2 | the preceding trend suits the pattern |
//! | `sr_proximity` | 0.1 | close sits on the relevant support/resistance |

use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use crate::{
    catalog::{PatternCatalog, PatternDefinition},
    params::{get_period, get_ratio, ParamMeta, Parameterized},
    validator::ValidatedSeries,
    Bar, Category, Direction, PatternError, Period, Ratio, Result, Trend,
};

pub const FACTOR_PATTERN_MATCH: &str = "pattern_match";
pub const FACTOR_VOLUME: &str = "volume_confirmation";
pub const FACTOR_TREND: &str = "trend_context";
pub const FACTOR_PROXIMITY: &str = "sr_proximity";

const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

// ============================================================
// CONFIGURATION
// ============================================================

/// Factor weights; must sum to 1.0
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ScoringWeights {
    pub pattern_match: Ratio,
    pub volume: Ratio,
    pub trend: Ratio,
    pub proximity: Ratio,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            pattern_match: Ratio::new_const(0.5),
            volume: Ratio::new_const(0.2),
            trend: Ratio::new_const(0.2),
            proximity: Ratio::new_const(0.1),
        }
    }
}

impl ScoringWeights {
    pub fn sum(&self) -> f64 {
        self.pattern_match.get() + self.volume.get() + self.trend.get() + self.proximity.get()
    }

    pub fn validate(&self) -> Result<()> {
        let sum = self.sum();
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(PatternError::InvalidConfig(format!(
                "scoring weights must sum to 1.0, got {sum}"
            )));
        }
        Ok(())
    }
}

/// Scorer settings
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub weights: ScoringWeights,
    /// Bars averaged for the volume baseline
    pub volume_period: Period,
    /// Closes regressed for trend context
    pub trend_period: Period,
    /// Bars searched for support and resistance
    pub sr_lookback: Period,
    /// Normalised slope below which the trend is sideways
    pub trend_flat_threshold: f64,
    /// Share of the trend weight granted when context is sideways or neutral
    pub flat_trend_credit: Ratio,
    /// Distance (fraction of close) at which proximity credit reaches zero
    pub proximity_tolerance: Ratio,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            weights: ScoringWeights::default(),
            volume_period: Period::new_const(20),
            trend_period: Period::new_const(10),
            sr_lookback: Period::new_const(20),
            trend_flat_threshold: 0.001,
            flat_trend_credit: Ratio::new_const(0.5),
            proximity_tolerance: Ratio::new_const(0.05),
        }
    }
}

impl ScoringConfig {
    pub fn validate(&self) -> Result<()> {
        self.weights.validate()?;
        if !self.trend_flat_threshold.is_finite() || self.trend_flat_threshold < 0.0 {
            return Err(PatternError::InvalidValue(
                "trend_flat_threshold must be finite and >= 0",
            ));
        }
        if self.proximity_tolerance.get() <= 0.0 {
            return Err(PatternError::InvalidValue("proximity_tolerance must be > 0"));
        }
        Ok(())
    }
}

const SCORING_PARAMS: &[ParamMeta] = &[
    ParamMeta::period("volume_period", 20.0, (5.0, 100.0, 5.0), "Bars in the volume baseline"),
    ParamMeta::period("trend_period", 10.0, (3.0, 50.0, 1.0), "Closes in the trend regression"),
    ParamMeta::period("sr_lookback", 20.0, (5.0, 200.0, 5.0), "Bars searched for swing levels"),
    ParamMeta::ratio("flat_trend_credit", 0.5, (0.0, 1.0, 0.1), "Trend credit when context is flat"),
    ParamMeta::ratio("proximity_tolerance", 0.05, (0.005, 0.2, 0.005), "Distance where proximity credit ends"),
];

/// Window and tolerance overrides; weights come from config files only
impl Parameterized for ScoringConfig {
    fn param_meta() -> &'static [ParamMeta] {
        SCORING_PARAMS
    }

    fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
        Self::check_params(params)?;
        let d = Self::default();
        let config = Self {
            volume_period: get_period(params, "volume_period", d.volume_period.get())?,
            trend_period: get_period(params, "trend_period", d.trend_period.get())?,
            sr_lookback: get_period(params, "sr_lookback", d.sr_lookback.get())?,
            flat_trend_credit: get_ratio(params, "flat_trend_credit", d.flat_trend_credit.get())?,
            proximity_tolerance: get_ratio(params, "proximity_tolerance", d.proximity_tolerance.get())?,
            ..d
        };
        config.validate()?;
        Ok(config)
    }
}

// ============================================================
// SCORE
// ============================================================

/// Outcome of scoring one (series, pattern) pair
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Score {
    pub confidence: f64,
    pub signal: Direction,
    pub factors: BTreeMap<String, f64>,
}

impl Score {
    pub fn unmatched() -> Self {
        Self {
            confidence: 0.0,
            signal: Direction::Neutral,
            factors: BTreeMap::new(),
        }
    }

    /// Confidence rounded to two decimals for presentation
    pub fn rounded(&self) -> f64 {
        (self.confidence * 100.0).round() / 100.0
    }

    pub fn reliability(&self) -> Reliability {
        Reliability::of(self.confidence)
    }
}

/// Coarse reading of a confidence value
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Reliability {
    High,
    Medium,
    Low,
}

impl Reliability {
    pub fn of(confidence: f64) -> Self {
        if confidence > 0.8 {
            Reliability::High
        } else if confidence >= 0.5 {
            Reliability::Medium
        } else {
            Reliability::Low
        }
    }
}

// ============================================================
// SCORER
// ============================================================

/// Scores matched patterns against their surrounding bars
#[derive(Debug, Clone)]
pub struct ConfidenceScorer {
    catalog: Arc<PatternCatalog>,
    config: ScoringConfig,
}

impl ConfidenceScorer {
    pub fn new(catalog: Arc<PatternCatalog>, config: ScoringConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { catalog, config })
    }

    #[inline]
    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    #[inline]
    pub fn catalog(&self) -> &Arc<PatternCatalog> {
        &self.catalog
    }

    /// Score `pattern_name` at the end of `series`.
    ///
    /// Unmatched patterns score 0 with a neutral signal. Unknown names are
    /// rejected whether matched or not.
    pub fn score(&self, series: &ValidatedSeries, pattern_name: &str, matched: bool) -> Result<Score> {
        let def = self.catalog.get(pattern_name)?;
        if !matched {
            return Ok(Score::unmatched());
        }

        let bars = series.bars();
        let signal = def
            .match_tail(bars, self.catalog.thresholds())
            .ok()
            .flatten()
            .unwrap_or(def.pattern_type);
        let w = &self.config.weights;

        let volume = if series.has_empty_volume() {
            0.0
        } else {
            w.volume.get() * self.volume_ratio(bars).clamp(0.0, 1.0)
        };
        let pattern_start = bars.len().saturating_sub(def.window_size);
        let trend = self.trend_before(bars, pattern_start);
        let trend_score = w.trend.get() * self.trend_credit(def, signal, trend);
        let proximity = w.proximity.get() * self.proximity_credit(bars, signal);

        let mut factors = BTreeMap::new();
        factors.insert(FACTOR_PATTERN_MATCH.to_string(), w.pattern_match.get());
        factors.insert(FACTOR_VOLUME.to_string(), volume);
        factors.insert(FACTOR_TREND.to_string(), trend_score);
        factors.insert(FACTOR_PROXIMITY.to_string(), proximity);

        let confidence = factors.values().sum::<f64>().clamp(0.0, 1.0);
        tracing::trace!(symbol = series.symbol(), pattern = pattern_name, confidence, ?trend, "scored");

        Ok(Score {
            confidence,
            signal,
            factors,
        })
    }

    /// Last volume over the mean of up to `volume_period` bars before it.
    /// 1.0 when there is no usable history.
    fn volume_ratio(&self, bars: &[Bar]) -> f64 {
        let Some((last, prior)) = bars.split_last() else {
            return 0.0;
        };
        let history = &prior[prior.len().saturating_sub(self.config.volume_period.get())..];
        if history.is_empty() {
            return 1.0;
        }
        let mean = history.iter().map(|b| b.volume as f64).sum::<f64>() / history.len() as f64;
        if mean <= f64::EPSILON {
            return 1.0;
        }
        last.volume as f64 / mean
    }

    /// Trend of the `trend_period` closes ending just before `end`
    pub fn trend_before(&self, bars: &[Bar], end: usize) -> Trend {
        let end = end.min(bars.len());
        let start = end.saturating_sub(self.config.trend_period.get());
        let closes: Vec<f64> = bars[start..end].iter().map(|b| b.close).collect();
        classify_trend(&closes, self.config.trend_flat_threshold)
    }

    fn trend_credit(&self, def: &PatternDefinition, signal: Direction, trend: Trend) -> f64 {
        let flat = self.config.flat_trend_credit.get();
        let Some(trend_dir) = trend.direction() else {
            return flat;
        };
        let wanted = match (def.category, signal) {
            (Category::Indecision, _) | (_, Direction::Neutral) => return flat,
            (Category::Reversal, s) => s.opposite(),
            (Category::Continuation, s) => s,
        };
        if trend_dir == wanted {
            1.0
        } else {
            0.0
        }
    }

    fn proximity_credit(&self, bars: &[Bar], signal: Direction) -> f64 {
        let Some((last, prior)) = bars.split_last() else {
            return 0.0;
        };
        let history = &prior[prior.len().saturating_sub(self.config.sr_lookback.get())..];
        if history.is_empty() || last.close <= 0.0 {
            return 0.0;
        }

        let supports = levels(history, |b| b.low, |a, b| a <= b);
        let resistances = levels(history, |b| b.high, |a, b| a >= b);
        let candidates: Vec<f64> = match signal {
            Direction::Bullish => supports,
            Direction::Bearish => resistances,
            Direction::Neutral => supports.into_iter().chain(resistances).collect(),
        };

        let distance = candidates
            .iter()
            .map(|level| (last.close - level).abs() / last.close)
            .fold(f64::INFINITY, f64::min);
        if !distance.is_finite() {
            return 0.0;
        }
        (1.0 - distance / self.config.proximity_tolerance.get()).max(0.0)
    }
}

/// Swing points (pivot against both neighbours) of `price`; falls back to
/// the single most extreme value when no pivot exists.
fn levels(history: &[Bar], price: impl Fn(&Bar) -> f64, beats: impl Fn(f64, f64) -> bool) -> Vec<f64> {
    let swings: Vec<f64> = history
        .windows(3)
        .filter(|w| beats(price(&w[1]), price(&w[0])) && beats(price(&w[1]), price(&w[2])))
        .map(|w| price(&w[1]))
        .collect();
    if !swings.is_empty() {
        return swings;
    }
    history
        .iter()
        .map(&price)
        .reduce(|a, b| if beats(a, b) { a } else { b })
        .into_iter()
        .collect()
}

/// Least-squares slope of `closes`, normalised by their mean
pub fn classify_trend(closes: &[f64], flat_threshold: f64) -> Trend {
    let n = closes.len();
    if n < 2 {
        return Trend::Sideways;
    }
    let n_f = n as f64;
    let mean_x = (n_f - 1.0) / 2.0;
    let mean_y = closes.iter().sum::<f64>() / n_f;
    if mean_y <= f64::EPSILON {
        return Trend::Sideways;
    }

    let (num, den) = closes.iter().enumerate().fold((0.0, 0.0), |(num, den), (i, y)| {
        let dx = i as f64 - mean_x;
        (num + dx * (y - mean_y), den + dx * dx)
    });
    let slope = num / den / mean_y;

    match slope {
        s if s > flat_threshold => Trend::Up,
        s if s < -flat_threshold => Trend::Down,
        _ => Trend::Sideways,
    }
}

// ============================================================
// TESTS
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{catalog::CatalogBuilder, validator::SeriesValidator, BarSeries};

    fn scorer() -> ConfidenceScorer {
        let catalog = CatalogBuilder::new().with_all_defaults().build().unwrap();
        ConfidenceScorer::new(Arc::new(catalog), ScoringConfig::default()).unwrap()
    }

    fn validated(bars: Vec<Bar>) -> ValidatedSeries {
        SeriesValidator::default()
            .validate_owned(BarSeries::new("TEST", bars), 1)
            .unwrap()
    }

    /// Ten falling bars followed by a morning star on doubled volume
    fn morning_star_after_decline() -> Vec<Bar> {
        let mut bars: Vec<Bar> = (0..10)
            .map(|i| {
                let close = 12.0 - 0.2 * i as f64;
                let open = close + 0.1;
                Bar::new(i, open, open + 0.05, close - 0.05, close, 1_000)
            })
            .collect();
        bars.push(Bar::new(10, 10.0, 10.2, 9.8, 10.05, 1_000));
        bars.push(Bar::new(11, 10.05, 10.1, 9.0, 9.95, 1_000));
        bars.push(Bar::new(12, 9.95, 10.5, 9.9, 10.4, 2_000));
        bars
    }

    #[test]
    fn test_unmatched_scores_zero() {
        let series = validated(morning_star_after_decline());
        let score = scorer().score(&series, "CDLMORNINGSTAR", false).unwrap();
        assert_eq!(score, Score::unmatched());
    }

    #[test]
    fn test_unknown_pattern_rejected() {
        let series = validated(morning_star_after_decline());
        let err = scorer().score(&series, "CDLNOPE", false).unwrap_err();
        assert_eq!(err, PatternError::UnknownPattern("CDLNOPE".into()));
    }

    #[test]
    fn test_morning_star_in_downtrend() {
        let series = validated(morning_star_after_decline());
        let score = scorer().score(&series, "CDLMORNINGSTAR", true).unwrap();
        assert_eq!(score.signal, Direction::Bullish);
        assert_eq!(score.factors[FACTOR_PATTERN_MATCH], 0.5);
        assert!((score.factors[FACTOR_VOLUME] - 0.2).abs() < 1e-9);
        assert!((score.factors[FACTOR_TREND] - 0.2).abs() < 1e-9);
        assert!(score.confidence >= 0.9 - 1e-9);
        assert!(score.confidence > 0.5);
        assert_eq!(score.reliability(), Reliability::High);
    }

    #[test]
    fn test_single_doji_without_history() {
        let series = validated(vec![Bar::new(1, 100.0, 101.0, 99.0, 100.05, 1_000)]);
        let score = scorer().score(&series, "CDLDOJI", true).unwrap();
        assert_eq!(score.signal, Direction::Neutral);
        assert_eq!(score.factors[FACTOR_PATTERN_MATCH], 0.5);
        assert_eq!(score.factors[FACTOR_PROXIMITY], 0.0);
        assert!((score.confidence - 0.8).abs() < 1e-9);
        assert_eq!(score.rounded(), 0.8);
    }

    #[test]
    fn test_empty_volume_contributes_nothing() {
        let mut bars = morning_star_after_decline();
        for bar in bars.iter_mut() {
            bar.volume = 0;
        }
        let series = validated(bars);
        assert!(series.has_empty_volume());
        let score = scorer().score(&series, "CDLMORNINGSTAR", true).unwrap();
        assert_eq!(score.factors[FACTOR_VOLUME], 0.0);
    }

    #[test]
    fn test_weights_must_sum_to_one() {
        let mut config = ScoringConfig::default();
        config.weights.proximity = Ratio::new(0.2).unwrap();
        let catalog = Arc::new(PatternCatalog::with_defaults().unwrap());
        assert!(matches!(
            ConfidenceScorer::new(catalog, config),
            Err(PatternError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_param_overrides() {
        let mut params = HashMap::new();
        params.insert("trend_period", 5.0);
        params.insert("proximity_tolerance", 0.02);
        let config = ScoringConfig::with_params(&params).unwrap();
        assert_eq!(config.trend_period.get(), 5);
        assert_eq!(config.weights, ScoringWeights::default());

        params.insert("trend_period", 2.0);
        assert!(ScoringConfig::with_params(&params).is_err());
        params.clear();
        params.insert("weights", 1.0);
        assert!(matches!(
            ScoringConfig::with_params(&params),
            Err(PatternError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_classify_trend() {
        assert_eq!(classify_trend(&[10.0, 10.5, 11.0, 11.5], 0.001), Trend::Up);
        assert_eq!(classify_trend(&[11.5, 11.0, 10.5, 10.0], 0.001), Trend::Down);
        assert_eq!(classify_trend(&[10.0, 10.001, 10.0, 10.001], 0.001), Trend::Sideways);
        assert_eq!(classify_trend(&[10.0], 0.001), Trend::Sideways);
    }

    #[test]
    fn test_reliability_tiers() {
        assert_eq!(Reliability::of(0.81), Reliability::High);
        assert_eq!(Reliability::of(0.8), Reliability::Medium);
        assert_eq!(Reliability::of(0.5), Reliability::Medium);
        assert_eq!(Reliability::of(0.49), Reliability::Low);
    }

    #[test]
    fn test_proximity_full_credit_on_support() {
        // Swing low at 95 and a bullish close right on it
        let bars = vec![
            Bar::new(1, 100.0, 101.0, 97.0, 99.0, 100),
            Bar::new(2, 99.0, 100.0, 95.0, 96.0, 100),
            Bar::new(3, 96.0, 99.0, 96.0, 98.0, 100),
            Bar::new(4, 95.5, 96.0, 94.5, 95.0, 100),
        ];
        let s = scorer();
        assert!((s.proximity_credit(&bars, Direction::Bullish) - 1.0).abs() < 1e-9);
        assert_eq!(s.proximity_credit(&bars[..1], Direction::Bullish), 0.0);
    }
}
