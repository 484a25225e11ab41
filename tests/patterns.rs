//! Integration tests for the pattern catalog, validator and scorer.

use std::sync::Arc;

use candlescan::prelude::*;

fn bar(t: i64, o: f64, h: f64, l: f64, c: f64) -> Bar {
    Bar::new(t, o, h, l, c, 1_000)
}

/// Steady decline of small red candles, each closing on its low
fn decline(n: usize) -> Vec<Bar> {
    (0..n)
        .map(|i| {
            let open = 20.0 - i as f64;
            let close = open - 0.8;
            Bar::new(i as i64, open, open + 0.05, close - 0.05, close, 1_000)
        })
        .collect()
}

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

fn scorer() -> ConfidenceScorer {
    let catalog = Arc::new(PatternCatalog::with_defaults().unwrap());
    ConfidenceScorer::new(catalog, ScoringConfig::default()).unwrap()
}

// ============================================================
// CATALOG
// ============================================================

#[test]
fn test_default_catalog_shape() {
    let catalog = PatternCatalog::with_defaults().unwrap();
    assert_eq!(catalog.len(), 61);
    assert_eq!(catalog.max_window(), 5);

    let mut by_window = [0usize; 6];
    for def in catalog.iter() {
        by_window[def.window_size] += 1;
    }
    // hammer family reads one context bar, long/short lines read four
    assert_eq!(by_window, [0, 11, 19, 22, 3, 6]);

    let single = PatternCatalog::builder().with_single_bar_defaults().build().unwrap();
    assert_eq!(single.len(), 17);
    let context: Vec<_> = single.iter().filter(|d| d.window_size > 1).map(|d| d.name.as_str()).collect();
    assert_eq!(
        context,
        ["CDLHAMMER", "CDLHANGINGMAN", "CDLINVERTEDHAMMER", "CDLSHOOTINGSTAR", "CDLLONGLINE", "CDLSHORTLINE"]
    );

    for name in ["CDLDOJI", "CDLENGULFING", "CDLMORNINGSTAR", "CDLHAMMER", "CDLMATHOLD"] {
        assert!(catalog.contains(name), "{name} missing");
    }
}

#[test]
fn test_describe_is_sorted_and_serializable() {
    let listing = PatternCatalog::with_defaults().unwrap().describe();
    assert!(listing.windows(2).all(|w| w[0].name < w[1].name));

    let json = serde_json::to_value(&listing[0]).unwrap();
    assert!(json.get("type").is_some());
    assert!(json.get("window_size").is_some());
}

#[test]
fn test_unknown_pattern() {
    let catalog = PatternCatalog::with_defaults().unwrap();
    let series = BarSeries::new("X", vec![bar(1, 10.0, 11.0, 9.0, 10.5)]);
    assert_eq!(
        catalog.evaluate("CDLUNICORN", &series).unwrap_err(),
        PatternError::UnknownPattern("CDLUNICORN".into())
    );
}

#[test]
fn test_short_series_reports_missing_bars() {
    let catalog = PatternCatalog::with_defaults().unwrap();
    let series = BarSeries::new("X", vec![bar(1, 10.0, 11.0, 9.0, 10.5)]);
    assert_eq!(
        catalog.evaluate("CDLMORNINGSTAR", &series).unwrap_err(),
        PatternError::InsufficientData { need: 3, got: 1 }
    );
}

#[test]
fn test_hammer_needs_context_bar() {
    let catalog = PatternCatalog::with_defaults().unwrap();
    let hammer = bar(2, 60.0, 60.1, 55.0, 60.05);
    let alone = BarSeries::new("X", vec![hammer]);
    assert_eq!(
        catalog.evaluate("CDLHAMMER", &alone).unwrap_err(),
        PatternError::InsufficientData { need: 2, got: 1 }
    );

    let after_drop = BarSeries::new("X", vec![bar(1, 62.0, 63.0, 60.0, 60.5), hammer]);
    assert_eq!(
        catalog.evaluate_direction("CDLHAMMER", &after_drop).unwrap(),
        Some(Direction::Bullish)
    );
}

#[test]
fn test_doji_detection() {
    let catalog = PatternCatalog::with_defaults().unwrap();
    let mut bars = decline(5);
    bars.push(bar(5, 14.0, 15.0, 13.0, 14.02));
    let series = BarSeries::new("X", bars);
    assert!(catalog.evaluate("CDLDOJI", &series).unwrap());
    assert_eq!(catalog.evaluate_direction("CDLDOJI", &series).unwrap(), Some(Direction::Neutral));
}

#[test]
fn test_engulfing_reads_side_from_bars() {
    let catalog = PatternCatalog::with_defaults().unwrap();
    let bullish = BarSeries::new(
        "X",
        vec![bar(1, 101.0, 101.5, 99.5, 100.0), bar(2, 99.5, 102.5, 99.0, 102.0)],
    );
    assert_eq!(
        catalog.evaluate_direction("CDLENGULFING", &bullish).unwrap(),
        Some(Direction::Bullish)
    );

    let bearish = BarSeries::new(
        "X",
        vec![bar(1, 100.0, 101.5, 99.5, 101.0), bar(2, 101.5, 102.0, 99.0, 99.5)],
    );
    assert_eq!(
        catalog.evaluate_direction("CDLENGULFING", &bearish).unwrap(),
        Some(Direction::Bearish)
    );
    assert!(catalog.get("CDLENGULFING").unwrap().is_two_sided());
}

#[test]
fn test_morning_star_detected() {
    let catalog = PatternCatalog::with_defaults().unwrap();
    let series = BarSeries::new("X", morning_star_after_decline());
    assert_eq!(
        catalog.evaluate_direction("CDLMORNINGSTAR", &series).unwrap(),
        Some(Direction::Bullish)
    );
    assert!(!catalog.evaluate("CDLEVENINGSTAR", &series).unwrap());
}

struct GapUp;

impl PatternMatcher for GapUp {
    fn window_size(&self) -> usize {
        2
    }

    fn matches(&self, window: &[Bar], _: &Thresholds) -> Option<Direction> {
        let [prev, cur] = window else { return None };
        (cur.low > prev.high).then_some(Direction::Bullish)
    }
}

#[test]
fn test_custom_matcher_alongside_builtins() {
    let catalog = CatalogBuilder::new()
        .with_single_bar_defaults()
        .add_custom("GAPUP", "Gap Up", Direction::Bullish, Category::Continuation, GapUp)
        .build()
        .unwrap();
    assert_eq!(catalog.len(), 18);

    let series = BarSeries::new(
        "X",
        vec![bar(1, 10.0, 11.0, 9.5, 10.5), bar(2, 12.0, 13.0, 11.5, 12.5)],
    );
    assert!(catalog.evaluate("GAPUP", &series).unwrap());

    let dup = CatalogBuilder::new()
        .with_single_bar_defaults()
        .add_custom("CDLDOJI", "Doji again", Direction::Neutral, Category::Indecision, GapUp)
        .build();
    assert!(matches!(dup, Err(PatternError::DuplicatePattern("CDLDOJI"))));
}

// ============================================================
// VALIDATION + SCORING
// ============================================================

#[test]
fn test_validator_rejects_before_scoring() {
    let mut bars = morning_star_after_decline();
    bars[4].timestamp = bars[3].timestamp;
    let err = SeriesValidator::default()
        .validate(&BarSeries::new("X", bars), 3)
        .unwrap_err();
    assert_eq!(err, ValidationError::NonMonotonicTimestamp { index: 4 });
}

#[test]
fn test_morning_star_confidence() {
    let series = BarSeries::new("X", morning_star_after_decline());
    let validated = SeriesValidator::default().validate(&series, 3).unwrap();
    let score = scorer().score(&validated, "CDLMORNINGSTAR", true).unwrap();
    assert_eq!(score.signal, Direction::Bullish);
    assert!(score.confidence >= 0.9 - 1e-9);
    assert_eq!(score.reliability(), Reliability::High);
    assert_eq!(score.factors.len(), 4);
}

#[test]
fn test_doji_pattern_match_factor() {
    let series = BarSeries::new("X", vec![bar(1, 100.0, 101.0, 99.0, 100.05)]);
    let validated = SeriesValidator::default().validate(&series, 1).unwrap();
    let score = scorer().score(&validated, "CDLDOJI", true).unwrap();
    assert_eq!(score.factors["pattern_match"], 0.5);
    assert_eq!(score.signal, Direction::Neutral);
}

#[test]
fn test_flat_doji_bar_alone() {
    let series = BarSeries::new("X", vec![bar(1, 100.0, 105.0, 95.0, 100.0)]);
    assert!(scorer().catalog().evaluate("CDLDOJI", &series).unwrap());

    let validated = SeriesValidator::default().validate(&series, 1).unwrap();
    let score = scorer().score(&validated, "CDLDOJI", true).unwrap();
    assert_eq!(score.signal, Direction::Neutral);
    assert_eq!(score.factors["pattern_match"], 0.5);
    assert!((score.confidence - 0.8).abs() < 1e-9, "confidence {}", score.confidence);
}

#[test]
fn test_morning_star_three_bars_alone() {
    let series = BarSeries::new(
        "X",
        vec![
            bar(1, 10.0, 10.2, 9.8, 10.05),
            bar(2, 10.05, 10.1, 9.0, 9.95),
            bar(3, 9.95, 10.5, 9.9, 10.4),
        ],
    );
    let scorer = scorer();
    assert_eq!(
        scorer.catalog().evaluate_direction("CDLMORNINGSTAR", &series).unwrap(),
        Some(Direction::Bullish)
    );

    let validated = SeriesValidator::default().validate(&series, 3).unwrap();
    let score = scorer.score(&validated, "CDLMORNINGSTAR", true).unwrap();
    assert_eq!(score.signal, Direction::Bullish);
    assert_eq!(score.factors["pattern_match"], 0.5);
    assert!((score.confidence - 0.8).abs() < 1e-9, "confidence {}", score.confidence);
}

#[test]
fn test_unmatched_is_zero() {
    let series = BarSeries::new("X", morning_star_after_decline());
    let validated = SeriesValidator::default().validate(&series, 1).unwrap();
    let score = scorer().score(&validated, "CDLEVENINGSTAR", false).unwrap();
    assert_eq!(score.confidence, 0.0);
    assert_eq!(score.signal, Direction::Neutral);
    assert_eq!(score.reliability(), Reliability::Low);
}

#[test]
fn test_scoring_weights_from_toml() {
    let config = ScannerConfig::from_toml_str(
        r#"
        [scoring.weights]
        pattern_match = 0.4
        volume = 0.3
        trend = 0.2
        proximity = 0.1
        "#,
    )
    .unwrap();
    assert!(config.validate().is_ok());

    let skewed = ScannerConfig::from_toml_str(
        r#"
        [scoring.weights]
        pattern_match = 0.9
        "#,
    )
    .unwrap();
    assert!(skewed.validate().is_err());
}
