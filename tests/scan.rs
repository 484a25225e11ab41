//! Scan orchestration and request facade, end to end against a fake provider.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use candlescan::{
    cache::ResultCache,
    prelude::*,
    scan::SymbolErrorKind,
};
use chrono::{DateTime, Utc};

/// Serves a doji ending series for every symbol. `SLOW*` symbols wait
/// `delay` first and `DOWN` always fails.
struct FakeMarket {
    delay: Duration,
}

#[async_trait]
impl DataProvider for FakeMarket {
    fn name(&self) -> &str {
        "fake"
    }

    async fn get_bars(
        &self,
        symbol: &str,
        _: Timeframe,
        _: DateTime<Utc>,
        _: DateTime<Utc>,
    ) -> std::result::Result<BarSeries, ProviderError> {
        if symbol.starts_with("SLOW") {
            tokio::time::sleep(self.delay).await;
        }
        if symbol == "DOWN" {
            return Err(ProviderError::Unavailable("upstream 503".into()));
        }
        Ok(BarSeries::new(
            symbol,
            vec![
                Bar::new(1_700_000_000, 100.0, 102.0, 99.0, 101.5, 5_000),
                Bar::new(1_700_086_400, 100.0, 101.0, 99.0, 100.05, 5_000),
            ],
        ))
    }
}

fn orchestrator(limits: ScanLimits, delay: Duration) -> ScanOrchestrator {
    let catalog = Arc::new(PatternCatalog::with_defaults().unwrap());
    let scorer = Arc::new(ConfidenceScorer::new(catalog, ScoringConfig::default()).unwrap());
    ScanOrchestrator::new(Arc::new(FakeMarket { delay }), scorer, limits)
}

// ============================================================
// REQUEST BOUNDS
// ============================================================

#[tokio::test]
async fn test_symbol_count_bounds() {
    let orch = orchestrator(ScanLimits::default(), Duration::ZERO);
    let params = ScanParams::default();

    let none: [&str; 0] = [];
    let err = orch.scan(&none, &["CDLDOJI"], Timeframe::Day1, &params).await.unwrap_err();
    assert!(matches!(err, ScanError::InvalidRequest(_)));

    let too_many: Vec<String> = (0..51).map(|i| format!("S{i}")).collect();
    let err = orch.scan(&too_many, &["CDLDOJI"], Timeframe::Day1, &params).await.unwrap_err();
    assert!(matches!(err, ScanError::InvalidRequest(_)));

    let fifty: Vec<String> = (0..50).map(|i| format!("S{i}")).collect();
    let result = orch.scan(&fifty, &["CDLDOJI"], Timeframe::Day1, &params).await.unwrap();
    assert_eq!(result.detections().count(), 50);
}

#[tokio::test]
async fn test_unknown_pattern_fails_whole_scan() {
    let orch = orchestrator(ScanLimits::default(), Duration::ZERO);
    let err = orch
        .scan(&["AAPL"], &["CDLDOJI", "CDLWHATEVER"], Timeframe::Day1, &ScanParams::default())
        .await
        .unwrap_err();
    assert_eq!(err, ScanError::UnknownPattern("CDLWHATEVER".into()));
    assert_eq!(err.code(), 404);
}

#[test]
fn test_cache_key_ignores_order() {
    let params = ScanParams::default();
    let a = ResultCache::scan_key(&["AAPL", "MSFT"], &["CDLDOJI", "CDLHAMMER"], Timeframe::Day1, &params);
    let b = ResultCache::scan_key(&["MSFT", "AAPL"], &["CDLHAMMER", "CDLDOJI"], Timeframe::Day1, &params);
    assert_eq!(a, b);

    let hourly = ResultCache::scan_key(&["AAPL", "MSFT"], &["CDLDOJI", "CDLHAMMER"], Timeframe::Hour1, &params);
    assert_ne!(a, hourly);

    let filtered = ScanParams {
        min_volume: Some(10_000),
        ..Default::default()
    };
    let c = ResultCache::scan_key(&["AAPL", "MSFT"], &["CDLDOJI", "CDLHAMMER"], Timeframe::Day1, &filtered);
    assert_ne!(a, c);
}

// ============================================================
// PARTIAL FAILURE AND DEADLINES
// ============================================================

#[tokio::test]
async fn test_provider_failure_stays_local() {
    let orch = orchestrator(ScanLimits::default(), Duration::ZERO);
    let result = orch
        .scan(&["AAPL", "DOWN", "MSFT"], &["CDLDOJI"], Timeframe::Day1, &ScanParams::default())
        .await
        .unwrap();
    assert_eq!(result.detections().count(), 2);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].symbol, "DOWN");
    assert_eq!(result.errors[0].kind, SymbolErrorKind::Provider);
    assert!(!result.partial);
}

#[tokio::test(start_paused = true)]
async fn test_slow_provider_times_out() {
    let limits = ScanLimits {
        provider_timeout: Duration::from_secs(1),
        ..Default::default()
    };
    let orch = orchestrator(limits, Duration::from_secs(5));
    let result = orch
        .scan(&["AAPL", "SLOW"], &["CDLDOJI"], Timeframe::Day1, &ScanParams::default())
        .await
        .unwrap();
    assert_eq!(result.detections().count(), 1);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].kind, SymbolErrorKind::Timeout);
    assert!(!result.partial);
}

#[tokio::test(start_paused = true)]
async fn test_deadline_returns_partial_result() {
    let limits = ScanLimits {
        provider_timeout: Duration::from_secs(120),
        scan_timeout: Duration::from_secs(30),
        ..Default::default()
    };
    let orch = orchestrator(limits, Duration::from_secs(60));
    let result = orch
        .scan(
            &["AAPL", "SLOW1", "SLOW2"],
            &["CDLDOJI"],
            Timeframe::Day1,
            &ScanParams::default(),
        )
        .await
        .unwrap();
    assert!(result.partial);
    assert_eq!(result.detections().count(), 1);
    let cancelled: Vec<_> = result
        .errors
        .iter()
        .filter(|e| e.kind == SymbolErrorKind::Cancelled)
        .map(|e| e.symbol.as_str())
        .collect();
    assert_eq!(cancelled, vec!["SLOW1", "SLOW2"]);
}

#[tokio::test]
async fn test_filters_drop_symbols() {
    let orch = orchestrator(ScanLimits::default(), Duration::ZERO);
    let params = ScanParams {
        min_price: Some(500.0),
        ..Default::default()
    };
    let result = orch.scan(&["AAPL"], &["CDLDOJI"], Timeframe::Day1, &params).await.unwrap();
    assert!(result.results.is_empty());
    assert_eq!(result.filtered, vec!["AAPL".to_string()]);
}

// ============================================================
// FACADE
// ============================================================

fn scanner(clock: Arc<ManualClock>) -> PatternScanner {
    PatternScanner::from_config_with_clock(
        &ScannerConfig::default(),
        Arc::new(FakeMarket { delay: Duration::ZERO }),
        clock,
    )
    .unwrap()
}

#[tokio::test]
async fn test_rate_limit_resumes_after_window() {
    let clock = Arc::new(ManualClock::new(1_700_000_000_000));
    let scanner = scanner(clock.clone());
    let request = || ScanRequest::new(["AAPL"], ["CDLDOJI"]);

    for _ in 0..10 {
        scanner.scan("desk-7", request()).await.unwrap();
    }
    let err = scanner.scan("desk-7", request()).await.unwrap_err();
    let ScanError::RateLimited(exceeded) = &err else {
        panic!("expected rate limit, got {err:?}");
    };
    assert_eq!(exceeded.retry_after, Duration::from_secs(300));
    assert_eq!(err.to_body().code, 429);

    clock.advance(Duration::from_secs(300));
    assert!(scanner.scan("desk-7", request()).await.is_ok());
}

#[tokio::test]
async fn test_response_shape() {
    let clock = Arc::new(ManualClock::new(1_700_000_000_000));
    let scanner = scanner(clock);
    let response = scanner
        .scan("c", ScanRequest::new(["MSFT", "AAPL"], ["CDLDOJI"]))
        .await
        .unwrap();
    assert_eq!(response.total_results, 2);
    assert_eq!(response.results[0].symbol, "AAPL");
    assert!(response.results.iter().all(|r| r.detected && r.confidence > 0.0));

    let json = serde_json::to_value(&response).unwrap();
    for field in ["results", "total_results", "execution_time", "scan_id", "errors", "partial", "cached"] {
        assert!(json.get(field).is_some(), "{field} missing");
    }
}
