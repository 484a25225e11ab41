//! Request facade
//!
//! [`PatternScanner`] is what an HTTP layer would call. Every request goes
//! through the rate governor first; scans are then answered from the result
//! cache or run by the orchestrator and stored for the next caller.
//!
//! ```rust,no_run
//! # use std::sync::Arc;
//! # use candlescan::prelude::*;
//! # async fn run(provider: Arc<dyn DataProvider>) -> std::result::Result<(), Box<dyn std::error::Error>> {
//! let scanner = PatternScanner::from_config(&ScannerConfig::default(), provider)?;
//! let response = scanner
//!     .scan("client-1", ScanRequest::new(["AAPL", "MSFT"], ["CDLDOJI", "CDLHAMMER"]))
//!     .await?;
//! println!("{} detections in {:.3}s", response.total_results, response.execution_time);
//! # Ok(())
//! # }
//! ```

use std::{sync::Arc, time::Duration};

use tokio::task::JoinHandle;
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    cache::{CacheStats, CacheStore, MemoryStore, NoopStore, ResultCache, ValueCategory},
    catalog::{CatalogBuilder, PatternInfo},
    clock::{Clock, SystemClock},
    config::ScannerConfig,
    governor::{EndpointTier, RateGovernor},
    provider::{CachingProvider, DataProvider},
    scan::{DetectionResult, ScanError, ScanOrchestrator, ScanParams, ScanResult, SymbolError},
    scoring::ConfidenceScorer,
    shard::DEFAULT_LOCK_TIMEOUT,
    timeframe::Timeframe,
    PatternError,
};

pub use crate::scan::ErrorBody;

/// Inbound scan request
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ScanRequest {
    pub symbols: Vec<String>,
    pub patterns: Vec<String>,
    #[serde(default)]
    pub timeframe: Timeframe,
    #[serde(default)]
    pub min_volume: Option<u64>,
    #[serde(default)]
    pub min_price: Option<f64>,
    #[serde(default)]
    pub max_price: Option<f64>,
    /// Also report evaluated patterns that did not match
    #[serde(default)]
    pub include_non_matches: bool,
}

impl ScanRequest {
    pub fn new<S, P>(symbols: S, patterns: P) -> Self
    where
        S: IntoIterator,
        S::Item: Into<String>,
        P: IntoIterator,
        P::Item: Into<String>,
    {
        Self {
            symbols: symbols.into_iter().map(Into::into).collect(),
            patterns: patterns.into_iter().map(Into::into).collect(),
            timeframe: Timeframe::default(),
            min_volume: None,
            min_price: None,
            max_price: None,
            include_non_matches: false,
        }
    }

    pub fn timeframe(mut self, timeframe: Timeframe) -> Self {
        self.timeframe = timeframe;
        self
    }

    pub fn params(&self) -> ScanParams {
        ScanParams {
            min_volume: self.min_volume,
            min_price: self.min_price,
            max_price: self.max_price,
            include_non_matches: self.include_non_matches,
        }
    }
}

/// Outbound scan response
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ScanResponse {
    pub results: Vec<DetectionResult>,
    pub total_results: usize,
    /// Seconds spent answering this request
    pub execution_time: f64,
    pub scan_id: Uuid,
    pub errors: Vec<SymbolError>,
    pub partial: bool,
    pub cached: bool,
}

impl ScanResponse {
    fn from_result(result: ScanResult, elapsed: Duration, cached: bool) -> Self {
        Self {
            total_results: result.results.len(),
            results: result.results,
            execution_time: elapsed.as_secs_f64(),
            scan_id: result.scan_id,
            errors: result.errors,
            partial: result.partial,
            cached,
        }
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ServiceHealth {
    pub patterns: usize,
    pub cache: CacheStats,
    pub cache_entries: usize,
    pub tracked_clients: usize,
}

// ============================================================
// SCANNER
// ============================================================

pub struct PatternScanner {
    orchestrator: ScanOrchestrator,
    cache: Arc<ResultCache>,
    governor: Arc<RateGovernor>,
}

impl PatternScanner {
    pub fn new(orchestrator: ScanOrchestrator, cache: Arc<ResultCache>, governor: Arc<RateGovernor>) -> Self {
        Self {
            orchestrator,
            cache,
            governor,
        }
    }

    /// Build the full stack from `config`. Bars fetched through `provider`
    /// are cached unless caching is disabled.
    pub fn from_config(config: &ScannerConfig, provider: Arc<dyn DataProvider>) -> Result<Self, PatternError> {
        Self::from_config_with_clock(config, provider, Arc::new(SystemClock))
    }

    pub fn from_config_with_clock(
        config: &ScannerConfig,
        provider: Arc<dyn DataProvider>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, PatternError> {
        config.validate()?;

        let catalog = CatalogBuilder::new()
            .with_all_defaults()
            .thresholds(config.thresholds)
            .build()?;
        let scorer = Arc::new(ConfidenceScorer::new(Arc::new(catalog), config.scoring)?);

        let store: Arc<dyn CacheStore> = if config.cache.enabled {
            Arc::new(MemoryStore::new(config.cache.shards, DEFAULT_LOCK_TIMEOUT, Arc::clone(&clock)))
        } else {
            Arc::new(NoopStore)
        };
        let cache = Arc::new(ResultCache::with_ttls(store, config.cache.ttls));
        let provider: Arc<dyn DataProvider> = if config.cache.enabled {
            Arc::new(CachingProvider::new(provider, Arc::clone(&cache)))
        } else {
            provider
        };

        let orchestrator = ScanOrchestrator::new(provider, scorer, config.scan)
            .with_validator(config.validator)
            .with_clock(Arc::clone(&clock));
        let governor = Arc::new(RateGovernor::new(config.rate_limits.clone(), clock));

        info!(
            patterns = orchestrator.catalog().len(),
            cache = config.cache.enabled,
            max_symbols = config.scan.max_symbols,
            "pattern scanner ready"
        );
        Ok(Self::new(orchestrator, cache, governor))
    }

    #[inline]
    pub fn orchestrator(&self) -> &ScanOrchestrator {
        &self.orchestrator
    }

    #[inline]
    pub fn cache(&self) -> &Arc<ResultCache> {
        &self.cache
    }

    #[inline]
    pub fn governor(&self) -> &Arc<RateGovernor> {
        &self.governor
    }

    /// Start the cache sweeper and the rate-window pruner
    pub fn spawn_maintenance(&self, config: &ScannerConfig) -> [JoinHandle<()>; 2] {
        [
            self.cache.spawn_sweeper(config.cache.sweep_interval),
            self.governor.spawn_pruner(config.prune_interval),
        ]
    }

    /// Run a scan on behalf of `client_id`.
    ///
    /// Complete results are cached under a key that ignores symbol and
    /// pattern order; partial scans and scans with symbol errors are not.
    pub async fn scan(&self, client_id: &str, request: ScanRequest) -> Result<ScanResponse, ScanError> {
        let started = std::time::Instant::now();
        self.governor.check(client_id, EndpointTier::Scan)?;

        let params = request.params();
        params.validate()?;
        let symbols = self.orchestrator.normalize_symbols(&request.symbols)?;
        let patterns = self.orchestrator.resolve_patterns(&request.patterns)?;
        let key = ResultCache::scan_key(&symbols, &patterns, request.timeframe, &params);

        if let Some(result) = self.cache.get::<ScanResult>(&key) {
            debug!(client = client_id, key = %key, scan_id = %result.scan_id, "scan served from cache");
            return Ok(ScanResponse::from_result(result, started.elapsed(), true));
        }

        let result = self
            .orchestrator
            .scan(&symbols, &patterns, request.timeframe, &params)
            .await?;
        if !result.partial && result.errors.is_empty() {
            self.cache.put(&key, &result, ValueCategory::ScanResult);
        }
        Ok(ScanResponse::from_result(result, started.elapsed(), false))
    }

    /// Catalog listing for `client_id`, sorted by name
    pub fn patterns(&self, client_id: &str) -> Result<Vec<PatternInfo>, ScanError> {
        self.governor.check(client_id, EndpointTier::Metadata)?;
        if let Some(listing) = self.cache.get::<Vec<PatternInfo>>(ResultCache::CATALOG_KEY) {
            return Ok(listing);
        }
        let listing = self.orchestrator.catalog().describe();
        self.cache
            .put(ResultCache::CATALOG_KEY, &listing, ValueCategory::PatternCatalog);
        Ok(listing)
    }

    pub fn health(&self) -> ServiceHealth {
        ServiceHealth {
            patterns: self.orchestrator.catalog().len(),
            cache: self.cache.stats(),
            cache_entries: self.cache.entries(),
            tracked_clients: self.governor.tracked_clients(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{clock::ManualClock, provider::ProviderError, scan::SymbolErrorKind, Bar, BarSeries};
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counting {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl DataProvider for Counting {
        async fn get_bars(
            &self,
            symbol: &str,
            _: Timeframe,
            _: DateTime<Utc>,
            _: DateTime<Utc>,
        ) -> Result<BarSeries, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if symbol == "DOWN" {
                return Err(ProviderError::Unavailable("maintenance".into()));
            }
            Ok(BarSeries::new(
                symbol,
                vec![
                    Bar::new(1, 100.0, 102.0, 99.0, 101.5, 1_000),
                    Bar::new(2, 100.0, 101.0, 99.0, 100.05, 1_000),
                ],
            ))
        }
    }

    fn scanner(config: ScannerConfig) -> (PatternScanner, Arc<Counting>) {
        let provider = Arc::new(Counting::default());
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        let scanner = PatternScanner::from_config_with_clock(&config, provider.clone(), clock).unwrap();
        (scanner, provider)
    }

    #[tokio::test]
    async fn test_second_scan_is_cached() {
        let (scanner, provider) = scanner(ScannerConfig::default());
        let first = scanner
            .scan("c1", ScanRequest::new(["AAPL", "MSFT"], ["CDLDOJI"]))
            .await
            .unwrap();
        assert!(!first.cached);
        assert_eq!(first.total_results, 2);

        let second = scanner
            .scan("c2", ScanRequest::new(["msft", "AAPL"], ["CDLDOJI"]))
            .await
            .unwrap();
        assert!(second.cached);
        assert_eq!(second.scan_id, first.scan_id);
        let symbols = |r: &ScanResponse| r.results.iter().map(|d| d.symbol.clone()).collect::<Vec<_>>();
        assert_eq!(symbols(&second), symbols(&first));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_disabled_cache_always_fetches() {
        let config = ScannerConfig::builder().cache_enabled(false).build().unwrap();
        let (scanner, provider) = scanner(config);
        for _ in 0..2 {
            let response = scanner.scan("c1", ScanRequest::new(["AAPL"], ["CDLDOJI"])).await.unwrap();
            assert!(!response.cached);
        }
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_symbol_errors_are_not_cached() {
        let (scanner, _) = scanner(ScannerConfig::default());
        let request = ScanRequest::new(["AAPL", "DOWN"], ["CDLDOJI"]);
        let first = scanner.scan("c1", request.clone()).await.unwrap();
        assert_eq!(first.errors.len(), 1);
        assert_eq!(first.errors[0].kind, SymbolErrorKind::Provider);
        assert_eq!(first.total_results, 1);
        let second = scanner.scan("c1", request).await.unwrap();
        assert!(!second.cached);
    }

    #[tokio::test]
    async fn test_invalid_requests() {
        let (scanner, _) = scanner(ScannerConfig::default());
        let none: [&str; 0] = [];
        let err = scanner.scan("c1", ScanRequest::new(none, ["CDLDOJI"])).await.unwrap_err();
        assert_eq!(err.code(), 400);

        let err = scanner
            .scan("c1", ScanRequest::new(["AAPL"], ["CDLNOTAPATTERN"]))
            .await
            .unwrap_err();
        assert_eq!(err.to_body().code, 404);

        let mut request = ScanRequest::new(["AAPL"], ["CDLDOJI"]);
        request.min_price = Some(10.0);
        request.max_price = Some(1.0);
        assert!(matches!(
            scanner.scan("c1", request).await,
            Err(ScanError::InvalidRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_scan_rate_limit() {
        let (scanner, _) = scanner(ScannerConfig::default());
        for _ in 0..10 {
            scanner.scan("busy", ScanRequest::new(["AAPL"], ["CDLDOJI"])).await.unwrap();
        }
        let err = scanner
            .scan("busy", ScanRequest::new(["AAPL"], ["CDLDOJI"]))
            .await
            .unwrap_err();
        assert!(matches!(err, ScanError::RateLimited(_)));
        assert_eq!(err.code(), 429);
        assert!(scanner.scan("other", ScanRequest::new(["AAPL"], ["CDLDOJI"])).await.is_ok());
    }

    #[tokio::test]
    async fn test_non_matches_reported_on_request() {
        let (scanner, _) = scanner(ScannerConfig::default());
        let matched_only = scanner
            .scan("c1", ScanRequest::new(["AAPL"], ["CDLDOJI", "CDLENGULFING"]))
            .await
            .unwrap();
        assert_eq!(matched_only.total_results, 1);

        let mut request = ScanRequest::new(["AAPL"], ["CDLDOJI", "CDLENGULFING"]);
        request.include_non_matches = true;
        let everything = scanner.scan("c1", request).await.unwrap();
        assert!(!everything.cached);
        assert_eq!(everything.total_results, 2);
        let miss = everything
            .results
            .iter()
            .find(|r| r.pattern_name == "CDLENGULFING")
            .unwrap();
        assert!(!miss.detected);
        assert_eq!(miss.confidence, 0.0);
    }

    #[test]
    fn test_patterns_listing_is_cached() {
        let (scanner, _) = scanner(ScannerConfig::default());
        let listing = scanner.patterns("c1").unwrap();
        assert_eq!(listing.len(), 61);
        assert!(listing.windows(2).all(|w| w[0].name < w[1].name));
        assert_eq!(scanner.patterns("c1").unwrap(), listing);
        assert_eq!(scanner.cache().stats().hits, 1);

        let health = scanner.health();
        assert_eq!(health.patterns, 61);
        assert_eq!(health.tracked_clients, 1);
        assert_eq!(health.cache_entries, 1);
    }

    #[test]
    fn test_request_json() {
        let request: ScanRequest = serde_json::from_str(
            r#"{"symbols":["AAPL"],"patterns":["CDLDOJI"],"timeframe":"1Hour","min_volume":1000}"#,
        )
        .unwrap();
        assert_eq!(request.timeframe, Timeframe::Hour1);
        assert_eq!(request.params().min_volume, Some(1_000));
        assert!(!request.params().include_non_matches);

        let request: ScanRequest = serde_json::from_str(r#"{"symbols":["AAPL"],"patterns":["CDLDOJI"]}"#).unwrap();
        assert_eq!(request.timeframe, Timeframe::Day1);
    }
}
