//! Scan orchestration
//!
//! A scan fans out across symbols: each symbol's bars are fetched under a
//! per-call timeout, validated once, then every requested pattern is
//! evaluated and scored. Symbols run concurrently up to a fixed bound; the
//! whole scan shares one deadline. Failures stay local to their symbol and
//! come back in [`ScanResult::errors`].

use std::{
    collections::{BTreeMap, HashSet},
    sync::Arc,
    time::Duration,
};

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use tokio::{
    sync::Semaphore,
    task::JoinSet,
    time::{timeout, timeout_at, Instant},
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    catalog::PatternCatalog,
    clock::{serde_secs, Clock, SystemClock},
    governor::RateLimitExceeded,
    provider::{DataProvider, ProviderError},
    scoring::ConfidenceScorer,
    timeframe::Timeframe,
    validator::{SeriesValidator, ValidationError},
    Bar, BarSeries, Direction, PatternError,
};

pub const MAX_SYMBOL_LEN: usize = 8;

// ============================================================
// ERRORS
// ============================================================

/// Caller-facing scan failure
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ScanError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("unknown pattern: {0}")]
    UnknownPattern(String),

    #[error(transparent)]
    RateLimited(#[from] RateLimitExceeded),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<PatternError> for ScanError {
    fn from(e: PatternError) -> Self {
        match e {
            PatternError::UnknownPattern(name) => ScanError::UnknownPattern(name),
            other => ScanError::InvalidRequest(other.to_string()),
        }
    }
}

impl ScanError {
    /// HTTP-style status code for the error
    pub fn code(&self) -> u16 {
        match self {
            ScanError::InvalidRequest(_) | ScanError::Validation(_) => 400,
            ScanError::UnknownPattern(_) => 404,
            ScanError::RateLimited(_) => 429,
            ScanError::Internal(_) => 500,
        }
    }

    pub fn to_body(&self) -> ErrorBody {
        ErrorBody {
            error: true,
            message: self.to_string(),
            code: self.code(),
        }
    }
}

/// JSON error payload for the inbound surface
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ErrorBody {
    pub error: bool,
    pub message: String,
    pub code: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolErrorKind {
    Provider,
    Timeout,
    Validation,
    Cancelled,
    Internal,
}

/// Why one symbol produced no results
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SymbolError {
    pub symbol: String,
    pub kind: SymbolErrorKind,
    pub message: String,
}

impl SymbolError {
    fn new(symbol: &str, kind: SymbolErrorKind, message: impl Into<String>) -> Self {
        Self {
            symbol: symbol.to_string(),
            kind,
            message: message.into(),
        }
    }
}

// ============================================================
// REQUEST / RESULT TYPES
// ============================================================

/// Optional filters applied to each symbol's last bar
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ScanParams {
    pub min_volume: Option<u64>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    /// Report every evaluated pattern, matched or not
    pub include_non_matches: bool,
}

impl ScanParams {
    pub fn validate(&self) -> Result<(), ScanError> {
        let price_ok = |p: Option<f64>| p.map_or(true, |p| p.is_finite() && p >= 0.0);
        if !price_ok(self.min_price) || !price_ok(self.max_price) {
            return Err(ScanError::InvalidRequest("price filters must be finite and >= 0".into()));
        }
        if let (Some(min), Some(max)) = (self.min_price, self.max_price) {
            if min > max {
                return Err(ScanError::InvalidRequest(format!("min_price {min} > max_price {max}")));
            }
        }
        Ok(())
    }

    pub fn passes(&self, bar: &Bar) -> bool {
        self.min_volume.map_or(true, |v| bar.volume >= v)
            && self.min_price.map_or(true, |p| bar.close >= p)
            && self.max_price.map_or(true, |p| bar.close <= p)
    }

    /// Fixed-order rendering used in cache keys
    pub fn canonical(&self) -> String {
        fn opt<T: std::fmt::Display>(v: Option<T>) -> String {
            v.map_or_else(|| "-".to_string(), |v| v.to_string())
        }
        format!(
            "min_volume={};min_price={};max_price={};all={}",
            opt(self.min_volume),
            opt(self.min_price),
            opt(self.max_price),
            self.include_non_matches
        )
    }
}

/// One (symbol, pattern) outcome
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct DetectionResult {
    pub symbol: String,
    pub pattern_name: String,
    pub detected: bool,
    /// Rounded to two decimals
    pub confidence: f64,
    pub signal: Direction,
    /// Time of the bar the pattern completed on
    pub timestamp: DateTime<Utc>,
    pub contributing_factors: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ScanResult {
    pub scan_id: Uuid,
    pub results: Vec<DetectionResult>,
    pub errors: Vec<SymbolError>,
    /// Symbols dropped by the price/volume filters
    pub filtered: Vec<String>,
    /// Deadline hit before every symbol finished
    pub partial: bool,
    pub elapsed: Duration,
}

impl ScanResult {
    fn empty() -> Self {
        Self {
            scan_id: Uuid::new_v4(),
            results: Vec::new(),
            errors: Vec::new(),
            filtered: Vec::new(),
            partial: false,
            elapsed: Duration::ZERO,
        }
    }

    /// Matched results only
    pub fn detections(&self) -> impl Iterator<Item = &DetectionResult> {
        self.results.iter().filter(|r| r.detected)
    }

    fn absorb(&mut self, symbol: &str, outcome: SymbolOutcome) {
        match outcome {
            SymbolOutcome::Detected(results) => self.results.extend(results),
            SymbolOutcome::Filtered => self.filtered.push(symbol.to_string()),
            SymbolOutcome::Invalid(e) => {
                self.errors.push(SymbolError::new(symbol, SymbolErrorKind::Validation, e.to_string()))
            },
            SymbolOutcome::Failed(e) => self.errors.push(e),
        }
    }

    /// Stable ordering independent of task completion order
    fn finish(&mut self, elapsed: Duration) {
        self.results
            .sort_by(|a, b| (&a.symbol, &a.pattern_name).cmp(&(&b.symbol, &b.pattern_name)));
        self.errors.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        self.filtered.sort();
        self.elapsed = elapsed;
    }
}

/// Request bounds and timeouts
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ScanLimits {
    pub max_symbols: usize,
    pub max_patterns: usize,
    /// Symbols processed at once
    pub concurrency: usize,
    #[serde(with = "serde_secs")]
    pub provider_timeout: Duration,
    #[serde(with = "serde_secs")]
    pub scan_timeout: Duration,
}

impl Default for ScanLimits {
    fn default() -> Self {
        Self {
            max_symbols: 50,
            max_patterns: 100,
            concurrency: 4,
            provider_timeout: Duration::from_secs(10),
            scan_timeout: Duration::from_secs(30),
        }
    }
}

// ============================================================
// PER-SYMBOL ANALYSIS
// ============================================================

enum SymbolOutcome {
    Detected(Vec<DetectionResult>),
    Filtered,
    Invalid(ValidationError),
    Failed(SymbolError),
}

/// Synchronous validate -> evaluate -> score pipeline for one series
#[derive(Clone)]
struct Analyzer {
    scorer: Arc<ConfidenceScorer>,
    validator: SeriesValidator,
}

impl Analyzer {
    fn catalog(&self) -> &PatternCatalog {
        self.scorer.catalog()
    }

    fn run(&self, symbol: &str, series: BarSeries, patterns: &[&'static str], params: &ScanParams) -> SymbolOutcome {
        let validated = match self.validator.validate_owned(series, 1) {
            Ok(v) => v,
            Err(e) => return SymbolOutcome::Invalid(e),
        };
        let Some(last) = validated.bars().last().copied() else {
            return SymbolOutcome::Filtered;
        };
        if !params.passes(&last) {
            debug!(symbol, close = last.close, volume = last.volume, "filtered out");
            return SymbolOutcome::Filtered;
        }
        let timestamp = DateTime::<Utc>::from_timestamp(last.timestamp, 0).unwrap_or_default();

        let catalog = self.catalog();
        let mut results = Vec::new();
        for &name in patterns {
            let Ok(def) = catalog.get(name) else { continue };
            // too short for this window: skip the pattern, keep the symbol
            if validated.require(def.window_size).is_err() {
                continue;
            }
            let matched = matches!(def.match_tail(validated.bars(), catalog.thresholds()), Ok(Some(_)));
            if !matched && !params.include_non_matches {
                continue;
            }
            let score = match self.scorer.score(&validated, name, matched) {
                Ok(score) => score,
                Err(e) => {
                    warn!(symbol, pattern = name, error = %e, "scoring failed");
                    continue;
                },
            };
            results.push(DetectionResult {
                symbol: symbol.to_string(),
                pattern_name: name.to_string(),
                detected: matched,
                confidence: score.rounded(),
                signal: score.signal,
                timestamp,
                contributing_factors: score.factors,
            });
        }
        SymbolOutcome::Detected(results)
    }
}

// ============================================================
// ORCHESTRATOR
// ============================================================

pub struct ScanOrchestrator {
    provider: Arc<dyn DataProvider>,
    analyzer: Analyzer,
    limits: ScanLimits,
    clock: Arc<dyn Clock>,
}

impl ScanOrchestrator {
    pub fn new(provider: Arc<dyn DataProvider>, scorer: Arc<ConfidenceScorer>, limits: ScanLimits) -> Self {
        Self {
            provider,
            analyzer: Analyzer {
                scorer,
                validator: SeriesValidator::default(),
            },
            limits,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_validator(mut self, validator: SeriesValidator) -> Self {
        self.analyzer.validator = validator;
        self
    }

    /// Clock used for the end of the requested bar range
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[inline]
    pub fn limits(&self) -> &ScanLimits {
        &self.limits
    }

    #[inline]
    pub fn catalog(&self) -> &PatternCatalog {
        self.analyzer.catalog()
    }

    /// Trim, uppercase, check format and de-duplicate symbols (first
    /// occurrence wins)
    pub fn normalize_symbols<S: AsRef<str>>(&self, symbols: &[S]) -> Result<Vec<String>, ScanError> {
        if symbols.is_empty() {
            return Err(ScanError::InvalidRequest("at least one symbol is required".into()));
        }
        if symbols.len() > self.limits.max_symbols {
            return Err(ScanError::InvalidRequest(format!(
                "{} symbols requested, at most {} allowed",
                symbols.len(),
                self.limits.max_symbols
            )));
        }
        let mut seen = HashSet::new();
        let mut out = Vec::with_capacity(symbols.len());
        for raw in symbols {
            let symbol = raw.as_ref().trim().to_uppercase();
            if !is_valid_symbol(&symbol) {
                return Err(ScanError::InvalidRequest(format!("invalid symbol: {:?}", raw.as_ref())));
            }
            if seen.insert(symbol.clone()) {
                out.push(symbol);
            }
        }
        Ok(out)
    }

    /// Resolve pattern names against the catalog, de-duplicated
    pub fn resolve_patterns<P: AsRef<str>>(&self, patterns: &[P]) -> Result<Vec<&'static str>, ScanError> {
        if patterns.is_empty() {
            return Err(ScanError::InvalidRequest("at least one pattern is required".into()));
        }
        if patterns.len() > self.limits.max_patterns {
            return Err(ScanError::InvalidRequest(format!(
                "{} patterns requested, at most {} allowed",
                patterns.len(),
                self.limits.max_patterns
            )));
        }
        let catalog = self.catalog();
        let mut out: Vec<&'static str> = Vec::with_capacity(patterns.len());
        for raw in patterns {
            let name = catalog.get(raw.as_ref().trim())?.name.as_str();
            if !out.contains(&name) {
                out.push(name);
            }
        }
        Ok(out)
    }

    /// Analyze a series the caller already holds
    pub fn analyze<P: AsRef<str>>(
        &self,
        series: &BarSeries,
        patterns: &[P],
        params: &ScanParams,
    ) -> Result<Vec<DetectionResult>, ScanError> {
        let patterns = self.resolve_patterns(patterns)?;
        params.validate()?;
        match self.analyzer.run(series.symbol(), series.clone(), &patterns, params) {
            SymbolOutcome::Detected(results) => Ok(results),
            SymbolOutcome::Filtered => Ok(Vec::new()),
            SymbolOutcome::Invalid(e) => Err(e.into()),
            SymbolOutcome::Failed(e) => Err(ScanError::Internal(e.message)),
        }
    }

    /// Scan pre-fetched series in parallel on the rayon pool
    pub fn scan_offline<P: AsRef<str>>(
        &self,
        series: &[BarSeries],
        patterns: &[P],
        params: &ScanParams,
    ) -> Result<ScanResult, ScanError> {
        let started = std::time::Instant::now();
        let patterns = self.resolve_patterns(patterns)?;
        params.validate()?;

        let outcomes: Vec<_> = series
            .par_iter()
            .map(|s| (s.symbol(), self.analyzer.run(s.symbol(), s.clone(), &patterns, params)))
            .collect();

        let mut result = ScanResult::empty();
        for (symbol, outcome) in outcomes {
            result.absorb(symbol, outcome);
        }
        result.finish(started.elapsed());
        Ok(result)
    }

    /// Fetch and scan `symbols` for `patterns`.
    ///
    /// Request problems fail the whole call before any fetch. Per-symbol
    /// problems are collected in the result. When the scan deadline passes,
    /// unfinished symbols are cancelled and the result is marked partial.
    pub async fn scan<S: AsRef<str>, P: AsRef<str>>(
        &self,
        symbols: &[S],
        patterns: &[P],
        timeframe: Timeframe,
        params: &ScanParams,
    ) -> Result<ScanResult, ScanError> {
        let started = Instant::now();
        let symbols = self.normalize_symbols(symbols)?;
        let patterns: Arc<[&'static str]> = self.resolve_patterns(patterns)?.into();
        params.validate()?;

        let deadline = started + self.limits.scan_timeout;
        let end = self.clock.now();
        let start = end - timeframe.default_lookback();
        let permits = Arc::new(Semaphore::new(self.limits.concurrency.max(1)));
        let mut result = ScanResult::empty();
        info!(scan_id = %result.scan_id, symbols = symbols.len(), patterns = patterns.len(), %timeframe, "scan started");

        let mut tasks = JoinSet::new();
        for symbol in symbols.iter().cloned() {
            let job = SymbolJob {
                provider: Arc::clone(&self.provider),
                analyzer: self.analyzer.clone(),
                permits: Arc::clone(&permits),
                patterns: Arc::clone(&patterns),
                params: params.clone(),
                provider_timeout: self.limits.provider_timeout,
                timeframe,
                start,
                end,
            };
            tasks.spawn(async move {
                let outcome = job.run(&symbol).await;
                (symbol, outcome)
            });
        }

        let mut pending: HashSet<String> = symbols.iter().cloned().collect();
        loop {
            match timeout_at(deadline, tasks.join_next()).await {
                Ok(Some(Ok((symbol, outcome)))) => {
                    pending.remove(&symbol);
                    result.absorb(&symbol, outcome);
                },
                Ok(Some(Err(e))) => warn!(scan_id = %result.scan_id, error = %e, "symbol task failed"),
                Ok(None) => break,
                Err(_) => {
                    tasks.abort_all();
                    result.partial = true;
                    warn!(scan_id = %result.scan_id, unfinished = pending.len(), "scan deadline reached");
                    break;
                },
            }
        }

        let kind = if result.partial {
            SymbolErrorKind::Cancelled
        } else {
            SymbolErrorKind::Internal
        };
        for symbol in symbols.iter().filter(|s| pending.contains(*s)) {
            let message = match kind {
                SymbolErrorKind::Cancelled => "scan deadline reached",
                _ => "symbol task aborted",
            };
            result.errors.push(SymbolError::new(symbol, kind, message));
        }

        result.finish(started.elapsed());
        info!(
            scan_id = %result.scan_id,
            results = result.results.len(),
            errors = result.errors.len(),
            partial = result.partial,
            elapsed_ms = result.elapsed.as_millis() as u64,
            "scan finished"
        );
        Ok(result)
    }
}

/// Everything one symbol task owns
struct SymbolJob {
    provider: Arc<dyn DataProvider>,
    analyzer: Analyzer,
    permits: Arc<Semaphore>,
    patterns: Arc<[&'static str]>,
    params: ScanParams,
    provider_timeout: Duration,
    timeframe: Timeframe,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl SymbolJob {
    async fn run(self, symbol: &str) -> SymbolOutcome {
        let Ok(_permit) = self.permits.acquire().await else {
            return SymbolOutcome::Failed(SymbolError::new(symbol, SymbolErrorKind::Internal, "scan closed"));
        };

        let fetched = timeout(
            self.provider_timeout,
            self.provider.get_bars(symbol, self.timeframe, self.start, self.end),
        )
        .await
        .unwrap_or(Err(ProviderError::Timeout(self.provider_timeout)));

        let series = match fetched {
            Ok(series) if series.is_empty() => {
                return SymbolOutcome::Failed(SymbolError::new(
                    symbol,
                    SymbolErrorKind::Provider,
                    ProviderError::NoData(symbol.to_string()).to_string(),
                ))
            },
            Ok(series) => series,
            Err(e) => {
                let kind = match e {
                    ProviderError::Timeout(_) => SymbolErrorKind::Timeout,
                    _ => SymbolErrorKind::Provider,
                };
                debug!(symbol, provider = self.provider.name(), error = %e, "fetch failed");
                return SymbolOutcome::Failed(SymbolError::new(symbol, kind, e.to_string()));
            },
        };

        // pattern evaluation is CPU-bound but short; keep it on this task
        self.analyzer.run(symbol, series, &self.patterns, &self.params)
    }
}

/// `^[A-Z0-9.]{1,8}$`
pub fn is_valid_symbol(symbol: &str) -> bool {
    (1..=MAX_SYMBOL_LEN).contains(&symbol.len())
        && symbol
            .bytes()
            .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit() || b == b'.')
}
