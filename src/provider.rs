//! Market data port
//!
//! The engine never fetches prices itself. Callers plug in a
//! [`DataProvider`]; [`FallbackProvider`] chains several sources in priority
//! order and [`CachingProvider`] memoizes bars in the [`ResultCache`].
//!
//! ```rust
//! # use candlescan::{provider::{DataProvider, ProviderError}, timeframe::Timeframe, BarSeries};
//! # use async_trait::async_trait;
//! # use chrono::{DateTime, Utc};
//! struct Fixture;
//!
//! #[async_trait]
//! impl DataProvider for Fixture {
//!     async fn get_bars(
//!         &self,
//!         symbol: &str,
//!         _timeframe: Timeframe,
//!         _start: DateTime<Utc>,
//!         _end: DateTime<Utc>,
//!     ) -> Result<BarSeries, ProviderError> {
//!         Err(ProviderError::NoData(symbol.to_string()))
//!     }
//! }
//! ```

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::{
    cache::{ResultCache, ValueCategory},
    timeframe::Timeframe,
    BarSeries,
};

/// Errors a data source may report. Folded into per-symbol errors by a scan.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    #[error("provider timed out after {0:?}")]
    Timeout(Duration),

    #[error("provider unavailable: {0}")]
    Unavailable(String),

    #[error("no data for {0}")]
    NoData(String),

    #[error("malformed provider response: {0}")]
    Malformed(String),
}

#[async_trait]
pub trait DataProvider: Send + Sync {
    /// Label used in logs
    fn name(&self) -> &str {
        "provider"
    }

    /// Bars for `symbol` between `start` and `end`, oldest first
    async fn get_bars(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<BarSeries, ProviderError>;
}

// ============================================================
// FALLBACK
// ============================================================

/// Tries each provider in order until one returns a non-empty series
pub struct FallbackProvider {
    providers: Vec<Arc<dyn DataProvider>>,
}

impl FallbackProvider {
    pub fn new(providers: Vec<Arc<dyn DataProvider>>) -> Self {
        Self { providers }
    }
}

#[async_trait]
impl DataProvider for FallbackProvider {
    fn name(&self) -> &str {
        "fallback"
    }

    async fn get_bars(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<BarSeries, ProviderError> {
        let mut last_err = ProviderError::Unavailable("no providers configured".into());
        for provider in &self.providers {
            match provider.get_bars(symbol, timeframe, start, end).await {
                Ok(series) if !series.is_empty() => {
                    debug!(provider = provider.name(), symbol, bars = series.len(), "fetched bars");
                    return Ok(series);
                },
                Ok(_) => {
                    warn!(provider = provider.name(), symbol, "empty response, trying next provider");
                    last_err = ProviderError::NoData(symbol.to_string());
                },
                Err(e) => {
                    warn!(provider = provider.name(), symbol, error = %e, "fetch failed, trying next provider");
                    last_err = e;
                },
            }
        }
        Err(last_err)
    }
}

// ============================================================
// CACHING
// ============================================================

/// Serves bars from the result cache under the `MarketBars` TTL
pub struct CachingProvider {
    inner: Arc<dyn DataProvider>,
    cache: Arc<ResultCache>,
}

impl CachingProvider {
    pub fn new(inner: Arc<dyn DataProvider>, cache: Arc<ResultCache>) -> Self {
        Self { inner, cache }
    }
}

#[async_trait]
impl DataProvider for CachingProvider {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn get_bars(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<BarSeries, ProviderError> {
        let key = ResultCache::bars_key(symbol, timeframe, start, end);
        if let Some(series) = self.cache.get::<BarSeries>(&key) {
            return Ok(series);
        }
        let series = self.inner.get_bars(symbol, timeframe, start, end).await?;
        self.cache.put(&key, &series, ValueCategory::MarketBars);
        Ok(series)
    }
}
