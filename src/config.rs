//! Scanner configuration
//!
//! Resolution order: built-in defaults, then a TOML file, then `CANDLESCAN_*`
//! environment variables. [`ScannerConfig::validate`] runs last.
//!
//! ```toml
//! [scan]
//! max_symbols = 25
//! scan_timeout = 20
//!
//! [cache.ttls]
//! scan_result = 600
//!
//! [rate_limits]
//! scan = ["10/300s"]
//! metadata = ["100/hour", "20/minute"]
//! ```

use std::{path::Path, time::Duration};

use tracing::{debug, info};

use crate::{
    cache::CacheTtls,
    clock::serde_secs,
    detectors::Thresholds,
    governor::{RateLimit, TierLimits},
    scan::ScanLimits,
    scoring::ScoringConfig,
    validator::SeriesValidator,
    PatternError,
};

pub const ENV_PREFIX: &str = "CANDLESCAN_";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid value for {var}: {value:?}")]
    Env { var: String, value: String },

    #[error(transparent)]
    Invalid(#[from] PatternError),
}

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// `false` swaps the memory store for one that never hits
    pub enabled: bool,
    pub shards: usize,
    pub ttls: CacheTtls,
    #[serde(with = "serde_secs")]
    pub sweep_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            shards: 16,
            ttls: CacheTtls::default(),
            sweep_interval: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScannerConfig {
    pub thresholds: Thresholds,
    pub scoring: ScoringConfig,
    pub validator: SeriesValidator,
    pub scan: ScanLimits,
    pub cache: CacheConfig,
    pub rate_limits: TierLimits,
    #[serde(with = "serde_secs")]
    pub prune_interval: Duration,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            thresholds: Thresholds::default(),
            scoring: ScoringConfig::default(),
            validator: SeriesValidator::default(),
            scan: ScanLimits::default(),
            cache: CacheConfig::default(),
            rate_limits: TierLimits::default(),
            prune_interval: Duration::from_secs(60),
        }
    }
}

impl ScannerConfig {
    pub fn builder() -> ScannerConfigBuilder {
        ScannerConfigBuilder::default()
    }

    /// Parse TOML; missing sections keep their defaults
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config = Self::from_toml_str(&text)?;
        info!(path = %path.display(), "loaded scanner config");
        Ok(config)
    }

    /// Defaults, optional file, environment, validation
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(p) => Self::from_file(p)?,
            None => Self::default(),
        };
        let config = config.with_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `CANDLESCAN_*` variables from the process environment
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.apply_env(std::env::vars())
    }

    /// Apply overrides from `vars`; unrelated names are ignored
    pub fn apply_env<I, K, V>(mut self, vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (key, value) in vars {
            let Some(name) = key.as_ref().strip_prefix(ENV_PREFIX) else { continue };
            let value = value.as_ref().trim();
            let bad = || ConfigError::Env {
                var: key.as_ref().to_string(),
                value: value.to_string(),
            };
            let secs = || value.parse::<u64>().map(Duration::from_secs).map_err(|_| bad());
            match name {
                "MAX_SYMBOLS" => self.scan.max_symbols = value.parse().map_err(|_| bad())?,
                "MAX_PATTERNS" => self.scan.max_patterns = value.parse().map_err(|_| bad())?,
                "CONCURRENCY" => self.scan.concurrency = value.parse().map_err(|_| bad())?,
                "PROVIDER_TIMEOUT_SECS" => self.scan.provider_timeout = secs()?,
                "SCAN_TIMEOUT_SECS" => self.scan.scan_timeout = secs()?,
                "CACHE_ENABLED" => self.cache.enabled = value.parse().map_err(|_| bad())?,
                "CACHE_BARS_TTL_SECS" => self.cache.ttls.market_bars = secs()?,
                "CACHE_SCAN_TTL_SECS" => self.cache.ttls.scan_result = secs()?,
                "CACHE_CATALOG_TTL_SECS" => self.cache.ttls.pattern_catalog = secs()?,
                "SCAN_RATE_LIMIT" => self.rate_limits.scan = RateLimit::parse_list(value).map_err(|_| bad())?,
                "METADATA_RATE_LIMIT" => {
                    self.rate_limits.metadata = RateLimit::parse_list(value).map_err(|_| bad())?
                },
                _ => {
                    debug!(var = key.as_ref(), "ignoring unknown config variable");
                    continue;
                },
            }
            debug!(var = key.as_ref(), "config override from environment");
        }
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), PatternError> {
        self.thresholds.validate()?;
        self.scoring.validate()?;

        let positive = [
            ("scan.max_symbols", self.scan.max_symbols),
            ("scan.max_patterns", self.scan.max_patterns),
            ("scan.concurrency", self.scan.concurrency),
            ("cache.shards", self.cache.shards),
            ("validator.volume_window", self.validator.volume_window),
        ];
        for (field, value) in positive {
            if value == 0 {
                return Err(PatternError::InvalidConfig(format!("{field} must be > 0")));
            }
        }
        if self.scan.provider_timeout.is_zero() || self.scan.scan_timeout.is_zero() {
            return Err(PatternError::InvalidConfig("scan timeouts must be > 0".into()));
        }
        let ratio = self.validator.empty_volume_ratio;
        if !(0.0..=1.0).contains(&ratio) {
            return Err(PatternError::OutOfRange {
                field: "validator.empty_volume_ratio",
                value: ratio,
                min: 0.0,
                max: 1.0,
            });
        }
        Ok(())
    }
}

/// Builder for [`ScannerConfig`]
#[derive(Debug, Default)]
pub struct ScannerConfigBuilder {
    config: ScannerConfig,
}

impl ScannerConfigBuilder {
    pub fn thresholds(mut self, thresholds: Thresholds) -> Self {
        self.config.thresholds = thresholds;
        self
    }

    pub fn scoring(mut self, scoring: ScoringConfig) -> Self {
        self.config.scoring = scoring;
        self
    }

    pub fn validator(mut self, validator: SeriesValidator) -> Self {
        self.config.validator = validator;
        self
    }

    pub fn max_symbols(mut self, n: usize) -> Self {
        self.config.scan.max_symbols = n;
        self
    }

    pub fn max_patterns(mut self, n: usize) -> Self {
        self.config.scan.max_patterns = n;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.scan.concurrency = n;
        self
    }

    pub fn provider_timeout(mut self, timeout: Duration) -> Self {
        self.config.scan.provider_timeout = timeout;
        self
    }

    pub fn scan_timeout(mut self, timeout: Duration) -> Self {
        self.config.scan.scan_timeout = timeout;
        self
    }

    pub fn cache_enabled(mut self, enabled: bool) -> Self {
        self.config.cache.enabled = enabled;
        self
    }

    pub fn cache_ttls(mut self, ttls: CacheTtls) -> Self {
        self.config.cache.ttls = ttls;
        self
    }

    pub fn scan_limits(mut self, limits: Vec<RateLimit>) -> Self {
        self.config.rate_limits.scan = limits;
        self
    }

    pub fn metadata_limits(mut self, limits: Vec<RateLimit>) -> Self {
        self.config.rate_limits.metadata = limits;
        self
    }

    pub fn build(self) -> Result<ScannerConfig, PatternError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
