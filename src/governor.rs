//! Per-client request governor
//!
//! Sliding-window log keyed by `(tier, client)`: a request is admitted when
//! every limit of its tier still has room within its window. Rejected
//! requests are not recorded, so a client hammering a closed window does not
//! push its own reopening further out.

use std::{collections::VecDeque, fmt, str::FromStr, sync::Arc, time::Duration};

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::{
    clock::{Clock, SystemClock},
    shard::{ShardedMap, DEFAULT_LOCK_TIMEOUT, DEFAULT_SHARDS},
    PatternError,
};

/// Group of endpoints sharing one set of limits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointTier {
    /// Pattern listings, health
    Metadata,
    /// Scans
    Scan,
}

impl EndpointTier {
    pub fn as_str(self) -> &'static str {
        match self {
            EndpointTier::Metadata => "metadata",
            EndpointTier::Scan => "scan",
        }
    }
}

impl fmt::Display for EndpointTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================
// LIMITS
// ============================================================

/// `ceiling` requests per `window`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
    pub ceiling: u32,
    pub window: Duration,
}

impl RateLimit {
    pub const fn new(ceiling: u32, window: Duration) -> Self {
        Self { ceiling, window }
    }

    #[inline]
    fn window_millis(&self) -> u64 {
        self.window.as_millis() as u64
    }

    /// Parse a `;`-separated list such as `"100/hour;20/minute"`
    pub fn parse_list(s: &str) -> Result<Vec<Self>, PatternError> {
        s.split(';')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(str::parse)
            .collect()
    }
}

impl FromStr for RateLimit {
    type Err = PatternError;

    /// `"20/minute"`, `"100/hour"`, `"10/300s"`, `"1/second"`, `"500/day"`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || PatternError::InvalidConfig(format!("invalid rate limit: {s:?}"));
        let (count, per) = s.trim().split_once('/').ok_or_else(invalid)?;
        let ceiling: u32 = count.trim().parse().map_err(|_| invalid())?;
        if ceiling == 0 {
            return Err(invalid());
        }
        let per = per.trim().to_ascii_lowercase();
        let secs = match per.as_str() {
            "second" | "sec" | "s" => 1,
            "minute" | "min" | "m" => 60,
            "hour" | "h" => 3_600,
            "day" | "d" => 86_400,
            other => {
                let n = other.strip_suffix('s').ok_or_else(invalid)?;
                n.parse::<u64>().ok().filter(|n| *n > 0).ok_or_else(invalid)?
            },
        };
        Ok(Self::new(ceiling, Duration::from_secs(secs)))
    }
}

impl fmt::Display for RateLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}s", self.ceiling, self.window.as_secs())
    }
}

impl serde::Serialize for RateLimit {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(self)
    }
}

impl<'de> serde::Deserialize<'de> for RateLimit {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let s = String::deserialize(d)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Limits per tier; every limit of a tier must have room
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct TierLimits {
    pub metadata: Vec<RateLimit>,
    pub scan: Vec<RateLimit>,
}

impl Default for TierLimits {
    fn default() -> Self {
        Self {
            metadata: vec![RateLimit::new(20, Duration::from_secs(60))],
            scan: vec![RateLimit::new(10, Duration::from_secs(300))],
        }
    }
}

impl TierLimits {
    pub fn for_tier(&self, tier: EndpointTier) -> &[RateLimit] {
        match tier {
            EndpointTier::Metadata => &self.metadata,
            EndpointTier::Scan => &self.scan,
        }
    }

    fn horizon_millis(&self) -> u64 {
        self.metadata
            .iter()
            .chain(&self.scan)
            .map(RateLimit::window_millis)
            .max()
            .unwrap_or(0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("rate limit {limit} exceeded for {tier} requests, retry after {}s", .retry_after.as_secs())]
pub struct RateLimitExceeded {
    pub tier: EndpointTier,
    pub limit: RateLimit,
    pub retry_after: Duration,
}

// ============================================================
// GOVERNOR
// ============================================================

pub struct RateGovernor {
    windows: ShardedMap<VecDeque<u64>>,
    limits: TierLimits,
    clock: Arc<dyn Clock>,
}

impl Default for RateGovernor {
    fn default() -> Self {
        Self::new(TierLimits::default(), Arc::new(SystemClock))
    }
}

impl RateGovernor {
    pub fn new(limits: TierLimits, clock: Arc<dyn Clock>) -> Self {
        Self::with_shards(limits, clock, DEFAULT_SHARDS, DEFAULT_LOCK_TIMEOUT)
    }

    pub fn with_shards(limits: TierLimits, clock: Arc<dyn Clock>, shards: usize, lock_timeout: Duration) -> Self {
        Self {
            windows: ShardedMap::new(shards, lock_timeout),
            limits,
            clock,
        }
    }

    #[inline]
    pub fn limits(&self) -> &TierLimits {
        &self.limits
    }

    /// Admit a scan request for `client_id`
    pub fn admit(&self, client_id: &str) -> bool {
        self.check(client_id, EndpointTier::Scan).is_ok()
    }

    /// Admit and record one request, or report how long to wait
    pub fn check(&self, client_id: &str, tier: EndpointTier) -> Result<(), RateLimitExceeded> {
        let limits = self.limits.for_tier(tier);
        if limits.is_empty() {
            return Ok(());
        }
        let now = self.clock.now_millis();
        let horizon = self.limits.horizon_millis();
        let key = format!("{tier}:{client_id}");

        let outcome = self.windows.with_shard(&key, |map| {
            let log = map.entry(key.clone()).or_default();
            while log.front().is_some_and(|&t| now.saturating_sub(t) >= horizon) {
                log.pop_front();
            }

            let mut worst: Option<(RateLimit, Duration)> = None;
            for limit in limits {
                let window = limit.window_millis();
                let mut in_window = log.iter().filter(|&&t| now.saturating_sub(t) < window);
                let Some(&oldest) = in_window.next() else { continue };
                if 1 + in_window.count() < limit.ceiling as usize {
                    continue;
                }
                let wait = Duration::from_millis((oldest + window).saturating_sub(now));
                if worst.map_or(true, |(_, w)| wait > w) {
                    worst = Some((*limit, wait));
                }
            }

            match worst {
                Some((limit, retry_after)) => Err(RateLimitExceeded {
                    tier,
                    limit,
                    retry_after,
                }),
                None => {
                    log.push_back(now);
                    Ok(())
                },
            }
        });

        match outcome {
            Some(Err(e)) => {
                debug!(client = client_id, %tier, retry_after = ?e.retry_after, "request rejected");
                Err(e)
            },
            Some(Ok(())) => Ok(()),
            None => {
                warn!(client = client_id, %tier, "rate window busy, admitting");
                Ok(())
            },
        }
    }

    /// Drop windows with no request inside the longest window
    pub fn prune(&self) -> usize {
        let now = self.clock.now_millis();
        let horizon = self.limits.horizon_millis();
        let mut removed = 0;
        self.windows.for_each_shard(|map| {
            let before = map.len();
            map.retain(|_, log| log.back().is_some_and(|&t| now.saturating_sub(t) < horizon));
            removed += before - map.len();
        });
        removed
    }

    /// `(tier, client)` windows currently tracked
    pub fn tracked_clients(&self) -> usize {
        self.windows.len()
    }

    /// Prune every `interval` until the governor is dropped
    pub fn spawn_pruner(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let governor = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(governor) = governor.upgrade() else { break };
                let removed = governor.prune();
                if removed > 0 {
                    debug!(removed, "pruned idle rate windows");
                }
            }
        })
    }
}

// ============================================================
// TESTS
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn governor() -> (Arc<ManualClock>, RateGovernor) {
        let clock = Arc::new(ManualClock::new(1_000_000));
        (clock.clone(), RateGovernor::new(TierLimits::default(), clock))
    }

    #[test]
    fn test_ceiling_then_reject_then_resume() {
        let (clock, gov) = governor();
        for _ in 0..10 {
            assert!(gov.admit("alice"));
        }
        let err = gov.check("alice", EndpointTier::Scan).unwrap_err();
        assert_eq!(err.retry_after, Duration::from_secs(300));
        assert_eq!(err.limit, RateLimit::new(10, Duration::from_secs(300)));

        clock.advance(Duration::from_secs(300));
        assert!(gov.admit("alice"));
    }

    #[test]
    fn test_window_slides() {
        let (clock, gov) = governor();
        for _ in 0..10 {
            assert!(gov.admit("bob"));
            clock.advance(Duration::from_secs(10));
        }
        // oldest request was at t=0, now t=100
        let err = gov.check("bob", EndpointTier::Scan).unwrap_err();
        assert_eq!(err.retry_after, Duration::from_secs(200));

        clock.advance(Duration::from_secs(200));
        assert!(gov.admit("bob"));
        assert!(!gov.admit("bob"));
    }

    #[test]
    fn test_rejections_are_not_recorded() {
        let (clock, gov) = governor();
        for _ in 0..10 {
            gov.admit("carol");
        }
        for _ in 0..50 {
            assert!(!gov.admit("carol"));
        }
        clock.advance(Duration::from_secs(300));
        let admitted = (0..20).filter(|_| gov.admit("carol")).count();
        assert_eq!(admitted, 10);
    }

    #[test]
    fn test_clients_and_tiers_are_independent() {
        let (_, gov) = governor();
        for _ in 0..10 {
            gov.admit("dave");
        }
        assert!(!gov.admit("dave"));
        assert!(gov.admit("erin"));
        for _ in 0..20 {
            assert!(gov.check("dave", EndpointTier::Metadata).is_ok());
        }
        assert!(gov.check("dave", EndpointTier::Metadata).is_err());
    }

    #[test]
    fn test_stacked_limits() {
        let clock = Arc::new(ManualClock::new(0));
        let limits = TierLimits {
            metadata: vec![],
            scan: RateLimit::parse_list("3/hour;1/minute").unwrap(),
        };
        let gov = RateGovernor::new(limits, clock.clone());
        assert!(gov.admit("x"));
        assert!(!gov.admit("x"));
        clock.advance(Duration::from_secs(60));
        assert!(gov.admit("x"));
        clock.advance(Duration::from_secs(60));
        assert!(gov.admit("x"));
        clock.advance(Duration::from_secs(60));
        let err = gov.check("x", EndpointTier::Scan).unwrap_err();
        assert_eq!(err.limit.window, Duration::from_secs(3_600));
        assert_eq!(err.retry_after, Duration::from_secs(3_600 - 180));
        // no metadata limits at all
        assert!(gov.check("x", EndpointTier::Metadata).is_ok());
    }

    #[test]
    fn test_prune_idle_windows() {
        let (clock, gov) = governor();
        gov.admit("a");
        gov.check("b", EndpointTier::Metadata).unwrap();
        assert_eq!(gov.tracked_clients(), 2);
        clock.advance(Duration::from_secs(301));
        assert_eq!(gov.prune(), 2);
        assert_eq!(gov.tracked_clients(), 0);
    }

    #[test]
    fn test_busy_shard_fails_open() {
        let clock = Arc::new(ManualClock::new(0));
        let gov = RateGovernor::with_shards(TierLimits::default(), clock, 1, Duration::from_millis(1));
        let admitted = gov.windows.with_shard("held", |_| gov.admit("z")).unwrap();
        assert!(admitted);
        assert_eq!(gov.tracked_clients(), 0);
    }

    #[test]
    fn test_parse_rate_limits() {
        assert_eq!("20/minute".parse::<RateLimit>().unwrap(), RateLimit::new(20, Duration::from_secs(60)));
        assert_eq!("100/hour".parse::<RateLimit>().unwrap(), RateLimit::new(100, Duration::from_secs(3_600)));
        assert_eq!("10/300s".parse::<RateLimit>().unwrap(), RateLimit::new(10, Duration::from_secs(300)));
        assert!("0/minute".parse::<RateLimit>().is_err());
        assert!("ten/minute".parse::<RateLimit>().is_err());
        assert!("10/fortnight".parse::<RateLimit>().is_err());
        assert_eq!(RateLimit::new(10, Duration::from_secs(300)).to_string(), "10/300s");
        assert_eq!(RateLimit::parse_list("5/hour; 1/minute").unwrap().len(), 2);
    }
}
