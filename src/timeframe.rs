//! Bar timeframes and how much history a scan requests for each.

use std::{fmt, str::FromStr, time::Duration};

use crate::PatternError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Timeframe {
    #[serde(rename = "1Min")]
    Min1,
    #[serde(rename = "5Min")]
    Min5,
    #[serde(rename = "15Min")]
    Min15,
    #[serde(rename = "1Hour")]
    Hour1,
    #[default]
    #[serde(rename = "1Day")]
    Day1,
    #[serde(rename = "1Week")]
    Week1,
}

impl Timeframe {
    pub const ALL: [Timeframe; 6] = [
        Timeframe::Min1,
        Timeframe::Min5,
        Timeframe::Min15,
        Timeframe::Hour1,
        Timeframe::Day1,
        Timeframe::Week1,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Timeframe::Min1 => "1Min",
            Timeframe::Min5 => "5Min",
            Timeframe::Min15 => "15Min",
            Timeframe::Hour1 => "1Hour",
            Timeframe::Day1 => "1Day",
            Timeframe::Week1 => "1Week",
        }
    }

    /// Length of one bar
    pub fn bar_duration(self) -> Duration {
        const MIN: u64 = 60;
        Duration::from_secs(match self {
            Timeframe::Min1 => MIN,
            Timeframe::Min5 => 5 * MIN,
            Timeframe::Min15 => 15 * MIN,
            Timeframe::Hour1 => 60 * MIN,
            Timeframe::Day1 => 24 * 60 * MIN,
            Timeframe::Week1 => 7 * 24 * 60 * MIN,
        })
    }

    /// History requested from the provider when a scan gives no range
    pub fn default_lookback(self) -> chrono::Duration {
        chrono::Duration::days(match self {
            Timeframe::Min1 => 2,
            Timeframe::Min5 => 7,
            Timeframe::Min15 => 14,
            Timeframe::Hour1 => 60,
            Timeframe::Day1 => 365,
            Timeframe::Week1 => 3 * 365,
        })
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Timeframe {
    type Err = PatternError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Timeframe::ALL
            .into_iter()
            .find(|tf| tf.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| PatternError::InvalidConfig(format!("unknown timeframe: {s}")))
    }
}
