//! Pattern catalog: the immutable name -> definition registry
//!
//! Built-in definitions come from static tables generated by
//! `pattern_table!`; callers can register their own formations through the
//! [`PatternMatcher`] trait before the catalog is frozen by
//! [`CatalogBuilder::build`].

use std::{collections::HashMap, fmt, sync::Arc};

use crate::{
    detectors::{multi_bar, single_bar, three_bar, two_bar, MatchFn, Thresholds},
    Bar, BarSeries, Category, Direction, PatternError, PatternId, Result,
};

/// Largest window any formation may ask for
pub const MAX_WINDOW: usize = 5;

// ============================================================
// MATCHERS
// ============================================================

/// Object-safe matcher for formations registered at runtime
pub trait PatternMatcher: Send + Sync {
    /// Bars the matcher needs; it always receives exactly this many
    fn window_size(&self) -> usize;

    /// Direction read from the window, `None` when the formation is absent
    fn matches(&self, window: &[Bar], thresholds: &Thresholds) -> Option<Direction>;
}

#[derive(Clone)]
enum Matcher {
    // Fast path: plain function pointer, no vtable
    Builtin(MatchFn),
    Custom(Arc<dyn PatternMatcher>),
}

impl fmt::Debug for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Matcher::Builtin(_) => f.write_str("Builtin"),
            Matcher::Custom(_) => f.write_str("Custom"),
        }
    }
}

// ============================================================
// DEFINITIONS
// ============================================================

/// One row of a built-in table
#[derive(Clone, Copy)]
struct BuiltinPattern {
    name: &'static str,
    display_name: &'static str,
    pattern_type: Direction,
    category: Category,
    window_size: usize,
    matcher: MatchFn,
}

/// A named formation and how to recognise it
#[derive(Debug, Clone)]
pub struct PatternDefinition {
    pub name: PatternId,
    pub display_name: &'static str,
    /// `Neutral` for two-sided formations; the matched bars pick the side
    pub pattern_type: Direction,
    pub category: Category,
    pub window_size: usize,
    matcher: Matcher,
}

impl From<&BuiltinPattern> for PatternDefinition {
    fn from(row: &BuiltinPattern) -> Self {
        Self {
            name: PatternId(row.name),
            display_name: row.display_name,
            pattern_type: row.pattern_type,
            category: row.category,
            window_size: row.window_size,
            matcher: Matcher::Builtin(row.matcher),
        }
    }
}

impl PatternDefinition {
    /// Wrap a runtime matcher; the window comes from the matcher itself
    pub fn custom<M: PatternMatcher + 'static>(
        name: &'static str,
        display_name: &'static str,
        pattern_type: Direction,
        category: Category,
        matcher: M,
    ) -> Self {
        Self {
            name: PatternId(name),
            display_name,
            pattern_type,
            category,
            window_size: matcher.window_size(),
            matcher: Matcher::Custom(Arc::new(matcher)),
        }
    }

    /// True for formations registered as `Neutral` that still resolve a side
    pub fn is_two_sided(&self) -> bool {
        self.pattern_type == Direction::Neutral && self.category != Category::Indecision
    }

    /// Run the matcher over the trailing `window_size` bars of `bars`.
    ///
    /// Indecision formations always read as `Neutral`.
    pub fn match_tail(&self, bars: &[Bar], thresholds: &Thresholds) -> Result<Option<Direction>> {
        if bars.len() < self.window_size {
            return Err(PatternError::InsufficientData {
                need: self.window_size,
                got: bars.len(),
            });
        }
        let window = &bars[bars.len() - self.window_size..];
        let found = match &self.matcher {
            Matcher::Builtin(f) => f(window, thresholds),
            Matcher::Custom(m) => m.matches(window, thresholds),
        };
        Ok(found.map(|dir| match self.category {
            Category::Indecision => Direction::Neutral,
            _ => dir,
        }))
    }

    pub fn info(&self) -> PatternInfo {
        PatternInfo {
            name: self.name.as_str().to_string(),
            display_name: self.display_name.to_string(),
            pattern_type: self.pattern_type,
            category: self.category,
            window_size: self.window_size,
        }
    }
}

/// Serializable description of a catalog entry
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PatternInfo {
    pub name: String,
    pub display_name: String,
    #[serde(rename = "type")]
    pub pattern_type: Direction,
    pub category: Category,
    pub window_size: usize,
}

// ============================================================
// BUILT-IN TABLES - generated via macro
// ============================================================

macro_rules! pattern_table {
    (
        $(
            $name:literal, $display:literal, $ty:ident, $cat:ident, $window:literal => $matcher:path;
        )*
    ) => {
        &[
            $(BuiltinPattern {
                name: $name,
                display_name: $display,
                pattern_type: Direction::$ty,
                category: Category::$cat,
                window_size: $window,
                matcher: $matcher,
            }),*
        ]
    };
}

static SINGLE_BAR: &[BuiltinPattern] = pattern_table! {
    "CDLDOJI", "Doji", Neutral, Indecision, 1 => single_bar::doji;
    "CDLDRAGONFLYDOJI", "Dragonfly Doji", Bullish, Reversal, 1 => single_bar::dragonfly_doji;
    "CDLGRAVESTONEDOJI", "Gravestone Doji", Bearish, Reversal, 1 => single_bar::gravestone_doji;
    "CDLLONGLEGGEDDOJI", "Long Legged Doji", Neutral, Indecision, 1 => single_bar::long_legged_doji;
    "CDLRICKSHAWMAN", "Rickshaw Man", Neutral, Indecision, 1 => single_bar::rickshaw_man;
    "CDLHAMMER", "Hammer", Bullish, Reversal, 2 => single_bar::hammer;
    "CDLHANGINGMAN", "Hanging Man", Bearish, Reversal, 2 => single_bar::hanging_man;
    "CDLINVERTEDHAMMER", "Inverted Hammer", Bullish, Reversal, 2 => single_bar::inverted_hammer;
    "CDLSHOOTINGSTAR", "Shooting Star", Bearish, Reversal, 2 => single_bar::shooting_star;
    "CDLTAKURI", "Takuri", Bullish, Reversal, 1 => single_bar::takuri;
    "CDLMARUBOZU", "Marubozu", Neutral, Continuation, 1 => single_bar::marubozu;
    "CDLCLOSINGMARUBOZU", "Closing Marubozu", Neutral, Continuation, 1 => single_bar::closing_marubozu;
    "CDLLONGLINE", "Long Line Candle", Neutral, Continuation, 5 => single_bar::long_line;
    "CDLSHORTLINE", "Short Line Candle", Neutral, Indecision, 5 => single_bar::short_line;
    "CDLSPINNINGTOP", "Spinning Top", Neutral, Indecision, 1 => single_bar::spinning_top;
    "CDLHIGHWAVE", "High-Wave Candle", Neutral, Indecision, 1 => single_bar::high_wave;
    "CDLBELTHOLD", "Belt-hold", Neutral, Reversal, 1 => single_bar::belt_hold;
};

static TWO_BAR: &[BuiltinPattern] = pattern_table! {
    "CDLENGULFING", "Engulfing Pattern", Neutral, Reversal, 2 => two_bar::engulfing;
    "CDLHARAMI", "Harami Pattern", Neutral, Reversal, 2 => two_bar::harami;
    "CDLHARAMICROSS", "Harami Cross Pattern", Neutral, Reversal, 2 => two_bar::harami_cross;
    "CDLPIERCING", "Piercing Pattern", Bullish, Reversal, 2 => two_bar::piercing;
    "CDLDARKCLOUDCOVER", "Dark Cloud Cover", Bearish, Reversal, 2 => two_bar::dark_cloud_cover;
    "CDLDOJISTAR", "Doji Star", Neutral, Reversal, 2 => two_bar::doji_star;
    "CDLCOUNTERATTACK", "Counterattack", Neutral, Reversal, 2 => two_bar::counterattack;
    "CDLINNECK", "In-Neck Pattern", Bearish, Continuation, 2 => two_bar::in_neck;
    "CDLONNECK", "On-Neck Pattern", Bearish, Continuation, 2 => two_bar::on_neck;
    "CDLTHRUSTING", "Thrusting Pattern", Bearish, Continuation, 2 => two_bar::thrusting;
    "CDLKICKING", "Kicking", Neutral, Reversal, 2 => two_bar::kicking;
    "CDLKICKINGBYLENGTH", "Kicking - bull/bear determined by the longer marubozu", Neutral, Reversal, 2 => two_bar::kicking_by_length;
    "CDLMATCHINGLOW", "Matching Low", Bullish, Reversal, 2 => two_bar::matching_low;
    "CDLHOMINGPIGEON", "Homing Pigeon", Bullish, Reversal, 2 => two_bar::homing_pigeon;
    "CDLSEPARATINGLINES", "Separating Lines", Neutral, Continuation, 2 => two_bar::separating_lines;
};

static THREE_BAR: &[BuiltinPattern] = pattern_table! {
    "CDL2CROWS", "Two Crows", Bearish, Reversal, 3 => three_bar::two_crows;
    "CDL3BLACKCROWS", "Three Black Crows", Bearish, Reversal, 3 => three_bar::three_black_crows;
    "CDL3WHITESOLDIERS", "Three Advancing White Soldiers", Bullish, Reversal, 3 => three_bar::three_white_soldiers;
    "CDL3INSIDE", "Three Inside Up/Down", Neutral, Reversal, 3 => three_bar::three_inside;
    "CDL3OUTSIDE", "Three Outside Up/Down", Neutral, Reversal, 3 => three_bar::three_outside;
    "CDL3STARSINSOUTH", "Three Stars In The South", Bullish, Reversal, 3 => three_bar::three_stars_in_south;
    "CDLMORNINGSTAR", "Morning Star", Bullish, Reversal, 3 => three_bar::morning_star;
    "CDLEVENINGSTAR", "Evening Star", Bearish, Reversal, 3 => three_bar::evening_star;
    "CDLMORNINGDOJISTAR", "Morning Doji Star", Bullish, Reversal, 3 => three_bar::morning_doji_star;
    "CDLEVENINGDOJISTAR", "Evening Doji Star", Bearish, Reversal, 3 => three_bar::evening_doji_star;
    "CDLABANDONEDBABY", "Abandoned Baby", Neutral, Reversal, 3 => three_bar::abandoned_baby;
    "CDLUPSIDEGAP2CROWS", "Upside Gap Two Crows", Bearish, Reversal, 3 => three_bar::upside_gap_two_crows;
    "CDLIDENTICAL3CROWS", "Identical Three Crows", Bearish, Reversal, 3 => three_bar::identical_three_crows;
    "CDLADVANCEBLOCK", "Advance Block", Bearish, Reversal, 3 => three_bar::advance_block;
    "CDLSTALLEDPATTERN", "Stalled Pattern", Bearish, Reversal, 3 => three_bar::stalled_pattern;
    "CDLSTICKSANDWICH", "Stick Sandwich", Bullish, Reversal, 3 => three_bar::stick_sandwich;
    "CDLTASUKIGAP", "Tasuki Gap", Neutral, Continuation, 3 => three_bar::tasuki_gap;
    "CDLTRISTAR", "Tristar Pattern", Neutral, Reversal, 3 => three_bar::tristar;
    "CDLUNIQUE3RIVER", "Unique 3 River", Bullish, Reversal, 3 => three_bar::unique_three_river;
    "CDLGAPSIDESIDEWHITE", "Up/Down-gap side-by-side white lines", Neutral, Continuation, 3 => three_bar::gap_side_side_white;
    "CDLXSIDEGAP3METHODS", "Upside/Downside Gap Three Methods", Neutral, Continuation, 3 => three_bar::x_side_gap_three_methods;
    "CDLHIKKAKE", "Hikkake Pattern", Neutral, Reversal, 3 => three_bar::hikkake;
};

static MULTI_BAR: &[BuiltinPattern] = pattern_table! {
    "CDL3LINESTRIKE", "Three-Line Strike", Neutral, Continuation, 4 => multi_bar::three_line_strike;
    "CDLHIKKAKEMOD", "Modified Hikkake Pattern", Neutral, Reversal, 4 => multi_bar::hikkake_mod;
    "CDLBREAKAWAY", "Breakaway", Neutral, Reversal, 5 => multi_bar::breakaway;
    "CDLCONCEALBABYSWALL", "Concealing Baby Swallow", Bullish, Reversal, 4 => multi_bar::concealing_baby_swallow;
    "CDLLADDERBOTTOM", "Ladder Bottom", Bullish, Reversal, 5 => multi_bar::ladder_bottom;
    "CDLMATHOLD", "Mat Hold", Bullish, Continuation, 5 => multi_bar::mat_hold;
    "CDLRISEFALL3METHODS", "Rising/Falling Three Methods", Neutral, Continuation, 5 => multi_bar::rise_fall_three_methods;
};

// ============================================================
// CATALOG
// ============================================================

/// Immutable registry of pattern definitions keyed by unique name
#[derive(Debug, Clone)]
pub struct PatternCatalog {
    patterns: Vec<PatternDefinition>,
    index: HashMap<&'static str, usize>,
    thresholds: Thresholds,
}

impl PatternCatalog {
    pub fn builder() -> CatalogBuilder {
        CatalogBuilder::new()
    }

    /// Catalog with every built-in formation and default thresholds
    pub fn with_defaults() -> Result<Self> {
        CatalogBuilder::new().with_all_defaults().build()
    }

    pub fn get(&self, name: &str) -> Result<&PatternDefinition> {
        self.index
            .get(name)
            .map(|&i| &self.patterns[i])
            .ok_or_else(|| PatternError::UnknownPattern(name.to_string()))
    }

    #[inline]
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PatternDefinition> {
        self.patterns.iter()
    }

    #[inline]
    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    /// Widest window among registered formations
    pub fn max_window(&self) -> usize {
        self.patterns.iter().map(|p| p.window_size).max().unwrap_or(0)
    }

    /// Metadata for every entry, sorted by name
    pub fn describe(&self) -> Vec<PatternInfo> {
        let mut infos: Vec<_> = self.patterns.iter().map(PatternDefinition::info).collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        infos
    }

    /// Does `pattern_name` appear at the end of `series`?
    pub fn evaluate(&self, pattern_name: &str, series: &BarSeries) -> Result<bool> {
        Ok(self.evaluate_direction(pattern_name, series)?.is_some())
    }

    /// Like [`evaluate`](Self::evaluate) but keeps the side the bars resolved to
    pub fn evaluate_direction(&self, pattern_name: &str, series: &BarSeries) -> Result<Option<Direction>> {
        self.get(pattern_name)?.match_tail(series.bars(), &self.thresholds)
    }
}

// ============================================================
// BUILDER
// ============================================================

/// Builder for [`PatternCatalog`]
#[derive(Debug, Clone, Default)]
pub struct CatalogBuilder {
    patterns: Vec<PatternDefinition>,
    thresholds: Thresholds,
}

impl CatalogBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add all 61 built-in formations
    pub fn with_all_defaults(self) -> Self {
        self.with_single_bar_defaults()
            .with_two_bar_defaults()
            .with_three_bar_defaults()
            .with_multi_bar_defaults()
    }

    /// Add single-candle formations (17). The hammer family reads one prior
    /// bar and the long/short lines four, so their windows are 2 and 5.
    pub fn with_single_bar_defaults(self) -> Self {
        self.extend(SINGLE_BAR)
    }

    /// Add two-candle formations (15)
    pub fn with_two_bar_defaults(self) -> Self {
        self.extend(TWO_BAR)
    }

    /// Add three-candle formations (22)
    pub fn with_three_bar_defaults(self) -> Self {
        self.extend(THREE_BAR)
    }

    /// Add four- and five-candle formations (7)
    pub fn with_multi_bar_defaults(self) -> Self {
        self.extend(MULTI_BAR)
    }

    fn extend(mut self, table: &[BuiltinPattern]) -> Self {
        self.patterns.extend(table.iter().map(PatternDefinition::from));
        self
    }

    /// Add a definition
    #[allow(clippy::should_implement_trait)]
    pub fn add(mut self, definition: PatternDefinition) -> Self {
        self.patterns.push(definition);
        self
    }

    /// Register a runtime matcher (slow path, dynamic dispatch)
    pub fn add_custom<M: PatternMatcher + 'static>(
        self,
        name: &'static str,
        display_name: &'static str,
        pattern_type: Direction,
        category: Category,
        matcher: M,
    ) -> Self {
        self.add(PatternDefinition::custom(name, display_name, pattern_type, category, matcher))
    }

    pub fn thresholds(mut self, thresholds: Thresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    /// Freeze the catalog. Names must be unique and windows within `1..=MAX_WINDOW`.
    pub fn build(self) -> Result<PatternCatalog> {
        self.thresholds.validate()?;

        let mut index = HashMap::with_capacity(self.patterns.len());
        for (i, p) in self.patterns.iter().enumerate() {
            if p.window_size == 0 || p.window_size > MAX_WINDOW {
                return Err(PatternError::InvalidConfig(format!(
                    "{} window {} outside 1..={MAX_WINDOW}",
                    p.name, p.window_size
                )));
            }
            if index.insert(p.name.as_str(), i).is_some() {
                return Err(PatternError::DuplicatePattern(p.name.as_str()));
            }
        }

        Ok(PatternCatalog {
            patterns: self.patterns,
            index,
            thresholds: self.thresholds,
        })
    }
}

// ============================================================
// TESTS
// ============================================================
