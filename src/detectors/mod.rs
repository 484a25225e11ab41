//! Candlestick pattern matchers
//!
//! Every matcher is a pure function over exactly `window_size` trailing bars
//! returning the direction it read from them, or `None` when the formation is
//! absent. Matchers are composed from the shared primitives in [`helpers`].
//!
//! # Pattern Groups
//!
//! - **Single-bar (17)**: Doji variants, Hammer family, Marubozu, etc. Six of
//!   these read context bars before the candle (window 2 or 5).
//! - **Two-bar (15)**: Engulfing, Harami, Piercing, etc.
//! - **Three-bar (22)**: Morning/Evening Star, Three Soldiers/Crows, etc.
//! - **Multi-bar (7)**: Breakaway, Mat Hold, Rising/Falling Three Methods, etc.

use crate::{Bar, Direction};

pub mod helpers;
pub mod multi_bar;
pub mod single_bar;
pub mod three_bar;
pub mod two_bar;

pub use helpers::Thresholds;

/// Signature shared by all built-in matchers
pub type MatchFn = fn(&[Bar], &Thresholds) -> Option<Direction>;
