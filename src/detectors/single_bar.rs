//! Single-candle matchers
//!
//! CDLDOJI, CDLDRAGONFLYDOJI, CDLGRAVESTONEDOJI, CDLLONGLEGGEDDOJI, CDLRICKSHAWMAN,
//! CDLHAMMER, CDLHANGINGMAN, CDLINVERTEDHAMMER, CDLSHOOTINGSTAR, CDLTAKURI, CDLMARUBOZU,
//! CDLCLOSINGMARUBOZU, CDLLONGLINE, CDLSHORTLINE, CDLSPINNINGTOP, CDLHIGHWAVE, CDLBELTHOLD
//!
//! Hammer-family shapes also look at the bar before the candle, and the
//! long/short line checks compare against the prior four bodies, so a few of
//! these have a window larger than one.

use super::helpers::{avg_body, avg_range, body_gap_down, body_gap_up, Thresholds};
use crate::{Bar, Direction, OHLCVExt};

// ============================================================
// DOJI FAMILY
// ============================================================

pub fn doji(bars: &[Bar], t: &Thresholds) -> Option<Direction> {
  let [bar] = bars else { return None };
  t.is_doji(bar).then_some(Direction::Neutral)
}

pub fn dragonfly_doji(bars: &[Bar], t: &Thresholds) -> Option<Direction> {
  let [bar] = bars else { return None };
  let lower = bar.lower_shadow_ratio()?;
  (t.is_doji(bar) && t.has_short_upper_shadow(bar) && lower > t.short_shadow)
    .then_some(Direction::Bullish)
}

pub fn gravestone_doji(bars: &[Bar], t: &Thresholds) -> Option<Direction> {
  let [bar] = bars else { return None };
  let upper = bar.upper_shadow_ratio()?;
  (t.is_doji(bar) && t.has_short_lower_shadow(bar) && upper > t.short_shadow)
    .then_some(Direction::Bearish)
}

pub fn long_legged_doji(bars: &[Bar], t: &Thresholds) -> Option<Direction> {
  let [bar] = bars else { return None };
  long_legged(bar, t).then_some(Direction::Neutral)
}

/// Long-legged doji with the body in the middle of the range
pub fn rickshaw_man(bars: &[Bar], t: &Thresholds) -> Option<Direction> {
  let [bar] = bars else { return None };
  if !long_legged(bar, t) {
    return None;
  }
  // measured against the half-range: the legs already force the body toward the middle
  let mid = (bar.high + bar.low) / 2.0;
  t.near(bar.body_mid(), mid, bar.range() / 2.0).then_some(Direction::Neutral)
}

fn long_legged(bar: &Bar, t: &Thresholds) -> bool {
  t.is_doji(bar) && t.has_tall_upper_shadow(bar) && t.has_tall_lower_shadow(bar)
}

// ============================================================
// HAMMER FAMILY
// ============================================================

/// Small body on top of a long lower shadow
fn hammer_shape(bar: &Bar, t: &Thresholds) -> bool {
  t.is_short_body(bar) && t.has_long_lower_shadow(bar) && t.has_short_upper_shadow(bar)
}

/// Small body under a long upper shadow
fn inverted_shape(bar: &Bar, t: &Thresholds) -> bool {
  t.is_short_body(bar) && t.has_long_upper_shadow(bar) && t.has_short_lower_shadow(bar)
}

/// Hammer shape with the body at or below the prior low
pub fn hammer(bars: &[Bar], t: &Thresholds) -> Option<Direction> {
  let [prev, cur] = bars else { return None };
  let scale = avg_range(bars);
  (hammer_shape(cur, t) && cur.body_bottom() <= prev.low + t.near * scale)
    .then_some(Direction::Bullish)
}

/// Hammer shape printed at or above the prior high
pub fn hanging_man(bars: &[Bar], t: &Thresholds) -> Option<Direction> {
  let [prev, cur] = bars else { return None };
  let scale = avg_range(bars);
  (hammer_shape(cur, t) && cur.body_bottom() >= prev.high - t.near * scale)
    .then_some(Direction::Bearish)
}

pub fn inverted_hammer(bars: &[Bar], t: &Thresholds) -> Option<Direction> {
  let [prev, cur] = bars else { return None };
  (inverted_shape(cur, t) && body_gap_down(prev, cur)).then_some(Direction::Bullish)
}

pub fn shooting_star(bars: &[Bar], t: &Thresholds) -> Option<Direction> {
  let [prev, cur] = bars else { return None };
  (inverted_shape(cur, t) && body_gap_up(prev, cur)).then_some(Direction::Bearish)
}

/// Dragonfly doji whose lower shadow dominates the range
pub fn takuri(bars: &[Bar], t: &Thresholds) -> Option<Direction> {
  let [bar] = bars else { return None };
  let lower = bar.lower_shadow_ratio()?;
  (t.is_doji(bar) && t.has_short_upper_shadow(bar) && lower >= t.dominant_shadow)
    .then_some(Direction::Bullish)
}

// ============================================================
// LONG BODIES
// ============================================================

pub fn marubozu(bars: &[Bar], t: &Thresholds) -> Option<Direction> {
  let [bar] = bars else { return None };
  if t.is_long_body(bar) && t.is_marubozu(bar) {
    bar.color()
  } else {
    None
  }
}

pub fn closing_marubozu(bars: &[Bar], t: &Thresholds) -> Option<Direction> {
  let [bar] = bars else { return None };
  if t.is_long_body(bar) && t.closes_on_extreme(bar) {
    bar.color()
  } else {
    None
  }
}

pub fn belt_hold(bars: &[Bar], t: &Thresholds) -> Option<Direction> {
  let [bar] = bars else { return None };
  if t.is_long_body(bar) && t.opens_on_extreme(bar) {
    bar.color()
  } else {
    None
  }
}

/// Long body that also outsizes the four bodies before it
pub fn long_line(bars: &[Bar], t: &Thresholds) -> Option<Direction> {
  let (cur, prior) = bars.split_last()?;
  if prior.is_empty() || !t.is_long_body(cur) || cur.body() <= avg_body(prior) {
    return None;
  }
  cur.color()
}

/// Small candle relative to both its own range and the bars before it
pub fn short_line(bars: &[Bar], t: &Thresholds) -> Option<Direction> {
  let (cur, prior) = bars.split_last()?;
  if prior.is_empty() || t.is_doji(cur) || !t.is_short_body(cur) {
    return None;
  }
  (cur.body() < avg_body(prior) && cur.range() < avg_range(prior)).then_some(Direction::Neutral)
}

// ============================================================
// SMALL BODIES WITH SHADOWS
// ============================================================

pub fn spinning_top(bars: &[Bar], t: &Thresholds) -> Option<Direction> {
  let [bar] = bars else { return None };
  let body = bar.body();
  (t.is_short_body(bar) && !t.is_doji(bar) && bar.upper_shadow() > body && bar.lower_shadow() > body)
    .then_some(Direction::Neutral)
}

pub fn high_wave(bars: &[Bar], t: &Thresholds) -> Option<Direction> {
  let [bar] = bars else { return None };
  (t.is_short_body(bar)
    && !t.is_doji(bar)
    && t.has_long_upper_shadow(bar)
    && t.has_long_lower_shadow(bar)
    && t.has_tall_upper_shadow(bar)
    && t.has_tall_lower_shadow(bar))
    .then_some(Direction::Neutral)
}
