//! Four- and five-candle matchers
//!
//! CDL3LINESTRIKE, CDLHIKKAKEMOD, CDLBREAKAWAY, CDLCONCEALBABYSWALL, CDLLADDERBOTTOM,
//! CDLMATHOLD, CDLRISEFALL3METHODS

use super::helpers::{avg_range, body_gap_down, body_gap_up, inside_bar, Thresholds};
use crate::{Bar, Direction, OHLCVExt};

/// Three advancing candles wiped out by a fourth opposite candle
pub fn three_line_strike(bars: &[Bar], _t: &Thresholds) -> Option<Direction> {
  let [a, b, c, d] = bars else { return None };
  let dir = a.color()?;
  if b.color()? != dir || c.color()? != dir || d.color()? != dir.opposite() {
    return None;
  }
  let matched = match dir {
    Direction::Bullish => b.close > a.close && c.close > b.close && d.open > c.close && d.close < a.open,
    _ => b.close < a.close && c.close < b.close && d.open < c.close && d.close > a.open,
  };
  matched.then_some(dir)
}

/// Two nested inside bars; the third closes near the edge the breakout fakes
pub fn hikkake_mod(bars: &[Bar], t: &Thresholds) -> Option<Direction> {
  let [a, b, c, d] = bars else { return None };
  if !inside_bar(a, b) || !inside_bar(b, c) {
    return None;
  }
  let scale = avg_range(bars);
  if d.high < c.high && d.low < c.low && t.near(c.close, c.low, scale) {
    Some(Direction::Bullish)
  } else if d.high > c.high && d.low > c.low && t.near(c.close, c.high, scale) {
    Some(Direction::Bearish)
  } else {
    None
  }
}

pub fn breakaway(bars: &[Bar], t: &Thresholds) -> Option<Direction> {
  let [a, b, c, d, e] = bars else { return None };
  let trend = a.color()?;
  if !t.is_long_body(a) || b.color()? != trend || d.color()? != trend || e.color()? != trend.opposite() {
    return None;
  }
  let matched = match trend {
    Direction::Bearish => {
      body_gap_down(a, b)
        && c.high < b.high
        && c.low < b.low
        && d.high < c.high
        && d.low < c.low
        && e.close > b.open
        && e.close < a.close
    },
    _ => {
      body_gap_up(a, b)
        && c.high > b.high
        && c.low > b.low
        && d.high > c.high
        && d.low > c.low
        && e.close < b.open
        && e.close > a.close
    },
  };
  matched.then_some(trend.opposite())
}

pub fn concealing_baby_swallow(bars: &[Bar], t: &Thresholds) -> Option<Direction> {
  let [a, b, c, d] = bars else { return None };
  let black_marubozu = |x: &Bar| x.is_bearish() && t.is_long_body(x) && t.is_marubozu(x);
  (black_marubozu(a)
    && black_marubozu(b)
    && c.is_bearish()
    && body_gap_down(b, c)
    && c.high > b.close
    && d.is_bearish()
    && d.open > c.high
    && d.close < c.low)
    .then_some(Direction::Bullish)
}

pub fn ladder_bottom(bars: &[Bar], t: &Thresholds) -> Option<Direction> {
  let [a, b, c, d, e] = bars else { return None };
  let falling = [a, b, c, d].iter().all(|x| x.is_bearish())
    && b.open < a.open
    && c.open < b.open
    && b.close < a.close
    && c.close < b.close;
  (falling
    && d.upper_shadow_ratio()? > t.short_shadow
    && e.is_bullish()
    && e.open > d.open
    && e.close > d.high)
    .then_some(Direction::Bullish)
}

pub fn mat_hold(bars: &[Bar], t: &Thresholds) -> Option<Direction> {
  let [a, b, c, d, e] = bars else { return None };
  if !a.is_bullish() || !t.is_long_body(a) || !b.is_bearish() || !body_gap_up(a, b) {
    return None;
  }
  let reaction = [b, c, d];
  let floor = a.close - a.body() * t.penetration;
  let held = reaction.iter().all(|x| t.is_short_body(*x) && x.body_bottom() > floor);
  let top = reaction.iter().map(|x| x.high).fold(f64::MIN, f64::max);
  (held && e.is_bullish() && e.open > d.close && e.close > top).then_some(Direction::Bullish)
}

/// Long candle, three small counter-moves inside its range, then a long
/// candle closing beyond the first
pub fn rise_fall_three_methods(bars: &[Bar], t: &Thresholds) -> Option<Direction> {
  let [a, b, c, d, e] = bars else { return None };
  let dir = a.color()?;
  if !t.is_long_body(a) || !t.is_long_body(e) || e.color()? != dir {
    return None;
  }
  let reaction = [b, c, d];
  let contained = reaction
    .iter()
    .all(|x| t.is_short_body(*x) && x.body_top() < a.high && x.body_bottom() > a.low);
  let matched = match dir {
    Direction::Bullish => c.close < b.close && d.close < c.close && e.open > d.close && e.close > a.close,
    _ => c.close > b.close && d.close > c.close && e.open < d.close && e.close < a.close,
  };
  (contained && matched).then_some(dir)
}
