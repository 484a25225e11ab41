//! Three-candle matchers
//!
//! CDL2CROWS, CDL3BLACKCROWS, CDL3WHITESOLDIERS, CDL3INSIDE, CDL3OUTSIDE, CDL3STARSINSOUTH,
//! CDLMORNINGSTAR, CDLEVENINGSTAR, CDLMORNINGDOJISTAR, CDLEVENINGDOJISTAR, CDLABANDONEDBABY,
//! CDLUPSIDEGAP2CROWS, CDLIDENTICAL3CROWS, CDLADVANCEBLOCK, CDLSTALLEDPATTERN,
//! CDLSTICKSANDWICH, CDLTASUKIGAP, CDLTRISTAR, CDLUNIQUE3RIVER, CDLGAPSIDESIDEWHITE,
//! CDLXSIDEGAP3METHODS, CDLHIKKAKE

use super::{
  helpers::{avg_range, body_gap_down, body_gap_up, body_inside, gap_down, gap_up, inside_bar, Thresholds},
  two_bar,
};
use crate::{Bar, Direction, OHLCVExt};

// ============================================================
// CROWS AND SOLDIERS
// ============================================================

pub fn two_crows(bars: &[Bar], t: &Thresholds) -> Option<Direction> {
  let [a, b, c] = bars else { return None };
  (a.is_bullish()
    && t.is_long_body(a)
    && b.is_bearish()
    && body_gap_up(a, b)
    && c.is_bearish()
    && c.open < b.open
    && c.open > b.close
    && c.close > a.open
    && c.close < a.close)
    .then_some(Direction::Bearish)
}

/// Three candles of one color, each opening inside the previous body and
/// closing further along with almost no shadow at the close
fn three_in_a_row(bars: &[Bar; 3], dir: Direction, t: &Thresholds) -> bool {
  let [a, b, c] = bars;
  if bars.iter().any(|x| x.color() != Some(dir) || !t.closes_on_extreme(x) || t.is_short_body(x)) {
    return false;
  }
  let opens_inside = |prev: &Bar, cur: &Bar| cur.open > prev.body_bottom() && cur.open < prev.body_top();
  let advancing = match dir {
    Direction::Bullish => b.close > a.close && c.close > b.close,
    _ => b.close < a.close && c.close < b.close,
  };
  advancing && opens_inside(a, b) && opens_inside(b, c)
}

pub fn three_black_crows(bars: &[Bar], t: &Thresholds) -> Option<Direction> {
  let window: &[Bar; 3] = bars.try_into().ok()?;
  three_in_a_row(window, Direction::Bearish, t).then_some(Direction::Bearish)
}

pub fn three_white_soldiers(bars: &[Bar], t: &Thresholds) -> Option<Direction> {
  let window: &[Bar; 3] = bars.try_into().ok()?;
  three_in_a_row(window, Direction::Bullish, t).then_some(Direction::Bullish)
}

/// Crows where every open equals the prior close
pub fn identical_three_crows(bars: &[Bar], t: &Thresholds) -> Option<Direction> {
  let [a, b, c] = bars else { return None };
  if bars.iter().any(|x| !x.is_bearish() || !t.closes_on_extreme(x) || t.is_short_body(x)) {
    return None;
  }
  let scale = avg_range(bars);
  (b.close < a.close && c.close < b.close && t.equal(b.open, a.close, scale) && t.equal(c.open, b.close, scale))
    .then_some(Direction::Bearish)
}

pub fn upside_gap_two_crows(bars: &[Bar], t: &Thresholds) -> Option<Direction> {
  let [a, b, c] = bars else { return None };
  (a.is_bullish()
    && t.is_long_body(a)
    && b.is_bearish()
    && body_gap_up(a, b)
    && c.is_bearish()
    && c.open > b.open
    && c.close < b.close
    && c.close > a.close)
    .then_some(Direction::Bearish)
}

// ============================================================
// HARAMI / ENGULFING CONFIRMATIONS
// ============================================================

pub fn three_inside(bars: &[Bar], t: &Thresholds) -> Option<Direction> {
  let [a, b, c] = bars else { return None };
  let dir = two_bar::harami(&[*a, *b], t).or_else(|| two_bar::harami_cross(&[*a, *b], t))?;
  let confirmed = match dir {
    Direction::Bullish => c.is_bullish() && c.close > a.open,
    _ => c.is_bearish() && c.close < a.open,
  };
  confirmed.then_some(dir)
}

pub fn three_outside(bars: &[Bar], t: &Thresholds) -> Option<Direction> {
  let [a, b, c] = bars else { return None };
  let dir = two_bar::engulfing(&[*a, *b], t)?;
  let confirmed = match dir {
    Direction::Bullish => c.is_bullish() && c.close > b.close,
    _ => c.is_bearish() && c.close < b.close,
  };
  confirmed.then_some(dir)
}

// ============================================================
// STARS
// ============================================================

/// Reversal star: first candle, small-bodied star beyond it, then a strong
/// candle closing past the first body's midpoint and clear of the star.
///
/// The first candle must run with the move being reversed or have a short
/// body; a quiet bar before the star is accepted.
fn star(bars: &[Bar], t: &Thresholds, dir: Direction, doji: bool) -> Option<Direction> {
  let [a, b, c] = bars else { return None };
  let star_ok = if doji { t.is_doji(b) } else { b.body_ratio().map_or(true, |r| r < t.short_body) };
  let third_ok = c.body_ratio().is_some_and(|r| r >= t.short_body);
  if !star_ok || !third_ok {
    return None;
  }
  let matched = match dir {
    Direction::Bullish => {
      (a.is_bearish() || t.is_short_body(a))
        && b.close < a.close
        && b.low < a.low
        && c.is_bullish()
        && c.close > a.body_mid()
        && c.close > b.body_top()
    },
    _ => {
      (a.is_bullish() || t.is_short_body(a))
        && b.close > a.close
        && b.high > a.high
        && c.is_bearish()
        && c.close < a.body_mid()
        && c.close < b.body_bottom()
    },
  };
  matched.then_some(dir)
}

pub fn morning_star(bars: &[Bar], t: &Thresholds) -> Option<Direction> {
  star(bars, t, Direction::Bullish, false)
}

pub fn evening_star(bars: &[Bar], t: &Thresholds) -> Option<Direction> {
  star(bars, t, Direction::Bearish, false)
}

pub fn morning_doji_star(bars: &[Bar], t: &Thresholds) -> Option<Direction> {
  star(bars, t, Direction::Bullish, true)
}

pub fn evening_doji_star(bars: &[Bar], t: &Thresholds) -> Option<Direction> {
  star(bars, t, Direction::Bearish, true)
}

/// Doji isolated by full gaps on both sides
pub fn abandoned_baby(bars: &[Bar], t: &Thresholds) -> Option<Direction> {
  let [a, b, c] = bars else { return None };
  if !t.is_long_body(a) || !t.is_doji(b) {
    return None;
  }
  let dir = a.color()?.opposite();
  let matched = match dir {
    Direction::Bullish => {
      gap_down(a, b) && c.is_bullish() && gap_up(b, c) && c.close > a.close + a.body() * t.penetration
    },
    _ => gap_up(a, b) && c.is_bearish() && gap_down(b, c) && c.close < a.close - a.body() * t.penetration,
  };
  matched.then_some(dir)
}

/// Three dojis, the middle one gapping past both neighbours
pub fn tristar(bars: &[Bar], t: &Thresholds) -> Option<Direction> {
  let [a, b, c] = bars else { return None };
  if !bars.iter().all(|x| t.is_doji(x)) {
    return None;
  }
  if body_gap_up(a, b) && body_gap_up(c, b) {
    Some(Direction::Bearish)
  } else if body_gap_down(a, b) && body_gap_down(c, b) {
    Some(Direction::Bullish)
  } else {
    None
  }
}

pub fn three_stars_in_south(bars: &[Bar], t: &Thresholds) -> Option<Direction> {
  let [a, b, c] = bars else { return None };
  let a_ok = a.is_bearish() && t.is_long_body(a) && a.lower_shadow_ratio()? > t.short_shadow;
  let b_ok = b.is_bearish() && b.body() < a.body() && b.open > a.close && b.open <= a.high && b.low > a.low;
  let c_ok = c.is_bearish()
    && t.has_short_upper_shadow(c)
    && t.has_short_lower_shadow(c)
    && c.low >= b.low
    && c.high <= b.high
    && c.body() < b.body();
  (a_ok && b_ok && c_ok).then_some(Direction::Bullish)
}

// ============================================================
// WEAKENING ADVANCES
// ============================================================

pub fn advance_block(bars: &[Bar], t: &Thresholds) -> Option<Direction> {
  let [a, b, c] = bars else { return None };
  if !bars.iter().all(|x| x.is_bullish()) || !t.is_long_body(a) {
    return None;
  }
  let opens_inside = |prev: &Bar, cur: &Bar| cur.open > prev.open && cur.open <= prev.close;
  (b.close > a.close
    && c.close > b.close
    && opens_inside(a, b)
    && opens_inside(b, c)
    && b.body() < a.body()
    && c.body() < b.body()
    && (t.has_tall_upper_shadow(b) || t.has_tall_upper_shadow(c)))
    .then_some(Direction::Bearish)
}

pub fn stalled_pattern(bars: &[Bar], t: &Thresholds) -> Option<Direction> {
  let [a, b, c] = bars else { return None };
  if !bars.iter().all(|x| x.is_bullish()) {
    return None;
  }
  let scale = avg_range(bars);
  (t.is_long_body(a)
    && t.is_long_body(b)
    && b.close > a.close
    && b.open > a.open
    && b.open <= a.close + t.near * scale
    && t.is_short_body(c)
    && c.close > b.close
    && c.open >= b.close - c.body() - t.near * scale)
    .then_some(Direction::Bearish)
}

// ============================================================
// BOTTOMS
// ============================================================

pub fn stick_sandwich(bars: &[Bar], t: &Thresholds) -> Option<Direction> {
  let [a, b, c] = bars else { return None };
  (a.is_bearish()
    && b.is_bullish()
    && b.low > a.close
    && c.is_bearish()
    && t.equal(c.close, a.close, avg_range(bars)))
    .then_some(Direction::Bullish)
}

pub fn unique_three_river(bars: &[Bar], t: &Thresholds) -> Option<Direction> {
  let [a, b, c] = bars else { return None };
  (a.is_bearish()
    && t.is_long_body(a)
    && b.is_bearish()
    && body_inside(a, b)
    && b.low < a.low
    && c.is_bullish()
    && t.is_short_body(c)
    && c.close < b.close
    && c.open > b.low)
    .then_some(Direction::Bullish)
}

// ============================================================
// GAP CONTINUATIONS
// ============================================================

pub fn tasuki_gap(bars: &[Bar], t: &Thresholds) -> Option<Direction> {
  let [a, b, c] = bars else { return None };
  let scale = avg_range(bars);
  let similar = t.near(b.body(), c.body(), scale);
  if a.is_bullish() && b.is_bullish() && c.is_bearish() && body_gap_up(a, b) {
    let fills = c.open < b.close && c.open > b.open && c.close < b.open && c.close > a.close;
    return (fills && similar).then_some(Direction::Bullish);
  }
  if a.is_bearish() && b.is_bearish() && c.is_bullish() && body_gap_down(a, b) {
    let fills = c.open > b.close && c.open < b.open && c.close > b.open && c.close < a.close;
    return (fills && similar).then_some(Direction::Bearish);
  }
  None
}

/// Two similar white candles side by side, both gapped away from the first
pub fn gap_side_side_white(bars: &[Bar], t: &Thresholds) -> Option<Direction> {
  let [a, b, c] = bars else { return None };
  let scale = avg_range(bars);
  if !b.is_bullish() || !c.is_bullish() || !t.near(b.body(), c.body(), scale) || !t.near(b.open, c.open, scale) {
    return None;
  }
  if body_gap_up(a, b) && body_gap_up(a, c) {
    Some(Direction::Bullish)
  } else if body_gap_down(a, b) && body_gap_down(a, c) {
    Some(Direction::Bearish)
  } else {
    None
  }
}

/// Gap between two same-colored candles closed by an opposite third
pub fn x_side_gap_three_methods(bars: &[Bar], _t: &Thresholds) -> Option<Direction> {
  let [a, b, c] = bars else { return None };
  let dir = a.color()?;
  if b.color()? != dir || c.color()? != dir.opposite() {
    return None;
  }
  let gapped = match dir {
    Direction::Bullish => body_gap_up(a, b),
    _ => body_gap_down(a, b),
  };
  let opens_in_b = c.open > b.body_bottom() && c.open < b.body_top();
  let closes_in_a = c.close > a.body_bottom() && c.close < a.body_top();
  (gapped && opens_in_b && closes_in_a).then_some(dir)
}

// ============================================================
// HIKKAKE
// ============================================================

/// Inside bar followed by a false breakout; signals the other way
pub fn hikkake(bars: &[Bar], _t: &Thresholds) -> Option<Direction> {
  let [a, b, c] = bars else { return None };
  if !inside_bar(a, b) {
    return None;
  }
  if c.high < b.high && c.low < b.low {
    Some(Direction::Bullish)
  } else if c.high > b.high && c.low > b.low {
    Some(Direction::Bearish)
  } else {
    None
  }
}
