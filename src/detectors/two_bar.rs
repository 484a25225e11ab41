//! Two-candle matchers
//!
//! CDLENGULFING, CDLHARAMI, CDLHARAMICROSS, CDLPIERCING, CDLDARKCLOUDCOVER, CDLDOJISTAR,
//! CDLCOUNTERATTACK, CDLINNECK, CDLONNECK, CDLTHRUSTING, CDLKICKING, CDLKICKINGBYLENGTH,
//! CDLMATCHINGLOW, CDLHOMINGPIGEON, CDLSEPARATINGLINES

use super::helpers::{avg_range, body_gap_down, body_gap_up, body_inside, gap_down, gap_up, Thresholds};
use crate::{Bar, Direction, OHLCVExt};

// ============================================================
// ENGULFING / HARAMI
// ============================================================

pub fn engulfing(bars: &[Bar], _t: &Thresholds) -> Option<Direction> {
  let [prev, cur] = bars else { return None };
  let dir = cur.color()?;
  if prev.color()? != dir.opposite() {
    return None;
  }
  (cur.body_top() >= prev.body_top() && cur.body_bottom() <= prev.body_bottom() && cur.body() > prev.body())
    .then_some(dir)
}

/// Long candle followed by a small body inside it; points against the first candle
pub fn harami(bars: &[Bar], t: &Thresholds) -> Option<Direction> {
  let [prev, cur] = bars else { return None };
  if !t.is_long_body(prev) || !t.is_short_body(cur) || t.is_doji(cur) || !body_inside(prev, cur) {
    return None;
  }
  prev.color().map(Direction::opposite)
}

pub fn harami_cross(bars: &[Bar], t: &Thresholds) -> Option<Direction> {
  let [prev, cur] = bars else { return None };
  if !t.is_long_body(prev) || !t.is_doji(cur) || !body_inside(prev, cur) {
    return None;
  }
  prev.color().map(Direction::opposite)
}

// ============================================================
// PIERCING / DARK CLOUD
// ============================================================

pub fn piercing(bars: &[Bar], t: &Thresholds) -> Option<Direction> {
  let [prev, cur] = bars else { return None };
  (prev.is_bearish()
    && t.is_long_body(prev)
    && cur.is_bullish()
    && cur.open < prev.low
    && cur.close > prev.body_mid()
    && cur.close < prev.open)
    .then_some(Direction::Bullish)
}

pub fn dark_cloud_cover(bars: &[Bar], t: &Thresholds) -> Option<Direction> {
  let [prev, cur] = bars else { return None };
  (prev.is_bullish()
    && t.is_long_body(prev)
    && cur.is_bearish()
    && cur.open > prev.high
    && cur.close < prev.close - prev.body() * t.penetration
    && cur.close > prev.open)
    .then_some(Direction::Bearish)
}

/// Long candle, then a doji gapping away in the direction of the move
pub fn doji_star(bars: &[Bar], t: &Thresholds) -> Option<Direction> {
  let [prev, cur] = bars else { return None };
  if !t.is_long_body(prev) || !t.is_doji(cur) {
    return None;
  }
  match prev.color()? {
    Direction::Bullish if body_gap_up(prev, cur) => Some(Direction::Bearish),
    Direction::Bearish if body_gap_down(prev, cur) => Some(Direction::Bullish),
    _ => None,
  }
}

pub fn counterattack(bars: &[Bar], t: &Thresholds) -> Option<Direction> {
  let [prev, cur] = bars else { return None };
  let dir = cur.color()?;
  if prev.color()? != dir.opposite() || !t.is_long_body(prev) || !t.is_long_body(cur) {
    return None;
  }
  t.equal(cur.close, prev.close, avg_range(bars)).then_some(dir)
}

// ============================================================
// NECK LINES (bearish continuation)
// ============================================================

/// Long black candle, then a white candle opening below its low
fn neck_setup(prev: &Bar, cur: &Bar, t: &Thresholds) -> bool {
  prev.is_bearish() && t.is_long_body(prev) && cur.is_bullish() && cur.open < prev.low
}

pub fn in_neck(bars: &[Bar], t: &Thresholds) -> Option<Direction> {
  let [prev, cur] = bars else { return None };
  let scale = avg_range(bars);
  (neck_setup(prev, cur, t) && cur.close >= prev.close && cur.close <= prev.close + t.equal * scale)
    .then_some(Direction::Bearish)
}

pub fn on_neck(bars: &[Bar], t: &Thresholds) -> Option<Direction> {
  let [prev, cur] = bars else { return None };
  (neck_setup(prev, cur, t) && t.equal(cur.close, prev.low, avg_range(bars))).then_some(Direction::Bearish)
}

pub fn thrusting(bars: &[Bar], t: &Thresholds) -> Option<Direction> {
  let [prev, cur] = bars else { return None };
  let scale = avg_range(bars);
  (neck_setup(prev, cur, t) && cur.close > prev.close + t.equal * scale && cur.close <= prev.body_mid())
    .then_some(Direction::Bearish)
}

// ============================================================
// KICKING
// ============================================================

/// Opposite-colored marubozus separated by a full gap
fn kicking_pair(prev: &Bar, cur: &Bar, t: &Thresholds) -> Option<Direction> {
  let dir = cur.color()?;
  if prev.color()? != dir.opposite() {
    return None;
  }
  let marubozus = [prev, cur].iter().all(|b| t.is_long_body(*b) && t.is_marubozu(*b));
  let gapped = match dir {
    Direction::Bullish => gap_up(prev, cur),
    _ => gap_down(prev, cur),
  };
  (marubozus && gapped).then_some(dir)
}

pub fn kicking(bars: &[Bar], t: &Thresholds) -> Option<Direction> {
  let [prev, cur] = bars else { return None };
  kicking_pair(prev, cur, t)
}

/// Kicking, signed by whichever marubozu is longer
pub fn kicking_by_length(bars: &[Bar], t: &Thresholds) -> Option<Direction> {
  let [prev, cur] = bars else { return None };
  kicking_pair(prev, cur, t)?;
  if prev.body() > cur.body() {
    prev.color()
  } else {
    cur.color()
  }
}

// ============================================================
// BULLISH TWO-LINE BOTTOMS
// ============================================================

pub fn matching_low(bars: &[Bar], t: &Thresholds) -> Option<Direction> {
  let [prev, cur] = bars else { return None };
  (prev.is_bearish() && cur.is_bearish() && t.equal(cur.close, prev.close, avg_range(bars)))
    .then_some(Direction::Bullish)
}

pub fn homing_pigeon(bars: &[Bar], t: &Thresholds) -> Option<Direction> {
  let [prev, cur] = bars else { return None };
  (prev.is_bearish()
    && cur.is_bearish()
    && t.is_long_body(prev)
    && t.is_short_body(cur)
    && cur.open < prev.open
    && cur.close > prev.close)
    .then_some(Direction::Bullish)
}

/// Opposite colors sharing an open; the second is a belt hold in the trend direction
pub fn separating_lines(bars: &[Bar], t: &Thresholds) -> Option<Direction> {
  let [prev, cur] = bars else { return None };
  let dir = cur.color()?;
  if prev.color()? != dir.opposite() {
    return None;
  }
  (t.equal(cur.open, prev.open, avg_range(bars)) && t.is_long_body(cur) && t.opens_on_extreme(cur))
    .then_some(dir)
}

#[cfg(test)]
mod tests {
  use super::*;

  fn bar(o: f64, h: f64, l: f64, c: f64) -> Bar {
    Bar::new(0, o, h, l, c, 1000)
  }

  fn t() -> Thresholds {
    Thresholds::default()
  }

  #[test]
  fn test_engulfing_both_ways() {
    let bullish = [bar(60.0, 61.0, 59.0, 59.5), bar(59.0, 62.0, 58.0, 61.5)];
    assert_eq!(engulfing(&bullish, &t()), Some(Direction::Bullish));

    let bearish = [bar(59.5, 61.0, 59.0, 60.0), bar(61.5, 62.0, 58.0, 59.0)];
    assert_eq!(engulfing(&bearish, &t()), Some(Direction::Bearish));

    let same_color = [bar(59.5, 61.0, 59.0, 60.0), bar(59.0, 62.0, 58.0, 61.5)];
    assert_eq!(engulfing(&same_color, &t()), None);
  }

  #[test]
  fn test_harami_and_cross() {
    let first = bar(110.0, 110.5, 99.5, 100.0);
    assert_eq!(harami(&[first, bar(103.0, 106.0, 102.0, 104.0)], &t()), Some(Direction::Bullish));
    assert_eq!(harami_cross(&[first, bar(104.0, 106.0, 102.0, 104.1)], &t()), Some(Direction::Bullish));
    assert_eq!(harami(&[first, bar(104.0, 106.0, 102.0, 104.1)], &t()), None);
  }

  #[test]
  fn test_piercing_and_dark_cloud() {
    let black = bar(110.0, 110.5, 99.5, 100.0);
    assert_eq!(piercing(&[black, bar(99.0, 107.5, 98.8, 107.0)], &t()), Some(Direction::Bullish));
    assert_eq!(piercing(&[black, bar(99.0, 104.5, 98.8, 104.0)], &t()), None);

    let white = bar(100.0, 110.5, 99.5, 110.0);
    assert_eq!(dark_cloud_cover(&[white, bar(111.0, 111.2, 103.5, 104.0)], &t()), Some(Direction::Bearish));
  }

  #[test]
  fn test_doji_star_direction() {
    let white = bar(100.0, 110.5, 99.5, 110.0);
    assert_eq!(doji_star(&[white, bar(111.0, 112.0, 110.5, 111.05)], &t()), Some(Direction::Bearish));
  }

  #[test]
  fn test_neck_family() {
    let black = bar(110.0, 110.5, 99.5, 100.0);
    assert_eq!(in_neck(&[black, bar(98.0, 100.3, 97.5, 100.2)], &t()), Some(Direction::Bearish));
    assert_eq!(on_neck(&[black, bar(97.0, 99.6, 96.5, 99.5)], &t()), Some(Direction::Bearish));
    assert_eq!(thrusting(&[black, bar(98.0, 104.2, 97.5, 104.0)], &t()), Some(Direction::Bearish));
  }

  #[test]
  fn test_kicking() {
    let black = bar(110.0, 110.0, 100.0, 100.0);
    let white = bar(111.0, 121.0, 111.0, 121.0);
    assert_eq!(kicking(&[black, white], &t()), Some(Direction::Bullish));

    let short_white = bar(111.0, 116.0, 111.0, 116.0);
    assert_eq!(kicking_by_length(&[black, short_white], &t()), Some(Direction::Bearish));
  }

  #[test]
  fn test_bottoms() {
    let black = bar(110.0, 110.5, 99.5, 100.0);
    assert_eq!(matching_low(&[black, bar(104.0, 104.5, 99.8, 100.05)], &t()), Some(Direction::Bullish));
    assert_eq!(homing_pigeon(&[black, bar(105.0, 107.0, 101.0, 104.0)], &t()), Some(Direction::Bullish));
  }

  #[test]
  fn test_separating_lines() {
    let black = bar(110.0, 110.5, 104.5, 105.0);
    let white = bar(110.0, 118.5, 110.0, 118.0);
    assert_eq!(separating_lines(&[black, white], &t()), Some(Direction::Bullish));
  }
}
