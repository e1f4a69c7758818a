//! Three-candle patterns: stars and three-in-a-row advances / declines

use super::helpers::{self, margin_under, quality, reliability};
use super::{PatternContext, PatternDetector, PatternId, PatternMatch};
use crate::config::PatternParams;
use crate::model::{Direction, PatternKind, TrendDirection};
use crate::{OHLCVExt, OHLCV};

impl_with_defaults!(
  MorningStarDetector,
  EveningStarDetector,
  ThreeWhiteSoldiersDetector,
  ThreeBlackCrowsDetector,
);

fn triple(
    id: PatternId,
    name: &'static str,
    description: &'static str,
    direction: Direction,
    reliability: f64,
    index: usize,
) -> PatternMatch {
    PatternMatch {
        pattern_id: id,
        name,
        description,
        kind: PatternKind::Triple,
        direction,
        reliability,
        start_index: index - 2,
        end_index: index,
    }
}

#[inline]
fn triplet<T: OHLCV>(bars: &[T], index: usize) -> Option<(&T, &T, &T)> {
    if index < 2 {
        return None;
    }
    Some((bars.get(index - 2)?, bars.get(index - 1)?, bars.get(index)?))
}

/// How far the third close moved past the first body's midpoint, in half bodies
#[inline]
fn recovery<T: OHLCV>(first: &T, third: &T) -> f64 {
    let half = first.body() / 2.0;
    if half <= 0.0 {
        return 0.0;
    }
    ((third.close() - first.body_mid()).abs() / half).clamp(0.0, 1.0)
}

// ============================================================
// STARS
// ============================================================

/// Morning Star - long bearish candle, small star, bullish close past the first midpoint
#[derive(Debug, Clone, Copy)]
pub struct MorningStarDetector {
    /// Max star body relative to the first body
    pub star_body_ratio: f64,
}

impl Default for MorningStarDetector {
    fn default() -> Self {
        Self {
            star_body_ratio: helpers::STAR_BODY_RATIO,
        }
    }
}

impl MorningStarDetector {
    pub const BASE_RELIABILITY: f64 = 0.95;

    pub fn from_params(params: &PatternParams) -> Self {
        Self {
            star_body_ratio: params.star_body_ratio.get(),
        }
    }
}

impl PatternDetector for MorningStarDetector {
    fn id(&self) -> PatternId {
        PatternId("MORNING_STAR")
    }

    fn min_bars(&self) -> usize {
        3
    }

    fn detect<T: OHLCV>(
        &self,
        bars: &[T],
        index: usize,
        ctx: &PatternContext,
    ) -> Option<PatternMatch> {
        if ctx.trend != TrendDirection::Down {
            return None;
        }
        let (c1, c2, c3) = triplet(bars, index)?;
        let star_max = self.star_body_ratio * c1.body();
        if !c1.is_bearish() || c2.body() >= star_max || !c3.is_bullish() {
            return None;
        }
        if c3.close() <= c1.body_mid() {
            return None;
        }

        let q = quality(&[margin_under(c2.body(), star_max), recovery(c1, c3)]);
        Some(triple(
            PatternDetector::id(self),
            "Morning Star",
            "A long bearish candle, a small-bodied star, then a bullish candle closing deep into the first body",
            Direction::Bullish,
            reliability(Self::BASE_RELIABILITY, q),
            index,
        ))
    }
}

/// Evening Star - long bullish candle, small star, bearish close past the first midpoint
#[derive(Debug, Clone, Copy)]
pub struct EveningStarDetector {
    pub star_body_ratio: f64,
}

impl Default for EveningStarDetector {
    fn default() -> Self {
        Self {
            star_body_ratio: helpers::STAR_BODY_RATIO,
        }
    }
}

impl EveningStarDetector {
    pub const BASE_RELIABILITY: f64 = 0.95;

    pub fn from_params(params: &PatternParams) -> Self {
        Self {
            star_body_ratio: params.star_body_ratio.get(),
        }
    }
}

impl PatternDetector for EveningStarDetector {
    fn id(&self) -> PatternId {
        PatternId("EVENING_STAR")
    }

    fn min_bars(&self) -> usize {
        3
    }

    fn detect<T: OHLCV>(
        &self,
        bars: &[T],
        index: usize,
        ctx: &PatternContext,
    ) -> Option<PatternMatch> {
        if ctx.trend != TrendDirection::Up {
            return None;
        }
        let (c1, c2, c3) = triplet(bars, index)?;
        let star_max = self.star_body_ratio * c1.body();
        if !c1.is_bullish() || c2.body() >= star_max || !c3.is_bearish() {
            return None;
        }
        if c3.close() >= c1.body_mid() {
            return None;
        }

        let q = quality(&[margin_under(c2.body(), star_max), recovery(c1, c3)]);
        Some(triple(
            PatternDetector::id(self),
            "Evening Star",
            "A long bullish candle, a small-bodied star, then a bearish candle closing deep into the first body",
            Direction::Bearish,
            reliability(Self::BASE_RELIABILITY, q),
            index,
        ))
    }
}

// ============================================================
// THREE IN A ROW
// ============================================================

/// Closes near the highs (soldiers) or lows (crows): 1 with no closing shadow
#[inline]
fn closing_strength<T: OHLCV>(bar: &T, shadow: f64) -> f64 {
    margin_under(shadow, bar.body())
}

/// Three White Soldiers - three rising bullish candles, each opening inside the prior body
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreeWhiteSoldiersDetector;

impl ThreeWhiteSoldiersDetector {
    pub const BASE_RELIABILITY: f64 = 0.85;
}

impl PatternDetector for ThreeWhiteSoldiersDetector {
    fn id(&self) -> PatternId {
        PatternId("THREE_WHITE_SOLDIERS")
    }

    fn min_bars(&self) -> usize {
        3
    }

    fn detect<T: OHLCV>(
        &self,
        bars: &[T],
        index: usize,
        ctx: &PatternContext,
    ) -> Option<PatternMatch> {
        if ctx.trend != TrendDirection::Down {
            return None;
        }
        let (c1, c2, c3) = triplet(bars, index)?;
        if !(c1.is_bullish() && c2.is_bullish() && c3.is_bullish()) {
            return None;
        }
        if !helpers::within(c2.open(), c1.open(), c1.close())
            || !helpers::within(c3.open(), c2.open(), c2.close())
        {
            return None;
        }
        if !(c2.close() > c1.close() && c3.close() > c2.close()) {
            return None;
        }

        let q = quality(&[
            closing_strength(c1, c1.upper_shadow()),
            closing_strength(c2, c2.upper_shadow()),
            closing_strength(c3, c3.upper_shadow()),
        ]);
        Some(triple(
            PatternDetector::id(self),
            "Three White Soldiers",
            "Three consecutive bullish candles opening inside the prior body and closing higher; steady buying",
            Direction::Bullish,
            reliability(Self::BASE_RELIABILITY, q),
            index,
        ))
    }
}

/// Three Black Crows - three falling bearish candles, each opening inside the prior body
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreeBlackCrowsDetector;

impl ThreeBlackCrowsDetector {
    pub const BASE_RELIABILITY: f64 = 0.85;
}

impl PatternDetector for ThreeBlackCrowsDetector {
    fn id(&self) -> PatternId {
        PatternId("THREE_BLACK_CROWS")
    }

    fn min_bars(&self) -> usize {
        3
    }

    fn detect<T: OHLCV>(
        &self,
        bars: &[T],
        index: usize,
        ctx: &PatternContext,
    ) -> Option<PatternMatch> {
        if ctx.trend != TrendDirection::Up {
            return None;
        }
        let (c1, c2, c3) = triplet(bars, index)?;
        if !(c1.is_bearish() && c2.is_bearish() && c3.is_bearish()) {
            return None;
        }
        if !helpers::within(c2.open(), c1.close(), c1.open())
            || !helpers::within(c3.open(), c2.close(), c2.open())
        {
            return None;
        }
        if !(c2.close() < c1.close() && c3.close() < c2.close()) {
            return None;
        }

        let q = quality(&[
            closing_strength(c1, c1.lower_shadow()),
            closing_strength(c2, c2.lower_shadow()),
            closing_strength(c3, c3.lower_shadow()),
        ]);
        Some(triple(
            PatternDetector::id(self),
            "Three Black Crows",
            "Three consecutive bearish candles opening inside the prior body and closing lower; steady selling",
            Direction::Bearish,
            reliability(Self::BASE_RELIABILITY, q),
            index,
        ))
    }
}
