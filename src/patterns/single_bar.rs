//! Single-candle patterns
//!
//! Hammer and Doji read one candle. Hanging Man, Inverted Hammer and Shooting
//! Star are single-candle shapes that need the next close to confirm them, so
//! they span two candles while still reporting as single patterns.

use super::helpers::{self, excess_over, margin_under, quality, reliability};
use super::{PatternContext, PatternDetector, PatternId, PatternMatch};
use crate::config::PatternParams;
use crate::model::{Direction, PatternKind, TrendDirection};
use crate::{OHLCVExt, OHLCV};

impl_with_defaults!(
  HammerDetector,
  HangingManDetector,
  InvertedHammerDetector,
  ShootingStarDetector,
  DojiDetector,
);

// ============================================================
// SHAPES
// ============================================================

/// Thresholds shared by the hammer-shaped candles
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShadowShape {
    /// Long shadow must be at least this many bodies
    pub shadow_multiple: f64,
    /// Opposite shadow may be at most this many bodies
    pub opposite_shadow_factor: f64,
    /// Body must stay below this share of the range
    pub max_body_ratio: f64,
}

impl Default for ShadowShape {
    fn default() -> Self {
        Self {
            shadow_multiple: helpers::SHADOW_MULTIPLE,
            opposite_shadow_factor: helpers::OPPOSITE_SHADOW_FACTOR,
            max_body_ratio: helpers::HAMMER_BODY_RATIO,
        }
    }
}

impl ShadowShape {
    fn from_params(params: &PatternParams) -> Self {
        Self {
            shadow_multiple: params.shadow_multiple,
            ..Self::default()
        }
    }

    /// Match quality when `long` is the long shadow and `short` the opposite one
    fn score<T: OHLCV>(&self, bar: &T, long: f64, short: f64) -> Option<f64> {
        let body_ratio = bar.body_ratio()?;
        let body = bar.body();
        let long_min = self.shadow_multiple * body;
        let short_max = self.opposite_shadow_factor * body;

        if long < long_min || short > short_max || body_ratio >= self.max_body_ratio {
            return None;
        }
        Some(quality(&[
            excess_over(long, long_min),
            margin_under(short, short_max),
            margin_under(body_ratio, self.max_body_ratio),
        ]))
    }

    /// Long lower shadow, small body at the top
    pub fn hammer<T: OHLCV>(&self, bar: &T) -> Option<f64> {
        self.score(bar, bar.lower_shadow(), bar.upper_shadow())
    }

    /// Long upper shadow, small body at the bottom
    pub fn inverted<T: OHLCV>(&self, bar: &T) -> Option<f64> {
        self.score(bar, bar.upper_shadow(), bar.lower_shadow())
    }
}

fn single(
    id: PatternId,
    name: &'static str,
    description: &'static str,
    direction: Direction,
    reliability: f64,
    start_index: usize,
    end_index: usize,
) -> PatternMatch {
    PatternMatch {
        pattern_id: id,
        name,
        description,
        kind: PatternKind::Single,
        direction,
        reliability,
        start_index,
        end_index,
    }
}

// ============================================================
// HAMMER FAMILY
// ============================================================

/// Hammer - hammer shape after a decline
#[derive(Debug, Clone, Copy, Default)]
pub struct HammerDetector {
    pub shape: ShadowShape,
}

impl HammerDetector {
    pub const BASE_RELIABILITY: f64 = 0.80;

    pub fn from_params(params: &PatternParams) -> Self {
        Self {
            shape: ShadowShape::from_params(params),
        }
    }
}

impl PatternDetector for HammerDetector {
    fn id(&self) -> PatternId {
        PatternId("HAMMER")
    }

    fn min_bars(&self) -> usize {
        1
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
        let bar = bars.get(index)?;
        let q = self.shape.hammer(bar)?;

        Some(single(
            PatternDetector::id(self),
            "Hammer",
            "Small body near the high with a long lower shadow after a decline; buyers rejected lower prices",
            Direction::Bullish,
            reliability(Self::BASE_RELIABILITY, q),
            index,
            index,
        ))
    }
}

/// Hanging Man - hammer shape after a rally, confirmed by a lower close
#[derive(Debug, Clone, Copy, Default)]
pub struct HangingManDetector {
    pub shape: ShadowShape,
}

impl HangingManDetector {
    pub const BASE_RELIABILITY: f64 = 0.70;

    pub fn from_params(params: &PatternParams) -> Self {
        Self {
            shape: ShadowShape::from_params(params),
        }
    }
}

impl PatternDetector for HangingManDetector {
    fn id(&self) -> PatternId {
        PatternId("HANGING_MAN")
    }

    fn min_bars(&self) -> usize {
        2
    }

    fn detect<T: OHLCV>(
        &self,
        bars: &[T],
        index: usize,
        ctx: &PatternContext,
    ) -> Option<PatternMatch> {
        if index < 1 || ctx.trend != TrendDirection::Up {
            return None;
        }
        let candidate = bars.get(index - 1)?;
        let confirm = bars.get(index)?;
        if confirm.close() >= candidate.close() {
            return None;
        }
        let q = self.shape.hammer(candidate)?;

        Some(single(
            PatternDetector::id(self),
            "Hanging Man",
            "Hammer-shaped candle after a rally, confirmed by a lower close; selling pressure is building",
            Direction::Bearish,
            reliability(Self::BASE_RELIABILITY, q),
            index - 1,
            index,
        ))
    }
}

/// Inverted Hammer - long upper shadow after a decline, confirmed by a higher close
#[derive(Debug, Clone, Copy, Default)]
pub struct InvertedHammerDetector {
    pub shape: ShadowShape,
}

impl InvertedHammerDetector {
    pub const BASE_RELIABILITY: f64 = 0.65;

    pub fn from_params(params: &PatternParams) -> Self {
        Self {
            shape: ShadowShape::from_params(params),
        }
    }
}

impl PatternDetector for InvertedHammerDetector {
    fn id(&self) -> PatternId {
        PatternId("INVERTED_HAMMER")
    }

    fn min_bars(&self) -> usize {
        2
    }

    fn detect<T: OHLCV>(
        &self,
        bars: &[T],
        index: usize,
        ctx: &PatternContext,
    ) -> Option<PatternMatch> {
        if index < 1 || ctx.trend != TrendDirection::Down {
            return None;
        }
        let candidate = bars.get(index - 1)?;
        let confirm = bars.get(index)?;
        if confirm.close() <= candidate.close() {
            return None;
        }
        let q = self.shape.inverted(candidate)?;

        Some(single(
            PatternDetector::id(self),
            "Inverted Hammer",
            "Small body near the low with a long upper shadow after a decline, confirmed by a higher close",
            Direction::Bullish,
            reliability(Self::BASE_RELIABILITY, q),
            index - 1,
            index,
        ))
    }
}

/// Shooting Star - long upper shadow after a rally, confirmed by a lower close
#[derive(Debug, Clone, Copy, Default)]
pub struct ShootingStarDetector {
    pub shape: ShadowShape,
}

impl ShootingStarDetector {
    pub const BASE_RELIABILITY: f64 = 0.75;

    pub fn from_params(params: &PatternParams) -> Self {
        Self {
            shape: ShadowShape::from_params(params),
        }
    }
}

impl PatternDetector for ShootingStarDetector {
    fn id(&self) -> PatternId {
        PatternId("SHOOTING_STAR")
    }

    fn min_bars(&self) -> usize {
        2
    }

    fn detect<T: OHLCV>(
        &self,
        bars: &[T],
        index: usize,
        ctx: &PatternContext,
    ) -> Option<PatternMatch> {
        if index < 1 || ctx.trend != TrendDirection::Up {
            return None;
        }
        let candidate = bars.get(index - 1)?;
        let confirm = bars.get(index)?;
        if confirm.close() >= candidate.close() {
            return None;
        }
        let q = self.shape.inverted(candidate)?;

        Some(single(
            PatternDetector::id(self),
            "Shooting Star",
            "Small body near the low with a long upper shadow after a rally; buyers failed to hold the highs",
            Direction::Bearish,
            reliability(Self::BASE_RELIABILITY, q),
            index - 1,
            index,
        ))
    }
}

// ============================================================
// DOJI
// ============================================================

/// Doji variant by shadow layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DojiVariant {
    Dragonfly,
    Gravestone,
    LongLegged,
    Standard,
}

impl DojiVariant {
    pub fn name(self) -> &'static str {
        match self {
            DojiVariant::Dragonfly => "Doji (Dragonfly)",
            DojiVariant::Gravestone => "Doji (Gravestone)",
            DojiVariant::LongLegged => "Doji (Long-Legged)",
            DojiVariant::Standard => "Doji (Standard)",
        }
    }

    fn description(self) -> &'static str {
        match self {
            DojiVariant::Dragonfly => {
                "Open and close at the high after a deep probe lower; sellers were absorbed"
            }
            DojiVariant::Gravestone => {
                "Open and close at the low after a rejected push higher; buyers were absorbed"
            }
            DojiVariant::LongLegged => "Long shadows on both sides of a tiny body; strong indecision",
            DojiVariant::Standard => "Open and close almost equal; indecision",
        }
    }
}

/// Doji - open and close nearly equal
#[derive(Debug, Clone, Copy)]
pub struct DojiDetector {
    pub max_body_ratio: f64,
    pub long_shadow: f64,
    pub short_shadow: f64,
    pub leg: f64,
}

impl Default for DojiDetector {
    fn default() -> Self {
        Self {
            max_body_ratio: helpers::DOJI_BODY_RATIO,
            long_shadow: helpers::DOJI_LONG_SHADOW,
            short_shadow: helpers::DOJI_SHORT_SHADOW,
            leg: helpers::DOJI_LEG,
        }
    }
}

impl DojiDetector {
    pub const BASE_RELIABILITY: f64 = 0.70;
    /// Dragonfly in a decline, gravestone in a rally
    pub const REVERSAL_RELIABILITY: f64 = 0.75;

    pub fn from_params(params: &PatternParams) -> Self {
        Self {
            max_body_ratio: params.doji_body_ratio.get(),
            ..Self::default()
        }
    }

    pub fn classify<T: OHLCV>(&self, bar: &T) -> Option<DojiVariant> {
        let body_ratio = bar.body_ratio()?;
        if body_ratio > self.max_body_ratio {
            return None;
        }
        let upper = bar.upper_shadow_ratio()?;
        let lower = bar.lower_shadow_ratio()?;

        let variant = if lower > self.long_shadow && upper < self.short_shadow {
            DojiVariant::Dragonfly
        } else if upper > self.long_shadow && lower < self.short_shadow {
            DojiVariant::Gravestone
        } else if upper > self.leg && lower > self.leg {
            DojiVariant::LongLegged
        } else {
            DojiVariant::Standard
        };
        Some(variant)
    }
}

impl PatternDetector for DojiDetector {
    fn id(&self) -> PatternId {
        PatternId("DOJI")
    }

    fn min_bars(&self) -> usize {
        1
    }

    fn detect<T: OHLCV>(
        &self,
        bars: &[T],
        index: usize,
        ctx: &PatternContext,
    ) -> Option<PatternMatch> {
        let bar = bars.get(index)?;
        let variant = self.classify(bar)?;

        let base = match (variant, ctx.trend) {
            (DojiVariant::Dragonfly, TrendDirection::Down)
            | (DojiVariant::Gravestone, TrendDirection::Up) => Self::REVERSAL_RELIABILITY,
            _ => Self::BASE_RELIABILITY,
        };
        let q = margin_under(bar.body_ratio()?, self.max_body_ratio);

        Some(single(
            PatternDetector::id(self),
            variant.name(),
            variant.description(),
            Direction::Neutral,
            reliability(base, q),
            index,
            index,
        ))
    }
}
