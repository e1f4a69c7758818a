//! Two-candle patterns: Engulfing, Piercing Line, Dark Cloud Cover, Harami

use super::helpers::{self, excess_over, margin_under, quality, reliability};
use super::{PatternContext, PatternDetector, PatternId, PatternMatch};
use crate::config::PatternParams;
use crate::model::{Direction, PatternKind, TrendDirection};
use crate::{AnalysisError, OHLCVExt, Result, OHLCV};

impl_with_defaults!(
  EngulfingDetector,
  PiercingDetector,
  DarkCloudCoverDetector,
  HaramiDetector,
);

fn double(
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
        kind: PatternKind::Double,
        direction,
        reliability,
        start_index: index - 1,
        end_index: index,
    }
}

/// The candle pair ending at `index`
#[inline]
fn pair<T: OHLCV>(bars: &[T], index: usize) -> Option<(&T, &T)> {
    if index < 1 {
        return None;
    }
    Some((bars.get(index - 1)?, bars.get(index)?))
}

// ============================================================
// ENGULFING
// ============================================================

/// Engulfing - second body swallows the first against the trend
///
/// Bullish after a decline, bearish after a rally.
#[derive(Debug, Clone, Copy)]
pub struct EngulfingDetector {
    /// Second body must be this many times the first
    pub body_multiple: f64,
}

impl Default for EngulfingDetector {
    fn default() -> Self {
        Self {
            body_multiple: helpers::ENGULF_BODY_MULTIPLE,
        }
    }
}

impl EngulfingDetector {
    pub const BASE_RELIABILITY: f64 = 0.90;

    pub fn from_params(params: &PatternParams) -> Self {
        Self {
            body_multiple: params.engulf_body_multiple,
        }
    }
}

impl PatternDetector for EngulfingDetector {
    fn id(&self) -> PatternId {
        PatternId("ENGULFING")
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
        let (prev, curr) = pair(bars, index)?;
        let min_body = self.body_multiple * prev.body();
        if curr.body() <= min_body {
            return None;
        }

        let bullish = ctx.trend == TrendDirection::Down
            && prev.is_bearish()
            && curr.is_bullish()
            && curr.open() < prev.close()
            && curr.close() > prev.open();
        let bearish = ctx.trend == TrendDirection::Up
            && prev.is_bullish()
            && curr.is_bearish()
            && curr.open() > prev.close()
            && curr.close() < prev.open();

        let q = excess_over(curr.body(), min_body);
        if bullish {
            Some(double(
                PatternDetector::id(self),
                "Bullish Engulfing",
                "A bullish body fully engulfs the prior bearish body after a decline; buyers took control",
                Direction::Bullish,
                reliability(Self::BASE_RELIABILITY, q),
                index,
            ))
        } else if bearish {
            Some(double(
                PatternDetector::id(self),
                "Bearish Engulfing",
                "A bearish body fully engulfs the prior bullish body after a rally; sellers took control",
                Direction::Bearish,
                reliability(Self::BASE_RELIABILITY, q),
                index,
            ))
        } else {
            None
        }
    }

    fn validate_config(&self) -> Result<()> {
        if !(self.body_multiple.is_finite() && self.body_multiple >= 1.0) {
            return Err(AnalysisError::InvalidConfig(
                "engulfing body multiple must be >= 1".into(),
            ));
        }
        Ok(())
    }
}

// ============================================================
// PIERCING / DARK CLOUD
// ============================================================

/// Piercing Line - opens below the prior low, closes past the prior midpoint
#[derive(Debug, Clone, Copy)]
pub struct PiercingDetector {
    /// Share of the first body the second close must recover
    pub min_penetration: f64,
}

impl Default for PiercingDetector {
    fn default() -> Self {
        Self {
            min_penetration: helpers::MIN_PENETRATION,
        }
    }
}

impl PiercingDetector {
    pub const BASE_RELIABILITY: f64 = 0.80;
}

impl PatternDetector for PiercingDetector {
    fn id(&self) -> PatternId {
        PatternId("PIERCING")
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
        if ctx.trend != TrendDirection::Down {
            return None;
        }
        let (prev, curr) = pair(bars, index)?;
        if !prev.is_bearish() || !curr.is_bullish() {
            return None;
        }
        if curr.open() >= prev.low() || !helpers::within(curr.close(), prev.close(), prev.open()) {
            return None;
        }
        let penetration = (curr.close() - prev.close()) / prev.body();
        if penetration < self.min_penetration {
            return None;
        }

        Some(double(
            PatternDetector::id(self),
            "Piercing Line",
            "Gaps below the prior low then closes above the prior body midpoint; the decline is losing force",
            Direction::Bullish,
            reliability(Self::BASE_RELIABILITY, excess_over(penetration, self.min_penetration)),
            index,
        ))
    }
}

/// Dark Cloud Cover - opens above the prior high, closes below the prior midpoint
#[derive(Debug, Clone, Copy)]
pub struct DarkCloudCoverDetector {
    pub min_penetration: f64,
}

impl Default for DarkCloudCoverDetector {
    fn default() -> Self {
        Self {
            min_penetration: helpers::MIN_PENETRATION,
        }
    }
}

impl DarkCloudCoverDetector {
    pub const BASE_RELIABILITY: f64 = 0.80;
}

impl PatternDetector for DarkCloudCoverDetector {
    fn id(&self) -> PatternId {
        PatternId("DARK_CLOUD_COVER")
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
        if ctx.trend != TrendDirection::Up {
            return None;
        }
        let (prev, curr) = pair(bars, index)?;
        if !prev.is_bullish() || !curr.is_bearish() {
            return None;
        }
        if curr.open() <= prev.high() || !helpers::within(curr.close(), prev.open(), prev.close()) {
            return None;
        }
        let penetration = (prev.close() - curr.close()) / prev.body();
        if penetration < self.min_penetration {
            return None;
        }

        Some(double(
            PatternDetector::id(self),
            "Dark Cloud Cover",
            "Gaps above the prior high then closes below the prior body midpoint; the rally is losing force",
            Direction::Bearish,
            reliability(Self::BASE_RELIABILITY, excess_over(penetration, self.min_penetration)),
            index,
        ))
    }
}

// ============================================================
// HARAMI
// ============================================================

/// Harami - small opposite-colour body inside the prior body
#[derive(Debug, Clone, Copy, Default)]
pub struct HaramiDetector;

impl HaramiDetector {
    pub const BASE_RELIABILITY: f64 = 0.70;
}

impl PatternDetector for HaramiDetector {
    fn id(&self) -> PatternId {
        PatternId("HARAMI")
    }

    fn min_bars(&self) -> usize {
        2
    }

    fn detect<T: OHLCV>(
        &self,
        bars: &[T],
        index: usize,
        _ctx: &PatternContext,
    ) -> Option<PatternMatch> {
        let (prev, curr) = pair(bars, index)?;
        let inside = curr.body_top() < prev.body_top() && curr.body_bottom() > prev.body_bottom();
        if !inside {
            return None;
        }

        let (name, description, direction) = if prev.is_bearish() && curr.is_bullish() {
            (
                "Bullish Harami",
                "A small bullish body inside the prior bearish body; selling momentum is stalling",
                Direction::Bullish,
            )
        } else if prev.is_bullish() && curr.is_bearish() {
            (
                "Bearish Harami",
                "A small bearish body inside the prior bullish body; buying momentum is stalling",
                Direction::Bearish,
            )
        } else {
            return None;
        };

        let q = quality(&[margin_under(curr.body(), prev.body())]);
        Some(double(
            PatternDetector::id(self),
            name,
            description,
            direction,
            reliability(Self::BASE_RELIABILITY, q),
            index,
        ))
    }
}
