//! Trade opportunity generation
//!
//! Each strategy looks for one setup per side. A setup fixes the entry and the
//! stop; targets, risk/reward, confidence and validity are derived the same
//! way for every strategy. The response keeps setups meeting the caller's
//! minimum risk/reward, ranked by confidence then risk/reward.

use tracing::trace;

use crate::config::OpportunityParams;
use crate::indicators::IndicatorFrame;
use crate::model::{
    CandlestickPattern, ConfidenceInfo, ConfidenceLevel, Direction, EntryPoint, MarketStructure,
    OpportunitiesResponse, OpportunityStatus, RiskRewardInfo, SrLevel, SrLevels, StopLossInfo,
    StopMethod, Strategy, TakeProfitLevel, TradeSide, TradingOpportunity, TrendAnalysis,
    TrendDirection, ValidityInfo,
};
use crate::structure::swing_points;
use crate::{Candle, Interval, OHLCV};

/// Level strength assumed when a setup is not anchored to an SR level
const UNANCHORED_LEVEL_STRENGTH: f64 = 0.5;
/// Reasons mention indicators within this fraction of the anchoring level
const NEARBY_LEVEL: f64 = 0.01;

/// Everything the generator reads from one analysis run
#[derive(Debug, Clone, Copy)]
pub struct OpportunityContext<'a> {
    pub symbol: &'a str,
    pub interval: Interval,
    pub candles: &'a [Candle],
    pub frame: &'a IndicatorFrame,
    pub levels: &'a SrLevels,
    pub patterns: &'a [CandlestickPattern],
    pub trend: &'a TrendAnalysis,
    pub structure: &'a MarketStructure,
}

impl OpportunityContext<'_> {
    fn close(&self) -> f64 {
        self.candles.last().map(|c| c.close).unwrap_or_default()
    }

    fn timestamp(&self) -> i64 {
        self.candles.last().map(|c| c.timestamp).unwrap_or_default()
    }
}

/// Entry and stop chosen by a strategy
#[derive(Debug, Clone, PartialEq)]
struct Setup {
    side: TradeSide,
    strategy: Strategy,
    entry: f64,
    stop: f64,
    method: StopMethod,
    reasons: Vec<String>,
    level_strength: Option<f64>,
    pattern_reliability: f64,
}

// ============================================================
// TAKE-PROFIT LADDER
// ============================================================

/// Integer close percentages, descending and summing to exactly 100
pub fn allocate_position(levels: usize) -> Vec<u32> {
    if levels == 0 {
        return Vec::new();
    }
    let n = levels as u32;
    let total = n * (n + 1) / 2;
    let mut pct: Vec<u32> = (1..=n).rev().map(|w| 100 * w / total).collect();
    let assigned: u32 = pct.iter().sum();
    pct[0] += 100 - assigned;
    pct
}

/// Price reached by the allocation-weighted take-profit ladder
pub fn weighted_target(targets: &[TakeProfitLevel]) -> f64 {
    targets
        .iter()
        .map(|t| t.price * f64::from(t.position_close_pct))
        .sum::<f64>()
        / 100.0
}

// ============================================================
// LIFECYCLE
// ============================================================

/// Advance an active opportunity over the candles seen since it was issued
///
/// A candle breaching the stop invalidates the opportunity before a fill on
/// the same candle counts. Opportunities that are not active are left as is.
pub fn update_status<T: OHLCV>(
    opportunity: &mut TradingOpportunity,
    now_ms: i64,
    subsequent: &[T],
) -> OpportunityStatus {
    if opportunity.validity.status != OpportunityStatus::Active {
        return opportunity.validity.status;
    }
    let entry = opportunity.entry.price;
    let stop = opportunity.stop_loss.price;

    for candle in subsequent {
        let stopped = match opportunity.side {
            TradeSide::Long => candle.low() <= stop,
            TradeSide::Short => candle.high() >= stop,
        };
        if stopped {
            opportunity.validity.status = OpportunityStatus::Invalidated;
            return opportunity.validity.status;
        }
        if candle.low() <= entry && entry <= candle.high() {
            opportunity.validity.status = OpportunityStatus::Triggered;
            return opportunity.validity.status;
        }
    }

    if now_ms > opportunity.validity.expires_at {
        opportunity.validity.status = OpportunityStatus::Expired;
    }
    opportunity.validity.status
}

// ============================================================
// GENERATOR
// ============================================================

#[derive(Debug, Clone)]
pub struct OpportunityGenerator {
    params: OpportunityParams,
}

impl OpportunityGenerator {
    pub fn new(params: OpportunityParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &OpportunityParams {
        &self.params
    }

    /// Ranked opportunities with ratio >= `min_risk_reward`
    pub fn generate(
        &self,
        ctx: &OpportunityContext<'_>,
        min_risk_reward: f64,
        now_ms: i64,
    ) -> OpportunitiesResponse {
        let mut opportunities: Vec<TradingOpportunity> = self
            .setups(ctx)
            .into_iter()
            .filter_map(|setup| self.build(ctx, setup, now_ms))
            .filter(|o| o.risk_reward.ratio >= min_risk_reward)
            .collect();

        opportunities.sort_by(|a, b| {
            b.confidence
                .score
                .cmp(&a.confidence.score)
                .then(b.risk_reward.ratio.total_cmp(&a.risk_reward.ratio))
        });
        OpportunitiesResponse::new(opportunities)
    }

    fn setups(&self, ctx: &OpportunityContext<'_>) -> Vec<Setup> {
        [TradeSide::Long, TradeSide::Short]
            .into_iter()
            .flat_map(|side| {
                [
                    self.level_reaction(ctx, side),
                    self.breakout_retest(ctx, side),
                    self.trend_continuation(ctx, side),
                ]
            })
            .flatten()
            .collect()
    }

    /// Most reliable recent pattern agreeing with `side`
    fn confirming_pattern<'a>(
        &self,
        ctx: &OpportunityContext<'a>,
        side: TradeSide,
    ) -> Option<&'a CandlestickPattern> {
        let first_recent = ctx.candles.len().saturating_sub(self.params.pattern_window.get());
        let min_reliability = self.params.min_pattern_reliability.get();
        ctx.patterns
            .iter()
            .filter(|p| p.position >= first_recent)
            .filter(|p| p.direction == side.bias() && p.reliability >= min_reliability)
            .max_by(|a, b| a.reliability.total_cmp(&b.reliability))
    }

    /// Stop beyond `level` by a price buffer or an ATR floor, whichever is wider
    fn level_stop(&self, ctx: &OpportunityContext<'_>, side: TradeSide, level: f64) -> f64 {
        let distance = (level * self.params.stop_buffer.get())
            .max(ctx.frame.atr() * self.params.stop_atr_multiple);
        level - side.sign() * distance
    }

    /// Indicators sitting near `level`, as entry reasons
    fn nearby_reasons(&self, ctx: &OpportunityContext<'_>, level: f64) -> Vec<String> {
        let mut reasons = Vec::new();
        let near = |price: f64| (price - level).abs() < level * NEARBY_LEVEL;

        let ema = ctx.frame.ema();
        for (name, price) in [("EMA50", ema.ema50), ("EMA200", ema.ema200)] {
            if near(price) {
                reasons.push(format!("{name} at {price:.2} near the level"));
            }
        }
        if let Some(fib) = &ctx.frame.indicators.fibonacci {
            if let Some((label, price)) = fib.retracement.iter().find(|(_, p)| near(**p)) {
                reasons.push(format!("Fibonacci {label} retracement at {price:.2}"));
            }
        }
        if let Some(zone) = ctx
            .structure
            .key_level_confluence
            .confluence_zones
            .iter()
            .find(|z| z.contains(level, 0.0))
        {
            reasons.push(format!(
                "Inside a {:?} confluence zone ({} factors)",
                zone.significance,
                zone.factors.len()
            ));
        }
        reasons
    }

    // ------------------------------------------------------------
    // Strategies
    // ------------------------------------------------------------

    /// Bounce off support (long) or rejection at resistance (short)
    fn level_reaction(&self, ctx: &OpportunityContext<'_>, side: TradeSide) -> Option<Setup> {
        let close = ctx.close();
        let (levels, strategy, name) = match side {
            TradeSide::Long => (&ctx.levels.support, Strategy::SupportBounce, "Support"),
            TradeSide::Short => {
                (&ctx.levels.resistance, Strategy::ResistanceRejection, "Resistance")
            }
        };

        // Levels are sorted nearest first
        let level: &SrLevel = levels.iter().find(|l| {
            let distance_pct = (close - l.price).abs() / close * 100.0;
            distance_pct <= self.params.max_entry_distance_pct
                && l.strength >= self.params.min_level_strength.get()
        })?;
        let pattern = self.confirming_pattern(ctx, side)?;

        let entry = level.price * (1.0 + side.sign() * self.params.entry_offset.get());
        let stop = self.level_stop(ctx, side, level.price);

        let mut reasons = vec![
            format!("{name} at {:.2} (strength {:.2})", level.price, level.strength),
            format!("{} pattern (reliability {:.2})", pattern.pattern, pattern.reliability),
        ];
        reasons.extend(self.nearby_reasons(ctx, level.price));

        Some(Setup {
            side,
            strategy,
            entry,
            stop,
            method: StopMethod::TechnicalLevel,
            reasons,
            level_strength: Some(level.strength),
            pattern_reliability: pattern.reliability,
        })
    }

    /// Close just beyond the latest swing extreme after a retest of it
    fn breakout_retest(&self, ctx: &OpportunityContext<'_>, side: TradeSide) -> Option<Setup> {
        let against_trend = match side {
            TradeSide::Long => ctx.trend.direction == TrendDirection::Down,
            TradeSide::Short => ctx.trend.direction == TrendDirection::Up,
        };
        if against_trend {
            return None;
        }

        let candles = ctx.candles;
        let close = ctx.close();
        let swings = swing_points(candles, self.params.swing_lookback.get());
        let swing = match side {
            TradeSide::Long => swings.highs.last(),
            TradeSide::Short => swings.lows.last(),
        }?;
        let level = swing.price;
        let sign = side.sign();

        // Beyond the level, but not too far to chase
        let beyond_pct = sign * (close - level) / level * 100.0;
        if beyond_pct <= 0.0 || beyond_pct > self.params.max_entry_distance_pct {
            return None;
        }

        // The breakout close must precede the current candle, and the retest
        // must follow the breakout inside the recent window
        let last = candles.len() - 1;
        let breakout =
            (swing.index + 1..last).find(|&i| sign * (candles[i].close - level) > 0.0)?;
        let window = self.params.retest_window.get().min(candles.len());
        let recent_start = (breakout + 1).max(candles.len() - window);
        let tolerance = level * self.params.entry_offset.get();
        let retested = candles[recent_start..].iter().any(|c| match side {
            TradeSide::Long => c.low <= level + tolerance,
            TradeSide::Short => c.high >= level - tolerance,
        });
        if !retested {
            return None;
        }

        let entry = level * (1.0 + sign * self.params.entry_offset.get());
        let stop = self.level_stop(ctx, side, level);
        let pattern_reliability = self
            .confirming_pattern(ctx, side)
            .map_or(0.0, |p| p.reliability);

        let kind = match side {
            TradeSide::Long => "high",
            TradeSide::Short => "low",
        };
        let mut reasons = vec![
            format!("Broke the swing {kind} at {level:.2}"),
            format!("Retested {level:.2} within the last {window} candles"),
        ];
        reasons.extend(self.nearby_reasons(ctx, level));

        Some(Setup {
            side,
            strategy: Strategy::BreakoutRetest,
            entry,
            stop,
            method: StopMethod::TechnicalLevel,
            reasons,
            level_strength: None,
            pattern_reliability,
        })
    }

    /// Pullback to EMA21 inside an aligned trend
    fn trend_continuation(&self, ctx: &OpportunityContext<'_>, side: TradeSide) -> Option<Setup> {
        let bias = side.bias();
        if ctx.trend.direction.bias() != bias
            || ctx.structure.trend_confirmation.ema_alignment != bias
        {
            return None;
        }
        let last = ctx.candles.last()?;
        let ema21 = ctx.frame.ema().ema21;
        let reach = ema21 * self.params.max_entry_distance_pct / 100.0;

        // Touched the EMA band and closed on the trend side of it
        let pulled_back = match side {
            TradeSide::Long => last.low <= ema21 + reach && last.close > ema21,
            TradeSide::Short => last.high >= ema21 - reach && last.close < ema21,
        };
        if !pulled_back {
            return None;
        }

        let atr = ctx.frame.atr();
        if atr <= 0.0 {
            return None;
        }
        let entry = last.close;
        let stop = entry - side.sign() * atr * self.params.trend_stop_atr_multiple;
        let pattern_reliability = self
            .confirming_pattern(ctx, side)
            .map_or(0.0, |p| p.reliability);

        let mut reasons = vec![
            format!(
                "{} trend (strength {:.2})",
                match side {
                    TradeSide::Long => "Up",
                    TradeSide::Short => "Down",
                },
                ctx.trend.strength
            ),
            format!("Pullback to EMA21 at {ema21:.2}"),
            "EMAs aligned with the trend".to_string(),
        ];
        if pattern_reliability > 0.0 {
            reasons.push(format!("Confirming pattern (reliability {pattern_reliability:.2})"));
        }

        Some(Setup {
            side,
            strategy: Strategy::TrendContinuation,
            entry,
            stop,
            method: StopMethod::Atr,
            reasons,
            level_strength: None,
            pattern_reliability,
        })
    }

    // ------------------------------------------------------------
    // Assembly
    // ------------------------------------------------------------

    /// Targets beyond `entry`: opposing SR levels and Fibonacci extensions,
    /// nearest first, falling back to 2R / 3R projections
    fn targets(
        &self,
        ctx: &OpportunityContext<'_>,
        side: TradeSide,
        entry: f64,
        risk: f64,
    ) -> Vec<TakeProfitLevel> {
        let sign = side.sign();
        let beyond = |price: f64| price.is_finite() && sign * (price - entry) > 0.0;
        let min_strength = self.params.min_level_strength.get();

        let (opposing, level_name) = match side {
            TradeSide::Long => (&ctx.levels.resistance, "SR resistance"),
            TradeSide::Short => (&ctx.levels.support, "SR support"),
        };
        let mut candidates: Vec<(f64, String)> = opposing
            .iter()
            .filter(|l| l.strength >= min_strength && beyond(l.price))
            .map(|l| (l.price, level_name.to_string()))
            .collect();
        if let Some(fib) = &ctx.frame.indicators.fibonacci {
            candidates.extend(
                fib.extension
                    .iter()
                    .filter(|(_, p)| beyond(**p))
                    .map(|(label, p)| (*p, format!("Fibonacci {label} extension"))),
            );
        }
        candidates.sort_by(|a, b| (a.0 - entry).abs().total_cmp(&(b.0 - entry).abs()));
        candidates.dedup_by(|a, b| (a.0 - b.0).abs() <= entry * 1e-6);

        if candidates.is_empty() {
            candidates = [2.0, 3.0]
                .iter()
                .map(|r| (entry + sign * r * risk, format!("{r}R projection")))
                .collect();
        }
        candidates.truncate(self.params.max_targets.get());

        let allocation = allocate_position(candidates.len());
        candidates
            .into_iter()
            .zip(allocation)
            .enumerate()
            .map(|(i, ((price, target), pct))| TakeProfitLevel {
                level: i + 1,
                price,
                distance_pct: (price - entry).abs() / entry * 100.0,
                target,
                position_close_pct: pct,
            })
            .collect()
    }

    fn confidence(
        &self,
        ctx: &OpportunityContext<'_>,
        setup: &Setup,
        ratio: f64,
    ) -> ConfidenceInfo {
        let p = &self.params;
        let bias = setup.side.bias();

        let trend_part = if ctx.trend.direction.bias() == bias {
            0.5 + 0.5 * ctx.trend.strength
        } else if ctx.trend.direction == TrendDirection::Sideways {
            0.3
        } else {
            0.0
        };
        let confirmation = &ctx.structure.trend_confirmation;
        let confirmation_part = if confirmation.bias() == bias {
            confirmation.confirmation_score / 100.0
        } else {
            0.0
        };
        let trend_factor = (0.6 * trend_part + 0.4 * confirmation_part).clamp(0.0, 1.0);

        let in_zone = ctx
            .structure
            .key_level_confluence
            .confluence_zones
            .iter()
            .any(|z| z.contains(setup.entry, 0.0));
        let level_strength = setup.level_strength.unwrap_or(UNANCHORED_LEVEL_STRENGTH);
        let confluence_factor =
            (0.75 * level_strength + if in_zone { 0.25 } else { 0.0 }).clamp(0.0, 1.0);

        let pattern_factor = setup.pattern_reliability.clamp(0.0, 1.0);
        let rr_factor = ((ratio - 1.0) / 3.0).clamp(0.0, 1.0);

        let raw = p.base_confidence
            + p.trend_confidence_weight * trend_factor
            + p.confluence_confidence_weight * confluence_factor
            + p.pattern_confidence_weight * pattern_factor
            + p.risk_reward_confidence_weight * rr_factor;
        let score = raw.clamp(0.0, 100.0).round() as u32;

        let level = if f64::from(score) >= p.high_confidence {
            ConfidenceLevel::High
        } else if f64::from(score) >= p.medium_confidence {
            ConfidenceLevel::Medium
        } else {
            ConfidenceLevel::Low
        };

        let mut factors = Vec::new();
        if trend_factor >= 0.5 {
            factors.push("Trend aligned with the trade".to_string());
        }
        if confluence_factor >= 0.6 {
            factors.push("Strong level confluence".to_string());
        }
        if pattern_factor > 0.0 {
            factors.push("Confirming candlestick pattern".to_string());
        }
        if rr_factor >= 0.5 {
            factors.push("Favourable risk/reward".to_string());
        }
        if confirmation.bias() == bias && confirmation.bias() != Direction::Neutral {
            factors.push(format!("Trend confirmation {:?}", confirmation.strength));
        }

        ConfidenceInfo {
            score,
            level,
            factors,
        }
    }

    fn build(
        &self,
        ctx: &OpportunityContext<'_>,
        setup: Setup,
        now_ms: i64,
    ) -> Option<TradingOpportunity> {
        let entry = setup.entry;
        let risk = (entry - setup.stop).abs();
        if !(entry > 0.0 && risk > 0.0 && risk.is_finite()) {
            return None;
        }
        // Stop on the wrong side of the entry
        if setup.side.sign() * (entry - setup.stop) <= 0.0 {
            return None;
        }

        let take_profit = self.targets(ctx, setup.side, entry, risk);
        if take_profit.is_empty() {
            return None;
        }
        let reward = (weighted_target(&take_profit) - entry).abs();
        let ratio = reward / risk;
        let risk_reward = RiskRewardInfo {
            ratio,
            risk_amount: risk,
            reward_amount: reward,
            risk_pct: risk / entry * 100.0,
            reward_pct: reward / entry * 100.0,
        };
        let confidence = self.confidence(ctx, &setup, ratio);

        let timestamp = ctx.timestamp();
        let candles = i64::try_from(self.params.validity_candles.get()).unwrap_or(i64::MAX);
        let horizon = ctx.interval.duration_ms().saturating_mul(candles);
        trace!(
            strategy = setup.strategy.as_str(),
            side = setup.side.as_str(),
            ratio,
            confidence = confidence.score,
            "opportunity built"
        );

        Some(TradingOpportunity {
            id: format!(
                "opp_{}_{}_{}_{}",
                ctx.symbol.to_lowercase(),
                setup.strategy.as_str(),
                setup.side.as_str(),
                timestamp
            ),
            symbol: ctx.symbol.to_string(),
            side: setup.side,
            strategy: setup.strategy,
            timestamp,
            entry: EntryPoint {
                price: entry,
                reasons: setup.reasons,
            },
            stop_loss: StopLossInfo {
                price: setup.stop,
                distance_pct: risk / entry * 100.0,
                method: setup.method,
            },
            take_profit,
            risk_reward,
            confidence,
            validity: ValidityInfo {
                expires_at: now_ms.saturating_add(horizon),
                status: OpportunityStatus::Active,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AnalysisConfig, IndicatorParams, StructureParams};
    use crate::indicators::IndicatorEngine;
    use crate::model::PatternKind;
    use crate::structure::MarketStructureAnalyzer;
    use crate::Period;

    #[test]
    fn test_allocation_sums_to_100() {
        assert_eq!(allocate_position(0), Vec::<u32>::new());
        assert_eq!(allocate_position(1), vec![100]);
        assert_eq!(allocate_position(2), vec![67, 33]);
        assert_eq!(allocate_position(3), vec![51, 33, 16]);
        for n in 1..=10 {
            let pct = allocate_position(n);
            assert_eq!(pct.iter().sum::<u32>(), 100);
            assert!(pct.windows(2).all(|w| w[0] >= w[1]));
        }
    }

    #[test]
    fn test_weighted_target() {
        let level = |price, pct| TakeProfitLevel {
            level: 1,
            price,
            distance_pct: 0.0,
            target: String::new(),
            position_close_pct: pct,
        };
        let targets = vec![level(110.0, 50), level(120.0, 50)];
        assert!((weighted_target(&targets) - 115.0).abs() < 1e-9);
    }

    /// Flat market at 100 with ATR 1, a strong support at 99.5 and a
    /// resistance at 104
    struct Fixture {
        candles: Vec<Candle>,
        frame: IndicatorFrame,
        levels: SrLevels,
        patterns: Vec<CandlestickPattern>,
        trend: TrendAnalysis,
        structure: MarketStructure,
    }

    fn flat_candles() -> Vec<Candle> {
        (0..250)
            .map(|i| Candle::new(i * 60_000, 100.0, 100.5, 99.5, 100.0, 10.0))
            .collect()
    }

    /// Flat candles with a swing high of 102 at index 240 and a last candle
    /// closing at 102.5 after wicking back to the level
    fn swing_high_candles() -> Vec<Candle> {
        let mut candles = flat_candles();
        candles[240] = Candle::new(240 * 60_000, 100.0, 102.0, 99.6, 100.2, 10.0);
        candles[249] = Candle::new(249 * 60_000, 101.9, 102.8, 101.8, 102.5, 10.0);
        candles
    }

    impl Fixture {
        fn new() -> Self {
            Self::with_candles(flat_candles())
        }

        fn with_candles(candles: Vec<Candle>) -> Self {
            let mut frame = IndicatorEngine::new(IndicatorParams::default())
                .compute(&candles)
                .unwrap();
            frame.indicators.atr.value = 1.0;
            frame.indicators.fibonacci = None;
            let levels = SrLevels {
                resistance: vec![SrLevel { price: 104.0, strength: 0.8 }],
                support: vec![SrLevel { price: 99.5, strength: 0.9 }],
            };
            let patterns = vec![CandlestickPattern {
                pattern: "Hammer".into(),
                kind: PatternKind::Single,
                direction: Direction::Bullish,
                position: 248,
                reliability: 0.75,
                description: String::new(),
            }];
            let trend = TrendAnalysis {
                direction: TrendDirection::Sideways,
                strength: 0.9,
                change_probability: 0.3,
            };
            let structure = MarketStructureAnalyzer::new(StructureParams::default()).analyze(
                &candles,
                &frame,
                &levels,
                &patterns,
                &trend,
            );
            Self {
                candles,
                frame,
                levels,
                patterns,
                trend,
                structure,
            }
        }

        fn ctx(&self) -> OpportunityContext<'_> {
            OpportunityContext {
                symbol: "ETHUSDT",
                interval: Interval::Hour1,
                candles: &self.candles,
                frame: &self.frame,
                levels: &self.levels,
                patterns: &self.patterns,
                trend: &self.trend,
                structure: &self.structure,
            }
        }
    }

    #[test]
    fn test_support_bounce() {
        let fx = Fixture::new();
        let generator = OpportunityGenerator::new(OpportunityParams::default());
        let response = generator.generate(&fx.ctx(), 0.0, 1_000);

        assert_eq!(response.opportunities.len(), 1);
        let opp = &response.opportunities[0];
        assert_eq!(opp.side, TradeSide::Long);
        assert_eq!(opp.strategy, Strategy::SupportBounce);
        assert_eq!(opp.id, format!("opp_ethusdt_support_bounce_long_{}", 249 * 60_000));
        assert_eq!(opp.timestamp, 249 * 60_000);

        // Entry 0.2% above support, stop max(1.5%, 1 ATR) below it
        assert!((opp.entry.price - 99.5 * 1.002).abs() < 1e-9);
        assert!((opp.stop_loss.price - (99.5 - 99.5 * 0.015)).abs() < 1e-9);
        assert_eq!(opp.stop_loss.method, StopMethod::TechnicalLevel);

        assert_eq!(opp.take_profit.len(), 1);
        assert_eq!(opp.take_profit[0].price, 104.0);
        assert_eq!(opp.take_profit[0].position_close_pct, 100);

        let risk = opp.entry.price - opp.stop_loss.price;
        let reward = 104.0 - opp.entry.price;
        assert!((opp.risk_reward.ratio - reward / risk).abs() < 1e-9);

        assert_eq!(opp.validity.status, OpportunityStatus::Active);
        assert_eq!(opp.validity.expires_at, 1_000 + 4 * 3_600_000);
        assert!(opp.confidence.score <= 100);
        assert_eq!(response.summary.avg_risk_reward, opp.risk_reward.ratio);
    }

    #[test]
    fn test_breakout_needs_an_earlier_close_beyond_the_swing() {
        // Only the current candle is above the swing high
        let fx = Fixture::with_candles(swing_high_candles());
        let generator = OpportunityGenerator::new(OpportunityParams::default());
        let response = generator.generate(&fx.ctx(), 0.0, 0);
        assert!(response
            .opportunities
            .iter()
            .all(|o| o.strategy != Strategy::BreakoutRetest));
    }

    #[test]
    fn test_breakout_then_retest() {
        let mut candles = swing_high_candles();
        candles[247] = Candle::new(247 * 60_000, 100.0, 102.4, 99.9, 102.3, 10.0);
        let fx = Fixture::with_candles(candles);
        let generator = OpportunityGenerator::new(OpportunityParams::default());
        let response = generator.generate(&fx.ctx(), 0.0, 0);

        let opp = response
            .opportunities
            .iter()
            .find(|o| o.strategy == Strategy::BreakoutRetest)
            .expect("breakout retest");
        assert_eq!(opp.side, TradeSide::Long);
        assert!((opp.entry.price - 102.0 * 1.002).abs() < 1e-9);
        assert!((opp.stop_loss.price - (102.0 - 102.0 * 0.015)).abs() < 1e-9);
    }

    #[test]
    fn test_validity_saturates() {
        let fx = Fixture::new();
        let params = OpportunityParams {
            validity_candles: Period::new_const(usize::MAX),
            ..OpportunityParams::default()
        };
        let generator = OpportunityGenerator::new(params);
        let response = generator.generate(&fx.ctx(), 0.0, i64::MAX - 1);
        assert!(!response.is_empty());
        assert!(response
            .opportunities
            .iter()
            .all(|o| o.validity.expires_at == i64::MAX));

        let generator = OpportunityGenerator::new(OpportunityParams::default());
        let response = generator.generate(&fx.ctx(), 0.0, i64::MAX - 1);
        assert_eq!(response.opportunities[0].validity.expires_at, i64::MAX);
    }

    #[test]
    fn test_min_risk_reward_filters() {
        let fx = Fixture::new();
        let generator = OpportunityGenerator::new(OpportunityParams::default());
        let response = generator.generate(&fx.ctx(), 50.0, 0);
        assert!(response.is_empty());
        assert_eq!(response.summary.total_opportunities, 0);
        assert_eq!(response.summary.avg_risk_reward, 0.0);
    }

    #[test]
    fn test_no_pattern_no_bounce() {
        let mut fx = Fixture::new();
        fx.patterns.clear();
        let generator = OpportunityGenerator::new(OpportunityParams::default());
        let response = generator.generate(&fx.ctx(), 0.0, 0);
        assert!(response
            .opportunities
            .iter()
            .all(|o| o.strategy != Strategy::SupportBounce));
    }

    #[test]
    fn test_fallback_projections() {
        let mut fx = Fixture::new();
        fx.levels.resistance.clear();
        let generator = OpportunityGenerator::new(OpportunityParams::default());
        let response = generator.generate(&fx.ctx(), 0.0, 0);
        let opp = &response.opportunities[0];
        assert_eq!(opp.take_profit.len(), 2);
        assert_eq!(opp.take_profit[0].target, "2R projection");
        assert_eq!(
            opp.take_profit.iter().map(|t| t.position_close_pct).sum::<u32>(),
            100
        );
        // 67% at 2R and 33% at 3R
        assert!((opp.risk_reward.ratio - 2.33).abs() < 1e-9);
    }

    #[test]
    fn test_update_status() {
        let fx = Fixture::new();
        let generator = OpportunityGenerator::new(OpportunityParams::default());
        let base = generator.generate(&fx.ctx(), 0.0, 0).opportunities[0].clone();
        let entry = base.entry.price;
        let stop = base.stop_loss.price;
        let expires = base.validity.expires_at;
        let bar = |low: f64, high: f64| Candle::new(0, high, high, low, low, 1.0);

        let mut opp = base.clone();
        let status = update_status(&mut opp, 0, &[bar(entry + 0.5, entry + 1.0)]);
        assert_eq!(status, OpportunityStatus::Active);

        let mut opp = base.clone();
        let status = update_status(&mut opp, 0, &[bar(entry - 0.1, entry + 0.5)]);
        assert_eq!(status, OpportunityStatus::Triggered);

        // Stop breach wins over a fill on the same candle
        let mut opp = base.clone();
        let status = update_status(&mut opp, 0, &[bar(stop - 0.1, entry + 0.5)]);
        assert_eq!(status, OpportunityStatus::Invalidated);

        let mut opp = base.clone();
        let none: [Candle; 0] = [];
        assert_eq!(update_status(&mut opp, expires + 1, &none), OpportunityStatus::Expired);
        // Terminal states stay put
        assert_eq!(update_status(&mut opp, 0, &none), OpportunityStatus::Expired);
    }

    #[test]
    fn test_ranking() {
        let fx = Fixture::new();
        let config = AnalysisConfig::default();
        let generator = OpportunityGenerator::new(config.opportunities);
        let response = generator.generate(&fx.ctx(), 0.0, 0);
        for w in response.opportunities.windows(2) {
            let (a, b) = (&w[0], &w[1]);
            assert!(
                a.confidence.score > b.confidence.score
                    || (a.confidence.score == b.confidence.score
                        && a.risk_reward.ratio >= b.risk_reward.ratio)
            );
        }
    }
}
