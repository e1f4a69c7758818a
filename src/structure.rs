//! Market structure assessment
//!
//! Combines swing structure, trend confirmation, volatility, key-level
//! confluence and recent pattern signals into one [`MarketStructure`] with an
//! auditable quality score.

use std::collections::{BTreeMap, BTreeSet};

use crate::config::StructureParams;
use crate::indicators::IndicatorFrame;
use crate::model::{
    CandlestickPattern, ConfluenceLevel, ConfluenceZone, Direction, KeyLevelConfluence, LevelKind,
    MarketQuality, MarketStructure, PatternSignals, PricePosition, RiskAdjustment, RiskLevel,
    Significance, SignalStrength, SrLevel, SrLevels, TrendAnalysis, TrendConfirmation,
    TrendDirection, VolatilityLevel, VolatilityProfile,
};
use crate::OHLCV;

// ============================================================
// SWINGS
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SwingPoint {
    pub index: usize,
    pub price: f64,
}

/// Swing highs and lows, oldest first
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Swings {
    pub highs: Vec<SwingPoint>,
    pub lows: Vec<SwingPoint>,
}

/// Strict swing points: a high above, or a low below, every candle within `lookback`
pub fn swing_points<T: OHLCV>(bars: &[T], lookback: usize) -> Swings {
    let mut swings = Swings::default();
    let n = bars.len();
    if lookback == 0 {
        return swings;
    }
    for i in lookback..n.saturating_sub(lookback) {
        let mut neighbours = (i - lookback..=i + lookback).filter(|&j| j != i);
        let high = bars[i].high();
        let low = bars[i].low();
        if neighbours.clone().all(|j| bars[j].high() < high) {
            swings.highs.push(SwingPoint { index: i, price: high });
        }
        if neighbours.all(|j| bars[j].low() > low) {
            swings.lows.push(SwingPoint { index: i, price: low });
        }
    }
    swings
}

/// Compare the last two points: `Some(true)` when the latest is higher
fn last_two_rising(points: &[SwingPoint]) -> Option<bool> {
    match points {
        [.., prev, last] => Some(last.price > prev.price),
        _ => None,
    }
}

// ============================================================
// CONFLUENCE SOURCES
// ============================================================

/// Independent kinds of evidence a price level can come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum FactorType {
    SupportResistance,
    Fibonacci,
    RoundNumber,
    Structure,
    MovingAverage,
}

#[derive(Debug, Clone, PartialEq)]
struct Candidate {
    price: f64,
    source: FactorType,
    label: String,
}

/// Swing points of each side considered as structure levels
const STRUCTURE_LEVELS: usize = 5;
/// Round numbers are searched within this fraction of the close
const ROUND_NUMBER_SPAN: f64 = 0.10;

/// Multiples of one tenth of the close's order of magnitude near the close
pub fn round_numbers(close: f64) -> Vec<f64> {
    if !(close.is_finite() && close > 0.0) {
        return Vec::new();
    }
    let step = 10f64.powf(close.log10().floor() - 1.0);
    let lo = (close * (1.0 - ROUND_NUMBER_SPAN) / step).ceil() as i64;
    let hi = (close * (1.0 + ROUND_NUMBER_SPAN) / step).floor() as i64;
    (lo..=hi).map(|k| k as f64 * step).collect()
}

fn sr_label(kind: LevelKind) -> &'static str {
    match kind {
        LevelKind::Support => "Support level",
        LevelKind::Resistance => "Resistance level",
    }
}

// ============================================================
// ANALYZER
// ============================================================

#[derive(Debug, Clone)]
pub struct MarketStructureAnalyzer {
    params: StructureParams,
}

impl MarketStructureAnalyzer {
    pub fn new(params: StructureParams) -> Self {
        Self { params }
    }

    pub fn analyze<T: OHLCV>(
        &self,
        bars: &[T],
        frame: &IndicatorFrame,
        levels: &SrLevels,
        patterns: &[CandlestickPattern],
        trend: &TrendAnalysis,
    ) -> MarketStructure {
        let close = bars.last().map(|b| b.close()).unwrap_or_default();
        let swings = swing_points(bars, self.params.swing_lookback.get());

        let higher_high = last_two_rising(&swings.highs);
        let higher_low = last_two_rising(&swings.lows);
        let structure_break = match trend.direction {
            TrendDirection::Up => higher_low == Some(false),
            TrendDirection::Down => higher_high == Some(true),
            TrendDirection::Sideways => false,
        };
        let risk_level = if structure_break {
            RiskLevel::High
        } else {
            match trend.direction {
                TrendDirection::Up if higher_high == Some(true) && higher_low == Some(true) => {
                    RiskLevel::Low
                }
                TrendDirection::Down if higher_high == Some(false) && higher_low == Some(false) => {
                    RiskLevel::Low
                }
                _ => RiskLevel::Medium,
            }
        };

        let trend_confirmation = self.trend_confirmation(close, frame, trend);
        let volatility_profile = self.volatility_profile(close, frame);
        let key_level_confluence = self.key_level_confluence(close, frame, levels, &swings);
        let pattern_signals = self.pattern_signals(bars.len(), patterns);
        let market_quality = self.market_quality(
            trend,
            structure_break,
            &trend_confirmation,
            &volatility_profile,
            &key_level_confluence,
            &pattern_signals,
        );

        MarketStructure {
            higher_high: higher_high == Some(true),
            higher_low: higher_low == Some(true),
            structure_break,
            risk_level,
            trend_confirmation,
            volatility_profile,
            key_level_confluence,
            pattern_signals,
            market_quality,
        }
    }

    // ------------------------------------------------------------
    // Trend confirmation
    // ------------------------------------------------------------

    pub fn trend_confirmation(
        &self,
        close: f64,
        frame: &IndicatorFrame,
        trend: &TrendAnalysis,
    ) -> TrendConfirmation {
        let eps = close.abs() * 1e-9;
        let ema = frame.ema().as_array();
        let macd = &frame.indicators.macd;

        let ema_alignment = if ema.windows(2).all(|w| w[0] - w[1] > eps) {
            Direction::Bullish
        } else if ema.windows(2).all(|w| w[1] - w[0] > eps) {
            Direction::Bearish
        } else {
            Direction::Neutral
        };

        let macd_signal = if macd.dif > eps && macd.histogram > -eps {
            Direction::Bullish
        } else if macd.dif < -eps && macd.histogram < eps {
            Direction::Bearish
        } else {
            Direction::Neutral
        };

        let price_vs_ema = if ema.iter().all(|e| close - e > eps) {
            PricePosition::AboveAll
        } else if ema.iter().all(|e| e - close > eps) {
            PricePosition::BelowAll
        } else {
            PricePosition::Mixed
        };

        let mut confirmation = TrendConfirmation {
            ema_alignment,
            macd_signal,
            price_vs_ema,
            confirmation_score: 0.0,
            strength: SignalStrength::Weak,
        };

        // Signals are checked against the trend, or against their own
        // majority when the trend is sideways
        let reference = match trend.direction.bias() {
            Direction::Neutral => confirmation.bias(),
            bias => bias,
        };
        if reference != Direction::Neutral {
            let price_bias = match price_vs_ema {
                PricePosition::AboveAll => Direction::Bullish,
                PricePosition::BelowAll => Direction::Bearish,
                PricePosition::Mixed => Direction::Neutral,
            };
            let votes = [(ema_alignment, 40.0), (macd_signal, 30.0), (price_bias, 30.0)];
            confirmation.confirmation_score = votes
                .iter()
                .filter(|(signal, _)| *signal == reference)
                .map(|(_, weight)| weight)
                .sum();
        }
        confirmation.strength = match confirmation.confirmation_score {
            s if s >= 70.0 => SignalStrength::Strong,
            s if s >= 40.0 => SignalStrength::Moderate,
            _ => SignalStrength::Weak,
        };
        confirmation
    }

    // ------------------------------------------------------------
    // Volatility
    // ------------------------------------------------------------

    pub fn volatility_profile(&self, close: f64, frame: &IndicatorFrame) -> VolatilityProfile {
        let current_atr = frame.atr();
        let atr_percentage = if close > 0.0 {
            current_atr / close * 100.0
        } else {
            0.0
        };

        let volatility_level = if atr_percentage > self.params.high_volatility_pct {
            VolatilityLevel::High
        } else if atr_percentage < self.params.low_volatility_pct {
            VolatilityLevel::Low
        } else {
            VolatilityLevel::Normal
        };

        let history = &frame.atr_history;
        let window = self.params.expansion_window.get().min(history.len());
        let is_expanding = window > 0 && {
            let recent = &history[history.len() - window..];
            let mean = recent.iter().sum::<f64>() / window as f64;
            current_atr > mean * self.params.expansion_factor
        };

        let risk_adjustment = match (volatility_level, is_expanding) {
            (VolatilityLevel::High, _) => RiskAdjustment::Reduce,
            (VolatilityLevel::Low, false) => RiskAdjustment::Increase,
            _ => RiskAdjustment::Standard,
        };

        VolatilityProfile {
            current_atr,
            atr_percentage,
            volatility_level,
            is_expanding,
            risk_adjustment,
        }
    }

    // ------------------------------------------------------------
    // Key levels
    // ------------------------------------------------------------

    fn candidates(
        &self,
        close: f64,
        frame: &IndicatorFrame,
        levels: &SrLevels,
        swings: &Swings,
    ) -> Vec<Candidate> {
        let mut out = Vec::new();
        let mut push = |price: f64, source: FactorType, label: String| {
            if price.is_finite() && price > 0.0 {
                out.push(Candidate { price, source, label });
            }
        };

        for level in &levels.support {
            push(level.price, FactorType::SupportResistance, sr_label(LevelKind::Support).into());
        }
        for level in &levels.resistance {
            push(
                level.price,
                FactorType::SupportResistance,
                sr_label(LevelKind::Resistance).into(),
            );
        }
        if let Some(fib) = &frame.indicators.fibonacci {
            for (label, price) in fib.labelled_levels() {
                push(price, FactorType::Fibonacci, label);
            }
        }
        for price in round_numbers(close) {
            push(price, FactorType::RoundNumber, format!("Round number {price}"));
        }
        for swing in swings.highs.iter().rev().take(STRUCTURE_LEVELS) {
            push(swing.price, FactorType::Structure, "Swing high".into());
        }
        for swing in swings.lows.iter().rev().take(STRUCTURE_LEVELS) {
            push(swing.price, FactorType::Structure, "Swing low".into());
        }
        let ema = frame.ema();
        for (name, price) in [
            ("EMA9", ema.ema9),
            ("EMA21", ema.ema21),
            ("EMA50", ema.ema50),
            ("EMA200", ema.ema200),
        ] {
            push(price, FactorType::MovingAverage, name.into());
        }
        out
    }

    pub fn key_level_confluence(
        &self,
        close: f64,
        frame: &IndicatorFrame,
        levels: &SrLevels,
        swings: &Swings,
    ) -> KeyLevelConfluence {
        let tolerance = self.params.confluence_tolerance.get() * close;
        let mut candidates = self.candidates(close, frame, levels, swings);
        candidates.sort_by(|a, b| a.price.total_cmp(&b.price));

        let nearest = |level: Option<&SrLevel>, kind: LevelKind| {
            level.map(|l| self.confluence_level(close, tolerance, l, kind, &candidates))
        };
        let nearest_support = nearest(levels.support.first(), LevelKind::Support);
        let nearest_resistance = nearest(levels.resistance.first(), LevelKind::Resistance);

        let mut confluence_zones = self.zones(tolerance, &candidates);
        confluence_zones.sort_by(|a, b| {
            let mid = |z: &ConfluenceZone| (z.price_range[0] + z.price_range[1]) / 2.0;
            (mid(a) - close).abs().total_cmp(&(mid(b) - close).abs())
        });

        KeyLevelConfluence {
            nearest_support,
            nearest_resistance,
            confluence_zones,
        }
    }

    fn confluence_level(
        &self,
        close: f64,
        tolerance: f64,
        level: &SrLevel,
        kind: LevelKind,
        candidates: &[Candidate],
    ) -> ConfluenceLevel {
        let mut factors = vec![sr_label(kind).to_string()];
        let mut types = BTreeSet::from([FactorType::SupportResistance]);
        for c in candidates {
            if c.source != FactorType::SupportResistance
                && (c.price - level.price).abs() <= tolerance
            {
                types.insert(c.source);
                if !factors.contains(&c.label) {
                    factors.push(c.label.clone());
                }
            }
        }
        let distance = if close > 0.0 {
            (close - level.price).abs() / close * 100.0
        } else {
            0.0
        };
        let strength =
            (level.strength * 60.0 + (types.len() as f64 - 1.0) * 20.0).clamp(0.0, 100.0);
        ConfluenceLevel {
            price: level.price,
            distance,
            factors,
            strength,
            kind,
        }
    }

    /// Sweep price-sorted candidates into bands no wider than `tolerance`
    fn zones(&self, tolerance: f64, candidates: &[Candidate]) -> Vec<ConfluenceZone> {
        let min_types = self.params.zone_min_factors.get();
        let mut zones = Vec::new();
        let mut start = 0;
        while start < candidates.len() {
            let low = candidates[start].price;
            let end = candidates[start..]
                .iter()
                .position(|c| c.price - low > tolerance)
                .map_or(candidates.len(), |offset| start + offset);
            let band = &candidates[start..end];

            let types: BTreeSet<FactorType> = band.iter().map(|c| c.source).collect();
            if types.len() >= min_types {
                let mut factors: Vec<String> = Vec::new();
                for c in band {
                    if !factors.contains(&c.label) {
                        factors.push(c.label.clone());
                    }
                }
                let significance = match types.len() {
                    n if n >= 4 => Significance::Critical,
                    3 => Significance::Important,
                    _ => Significance::Moderate,
                };
                zones.push(ConfluenceZone {
                    price_range: [low, band[band.len() - 1].price],
                    factors,
                    strength: (types.len() as f64 * 25.0).min(100.0),
                    significance,
                });
            }
            start = end;
        }
        zones
    }

    // ------------------------------------------------------------
    // Patterns
    // ------------------------------------------------------------

    pub fn pattern_signals(&self, len: usize, patterns: &[CandlestickPattern]) -> PatternSignals {
        let first_recent = len.saturating_sub(self.params.recent_window.get());
        let newest = len.saturating_sub(1);
        let recent: Vec<&CandlestickPattern> =
            patterns.iter().filter(|p| p.position >= first_recent).collect();

        let bullish_count = recent.iter().filter(|p| p.direction.is_bullish()).count();
        let bearish_count = recent.iter().filter(|p| p.direction.is_bearish()).count();
        let dominant_signal = match bullish_count.cmp(&bearish_count) {
            std::cmp::Ordering::Greater => Direction::Bullish,
            std::cmp::Ordering::Less => Direction::Bearish,
            std::cmp::Ordering::Equal => Direction::Neutral,
        };

        // Newer patterns weigh more
        let (weighted, total) = recent.iter().fold((0.0, 0.0), |(sum, total), p| {
            let age = newest.saturating_sub(p.position) as f64;
            let w = 1.0 / (1.0 + age);
            (sum + w * p.reliability, total + w)
        });
        let pattern_reliability = if total > 0.0 {
            (weighted / total * 100.0).clamp(0.0, 100.0)
        } else {
            0.0
        };

        PatternSignals {
            recent_patterns: recent.iter().map(|p| p.pattern.clone()).collect(),
            bullish_count,
            bearish_count,
            dominant_signal,
            pattern_reliability,
        }
    }

    // ------------------------------------------------------------
    // Quality
    // ------------------------------------------------------------

    fn market_quality(
        &self,
        trend: &TrendAnalysis,
        structure_break: bool,
        confirmation: &TrendConfirmation,
        volatility: &VolatilityProfile,
        confluence: &KeyLevelConfluence,
        signals: &PatternSignals,
    ) -> MarketQuality {
        let trend_score = {
            let directional = match trend.direction {
                TrendDirection::Sideways => 0.0,
                _ => trend.strength * 100.0,
            };
            let penalty = if structure_break { 20.0 } else { 0.0 };
            (0.6 * confirmation.confirmation_score + 0.4 * directional - penalty).clamp(0.0, 100.0)
        };

        let volatility_score = {
            let base: f64 = match volatility.volatility_level {
                VolatilityLevel::Normal => 90.0,
                VolatilityLevel::Low => 60.0,
                VolatilityLevel::High => 35.0,
            };
            let penalty = if volatility.is_expanding { 10.0 } else { 0.0 };
            (base - penalty).max(0.0)
        };

        let confluence_score = confluence
            .nearest_support
            .iter()
            .chain(&confluence.nearest_resistance)
            .map(|l| l.strength)
            .chain(confluence.confluence_zones.iter().map(|z| z.strength))
            .fold(0.0, f64::max);

        let pattern_score = match (signals.dominant_signal, trend.direction.bias()) {
            (Direction::Neutral, _) => 50.0,
            (signal, bias) if signal == bias => signals.pattern_reliability,
            (_, Direction::Neutral) => 0.75 * signals.pattern_reliability,
            _ => 0.5 * (100.0 - signals.pattern_reliability),
        };

        let weights = self.params.quality_weights();
        let total: f64 = weights.iter().sum();
        let subs = [
            ("trend", trend_score),
            ("volatility", volatility_score),
            ("confluence", confluence_score),
            ("pattern", pattern_score),
        ];
        let score_breakdown: BTreeMap<String, f64> = subs
            .iter()
            .zip(weights)
            .map(|((name, score), w)| (name.to_string(), score * w / total))
            .collect();
        let overall_score = score_breakdown.values().sum::<f64>();

        let mut strengths = Vec::new();
        let mut weaknesses = Vec::new();
        let mut judge = |score: f64, good: &str, bad: &str| {
            if score >= 70.0 {
                strengths.push(good.to_string());
            } else if score < 40.0 {
                weaknesses.push(bad.to_string());
            }
        };
        judge(
            trend_score,
            "Trend confirmed by EMAs, MACD and price position",
            "Trend signals are weak or conflicting",
        );
        judge(
            volatility_score,
            "Volatility suits normal position sizing",
            "Volatility is unfavourable for position sizing",
        );
        judge(
            confluence_score,
            "Price is near a strong confluence of key levels",
            "No strong key-level confluence nearby",
        );
        judge(
            pattern_score,
            "Recent candlestick patterns agree with the trend",
            "Recent candlestick patterns are absent or conflicting",
        );
        if structure_break {
            weaknesses.push("Market structure broke against the trend".to_string());
        }

        let grade = match overall_score {
            s if s >= 80.0 => "A",
            s if s >= 65.0 => "B",
            s if s >= 50.0 => "C",
            s if s >= 35.0 => "D",
            _ => "F",
        };
        let (trading_condition, recommendation) = match overall_score {
            s if s >= 75.0 => (
                "EXCELLENT",
                "Favourable conditions: trade with the trend at key levels",
            ),
            s if s >= 60.0 => ("GOOD", "Tradeable: wait for confirmation at key levels"),
            s if s >= 45.0 => ("FAIR", "Selective: reduce size and require strong setups"),
            _ => ("POOR", "Stand aside until trend and structure improve"),
        };

        MarketQuality {
            overall_score,
            grade: grade.to_string(),
            trading_condition: trading_condition.to_string(),
            strengths,
            weaknesses,
            recommendation: recommendation.to_string(),
            score_breakdown,
        }
    }
}
