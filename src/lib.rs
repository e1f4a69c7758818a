//! # trendscope - candle-series market analysis
//!
//! Turns an OHLCV candle series into technical indicators, support/resistance
//! levels, candlestick patterns, a trend and market-structure assessment, and
//! ranked trade opportunities.
//!
//! ## Quick Start
//!
//! ```rust
//! use trendscope::prelude::*;
//!
//! let candles: Vec<Candle> = (0..250)
//!     .map(|i| {
//!         let c = 100.0 + i as f64 * 0.5;
//!         Candle::new(i as i64 * 3_600_000, c - 0.3, c + 0.4, c - 0.6, c, 1_000.0)
//!     })
//!     .collect();
//! let series = CandleSeries::new(candles).unwrap();
//!
//! let engine = EngineBuilder::new().build().unwrap();
//! let result = engine.analyze("BTCUSDT", "1h", &series).unwrap();
//! assert!(result.trend.direction.is_up());
//!
//! let response = engine.find_opportunities("BTCUSDT", "1h", &series, 1.5).unwrap();
//! assert_eq!(response.summary.total_opportunities, response.opportunities.len());
//! ```

use std::fmt;
use std::str::FromStr;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::debug;

pub mod config;
pub mod indicators;
pub mod levels;
pub mod model;
pub mod opportunity;
pub mod patterns;
pub mod structure;
pub mod trend;

pub mod prelude {
    pub use crate::{
        // Free functions
        analyze,
        // Configuration
        config::{
            AnalysisConfig, IndicatorParams, LevelParams, OpportunityParams, ParamMeta, ParamType,
            Parameterized, PatternParams, StructureParams, TrendParams,
        },
        find_opportunities,
        // Stages
        indicators::{IndicatorEngine, IndicatorFrame},
        levels::SupportResistanceDetector,
        // Wire types
        model::*,
        opportunity::OpportunityGenerator,
        patterns::{BuiltinDetector, PatternContext, PatternDetector, PatternRecognizer},
        structure::MarketStructureAnalyzer,
        trend::TrendAnalyzer,
        // Errors
        AnalysisError,
        // Engine
        AnalysisEngine,
        // Input
        Candle,
        CandleSeries,
        EngineBuilder,
        EngineConfig,
        Interval,
        OHLCVExt,
        Period,
        Ratio,
        Result,
        OHLCV,
    };
}

use crate::config::AnalysisConfig;
use crate::indicators::{IndicatorEngine, IndicatorFrame};
use crate::levels::SupportResistanceDetector;
use crate::model::{
    AnalysisResult, CandlestickPattern, MarketStructure, OpportunitiesResponse, SrLevels,
    TrendAnalysis,
};
use crate::opportunity::{OpportunityContext, OpportunityGenerator};
use crate::patterns::PatternRecognizer;
use crate::structure::MarketStructureAnalyzer;
use crate::trend::TrendAnalyzer;

// ============================================================
// ERRORS
// ============================================================

pub type Result<T> = std::result::Result<T, AnalysisError>;

/// Errors that can occur during analysis
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AnalysisError {
    #[error("Invalid value: {0}")]
    InvalidValue(&'static str),

    #[error("{field} = {value} out of range [{min}, {max}]")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Insufficient history for {indicator}: need {need} candles, got {got}")]
    InsufficientHistory {
        indicator: &'static str,
        need: usize,
        got: usize,
    },

    #[error("Invalid candle at index {index}: {reason}")]
    InvalidCandle { index: usize, reason: &'static str },

    #[error("Unsupported interval: {0}")]
    UnsupportedInterval(String),
}

// ============================================================
// VALIDATED TYPES
// ============================================================

/// Normalized value in range 0.0..=1.0
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Ratio(f64);

impl Ratio {
    /// Create a new Ratio, validating the value is in [0.0, 1.0]
    pub fn new(value: f64) -> Result<Self> {
        if value.is_nan() || value.is_infinite() {
            return Err(AnalysisError::InvalidValue("Ratio cannot be NaN or infinite"));
        }
        if !(0.0..=1.0).contains(&value) {
            return Err(AnalysisError::OutOfRange {
                field: "Ratio",
                value,
                min: 0.0,
                max: 1.0,
            });
        }
        Ok(Self(value))
    }

    #[doc(hidden)]
    pub const fn new_const(value: f64) -> Self {
        Self(value)
    }

    #[inline]
    pub fn get(self) -> f64 {
        self.0
    }
}

impl Serialize for Ratio {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(s)
    }
}

impl<'de> Deserialize<'de> for Ratio {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let value = f64::deserialize(d)?;
        Ratio::new(value).map_err(serde::de::Error::custom)
    }
}

/// Period (must be > 0)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Period(usize);

impl Period {
    /// Create a new Period, validating value is > 0
    pub fn new(value: usize) -> Result<Self> {
        if value == 0 {
            return Err(AnalysisError::InvalidValue("Period must be > 0"));
        }
        Ok(Self(value))
    }

    #[doc(hidden)]
    pub const fn new_const(value: usize) -> Self {
        Self(value)
    }

    #[inline]
    pub fn get(self) -> usize {
        self.0
    }
}

impl Serialize for Period {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(s)
    }
}

impl<'de> Deserialize<'de> for Period {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let value = usize::deserialize(d)?;
        Period::new(value).map_err(serde::de::Error::custom)
    }
}

// ============================================================
// OHLCV TRAITS
// ============================================================

/// Core OHLCV data trait
pub trait OHLCV {
    fn open(&self) -> f64;
    fn high(&self) -> f64;
    fn low(&self) -> f64;
    fn close(&self) -> f64;
    fn volume(&self) -> f64;

    fn timestamp(&self) -> Option<i64> {
        None
    }
}

/// Extension trait with computed properties for OHLCV data
pub trait OHLCVExt: OHLCV {
    #[inline]
    fn body(&self) -> f64 {
        (self.close() - self.open()).abs()
    }

    #[inline]
    fn range(&self) -> f64 {
        self.high() - self.low()
    }

    #[inline]
    fn upper_shadow(&self) -> f64 {
        self.high() - self.open().max(self.close())
    }

    #[inline]
    fn lower_shadow(&self) -> f64 {
        self.open().min(self.close()) - self.low()
    }

    #[inline]
    fn body_top(&self) -> f64 {
        self.open().max(self.close())
    }

    #[inline]
    fn body_bottom(&self) -> f64 {
        self.open().min(self.close())
    }

    /// Midpoint of the real body
    #[inline]
    fn body_mid(&self) -> f64 {
        (self.open() + self.close()) / 2.0
    }

    #[inline]
    fn is_bullish(&self) -> bool {
        self.close() > self.open()
    }

    #[inline]
    fn is_bearish(&self) -> bool {
        self.close() < self.open()
    }

    /// Body as ratio of range. Returns None if range ≈ 0
    #[inline]
    fn body_ratio(&self) -> Option<f64> {
        let range = self.range();
        (range > f64::EPSILON).then(|| self.body() / range)
    }

    #[inline]
    fn upper_shadow_ratio(&self) -> Option<f64> {
        let range = self.range();
        (range > f64::EPSILON).then(|| self.upper_shadow() / range)
    }

    #[inline]
    fn lower_shadow_ratio(&self) -> Option<f64> {
        let range = self.range();
        (range > f64::EPSILON).then(|| self.lower_shadow() / range)
    }

    /// Validate OHLCV data consistency
    ///
    /// The returned error carries index 0; series validation rewrites it.
    fn validate(&self) -> Result<()> {
        let values = [self.open(), self.high(), self.low(), self.close(), self.volume()];
        if values.iter().any(|v| v.is_nan()) {
            return Err(AnalysisError::InvalidCandle {
                index: 0,
                reason: "NaN in OHLCV",
            });
        }
        if values.iter().any(|v| v.is_infinite()) {
            return Err(AnalysisError::InvalidCandle {
                index: 0,
                reason: "Infinite value in OHLCV",
            });
        }
        if values.iter().any(|v| *v < 0.0) {
            return Err(AnalysisError::InvalidCandle {
                index: 0,
                reason: "negative price or volume",
            });
        }
        if self.high() < self.low() {
            return Err(AnalysisError::InvalidCandle {
                index: 0,
                reason: "high < low",
            });
        }
        if self.body_bottom() < self.low() || self.body_top() > self.high() {
            return Err(AnalysisError::InvalidCandle {
                index: 0,
                reason: "open/close outside high-low range",
            });
        }
        Ok(())
    }
}

impl<T: OHLCV> OHLCVExt for T {}

// ============================================================
// CANDLES
// ============================================================

/// One OHLCV candle; `timestamp` is the open time in Unix milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    pub fn new(timestamp: i64, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        }
    }
}

impl OHLCV for Candle {
    fn open(&self) -> f64 {
        self.open
    }

    fn high(&self) -> f64 {
        self.high
    }

    fn low(&self) -> f64 {
        self.low
    }

    fn close(&self) -> f64 {
        self.close
    }

    fn volume(&self) -> f64 {
        self.volume
    }

    fn timestamp(&self) -> Option<i64> {
        Some(self.timestamp)
    }
}

/// Validated, strictly time-ordered candle sequence
///
/// Construction rejects the whole series on the first bad candle; nothing is
/// skipped or repaired.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Candle>", into = "Vec<Candle>")]
pub struct CandleSeries {
    candles: Vec<Candle>,
}

impl CandleSeries {
    pub fn new(candles: Vec<Candle>) -> Result<Self> {
        for (i, candle) in candles.iter().enumerate() {
            candle.validate().map_err(|e| match e {
                AnalysisError::InvalidCandle { reason, .. } => {
                    AnalysisError::InvalidCandle { index: i, reason }
                }
                other => other,
            })?;
        }
        if let Some(i) = candles
            .windows(2)
            .position(|w| w[1].timestamp <= w[0].timestamp)
        {
            return Err(AnalysisError::InvalidCandle {
                index: i + 1,
                reason: "timestamps not strictly increasing",
            });
        }
        Ok(Self { candles })
    }

    #[inline]
    pub fn candles(&self) -> &[Candle] {
        &self.candles
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.candles.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    #[inline]
    pub fn last(&self) -> Option<&Candle> {
        self.candles.last()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.candles.iter().map(|c| c.close).collect()
    }
}

impl TryFrom<Vec<Candle>> for CandleSeries {
    type Error = AnalysisError;

    fn try_from(candles: Vec<Candle>) -> Result<Self> {
        Self::new(candles)
    }
}

impl From<CandleSeries> for Vec<Candle> {
    fn from(series: CandleSeries) -> Self {
        series.candles
    }
}

impl AsRef<[Candle]> for CandleSeries {
    fn as_ref(&self) -> &[Candle] {
        &self.candles
    }
}

// ============================================================
// INTERVALS
// ============================================================

/// Candle interval accepted by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Interval {
    Minute1,
    Minute3,
    Minute5,
    Minute15,
    Minute30,
    Hour1,
    Hour2,
    Hour4,
    Hour6,
    Hour8,
    Hour12,
    Day1,
    Day3,
    Week1,
    Month1,
}

const MINUTE_MS: i64 = 60_000;

impl Interval {
    pub const ALL: [Interval; 15] = [
        Interval::Minute1,
        Interval::Minute3,
        Interval::Minute5,
        Interval::Minute15,
        Interval::Minute30,
        Interval::Hour1,
        Interval::Hour2,
        Interval::Hour4,
        Interval::Hour6,
        Interval::Hour8,
        Interval::Hour12,
        Interval::Day1,
        Interval::Day3,
        Interval::Week1,
        Interval::Month1,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Interval::Minute1 => "1m",
            Interval::Minute3 => "3m",
            Interval::Minute5 => "5m",
            Interval::Minute15 => "15m",
            Interval::Minute30 => "30m",
            Interval::Hour1 => "1h",
            Interval::Hour2 => "2h",
            Interval::Hour4 => "4h",
            Interval::Hour6 => "6h",
            Interval::Hour8 => "8h",
            Interval::Hour12 => "12h",
            Interval::Day1 => "1d",
            Interval::Day3 => "3d",
            Interval::Week1 => "1w",
            Interval::Month1 => "1M",
        }
    }

    /// Length of one candle; a month counts as 30 days
    pub fn duration_ms(self) -> i64 {
        let minutes = match self {
            Interval::Minute1 => 1,
            Interval::Minute3 => 3,
            Interval::Minute5 => 5,
            Interval::Minute15 => 15,
            Interval::Minute30 => 30,
            Interval::Hour1 => 60,
            Interval::Hour2 => 120,
            Interval::Hour4 => 240,
            Interval::Hour6 => 360,
            Interval::Hour8 => 480,
            Interval::Hour12 => 720,
            Interval::Day1 => 1_440,
            Interval::Day3 => 4_320,
            Interval::Week1 => 10_080,
            Interval::Month1 => 43_200,
        };
        minutes * MINUTE_MS
    }
}

impl FromStr for Interval {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self> {
        Interval::ALL
            .into_iter()
            .find(|i| i.as_str() == s)
            .ok_or_else(|| AnalysisError::UnsupportedInterval(s.to_string()))
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================
// ANALYSIS ENGINE
// ============================================================

/// Execution settings that do not change results
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Run indicators, levels and patterns on the rayon pool
    pub parallel: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { parallel: true }
    }
}

/// Output of every stage for one series
struct Snapshot {
    frame: IndicatorFrame,
    levels: SrLevels,
    patterns: Vec<CandlestickPattern>,
    trend: TrendAnalysis,
    structure: MarketStructure,
}

/// Main analysis engine
///
/// Holds only immutable configuration; every call is independent.
#[derive(Debug, Clone)]
pub struct AnalysisEngine {
    config: AnalysisConfig,
    engine: EngineConfig,
    indicators: IndicatorEngine,
    levels: SupportResistanceDetector,
    patterns: PatternRecognizer,
    trend: TrendAnalyzer,
    structure: MarketStructureAnalyzer,
    opportunities: OpportunityGenerator,
}

impl Default for AnalysisEngine {
    fn default() -> Self {
        Self::from_parts(AnalysisConfig::default(), EngineConfig::default())
    }
}

impl AnalysisEngine {
    fn from_parts(config: AnalysisConfig, engine: EngineConfig) -> Self {
        Self {
            indicators: IndicatorEngine::new(config.indicators.clone()),
            levels: SupportResistanceDetector::new(config.levels.clone()),
            patterns: PatternRecognizer::new(&config.patterns),
            trend: TrendAnalyzer::new(config.trend.clone()),
            structure: MarketStructureAnalyzer::new(config.structure.clone()),
            opportunities: OpportunityGenerator::new(config.opportunities.clone()),
            config,
            engine,
        }
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Full analysis of one series
    pub fn analyze(
        &self,
        symbol: &str,
        interval: &str,
        series: &CandleSeries,
    ) -> Result<AnalysisResult> {
        let interval: Interval = interval.parse()?;
        let _span = tracing::debug_span!("analyze", symbol, %interval, candles = series.len())
            .entered();

        let snapshot = self.run(series)?;
        let timestamp = series.last().map(|c| c.timestamp).unwrap_or_default();

        Ok(AnalysisResult {
            symbol: symbol.to_string(),
            interval: interval.as_str().to_string(),
            timestamp,
            trend: snapshot.trend,
            indicators: snapshot.frame.indicators,
            sr_levels: snapshot.levels,
            candlestick_patterns: snapshot.patterns,
            market_structure: snapshot.structure,
        })
    }

    /// Ranked opportunities, with validity measured from the wall clock
    pub fn find_opportunities(
        &self,
        symbol: &str,
        interval: &str,
        series: &CandleSeries,
        min_risk_reward: f64,
    ) -> Result<OpportunitiesResponse> {
        let now = chrono::Utc::now().timestamp_millis();
        self.find_opportunities_at(symbol, interval, series, min_risk_reward, now)
    }

    /// Ranked opportunities with an explicit clock (Unix milliseconds)
    pub fn find_opportunities_at(
        &self,
        symbol: &str,
        interval: &str,
        series: &CandleSeries,
        min_risk_reward: f64,
        now_ms: i64,
    ) -> Result<OpportunitiesResponse> {
        let interval: Interval = interval.parse()?;
        if !min_risk_reward.is_finite() || min_risk_reward < 0.0 {
            return Err(AnalysisError::InvalidValue(
                "min_risk_reward must be finite and non-negative",
            ));
        }
        let _span = tracing::debug_span!(
            "find_opportunities",
            symbol,
            %interval,
            candles = series.len(),
            min_risk_reward
        )
        .entered();

        let snapshot = self.run(series)?;
        let ctx = OpportunityContext {
            symbol,
            interval,
            candles: series.candles(),
            frame: &snapshot.frame,
            levels: &snapshot.levels,
            patterns: &snapshot.patterns,
            trend: &snapshot.trend,
            structure: &snapshot.structure,
        };
        let response = self.opportunities.generate(&ctx, min_risk_reward, now_ms);
        debug!(
            total = response.summary.total_opportunities,
            high_confidence = response.summary.high_confidence_count,
            "opportunities ranked"
        );
        Ok(response)
    }

    fn run(&self, series: &CandleSeries) -> Result<Snapshot> {
        let candles = series.candles();
        let started = Instant::now();

        let (frame, (levels, patterns)) = if self.engine.parallel {
            rayon::join(
                || self.indicators.compute(candles),
                || {
                    rayon::join(
                        || self.levels.detect(candles),
                        || self.patterns.recognize(candles),
                    )
                },
            )
        } else {
            (
                self.indicators.compute(candles),
                (self.levels.detect(candles), self.patterns.recognize(candles)),
            )
        };
        let frame = frame?;
        debug!(
            resistance = levels.resistance.len(),
            support = levels.support.len(),
            patterns = patterns.len(),
            elapsed_us = started.elapsed().as_micros() as u64,
            "indicators, levels and patterns computed"
        );

        let trend = self.trend.analyze(candles, &frame);
        let structure = self
            .structure
            .analyze(candles, &frame, &levels, &patterns, &trend);
        debug!(
            direction = ?trend.direction,
            quality = structure.market_quality.overall_score,
            elapsed_us = started.elapsed().as_micros() as u64,
            "trend and market structure computed"
        );

        Ok(Snapshot {
            frame,
            levels,
            patterns,
            trend,
            structure,
        })
    }
}

// ============================================================
// BUILDER
// ============================================================

/// Builder for creating AnalysisEngine instances
#[derive(Debug, Clone, Default)]
pub struct EngineBuilder {
    config: AnalysisConfig,
    engine: EngineConfig,
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole configuration
    pub fn config(mut self, config: AnalysisConfig) -> Self {
        self.config = config;
        self
    }

    pub fn indicators(mut self, params: config::IndicatorParams) -> Self {
        self.config.indicators = params;
        self
    }

    pub fn levels(mut self, params: config::LevelParams) -> Self {
        self.config.levels = params;
        self
    }

    pub fn patterns(mut self, params: config::PatternParams) -> Self {
        self.config.patterns = params;
        self
    }

    pub fn trend(mut self, params: config::TrendParams) -> Self {
        self.config.trend = params;
        self
    }

    pub fn structure(mut self, params: config::StructureParams) -> Self {
        self.config.structure = params;
        self
    }

    pub fn opportunities(mut self, params: config::OpportunityParams) -> Self {
        self.config.opportunities = params;
        self
    }

    /// Enable/disable the parallel fan-out of the independent stages
    pub fn parallel(mut self, enable: bool) -> Self {
        self.engine.parallel = enable;
        self
    }

    /// Build the engine
    pub fn build(self) -> Result<AnalysisEngine> {
        self.config.validate()?;
        Ok(AnalysisEngine::from_parts(self.config, self.engine))
    }
}

// ============================================================
// FREE FUNCTIONS
// ============================================================

/// [`AnalysisEngine::analyze`] with the default configuration
pub fn analyze(symbol: &str, interval: &str, series: &CandleSeries) -> Result<AnalysisResult> {
    AnalysisEngine::default().analyze(symbol, interval, series)
}

/// [`AnalysisEngine::find_opportunities`] with the default configuration
pub fn find_opportunities(
    symbol: &str,
    interval: &str,
    series: &CandleSeries,
    min_risk_reward: f64,
) -> Result<OpportunitiesResponse> {
    AnalysisEngine::default().find_opportunities(symbol, interval, series, min_risk_reward)
}

// ============================================================
// TESTS
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn candle(ts: i64, o: f64, h: f64, l: f64, c: f64) -> Candle {
        Candle::new(ts, o, h, l, c, 1000.0)
    }

    fn make_uptrend(n: usize) -> Vec<Candle> {
        (0..n)
            .map(|i| {
                let c = 100.0 + i as f64;
                candle(i as i64 * 60_000, c - 0.5, c + 0.2, c - 0.7, c)
            })
            .collect()
    }

    #[test]
    fn test_ratio_validation() {
        assert!(Ratio::new(0.0).is_ok());
        assert!(Ratio::new(1.0).is_ok());
        assert!(Ratio::new(0.5).is_ok());
        assert!(Ratio::new(-0.1).is_err());
        assert!(Ratio::new(1.1).is_err());
        assert!(Ratio::new(f64::NAN).is_err());
        assert!(Ratio::new(f64::INFINITY).is_err());
    }

    #[test]
    fn test_period_validation() {
        assert!(Period::new(1).is_ok());
        assert!(Period::new(100).is_ok());
        assert!(Period::new(0).is_err());
    }

    #[test]
    fn test_ohlcv_ext() {
        let bar = candle(0, 100.0, 110.0, 90.0, 105.0);
        assert_eq!(bar.body(), 5.0);
        assert_eq!(bar.range(), 20.0);
        assert_eq!(bar.upper_shadow(), 5.0);
        assert_eq!(bar.lower_shadow(), 10.0);
        assert_eq!(bar.body_mid(), 102.5);
        assert!(bar.is_bullish());
        assert!(!bar.is_bearish());
        assert!((bar.body_ratio().unwrap() - 0.25).abs() < 0.001);
    }

    #[test]
    fn test_series_rejects_bad_ohlc() {
        let mut candles = make_uptrend(5);
        candles[3].high = candles[3].close - 1.0;
        let err = CandleSeries::new(candles).unwrap_err();
        assert!(matches!(err, AnalysisError::InvalidCandle { index: 3, .. }));
    }

    #[test]
    fn test_series_rejects_unordered_timestamps() {
        let mut candles = make_uptrend(5);
        candles[2].timestamp = candles[1].timestamp;
        let err = CandleSeries::new(candles).unwrap_err();
        assert_eq!(
            err,
            AnalysisError::InvalidCandle {
                index: 2,
                reason: "timestamps not strictly increasing"
            }
        );
    }

    #[test]
    fn test_series_rejects_non_finite() {
        let mut candles = make_uptrend(3);
        candles[0].volume = f64::NAN;
        assert!(CandleSeries::new(candles).is_err());

        let mut candles = make_uptrend(3);
        candles[1].low = -1.0;
        assert!(CandleSeries::new(candles).is_err());
    }

    #[test]
    fn test_series_deserialize_validates() {
        let json = r#"[
            {"timestamp": 2, "open": 1.0, "high": 2.0, "low": 0.5, "close": 1.5, "volume": 1.0},
            {"timestamp": 1, "open": 1.0, "high": 2.0, "low": 0.5, "close": 1.5, "volume": 1.0}
        ]"#;
        assert!(serde_json::from_str::<CandleSeries>(json).is_err());
    }

    #[test]
    fn test_interval_parsing() {
        for interval in Interval::ALL {
            assert_eq!(interval.as_str().parse::<Interval>().unwrap(), interval);
        }
        assert_eq!(Interval::Hour4.duration_ms(), 4 * 3_600_000);
        assert_eq!("1M".parse::<Interval>().unwrap(), Interval::Month1);
        assert!(matches!(
            "2m".parse::<Interval>(),
            Err(AnalysisError::UnsupportedInterval(_))
        ));
    }

    #[test]
    fn test_engine_builder() {
        assert!(EngineBuilder::new().build().is_ok());

        let mut trend = config::TrendParams::default();
        trend.up_threshold = Ratio::new_const(0.3);
        assert!(EngineBuilder::new().trend(trend).build().is_err());
    }

    #[test]
    fn test_analyze_rejects_unknown_interval() {
        let series = CandleSeries::new(make_uptrend(250)).unwrap();
        let err = analyze("BTCUSDT", "7h", &series).unwrap_err();
        assert_eq!(err, AnalysisError::UnsupportedInterval("7h".into()));
    }

    #[test]
    fn test_insufficient_history_names_indicator() {
        let series = CandleSeries::new(make_uptrend(20)).unwrap();
        let err = analyze("BTCUSDT", "1h", &series).unwrap_err();
        assert_eq!(
            err,
            AnalysisError::InsufficientHistory {
                indicator: "MACD",
                need: 34,
                got: 20
            }
        );
    }

    #[test]
    fn test_parallel_and_sequential_agree() {
        let series = CandleSeries::new(make_uptrend(260)).unwrap();
        let parallel = EngineBuilder::new().build().unwrap();
        let sequential = EngineBuilder::new().parallel(false).build().unwrap();

        let a = parallel.analyze("ETHUSDT", "15m", &series).unwrap();
        let b = sequential.analyze("ETHUSDT", "15m", &series).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_result_timestamp_is_last_candle() {
        let series = CandleSeries::new(make_uptrend(240)).unwrap();
        let result = analyze("BTCUSDT", "1m", &series).unwrap();
        assert_eq!(result.timestamp, 239 * 60_000);
        assert_eq!(result.interval, "1m");
    }

    #[test]
    fn test_rejects_negative_min_risk_reward() {
        let series = CandleSeries::new(make_uptrend(240)).unwrap();
        let engine = AnalysisEngine::default();
        assert!(engine
            .find_opportunities_at("BTCUSDT", "1h", &series, -1.0, 0)
            .is_err());
    }
}
