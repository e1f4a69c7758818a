//! Per-call engine configuration and parameter metadata
//!
//! Every tunable (periods, tolerances, weights) lives in one of the parameter
//! groups below and is handed to the engine explicitly; there is no global
//! configuration. Parameter groups also expose metadata, enabling:
//! - Overrides from a flat name -> value map
//! - Grid search over a tunable
//! - Parameter documentation
//!
//! # Example
//!
//! ```rust
//! use std::collections::HashMap;
//! use trendscope::config::{IndicatorParams, Parameterized};
//!
//! for param in IndicatorParams::param_meta() {
//!     println!("{}: {:?} (default: {})", param.name, param.param_type, param.default);
//! }
//!
//! let mut overrides = HashMap::new();
//! overrides.insert("atr_period", 21.0);
//! let params = IndicatorParams::with_params(&overrides).unwrap();
//! assert_eq!(params.atr_period.get(), 21);
//! ```

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{AnalysisError, Period, Ratio, Result};

// ============================================================
// PARAMETER TYPES
// ============================================================

/// Type of parameter value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
  /// Ratio value (0.0..=1.0)
  Ratio,
  /// Period value (positive integer)
  Period,
  /// Positive, unbounded multiplier or percentage
  Factor,
}

/// Metadata for a single tunable parameter
#[derive(Debug, Clone)]
pub struct ParamMeta {
  /// Parameter name (e.g., "atr_period")
  pub name: &'static str,
  pub param_type: ParamType,
  pub default: f64,
  /// Range for optimization: (min, max, step)
  pub range: (f64, f64, f64),
  pub description: &'static str,
}

impl ParamMeta {
  pub const fn ratio(
    name: &'static str,
    default: f64,
    range: (f64, f64, f64),
    description: &'static str,
  ) -> Self {
    Self { name, param_type: ParamType::Ratio, default, range, description }
  }

  pub const fn period(
    name: &'static str,
    default: f64,
    range: (f64, f64, f64),
    description: &'static str,
  ) -> Self {
    Self { name, param_type: ParamType::Period, default, range, description }
  }

  pub const fn factor(
    name: &'static str,
    default: f64,
    range: (f64, f64, f64),
    description: &'static str,
  ) -> Self {
    Self { name, param_type: ParamType::Factor, default, range, description }
  }

  /// Generate all values for grid search
  pub fn generate_grid(&self) -> Vec<f64> {
    let (min, max, step) = self.range;
    let mut values = Vec::new();
    let mut v = min;
    while v <= max + f64::EPSILON {
      values.push(v);
      v += step;
    }
    values
  }

  /// Validate a value for this parameter
  pub fn validate(&self, value: f64) -> Result<()> {
    let (min, max, _) = self.range;
    if value.is_nan() || value < min || value > max {
      return Err(AnalysisError::OutOfRange { field: self.name, value, min, max });
    }
    match self.param_type {
      ParamType::Ratio | ParamType::Factor => Ok(()),
      ParamType::Period => {
        if value < 1.0 || value.fract() != 0.0 {
          return Err(AnalysisError::InvalidValue("Period must be a positive integer"));
        }
        Ok(())
      },
    }
  }
}

// ============================================================
// PARAMETERIZED TRAIT
// ============================================================

/// Parameter groups that can be discovered and overridden by name
pub trait Parameterized: Sized {
  /// Returns metadata for all overridable parameters
  fn param_meta() -> &'static [ParamMeta];

  /// Creates the group from a name -> value map
  ///
  /// Missing parameters use their default values. Present values are checked
  /// against the parameter's range.
  fn with_params(params: &HashMap<&str, f64>) -> Result<Self>;
}

// ============================================================
// PARAMETER VALUE HELPERS
// ============================================================

fn checked(params: &HashMap<&str, f64>, key: &str, default: f64) -> Result<f64> {
  let Some(value) = params.get(key).copied() else {
    return Ok(default);
  };
  // Parameter groups only call this with keys listed in their metadata
  let meta = ALL_META.iter().flat_map(|m| m.iter()).find(|m| m.name == key);
  if let Some(meta) = meta {
    meta.validate(value)?;
  }
  Ok(value)
}

/// Helper to get a Ratio from params with default fallback
pub fn get_ratio(params: &HashMap<&str, f64>, key: &str, default: f64) -> Result<Ratio> {
  Ratio::new(checked(params, key, default)?)
}

/// Helper to get a Period from params with default fallback
pub fn get_period(params: &HashMap<&str, f64>, key: &str, default: usize) -> Result<Period> {
  let value = checked(params, key, default as f64)?;
  if value.fract() != 0.0 || value < 1.0 {
    return Err(AnalysisError::InvalidValue("Period must be a positive integer"));
  }
  Period::new(value as usize)
}

/// Helper to get a positive finite factor from params with default fallback
pub fn get_factor(params: &HashMap<&str, f64>, key: &str, default: f64) -> Result<f64> {
  let value = checked(params, key, default)?;
  if !value.is_finite() || value <= 0.0 {
    return Err(AnalysisError::InvalidValue("Factor must be positive and finite"));
  }
  Ok(value)
}

const ALL_META: [&[ParamMeta]; 3] = [INDICATOR_META, LEVEL_META, OPPORTUNITY_META];

// ============================================================
// INDICATORS
// ============================================================

/// Periods for the indicator stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndicatorParams {
  pub macd_fast: Period,
  pub macd_slow: Period,
  pub macd_signal: Period,
  pub kdj_period: Period,
  /// K and D are smoothed as ((s - 1) * prev + value) / s
  pub kdj_smoothing: Period,
  pub rsi_fast: Period,
  pub rsi_slow: Period,
  pub atr_period: Period,
  /// Reported as ema9 / ema21 / ema50 / ema200, fastest first
  pub ema_periods: [Period; 4],
  /// `None` disables Fibonacci levels
  pub fibonacci_lookback: Option<Period>,
}

impl Default for IndicatorParams {
  fn default() -> Self {
    Self {
      macd_fast: Period::new_const(12),
      macd_slow: Period::new_const(26),
      macd_signal: Period::new_const(9),
      kdj_period: Period::new_const(9),
      kdj_smoothing: Period::new_const(3),
      rsi_fast: Period::new_const(6),
      rsi_slow: Period::new_const(14),
      atr_period: Period::new_const(14),
      ema_periods: [
        Period::new_const(9),
        Period::new_const(21),
        Period::new_const(50),
        Period::new_const(200),
      ],
      fibonacci_lookback: Some(Period::new_const(100)),
    }
  }
}

impl IndicatorParams {
  /// Minimum number of candles each indicator needs, in evaluation order
  pub fn requirements(&self) -> [(&'static str, usize); 5] {
    let ema_need = self.ema_periods.iter().map(|p| p.get()).max().unwrap_or(1);
    [
      ("MACD", self.macd_slow.get() + self.macd_signal.get() - 1),
      ("KDJ", self.kdj_period.get()),
      ("RSI", self.rsi_fast.get().max(self.rsi_slow.get()) + 1),
      ("ATR", self.atr_period.get() + 1),
      ("EMA", ema_need),
    ]
  }

  /// Shortest series every indicator can be computed on
  pub fn min_history(&self) -> usize {
    self.requirements().iter().map(|(_, need)| *need).max().unwrap_or(1)
  }

  pub fn validate(&self) -> Result<()> {
    if self.macd_fast >= self.macd_slow {
      return Err(AnalysisError::InvalidConfig("macd_fast must be shorter than macd_slow".into()));
    }
    if self.ema_periods.windows(2).any(|w| w[0] >= w[1]) {
      return Err(AnalysisError::InvalidConfig("ema_periods must be strictly increasing".into()));
    }
    Ok(())
  }
}

const INDICATOR_META: &[ParamMeta] = &[
  ParamMeta::period("macd_fast", 12.0, (2.0, 50.0, 1.0), "MACD fast EMA period"),
  ParamMeta::period("macd_slow", 26.0, (3.0, 100.0, 1.0), "MACD slow EMA period"),
  ParamMeta::period("macd_signal", 9.0, (2.0, 50.0, 1.0), "MACD signal (DEA) period"),
  ParamMeta::period("kdj_period", 9.0, (3.0, 50.0, 1.0), "KDJ RSV window"),
  ParamMeta::period("kdj_smoothing", 3.0, (1.0, 10.0, 1.0), "KDJ K/D smoothing"),
  ParamMeta::period("rsi_fast", 6.0, (2.0, 30.0, 1.0), "Short RSI period"),
  ParamMeta::period("rsi_slow", 14.0, (2.0, 50.0, 1.0), "Long RSI period"),
  ParamMeta::period("atr_period", 14.0, (2.0, 50.0, 1.0), "ATR Wilder period"),
  ParamMeta::period("fibonacci_lookback", 100.0, (10.0, 500.0, 10.0), "Swing search window"),
];

impl Parameterized for IndicatorParams {
  fn param_meta() -> &'static [ParamMeta] {
    INDICATOR_META
  }

  fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
    let defaults = Self::default();
    Ok(Self {
      macd_fast: get_period(params, "macd_fast", 12)?,
      macd_slow: get_period(params, "macd_slow", 26)?,
      macd_signal: get_period(params, "macd_signal", 9)?,
      kdj_period: get_period(params, "kdj_period", 9)?,
      kdj_smoothing: get_period(params, "kdj_smoothing", 3)?,
      rsi_fast: get_period(params, "rsi_fast", 6)?,
      rsi_slow: get_period(params, "rsi_slow", 14)?,
      atr_period: get_period(params, "atr_period", 14)?,
      ema_periods: defaults.ema_periods,
      fibonacci_lookback: Some(get_period(params, "fibonacci_lookback", 100)?),
    })
  }
}

// ============================================================
// SUPPORT / RESISTANCE
// ============================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LevelParams {
  /// Trailing candles searched for pivots
  pub lookback: Period,
  /// Candles on each side a pivot must dominate
  pub pivot_window: Period,
  /// Cluster tolerance as a fraction of the current close
  pub tolerance_pct: Ratio,
  /// Levels kept per side
  pub max_levels: Period,
  /// Share of strength coming from touch count; the rest is recency
  pub touch_weight: Ratio,
}

impl Default for LevelParams {
  fn default() -> Self {
    Self {
      lookback: Period::new_const(100),
      pivot_window: Period::new_const(3),
      tolerance_pct: Ratio::new_const(0.005),
      max_levels: Period::new_const(5),
      touch_weight: Ratio::new_const(0.6),
    }
  }
}

const LEVEL_META: &[ParamMeta] = &[
  ParamMeta::period("lookback", 100.0, (20.0, 500.0, 10.0), "Trailing candles searched"),
  ParamMeta::period("pivot_window", 3.0, (1.0, 10.0, 1.0), "Pivot half-width"),
  ParamMeta::ratio("tolerance_pct", 0.005, (0.001, 0.05, 0.001), "Cluster tolerance"),
  ParamMeta::period("max_levels", 5.0, (1.0, 10.0, 1.0), "Levels kept per side"),
  ParamMeta::ratio("touch_weight", 0.6, (0.0, 1.0, 0.1), "Touch share of strength"),
];

impl Parameterized for LevelParams {
  fn param_meta() -> &'static [ParamMeta] {
    LEVEL_META
  }

  fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
    Ok(Self {
      lookback: get_period(params, "lookback", 100)?,
      pivot_window: get_period(params, "pivot_window", 3)?,
      tolerance_pct: get_ratio(params, "tolerance_pct", 0.005)?,
      max_levels: get_period(params, "max_levels", 5)?,
      touch_weight: get_ratio(params, "touch_weight", 0.6)?,
    })
  }
}

// ============================================================
// PATTERNS
// ============================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternParams {
  /// Trailing candles scanned for patterns
  pub scan_window: Period,
  /// Block size of the price-action trend used as pattern context
  pub trend_window: Period,
  /// Relative change between blocks that counts as a trend
  pub trend_threshold: Ratio,
  /// Max body/range for a doji
  pub doji_body_ratio: Ratio,
  /// Long shadow must be this many bodies
  pub shadow_multiple: f64,
  /// Max star body relative to the first candle's body
  pub star_body_ratio: Ratio,
  /// Engulfing body must be this many times the engulfed body
  pub engulf_body_multiple: f64,
  /// Matches below this reliability are dropped
  pub min_reliability: Ratio,
}

impl Default for PatternParams {
  fn default() -> Self {
    Self {
      scan_window: Period::new_const(50),
      trend_window: Period::new_const(10),
      trend_threshold: Ratio::new_const(0.02),
      doji_body_ratio: Ratio::new_const(0.05),
      shadow_multiple: 2.0,
      star_body_ratio: Ratio::new_const(0.3),
      engulf_body_multiple: 1.5,
      min_reliability: Ratio::new_const(0.0),
    }
  }
}

impl PatternParams {
  pub fn validate(&self) -> Result<()> {
    if !(self.shadow_multiple.is_finite() && self.shadow_multiple > 0.0) {
      return Err(AnalysisError::InvalidConfig("shadow_multiple must be positive".into()));
    }
    if !(self.engulf_body_multiple.is_finite() && self.engulf_body_multiple >= 1.0) {
      return Err(AnalysisError::InvalidConfig("engulf_body_multiple must be >= 1".into()));
    }
    Ok(())
  }
}

// ============================================================
// TREND
// ============================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrendParams {
  pub ema_weight: f64,
  pub macd_weight: f64,
  pub kdj_weight: f64,
  pub rsi_weight: f64,
  pub price_weight: f64,
  /// Score above which the trend is up
  pub up_threshold: Ratio,
  /// Score below which the trend is down
  pub down_threshold: Ratio,
  /// Block size for the recent-vs-older price comparison
  pub price_window: Period,
}

impl Default for TrendParams {
  fn default() -> Self {
    Self {
      ema_weight: 0.25,
      macd_weight: 0.25,
      kdj_weight: 0.15,
      rsi_weight: 0.15,
      price_weight: 0.20,
      up_threshold: Ratio::new_const(0.6),
      down_threshold: Ratio::new_const(0.4),
      price_window: Period::new_const(10),
    }
  }
}

impl TrendParams {
  pub fn weights(&self) -> [f64; 5] {
    [self.ema_weight, self.macd_weight, self.kdj_weight, self.rsi_weight, self.price_weight]
  }

  pub fn validate(&self) -> Result<()> {
    validate_weights("trend", &self.weights())?;
    if self.down_threshold >= self.up_threshold {
      return Err(AnalysisError::InvalidConfig(
        "down_threshold must be below up_threshold".into(),
      ));
    }
    Ok(())
  }
}

// ============================================================
// MARKET STRUCTURE
// ============================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StructureParams {
  /// Candles on each side a swing point must dominate
  pub swing_lookback: Period,
  /// Candles counted as "recent" for pattern signals
  pub recent_window: Period,
  /// ATR% above which volatility is high
  pub high_volatility_pct: f64,
  /// ATR% below which volatility is low
  pub low_volatility_pct: f64,
  /// Current ATR over its recent mean that counts as expanding
  pub expansion_factor: f64,
  pub expansion_window: Period,
  /// Confluence band as a fraction of the current close
  pub confluence_tolerance: Ratio,
  /// Distinct factor types a zone needs
  pub zone_min_factors: Period,
  pub trend_quality_weight: f64,
  pub volatility_quality_weight: f64,
  pub confluence_quality_weight: f64,
  pub pattern_quality_weight: f64,
}

impl Default for StructureParams {
  fn default() -> Self {
    Self {
      swing_lookback: Period::new_const(5),
      recent_window: Period::new_const(10),
      high_volatility_pct: 3.0,
      low_volatility_pct: 1.0,
      expansion_factor: 1.05,
      expansion_window: Period::new_const(14),
      confluence_tolerance: Ratio::new_const(0.005),
      zone_min_factors: Period::new_const(2),
      trend_quality_weight: 0.35,
      volatility_quality_weight: 0.20,
      confluence_quality_weight: 0.25,
      pattern_quality_weight: 0.20,
    }
  }
}

impl StructureParams {
  pub fn quality_weights(&self) -> [f64; 4] {
    [
      self.trend_quality_weight,
      self.volatility_quality_weight,
      self.confluence_quality_weight,
      self.pattern_quality_weight,
    ]
  }

  pub fn validate(&self) -> Result<()> {
    validate_weights("market quality", &self.quality_weights())?;
    if !(self.low_volatility_pct >= 0.0 && self.low_volatility_pct < self.high_volatility_pct) {
      return Err(AnalysisError::InvalidConfig(
        "low_volatility_pct must be below high_volatility_pct".into(),
      ));
    }
    if !(self.expansion_factor.is_finite() && self.expansion_factor > 0.0) {
      return Err(AnalysisError::InvalidConfig("expansion_factor must be positive".into()));
    }
    Ok(())
  }
}

// ============================================================
// OPPORTUNITIES
// ============================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpportunityParams {
  /// Max distance in percent between close and the anchoring level
  pub max_entry_distance_pct: f64,
  pub min_level_strength: Ratio,
  pub min_pattern_reliability: Ratio,
  /// Entry placed this fraction beyond the level, towards price
  pub entry_offset: Ratio,
  /// Minimum stop distance beyond the level as a fraction of it
  pub stop_buffer: Ratio,
  pub stop_atr_multiple: f64,
  pub trend_stop_atr_multiple: f64,
  pub max_targets: Period,
  /// Recent candles that must retest a broken level
  pub retest_window: Period,
  /// Recent candles searched for a confirming pattern
  pub pattern_window: Period,
  /// Candles on each side of a swing a breakout level must dominate
  pub swing_lookback: Period,
  /// Validity horizon measured in candles of the analysed interval
  pub validity_candles: Period,
  pub base_confidence: f64,
  pub trend_confidence_weight: f64,
  pub confluence_confidence_weight: f64,
  pub pattern_confidence_weight: f64,
  pub risk_reward_confidence_weight: f64,
  pub high_confidence: f64,
  pub medium_confidence: f64,
}

impl Default for OpportunityParams {
  fn default() -> Self {
    Self {
      max_entry_distance_pct: 1.5,
      min_level_strength: Ratio::new_const(0.5),
      min_pattern_reliability: Ratio::new_const(0.6),
      entry_offset: Ratio::new_const(0.002),
      stop_buffer: Ratio::new_const(0.015),
      stop_atr_multiple: 1.0,
      trend_stop_atr_multiple: 1.5,
      max_targets: Period::new_const(3),
      retest_window: Period::new_const(5),
      pattern_window: Period::new_const(5),
      swing_lookback: Period::new_const(5),
      validity_candles: Period::new_const(4),
      base_confidence: 35.0,
      trend_confidence_weight: 20.0,
      confluence_confidence_weight: 20.0,
      pattern_confidence_weight: 15.0,
      risk_reward_confidence_weight: 10.0,
      high_confidence: 75.0,
      medium_confidence: 55.0,
    }
  }
}

impl OpportunityParams {
  pub fn validate(&self) -> Result<()> {
    let factors = [
      self.max_entry_distance_pct,
      self.stop_atr_multiple,
      self.trend_stop_atr_multiple,
    ];
    if factors.iter().any(|f| !(f.is_finite() && *f > 0.0)) {
      return Err(AnalysisError::InvalidConfig(
        "distance and ATR multiples must be positive".into(),
      ));
    }
    validate_weights(
      "confidence",
      &[
        self.base_confidence,
        self.trend_confidence_weight,
        self.confluence_confidence_weight,
        self.pattern_confidence_weight,
        self.risk_reward_confidence_weight,
      ],
    )?;
    if self.medium_confidence > self.high_confidence {
      return Err(AnalysisError::InvalidConfig(
        "medium_confidence must not exceed high_confidence".into(),
      ));
    }
    if self.validity_candles.get() > MAX_VALIDITY_CANDLES {
      return Err(AnalysisError::InvalidConfig(format!(
        "validity_candles must be at most {MAX_VALIDITY_CANDLES}"
      )));
    }
    Ok(())
  }
}

const MAX_VALIDITY_CANDLES: usize = 50;

const OPPORTUNITY_META: &[ParamMeta] = &[
  ParamMeta::factor("max_entry_distance_pct", 1.5, (0.1, 10.0, 0.1), "Level proximity in %"),
  ParamMeta::ratio("min_level_strength", 0.5, (0.0, 1.0, 0.05), "Weakest usable level"),
  ParamMeta::ratio("min_pattern_reliability", 0.6, (0.0, 1.0, 0.05), "Weakest usable pattern"),
  ParamMeta::ratio("entry_offset", 0.002, (0.0, 0.02, 0.001), "Entry offset from level"),
  ParamMeta::ratio("stop_buffer", 0.015, (0.001, 0.1, 0.001), "Stop buffer beyond level"),
  ParamMeta::factor("stop_atr_multiple", 1.0, (0.25, 5.0, 0.25), "Level stop ATR floor"),
  ParamMeta::factor("trend_stop_atr_multiple", 1.5, (0.25, 5.0, 0.25), "Trend stop distance"),
  ParamMeta::period("max_targets", 3.0, (1.0, 5.0, 1.0), "Take-profit levels"),
  ParamMeta::period("retest_window", 5.0, (2.0, 20.0, 1.0), "Breakout retest candles"),
  ParamMeta::period("pattern_window", 5.0, (1.0, 20.0, 1.0), "Confirming pattern candles"),
  ParamMeta::period("swing_lookback", 5.0, (2.0, 20.0, 1.0), "Breakout swing half-width"),
  ParamMeta::period("validity_candles", 4.0, (1.0, 50.0, 1.0), "Validity horizon"),
];

impl Parameterized for OpportunityParams {
  fn param_meta() -> &'static [ParamMeta] {
    OPPORTUNITY_META
  }

  fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
    let defaults = Self::default();
    Ok(Self {
      max_entry_distance_pct: get_factor(params, "max_entry_distance_pct", 1.5)?,
      min_level_strength: get_ratio(params, "min_level_strength", 0.5)?,
      min_pattern_reliability: get_ratio(params, "min_pattern_reliability", 0.6)?,
      entry_offset: get_ratio(params, "entry_offset", 0.002)?,
      stop_buffer: get_ratio(params, "stop_buffer", 0.015)?,
      stop_atr_multiple: get_factor(params, "stop_atr_multiple", 1.0)?,
      trend_stop_atr_multiple: get_factor(params, "trend_stop_atr_multiple", 1.5)?,
      max_targets: get_period(params, "max_targets", 3)?,
      retest_window: get_period(params, "retest_window", 5)?,
      pattern_window: get_period(params, "pattern_window", 5)?,
      swing_lookback: get_period(params, "swing_lookback", 5)?,
      validity_candles: get_period(params, "validity_candles", 4)?,
      ..defaults
    })
  }
}

// ============================================================
// ANALYSIS CONFIG
// ============================================================

/// All tunables for one engine, grouped by pipeline stage
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
  pub indicators: IndicatorParams,
  pub levels: LevelParams,
  pub patterns: PatternParams,
  pub trend: TrendParams,
  pub structure: StructureParams,
  pub opportunities: OpportunityParams,
}

impl AnalysisConfig {
  pub fn validate(&self) -> Result<()> {
    self.indicators.validate()?;
    self.patterns.validate()?;
    self.trend.validate()?;
    self.structure.validate()?;
    self.opportunities.validate()
  }
}

fn validate_weights(group: &str, weights: &[f64]) -> Result<()> {
  if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
    return Err(AnalysisError::InvalidConfig(format!("{group} weights must be non-negative")));
  }
  if weights.iter().sum::<f64>() <= 0.0 {
    return Err(AnalysisError::InvalidConfig(format!("{group} weights must not all be zero")));
  }
  Ok(())
}

// ============================================================
// TESTS
// ============================================================
