//! Serializable result types.
//!
//! Field names and nesting are the JSON contract consumed by the dashboard
//! client, so every struct here serializes with exactly these keys.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

// ============================================================
// SHARED ENUMS
// ============================================================

/// Directional bias of a signal or pattern
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Bullish,
    #[default]
    Neutral,
    Bearish,
}

impl Direction {
    #[inline]
    pub fn is_bullish(self) -> bool {
        matches!(self, Direction::Bullish)
    }

    #[inline]
    pub fn is_bearish(self) -> bool {
        matches!(self, Direction::Bearish)
    }

    /// +1 for bullish, -1 for bearish, 0 for neutral
    #[inline]
    pub fn sign(self) -> f64 {
        match self {
            Direction::Bullish => 1.0,
            Direction::Neutral => 0.0,
            Direction::Bearish => -1.0,
        }
    }
}

/// Overall trend classification
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Up,
    Down,
    #[default]
    Sideways,
}

impl TrendDirection {
    #[inline]
    pub fn is_up(self) -> bool {
        matches!(self, TrendDirection::Up)
    }

    #[inline]
    pub fn is_down(self) -> bool {
        matches!(self, TrendDirection::Down)
    }

    pub fn bias(self) -> Direction {
        match self {
            TrendDirection::Up => Direction::Bullish,
            TrendDirection::Down => Direction::Bearish,
            TrendDirection::Sideways => Direction::Neutral,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

// ============================================================
// TREND & INDICATORS
// ============================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendAnalysis {
    pub direction: TrendDirection,
    /// 0..=1
    pub strength: f64,
    /// 0..=1, grows with indicator disagreement
    pub change_probability: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MacdIndicator {
    pub dif: f64,
    pub dea: f64,
    pub histogram: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct KdjIndicator {
    pub k: f64,
    pub d: f64,
    pub j: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RsiIndicator {
    pub rsi6: f64,
    pub rsi14: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AtrIndicator {
    pub value: f64,
    pub period: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EmaIndicator {
    pub ema9: f64,
    pub ema21: f64,
    pub ema50: f64,
    pub ema200: f64,
}

impl EmaIndicator {
    /// Values ordered fastest to slowest
    pub fn as_array(&self) -> [f64; 4] {
        [self.ema9, self.ema21, self.ema50, self.ema200]
    }
}

/// Direction of the swing the Fibonacci grid is anchored to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SwingDirection {
    Uptrend,
    Downtrend,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FibonacciLevels {
    pub high: f64,
    pub low: f64,
    pub retracement: BTreeMap<String, f64>,
    pub extension: BTreeMap<String, f64>,
    pub direction: SwingDirection,
}

impl FibonacciLevels {
    /// All retracement and extension prices with a readable label
    pub fn labelled_levels(&self) -> impl Iterator<Item = (String, f64)> + '_ {
        self.retracement
            .iter()
            .map(|(label, price)| (format!("Fibonacci {label} retracement"), *price))
            .chain(
                self.extension
                    .iter()
                    .map(|(label, price)| (format!("Fibonacci {label} extension"), *price)),
            )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Indicators {
    pub macd: MacdIndicator,
    pub kdj: KdjIndicator,
    pub rsi: RsiIndicator,
    pub atr: AtrIndicator,
    pub ema: EmaIndicator,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fibonacci: Option<FibonacciLevels>,
}

// ============================================================
// LEVELS & PATTERNS
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SrLevel {
    pub price: f64,
    /// 0..=1
    pub strength: f64,
}

/// Support/resistance levels, each side ordered nearest-first
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SrLevels {
    pub resistance: Vec<SrLevel>,
    pub support: Vec<SrLevel>,
}

/// Number of candles that form a pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PatternKind {
    Single,
    Double,
    Triple,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandlestickPattern {
    pub pattern: String,
    #[serde(rename = "type")]
    pub kind: PatternKind,
    pub direction: Direction,
    /// Index of the first candle of the pattern within the series
    pub position: usize,
    /// 0..=1
    pub reliability: f64,
    pub description: String,
}

// ============================================================
// MARKET STRUCTURE
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PricePosition {
    AboveAll,
    BelowAll,
    Mixed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SignalStrength {
    Strong,
    Moderate,
    Weak,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendConfirmation {
    pub ema_alignment: Direction,
    pub macd_signal: Direction,
    pub price_vs_ema: PricePosition,
    /// 0..=100
    pub confirmation_score: f64,
    pub strength: SignalStrength,
}

impl TrendConfirmation {
    /// Direction most of the confirming signals agree on
    pub fn bias(&self) -> Direction {
        let price = match self.price_vs_ema {
            PricePosition::AboveAll => 1.0,
            PricePosition::BelowAll => -1.0,
            PricePosition::Mixed => 0.0,
        };
        let net = self.ema_alignment.sign() + self.macd_signal.sign() + price;
        if net > 0.0 {
            Direction::Bullish
        } else if net < 0.0 {
            Direction::Bearish
        } else {
            Direction::Neutral
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum VolatilityLevel {
    High,
    Normal,
    Low,
}

/// Suggested position sizing, inverse to volatility
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskAdjustment {
    Reduce,
    Standard,
    Increase,
}

impl RiskAdjustment {
    /// Position size multiplier
    pub fn factor(self) -> f64 {
        match self {
            RiskAdjustment::Reduce => 0.5,
            RiskAdjustment::Standard => 1.0,
            RiskAdjustment::Increase => 1.25,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolatilityProfile {
    pub current_atr: f64,
    /// ATR as a percentage of the close
    pub atr_percentage: f64,
    pub volatility_level: VolatilityLevel,
    pub is_expanding: bool,
    pub risk_adjustment: RiskAdjustment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LevelKind {
    Support,
    Resistance,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfluenceLevel {
    pub price: f64,
    /// Distance from the current close in percent
    pub distance: f64,
    pub factors: Vec<String>,
    /// 0..=100
    pub strength: f64,
    #[serde(rename = "type")]
    pub kind: LevelKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Significance {
    Critical,
    Important,
    Moderate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfluenceZone {
    /// [low, high]
    pub price_range: [f64; 2],
    pub factors: Vec<String>,
    /// 0..=100
    pub strength: f64,
    pub significance: Significance,
}

impl ConfluenceZone {
    #[inline]
    pub fn contains(&self, price: f64, tolerance: f64) -> bool {
        price >= self.price_range[0] - tolerance && price <= self.price_range[1] + tolerance
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyLevelConfluence {
    pub nearest_support: Option<ConfluenceLevel>,
    pub nearest_resistance: Option<ConfluenceLevel>,
    pub confluence_zones: Vec<ConfluenceZone>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternSignals {
    pub recent_patterns: Vec<String>,
    pub bullish_count: usize,
    pub bearish_count: usize,
    pub dominant_signal: Direction,
    /// 0..=100
    pub pattern_reliability: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketQuality {
    /// 0..=100
    pub overall_score: f64,
    pub grade: String,
    pub trading_condition: String,
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
    pub recommendation: String,
    /// Weighted contribution of each sub-score; sums to `overall_score`
    pub score_breakdown: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketStructure {
    pub higher_high: bool,
    pub higher_low: bool,
    pub structure_break: bool,
    pub risk_level: RiskLevel,
    pub trend_confirmation: TrendConfirmation,
    pub volatility_profile: VolatilityProfile,
    pub key_level_confluence: KeyLevelConfluence,
    pub pattern_signals: PatternSignals,
    pub market_quality: MarketQuality,
}

// ============================================================
// ANALYSIS RESULT
// ============================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub symbol: String,
    pub interval: String,
    /// Timestamp of the last analysed candle
    pub timestamp: i64,
    pub trend: TrendAnalysis,
    pub indicators: Indicators,
    pub sr_levels: SrLevels,
    pub candlestick_patterns: Vec<CandlestickPattern>,
    pub market_structure: MarketStructure,
}

// ============================================================
// OPPORTUNITIES
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeSide {
    Long,
    Short,
}

impl TradeSide {
    /// +1 for long, -1 for short
    #[inline]
    pub fn sign(self) -> f64 {
        match self {
            TradeSide::Long => 1.0,
            TradeSide::Short => -1.0,
        }
    }

    pub fn bias(self) -> Direction {
        match self {
            TradeSide::Long => Direction::Bullish,
            TradeSide::Short => Direction::Bearish,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TradeSide::Long => "long",
            TradeSide::Short => "short",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Strategy {
    SupportBounce,
    ResistanceRejection,
    BreakoutRetest,
    TrendContinuation,
}

impl Strategy {
    pub fn as_str(self) -> &'static str {
        match self {
            Strategy::SupportBounce => "support_bounce",
            Strategy::ResistanceRejection => "resistance_rejection",
            Strategy::BreakoutRetest => "breakout_retest",
            Strategy::TrendContinuation => "trend_continuation",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StopMethod {
    TechnicalLevel,
    Atr,
    Percentage,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryPoint {
    pub price: f64,
    pub reasons: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StopLossInfo {
    pub price: f64,
    pub distance_pct: f64,
    pub method: StopMethod,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TakeProfitLevel {
    pub level: usize,
    pub price: f64,
    pub distance_pct: f64,
    pub target: String,
    pub position_close_pct: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskRewardInfo {
    pub ratio: f64,
    pub risk_amount: f64,
    pub reward_amount: f64,
    pub risk_pct: f64,
    pub reward_pct: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ConfidenceLevel {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceInfo {
    /// 0..=100
    pub score: u32,
    pub level: ConfidenceLevel,
    pub factors: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OpportunityStatus {
    Active,
    Expired,
    Triggered,
    Invalidated,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidityInfo {
    /// Unix milliseconds
    pub expires_at: i64,
    pub status: OpportunityStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradingOpportunity {
    pub id: String,
    pub symbol: String,
    #[serde(rename = "type")]
    pub side: TradeSide,
    pub strategy: Strategy,
    pub timestamp: i64,
    pub entry: EntryPoint,
    pub stop_loss: StopLossInfo,
    pub take_profit: Vec<TakeProfitLevel>,
    pub risk_reward: RiskRewardInfo,
    pub confidence: ConfidenceInfo,
    pub validity: ValidityInfo,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpportunitySummary {
    pub total_opportunities: usize,
    pub avg_risk_reward: f64,
    pub high_confidence_count: usize,
}

impl OpportunitySummary {
    /// Aggregate over an already filtered list
    pub fn from_opportunities(opportunities: &[TradingOpportunity]) -> Self {
        let total = opportunities.len();
        let avg_risk_reward = if total == 0 {
            0.0
        } else {
            opportunities.iter().map(|o| o.risk_reward.ratio).sum::<f64>() / total as f64
        };
        let high_confidence_count = opportunities
            .iter()
            .filter(|o| o.confidence.level == ConfidenceLevel::High)
            .count();

        Self {
            total_opportunities: total,
            avg_risk_reward,
            high_confidence_count,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpportunitiesResponse {
    pub opportunities: Vec<TradingOpportunity>,
    pub summary: OpportunitySummary,
}

impl OpportunitiesResponse {
    pub fn new(opportunities: Vec<TradingOpportunity>) -> Self {
        let summary = OpportunitySummary::from_opportunities(&opportunities);
        Self {
            opportunities,
            summary,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.opportunities.is_empty()
    }
}
