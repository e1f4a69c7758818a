//! Candlestick pattern recognition
//!
//! Detectors are plain structs implementing [`PatternDetector`], collected in
//! the enum-dispatched [`BuiltinDetector`]. The recognizer precomputes a
//! [`PatternContext`] per candle and runs every detector at every index of the
//! trailing scan window.
//!
//! # Pattern Categories
//!
//! - **Single-bar**: Hammer, Hanging Man, Inverted Hammer, Shooting Star, Doji
//! - **Two-bar**: Engulfing, Piercing Line, Dark Cloud Cover, Harami
//! - **Three-bar**: Morning/Evening Star, Three White Soldiers, Three Black Crows

use crate::config::PatternParams;
use crate::model::{CandlestickPattern, Direction, PatternKind, TrendDirection};
use crate::{Period, Ratio, Result, OHLCV};

pub mod helpers;

/// Generate `with_defaults()` -> `Self::default()` for multiple detector types.
macro_rules! impl_with_defaults {
  ($($detector:ty),* $(,)?) => {
    $(impl $detector {
      pub fn with_defaults() -> Self { Self::default() }
    })*
  };
}

pub mod single_bar;
pub mod three_bar;
pub mod two_bar;

pub use single_bar::*;
pub use three_bar::*;
pub use two_bar::*;

// ============================================================
// PATTERN MATCH
// ============================================================

/// Unique identifier for a pattern type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PatternId(pub &'static str);

impl PatternId {
    #[inline]
    pub fn as_str(&self) -> &'static str {
        self.0
    }
}

/// Result of one detection - Copy, no allocations
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PatternMatch {
    pub pattern_id: PatternId,
    /// Display name, e.g. "Doji (Dragonfly)"
    pub name: &'static str,
    pub description: &'static str,
    pub kind: PatternKind,
    pub direction: Direction,
    /// 0.0..=1.0
    pub reliability: f64,
    pub start_index: usize,
    pub end_index: usize,
}

impl PatternMatch {
    pub fn to_pattern(&self) -> CandlestickPattern {
        CandlestickPattern {
            pattern: self.name.to_string(),
            kind: self.kind,
            direction: self.direction,
            position: self.start_index,
            reliability: self.reliability,
            description: self.description.to_string(),
        }
    }
}

// ============================================================
// CONTEXT
// ============================================================

/// Market context at a specific candle
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PatternContext {
    /// Price-action trend leading into the candle
    pub trend: TrendDirection,
}

/// Provider of pattern context - precomputes context for all candles
pub trait ContextProvider: Send + Sync {
    fn compute_all<T: OHLCV>(&self, bars: &[T]) -> Vec<PatternContext>;
}

/// Compares the mean close of the latest `window` candles with the mean of
/// the `window` candles before them
#[derive(Debug, Clone)]
pub struct PriceActionContext {
    pub window: Period,
    /// Relative change that counts as a trend
    pub threshold: Ratio,
}

impl Default for PriceActionContext {
    fn default() -> Self {
        Self {
            window: Period::new_const(10),
            threshold: Ratio::new_const(0.02),
        }
    }
}

impl ContextProvider for PriceActionContext {
    fn compute_all<T: OHLCV>(&self, bars: &[T]) -> Vec<PatternContext> {
        let w = self.window.get();
        let threshold = self.threshold.get();

        // prefix[i] = sum of closes[..i]
        let mut prefix = Vec::with_capacity(bars.len() + 1);
        prefix.push(0.0);
        for bar in bars {
            let last = prefix.last().copied().unwrap_or_default();
            prefix.push(last + bar.close());
        }

        (0..bars.len())
            .map(|i| {
                let end = i + 1;
                if end < 2 * w {
                    return PatternContext::default();
                }
                let recent = (prefix[end] - prefix[end - w]) / w as f64;
                let older = (prefix[end - w] - prefix[end - 2 * w]) / w as f64;
                let trend = trend_from_change(recent, older, threshold);
                PatternContext { trend }
            })
            .collect()
    }
}

/// Up / down when `recent` moved more than `threshold` relative to `older`
pub fn trend_from_change(recent: f64, older: f64, threshold: f64) -> TrendDirection {
    if older <= 0.0 {
        return TrendDirection::Sideways;
    }
    let change = (recent - older) / older;
    if change > threshold {
        TrendDirection::Up
    } else if change < -threshold {
        TrendDirection::Down
    } else {
        TrendDirection::Sideways
    }
}

// ============================================================
// DETECTOR TRAIT
// ============================================================

/// Generic pattern detector trait
///
/// `index` is the last candle the pattern may read; `ctx` is the context at
/// the pattern's first candle.
pub trait PatternDetector: Send + Sync {
    fn id(&self) -> PatternId;
    fn min_bars(&self) -> usize;
    fn detect<T: OHLCV>(
        &self,
        bars: &[T],
        index: usize,
        ctx: &PatternContext,
    ) -> Option<PatternMatch>;

    fn validate_config(&self) -> Result<()> {
        Ok(())
    }
}

// ============================================================
// BUILTIN DETECTORS - generated via macro
// ============================================================

/// Macro to generate BuiltinDetector enum without boilerplate
macro_rules! define_builtin_detectors {
    (
        $(
            $variant:ident($detector:ty)
        ),* $(,)?
    ) => {
        /// All builtin detectors - fast path via enum dispatch
        #[derive(Debug, Clone)]
        pub enum BuiltinDetector {
            $($variant($detector)),*
        }

        impl BuiltinDetector {
            #[inline]
            pub fn detect<T: OHLCV>(
                &self,
                bars: &[T],
                index: usize,
                ctx: &PatternContext,
            ) -> Option<PatternMatch> {
                match self {
                    $(Self::$variant(d) => PatternDetector::detect(d, bars, index, ctx)),*
                }
            }

            #[inline]
            pub fn id(&self) -> PatternId {
                match self {
                    $(Self::$variant(d) => PatternDetector::id(d)),*
                }
            }

            #[inline]
            pub fn min_bars(&self) -> usize {
                match self {
                    $(Self::$variant(d) => PatternDetector::min_bars(d)),*
                }
            }

            pub fn validate_config(&self) -> Result<()> {
                match self {
                    $(Self::$variant(d) => PatternDetector::validate_config(d)),*
                }
            }
        }
    };
}

define_builtin_detectors! {
    // Single bar
    Hammer(HammerDetector),
    HangingMan(HangingManDetector),
    InvertedHammer(InvertedHammerDetector),
    ShootingStar(ShootingStarDetector),
    Doji(DojiDetector),

    // Two bar
    Engulfing(EngulfingDetector),
    Piercing(PiercingDetector),
    DarkCloudCover(DarkCloudCoverDetector),
    Harami(HaramiDetector),

    // Three bar
    MorningStar(MorningStarDetector),
    EveningStar(EveningStarDetector),
    ThreeWhiteSoldiers(ThreeWhiteSoldiersDetector),
    ThreeBlackCrows(ThreeBlackCrowsDetector),
}

impl BuiltinDetector {
    /// Every builtin detector, configured from `params`, in scan order
    pub fn all(params: &PatternParams) -> Vec<BuiltinDetector> {
        vec![
            BuiltinDetector::Hammer(HammerDetector::from_params(params)),
            BuiltinDetector::HangingMan(HangingManDetector::from_params(params)),
            BuiltinDetector::InvertedHammer(InvertedHammerDetector::from_params(params)),
            BuiltinDetector::ShootingStar(ShootingStarDetector::from_params(params)),
            BuiltinDetector::Doji(DojiDetector::from_params(params)),
            BuiltinDetector::Engulfing(EngulfingDetector::from_params(params)),
            BuiltinDetector::Piercing(PiercingDetector::default()),
            BuiltinDetector::DarkCloudCover(DarkCloudCoverDetector::default()),
            BuiltinDetector::Harami(HaramiDetector::default()),
            BuiltinDetector::MorningStar(MorningStarDetector::from_params(params)),
            BuiltinDetector::EveningStar(EveningStarDetector::from_params(params)),
            BuiltinDetector::ThreeWhiteSoldiers(ThreeWhiteSoldiersDetector::default()),
            BuiltinDetector::ThreeBlackCrows(ThreeBlackCrowsDetector::default()),
        ]
    }
}

// ============================================================
// RECOGNIZER
// ============================================================

/// Runs the detectors over the trailing scan window
#[derive(Debug, Clone)]
pub struct PatternRecognizer<C: ContextProvider = PriceActionContext> {
    builtin: Vec<BuiltinDetector>,
    context_provider: C,
    scan_window: usize,
    min_reliability: f64,
}

impl PatternRecognizer<PriceActionContext> {
    pub fn new(params: &PatternParams) -> Self {
        Self {
            builtin: BuiltinDetector::all(params),
            context_provider: PriceActionContext {
                window: params.trend_window,
                threshold: params.trend_threshold,
            },
            scan_window: params.scan_window.get(),
            min_reliability: params.min_reliability.get(),
        }
    }
}

impl<C: ContextProvider> PatternRecognizer<C> {
    /// Recognizer with an explicit detector set and context provider
    pub fn with_detectors(
        detectors: Vec<BuiltinDetector>,
        context_provider: C,
        params: &PatternParams,
    ) -> Result<Self> {
        for d in &detectors {
            d.validate_config()?;
        }
        Ok(Self {
            builtin: detectors,
            context_provider,
            scan_window: params.scan_window.get(),
            min_reliability: params.min_reliability.get(),
        })
    }

    pub fn detectors(&self) -> &[BuiltinDetector] {
        &self.builtin
    }

    #[inline]
    pub fn compute_contexts<T: OHLCV>(&self, bars: &[T]) -> Vec<PatternContext> {
        self.context_provider.compute_all(bars)
    }

    /// Patterns whose last candle is `index`, in detector order
    pub fn scan_at<T: OHLCV>(
        &self,
        bars: &[T],
        index: usize,
        contexts: &[PatternContext],
    ) -> Vec<PatternMatch> {
        let mut results = Vec::new();
        for detector in &self.builtin {
            let Some(start) = (index + 1).checked_sub(detector.min_bars()) else {
                continue;
            };
            let ctx = contexts.get(start).copied().unwrap_or_default();
            if let Some(m) = detector.detect(bars, index, &ctx) {
                if m.reliability >= self.min_reliability {
                    results.push(m);
                }
            }
        }
        results
    }

    /// Patterns ending anywhere in `range`, ordered by first candle
    pub fn scan_range<T: OHLCV>(
        &self,
        bars: &[T],
        range: std::ops::Range<usize>,
        contexts: &[PatternContext],
    ) -> Vec<PatternMatch> {
        let end = range.end.min(bars.len());
        let mut results: Vec<PatternMatch> = (range.start..end)
            .flat_map(|i| self.scan_at(bars, i, contexts))
            .collect();
        // Stable: same first candle keeps scan order
        results.sort_by_key(|m| m.start_index);
        results
    }

    /// All patterns in the trailing scan window
    pub fn recognize<T: OHLCV>(&self, bars: &[T]) -> Vec<CandlestickPattern> {
        let contexts = self.compute_contexts(bars);
        let start = bars.len().saturating_sub(self.scan_window);
        self.scan_range(bars, start..bars.len(), &contexts)
            .iter()
            .map(PatternMatch::to_pattern)
            .collect()
    }
}

// ============================================================
// TESTS
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Candle;

    fn bar(o: f64, h: f64, l: f64, c: f64) -> Candle {
        Candle::new(0, o, h, l, c, 1000.0)
    }

    fn make_downtrend(n: usize) -> Vec<Candle> {
        (0..n)
            .map(|i| {
                let base = 100.0 - i as f64 * 2.0;
                bar(base, base + 1.0, base - 1.0, base - 0.5)
            })
            .collect()
    }

    #[test]
    fn test_context_needs_two_windows() {
        let provider = PriceActionContext::default();
        let bars = make_downtrend(25);
        let contexts = provider.compute_all(&bars);
        assert_eq!(contexts.len(), 25);
        assert_eq!(contexts[18].trend, TrendDirection::Sideways);
        assert_eq!(contexts[19].trend, TrendDirection::Down);
        assert_eq!(contexts[24].trend, TrendDirection::Down);
    }

    #[test]
    fn test_trend_from_change() {
        assert_eq!(trend_from_change(103.0, 100.0, 0.02), TrendDirection::Up);
        assert_eq!(trend_from_change(97.0, 100.0, 0.02), TrendDirection::Down);
        assert_eq!(trend_from_change(101.0, 100.0, 0.02), TrendDirection::Sideways);
        assert_eq!(trend_from_change(1.0, 0.0, 0.02), TrendDirection::Sideways);
    }

    #[test]
    fn test_all_detectors_valid() {
        let detectors = BuiltinDetector::all(&PatternParams::default());
        assert_eq!(detectors.len(), 13);
        for d in &detectors {
            assert!(d.validate_config().is_ok());
        }
    }

    #[test]
    fn test_hammer_after_downtrend() {
        let mut bars = make_downtrend(20);
        // Small body at top, long lower shadow
        bars.push(bar(60.0, 61.05, 57.0, 61.0));

        let recognizer = PatternRecognizer::new(&PatternParams::default());
        let patterns = recognizer.recognize(&bars);
        let hammer = patterns.iter().find(|p| p.pattern == "Hammer").unwrap();
        assert_eq!(hammer.position, 20);
        assert_eq!(hammer.direction, Direction::Bullish);
        assert_eq!(hammer.kind, PatternKind::Single);
        assert!(hammer.reliability > 0.0 && hammer.reliability <= 0.8);
    }

    #[test]
    fn test_bullish_engulfing_position_is_first_candle() {
        let mut bars = make_downtrend(20);
        bars.push(bar(60.0, 61.0, 59.0, 59.5));
        bars.push(bar(59.0, 62.0, 58.0, 61.5));

        let recognizer = PatternRecognizer::new(&PatternParams::default());
        let patterns = recognizer.recognize(&bars);
        let engulfing = patterns
            .iter()
            .find(|p| p.pattern == "Bullish Engulfing")
            .unwrap();
        assert_eq!(engulfing.position, 20);
        assert_eq!(engulfing.kind, PatternKind::Double);
    }

    #[test]
    fn test_scan_range_sorted_by_position() {
        let mut bars = make_downtrend(20);
        bars.push(bar(60.0, 61.0, 59.0, 59.5));
        bars.push(bar(59.0, 62.0, 58.0, 61.5));
        bars.push(bar(61.5, 62.0, 56.0, 61.45));

        let recognizer = PatternRecognizer::new(&PatternParams::default());
        let contexts = recognizer.compute_contexts(&bars);
        let matches = recognizer.scan_range(&bars, 0..bars.len(), &contexts);
        for w in matches.windows(2) {
            assert!(w[0].start_index <= w[1].start_index);
        }
    }

    #[test]
    fn test_min_reliability_filter() {
        let mut bars = make_downtrend(20);
        bars.push(bar(60.0, 61.05, 57.0, 61.0));

        let params = PatternParams {
            min_reliability: Ratio::new_const(0.99),
            ..PatternParams::default()
        };
        let recognizer = PatternRecognizer::new(&params);
        assert!(recognizer.recognize(&bars).is_empty());
    }

    #[test]
    fn test_custom_detector_set() {
        let recognizer = PatternRecognizer::with_detectors(
            vec![BuiltinDetector::Doji(DojiDetector::with_defaults())],
            PriceActionContext::default(),
            &PatternParams::default(),
        )
        .unwrap();
        assert_eq!(recognizer.detectors().len(), 1);

        let bars = vec![bar(100.0, 110.0, 90.0, 100.5)];
        let patterns = recognizer.recognize(&bars);
        assert_eq!(patterns.len(), 1);
        assert_eq!(patterns[0].pattern, "Doji (Long-Legged)");
        assert_eq!(patterns[0].direction, Direction::Neutral);
    }

    #[test]
    fn test_flat_candles_match_nothing() {
        let bars: Vec<Candle> = (0..30).map(|_| bar(10.0, 10.0, 10.0, 10.0)).collect();
        let recognizer = PatternRecognizer::new(&PatternParams::default());
        assert!(recognizer.recognize(&bars).is_empty());
    }
}
