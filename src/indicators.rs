//! Indicator stage: MACD, KDJ, RSI, ATR, the EMA family and Fibonacci levels
//!
//! Every series function returns values aligned to the end of the input: the
//! last element always belongs to the last candle. Functions return an empty
//! vector when the input is shorter than their window; the engine checks the
//! window up front and reports `InsufficientHistory` instead.

use std::collections::BTreeMap;

use crate::config::IndicatorParams;
use crate::model::{
    AtrIndicator, EmaIndicator, FibonacciLevels, Indicators, KdjIndicator, MacdIndicator,
    RsiIndicator, SwingDirection,
};
use crate::{AnalysisError, Result, OHLCV};

/// Retracement labels and ratios, shallowest first
pub const FIB_RETRACEMENTS: [(&str, f64); 7] = [
    ("0%", 0.0),
    ("23.6%", 0.236),
    ("38.2%", 0.382),
    ("50%", 0.5),
    ("61.8%", 0.618),
    ("78.6%", 0.786),
    ("100%", 1.0),
];

/// Extension labels and ratios, nearest first
pub const FIB_EXTENSIONS: [(&str, f64); 4] = [
    ("1.272", 1.272),
    ("1.618", 1.618),
    ("2.0", 2.0),
    ("2.618", 2.618),
];

// ============================================================
// SERIES FUNCTIONS
// ============================================================

/// Exponential moving average seeded with the SMA of the first `period` values
///
/// Output has `values.len() - period + 1` elements.
pub fn ema(values: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || values.len() < period {
        return Vec::new();
    }
    let k = 2.0 / (period as f64 + 1.0);
    let seed = values[..period].iter().sum::<f64>() / period as f64;

    let mut out = Vec::with_capacity(values.len() - period + 1);
    out.push(seed);
    let mut prev = seed;
    for &v in &values[period..] {
        prev += k * (v - prev);
        out.push(prev);
    }
    out
}

/// MACD line, signal line and histogram
///
/// Output has `closes.len() - slow - signal + 2` elements.
pub fn macd(closes: &[f64], fast: usize, slow: usize, signal: usize) -> Vec<MacdIndicator> {
    if fast == 0 || fast >= slow {
        return Vec::new();
    }
    let fast_ema = ema(closes, fast);
    let slow_ema = ema(closes, slow);
    if slow_ema.is_empty() {
        return Vec::new();
    }
    // fast_ema starts `slow - fast` candles earlier than slow_ema
    let offset = slow - fast;
    let dif: Vec<f64> = slow_ema
        .iter()
        .enumerate()
        .map(|(i, s)| fast_ema[i + offset] - s)
        .collect();
    let dea = ema(&dif, signal);
    let skip = dif.len().saturating_sub(dea.len());

    dea.iter()
        .zip(&dif[skip..])
        .map(|(&dea, &dif)| MacdIndicator {
            dif,
            dea,
            histogram: dif - dea,
        })
        .collect()
}

/// KDJ stochastic: one value per candle from index `period - 1`
///
/// K and D start from the neutral 50 and follow
/// `((smoothing - 1) * prev + input) / smoothing`.
pub fn kdj<T: OHLCV>(bars: &[T], period: usize, smoothing: usize) -> Vec<KdjIndicator> {
    if period == 0 || smoothing == 0 || bars.len() < period {
        return Vec::new();
    }
    let s = smoothing as f64;
    let mut k = 50.0;
    let mut d = 50.0;
    let mut out = Vec::with_capacity(bars.len() - period + 1);

    for window in bars.windows(period) {
        let (low, high) = window.iter().fold((f64::MAX, f64::MIN), |(lo, hi), b| {
            (lo.min(b.low()), hi.max(b.high()))
        });
        let close = window[period - 1].close();
        let rsv = if high > low {
            (close - low) / (high - low) * 100.0
        } else {
            50.0
        };
        k = ((s - 1.0) * k + rsv) / s;
        d = ((s - 1.0) * d + k) / s;
        out.push(KdjIndicator {
            k,
            d,
            j: 3.0 * k - 2.0 * d,
        });
    }
    out
}

/// Wilder RSI: one value per close from index `period`
pub fn rsi(closes: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || closes.len() < period + 1 {
        return Vec::new();
    }
    let p = period as f64;
    let (mut avg_gain, mut avg_loss) =
        closes[..=period]
            .windows(2)
            .fold((0.0, 0.0), |(g, l), w| {
                let change = w[1] - w[0];
                (g + change.max(0.0), l + (-change).max(0.0))
            });
    avg_gain /= p;
    avg_loss /= p;

    let mut out = Vec::with_capacity(closes.len() - period);
    out.push(rsi_value(avg_gain, avg_loss));
    for w in closes[period..].windows(2) {
        let change = w[1] - w[0];
        avg_gain = (avg_gain * (p - 1.0) + change.max(0.0)) / p;
        avg_loss = (avg_loss * (p - 1.0) + (-change).max(0.0)) / p;
        out.push(rsi_value(avg_gain, avg_loss));
    }
    out
}

#[inline]
fn rsi_value(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss <= 0.0 {
        if avg_gain <= 0.0 {
            50.0
        } else {
            100.0
        }
    } else {
        100.0 - 100.0 / (1.0 + avg_gain / avg_loss)
    }
}

/// True range per candle; the first candle has no previous close
pub fn true_ranges<T: OHLCV>(bars: &[T]) -> Vec<f64> {
    bars.iter()
        .enumerate()
        .map(|(i, bar)| {
            let hl = bar.high() - bar.low();
            match i.checked_sub(1).and_then(|p| bars.get(p)) {
                Some(prev) => hl
                    .max((bar.high() - prev.close()).abs())
                    .max((bar.low() - prev.close()).abs()),
                None => hl,
            }
        })
        .collect()
}

/// Wilder ATR: one value per candle from index `period - 1`
pub fn atr<T: OHLCV>(bars: &[T], period: usize) -> Vec<f64> {
    if period == 0 || bars.len() < period {
        return Vec::new();
    }
    let p = period as f64;
    let tr = true_ranges(bars);
    let seed = tr[..period].iter().sum::<f64>() / p;

    let mut out = Vec::with_capacity(bars.len() - period + 1);
    out.push(seed);
    let mut prev = seed;
    for &t in &tr[period..] {
        prev = (prev * (p - 1.0) + t) / p;
        out.push(prev);
    }
    out
}

/// Fibonacci grid over the highest high and lowest low of the trailing window
///
/// The swing is an uptrend when the low comes before the high. Returns `None`
/// with fewer than two candles.
pub fn fibonacci<T: OHLCV>(bars: &[T], lookback: usize) -> Option<FibonacciLevels> {
    if bars.len() < 2 {
        return None;
    }
    let start = bars.len().saturating_sub(lookback.max(2));
    let window = &bars[start..];

    let (mut high, mut high_idx) = (window[0].high(), 0);
    let (mut low, mut low_idx) = (window[0].low(), 0);
    for (i, bar) in window.iter().enumerate().skip(1) {
        if bar.high() > high {
            high = bar.high();
            high_idx = i;
        }
        if bar.low() < low {
            low = bar.low();
            low_idx = i;
        }
    }

    let direction = if low_idx < high_idx {
        SwingDirection::Uptrend
    } else {
        SwingDirection::Downtrend
    };
    let diff = high - low;
    let (retrace_from, retrace_sign, extend_from, extend_sign) = match direction {
        SwingDirection::Uptrend => (high, -1.0, low, 1.0),
        SwingDirection::Downtrend => (low, 1.0, high, -1.0),
    };

    let retracement: BTreeMap<String, f64> = FIB_RETRACEMENTS
        .iter()
        .map(|(label, r)| (label.to_string(), retrace_from + retrace_sign * diff * r))
        .collect();
    let extension: BTreeMap<String, f64> = FIB_EXTENSIONS
        .iter()
        .map(|(label, r)| (label.to_string(), extend_from + extend_sign * diff * r))
        .collect();

    Some(FibonacciLevels {
        high,
        low,
        retracement,
        extension,
        direction,
    })
}

// ============================================================
// INDICATOR ENGINE
// ============================================================

/// Indicator snapshot for the last candle plus the history later stages use
#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorFrame {
    pub indicators: Indicators,
    /// ATR per candle from index `atr_period - 1`, oldest first
    pub atr_history: Vec<f64>,
    /// Histogram one candle before the last, when available
    pub prev_histogram: Option<f64>,
}

impl IndicatorFrame {
    #[inline]
    pub fn atr(&self) -> f64 {
        self.indicators.atr.value
    }

    #[inline]
    pub fn ema(&self) -> &EmaIndicator {
        &self.indicators.ema
    }
}

#[derive(Debug, Clone)]
pub struct IndicatorEngine {
    params: IndicatorParams,
}

impl IndicatorEngine {
    pub fn new(params: IndicatorParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &IndicatorParams {
        &self.params
    }

    /// Fails with the first indicator whose window exceeds the series
    pub fn check_history(&self, len: usize) -> Result<()> {
        for (indicator, need) in self.params.requirements() {
            if len < need {
                return Err(AnalysisError::InsufficientHistory {
                    indicator,
                    need,
                    got: len,
                });
            }
        }
        Ok(())
    }

    pub fn compute<T: OHLCV>(&self, bars: &[T]) -> Result<IndicatorFrame> {
        self.check_history(bars.len())?;
        let p = &self.params;
        let closes: Vec<f64> = bars.iter().map(|b| b.close()).collect();
        let last_close = closes.last().copied().unwrap_or_default();

        let macd_series = macd(
            &closes,
            p.macd_fast.get(),
            p.macd_slow.get(),
            p.macd_signal.get(),
        );
        let macd_now = macd_series.last().copied().unwrap_or_default();
        let prev_histogram = macd_series
            .len()
            .checked_sub(2)
            .map(|i| macd_series[i].histogram);

        let kdj_now = kdj(bars, p.kdj_period.get(), p.kdj_smoothing.get())
            .last()
            .copied()
            .unwrap_or_default();

        let rsi_fast = rsi(&closes, p.rsi_fast.get()).last().copied().unwrap_or(50.0);
        let rsi_slow = rsi(&closes, p.rsi_slow.get()).last().copied().unwrap_or(50.0);

        let atr_history = atr(bars, p.atr_period.get());
        let atr_now = atr_history.last().copied().unwrap_or_default();

        let [e9, e21, e50, e200] = p
            .ema_periods
            .map(|period| ema(&closes, period.get()).last().copied().unwrap_or(last_close));

        let fib = p
            .fibonacci_lookback
            .and_then(|lookback| fibonacci(bars, lookback.get()));

        Ok(IndicatorFrame {
            indicators: Indicators {
                macd: macd_now,
                kdj: kdj_now,
                rsi: RsiIndicator {
                    rsi6: rsi_fast,
                    rsi14: rsi_slow,
                },
                atr: AtrIndicator {
                    value: atr_now,
                    period: p.atr_period.get(),
                },
                ema: EmaIndicator {
                    ema9: e9,
                    ema21: e21,
                    ema50: e50,
                    ema200: e200,
                },
                fibonacci: fib,
            },
            atr_history,
            prev_histogram,
        })
    }
}

// ============================================================
// TESTS
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Candle;

    fn flat(n: usize, price: f64) -> Vec<Candle> {
        (0..n)
            .map(|i| Candle::new(i as i64, price, price, price, price, 10.0))
            .collect()
    }

    fn rising(n: usize) -> Vec<Candle> {
        (0..n)
            .map(|i| {
                let c = 50.0 + i as f64;
                Candle::new(i as i64, c - 0.5, c + 0.25, c - 0.75, c, 10.0)
            })
            .collect()
    }

    #[test]
    fn test_ema_seeded_with_sma() {
        let values = [1.0, 2.0, 3.0, 4.0, 5.0];
        let out = ema(&values, 3);
        assert_eq!(out.len(), 3);
        assert!((out[0] - 2.0).abs() < 1e-12);
        // k = 0.5
        assert!((out[1] - 3.0).abs() < 1e-12);
        assert!((out[2] - 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_ema_too_short() {
        assert!(ema(&[1.0, 2.0], 3).is_empty());
    }

    #[test]
    fn test_macd_alignment() {
        let closes: Vec<f64> = (0..40).map(|i| i as f64).collect();
        let out = macd(&closes, 12, 26, 9);
        assert_eq!(out.len(), 40 - 26 - 9 + 2);
        for m in &out {
            assert!((m.histogram - (m.dif - m.dea)).abs() < 1e-12);
            assert!(m.dif > 0.0);
        }
    }

    #[test]
    fn test_rsi_extremes() {
        let up: Vec<f64> = (0..30).map(|i| i as f64).collect();
        assert_eq!(rsi(&up, 14).last().copied(), Some(100.0));

        let down: Vec<f64> = (0..30).map(|i| 100.0 - i as f64).collect();
        assert_eq!(rsi(&down, 14).last().copied(), Some(0.0));

        let flat = vec![5.0; 30];
        assert_eq!(rsi(&flat, 6).last().copied(), Some(50.0));
    }

    #[test]
    fn test_rsi_mixed_in_bounds() {
        let closes: Vec<f64> = (0..60).map(|i| 100.0 + (i as f64 * 0.7).sin() * 5.0).collect();
        for value in rsi(&closes, 14) {
            assert!((0.0..=100.0).contains(&value));
        }
    }

    #[test]
    fn test_atr_constant_range() {
        let bars: Vec<Candle> = (0..20)
            .map(|i| Candle::new(i, 100.0, 102.0, 98.0, 100.0, 1.0))
            .collect();
        let out = atr(&bars, 14);
        assert_eq!(out.len(), 7);
        for v in out {
            assert!((v - 4.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_true_range_uses_previous_close() {
        let bars = vec![
            Candle::new(0, 10.0, 11.0, 9.0, 10.0, 1.0),
            Candle::new(1, 13.0, 14.0, 12.5, 13.5, 1.0),
        ];
        let tr = true_ranges(&bars);
        assert_eq!(tr[0], 2.0);
        assert_eq!(tr[1], 4.0);
    }

    #[test]
    fn test_kdj_flat_is_neutral() {
        let out = kdj(&flat(20, 10.0), 9, 3);
        let last = out.last().copied().unwrap();
        assert_eq!(last.k, 50.0);
        assert_eq!(last.d, 50.0);
        assert_eq!(last.j, 50.0);
    }

    #[test]
    fn test_kdj_rising_stays_bounded() {
        for v in kdj(&rising(100), 9, 3) {
            assert!((0.0..=100.0).contains(&v.k));
            assert!((0.0..=100.0).contains(&v.d));
        }
    }

    #[test]
    fn test_kdj_falling_stays_bounded() {
        let falling: Vec<Candle> = (0..100)
            .map(|i| {
                let c = 150.0 - i as f64;
                Candle::new(i as i64, c + 0.5, c + 0.75, c - 0.25, c, 10.0)
            })
            .collect();
        let out = kdj(&falling, 9, 3);
        for v in &out {
            assert!((0.0..=100.0).contains(&v.k));
            assert!((0.0..=100.0).contains(&v.d));
        }
        assert!(out.last().map_or(false, |v| v.k < 20.0));
    }

    #[test]
    fn test_fibonacci_uptrend_anchors() {
        let fib = fibonacci(&rising(30), 100).unwrap();
        assert_eq!(fib.direction, SwingDirection::Uptrend);
        assert_eq!(fib.retracement["0%"], fib.high);
        assert_eq!(fib.retracement["100%"], fib.low);
        let diff = fib.high - fib.low;
        assert!((fib.extension["1.618"] - (fib.low + 1.618 * diff)).abs() < 1e-9);
        assert_eq!(fib.retracement.len(), 7);
        assert_eq!(fib.extension.len(), 4);
    }

    #[test]
    fn test_fibonacci_downtrend_anchors() {
        let mut bars = rising(30);
        bars.reverse();
        let fib = fibonacci(&bars, 100).unwrap();
        assert_eq!(fib.direction, SwingDirection::Downtrend);
        assert_eq!(fib.retracement["0%"], fib.low);
        assert!(fib.extension["1.272"] < fib.low);
    }

    #[test]
    fn test_engine_flat_series() {
        let engine = IndicatorEngine::new(IndicatorParams::default());
        let frame = engine.compute(&flat(300, 100.0)).unwrap();
        let ind = &frame.indicators;

        assert_eq!(ind.ema.ema200, 100.0);
        assert!(ind.macd.histogram.abs() < 1e-9);
        assert_eq!(ind.rsi.rsi14, 50.0);
        assert_eq!(ind.atr.value, 0.0);
        assert_eq!(ind.atr.period, 14);
        assert_eq!(frame.atr_history.len(), 300 - 14 + 1);
        assert!(frame.prev_histogram.is_some());
    }

    #[test]
    fn test_engine_insufficient_history() {
        let engine = IndicatorEngine::new(IndicatorParams::default());
        let err = engine.compute(&rising(150)).unwrap_err();
        assert_eq!(
            err,
            AnalysisError::InsufficientHistory {
                indicator: "EMA",
                need: 200,
                got: 150
            }
        );
    }

    #[test]
    fn test_engine_without_fibonacci() {
        let params = IndicatorParams {
            fibonacci_lookback: None,
            ..IndicatorParams::default()
        };
        let frame = IndicatorEngine::new(params).compute(&rising(220)).unwrap();
        assert!(frame.indicators.fibonacci.is_none());
    }
}
