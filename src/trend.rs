//! Trend classification from weighted indicator votes
//!
//! Each component maps to a score in `0.0..=1.0` where 0 is bearish, 0.5
//! neutral and 1 bullish. The weighted mean decides the direction; the spread
//! of the components around it drives the change probability.

use crate::config::TrendParams;
use crate::indicators::IndicatorFrame;
use crate::model::{KdjIndicator, MacdIndicator, RsiIndicator, TrendAnalysis, TrendDirection};
use crate::OHLCV;

/// Change probability of a sideways market before disagreement is added
const SIDEWAYS_CHANGE_BASE: f64 = 0.6;
/// Weighted std-dev of the components that counts as full disagreement
const MAX_DISAGREEMENT: f64 = 0.5;

/// -1, 0 or +1, treating `|x| <= eps` as zero
#[inline]
fn sign(x: f64, eps: f64) -> f64 {
    if x > eps {
        1.0
    } else if x < -eps {
        -1.0
    } else {
        0.0
    }
}

/// Per-component scores, in weight order
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ComponentScores {
    pub ema: f64,
    pub macd: f64,
    pub kdj: f64,
    pub rsi: f64,
    pub price: f64,
}

impl ComponentScores {
    pub fn as_array(&self) -> [f64; 5] {
        [self.ema, self.macd, self.kdj, self.rsi, self.price]
    }
}

/// Close above EMA9 above EMA21 above EMA50 above EMA200 scores 1
pub fn score_ema(close: f64, ema: [f64; 4]) -> f64 {
    let eps = close.abs() * 1e-9;
    let chain = [close, ema[0], ema[1], ema[2], ema[3]];
    let votes: f64 = chain.windows(2).map(|w| sign(w[0] - w[1], eps)).sum();
    0.5 + 0.5 * votes / 4.0
}

/// DIF sign, histogram sign and histogram slope
pub fn score_macd(macd: &MacdIndicator, prev_histogram: Option<f64>, close: f64) -> f64 {
    let eps = close.abs() * 1e-9;
    let slope = prev_histogram.map_or(0.0, |prev| sign(macd.histogram - prev, eps));
    let score =
        0.5 + 0.25 * sign(macd.dif, eps) + 0.15 * sign(macd.histogram, eps) + 0.1 * slope;
    score.clamp(0.0, 1.0)
}

/// K against D plus the J zone
pub fn score_kdj(kdj: &KdjIndicator) -> f64 {
    let mut score = 0.5 + 0.2 * sign(kdj.k - kdj.d, 1e-9);
    score += if kdj.j > 80.0 {
        0.3
    } else if kdj.j < 20.0 {
        -0.3
    } else {
        (kdj.j - 50.0) / 100.0
    };
    score.clamp(0.0, 1.0)
}

/// RSI14 as the base, RSI6 as confirmation
pub fn score_rsi(rsi: &RsiIndicator) -> f64 {
    let mut score = rsi.rsi14 / 100.0;
    if rsi.rsi6 > 70.0 && rsi.rsi14 > 60.0 {
        score += 0.1;
    } else if rsi.rsi6 < 30.0 && rsi.rsi14 < 40.0 {
        score -= 0.1;
    }
    score.clamp(0.0, 1.0)
}

/// Mean close of the latest `window` candles against the `window` before
pub fn score_price_action<T: OHLCV>(bars: &[T], window: usize) -> f64 {
    let n = bars.len();
    if window == 0 || n < 2 * window {
        return 0.5;
    }
    let mean = |range: std::ops::Range<usize>| {
        bars[range].iter().map(|b| b.close()).sum::<f64>() / window as f64
    };
    let recent = mean(n - window..n);
    let older = mean(n - 2 * window..n - window);
    if older <= 0.0 {
        return 0.5;
    }
    let change = (recent - older) / older;
    0.5 + (change * 10.0).clamp(-0.5, 0.5)
}

#[derive(Debug, Clone)]
pub struct TrendAnalyzer {
    params: TrendParams,
}

impl TrendAnalyzer {
    pub fn new(params: TrendParams) -> Self {
        Self { params }
    }

    pub fn components<T: OHLCV>(&self, bars: &[T], frame: &IndicatorFrame) -> ComponentScores {
        let ind = &frame.indicators;
        let close = bars.last().map(|b| b.close()).unwrap_or_default();
        ComponentScores {
            ema: score_ema(close, ind.ema.as_array()),
            macd: score_macd(&ind.macd, frame.prev_histogram, close),
            kdj: score_kdj(&ind.kdj),
            rsi: score_rsi(&ind.rsi),
            price: score_price_action(bars, self.params.price_window.get()),
        }
    }

    pub fn analyze<T: OHLCV>(&self, bars: &[T], frame: &IndicatorFrame) -> TrendAnalysis {
        let scores = self.components(bars, frame).as_array();
        self.classify(&scores)
    }

    /// Direction, strength and change probability from component scores
    pub fn classify(&self, scores: &[f64; 5]) -> TrendAnalysis {
        let weights = self.params.weights();
        let total: f64 = weights.iter().sum();
        let score = weights.iter().zip(scores).map(|(w, s)| w * s).sum::<f64>() / total;

        let variance = weights
            .iter()
            .zip(scores)
            .map(|(w, s)| w * (s - score).powi(2))
            .sum::<f64>()
            / total;
        let disagreement = (variance.sqrt() / MAX_DISAGREEMENT).min(1.0);

        let (direction, strength, base) = if score > self.params.up_threshold.get() {
            let strength = (score - 0.5) * 2.0;
            (TrendDirection::Up, strength, 1.0 - strength)
        } else if score < self.params.down_threshold.get() {
            let strength = (0.5 - score) * 2.0;
            (TrendDirection::Down, strength, 1.0 - strength)
        } else {
            let strength = 1.0 - (score - 0.5).abs() * 2.0;
            (TrendDirection::Sideways, strength, SIDEWAYS_CHANGE_BASE)
        };

        TrendAnalysis {
            direction,
            strength: strength.clamp(0.0, 1.0),
            change_probability: (0.5 * base + 0.5 * disagreement).clamp(0.0, 1.0),
        }
    }
}
