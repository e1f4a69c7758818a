//! Support / resistance detection
//!
//! Pivot highs and lows of the trailing window are clustered by price. A
//! cluster becomes one level at its volume-weighted price (touch-weighted when
//! the pivots carry no volume), scored by touch count and recency.

use crate::config::LevelParams;
use crate::model::{SrLevel, SrLevels};
use crate::OHLCV;

/// A strict local extreme
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pivot {
    pub index: usize,
    pub price: f64,
    pub volume: f64,
}

/// Pivots merged into one price level
#[derive(Debug, Clone, PartialEq)]
pub struct Cluster {
    pub price: f64,
    pub touches: usize,
    /// Index of the most recent pivot in the cluster
    pub last_index: usize,
    volume: f64,
}

impl Cluster {
    fn from_pivot(p: &Pivot) -> Self {
        Self {
            price: p.price,
            touches: 1,
            last_index: p.index,
            volume: p.volume,
        }
    }

    /// Weighted by volume when both sides have it, by touches otherwise
    fn absorb(&mut self, other: &Cluster) {
        let (w_self, w_other) = if self.volume > 0.0 && other.volume > 0.0 {
            (self.volume, other.volume)
        } else {
            (self.touches as f64, other.touches as f64)
        };
        self.price = (self.price * w_self + other.price * w_other) / (w_self + w_other);
        self.touches += other.touches;
        self.last_index = self.last_index.max(other.last_index);
        self.volume += other.volume;
    }
}

/// Strict pivot highs and lows: each must beat every neighbour within `window`
pub fn find_pivots<T: OHLCV>(bars: &[T], start: usize, window: usize) -> Vec<Pivot> {
    let mut pivots = Vec::new();
    let n = bars.len();
    let first = start.max(window);

    for i in first..n.saturating_sub(window) {
        let neighbours = || (i - window..=i + window).filter(move |&j| j != i);
        let high = bars[i].high();
        let low = bars[i].low();

        if neighbours().all(|j| bars[j].high() < high) {
            pivots.push(Pivot {
                index: i,
                price: high,
                volume: bars[i].volume(),
            });
        }
        if neighbours().all(|j| bars[j].low() > low) {
            pivots.push(Pivot {
                index: i,
                price: low,
                volume: bars[i].volume(),
            });
        }
    }
    pivots
}

/// Assign pivots, oldest first, to the nearest cluster within `tolerance`,
/// then keep merging neighbouring clusters whose prices drifted within
/// tolerance of each other. Returned clusters are sorted by price.
pub fn cluster_pivots(pivots: &[Pivot], tolerance: f64) -> Vec<Cluster> {
    let mut ordered = pivots.to_vec();
    ordered.sort_by_key(|p| p.index);

    let mut clusters: Vec<Cluster> = Vec::new();
    for pivot in &ordered {
        let candidate = Cluster::from_pivot(pivot);
        let nearest = clusters
            .iter_mut()
            .map(|c| ((c.price - pivot.price).abs(), c))
            .filter(|(d, _)| *d <= tolerance)
            .min_by(|a, b| a.0.total_cmp(&b.0));
        match nearest {
            Some((_, cluster)) => cluster.absorb(&candidate),
            None => clusters.push(candidate),
        }
    }

    clusters.sort_by(|a, b| a.price.total_cmp(&b.price));
    loop {
        let merge_at = clusters
            .windows(2)
            .position(|w| (w[1].price - w[0].price).abs() <= tolerance);
        let Some(i) = merge_at else {
            break;
        };
        let next = clusters.remove(i + 1);
        clusters[i].absorb(&next);
    }
    clusters
}

#[derive(Debug, Clone)]
pub struct SupportResistanceDetector {
    params: LevelParams,
}

impl SupportResistanceDetector {
    pub fn new(params: LevelParams) -> Self {
        Self { params }
    }

    pub fn detect<T: OHLCV>(&self, bars: &[T]) -> SrLevels {
        let Some(last) = bars.last() else {
            return SrLevels::default();
        };
        let close = last.close();
        let lookback = self.params.lookback.get();
        let start = bars.len().saturating_sub(lookback);

        let pivots = find_pivots(bars, start, self.params.pivot_window.get());
        let tolerance = self.params.tolerance_pct.get() * close;
        let clusters = cluster_pivots(&pivots, tolerance);

        let max_touches = clusters.iter().map(|c| c.touches).max().unwrap_or(1) as f64;
        let touch_weight = self.params.touch_weight.get();
        let newest = bars.len() - 1;

        let mut levels = SrLevels::default();
        for cluster in &clusters {
            let age = (newest - cluster.last_index) as f64;
            let recency = (1.0 - age / lookback as f64).clamp(0.0, 1.0);
            let strength = (touch_weight * cluster.touches as f64 / max_touches
                + (1.0 - touch_weight) * recency)
                .clamp(0.0, 1.0);
            let level = SrLevel {
                price: cluster.price,
                strength,
            };
            if cluster.price > close {
                levels.resistance.push(level);
            } else {
                levels.support.push(level);
            }
        }

        let by_distance =
            |a: &SrLevel, b: &SrLevel| (a.price - close).abs().total_cmp(&(b.price - close).abs());
        let max_levels = self.params.max_levels.get();
        levels.resistance.sort_by(by_distance);
        levels.support.sort_by(by_distance);
        levels.resistance.truncate(max_levels);
        levels.support.truncate(max_levels);
        levels
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Candle;

    /// Triangle wave: peaks at 110 (phase 5), troughs at 90 (phase 15)
    fn zigzag(n: usize) -> Vec<Candle> {
        let price = |i: usize| -> f64 {
            let phase = (i % 20) as f64;
            match i % 20 {
                0..=5 => 100.0 + 2.0 * phase,
                6..=15 => 110.0 - 2.0 * (phase - 5.0),
                _ => 90.0 + 2.0 * (phase - 15.0),
            }
        };
        (0..n)
            .map(|i| {
                let c = price(i);
                let o = if i == 0 { c } else { (price(i - 1) + c) / 2.0 };
                Candle::new(i as i64, o, o.max(c) + 0.5, o.min(c) - 0.5, c, 100.0)
            })
            .collect()
    }

    #[test]
    fn test_empty_series() {
        let detector = SupportResistanceDetector::new(LevelParams::default());
        let empty: Vec<Candle> = vec![];
        assert_eq!(detector.detect(&empty), SrLevels::default());
    }

    #[test]
    fn test_zigzag_levels() {
        let bars = zigzag(100);
        let detector = SupportResistanceDetector::new(LevelParams::default());
        let levels = detector.detect(&bars);

        assert_eq!(levels.resistance.len(), 1);
        assert_eq!(levels.support.len(), 1);
        assert!((levels.resistance[0].price - 110.5).abs() < 1e-9);
        assert!((levels.support[0].price - 89.5).abs() < 1e-9);
        for level in levels.resistance.iter().chain(&levels.support) {
            assert!((0.0..=1.0).contains(&level.strength));
        }
    }

    #[test]
    fn test_levels_sorted_nearest_first() {
        let pivots = vec![
            Pivot { index: 10, price: 120.0, volume: 1.0 },
            Pivot { index: 20, price: 105.0, volume: 1.0 },
            Pivot { index: 30, price: 112.0, volume: 1.0 },
        ];
        let clusters = cluster_pivots(&pivots, 0.5);
        assert_eq!(clusters.len(), 3);

        let bars = zigzag(100);
        let levels = SupportResistanceDetector::new(LevelParams::default()).detect(&bars);
        let close = bars.last().unwrap().close;
        for side in [&levels.resistance, &levels.support] {
            for w in side.windows(2) {
                assert!((w[0].price - close).abs() <= (w[1].price - close).abs());
            }
        }
    }

    #[test]
    fn test_cluster_merges_at_volume_weighted_price() {
        let pivots = vec![
            Pivot { index: 1, price: 100.0, volume: 300.0 },
            Pivot { index: 5, price: 100.4, volume: 100.0 },
        ];
        let clusters = cluster_pivots(&pivots, 0.5);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].touches, 2);
        assert_eq!(clusters[0].last_index, 5);
        assert!((clusters[0].price - 100.1).abs() < 1e-9);
    }

    #[test]
    fn test_cluster_touch_weighted_without_volume() {
        let pivots = vec![
            Pivot { index: 1, price: 100.0, volume: 0.0 },
            Pivot { index: 2, price: 100.2, volume: 0.0 },
            Pivot { index: 3, price: 100.4, volume: 0.0 },
        ];
        let clusters = cluster_pivots(&pivots, 0.35);
        assert_eq!(clusters.len(), 1);
        assert!((clusters[0].price - 100.2).abs() < 1e-9);
    }

    #[test]
    fn test_drifting_clusters_merge() {
        // 101.0 starts its own cluster, then later touches pull the first
        // cluster up to 100.45, within tolerance of it
        let pivots: Vec<Pivot> = [100.0, 101.0, 100.45, 100.55, 100.6, 100.65]
            .iter()
            .enumerate()
            .map(|(i, &price)| Pivot { index: i, price, volume: 0.0 })
            .collect();
        let clusters = cluster_pivots(&pivots, 0.6);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].touches, 6);
    }

    #[test]
    fn test_flat_series_has_no_levels() {
        let bars: Vec<Candle> = (0..50)
            .map(|i| Candle::new(i, 10.0, 10.0, 10.0, 10.0, 1.0))
            .collect();
        let levels = SupportResistanceDetector::new(LevelParams::default()).detect(&bars);
        assert!(levels.resistance.is_empty());
        assert!(levels.support.is_empty());
    }
}
