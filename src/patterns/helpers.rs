//! Shared thresholds and scoring for the pattern detectors
//!
//! Detectors test ratio-based thresholds, never exact equality. How far a
//! candle clears each threshold becomes the match quality, which scales the
//! pattern's base reliability.

// ============================================================
// DEFAULT THRESHOLDS
// ============================================================

/// Long shadow must be at least this many bodies
pub const SHADOW_MULTIPLE: f64 = 2.0;
/// Opposite shadow of a hammer-shaped candle, in bodies
pub const OPPOSITE_SHADOW_FACTOR: f64 = 0.1;
/// Hammer body must stay below this share of the range
pub const HAMMER_BODY_RATIO: f64 = 0.3;
/// Doji body must stay at or below this share of the range
pub const DOJI_BODY_RATIO: f64 = 0.05;
/// Dragonfly / gravestone long shadow, as a share of the range
pub const DOJI_LONG_SHADOW: f64 = 0.6;
/// Dragonfly / gravestone short shadow, as a share of the range
pub const DOJI_SHORT_SHADOW: f64 = 0.1;
/// Both legs of a long-legged doji, as a share of the range
pub const DOJI_LEG: f64 = 0.3;
/// Engulfing body must be this many times the engulfed body
pub const ENGULF_BODY_MULTIPLE: f64 = 1.5;
/// Piercing / dark cloud penetration into the first body
pub const MIN_PENETRATION: f64 = 0.5;
/// Star body relative to the first candle's body
pub const STAR_BODY_RATIO: f64 = 0.3;

// Weight of the base reliability that does not depend on match quality
const QUALITY_FLOOR: f64 = 0.7;

// ============================================================
// SCORING
// ============================================================

/// How far `value` clears a lower bound, 0 at the bound and 1 at twice it
#[inline]
pub fn excess_over(value: f64, threshold: f64) -> f64 {
    if threshold <= 0.0 {
        return if value > 0.0 { 1.0 } else { 0.0 };
    }
    (value / threshold - 1.0).clamp(0.0, 1.0)
}

/// How far `value` stays under an upper bound, 1 at zero and 0 at the bound
#[inline]
pub fn margin_under(value: f64, limit: f64) -> f64 {
    if limit <= 0.0 {
        return if value <= 0.0 { 1.0 } else { 0.0 };
    }
    (1.0 - value / limit).clamp(0.0, 1.0)
}

/// Mean of the component qualities
#[inline]
pub fn quality(components: &[f64]) -> f64 {
    if components.is_empty() {
        return 0.0;
    }
    components.iter().sum::<f64>() / components.len() as f64
}

/// Base reliability scaled by match quality; never exceeds `base`
#[inline]
pub fn reliability(base: f64, quality: f64) -> f64 {
    base * (QUALITY_FLOOR + (1.0 - QUALITY_FLOOR) * quality.clamp(0.0, 1.0))
}

/// Strictly between two bounds given in any order
#[inline]
pub fn within(value: f64, a: f64, b: f64) -> bool {
    value > a.min(b) && value < a.max(b)
}
