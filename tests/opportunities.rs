//! End-to-end tests for `find_opportunities`.

use trendscope::opportunity::update_status;
use trendscope::prelude::*;

const HOUR: i64 = 3_600_000;
const NOW: i64 = 1_700_000_000_000;

fn flat(n: usize) -> CandleSeries {
    let candles = (0..n)
        .map(|i| Candle::new(i as i64 * HOUR, 100.0, 100.0, 100.0, 100.0, 500.0))
        .collect();
    CandleSeries::new(candles).unwrap()
}

/// Steady uptrend whose last candle dips back to EMA21 and closes higher
fn pullback_in_uptrend() -> Vec<Candle> {
    let mut candles: Vec<Candle> = (0..299)
        .map(|i| {
            let c = 100.0 + i as f64 * 0.5;
            Candle::new(i as i64 * HOUR, c - 0.3, c + 0.4, c - 0.6, c, 1_000.0)
        })
        .collect();
    candles.push(Candle::new(299 * HOUR, 249.0, 249.4, 243.5, 249.2, 1_500.0));
    candles
}

fn zigzag(n: usize) -> CandleSeries {
    let price = |i: usize| -> f64 {
        let phase = (i % 20) as f64;
        match i % 20 {
            0..=5 => 100.0 + 2.0 * phase,
            6..=15 => 110.0 - 2.0 * (phase - 5.0),
            _ => 90.0 + 2.0 * (phase - 15.0),
        }
    };
    let candles = (0..n)
        .map(|i| {
            let c = price(i);
            let o = if i == 0 { c } else { (price(i - 1) + c) / 2.0 };
            Candle::new(i as i64 * HOUR, o, o.max(c) + 0.5, o.min(c) - 0.5, c, 100.0)
        })
        .collect();
    CandleSeries::new(candles).unwrap()
}

/// Invariants every generated opportunity must satisfy
fn check_opportunity(opp: &TradingOpportunity, min_rr: f64, now: i64, interval_ms: i64) {
    let sign = opp.side.sign();
    assert!(sign * (opp.entry.price - opp.stop_loss.price) > 0.0, "stop on the wrong side");
    assert!(!opp.take_profit.is_empty());
    assert!(opp
        .take_profit
        .iter()
        .all(|t| sign * (t.price - opp.entry.price) > 0.0));
    assert_eq!(
        opp.take_profit.iter().map(|t| t.position_close_pct).sum::<u32>(),
        100
    );
    for (i, t) in opp.take_profit.iter().enumerate() {
        assert_eq!(t.level, i + 1);
    }

    assert!(opp.risk_reward.ratio >= min_rr);
    assert!(opp.risk_reward.risk_amount > 0.0);
    assert!(opp.confidence.score <= 100);
    let expected_level = match opp.confidence.score {
        75.. => ConfidenceLevel::High,
        55..=74 => ConfidenceLevel::Medium,
        _ => ConfidenceLevel::Low,
    };
    assert_eq!(opp.confidence.level, expected_level);

    assert_eq!(opp.validity.status, OpportunityStatus::Active);
    assert_eq!(opp.validity.expires_at, now + 4 * interval_ms);
    assert!(opp.id.starts_with("opp_btcusdt_"));
    assert!(opp.id.ends_with(&opp.timestamp.to_string()));
}

fn check_response(response: &OpportunitiesResponse, min_rr: f64, now: i64, interval_ms: i64) {
    for opp in &response.opportunities {
        check_opportunity(opp, min_rr, now, interval_ms);
    }
    for w in response.opportunities.windows(2) {
        let (a, b) = (&w[0], &w[1]);
        assert!(
            a.confidence.score > b.confidence.score
                || (a.confidence.score == b.confidence.score
                    && a.risk_reward.ratio >= b.risk_reward.ratio)
        );
    }
    assert_eq!(response.summary.total_opportunities, response.opportunities.len());
    let high = response
        .opportunities
        .iter()
        .filter(|o| o.confidence.level == ConfidenceLevel::High)
        .count();
    assert_eq!(response.summary.high_confidence_count, high);

    let ratios: Vec<f64> = response.opportunities.iter().map(|o| o.risk_reward.ratio).collect();
    if !ratios.is_empty() {
        let mean = ratios.iter().sum::<f64>() / ratios.len() as f64;
        assert!((response.summary.avg_risk_reward - mean).abs() < 1e-12);
    }
}

// ============================================================
// SCENARIOS
// ============================================================

#[test]
fn test_flat_market_has_no_opportunities() {
    let engine = AnalysisEngine::default();
    let response = engine
        .find_opportunities_at("BTCUSDT", "1h", &flat(300), 0.0, NOW)
        .unwrap();
    assert!(response.is_empty());
    assert_eq!(response.summary.total_opportunities, 0);
    assert_eq!(response.summary.avg_risk_reward, 0.0);
    assert_eq!(response.summary.high_confidence_count, 0);
}

#[test]
fn test_pullback_yields_trend_continuation() {
    let candles = pullback_in_uptrend();
    let series = CandleSeries::new(candles).unwrap();
    let engine = AnalysisEngine::default();

    let analysis = engine.analyze("BTCUSDT", "1h", &series).unwrap();
    assert_eq!(analysis.trend.direction, TrendDirection::Up);
    let atr = analysis.indicators.atr.value;

    let response = engine
        .find_opportunities_at("BTCUSDT", "1h", &series, 0.0, NOW)
        .unwrap();
    check_response(&response, 0.0, NOW, HOUR);
    assert!(response.opportunities.iter().all(|o| o.side == TradeSide::Long));

    let opp = response
        .opportunities
        .iter()
        .find(|o| o.strategy == Strategy::TrendContinuation)
        .expect("trend continuation setup");
    assert_eq!(opp.entry.price, 249.2);
    assert_eq!(opp.stop_loss.method, StopMethod::Atr);
    assert!((opp.stop_loss.price - (249.2 - 1.5 * atr)).abs() < 1e-9);
    assert_eq!(opp.id, format!("opp_btcusdt_trend_continuation_long_{}", 299 * HOUR));
    assert_eq!(opp.timestamp, 299 * HOUR);
}

#[test]
fn test_ranging_market_invariants() {
    let engine = AnalysisEngine::default();
    for n in [250, 263, 277, 290] {
        let response = engine
            .find_opportunities_at("BTCUSDT", "15m", &zigzag(n), 1.0, NOW)
            .unwrap();
        check_response(&response, 1.0, NOW, 15 * 60_000);
    }
}

#[test]
fn test_min_risk_reward_only_removes() {
    let series = CandleSeries::new(pullback_in_uptrend()).unwrap();
    let engine = AnalysisEngine::default();
    let all = engine
        .find_opportunities_at("BTCUSDT", "1h", &series, 0.0, NOW)
        .unwrap();
    let strict = engine
        .find_opportunities_at("BTCUSDT", "1h", &series, 1_000.0, NOW)
        .unwrap();
    assert!(!all.is_empty());
    assert!(strict.is_empty());
}

#[test]
fn test_json_uses_type_for_side() {
    let series = CandleSeries::new(pullback_in_uptrend()).unwrap();
    let response = AnalysisEngine::default()
        .find_opportunities_at("BTCUSDT", "1h", &series, 0.0, NOW)
        .unwrap();
    let json = serde_json::to_value(&response).unwrap();
    let first = &json["opportunities"][0];
    assert_eq!(first["type"], "LONG");
    assert!(first.get("side").is_none());
    assert_eq!(first["validity"]["status"], "ACTIVE");
    assert!(json["summary"]["total_opportunities"].is_u64());
}

// ============================================================
// LIFECYCLE
// ============================================================

#[test]
fn test_status_follows_later_candles() {
    let series = CandleSeries::new(pullback_in_uptrend()).unwrap();
    let response = AnalysisEngine::default()
        .find_opportunities_at("BTCUSDT", "1h", &series, 0.0, NOW)
        .unwrap();
    let opp = response
        .opportunities
        .iter()
        .find(|o| o.strategy == Strategy::TrendContinuation)
        .unwrap();
    let (entry, stop) = (opp.entry.price, opp.stop_loss.price);
    let next = |ts: i64, low: f64, high: f64| Candle::new(ts, high, high, low, low, 10.0);

    let mut triggered = opp.clone();
    let later = [
        next(300 * HOUR, entry + 1.0, entry + 2.0),
        next(301 * HOUR, entry - 0.1, entry + 1.0),
    ];
    assert_eq!(update_status(&mut triggered, NOW, &later), OpportunityStatus::Triggered);

    let mut stopped = opp.clone();
    let crash = [next(300 * HOUR, stop - 1.0, entry + 0.5)];
    assert_eq!(update_status(&mut stopped, NOW, &crash), OpportunityStatus::Invalidated);

    let mut idle = opp.clone();
    let away = [next(300 * HOUR, entry + 3.0, entry + 4.0)];
    assert_eq!(update_status(&mut idle, NOW + HOUR, &away), OpportunityStatus::Active);
    assert_eq!(
        update_status(&mut idle, opp.validity.expires_at + 1, &away),
        OpportunityStatus::Expired
    );
}
