//! Property tests over generated candle series.

use proptest::prelude::*;
use proptest::strategy::ValueTree;
use trendscope::opportunity::allocate_position;
use trendscope::prelude::{
    analyze, AnalysisEngine, Candle, CandleSeries, Direction, EngineBuilder, PatternParams,
    PatternRecognizer,
};

/// Random walk of valid candles: (open, close) steps plus wick sizes
fn candles(min: usize, max: usize) -> impl Strategy<Value = Vec<Candle>> {
    let step = (-2.0f64..2.0, -2.0f64..2.0, 0.0f64..1.5, 0.0f64..1.5);
    prop::collection::vec(step, min..max).prop_map(|steps| {
        let mut price = 500.0;
        steps
            .into_iter()
            .enumerate()
            .map(|(i, (gap, move_, upper, lower))| {
                let open = (price + gap).max(1.0);
                let close = (open + move_).max(1.0);
                price = close;
                Candle::new(
                    i as i64 * 60_000,
                    open,
                    open.max(close) + upper,
                    (open.min(close) - lower).max(0.5),
                    close,
                    100.0,
                )
            })
            .collect()
    })
}

/// Strictly increasing closes with arbitrary bodies and wicks
fn rising_closes() -> impl Strategy<Value = Vec<Candle>> {
    prop::collection::vec((0.01f64..2.0, -3.0f64..3.0, 0.0f64..1.0, 0.0f64..1.0), 10..80).prop_map(
        |steps| {
            let mut close = 100.0;
            steps
                .into_iter()
                .enumerate()
                .map(|(i, (rise, body, upper, lower))| {
                    close += rise;
                    let open = (close + body).max(1.0);
                    Candle::new(
                        i as i64,
                        open,
                        open.max(close) + upper,
                        (open.min(close) - lower).max(0.5),
                        close,
                        1.0,
                    )
                })
                .collect()
        },
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn analysis_outputs_stay_in_range(bars in candles(220, 320)) {
        let series = CandleSeries::new(bars).unwrap();
        let result = analyze("BTCUSDT", "1h", &series).unwrap();

        prop_assert!((0.0..=1.0).contains(&result.trend.strength));
        prop_assert!((0.0..=1.0).contains(&result.trend.change_probability));
        prop_assert!((0.0..=100.0).contains(&result.indicators.rsi.rsi14));
        prop_assert!((0.0..=100.0).contains(&result.indicators.rsi.rsi6));
        prop_assert!(result.indicators.atr.value >= 0.0);

        let n = series.len();
        for p in &result.candlestick_patterns {
            prop_assert!(p.position < n);
            prop_assert!((0.0..=1.0).contains(&p.reliability));
        }
        prop_assert!(result
            .candlestick_patterns
            .windows(2)
            .all(|w| w[0].position <= w[1].position));

        let quality = &result.market_structure.market_quality;
        prop_assert!((0.0..=100.0).contains(&quality.overall_score));
        let sum: f64 = quality.score_breakdown.values().sum();
        prop_assert!((sum - quality.overall_score).abs() < 1e-6);
    }

    #[test]
    fn opportunities_respect_min_risk_reward(bars in candles(220, 300), min_rr in 0.0f64..4.0) {
        let series = CandleSeries::new(bars).unwrap();
        let response = AnalysisEngine::default()
            .find_opportunities_at("BTCUSDT", "5m", &series, min_rr, 0)
            .unwrap();
        for opp in &response.opportunities {
            prop_assert!(opp.risk_reward.ratio >= min_rr);
            prop_assert!(opp.confidence.score <= 100);
            prop_assert_eq!(
                opp.take_profit.iter().map(|t| t.position_close_pct).sum::<u32>(),
                100
            );
        }
    }

    #[test]
    fn rising_closes_have_no_bearish_patterns(bars in rising_closes()) {
        let recognizer = PatternRecognizer::new(&PatternParams::default());
        let patterns = recognizer.recognize(&bars[..]);
        prop_assert!(patterns.iter().all(|p| p.direction != Direction::Bearish));
    }

    #[test]
    fn position_allocation_is_complete(levels in 1usize..12) {
        let pct = allocate_position(levels);
        prop_assert_eq!(pct.len(), levels);
        prop_assert_eq!(pct.iter().sum::<u32>(), 100);
        prop_assert!(pct.windows(2).all(|w| w[0] >= w[1]));
    }
}

#[test]
fn parallel_engine_is_deterministic() {
    let mut runner = proptest::test_runner::TestRunner::deterministic();
    let bars = candles(240, 241).new_tree(&mut runner).unwrap().current();
    let series = CandleSeries::new(bars).unwrap();

    let parallel = EngineBuilder::new().build().unwrap();
    let sequential = EngineBuilder::new().parallel(false).build().unwrap();
    let a = serde_json::to_string(&parallel.analyze("BTCUSDT", "1h", &series).unwrap()).unwrap();
    let b = serde_json::to_string(&sequential.analyze("BTCUSDT", "1h", &series).unwrap()).unwrap();
    assert_eq!(a, b);
}
