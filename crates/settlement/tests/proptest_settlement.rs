use chrono::{Duration, TimeZone, Utc};
use proptest::prelude::*;

use common::{Decision, Direction, Outcome};
use settlement::{aggregate, SettlementEvaluator};

fn direction() -> impl Strategy<Value = Direction> {
    prop_oneof![Just(Direction::Up), Just(Direction::Down)]
}

proptest! {
    /// Once resolved, no later pass changes outcome, close price or close time.
    #[test]
    fn settlement_is_write_once(
        specs in prop::collection::vec((direction(), 1.0f64..1_000.0, 1u64..120), 1..30),
        passes in prop::collection::vec((0i64..600, 1.0f64..1_000.0), 1..20),
    ) {
        let t0 = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let mut store: Vec<Decision> = specs
            .iter()
            .map(|&(dir, entry, secs)| Decision::binary(dir, entry, secs, t0))
            .collect();
        let evaluator = SettlementEvaluator::new();

        let mut first_seen: Vec<Option<(Outcome, Option<f64>, Option<chrono::DateTime<Utc>>)>> =
            vec![None; store.len()];

        let mut offset = 0i64;
        for (step, price) in passes {
            offset += step;
            evaluator.settle_due(&mut store, Some(price), t0 + Duration::seconds(offset));

            for (i, d) in store.iter().enumerate() {
                if !d.is_resolved() {
                    prop_assert!(first_seen[i].is_none());
                    continue;
                }
                let now = (d.outcome(), d.close_price(), d.close_time());
                if let Some(prev) = first_seen[i] {
                    prop_assert_eq!(prev, now);
                } else {
                    first_seen[i] = Some(now);
                }
            }
        }
    }

    /// wins + losses + draws == total_resolved, and the win rate is zero
    /// exactly when nothing has resolved.
    #[test]
    fn stats_are_consistent(
        outcomes in prop::collection::vec(0u8..4, 0..200),
    ) {
        let t0 = Utc::now();
        let store: Vec<Decision> = outcomes
            .iter()
            .map(|&o| {
                let mut d = Decision::binary(Direction::Up, 100.0, 60, t0);
                let outcome = match o {
                    0 => Outcome::Win,
                    1 => Outcome::Loss,
                    2 => Outcome::Draw,
                    _ => Outcome::Pending,
                };
                d.resolve(outcome, 100.0, t0, None);
                d
            })
            .collect();

        let stats = aggregate(&store);
        prop_assert_eq!(stats.wins + stats.losses + stats.draws, stats.total_resolved);
        if stats.total_resolved == 0 {
            prop_assert_eq!(stats.win_rate, 0.0);
        } else {
            let expected = stats.wins as f64 / stats.total_resolved as f64 * 100.0;
            prop_assert!((stats.win_rate - expected).abs() < 1e-9);
            prop_assert!((0.0..=100.0).contains(&stats.win_rate));
        }
    }
}
