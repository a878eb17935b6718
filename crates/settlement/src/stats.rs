use common::{Decision, Outcome, SessionStats};

/// Recompute session statistics from the decision store.
///
/// Pure function of the resolved subset, so the result can never drift
/// from the decisions themselves. Opening buys are skipped; their
/// round trip is counted once through the closing sell.
pub fn aggregate(decisions: &[Decision]) -> SessionStats {
    let mut stats = SessionStats::default();
    for d in decisions.iter().filter(|d| d.counts_toward_stats()) {
        match d.outcome() {
            Outcome::Win => stats.wins += 1,
            Outcome::Loss => stats.losses += 1,
            Outcome::Draw => stats.draws += 1,
            Outcome::Pending => continue,
        }
    }
    stats.total_resolved = stats.wins + stats.losses + stats.draws;
    stats.win_rate = if stats.total_resolved > 0 {
        stats.wins as f64 / stats.total_resolved as f64 * 100.0
    } else {
        0.0
    };
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use common::Direction;

    fn resolved(outcome: Outcome) -> Decision {
        let mut d = Decision::binary(Direction::Up, 100.0, 60, Utc::now());
        d.resolve(outcome, 100.0, Utc::now(), None);
        d
    }

    #[test]
    fn empty_store_has_zero_win_rate() {
        let stats = aggregate(&[]);
        assert_eq!(stats, SessionStats::default());
    }

    #[test]
    fn pending_decisions_are_ignored() {
        let pending = Decision::binary(Direction::Down, 100.0, 60, Utc::now());
        let stats = aggregate(&[pending, resolved(Outcome::Win)]);
        assert_eq!(stats.total_resolved, 1);
        assert_eq!(stats.win_rate, 100.0);
    }

    #[test]
    fn draws_count_against_win_rate() {
        let store = vec![
            resolved(Outcome::Win),
            resolved(Outcome::Loss),
            resolved(Outcome::Draw),
            resolved(Outcome::Win),
        ];
        let stats = aggregate(&store);
        assert_eq!((stats.wins, stats.losses, stats.draws), (2, 1, 1));
        assert_eq!(stats.total_resolved, 4);
        assert!((stats.win_rate - 50.0).abs() < 1e-9);
    }

    #[test]
    fn position_round_trip_counts_once() {
        let now = Utc::now();
        let mut buy = Decision::open_position(50.0, 100.0, now);
        let sell = Decision::close_position(60.0, 100.0, Some(buy.id.clone()), 50.0, now);
        buy.resolve(sell.outcome(), 60.0, now, sell.profit_loss());
        let stats = aggregate(&[buy, sell]);
        assert_eq!(stats.wins, 1);
        assert_eq!(stats.total_resolved, 1);
    }
}
