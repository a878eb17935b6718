use proptest::prelude::*;

use common::AllocationConfig;
use paper::PortfolioLedger;

proptest! {
    /// No sequence of buys, sells and marks drives cash negative, and
    /// equity always equals cash + holdings × latest executed/marked price.
    #[test]
    fn cash_never_negative_and_equity_is_derived(
        starting_cash in 0.0f64..100_000.0,
        stake_fraction in 0.0f64..=1.0,
        min_order in 0.0f64..5_000.0,
        steps in prop::collection::vec((0u8..3, 0.01f64..10_000.0), 0..64),
    ) {
        let mut ledger = PortfolioLedger::new(AllocationConfig {
            starting_cash,
            stake_fraction,
            min_order,
        });
        let mut mark = 0.0;

        for (op, price) in steps {
            let moved = match op {
                0 => ledger.buy(price).is_ok(),
                1 => ledger.sell(price).is_ok(),
                _ => { ledger.mark(price); true }
            };
            if moved {
                mark = price;
            }

            prop_assert!(ledger.cash() >= 0.0, "cash went negative: {}", ledger.cash());
            prop_assert!(ledger.holdings() >= 0.0);
            let snap = ledger.snapshot();
            prop_assert_eq!(snap.equity, snap.cash + snap.holdings * mark);
        }
    }

    /// A sell always realizes exactly (sell − buy) × quantity.
    #[test]
    fn sell_profit_matches_pairing(buy in 1.0f64..1_000.0, sell in 1.0f64..1_000.0) {
        let mut ledger = PortfolioLedger::new(AllocationConfig::default());
        let bought = ledger.buy(buy).unwrap();
        let sold = ledger.sell(sell).unwrap();
        prop_assert_eq!(sold.quantity, bought.quantity);
        prop_assert_eq!(sold.profit_loss, (sell - buy) * bought.quantity);
        prop_assert_eq!(ledger.holdings(), 0.0);
    }
}
