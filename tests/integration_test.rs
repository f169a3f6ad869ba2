#![cfg(feature = "sqlite")]
//! Integration tests for the settlement engine over the SQLite ledger and
//! the crossover backtest fed by a quote port.
//!
//! Tests cover:
//! - Order acceptance checks for buys and sells
//! - Fill settlement, cancellation and terminal states
//! - Fill re-validation when pending orders jointly exceed the account
//! - Parallel fills against a file-backed ledger with a connection pool
//! - Top-ups, withdrawals and the transaction log
//! - Holdings aggregation and its independence from input order
//! - Backtest over stored quotes and the synthetic fallback

mod common;

use common::*;
use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tradedesk::adapters::sqlite_adapter::SqliteAdapter;
use tradedesk::domain::backtest::{BacktestConfig, BacktestYears, DataSource};
use tradedesk::domain::order::{Direction, OrderFilter, OrderStatus};
use tradedesk::domain::settlement::{LedgerSettings, SettlementEngine};

const USER: i64 = 7;

fn ledger() -> SqliteAdapter {
    let adapter = SqliteAdapter::in_memory().unwrap();
    adapter.initialize_schema().unwrap();
    adapter
}

fn funded(adapter: &SqliteAdapter, amount: Decimal) -> SettlementEngine<'_> {
    let engine = SettlementEngine::new(adapter, LedgerSettings::default());
    engine.top_up(USER, &cash(amount)).unwrap();
    engine
}

mod order_acceptance {
    use super::*;

    #[test]
    fn new_account_starts_with_configured_cash() {
        let adapter = ledger();
        let engine = SettlementEngine::new(
            &adapter,
            LedgerSettings {
                default_starting_cash: dec!(2500),
            },
        );
        let balance = engine.balance(USER).unwrap();
        assert_eq!(balance.available_cash, dec!(2500));
        assert_eq!(balance.total_invested, Decimal::ZERO);
    }

    #[test]
    fn buy_within_cash_is_pending_and_leaves_balance_untouched() {
        let adapter = ledger();
        let engine = funded(&adapter, dec!(10000));

        let order = engine.create_order(USER, &buy("aapl", dec!(150), 10)).unwrap();
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.symbol, "AAPL");
        assert_eq!(engine.balance(USER).unwrap().available_cash, dec!(10000));
    }

    #[test]
    fn buy_exceeding_cash_is_refused() {
        let adapter = ledger();
        let engine = funded(&adapter, dec!(1000));

        let err = engine
            .create_order(USER, &buy("AAPL", dec!(150), 10))
            .unwrap_err();
        match err {
            TradeDeskError::InsufficientFunds { needed, available } => {
                assert_eq!(needed, dec!(1500));
                assert_eq!(available, dec!(1000));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(engine.orders(USER, &OrderFilter::default()).unwrap().is_empty());
    }

    #[test]
    fn buy_for_exactly_available_cash_is_accepted() {
        let adapter = ledger();
        let engine = funded(&adapter, dec!(1500));
        assert!(engine.create_order(USER, &buy("AAPL", dec!(150), 10)).is_ok());
    }

    #[test]
    fn same_buy_passes_or_fails_on_available_cash() {
        let rich = ledger();
        let engine = funded(&rich, dec!(2000));
        assert!(engine.create_order(USER, &buy("AAPL", dec!(150), 10)).is_ok());

        let poor = ledger();
        let engine = funded(&poor, dec!(1000));
        let err = engine
            .create_order(USER, &buy("AAPL", dec!(150), 10))
            .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("need $1500.00"), "{message}");
        assert!(message.contains("have $1000.00"), "{message}");
    }

    #[test]
    fn sell_up_to_held_quantity_is_accepted() {
        let adapter = ledger();
        let engine = funded(&adapter, dec!(10000));
        let order = engine.create_order(USER, &buy("AAPL", dec!(100), 5)).unwrap();
        engine.update_order_status(USER, order.id, "Filled").unwrap();

        assert!(engine.create_order(USER, &sell("AAPL", dec!(100), 5)).is_ok());
    }

    #[test]
    fn order_value_beyond_decimal_range_is_validation_error() {
        let adapter = ledger();
        let engine = funded(&adapter, dec!(1000));

        let err = engine
            .create_order(USER, &buy("AAPL", dec!(100000000000000000000), 10_000_000_000))
            .unwrap_err();
        assert!(matches!(err, TradeDeskError::Validation { ref reason } if reason == "Order value too large"));
        assert!(engine.orders(USER, &OrderFilter::default()).unwrap().is_empty());
    }

    #[test]
    fn sell_without_position_is_refused() {
        let adapter = ledger();
        let engine = funded(&adapter, dec!(1000));

        let err = engine
            .create_order(USER, &sell("MSFT", dec!(10), 1))
            .unwrap_err();
        assert!(matches!(err, TradeDeskError::NoPosition { ref symbol } if symbol == "MSFT"));
    }

    #[test]
    fn sell_more_than_held_is_refused() {
        let adapter = ledger();
        let engine = funded(&adapter, dec!(10000));
        let order = engine.create_order(USER, &buy("AAPL", dec!(100), 5)).unwrap();
        engine.update_order_status(USER, order.id, "Filled").unwrap();

        let err = engine
            .create_order(USER, &sell("AAPL", dec!(100), 6))
            .unwrap_err();
        assert!(matches!(
            err,
            TradeDeskError::InsufficientShares {
                held: 5,
                requested: 6,
                ..
            }
        ));
    }

    #[test]
    fn pending_buys_do_not_count_as_holdings() {
        let adapter = ledger();
        let engine = funded(&adapter, dec!(10000));
        engine.create_order(USER, &buy("AAPL", dec!(100), 5)).unwrap();

        assert!(engine.holdings(USER).unwrap().is_empty());
        assert!(matches!(
            engine.create_order(USER, &sell("AAPL", dec!(100), 1)),
            Err(TradeDeskError::NoPosition { .. })
        ));
    }

    #[test]
    fn malformed_request_is_validation_error() {
        let adapter = ledger();
        let engine = funded(&adapter, dec!(1000));
        let mut request = buy("AAPL", dec!(10), 1);
        request.quantity = Some(0);

        assert!(matches!(
            engine.create_order(USER, &request),
            Err(TradeDeskError::Validation { .. })
        ));
    }
}

mod settlement {
    use super::*;

    #[test]
    fn filling_a_buy_moves_cash_into_invested() {
        let adapter = ledger();
        let engine = funded(&adapter, dec!(10000));
        let order = engine.create_order(USER, &buy("AAPL", dec!(150), 10)).unwrap();

        let filled = engine.update_order_status(USER, order.id, "Filled").unwrap();
        assert_eq!(filled.status, OrderStatus::Filled);

        let balance = engine.balance(USER).unwrap();
        assert_eq!(balance.available_cash, dec!(8500));
        assert_eq!(balance.total_invested, dec!(1500));
    }

    #[test]
    fn filling_a_sell_returns_cash() {
        let adapter = ledger();
        let engine = funded(&adapter, dec!(10000));
        let bought = engine.create_order(USER, &buy("AAPL", dec!(100), 10)).unwrap();
        engine.update_order_status(USER, bought.id, "Filled").unwrap();

        let sold = engine.create_order(USER, &sell("AAPL", dec!(120), 4)).unwrap();
        engine.update_order_status(USER, sold.id, "Filled").unwrap();

        let balance = engine.balance(USER).unwrap();
        assert_eq!(balance.available_cash, dec!(9480));
        assert_eq!(balance.total_invested, dec!(520));

        let holdings = engine.holdings(USER).unwrap();
        assert_eq!(holdings.len(), 1);
        assert_eq!(holdings[0].quantity, 6);
    }

    #[test]
    fn cancelling_leaves_balance_untouched() {
        let adapter = ledger();
        let engine = funded(&adapter, dec!(10000));
        let order = engine.create_order(USER, &buy("AAPL", dec!(150), 10)).unwrap();

        let cancelled = engine
            .update_order_status(USER, order.id, "Cancelled")
            .unwrap();
        assert_eq!(cancelled.status, OrderStatus::Cancelled);
        assert_eq!(engine.balance(USER).unwrap().available_cash, dec!(10000));
    }

    #[test]
    fn terminal_orders_cannot_change_again() {
        let adapter = ledger();
        let engine = funded(&adapter, dec!(10000));
        let order = engine.create_order(USER, &buy("AAPL", dec!(150), 10)).unwrap();
        engine.update_order_status(USER, order.id, "Filled").unwrap();

        let err = engine
            .update_order_status(USER, order.id, "Cancelled")
            .unwrap_err();
        assert!(matches!(err, TradeDeskError::OrderNotPending { .. }));
        assert_eq!(engine.balance(USER).unwrap().available_cash, dec!(8500));
    }

    #[test]
    fn pending_and_unknown_targets_are_invalid_status() {
        let adapter = ledger();
        let engine = funded(&adapter, dec!(10000));
        let order = engine.create_order(USER, &buy("AAPL", dec!(1), 1)).unwrap();

        for target in ["Pending", "Shipped", ""] {
            assert!(matches!(
                engine.update_order_status(USER, order.id, target),
                Err(TradeDeskError::InvalidStatus)
            ));
        }
    }

    #[test]
    fn another_users_order_is_not_found() {
        let adapter = ledger();
        let engine = funded(&adapter, dec!(10000));
        let order = engine.create_order(USER, &buy("AAPL", dec!(1), 1)).unwrap();

        assert!(matches!(
            engine.update_order_status(USER + 1, order.id, "Filled"),
            Err(TradeDeskError::OrderNotFound { .. })
        ));
        assert!(matches!(
            engine.update_order_status(USER, 9999, "Filled"),
            Err(TradeDeskError::OrderNotFound { order_id: 9999 })
        ));
    }

    #[test]
    fn second_fill_that_would_overdraw_is_refused_and_stays_pending() {
        let adapter = ledger();
        let engine = funded(&adapter, dec!(1000));
        let first = engine.create_order(USER, &buy("AAPL", dec!(100), 8)).unwrap();
        let second = engine.create_order(USER, &buy("MSFT", dec!(100), 8)).unwrap();

        engine.update_order_status(USER, first.id, "Filled").unwrap();
        let err = engine
            .update_order_status(USER, second.id, "Filled")
            .unwrap_err();
        assert!(matches!(err, TradeDeskError::InsufficientFunds { .. }));

        let balance = engine.balance(USER).unwrap();
        assert_eq!(balance.available_cash, dec!(200));
        assert!(balance.available_cash >= Decimal::ZERO);

        let pending = engine
            .orders(
                USER,
                &OrderFilter {
                    status: Some(OrderStatus::Pending),
                    direction: None,
                },
            )
            .unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, second.id);
    }

    #[test]
    fn order_listing_is_newest_first_and_filterable() {
        let adapter = ledger();
        let engine = funded(&adapter, dec!(10000));
        let a = engine.create_order(USER, &buy("AAPL", dec!(10), 1)).unwrap();
        engine.update_order_status(USER, a.id, "Filled").unwrap();
        let b = engine.create_order(USER, &sell("AAPL", dec!(10), 1)).unwrap();

        let all = engine.orders(USER, &OrderFilter::default()).unwrap();
        assert_eq!(all.iter().map(|o| o.id).collect::<Vec<_>>(), vec![b.id, a.id]);

        let sells = engine
            .orders(USER, &OrderFilter::from_query(Some("All"), Some("Sell")).unwrap())
            .unwrap();
        assert_eq!(sells.len(), 1);
        assert_eq!(sells[0].direction, Direction::Sell);
    }
}

mod concurrent_fills {
    use super::*;
    use tradedesk::adapters::file_config_adapter::FileConfigAdapter;

    const FUNDED: Decimal = dec!(1000);
    const PENDING_BUYS: usize = 4;

    fn file_ledger(dir: &tempfile::TempDir) -> SqliteAdapter {
        let db = dir.path().join("ledger.db");
        let config = FileConfigAdapter::from_string(&format!(
            "[sqlite]\npath = {}\npool_size = {PENDING_BUYS}\n",
            db.display()
        ))
        .unwrap();
        let adapter = SqliteAdapter::from_config(&config).unwrap();
        adapter.initialize_schema().unwrap();
        adapter
    }

    #[test]
    fn parallel_fills_never_overdraw_the_account() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = file_ledger(&dir);
        let engine = SettlementEngine::new(&adapter, LedgerSettings::default());

        for user in 1..=12 {
            engine.top_up(user, &cash(FUNDED)).unwrap();
            let ids: Vec<i64> = (0..PENDING_BUYS)
                .map(|_| engine.create_order(user, &buy("AAPL", dec!(60), 10)).unwrap().id)
                .collect();

            let outcomes: Vec<Result<_, TradeDeskError>> = std::thread::scope(|scope| {
                let handles: Vec<_> = ids
                    .iter()
                    .map(|&id| {
                        let adapter = &adapter;
                        scope.spawn(move || {
                            SettlementEngine::new(adapter, LedgerSettings::default())
                                .update_order_status(user, id, "Filled")
                        })
                    })
                    .collect();
                handles.into_iter().map(|h| h.join().unwrap()).collect()
            });

            let filled = outcomes.iter().filter(|o| o.is_ok()).count();
            assert_eq!(filled, 1, "user {user}: {outcomes:?}");
            for outcome in &outcomes {
                if let Err(e) = outcome {
                    assert!(
                        matches!(e, TradeDeskError::InsufficientFunds { .. }),
                        "user {user}: unexpected {e:?}"
                    );
                }
            }

            let balance = engine.balance(user).unwrap();
            assert!(balance.available_cash >= Decimal::ZERO);
            assert_eq!(balance.available_cash + balance.total_invested, FUNDED);
            assert_eq!(balance.total_invested, dec!(600));

            let filter = OrderFilter {
                status: Some(OrderStatus::Filled),
                direction: None,
            };
            assert_eq!(engine.orders(user, &filter).unwrap().len(), 1);
        }
    }
}

mod cash_movements {
    use super::*;

    #[test]
    fn top_up_then_withdraw_updates_balance_and_log() {
        let adapter = ledger();
        let engine = funded(&adapter, dec!(500));
        let balance = engine.withdraw(USER, &cash(dec!(200))).unwrap();
        assert_eq!(balance.available_cash, dec!(300));

        let log = engine.transactions(USER).unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].amount, dec!(200));
        assert_eq!(log[1].amount, dec!(500));
    }

    #[test]
    fn withdraw_beyond_cash_is_refused_without_logging() {
        let adapter = ledger();
        let engine = funded(&adapter, dec!(100));

        let err = engine.withdraw(USER, &cash(dec!(150))).unwrap_err();
        assert!(matches!(err, TradeDeskError::InsufficientCash { .. }));
        assert_eq!(engine.balance(USER).unwrap().available_cash, dec!(100));
        assert_eq!(engine.transactions(USER).unwrap().len(), 1);
    }

    #[test]
    fn unsupported_payment_method_is_validation_error() {
        let adapter = ledger();
        let engine = SettlementEngine::new(&adapter, LedgerSettings::default());
        let mut request = cash(dec!(10));
        request.payment_method = Some("paypal".into());

        assert!(matches!(
            engine.top_up(USER, &request),
            Err(TradeDeskError::Validation { .. })
        ));
        assert!(engine.transactions(USER).unwrap().is_empty());
    }

    #[test]
    fn top_up_past_decimal_range_is_refused() {
        let adapter = ledger();
        let engine = funded(&adapter, dec!(70000000000000000000000000000));

        let err = engine
            .top_up(USER, &cash(dec!(70000000000000000000000000000)))
            .unwrap_err();
        assert!(matches!(err, TradeDeskError::Validation { .. }));
        assert_eq!(
            engine.balance(USER).unwrap().available_cash,
            dec!(70000000000000000000000000000)
        );
        assert_eq!(engine.transactions(USER).unwrap().len(), 1);
    }

    #[test]
    fn non_positive_amounts_are_rejected() {
        let adapter = ledger();
        let engine = SettlementEngine::new(&adapter, LedgerSettings::default());
        assert!(engine.top_up(USER, &cash(dec!(0))).is_err());
        assert!(engine.top_up(USER, &cash(dec!(-5))).is_err());
    }
}

mod holdings_aggregation {
    use super::*;
    use chrono::Utc;
    use tradedesk::domain::holdings::aggregate;
    use tradedesk::domain::order::{Order, OrderType};

    fn filled(id: i64, direction: Direction, price: Decimal, quantity: i64) -> Order {
        Order {
            id,
            user_id: USER,
            symbol: "AAPL".into(),
            name: "Apple".into(),
            direction,
            price,
            quantity,
            order_type: OrderType::Limit,
            session: None,
            status: OrderStatus::Filled,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn buys_and_sells_net_out_with_cost() {
        let adapter = ledger();
        let engine = funded(&adapter, dec!(100000));
        for request in [buy("AAPL", dec!(100), 10), buy("AAPL", dec!(110), 10)] {
            let o = engine.create_order(USER, &request).unwrap();
            engine.update_order_status(USER, o.id, "Filled").unwrap();
        }
        let s = engine.create_order(USER, &sell("AAPL", dec!(120), 5)).unwrap();
        engine.update_order_status(USER, s.id, "Filled").unwrap();

        let holdings = engine.holdings(USER).unwrap();
        assert_eq!(holdings.len(), 1);
        assert_eq!(holdings[0].quantity, 15);
        assert_eq!(holdings[0].total_cost, dec!(1500));
        assert_eq!(holdings[0].avg_price, dec!(100));
    }

    #[test]
    fn buy_buy_sell_at_same_price() {
        let orders = vec![
            filled(1, Direction::Buy, dec!(100), 10),
            filled(2, Direction::Buy, dec!(100), 5),
            filled(3, Direction::Sell, dec!(100), 5),
        ];
        let holdings = aggregate(&orders).unwrap();
        assert_eq!(holdings.len(), 1);
        assert_eq!(holdings[0].quantity, 10);
        assert_eq!(holdings[0].total_cost, dec!(1000));
        assert_eq!(holdings[0].avg_price, dec!(100));
    }

    #[test]
    fn fully_sold_symbols_are_omitted() {
        let adapter = ledger();
        let engine = funded(&adapter, dec!(10000));
        let b = engine.create_order(USER, &buy("AAPL", dec!(10), 3)).unwrap();
        engine.update_order_status(USER, b.id, "Filled").unwrap();
        let s = engine.create_order(USER, &sell("AAPL", dec!(12), 3)).unwrap();
        engine.update_order_status(USER, s.id, "Filled").unwrap();

        assert!(engine.holdings(USER).unwrap().is_empty());
    }

    fn arb_order() -> impl Strategy<Value = (bool, i64, i64)> {
        (any::<bool>(), 1i64..500, 1i64..50)
    }

    proptest! {
        #[test]
        fn aggregation_ignores_input_order(
            raw in prop::collection::vec(arb_order(), 1..20),
            rotate in 0usize..20,
        ) {
            let orders: Vec<Order> = raw
                .iter()
                .enumerate()
                .map(|(i, &(is_buy, price, qty))| {
                    let direction = if is_buy { Direction::Buy } else { Direction::Sell };
                    filled(i as i64 + 1, direction, Decimal::from(price), qty)
                })
                .collect();

            let mut shuffled = orders.clone();
            let len = shuffled.len();
            shuffled.rotate_left(rotate % len);
            shuffled.reverse();

            prop_assert_eq!(aggregate(&orders).unwrap(), aggregate(&shuffled).unwrap());
        }
    }
}

mod backtest_pipeline {
    use super::*;
    use tradedesk::cli::run_backtest_with;
    use tradedesk::ports::quote_port::QuotePort;

    #[test]
    fn stored_quotes_drive_a_quoted_backtest() {
        let adapter = ledger();
        let bars = generate_bars("AAPL", "2020-01-01", 400, 100.0);
        assert_eq!(adapter.insert_quotes(&bars).unwrap(), 400);

        let fetched = adapter.fetch_daily("AAPL", 300).unwrap().unwrap();
        assert_eq!(fetched.len(), 300);
        assert_eq!(fetched.last().unwrap().date, bars.last().unwrap().date);

        let result = run_backtest_with(
            &adapter,
            "AAPL",
            BacktestYears::Three,
            1,
            &BacktestConfig::default(),
        )
        .unwrap();
        assert_eq!(result.data_source, DataSource::Quoted);
        assert!(result.synthetic_seed.is_none());
        assert!(result.total_trades > 0);
        assert!(result.trades.len() % 2 == 0);
    }

    #[test]
    fn short_history_falls_back_to_synthetic() {
        let port = MockQuotePort::new().with_bars("AAPL", generate_bars("AAPL", "2024-01-01", 50, 100.0));
        let result = run_backtest_with(
            &port,
            "AAPL",
            BacktestYears::Three,
            9,
            &BacktestConfig::default(),
        )
        .unwrap();
        assert_eq!(result.data_source, DataSource::Synthetic);
        assert_eq!(result.synthetic_seed, Some(9));
        assert!(result.fallback_reason.unwrap().contains("50"));
    }

    #[test]
    fn provider_error_falls_back_to_synthetic() {
        let port = MockQuotePort::new().with_error("AAPL", "rate limited");
        let result = run_backtest_with(
            &port,
            "AAPL",
            BacktestYears::Five,
            3,
            &BacktestConfig::default(),
        )
        .unwrap();
        assert_eq!(result.data_source, DataSource::Synthetic);
        assert!(result.fallback_reason.unwrap().contains("rate limited"));
    }

    #[test]
    fn unpriced_bar_taints_whole_series() {
        let mut bars = generate_bars("AAPL", "2020-01-01", 300, 100.0);
        bars[150].close = 0.0;
        let port = MockQuotePort::new().with_bars("AAPL", bars);
        let result = run_backtest_with(
            &port,
            "AAPL",
            BacktestYears::Three,
            3,
            &BacktestConfig::default(),
        )
        .unwrap();
        assert_eq!(result.data_source, DataSource::Synthetic);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn backtest_is_deterministic_for_a_series(seed in any::<u64>()) {
            let port = MockQuotePort::new();
            let config = BacktestConfig::default();
            let a = run_backtest_with(&port, "ZZZ", BacktestYears::Three, seed, &config).unwrap();
            let b = run_backtest_with(&port, "ZZZ", BacktestYears::Three, seed, &config).unwrap();
            prop_assert_eq!(a.final_value, b.final_value);
            prop_assert_eq!(a.total_trades, b.total_trades);
            prop_assert_eq!(a.chart_data.prices, b.chart_data.prices);
            prop_assert!(a.max_drawdown >= 0.0 && a.max_drawdown <= 100.0);
        }
    }
}
