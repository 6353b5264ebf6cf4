//! Behavior-driven tests for the portfolio ledger
//!
//! These tests verify how cash, holdings and history move together when
//! orders are applied, and that rejected orders leave nothing behind.

use std::sync::Arc;

use ferrofolio_core::{
    normalize_symbol, ErrorKind, LedgerError, Portfolio, PricePoint, PriceSeries, Stock, Symbol,
    Transaction, UtcDateTime,
};
use time::macros::date;

fn stock(raw: &str, close: f64) -> Arc<Stock> {
    let series = PriceSeries::from_points([
        PricePoint::flat(date!(2024 - 03 - 01), close - 5.0).expect("valid point"),
        PricePoint::flat(date!(2024 - 03 - 04), close).expect("valid point"),
    ]);
    Arc::new(
        Stock::new(Symbol::parse(raw).expect("valid symbol"), None)
            .with_series(series, Some(UtcDateTime::now())),
    )
}

fn buy(stock: &Stock, price: f64, qty: i64) -> Transaction {
    Transaction::market_buy(UtcDateTime::now(), stock.symbol().clone(), price, qty)
        .expect("valid buy")
}

fn sell(stock: &Stock, price: f64, qty: i64) -> Transaction {
    Transaction::market_sell(UtcDateTime::now(), stock.symbol().clone(), price, qty)
        .expect("valid sell")
}

/// Cash, positions and history length, for before/after comparisons.
fn ledger_state(portfolio: &Portfolio) -> (f64, Vec<(String, u64)>, usize) {
    let positions = portfolio
        .holdings()
        .map(|holding| (holding.symbol().to_string(), holding.quantity()))
        .collect();
    (portfolio.free_cash(), positions, portfolio.transactions().len())
}

fn portfolio_after_first_buy(aapl: &Arc<Stock>) -> Portfolio {
    let mut portfolio = Portfolio::new("growth", 100_000.0).expect("portfolio");
    portfolio
        .purchase(buy(aapl, 150.0, 10), Arc::clone(aapl))
        .expect("buy fits in cash");
    portfolio
}

// =============================================================================
// Ledger: Purchases and Sales
// =============================================================================

#[test]
fn when_user_buys_ten_shares_then_cash_drops_by_market_value() {
    // Given: A portfolio with 100,000.00 cash
    let aapl = stock("AAPL", 155.0);

    // When: User buys 10 AAPL at 150.00
    let portfolio = portfolio_after_first_buy(&aapl);

    // Then: Cash, holding and history reflect the purchase
    assert!((portfolio.free_cash() - 98_500.0).abs() < 1e-9);
    assert_eq!(
        portfolio.holding(aapl.symbol()).map(|holding| holding.quantity()),
        Some(10)
    );
    assert_eq!(portfolio.transactions().len(), 1);
}

#[test]
fn when_user_sells_whole_position_then_holding_disappears() {
    // Given: A portfolio holding 10 AAPL bought at 150.00
    let aapl = stock("AAPL", 160.0);
    let mut portfolio = portfolio_after_first_buy(&aapl);

    // When: User sells all 10 at 160.00
    portfolio
        .sell(sell(&aapl, 160.0, 10))
        .expect("position covers the sale");

    // Then: Proceeds are credited and the holding is gone
    assert!((portfolio.free_cash() - 100_100.0).abs() < 1e-9);
    assert!(portfolio.holding(aapl.symbol()).is_none());
    assert_eq!(portfolio.num_holdings(), 0);
    assert_eq!(portfolio.transactions().len(), 2);
}

#[test]
fn when_user_sells_part_of_position_then_quantity_decrements_exactly() {
    // Given: A portfolio holding 10 AAPL
    let aapl = stock("AAPL", 160.0);
    let mut portfolio = portfolio_after_first_buy(&aapl);

    // When: User sells 3
    portfolio.sell(sell(&aapl, 160.0, 3)).expect("partial sale");

    // Then: 7 shares remain
    assert_eq!(
        portfolio.holding(aapl.symbol()).map(|holding| holding.quantity()),
        Some(7)
    );
    assert!((portfolio.free_cash() - 98_980.0).abs() < 1e-9);
}

#[test]
fn when_user_oversells_then_error_and_nothing_changes() {
    // Given: A portfolio holding 10 AAPL
    let aapl = stock("AAPL", 160.0);
    let mut portfolio = portfolio_after_first_buy(&aapl);

    // When: User tries to sell 20
    let error = portfolio
        .sell(sell(&aapl, 160.0, 20))
        .expect_err("only 10 owned");

    // Then: The sale is rejected as insufficient shares with state untouched
    assert_eq!(error.kind(), ErrorKind::InsufficientShares);
    assert!(matches!(
        error,
        LedgerError::InsufficientShares {
            requested: 20,
            owned: 10,
            ..
        }
    ));
    assert!((portfolio.free_cash() - 98_500.0).abs() < 1e-9);
    assert_eq!(
        portfolio.holding(aapl.symbol()).map(|holding| holding.quantity()),
        Some(10)
    );
    assert_eq!(portfolio.transactions().len(), 1);
}

#[test]
fn when_user_buys_beyond_cash_then_insufficient_funds_and_no_holding() {
    // Given: A portfolio with 100,000.00 cash
    let msft = stock("MSFT", 400.0);
    let mut portfolio = Portfolio::new("growth", 100_000.0).expect("portfolio");

    // When: User buys 500 MSFT at 400.00 (200,000.00)
    let error = portfolio
        .purchase(buy(&msft, 400.0, 500), Arc::clone(&msft))
        .expect_err("order exceeds cash");

    // Then: Funds error, no holding, no history
    assert_eq!(error.kind(), ErrorKind::InsufficientFunds);
    assert!(portfolio.holding(msft.symbol()).is_none());
    assert!(portfolio.transactions().is_empty());
    assert_eq!(portfolio.free_cash(), 100_000.0);
}

#[test]
fn when_user_sells_unknown_symbol_then_holding_not_found() {
    // Given: An empty portfolio
    let tsla = stock("TSLA", 200.0);
    let mut portfolio = Portfolio::new("growth", 1_000.0).expect("portfolio");

    // When: User sells a symbol never bought
    let error = portfolio
        .sell(sell(&tsla, 200.0, 1))
        .expect_err("nothing held");

    // Then: The holding is reported missing
    assert_eq!(error.kind(), ErrorKind::HoldingNotFound);
    assert_eq!(portfolio.free_cash(), 1_000.0);
}

// =============================================================================
// Ledger: Cash Reconciliation
// =============================================================================

#[test]
fn when_many_random_orders_apply_then_cash_stays_reconciled_and_non_negative() {
    // Given: A few stocks and a seeded order stream
    let stocks = [stock("AAPL", 150.0), stock("MSFT", 300.0), stock("KO", 60.0)];
    let mut portfolio = Portfolio::new("random", 5_000.0).expect("portfolio");
    let mut rng = fastrand::Rng::with_seed(7);

    // When: Hundreds of buys and sells are attempted, some rejected
    for _ in 0..400 {
        let target = &stocks[rng.usize(..stocks.len())];
        let price = 10.0 + rng.f64() * 300.0;
        let qty = rng.i64(0..12);
        let before = ledger_state(&portfolio);
        let outcome = if rng.bool() {
            portfolio.purchase(buy(target, price, qty), Arc::clone(target))
        } else {
            portfolio.sell(sell(target, price, qty))
        };

        // Then: A rejected order changes nothing and the ledger invariants hold
        if outcome.is_err() {
            assert_eq!(ledger_state(&portfolio), before);
        }
        assert!(portfolio.free_cash() >= 0.0);
        assert!((portfolio.free_cash() - portfolio.reconciled_cash()).abs() < 1e-6);
        assert!(portfolio.holdings().all(|holding| holding.quantity() > 0));
    }
}

#[test]
fn when_rejected_orders_interleave_then_history_only_holds_committed_ones() {
    // Given: A portfolio with a single holding
    let aapl = stock("AAPL", 160.0);
    let mut portfolio = portfolio_after_first_buy(&aapl);

    // When: A rejected sell and a rejected buy are attempted around a valid sell
    assert!(portfolio.sell(sell(&aapl, 160.0, 11)).is_err());
    portfolio.sell(sell(&aapl, 160.0, 4)).expect("valid sell");
    assert!(portfolio
        .purchase(buy(&aapl, 160.0, 10_000), Arc::clone(&aapl))
        .is_err());

    // Then: History holds the buy and the valid sell in order
    let directions: Vec<String> = portfolio
        .transactions()
        .iter()
        .map(|order| order.direction().to_string())
        .collect();
    assert_eq!(directions, vec!["BUY", "SELL"]);
}

// =============================================================================
// Ledger: Valuation
// =============================================================================

#[test]
fn when_user_values_portfolio_then_latest_and_dated_prices_are_used() {
    // Given: 10 AAPL whose closes are 155.00 then 160.00
    let aapl = stock("AAPL", 160.0);
    let mut portfolio = portfolio_after_first_buy(&aapl);

    // When: User values holdings now and on the earlier date
    let latest = portfolio.value_of_holdings(None).expect("priced");
    let dated = portfolio
        .value_of_holdings(Some(date!(2024 - 03 - 01)))
        .expect("priced on date");
    let snapshot = portfolio
        .snapshot_value(UtcDateTime::now())
        .expect("snapshot");

    // Then: Values reflect quantity times the relevant close
    assert!((latest - 1_600.0).abs() < 1e-9);
    assert!((dated - 1_550.0).abs() < 1e-9);
    assert!((snapshot - 100_100.0).abs() < 1e-9);
    assert_eq!(portfolio.value_history().len(), 1);
}

#[test]
fn when_a_holding_has_no_price_for_date_then_valuation_fails() {
    // Given: A holding priced only in March 2024
    let aapl = stock("AAPL", 160.0);
    let portfolio = portfolio_after_first_buy(&aapl);

    // When: User asks for a date outside the series
    let error = portfolio
        .value_of_holdings(Some(date!(2023 - 12 - 29)))
        .expect_err("no close that day");

    // Then: The missing price is reported, not skipped
    assert_eq!(error.kind(), ErrorKind::PriceNotFound);
}

// =============================================================================
// Symbols
// =============================================================================

#[test]
fn when_user_enters_padded_lowercase_symbol_then_it_normalizes() {
    // Given/When: Raw user input
    let symbol = normalize_symbol("  aapl ").expect("normalizes");

    // Then: Upper-case and trimmed, and normalizing again is identity
    assert_eq!(symbol.as_str(), "AAPL");
    assert_eq!(normalize_symbol(symbol.as_str()), Ok(symbol));
}

#[test]
fn when_user_enters_overlong_symbol_then_invalid_symbol() {
    // Given/When: A symbol longer than five characters
    let error = normalize_symbol("TOOLONG1").expect_err("too long");

    // Then: It is rejected as an invalid symbol
    assert_eq!(error.kind(), Some(ErrorKind::InvalidSymbol));
}
