//! Behavior-driven tests for portfolio persistence
//!
//! These tests verify that a portfolio saved through either store comes
//! back with the same cash, holdings and history, and that repeated saves
//! do not duplicate anything.

use std::sync::Arc;

use ferrofolio_core::{
    Company, FetchMode, MemoryStore, Portfolio, PortfolioStore, PricePoint, StockCache,
    StoreUniverse, UniverseSource, UtcDateTime, Warehouse, WarehouseConfig, SP500,
};
use ferrofolio_tests::{order, symbol};
use tempfile::tempdir;
use time::macros::date;

fn open_warehouse(temp: &tempfile::TempDir) -> Warehouse {
    Warehouse::open(WarehouseConfig {
        ferrofolio_home: temp.path().to_path_buf(),
        db_path: temp.path().join("ferrofolio.duckdb"),
        max_pool_size: 2,
    })
    .expect("warehouse open")
}

fn seed(store: &dyn PortfolioStore) {
    let listed = [
        ("AAPL", "Apple Inc.", 150.0),
        ("MSFT", "Microsoft Corporation", 300.0),
    ];
    for (raw, name, close) in listed {
        store
            .upsert_companies(&[Company::named(symbol(raw), name)])
            .expect("company stored");
        store
            .upsert_price_series(
                &symbol(raw),
                &[PricePoint::flat(date!(2024 - 03 - 04), close).expect("valid point")],
                FetchMode::Replace,
                UtcDateTime::now(),
                "seed",
            )
            .expect("series stored");
    }
}

/// Buy two names, liquidate one, add to the other and snapshot twice.
fn traded_portfolio(stocks: &StockCache) -> Portfolio {
    let aapl = stocks.get(&symbol("AAPL")).expect("stock");
    let msft = stocks.get(&symbol("MSFT")).expect("stock");
    let mut portfolio = Portfolio::new("growth", 100_000.0).expect("portfolio");

    portfolio
        .purchase(order(true, "AAPL", 150.0, 10), Arc::clone(&aapl))
        .expect("buy");
    portfolio
        .purchase(order(true, "MSFT", 300.0, 5), Arc::clone(&msft))
        .expect("buy");
    portfolio.sell(order(false, "MSFT", 310.0, 5)).expect("sell");
    portfolio
        .purchase(order(true, "AAPL", 151.0, 2), aapl)
        .expect("buy");

    let at = UtcDateTime::now();
    portfolio.snapshot_value(at).expect("snapshot");
    portfolio.snapshot_value(at).expect("snapshot");
    portfolio
}

fn assert_round_trip(store: Arc<dyn PortfolioStore>) {
    // Given: A traded portfolio saved twice
    seed(store.as_ref());
    let stocks = StockCache::new(Arc::clone(&store));
    let original = traded_portfolio(&stocks);
    original.save(store.as_ref()).expect("first save");
    original.save(store.as_ref()).expect("second save");

    // When: It is loaded through a fresh stock cache
    let fresh = StockCache::new(Arc::clone(&store));
    let loaded = Portfolio::load("growth", store.as_ref(), &fresh)
        .expect("load succeeds")
        .expect("portfolio stored");

    // Then: Cash, holdings and history match and nothing is duplicated
    assert_eq!(loaded.name(), "growth");
    assert_eq!(loaded.initial_cash(), 100_000.0);
    assert!((loaded.free_cash() - original.free_cash()).abs() < 1e-9);
    assert!((loaded.free_cash() - loaded.reconciled_cash()).abs() < 1e-9);

    let holdings: Vec<(String, u64)> = loaded
        .holdings()
        .map(|holding| (holding.symbol().to_string(), holding.quantity()))
        .collect();
    assert_eq!(holdings, vec![(String::from("AAPL"), 12)]);

    let ids = |portfolio: &Portfolio| -> Vec<String> {
        portfolio
            .transactions()
            .iter()
            .map(|transaction| transaction.id().to_string())
            .collect()
    };
    assert_eq!(ids(&loaded), ids(&original));
    assert_eq!(loaded.value_history().len(), 2);
    assert_eq!(
        loaded.total_value().expect("priced"),
        original.total_value().expect("priced")
    );
}

// =============================================================================
// Persistence: Round Trips
// =============================================================================

#[test]
fn when_portfolio_is_saved_to_memory_store_then_it_loads_back_identically() {
    assert_round_trip(Arc::new(MemoryStore::new()));
}

#[test]
fn when_portfolio_is_saved_to_warehouse_then_it_loads_back_identically() {
    let temp = tempdir().expect("tempdir");
    assert_round_trip(Arc::new(open_warehouse(&temp)));
}

#[test]
fn when_warehouse_is_reopened_then_saved_portfolio_survives() {
    // Given: A portfolio saved to a warehouse file
    let temp = tempdir().expect("tempdir");
    {
        let store: Arc<dyn PortfolioStore> = Arc::new(open_warehouse(&temp));
        seed(store.as_ref());
        let stocks = StockCache::new(Arc::clone(&store));
        traded_portfolio(&stocks).save(store.as_ref()).expect("save");
    }

    // When: The file is opened again
    let store: Arc<dyn PortfolioStore> = Arc::new(open_warehouse(&temp));
    let stocks = StockCache::new(Arc::clone(&store));
    let loaded = Portfolio::load("growth", store.as_ref(), &stocks).expect("load succeeds");

    // Then: The portfolio is still there with its company metadata
    let loaded = loaded.expect("portfolio stored");
    assert_eq!(loaded.transactions().len(), 4);
    let aapl = stocks.get_listed(&symbol("AAPL")).expect("metadata stored");
    assert_eq!(aapl.company().map(|c| c.company_name.as_str()), Some("Apple Inc."));
    assert_eq!(aapl.latest_price(), Ok(150.0));
}

#[test]
fn when_no_portfolio_is_stored_then_load_or_new_starts_fresh() {
    // Given: An empty warehouse
    let temp = tempdir().expect("tempdir");
    let store: Arc<dyn PortfolioStore> = Arc::new(open_warehouse(&temp));
    let stocks = StockCache::new(Arc::clone(&store));

    // When: User loads a name that was never saved
    let missing = Portfolio::load("nothing", store.as_ref(), &stocks).expect("query runs");
    let fresh = Portfolio::load_or_new("nothing", 2_500.0, store.as_ref(), &stocks)
        .expect("fresh portfolio");

    // Then: Nothing is found and a new portfolio starts with the given cash
    assert!(missing.is_none());
    assert_eq!(fresh.free_cash(), 2_500.0);
    assert!(fresh.transactions().is_empty());
}

// =============================================================================
// Persistence: Queries
// =============================================================================

#[test]
fn when_user_queries_one_symbol_then_both_portfolio_and_symbol_filter_apply() {
    let temp = tempdir().expect("tempdir");
    let stores: [Arc<dyn PortfolioStore>; 2] = [
        Arc::new(MemoryStore::new()),
        Arc::new(open_warehouse(&temp)),
    ];
    for store in stores {
        // Given: Two portfolios that both traded AAPL
        seed(store.as_ref());
        let stocks = StockCache::new(Arc::clone(&store));
        traded_portfolio(&stocks).save(store.as_ref()).expect("save");

        let aapl = stocks.get(&symbol("AAPL")).expect("stock");
        let mut other = Portfolio::new("income", 10_000.0).expect("portfolio");
        other
            .purchase(order(true, "AAPL", 150.0, 1), aapl)
            .expect("buy");
        other.save(store.as_ref()).expect("save");

        // When: User asks for AAPL trades of one portfolio
        let trades = store
            .get_transactions_for_symbol("growth", &symbol("AAPL"))
            .expect("query runs");

        // Then: Only that portfolio's AAPL trades come back, in order
        assert_eq!(trades.len(), 2);
        assert!(trades.iter().all(|trade| trade.symbol().as_str() == "AAPL"));
        assert_eq!(trades[0].quantity(), 10);
        assert_eq!(trades[1].quantity(), 2);
    }
}

#[test]
fn when_constituents_are_stored_then_store_universe_lists_them() {
    // Given: A warehouse with saved index constituents
    let temp = tempdir().expect("tempdir");
    let store: Arc<dyn PortfolioStore> = Arc::new(open_warehouse(&temp));
    store
        .upsert_constituents(SP500, &[String::from("AAPL"), String::from("MSFT")])
        .expect("constituents stored");

    // When: The store is read as a universe
    let universe = StoreUniverse::new(Arc::clone(&store));

    // Then: The saved list comes back and unknown indexes are not found
    let mut listed = universe.list_constituents(SP500).expect("listed");
    listed.sort();
    assert_eq!(listed, vec!["AAPL", "MSFT"]);
    assert!(universe.list_constituents("DJIA").is_err());
}
