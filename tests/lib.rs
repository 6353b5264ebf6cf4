// Shared helpers for the behaviour tests
pub use ferrofolio_core::{Symbol, Transaction, UtcDateTime};
pub use std::sync::Arc;

/// Route `log` output to the test harness; safe to call from every test.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Parse a symbol that the test knows to be valid.
pub fn symbol(raw: &str) -> Symbol {
    Symbol::parse(raw).expect("valid symbol")
}

/// A market order executed now.
pub fn order(buy: bool, raw: &str, price: f64, qty: i64) -> Transaction {
    let at = UtcDateTime::now();
    let result = if buy {
        Transaction::market_buy(at, symbol(raw), price, qty)
    } else {
        Transaction::market_sell(at, symbol(raw), price, qty)
    };
    result.expect("valid order")
}
