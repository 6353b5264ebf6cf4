use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use time::Date;

use crate::domain::{Symbol, UtcDateTime};
use crate::error::{CoreError, LedgerError, StoreError, ValidationError};
use crate::format;
use crate::holding::Holding;
use crate::stock::Stock;
use crate::stock_cache::StockCache;
use crate::store::{PortfolioSnapshot, PortfolioStore, StoredHolding, StoredPortfolio};
use crate::transaction::{Direction, Transaction};

/// Point-in-time total value of a portfolio.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValuePoint {
    pub timestamp: UtcDateTime,
    pub value: f64,
}

/// Cash, holdings and history of one named portfolio.
///
/// Every ledger operation either applies completely or returns an error
/// with the portfolio unchanged. After each committed operation:
///
/// - free cash is non-negative
/// - free cash equals [`Portfolio::reconciled_cash`]
/// - no holding has quantity zero
#[derive(Debug, Clone)]
pub struct Portfolio {
    name: String,
    initial_cash: f64,
    free_cash: f64,
    holdings: BTreeMap<Symbol, Holding>,
    transactions: Vec<Transaction>,
    value_history: Vec<ValuePoint>,
}

impl Portfolio {
    pub fn new(name: impl Into<String>, initial_cash: f64) -> Result<Self, ValidationError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ValidationError::EmptyPortfolioName);
        }
        if !initial_cash.is_finite() {
            return Err(ValidationError::NonFiniteValue {
                field: "initial_cash",
            });
        }
        if initial_cash < 0.0 {
            return Err(ValidationError::NegativeValue {
                field: "initial_cash",
            });
        }

        Ok(Self {
            name,
            initial_cash,
            free_cash: initial_cash,
            holdings: BTreeMap::new(),
            transactions: Vec::new(),
            value_history: Vec::new(),
        })
    }

    /// Apply a buy order for `stock`.
    ///
    /// The cost is debited from free cash and the quantity added to the
    /// existing holding, or a new holding is opened. A zero-quantity buy is
    /// recorded but opens nothing.
    pub fn purchase(&mut self, order: Transaction, stock: Arc<Stock>) -> Result<(), LedgerError> {
        if order.direction() != Direction::Buy {
            return Err(LedgerError::DirectionMismatch {
                expected: Direction::Buy,
                actual: order.direction(),
            });
        }
        if order.symbol() != stock.symbol() {
            return Err(LedgerError::SymbolMismatch {
                order: order.symbol().clone(),
                stock: stock.symbol().clone(),
            });
        }

        let held = self
            .holdings
            .get(order.symbol())
            .map_or(0, Holding::quantity);
        if held.checked_add(order.quantity()).is_none() {
            return Err(LedgerError::PositionOverflow {
                symbol: order.symbol().clone(),
                held,
                requested: order.quantity(),
            });
        }

        let cost = order.market_value();
        if cost > self.free_cash {
            return Err(LedgerError::InsufficientFunds {
                required: cost,
                available: self.free_cash,
            });
        }

        self.free_cash -= cost;
        if order.quantity() > 0 {
            match self.holdings.get_mut(order.symbol()) {
                Some(holding) => holding.add(order.quantity()),
                None => {
                    let holding = Holding::open(stock, order.quantity(), order.timestamp());
                    self.holdings.insert(order.symbol().clone(), holding);
                }
            }
        }

        log::debug!("{}: {order}", self.name);
        self.transactions.push(order);
        Ok(())
    }

    /// Apply a sell order against an existing holding.
    ///
    /// Proceeds are credited to free cash. Selling the whole position
    /// removes the holding.
    pub fn sell(&mut self, order: Transaction) -> Result<(), LedgerError> {
        if order.direction() != Direction::Sell {
            return Err(LedgerError::DirectionMismatch {
                expected: Direction::Sell,
                actual: order.direction(),
            });
        }

        let owned = self
            .holdings
            .get(order.symbol())
            .map(Holding::quantity)
            .ok_or_else(|| LedgerError::HoldingNotFound {
                symbol: order.symbol().clone(),
            })?;
        if owned < order.quantity() {
            return Err(LedgerError::InsufficientShares {
                symbol: order.symbol().clone(),
                requested: order.quantity(),
                owned,
            });
        }

        self.free_cash += order.market_value();
        if owned == order.quantity() {
            self.holdings.remove(order.symbol());
        } else if let Some(holding) = self.holdings.get_mut(order.symbol()) {
            holding.reduce(order.quantity());
        }

        log::debug!("{}: {order}", self.name);
        self.transactions.push(order);
        Ok(())
    }

    /// Sum of quantity times price over all holdings, at the latest close or
    /// on `as_of`. Any missing price fails the whole valuation.
    pub fn value_of_holdings(&self, as_of: Option<Date>) -> Result<f64, LedgerError> {
        self.holdings
            .values()
            .map(|holding| holding.market_value(as_of))
            .sum()
    }

    pub fn total_value(&self) -> Result<f64, LedgerError> {
        Ok(self.free_cash + self.value_of_holdings(None)?)
    }

    /// Record the current total value under `timestamp` and return it.
    pub fn snapshot_value(&mut self, timestamp: UtcDateTime) -> Result<f64, LedgerError> {
        let value = self.total_value()?;
        self.value_history.push(ValuePoint { timestamp, value });
        Ok(value)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub const fn initial_cash(&self) -> f64 {
        self.initial_cash
    }

    pub const fn free_cash(&self) -> f64 {
        self.free_cash
    }

    pub fn holding(&self, symbol: &Symbol) -> Option<&Holding> {
        self.holdings.get(symbol)
    }

    /// Holdings ordered by symbol.
    pub fn holdings(&self) -> impl Iterator<Item = &Holding> + '_ {
        self.holdings.values()
    }

    pub fn num_holdings(&self) -> usize {
        self.holdings.len()
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    pub fn value_history(&self) -> &[ValuePoint] {
        &self.value_history
    }

    /// Cash implied by the transaction history: initial cash minus buys plus sells.
    pub fn reconciled_cash(&self) -> f64 {
        self.transactions
            .iter()
            .fold(self.initial_cash, |cash, order| match order.direction() {
                Direction::Buy => cash - order.market_value(),
                Direction::Sell => cash + order.market_value(),
            })
    }

    pub fn snapshot(&self) -> PortfolioSnapshot {
        PortfolioSnapshot {
            portfolio: StoredPortfolio {
                name: self.name.clone(),
                initial_cash: self.initial_cash,
                free_cash: self.free_cash,
            },
            holdings: self
                .holdings
                .values()
                .map(|holding| StoredHolding {
                    symbol: holding.symbol().clone(),
                    quantity: holding.quantity(),
                    acquired: holding.acquired(),
                })
                .collect(),
            transactions: self.transactions.clone(),
            values: self.value_history.clone(),
        }
    }

    /// Load `name` from `store`, resolving holdings through `stocks`.
    /// Returns `None` when nothing is stored under that name.
    pub fn load(
        name: &str,
        store: &dyn PortfolioStore,
        stocks: &StockCache,
    ) -> Result<Option<Self>, CoreError> {
        let Some(stored) = store.get_portfolio(name)? else {
            return Ok(None);
        };

        let mut holdings = BTreeMap::new();
        for record in store.get_holdings(name)? {
            let stock = stocks.get(&record.symbol)?;
            let holding = Holding::new(stock, record.quantity, record.acquired)?;
            holdings.insert(record.symbol, holding);
        }

        let portfolio = Self {
            name: stored.name,
            initial_cash: stored.initial_cash,
            free_cash: stored.free_cash,
            holdings,
            transactions: store.get_transactions(name)?,
            value_history: store.get_value_history(name)?,
        };
        log::info!(
            "loaded portfolio {}: {} holdings, {} transactions",
            portfolio.name,
            portfolio.holdings.len(),
            portfolio.transactions.len()
        );
        Ok(Some(portfolio))
    }

    /// Load `name`, or start a fresh portfolio with `initial_cash` when
    /// nothing is stored.
    pub fn load_or_new(
        name: &str,
        initial_cash: f64,
        store: &dyn PortfolioStore,
        stocks: &StockCache,
    ) -> Result<Self, CoreError> {
        match Self::load(name, store, stocks)? {
            Some(portfolio) => Ok(portfolio),
            None => {
                log::info!(
                    "no stored portfolio named {name}; starting with {}",
                    format::currency(initial_cash)
                );
                Ok(Self::new(name, initial_cash)?)
            }
        }
    }

    pub fn save(&self, store: &dyn PortfolioStore) -> Result<(), StoreError> {
        store.save_portfolio(&self.snapshot())?;
        log::info!("saved portfolio {}", self.name);
        Ok(())
    }
}

impl Display for Portfolio {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "[Portfolio] {}", self.name)?;
        writeln!(f, "  Initial Cash: {}", format::currency(self.initial_cash))?;
        writeln!(f, "     Free Cash: {}", format::currency(self.free_cash))?;
        write!(f, "      Holdings: {}", self.holdings.len())?;
        for holding in self.holdings.values() {
            write!(f, "\n        {holding}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{PricePoint, PriceSeries};
    use crate::ErrorKind;
    use time::macros::date;

    fn stock(raw: &str, close: f64) -> Arc<Stock> {
        let series =
            PriceSeries::from_points([PricePoint::flat(date!(2024 - 01 - 02), close).expect("point")]);
        Arc::new(
            Stock::new(Symbol::parse(raw).expect("symbol"), None)
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

    #[test]
    fn rejects_blank_name_and_negative_cash() {
        assert_eq!(
            Portfolio::new(" ", 1.0).err(),
            Some(ValidationError::EmptyPortfolioName)
        );
        assert!(Portfolio::new("main", -1.0).is_err());
    }

    #[test]
    fn direction_and_symbol_must_match_operation() {
        let aapl = stock("AAPL", 10.0);
        let msft = stock("MSFT", 10.0);
        let mut portfolio = Portfolio::new("main", 1_000.0).expect("portfolio");

        let error = portfolio
            .purchase(sell(&aapl, 10.0, 1), Arc::clone(&aapl))
            .expect_err("sell order passed to purchase");
        assert_eq!(error.kind(), ErrorKind::InvalidTransaction);

        let error = portfolio
            .purchase(buy(&aapl, 10.0, 1), Arc::clone(&msft))
            .expect_err("symbol mismatch");
        assert!(matches!(error, LedgerError::SymbolMismatch { .. }));

        let error = portfolio.sell(buy(&aapl, 10.0, 1)).expect_err("buy passed to sell");
        assert!(matches!(error, LedgerError::DirectionMismatch { .. }));
        assert!(portfolio.transactions().is_empty());
    }

    #[test]
    fn free_buys_that_would_overflow_the_position_are_rejected() {
        let aapl = stock("AAPL", 10.0);
        let mut portfolio = Portfolio::new("main", 100.0).expect("portfolio");
        for _ in 0..2 {
            portfolio
                .purchase(buy(&aapl, 0.0, i64::MAX), Arc::clone(&aapl))
                .expect("fits in u64");
        }
        let held = portfolio.holding(aapl.symbol()).map(Holding::quantity);
        assert_eq!(held, Some(u64::MAX - 1));

        let error = portfolio
            .purchase(buy(&aapl, 0.0, i64::MAX), Arc::clone(&aapl))
            .expect_err("position would overflow");
        assert!(matches!(error, LedgerError::PositionOverflow { .. }));
        assert_eq!(error.kind(), ErrorKind::InvalidTransaction);
        assert_eq!(portfolio.holding(aapl.symbol()).map(Holding::quantity), held);
        assert_eq!(portfolio.transactions().len(), 2);
        assert_eq!(portfolio.free_cash(), 100.0);
    }

    #[test]
    fn zero_quantity_buy_is_recorded_without_holding() {
        let aapl = stock("AAPL", 10.0);
        let mut portfolio = Portfolio::new("main", 1_000.0).expect("portfolio");

        portfolio
            .purchase(buy(&aapl, 10.0, 0), Arc::clone(&aapl))
            .expect("zero buy");
        assert_eq!(portfolio.num_holdings(), 0);
        assert_eq!(portfolio.transactions().len(), 1);
        assert_eq!(portfolio.free_cash(), 1_000.0);
    }

    #[test]
    fn repeated_buys_accumulate_and_keep_first_acquisition() {
        let aapl = stock("AAPL", 10.0);
        let mut portfolio = Portfolio::new("main", 1_000.0).expect("portfolio");

        portfolio
            .purchase(buy(&aapl, 10.0, 5), Arc::clone(&aapl))
            .expect("first buy");
        let acquired = portfolio
            .holding(aapl.symbol())
            .map(Holding::acquired)
            .expect("holding");
        portfolio
            .purchase(buy(&aapl, 12.0, 5), Arc::clone(&aapl))
            .expect("second buy");

        let holding = portfolio.holding(aapl.symbol()).expect("holding");
        assert_eq!(holding.quantity(), 10);
        assert_eq!(holding.acquired(), acquired);
        assert_eq!(portfolio.free_cash(), 890.0);
        assert_eq!(portfolio.reconciled_cash(), portfolio.free_cash());
    }

    #[test]
    fn valuation_uses_prices_and_snapshots_append() {
        let aapl = stock("AAPL", 20.0);
        let mut portfolio = Portfolio::new("main", 1_000.0).expect("portfolio");
        portfolio
            .purchase(buy(&aapl, 10.0, 10), Arc::clone(&aapl))
            .expect("buy");

        assert_eq!(portfolio.value_of_holdings(None), Ok(200.0));
        assert_eq!(portfolio.total_value(), Ok(1_100.0));
        assert!(matches!(
            portfolio.value_of_holdings(Some(date!(2020 - 01 - 01))),
            Err(LedgerError::PriceNotFound { .. })
        ));

        let at = UtcDateTime::now();
        portfolio.snapshot_value(at).expect("snapshot");
        portfolio.snapshot_value(at).expect("snapshot");
        assert_eq!(portfolio.value_history().len(), 2);
        assert_eq!(portfolio.value_history()[1].value, 1_100.0);
    }

    #[test]
    fn display_lists_cash_and_holdings() {
        let aapl = stock("AAPL", 10.0);
        let mut portfolio = Portfolio::new("main", 1_000.0).expect("portfolio");
        portfolio
            .purchase(buy(&aapl, 10.0, 3), Arc::clone(&aapl))
            .expect("buy");

        let rendered = portfolio.to_string();
        assert!(rendered.contains("Free Cash: $970.00"));
        assert!(rendered.contains("Holdings: 1"));
        assert!(rendered.contains("AAPL x 3"));
    }
}
