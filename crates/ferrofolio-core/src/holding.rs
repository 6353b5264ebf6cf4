use std::fmt::{Display, Formatter};
use std::sync::Arc;

use time::Date;

use crate::domain::{Symbol, UtcDateTime};
use crate::error::{LedgerError, ValidationError};
use crate::format;
use crate::stock::Stock;

/// An open position in one symbol. Quantity is always positive.
#[derive(Debug, Clone)]
pub struct Holding {
    quantity: u64,
    acquired: UtcDateTime,
    stock: Arc<Stock>,
}

impl Holding {
    pub fn new(
        stock: Arc<Stock>,
        quantity: u64,
        acquired: UtcDateTime,
    ) -> Result<Self, ValidationError> {
        if quantity == 0 {
            return Err(ValidationError::EmptyHolding);
        }

        if acquired > UtcDateTime::now() {
            return Err(ValidationError::FutureTimestamp {
                value: acquired.format_rfc3339(),
            });
        }

        Ok(Self::open(stock, quantity, acquired))
    }

    /// Position opened by an already validated order.
    pub(crate) fn open(stock: Arc<Stock>, quantity: u64, acquired: UtcDateTime) -> Self {
        Self {
            quantity,
            acquired,
            stock,
        }
    }

    pub fn symbol(&self) -> &Symbol {
        self.stock.symbol()
    }

    pub const fn quantity(&self) -> u64 {
        self.quantity
    }

    /// When the position was first opened.
    pub const fn acquired(&self) -> UtcDateTime {
        self.acquired
    }

    pub fn stock(&self) -> &Arc<Stock> {
        &self.stock
    }

    /// Quantity times the close on `as_of`, or the latest close.
    pub fn market_value(&self, as_of: Option<Date>) -> Result<f64, LedgerError> {
        let price = self.stock.get_price(as_of)?;
        Ok(price * self.quantity as f64)
    }

    /// Caller guarantees the sum fits in `u64`.
    pub(crate) fn add(&mut self, quantity: u64) {
        self.quantity += quantity;
    }

    /// Caller guarantees `quantity < self.quantity`.
    pub(crate) fn reduce(&mut self, quantity: u64) {
        self.quantity -= quantity;
    }
}

impl Display for Holding {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} x {} (since {})",
            self.symbol(),
            self.quantity,
            format::datetime_12h(self.acquired)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{PricePoint, PriceSeries};
    use time::macros::date;

    fn priced_stock(close: f64) -> Arc<Stock> {
        let series =
            PriceSeries::from_points([PricePoint::flat(date!(2024 - 01 - 02), close).expect("point")]);
        Arc::new(
            Stock::new(Symbol::parse("AAPL").expect("symbol"), None)
                .with_series(series, Some(UtcDateTime::now())),
        )
    }

    #[test]
    fn market_value_multiplies_quantity_by_close() {
        let holding = Holding::new(priced_stock(150.0), 10, UtcDateTime::now()).expect("holding");
        assert_eq!(holding.market_value(None), Ok(1_500.0));
        assert_eq!(holding.market_value(Some(date!(2024 - 01 - 02))), Ok(1_500.0));
        assert!(holding.market_value(Some(date!(2023 - 12 - 29))).is_err());
    }

    #[test]
    fn rejects_empty_and_future_positions() {
        assert_eq!(
            Holding::new(priced_stock(1.0), 0, UtcDateTime::now()).err(),
            Some(ValidationError::EmptyHolding)
        );

        let tomorrow = UtcDateTime::from_offset_datetime(
            UtcDateTime::now().into_inner() + time::Duration::days(1),
        )
        .expect("utc");
        assert!(matches!(
            Holding::new(priced_stock(1.0), 1, tomorrow),
            Err(ValidationError::FutureTimestamp { .. })
        ));
    }
}
