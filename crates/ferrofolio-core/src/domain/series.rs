use std::collections::BTreeMap;

use time::Date;

use crate::ValidationError;

/// Daily OHLCV point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PricePoint {
    pub date: Date,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: Option<u64>,
}

impl PricePoint {
    pub fn new(
        date: Date,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: Option<u64>,
    ) -> Result<Self, ValidationError> {
        validate_non_negative("open", open)?;
        validate_non_negative("high", high)?;
        validate_non_negative("low", low)?;
        validate_non_negative("close", close)?;

        if high < low {
            return Err(ValidationError::InvalidBarRange);
        }

        if open < low || open > high || close < low || close > high {
            return Err(ValidationError::InvalidBarBounds);
        }

        Ok(Self {
            date,
            open,
            high,
            low,
            close,
            volume,
        })
    }

    /// Flat bar where every price equals `close`.
    pub fn flat(date: Date, close: f64) -> Result<Self, ValidationError> {
        Self::new(date, close, close, close, close, None)
    }
}

/// Date-keyed price history; at most one point per date.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PriceSeries {
    points: BTreeMap<Date, PricePoint>,
}

impl PriceSeries {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_points(points: impl IntoIterator<Item = PricePoint>) -> Self {
        let mut series = Self::new();
        series.merge(points);
        series
    }

    /// Insert `points`, replacing any existing point on the same date.
    pub fn merge(&mut self, points: impl IntoIterator<Item = PricePoint>) {
        for point in points {
            self.points.insert(point.date, point);
        }
    }

    pub fn latest(&self) -> Option<&PricePoint> {
        self.points.values().next_back()
    }

    pub fn on(&self, date: Date) -> Option<&PricePoint> {
        self.points.get(&date)
    }

    pub fn first_date(&self) -> Option<Date> {
        self.points.keys().next().copied()
    }

    pub fn last_date(&self) -> Option<Date> {
        self.points.keys().next_back().copied()
    }

    /// Closing prices, oldest first.
    pub fn closes(&self) -> Vec<f64> {
        self.points.values().map(|point| point.close).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PricePoint> + '_ {
        self.points.values()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

fn validate_non_negative(field: &'static str, value: f64) -> Result<(), ValidationError> {
    if !value.is_finite() {
        return Err(ValidationError::NonFiniteValue { field });
    }

    if value < 0.0 {
        return Err(ValidationError::NegativeValue { field });
    }

    Ok(())
}
