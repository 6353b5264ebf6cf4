//! Concrete [`PriceSource`](crate::price_source::PriceSource) implementations.

pub mod yahoo;

pub use yahoo::YahooAdapter;
