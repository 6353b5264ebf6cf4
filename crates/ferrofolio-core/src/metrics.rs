use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

/// Statistic computed from a closing-price series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Metric {
    Returns,
    StdDev,
}

/// Horizon over which returns are measured, in trading days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReturnInterval {
    Daily,
    Monthly,
    Yearly,
}

impl ReturnInterval {
    pub const fn trading_days(self) -> usize {
        match self {
            Self::Daily => 1,
            Self::Monthly => 21,
            Self::Yearly => 252,
        }
    }
}

impl Display for ReturnInterval {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Daily => "daily",
            Self::Monthly => "monthly",
            Self::Yearly => "yearly",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MetricKey {
    pub metric: Metric,
    pub interval: ReturnInterval,
}

impl MetricKey {
    pub const fn new(metric: Metric, interval: ReturnInterval) -> Self {
        Self { metric, interval }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MetricValue {
    Series(Arc<[f64]>),
    Scalar(Option<f64>),
}

/// Memoized metric values. Entries live until [`MetricCache::invalidate`].
#[derive(Debug, Default)]
pub struct MetricCache {
    values: HashMap<MetricKey, MetricValue>,
}

impl MetricCache {
    pub fn get(&self, key: MetricKey) -> Option<&MetricValue> {
        self.values.get(&key)
    }

    pub fn get_or_compute(
        &mut self,
        key: MetricKey,
        compute: impl FnOnce() -> MetricValue,
    ) -> MetricValue {
        self.values.entry(key).or_insert_with(compute).clone()
    }

    pub fn invalidate(&mut self) {
        self.values.clear();
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Fractional change between each close and the close `periods` earlier.
/// Pairs whose base is zero are skipped.
pub fn pct_change(closes: &[f64], periods: usize) -> Vec<f64> {
    if periods == 0 || closes.len() <= periods {
        return Vec::new();
    }

    closes
        .iter()
        .zip(closes.iter().skip(periods))
        .filter(|(base, _)| **base != 0.0)
        .map(|(base, current)| current / base - 1.0)
        .collect()
}

/// Sample standard deviation (n - 1 denominator). `None` below two values.
pub fn sample_std_dev(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }

    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values
        .iter()
        .map(|value| (value - mean).powi(2))
        .sum::<f64>()
        / (n - 1.0);
    Some(variance.sqrt())
}
