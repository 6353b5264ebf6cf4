use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::domain::Symbol;
use crate::format;

const SUMMARY_WIDTH: usize = 140;

/// Descriptive metadata for a listed company.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Company {
    pub symbol: Symbol,
    pub company_name: String,
    pub sector: String,
    pub industry: String,
    pub business_summary: String,
    pub country: String,
    pub employee_count: Option<u64>,
    pub market_cap: Option<f64>,
    pub float_shares: Option<f64>,
    pub is_esg_populated: Option<bool>,
}

impl Company {
    /// Metadata with only a display name; everything else blank.
    pub fn named(symbol: Symbol, company_name: impl Into<String>) -> Self {
        Self {
            symbol,
            company_name: company_name.into(),
            sector: String::new(),
            industry: String::new(),
            business_summary: String::new(),
            country: String::new(),
            employee_count: None,
            market_cap: None,
            float_shares: None,
            is_esg_populated: None,
        }
    }

    pub fn with_classification(
        mut self,
        sector: impl Into<String>,
        industry: impl Into<String>,
    ) -> Self {
        self.sector = sector.into();
        self.industry = industry.into();
        self
    }
}

impl Display for Company {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "{} ({})", self.company_name, self.symbol)?;
        writeln!(f, "[{}, {}]", self.industry, self.sector)?;
        writeln!(f, "{}", format::shorten(&self.business_summary, SUMMARY_WIDTH))?;
        match self.market_cap {
            Some(market_cap) => writeln!(f, "Market Cap : {}", format::currency(market_cap))?,
            None => writeln!(f, "Market Cap : n/a")?,
        }
        match self.float_shares {
            Some(shares) => write!(f, "Floated Shares : {}", format::grouped(shares.round() as i64)),
            None => write!(f, "Floated Shares : n/a"),
        }
    }
}
