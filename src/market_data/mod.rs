// Market data module - price tables and monthly return calculation

pub mod prices;
pub mod returns;

use chrono::{Datelike, Local, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub use prices::{PriceRow, PriceTable};
pub use returns::{MarketData, ReturnCalculation, ReturnCalculator, ReturnRecord};

/// A calendar month, the granularity of the price table
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Period {
    year: i32,
    month: u32,
}

impl Period {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        if (1..=12).contains(&month) {
            Some(Self { year, month })
        } else {
            None
        }
    }

    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    /// The month the process is running in
    pub fn current() -> Self {
        Self::from_date(Local::now().date_naive())
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    /// The immediately preceding calendar month
    pub fn predecessor(&self) -> Self {
        if self.month == 1 {
            Self {
                year: self.year - 1,
                month: 12,
            }
        } else {
            Self {
                year: self.year,
                month: self.month - 1,
            }
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for Period {
    type Err = String;

    /// Accepts `2025-03`, `2025/03`, `03/2025`, and full dates
    /// (`2025-03-31`, `31/03/2025`) which are truncated to their month.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let text = s.trim();

        for format in ["%Y-%m-%d", "%d/%m/%Y", "%d-%m-%Y"] {
            if let Ok(date) = NaiveDate::parse_from_str(text, format) {
                return Ok(Self::from_date(date));
            }
        }

        let parts: Vec<&str> = text.split(|c| c == '-' || c == '/').collect();
        if let [a, b] = parts.as_slice() {
            let (year, month) = if a.len() == 4 { (a, b) } else { (b, a) };
            if let (Ok(year), Ok(month)) = (year.parse::<i32>(), month.parse::<u32>()) {
                if let Some(period) = Period::new(year, month) {
                    return Ok(period);
                }
            }
        }

        Err(format!("Could not parse period: {}", s))
    }
}

impl TryFrom<String> for Period {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Period> for String {
    fn from(period: Period) -> Self {
        period.to_string()
    }
}

/// Inclusive range of periods for which returns are emitted; open ends are unbounded
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PeriodWindow {
    pub start: Option<Period>,
    pub end: Option<Period>,
}

impl PeriodWindow {
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn new(start: Option<Period>, end: Option<Period>) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, period: Period) -> bool {
        self.start.map_or(true, |start| period >= start)
            && self.end.map_or(true, |end| period <= end)
    }
}
