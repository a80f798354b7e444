//! Column names and record types shared by the pipeline stages.

use crate::error::PipelineError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Country column of the wide case-count table (also the consumer-facing name).
pub const CASES_COUNTRY_COL: &str = "Country/Region";

/// Identifier columns of the case-count table that are not dates.
pub const CASES_ID_COLS: [&str; 3] = ["Province/State", "Lat", "Long"];

pub const ECON_COUNTRY_COL: &str = "Country";
pub const ECON_YEAR_COL: &str = "Year";
pub const ECON_GDP_COL: &str = "GDP";
pub const ECON_UNEMPLOYMENT_COL: &str = "Unemployment";

/// Columns of the reconciled table, in output order.
pub const OUT_COUNTRY_COL: &str = "Country/Region";
pub const OUT_DATE_COL: &str = "Date";
pub const OUT_CONFIRMED_COL: &str = "Confirmed";
pub const OUT_YEAR_COL: &str = "Year";
pub const OUT_GDP_COL: &str = "GDP";
pub const OUT_UNEMPLOYMENT_COL: &str = "Unemployment";

/// One of the three years the dashboard covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub enum SupportedYear {
    Y2020,
    Y2021,
    Y2022,
}

impl SupportedYear {
    pub const ALL: [SupportedYear; 3] = [Self::Y2020, Self::Y2021, Self::Y2022];

    pub fn as_i32(self) -> i32 {
        match self {
            Self::Y2020 => 2020,
            Self::Y2021 => 2021,
            Self::Y2022 => 2022,
        }
    }

    pub fn contains(year: i32) -> bool {
        Self::try_from(year).is_ok()
    }
}

impl Default for SupportedYear {
    fn default() -> Self {
        SupportedYear::Y2020
    }
}

impl TryFrom<i32> for SupportedYear {
    type Error = PipelineError;

    fn try_from(year: i32) -> Result<Self, Self::Error> {
        match year {
            2020 => Ok(Self::Y2020),
            2021 => Ok(Self::Y2021),
            2022 => Ok(Self::Y2022),
            other => Err(PipelineError::UnsupportedYear(other)),
        }
    }
}

impl From<SupportedYear> for i32 {
    fn from(year: SupportedYear) -> Self {
        year.as_i32()
    }
}

impl fmt::Display for SupportedYear {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_i32())
    }
}

impl std::str::FromStr for SupportedYear {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let year: i32 = s
            .trim()
            .parse()
            .map_err(|_| PipelineError::parse("year", s))?;
        Self::try_from(year)
    }
}

/// One (country, date) observation from the melted case table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct TidyCaseRecord {
    pub country: String,
    pub date: NaiveDate,
    pub confirmed: i64,
    pub year: i32,
}

/// One (country, year) row of the economic indicators table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EconomicRecord {
    pub country: String,
    pub year: i32,
    pub gdp: f64,
    /// Percentage, 0-100.
    pub unemployment: f64,
}

/// A tidy case record joined with its economic row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconciledRecord {
    #[serde(rename = "Country/Region")]
    pub country: String,
    #[serde(rename = "Date")]
    pub date: NaiveDate,
    #[serde(rename = "Confirmed")]
    pub confirmed: i64,
    #[serde(rename = "Year")]
    pub year: i32,
    #[serde(rename = "GDP")]
    pub gdp: f64,
    #[serde(rename = "Unemployment")]
    pub unemployment: f64,
}

impl ReconciledRecord {
    pub fn join(cases: &TidyCaseRecord, econ: &EconomicRecord) -> Self {
        Self {
            country: cases.country.clone(),
            date: cases.date,
            confirmed: cases.confirmed,
            year: cases.year,
            gdp: econ.gdp,
            unemployment: econ.unemployment,
        }
    }
}
