//! Reshaper Module
//! Melts the wide case-count table into tidy (country, date, confirmed) rows.

use crate::data::schema::{SupportedYear, TidyCaseRecord, CASES_COUNTRY_COL, CASES_ID_COLS};
use crate::error::PipelineError;
use chrono::{Datelike, NaiveDate};
use polars::prelude::*;
use tracing::{debug, info};

const CASES_TABLE: &str = "case-count table";

/// Header formats tried in order; the JHU series uses the first.
const DATE_HEADER_FORMATS: [&str; 3] = ["%m/%d/%y", "%m/%d/%Y", "%Y-%m-%d"];

/// Parse a date column header such as `1/22/20`.
pub fn parse_date_header(header: &str) -> Result<NaiveDate, PipelineError> {
    let trimmed = header.trim();
    DATE_HEADER_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(trimmed, fmt).ok())
        .ok_or_else(|| PipelineError::parse("date column header", header))
}

/// One cell of a date column before validation.
#[derive(Debug, Clone, PartialEq)]
enum CountCell {
    Value(i64),
    Missing,
    Invalid(String),
}

fn count_from_f64(value: f64) -> CountCell {
    if value.is_nan() {
        CountCell::Missing
    } else if value.fract() != 0.0 || value.abs() > i64::MAX as f64 {
        CountCell::Invalid(value.to_string())
    } else {
        CountCell::Value(value as i64)
    }
}

fn count_from_str(raw: &str) -> CountCell {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return CountCell::Missing;
    }
    if let Ok(v) = trimmed.parse::<i64>() {
        return CountCell::Value(v);
    }
    match trimmed.parse::<f64>() {
        Ok(v) if !v.is_nan() => count_from_f64(v),
        _ => CountCell::Invalid(raw.to_string()),
    }
}

/// Read a date column cell by cell without truncating or nulling bad values.
fn count_cells(column: &Column) -> Result<Vec<CountCell>, PipelineError> {
    let cells = match column.dtype() {
        dt if dt.is_integer() => column
            .cast(&DataType::Int64)?
            .i64()?
            .into_iter()
            .map(|v| v.map_or(CountCell::Missing, CountCell::Value))
            .collect(),
        dt if dt.is_float() => column
            .cast(&DataType::Float64)?
            .f64()?
            .into_iter()
            .map(|v| v.map_or(CountCell::Missing, count_from_f64))
            .collect(),
        DataType::String => column
            .str()?
            .into_iter()
            .map(|v| v.map_or(CountCell::Missing, count_from_str))
            .collect(),
        DataType::Null => vec![CountCell::Missing; column.len()],
        other => vec![CountCell::Invalid(format!("column of type {}", other)); column.len()],
    };
    Ok(cells)
}

/// Wide-to-long transform of the case-count table.
pub struct Reshaper;

impl Reshaper {
    /// Unpivot every date column into one record per (row, date).
    ///
    /// Output order follows the melt: all rows for the first date column,
    /// then all rows for the second, and so on.
    pub fn melt(df: &DataFrame) -> Result<Vec<TidyCaseRecord>, PipelineError> {
        let country_col = df
            .column(CASES_COUNTRY_COL)
            .map_err(|_| PipelineError::schema(CASES_TABLE, CASES_COUNTRY_COL))?;
        let country_col = country_col.cast(&DataType::String)?;
        let countries = country_col.str()?;

        let mut country_names: Vec<&str> = Vec::with_capacity(df.height());
        for (row, name) in countries.into_iter().enumerate() {
            let name = name.ok_or_else(|| {
                PipelineError::parse("country name", format!("null at row {}", row))
            })?;
            country_names.push(name);
        }

        let date_headers: Vec<String> = df
            .get_column_names()
            .iter()
            .map(|s| s.to_string())
            .filter(|name| name != CASES_COUNTRY_COL && !CASES_ID_COLS.contains(&name.as_str()))
            .collect();
        debug!(
            countries = country_names.len(),
            dates = date_headers.len(),
            "Melting case-count table"
        );

        let mut records = Vec::with_capacity(country_names.len() * date_headers.len());

        for header in &date_headers {
            let date = parse_date_header(header)?;
            let year = date.year();

            let counts = count_cells(df.column(header)?)?;

            for (row, country) in country_names.iter().enumerate() {
                let confirmed = match &counts[row] {
                    CountCell::Value(v) if *v >= 0 => *v,
                    CountCell::Value(v) => {
                        return Err(PipelineError::parse(
                            "confirmed count",
                            format!("negative {} ({} on {})", v, country, header),
                        ))
                    }
                    CountCell::Invalid(raw) => {
                        return Err(PipelineError::parse(
                            "confirmed count",
                            format!("not an integer {:?} ({} on {})", raw, country, header),
                        ))
                    }
                    CountCell::Missing => {
                        return Err(PipelineError::parse(
                            "confirmed count",
                            format!("missing ({} on {})", country, header),
                        ))
                    }
                };

                records.push(TidyCaseRecord {
                    country: country.to_string(),
                    date,
                    confirmed,
                    year,
                });
            }
        }

        Ok(records)
    }

    /// Keep only records from the supported years.
    pub fn filter_supported_years(records: Vec<TidyCaseRecord>) -> Vec<TidyCaseRecord> {
        records
            .into_iter()
            .filter(|r| SupportedYear::contains(r.year))
            .collect()
    }

    /// Melt and restrict to 2020-2022.
    pub fn reshape(df: &DataFrame) -> Result<Vec<TidyCaseRecord>, PipelineError> {
        let melted = Self::melt(df)?;
        let total = melted.len();
        let tidy = Self::filter_supported_years(melted);
        info!(
            melted = total,
            kept = tidy.len(),
            "Reshaped case counts"
        );
        Ok(tidy)
    }
}
