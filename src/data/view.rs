//! Reconciled table and its per-year selection.

use crate::data::schema::{
    ReconciledRecord, SupportedYear, OUT_CONFIRMED_COL, OUT_COUNTRY_COL, OUT_DATE_COL,
    OUT_GDP_COL, OUT_UNEMPLOYMENT_COL, OUT_YEAR_COL,
};
use crate::error::PipelineError;
use chrono::NaiveDate;
use polars::prelude::*;
use std::fs::File;
use std::path::Path;
use tracing::info;

/// The analysis-ready table every chart reads from.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconciledTable {
    records: Vec<ReconciledRecord>,
}

impl ReconciledTable {
    pub fn new(records: Vec<ReconciledRecord>) -> Self {
        Self { records }
    }

    pub fn records(&self) -> &[ReconciledRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Rows whose year equals the selection. An empty view is valid.
    pub fn select_year(&self, year: SupportedYear) -> YearView<'_> {
        let wanted = year.as_i32();
        YearView {
            year,
            records: self.records.iter().filter(|r| r.year == wanted).collect(),
        }
    }
}

/// A borrowed single-year slice of the reconciled table.
#[derive(Debug, Clone)]
pub struct YearView<'a> {
    year: SupportedYear,
    records: Vec<&'a ReconciledRecord>,
}

impl<'a> YearView<'a> {
    pub fn year(&self) -> SupportedYear {
        self.year
    }

    pub fn records(&self) -> &[&'a ReconciledRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// The view as a frame with the consumer column names.
    pub fn to_dataframe(&self) -> Result<DataFrame, PipelineError> {
        records_to_dataframe(self.records.iter().copied())
    }

    /// Export the view through the Polars CSV writer.
    pub fn write_csv(&self, path: &Path) -> Result<(), PipelineError> {
        let mut df = self.to_dataframe()?;
        let mut file = File::create(path)?;
        CsvWriter::new(&mut file)
            .include_header(true)
            .finish(&mut df)?;
        info!(path = %path.display(), rows = df.height(), "Exported year view");
        Ok(())
    }
}

fn records_to_dataframe<'a>(
    records: impl Iterator<Item = &'a ReconciledRecord>,
) -> Result<DataFrame, PipelineError> {
    // Polars stores dates as days since 1970-01-01, chrono's default date.
    let epoch = NaiveDate::default();

    let mut countries: Vec<String> = Vec::new();
    let mut days: Vec<i32> = Vec::new();
    let mut confirmed: Vec<i64> = Vec::new();
    let mut years: Vec<i32> = Vec::new();
    let mut gdp: Vec<f64> = Vec::new();
    let mut unemployment: Vec<f64> = Vec::new();

    for r in records {
        countries.push(r.country.clone());
        days.push(r.date.signed_duration_since(epoch).num_days() as i32);
        confirmed.push(r.confirmed);
        years.push(r.year);
        gdp.push(r.gdp);
        unemployment.push(r.unemployment);
    }

    let dates = Column::new(OUT_DATE_COL.into(), days).cast(&DataType::Date)?;

    let df = DataFrame::new(vec![
        Column::new(OUT_COUNTRY_COL.into(), countries),
        dates,
        Column::new(OUT_CONFIRMED_COL.into(), confirmed),
        Column::new(OUT_YEAR_COL.into(), years),
        Column::new(OUT_GDP_COL.into(), gdp),
        Column::new(OUT_UNEMPLOYMENT_COL.into(), unemployment),
    ])?;

    Ok(df)
}
