//! Statistics Calculator Module
//! Per-country reductions and the correlation matrix the dashboard charts
//! are built from.

use crate::data::{SupportedYear, YearView};
use chrono::NaiveDate;
use serde::Serialize;
use statrs::statistics::Statistics;
use std::collections::{BTreeMap, HashSet};

/// Countries shown in the confirmed-cases trend.
pub const TOP_CONFIRMED: usize = 5;
/// Countries shown in the GDP comparison.
pub const TOP_GDP: usize = 10;
/// Countries shown in the unemployment distribution.
pub const TOP_UNEMPLOYMENT: usize = 6;

pub const CORRELATION_LABELS: [&str; 3] = ["Confirmed", "GDP", "Unemployment"];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CountryValue {
    pub country: String,
    pub value: f64,
}

/// One point of a country's confirmed-case time series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesPoint {
    pub country: String,
    pub date: NaiveDate,
    pub confirmed: i64,
}

/// Pearson correlation between Confirmed, GDP and Unemployment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorrelationMatrix {
    pub labels: [&'static str; 3],
    /// Row-major; NaN where undefined.
    pub values: [[f64; 3]; 3],
}

impl CorrelationMatrix {
    pub fn get(&self, row: &str, col: &str) -> Option<f64> {
        let r = self.labels.iter().position(|l| *l == row)?;
        let c = self.labels.iter().position(|l| *l == col)?;
        Some(self.values[r][c])
    }
}

/// Everything the four dashboard charts need for one year.
#[derive(Debug, Clone, Serialize)]
pub struct DashboardSummary {
    pub year: SupportedYear,
    pub rows: usize,
    pub top_confirmed: Vec<CountryValue>,
    pub confirmed_series: Vec<SeriesPoint>,
    pub top_gdp: Vec<CountryValue>,
    pub top_unemployment: Vec<CountryValue>,
    pub correlation: CorrelationMatrix,
}

#[derive(Clone, Copy)]
enum Reduction {
    Max,
    Mean,
}

pub struct StatsCalculator;

impl StatsCalculator {
    /// Reduce a column per country. Countries come back sorted by name.
    fn group_by_country(
        view: &YearView<'_>,
        value: impl Fn(f64, f64, f64) -> f64,
        reduction: Reduction,
    ) -> Vec<CountryValue> {
        let mut groups: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
        for r in view.records() {
            groups
                .entry(r.country.as_str())
                .or_default()
                .push(value(r.confirmed as f64, r.gdp, r.unemployment));
        }

        groups
            .into_iter()
            .map(|(country, values)| {
                let value = match reduction {
                    Reduction::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
                    Reduction::Mean => values.iter().sum::<f64>() / values.len() as f64,
                };
                CountryValue {
                    country: country.to_string(),
                    value,
                }
            })
            .collect()
    }

    /// The `n` largest values, descending. Ties keep the alphabetically first country.
    pub fn nlargest(mut values: Vec<CountryValue>, n: usize) -> Vec<CountryValue> {
        values.retain(|v| !v.value.is_nan());
        values.sort_by(|a, b| {
            b.value
                .partial_cmp(&a.value)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        values.truncate(n);
        values
    }

    pub fn top_by_max_confirmed(view: &YearView<'_>, n: usize) -> Vec<CountryValue> {
        let per_country = Self::group_by_country(view, |c, _, _| c, Reduction::Max);
        Self::nlargest(per_country, n)
    }

    pub fn top_by_mean_gdp(view: &YearView<'_>, n: usize) -> Vec<CountryValue> {
        let per_country = Self::group_by_country(view, |_, g, _| g, Reduction::Mean);
        Self::nlargest(per_country, n)
    }

    pub fn top_by_mean_unemployment(view: &YearView<'_>, n: usize) -> Vec<CountryValue> {
        let per_country = Self::group_by_country(view, |_, _, u| u, Reduction::Mean);
        Self::nlargest(per_country, n)
    }

    /// Time-series rows of the given countries, in view order.
    pub fn series_for(view: &YearView<'_>, countries: &[CountryValue]) -> Vec<SeriesPoint> {
        let wanted: HashSet<&str> = countries.iter().map(|c| c.country.as_str()).collect();
        view.records()
            .iter()
            .filter(|r| wanted.contains(r.country.as_str()))
            .map(|r| SeriesPoint {
                country: r.country.clone(),
                date: r.date,
                confirmed: r.confirmed,
            })
            .collect()
    }

    /// Sample Pearson correlation; NaN with fewer than two points or zero variance.
    pub fn pearson(x: &[f64], y: &[f64]) -> f64 {
        if x.len() != y.len() || x.len() < 2 {
            return f64::NAN;
        }

        let sx = x.iter().std_dev();
        let sy = y.iter().std_dev();
        if sx == 0.0 || sy == 0.0 || sx.is_nan() || sy.is_nan() {
            return f64::NAN;
        }

        let cov = x.iter().covariance(y.iter());
        (cov / (sx * sy)).clamp(-1.0, 1.0)
    }

    pub fn correlation_matrix(view: &YearView<'_>) -> CorrelationMatrix {
        let records = view.records();
        let columns: [Vec<f64>; 3] = [
            records.iter().map(|r| r.confirmed as f64).collect(),
            records.iter().map(|r| r.gdp).collect(),
            records.iter().map(|r| r.unemployment).collect(),
        ];

        let mut values = [[f64::NAN; 3]; 3];
        for i in 0..3 {
            for j in i..3 {
                let rho = if i == j {
                    // 1 whenever the column has a defined correlation with itself
                    if Self::pearson(&columns[i], &columns[j]).is_nan() {
                        f64::NAN
                    } else {
                        1.0
                    }
                } else {
                    Self::pearson(&columns[i], &columns[j])
                };
                values[i][j] = rho;
                values[j][i] = rho;
            }
        }

        CorrelationMatrix {
            labels: CORRELATION_LABELS,
            values,
        }
    }

    pub fn summarize(view: &YearView<'_>) -> DashboardSummary {
        let top_confirmed = Self::top_by_max_confirmed(view, TOP_CONFIRMED);
        let confirmed_series = Self::series_for(view, &top_confirmed);

        DashboardSummary {
            year: view.year(),
            rows: view.len(),
            top_confirmed,
            confirmed_series,
            top_gdp: Self::top_by_mean_gdp(view, TOP_GDP),
            top_unemployment: Self::top_by_mean_unemployment(view, TOP_UNEMPLOYMENT),
            correlation: Self::correlation_matrix(view),
        }
    }
}
