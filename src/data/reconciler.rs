//! Reconciler Module
//! Coerces the economic table and inner-joins it with the tidy case records
//! on (country, year).

use crate::data::schema::{
    EconomicRecord, ReconciledRecord, TidyCaseRecord, ECON_COUNTRY_COL, ECON_GDP_COL,
    ECON_UNEMPLOYMENT_COL, ECON_YEAR_COL,
};
use crate::error::PipelineError;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use tracing::{debug, info, warn};

const ECON_TABLE: &str = "economic table";

/// How country names from the two sources are compared.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CountryMatching {
    /// Byte-for-byte equality.
    #[default]
    Exact,
    /// Trimmed, lowercased comparison.
    CaseFold,
}

impl std::str::FromStr for CountryMatching {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "exact" => Ok(Self::Exact),
            "case-fold" | "casefold" => Ok(Self::CaseFold),
            other => Err(PipelineError::Config(format!(
                "unknown country matching mode '{}'",
                other
            ))),
        }
    }
}

/// Join-key options for [`Reconciler`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileOptions {
    pub matching: CountryMatching,
    /// Case-source name -> economic-source name, applied before matching.
    pub aliases: BTreeMap<String, String>,
}

impl ReconcileOptions {
    /// The join key for a case-source country name.
    pub fn case_key(&self, country: &str) -> String {
        let aliased = self.aliases.get(country).map(String::as_str).unwrap_or(country);
        self.fold(aliased)
    }

    /// The join key for an economic-source country name.
    pub fn economic_key(&self, country: &str) -> String {
        self.fold(country)
    }

    fn fold(&self, country: &str) -> String {
        match self.matching {
            CountryMatching::Exact => country.to_string(),
            CountryMatching::CaseFold => country.trim().to_lowercase(),
        }
    }
}

/// Join diagnostics. Unmatched rows are dropped, not reported as errors.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReconcileReport {
    pub tidy_rows: usize,
    pub economic_rows: usize,
    pub reconciled_rows: usize,
    /// Case-source countries with no economic row for any of their years.
    pub unmatched_case_countries: Vec<String>,
    /// Economic (country, year) keys with no case rows.
    pub unmatched_economic_keys: Vec<(String, i32)>,
}

/// Truncate a float year the way an integer cast does; reject NaN/inf.
fn year_from_f64(value: f64, raw: &str) -> Result<i32, PipelineError> {
    if !value.is_finite() || value.abs() > i32::MAX as f64 {
        return Err(PipelineError::TypeCoercion {
            value: raw.to_string(),
        });
    }
    Ok(value.trunc() as i32)
}

fn year_from_i64(value: i64) -> Result<i32, PipelineError> {
    i32::try_from(value).map_err(|_| PipelineError::TypeCoercion {
        value: value.to_string(),
    })
}

fn year_from_str(raw: &str) -> Result<i32, PipelineError> {
    let trimmed = raw.trim();
    if let Ok(v) = trimmed.parse::<i64>() {
        return year_from_i64(v);
    }
    match trimmed.parse::<f64>() {
        Ok(v) => year_from_f64(v, raw),
        Err(_) => Err(PipelineError::TypeCoercion {
            value: raw.to_string(),
        }),
    }
}

/// Integer years from a `Year` column of integer, float or string type.
pub fn coerce_years(column: &Column) -> Result<Vec<i32>, PipelineError> {
    let null_year = || PipelineError::TypeCoercion {
        value: "null".to_string(),
    };

    match column.dtype() {
        dt if dt.is_integer() => {
            let ints = column.cast(&DataType::Int64)?;
            ints.i64()?
                .into_iter()
                .map(|v| v.ok_or_else(null_year).and_then(year_from_i64))
                .collect()
        }
        dt if dt.is_float() => {
            let floats = column.cast(&DataType::Float64)?;
            floats
                .f64()?
                .into_iter()
                .map(|v| {
                    v.ok_or_else(null_year)
                        .and_then(|f| year_from_f64(f, &f.to_string()))
                })
                .collect()
        }
        DataType::String => column
            .str()?
            .into_iter()
            .map(|v| v.ok_or_else(null_year).and_then(year_from_str))
            .collect(),
        other => Err(PipelineError::TypeCoercion {
            value: format!("column of type {}", other),
        }),
    }
}

/// Numeric indicator values; nulls and non-numeric strings are parse errors.
fn indicator_values(df: &DataFrame, name: &str) -> Result<Vec<f64>, PipelineError> {
    let column = df
        .column(name)
        .map_err(|_| PipelineError::schema(ECON_TABLE, name))?;

    let values: Vec<Option<f64>> = match column.dtype() {
        DataType::String => column
            .str()?
            .into_iter()
            .map(|v| v.and_then(|s| s.trim().parse::<f64>().ok()))
            .collect(),
        _ => column
            .cast(&DataType::Float64)?
            .f64()?
            .into_iter()
            .collect(),
    };

    values
        .into_iter()
        .enumerate()
        .map(|(row, v)| {
            v.filter(|f| !f.is_nan())
                .ok_or_else(|| PipelineError::parse(name, format!("invalid value at row {}", row)))
        })
        .collect()
}

/// Inner join of tidy case records with economic indicators.
pub struct Reconciler {
    options: ReconcileOptions,
}

impl Default for Reconciler {
    fn default() -> Self {
        Self::new(ReconcileOptions::default())
    }
}

impl Reconciler {
    pub fn new(options: ReconcileOptions) -> Self {
        Self { options }
    }

    /// Build economic records from the raw table, coercing `Year` to an integer.
    pub fn coerce_economic(df: &DataFrame) -> Result<Vec<EconomicRecord>, PipelineError> {
        let country_col = df
            .column(ECON_COUNTRY_COL)
            .map_err(|_| PipelineError::schema(ECON_TABLE, ECON_COUNTRY_COL))?;
        let year_col = df
            .column(ECON_YEAR_COL)
            .map_err(|_| PipelineError::schema(ECON_TABLE, ECON_YEAR_COL))?;

        let countries = country_col.cast(&DataType::String)?;
        let countries = countries.str()?;
        let years = coerce_years(year_col)?;
        let gdp = indicator_values(df, ECON_GDP_COL)?;
        let unemployment = indicator_values(df, ECON_UNEMPLOYMENT_COL)?;

        let mut records = Vec::with_capacity(df.height());
        for (row, country) in countries.into_iter().enumerate() {
            let country = country.ok_or_else(|| {
                PipelineError::parse("country name", format!("null at row {}", row))
            })?;
            records.push(EconomicRecord {
                country: country.to_string(),
                year: years[row],
                gdp: gdp[row],
                unemployment: unemployment[row],
            });
        }

        debug!(rows = records.len(), "Coerced economic table");
        Ok(records)
    }

    /// Inner join on (country, year).
    ///
    /// Every tidy record is paired with every economic record sharing its key,
    /// in economic-table order; keys present on only one side produce nothing.
    pub fn reconcile(
        &self,
        tidy: &[TidyCaseRecord],
        economic: &[EconomicRecord],
    ) -> (Vec<ReconciledRecord>, ReconcileReport) {
        let mut index: HashMap<(String, i32), Vec<usize>> = HashMap::new();
        for (i, econ) in economic.iter().enumerate() {
            index
                .entry((self.options.economic_key(&econ.country), econ.year))
                .or_default()
                .push(i);
        }

        let mut reconciled = Vec::new();
        let mut matched_econ: HashSet<usize> = HashSet::new();
        let mut matched_countries: HashSet<&str> = HashSet::new();
        let mut seen_countries: BTreeSet<&str> = BTreeSet::new();

        for record in tidy {
            seen_countries.insert(record.country.as_str());
            let key = (self.options.case_key(&record.country), record.year);
            let Some(rows) = index.get(&key) else {
                continue;
            };
            matched_countries.insert(record.country.as_str());
            for &i in rows {
                matched_econ.insert(i);
                reconciled.push(ReconciledRecord::join(record, &economic[i]));
            }
        }

        let unmatched_case_countries: Vec<String> = seen_countries
            .into_iter()
            .filter(|c| !matched_countries.contains(c))
            .map(str::to_string)
            .collect();

        let unmatched_economic_keys: Vec<(String, i32)> = economic
            .iter()
            .enumerate()
            .filter(|(i, _)| !matched_econ.contains(i))
            .map(|(_, e)| (e.country.clone(), e.year))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        if !unmatched_case_countries.is_empty() {
            warn!(
                count = unmatched_case_countries.len(),
                "Case-count countries without economic data were dropped"
            );
            debug!(countries = ?unmatched_case_countries, "Unmatched case-count countries");
        }
        if !unmatched_economic_keys.is_empty() {
            debug!(keys = ?unmatched_economic_keys, "Unmatched economic rows");
        }

        let report = ReconcileReport {
            tidy_rows: tidy.len(),
            economic_rows: economic.len(),
            reconciled_rows: reconciled.len(),
            unmatched_case_countries,
            unmatched_economic_keys,
        };
        info!(
            tidy = report.tidy_rows,
            economic = report.economic_rows,
            reconciled = report.reconciled_rows,
            "Reconciled case counts with economic data"
        );

        (reconciled, report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn tidy(country: &str, y: i32, m: u32, d: u32, confirmed: i64) -> TidyCaseRecord {
        TidyCaseRecord {
            country: country.to_string(),
            date: NaiveDate::from_ymd_opt(y, m, d).unwrap(),
            confirmed,
            year: y,
        }
    }

    fn econ(country: &str, year: i32, gdp: f64, unemployment: f64) -> EconomicRecord {
        EconomicRecord {
            country: country.to_string(),
            year,
            gdp,
            unemployment,
        }
    }

    #[test]
    fn one_economic_row_fans_across_dates() {
        let cases = vec![
            tidy("Chile", 2021, 3, 1, 100),
            tidy("Chile", 2021, 3, 2, 120),
        ];
        let economic = vec![econ("Chile", 2021, 3200.5, 8.1)];

        let (rows, report) = Reconciler::default().reconcile(&cases, &economic);
        assert_eq!(
            rows,
            vec![
                ReconciledRecord {
                    country: "Chile".to_string(),
                    date: NaiveDate::from_ymd_opt(2021, 3, 1).unwrap(),
                    confirmed: 100,
                    year: 2021,
                    gdp: 3200.5,
                    unemployment: 8.1,
                },
                ReconciledRecord {
                    country: "Chile".to_string(),
                    date: NaiveDate::from_ymd_opt(2021, 3, 2).unwrap(),
                    confirmed: 120,
                    year: 2021,
                    gdp: 3200.5,
                    unemployment: 8.1,
                },
            ]
        );
        assert_eq!(report.reconciled_rows, 2);
        assert!(report.unmatched_case_countries.is_empty());
    }

    #[test]
    fn unmatched_country_contributes_nothing() {
        let cases = vec![
            tidy("Wakanda", 2021, 1, 1, 5),
            tidy("Chile", 2021, 1, 1, 10),
        ];
        let economic = vec![econ("Chile", 2021, 1.0, 2.0), econ("Peru", 2021, 3.0, 4.0)];

        let (rows, report) = Reconciler::default().reconcile(&cases, &economic);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].country, "Chile");
        assert_eq!(report.unmatched_case_countries, vec!["Wakanda".to_string()]);
        assert_eq!(
            report.unmatched_economic_keys,
            vec![("Peru".to_string(), 2021)]
        );
    }

    #[test]
    fn year_must_match_exactly() {
        let cases = vec![tidy("Chile", 2020, 5, 1, 10)];
        let economic = vec![econ("Chile", 2021, 1.0, 2.0)];
        let (rows, _) = Reconciler::default().reconcile(&cases, &economic);
        assert!(rows.is_empty());
    }

    #[test]
    fn duplicate_keys_fan_out_m_by_n() {
        let cases = vec![
            tidy("Chile", 2021, 1, 1, 1),
            tidy("Chile", 2021, 1, 2, 2),
            tidy("Chile", 2021, 1, 3, 3),
        ];
        let economic = vec![econ("Chile", 2021, 10.0, 1.0), econ("Chile", 2021, 20.0, 2.0)];

        let (rows, _) = Reconciler::default().reconcile(&cases, &economic);
        assert_eq!(rows.len(), 3 * 2);
        assert_eq!(rows[0].gdp, 10.0);
        assert_eq!(rows[1].gdp, 20.0);
        assert_eq!(rows[1].confirmed, 1);
    }

    #[test]
    fn empty_overlap_is_not_an_error() {
        let cases = vec![tidy("Chile", 2021, 1, 1, 1)];
        let (rows, report) = Reconciler::default().reconcile(&cases, &[]);
        assert!(rows.is_empty());
        assert_eq!(report.reconciled_rows, 0);
    }

    #[test]
    fn exact_matching_is_case_sensitive() {
        let cases = vec![tidy("US", 2021, 1, 1, 1), tidy("chile", 2021, 1, 1, 1)];
        let economic = vec![
            econ("United States", 2021, 1.0, 2.0),
            econ("Chile", 2021, 1.0, 2.0),
        ];
        let (rows, _) = Reconciler::default().reconcile(&cases, &economic);
        assert!(rows.is_empty());
    }

    #[test]
    fn case_fold_and_aliases_recover_naming_drift() {
        let cases = vec![tidy("US", 2021, 1, 1, 1), tidy("chile ", 2021, 1, 1, 2)];
        let economic = vec![
            econ("United States", 2021, 1.0, 2.0),
            econ("Chile", 2021, 3.0, 4.0),
        ];
        let options = ReconcileOptions {
            matching: CountryMatching::CaseFold,
            aliases: BTreeMap::from([("US".to_string(), "United States".to_string())]),
        };

        let (rows, report) = Reconciler::new(options).reconcile(&cases, &economic);
        assert_eq!(rows.len(), 2);
        // output keeps the case-source spelling
        assert_eq!(rows[0].country, "US");
        assert_eq!(rows[1].country, "chile ");
        assert_eq!(rows[1].gdp, 3.0);
        assert!(report.unmatched_case_countries.is_empty());
    }

    #[test]
    fn coerces_integer_float_and_string_years() {
        let ints = df!("Year" => [2020i64, 2021]).unwrap();
        assert_eq!(
            coerce_years(ints.column("Year").unwrap()).unwrap(),
            vec![2020, 2021]
        );

        let floats = df!("Year" => [2020.0f64, 2022.0]).unwrap();
        assert_eq!(
            coerce_years(floats.column("Year").unwrap()).unwrap(),
            vec![2020, 2022]
        );

        let strings = df!("Year" => [" 2021", "2022.0"]).unwrap();
        assert_eq!(
            coerce_years(strings.column("Year").unwrap()).unwrap(),
            vec![2021, 2022]
        );
    }

    #[test]
    fn non_numeric_year_is_type_coercion_error() {
        let df = df!(
            "Country" => ["Chile"],
            "Year" => ["FY21"],
            "GDP" => [1.0],
            "Unemployment" => [2.0]
        )
        .unwrap();
        assert!(matches!(
            Reconciler::coerce_economic(&df),
            Err(PipelineError::TypeCoercion { .. })
        ));

        let null_year = df!("Year" => [Some(2021i64), None]).unwrap();
        assert!(matches!(
            coerce_years(null_year.column("Year").unwrap()),
            Err(PipelineError::TypeCoercion { .. })
        ));
    }

    #[test]
    fn coerce_economic_reads_rows_and_ignores_extra_columns() {
        let df = df!(
            "Country" => ["Chile", "Peru"],
            "Year" => [2021i64, 2022],
            "GDP" => [3200.5, 4100.0],
            "Unemployment" => [8.1, 6.5],
            "Region" => ["LatAm", "LatAm"]
        )
        .unwrap();
        let records = Reconciler::coerce_economic(&df).unwrap();
        assert_eq!(
            records,
            vec![econ("Chile", 2021, 3200.5, 8.1), econ("Peru", 2022, 4100.0, 6.5)]
        );
    }

    #[test]
    fn missing_economic_columns_are_schema_errors() {
        let df = df!("Country" => ["Chile"], "Year" => [2021i64], "GDP" => [1.0]).unwrap();
        match Reconciler::coerce_economic(&df) {
            Err(PipelineError::Schema { column, .. }) => assert_eq!(column, "Unemployment"),
            other => panic!("expected schema error, got {:?}", other),
        }

        let df = df!("Nation" => ["Chile"], "Year" => [2021i64]).unwrap();
        assert!(matches!(
            Reconciler::coerce_economic(&df),
            Err(PipelineError::Schema { .. })
        ));
    }

    #[test]
    fn bad_indicator_value_is_parse_error() {
        let df = df!(
            "Country" => ["Chile"],
            "Year" => [2021i64],
            "GDP" => ["n/a"],
            "Unemployment" => [2.0]
        )
        .unwrap();
        assert!(matches!(
            Reconciler::coerce_economic(&df),
            Err(PipelineError::Parse { .. })
        ));
    }
}
