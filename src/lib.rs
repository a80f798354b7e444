//! Covid-19 Economic Impact Dashboard
//!
//! Loads the Johns Hopkins confirmed-case time series and a local economic
//! indicators table, reshapes the case counts into tidy rows and joins both
//! on (country, year). The reconciled table is then filtered by year and
//! reduced to the figures the dashboard charts display.

pub mod config;
pub mod data;
pub mod error;
pub mod stats;
pub mod telemetry;

pub use config::DashboardConfig;
pub use data::{
    Pipeline, PipelineOutput, ReconciledRecord, ReconciledTable, SupportedYear, YearView,
};
pub use error::PipelineError;
pub use stats::{DashboardSummary, StatsCalculator};
