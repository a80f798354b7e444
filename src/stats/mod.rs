//! Stats module - chart-facing aggregations

mod calculator;

pub use calculator::{
    CorrelationMatrix, CountryValue, DashboardSummary, SeriesPoint, StatsCalculator,
    CORRELATION_LABELS, TOP_CONFIRMED, TOP_GDP, TOP_UNEMPLOYMENT,
};
