//! Data module - source loading, reshaping and reconciliation

mod loader;
mod pipeline;
mod reconciler;
mod reshaper;
pub mod schema;
mod view;

pub use loader::{
    read_csv_bytes, read_csv_file, CachePolicy, FileSourceLoader, MemoizedLoader, RawSources,
    RemoteSourceLoader, SourceLoader, DEFAULT_COVID_URL, DEFAULT_ECONOMIC_PATH,
};
pub use pipeline::{Pipeline, PipelineOutput, PipelineWarning};
pub use reconciler::{coerce_years, CountryMatching, ReconcileOptions, ReconcileReport, Reconciler};
pub use reshaper::{parse_date_header, Reshaper};
pub use schema::{EconomicRecord, ReconciledRecord, SupportedYear, TidyCaseRecord};
pub use view::{ReconciledTable, YearView};
