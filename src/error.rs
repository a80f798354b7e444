//! Error taxonomy shared by every pipeline stage.

use polars::prelude::PolarsError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    /// A source could not be retrieved, or what came back was not a CSV table.
    #[error("Failed to fetch {source_name}: {message}")]
    Fetch {
        source_name: String,
        message: String,
    },
    /// An expected column is absent from one of the sources.
    #[error("Column '{column}' missing from {table}")]
    Schema { table: String, column: String },
    /// A date header, count or indicator value could not be parsed.
    #[error("Failed to parse {what}: {value:?}")]
    Parse { what: String, value: String },
    /// The economic `Year` field could not be turned into an integer.
    #[error("Cannot coerce year value {value:?} to an integer")]
    TypeCoercion { value: String },
    #[error("Year {0} is not one of 2020, 2021, 2022")]
    UnsupportedYear(i32),
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Polars error: {0}")]
    Polars(#[from] PolarsError),
}

impl PipelineError {
    pub(crate) fn fetch(source_name: &str, message: impl ToString) -> Self {
        Self::Fetch {
            source_name: source_name.to_string(),
            message: message.to_string(),
        }
    }

    pub(crate) fn schema(table: &str, column: &str) -> Self {
        Self::Schema {
            table: table.to_string(),
            column: column.to_string(),
        }
    }

    pub(crate) fn parse(what: &str, value: impl ToString) -> Self {
        Self::Parse {
            what: what.to_string(),
            value: value.to_string(),
        }
    }
}
