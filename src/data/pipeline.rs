//! Runs the stages in order: reshape the case table, coerce the economic
//! table, reconcile the two.

use crate::data::loader::RawSources;
use crate::data::reconciler::{ReconcileOptions, ReconcileReport, Reconciler};
use crate::data::reshaper::Reshaper;
use crate::data::view::ReconciledTable;
use crate::error::PipelineError;
use serde::Serialize;
use tracing::{info, warn};

/// Conditions worth telling the user about that do not stop the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum PipelineWarning {
    /// The join produced no rows.
    EmptyResult,
}

#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub table: ReconciledTable,
    pub report: ReconcileReport,
    pub warnings: Vec<PipelineWarning>,
}

pub struct Pipeline {
    reconciler: Reconciler,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new(ReconcileOptions::default())
    }
}

impl Pipeline {
    pub fn new(options: ReconcileOptions) -> Self {
        Self {
            reconciler: Reconciler::new(options),
        }
    }

    /// Derive the reconciled table from the raw inputs. Any stage error aborts the run.
    pub fn run(&self, sources: &RawSources) -> Result<PipelineOutput, PipelineError> {
        info!(
            case_rows = sources.cases.height(),
            economic_rows = sources.economic.height(),
            "Running reconciliation pipeline"
        );

        let tidy = Reshaper::reshape(&sources.cases)?;
        let economic = Reconciler::coerce_economic(&sources.economic)?;
        let (records, report) = self.reconciler.reconcile(&tidy, &economic);

        let mut warnings = Vec::new();
        if records.is_empty() {
            warn!("Reconciled table is empty: no (country, year) keys overlap");
            warnings.push(PipelineWarning::EmptyResult);
        }

        Ok(PipelineOutput {
            table: ReconciledTable::new(records),
            report,
            warnings,
        })
    }
}
