//! Dashboard configuration: an optional JSON file, overridden by CLI flags.

use crate::data::{
    CachePolicy, CountryMatching, ReconcileOptions, SupportedYear, DEFAULT_COVID_URL,
    DEFAULT_ECONOMIC_PATH,
};
use crate::error::PipelineError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DashboardConfig {
    pub covid_url: String,
    /// Read case counts from this file instead of downloading them.
    pub covid_file: Option<PathBuf>,
    pub economic_path: PathBuf,
    pub country_matching: CountryMatching,
    /// Case-source country name -> economic-source name.
    pub aliases: BTreeMap<String, String>,
    /// Seconds before cached sources are refetched; unset caches until reload.
    pub cache_ttl_secs: Option<u64>,
    pub default_year: SupportedYear,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            covid_url: DEFAULT_COVID_URL.to_string(),
            covid_file: None,
            economic_path: PathBuf::from(DEFAULT_ECONOMIC_PATH),
            country_matching: CountryMatching::Exact,
            aliases: BTreeMap::new(),
            cache_ttl_secs: None,
            default_year: SupportedYear::Y2020,
        }
    }
}

impl DashboardConfig {
    pub fn from_json(text: &str) -> Result<Self, PipelineError> {
        serde_json::from_str(text).map_err(|e| PipelineError::Config(e.to_string()))
    }

    pub fn from_file(path: &Path) -> Result<Self, PipelineError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| PipelineError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&text)
    }

    pub fn reconcile_options(&self) -> ReconcileOptions {
        ReconcileOptions {
            matching: self.country_matching,
            aliases: self.aliases.clone(),
        }
    }

    pub fn cache_policy(&self) -> CachePolicy {
        match self.cache_ttl_secs {
            Some(secs) => CachePolicy::with_ttl(Duration::from_secs(secs)),
            None => CachePolicy::until_invalidated(),
        }
    }
}

/// Parse a `FROM=TO` alias flag.
pub fn parse_alias(raw: &str) -> Result<(String, String), PipelineError> {
    let (from, to) = raw
        .split_once('=')
        .ok_or_else(|| PipelineError::Config(format!("alias '{}' is not FROM=TO", raw)))?;
    let (from, to) = (from.trim(), to.trim());
    if from.is_empty() || to.is_empty() {
        return Err(PipelineError::Config(format!(
            "alias '{}' has an empty side",
            raw
        )));
    }
    Ok((from.to_string(), to.to_string()))
}
