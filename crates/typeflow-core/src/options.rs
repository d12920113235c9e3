//! Tunables of an inference run

use crate::types::MAX_TYPE_REFS;
use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Options shared by every routine of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisOptions {
    /// Distinct type refs per routine before masks degrade to mixed
    pub type_ref_cap: usize,
    /// Block visits before the driver gives up and reports non-convergence
    pub max_iterations: usize,
    /// Hold back a caller block's successors while a callee is still unstable
    pub defer_on_pending_callee: bool,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            type_ref_cap: MAX_TYPE_REFS,
            max_iterations: 100_000,
            defer_on_pending_callee: true,
        }
    }
}

impl AnalysisOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_type_ref_cap(mut self, cap: usize) -> Self {
        self.type_ref_cap = cap.min(MAX_TYPE_REFS);
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn without_deferral(mut self) -> Self {
        self.defer_on_pending_callee = false;
        self
    }

    /// Parse options from JSON; missing fields keep their defaults
    pub fn from_json(text: &str) -> anyhow::Result<Self> {
        let options: AnalysisOptions =
            serde_json::from_str(text).context("Failed to parse analysis options")?;
        let cap = options.type_ref_cap;
        Ok(options.with_type_ref_cap(cap))
    }
}
