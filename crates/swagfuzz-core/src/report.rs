//! Run report - the observable output of a fuzzing session
//!
//! Serialized as JSON by `--output json`; `swagfuzz schema` prints its JSON Schema.

use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::verdict::Failure;

/// Everything a run produced.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct RunReport {
    /// Cases executed (shrink re-executions not included)
    pub iterations: u64,
    /// Cases on which every validator passed
    pub passed: u64,
    /// Cases on which at least one validator failed
    pub failed_cases: u64,
    /// Random seed; rerunning with it regenerates the same cases
    pub seed: u64,
    /// Halted on the first reported failure
    #[serde(default)]
    pub stopped_early: bool,
    /// Cancelled by the operator before the iteration budget was spent
    #[serde(default)]
    pub cancelled: bool,
    /// Response status → count, over all executed cases
    #[serde(default)]
    pub status_distribution: BTreeMap<u16, u64>,
    /// Minimized failures, one per distinct signature
    pub failures: Vec<Failure>,
}

impl RunReport {
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            ..Self::default()
        }
    }

    /// Fold another worker's report into this one.
    ///
    /// Failures with the same operation and signature merge their occurrence counts.
    pub fn merge(&mut self, other: Self) {
        self.iterations += other.iterations;
        self.passed += other.passed;
        self.failed_cases += other.failed_cases;
        self.stopped_early |= other.stopped_early;
        self.cancelled |= other.cancelled;
        for (status, count) in other.status_distribution {
            *self.status_distribution.entry(status).or_default() += count;
        }
        for failure in other.failures {
            match self
                .failures
                .iter_mut()
                .find(|f| same_signature(f, &failure))
            {
                Some(existing) => existing.occurrences += failure.occurrences,
                None => self.failures.push(failure),
            }
        }
    }
}

fn same_signature(a: &Failure, b: &Failure) -> bool {
    a.method == b.method && a.path == b.path && a.signature == b.signature
}

/// Generate JSON Schema for the report format.
#[must_use]
pub fn generate_schema() -> String {
    let schema = schemars::schema_for!(RunReport);
    serde_json::to_string_pretty(&schema).unwrap_or_default()
}
