//! Minimizing a failing case
//!
//! Greedy search over single-step simplifications: build every candidate
//! one step simpler than the current best, take the first one the predicate
//! accepts, repeat. Deterministic, no RNG.

use serde_json::Value;

use crate::generator::{CaseInstance, conforms_parameter, simplify};
use crate::spec::{Operation, SpecModel};

/// Result of one shrink.
#[derive(Debug, Clone, PartialEq)]
pub struct ShrinkOutcome {
    /// Smallest instance found that still satisfies the predicate
    pub instance: CaseInstance,
    /// Predicate evaluations spent
    pub attempts: u32,
    /// Candidates accepted
    pub steps: u32,
    /// Stopped by the budget with untested candidates left
    pub exhausted: bool,
}

/// Shrink `instance` while `predicate` keeps holding, spending at most
/// `budget` predicate evaluations.
///
/// The original instance is assumed to satisfy the predicate and is returned
/// unchanged when no simpler one does. The deviated parameter of a negative
/// case stays present and stays invalid.
pub fn shrink<F>(spec: &SpecModel, instance: &CaseInstance, budget: u32, mut predicate: F) -> ShrinkOutcome
where
    F: FnMut(&CaseInstance) -> bool,
{
    let mut best = instance.clone();
    let mut attempts = 0u32;
    let mut steps = 0u32;

    let Some(op) = spec.operation(instance.operation) else {
        return ShrinkOutcome {
            instance: best,
            attempts,
            steps,
            exhausted: false,
        };
    };

    'search: loop {
        let candidates = candidates(op, &best);
        for candidate in candidates {
            if attempts >= budget {
                tracing::debug!(attempts, steps, "shrink budget exhausted");
                return ShrinkOutcome {
                    instance: best,
                    attempts,
                    steps,
                    exhausted: true,
                };
            }
            attempts += 1;
            if predicate(&candidate) {
                steps += 1;
                tracing::debug!(attempts, steps, "shrink step accepted");
                best = candidate;
                continue 'search;
            }
        }
        // Full pass without progress: local minimum
        break;
    }

    ShrinkOutcome {
        instance: best,
        attempts,
        steps,
        exhausted: false,
    }
}

/// Every instance one step simpler than `current`, most aggressive first:
/// dropped optional parameters, then per-parameter value simplifications.
fn candidates(op: &Operation, current: &CaseInstance) -> Vec<CaseInstance> {
    let deviated = current.deviation.as_ref().map(|d| d.parameter);
    let mut out = Vec::new();

    for (index, param) in op.parameters.iter().enumerate() {
        if !param.required && deviated != Some(index) && current.value(index).is_some() {
            out.push(current.with_value(index, None));
        }
    }

    for (index, param) in op.parameters.iter().enumerate() {
        let Some(value) = current.value(index) else {
            continue;
        };
        let simpler: Vec<Value> = if deviated == Some(index) {
            simplify(&param.schema, value)
                .into_iter()
                .filter(|c| !conforms_parameter(param, c))
                .collect()
        } else {
            simplify(&param.schema, value)
        };
        out.extend(
            simpler
                .into_iter()
                .filter(|c| c != value)
                .map(|c| current.with_value(index, Some(c))),
        );
    }

    out
}
