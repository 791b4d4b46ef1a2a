//! Per-validator outcomes and their aggregation for one executed case

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::FailureKind;

/// What a single validator concluded about one (request, response) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ValidationOutcome {
    /// Validator identity, e.g. "status_code"
    pub validator: String,
    #[serde(flatten)]
    pub status: OutcomeStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OutcomeStatus {
    Pass,
    /// The validator had nothing to check (no declared schema, no limit configured, ...)
    Skip { reason: String },
    Fail(FailureDetail),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct FailureDetail {
    pub kind: FailureKind,
    pub message: String,
}

impl ValidationOutcome {
    #[must_use]
    pub fn pass(validator: impl Into<String>) -> Self {
        Self {
            validator: validator.into(),
            status: OutcomeStatus::Pass,
        }
    }

    #[must_use]
    pub fn skip(validator: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            validator: validator.into(),
            status: OutcomeStatus::Skip {
                reason: reason.into(),
            },
        }
    }

    #[must_use]
    pub fn fail(validator: impl Into<String>, kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            validator: validator.into(),
            status: OutcomeStatus::Fail(FailureDetail {
                kind,
                message: message.into(),
            }),
        }
    }

    #[must_use]
    pub const fn is_failure(&self) -> bool {
        matches!(self.status, OutcomeStatus::Fail(_))
    }

    #[must_use]
    pub const fn failure(&self) -> Option<&FailureDetail> {
        match &self.status {
            OutcomeStatus::Fail(detail) => Some(detail),
            OutcomeStatus::Pass | OutcomeStatus::Skip { .. } => None,
        }
    }
}

/// Outcomes of every validator for one executed request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CaseResult {
    /// Response status, `None` when the request never got a response
    pub status_code: Option<u16>,
    pub outcomes: Vec<ValidationOutcome>,
}

impl CaseResult {
    #[must_use]
    pub fn is_failing(&self) -> bool {
        self.outcomes.iter().any(ValidationOutcome::is_failure)
    }

    pub fn failures(&self) -> impl Iterator<Item = (&str, &FailureDetail)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.failure().map(|d| (o.validator.as_str(), d)))
    }

    /// Sorted, deduplicated names of the validators that failed.
    #[must_use]
    pub fn failing_validators(&self) -> Vec<String> {
        let mut names: Vec<String> = self.failures().map(|(name, _)| name.to_string()).collect();
        names.sort();
        names.dedup();
        names
    }
}
