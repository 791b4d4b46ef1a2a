//! Verdict module - validation outcomes, failure classification, severity, and policy

mod failure;
mod outcome;
mod policy;

pub use failure::{Failure, FailureKind, Severity, ShrinkStats, Violation};
pub use outcome::{CaseResult, FailureDetail, OutcomeStatus, ValidationOutcome};
pub use policy::{Verdict, VerdictPolicy, VerdictStatus};
