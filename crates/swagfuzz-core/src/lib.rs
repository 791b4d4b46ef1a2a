//! swagfuzz-core: Core types and verdict logic for Swagger API fuzzing
//!
//! Pure data and formatting with no I/O beyond reading config files:
//! prepared requests, validation outcomes, failure reports, severity and
//! verdict policy, and the reproduction formats.

pub mod config;
pub mod report;
pub mod reproduce;
pub mod request;
pub mod verdict;

pub use config::{Config, ConfigError, DEFAULT_STANDARD_CODES};
pub use report::RunReport;
pub use reproduce::{to_curl_command, to_http_file};
pub use request::PreparedRequest;
pub use verdict::{
    CaseResult, Failure, FailureDetail, FailureKind, OutcomeStatus, Severity, ShrinkStats,
    ValidationOutcome, Verdict, VerdictPolicy, VerdictStatus, Violation,
};
