//! Failure kinds and the structured report entry for a failing case

use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::CaseResult;
use crate::request::PreparedRequest;

/// How bad a failure is; the worst reported one picks the exit code.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    /// The server answered but broke its contract: undeclared status,
    /// body or content type mismatch, slow response, accepted bad input
    Warning,
    /// A user-registered validator failed
    Error,
    /// No usable answer: 5xx, timeout, connection failure
    Critical,
}

impl Severity {
    /// Exit status for a run whose worst failure has this severity.
    ///
    /// Contract warnings only fail the run in strict mode.
    #[must_use]
    pub const fn exit_code(self, strict: bool) -> i32 {
        match self {
            Self::Warning if strict => 1,
            Self::Info | Self::Warning => 0,
            Self::Error => 1,
            Self::Critical => 2,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Critical => "critical",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of contract violation - determines default severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Server error (5xx) not whitelisted or declared
    ServerError,
    /// Request timed out (client-side, or 408/504 from the server)
    Timeout,
    /// Connection refused, reset, or otherwise no response
    Transport,
    /// Status code neither declared for the operation nor a standard code
    StatusCode,
    /// Response body does not match the declared schema
    SchemaViolation,
    /// Response Content-Type not among the declared media types
    ContentTypeMismatch,
    /// Response slower than the configured limit
    ResponseTime,
    /// Deliberately invalid input accepted with a success status
    NegativeAccepted,
    /// Reported by a user-registered validator
    Custom,
}

impl FailureKind {
    /// Default severity for this kind
    #[must_use]
    pub const fn default_severity(self) -> Severity {
        match self {
            Self::ServerError | Self::Timeout | Self::Transport => Severity::Critical,
            Self::StatusCode
            | Self::SchemaViolation
            | Self::ContentTypeMismatch
            | Self::ResponseTime
            | Self::NegativeAccepted => Severity::Warning,
            Self::Custom => Severity::Error,
        }
    }

    /// Human-readable description
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::ServerError => "Server returned 5xx error",
            Self::Timeout => "Request timed out",
            Self::Transport => "Server unreachable or connection dropped",
            Self::StatusCode => "Status code not declared in spec",
            Self::SchemaViolation => "Response does not match declared schema",
            Self::ContentTypeMismatch => "Response Content-Type does not match spec",
            Self::ResponseTime => "Response time limit exceeded",
            Self::NegativeAccepted => "Invalid input accepted with success status",
            Self::Custom => "Custom check failed",
        }
    }

    /// Classify an unexpected status code.
    #[must_use]
    pub const fn for_status(status: u16) -> Self {
        match status {
            // Timeout must be checked before general 5xx
            408 | 504 => Self::Timeout,
            500..=599 => Self::ServerError,
            _ => Self::StatusCode,
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.description())
    }
}

/// One validator's complaint about the reported request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Violation {
    pub validator: String,
    pub kind: FailureKind,
    pub message: String,
}

/// How the reported instance was minimized.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ShrinkStats {
    /// Candidates re-executed
    pub attempts: u32,
    /// Candidates accepted as a smaller failing instance
    pub steps: u32,
    /// Whether the attempt budget ran out before a local minimum was reached
    pub exhausted: bool,
}

/// A reported failure: the minimal reproducing request and every violation it triggers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Failure {
    /// Unique identifier within the run
    pub id: String,
    /// HTTP method
    pub method: String,
    /// Path template, e.g. "/pets/{id}"
    pub path: String,
    /// Status code received, absent when no response arrived
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    /// Most severe violation kind
    pub kind: FailureKind,
    /// Severity level
    pub severity: Severity,
    /// All validator failures for the reported request
    pub violations: Vec<Violation>,
    /// Sorted names of the validators that failed on the case first found;
    /// failures are deduplicated on it
    #[serde(default)]
    pub signature: Vec<String>,
    /// Exact request for reproduction
    pub request: PreparedRequest,
    /// Copy-pasteable command reproducing `request`
    pub reproduction: String,
    /// How many failing cases shared this failure's signature
    pub occurrences: u64,
    #[serde(default)]
    pub shrink: ShrinkStats,
    /// Additional context
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub context: BTreeMap<String, String>,
}

impl Failure {
    /// Build a report entry from a failing case result.
    ///
    /// The primary kind is the most severe violation; the first one wins ties.
    #[must_use]
    pub fn from_case(
        id: impl Into<String>,
        method: impl Into<String>,
        path: impl Into<String>,
        result: &CaseResult,
        request: PreparedRequest,
        reproduction: impl Into<String>,
    ) -> Self {
        let violations: Vec<Violation> = result
            .failures()
            .map(|(validator, detail)| Violation {
                validator: validator.to_string(),
                kind: detail.kind,
                message: detail.message.clone(),
            })
            .collect();

        let kind = violations
            .iter()
            .fold(None::<FailureKind>, |best, v| match best {
                Some(b) if b.default_severity() >= v.kind.default_severity() => Some(b),
                _ => Some(v.kind),
            })
            .unwrap_or(FailureKind::Custom);

        let signature = result.failing_validators();

        Self {
            id: id.into(),
            method: method.into(),
            path: path.into(),
            status_code: result.status_code,
            kind,
            severity: kind.default_severity(),
            violations,
            signature,
            request,
            reproduction: reproduction.into(),
            occurrences: 1,
            shrink: ShrinkStats::default(),
            context: BTreeMap::new(),
        }
    }

    /// Operation label, e.g. "GET /pets/{id}"
    #[must_use]
    pub fn operation(&self) -> String {
        format!("{} {}", self.method, self.path)
    }

    /// Key this failure on the case it was found with rather than the reported one.
    #[must_use]
    pub fn with_signature(mut self, mut validators: Vec<String>) -> Self {
        validators.sort_unstable();
        validators.dedup();
        self.signature = validators;
        self
    }

    #[must_use]
    pub fn with_shrink(mut self, shrink: ShrinkStats) -> Self {
        self.shrink = shrink;
        self
    }

    /// Add context entry
    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Override severity
    #[must_use]
    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::verdict::ValidationOutcome;

    fn sample_request() -> PreparedRequest {
        let mut req = PreparedRequest::new("POST", "http://localhost:8080/api/pets");
        req.body = Some(r#"{"name":"test"}"#.to_string());
        req
    }

    fn result_with(outcomes: Vec<ValidationOutcome>, status: u16) -> CaseResult {
        CaseResult {
            status_code: Some(status),
            outcomes,
        }
    }

    #[test]
    fn kind_severity_mapping() {
        assert_eq!(FailureKind::ServerError.default_severity(), Severity::Critical);
        assert_eq!(FailureKind::Timeout.default_severity(), Severity::Critical);
        assert_eq!(FailureKind::Transport.default_severity(), Severity::Critical);
        assert_eq!(FailureKind::SchemaViolation.default_severity(), Severity::Warning);
        assert_eq!(FailureKind::Custom.default_severity(), Severity::Error);
    }

    #[test]
    fn contract_kinds_fail_only_in_strict_mode() {
        for kind in [
            FailureKind::StatusCode,
            FailureKind::SchemaViolation,
            FailureKind::ContentTypeMismatch,
            FailureKind::ResponseTime,
            FailureKind::NegativeAccepted,
        ] {
            let severity = kind.default_severity();
            assert_eq!(severity.exit_code(true), 1, "{kind:?}");
            assert_eq!(severity.exit_code(false), 0, "{kind:?}");
        }
    }

    #[test]
    fn unanswered_requests_exit_two_regardless_of_mode() {
        for kind in [FailureKind::ServerError, FailureKind::Timeout, FailureKind::Transport] {
            for strict in [true, false] {
                assert_eq!(kind.default_severity().exit_code(strict), 2, "{kind:?}");
            }
        }
        assert_eq!(FailureKind::Custom.default_severity().exit_code(false), 1);
        assert_eq!(Severity::Info.exit_code(true), 0);
    }

    #[test]
    fn severity_orders_and_serializes_by_badness() {
        assert!(Severity::Warning < Severity::Error && Severity::Error < Severity::Critical);
        assert_eq!(serde_json::to_string(&Severity::Critical).unwrap(), "\"critical\"");
        assert_eq!(Severity::Warning.to_string(), "warning");
    }

    #[test]
    fn classify_status_codes() {
        assert_eq!(FailureKind::for_status(500), FailureKind::ServerError);
        assert_eq!(FailureKind::for_status(503), FailureKind::ServerError);
        assert_eq!(FailureKind::for_status(504), FailureKind::Timeout);
        assert_eq!(FailureKind::for_status(408), FailureKind::Timeout);
        assert_eq!(FailureKind::for_status(418), FailureKind::StatusCode);
    }

    #[test]
    fn most_severe_violation_is_primary() {
        let result = result_with(
            vec![
                ValidationOutcome::fail("response_schema", FailureKind::SchemaViolation, "bad"),
                ValidationOutcome::fail("status_code", FailureKind::ServerError, "500"),
            ],
            500,
        );
        let failure = Failure::from_case("f1", "POST", "/api/pets", &result, sample_request(), "curl");

        assert_eq!(failure.kind, FailureKind::ServerError);
        assert_eq!(failure.severity, Severity::Critical);
        assert_eq!(failure.violations.len(), 2);
        assert_eq!(failure.occurrences, 1);
        assert_eq!(failure.operation(), "POST /api/pets");
    }

    #[test]
    fn first_violation_wins_ties() {
        let result = result_with(
            vec![
                ValidationOutcome::fail("content_type", FailureKind::ContentTypeMismatch, "a"),
                ValidationOutcome::fail("response_schema", FailureKind::SchemaViolation, "b"),
            ],
            200,
        );
        let failure = Failure::from_case("f1", "GET", "/pets", &result, sample_request(), "curl");
        assert_eq!(failure.kind, FailureKind::ContentTypeMismatch);
        assert_eq!(failure.signature, vec!["content_type", "response_schema"]);
    }

    #[test]
    fn signature_override_is_normalized() {
        let result = result_with(
            vec![ValidationOutcome::fail("response_schema", FailureKind::SchemaViolation, "b")],
            200,
        );
        let failure = Failure::from_case("f1", "GET", "/pets", &result, sample_request(), "curl")
            .with_signature(vec!["response_schema".into(), "content_type".into(), "content_type".into()]);
        assert_eq!(failure.signature, vec!["content_type", "response_schema"]);
        assert_eq!(failure.violations.len(), 1);
    }

    #[test]
    fn builder_pattern() {
        let result = result_with(
            vec![ValidationOutcome::fail("status_code", FailureKind::ServerError, "500")],
            500,
        );
        let failure = Failure::from_case("f1", "GET", "/api", &result, sample_request(), "curl")
            .with_severity(Severity::Error)
            .with_context("seed", "42")
            .with_shrink(ShrinkStats {
                attempts: 12,
                steps: 3,
                exhausted: false,
            });

        assert_eq!(failure.severity, Severity::Error);
        assert_eq!(failure.context.get("seed"), Some(&"42".to_string()));
        assert_eq!(failure.shrink.steps, 3);
    }

    #[test]
    fn serialization_roundtrip() {
        let result = result_with(
            vec![ValidationOutcome::fail("status_code", FailureKind::ServerError, "500")],
            500,
        );
        let failure = Failure::from_case("f1", "POST", "/api/pets", &result, sample_request(), "curl");
        let json = serde_json::to_string(&failure).unwrap();
        let parsed: Failure = serde_json::from_str(&json).unwrap();

        assert_eq!(failure, parsed);
    }
}
