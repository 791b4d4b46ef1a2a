//! Response validators
//!
//! No I/O. Every validator sees the same (request, response) pair, runs
//! regardless of what the others concluded, and either passes, fails, or
//! says why it skipped.

use std::panic::{self, AssertUnwindSafe};
use std::time::Duration;

use serde_json::Value;
use swagfuzz_core::{FailureKind, PreparedRequest, ValidationOutcome};

use crate::generator::CaseInstance;
use crate::spec::Operation;
use crate::transport::Response;

/// Violation messages kept per schema failure.
const MAX_SCHEMA_ERRORS: usize = 5;

/// Body characters quoted in a failure message.
const BODY_SNIPPET_CHARS: usize = 200;

/// Input for response validators - pure data, no I/O.
#[derive(Debug, Clone, Copy)]
pub struct CheckInput<'a> {
    pub operation: &'a Operation,
    pub instance: &'a CaseInstance,
    pub request: &'a PreparedRequest,
    pub response: &'a Response,
    /// Accepted for every operation without being declared
    pub standard_codes: &'a [u16],
    pub response_time_limit: Option<Duration>,
}

/// One independent check of a response.
///
/// Implementations must be total: every input yields an outcome.
pub trait Validator: Send + Sync {
    /// Stable identity used in reports and failure signatures
    fn name(&self) -> &'static str;

    fn check(&self, input: &CheckInput<'_>) -> ValidationOutcome;
}

// ── status_code ──

/// The status must be declared for the operation or be a standard code.
pub struct StatusCode;

impl Validator for StatusCode {
    fn name(&self) -> &'static str {
        "status_code"
    }

    fn check(&self, input: &CheckInput<'_>) -> ValidationOutcome {
        let status = input.response.status;
        let op = input.operation;

        if op.declares_status(status) || input.standard_codes.contains(&status) {
            return ValidationOutcome::pass(self.name());
        }
        // Rejecting deliberately invalid input is the correct answer
        if input.instance.is_negative() && (400..500).contains(&status) {
            return ValidationOutcome::pass(self.name());
        }
        ValidationOutcome::fail(
            self.name(),
            FailureKind::for_status(status),
            format!(
                "{status} not declared for {} (declared: {:?}, standard: {:?})",
                op.label(),
                op.declared_statuses(),
                input.standard_codes
            ),
        )
    }
}

// ── response_schema ──

/// The body must validate against the schema declared for its status.
pub struct ResponseSchema;

impl Validator for ResponseSchema {
    fn name(&self) -> &'static str {
        "response_schema"
    }

    fn check(&self, input: &CheckInput<'_>) -> ValidationOutcome {
        let status = input.response.status;
        let Some(schema) = input
            .operation
            .response(status)
            .and_then(|r| r.schema.as_ref())
        else {
            return ValidationOutcome::skip(self.name(), format!("no schema declared for {status}"));
        };

        let body = &input.response.body;
        let instance = match serde_json::from_str::<Value>(body) {
            Ok(value) => value,
            // A plain-text body is checked as a JSON string
            Err(_) if !is_json_media(input.response.media_type()) && input.response.media_type().is_some() => {
                Value::String(body.clone())
            }
            Err(e) => {
                return ValidationOutcome::fail(
                    self.name(),
                    FailureKind::SchemaViolation,
                    format!("Response body is not valid JSON ({e}): {}", snippet(body)),
                );
            }
        };

        let errors = schema.violations(&instance, MAX_SCHEMA_ERRORS);
        if errors.is_empty() {
            ValidationOutcome::pass(self.name())
        } else {
            ValidationOutcome::fail(self.name(), FailureKind::SchemaViolation, errors.join("; "))
        }
    }
}

fn is_json_media(media: Option<&str>) -> bool {
    media.is_some_and(|m| m.eq_ignore_ascii_case("application/json") || m.to_ascii_lowercase().ends_with("+json"))
}

fn snippet(body: &str) -> String {
    let mut chars = body.chars();
    let head: String = chars.by_ref().take(BODY_SNIPPET_CHARS).collect();
    if chars.next().is_some() { format!("{head}…") } else { head }
}

// ── content_type ──

/// The response media type must be one the operation declares.
pub struct ContentType;

impl Validator for ContentType {
    fn name(&self) -> &'static str {
        "content_type"
    }

    fn check(&self, input: &CheckInput<'_>) -> ValidationOutcome {
        let status = input.response.status;
        let op = input.operation;
        if !op.declares_status(status) {
            return ValidationOutcome::skip(self.name(), format!("{status} not declared"));
        }
        if input.response.body.is_empty() {
            return ValidationOutcome::skip(self.name(), "empty body");
        }

        let expected: &[String] = match op.response(status) {
            Some(declared) if !declared.content_types.is_empty() => &declared.content_types,
            _ => &op.produces,
        };
        if expected.is_empty() {
            return ValidationOutcome::skip(self.name(), "no content types declared");
        }

        match input.response.media_type() {
            Some(actual) if expected.iter().any(|e| media_matches(e, actual)) => {
                ValidationOutcome::pass(self.name())
            }
            Some(actual) => ValidationOutcome::fail(
                self.name(),
                FailureKind::ContentTypeMismatch,
                format!("Got \"{actual}\", expected one of {expected:?}"),
            ),
            None => ValidationOutcome::fail(
                self.name(),
                FailureKind::ContentTypeMismatch,
                format!("No Content-Type header, expected one of {expected:?}"),
            ),
        }
    }
}

/// `declared` may carry parameters or wildcards (`*/*`, `text/*`).
fn media_matches(declared: &str, actual: &str) -> bool {
    let declared = declared.split(';').next().unwrap_or(declared).trim().to_ascii_lowercase();
    let actual = actual.to_ascii_lowercase();
    if declared == "*/*" || declared == actual {
        return true;
    }
    match (declared.split_once('/'), actual.split_once('/')) {
        (Some((d_type, "*")), Some((a_type, _))) => d_type == a_type,
        _ => false,
    }
}

// ── response_time ──

/// The response must arrive within the configured limit.
pub struct ResponseTime;

impl Validator for ResponseTime {
    fn name(&self) -> &'static str {
        "response_time"
    }

    fn check(&self, input: &CheckInput<'_>) -> ValidationOutcome {
        let Some(limit) = input.response_time_limit else {
            return ValidationOutcome::skip(self.name(), "no limit configured");
        };
        let elapsed = input.response.elapsed;
        if elapsed <= limit {
            ValidationOutcome::pass(self.name())
        } else {
            ValidationOutcome::fail(
                self.name(),
                FailureKind::ResponseTime,
                format!(
                    "{:.3}s > {:.3}s on {}",
                    elapsed.as_secs_f64(),
                    limit.as_secs_f64(),
                    input.request.url
                ),
            )
        }
    }
}

// ── negative_acceptance ──

/// A type-confused request must not be answered with success.
pub struct NegativeAcceptance;

impl Validator for NegativeAcceptance {
    fn name(&self) -> &'static str {
        "negative_acceptance"
    }

    fn check(&self, input: &CheckInput<'_>) -> ValidationOutcome {
        let Some(deviation) = &input.instance.deviation else {
            return ValidationOutcome::skip(self.name(), "not a negative case");
        };
        let status = input.response.status;
        if (200..300).contains(&status) {
            ValidationOutcome::fail(
                self.name(),
                FailureKind::NegativeAccepted,
                format!("{status} for invalid input: {}", deviation.description),
            )
        } else {
            ValidationOutcome::pass(self.name())
        }
    }
}

// ── Pipeline ──

/// A validator panicked; the run cannot trust its remaining verdicts.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("validator '{validator}' panicked: {message}")]
pub struct ValidatorFault {
    pub validator: String,
    pub message: String,
}

/// Ordered validators applied to every response.
pub struct Pipeline {
    validators: Vec<Box<dyn Validator>>,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::standard()
    }
}

impl Pipeline {
    /// `status_code`, `response_schema`, `content_type`, `response_time`, `negative_acceptance`
    #[must_use]
    pub fn standard() -> Self {
        Self::empty()
            .with(StatusCode)
            .with(ResponseSchema)
            .with(ContentType)
            .with(ResponseTime)
            .with(NegativeAcceptance)
    }

    #[must_use]
    pub fn empty() -> Self {
        Self {
            validators: Vec::new(),
        }
    }

    /// Append a validator; it runs after those already registered.
    #[must_use]
    pub fn with(mut self, validator: impl Validator + 'static) -> Self {
        self.validators.push(Box::new(validator));
        self
    }

    #[must_use]
    pub fn without(mut self, name: &str) -> Self {
        self.validators.retain(|v| v.name() != name);
        self
    }

    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.validators.iter().map(|v| v.name()).collect()
    }

    /// Run every validator in registration order.
    ///
    /// # Errors
    ///
    /// Returns `ValidatorFault` if a validator panics.
    pub fn run(&self, input: &CheckInput<'_>) -> Result<Vec<ValidationOutcome>, ValidatorFault> {
        self.validators
            .iter()
            .map(|validator| {
                panic::catch_unwind(AssertUnwindSafe(|| validator.check(input))).map_err(|payload| {
                    let message = payload
                        .downcast_ref::<&str>()
                        .map(ToString::to_string)
                        .or_else(|| payload.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "unknown panic".to_string());
                    ValidatorFault {
                        validator: validator.name().to_string(),
                        message,
                    }
                })
            })
            .collect()
    }
}
