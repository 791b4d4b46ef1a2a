//! End-to-end runs against an in-memory server

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde_json::{Value, json};
use swagfuzz_core::{FailureKind, PreparedRequest, ValidationOutcome};
use swagfuzz_runner::checks::CheckInput;
use swagfuzz_runner::{
    CancelToken, Engine, Pipeline, Response, RunContext, RunError, RunSettings, SpecModel, Transport,
    TransportError, Validator,
};

/// Answers every request with a closure and counts calls.
struct Scripted<F> {
    respond: F,
    calls: AtomicU64,
}

impl<F> Scripted<F>
where
    F: Fn(&PreparedRequest) -> Result<Response, TransportError> + Send + Sync,
{
    fn new(respond: F) -> Arc<Self> {
        Arc::new(Self {
            respond,
            calls: AtomicU64::new(0),
        })
    }

    fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl<F> Transport for Scripted<F>
where
    F: Fn(&PreparedRequest) -> Result<Response, TransportError> + Send + Sync,
{
    fn send(&self, request: &PreparedRequest) -> Result<Response, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        (self.respond)(request)
    }
}

fn petstore() -> Arc<SpecModel> {
    let doc = json!({
        "swagger": "2.0",
        "basePath": "/v1",
        "produces": ["application/json"],
        "paths": {
            "/pets/{id}": {
                "get": {
                    "parameters": [{"name": "id", "in": "path", "required": true, "type": "integer", "minimum": 1, "maximum": 200}],
                    "responses": {
                        "200": {
                            "description": "pet",
                            "schema": {
                                "type": "object",
                                "required": ["id", "name"],
                                "properties": {"id": {"type": "integer"}, "name": {"type": "string"}}
                            }
                        }
                    }
                }
            }
        }
    });
    Arc::new(SpecModel::from_document(&doc).unwrap())
}

fn search() -> Arc<SpecModel> {
    let doc = json!({
        "swagger": "2.0",
        "paths": {
            "/search": {
                "get": {
                    "parameters": [
                        {"name": "name", "in": "query", "required": true, "type": "string", "maxLength": 600}
                    ],
                    "responses": {"200": {"description": "ok"}}
                }
            }
        }
    });
    Arc::new(SpecModel::from_document(&doc).unwrap())
}

fn query_param(request: &PreparedRequest, name: &str) -> Option<String> {
    let url = url::Url::parse(&request.url).ok()?;
    url.query_pairs().find(|(k, _)| k == name).map(|(_, v)| v.into_owned())
}

fn settings(iterations: u64) -> RunSettings {
    RunSettings::new("http://api.test/v1", 7).with_iterations(iterations)
}

#[test]
fn schema_mismatch_is_reported() {
    let server = Scripted::new(|_: &PreparedRequest| Ok(Response::json(200, &json!({"id": "abc", "name": "rex"}))));
    let engine = Engine::new(RunContext::new(petstore(), settings(10), server.clone()));
    let report = engine.run().unwrap();

    assert_eq!(report.iterations, 10);
    assert_eq!(report.failed_cases, 10);
    assert_eq!(report.failures.len(), 1);
    let failure = &report.failures[0];
    assert_eq!(failure.kind, FailureKind::SchemaViolation);
    assert_eq!(failure.occurrences, 10);
    assert_eq!(failure.violations.len(), 1);
    assert_eq!(failure.violations[0].validator, "response_schema");
    assert!(failure.violations[0].message.contains("\"abc\""), "{}", failure.violations[0].message);
    // Path parameter shrinks to its minimum
    assert_eq!(failure.request.url, "http://api.test/v1/pets/1");
    assert!(failure.reproduction.starts_with("curl "));
}

#[test]
fn undeclared_server_error_fails_while_standard_404_passes() {
    let server = Scripted::new(|req: &PreparedRequest| {
        let id: u64 = req.url.rsplit('/').next().and_then(|s| s.parse().ok()).unwrap_or(0);
        if id > 100 {
            Ok(Response::new(500).with_body("boom"))
        } else {
            Ok(Response::new(404))
        }
    });
    let engine = Engine::new(RunContext::new(petstore(), settings(40), server.clone()));
    let report = engine.run().unwrap();

    assert_eq!(report.iterations, 40);
    assert_eq!(report.passed + report.failed_cases, 40);
    assert!(report.passed > 0, "404 is a standard code");
    assert_eq!(report.failures.len(), 1);
    let failure = &report.failures[0];
    assert_eq!(failure.kind, FailureKind::ServerError);
    assert_eq!(failure.status_code, Some(500));
    assert_eq!(failure.occurrences, report.failed_cases);
    // Smallest failing id
    assert_eq!(failure.request.url, "http://api.test/v1/pets/101");
    assert_eq!(report.status_distribution.values().sum::<u64>(), 40);
}

#[test]
fn wider_failure_keeps_its_own_report_after_shrinking() {
    let server = Scripted::new(|req: &PreparedRequest| {
        let id: u64 = req.url.rsplit('/').next().and_then(|s| s.parse().ok()).unwrap_or(0);
        let bad = Response::json(200, &json!({"id": "abc", "name": "rex"}));
        match id {
            0..=50 => Ok(Response::json(200, &json!({"id": id, "name": "rex"}))),
            51..=100 => Ok(bad),
            _ => Ok(bad.with_header("Content-Type", "text/html")),
        }
    });
    let engine = Engine::new(RunContext::new(petstore(), settings(80), server.clone()));
    let report = engine.run().unwrap();

    assert_eq!(report.failures.len(), 2, "{:#?}", report.failures);
    let schema_only = report
        .failures
        .iter()
        .find(|f| f.signature == ["response_schema"])
        .unwrap();
    let both = report
        .failures
        .iter()
        .find(|f| f.signature == ["content_type", "response_schema"])
        .unwrap();

    assert_eq!(schema_only.request.url, "http://api.test/v1/pets/51");
    // Shrinking stops where content_type would start passing again
    assert_eq!(both.request.url, "http://api.test/v1/pets/101");
    let mut reported: Vec<&str> = both.violations.iter().map(|v| v.validator.as_str()).collect();
    reported.sort_unstable();
    assert_eq!(reported, ["content_type", "response_schema"]);
    assert_eq!(schema_only.occurrences + both.occurrences, report.failed_cases);
}

#[test]
fn long_string_shrinks_to_eleven_characters() {
    let server = Scripted::new(|req: &PreparedRequest| {
        let name = query_param(req, "name").unwrap_or_default();
        if name.chars().count() > 10 {
            Ok(Response::new(500))
        } else {
            Ok(Response::new(200))
        }
    });
    let engine = Engine::new(RunContext::new(search(), settings(50), server.clone()));
    let report = engine.run().unwrap();

    assert_eq!(report.failures.len(), 1);
    let failure = &report.failures[0];
    let name = query_param(&failure.request, "name").unwrap();
    assert_eq!(name.chars().count(), 11);
    assert!(failure.shrink.steps > 0);
    assert!(!failure.shrink.exhausted);
    assert!(failure.context.contains_key("original_request"));
    // Shrink re-executions are extra requests, not iterations
    assert!(server.calls() > report.iterations);
}

#[test]
fn timeout_is_a_failure_and_the_run_continues() {
    let server = Scripted::new(|_: &PreparedRequest| Err(TransportError::Timeout("after 10s".into())));
    let engine = Engine::new(RunContext::new(petstore(), settings(5), server.clone()));
    let report = engine.run().unwrap();

    assert_eq!(report.iterations, 5);
    assert_eq!(report.failed_cases, 5);
    let failure = &report.failures[0];
    assert_eq!(failure.kind, FailureKind::Timeout);
    assert_eq!(failure.status_code, None);
    assert_eq!(failure.violations[0].validator, "transport");
}

#[test]
fn stop_on_failure_halts_after_first_report() {
    let server = Scripted::new(|_: &PreparedRequest| Ok(Response::new(500)));
    let engine = Engine::new(RunContext::new(
        petstore(),
        settings(1_000).with_stop_on_failure(true),
        server.clone(),
    ));
    let report = engine.run().unwrap();

    assert!(report.stopped_early);
    assert_eq!(report.iterations, 1);
    assert_eq!(report.failures.len(), 1);
}

#[test]
fn cancelled_run_reports_what_it_did() {
    let cancel = CancelToken::new();
    cancel.cancel();
    let server = Scripted::new(|_: &PreparedRequest| Ok(Response::new(200)));
    let ctx = RunContext::new(petstore(), settings(100), server.clone()).with_cancel(cancel);
    let report = Engine::new(ctx).run().unwrap();

    assert!(report.cancelled);
    assert_eq!(report.iterations, 0);
    assert_eq!(server.calls(), 0);
}

#[test]
fn shrink_budget_bounds_reexecutions() {
    let server = Scripted::new(|req: &PreparedRequest| {
        let name = query_param(req, "name").unwrap_or_default();
        Ok(Response::new(if name.chars().count() > 10 { 500 } else { 200 }))
    });
    let ctx = RunContext::new(search(), settings(50).with_shrink_budget(2), server.clone());
    let report = Engine::new(ctx).run().unwrap();

    let failure = &report.failures[0];
    assert!(failure.shrink.attempts <= 2);
    assert!(failure.shrink.exhausted);
    assert_eq!(server.calls(), report.iterations + u64::from(failure.shrink.attempts));
}

#[test]
fn same_seed_same_report() {
    let run = || {
        let server = Scripted::new(|req: &PreparedRequest| {
            let name = query_param(req, "name").unwrap_or_default();
            Ok(Response::new(if name.len() % 3 == 0 { 500 } else { 200 }))
        });
        Engine::new(RunContext::new(search(), settings(30), server)).run().unwrap()
    };
    let (a, b) = (run(), run());
    assert_eq!(a.passed, b.passed);
    assert_eq!(a.failures, b.failures);
}

#[test]
fn parallel_workers_share_the_budget() {
    let server = Scripted::new(|_: &PreparedRequest| Ok(Response::json(200, &json!({"id": 1, "name": "a"}))));
    let ctx = RunContext::new(petstore(), settings(64).with_workers(4), server.clone());
    let report = Engine::new(ctx).run().unwrap();

    assert_eq!(report.iterations, 64);
    assert_eq!(report.passed, 64);
    assert!(report.failures.is_empty());
}

#[test]
fn negative_cases_rejected_with_4xx_pass() {
    let server = Scripted::new(|req: &PreparedRequest| {
        let id = req.url.rsplit('/').next().unwrap_or("");
        if id.parse::<u64>().is_ok_and(|n| (1..=200).contains(&n)) {
            Ok(Response::json(200, &json!({"id": 1, "name": "a"})))
        } else {
            Ok(Response::new(400))
        }
    });
    let ctx = RunContext::new(petstore(), settings(40).with_negative_ratio(0.5), server.clone());
    let report = Engine::new(ctx).run().unwrap();

    assert_eq!(report.iterations, 40);
    assert!(report.failures.is_empty(), "{:#?}", report.failures);
}

#[test]
fn accepted_negative_case_is_reported() {
    let server = Scripted::new(|_: &PreparedRequest| Ok(Response::json(200, &json!({"id": 1, "name": "a"}))));
    let ctx = RunContext::new(petstore(), settings(40).with_negative_ratio(1.0), server.clone());
    let report = Engine::new(ctx).run().unwrap();

    let failure = report
        .failures
        .iter()
        .find(|f| f.kind == FailureKind::NegativeAccepted)
        .expect("negative acceptance reported");
    assert!(failure.context.contains_key("deviation"));
}

struct Panicky;

impl Validator for Panicky {
    fn name(&self) -> &'static str {
        "panicky"
    }

    fn check(&self, _input: &CheckInput<'_>) -> ValidationOutcome {
        panic!("validator bug")
    }
}

#[test]
fn validator_panic_aborts_the_run() {
    let server = Scripted::new(|_: &PreparedRequest| Ok(Response::new(200)));
    let ctx = RunContext::new(petstore(), settings(10), server.clone())
        .with_pipeline(Pipeline::standard().with(Panicky));
    let err = Engine::new(ctx).run().unwrap_err();
    assert!(matches!(err, RunError::ValidatorFault(ref f) if f.validator == "panicky"), "{err}");
}

#[test]
fn execute_single_case() {
    let server = Scripted::new(|_: &PreparedRequest| {
        Ok(Response::json(200, &json!({"id": 3, "name": "x"})).with_elapsed(Duration::from_millis(3)))
    });
    let engine = Engine::new(RunContext::new(petstore(), settings(1), server.clone()));
    let instance = swagfuzz_runner::CaseInstance {
        operation: 0,
        values: vec![Some(Value::from(3))],
        deviation: None,
    };
    let execution = engine.execute(&instance).unwrap();
    assert_eq!(execution.request.url, "http://api.test/v1/pets/3");
    assert_eq!(execution.result.status_code, Some(200));
    assert!(!execution.result.is_failing());
}

#[test]
fn spec_without_operations_is_an_error() {
    let spec = Arc::new(SpecModel::from_document(&json!({"swagger": "2.0", "paths": {}})).unwrap());
    let server = Scripted::new(|_: &PreparedRequest| Ok(Response::new(200)));
    let err = Engine::new(RunContext::new(spec, settings(1), server)).run().unwrap_err();
    assert!(matches!(err, RunError::Spec(_)));
}
