//! Execution engine - the fuzzing loop
//!
//! Draw a case, build its request, send it, validate the response. A failing
//! case is minimized by the shrinker (re-executing candidates through the
//! same path) and reported once per signature.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use swagfuzz_core::{
    CaseResult, Config, DEFAULT_STANDARD_CODES, Failure, FailureKind, PreparedRequest, RunReport,
    ShrinkStats, ValidationOutcome, to_curl_command,
};

use crate::builder::{BuildError, build_request};
use crate::checks::{CheckInput, Pipeline, ValidatorFault};
use crate::generator::{CaseGenerator, CaseInstance};
use crate::shrink::shrink;
use crate::spec::{SpecError, SpecModel};
use crate::transport::{HttpTransport, Transport, TransportError};

/// Outcome name used when no response arrived.
pub const TRANSPORT_VALIDATOR: &str = "transport";

/// Spreads worker streams apart; worker 0 uses the run seed itself.
const WORKER_SEED_STRIDE: u64 = 0x9E37_79B9_7F4A_7C15;

#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error(transparent)]
    Spec(#[from] SpecError),
    #[error("cannot build request: {0}")]
    Build(#[from] BuildError),
    #[error(transparent)]
    ValidatorFault(#[from] ValidatorFault),
    #[error("HTTP client: {0}")]
    Http(#[from] TransportError),
}

/// Knobs of one run.
#[derive(Debug, Clone)]
pub struct RunSettings {
    /// Request root, no trailing `/`
    pub base_url: String,
    pub iterations: u64,
    pub standard_codes: Vec<u16>,
    pub extra_headers: BTreeMap<String, String>,
    pub seed: u64,
    pub shrink_budget: u32,
    pub stop_on_failure: bool,
    pub workers: usize,
    pub negative_ratio: f64,
    pub response_time_limit: Option<Duration>,
}

impl RunSettings {
    #[must_use]
    pub fn new(base_url: impl Into<String>, seed: u64) -> Self {
        let defaults = Config::default();
        Self {
            base_url: base_url.into(),
            iterations: defaults.iterations,
            standard_codes: DEFAULT_STANDARD_CODES.to_vec(),
            extra_headers: BTreeMap::new(),
            seed,
            shrink_budget: defaults.shrink_budget,
            stop_on_failure: false,
            workers: defaults.workers,
            negative_ratio: 0.0,
            response_time_limit: None,
        }
    }

    /// Settings from a validated config; `seed` is the one the run actually uses.
    #[must_use]
    pub fn from_config(config: &Config, base_url: impl Into<String>, seed: u64) -> Self {
        Self {
            base_url: base_url.into(),
            iterations: config.iterations,
            standard_codes: config.standard_codes.clone(),
            extra_headers: config.headers.clone(),
            seed,
            shrink_budget: config.shrink_budget,
            stop_on_failure: config.stop_on_failure,
            workers: config.workers.max(1),
            negative_ratio: config.negative_ratio,
            response_time_limit: config.response_time_limit.map(Duration::from_secs_f64),
        }
    }

    #[must_use]
    pub const fn with_iterations(mut self, iterations: u64) -> Self {
        self.iterations = iterations;
        self
    }

    #[must_use]
    pub const fn with_shrink_budget(mut self, budget: u32) -> Self {
        self.shrink_budget = budget;
        self
    }

    #[must_use]
    pub const fn with_stop_on_failure(mut self, stop: bool) -> Self {
        self.stop_on_failure = stop;
        self
    }

    #[must_use]
    pub const fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    #[must_use]
    pub const fn with_negative_ratio(mut self, ratio: f64) -> Self {
        self.negative_ratio = ratio;
        self
    }

    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_headers.insert(name.into(), value.into());
        self
    }
}

/// Cooperative cancellation, checked between iterations.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Everything a run needs, passed explicitly.
pub struct RunContext {
    pub spec: Arc<SpecModel>,
    pub settings: RunSettings,
    pub transport: Arc<dyn Transport>,
    pub pipeline: Pipeline,
    pub cancel: CancelToken,
}

impl RunContext {
    #[must_use]
    pub fn new(spec: Arc<SpecModel>, settings: RunSettings, transport: Arc<dyn Transport>) -> Self {
        Self {
            spec,
            settings,
            transport,
            pipeline: Pipeline::standard(),
            cancel: CancelToken::new(),
        }
    }

    /// Context sending over HTTP with a per-request `timeout`.
    ///
    /// # Errors
    ///
    /// Returns `RunError::Http` if the HTTP client cannot be built.
    pub fn over_http(spec: Arc<SpecModel>, settings: RunSettings, timeout: Duration) -> Result<Self, RunError> {
        let transport = HttpTransport::new(timeout)?;
        Ok(Self::new(spec, settings, Arc::new(transport)))
    }

    #[must_use]
    pub fn with_pipeline(mut self, pipeline: Pipeline) -> Self {
        self.pipeline = pipeline;
        self
    }

    #[must_use]
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// One executed case.
#[derive(Debug, Clone)]
pub struct Execution {
    pub request: PreparedRequest,
    pub result: CaseResult,
}

/// Failure signature: same operation, same failing validators.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Signature {
    operation: usize,
    validators: Vec<String>,
}

/// State shared by all workers.
struct Shared {
    claimed: AtomicU64,
    halt: AtomicBool,
    next_id: AtomicU64,
    /// Signature → failing cases seen with it
    signatures: Mutex<HashMap<Signature, u64>>,
}

/// What one worker found.
struct WorkerOutput {
    report: RunReport,
    failures: Vec<(u64, Signature, Failure)>,
}

pub struct Engine {
    ctx: RunContext,
}

impl Engine {
    #[must_use]
    pub const fn new(ctx: RunContext) -> Self {
        Self { ctx }
    }

    #[must_use]
    pub const fn context(&self) -> &RunContext {
        &self.ctx
    }

    /// Build, send and validate one case.
    ///
    /// A request that gets no response yields a failing `transport` outcome.
    ///
    /// # Errors
    ///
    /// `RunError::Build` if the instance does not fit the spec,
    /// `RunError::ValidatorFault` if a validator panics.
    pub fn execute(&self, instance: &CaseInstance) -> Result<Execution, RunError> {
        let spec = &self.ctx.spec;
        let settings = &self.ctx.settings;
        let operation = spec
            .operation(instance.operation)
            .ok_or(BuildError::UnknownOperation(instance.operation))?;
        let request = build_request(spec, instance, &settings.base_url, &settings.extra_headers)?;

        let result = match self.ctx.transport.send(&request) {
            Ok(response) => {
                tracing::debug!(
                    request = %request.request_line(),
                    status = response.status,
                    elapsed_ms = response.elapsed.as_millis(),
                    "response"
                );
                let outcomes = self.ctx.pipeline.run(&CheckInput {
                    operation,
                    instance,
                    request: &request,
                    response: &response,
                    standard_codes: &settings.standard_codes,
                    response_time_limit: settings.response_time_limit,
                })?;
                CaseResult {
                    status_code: Some(response.status),
                    outcomes,
                }
            }
            Err(e) => {
                tracing::warn!(request = %request.request_line(), error = %e, "no response");
                let kind = match e {
                    TransportError::Timeout(_) => FailureKind::Timeout,
                    TransportError::Connect(_) | TransportError::Other(_) => FailureKind::Transport,
                };
                CaseResult {
                    status_code: None,
                    outcomes: vec![ValidationOutcome::fail(TRANSPORT_VALIDATOR, kind, e.to_string())],
                }
            }
        };
        Ok(Execution { request, result })
    }

    /// Run until the iteration budget is spent, the run is cancelled, or
    /// (with `stop_on_failure`) the first failure is reported.
    ///
    /// # Errors
    ///
    /// `RunError::Spec` for a spec without operations; any fatal error a
    /// worker hits stops the whole run.
    pub fn run(&self) -> Result<RunReport, RunError> {
        let settings = &self.ctx.settings;
        if self.ctx.spec.operations.is_empty() {
            return Err(SpecError::Invalid("no operations to fuzz".into()).into());
        }
        let workers = settings.workers.max(1);
        tracing::info!(
            seed = settings.seed,
            iterations = settings.iterations,
            workers,
            operations = self.ctx.spec.operations.len(),
            base_url = %settings.base_url,
            "fuzzing started"
        );

        let shared = Shared {
            claimed: AtomicU64::new(0),
            halt: AtomicBool::new(false),
            next_id: AtomicU64::new(1),
            signatures: Mutex::new(HashMap::new()),
        };

        let outputs: Vec<Result<WorkerOutput, RunError>> = if workers == 1 {
            vec![self.worker(0, &shared)]
        } else {
            std::thread::scope(|scope| {
                let handles: Vec<_> = (0..workers)
                    .map(|index| {
                        let shared = &shared;
                        scope.spawn(move || self.worker(index, shared))
                    })
                    .collect();
                handles
                    .into_iter()
                    .map(|h| h.join().unwrap_or_else(|payload| std::panic::resume_unwind(payload)))
                    .collect()
            })
        };

        let counts = shared
            .signatures
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);
        let mut report = RunReport::new(settings.seed);
        let mut found = Vec::new();
        for output in outputs {
            let output = output?;
            report.merge(output.report);
            found.extend(output.failures);
        }
        found.sort_by_key(|(seq, _, _)| *seq);
        for (_, signature, mut failure) in found {
            failure.occurrences = counts.get(&signature).copied().unwrap_or(1);
            report.merge(RunReport {
                failures: vec![failure],
                ..RunReport::default()
            });
        }

        tracing::info!(
            iterations = report.iterations,
            passed = report.passed,
            failed_cases = report.failed_cases,
            failures = report.failures.len(),
            stopped_early = report.stopped_early,
            cancelled = report.cancelled,
            "fuzzing finished"
        );
        Ok(report)
    }

    fn worker(&self, index: usize, shared: &Shared) -> Result<WorkerOutput, RunError> {
        let result = self.worker_loop(index, shared);
        if result.is_err() {
            shared.halt.store(true, Ordering::SeqCst);
        }
        result
    }

    fn worker_loop(&self, index: usize, shared: &Shared) -> Result<WorkerOutput, RunError> {
        let settings = &self.ctx.settings;
        let mut generator = CaseGenerator::new(Arc::clone(&self.ctx.spec), worker_seed(settings.seed, index))
            .with_negative_ratio(settings.negative_ratio);
        let mut output = WorkerOutput {
            report: RunReport::new(settings.seed),
            failures: Vec::new(),
        };

        loop {
            if self.ctx.cancel.is_cancelled() {
                output.report.cancelled = true;
                break;
            }
            if shared.halt.load(Ordering::SeqCst)
                || shared.claimed.fetch_add(1, Ordering::SeqCst) >= settings.iterations
            {
                break;
            }
            let Some(instance) = generator.next() else {
                break;
            };

            let execution = self.execute(&instance)?;
            let report = &mut output.report;
            report.iterations += 1;
            if let Some(status) = execution.result.status_code {
                *report.status_distribution.entry(status).or_default() += 1;
            }
            if !execution.result.is_failing() {
                report.passed += 1;
                continue;
            }
            report.failed_cases += 1;

            let signature = Signature {
                operation: instance.operation,
                validators: execution.result.failing_validators(),
            };
            {
                let mut seen = shared.signatures.lock().unwrap_or_else(PoisonError::into_inner);
                if let Some(count) = seen.get_mut(&signature) {
                    *count += 1;
                    continue;
                }
                seen.insert(signature.clone(), 1);
            }

            let seq = shared.next_id.fetch_add(1, Ordering::SeqCst);
            let failure = self.minimize(&instance, execution, format!("F{seq}"))?;
            tracing::info!(
                id = %failure.id,
                operation = %failure.operation(),
                kind = ?failure.kind,
                shrink_steps = failure.shrink.steps,
                "failure found"
            );
            output.failures.push((seq, signature, failure));

            if settings.stop_on_failure {
                shared.halt.store(true, Ordering::SeqCst);
                output.report.stopped_early = true;
                break;
            }
        }
        Ok(output)
    }

    /// Shrink a failing case and turn the smallest reproduction into a report entry.
    ///
    /// A candidate is accepted only while every validator that failed originally
    /// still fails, so the reported request keeps the whole signature.
    fn minimize(&self, instance: &CaseInstance, original: Execution, id: String) -> Result<Failure, RunError> {
        let operation = self
            .ctx
            .spec
            .operation(instance.operation)
            .ok_or(BuildError::UnknownOperation(instance.operation))?;
        let targets = original.result.failing_validators();

        let mut last_accepted: Option<Execution> = None;
        let mut fault: Option<RunError> = None;
        let outcome = shrink(&self.ctx.spec, instance, self.ctx.settings.shrink_budget, |candidate| {
            if fault.is_some() {
                return false;
            }
            match self.execute(candidate) {
                Ok(execution) => {
                    let failing = execution.result.failing_validators();
                    let still_failing = targets.iter().all(|t| failing.contains(t));
                    if still_failing {
                        last_accepted = Some(execution);
                    }
                    still_failing
                }
                Err(e) => {
                    fault = Some(e);
                    false
                }
            }
        });
        if let Some(e) = fault {
            return Err(e);
        }

        let original_curl = to_curl_command(&original.request);
        let reported = last_accepted.unwrap_or(original);
        let reproduction = to_curl_command(&reported.request);

        let mut failure = Failure::from_case(
            id,
            operation.method.as_str(),
            operation.path_template.as_str(),
            &reported.result,
            reported.request,
            reproduction,
        )
        .with_shrink(ShrinkStats {
            attempts: outcome.attempts,
            steps: outcome.steps,
            exhausted: outcome.exhausted,
        })
        .with_signature(targets)
        .with_context("seed", self.ctx.settings.seed.to_string());
        if outcome.steps > 0 {
            failure = failure.with_context("original_request", original_curl);
        }
        if let Some(deviation) = &outcome.instance.deviation {
            failure = failure.with_context("deviation", deviation.description.clone());
        }
        Ok(failure)
    }
}

fn worker_seed(seed: u64, index: usize) -> u64 {
    seed.wrapping_add((index as u64).wrapping_mul(WORKER_SEED_STRIDE))
}
