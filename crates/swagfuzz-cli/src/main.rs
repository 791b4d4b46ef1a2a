//! swagfuzz CLI - fuzz an HTTP API against its Swagger contract

mod logger;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};

use swagfuzz_core::config::parse_header;
use swagfuzz_core::{Config, Failure, RunReport, Verdict, VerdictPolicy, VerdictStatus, to_http_file};
use swagfuzz_runner::spec::{load_document, resolve_base_url};
use swagfuzz_runner::{CancelToken, Engine, RunContext, RunSettings, SpecModel};

const CONFIG_FILE: &str = ".swagfuzz.toml";

#[derive(Parser)]
#[command(name = "swagfuzz")]
#[command(about = "Fuzz-test an HTTP API against its Swagger/OpenAPI contract")]
#[command(version, args_conflicts_with_subcommands = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    fuzz: FuzzArgs,

    /// Output format
    #[arg(long, global = true, default_value = "terminal")]
    output: OutputFormat,

    /// Strict mode (warnings become errors)
    #[arg(long, global = true, default_value_t = true, action = ArgAction::Set)]
    strict: bool,

    /// Same as --strict false
    #[arg(long, global = true, conflicts_with = "strict")]
    no_strict: bool,

    /// Verbose output (debug logging)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Write an example .swagfuzz.toml
    Init,

    /// Print the JSON Schema of the JSON report
    Schema,
}

#[derive(Args)]
struct FuzzArgs {
    /// Swagger document URL; its scheme and host are the server under test
    #[arg(value_name = "SPEC_URL")]
    spec_url: Option<String>,

    /// Read the document from here instead (URL or local file)
    #[arg(short = 'r', long = "real-spec-url")]
    real_spec_url: Option<String>,

    /// Number of cases to generate
    #[arg(short = 'n', long = "number")]
    number: Option<u64>,

    /// Status code accepted for every operation (repeatable; replaces 200, 404, 405)
    #[arg(short = 's', long = "standard-http-code")]
    standard_http_code: Vec<u16>,

    /// Extra header sent with every request, as name:value (repeatable)
    #[arg(short = 'H', long = "header")]
    header: Vec<String>,

    /// Server to test (required when the spec is a local file)
    #[arg(long)]
    base_url: Option<String>,

    /// Seed for reproducible runs
    #[arg(long)]
    seed: Option<u64>,

    /// Re-executions spent minimizing each failing case
    #[arg(long)]
    shrink_budget: Option<u32>,

    /// Per-request timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Concurrent workers
    #[arg(long)]
    workers: Option<usize>,

    /// Stop after the first reported failure
    #[arg(long)]
    stop_on_failure: bool,

    /// Fraction of cases with one type-confused parameter (0.0-1.0)
    #[arg(long)]
    negative_ratio: Option<f64>,

    /// Response time limit in seconds
    #[arg(long)]
    response_time_limit: Option<f64>,

    /// Config file (default: .swagfuzz.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Write .http reproductions of the reported failures to this file
    #[arg(long)]
    http_file: Option<PathBuf>,
}

#[derive(Clone, Copy, ValueEnum, PartialEq, Eq)]
enum OutputFormat {
    Terminal,
    Json,
    Silent,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    logger::init_logging(cli.verbose);

    match run(cli) {
        Ok(code) => ExitCode::from(u8::try_from(code).unwrap_or(1)),
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::from(3)
        }
    }
}

fn run(cli: Cli) -> Result<i32> {
    match cli.command {
        Some(Commands::Init) => init(Path::new(CONFIG_FILE)),
        Some(Commands::Schema) => {
            println!("{}", swagfuzz_core::report::generate_schema());
            Ok(0)
        }
        None => {
            let strict = cli.strict && !cli.no_strict;
            fuzz(cli.fuzz, cli.output, strict)
        }
    }
}

fn init(path: &Path) -> Result<i32> {
    if path.exists() {
        eprintln!("{} already exists", path.display());
        return Ok(1);
    }
    std::fs::write(path, Config::example()).with_context(|| format!("writing {}", path.display()))?;
    println!("Created {}", path.display());
    println!("\nEdit the file to configure:");
    println!("  - spec: Swagger document URL");
    println!("  - base_url: server to test when the document is a local file");
    println!("  - headers: auth tokens, API keys");
    Ok(0)
}

impl FuzzArgs {
    /// Command-line values override the config file.
    fn merge_into(self, mut cfg: Config) -> Result<Config> {
        if self.spec_url.is_some() {
            cfg.spec = self.spec_url;
        }
        if self.real_spec_url.is_some() {
            cfg.real_spec = self.real_spec_url;
        }
        if self.base_url.is_some() {
            cfg.base_url = self.base_url;
        }
        if let Some(n) = self.number {
            cfg.iterations = n;
        }
        if !self.standard_http_code.is_empty() {
            cfg.standard_codes = self.standard_http_code;
        }
        for raw in &self.header {
            let (name, value) = parse_header(raw)?;
            cfg.headers.insert(name, value);
        }
        if self.seed.is_some() {
            cfg.seed = self.seed;
        }
        if let Some(budget) = self.shrink_budget {
            cfg.shrink_budget = budget;
        }
        if let Some(timeout) = self.timeout {
            cfg.timeout_secs = timeout;
        }
        if let Some(workers) = self.workers {
            cfg.workers = workers;
        }
        cfg.stop_on_failure |= self.stop_on_failure;
        if let Some(ratio) = self.negative_ratio {
            cfg.negative_ratio = ratio;
        }
        if self.response_time_limit.is_some() {
            cfg.response_time_limit = self.response_time_limit;
        }
        cfg.validate()?;
        Ok(cfg)
    }
}

fn fuzz(args: FuzzArgs, output: OutputFormat, strict: bool) -> Result<i32> {
    let file_cfg = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::load_default()?,
    };
    let http_file = args.http_file.clone();
    let cfg = args.merge_into(file_cfg)?;

    let Some(spec_url) = cfg.spec.clone() else {
        bail!("no Swagger document given: pass SPEC_URL or set `spec` in {CONFIG_FILE}");
    };
    let source = cfg.real_spec.clone().unwrap_or_else(|| spec_url.clone());
    let timeout = Duration::from_secs(cfg.timeout_secs);

    let document = load_document(&source, &cfg.headers, timeout)?;
    let model = SpecModel::from_document(&document).with_context(|| format!("loading {source}"))?;
    let base_url = resolve_base_url(Some(&spec_url), cfg.base_url.as_deref(), &model.base_path)?;
    let seed = cfg.seed.unwrap_or_else(rand::random);

    if output != OutputFormat::Silent {
        eprintln!("Config:");
        eprintln!("  spec:       {source}");
        eprintln!("  base_url:   {base_url}");
        eprintln!("  operations: {}", model.operations.len());
        eprintln!("  iterations: {}", cfg.iterations);
        eprintln!("  seed:       {seed}");
        if !cfg.headers.is_empty() {
            eprintln!("  headers:    {} configured", cfg.headers.len());
        }
        eprintln!();
    }

    let cancel = CancelToken::new();
    let on_interrupt = cancel.clone();
    ctrlc::set_handler(move || on_interrupt.cancel()).context("installing Ctrl-C handler")?;

    let settings = RunSettings::from_config(&cfg, base_url, seed);
    let ctx = RunContext::over_http(Arc::new(model), settings, timeout)?.with_cancel(cancel);

    let started = Instant::now();
    let mut report = Engine::new(ctx).run()?;
    let elapsed = started.elapsed();

    let policy = VerdictPolicy {
        strict,
        ..VerdictPolicy::default()
    };
    report.failures = policy.filter(std::mem::take(&mut report.failures));
    let verdict = policy.verdict(&report.failures, report.iterations);

    match output {
        OutputFormat::Terminal => print_terminal(&report, &verdict, elapsed),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Silent => {}
    }

    if let Some(path) = http_file {
        if !report.failures.is_empty() {
            std::fs::write(&path, to_http_file(&report.failures))
                .with_context(|| format!("writing {}", path.display()))?;
            if output != OutputFormat::Silent {
                eprintln!("Reproductions: {}", path.display());
            }
        }
    }

    Ok(verdict.exit_code)
}

fn print_terminal(report: &RunReport, verdict: &Verdict, elapsed: Duration) {
    let icon = if verdict.status == VerdictStatus::Pass { "PASS" } else { "FAIL" };
    println!("\n{icon}: {}", verdict.reason);
    println!(
        "  Cases: {} executed, {} passed, {} failing ({:.1}s, seed {})",
        report.iterations,
        report.passed,
        report.failed_cases,
        elapsed.as_secs_f64(),
        report.seed
    );
    if !report.status_distribution.is_empty() {
        println!("  Status: {}", format_distribution(report));
    }
    if report.cancelled {
        println!("  Interrupted before the iteration budget was spent");
    } else if report.stopped_early {
        println!("  Stopped at the first failure");
    }
    println!("  Exit code: {}", verdict.exit_code);

    if !report.failures.is_empty() {
        println!("\nFailures ({}):", report.failures.len());
        for failure in &report.failures {
            print_failure(failure);
        }
    }
}

fn print_failure(failure: &Failure) {
    let status = failure
        .status_code
        .map_or_else(|| "no response".to_string(), |s| s.to_string());
    println!(
        "  [{}] {} -> {status} ({}) x{}",
        failure.severity,
        failure.operation(),
        failure.kind,
        failure.occurrences
    );
    for violation in &failure.violations {
        println!("         {}: {}", violation.validator, violation.message);
    }
    if let Some(deviation) = failure.context.get("deviation") {
        println!("         invalid input: {deviation}");
    }
    println!("         {}", failure.reproduction);
}

/// `200×12, 404×3`
fn format_distribution(report: &RunReport) -> String {
    report
        .status_distribution
        .iter()
        .map(|(status, count)| format!("{status}×{count}"))
        .collect::<Vec<_>>()
        .join(", ")
}
