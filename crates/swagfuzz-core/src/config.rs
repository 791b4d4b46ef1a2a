//! Run configuration for Swagger fuzzing
//!
//! Loaded from `.swagfuzz.toml` (or JSON); command-line flags override file values.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Status codes accepted for every operation without being declared.
pub const DEFAULT_STANDARD_CODES: [u16; 3] = [200, 404, 405];

/// Project configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Swagger spec URL (its host is the server under test) or local path
    #[serde(default)]
    pub spec: Option<String>,

    /// Where the document is actually read from, when it is served separately
    #[serde(default)]
    pub real_spec: Option<String>,

    /// Server to test; required when `spec` is a local path
    #[serde(default)]
    pub base_url: Option<String>,

    /// Maximum number of generated cases
    #[serde(default = "default_iterations")]
    pub iterations: u64,

    /// Status codes that need not be declared per operation
    #[serde(default = "default_standard_codes")]
    pub standard_codes: Vec<u16>,

    /// Extra HTTP headers sent with every request (and the spec download)
    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Maximum re-executions spent minimizing one failing case
    #[serde(default = "default_shrink_budget")]
    pub shrink_budget: u32,

    /// Random seed (random when absent)
    #[serde(default)]
    pub seed: Option<u64>,

    /// Halt after the first reported failure
    #[serde(default)]
    pub stop_on_failure: bool,

    /// Concurrent workers
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Fraction of cases carrying one deliberately type-confused parameter
    #[serde(default)]
    pub negative_ratio: f64,

    /// Response time limit in seconds (disabled by default)
    #[serde(default)]
    pub response_time_limit: Option<f64>,
}

const fn default_iterations() -> u64 {
    1_000_000
}

fn default_standard_codes() -> Vec<u16> {
    DEFAULT_STANDARD_CODES.to_vec()
}

const fn default_timeout_secs() -> u64 {
    10
}

const fn default_shrink_budget() -> u32 {
    500
}

const fn default_workers() -> usize {
    1
}

impl Default for Config {
    fn default() -> Self {
        Self {
            spec: None,
            real_spec: None,
            base_url: None,
            iterations: default_iterations(),
            standard_codes: default_standard_codes(),
            headers: BTreeMap::new(),
            timeout_secs: default_timeout_secs(),
            shrink_budget: default_shrink_budget(),
            seed: None,
            stop_on_failure: false,
            workers: default_workers(),
            negative_ratio: 0.0,
            response_time_limit: None,
        }
    }
}

impl Config {
    /// Load config from file
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read or parsed
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e.to_string()))?;

        let config: Self = if path.extension().is_some_and(|ext| ext == "json") {
            serde_json::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?
        } else {
            toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?
        };
        config.validate()?;
        Ok(config)
    }

    /// Load from default location (.swagfuzz.toml)
    ///
    /// # Errors
    ///
    /// Returns error if a candidate file exists but cannot be loaded
    pub fn load_default() -> Result<Self, ConfigError> {
        load_first_of(&[".swagfuzz.toml", ".swagfuzz.json", "swagfuzz.toml"])
    }

    /// Reject values the runner cannot work with.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` naming the offending field
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::Invalid("workers must be at least 1".into()));
        }
        if self.timeout_secs == 0 {
            return Err(ConfigError::Invalid("timeout_secs must be at least 1".into()));
        }
        if !(0.0..=1.0).contains(&self.negative_ratio) {
            return Err(ConfigError::Invalid(format!(
                "negative_ratio must be within 0.0..=1.0, got {}",
                self.negative_ratio
            )));
        }
        if let Some(limit) = self.response_time_limit {
            if !(limit > 0.0) {
                return Err(ConfigError::Invalid(format!(
                    "response_time_limit must be positive, got {limit}"
                )));
            }
        }
        if self.standard_codes.iter().any(|c| !(100..=599).contains(c)) {
            return Err(ConfigError::Invalid(format!(
                "standard_codes must be HTTP status codes, got {:?}",
                self.standard_codes
            )));
        }
        Ok(())
    }

    /// Example config file content
    #[must_use]
    pub const fn example() -> &'static str {
        r#"# swagfuzz configuration

# Swagger spec URL; its scheme and host are the server under test
spec = "http://localhost:8080/v1/swagger.json"

# Read the document from somewhere else (URL or local file)
# real_spec = "./swagger.json"

# Server to test when `spec` is a local file
# base_url = "http://localhost:8080"

# Maximum number of generated cases
iterations = 10000

# Status codes accepted for any operation without being declared
standard_codes = [200, 404, 405]

# Seed for reproducible runs (random when absent)
# seed = 42

# Per-request timeout (seconds); a timeout is reported as a failure
timeout_secs = 10

# Re-executions spent minimizing each failing case
shrink_budget = 500

# Halt after the first reported failure
stop_on_failure = false

# Concurrent workers
workers = 1

# Fraction of cases with one deliberately type-confused parameter (0 = off)
negative_ratio = 0.0

# Response time limit in seconds (disabled by default)
# response_time_limit = 2.0

# Extra headers (auth tokens, API keys)
[headers]
# Authorization = "Bearer your-token-here"
"#
    }
}

fn load_first_of(candidates: &[&str]) -> Result<Config, ConfigError> {
    for name in candidates {
        let path = Path::new(name);
        if path.exists() {
            return Config::load(path);
        }
    }
    Ok(Config::default())
}

/// Parse a `name:value` header argument. Whitespace around both parts is trimmed.
///
/// # Errors
///
/// Returns error if there is no `:` or the name is empty
pub fn parse_header(raw: &str) -> Result<(String, String), ConfigError> {
    let (name, value) = raw
        .split_once(':')
        .ok_or_else(|| ConfigError::Invalid(format!("header '{raw}' is not name:value")))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(ConfigError::Invalid(format!("header '{raw}' has an empty name")));
    }
    Ok((name.to_string(), value.trim().to_string()))
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Cannot read {0}: {1}")]
    Io(PathBuf, String),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Invalid config: {0}")]
    Invalid(String),
}
