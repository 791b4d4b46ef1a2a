//! Reading the API description from a URL or a local file

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde_json::Value;

use super::SpecError;

/// True when `location` should be fetched over HTTP rather than read from disk.
#[must_use]
pub fn is_url(location: &str) -> bool {
    location.contains("://")
}

/// Fetch or read the document at `location` and parse it as JSON or YAML.
///
/// `headers` are sent with the download (auth for protected docs).
///
/// # Errors
///
/// `SpecError::Fetch`/`SpecError::Io` when it cannot be retrieved,
/// `SpecError::Parse` when it is neither JSON nor YAML.
pub fn load_document(
    location: &str,
    headers: &BTreeMap<String, String>,
    timeout: Duration,
) -> Result<Value, SpecError> {
    let content = if is_url(location) {
        fetch(location, headers, timeout)?
    } else {
        std::fs::read_to_string(location).map_err(|e| SpecError::Io {
            location: location.to_string(),
            message: e.to_string(),
        })?
    };
    tracing::debug!(location, bytes = content.len(), "spec document loaded");
    parse_document(location, &content)
}

fn fetch(url: &str, headers: &BTreeMap<String, String>, timeout: Duration) -> Result<String, SpecError> {
    let fetch_error = |message: String| SpecError::Fetch {
        location: url.to_string(),
        message,
    };
    let client = reqwest::blocking::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| fetch_error(e.to_string()))?;

    let mut request = client.get(url);
    for (name, value) in headers {
        request = request.header(name.as_str(), value.as_str());
    }
    let response = request
        .send()
        .and_then(reqwest::blocking::Response::error_for_status)
        .map_err(|e| fetch_error(e.to_string()))?;
    response.text().map_err(|e| fetch_error(e.to_string()))
}

/// Parse by extension (`.json`, `.yaml`/`.yml`), sniffing the content otherwise.
///
/// # Errors
///
/// Returns `SpecError::Parse` if the content is not valid in the chosen format.
pub fn parse_document(name: &str, content: &str) -> Result<Value, SpecError> {
    let path = name.split(['?', '#']).next().unwrap_or(name);
    let ext = Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    let as_json = |content: &str| {
        serde_json::from_str::<Value>(content).map_err(|e| SpecError::Parse(format!("Invalid JSON: {e}")))
    };
    let as_yaml = |content: &str| {
        serde_yml::from_str::<Value>(content).map_err(|e| SpecError::Parse(format!("Invalid YAML: {e}")))
    };

    match ext.as_str() {
        "yaml" | "yml" => as_yaml(content),
        "json" => as_json(content),
        _ if content.trim_start().starts_with('{') => as_json(content),
        _ => as_yaml(content),
    }
}

/// Root URL requests are sent to: the explicit base URL, else the origin of
/// the spec URL, followed by `base_path`, with no trailing `/`.
///
/// An explicit base URL keeps its own path; a spec URL contributes only its origin.
///
/// # Errors
///
/// Returns `SpecError::Invalid` if there is no server to target or it is not a URL.
pub fn resolve_base_url(
    spec_url: Option<&str>,
    explicit: Option<&str>,
    base_path: &str,
) -> Result<String, SpecError> {
    let root = match (explicit, spec_url.filter(|s| is_url(s))) {
        (Some(base), _) => {
            url::Url::parse(base)
                .map_err(|e| SpecError::Invalid(format!("base URL '{base}': {e}")))?;
            base.trim_end_matches('/').to_string()
        }
        (None, Some(spec)) => {
            let parsed = url::Url::parse(spec)
                .map_err(|e| SpecError::Invalid(format!("spec URL '{spec}': {e}")))?;
            parsed.origin().ascii_serialization()
        }
        (None, None) => {
            return Err(SpecError::Invalid(
                "no server to test: the spec is a local file and no base URL was given".into(),
            ));
        }
    };
    Ok(format!("{root}{}", base_path.trim_end_matches('/')))
}
