//! Reproduction formatting - curl commands and .http files

use crate::request::PreparedRequest;
use crate::verdict::Failure;

/// Render a request as a copy-pasteable curl command.
///
/// `curl -i -X METHOD -H 'Name: value' ... --data-binary 'body' 'url'`; the
/// body flag is left out when the request has no body. Every argument is
/// single-quoted. An empty header value is written `-H 'Name;'`, since curl
/// drops a header given as `Name:`. `--data-binary` sends the body verbatim:
/// no `@file` lookup, CR/LF kept.
#[must_use]
pub fn to_curl_command(request: &PreparedRequest) -> String {
    let mut parts = vec![
        "curl".to_string(),
        "-i".to_string(),
        "-X".to_string(),
        request.method.clone(),
    ];

    for (name, value) in &request.headers {
        parts.push("-H".to_string());
        if value.is_empty() {
            parts.push(shell_quote(&format!("{name};")));
        } else {
            parts.push(shell_quote(&format!("{name}: {value}")));
        }
    }

    if let Some(body) = request.body.as_deref().filter(|b| !b.is_empty()) {
        parts.push("--data-binary".to_string());
        parts.push(shell_quote(body));
    }

    parts.push(shell_quote(&request.url));
    parts.join(" ")
}

/// POSIX single-quote escaping: `it's` → `'it'\''s'`
fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

/// Generate .http file content from failures
#[must_use]
pub fn to_http_file(failures: &[Failure]) -> String {
    let mut lines = Vec::new();

    lines.push(format!(
        "# Auto-generated reproduction cases ({} failures)",
        failures.len()
    ));
    lines.push(String::new());

    for (idx, failure) in failures.iter().enumerate() {
        let status = failure
            .status_code
            .map_or_else(|| "no response".to_string(), |s| s.to_string());
        lines.push(format!(
            "### [{idx}] {} - {} {} -> {status}",
            failure.severity,
            failure.operation(),
            failure.kind
        ));
        lines.push(format!("# ID: {}", failure.id));
        for v in &failure.violations {
            lines.push(format!("# {}: {}", v.validator, v.message.replace('\n', " ")));
        }
        lines.push(request_to_http(&failure.request));
        lines.push(String::new());
    }

    lines.join("\n")
}

/// Generate a single request in .http format
#[must_use]
pub fn request_to_http(request: &PreparedRequest) -> String {
    let mut lines = vec![request.request_line()];

    for (key, value) in &request.headers {
        if !matches!(key.to_lowercase().as_str(), "host" | "content-length") {
            lines.push(format!("{key}: {value}"));
        }
    }

    if let Some(body) = &request.body {
        lines.push(String::new());
        lines.push(body.clone());
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::verdict::{CaseResult, FailureKind, ValidationOutcome};

    fn post_request() -> PreparedRequest {
        let mut req = PreparedRequest::new("POST", "http://localhost:8080/v1/pets?limit=3");
        req.set_header("Authorization", "Bearer token");
        req.set_header("Content-Type", "application/json");
        req.body = Some(r#"{"name":"o'neil"}"#.to_string());
        req
    }

    #[test]
    fn curl_command_format() {
        insta::assert_snapshot!(
            to_curl_command(&post_request()),
            @r#"curl -i -X POST -H 'Authorization: Bearer token' -H 'Content-Type: application/json' --data-binary '{"name":"o'\''neil"}' 'http://localhost:8080/v1/pets?limit=3'"#
        );
    }

    #[test]
    fn curl_without_body_or_headers() {
        let req = PreparedRequest::new("GET", "http://localhost/pets/1");
        assert_eq!(
            to_curl_command(&req),
            "curl -i -X GET 'http://localhost/pets/1'"
        );
    }

    #[test]
    fn curl_sends_empty_header_values() {
        let mut req = PreparedRequest::new("GET", "http://localhost/x");
        req.set_header("X-Trace", "");
        assert_eq!(
            to_curl_command(&req),
            "curl -i -X GET -H 'X-Trace;' 'http://localhost/x'"
        );
    }

    #[test]
    fn curl_body_is_sent_verbatim() {
        let mut req = PreparedRequest::new("POST", "http://localhost/notes");
        req.set_header("Content-Type", "text/plain");
        req.body = Some("@notes.txt\r\nline two".to_string());
        let cmd = to_curl_command(&req);
        assert!(cmd.contains("--data-binary '@notes.txt\r\nline two'"), "{cmd}");
        assert!(!cmd.contains(" -d "));
    }

    #[test]
    fn curl_is_deterministic() {
        let req = post_request();
        assert_eq!(to_curl_command(&req), to_curl_command(&req.clone()));
    }

    #[test]
    fn shell_quote_escapes_single_quotes() {
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
        assert_eq!(shell_quote(""), "''");
    }

    #[test]
    fn http_file_contains_request_and_violations() {
        let result = CaseResult {
            status_code: Some(500),
            outcomes: vec![ValidationOutcome::fail(
                "status_code",
                FailureKind::ServerError,
                "500 not in declared [200]",
            )],
        };
        let req = post_request();
        let failure = Failure::from_case("f1", "POST", "/pets", &result, req.clone(), to_curl_command(&req));
        let output = to_http_file(&[failure]);

        assert!(output.contains("# Auto-generated reproduction cases (1 failures)"));
        assert!(output.contains("### [0] critical - POST /pets"));
        assert!(output.contains("# status_code: 500 not in declared [200]"));
        assert!(output.contains("POST http://localhost:8080/v1/pets?limit=3"));
        assert!(output.contains("Authorization: Bearer token"));
        assert!(output.contains(r#"{"name":"o'neil"}"#));
    }

    #[test]
    fn request_to_http_skips_host_header() {
        let mut req = PreparedRequest::new("GET", "http://localhost/api");
        req.set_header("Host", "localhost");
        req.set_header("Accept", "*/*");
        let output = request_to_http(&req);
        assert!(!output.contains("Host:"));
        assert!(output.contains("Accept: */*"));
    }
}
