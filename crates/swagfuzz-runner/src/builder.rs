//! Case instance → concrete HTTP request
//!
//! Pure and deterministic: the same instance always yields the same request.

use std::collections::BTreeMap;

use serde_json::Value;
use swagfuzz_core::PreparedRequest;
use url::form_urlencoded;

use crate::generator::CaseInstance;
use crate::spec::{CollectionFormat, ParamLocation, Parameter, Schema, SpecModel};

/// Fixed so identical instances produce byte-identical multipart bodies.
pub const MULTIPART_BOUNDARY: &str = "swagfuzz-boundary-7MA4YWxkTrZu0gW";

const DEFAULT_MEDIA_TYPE: &str = "application/json";
const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";
const MULTIPART: &str = "multipart/form-data";

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum BuildError {
    #[error("No operation at index {0}")]
    UnknownOperation(usize),
    #[error("{operation}: expected {expected} parameter values, got {actual}")]
    Arity {
        operation: String,
        expected: usize,
        actual: usize,
    },
    #[error("{operation}: path parameter '{name}' has no value")]
    MissingPathValue { operation: String, name: String },
}

/// Text form of a single value: strings unquoted, `null` empty, the rest as JSON.
#[must_use]
pub fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Text form of a parameter value; arrays are joined per the collection format.
#[must_use]
pub fn param_text(value: &Value, format: CollectionFormat) -> String {
    match value {
        Value::Array(items) => items
            .iter()
            .map(scalar_text)
            .collect::<Vec<_>>()
            .join(format.separator()),
        other => scalar_text(other),
    }
}

/// Percent-encode one path segment; `/` and spaces included.
fn encode_path_segment(text: &str) -> String {
    form_urlencoded::byte_serialize(text.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}

fn is_valid_header(name: &str, value: &str) -> bool {
    reqwest::header::HeaderName::from_bytes(name.as_bytes()).is_ok()
        && reqwest::header::HeaderValue::from_str(value).is_ok()
}

/// Build the request for `instance` against `base_url`.
///
/// Header parameters are set first, then `Content-Type`, then
/// `extra_headers`, which win on a case-insensitive name clash. Header
/// values HTTP cannot carry are left out.
///
/// # Errors
///
/// Returns `BuildError` if the instance does not fit its operation.
pub fn build_request(
    spec: &SpecModel,
    instance: &CaseInstance,
    base_url: &str,
    extra_headers: &BTreeMap<String, String>,
) -> Result<PreparedRequest, BuildError> {
    let op = spec
        .operation(instance.operation)
        .ok_or(BuildError::UnknownOperation(instance.operation))?;
    if instance.values.len() != op.parameters.len() {
        return Err(BuildError::Arity {
            operation: op.label(),
            expected: op.parameters.len(),
            actual: instance.values.len(),
        });
    }

    let present = || {
        op.parameters
            .iter()
            .zip(&instance.values)
            .filter_map(|(param, value)| value.as_ref().map(|v| (param, v)))
    };

    // ── Path ──
    let mut path = op.path_template.clone();
    for param in op.parameters.iter().filter(|p| p.location == ParamLocation::Path) {
        let value = present()
            .find(|(p, _)| std::ptr::eq(*p, param))
            .map(|(_, v)| v)
            .ok_or_else(|| BuildError::MissingPathValue {
                operation: op.label(),
                name: param.name.clone(),
            })?;
        let segment = encode_path_segment(&param_text(value, param.collection_format));
        path = path.replace(&format!("{{{}}}", param.name), &segment);
    }

    // ── Query ──
    let mut query = form_urlencoded::Serializer::new(String::new());
    let mut has_query = false;
    for (param, value) in present().filter(|(p, _)| p.location == ParamLocation::Query) {
        for text in pair_values(param, value) {
            query.append_pair(&param.name, &text);
            has_query = true;
        }
    }
    let mut url = format!("{}{path}", base_url.trim_end_matches('/'));
    if has_query {
        url.push('?');
        url.push_str(&query.finish());
    }

    let mut request = PreparedRequest::new(op.method.as_str(), url);

    // ── Headers ──
    for (param, value) in present().filter(|(p, _)| p.location == ParamLocation::Header) {
        let text = param_text(value, param.collection_format);
        if is_valid_header(&param.name, &text) {
            request.set_header(param.name.clone(), text);
        } else {
            tracing::debug!(header = %param.name, "dropping header value HTTP cannot carry");
        }
    }

    // ── Body ──
    let body = present().find(|(p, _)| p.location == ParamLocation::Body);
    let form: Vec<(&Parameter, &Value)> = present()
        .filter(|(p, _)| p.location == ParamLocation::FormData)
        .collect();
    if let Some((_, value)) = body {
        let media = op.consumes.first().map_or(DEFAULT_MEDIA_TYPE, String::as_str);
        request.set_header("Content-Type", media);
        request.body = Some(encode_body(media, value));
    } else if !form.is_empty() {
        let multipart = form.iter().any(|(p, _)| matches!(p.schema, Schema::File))
            || op
                .consumes
                .iter()
                .find(|m| m.starts_with(MULTIPART) || m.starts_with(FORM_URLENCODED))
                .is_some_and(|m| m.starts_with(MULTIPART));
        if multipart {
            request.set_header(
                "Content-Type",
                format!("{MULTIPART}; boundary={MULTIPART_BOUNDARY}"),
            );
            request.body = Some(encode_multipart(&form));
        } else {
            let mut encoded = form_urlencoded::Serializer::new(String::new());
            for (param, value) in &form {
                for text in pair_values(param, value) {
                    encoded.append_pair(&param.name, &text);
                }
            }
            request.set_header("Content-Type", FORM_URLENCODED);
            request.body = Some(encoded.finish());
        }
    }

    for (name, value) in extra_headers {
        if is_valid_header(name, value) {
            request.set_header(name.clone(), value.clone());
        } else {
            tracing::debug!(header = %name, "dropping extra header HTTP cannot carry");
        }
    }

    Ok(request)
}

/// `multi` arrays become one pair per element; everything else one joined pair.
fn pair_values(param: &Parameter, value: &Value) -> Vec<String> {
    match (param.collection_format, value) {
        (CollectionFormat::Multi, Value::Array(items)) => items.iter().map(scalar_text).collect(),
        (format, other) => vec![param_text(other, format)],
    }
}

fn encode_body(media: &str, value: &Value) -> String {
    match value {
        Value::Object(map) if media.starts_with(FORM_URLENCODED) => {
            let mut encoded = form_urlencoded::Serializer::new(String::new());
            for (key, v) in map {
                encoded.append_pair(key, &scalar_text(v));
            }
            encoded.finish()
        }
        Value::String(text) if media.starts_with("text/") => text.clone(),
        other => other.to_string(),
    }
}

fn encode_multipart(form: &[(&Parameter, &Value)]) -> String {
    let mut body = String::new();
    for (param, value) in form {
        body.push_str(&format!("--{MULTIPART_BOUNDARY}\r\n"));
        if matches!(param.schema, Schema::File) {
            body.push_str(&format!(
                "Content-Disposition: form-data; name=\"{0}\"; filename=\"{0}.bin\"\r\nContent-Type: application/octet-stream\r\n\r\n",
                param.name
            ));
        } else {
            body.push_str(&format!(
                "Content-Disposition: form-data; name=\"{}\"\r\n\r\n",
                param.name
            ));
        }
        body.push_str(&param_text(value, param.collection_format));
        body.push_str("\r\n");
    }
    body.push_str(&format!("--{MULTIPART_BOUNDARY}--\r\n"));
    body
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn spec() -> SpecModel {
        SpecModel::from_document(&json!({
            "swagger": "2.0",
            "paths": {
                "/pets/{petId}/photos/{name}": {"get": {
                    "parameters": [
                        {"name": "petId", "in": "path", "required": true, "type": "integer"},
                        {"name": "name", "in": "path", "required": true, "type": "string"},
                        {"name": "tags", "in": "query", "type": "array", "items": {"type": "string"}},
                        {"name": "ids", "in": "query", "type": "array", "items": {"type": "integer"}, "collectionFormat": "multi"},
                        {"name": "q", "in": "query", "type": "string"},
                        {"name": "X-Request-Id", "in": "header", "type": "string"}
                    ],
                    "responses": {"200": {"description": "ok"}}
                }},
                "/pets": {"post": {
                    "consumes": ["application/json"],
                    "parameters": [{"name": "pet", "in": "body", "schema": {"type": "object"}}],
                    "responses": {"201": {"description": "created"}}
                }},
                "/upload": {"post": {
                    "consumes": ["multipart/form-data"],
                    "parameters": [
                        {"name": "note", "in": "formData", "type": "string"},
                        {"name": "file", "in": "formData", "type": "file"}
                    ],
                    "responses": {"200": {"description": "ok"}}
                }},
                "/login": {"post": {
                    "consumes": ["application/x-www-form-urlencoded"],
                    "parameters": [
                        {"name": "user", "in": "formData", "type": "string"},
                        {"name": "pass", "in": "formData", "type": "string"}
                    ],
                    "responses": {"200": {"description": "ok"}}
                }}
            }
        }))
        .unwrap()
    }

    fn instance(operation: usize, values: Vec<Option<Value>>) -> CaseInstance {
        CaseInstance {
            operation,
            values,
            deviation: None,
        }
    }

    fn no_headers() -> BTreeMap<String, String> {
        BTreeMap::new()
    }

    #[test]
    fn path_values_are_escaped() {
        let case = instance(
            0,
            vec![Some(json!(42)), Some(json!("a b/c?")), None, None, None, None],
        );
        let req = build_request(&spec(), &case, "http://localhost:8080/v1/", &no_headers()).unwrap();
        assert_eq!(req.method, "GET");
        assert_eq!(req.url, "http://localhost:8080/v1/pets/42/photos/a%20b%2Fc%3F");
        assert!(req.body.is_none());
    }

    #[test]
    fn query_in_declared_order_with_collection_formats() {
        let case = instance(
            0,
            vec![
                Some(json!(1)),
                Some(json!("x")),
                Some(json!(["red", "big dog"])),
                Some(json!([3, 4])),
                Some(json!("a&b")),
                None,
            ],
        );
        let req = build_request(&spec(), &case, "http://h", &no_headers()).unwrap();
        assert_eq!(
            req.url,
            "http://h/pets/1/photos/x?tags=red%2Cbig+dog&ids=3&ids=4&q=a%26b"
        );
    }

    #[test]
    fn extra_headers_override_header_parameters() {
        let case = instance(
            0,
            vec![Some(json!(1)), Some(json!("x")), None, None, None, Some(json!("generated"))],
        );
        let mut extra = BTreeMap::new();
        extra.insert("x-request-id".to_string(), "fixed".to_string());
        extra.insert("Authorization".to_string(), "Bearer t".to_string());
        let req = build_request(&spec(), &case, "http://h", &extra).unwrap();
        assert_eq!(req.header("X-Request-Id"), Some("fixed"));
        assert_eq!(req.header("authorization"), Some("Bearer t"));
        assert_eq!(req.headers.len(), 2);
    }

    #[test]
    fn invalid_header_values_are_dropped() {
        let case = instance(
            0,
            vec![Some(json!(1)), Some(json!("x")), None, None, None, Some(json!("line\r\nbreak"))],
        );
        let req = build_request(&spec(), &case, "http://h", &no_headers()).unwrap();
        assert!(req.header("X-Request-Id").is_none());
    }

    #[test]
    fn json_body_with_content_type() {
        let case = instance(1, vec![Some(json!({"name": "rex", "age": 3}))]);
        let req = build_request(&spec(), &case, "http://h", &no_headers()).unwrap();
        assert_eq!(req.method, "POST");
        assert_eq!(req.header("Content-Type"), Some("application/json"));
        assert_eq!(req.body.as_deref(), Some(r#"{"name":"rex","age":3}"#));
    }

    #[test]
    fn omitted_body_sends_nothing() {
        let req = build_request(&spec(), &instance(1, vec![None]), "http://h", &no_headers()).unwrap();
        assert!(req.body.is_none());
        assert!(req.header("Content-Type").is_none());
    }

    #[test]
    fn multipart_form_with_file() {
        let case = instance(2, vec![Some(json!("hi")), Some(json!("payload"))]);
        let req = build_request(&spec(), &case, "http://h", &no_headers()).unwrap();
        assert_eq!(
            req.header("Content-Type"),
            Some(format!("multipart/form-data; boundary={MULTIPART_BOUNDARY}").as_str())
        );
        let body = req.body.unwrap();
        assert!(body.contains("name=\"note\"\r\n\r\nhi\r\n"));
        assert!(body.contains("filename=\"file.bin\""));
        assert!(body.ends_with(&format!("--{MULTIPART_BOUNDARY}--\r\n")));
    }

    #[test]
    fn urlencoded_form() {
        let case = instance(3, vec![Some(json!("ann")), Some(json!("p w"))]);
        let req = build_request(&spec(), &case, "http://h", &no_headers()).unwrap();
        assert_eq!(req.header("Content-Type"), Some(FORM_URLENCODED));
        assert_eq!(req.body.as_deref(), Some("user=ann&pass=p+w"));
    }

    #[test]
    fn building_is_idempotent() {
        let case = instance(
            0,
            vec![Some(json!(7)), Some(json!("ü")), Some(json!(["a"])), None, Some(json!("q")), Some(json!("id"))],
        );
        let first = build_request(&spec(), &case, "http://h", &no_headers()).unwrap();
        let second = build_request(&spec(), &case, "http://h", &no_headers()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn unknown_operation_and_arity() {
        let err = build_request(&spec(), &instance(9, vec![]), "http://h", &no_headers()).unwrap_err();
        assert_eq!(err, BuildError::UnknownOperation(9));
        let err = build_request(&spec(), &instance(1, vec![]), "http://h", &no_headers()).unwrap_err();
        assert!(matches!(err, BuildError::Arity { expected: 1, actual: 0, .. }));
    }

    #[test]
    fn missing_path_value_is_an_error() {
        let case = instance(0, vec![None, Some(json!("x")), None, None, None, None]);
        let err = build_request(&spec(), &case, "http://h", &no_headers()).unwrap_err();
        assert!(matches!(err, BuildError::MissingPathValue { .. }));
    }

    #[test]
    fn text_forms() {
        assert_eq!(scalar_text(&json!("abc")), "abc");
        assert_eq!(scalar_text(&json!(null)), "");
        assert_eq!(scalar_text(&json!(1.5)), "1.5");
        assert_eq!(param_text(&json!([1, 2]), CollectionFormat::Pipes), "1|2");
        assert_eq!(param_text(&json!(["a", "b"]), CollectionFormat::Ssv), "a b");
    }
}
