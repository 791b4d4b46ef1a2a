//! Declared responses and their compiled validation schemas

use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value, json};

use super::{Dialect, SpecError};
use super::schema::{SchemaError, declares_nullable};

/// What the document promises for one status code.
#[derive(Debug, Clone, Default)]
pub struct DeclaredResponse {
    pub schema: Option<ResponseSchema>,
    /// OpenAPI 3 per-response media types; empty for Swagger 2
    pub content_types: Vec<String>,
}

/// A response schema, compiled once at load time.
#[derive(Clone)]
pub struct ResponseSchema {
    /// Self-contained JSON Schema: definitions attached, `nullable` translated
    pub raw: Value,
    validator: Arc<jsonschema::Validator>,
}

impl fmt::Debug for ResponseSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseSchema").field("raw", &self.raw).finish_non_exhaustive()
    }
}

impl DeclaredResponse {
    pub(crate) fn parse(
        document: &Value,
        dialect: Dialect,
        response: &Value,
        location: &str,
    ) -> Result<Self, SpecError> {
        let (node, content_types) = match dialect {
            Dialect::Swagger2 => (response.get("schema"), Vec::new()),
            Dialect::OpenApi30 | Dialect::OpenApi31 => {
                let content = response.get("content").and_then(Value::as_object);
                let types = content
                    .map(|c| c.keys().cloned().collect())
                    .unwrap_or_default();
                let node = content.and_then(|c| {
                    c.iter()
                        .find(|(media, _)| media.contains("json"))
                        .or_else(|| c.iter().next())
                        .and_then(|(_, media)| media.get("schema"))
                });
                (node, types)
            }
        };

        let schema = node
            .map(|n| ResponseSchema::compile(document, dialect, n))
            .transpose()
            .map_err(|source| SpecError::Unsupported {
                location: location.to_string(),
                source,
            })?;
        Ok(Self {
            schema,
            content_types,
        })
    }
}

impl ResponseSchema {
    /// # Errors
    ///
    /// Returns `SchemaError::Unsupported` when the validator cannot compile the schema.
    pub(crate) fn compile(document: &Value, dialect: Dialect, node: &Value) -> Result<Self, SchemaError> {
        let mut root = Map::new();
        root.insert("allOf".into(), json!([translate(node)]));
        if let Some(definitions) = document.get("definitions") {
            root.insert("definitions".into(), translate_named(definitions));
        }
        if let Some(schemas) = document.pointer("/components/schemas") {
            root.insert("components".into(), json!({"schemas": translate_named(schemas)}));
        }
        let raw = Value::Object(root);

        let compiled = match dialect {
            Dialect::Swagger2 | Dialect::OpenApi30 => jsonschema::draft4::new(&raw),
            Dialect::OpenApi31 => jsonschema::draft202012::new(&raw),
        }
        .map_err(|e| SchemaError::Unsupported(format!("response schema: {e}")))?;

        Ok(Self {
            raw,
            validator: Arc::new(compiled),
        })
    }

    /// Up to `limit` violation messages; empty when `instance` conforms.
    #[must_use]
    pub fn violations(&self, instance: &Value, limit: usize) -> Vec<String> {
        self.validator
            .iter_errors(instance)
            .take(limit)
            .map(|e| e.to_string())
            .collect()
    }
}

/// Rewrite OpenAPI-isms into plain JSON Schema: `nullable` becomes
/// `anyOf [.., null]`, `type: file` accepts anything. Property and
/// definition names are left alone.
fn translate(node: &Value) -> Value {
    match node {
        Value::Object(map) => {
            let mut out = Map::new();
            for (key, value) in map {
                match key.as_str() {
                    "nullable" | "x-nullable" => {}
                    "type" if value == "file" => {}
                    "example" | "examples" | "enum" | "default" | "const" => {
                        out.insert(key.clone(), value.clone());
                    }
                    "properties" | "patternProperties" | "definitions" | "$defs" => {
                        out.insert(key.clone(), translate_named(value));
                    }
                    _ => {
                        out.insert(key.clone(), translate(value));
                    }
                }
            }
            if declares_nullable(node) {
                json!({"anyOf": [Value::Object(out), {"type": "null"}]})
            } else {
                Value::Object(out)
            }
        }
        Value::Array(items) => Value::Array(items.iter().map(translate).collect()),
        other => other.clone(),
    }
}

/// Translate a name → schema map; the names are never keywords.
fn translate_named(node: &Value) -> Value {
    match node {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(name, schema)| (name.clone(), translate(schema)))
                .collect(),
        ),
        other => other.clone(),
    }
}
