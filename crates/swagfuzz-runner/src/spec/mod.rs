//! Spec model - the operations of a Swagger 2 / OpenAPI 3 document
//!
//! Built once, immutable afterwards, shared by every worker.

mod loader;
mod responses;
pub mod schema;

use std::collections::BTreeMap;
use std::fmt;

use serde_json::{Map, Value};

pub use loader::{load_document, parse_document, resolve_base_url};
pub use responses::{DeclaredResponse, ResponseSchema};
pub use schema::{Schema, SchemaError, SchemaParser};

use schema::resolve_pointer;

/// The request-shaping model of one API description.
#[derive(Debug)]
pub struct SpecModel {
    /// Prefix prepended to every path template, without a trailing `/`
    pub base_path: String,
    pub operations: Vec<Operation>,
}

#[derive(Debug)]
pub struct Operation {
    pub method: HttpMethod,
    pub path_template: String,
    pub operation_id: Option<String>,
    pub parameters: Vec<Parameter>,
    /// Request media types, first one preferred
    pub consumes: Vec<String>,
    /// Response media types declared for the whole operation (Swagger 2)
    pub produces: Vec<String>,
    pub responses: BTreeMap<u16, DeclaredResponse>,
    /// OpenAPI 3 range keys such as `4XX`, stored as the leading digit
    pub response_classes: Vec<u16>,
    /// A `default` response accepts any status
    pub has_default_response: bool,
}

#[derive(Debug, Clone)]
pub struct Parameter {
    pub name: String,
    pub location: ParamLocation,
    pub schema: Schema,
    pub required: bool,
    pub collection_format: CollectionFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamLocation {
    Path,
    Query,
    Header,
    Body,
    FormData,
}

/// How array parameters are serialized outside a body.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CollectionFormat {
    #[default]
    Csv,
    Ssv,
    Tsv,
    Pipes,
    /// One `name=value` pair per element (query and form only)
    Multi,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum HttpMethod {
    Get,
    Put,
    Post,
    Delete,
    Options,
    Head,
    Patch,
}

#[derive(Debug, thiserror::Error)]
pub enum SpecError {
    #[error("Cannot read {location}: {message}")]
    Io { location: String, message: String },
    #[error("Cannot fetch {location}: {message}")]
    Fetch { location: String, message: String },
    #[error("Cannot parse document: {0}")]
    Parse(String),
    #[error("Invalid document: {0}")]
    Invalid(String),
    #[error("{method} {path}: {message}")]
    PathTemplate {
        method: HttpMethod,
        path: String,
        message: String,
    },
    #[error("{location}: unsupported schema: {source}")]
    Unsupported {
        location: String,
        #[source]
        source: SchemaError,
    },
}

/// Draft the response schemas are written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Dialect {
    Swagger2,
    OpenApi30,
    OpenApi31,
}

impl HttpMethod {
    /// Every method a path item may carry, in the order operations are listed.
    pub const ALL: [Self; 7] = [
        Self::Get,
        Self::Put,
        Self::Post,
        Self::Delete,
        Self::Options,
        Self::Head,
        Self::Patch,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Put => "PUT",
            Self::Post => "POST",
            Self::Delete => "DELETE",
            Self::Options => "OPTIONS",
            Self::Head => "HEAD",
            Self::Patch => "PATCH",
        }
    }

    const fn key(self) -> &'static str {
        match self {
            Self::Get => "get",
            Self::Put => "put",
            Self::Post => "post",
            Self::Delete => "delete",
            Self::Options => "options",
            Self::Head => "head",
            Self::Patch => "patch",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ParamLocation {
    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "path" => Some(Self::Path),
            "query" => Some(Self::Query),
            "header" => Some(Self::Header),
            "body" => Some(Self::Body),
            "formData" => Some(Self::FormData),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Path => "path",
            Self::Query => "query",
            Self::Header => "header",
            Self::Body => "body",
            Self::FormData => "formData",
        }
    }
}

impl CollectionFormat {
    fn parse(raw: Option<&str>) -> Self {
        match raw {
            Some("ssv") => Self::Ssv,
            Some("tsv") => Self::Tsv,
            Some("pipes") => Self::Pipes,
            Some("multi") => Self::Multi,
            _ => Self::Csv,
        }
    }

    /// Element separator; `multi` repeats the parameter instead.
    #[must_use]
    pub const fn separator(self) -> &'static str {
        match self {
            Self::Csv | Self::Multi => ",",
            Self::Ssv => " ",
            Self::Tsv => "\t",
            Self::Pipes => "|",
        }
    }

    /// OpenAPI 3 `style`/`explode` mapped onto the Swagger 2 formats.
    fn from_style(param: &Value, location: ParamLocation) -> Self {
        let style = param.get("style").and_then(Value::as_str);
        let default_explode = matches!(location, ParamLocation::Query | ParamLocation::FormData);
        let explode = param
            .get("explode")
            .and_then(Value::as_bool)
            .unwrap_or(default_explode && style.is_none_or(|s| s == "form"));
        match style {
            Some("spaceDelimited") => Self::Ssv,
            Some("pipeDelimited") => Self::Pipes,
            _ if explode => Self::Multi,
            _ => Self::Csv,
        }
    }
}

impl Operation {
    /// `GET /pets/{id}`
    #[must_use]
    pub fn label(&self) -> String {
        format!("{} {}", self.method, self.path_template)
    }

    /// Status codes declared explicitly, ascending.
    #[must_use]
    pub fn declared_statuses(&self) -> Vec<u16> {
        self.responses.keys().copied().collect()
    }

    /// True if `status` is declared exactly, through a range key, or by `default`.
    #[must_use]
    pub fn declares_status(&self, status: u16) -> bool {
        self.has_default_response
            || self.responses.contains_key(&status)
            || self.response_classes.contains(&(status / 100))
    }

    #[must_use]
    pub fn response(&self, status: u16) -> Option<&DeclaredResponse> {
        self.responses.get(&status)
    }
}

impl SpecModel {
    /// Validate the document's structure and extract every operation.
    ///
    /// # Errors
    ///
    /// `SpecError::Invalid` for a document that is not structurally Swagger 2 /
    /// OpenAPI 3, `SpecError::PathTemplate` when path placeholders and path
    /// parameters disagree, `SpecError::Unsupported` for schemas the generator
    /// cannot represent.
    pub fn from_document(document: &Value) -> Result<Self, SpecError> {
        let dialect = detect_dialect(document)?;
        let paths = document
            .get("paths")
            .and_then(Value::as_object)
            .ok_or_else(|| SpecError::Invalid("missing 'paths' object".into()))?;

        let mut operations = Vec::new();
        for (path, item) in paths {
            if !path.starts_with('/') {
                return Err(SpecError::Invalid(format!("path '{path}' must start with '/'")));
            }
            let item = match item.get("$ref").and_then(Value::as_str) {
                Some(reference) => resolve_pointer(document, reference).ok_or_else(|| {
                    SpecError::Invalid(format!("{path}: unresolvable path item {reference}"))
                })?,
                None => item,
            };
            for method in HttpMethod::ALL {
                if let Some(op) = item.get(method.key()) {
                    let builder = OperationBuilder {
                        document,
                        dialect,
                        method,
                        path,
                    };
                    operations.push(builder.build(item, op)?);
                }
            }
        }

        tracing::debug!(operations = operations.len(), ?dialect, "spec model built");
        Ok(Self {
            base_path: base_path(document, dialect),
            operations,
        })
    }

    #[must_use]
    pub fn operation(&self, index: usize) -> Option<&Operation> {
        self.operations.get(index)
    }
}

fn detect_dialect(document: &Value) -> Result<Dialect, SpecError> {
    if !document.is_object() {
        return Err(SpecError::Invalid("document is not an object".into()));
    }
    let version = |key: &str| {
        document.get(key).map(|v| match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    };
    if let Some(swagger) = version("swagger") {
        return if swagger.starts_with('2') {
            Ok(Dialect::Swagger2)
        } else {
            Err(SpecError::Invalid(format!("unsupported swagger version '{swagger}'")))
        };
    }
    match version("openapi") {
        Some(v) if v.starts_with("3.0") => Ok(Dialect::OpenApi30),
        Some(v) if v.starts_with('3') => Ok(Dialect::OpenApi31),
        Some(v) => Err(SpecError::Invalid(format!("unsupported openapi version '{v}'"))),
        None => Err(SpecError::Invalid(
            "document declares neither 'swagger' nor 'openapi'".into(),
        )),
    }
}

fn base_path(document: &Value, dialect: Dialect) -> String {
    let raw = match dialect {
        Dialect::Swagger2 => document
            .get("basePath")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string(),
        Dialect::OpenApi30 | Dialect::OpenApi31 => document
            .pointer("/servers/0/url")
            .and_then(Value::as_str)
            .map(|server| match url::Url::parse(server) {
                Ok(parsed) => parsed.path().to_string(),
                Err(_) => server.to_string(),
            })
            .unwrap_or_default(),
    };
    let trimmed = raw.trim_end_matches('/');
    if trimmed.is_empty() || trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}

fn string_list(node: Option<&Value>) -> Option<Vec<String>> {
    node.and_then(Value::as_array)
        .map(|items| items.iter().filter_map(|i| i.as_str().map(String::from)).collect())
}

/// Media type whose schema describes the request body: the first JSON one, else the first listed.
fn body_media(content: &Map<String, Value>) -> Option<(&String, &Value)> {
    content
        .iter()
        .find(|(media, _)| media.contains("json"))
        .or_else(|| content.iter().next())
}

/// Request content types with the one chosen by `body_media` first.
fn body_media_types(content: &Map<String, Value>) -> Vec<String> {
    let chosen = body_media(content).map(|(media, _)| media);
    chosen
        .into_iter()
        .chain(content.keys().filter(|k| Some(*k) != chosen))
        .cloned()
        .collect()
}

/// Placeholder names of a path template, in order: `/a/{x}/{y}` → `[x, y]`.
fn template_placeholders(path: &str) -> Vec<&str> {
    path.split('{')
        .skip(1)
        .filter_map(|rest| rest.split_once('}').map(|(name, _)| name))
        .collect()
}

struct OperationBuilder<'a> {
    document: &'a Value,
    dialect: Dialect,
    method: HttpMethod,
    path: &'a str,
}

impl<'a> OperationBuilder<'a> {
    fn location(&self) -> String {
        format!("{} {}", self.method, self.path)
    }

    fn invalid(&self, message: impl fmt::Display) -> SpecError {
        SpecError::Invalid(format!("{}: {message}", self.location()))
    }

    fn resolve<'v>(&self, node: &'v Value) -> Result<&'v Value, SpecError>
    where
        'a: 'v,
    {
        match node.get("$ref").and_then(Value::as_str) {
            Some(reference) => resolve_pointer(self.document, reference)
                .ok_or_else(|| self.invalid(format!("unresolvable $ref {reference}"))),
            None => Ok(node),
        }
    }

    fn build(&self, item: &Value, op: &Value) -> Result<Operation, SpecError> {
        if !op.is_object() {
            return Err(self.invalid("operation is not an object"));
        }
        let parameters = self.parameters(item, op)?;
        self.check_template(&parameters)?;

        let (consumes, produces) = match self.dialect {
            Dialect::Swagger2 => (
                string_list(op.get("consumes"))
                    .or_else(|| string_list(self.document.get("consumes")))
                    .unwrap_or_default(),
                string_list(op.get("produces"))
                    .or_else(|| string_list(self.document.get("produces")))
                    .unwrap_or_default(),
            ),
            Dialect::OpenApi30 | Dialect::OpenApi31 => (
                op.pointer("/requestBody/content")
                    .or_else(|| {
                        op.get("requestBody")
                            .and_then(|b| self.resolve(b).ok())
                            .and_then(|b| b.get("content"))
                    })
                    .and_then(Value::as_object)
                    .map(body_media_types)
                    .unwrap_or_default(),
                Vec::new(),
            ),
        };

        let responses = op
            .get("responses")
            .and_then(Value::as_object)
            .filter(|r| !r.is_empty())
            .ok_or_else(|| self.invalid("operation declares no responses"))?;

        let mut declared = BTreeMap::new();
        let mut response_classes = Vec::new();
        let mut has_default_response = false;
        for (key, response) in responses {
            if key == "default" {
                has_default_response = true;
                continue;
            }
            if let Some(class) = key
                .strip_suffix("XX")
                .and_then(|d| d.parse::<u16>().ok())
                .filter(|d| (1..=5).contains(d))
            {
                response_classes.push(class);
                continue;
            }
            let status: u16 = key
                .parse()
                .ok()
                .filter(|s| (100..=599).contains(s))
                .ok_or_else(|| self.invalid(format!("response key '{key}' is not a status code")))?;
            let response = self.resolve(response)?;
            let location = format!("{} response {status}", self.location());
            declared.insert(
                status,
                DeclaredResponse::parse(self.document, self.dialect, response, &location)?,
            );
        }

        Ok(Operation {
            method: self.method,
            path_template: self.path.to_string(),
            operation_id: op.get("operationId").and_then(Value::as_str).map(String::from),
            parameters,
            consumes,
            produces,
            responses: declared,
            response_classes,
            has_default_response,
        })
    }

    /// Path-item parameters, overridden by operation parameters with the same name and location.
    fn parameters(&self, item: &Value, op: &Value) -> Result<Vec<Parameter>, SpecError> {
        let mut parameters: Vec<Parameter> = Vec::new();
        for source in [item.get("parameters"), op.get("parameters")].into_iter().flatten() {
            let list = source
                .as_array()
                .ok_or_else(|| self.invalid("'parameters' is not an array"))?;
            for raw in list {
                let Some(param) = self.parameter(self.resolve(raw)?)? else {
                    continue;
                };
                parameters.retain(|p| !(p.name == param.name && p.location == param.location));
                parameters.push(param);
            }
        }

        if let Some(body) = op.get("requestBody") {
            if let Some(param) = self.request_body(self.resolve(body)?)? {
                parameters.push(param);
            }
        }

        let bodies = parameters.iter().filter(|p| p.location == ParamLocation::Body).count();
        if bodies > 1 {
            return Err(self.invalid("more than one body parameter"));
        }
        if bodies == 1 && parameters.iter().any(|p| p.location == ParamLocation::FormData) {
            return Err(self.invalid("both body and formData parameters"));
        }
        Ok(parameters)
    }

    fn parameter(&self, raw: &Value) -> Result<Option<Parameter>, SpecError> {
        let name = raw
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| self.invalid("parameter without a name"))?;
        let raw_location = raw
            .get("in")
            .and_then(Value::as_str)
            .ok_or_else(|| self.invalid(format!("parameter '{name}' has no 'in'")))?;
        let required = raw.get("required").and_then(Value::as_bool) == Some(true);

        let location = match ParamLocation::parse(raw_location) {
            Some(ParamLocation::Body | ParamLocation::FormData) if self.dialect != Dialect::Swagger2 => {
                return Err(self.invalid(format!(
                    "parameter '{name}': 'in: {raw_location}' is Swagger 2 only"
                )));
            }
            Some(location) => location,
            None if raw_location == "cookie" && !required => {
                tracing::debug!(operation = %self.location(), parameter = name, "skipping cookie parameter");
                return Ok(None);
            }
            None if raw_location == "cookie" => {
                return Err(SpecError::Unsupported {
                    location: format!("{} parameter '{name}'", self.location()),
                    source: SchemaError::Unsupported("required cookie parameter".into()),
                });
            }
            None => {
                return Err(self.invalid(format!(
                    "parameter '{name}' has invalid location '{raw_location}'"
                )));
            }
        };

        // Swagger 2 non-body parameters carry their schema keywords inline.
        let schema_node = match (location, raw.get("schema")) {
            (_, Some(schema)) => schema,
            (ParamLocation::Body, None) => {
                return Err(self.invalid(format!("body parameter '{name}' has no schema")));
            }
            (_, None) => raw,
        };
        let schema = SchemaParser::new(self.document)
            .parse(schema_node)
            .map_err(|source| SpecError::Unsupported {
                location: format!("{} parameter '{name}'", self.location()),
                source,
            })?;

        let collection_format = match self.dialect {
            Dialect::Swagger2 => {
                CollectionFormat::parse(raw.get("collectionFormat").and_then(Value::as_str))
            }
            Dialect::OpenApi30 | Dialect::OpenApi31 => CollectionFormat::from_style(raw, location),
        };

        Ok(Some(Parameter {
            name: name.to_string(),
            location,
            schema,
            // Path parameters are always required.
            required: required || location == ParamLocation::Path,
            collection_format,
        }))
    }

    /// OpenAPI 3 `requestBody` as a single body parameter named `body`.
    fn request_body(&self, body: &Value) -> Result<Option<Parameter>, SpecError> {
        let Some(content) = body.get("content").and_then(Value::as_object) else {
            return Ok(None);
        };
        let Some((_, media)) = body_media(content) else {
            return Ok(None);
        };
        let schema = match media.get("schema") {
            Some(node) => SchemaParser::new(self.document).parse(node).map_err(|source| {
                SpecError::Unsupported {
                    location: format!("{} request body", self.location()),
                    source,
                }
            })?,
            None => Schema::Any,
        };
        Ok(Some(Parameter {
            name: "body".into(),
            location: ParamLocation::Body,
            schema,
            required: body.get("required").and_then(Value::as_bool) == Some(true),
            collection_format: CollectionFormat::Csv,
        }))
    }

    /// Every `{placeholder}` names exactly one path parameter and vice versa.
    fn check_template(&self, parameters: &[Parameter]) -> Result<(), SpecError> {
        let placeholders = template_placeholders(self.path);
        let error = |message: String| SpecError::PathTemplate {
            method: self.method,
            path: self.path.to_string(),
            message,
        };

        for param in parameters.iter().filter(|p| p.location == ParamLocation::Path) {
            match placeholders.iter().filter(|p| **p == param.name).count() {
                1 => {}
                0 => return Err(error(format!("path parameter '{}' has no placeholder", param.name))),
                n => {
                    return Err(error(format!(
                        "placeholder '{{{}}}' appears {n} times",
                        param.name
                    )));
                }
            }
        }
        for placeholder in &placeholders {
            let declared = parameters
                .iter()
                .any(|p| p.location == ParamLocation::Path && p.name == *placeholder);
            if !declared {
                return Err(error(format!(
                    "placeholder '{{{placeholder}}}' has no path parameter"
                )));
            }
        }
        Ok(())
    }
}
