//! Closed schema representation for request generation
//!
//! Every construct is parsed once at load time. Anything the generator
//! cannot honour is rejected here rather than silently approximated.

use rand::distributions::Distribution;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde_json::Value;

/// Longest string we will ever produce, whatever `maxLength` says.
pub const MAX_STRING_LEN: usize = 10_000;

/// Largest array we will ever produce, whatever `maxItems` says.
pub const MAX_ARRAY_ITEMS: usize = 100;

const PATTERN_MAX_REPEAT: u32 = 32;
const PATTERN_ATTEMPTS: usize = 64;

#[derive(Debug, Clone)]
pub enum Schema {
    /// No constraint at all
    Any,
    Null,
    Boolean,
    Integer(IntegerRange),
    Number(NumberRange),
    String(StringRules),
    Enum(Vec<Value>),
    Array(ArraySchema),
    Object(ObjectSchema),
    /// Exactly the values of one of the variants
    OneOf(Vec<Schema>),
    /// `null` or the inner schema
    Nullable(Box<Schema>),
    /// Swagger 2 `type: file` form field
    File,
}

/// Inclusive integer bounds; exclusive bounds and `int32` are folded in at parse time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntegerRange {
    pub min: Option<i64>,
    pub max: Option<i64>,
    pub multiple_of: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NumberRange {
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub exclusive_min: bool,
    pub exclusive_max: bool,
    pub multiple_of: Option<f64>,
}

#[derive(Debug, Clone, Default)]
pub struct StringRules {
    /// In characters, not bytes
    pub min_length: usize,
    pub max_length: Option<usize>,
    pub pattern: Option<Pattern>,
    pub format: Option<StringFormat>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StringFormat {
    Date,
    DateTime,
    Email,
    Uuid,
    Uri,
    Byte,
    Ipv4,
    Hostname,
    /// Declared but not generated specially (`password`, `binary`, ...)
    Other(String),
}

#[derive(Debug, Clone)]
pub struct ArraySchema {
    pub items: Box<Schema>,
    pub min_items: usize,
    pub max_items: Option<usize>,
    pub unique: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ObjectSchema {
    /// Declaration order
    pub properties: Vec<(String, Schema)>,
    pub required: Vec<String>,
    /// Schema of undeclared keys, `None` when none are generated
    pub additional: Option<Box<Schema>>,
}

/// A compiled `pattern`: one regex to check values, one to sample them.
#[derive(Debug, Clone)]
pub struct Pattern {
    source: String,
    matcher: regex::Regex,
    sampler: rand_regex::Regex,
    /// A known sample satisfying the pattern and the length window
    witness: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    #[error("circular $ref {0}")]
    Circular(String),
    #[error("unresolvable $ref {0}")]
    UnresolvedRef(String),
    #[error("{0}")]
    Unsupported(String),
}

impl Schema {
    /// Wrap in `Nullable` unless `null` is already accepted.
    #[must_use]
    pub fn nullable(self) -> Self {
        match self {
            Self::Nullable(_) | Self::Null | Self::Any => self,
            other => Self::Nullable(Box::new(other)),
        }
    }

    /// Short name for logs and deviation descriptions.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Any => "any",
            Self::Null => "null",
            Self::Boolean => "boolean",
            Self::Integer(_) => "integer",
            Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::Enum(_) => "enum",
            Self::Array(_) => "array",
            Self::Object(_) => "object",
            Self::OneOf(_) => "oneOf",
            Self::Nullable(_) => "nullable",
            Self::File => "file",
        }
    }
}

impl ObjectSchema {
    #[must_use]
    pub fn is_required(&self, name: &str) -> bool {
        self.required.iter().any(|r| r == name)
    }

    #[must_use]
    pub fn property(&self, name: &str) -> Option<&Schema> {
        self.properties
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, s)| s)
    }
}

impl Pattern {
    /// Compile `source`, and find one sample within `min..=max` characters.
    ///
    /// # Errors
    ///
    /// Returns `SchemaError::Unsupported` if either regex engine rejects the
    /// pattern or no sample fits the length window.
    pub fn compile(source: &str, min_len: usize, max_len: Option<usize>) -> Result<Self, SchemaError> {
        let matcher = regex::Regex::new(source)
            .map_err(|e| SchemaError::Unsupported(format!("pattern '{source}': {e}")))?;
        let max_repeat = max_len.map_or(PATTERN_MAX_REPEAT, |m| {
            u32::try_from(m).unwrap_or(u32::MAX).min(PATTERN_MAX_REPEAT)
        });
        let sampler = rand_regex::Regex::compile(strip_anchors(source), max_repeat)
            .map_err(|e| SchemaError::Unsupported(format!("pattern '{source}': {e}")))?;

        let mut rng = SmallRng::seed_from_u64(0);
        let witness = (0..PATTERN_ATTEMPTS * 4)
            .map(|_| -> String { sampler.sample(&mut rng) })
            .find(|s| matcher.is_match(s) && length_fits(s, min_len, max_len))
            .ok_or_else(|| {
                SchemaError::Unsupported(format!(
                    "pattern '{source}' yields no value of length {min_len}..={}",
                    max_len.map_or_else(|| "unbounded".to_string(), |m| m.to_string())
                ))
            })?;

        Ok(Self {
            source: source.to_string(),
            matcher,
            sampler,
            witness,
        })
    }

    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    #[must_use]
    pub fn is_match(&self, value: &str) -> bool {
        self.matcher.is_match(value)
    }

    #[must_use]
    pub fn witness(&self) -> &str {
        &self.witness
    }

    /// Random matching string within the length window.
    pub fn sample(&self, rng: &mut impl Rng, min_len: usize, max_len: Option<usize>) -> String {
        (0..PATTERN_ATTEMPTS)
            .map(|_| -> String { self.sampler.sample(&mut *rng) })
            .find(|s| self.matcher.is_match(s) && length_fits(s, min_len, max_len))
            .unwrap_or_else(|| self.witness.clone())
    }
}

fn length_fits(s: &str, min_len: usize, max_len: Option<usize>) -> bool {
    let len = s.chars().count();
    len >= min_len && max_len.is_none_or(|m| len <= m)
}

/// JSON Schema patterns are unanchored; the sampler produces whole matches,
/// so leading `^` and trailing `$` carry no information for it.
fn strip_anchors(source: &str) -> &str {
    let body = source.strip_prefix('^').unwrap_or(source);
    match body.strip_suffix('$') {
        Some(rest) if !rest.ends_with('\\') => rest,
        _ => body,
    }
}

impl StringFormat {
    fn parse(name: &str) -> Self {
        match name {
            "date" => Self::Date,
            "date-time" => Self::DateTime,
            "email" => Self::Email,
            "uuid" => Self::Uuid,
            "uri" | "url" => Self::Uri,
            "byte" => Self::Byte,
            "ipv4" => Self::Ipv4,
            "hostname" => Self::Hostname,
            other => Self::Other(other.to_string()),
        }
    }
}

/// Resolve a local `#/...` JSON pointer against the whole document.
#[must_use]
pub fn resolve_pointer<'a>(document: &'a Value, reference: &str) -> Option<&'a Value> {
    document.pointer(reference.strip_prefix('#')?)
}

/// True for OpenAPI 3.0 `nullable: true` and Swagger 2 `x-nullable: true`.
#[must_use]
pub fn declares_nullable(node: &Value) -> bool {
    ["nullable", "x-nullable"]
        .iter()
        .any(|key| node.get(*key).and_then(Value::as_bool) == Some(true))
}

/// Turns schema JSON into [`Schema`], resolving `$ref`s against the document.
pub struct SchemaParser<'a> {
    document: &'a Value,
    stack: Vec<String>,
}

impl<'a> SchemaParser<'a> {
    #[must_use]
    pub const fn new(document: &'a Value) -> Self {
        Self {
            document,
            stack: Vec::new(),
        }
    }

    /// # Errors
    ///
    /// Returns `SchemaError` for constructs the generator cannot represent.
    pub fn parse(&mut self, node: &Value) -> Result<Schema, SchemaError> {
        if let Some(reference) = node.get("$ref").and_then(Value::as_str) {
            let target = self.parse_ref(reference)?;
            return Ok(if declares_nullable(node) {
                target.nullable()
            } else {
                target
            });
        }
        if !node.is_object() {
            return match node {
                Value::Bool(true) => Ok(Schema::Any),
                other => Err(SchemaError::Unsupported(format!("schema {other}"))),
            };
        }
        let schema = self.parse_inline(node)?;
        Ok(if declares_nullable(node) {
            schema.nullable()
        } else {
            schema
        })
    }

    fn parse_ref(&mut self, reference: &str) -> Result<Schema, SchemaError> {
        if self.stack.iter().any(|r| r == reference) {
            return Err(SchemaError::Circular(reference.to_string()));
        }
        let target = resolve_pointer(self.document, reference)
            .ok_or_else(|| SchemaError::UnresolvedRef(reference.to_string()))?;
        self.stack.push(reference.to_string());
        let parsed = self.parse(target);
        self.stack.pop();
        parsed
    }

    fn parse_inline(&mut self, node: &Value) -> Result<Schema, SchemaError> {
        if let Some(value) = node.get("const") {
            return Ok(Schema::Enum(vec![value.clone()]));
        }
        if let Some(values) = node.get("enum").and_then(Value::as_array) {
            if values.is_empty() {
                return Err(SchemaError::Unsupported("empty enum".into()));
            }
            return Ok(Schema::Enum(values.clone()));
        }
        if let Some(branches) = node.get("allOf").and_then(Value::as_array) {
            return self.parse_all_of(node, branches);
        }
        for key in ["oneOf", "anyOf"] {
            if let Some(branches) = node.get(key).and_then(Value::as_array) {
                return self.parse_one_of(branches);
            }
        }

        match node.get("type") {
            Some(Value::String(name)) => self.parse_typed(name, node),
            Some(Value::Array(names)) => {
                let names: Vec<&str> = names.iter().filter_map(Value::as_str).collect();
                let accepts_null = names.contains(&"null");
                let rest: Vec<&str> = names.into_iter().filter(|n| *n != "null").collect();
                let schema = match rest.as_slice() {
                    [] => Schema::Null,
                    [single] => self.parse_typed(single, node)?,
                    many => Schema::OneOf(
                        many.iter()
                            .map(|n| self.parse_typed(n, node))
                            .collect::<Result<_, _>>()?,
                    ),
                };
                Ok(if accepts_null { schema.nullable() } else { schema })
            }
            Some(other) => Err(SchemaError::Unsupported(format!("type {other}"))),
            None if node.get("properties").is_some() || node.get("additionalProperties").is_some() => {
                self.parse_typed("object", node)
            }
            None if node.get("items").is_some() => self.parse_typed("array", node),
            None => Ok(Schema::Any),
        }
    }

    fn parse_typed(&mut self, name: &str, node: &Value) -> Result<Schema, SchemaError> {
        match name {
            "integer" => parse_integer(node).map(Schema::Integer),
            "number" => parse_number(node).map(Schema::Number),
            "string" => parse_string(node).map(Schema::String),
            "boolean" => Ok(Schema::Boolean),
            "null" => Ok(Schema::Null),
            "file" => Ok(Schema::File),
            "array" => self.parse_array(node).map(Schema::Array),
            "object" => self.parse_object(node).map(Schema::Object),
            other => Err(SchemaError::Unsupported(format!("type '{other}'"))),
        }
    }

    fn parse_array(&mut self, node: &Value) -> Result<ArraySchema, SchemaError> {
        let min_items = usize_field(node, "minItems").unwrap_or(0).min(MAX_ARRAY_ITEMS);
        let mut max_items = usize_field(node, "maxItems").map(|m| m.min(MAX_ARRAY_ITEMS));
        if max_items.is_some_and(|m| m < min_items) {
            return Err(SchemaError::Unsupported(format!(
                "minItems {min_items} exceeds maxItems {}",
                max_items.unwrap_or_default()
            )));
        }

        let items = match node.get("items") {
            None => Schema::Any,
            Some(Value::Array(_)) => {
                return Err(SchemaError::Unsupported("tuple-typed items".into()));
            }
            Some(items) => match self.parse(items) {
                Ok(schema) => schema,
                // Only the empty array stays finite.
                Err(SchemaError::Circular(reference)) if min_items == 0 => {
                    tracing::debug!(%reference, "recursive array items, generating empty arrays");
                    max_items = Some(0);
                    Schema::Any
                }
                Err(e) => return Err(e),
            },
        };

        Ok(ArraySchema {
            items: Box::new(items),
            min_items,
            max_items,
            unique: node.get("uniqueItems").and_then(Value::as_bool) == Some(true),
        })
    }

    fn parse_object(&mut self, node: &Value) -> Result<ObjectSchema, SchemaError> {
        let required: Vec<String> = node
            .get("required")
            .and_then(Value::as_array)
            .map(|names| names.iter().filter_map(|n| n.as_str().map(String::from)).collect())
            .unwrap_or_default();

        let mut properties = Vec::new();
        if let Some(props) = node.get("properties").and_then(Value::as_object) {
            for (name, prop) in props {
                match self.parse(prop) {
                    Ok(schema) => properties.push((name.clone(), schema)),
                    Err(SchemaError::Circular(reference)) if !required.contains(name) => {
                        tracing::debug!(property = %name, %reference, "dropping recursive optional property");
                    }
                    Err(e) => return Err(e),
                }
            }
        }
        for name in &required {
            if !properties.iter().any(|(n, _)| n == name) {
                properties.push((name.clone(), Schema::Any));
            }
        }

        let additional = match node.get("additionalProperties") {
            Some(Value::Bool(true)) => Some(Box::new(Schema::Any)),
            Some(extra @ Value::Object(_)) => Some(Box::new(self.parse(extra)?)),
            _ => None,
        };

        Ok(ObjectSchema {
            properties,
            required,
            additional,
        })
    }

    fn parse_all_of(&mut self, node: &Value, branches: &[Value]) -> Result<Schema, SchemaError> {
        let mut merged = ObjectSchema::default();
        let mut parts = Vec::with_capacity(branches.len() + 1);
        for branch in branches {
            parts.push(self.parse(branch)?);
        }
        if node.get("properties").is_some() || node.get("required").is_some() {
            parts.push(Schema::Object(self.parse_object(node)?));
        }

        for part in parts {
            match part {
                Schema::Object(object) => {
                    for (name, schema) in object.properties {
                        merged.properties.retain(|(n, _)| *n != name);
                        merged.properties.push((name, schema));
                    }
                    for name in object.required {
                        if !merged.is_required(&name) {
                            merged.required.push(name);
                        }
                    }
                    if object.additional.is_some() {
                        merged.additional = object.additional;
                    }
                }
                Schema::Any => {}
                other => {
                    return Err(SchemaError::Unsupported(format!(
                        "allOf over {} schema",
                        other.type_name()
                    )));
                }
            }
        }
        Ok(Schema::Object(merged))
    }

    fn parse_one_of(&mut self, branches: &[Value]) -> Result<Schema, SchemaError> {
        let mut variants = Vec::new();
        let mut accepts_null = false;
        let mut circular = None;
        for branch in branches {
            match self.parse(branch) {
                Ok(Schema::Null) => accepts_null = true,
                Ok(schema) => variants.push(schema),
                Err(SchemaError::Circular(reference)) => circular = Some(reference),
                Err(e) => return Err(e),
            }
        }
        let schema = match variants.len() {
            0 if accepts_null => Schema::Null,
            0 => {
                return Err(circular.map_or_else(
                    || SchemaError::Unsupported("oneOf without variants".into()),
                    SchemaError::Circular,
                ));
            }
            1 => variants.swap_remove(0),
            _ => Schema::OneOf(variants),
        };
        Ok(if accepts_null { schema.nullable() } else { schema })
    }
}

fn usize_field(node: &Value, key: &str) -> Option<usize> {
    node.get(key)
        .and_then(Value::as_u64)
        .map(|n| usize::try_from(n).unwrap_or(usize::MAX))
}

fn f64_field(node: &Value, key: &str) -> Option<f64> {
    node.get(key).and_then(Value::as_f64)
}

#[allow(clippy::cast_possible_truncation)]
fn parse_integer(node: &Value) -> Result<IntegerRange, SchemaError> {
    let mut min = f64_field(node, "minimum").map(|m| m.ceil() as i64);
    let mut max = f64_field(node, "maximum").map(|m| m.floor() as i64);

    // Draft 4 booleans and draft 6+ numbers
    match node.get("exclusiveMinimum") {
        Some(Value::Bool(true)) => min = min.map(|m| m.saturating_add(1)),
        Some(Value::Number(n)) => {
            let bound = n.as_f64().map_or(i64::MIN, |f| f.floor() as i64).saturating_add(1);
            min = Some(min.map_or(bound, |m| m.max(bound)));
        }
        _ => {}
    }
    match node.get("exclusiveMaximum") {
        Some(Value::Bool(true)) => max = max.map(|m| m.saturating_sub(1)),
        Some(Value::Number(n)) => {
            let bound = n.as_f64().map_or(i64::MAX, |f| f.ceil() as i64).saturating_sub(1);
            max = Some(max.map_or(bound, |m| m.min(bound)));
        }
        _ => {}
    }

    if node.get("format").and_then(Value::as_str) == Some("int32") {
        min = Some(min.map_or(i64::from(i32::MIN), |m| m.max(i64::from(i32::MIN))));
        max = Some(max.map_or(i64::from(i32::MAX), |m| m.min(i64::from(i32::MAX))));
    }

    let multiple_of = match node.get("multipleOf") {
        None => None,
        Some(m) => match m.as_i64() {
            Some(step) if step > 0 => Some(step),
            _ => {
                return Err(SchemaError::Unsupported(format!(
                    "integer multipleOf {m}"
                )));
            }
        },
    };

    if let (Some(lo), Some(hi)) = (min, max) {
        if lo > hi {
            return Err(SchemaError::Unsupported(format!(
                "integer range {lo}..={hi} is empty"
            )));
        }
        if let Some(step) = multiple_of {
            if first_multiple(lo, step) > i128::from(hi) {
                return Err(SchemaError::Unsupported(format!(
                    "no multiple of {step} in {lo}..={hi}"
                )));
            }
        }
    }

    Ok(IntegerRange {
        min,
        max,
        multiple_of,
    })
}

/// Smallest multiple of `step` that is `>= lo`.
pub(crate) fn first_multiple(lo: i64, step: i64) -> i128 {
    let (lo, step) = (i128::from(lo), i128::from(step));
    lo + (step - lo.rem_euclid(step)) % step
}

fn parse_number(node: &Value) -> Result<NumberRange, SchemaError> {
    let mut range = NumberRange {
        min: f64_field(node, "minimum"),
        max: f64_field(node, "maximum"),
        ..NumberRange::default()
    };
    match node.get("exclusiveMinimum") {
        Some(Value::Bool(b)) => range.exclusive_min = *b && range.min.is_some(),
        Some(Value::Number(n)) => {
            range.min = n.as_f64();
            range.exclusive_min = true;
        }
        _ => {}
    }
    match node.get("exclusiveMaximum") {
        Some(Value::Bool(b)) => range.exclusive_max = *b && range.max.is_some(),
        Some(Value::Number(n)) => {
            range.max = n.as_f64();
            range.exclusive_max = true;
        }
        _ => {}
    }
    range.multiple_of = match f64_field(node, "multipleOf") {
        Some(step) if step > 0.0 => Some(step),
        Some(step) => {
            return Err(SchemaError::Unsupported(format!("number multipleOf {step}")));
        }
        None => None,
    };

    if let (Some(lo), Some(hi)) = (range.min, range.max) {
        let empty = lo > hi || (lo == hi && (range.exclusive_min || range.exclusive_max));
        if empty {
            return Err(SchemaError::Unsupported(format!(
                "number range {lo}..{hi} is empty"
            )));
        }
    }
    Ok(range)
}

fn parse_string(node: &Value) -> Result<StringRules, SchemaError> {
    let min_length = usize_field(node, "minLength").unwrap_or(0);
    let max_length = usize_field(node, "maxLength");
    if let Some(max) = max_length {
        if min_length > max {
            return Err(SchemaError::Unsupported(format!(
                "minLength {min_length} exceeds maxLength {max}"
            )));
        }
    }
    if min_length > MAX_STRING_LEN {
        return Err(SchemaError::Unsupported(format!(
            "minLength {min_length} exceeds the {MAX_STRING_LEN} character limit"
        )));
    }
    let max_length = max_length.map(|m| m.min(MAX_STRING_LEN));

    let pattern = node
        .get("pattern")
        .and_then(Value::as_str)
        .map(|p| Pattern::compile(p, min_length, max_length))
        .transpose()?;

    Ok(StringRules {
        min_length,
        max_length,
        pattern,
        format: node.get("format").and_then(Value::as_str).map(StringFormat::parse),
    })
}
