//! Schema → random `serde_json::Value` generation
//!
//! Values always satisfy the declared constraints, except for the one
//! parameter a negative case deliberately type-confuses. Also home to the
//! conformance check and the per-value simplification the shrinker uses.

use std::sync::Arc;

use base64::Engine as _;
use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde_json::{Map, Value, json};

use crate::builder::scalar_text;
use crate::spec::schema::{
    ArraySchema, IntegerRange, NumberRange, ObjectSchema, Schema, StringFormat, StringRules,
    MAX_STRING_LEN, first_multiple,
};
use crate::spec::{Operation, ParamLocation, Parameter, SpecModel};

/// Chance of picking a boundary value instead of a uniform one.
const EDGE_PROBABILITY: f64 = 0.2;

/// Chance an optional parameter or property is present.
const OPTIONAL_PROBABILITY: f64 = 0.5;

/// Nesting limit for unconstrained (`Any`) values.
const MAX_DEPTH: u32 = 4;

/// Items added beyond `minItems` when `maxItems` is absent.
const DEFAULT_EXTRA_ITEMS: usize = 3;

/// Characters added beyond `minLength` when `maxLength` is absent.
const DEFAULT_EXTRA_CHARS: usize = 16;

/// Length of the "long string" edge value when `maxLength` is absent.
const LONG_STRING: usize = 1_000;

const ALNUM: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const UNICODE_SAMPLES: &[char] = &['é', 'ü', 'ß', 'ø', '日', '本', '語', 'Ω', '😀', ' ', '\'', '"', '<', '&', '%', '/'];

/// One generated request: a value (or absence) per declared parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct CaseInstance {
    /// Index into `SpecModel::operations`
    pub operation: usize,
    /// Parallel to the operation's parameters; `None` means omitted
    pub values: Vec<Option<Value>>,
    /// Set on negative cases only
    pub deviation: Option<Deviation>,
}

/// The single parameter a negative case deliberately gets wrong.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deviation {
    /// Parameter index within the operation
    pub parameter: usize,
    pub description: String,
}

impl CaseInstance {
    #[must_use]
    pub fn value(&self, parameter: usize) -> Option<&Value> {
        self.values.get(parameter).and_then(Option::as_ref)
    }

    /// Copy with one parameter slot replaced.
    #[must_use]
    pub fn with_value(&self, parameter: usize, value: Option<Value>) -> Self {
        let mut next = self.clone();
        if let Some(slot) = next.values.get_mut(parameter) {
            *slot = value;
        }
        next
    }

    #[must_use]
    pub const fn is_negative(&self) -> bool {
        self.deviation.is_some()
    }
}

/// Endless, seeded stream of cases over every operation of a spec.
///
/// Two generators built from the same spec, seed and negative ratio yield
/// identical sequences.
pub struct CaseGenerator {
    spec: Arc<SpecModel>,
    seed: u64,
    rng: SmallRng,
    negative_ratio: f64,
}

impl CaseGenerator {
    #[must_use]
    pub fn new(spec: Arc<SpecModel>, seed: u64) -> Self {
        Self {
            spec,
            seed,
            rng: SmallRng::seed_from_u64(seed),
            negative_ratio: 0.0,
        }
    }

    /// Fraction of cases carrying one type-confused parameter.
    #[must_use]
    pub fn with_negative_ratio(mut self, ratio: f64) -> Self {
        self.negative_ratio = ratio.clamp(0.0, 1.0);
        self
    }

    #[must_use]
    pub const fn seed(&self) -> u64 {
        self.seed
    }

    /// Start the sequence over from the seed.
    pub fn restart(&mut self) {
        self.rng = SmallRng::seed_from_u64(self.seed);
    }

    /// Next case, `None` only when the spec has no operations.
    pub fn generate(&mut self) -> Option<CaseInstance> {
        let spec = Arc::clone(&self.spec);
        if spec.operations.is_empty() {
            return None;
        }
        let index = self.rng.gen_range(0..spec.operations.len());
        let op = &spec.operations[index];

        let mut values: Vec<Option<Value>> = op
            .parameters
            .iter()
            .map(|param| {
                (param.required || self.rng.gen_bool(OPTIONAL_PROBABILITY))
                    .then(|| generate_parameter(param, &mut self.rng))
            })
            .collect();

        let deviation = if self.negative_ratio > 0.0 && self.rng.gen_bool(self.negative_ratio) {
            self.deviate(op, &mut values)
        } else {
            None
        };

        Some(CaseInstance {
            operation: index,
            values,
            deviation,
        })
    }

    fn deviate(&mut self, op: &Operation, values: &mut [Option<Value>]) -> Option<Deviation> {
        let candidates: Vec<(usize, Vec<Value>)> = op
            .parameters
            .iter()
            .enumerate()
            .map(|(i, p)| (i, type_confusion_values(p)))
            .filter(|(_, probes)| !probes.is_empty())
            .collect();
        let (index, probes) = candidates.choose(&mut self.rng)?;
        let probe = probes.choose(&mut self.rng)?.clone();
        let param = &op.parameters[*index];

        let description = format!(
            "{} parameter '{}' expects {}, sent {}",
            param.location.as_str(),
            param.name,
            param.schema.type_name(),
            abbreviate(&probe.to_string(), 80)
        );
        values[*index] = Some(probe);
        Some(Deviation {
            parameter: *index,
            description,
        })
    }
}

impl Iterator for CaseGenerator {
    type Item = CaseInstance;

    fn next(&mut self) -> Option<Self::Item> {
        self.generate()
    }
}

fn abbreviate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let head: String = text.chars().take(max_chars).collect();
        format!("{head}…")
    }
}

// ── Generation ──

#[derive(Clone, Copy)]
struct Ctx {
    /// Header values must stay printable ASCII
    ascii: bool,
    depth: u32,
}

impl Ctx {
    const fn deeper(self) -> Self {
        Self {
            ascii: self.ascii,
            depth: self.depth + 1,
        }
    }
}

/// Random value conforming to `schema`.
pub fn generate_value(schema: &Schema, rng: &mut impl Rng) -> Value {
    generate_inner(schema, rng, Ctx { ascii: false, depth: 0 })
}

/// Random value for a parameter; header values are printable ASCII.
pub fn generate_parameter(param: &Parameter, rng: &mut impl Rng) -> Value {
    let ctx = Ctx {
        ascii: param.location == ParamLocation::Header,
        depth: 0,
    };
    generate_inner(&param.schema, rng, ctx)
}

fn generate_inner(schema: &Schema, rng: &mut impl Rng, ctx: Ctx) -> Value {
    match schema {
        Schema::Any => gen_any(rng, ctx),
        Schema::Null => Value::Null,
        Schema::Boolean => Value::Bool(rng.gen_bool(0.5)),
        Schema::Integer(range) => Value::from(gen_integer(range, rng)),
        Schema::Number(range) => json!(gen_number(range, rng)),
        Schema::String(rules) => Value::String(gen_string(rules, rng, ctx)),
        Schema::Enum(values) => values.choose(rng).cloned().unwrap_or(Value::Null),
        Schema::Array(array) => gen_array(array, rng, ctx),
        Schema::Object(object) => gen_object(object, rng, ctx),
        Schema::OneOf(variants) => variants
            .choose(rng)
            .map_or(Value::Null, |v| generate_inner(v, rng, ctx)),
        Schema::Nullable(inner) => {
            if rng.gen_bool(EDGE_PROBABILITY) {
                Value::Null
            } else {
                generate_inner(inner, rng, ctx)
            }
        }
        Schema::File => {
            let len = rng.gen_range(0..=32);
            Value::String(random_text(rng, len, true))
        }
    }
}

fn gen_any(rng: &mut impl Rng, ctx: Ctx) -> Value {
    let kinds = if ctx.depth >= MAX_DEPTH { 4 } else { 6 };
    match rng.gen_range(0..kinds) {
        0 => Value::Null,
        1 => Value::Bool(rng.gen_bool(0.5)),
        2 => Value::from(rng.gen_range(-1000_i64..=1000)),
        3 => {
            let len = rng.gen_range(0..=DEFAULT_EXTRA_CHARS);
            Value::String(random_text(rng, len, ctx.ascii))
        }
        4 => {
            let len = rng.gen_range(0..=DEFAULT_EXTRA_ITEMS);
            Value::Array((0..len).map(|_| gen_any(rng, ctx.deeper())).collect())
        }
        _ => {
            let len = rng.gen_range(0..=DEFAULT_EXTRA_ITEMS);
            let mut map = Map::new();
            for _ in 0..len {
                let key_len = rng.gen_range(1..=8);
                map.insert(random_text(rng, key_len, true), gen_any(rng, ctx.deeper()));
            }
            Value::Object(map)
        }
    }
}

/// Working window for integers: declared bounds, or a span around them.
fn integer_window(range: &IntegerRange) -> (i64, i64) {
    match (range.min, range.max) {
        (Some(lo), Some(hi)) => (lo, hi),
        (Some(lo), None) => (lo, lo.saturating_add(2000)),
        (None, Some(hi)) => (hi.saturating_sub(2000), hi),
        (None, None) => (-1000, 1000),
    }
}

fn integer_in_range(range: &IntegerRange, v: i64) -> bool {
    range.min.is_none_or(|m| v >= m)
        && range.max.is_none_or(|m| v <= m)
        && range.multiple_of.is_none_or(|step| v.rem_euclid(step) == 0)
}

/// Round down onto a multiple of `multipleOf`, or up to the first one above the minimum.
fn align_integer(range: &IntegerRange, v: i64) -> i64 {
    let Some(step) = range.multiple_of else {
        return v;
    };
    let down = i128::from(v) - i128::from(v).rem_euclid(i128::from(step));
    let aligned = match range.min {
        Some(min) if down < i128::from(min) => first_multiple(min, step),
        _ => down,
    };
    i64::try_from(aligned).unwrap_or(v)
}

fn integer_edges(range: &IntegerRange) -> Vec<i64> {
    let mut edges: Vec<i64> = [range.min, range.max].into_iter().flatten().collect();
    if range.min.is_none() && range.max.is_none() {
        edges.extend([i64::MIN, i64::MAX]);
    }
    edges.extend([0, -1, 1]);
    edges.retain(|v| integer_in_range(range, *v));
    edges.dedup();
    edges
}

fn gen_integer(range: &IntegerRange, rng: &mut impl Rng) -> i64 {
    if rng.gen_bool(EDGE_PROBABILITY) {
        if let Some(edge) = integer_edges(range).choose(rng) {
            return *edge;
        }
    }
    let (lo, hi) = integer_window(range);
    align_integer(range, rng.gen_range(lo..=hi))
}

fn number_window(range: &NumberRange) -> (f64, f64) {
    match (range.min, range.max) {
        (Some(lo), Some(hi)) => (lo, hi),
        (Some(lo), None) => (lo, lo + 1000.0),
        (None, Some(hi)) => (hi - 1000.0, hi),
        (None, None) => (-1000.0, 1000.0),
    }
}

fn number_in_range(range: &NumberRange, v: f64) -> bool {
    let above = range
        .min
        .is_none_or(|m| if range.exclusive_min { v > m } else { v >= m });
    let below = range
        .max
        .is_none_or(|m| if range.exclusive_max { v < m } else { v <= m });
    let aligned = range
        .multiple_of
        .is_none_or(|step| ((v / step) - (v / step).round()).abs() < 1e-9);
    v.is_finite() && above && below && aligned
}

/// Uniform draw from `[lo, hi]`, also when `hi - lo` overflows `f64`.
fn sample_between(lo: f64, hi: f64, rng: &mut impl Rng) -> f64 {
    if lo < hi && (hi - lo).is_finite() {
        rng.gen_range(lo..=hi)
    } else if lo < hi {
        let u: f64 = rng.gen_range(0.0..=1.0);
        (lo / 2.0 + (hi / 2.0 - lo / 2.0) * u) * 2.0
    } else {
        lo
    }
}

/// Midpoint of `[lo, hi]` without overflowing.
fn midpoint(lo: f64, hi: f64) -> f64 {
    lo / 2.0 + hi / 2.0
}

#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn gen_number(range: &NumberRange, rng: &mut impl Rng) -> f64 {
    let (lo, hi) = number_window(range);
    if let Some(step) = range.multiple_of {
        let first = (lo / step).ceil() as i64;
        let last = (hi / step).floor() as i64;
        let candidates: Vec<f64> = [first, first.saturating_add(1), last.saturating_sub(1), last]
            .into_iter()
            .filter(|k| *k >= first && *k <= last)
            .map(|k| k as f64 * step)
            .filter(|v| number_in_range(range, *v))
            .collect();
        if first <= last && rng.gen_bool(1.0 - EDGE_PROBABILITY) {
            let v = rng.gen_range(first..=last) as f64 * step;
            if number_in_range(range, v) {
                return v;
            }
        }
        if let Some(v) = candidates.choose(rng) {
            return *v;
        }
    }

    if rng.gen_bool(EDGE_PROBABILITY) {
        let mut edges: Vec<f64> = vec![0.0, -1.0, 1.0, 0.5];
        edges.extend(range.min);
        edges.extend(range.max);
        if range.min.is_none() && range.max.is_none() {
            edges.extend([f64::MAX, f64::MIN, f64::EPSILON]);
        }
        edges.retain(|v| number_in_range(range, *v));
        if let Some(edge) = edges.choose(rng) {
            return *edge;
        }
    }

    let v = sample_between(lo, hi, rng);
    if number_in_range(range, v) {
        v
    } else {
        // Landed on an exclusive bound
        midpoint(lo, hi)
    }
}

fn gen_string(rules: &StringRules, rng: &mut impl Rng, ctx: Ctx) -> String {
    if let Some(pattern) = &rules.pattern {
        return pattern.sample(rng, rules.min_length, rules.max_length);
    }
    if let Some(value) = rules.format.as_ref().and_then(|f| gen_format(f, rng)) {
        if length_in_window(rules, &value) {
            return value;
        }
    }

    let lo = rules.min_length;
    let hi = rules
        .max_length
        .unwrap_or(lo + DEFAULT_EXTRA_CHARS)
        .max(lo);
    let len = if rng.gen_bool(EDGE_PROBABILITY) {
        let long = rules
            .max_length
            .unwrap_or_else(|| (lo + LONG_STRING).min(MAX_STRING_LEN));
        *[lo, hi, long].choose(rng).unwrap_or(&lo)
    } else {
        rng.gen_range(lo..=hi)
    };
    random_text(rng, len, ctx.ascii)
}

fn length_in_window(rules: &StringRules, value: &str) -> bool {
    let len = value.chars().count();
    len >= rules.min_length && rules.max_length.is_none_or(|m| len <= m)
}

/// `len` characters: mostly alphanumeric, occasionally punctuation or non-ASCII.
fn random_text(rng: &mut impl Rng, len: usize, ascii: bool) -> String {
    (0..len)
        .map(|_| {
            if rng.gen_bool(0.9) {
                char::from(ALNUM[rng.gen_range(0..ALNUM.len())])
            } else if ascii {
                char::from(rng.gen_range(0x20_u8..=0x7e))
            } else {
                UNICODE_SAMPLES[rng.gen_range(0..UNICODE_SAMPLES.len())]
            }
        })
        .collect()
}

fn random_alnum(rng: &mut impl Rng, len: usize) -> String {
    (0..len)
        .map(|_| char::from(ALNUM[rng.gen_range(0..ALNUM.len())]))
        .collect()
}

fn random_date(rng: &mut impl Rng) -> String {
    format!(
        "{:04}-{:02}-{:02}",
        rng.gen_range(1970..=2099),
        rng.gen_range(1..=12),
        rng.gen_range(1..=28)
    )
}

fn gen_format(format: &StringFormat, rng: &mut impl Rng) -> Option<String> {
    let value = match format {
        StringFormat::Date => random_date(rng),
        StringFormat::DateTime => format!(
            "{}T{:02}:{:02}:{:02}Z",
            random_date(rng),
            rng.gen_range(0..24),
            rng.gen_range(0..60),
            rng.gen_range(0..60)
        ),
        StringFormat::Email => {
            let user_len = rng.gen_range(1..=10);
            let domain_len = rng.gen_range(1..=10);
            format!(
                "{}@{}.com",
                random_alnum(rng, user_len),
                random_alnum(rng, domain_len).to_lowercase()
            )
        }
        StringFormat::Uuid => {
            let mut bytes: [u8; 16] = rng.r#gen();
            bytes[6] = (bytes[6] & 0x0f) | 0x40;
            bytes[8] = (bytes[8] & 0x3f) | 0x80;
            let hex: String = bytes.iter().map(|b| format!("{b:02x}")).collect();
            format!(
                "{}-{}-{}-{}-{}",
                &hex[0..8],
                &hex[8..12],
                &hex[12..16],
                &hex[16..20],
                &hex[20..32]
            )
        }
        StringFormat::Uri => {
            let host_len = rng.gen_range(1..=10);
            let path_len = rng.gen_range(0..=10);
            format!(
                "https://{}.example.com/{}",
                random_alnum(rng, host_len).to_lowercase(),
                random_alnum(rng, path_len)
            )
        }
        StringFormat::Byte => {
            let len = rng.gen_range(0..=24);
            let bytes: Vec<u8> = (0..len).map(|_| rng.r#gen()).collect();
            base64::engine::general_purpose::STANDARD.encode(bytes)
        }
        StringFormat::Ipv4 => {
            let octets: [u8; 4] = rng.r#gen();
            format!("{}.{}.{}.{}", octets[0], octets[1], octets[2], octets[3])
        }
        StringFormat::Hostname => {
            let len = rng.gen_range(1..=12);
            format!("{}.example.com", random_alnum(rng, len).to_lowercase())
        }
        StringFormat::Other(_) => return None,
    };
    Some(value)
}

fn gen_array(array: &ArraySchema, rng: &mut impl Rng, ctx: Ctx) -> Value {
    let lo = array.min_items;
    let hi = array.max_items.unwrap_or(lo + DEFAULT_EXTRA_ITEMS).max(lo);
    let count = if rng.gen_bool(EDGE_PROBABILITY) {
        if rng.gen_bool(0.5) { lo } else { hi }
    } else {
        rng.gen_range(lo..=hi)
    };

    let mut items: Vec<Value> = Vec::with_capacity(count);
    let mut attempts = 0;
    while items.len() < count && attempts < count * 8 + 8 {
        attempts += 1;
        let item = generate_inner(&array.items, rng, ctx.deeper());
        if !array.unique || !items.contains(&item) {
            items.push(item);
        }
    }
    Value::Array(items)
}

fn gen_object(object: &ObjectSchema, rng: &mut impl Rng, ctx: Ctx) -> Value {
    let mut map = Map::new();
    for (name, schema) in &object.properties {
        if object.is_required(name) || rng.gen_bool(OPTIONAL_PROBABILITY) {
            map.insert(name.clone(), generate_inner(schema, rng, ctx.deeper()));
        }
    }
    if let Some(extra) = &object.additional {
        if rng.gen_bool(EDGE_PROBABILITY) {
            let key = format!("x_{}", random_alnum(rng, 6));
            if !map.contains_key(&key) {
                map.insert(key, generate_inner(extra, rng, ctx.deeper()));
            }
        }
    }
    Value::Object(map)
}

// ── Conformance ──

/// True if `value` satisfies every constraint of `schema`.
#[must_use]
pub fn conforms(schema: &Schema, value: &Value) -> bool {
    match schema {
        Schema::Any => true,
        Schema::Null => value.is_null(),
        Schema::Boolean => value.is_boolean(),
        Schema::Integer(range) => as_integer(value).is_some_and(|v| integer_in_range(range, v)),
        Schema::Number(range) => value.as_f64().is_some_and(|v| number_in_range(range, v)),
        Schema::String(rules) => value.as_str().is_some_and(|s| string_conforms(rules, s)),
        Schema::Enum(values) => values.contains(value),
        Schema::Array(array) => value.as_array().is_some_and(|items| {
            items.len() >= array.min_items
                && array.max_items.is_none_or(|m| items.len() <= m)
                && items.iter().all(|i| conforms(&array.items, i))
                && (!array.unique || all_distinct(items))
        }),
        Schema::Object(object) => value.as_object().is_some_and(|map| {
            object.required.iter().all(|r| map.contains_key(r))
                && map.iter().all(|(key, v)| match object.property(key) {
                    Some(prop) => conforms(prop, v),
                    None => object.additional.as_deref().is_none_or(|extra| conforms(extra, v)),
                })
        }),
        Schema::OneOf(variants) => variants.iter().any(|v| conforms(v, value)),
        Schema::Nullable(inner) => value.is_null() || conforms(inner, value),
        Schema::File => value.is_string(),
    }
}

/// Conformance of a parameter value as the server will see it: non-body
/// strings are judged by their text, the way the server parses them.
#[must_use]
pub fn conforms_parameter(param: &Parameter, value: &Value) -> bool {
    match (param.location, value) {
        (ParamLocation::Body, _) => conforms(&param.schema, value),
        (_, Value::String(text)) => {
            conforms_text(&param.schema, text, param.collection_format.separator())
        }
        (_, other) => conforms(&param.schema, other),
    }
}

fn conforms_text(schema: &Schema, text: &str, separator: &str) -> bool {
    match schema {
        Schema::Any | Schema::File => true,
        Schema::Null => text.is_empty() || text == "null",
        Schema::Boolean => matches!(text, "true" | "false"),
        Schema::Integer(range) => text.parse::<i64>().is_ok_and(|v| integer_in_range(range, v)),
        Schema::Number(range) => text.parse::<f64>().is_ok_and(|v| number_in_range(range, v)),
        Schema::String(rules) => string_conforms(rules, text),
        Schema::Enum(values) => values.iter().any(|v| scalar_text(v) == text),
        Schema::Array(array) => {
            let parts: Vec<&str> = if text.is_empty() {
                Vec::new()
            } else {
                text.split(separator).collect()
            };
            parts.len() >= array.min_items
                && array.max_items.is_none_or(|m| parts.len() <= m)
                && parts.iter().all(|p| conforms_text(&array.items, p, ","))
        }
        // Structured values have no agreed text form; anything goes
        Schema::Object(_) => true,
        Schema::OneOf(variants) => variants.iter().any(|v| conforms_text(v, text, separator)),
        Schema::Nullable(inner) => text.is_empty() || text == "null" || conforms_text(inner, text, separator),
    }
}

#[allow(clippy::cast_possible_truncation)]
fn as_integer(value: &Value) -> Option<i64> {
    value.as_i64().or_else(|| {
        value
            .as_f64()
            .filter(|f| f.fract() == 0.0 && f.abs() < 9.0e15)
            .map(|f| f as i64)
    })
}

fn all_distinct(items: &[Value]) -> bool {
    items
        .iter()
        .enumerate()
        .all(|(i, item)| !items[..i].contains(item))
}

fn string_conforms(rules: &StringRules, s: &str) -> bool {
    length_in_window(rules, s)
        && rules.pattern.as_ref().is_none_or(|p| p.is_match(s))
        && rules.format.as_ref().is_none_or(|f| format_conforms(f, s))
}

fn all_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

fn date_conforms(s: &str) -> bool {
    let parts: Vec<&str> = s.split('-').collect();
    let [year, month, day] = parts.as_slice() else {
        return false;
    };
    year.len() == 4
        && all_digits(year)
        && month.len() == 2
        && day.len() == 2
        && month.parse::<u8>().is_ok_and(|m| (1..=12).contains(&m))
        && day.parse::<u8>().is_ok_and(|d| (1..=31).contains(&d))
}

fn format_conforms(format: &StringFormat, s: &str) -> bool {
    match format {
        StringFormat::Date => date_conforms(s),
        StringFormat::DateTime => {
            let Some((date, time)) = s.split_once(['T', 't']) else {
                return false;
            };
            let clock: Vec<&str> = time.get(..8).unwrap_or("").split(':').collect();
            date_conforms(date)
                && clock.len() == 3
                && clock.iter().all(|c| c.len() == 2 && all_digits(c))
                && time.len() > 8
        }
        StringFormat::Email => s
            .split_once('@')
            .is_some_and(|(user, domain)| !user.is_empty() && domain.contains('.') && !domain.starts_with('.')),
        StringFormat::Uuid => {
            s.len() == 36
                && s.char_indices().all(|(i, c)| match i {
                    8 | 13 | 18 | 23 => c == '-',
                    _ => c.is_ascii_hexdigit(),
                })
        }
        StringFormat::Uri => url::Url::parse(s).is_ok(),
        StringFormat::Byte => base64::engine::general_purpose::STANDARD.decode(s).is_ok(),
        StringFormat::Ipv4 => s.parse::<std::net::Ipv4Addr>().is_ok(),
        StringFormat::Hostname => {
            !s.is_empty()
                && s.len() <= 253
                && s.split('.').all(|label| {
                    !label.is_empty()
                        && label.len() <= 63
                        && label.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-')
                })
        }
        StringFormat::Other(_) => true,
    }
}

// ── Simplification ──

/// Simplest value satisfying `schema`: zero-ish numbers, shortest strings,
/// first enum member, `false`, `null`, fewest items and properties.
#[must_use]
pub fn canonical(schema: &Schema) -> Value {
    match schema {
        Schema::Any | Schema::Null | Schema::Nullable(_) => Value::Null,
        Schema::Boolean => Value::Bool(false),
        Schema::Integer(range) => Value::from(canonical_integer(range)),
        Schema::Number(range) => json!(canonical_number(range)),
        Schema::String(rules) => Value::String(canonical_string(rules)),
        Schema::Enum(values) => values.first().cloned().unwrap_or(Value::Null),
        Schema::Array(array) => {
            Value::Array(vec![canonical(&array.items); array.min_items])
        }
        Schema::Object(object) => Value::Object(
            object
                .properties
                .iter()
                .filter(|(name, _)| object.is_required(name))
                .map(|(name, schema)| (name.clone(), canonical(schema)))
                .collect(),
        ),
        Schema::OneOf(variants) => variants.first().map_or(Value::Null, canonical),
        Schema::File => Value::String(String::new()),
    }
}

fn canonical_integer(range: &IntegerRange) -> i64 {
    let step = range.multiple_of.unwrap_or(1);
    match (range.min, range.max) {
        (Some(min), _) if min > 0 => i64::try_from(first_multiple(min, step)).unwrap_or(min),
        (_, Some(max)) if max < 0 => max - max.rem_euclid(step),
        _ => 0,
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn canonical_number(range: &NumberRange) -> f64 {
    if number_in_range(range, 0.0) {
        return 0.0;
    }
    let (lo, hi) = number_window(range);
    if let Some(step) = range.multiple_of {
        let k = if lo > 0.0 { (lo / step).ceil() } else { (hi / step).floor() };
        for candidate in [k, k + 1.0, k - 1.0] {
            if number_in_range(range, candidate * step) {
                return candidate * step;
            }
        }
    }
    let target = if lo > 0.0 { lo } else { hi };
    if number_in_range(range, target) {
        return target;
    }
    let nudged = if lo > 0.0 { lo + 1.0 } else { hi - 1.0 };
    if number_in_range(range, nudged) {
        nudged
    } else {
        midpoint(lo, hi)
    }
}

fn canonical_string(rules: &StringRules) -> String {
    if let Some(pattern) = &rules.pattern {
        return pattern.witness().to_string();
    }
    let formatted = match &rules.format {
        Some(StringFormat::Date) => Some("1970-01-01"),
        Some(StringFormat::DateTime) => Some("1970-01-01T00:00:00Z"),
        Some(StringFormat::Email) => Some("a@a.io"),
        Some(StringFormat::Uuid) => Some("00000000-0000-4000-8000-000000000000"),
        Some(StringFormat::Uri) => Some("http://a.io"),
        Some(StringFormat::Ipv4) => Some("0.0.0.0"),
        Some(StringFormat::Hostname) => Some("a.io"),
        Some(StringFormat::Byte | StringFormat::Other(_)) | None => None,
    };
    match formatted {
        Some(s) if length_in_window(rules, s) => s.to_string(),
        _ => "a".repeat(rules.min_length),
    }
}

/// Simpler variants of `value`, most aggressive first.
///
/// When `value` satisfies `schema`, every candidate does too. Candidates are
/// strictly simpler (shorter, closer to zero, earlier enum member, fewer
/// items or keys), so repeated simplification terminates.
#[must_use]
pub fn simplify(schema: &Schema, value: &Value) -> Vec<Value> {
    let valid = conforms(schema, value);
    let mut out = Vec::new();
    if valid {
        out.push(canonical(schema));
    }

    match (schema, value) {
        (Schema::Nullable(inner), v) if !v.is_null() => out.extend(simplify(inner, v)),
        (Schema::OneOf(variants), v) => match variants.iter().find(|s| conforms(s, v)) {
            Some(variant) => out.extend(simplify(variant, v)),
            None => out.extend(simplify_any(v)),
        },
        (Schema::Integer(range), Value::Number(_)) => {
            let target = if valid { canonical_integer(range) } else { 0 };
            out.extend(integer_steps(value, target, range.multiple_of.unwrap_or(1)));
        }
        (Schema::Number(range), Value::Number(_)) => {
            let target = if valid { canonical_number(range) } else { 0.0 };
            out.extend(number_steps(value, target));
        }
        (Schema::String(rules), Value::String(s)) => {
            out.extend(string_steps(s, if valid { rules.min_length } else { 0 }));
        }
        (Schema::File, Value::String(s)) => out.extend(string_steps(s, 0)),
        (Schema::Boolean, Value::Bool(true)) => out.push(Value::Bool(false)),
        (Schema::Enum(values), v) => match values.iter().position(|candidate| candidate == v) {
            Some(index) => out.extend(values[..index].iter().cloned()),
            None => out.extend(simplify_any(v)),
        },
        (Schema::Array(array), Value::Array(items)) => {
            let floor = if valid { array.min_items } else { 0 };
            out.extend(array_steps(items, floor, |item| simplify(&array.items, item)));
        }
        (Schema::Object(object), Value::Object(map)) => {
            out.extend(object_steps(
                map,
                |key| valid && object.is_required(key),
                |key, v| match object.property(key) {
                    Some(prop) => simplify(prop, v),
                    None => object
                        .additional
                        .as_deref()
                        .map_or_else(|| simplify_any(v), |extra| simplify(extra, v)),
                },
            ));
        }
        (_, v) => out.extend(simplify_any(v)),
    }

    if valid {
        out.retain(|c| conforms(schema, c));
    }
    finish(out, value)
}

/// Schema-free simplification, for values that do not match their schema.
#[must_use]
pub fn simplify_any(value: &Value) -> Vec<Value> {
    let out = match value {
        Value::Null => Vec::new(),
        Value::Bool(b) => if *b { vec![Value::Bool(false)] } else { Vec::new() },
        Value::Number(_) if value.is_i64() || value.is_u64() => integer_steps(value, 0, 1),
        Value::Number(_) => number_steps(value, 0.0),
        Value::String(s) => string_steps(s, 0),
        Value::Array(items) => array_steps(items, 0, simplify_any),
        Value::Object(map) => object_steps(map, |_| false, |_, v| simplify_any(v)),
    };
    finish(out, value)
}

/// Drop duplicates and the unchanged value, keeping order.
fn finish(candidates: Vec<Value>, original: &Value) -> Vec<Value> {
    let mut out: Vec<Value> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        if candidate != *original && !out.contains(&candidate) {
            out.push(candidate);
        }
    }
    out
}

#[allow(clippy::cast_precision_loss)]
fn integer_steps(value: &Value, target: i64, step: i64) -> Vec<Value> {
    let Some(n) = value.as_i64() else {
        return number_steps(value, target as f64);
    };
    if n == target {
        return Vec::new();
    }
    let (n, t, step) = (i128::from(n), i128::from(target), i128::from(step.max(1)));
    let toward = if n > t { -1 } else { 1 };
    [t, t + (n - t) / 2, n + toward * step, n + toward]
        .into_iter()
        .filter(|c| (c - t).abs() < (n - t).abs())
        .filter_map(|c| i64::try_from(c).ok())
        .map(Value::from)
        .collect()
}

fn number_steps(value: &Value, target: f64) -> Vec<Value> {
    let Some(x) = value.as_f64() else {
        return Vec::new();
    };
    let distance = (x - target).abs();
    if distance == 0.0 || !x.is_finite() {
        return Vec::new();
    }
    let mut candidates = vec![target];
    if x.fract() != 0.0 {
        candidates.push(x.trunc());
    }
    if distance > 1e-6 {
        candidates.push(target + (x - target) / 2.0);
    }
    if distance > 1.0 {
        candidates.push(x - (x - target).signum());
    }
    candidates
        .into_iter()
        .filter(|c| c.is_finite() && (c - target).abs() < distance)
        .map(|c| json!(c))
        .collect()
}

fn string_steps(s: &str, floor: usize) -> Vec<Value> {
    let len = s.chars().count();
    let truncate = |n: usize| Value::String(s.chars().take(n).collect());
    let mut out = Vec::new();
    if len > floor {
        out.push(truncate(floor));
        out.push(truncate(floor + (len - floor) / 2));
        out.push(truncate(len - 1));
    }
    if s.chars().any(|c| c != 'a') {
        out.push(Value::String("a".repeat(len)));
    }
    out
}

fn array_steps(items: &[Value], floor: usize, simplify_item: impl Fn(&Value) -> Vec<Value>) -> Vec<Value> {
    let mut out = Vec::new();
    let len = items.len();
    if len > floor {
        out.push(Value::Array(items[..floor].to_vec()));
        out.push(Value::Array(items[..floor + (len - floor) / 2].to_vec()));
        for skip in 0..len {
            let mut rest = items.to_vec();
            rest.remove(skip);
            out.push(Value::Array(rest));
        }
    }
    for (i, item) in items.iter().enumerate() {
        for simpler in simplify_item(item) {
            let mut next = items.to_vec();
            next[i] = simpler;
            out.push(Value::Array(next));
        }
    }
    out
}

fn object_steps(
    map: &Map<String, Value>,
    keep: impl Fn(&str) -> bool,
    simplify_field: impl Fn(&str, &Value) -> Vec<Value>,
) -> Vec<Value> {
    let mut out = Vec::new();
    for key in map.keys().filter(|k| !keep(k.as_str())) {
        let mut rest = map.clone();
        rest.shift_remove(key);
        out.push(Value::Object(rest));
    }
    for (key, v) in map {
        for simpler in simplify_field(key, v) {
            let mut next = map.clone();
            next.insert(key.clone(), simpler);
            out.push(Value::Object(next));
        }
    }
    out
}

// ── Negative probes ──

/// Values of the wrong shape for `param`, each failing its conformance check.
///
/// Body parameters get JSON values of other types (and objects with one
/// property confused); other locations get text the server cannot parse
/// as the declared type.
#[must_use]
pub fn type_confusion_values(param: &Parameter) -> Vec<Value> {
    let probes = match param.location {
        ParamLocation::Body => json_probes(&param.schema),
        _ => text_probes(&param.schema),
    };
    probes
        .into_iter()
        .filter(|probe| !conforms_parameter(param, probe))
        .collect()
}

#[allow(clippy::approx_constant)]
fn json_probes(schema: &Schema) -> Vec<Value> {
    let mut probes = vec![
        Value::Null,
        json!(true),
        json!(0),
        json!(3.14),
        json!(""),
        json!("abc"),
        json!([]),
        json!({}),
    ];
    match schema {
        Schema::Integer(range) => {
            probes.extend(range.min.and_then(|m| m.checked_sub(1)).map(Value::from));
            probes.extend(range.max.and_then(|m| m.checked_add(1)).map(Value::from));
        }
        Schema::String(rules) => {
            if let Some(max) = rules.max_length {
                probes.push(Value::String("a".repeat(max + 1)));
            }
        }
        Schema::Enum(_) => probes.push(json!("__INVALID_ENUM_VALUE__")),
        Schema::Object(object) => {
            let base = canonical(schema);
            if let Value::Object(map) = &base {
                for name in object.required.iter().take(3) {
                    let mut missing = map.clone();
                    missing.shift_remove(name);
                    probes.push(Value::Object(missing));
                }
            }
            for (name, prop) in object.properties.iter().take(3) {
                if let (Value::Object(map), Some(probe)) =
                    (&base, json_probes(prop).into_iter().find(|p| !conforms(prop, p)))
                {
                    let mut confused = map.clone();
                    confused.insert(name.clone(), probe);
                    probes.push(Value::Object(confused));
                }
            }
        }
        _ => {}
    }
    probes
}

fn text_probes(schema: &Schema) -> Vec<Value> {
    let mut probes: Vec<String> = ["", "abc", "1.5", "true", "-", "null", "{}"]
        .iter()
        .map(ToString::to_string)
        .collect();
    match schema {
        Schema::Integer(range) => {
            probes.extend(range.min.and_then(|m| m.checked_sub(1)).map(|v| v.to_string()));
            probes.extend(range.max.and_then(|m| m.checked_add(1)).map(|v| v.to_string()));
            probes.push("99999999999999999999".into());
        }
        Schema::String(rules) => {
            if let Some(max) = rules.max_length {
                probes.push("a".repeat(max + 1));
            }
        }
        Schema::Enum(_) => probes.push("__INVALID_ENUM_VALUE__".into()),
        _ => {}
    }
    probes.into_iter().map(Value::String).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::schema::SchemaParser;
    use crate::spec::{CollectionFormat, HttpMethod};
    use std::collections::BTreeMap;

    fn schema(node: Value) -> Schema {
        SchemaParser::new(&json!({})).parse(&node).unwrap()
    }

    fn rng(seed: u64) -> SmallRng {
        SmallRng::seed_from_u64(seed)
    }

    fn param(name: &str, location: ParamLocation, node: Value, required: bool) -> Parameter {
        Parameter {
            name: name.into(),
            location,
            schema: schema(node),
            required,
            collection_format: CollectionFormat::Csv,
        }
    }

    fn model(parameters: Vec<Parameter>) -> Arc<SpecModel> {
        Arc::new(SpecModel {
            base_path: String::new(),
            operations: vec![Operation {
                method: HttpMethod::Get,
                path_template: "/items".into(),
                operation_id: None,
                parameters,
                consumes: Vec::new(),
                produces: Vec::new(),
                responses: BTreeMap::new(),
                response_classes: Vec::new(),
                has_default_response: false,
            }],
        })
    }

    #[test]
    fn integers_respect_bounds_and_multiples() {
        let s = schema(json!({"type": "integer", "minimum": 3, "maximum": 40, "multipleOf": 7}));
        let mut r = rng(1);
        for _ in 0..500 {
            let v = generate_value(&s, &mut r);
            assert!(conforms(&s, &v), "{v}");
        }
    }

    #[test]
    fn exclusive_number_bounds_never_hit() {
        let s = schema(json!({"type": "number", "minimum": 0, "maximum": 1, "exclusiveMinimum": true, "exclusiveMaximum": true}));
        let mut r = rng(2);
        for _ in 0..500 {
            let v = generate_value(&s, &mut r).as_f64().unwrap();
            assert!(v > 0.0 && v < 1.0, "{v}");
        }
    }

    #[test]
    fn full_f64_range_does_not_overflow() {
        let s = schema(json!({"type": "number", "minimum": -1.797_693_134_862_315_7e308, "maximum": 1.797_693_134_862_315_7e308}));
        let mut r = rng(1);
        for _ in 0..500 {
            let v = generate_value(&s, &mut r);
            assert!(conforms(&s, &v), "{v}");
        }
        assert!(sample_between(f64::MIN, f64::MAX, &mut r).is_finite());
        assert_eq!(midpoint(f64::MIN, f64::MAX), 0.0);
    }

    #[test]
    fn huge_multiple_of_window_stays_in_range() {
        let s = schema(json!({"type": "number", "minimum": -1e300, "maximum": 1e300, "multipleOf": 1e-10}));
        let mut r = rng(4);
        for _ in 0..200 {
            let v = generate_value(&s, &mut r).as_f64().unwrap();
            assert!(v.is_finite() && (-1e300..=1e300).contains(&v), "{v}");
        }
    }

    #[test]
    fn strings_respect_length_pattern_and_format() {
        let cases = [
            json!({"type": "string", "minLength": 2, "maxLength": 5}),
            json!({"type": "string", "pattern": "^[a-f0-9]{4}$"}),
            json!({"type": "string", "format": "date"}),
            json!({"type": "string", "format": "date-time"}),
            json!({"type": "string", "format": "uuid"}),
            json!({"type": "string", "format": "email"}),
            json!({"type": "string", "format": "ipv4"}),
            json!({"type": "string", "format": "byte"}),
            json!({"type": "string", "format": "uri"}),
            json!({"type": "string", "format": "hostname"}),
        ];
        let mut r = rng(3);
        for node in cases {
            let s = schema(node.clone());
            for _ in 0..200 {
                let v = generate_value(&s, &mut r);
                assert!(conforms(&s, &v), "{node} produced {v}");
            }
        }
    }

    #[test]
    fn header_values_are_printable_ascii() {
        let p = param("X-Trace", ParamLocation::Header, json!({"type": "string", "maxLength": 64}), true);
        let mut r = rng(4);
        for _ in 0..300 {
            let v = generate_parameter(&p, &mut r);
            let text = v.as_str().unwrap();
            assert!(text.bytes().all(|b| (0x20..=0x7e).contains(&b)), "{text:?}");
        }
    }

    #[test]
    fn objects_always_carry_required_properties() {
        let s = schema(json!({
            "type": "object",
            "required": ["id"],
            "properties": {"id": {"type": "integer"}, "tags": {"type": "array", "items": {"type": "string"}, "maxItems": 2}}
        }));
        let mut r = rng(5);
        let mut saw_optional = false;
        for _ in 0..200 {
            let v = generate_value(&s, &mut r);
            assert!(v.get("id").is_some());
            saw_optional |= v.get("tags").is_some();
            assert!(conforms(&s, &v), "{v}");
        }
        assert!(saw_optional);
    }

    #[test]
    fn unique_items_are_distinct() {
        let s = schema(json!({"type": "array", "items": {"type": "integer", "minimum": 0, "maximum": 50}, "minItems": 3, "maxItems": 5, "uniqueItems": true}));
        let mut r = rng(6);
        for _ in 0..200 {
            let v = generate_value(&s, &mut r);
            assert!(conforms(&s, &v), "{v}");
        }
    }

    #[test]
    fn generator_is_deterministic_per_seed() {
        let spec = model(vec![
            param("limit", ParamLocation::Query, json!({"type": "integer"}), false),
            param("q", ParamLocation::Query, json!({"type": "string"}), true),
        ]);
        let a: Vec<CaseInstance> = CaseGenerator::new(Arc::clone(&spec), 42).take(50).collect();
        let b: Vec<CaseInstance> = CaseGenerator::new(Arc::clone(&spec), 42).take(50).collect();
        let c: Vec<CaseInstance> = CaseGenerator::new(spec, 43).take(50).collect();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn restart_replays_the_sequence() {
        let spec = model(vec![param("q", ParamLocation::Query, json!({"type": "string"}), true)]);
        let mut generator = CaseGenerator::new(spec, 9);
        let first: Vec<CaseInstance> = generator.by_ref().take(10).collect();
        generator.restart();
        let again: Vec<CaseInstance> = generator.take(10).collect();
        assert_eq!(first, again);
    }

    #[test]
    fn required_parameters_always_present_optional_sometimes() {
        let spec = model(vec![
            param("id", ParamLocation::Query, json!({"type": "integer"}), true),
            param("verbose", ParamLocation::Query, json!({"type": "boolean"}), false),
        ]);
        let cases: Vec<CaseInstance> = CaseGenerator::new(spec, 7).take(200).collect();
        assert!(cases.iter().all(|c| c.values[0].is_some()));
        assert!(cases.iter().any(|c| c.values[1].is_some()));
        assert!(cases.iter().any(|c| c.values[1].is_none()));
        assert!(cases.iter().all(|c| c.deviation.is_none()));
    }

    #[test]
    fn empty_spec_yields_nothing() {
        let spec = Arc::new(SpecModel {
            base_path: String::new(),
            operations: Vec::new(),
        });
        assert!(CaseGenerator::new(spec, 1).next().is_none());
    }

    #[test]
    fn negative_cases_confuse_exactly_one_parameter() {
        let spec = model(vec![
            param("limit", ParamLocation::Query, json!({"type": "integer", "minimum": 1}), true),
            param("name", ParamLocation::Query, json!({"type": "string", "maxLength": 5}), true),
        ]);
        let op = &spec.operations[0];
        let cases: Vec<CaseInstance> = CaseGenerator::new(Arc::clone(&spec), 11)
            .with_negative_ratio(1.0)
            .take(100)
            .collect();
        for case in &cases {
            let deviation = case.deviation.as_ref().expect("every case is negative");
            for (i, p) in op.parameters.iter().enumerate() {
                let value = case.value(i).unwrap();
                assert_eq!(
                    conforms_parameter(p, value),
                    i != deviation.parameter,
                    "{p:?} = {value} in {case:?}"
                );
            }
        }
    }

    #[test]
    fn text_conformance_parses_like_a_server() {
        let limit = param("limit", ParamLocation::Query, json!({"type": "integer", "maximum": 10}), true);
        assert!(conforms_parameter(&limit, &json!("7")));
        assert!(conforms_parameter(&limit, &json!(7)));
        assert!(!conforms_parameter(&limit, &json!("abc")));
        assert!(!conforms_parameter(&limit, &json!("11")));

        let body = param("body", ParamLocation::Body, json!({"type": "integer"}), true);
        assert!(!conforms_parameter(&body, &json!("7")));
    }

    #[test]
    fn confusion_skips_unconstrained_parameters() {
        let anything = param("x", ParamLocation::Query, json!({}), true);
        assert!(type_confusion_values(&anything).is_empty());
        let plain = param("q", ParamLocation::Query, json!({"type": "string"}), true);
        assert!(type_confusion_values(&plain).is_empty());
        let body = param("body", ParamLocation::Body, json!({"type": "object", "required": ["id"], "properties": {"id": {"type": "integer"}}}), true);
        let probes = type_confusion_values(&body);
        assert!(probes.contains(&json!({})));
        assert!(probes.contains(&json!({"id": null})));
    }

    #[test]
    fn canonical_values_conform() {
        let cases = [
            json!({"type": "integer", "minimum": 5, "multipleOf": 3}),
            json!({"type": "integer", "maximum": -4}),
            json!({"type": "number", "minimum": 0, "exclusiveMinimum": true}),
            json!({"type": "number", "minimum": 2.5, "maximum": 3.0}),
            json!({"type": "string", "minLength": 3}),
            json!({"type": "string", "format": "date-time"}),
            json!({"type": "array", "items": {"type": "boolean"}, "minItems": 2}),
            json!({"enum": ["b", "a"]}),
        ];
        for node in cases {
            let s = schema(node.clone());
            let value = canonical(&s);
            assert!(conforms(&s, &value), "{node} canonical {value}");
        }
    }

    #[test]
    fn simplify_moves_toward_simple_values() {
        let s = schema(json!({"type": "integer", "minimum": 3}));
        let candidates = simplify(&s, &json!(1000));
        assert_eq!(candidates[0], json!(3));
        assert!(candidates.iter().all(|c| conforms(&s, c)));

        let s = schema(json!({"type": "string", "minLength": 2}));
        let candidates = simplify(&s, &json!("hello"));
        assert_eq!(candidates[0], json!("aa"));
        assert!(candidates.iter().all(|c| c.as_str().unwrap().chars().count() >= 2));

        let s = schema(json!({"enum": ["x", "y", "z"]}));
        assert_eq!(simplify(&s, &json!("z")), vec![json!("x"), json!("y")]);
        assert!(simplify(&s, &json!("x")).is_empty());
    }

    #[test]
    fn simplify_drops_only_optional_properties() {
        let s = schema(json!({
            "type": "object",
            "required": ["id"],
            "properties": {"id": {"type": "integer"}, "name": {"type": "string"}}
        }));
        let candidates = simplify(&s, &json!({"id": 5, "name": "rex"}));
        assert!(candidates.contains(&json!({"id": 5})));
        assert!(candidates.iter().all(|c| c.get("id").is_some()));
    }

    #[test]
    fn simplify_invalid_value_ignores_constraints() {
        let s = schema(json!({"type": "string", "maxLength": 10}));
        let long = "x".repeat(40);
        let candidates = simplify(&s, &json!(long));
        assert!(candidates.contains(&json!("")));
        assert!(candidates.contains(&json!("x".repeat(20))));
    }

    #[test]
    fn simplified_values_are_done_eventually() {
        let s = schema(json!({"type": "array", "items": {"type": "integer"}}));
        let mut value = json!([17, -250, 3]);
        let mut rounds = 0;
        while let Some(next) = simplify(&s, &value).into_iter().next() {
            value = next;
            rounds += 1;
            assert!(rounds < 100, "did not terminate");
        }
        assert_eq!(value, json!([]));
    }
}
