//! Value matchers and the JSON-or-matcher template tree.
//!
//! A response body expectation is a [`Template`]: plain JSON with
//! [`Matcher`] nodes embedded wherever the consumer only cares about the
//! shape of a value. Matching walks the whole tree once and collects every
//! [`Mismatch`] it finds instead of stopping at the first one.

use crate::error::{PactError, PactResult};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Runtime kind of a JSON value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    /// JSON string
    String,
    /// Any JSON number
    Number,
    /// A JSON number without a fractional part
    Integer,
    /// JSON boolean
    Boolean,
    /// JSON null
    Null,
    /// JSON array
    Array,
    /// JSON object
    Object,
}

impl ValueKind {
    /// Kind of a concrete value. Numbers always report [`ValueKind::Number`].
    #[must_use]
    pub const fn of(value: &Value) -> Self {
        match value {
            Value::String(_) => Self::String,
            Value::Number(_) => Self::Number,
            Value::Bool(_) => Self::Boolean,
            Value::Null => Self::Null,
            Value::Array(_) => Self::Array,
            Value::Object(_) => Self::Object,
        }
    }

    /// Whether `value` belongs to this kind.
    #[must_use]
    pub fn accepts(self, value: &Value) -> bool {
        match (self, value) {
            (Self::Integer, Value::Number(n)) => n.is_i64() || n.is_u64(),
            (kind, other) => Self::of(other) == kind,
        }
    }

    /// Lowercase name used in documents and messages.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
            Self::Null => "null",
            Self::Array => "array",
            Self::Object => "object",
        }
    }

    fn placeholder(self) -> Value {
        match self {
            Self::String => Value::String(String::new()),
            Self::Number | Self::Integer => Value::from(0),
            Self::Boolean => Value::Bool(false),
            Self::Null => Value::Null,
            Self::Array => Value::Array(Vec::new()),
            Self::Object => Value::Object(Map::new()),
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One step into a JSON document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSegment {
    /// Object key
    Key(String),
    /// Array index
    Index(usize),
}

/// Location of a value inside a response, rendered as `$.body.items[0].id`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JsonPath(Vec<PathSegment>);

impl JsonPath {
    /// The document root.
    #[must_use]
    pub const fn root() -> Self {
        Self(Vec::new())
    }

    /// Path extended by an object key.
    #[must_use]
    pub fn key(&self, key: impl Into<String>) -> Self {
        let mut segments = self.0.clone();
        segments.push(PathSegment::Key(key.into()));
        Self(segments)
    }

    /// Path extended by an array index.
    #[must_use]
    pub fn index(&self, index: usize) -> Self {
        let mut segments = self.0.clone();
        segments.push(PathSegment::Index(index));
        Self(segments)
    }

    /// Segments from the root outwards.
    #[must_use]
    pub fn segments(&self) -> &[PathSegment] {
        &self.0
    }

    /// Whether any segment is the object key `key`.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.0
            .iter()
            .any(|segment| matches!(segment, PathSegment::Key(k) if k == key))
    }

    /// Last segment, if any.
    #[must_use]
    pub fn last(&self) -> Option<&PathSegment> {
        self.0.last()
    }
}

impl fmt::Display for JsonPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("$")?;
        for segment in &self.0 {
            match segment {
                PathSegment::Key(key) => write!(f, ".{key}")?,
                PathSegment::Index(index) => write!(f, "[{index}]")?,
            }
        }
        Ok(())
    }
}

/// Why a value was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MismatchKind {
    /// Literal or exact value is different
    ValueDiffers,
    /// Value has the wrong runtime kind
    TypeDiffers {
        /// Kind the expectation asked for
        #[serde(rename = "expected_kind")]
        expected: ValueKind,
        /// Kind that was found
        #[serde(rename = "actual_kind")]
        actual: ValueKind,
    },
    /// Regex matcher applied to a non-string
    NotAString,
    /// String does not fully match the pattern
    PatternMismatch,
    /// The pattern itself does not compile
    InvalidPattern,
    /// Key required by the template is absent
    MissingField,
    /// Array length differs outside a `Like` subtree
    LengthDiffers {
        /// Expected element count
        #[serde(rename = "expected_len")]
        expected: usize,
        /// Actual element count
        #[serde(rename = "actual_len")]
        actual: usize,
    },
    /// HTTP status differs
    StatusDiffers,
    /// Expected response header is absent
    MissingHeader,
    /// Expected a body but the provider sent none
    MissingBody,
    /// The provider could not be reached or timed out
    ProviderUnreachable,
    /// The provider state precondition could not be established
    StateSetupFailed,
    /// The verification task ended without producing a result
    VerificationAborted,
    /// The recorded request could not be sent as written
    InvalidRequest,
}

impl fmt::Display for MismatchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ValueDiffers => f.write_str("value differs"),
            Self::TypeDiffers { expected, actual } => {
                write!(f, "type differs: expected {expected}, got {actual}")
            }
            Self::NotAString => f.write_str("not a string"),
            Self::PatternMismatch => f.write_str("pattern mismatch"),
            Self::InvalidPattern => f.write_str("invalid pattern"),
            Self::MissingField => f.write_str("missing field"),
            Self::LengthDiffers { expected, actual } => {
                write!(f, "length differs: expected {expected}, got {actual}")
            }
            Self::StatusDiffers => f.write_str("status differs"),
            Self::MissingHeader => f.write_str("missing header"),
            Self::MissingBody => f.write_str("missing body"),
            Self::ProviderUnreachable => f.write_str("provider unreachable"),
            Self::StateSetupFailed => f.write_str("state setup failed"),
            Self::VerificationAborted => f.write_str("verification aborted"),
            Self::InvalidRequest => f.write_str("invalid request"),
        }
    }
}

/// A single structural disagreement between expectation and actual value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mismatch {
    /// Where the disagreement was found
    pub path: JsonPath,
    /// What kind of disagreement it is
    #[serde(flatten)]
    pub kind: MismatchKind,
    /// Human description of what was expected
    pub expected: String,
    /// The actual value, absent when nothing was there
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual: Option<Value>,
}

impl Mismatch {
    /// Create a mismatch.
    #[must_use]
    pub fn new(
        path: JsonPath,
        kind: MismatchKind,
        expected: impl Into<String>,
        actual: Option<Value>,
    ) -> Self {
        Self {
            path,
            kind,
            expected: expected.into(),
            actual,
        }
    }
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} (expected {}", self.path, self.kind, self.expected)?;
        match &self.actual {
            Some(actual) => write!(f, ", actual {actual})"),
            None => f.write_str(", actual nothing)"),
        }
    }
}

/// Outcome of matching one value: either clean or a list of mismatches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchResult {
    mismatches: Vec<Mismatch>,
}

impl MatchResult {
    /// True when no mismatch was found.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.mismatches.is_empty()
    }

    /// Every mismatch found, in tree order.
    #[must_use]
    pub fn mismatches(&self) -> &[Mismatch] {
        &self.mismatches
    }

    /// Take ownership of the mismatches.
    #[must_use]
    pub fn into_mismatches(self) -> Vec<Mismatch> {
        self.mismatches
    }
}

impl From<Vec<Mismatch>> for MatchResult {
    fn from(mismatches: Vec<Mismatch>) -> Self {
        Self { mismatches }
    }
}

/// How plain template nodes are compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// Literals must be equal, arrays element-wise
    Equality,
    /// Inside `Like`: literals give the kind, arrays use their first element
    Type,
}

/// A value-matching rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "pact:matcher", rename_all = "lowercase")]
pub enum Matcher {
    /// Actual must deep-equal `value`
    Exact {
        /// Expected value
        value: Value,
    },
    /// Actual must be of `kind`
    #[serde(rename = "type")]
    TypeOf {
        /// Required kind
        kind: ValueKind,
        /// Documentation example, never checked
        #[serde(default, skip_serializing_if = "Option::is_none")]
        example: Option<Value>,
    },
    /// Actual must be a string fully matching `pattern`
    Regex {
        /// Regular expression, implicitly anchored at both ends
        pattern: String,
        /// Documentation example, never checked
        example: String,
    },
    /// Actual must structurally resemble `template`
    Like {
        /// Shape to compare against
        template: Box<Template>,
    },
}

impl Matcher {
    /// Exact deep equality.
    #[must_use]
    pub fn exact(value: impl Into<Value>) -> Self {
        Self::Exact {
            value: value.into(),
        }
    }

    /// Kind-only match without an example.
    #[must_use]
    pub const fn type_of(kind: ValueKind) -> Self {
        Self::TypeOf {
            kind,
            example: None,
        }
    }

    /// Any integral number.
    #[must_use]
    pub fn integer(example: i64) -> Self {
        Self::TypeOf {
            kind: ValueKind::Integer,
            example: Some(Value::from(example)),
        }
    }

    /// Any number.
    #[must_use]
    pub fn decimal(example: f64) -> Self {
        Self::TypeOf {
            kind: ValueKind::Number,
            example: Some(Value::from(example)),
        }
    }

    /// Any boolean.
    #[must_use]
    pub fn boolean(example: bool) -> Self {
        Self::TypeOf {
            kind: ValueKind::Boolean,
            example: Some(Value::Bool(example)),
        }
    }

    /// Any string.
    #[must_use]
    pub fn string(example: impl Into<String>) -> Self {
        Self::TypeOf {
            kind: ValueKind::String,
            example: Some(Value::String(example.into())),
        }
    }

    /// String matching `pattern` in full.
    #[must_use]
    pub fn regex(pattern: impl Into<String>, example: impl Into<String>) -> Self {
        Self::Regex {
            pattern: pattern.into(),
            example: example.into(),
        }
    }

    /// Structural resemblance to `template`.
    #[must_use]
    pub fn like(template: impl Into<Template>) -> Self {
        Self::Like {
            template: Box::new(template.into()),
        }
    }

    /// Match `actual`, reporting paths relative to the root.
    #[must_use]
    pub fn matches(&self, actual: &Value) -> MatchResult {
        self.matches_at(actual, &JsonPath::root())
    }

    /// Match `actual`, reporting paths relative to `path`.
    #[must_use]
    pub fn matches_at(&self, actual: &Value, path: &JsonPath) -> MatchResult {
        let mut mismatches = Vec::new();
        self.collect(actual, path, &mut mismatches);
        MatchResult::from(mismatches)
    }

    /// Check that the matcher is usable: the pattern compiles and the
    /// example satisfies it.
    ///
    /// # Errors
    ///
    /// Returns [`PactError::InvalidContract`] naming the offending pattern.
    pub fn validate(&self) -> PactResult<()> {
        match self {
            Self::Regex { pattern, example } => {
                let re = anchored(pattern).map_err(|err| {
                    PactError::invalid_contract(format!("invalid pattern /{pattern}/: {err}"))
                })?;
                if re.is_match(example) {
                    Ok(())
                } else {
                    Err(PactError::invalid_contract(format!(
                        "example '{example}' does not match /{pattern}/"
                    )))
                }
            }
            Self::Like { template } => template.validate(),
            Self::Exact { .. } | Self::TypeOf { .. } => Ok(()),
        }
    }

    /// Example value a consumer would see.
    #[must_use]
    pub fn example(&self) -> Value {
        match self {
            Self::Exact { value } => value.clone(),
            Self::TypeOf { kind, example } => example.clone().unwrap_or_else(|| kind.placeholder()),
            Self::Regex { example, .. } => Value::String(example.clone()),
            Self::Like { template } => template.example(),
        }
    }

    /// Short human description used in mismatch reports.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Exact { value } => value.to_string(),
            Self::TypeOf { kind, .. } => format!("any {kind}"),
            Self::Regex { pattern, .. } => format!("string matching /{pattern}/"),
            Self::Like { template } => format!("like {}", template.example()),
        }
    }

    fn collect(&self, actual: &Value, path: &JsonPath, out: &mut Vec<Mismatch>) {
        match self {
            Self::Exact { value } => {
                if value != actual {
                    out.push(Mismatch::new(
                        path.clone(),
                        MismatchKind::ValueDiffers,
                        value.to_string(),
                        Some(actual.clone()),
                    ));
                }
            }
            Self::TypeOf { kind, .. } => {
                if !kind.accepts(actual) {
                    out.push(type_mismatch(path, *kind, actual));
                }
            }
            Self::Regex { pattern, .. } => {
                let Value::String(text) = actual else {
                    out.push(Mismatch::new(
                        path.clone(),
                        MismatchKind::NotAString,
                        self.describe(),
                        Some(actual.clone()),
                    ));
                    return;
                };
                let kind = match anchored(pattern) {
                    Ok(re) if re.is_match(text) => return,
                    Ok(_) => MismatchKind::PatternMismatch,
                    Err(_) => MismatchKind::InvalidPattern,
                };
                out.push(Mismatch::new(
                    path.clone(),
                    kind,
                    self.describe(),
                    Some(actual.clone()),
                ));
            }
            Self::Like { template } => template.collect(actual, path, Mode::Type, out),
        }
    }
}

fn anchored(pattern: &str) -> Result<Regex, regex::Error> {
    Regex::new(&format!("^(?:{pattern})$"))
}

fn type_mismatch(path: &JsonPath, expected: ValueKind, actual: &Value) -> Mismatch {
    Mismatch::new(
        path.clone(),
        MismatchKind::TypeDiffers {
            expected,
            actual: ValueKind::of(actual),
        },
        format!("any {expected}"),
        Some(actual.clone()),
    )
}

/// Expected value tree: JSON literals with [`Matcher`] nodes embedded.
///
/// Serialises to plain JSON where matcher nodes are objects carrying a
/// `pact:matcher` tag, so a document round-trips without losing matchers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Template {
    /// A matcher node
    Matcher(Matcher),
    /// A plain object whose values are templates
    Object(BTreeMap<String, Template>),
    /// A plain array whose elements are templates
    Array(Vec<Template>),
    /// A scalar literal
    Literal(Value),
}

impl Template {
    /// Build an object template from key/template pairs.
    #[must_use]
    pub fn object<K, T>(fields: impl IntoIterator<Item = (K, T)>) -> Self
    where
        K: Into<String>,
        T: Into<Self>,
    {
        Self::Object(
            fields
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        )
    }

    /// Whether any matcher appears anywhere in the tree.
    #[must_use]
    pub fn has_matchers(&self) -> bool {
        match self {
            Self::Matcher(_) => true,
            Self::Object(fields) => fields.values().any(Self::has_matchers),
            Self::Array(items) => items.iter().any(Self::has_matchers),
            Self::Literal(_) => false,
        }
    }

    /// Match `actual` with matcher semantics, reporting paths relative to the root.
    #[must_use]
    pub fn matches(&self, actual: &Value) -> MatchResult {
        self.matches_at(actual, &JsonPath::root())
    }

    /// Match `actual` with matcher semantics, reporting paths relative to `path`.
    ///
    /// Outside a `Like` subtree, plain objects require every listed key and
    /// ignore extra keys, plain arrays compare element-wise, and scalar
    /// literals must be equal.
    #[must_use]
    pub fn matches_at(&self, actual: &Value, path: &JsonPath) -> MatchResult {
        let mut mismatches = Vec::new();
        self.collect(actual, path, Mode::Equality, &mut mismatches);
        MatchResult::from(mismatches)
    }

    /// Validate every matcher in the tree.
    ///
    /// # Errors
    ///
    /// Returns the first invalid matcher found.
    pub fn validate(&self) -> PactResult<()> {
        match self {
            Self::Matcher(matcher) => matcher.validate(),
            Self::Object(fields) => fields.values().try_for_each(Self::validate),
            Self::Array(items) => items.iter().try_for_each(Self::validate),
            Self::Literal(_) => Ok(()),
        }
    }

    /// Reify the tree into the example value a consumer would see.
    #[must_use]
    pub fn example(&self) -> Value {
        match self {
            Self::Matcher(matcher) => matcher.example(),
            Self::Object(fields) => Value::Object(
                fields
                    .iter()
                    .map(|(key, value)| (key.clone(), value.example()))
                    .collect(),
            ),
            Self::Array(items) => Value::Array(items.iter().map(Self::example).collect()),
            Self::Literal(value) => value.clone(),
        }
    }

    /// Short human description used in mismatch reports.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Matcher(matcher) => matcher.describe(),
            Self::Object(_) | Self::Array(_) | Self::Literal(_) => self.example().to_string(),
        }
    }

    fn collect(&self, actual: &Value, path: &JsonPath, mode: Mode, out: &mut Vec<Mismatch>) {
        match self {
            Self::Matcher(matcher) => matcher.collect(actual, path, out),
            Self::Literal(expected) => match mode {
                Mode::Equality if expected != actual => out.push(Mismatch::new(
                    path.clone(),
                    MismatchKind::ValueDiffers,
                    expected.to_string(),
                    Some(actual.clone()),
                )),
                Mode::Type => {
                    let kind = ValueKind::of(expected);
                    if !kind.accepts(actual) {
                        out.push(type_mismatch(path, kind, actual));
                    }
                }
                Mode::Equality => {}
            },
            Self::Object(fields) => {
                let Value::Object(map) = actual else {
                    out.push(type_mismatch(path, ValueKind::Object, actual));
                    return;
                };
                for (key, child) in fields {
                    let child_path = path.key(key.as_str());
                    match map.get(key) {
                        Some(value) => child.collect(value, &child_path, mode, out),
                        None => out.push(Mismatch::new(
                            child_path,
                            MismatchKind::MissingField,
                            child.describe(),
                            None,
                        )),
                    }
                }
            }
            Self::Array(items) => {
                let Value::Array(values) = actual else {
                    out.push(type_mismatch(path, ValueKind::Array, actual));
                    return;
                };
                match mode {
                    Mode::Type => {
                        if let Some(first) = items.first() {
                            for (index, value) in values.iter().enumerate() {
                                first.collect(value, &path.index(index), mode, out);
                            }
                        }
                    }
                    Mode::Equality => {
                        if items.len() != values.len() {
                            out.push(Mismatch::new(
                                path.clone(),
                                MismatchKind::LengthDiffers {
                                    expected: items.len(),
                                    actual: values.len(),
                                },
                                self.describe(),
                                Some(actual.clone()),
                            ));
                        }
                        for (index, (item, value)) in items.iter().zip(values).enumerate() {
                            item.collect(value, &path.index(index), mode, out);
                        }
                    }
                }
            }
        }
    }
}

impl From<Matcher> for Template {
    fn from(matcher: Matcher) -> Self {
        Self::Matcher(matcher)
    }
}

impl From<Value> for Template {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(map) => Self::Object(
                map.into_iter()
                    .map(|(key, value)| (key, Self::from(value)))
                    .collect(),
            ),
            Value::Array(items) => Self::Array(items.into_iter().map(Self::from).collect()),
            scalar => Self::Literal(scalar),
        }
    }
}

impl From<&str> for Template {
    fn from(value: &str) -> Self {
        Self::Literal(Value::String(value.to_string()))
    }
}

impl From<String> for Template {
    fn from(value: String) -> Self {
        Self::Literal(Value::String(value))
    }
}

impl From<bool> for Template {
    fn from(value: bool) -> Self {
        Self::Literal(Value::Bool(value))
    }
}

impl From<i64> for Template {
    fn from(value: i64) -> Self {
        Self::Literal(Value::from(value))
    }
}
