//! Tagged value codec shared by controller and worker.
//!
//! A [`Value`] is the in-process representation of an argument or result.
//! [`encode`] turns it into a [`TaggedValue`] (a JSON payload plus a
//! [`TypeTag`]) that can cross the worker boundary, and [`decode`] reverses it.
//! The tag alone decides how the payload is parsed.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::handle::{Lint, LintConfig, OpaqueHandle, Span, Suggestion};

/// Closed set of kinds a [`TaggedValue`] can carry.
///
/// Serialized as a bare string. Tags this build does not know are kept as
/// [`TypeTag::Unknown`] so decoding can report them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TypeTag {
    String,
    Number,
    Boolean,
    Undefined,
    Array,
    Lint,
    Suggestion,
    Span,
    LintConfig,
    Unknown(String),
}

impl TypeTag {
    pub fn as_str(&self) -> &str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Undefined => "undefined",
            Self::Array => "Array",
            Self::Lint => "Lint",
            Self::Suggestion => "Suggestion",
            Self::Span => "Span",
            Self::LintConfig => "LintConfig",
            Self::Unknown(tag) => tag,
        }
    }

    /// True for the engine-owned kinds that travel via export/import.
    pub fn is_handle(&self) -> bool {
        matches!(
            self,
            Self::Lint | Self::Suggestion | Self::Span | Self::LintConfig
        )
    }
}

impl From<String> for TypeTag {
    fn from(tag: String) -> Self {
        match tag.as_str() {
            "string" => Self::String,
            "number" => Self::Number,
            "boolean" => Self::Boolean,
            "undefined" => Self::Undefined,
            "Array" => Self::Array,
            "Lint" => Self::Lint,
            "Suggestion" => Self::Suggestion,
            "Span" => Self::Span,
            "LintConfig" => Self::LintConfig,
            _ => Self::Unknown(tag),
        }
    }
}

impl From<TypeTag> for String {
    fn from(tag: TypeTag) -> Self {
        match tag {
            TypeTag::Unknown(tag) => tag,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transport-safe form of a [`Value`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaggedValue {
    pub payload: String,
    pub kind: TypeTag,
}

impl TaggedValue {
    pub fn new(kind: TypeTag, payload: impl Into<String>) -> Self {
        Self {
            payload: payload.into(),
            kind,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    /// Value outside the set the codec can carry. A programming error.
    #[error("unsupported value: {0}")]
    UnsupportedType(String),

    /// Tag not recognized by this build, usually a protocol version mismatch.
    #[error("unknown type tag `{0}`")]
    UnknownTag(String),

    /// Payload does not parse as the kind its tag names.
    #[error("invalid {kind} payload: {reason}")]
    InvalidPayload { kind: TypeTag, reason: String },
}

impl CodecError {
    pub fn unsupported(detail: impl Into<String>) -> Self {
        Self::UnsupportedType(detail.into())
    }

    pub fn invalid(kind: TypeTag, reason: impl fmt::Display) -> Self {
        Self::InvalidPayload {
            kind,
            reason: reason.to_string(),
        }
    }
}

/// Argument or result of a remote procedure, in native form.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Undefined,
    String(String),
    Number(f64),
    Boolean(bool),
    Array(Vec<Value>),
    Lint(Lint),
    Suggestion(Suggestion),
    Span(Span),
    LintConfig(LintConfig),
}

impl Value {
    pub fn tag(&self) -> TypeTag {
        match self {
            Self::Undefined => TypeTag::Undefined,
            Self::String(_) => TypeTag::String,
            Self::Number(_) => TypeTag::Number,
            Self::Boolean(_) => TypeTag::Boolean,
            Self::Array(_) => TypeTag::Array,
            Self::Lint(_) => TypeTag::Lint,
            Self::Suggestion(_) => TypeTag::Suggestion,
            Self::Span(_) => TypeTag::Span,
            Self::LintConfig(_) => TypeTag::LintConfig,
        }
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Self::Undefined)
    }
}

/// Encode a value for transport.
///
/// Fails with [`CodecError::UnsupportedType`] for numbers JSON cannot
/// represent (NaN and the infinities).
pub fn encode(value: &Value) -> Result<TaggedValue, CodecError> {
    match value {
        Value::Undefined => Ok(TaggedValue::new(TypeTag::Undefined, "null")),
        Value::String(s) => scalar(TypeTag::String, s),
        Value::Number(n) => {
            if !n.is_finite() {
                return Err(CodecError::unsupported(format!("non-finite number {n}")));
            }
            scalar(TypeTag::Number, n)
        }
        Value::Boolean(b) => scalar(TypeTag::Boolean, b),
        Value::Array(items) => {
            let children = items.iter().map(encode).collect::<Result<Vec<_>, _>>()?;
            scalar(TypeTag::Array, &children)
        }
        Value::Lint(lint) => handle(lint),
        Value::Suggestion(suggestion) => handle(suggestion),
        Value::Span(span) => handle(span),
        Value::LintConfig(config) => handle(config),
    }
}

/// Decode a value produced by [`encode`], possibly on the other side of the boundary.
pub fn decode(tagged: &TaggedValue) -> Result<Value, CodecError> {
    let payload = tagged.payload.as_str();
    match &tagged.kind {
        // Payload carries no information.
        TypeTag::Undefined => Ok(Value::Undefined),
        TypeTag::String => parse(&tagged.kind, payload).map(Value::String),
        TypeTag::Number => parse(&tagged.kind, payload).map(Value::Number),
        TypeTag::Boolean => parse(&tagged.kind, payload).map(Value::Boolean),
        TypeTag::Array => {
            let children: Vec<TaggedValue> = parse(&tagged.kind, payload)?;
            children
                .iter()
                .map(decode)
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array)
        }
        TypeTag::Lint => Lint::import(payload).map(Value::Lint),
        TypeTag::Suggestion => Suggestion::import(payload).map(Value::Suggestion),
        TypeTag::Span => Span::import(payload).map(Value::Span),
        TypeTag::LintConfig => LintConfig::import(payload).map(Value::LintConfig),
        TypeTag::Unknown(tag) => Err(CodecError::UnknownTag(tag.clone())),
    }
}

fn scalar<T: Serialize + ?Sized>(kind: TypeTag, value: &T) -> Result<TaggedValue, CodecError> {
    serde_json::to_string(value)
        .map(|payload| TaggedValue::new(kind.clone(), payload))
        .map_err(|e| CodecError::unsupported(format!("{kind}: {e}")))
}

fn handle<H: OpaqueHandle>(value: &H) -> Result<TaggedValue, CodecError> {
    Ok(TaggedValue::new(H::KIND, value.export()?))
}

fn parse<T: serde::de::DeserializeOwned>(kind: &TypeTag, payload: &str) -> Result<T, CodecError> {
    serde_json::from_str(payload).map_err(|e| CodecError::invalid(kind.clone(), e))
}

/// A decoded value had a different kind than the caller expected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("expected {expected}, found {found}")]
pub struct UnexpectedType {
    pub expected: TypeTag,
    pub found: TypeTag,
}

impl UnexpectedType {
    pub fn new(expected: TypeTag, found: TypeTag) -> Self {
        Self { expected, found }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Self::Number(f64::from(n))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Boolean(b)
    }
}

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Self::Undefined
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Undefined, Into::into)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Self::Array(items.into_iter().map(Into::into).collect())
    }
}

macro_rules! value_variant {
    ($variant:ident, $ty:ty) => {
        impl From<$ty> for Value {
            fn from(value: $ty) -> Self {
                Self::$variant(value)
            }
        }

        impl TryFrom<Value> for $ty {
            type Error = UnexpectedType;

            fn try_from(value: Value) -> Result<Self, Self::Error> {
                match value {
                    Value::$variant(inner) => Ok(inner),
                    other => Err(UnexpectedType::new(TypeTag::$variant, other.tag())),
                }
            }
        }
    };
}

value_variant!(Lint, Lint);
value_variant!(Suggestion, Suggestion);
value_variant!(Span, Span);
value_variant!(LintConfig, LintConfig);

impl TryFrom<Value> for String {
    type Error = UnexpectedType;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::String(s) => Ok(s),
            other => Err(UnexpectedType::new(TypeTag::String, other.tag())),
        }
    }
}

impl TryFrom<Value> for f64 {
    type Error = UnexpectedType;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Number(n) => Ok(n),
            other => Err(UnexpectedType::new(TypeTag::Number, other.tag())),
        }
    }
}

impl TryFrom<Value> for bool {
    type Error = UnexpectedType;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Boolean(b) => Ok(b),
            other => Err(UnexpectedType::new(TypeTag::Boolean, other.tag())),
        }
    }
}

impl TryFrom<Value> for () {
    type Error = UnexpectedType;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Undefined => Ok(()),
            other => Err(UnexpectedType::new(TypeTag::Undefined, other.tag())),
        }
    }
}

impl<T> TryFrom<Value> for Vec<T>
where
    T: TryFrom<Value, Error = UnexpectedType>,
{
    type Error = UnexpectedType;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Array(items) => items.into_iter().map(T::try_from).collect(),
            other => Err(UnexpectedType::new(TypeTag::Array, other.tag())),
        }
    }
}
