//! Schema-level types shared by the validators: the JSON types a schema can
//! declare and the walker resolving field paths against a schema.
use std::str::FromStr;

use snafu::Snafu;

use crate::crd::transforms::TransformIoType;

pub mod metadata;
mod walker;

pub use walker::*;

#[derive(Debug, PartialEq, Eq, Snafu)]
pub enum TypeConversionError {
    #[snafu(display("JSON type \"{json_type}\" cannot be used as the input or output of a transform"))]
    UnsupportedJsonType { json_type: KnownJsonType },
}

/// The primitive types a JSON (OpenAPI v3) schema can declare.
///
/// A field without a declared type is represented as [`None`] wherever an
/// `Option<KnownJsonType>` is used, meaning the type is unknown and therefore
/// unconstrained.
#[derive(
    Clone,
    Copy,
    Debug,
    Hash,
    PartialEq,
    Eq,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
)]
#[strum(serialize_all = "lowercase")]
pub enum KnownJsonType {
    String,
    Integer,
    Number,
    Boolean,
    Array,
    Object,
    Null,
}

impl KnownJsonType {
    /// Returns `true` if `input` names one of the known JSON types.
    pub fn is_valid(input: &str) -> bool {
        Self::from_str(input).is_ok()
    }

    /// Returns `true` if a value of type `self` satisfies a requirement of type
    /// `other`.
    ///
    /// Every integer is a number, but not every number is an integer. Thus this
    /// relation is not symmetric: `integer` is equivalent to `number`, but
    /// `number` is not equivalent to `integer`.
    ///
    /// ```
    /// use composition_validation::schema::KnownJsonType;
    ///
    /// assert!(KnownJsonType::Integer.is_equivalent(KnownJsonType::Number));
    /// assert!(!KnownJsonType::Number.is_equivalent(KnownJsonType::Integer));
    /// ```
    pub fn is_equivalent(self, other: Self) -> bool {
        self == other || (self == Self::Integer && other == Self::Number)
    }
}

/// Same as [`KnownJsonType::is_equivalent`], but for possibly unknown types.
/// Two unknown types are vacuously equivalent, a known and an unknown type are
/// not.
pub fn types_equivalent(from: Option<KnownJsonType>, to: Option<KnownJsonType>) -> bool {
    match (from, to) {
        (None, None) => true,
        (Some(from), Some(to)) => from.is_equivalent(to),
        _ => false,
    }
}

impl From<TransformIoType> for KnownJsonType {
    fn from(value: TransformIoType) -> Self {
        match value {
            TransformIoType::String => Self::String,
            TransformIoType::Bool => Self::Boolean,
            TransformIoType::Int | TransformIoType::Int64 => Self::Integer,
            TransformIoType::Float64 => Self::Number,
            TransformIoType::Object => Self::Object,
            TransformIoType::Array => Self::Array,
        }
    }
}

impl TryFrom<KnownJsonType> for TransformIoType {
    type Error = TypeConversionError;

    fn try_from(value: KnownJsonType) -> Result<Self, Self::Error> {
        match value {
            KnownJsonType::String => Ok(Self::String),
            KnownJsonType::Integer => Ok(Self::Int64),
            KnownJsonType::Number => Ok(Self::Float64),
            KnownJsonType::Boolean => Ok(Self::Bool),
            KnownJsonType::Array => Ok(Self::Array),
            KnownJsonType::Object => Ok(Self::Object),
            KnownJsonType::Null => UnsupportedJsonTypeSnafu { json_type: value }.fail(),
        }
    }
}
