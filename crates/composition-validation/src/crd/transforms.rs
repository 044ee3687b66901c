//! Transforms applied to patched values, together with their static type
//! contracts.
//!
//! Every transform declares which input types it accepts and which output type
//! it produces for a given input. Some transforms (like `map`) cannot determine
//! their output statically, in which case [`Transform::output_type`] returns
//! [`None`].
use std::collections::BTreeMap;

use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu, ensure};

/// Errors returned by [`Transform::validate`] for incomplete or contradicting
/// transform configurations.
#[derive(Debug, Snafu)]
pub enum TransformError {
    #[snafu(display("math transform of type {type_} requires {field:?} to be set"))]
    MathMissingField {
        type_: MathTransformType,
        field: &'static str,
    },

    #[snafu(display("map transform requires at least one key/value pair"))]
    EmptyMap,

    #[snafu(display("match transform requires at least one pattern or a fallback"))]
    EmptyMatch,

    #[snafu(display("match pattern {index} of type {type_} requires {field:?} to be set"))]
    MatchPatternMissingField {
        index: usize,
        type_: MatchTransformPatternType,
        field: &'static str,
    },

    #[snafu(display("match pattern {index} has an invalid regular expression"))]
    MatchPatternRegexp { source: regex::Error, index: usize },

    #[snafu(display("string transform of type {type_} requires {field:?} to be set"))]
    StringMissingField {
        type_: StringTransformType,
        field: &'static str,
    },

    #[snafu(display("string transform has an invalid regular expression"))]
    StringRegexp { source: regex::Error },

    #[snafu(display("convert format {format} cannot be used to convert to type {to_type}"))]
    ConvertFormat {
        format: ConvertTransformFormat,
        to_type: TransformIoType,
    },
}

/// Errors returned by [`Transform::validate_input`] if a transform cannot
/// accept a value of a given type.
#[derive(Debug, PartialEq, Eq, Snafu)]
pub enum TransformInputError {
    #[snafu(display(
        "{transform} transform requires an input of type {expected}, but got {actual}"
    ))]
    UnexpectedInputType {
        transform: String,
        expected: String,
        actual: TransformIoType,
    },

    #[snafu(display("cannot convert from {from} to {to} using format {format}"))]
    UnsupportedConversion {
        from: TransformIoType,
        to: TransformIoType,
        format: ConvertTransformFormat,
    },
}

/// The types of values flowing through a chain of transforms.
#[derive(
    Clone, Copy, Debug, Hash, PartialEq, Eq, Deserialize, JsonSchema, Serialize, strum::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TransformIoType {
    String,
    Bool,
    Int,
    Int64,
    Float64,
    Object,
    Array,
}

impl TransformIoType {
    fn is_integer(self) -> bool {
        matches!(self, Self::Int | Self::Int64)
    }

    fn is_numeric(self) -> bool {
        self.is_integer() || self == Self::Float64
    }
}

/// A transform applied to the value of a patch.
#[derive(Clone, Debug, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Transform {
    Math {
        math: MathTransform,
    },
    Map {
        map: MapTransform,
    },
    Match {
        #[serde(rename = "match")]
        match_: MatchTransform,
    },
    String {
        string: StringTransform,
    },
    Convert {
        convert: ConvertTransform,
    },
}

impl Transform {
    /// The name of the transform type, as used in the document.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Math { .. } => "math",
            Self::Map { .. } => "map",
            Self::Match { .. } => "match",
            Self::String { .. } => "string",
            Self::Convert { .. } => "convert",
        }
    }

    /// Checks that the configuration of the transform is complete and
    /// consistent. This doesn't take any input or output types into account.
    pub fn validate(&self) -> Result<(), TransformError> {
        match self {
            Self::Math { math } => math.validate(),
            Self::Map { map } => {
                ensure!(!map.pairs.is_empty(), EmptyMapSnafu);
                Ok(())
            }
            Self::Match { match_ } => match_.validate(),
            Self::String { string } => string.validate(),
            Self::Convert { convert } => convert.validate(),
        }
    }

    /// Checks that the transform accepts an input of type `input`.
    pub fn validate_input(&self, input: TransformIoType) -> Result<(), TransformInputError> {
        let accepted = match self {
            Self::Math { .. } => input.is_numeric(),
            Self::Map { .. } | Self::Match { .. } => input == TransformIoType::String,
            Self::String { string } => return string.validate_input(input),
            Self::Convert { convert } => return convert.validate_input(input),
        };

        ensure!(
            accepted,
            UnexpectedInputTypeSnafu {
                transform: self.type_name(),
                expected: match self {
                    Self::Math { .. } => "int, int64 or float64",
                    _ => "string",
                },
                actual: input,
            }
        );

        Ok(())
    }

    /// Returns the type the transform outputs for an input of type `input`,
    /// or [`None`] if it cannot be determined statically.
    pub fn output_type(&self, input: Option<TransformIoType>) -> Option<TransformIoType> {
        match self {
            // Integers stay integers when multiplied or clamped by integers
            Self::Math { .. } => input.map(|input| match input {
                TransformIoType::Int | TransformIoType::Int64 => input,
                _ => TransformIoType::Float64,
            }),
            // The output is whatever value the user mapped to
            Self::Map { .. } | Self::Match { .. } => None,
            Self::String { .. } => Some(TransformIoType::String),
            Self::Convert { convert } => Some(convert.to_type),
        }
    }
}

#[derive(
    Clone, Copy, Debug, Default, Deserialize, Eq, JsonSchema, PartialEq, Serialize, strum::Display,
)]
pub enum MathTransformType {
    #[default]
    Multiply,
    ClampMin,
    ClampMax,
}

#[derive(Clone, Debug, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MathTransform {
    #[serde(rename = "type", default)]
    pub type_: MathTransformType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub multiply: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clamp_min: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clamp_max: Option<i64>,
}

impl MathTransform {
    fn validate(&self) -> Result<(), TransformError> {
        let (field, value) = match self.type_ {
            MathTransformType::Multiply => ("multiply", self.multiply),
            MathTransformType::ClampMin => ("clampMin", self.clamp_min),
            MathTransformType::ClampMax => ("clampMax", self.clamp_max),
        };

        ensure!(
            value.is_some(),
            MathMissingFieldSnafu {
                type_: self.type_,
                field
            }
        );

        Ok(())
    }
}

/// Maps input strings to arbitrary values.
#[derive(Clone, Debug, Default, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
pub struct MapTransform {
    #[serde(flatten)]
    pub pairs: BTreeMap<String, serde_json::Value>,
}

#[derive(
    Clone, Copy, Debug, Default, Deserialize, Eq, JsonSchema, PartialEq, Serialize, strum::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum MatchTransformPatternType {
    #[default]
    Literal,
    Regexp,
}

#[derive(Clone, Debug, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchTransformPattern {
    #[serde(rename = "type", default)]
    pub type_: MatchTransformPatternType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub literal: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regexp: Option<String>,

    #[serde(default)]
    pub result: serde_json::Value,
}

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
pub enum MatchFallbackTo {
    #[default]
    Value,
    Input,
}

#[derive(Clone, Debug, Default, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchTransform {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub patterns: Vec<MatchTransformPattern>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_value: Option<serde_json::Value>,

    #[serde(default)]
    pub fallback_to: MatchFallbackTo,
}

impl MatchTransform {
    fn validate(&self) -> Result<(), TransformError> {
        ensure!(
            !self.patterns.is_empty()
                || self.fallback_value.is_some()
                || self.fallback_to == MatchFallbackTo::Input,
            EmptyMatchSnafu
        );

        for (index, pattern) in self.patterns.iter().enumerate() {
            match pattern.type_ {
                MatchTransformPatternType::Literal => ensure!(
                    pattern.literal.is_some(),
                    MatchPatternMissingFieldSnafu {
                        index,
                        type_: pattern.type_,
                        field: "literal"
                    }
                ),
                MatchTransformPatternType::Regexp => {
                    let regexp = pattern.regexp.as_deref().ok_or(
                        TransformError::MatchPatternMissingField {
                            index,
                            type_: pattern.type_,
                            field: "regexp",
                        },
                    )?;
                    Regex::new(regexp).context(MatchPatternRegexpSnafu { index })?;
                }
            }
        }

        Ok(())
    }
}

#[derive(
    Clone, Copy, Debug, Default, Deserialize, Eq, JsonSchema, PartialEq, Serialize, strum::Display,
)]
pub enum StringTransformType {
    #[default]
    Format,
    Convert,
    TrimPrefix,
    TrimSuffix,
    Regexp,
    Join,
}

#[derive(
    Clone, Copy, Debug, Deserialize, Eq, JsonSchema, PartialEq, Serialize, strum::Display,
)]
pub enum StringConversionType {
    ToUpper,
    ToLower,
    ToBase64,
    FromBase64,
    ToJson,
    ToSha1,
    ToSha256,
    ToSha512,
}

impl StringConversionType {
    /// Conversions which serialize their input first accept any input type.
    fn accepts_any_input(self) -> bool {
        matches!(
            self,
            Self::ToJson | Self::ToSha1 | Self::ToSha256 | Self::ToSha512
        )
    }
}

#[derive(Clone, Debug, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
pub struct StringTransformRegexp {
    #[serde(rename = "match")]
    pub match_: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<i64>,
}

#[derive(Clone, Debug, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
pub struct StringTransformJoin {
    pub separator: String,
}

#[derive(Clone, Debug, Default, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
pub struct StringTransform {
    #[serde(rename = "type", default)]
    pub type_: StringTransformType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fmt: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub convert: Option<StringConversionType>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trim: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regexp: Option<StringTransformRegexp>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join: Option<StringTransformJoin>,
}

impl StringTransform {
    fn validate(&self) -> Result<(), TransformError> {
        let missing = |field| TransformError::StringMissingField {
            type_: self.type_,
            field,
        };

        match self.type_ {
            StringTransformType::Format => {
                self.fmt.as_ref().ok_or_else(|| missing("fmt"))?;
            }
            StringTransformType::Convert => {
                self.convert.ok_or_else(|| missing("convert"))?;
            }
            StringTransformType::TrimPrefix | StringTransformType::TrimSuffix => {
                self.trim.as_ref().ok_or_else(|| missing("trim"))?;
            }
            StringTransformType::Regexp => {
                let regexp = self.regexp.as_ref().ok_or_else(|| missing("regexp"))?;
                Regex::new(&regexp.match_).context(StringRegexpSnafu)?;
            }
            StringTransformType::Join => {
                self.join.as_ref().ok_or_else(|| missing("join"))?;
            }
        }

        Ok(())
    }

    fn validate_input(&self, input: TransformIoType) -> Result<(), TransformInputError> {
        let expected = match self.type_ {
            StringTransformType::Format => return Ok(()),
            StringTransformType::Convert
                if self
                    .convert
                    .is_some_and(StringConversionType::accepts_any_input) =>
            {
                return Ok(());
            }
            StringTransformType::Join => TransformIoType::Array,
            _ => TransformIoType::String,
        };

        ensure!(
            input == expected,
            UnexpectedInputTypeSnafu {
                transform: format!("string ({})", self.type_),
                expected: expected.to_string(),
                actual: input,
            }
        );

        Ok(())
    }
}

#[derive(
    Clone, Copy, Debug, Default, Deserialize, Eq, JsonSchema, PartialEq, Serialize, strum::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ConvertTransformFormat {
    #[default]
    None,
    Quantity,
    Json,
}

#[derive(Clone, Debug, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConvertTransform {
    pub to_type: TransformIoType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<ConvertTransformFormat>,
}

impl ConvertTransform {
    fn format(&self) -> ConvertTransformFormat {
        self.format.unwrap_or_default()
    }

    fn validate(&self) -> Result<(), TransformError> {
        let supported = match self.format() {
            ConvertTransformFormat::None => true,
            ConvertTransformFormat::Quantity => {
                matches!(self.to_type, TransformIoType::Float64)
            }
            ConvertTransformFormat::Json => {
                matches!(self.to_type, TransformIoType::Object | TransformIoType::Array)
            }
        };

        ensure!(
            supported,
            ConvertFormatSnafu {
                format: self.format(),
                to_type: self.to_type,
            }
        );

        Ok(())
    }

    fn validate_input(&self, input: TransformIoType) -> Result<(), TransformInputError> {
        ensure!(
            is_supported_conversion(input, self.to_type, self.format()),
            UnsupportedConversionSnafu {
                from: input,
                to: self.to_type,
                format: self.format(),
            }
        );

        Ok(())
    }
}

/// Returns `true` if a convert transform can convert a value of type `from`
/// into a value of type `to` using `format`.
pub fn is_supported_conversion(
    from: TransformIoType,
    to: TransformIoType,
    format: ConvertTransformFormat,
) -> bool {
    use ConvertTransformFormat as F;
    use TransformIoType as T;

    if from == to && format == F::None {
        return true;
    }

    match (from, format) {
        (T::String, F::None) => matches!(to, T::Int | T::Int64 | T::Bool | T::Float64),
        (T::String, F::Quantity) => to == T::Float64,
        (T::String, F::Json) => matches!(to, T::Object | T::Array),
        (T::Bool, F::None) => matches!(to, T::String | T::Int | T::Int64 | T::Float64),
        (T::Int | T::Int64, F::None) => {
            matches!(to, T::String | T::Bool | T::Float64 | T::Int | T::Int64)
        }
        (T::Float64, F::None) => matches!(to, T::String | T::Int | T::Int64 | T::Bool),
        _ => false,
    }
}

#[cfg(test)]
mod test {
    use indoc::indoc;
    use rstest::rstest;

    use super::*;

    fn transform(yaml: &str) -> Transform {
        serde_yaml::from_str(yaml).expect("valid transform")
    }

    #[test]
    fn deserialize() {
        let math = transform(indoc! {"
            type: math
            math:
              multiply: 2
        "});
        assert_eq!(
            math,
            Transform::Math {
                math: MathTransform {
                    type_: MathTransformType::Multiply,
                    multiply: Some(2),
                    clamp_min: None,
                    clamp_max: None,
                }
            }
        );

        let map = transform(indoc! {"
            type: map
            map:
              us-east: us-east-1
              eu-west: eu-west-1
        "});
        let Transform::Map { map } = map else {
            panic!("expected a map transform");
        };
        assert_eq!(map.pairs.len(), 2);

        let matcher = transform(indoc! {"
            type: match
            match:
              patterns:
                - type: regexp
                  regexp: '^eu-.*'
                  result: europe
              fallbackValue: elsewhere
        "});
        assert!(matches!(matcher, Transform::Match { .. }));

        let convert = transform(indoc! {"
            type: convert
            convert:
              toType: int64
        "});
        assert_eq!(convert.output_type(None), Some(TransformIoType::Int64));
    }

    #[rstest]
    #[case(indoc! {"
        type: math
        math:
          type: ClampMin
          clampMax: 3
    "}, "math transform of type ClampMin requires \"clampMin\" to be set")]
    #[case(indoc! {"
        type: map
        map: {}
    "}, "map transform requires at least one key/value pair")]
    #[case(indoc! {"
        type: match
        match: {}
    "}, "match transform requires at least one pattern or a fallback")]
    #[case(indoc! {"
        type: match
        match:
          patterns:
            - type: regexp
              result: x
    "}, "match pattern 0 of type regexp requires \"regexp\" to be set")]
    #[case(indoc! {"
        type: match
        match:
          patterns:
            - type: literal
              literal: a
              result: b
            - type: regexp
              regexp: '(unclosed'
              result: x
    "}, "match pattern 1 has an invalid regular expression")]
    #[case(indoc! {"
        type: string
        string:
          type: Format
    "}, "string transform of type Format requires \"fmt\" to be set")]
    #[case(indoc! {"
        type: string
        string:
          type: TrimSuffix
    "}, "string transform of type TrimSuffix requires \"trim\" to be set")]
    #[case(indoc! {"
        type: string
        string:
          type: Regexp
          regexp:
            match: '[a-'
    "}, "string transform has an invalid regular expression")]
    #[case(indoc! {"
        type: convert
        convert:
          toType: int64
          format: json
    "}, "convert format json cannot be used to convert to type int64")]
    fn invalid_configuration(#[case] yaml: &str, #[case] message: &str) {
        let err = transform(yaml).validate().unwrap_err();
        assert_eq!(err.to_string(), message);
    }

    #[rstest]
    #[case(indoc! {"
        type: math
        math:
          type: ClampMax
          clampMax: 10
    "})]
    #[case(indoc! {"
        type: match
        match:
          fallbackTo: Input
    "})]
    #[case(indoc! {"
        type: string
        string:
          type: Convert
          convert: ToUpper
    "})]
    #[case(indoc! {"
        type: string
        string:
          type: Regexp
          regexp:
            match: '^(.*)-suffix$'
            group: 1
    "})]
    #[case(indoc! {"
        type: convert
        convert:
          toType: float64
          format: quantity
    "})]
    fn valid_configuration(#[case] yaml: &str) {
        transform(yaml).validate().expect("valid transform configuration");
    }

    #[rstest]
    #[case(TransformIoType::Int, true)]
    #[case(TransformIoType::Int64, true)]
    #[case(TransformIoType::Float64, true)]
    #[case(TransformIoType::String, false)]
    #[case(TransformIoType::Bool, false)]
    fn math_input(#[case] input: TransformIoType, #[case] accepted: bool) {
        let math = transform(indoc! {"
            type: math
            math:
              multiply: 3
        "});
        assert_eq!(math.validate_input(input).is_ok(), accepted);
    }

    #[rstest]
    #[case("Format", None, TransformIoType::Object, true)]
    #[case("Join", None, TransformIoType::Array, true)]
    #[case("Join", None, TransformIoType::String, false)]
    #[case("TrimPrefix", None, TransformIoType::Int64, false)]
    #[case("Convert", Some(StringConversionType::ToJson), TransformIoType::Object, true)]
    #[case("Convert", Some(StringConversionType::ToUpper), TransformIoType::Bool, false)]
    #[case("Convert", Some(StringConversionType::ToBase64), TransformIoType::String, true)]
    fn string_input(
        #[case] type_: &str,
        #[case] convert: Option<StringConversionType>,
        #[case] input: TransformIoType,
        #[case] accepted: bool,
    ) {
        let string = StringTransform {
            type_: serde_yaml::from_str(type_).unwrap(),
            convert,
            ..Default::default()
        };
        let transform = Transform::String { string };

        assert_eq!(transform.validate_input(input).is_ok(), accepted);
    }

    #[test]
    fn input_error_message() {
        let map = transform(indoc! {"
            type: map
            map:
              a: b
        "});
        let err = map.validate_input(TransformIoType::Int64).unwrap_err();
        assert_eq!(
            err.to_string(),
            "map transform requires an input of type string, but got int64"
        );
    }

    #[rstest]
    #[case(TransformIoType::String, TransformIoType::Int64, ConvertTransformFormat::None, true)]
    #[case(TransformIoType::String, TransformIoType::Float64, ConvertTransformFormat::Quantity, true)]
    #[case(TransformIoType::String, TransformIoType::Object, ConvertTransformFormat::Json, true)]
    #[case(TransformIoType::String, TransformIoType::Object, ConvertTransformFormat::None, false)]
    #[case(TransformIoType::Float64, TransformIoType::Int64, ConvertTransformFormat::None, true)]
    #[case(TransformIoType::Int64, TransformIoType::Float64, ConvertTransformFormat::None, true)]
    #[case(TransformIoType::Bool, TransformIoType::Bool, ConvertTransformFormat::None, true)]
    #[case(TransformIoType::Object, TransformIoType::String, ConvertTransformFormat::None, false)]
    #[case(TransformIoType::Array, TransformIoType::Int, ConvertTransformFormat::None, false)]
    fn conversions(
        #[case] from: TransformIoType,
        #[case] to: TransformIoType,
        #[case] format: ConvertTransformFormat,
        #[case] supported: bool,
    ) {
        assert_eq!(is_supported_conversion(from, to, format), supported);
    }

    #[rstest]
    #[case(Some(TransformIoType::Int64), Some(TransformIoType::Int64))]
    #[case(Some(TransformIoType::Int), Some(TransformIoType::Int))]
    #[case(Some(TransformIoType::Float64), Some(TransformIoType::Float64))]
    #[case(None, None)]
    fn math_output(#[case] input: Option<TransformIoType>, #[case] expected: Option<TransformIoType>) {
        let math = transform(indoc! {"
            type: math
            math:
              multiply: 3
        "});
        assert_eq!(math.output_type(input), expected);
    }
}
