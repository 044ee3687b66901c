use std::{borrow::Cow, str::FromStr};

use composition_fieldpath::{ParseError, Segment, Segments};
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::{
    JSONSchemaProps, JSONSchemaPropsOrArray, JSONSchemaPropsOrBool,
};
use snafu::{OptionExt, ResultExt, Snafu};

use crate::schema::{KnownJsonType, metadata};

/// Errors which can be encountered when resolving a field path against a
/// schema.
#[derive(Debug, PartialEq, Eq, Snafu)]
pub enum FieldPathError {
    #[snafu(display("failed to parse field path {path:?}"))]
    ParseFieldPath { source: ParseError, path: String },

    #[snafu(display(
        "trying to access field {path:?}, but its parent has type {type_:?} instead of object"
    ))]
    FieldAccessWrongType { path: String, type_: String },

    #[snafu(display("field {path:?} is not defined in the schema"))]
    FieldNotDefined { path: String },

    #[snafu(display(
        "trying to access index {index} of {path:?}, but it has type {type_:?} instead of array"
    ))]
    IndexAccessWrongType {
        path: String,
        index: u32,
        type_: String,
    },

    #[snafu(display("array {path:?} does not define a schema for its items"))]
    ArrayItemsMissing { path: String },

    #[snafu(display("index is above the allowed size of the array: {index} > {max}"))]
    IndexAboveMax { index: u32, max: i64 },

    #[snafu(display("no schema for item requested at index {index}"))]
    NoSchemaForIndex { index: u32 },

    #[snafu(display("field path {path:?} has an unsupported type {type_:?}"))]
    UnsupportedType { path: String, type_: String },
}

/// Resolves the type of the field addressed by `path` in `schema`.
///
/// Returns [`None`] if the type cannot be determined, either because the path
/// is empty, no schema is available, or the path leads into a part of the
/// schema which accepts arbitrary (unknown) fields. Paths starting with
/// `metadata` are resolved against `metadata_schema`, merged with whatever the
/// schema itself declares for `metadata`.
///
/// The function is pure: neither the schema nor any other input is modified,
/// which allows resolving any number of paths against the same schema.
pub fn validate_field_path(
    schema: Option<&JSONSchemaProps>,
    path: &str,
    metadata_schema: &JSONSchemaProps,
) -> Result<Option<KnownJsonType>, FieldPathError> {
    if path.is_empty() {
        return Ok(None);
    }

    let segments: Segments = path.parse().context(ParseFieldPathSnafu { path })?;

    let Some(schema) = schema else {
        return Ok(None);
    };

    let (root, skip) = match segments.first() {
        Some(Segment::Field(name)) if name == "metadata" => {
            (metadata::merge_declared(metadata_schema, schema), 1)
        }
        _ => (Cow::Borrowed(schema), 0),
    };

    let mut current: &JSONSchemaProps = &root;

    for (position, segment) in segments.iter().enumerate().skip(skip) {
        let walked = segments.prefix(position + 1).to_string();

        let next = match segment {
            Segment::Field(_) if segment.is_wildcard() => walk_wildcard(current, walked)?,
            Segment::Field(name) => walk_field(current, name, walked)?,
            Segment::Index(index) => walk_index(current, *index, walked)?,
        };

        // The field is accepted, but nothing is known about it
        let Some(next) = next else {
            return Ok(None);
        };

        current = next;
    }

    resolve_type(current, path)
}

fn declared_type(schema: &JSONSchemaProps) -> Option<&str> {
    schema.type_.as_deref().filter(|type_| !type_.is_empty())
}

fn resolve_type(
    schema: &JSONSchemaProps,
    path: &str,
) -> Result<Option<KnownJsonType>, FieldPathError> {
    if schema.x_kubernetes_int_or_string == Some(true) {
        return Ok(None);
    }

    let Some(type_) = declared_type(schema) else {
        return Ok(None);
    };

    KnownJsonType::from_str(type_)
        .ok()
        .context(UnsupportedTypeSnafu { path, type_ })
        .map(Some)
}

fn walk_field<'a>(
    parent: &'a JSONSchemaProps,
    name: &str,
    path: String,
) -> Result<Option<&'a JSONSchemaProps>, FieldPathError> {
    if let Some(type_) = declared_type(parent).filter(|type_| *type_ != "object") {
        return FieldAccessWrongTypeSnafu { path, type_ }.fail();
    }

    if let Some(property) = parent
        .properties
        .as_ref()
        .and_then(|properties| properties.get(name))
    {
        return Ok(Some(property));
    }

    match &parent.additional_properties {
        Some(JSONSchemaPropsOrBool::Schema(schema)) => Ok(Some(schema.as_ref())),
        Some(JSONSchemaPropsOrBool::Bool(true)) => Ok(None),
        _ if parent.x_kubernetes_preserve_unknown_fields == Some(true) => Ok(None),
        _ => FieldNotDefinedSnafu { path }.fail(),
    }
}

fn walk_index(
    parent: &JSONSchemaProps,
    index: u32,
    path: String,
) -> Result<Option<&JSONSchemaProps>, FieldPathError> {
    if declared_type(parent) != Some("array") {
        return IndexAccessWrongTypeSnafu {
            path,
            index,
            type_: parent.type_.clone().unwrap_or_default(),
        }
        .fail();
    }

    if let Some(max_items) = parent.max_items.filter(|max| i64::from(index) >= *max) {
        return IndexAboveMaxSnafu {
            index,
            max: max_items - 1,
        }
        .fail();
    }

    match &parent.items {
        None => ArrayItemsMissingSnafu { path }.fail(),
        Some(JSONSchemaPropsOrArray::Schema(items)) => Ok(Some(items.as_ref())),
        // Present, but neither a single schema nor any positional schema
        Some(JSONSchemaPropsOrArray::Schemas(items)) if items.is_empty() => Ok(None),
        Some(JSONSchemaPropsOrArray::Schemas(items)) => {
            match usize::try_from(index).ok().and_then(|i| items.get(i)) {
                Some(item) => Ok(Some(item)),
                None if parent.max_items.is_none() => NoSchemaForIndexSnafu { index }.fail(),
                None => Ok(None),
            }
        }
    }
}

fn walk_wildcard(
    parent: &JSONSchemaProps,
    path: String,
) -> Result<Option<&JSONSchemaProps>, FieldPathError> {
    match declared_type(parent) {
        Some("array") => match &parent.items {
            None => ArrayItemsMissingSnafu { path }.fail(),
            Some(JSONSchemaPropsOrArray::Schema(items)) => Ok(Some(items.as_ref())),
            Some(JSONSchemaPropsOrArray::Schemas(_)) => Ok(None),
        },
        Some("object") | None => match &parent.additional_properties {
            Some(JSONSchemaPropsOrBool::Schema(schema)) => Ok(Some(schema.as_ref())),
            _ => Ok(None),
        },
        Some(type_) => FieldAccessWrongTypeSnafu { path, type_ }.fail(),
    }
}
