//! The schema of `metadata`, which CRDs usually omit from their OpenAPI schema.
//!
//! Patches frequently read or write `metadata.labels`, `metadata.name` and
//! friends, so field paths starting with `metadata` are walked against this
//! schema instead.
use std::{borrow::Cow, collections::BTreeMap, sync::LazyLock};

use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::{
    JSONSchemaProps, JSONSchemaPropsOrArray, JSONSchemaPropsOrBool,
};

/// The schema of `ObjectMeta` as far as patches are concerned.
pub static DEFAULT_METADATA_SCHEMA: LazyLock<JSONSchemaProps> = LazyLock::new(|| {
    object([
        ("name", typed("string")),
        ("generateName", typed("string")),
        ("namespace", typed("string")),
        ("uid", typed("string")),
        ("resourceVersion", typed("string")),
        ("generation", typed("integer")),
        ("creationTimestamp", typed("string")),
        ("deletionTimestamp", typed("string")),
        ("deletionGracePeriodSeconds", typed("integer")),
        ("labels", string_map()),
        ("annotations", string_map()),
        ("finalizers", array(typed("string"))),
        (
            "ownerReferences",
            array(object([
                ("apiVersion", typed("string")),
                ("kind", typed("string")),
                ("name", typed("string")),
                ("uid", typed("string")),
                ("controller", typed("boolean")),
                ("blockOwnerDeletion", typed("boolean")),
            ])),
        ),
    ])
});

/// Returns `metadata_schema` with the metadata properties declared by
/// `schema` (if any) merged over it.
pub(crate) fn merge_declared<'a>(
    metadata_schema: &'a JSONSchemaProps,
    schema: &JSONSchemaProps,
) -> Cow<'a, JSONSchemaProps> {
    let declared = schema
        .properties
        .as_ref()
        .and_then(|properties| properties.get("metadata"))
        .and_then(|metadata| metadata.properties.as_ref())
        .filter(|properties| !properties.is_empty());

    let Some(declared) = declared else {
        return Cow::Borrowed(metadata_schema);
    };

    let mut merged = metadata_schema.clone();
    merged
        .properties
        .get_or_insert_with(BTreeMap::new)
        .extend(declared.iter().map(|(k, v)| (k.clone(), v.clone())));

    Cow::Owned(merged)
}

fn typed(type_: &str) -> JSONSchemaProps {
    JSONSchemaProps {
        type_: Some(type_.to_owned()),
        ..Default::default()
    }
}

fn object<const N: usize>(properties: [(&str, JSONSchemaProps); N]) -> JSONSchemaProps {
    JSONSchemaProps {
        type_: Some("object".to_owned()),
        properties: Some(
            properties
                .into_iter()
                .map(|(name, schema)| (name.to_owned(), schema))
                .collect(),
        ),
        ..Default::default()
    }
}

fn array(items: JSONSchemaProps) -> JSONSchemaProps {
    JSONSchemaProps {
        type_: Some("array".to_owned()),
        items: Some(JSONSchemaPropsOrArray::Schema(Box::new(items))),
        ..Default::default()
    }
}

fn string_map() -> JSONSchemaProps {
    JSONSchemaProps {
        type_: Some("object".to_owned()),
        additional_properties: Some(JSONSchemaPropsOrBool::Schema(Box::new(typed("string")))),
        ..Default::default()
    }
}
