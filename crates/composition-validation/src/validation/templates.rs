//! Resolution of the resources referenced by a Composition: the group, version
//! and kind of every resource template and the schemas of all involved CRDs.
use std::{
    collections::{BTreeMap, btree_map::Entry},
    error::Error,
};

use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::{
    CustomResourceDefinition, JSONSchemaProps,
};
use kube::core::GroupVersionKind;
use snafu::{OptionExt, Snafu};

use crate::{
    crd::ComposedTemplate,
    crd_getter::{CrdGetter, GroupKind, defines_version, version_schema},
};

#[derive(Debug, PartialEq, Eq, Snafu)]
pub(crate) enum BaseError {
    #[snafu(display("the base must be an object"))]
    NotAnObject,

    #[snafu(display("the base must specify a non-empty {field}"))]
    MissingField { field: &'static str },

    #[snafu(display("the base has an invalid apiVersion {api_version:?}"))]
    InvalidApiVersion { api_version: String },
}

/// Splits an `apiVersion` into its group and version. The core group is the
/// empty string.
pub(crate) fn parse_api_version(api_version: &str) -> Option<(&str, &str)> {
    let (group, version) = match api_version.split_once('/') {
        Some((group, version)) if !group.is_empty() => (group, version),
        Some(_) => return None,
        None => ("", api_version),
    };

    if version.is_empty() || version.contains('/') {
        return None;
    }

    Some((group, version))
}

/// Resolves the group, version and kind of a resource template from its base.
pub(crate) fn resolve_base(base: &serde_json::Value) -> Result<GroupVersionKind, BaseError> {
    let base = base.as_object().context(NotAnObjectSnafu)?;

    let field = move |field: &'static str| {
        base.get(field)
            .and_then(serde_json::Value::as_str)
            .filter(|value| !value.is_empty())
            .context(MissingFieldSnafu { field })
    };

    let api_version = field("apiVersion")?;
    let kind = field("kind")?;

    let (group, version) =
        parse_api_version(api_version).context(InvalidApiVersionSnafu { api_version })?;

    Ok(GroupVersionKind::gvk(group, version, kind))
}

pub(crate) fn group_kind(gvk: &GroupVersionKind) -> GroupKind {
    GroupKind::new(&gvk.group, &gvk.kind)
}

/// The resolved group, version and kind of every resource template, indexed
/// like the templates themselves.
///
/// Bases are parsed exactly once per validation, the templates themselves are
/// never touched.
#[derive(Debug)]
pub(crate) struct TemplateTable(Vec<Result<GroupVersionKind, BaseError>>);

impl TemplateTable {
    pub fn resolve(resources: &[ComposedTemplate]) -> Self {
        Self(
            resources
                .iter()
                .map(|resource| resolve_base(&resource.base))
                .collect(),
        )
    }

    pub fn iter(&self) -> impl Iterator<Item = &Result<GroupVersionKind, BaseError>> {
        self.0.iter()
    }
}

/// The outcome of looking up the schema of a specific resource version.
#[derive(Debug)]
pub(crate) enum SchemaLookup<'a> {
    Found(&'a JSONSchemaProps),

    /// Either there is no CRD at all, or the version doesn't declare a schema.
    Missing,

    /// The CRD exists, but doesn't define the requested version.
    UndefinedVersion { defined: Vec<&'a str> },

    /// The CRD getter failed.
    Failed { message: &'a str },
}

/// The CRDs fetched during a single validation, keyed by group and kind.
#[derive(Debug, Default)]
pub(crate) struct FetchedCrds(
    BTreeMap<GroupKind, Result<Option<CustomResourceDefinition>, String>>,
);

impl FetchedCrds {
    /// Fetches the CRD of every distinct group and kind in `group_kinds`.
    pub async fn fetch<G: CrdGetter>(
        getter: &G,
        group_kinds: impl IntoIterator<Item = GroupKind>,
    ) -> Self {
        let mut crds = BTreeMap::new();

        for group_kind in group_kinds {
            let Entry::Vacant(entry) = crds.entry(group_kind) else {
                continue;
            };

            let result = getter.get(entry.key()).await;
            match &result {
                Ok(Some(_)) => {
                    tracing::debug!(k8s.crd.group_kind = %entry.key(), "found custom resource definition");
                }
                Ok(None) => {
                    tracing::debug!(k8s.crd.group_kind = %entry.key(), "custom resource definition not found");
                }
                Err(err) => {
                    tracing::warn!(
                        k8s.crd.group_kind = %entry.key(),
                        error = err as &dyn Error,
                        "failed to get custom resource definition"
                    );
                }
            }

            entry.insert(result.map_err(|err| error_chain(&err)));
        }

        Self(crds)
    }

    pub fn lookup(&self, gvk: &GroupVersionKind) -> SchemaLookup<'_> {
        match self.0.get(&group_kind(gvk)) {
            None | Some(Ok(None)) => SchemaLookup::Missing,
            Some(Err(message)) => SchemaLookup::Failed { message },
            Some(Ok(Some(crd))) => {
                if let Some(schema) = version_schema(crd, &gvk.version) {
                    SchemaLookup::Found(schema)
                } else if defines_version(crd, &gvk.version) {
                    SchemaLookup::Missing
                } else {
                    SchemaLookup::UndefinedVersion {
                        defined: crd.spec.versions.iter().map(|v| v.name.as_str()).collect(),
                    }
                }
            }
        }
    }
}

/// Renders an error and all of its sources on a single line.
fn error_chain(err: &(dyn Error + 'static)) -> String {
    let mut message = err.to_string();
    let mut source = err.source();

    while let Some(err) = source {
        message.push_str(": ");
        message.push_str(&err.to_string());
        source = err.source();
    }

    message
}
