//! The `Composition` custom resource, as far as it is relevant for validation.
//!
//! Fields which are not inspected by any validator are either omitted (and thus
//! ignored during deserialization) or kept as opaque [`serde_json::Value`]s.
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::crd::{
    patches::{Patch, PatchSet},
    readiness::{ConnectionDetail, ReadinessCheck},
};

pub mod patches;
pub mod readiness;
pub mod transforms;

/// The annotation selecting the [`ValidationMode`] of a Composition.
pub const VALIDATION_MODE_ANNOTATION: &str =
    "crossplane.io/composition-schema-aware-validation-mode";

/// Controls how the schema-aware validation treats missing schemas and the
/// errors it finds.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
)]
#[strum(serialize_all = "lowercase")]
pub enum ValidationMode {
    /// Missing schemas are reported as errors.
    Strict,

    /// Whatever can't be resolved is skipped.
    #[default]
    Loose,

    /// Same as [`ValidationMode::Loose`], but all findings are returned as
    /// warnings instead of errors.
    Warn,
}

#[derive(Clone, CustomResource, Debug, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[kube(
    group = "apiextensions.crossplane.io",
    version = "v1",
    kind = "Composition",
    plural = "compositions"
)]
#[serde(rename_all = "camelCase")]
pub struct CompositionSpec {
    /// The composite resource type this Composition is compatible with.
    #[serde(default)]
    pub composite_type_ref: TypeReference,

    #[serde(default)]
    pub mode: CompositionMode,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pipeline: Vec<PipelineStep>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub patch_sets: Vec<PatchSet>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<EnvironmentConfiguration>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resources: Vec<ComposedTemplate>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub write_connection_secrets_to_namespace: Option<String>,
}

impl Composition {
    /// Returns the name of the Composition, or an empty string if it doesn't
    /// have one (yet).
    pub fn name(&self) -> &str {
        self.metadata.name.as_deref().unwrap_or_default()
    }

    /// Returns the raw value of the [`VALIDATION_MODE_ANNOTATION`], if set.
    pub fn validation_mode_annotation(&self) -> Option<&str> {
        self.metadata
            .annotations
            .as_ref()
            .and_then(|annotations| annotations.get(VALIDATION_MODE_ANNOTATION))
            .map(String::as_str)
    }

    /// Environment patches, which are empty if no environment is configured.
    pub fn environment_patches(&self) -> &[Patch] {
        self.spec
            .environment
            .as_ref()
            .map(|environment| environment.patches.as_slice())
            .unwrap_or_default()
    }
}

#[derive(Clone, Debug, Default, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeReference {
    #[serde(default)]
    pub api_version: String,

    #[serde(default)]
    pub kind: String,
}

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
pub enum CompositionMode {
    #[default]
    Resources,
    Pipeline,
}

#[derive(Clone, Debug, Default, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineStep {
    #[serde(default)]
    pub step: String,

    #[serde(default)]
    pub function_ref: FunctionReference,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<serde_json::Value>,
}

#[derive(Clone, Debug, Default, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
pub struct FunctionReference {
    #[serde(default)]
    pub name: String,
}

#[derive(Clone, Debug, Default, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentConfiguration {
    /// References to (or selectors of) EnvironmentConfigs, which are not
    /// validated.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub environment_configs: Vec<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub patches: Vec<Patch>,
}

/// A template of a composed resource.
#[derive(Clone, Debug, Default, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComposedTemplate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// The base object of the composed resource, including its `apiVersion`
    /// and `kind`.
    #[serde(default)]
    pub base: serde_json::Value,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub patches: Vec<Patch>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub connection_details: Vec<ConnectionDetail>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub readiness_checks: Vec<ReadinessCheck>,
}
