use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::crd::transforms::Transform;

/// A patch copying (and optionally transforming) a value from one object into
/// another.
#[derive(Clone, Debug, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum Patch {
    FromCompositeFieldPath(FieldPathPatch),
    ToCompositeFieldPath(FieldPathPatch),
    CombineFromComposite(CombinePatch),
    CombineToComposite(CombinePatch),
    FromEnvironmentFieldPath(FieldPathPatch),
    ToEnvironmentFieldPath(FieldPathPatch),
    CombineFromEnvironment(CombinePatch),
    CombineToEnvironment(CombinePatch),
    PatchSet(PatchSetPatch),
}

impl Patch {
    /// The `type` of the patch, as used in the document.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::FromCompositeFieldPath(_) => "FromCompositeFieldPath",
            Self::ToCompositeFieldPath(_) => "ToCompositeFieldPath",
            Self::CombineFromComposite(_) => "CombineFromComposite",
            Self::CombineToComposite(_) => "CombineToComposite",
            Self::FromEnvironmentFieldPath(_) => "FromEnvironmentFieldPath",
            Self::ToEnvironmentFieldPath(_) => "ToEnvironmentFieldPath",
            Self::CombineFromEnvironment(_) => "CombineFromEnvironment",
            Self::CombineToEnvironment(_) => "CombineToEnvironment",
            Self::PatchSet(_) => "PatchSet",
        }
    }

    /// Returns `true` if the patch only reads from or writes to the composite
    /// resource. Only these patches are allowed in the environment.
    pub fn is_composite_facing(&self) -> bool {
        matches!(
            self,
            Self::FromCompositeFieldPath(_)
                | Self::ToCompositeFieldPath(_)
                | Self::CombineFromComposite(_)
                | Self::CombineToComposite(_)
        )
    }

    pub fn transforms(&self) -> &[Transform] {
        match self {
            Self::FromCompositeFieldPath(patch)
            | Self::ToCompositeFieldPath(patch)
            | Self::FromEnvironmentFieldPath(patch)
            | Self::ToEnvironmentFieldPath(patch) => &patch.transforms,
            Self::CombineFromComposite(patch)
            | Self::CombineToComposite(patch)
            | Self::CombineFromEnvironment(patch)
            | Self::CombineToEnvironment(patch) => &patch.transforms,
            Self::PatchSet(_) => &[],
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldPathPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_field_path: Option<String>,

    /// Defaults to the `fromFieldPath` if not set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_field_path: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub transforms: Vec<Transform>,
}

impl FieldPathPatch {
    pub fn from_field_path(&self) -> &str {
        self.from_field_path.as_deref().unwrap_or_default()
    }

    pub fn to_field_path(&self) -> &str {
        self.to_field_path
            .as_deref()
            .unwrap_or_else(|| self.from_field_path())
    }
}

#[derive(Clone, Debug, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CombinePatch {
    #[serde(default)]
    pub combine: Combine,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_field_path: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub transforms: Vec<Transform>,
}

impl CombinePatch {
    pub fn to_field_path(&self) -> &str {
        self.to_field_path.as_deref().unwrap_or_default()
    }
}

/// Combines multiple input values into a single output value.
#[derive(Clone, Debug, Default, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Combine {
    #[serde(default)]
    pub variables: Vec<CombineVariable>,

    /// The strategy is kept as plain string, so that unknown strategies can be
    /// reported as validation errors instead of failing deserialization.
    #[serde(default)]
    pub strategy: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub string: Option<StringCombine>,
}

/// The only supported combine strategy.
pub const COMBINE_STRATEGY_STRING: &str = "string";

#[derive(Clone, Debug, Default, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CombineVariable {
    #[serde(default)]
    pub from_field_path: String,
}

#[derive(Clone, Debug, Default, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
pub struct StringCombine {
    #[serde(default)]
    pub fmt: String,
}

#[derive(Clone, Debug, Default, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchSetPatch {
    #[serde(default)]
    pub patch_set_name: String,
}

/// A named set of patches which can be referenced by a [`Patch::PatchSet`]
/// patch of any resource template.
#[derive(Clone, Debug, Default, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
pub struct PatchSet {
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub patches: Vec<Patch>,
}
