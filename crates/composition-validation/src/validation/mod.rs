//! The schema-aware validation of Compositions.
//!
//! A [`Validator`] checks the structure of a Composition and validates all
//! patches, readiness checks and connection details against the schemas of the
//! composite and composed resources, which are obtained through a
//! [`CrdGetter`]. Errors of both are reported together in document order.
//!
//! ```
//! use composition_validation::{
//!     crd::{Composition, ValidationMode},
//!     crd_getter::CrdMap,
//!     validation::Validator,
//! };
//!
//! async fn validate(composition: &Composition) -> Vec<String> {
//!     let validator = Validator::builder(CrdMap::new())
//!         .default_mode(ValidationMode::Strict)
//!         .build();
//!
//!     let validated = validator.validate(composition).await;
//!     validated.warnings
//! }
//! ```
use k8s_openapi::{
    apiextensions_apiserver::pkg::apis::apiextensions::v1::JSONSchemaProps,
    apimachinery::pkg::apis::meta::v1::{Status, StatusCause, StatusDetails},
};
use kube::{Resource, core::GroupVersionKind};
use snafu::Snafu;
use tracing::instrument;

use crate::{
    crd::{ComposedTemplate, Composition, ValidationMode, patches::PatchSet},
    crd_getter::CrdGetter,
    field::{FieldError, FieldErrorList, FieldPath},
    schema::metadata::DEFAULT_METADATA_SCHEMA,
    validation::{
        patches::PatchSchemas,
        readiness::{validate_connection_details, validate_readiness_checks},
        structure::validate_structure,
        templates::{FetchedCrds, SchemaLookup, TemplateTable, group_kind, parse_api_version},
    },
};

mod patches;
mod readiness;
mod structure;
mod templates;
mod transforms;

pub use transforms::validate_io_types_with_transforms;

/// The error returned for Compositions failing validation. It contains every
/// problem found, not just the first one.
#[derive(Debug, PartialEq, Eq, Snafu)]
#[snafu(display("Composition.apiextensions.crossplane.io {name:?} is invalid: {errors}"))]
pub struct InvalidCompositionError {
    pub name: String,
    pub errors: FieldErrorList,
}

impl InvalidCompositionError {
    /// Converts the error into a `meta/v1 Status` with reason `Invalid`, the
    /// way the API server reports invalid objects.
    pub fn to_status(&self) -> Status {
        let causes = self
            .errors
            .iter()
            .map(|error| StatusCause {
                field: Some(error.field.to_string()),
                message: Some(error.body()),
                reason: Some(error.type_.reason().to_owned()),
            })
            .collect();

        Status {
            status: Some("Failure".to_owned()),
            code: Some(422),
            reason: Some("Invalid".to_owned()),
            message: Some(self.to_string()),
            details: Some(StatusDetails {
                group: Some(Composition::group(&()).into_owned()),
                kind: Some(Composition::kind(&()).into_owned()),
                name: Some(self.name.clone()),
                causes: Some(causes),
                ..Default::default()
            }),
            ..Default::default()
        }
    }
}

/// The outcome of validating a Composition.
///
/// Warnings are independent of the result: a valid Composition can have
/// warnings, for example in [`ValidationMode::Warn`].
#[derive(Debug)]
pub struct Validated {
    pub warnings: Vec<String>,
    pub result: Result<(), InvalidCompositionError>,
}

/// Validates Compositions against the schemas of the resources they compose.
///
/// Construct it using [`Validator::builder`].
#[derive(Debug)]
pub struct Validator<G> {
    getter: G,
    default_mode: ValidationMode,
    metadata_schema: JSONSchemaProps,
}

/// Builds a [`Validator`], using default values for every option not set
/// explicitly.
#[derive(Debug)]
pub struct ValidatorBuilder<G> {
    getter: G,
    default_mode: Option<ValidationMode>,
    metadata_schema: Option<JSONSchemaProps>,
}

impl<G> ValidatorBuilder<G> {
    /// Sets the mode used for Compositions without a validation mode
    /// annotation. Defaults to [`ValidationMode::Loose`].
    pub fn default_mode(mut self, default_mode: ValidationMode) -> Self {
        self.default_mode = Some(default_mode);
        self
    }

    /// Replaces the schema field paths starting with `metadata` are resolved
    /// against. Defaults to [`DEFAULT_METADATA_SCHEMA`].
    pub fn metadata_schema(mut self, metadata_schema: JSONSchemaProps) -> Self {
        self.metadata_schema = Some(metadata_schema);
        self
    }

    pub fn build(self) -> Validator<G> {
        Validator {
            getter: self.getter,
            default_mode: self.default_mode.unwrap_or_default(),
            metadata_schema: self
                .metadata_schema
                .unwrap_or_else(|| DEFAULT_METADATA_SCHEMA.clone()),
        }
    }
}

/// The order fields of a Composition are written in, down to the patches of
/// resource templates. Errors of both passes are reported in this order.
const DOCUMENT_ORDER: &[&str] = &[
    "metadata",
    "spec",
    "compositeTypeRef",
    "mode",
    "pipeline",
    "patchSets",
    "environment",
    "resources",
    "base",
    "patches",
    "readinessChecks",
    "connectionDetails",
];

/// The state of a schema a resource template needs.
#[derive(Clone, Copy)]
enum Availability<'a> {
    Available(&'a JSONSchemaProps),

    /// Nothing is known about the schema, which is an error only in strict
    /// mode.
    Missing(&'a GroupVersionKind),

    /// Unusable, with an error already recorded.
    Reported,
}

impl<G> Validator<G> {
    pub fn builder(getter: G) -> ValidatorBuilder<G> {
        ValidatorBuilder {
            getter,
            default_mode: None,
            metadata_schema: None,
        }
    }
}

impl<G: CrdGetter> Validator<G> {
    /// Validates `composition`, collecting all problems instead of stopping
    /// at the first one.
    #[instrument(
        name = "validate_composition",
        skip_all,
        fields(composition.name = composition.name())
    )]
    pub async fn validate(&self, composition: &Composition) -> Validated {
        let mut errors = validate_structure(composition);

        let mode = composition
            .validation_mode_annotation()
            .and_then(|mode| mode.parse().ok())
            .unwrap_or(self.default_mode);

        let schema_errors = self.validate_with_schemas(composition, mode).await;
        tracing::debug!(
            validation.mode = %mode,
            errors.structural = errors.len(),
            errors.schema = schema_errors.len(),
            "validated composition"
        );

        // Structural errors are never downgraded to warnings
        let warnings = match mode {
            ValidationMode::Warn => schema_errors.iter().map(ToString::to_string).collect(),
            ValidationMode::Strict | ValidationMode::Loose => {
                errors.extend(schema_errors);
                Vec::new()
            }
        };

        if errors.is_empty() {
            return Validated {
                warnings,
                result: Ok(()),
            };
        }

        errors.sort_by_position(DOCUMENT_ORDER, 5);
        Validated {
            warnings,
            result: Err(InvalidCompositionError {
                name: composition.name().to_owned(),
                errors,
            }),
        }
    }

    async fn validate_with_schemas(
        &self,
        composition: &Composition,
        mode: ValidationMode,
    ) -> FieldErrorList {
        let spec = &composition.spec;
        let mut errors = FieldErrorList::new();

        let templates = TemplateTable::resolve(&spec.resources);
        let needs_composite = !composition.environment_patches().is_empty()
            || spec.resources.iter().any(|resource| !resource.patches.is_empty());

        let type_ref = FieldPath::new("spec").child("compositeTypeRef");
        let type_ref_missing = spec.composite_type_ref.api_version.is_empty()
            || spec.composite_type_ref.kind.is_empty();
        let composite_gvk = match parse_api_version(&spec.composite_type_ref.api_version) {
            // Missing values are reported structurally
            _ if type_ref_missing => None,
            Some((group, version)) => Some(GroupVersionKind::gvk(
                group,
                version,
                &spec.composite_type_ref.kind,
            )),
            None => {
                errors.push(FieldError::invalid(
                    type_ref.child("apiVersion"),
                    &spec.composite_type_ref.api_version,
                    "invalid apiVersion",
                ));
                None
            }
        };

        let group_kinds = composite_gvk
            .iter()
            .filter(|_| needs_composite)
            .chain(
                spec.resources
                    .iter()
                    .zip(templates.iter())
                    .filter(|(resource, _)| needs_composed_schema(resource))
                    .filter_map(|(_, gvk)| gvk.as_ref().ok()),
            )
            .map(group_kind)
            .collect::<Vec<_>>();
        let crds = FetchedCrds::fetch(&self.getter, group_kinds).await;

        let composite = match &composite_gvk {
            Some(gvk) if needs_composite => match crds.lookup(gvk) {
                SchemaLookup::Found(schema) => Availability::Available(schema),
                SchemaLookup::Missing => Availability::Missing(gvk),
                SchemaLookup::UndefinedVersion { defined } => {
                    errors.push(FieldError::invalid(
                        type_ref.child("apiVersion"),
                        &spec.composite_type_ref.api_version,
                        format!(
                            "the CRD of {group_kind} doesn't define version {version}, defined versions are {defined:?}",
                            group_kind = group_kind(gvk),
                            version = gvk.version
                        ),
                    ));
                    Availability::Reported
                }
                SchemaLookup::Failed { message } => {
                    errors.push(FieldError::internal(
                        type_ref.clone(),
                        format!(
                            "failed to get the CRD of {group_kind}: {message}",
                            group_kind = group_kind(gvk)
                        ),
                    ));
                    Availability::Reported
                }
            },
            _ => Availability::Reported,
        };

        for (index, (resource, gvk)) in spec.resources.iter().zip(templates.iter()).enumerate() {
            let path = FieldPath::new("spec").child("resources").index(index);

            let gvk = match gvk {
                Ok(gvk) => gvk,
                Err(err) => {
                    errors.push(FieldError::internal(path.child("base"), err));
                    continue;
                }
            };

            if !needs_composed_schema(resource) {
                continue;
            }

            let resource_errors =
                self.validate_resource(resource, gvk, &composite, &spec.patch_sets, &crds, mode);
            errors.extend(resource_errors.with_prefix(&path));
        }

        let environment_patches = composition.environment_patches();
        if !environment_patches.is_empty() {
            let path = FieldPath::new("spec").child("environment").child("patches");

            match composite {
                Availability::Available(composite) => {
                    let schemas = PatchSchemas {
                        composite: Some(composite),
                        composed: None,
                        metadata: &self.metadata_schema,
                        patch_sets: &spec.patch_sets,
                    };

                    // Other patch types are rejected structurally
                    for (index, patch) in environment_patches
                        .iter()
                        .enumerate()
                        .filter(|(_, patch)| patch.is_composite_facing())
                    {
                        errors.extend(schemas.validate_patch(patch).with_prefix(&path.index(index)));
                    }
                }
                Availability::Missing(gvk) if mode == ValidationMode::Strict => {
                    errors.push(FieldError::internal(
                        path,
                        format!("no schema found for {}", describe(gvk)),
                    ));
                }
                Availability::Missing(gvk) => {
                    tracing::debug!(
                        k8s.crd.group_kind = %group_kind(gvk),
                        "skipping environment patches without composite schema"
                    );
                }
                Availability::Reported => {}
            }
        }

        errors
    }

    /// Validates a single resource template. Errors are relative to the
    /// template.
    fn validate_resource(
        &self,
        resource: &ComposedTemplate,
        gvk: &GroupVersionKind,
        composite: &Availability<'_>,
        patch_sets: &[PatchSet],
        crds: &FetchedCrds,
        mode: ValidationMode,
    ) -> FieldErrorList {
        let mut errors = FieldErrorList::new();
        let needs_composite = !resource.patches.is_empty();

        let composed = match crds.lookup(gvk) {
            SchemaLookup::Found(schema) => Availability::Available(schema),
            SchemaLookup::Missing => Availability::Missing(gvk),
            SchemaLookup::UndefinedVersion { defined } => {
                errors.push(FieldError::invalid(
                    FieldPath::new("base").child("apiVersion"),
                    gvk.api_version(),
                    format!(
                        "the CRD of {group_kind} doesn't define version {version}, defined versions are {defined:?}",
                        group_kind = group_kind(gvk),
                        version = gvk.version
                    ),
                ));
                return errors;
            }
            SchemaLookup::Failed { message } => {
                errors.push(FieldError::internal(
                    FieldPath::default(),
                    format!(
                        "failed to get the CRD of {group_kind}: {message}",
                        group_kind = group_kind(gvk)
                    ),
                ));
                return errors;
            }
        };

        let mut missing = Vec::new();
        if let (true, Availability::Missing(gvk)) = (needs_composite, composite) {
            missing.push(describe(gvk));
        }
        if let Availability::Missing(gvk) = composed {
            missing.push(describe(gvk));
        }

        if !missing.is_empty() {
            if mode == ValidationMode::Strict {
                errors.push(FieldError::internal(
                    FieldPath::default(),
                    format!("no schema found for {}", missing.join(" and ")),
                ));
                return errors;
            }

            tracing::debug!(
                missing = ?missing,
                "skipping checks of resource template without schema"
            );
        }

        let Availability::Available(composed) = composed else {
            return errors;
        };

        // Patches are only checked if both sides have a schema
        if let Availability::Available(composite) = *composite {
            let schemas = PatchSchemas {
                composite: Some(composite),
                composed: Some(composed),
                metadata: &self.metadata_schema,
                patch_sets,
            };

            for (index, patch) in resource.patches.iter().enumerate() {
                let path = FieldPath::new("patches").index(index);
                errors.extend(schemas.validate_patch(patch).with_prefix(&path));
            }
        }

        errors.extend(validate_readiness_checks(
            &resource.readiness_checks,
            composed,
            &self.metadata_schema,
        ));
        errors.extend(validate_connection_details(
            &resource.connection_details,
            composed,
            &self.metadata_schema,
        ));

        errors
    }
}

fn needs_composed_schema(resource: &ComposedTemplate) -> bool {
    !resource.patches.is_empty()
        || resource
            .readiness_checks
            .iter()
            .any(|check| check.field_path().is_some())
        || resource
            .connection_details
            .iter()
            .any(|detail| detail.from_field_path.is_some())
}

fn describe(gvk: &GroupVersionKind) -> String {
    format!("{group_kind} version {version}", group_kind = group_kind(gvk), version = gvk.version)
}
