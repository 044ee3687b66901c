//! Schema independent checks of a Composition.
//!
//! These run alongside the schema-aware validation, which tolerates malformed
//! input and leaves the checks done here (required fields, combine strategies,
//! resolvable and non-nested patch sets, transform configuration) to this
//! module.
use std::collections::HashSet;

use crate::{
    crd::{
        ComposedTemplate, Composition, CompositionMode, VALIDATION_MODE_ANNOTATION,
        ValidationMode,
        patches::{COMBINE_STRATEGY_STRING, Patch, PatchSet},
        readiness::{ConnectionDetail, ConnectionDetailType, ReadinessCheck},
    },
    field::{FieldError, FieldErrorList, FieldPath},
};

pub(crate) fn validate_structure(composition: &Composition) -> FieldErrorList {
    let spec = &composition.spec;
    let mut errors = FieldErrorList::new();

    let type_ref = FieldPath::new("spec").child("compositeTypeRef");
    if spec.composite_type_ref.api_version.is_empty() {
        errors.push(FieldError::required(
            type_ref.child("apiVersion"),
            "the composite type must be specified",
        ));
    }
    if spec.composite_type_ref.kind.is_empty() {
        errors.push(FieldError::required(
            type_ref.child("kind"),
            "the composite type must be specified",
        ));
    }

    if let Some(mode) = composition.validation_mode_annotation()
        && mode.parse::<ValidationMode>().is_err()
    {
        errors.push(FieldError::invalid(
            FieldPath::new("metadata")
                .child("annotations")
                .key(VALIDATION_MODE_ANNOTATION),
            mode,
            "the validation mode must be one of strict, loose or warn",
        ));
    }

    errors.extend(validate_mode(composition));
    errors.extend(validate_patch_sets(&spec.patch_sets));

    for (index, patch) in composition.environment_patches().iter().enumerate() {
        let path = FieldPath::new("spec")
            .child("environment")
            .child("patches")
            .index(index);

        if !patch.is_composite_facing() {
            errors.push(FieldError::invalid(
                path.child("type"),
                patch.type_name(),
                "environment patches must be one of FromCompositeFieldPath, ToCompositeFieldPath, CombineFromComposite or CombineToComposite",
            ));
        }

        errors.extend(validate_patch(patch, &spec.patch_sets).with_prefix(&path));
    }

    errors.extend(validate_resource_names(&spec.resources));

    for (index, resource) in spec.resources.iter().enumerate() {
        let path = FieldPath::new("spec").child("resources").index(index);
        errors.extend(validate_resource(resource, &spec.patch_sets).with_prefix(&path));
    }

    errors
}

fn validate_mode(composition: &Composition) -> FieldErrorList {
    let spec = &composition.spec;
    let mut errors = FieldErrorList::new();

    match spec.mode {
        CompositionMode::Resources => {
            if !spec.pipeline.is_empty() {
                errors.push(FieldError::invalid(
                    FieldPath::new("spec").child("mode"),
                    "Resources",
                    "spec.pipeline must be empty when using mode Resources",
                ));
            }
        }
        CompositionMode::Pipeline => {
            let pipeline = FieldPath::new("spec").child("pipeline");

            if spec.pipeline.is_empty() {
                errors.push(FieldError::required(
                    pipeline.clone(),
                    "at least one step is required when using mode Pipeline",
                ));
            }

            if !spec.resources.is_empty() {
                errors.push(FieldError::invalid(
                    FieldPath::new("spec").child("mode"),
                    "Pipeline",
                    "spec.resources must be empty when using mode Pipeline",
                ));
            }

            let mut seen = HashSet::new();
            for (index, step) in spec.pipeline.iter().enumerate() {
                let path = pipeline.index(index);

                if step.step.is_empty() {
                    errors.push(FieldError::required(
                        path.child("step"),
                        "every step must have a name",
                    ));
                } else if !seen.insert(step.step.as_str()) {
                    errors.push(FieldError::invalid(
                        path.child("step"),
                        &step.step,
                        "step names must be unique",
                    ));
                }

                if step.function_ref.name.is_empty() {
                    errors.push(FieldError::required(
                        path.child("functionRef").child("name"),
                        "every step must reference a function",
                    ));
                }
            }
        }
    }

    errors
}

fn validate_patch_sets(patch_sets: &[PatchSet]) -> FieldErrorList {
    let mut errors = FieldErrorList::new();
    let mut seen = HashSet::new();

    for (index, patch_set) in patch_sets.iter().enumerate() {
        let path = FieldPath::new("spec").child("patchSets").index(index);

        if patch_set.name.is_empty() {
            errors.push(FieldError::required(
                path.child("name"),
                "every patch set must have a name",
            ));
        } else if !seen.insert(patch_set.name.as_str()) {
            errors.push(FieldError::invalid(
                path.child("name"),
                &patch_set.name,
                "patch set names must be unique",
            ));
        }

        for (patch_index, patch) in patch_set.patches.iter().enumerate() {
            let path = path.child("patches").index(patch_index);

            if let Patch::PatchSet(_) = patch {
                errors.push(FieldError::invalid(
                    path.child("type"),
                    patch.type_name(),
                    "patch sets cannot contain PatchSet patches",
                ));
                continue;
            }

            errors.extend(validate_patch(patch, patch_sets).with_prefix(&path));
        }
    }

    errors
}

fn validate_resource_names(resources: &[ComposedTemplate]) -> FieldErrorList {
    let mut errors = FieldErrorList::new();
    let named = resources
        .iter()
        .filter(|resource| resource.name.as_deref().is_some_and(|name| !name.is_empty()))
        .count();

    if named == 0 {
        return errors;
    }

    let mut seen = HashSet::new();
    for (index, resource) in resources.iter().enumerate() {
        let path = FieldPath::new("spec")
            .child("resources")
            .index(index)
            .child("name");

        match resource.name.as_deref().filter(|name| !name.is_empty()) {
            None => errors.push(FieldError::required(
                path,
                "all resources must have a name if any resource has one",
            )),
            Some(name) if !seen.insert(name) => errors.push(FieldError::invalid(
                path,
                name,
                "resource names must be unique",
            )),
            Some(_) => {}
        }
    }

    errors
}

/// Errors are relative to the resource.
fn validate_resource(resource: &ComposedTemplate, patch_sets: &[PatchSet]) -> FieldErrorList {
    let mut errors = FieldErrorList::new();

    for (index, patch) in resource.patches.iter().enumerate() {
        let path = FieldPath::new("patches").index(index);
        errors.extend(validate_patch(patch, patch_sets).with_prefix(&path));
    }

    for (index, check) in resource.readiness_checks.iter().enumerate() {
        let path = FieldPath::new("readinessChecks").index(index);
        errors.extend(validate_readiness_check(check).with_prefix(&path));
    }

    for (index, detail) in resource.connection_details.iter().enumerate() {
        let path = FieldPath::new("connectionDetails").index(index);
        errors.extend(validate_connection_detail(detail).with_prefix(&path));
    }

    errors
}

/// Errors are relative to the patch.
fn validate_patch(patch: &Patch, patch_sets: &[PatchSet]) -> FieldErrorList {
    let mut errors = FieldErrorList::new();

    match patch {
        Patch::FromCompositeFieldPath(patch)
        | Patch::ToCompositeFieldPath(patch)
        | Patch::FromEnvironmentFieldPath(patch)
        | Patch::ToEnvironmentFieldPath(patch) => {
            if patch.from_field_path().is_empty() {
                errors.push(FieldError::required(
                    FieldPath::new("fromFieldPath"),
                    "a source field path is required",
                ));
            }
        }
        Patch::CombineFromComposite(patch)
        | Patch::CombineToComposite(patch)
        | Patch::CombineFromEnvironment(patch)
        | Patch::CombineToEnvironment(patch) => {
            let combine = FieldPath::new("combine");

            if patch.combine.variables.is_empty() {
                errors.push(FieldError::required(
                    combine.child("variables"),
                    "at least one variable is required",
                ));
            }

            for (index, variable) in patch.combine.variables.iter().enumerate() {
                if variable.from_field_path.is_empty() {
                    errors.push(FieldError::required(
                        combine.child("variables").index(index).child("fromFieldPath"),
                        "a source field path is required",
                    ));
                }
            }

            match patch.combine.strategy.as_str() {
                "" => errors.push(FieldError::required(
                    combine.child("strategy"),
                    "a combine strategy is required",
                )),
                COMBINE_STRATEGY_STRING => {
                    if patch
                        .combine
                        .string
                        .as_ref()
                        .is_none_or(|string| string.fmt.is_empty())
                    {
                        errors.push(FieldError::required(
                            combine.child("string"),
                            "a format is required for the string combine strategy",
                        ));
                    }
                }
                strategy => errors.push(FieldError::invalid(
                    combine.child("strategy"),
                    strategy,
                    "unsupported combine strategy",
                )),
            }

            if patch.to_field_path().is_empty() {
                errors.push(FieldError::required(
                    FieldPath::new("toFieldPath"),
                    "a destination field path is required",
                ));
            }
        }
        Patch::PatchSet(patch) => {
            let path = FieldPath::new("patchSetName");
            let name = &patch.patch_set_name;

            if name.is_empty() {
                errors.push(FieldError::required(path, "a patch set name is required"));
            } else if !patch_sets.iter().any(|patch_set| patch_set.name == *name) {
                errors.push(FieldError::invalid(
                    path,
                    name,
                    "no patch set with this name exists",
                ));
            }
        }
    }

    for (index, transform) in patch.transforms().iter().enumerate() {
        if let Err(err) = transform.validate() {
            errors.push(FieldError::invalid(
                FieldPath::new("transforms").index(index),
                transform.type_name(),
                err,
            ));
        }
    }

    errors
}

/// Errors are relative to the readiness check.
fn validate_readiness_check(check: &ReadinessCheck) -> FieldErrorList {
    let mut errors = FieldErrorList::new();

    if check.field_path().is_some_and(str::is_empty) {
        errors.push(FieldError::required(
            FieldPath::new("fieldPath"),
            "a field path is required for this type of readiness check",
        ));
    }

    if let ReadinessCheck::MatchCondition(check) = check
        && check.match_condition.type_.is_empty()
    {
        errors.push(FieldError::required(
            FieldPath::new("matchCondition").child("type"),
            "a condition type is required",
        ));
    }

    errors
}

/// Errors are relative to the connection detail.
fn validate_connection_detail(detail: &ConnectionDetail) -> FieldErrorList {
    let mut errors = FieldErrorList::new();

    let Some(type_) = detail.resolved_type() else {
        errors.push(FieldError::required(
            FieldPath::new("type"),
            "the type can't be inferred, one of fromConnectionSecretKey, fromFieldPath or value is required",
        ));
        return errors;
    };

    let has_name = detail.name.as_deref().is_some_and(|name| !name.is_empty());
    if !has_name && type_ != ConnectionDetailType::FromConnectionSecretKey {
        errors.push(FieldError::required(
            FieldPath::new("name"),
            "a name is required for this type of connection detail",
        ));
    }

    let (field, source) = match type_ {
        ConnectionDetailType::FromConnectionSecretKey => {
            ("fromConnectionSecretKey", &detail.from_connection_secret_key)
        }
        ConnectionDetailType::FromFieldPath => ("fromFieldPath", &detail.from_field_path),
        ConnectionDetailType::FromValue => ("value", &detail.value),
    };

    if source.as_deref().is_none_or(str::is_empty) {
        errors.push(FieldError::required(
            FieldPath::new(field),
            format!("{field} is required for a connection detail of this type"),
        ));
    }

    errors
}

#[cfg(test)]
mod test {
    use indoc::indoc;
    use rstest::rstest;

    use super::*;
    use crate::field::FieldErrorType;

    fn fields(yaml: &str) -> Vec<String> {
        let composition: Composition = serde_yaml::from_str(yaml).unwrap();
        validate_structure(&composition)
            .iter()
            .map(|error| error.field.to_string())
            .collect()
    }

    #[test]
    fn valid_composition() {
        let fields = fields(indoc! {r#"
            apiVersion: apiextensions.crossplane.io/v1
            kind: Composition
            metadata:
              name: example
              annotations:
                crossplane.io/composition-schema-aware-validation-mode: warn
            spec:
              compositeTypeRef:
                apiVersion: example.org/v1
                kind: XExample
              patchSets:
                - name: common
                  patches:
                    - type: FromCompositeFieldPath
                      fromFieldPath: spec.region
              environment:
                patches:
                  - type: CombineToComposite
                    combine:
                      variables:
                        - fromFieldPath: a
                        - fromFieldPath: b
                      strategy: string
                      string:
                        fmt: "%s/%s"
                    toFieldPath: status.location
              resources:
                - name: bucket
                  base:
                    apiVersion: s3.aws.upbound.io/v1beta1
                    kind: Bucket
                  patches:
                    - type: PatchSet
                      patchSetName: common
                    - type: ToCompositeFieldPath
                      fromFieldPath: status.atProvider.arn
                      toFieldPath: status.arn
                      transforms:
                        - type: string
                          string:
                            type: TrimPrefix
                            trim: 'arn:'
                  readinessChecks:
                    - type: MatchCondition
                      matchCondition:
                        type: Ready
                        status: 'True'
                  connectionDetails:
                    - fromConnectionSecretKey: password
        "#});

        assert!(fields.is_empty(), "unexpected errors: {fields:?}");
    }

    #[test]
    fn composite_type_ref_and_mode_annotation() {
        let fields = fields(indoc! {"
            apiVersion: apiextensions.crossplane.io/v1
            kind: Composition
            metadata:
              name: example
              annotations:
                crossplane.io/composition-schema-aware-validation-mode: paranoid
            spec:
              compositeTypeRef:
                kind: XExample
        "});

        assert_eq!(
            fields,
            [
                "spec.compositeTypeRef.apiVersion",
                "metadata.annotations[crossplane.io/composition-schema-aware-validation-mode]",
            ]
        );
    }

    #[rstest]
    #[case::pipeline_without_steps(indoc! {"
        mode: Pipeline
    "}, &["spec.pipeline"])]
    #[case::pipeline_with_resources(indoc! {"
        mode: Pipeline
        pipeline:
          - step: render
            functionRef:
              name: function-patch-and-transform
        resources:
          - base: {apiVersion: v1, kind: ConfigMap}
    "}, &["spec.mode"])]
    #[case::pipeline_steps(indoc! {"
        mode: Pipeline
        pipeline:
          - step: render
            functionRef:
              name: function-patch-and-transform
          - step: render
          - functionRef:
              name: function-auto-ready
    "}, &[
        "spec.pipeline[1].step",
        "spec.pipeline[1].functionRef.name",
        "spec.pipeline[2].step",
    ])]
    #[case::resources_with_pipeline(indoc! {"
        pipeline:
          - step: render
            functionRef:
              name: function-patch-and-transform
    "}, &["spec.mode"])]
    #[case::resource_names(indoc! {"
        resources:
          - name: a
            base: {apiVersion: v1, kind: ConfigMap}
          - base: {apiVersion: v1, kind: ConfigMap}
          - name: a
            base: {apiVersion: v1, kind: ConfigMap}
    "}, &["spec.resources[1].name", "spec.resources[2].name"])]
    #[case::patch_sets(indoc! {"
        patchSets:
          - name: common
            patches:
              - type: PatchSet
                patchSetName: common
          - name: common
          - patches:
              - type: FromCompositeFieldPath
    "}, &[
        "spec.patchSets[0].patches[0].type",
        "spec.patchSets[1].name",
        "spec.patchSets[2].name",
        "spec.patchSets[2].patches[0].fromFieldPath",
    ])]
    #[case::environment_patches(indoc! {"
        environment:
          patches:
            - type: FromEnvironmentFieldPath
              fromFieldPath: tier
            - type: FromCompositeFieldPath
              fromFieldPath: spec.tier
              toFieldPath: tier
    "}, &["spec.environment.patches[0].type"])]
    #[case::patches(indoc! {"
        resources:
          - base: {apiVersion: v1, kind: ConfigMap}
            patches:
              - type: FromCompositeFieldPath
                toFieldPath: data.name
              - type: CombineFromComposite
                combine:
                  strategy: string
              - type: CombineFromComposite
                combine:
                  variables:
                    - fromFieldPath: ''
                  strategy: concat
                toFieldPath: data.name
              - type: PatchSet
                patchSetName: missing
              - type: FromCompositeFieldPath
                fromFieldPath: spec.size
                transforms:
                  - type: math
                    math:
                      type: ClampMax
    "}, &[
        "spec.resources[0].patches[0].fromFieldPath",
        "spec.resources[0].patches[1].combine.variables",
        "spec.resources[0].patches[1].combine.string",
        "spec.resources[0].patches[1].toFieldPath",
        "spec.resources[0].patches[2].combine.variables[0].fromFieldPath",
        "spec.resources[0].patches[2].combine.strategy",
        "spec.resources[0].patches[3].patchSetName",
        "spec.resources[0].patches[4].transforms[0]",
    ])]
    #[case::readiness_and_connection_details(indoc! {"
        resources:
          - base: {apiVersion: v1, kind: ConfigMap}
            readinessChecks:
              - type: NonEmpty
              - type: MatchCondition
                matchCondition:
                  status: 'True'
            connectionDetails:
              - fromFieldPath: data.endpoint
              - name: nothing
              - name: empty
                type: FromValue
    "}, &[
        "spec.resources[0].readinessChecks[0].fieldPath",
        "spec.resources[0].readinessChecks[1].matchCondition.type",
        "spec.resources[0].connectionDetails[0].name",
        "spec.resources[0].connectionDetails[1].type",
        "spec.resources[0].connectionDetails[2].value",
    ])]
    fn invalid_spec(#[case] spec: &str, #[case] expected: &[&str]) {
        let mut yaml = indoc! {"
            apiVersion: apiextensions.crossplane.io/v1
            kind: Composition
            metadata:
              name: example
            spec:
              compositeTypeRef:
                apiVersion: example.org/v1
                kind: XExample
        "}
        .to_owned();
        for line in spec.lines() {
            yaml.push_str("  ");
            yaml.push_str(line);
            yaml.push('\n');
        }

        assert_eq!(fields(&yaml), expected);
    }

    #[test]
    fn error_types() {
        let composition: Composition = serde_yaml::from_str(indoc! {"
            apiVersion: apiextensions.crossplane.io/v1
            kind: Composition
            metadata:
              name: example
            spec:
              compositeTypeRef:
                apiVersion: example.org/v1
                kind: XExample
              resources:
                - base: {apiVersion: v1, kind: ConfigMap}
                  patches:
                    - type: PatchSet
                      patchSetName: missing
                    - type: PatchSet
        "})
        .unwrap();

        let errors = validate_structure(&composition);
        let types: Vec<_> = errors.iter().map(|error| error.type_).collect();
        assert_eq!(types, [FieldErrorType::Invalid, FieldErrorType::Required]);
    }
}
