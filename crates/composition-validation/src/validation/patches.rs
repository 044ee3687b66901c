use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::JSONSchemaProps;

use crate::{
    crd::{
        patches::{COMBINE_STRATEGY_STRING, CombinePatch, FieldPathPatch, Patch, PatchSet},
        transforms::Transform,
    },
    field::{FieldError, FieldErrorList, FieldPath},
    schema::{KnownJsonType, validate_field_path},
    validation::transforms::validate_io_types_with_transforms,
};

/// The schemas a patch is validated against.
///
/// For patches of resource templates `composed` is the schema of the composed
/// resource. For environment patches it is [`None`], as the environment has no
/// schema.
#[derive(Clone, Copy, Debug)]
pub(crate) struct PatchSchemas<'a> {
    pub composite: Option<&'a JSONSchemaProps>,
    pub composed: Option<&'a JSONSchemaProps>,
    pub metadata: &'a JSONSchemaProps,
    pub patch_sets: &'a [PatchSet],
}

impl PatchSchemas<'_> {
    /// Validates a single patch, returning errors relative to the patch.
    pub fn validate_patch(&self, patch: &Patch) -> FieldErrorList {
        let Self {
            composite,
            composed,
            ..
        } = *self;

        match patch {
            Patch::FromCompositeFieldPath(patch) => {
                self.validate_field_path_patch(patch, composite, composed)
            }
            Patch::ToCompositeFieldPath(patch) => {
                self.validate_field_path_patch(patch, composed, composite)
            }
            Patch::CombineFromComposite(patch) => {
                self.validate_combine_patch(patch, composite, composed)
            }
            Patch::CombineToComposite(patch) => {
                self.validate_combine_patch(patch, composed, composite)
            }
            Patch::FromEnvironmentFieldPath(patch) => {
                self.validate_field_path_patch(patch, None, composed)
            }
            Patch::ToEnvironmentFieldPath(patch) => {
                self.validate_field_path_patch(patch, composed, None)
            }
            Patch::CombineFromEnvironment(patch) => {
                self.validate_combine_patch(patch, None, composed)
            }
            Patch::CombineToEnvironment(patch) => {
                self.validate_combine_patch(patch, composed, None)
            }
            Patch::PatchSet(patch) => self.validate_patch_set_patch(&patch.patch_set_name),
        }
    }

    fn validate_field_path_patch(
        &self,
        patch: &FieldPathPatch,
        from_schema: Option<&JSONSchemaProps>,
        to_schema: Option<&JSONSchemaProps>,
    ) -> FieldErrorList {
        let mut errors = FieldErrorList::new();

        let from_type = self.field_type(
            from_schema,
            patch.from_field_path(),
            FieldPath::new("fromFieldPath"),
            &mut errors,
        );
        let to_type = self.field_type(
            to_schema,
            patch.to_field_path(),
            FieldPath::new("toFieldPath"),
            &mut errors,
        );

        if let (Some(from_type), Some(to_type)) = (from_type, to_type) {
            errors.extend(validate_transforms(&patch.transforms, from_type, to_type));
        }

        errors
    }

    fn validate_combine_patch(
        &self,
        patch: &CombinePatch,
        variables_schema: Option<&JSONSchemaProps>,
        to_schema: Option<&JSONSchemaProps>,
    ) -> FieldErrorList {
        let mut errors = FieldErrorList::new();
        let path = FieldPath::new("combine");

        let mut bad_variables = Vec::new();
        let mut details = Vec::new();
        for (index, variable) in patch.combine.variables.iter().enumerate() {
            if let Err(err) =
                validate_field_path(variables_schema, &variable.from_field_path, self.metadata)
            {
                bad_variables.push(variable.from_field_path.as_str());
                details.push(format!("variables[{index}]: {err}"));
            }
        }

        if !bad_variables.is_empty() {
            errors.push(FieldError::invalid(
                path.clone(),
                bad_variables.join(", "),
                format!("invalid combine variables: {}", details.join(", ")),
            ));
        }

        // The strategy itself is checked structurally, unknown strategies have no
        // known output
        let output_type = (patch.combine.strategy == COMBINE_STRATEGY_STRING)
            .then_some(KnownJsonType::String);

        let to_type = self.field_type(
            to_schema,
            patch.to_field_path(),
            FieldPath::new("toFieldPath"),
            &mut errors,
        );

        if errors.is_empty()
            && let Some(to_type) = to_type
        {
            errors.extend(validate_transforms(&patch.transforms, output_type, to_type));
        }

        errors
    }

    /// Unknown patch sets and nested `PatchSet` patches are rejected
    /// structurally and skipped here.
    fn validate_patch_set_patch(&self, name: &str) -> FieldErrorList {
        let Some((set_index, patch_set)) = self
            .patch_sets
            .iter()
            .enumerate()
            .find(|(_, patch_set)| patch_set.name == name)
        else {
            return FieldErrorList::new();
        };

        let mut errors = FieldErrorList::new();
        for (patch_index, patch) in patch_set.patches.iter().enumerate() {
            let prefix = FieldPath::new("patchSets")
                .index(set_index)
                .child("patches")
                .index(patch_index);

            // Patch sets are resolved exactly one level deep
            if let Patch::PatchSet(_) = patch {
                continue;
            }

            errors.extend(self.validate_patch(patch).with_prefix(&prefix));
        }

        errors
    }

    /// Resolves the type of `field_path`, recording an error at `path` if the
    /// field path is invalid.
    ///
    /// Returns `Some(None)` for valid but untyped field paths and [`None`] for
    /// invalid ones.
    fn field_type(
        &self,
        schema: Option<&JSONSchemaProps>,
        field_path: &str,
        path: FieldPath,
        errors: &mut FieldErrorList,
    ) -> Option<Option<KnownJsonType>> {
        match validate_field_path(schema, field_path, self.metadata) {
            Ok(type_) => Some(type_),
            Err(err) => {
                errors.push(FieldError::invalid(path, field_path, err));
                None
            }
        }
    }
}

/// Chains containing a misconfigured transform are reported structurally and
/// not type checked.
fn validate_transforms(
    transforms: &[Transform],
    from: Option<KnownJsonType>,
    to: Option<KnownJsonType>,
) -> Option<FieldError> {
    if transforms.iter().any(|transform| transform.validate().is_err()) {
        return None;
    }

    validate_io_types_with_transforms(transforms, from, to).err()
}

#[cfg(test)]
mod test {
    use indoc::indoc;
    use rstest::{fixture, rstest};

    use super::*;
    use crate::{field::FieldErrorType, schema::metadata::DEFAULT_METADATA_SCHEMA};

    #[fixture]
    fn composite() -> JSONSchemaProps {
        serde_yaml::from_str(indoc! {"
            type: object
            properties:
              spec:
                type: object
                properties:
                  name:
                    type: string
                  replicas:
                    type: integer
                  labels:
                    type: object
                    additionalProperties:
                      type: string
              status:
                type: object
                properties:
                  address:
                    type: string
        "})
        .unwrap()
    }

    #[fixture]
    fn composed() -> JSONSchemaProps {
        serde_yaml::from_str(indoc! {"
            type: object
            properties:
              spec:
                type: object
                properties:
                  forProvider:
                    type: object
                    properties:
                      instanceName:
                        type: string
                      size:
                        type: integer
                      ratio:
                        type: number
              status:
                type: object
                properties:
                  atProvider:
                    type: object
                    properties:
                      endpoint:
                        type: string
        "})
        .unwrap()
    }

    fn patch(yaml: &str) -> Patch {
        serde_yaml::from_str(yaml).unwrap()
    }

    fn validate(
        composite: &JSONSchemaProps,
        composed: &JSONSchemaProps,
        patch_sets: &[PatchSet],
        patch: &Patch,
    ) -> FieldErrorList {
        PatchSchemas {
            composite: Some(composite),
            composed: Some(composed),
            metadata: &DEFAULT_METADATA_SCHEMA,
            patch_sets,
        }
        .validate_patch(patch)
    }

    fn fields(errors: &FieldErrorList) -> Vec<String> {
        errors.iter().map(|error| error.field.to_string()).collect()
    }

    #[rstest]
    #[case(indoc! {"
        type: FromCompositeFieldPath
        fromFieldPath: spec.name
        toFieldPath: spec.forProvider.instanceName
    "})]
    #[case(indoc! {"
        type: FromCompositeFieldPath
        fromFieldPath: spec.replicas
        toFieldPath: spec.forProvider.ratio
    "})]
    #[case(indoc! {"
        type: ToCompositeFieldPath
        fromFieldPath: status.atProvider.endpoint
        toFieldPath: status.address
    "})]
    #[case(indoc! {"
        type: FromCompositeFieldPath
        fromFieldPath: metadata.labels[app.kubernetes.io/name]
        toFieldPath: metadata.annotations[example.org/app]
    "})]
    #[case(indoc! {"
        type: FromCompositeFieldPath
        fromFieldPath: spec.labels[team]
        toFieldPath: spec.forProvider.instanceName
    "})]
    #[case(indoc! {"
        type: FromEnvironmentFieldPath
        fromFieldPath: anything.goes
        toFieldPath: spec.forProvider.size
    "})]
    #[case(indoc! {r#"
        type: CombineFromComposite
        combine:
          variables:
            - fromFieldPath: spec.name
            - fromFieldPath: spec.replicas
          strategy: string
          string:
            fmt: "%s-%d"
        toFieldPath: spec.forProvider.instanceName
    "#})]
    #[case(indoc! {"
        type: FromCompositeFieldPath
        fromFieldPath: spec.name
        toFieldPath: spec.forProvider.size
        transforms:
          - type: convert
            convert:
              toType: int64
    "})]
    fn valid(composite: JSONSchemaProps, composed: JSONSchemaProps, #[case] yaml: &str) {
        let errors = validate(&composite, &composed, &[], &patch(yaml));
        assert!(errors.is_empty(), "unexpected errors: {errors}");
    }

    #[rstest]
    #[case(indoc! {"
        type: FromCompositeFieldPath
        fromFieldPath: spec.nope
        toFieldPath: spec.forProvider.nope
    "}, &["fromFieldPath", "toFieldPath"])]
    #[case(indoc! {"
        type: ToCompositeFieldPath
        fromFieldPath: spec.name
        toFieldPath: spec.name
    "}, &["fromFieldPath"])]
    #[case(indoc! {"
        type: FromCompositeFieldPath
        fromFieldPath: spec.name
        toFieldPath: spec.forProvider.size
    "}, &["transforms"])]
    #[case(indoc! {"
        type: ToEnvironmentFieldPath
        fromFieldPath: spec.forProvider.missing
        toFieldPath: whatever
    "}, &["fromFieldPath"])]
    fn invalid(
        composite: JSONSchemaProps,
        composed: JSONSchemaProps,
        #[case] yaml: &str,
        #[case] expected: &[&str],
    ) {
        let errors = validate(&composite, &composed, &[], &patch(yaml));
        assert_eq!(fields(&errors), expected);
    }

    #[rstest]
    fn combine_variables_are_aggregated(composite: JSONSchemaProps, composed: JSONSchemaProps) {
        let combine = patch(indoc! {r#"
            type: CombineFromComposite
            combine:
              variables:
                - fromFieldPath: spec.first
                - fromFieldPath: spec.name
                - fromFieldPath: spec.second
              strategy: string
              string:
                fmt: "%s-%s-%s"
            toFieldPath: spec.forProvider.instanceName
        "#});

        let errors = validate(&composite, &composed, &[], &combine);
        assert_eq!(fields(&errors), ["combine"]);

        let error = &errors[0];
        assert_eq!(error.type_, FieldErrorType::Invalid);
        assert_eq!(error.bad_value.as_deref(), Some("spec.first, spec.second"));
        assert!(error.detail.contains("variables[0]"));
        assert!(error.detail.contains("variables[2]"));
    }

    #[rstest]
    fn combine_strategy_is_left_to_structural_checks(
        composite: JSONSchemaProps,
        composed: JSONSchemaProps,
    ) {
        let missing_format = patch(indoc! {"
            type: CombineFromComposite
            combine:
              variables:
                - fromFieldPath: spec.name
              strategy: string
            toFieldPath: spec.forProvider.size
        "});
        let errors = validate(&composite, &composed, &[], &missing_format);
        assert_eq!(fields(&errors), ["transforms"]);

        // Nothing is known about the output of an unknown strategy
        let unknown_strategy = patch(indoc! {"
            type: CombineFromComposite
            combine:
              variables:
                - fromFieldPath: spec.name
              strategy: concat
            toFieldPath: spec.forProvider.size
        "});
        let errors = validate(&composite, &composed, &[], &unknown_strategy);
        assert!(errors.is_empty(), "unexpected errors: {errors}");
    }

    #[rstest]
    fn combine_output_is_string(composite: JSONSchemaProps, composed: JSONSchemaProps) {
        let combine = patch(indoc! {r#"
            type: CombineFromComposite
            combine:
              variables:
                - fromFieldPath: spec.replicas
              strategy: string
              string:
                fmt: "%d"
            toFieldPath: spec.forProvider.size
        "#});

        let errors = validate(&composite, &composed, &[], &combine);
        assert_eq!(fields(&errors), ["transforms"]);
        assert_eq!(errors[0].type_, FieldErrorType::Required);
    }

    #[rstest]
    fn patch_sets(composite: JSONSchemaProps, composed: JSONSchemaProps) {
        let patch_sets: Vec<PatchSet> = serde_yaml::from_str(indoc! {"
            - name: naming
              patches:
                - type: FromCompositeFieldPath
                  fromFieldPath: spec.name
                  toFieldPath: spec.forProvider.instanceName
            - name: broken
              patches:
                - type: FromCompositeFieldPath
                  fromFieldPath: spec.name
                  toFieldPath: spec.forProvider.instanceName
                - type: FromCompositeFieldPath
                  fromFieldPath: spec.name
                  toFieldPath: spec.forProvider.typo
                - type: PatchSet
                  patchSetName: naming
        "})
        .unwrap();

        let valid = patch("{type: PatchSet, patchSetName: naming}");
        assert!(validate(&composite, &composed, &patch_sets, &valid).is_empty());

        let broken = patch("{type: PatchSet, patchSetName: broken}");
        let errors = validate(&composite, &composed, &patch_sets, &broken);
        assert_eq!(fields(&errors), ["patchSets[1].patches[1].toFieldPath"]);

        let unknown = patch("{type: PatchSet, patchSetName: unknown}");
        assert!(validate(&composite, &composed, &patch_sets, &unknown).is_empty());
    }

    #[rstest]
    fn misconfigured_transforms_are_not_type_checked(
        composite: JSONSchemaProps,
        composed: JSONSchemaProps,
    ) {
        let misconfigured = patch(indoc! {"
            type: FromCompositeFieldPath
            fromFieldPath: spec.replicas
            toFieldPath: spec.forProvider.instanceName
            transforms:
              - type: map
                map: {}
        "});

        let errors = validate(&composite, &composed, &[], &misconfigured);
        assert!(errors.is_empty(), "unexpected errors: {errors}");
    }

    #[rstest]
    fn missing_schemas_are_unconstrained(composite: JSONSchemaProps) {
        let schemas = PatchSchemas {
            composite: Some(&composite),
            composed: None,
            metadata: &DEFAULT_METADATA_SCHEMA,
            patch_sets: &[],
        };

        let errors = schemas.validate_patch(&patch(indoc! {"
            type: FromCompositeFieldPath
            fromFieldPath: spec.name
            toFieldPath: literally.anything
        "}));
        assert!(errors.is_empty());

        let errors = schemas.validate_patch(&patch(indoc! {"
            type: ToCompositeFieldPath
            fromFieldPath: literally.anything
            toFieldPath: spec.undefined
        "}));
        assert_eq!(fields(&errors), ["toFieldPath"]);
    }
}
