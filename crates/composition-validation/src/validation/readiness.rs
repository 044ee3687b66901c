use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::JSONSchemaProps;

use crate::{
    crd::readiness::{ConnectionDetail, ReadinessCheck},
    field::{FieldError, FieldErrorList, FieldPath},
    schema::validate_field_path,
};

/// Validates the field paths of readiness checks against the schema of the
/// composed resource. Errors are relative to the resource template.
pub(crate) fn validate_readiness_checks(
    checks: &[ReadinessCheck],
    composed: &JSONSchemaProps,
    metadata: &JSONSchemaProps,
) -> FieldErrorList {
    let mut errors = FieldErrorList::new();

    for (index, check) in checks.iter().enumerate() {
        let Some(field_path) = check.field_path() else {
            continue;
        };
        let path = FieldPath::new("readinessChecks")
            .index(index)
            .child("fieldPath");

        match validate_field_path(Some(composed), field_path, metadata) {
            Err(err) => errors.push(FieldError::invalid(path, field_path, err)),
            Ok(Some(actual)) => {
                if let Some(required) = check
                    .required_type()
                    .filter(|required| !actual.is_equivalent(*required))
                {
                    errors.push(FieldError::invalid(
                        path,
                        field_path,
                        format!(
                            "the readiness check requires a field of type {required}, but the field has type {actual}"
                        ),
                    ));
                }
            }
            Ok(None) => {}
        }
    }

    errors
}

/// Validates the `fromFieldPath` of connection details against the schema of
/// the composed resource. Errors are relative to the resource template.
pub(crate) fn validate_connection_details(
    details: &[ConnectionDetail],
    composed: &JSONSchemaProps,
    metadata: &JSONSchemaProps,
) -> FieldErrorList {
    details
        .iter()
        .enumerate()
        .filter_map(|(index, detail)| {
            let field_path = detail.from_field_path.as_deref()?;
            let err = validate_field_path(Some(composed), field_path, metadata).err()?;

            Some(FieldError::invalid(
                FieldPath::new("connectionDetails")
                    .index(index)
                    .child("fromFieldPath"),
                field_path,
                err,
            ))
        })
        .collect()
}
