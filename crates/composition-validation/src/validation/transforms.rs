use crate::{
    crd::transforms::{Transform, TransformIoType},
    field::{FieldError, FieldPath},
    schema::KnownJsonType,
};

/// Checks that a value of type `from` can be patched into a field of type `to`
/// after passing through `transforms`.
///
/// Unknown types ([`None`]) are unconstrained. Returned errors are relative to
/// the patch, pointing at `transforms` or `transforms[i]`.
pub fn validate_io_types_with_transforms(
    transforms: &[Transform],
    from: Option<KnownJsonType>,
    to: Option<KnownJsonType>,
) -> Result<(), FieldError> {
    let path = FieldPath::new("transforms");

    if transforms.is_empty() {
        return match (from, to) {
            (Some(from), Some(to)) if !from.is_equivalent(to) => Err(FieldError::required(
                path,
                format!(
                    "the fromFieldPath does not have a type of {to}; transforms are required to convert type {from} into a {to}"
                ),
            )),
            _ => Ok(()),
        };
    }

    let mut current = from
        .map(TransformIoType::try_from)
        .transpose()
        .map_err(|err| FieldError::internal(path.clone(), err))?;

    for (index, transform) in transforms.iter().enumerate() {
        if let Some(input) = current {
            transform.validate_input(input).map_err(|err| {
                FieldError::invalid(path.index(index), transform.type_name(), err)
            })?;
        }

        // Nothing can be inferred past a transform with an unknown output
        let Some(output) = transform.output_type(current) else {
            return Ok(());
        };

        current = Some(output);
    }

    let (Some(output), Some(to)) = (current, to) else {
        return Ok(());
    };

    let output_json_type = KnownJsonType::from(output);
    if output_json_type.is_equivalent(to) {
        Ok(())
    } else {
        Err(FieldError::invalid(
            path,
            output.to_string(),
            format!(
                "the provided transforms output a value of type {output_json_type}, which is incompatible with the toFieldPath type {to}"
            ),
        ))
    }
}
