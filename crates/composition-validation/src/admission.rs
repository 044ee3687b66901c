//! Serves the [`Validator`] as a validating admission webhook for
//! Compositions.
use std::sync::Arc;

use axum::{Json, Router, routing::post};
use kube::core::{
    Status,
    admission::{AdmissionRequest, AdmissionResponse, AdmissionReview, Operation},
};
use snafu::{ResultExt, Snafu};

use crate::{
    crd::Composition,
    crd_getter::CrdGetter,
    validation::{InvalidCompositionError, Validator},
};

#[derive(Debug, Snafu)]
enum StatusError {
    #[snafu(display("failed to serialize the status of the invalid composition"))]
    SerializeStatus { source: serde_json::Error },

    #[snafu(display("failed to convert the status of the invalid composition"))]
    ConvertStatus { source: serde_json::Error },
}

/// The HTTP path the webhook is served on.
pub const VALIDATE_COMPOSITIONS_PATH: &str = "/validate/compositions";

/// Admits or denies a single Composition.
///
/// Deletions are always allowed. Warnings are attached to the response
/// regardless of the outcome.
pub async fn validate_composition<G: CrdGetter>(
    validator: Arc<Validator<G>>,
    request: AdmissionRequest<Composition>,
) -> AdmissionResponse {
    let composition = match (&request.operation, &request.object) {
        (Operation::Delete, _) | (_, None) => return AdmissionResponse::from(&request),
        (_, Some(composition)) => composition,
    };

    let validated = validator.validate(composition).await;

    let mut response = AdmissionResponse::from(&request);
    if let Err(err) = validated.result {
        tracing::info!(
            k8s.composition.name = err.name,
            errors.count = err.errors.len(),
            "denying invalid composition"
        );
        response = response.deny(err.to_string());

        match invalid_status(&err) {
            Ok(status) => response.result = status,
            Err(err) => tracing::warn!(
                error = &err as &dyn std::error::Error,
                "denying composition without field causes"
            ),
        }
    }

    if !validated.warnings.is_empty() {
        response.warnings = Some(validated.warnings);
    }

    response
}

/// The `422 Invalid` status carrying one cause per field error, as the API
/// server returns it for invalid objects.
fn invalid_status(err: &InvalidCompositionError) -> Result<Status, StatusError> {
    let status = serde_json::to_value(err.to_status()).context(SerializeStatusSnafu)?;
    serde_json::from_value(status).context(ConvertStatusSnafu)
}

/// Returns a [`Router`] serving [`validate_composition`] at
/// [`VALIDATE_COMPOSITIONS_PATH`].
pub fn router<G: CrdGetter + 'static>(validator: Arc<Validator<G>>) -> Router {
    let handler_fn = |Json(review): Json<AdmissionReview<Composition>>| async move {
        let request: AdmissionRequest<Composition> = match review.try_into() {
            Ok(request) => request,
            Err(err) => {
                return Json(
                    AdmissionResponse::invalid(format!("failed to convert to request: {err}"))
                        .into_review(),
                );
            }
        };

        let response = validate_composition(validator, request).await;
        Json(response.into_review())
    };

    Router::new().route(VALIDATE_COMPOSITIONS_PATH, post(handler_fn))
}

#[cfg(test)]
mod test {
    use serde_json::json;

    use super::*;
    use crate::crd_getter::CrdMap;

    fn request(operation: &str, object: serde_json::Value) -> AdmissionRequest<Composition> {
        let review: AdmissionReview<Composition> = serde_json::from_value(json!({
            "apiVersion": "admission.k8s.io/v1",
            "kind": "AdmissionReview",
            "request": {
                "uid": "705ab4f5-6393-11e8-b7cc-42010a800002",
                "kind": {
                    "group": "apiextensions.crossplane.io",
                    "version": "v1",
                    "kind": "Composition"
                },
                "resource": {
                    "group": "apiextensions.crossplane.io",
                    "version": "v1",
                    "resource": "compositions"
                },
                "name": "example",
                "operation": operation,
                "userInfo": {},
                "object": object,
                "dryRun": false
            }
        }))
        .unwrap();

        review.try_into().unwrap()
    }

    fn validator() -> Arc<Validator<CrdMap>> {
        Arc::new(Validator::builder(CrdMap::new()).build())
    }

    #[tokio::test]
    async fn allows_valid_composition() {
        let request = request(
            "CREATE",
            json!({
                "apiVersion": "apiextensions.crossplane.io/v1",
                "kind": "Composition",
                "metadata": {"name": "example"},
                "spec": {
                    "compositeTypeRef": {
                        "apiVersion": "example.org/v1alpha1",
                        "kind": "XDatabase"
                    },
                    "resources": [{
                        "name": "bucket",
                        "base": {
                            "apiVersion": "s3.aws.upbound.io/v1beta1",
                            "kind": "Bucket"
                        }
                    }]
                }
            }),
        );

        let response = validate_composition(validator(), request).await;
        assert!(response.allowed);
        assert_eq!(response.warnings, None);
    }

    #[tokio::test]
    async fn denies_malformed_composition() {
        let request = request(
            "UPDATE",
            json!({
                "apiVersion": "apiextensions.crossplane.io/v1",
                "kind": "Composition",
                "metadata": {"name": "example"},
                "spec": {
                    "compositeTypeRef": {"apiVersion": "", "kind": "XDatabase"},
                    "resources": [{
                        "base": {"apiVersion": "v1", "kind": "ConfigMap"}
                    }]
                }
            }),
        );

        let response = validate_composition(validator(), request).await;
        assert!(!response.allowed);

        let review = serde_json::to_value(response.into_review()).unwrap();
        let status = &review["response"]["status"];
        assert_eq!(status["code"], 422);
        assert_eq!(status["reason"], "Invalid");
        assert!(
            status["message"]
                .as_str()
                .unwrap()
                .contains("spec.compositeTypeRef.apiVersion"),
            "unexpected status: {status}"
        );

        let details = &status["details"];
        assert_eq!(details["kind"], "Composition");
        assert_eq!(details["name"], "example");
        assert_eq!(
            details["causes"],
            json!([{
                "field": "spec.compositeTypeRef.apiVersion",
                "message": "Required value: the composite type must be specified",
                "reason": "FieldValueRequired"
            }])
        );
    }

    #[tokio::test]
    async fn allows_deletion_without_validation() {
        let request = request(
            "DELETE",
            json!({
                "apiVersion": "apiextensions.crossplane.io/v1",
                "kind": "Composition",
                "metadata": {"name": "example"},
                "spec": {
                    "compositeTypeRef": {"apiVersion": "", "kind": ""}
                }
            }),
        );

        let response = validate_composition(validator(), request).await;
        assert!(response.allowed);
    }
}
