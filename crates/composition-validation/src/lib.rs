//! This library validates Crossplane Compositions against the schemas of the
//! resources they compose, before they are admitted to the cluster.
//!
//! Every field path used by patches, readiness checks and connection details
//! is resolved against the OpenAPI schema of the referenced CRD, and the types
//! flowing through patch transforms are checked for compatibility. Problems are
//! reported as field errors, the way the Kubernetes API server reports invalid
//! objects.
//!
//! - [`crd`] contains the `Composition` custom resource.
//! - [`crd_getter`] resolves CRDs, either from a fixed set or from the cluster.
//! - [`schema`] resolves field paths against schemas.
//! - [`validation`] contains the [`Validator`](validation::Validator).
//! - [`admission`] serves the validator as validating admission webhook.
pub mod admission;
pub mod crd;
pub mod crd_getter;
pub mod field;
pub mod schema;
pub mod validation;
