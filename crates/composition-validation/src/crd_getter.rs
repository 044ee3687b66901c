//! Access to the CustomResourceDefinitions describing composite and composed
//! resources.
//!
//! The validator never caches CRDs itself. Every validation looks up each
//! distinct group and kind exactly once, caching beyond a single validation is
//! up to the [`CrdGetter`] implementation. [`KubeCrdGetter`] serves lookups
//! from a watch of all CRDs.
use std::{
    collections::BTreeMap,
    convert::Infallible,
    fmt::{Debug, Display},
};

use async_trait::async_trait;
use futures::{StreamExt, future};
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::{
    CustomResourceDefinition, JSONSchemaProps,
};
use kube::{
    Api, Client,
    runtime::{
        WatchStreamExt,
        reflector::{self, Store, store::WriterDropped},
        watcher::{self, watcher},
    },
};
use snafu::{ResultExt, Snafu};
use tracing::instrument;

/// The group and kind of a resource, which identifies its CRD independently
/// of any version.
#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct GroupKind {
    pub group: String,
    pub kind: String,
}

impl GroupKind {
    pub fn new(group: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            kind: kind.into(),
        }
    }

    /// The group and kind of the resources defined by `crd`.
    pub fn of(crd: &CustomResourceDefinition) -> Self {
        Self::new(&crd.spec.group, &crd.spec.names.kind)
    }
}

impl Display for GroupKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.group.as_str() {
            "" => write!(f, "{kind}", kind = self.kind),
            group => write!(f, "{kind}.{group}", kind = self.kind),
        }
    }
}

/// Looks up CRDs by group and kind.
///
/// Returning `Ok(None)` signals that no such CRD exists, which is treated
/// differently from a failed lookup: depending on the validation mode a
/// missing CRD is silently skipped, whereas errors are always reported.
#[async_trait]
pub trait CrdGetter: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    async fn get(
        &self,
        group_kind: &GroupKind,
    ) -> Result<Option<CustomResourceDefinition>, Self::Error>;
}

/// Returns the OpenAPI v3 schema `crd` declares for `version`.
///
/// Returns [`None`] if the version exists but declares no schema.
pub fn version_schema<'a>(
    crd: &'a CustomResourceDefinition,
    version: &str,
) -> Option<&'a JSONSchemaProps> {
    crd.spec
        .versions
        .iter()
        .find(|v| v.name == version)
        .and_then(|v| v.schema.as_ref())
        .and_then(|schema| schema.open_api_v3_schema.as_ref())
}

/// Returns `true` if `crd` defines `version`, regardless of it being served.
pub fn defines_version(crd: &CustomResourceDefinition, version: &str) -> bool {
    crd.spec.versions.iter().any(|v| v.name == version)
}

/// A [`CrdGetter`] backed by an in-memory map, for callers which already know
/// all relevant CRDs.
#[derive(Clone, Debug, Default)]
pub struct CrdMap(BTreeMap<GroupKind, CustomResourceDefinition>);

impl CrdMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, crd: CustomResourceDefinition) -> Option<CustomResourceDefinition> {
        self.0.insert(GroupKind::of(&crd), crd)
    }
}

impl FromIterator<CustomResourceDefinition> for CrdMap {
    fn from_iter<T: IntoIterator<Item = CustomResourceDefinition>>(iter: T) -> Self {
        Self(iter.into_iter().map(|crd| (GroupKind::of(&crd), crd)).collect())
    }
}

#[async_trait]
impl CrdGetter for CrdMap {
    type Error = Infallible;

    async fn get(
        &self,
        group_kind: &GroupKind,
    ) -> Result<Option<CustomResourceDefinition>, Self::Error> {
        Ok(self.0.get(group_kind).cloned())
    }
}

#[derive(Debug, Snafu)]
pub enum KubeCrdGetterError {
    #[snafu(display("the CustomResourceDefinition watch stopped before it was initialized"))]
    WatchStopped { source: WriterDropped },
}

/// A [`CrdGetter`] backed by a watch of all CRDs in the cluster.
///
/// Lookups are served from the local cache of the watch and wait until it has
/// been filled once.
#[derive(Clone)]
pub struct KubeCrdGetter {
    store: Store<CustomResourceDefinition>,
}

impl Debug for KubeCrdGetter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeCrdGetter").finish_non_exhaustive()
    }
}

impl KubeCrdGetter {
    /// Creates a getter watching CRDs through `client`.
    ///
    /// The returned future drives the watch and must be polled (usually
    /// spawned) for as long as the getter is in use.
    pub fn new(client: Client) -> (Self, impl Future<Output = ()> + Send + 'static) {
        let (store, writer) = reflector::store();
        let crd_api = Api::<CustomResourceDefinition>::all(client);

        let watch = watcher(crd_api, watcher::Config::default())
            .default_backoff()
            .reflect(writer)
            .for_each(|event| {
                if let Err(err) = event {
                    tracing::warn!(
                        error = &err as &dyn std::error::Error,
                        "failed to watch custom resource definitions"
                    );
                }
                future::ready(())
            });

        (Self::from_store(store), watch)
    }

    /// Creates a getter reading from an existing store of CRDs.
    pub fn from_store(store: Store<CustomResourceDefinition>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl CrdGetter for KubeCrdGetter {
    type Error = KubeCrdGetterError;

    // CRD names are derived from the plural, which is unknown at this point.
    // Hence the cached CRDs are searched by group and kind.
    #[instrument(skip(self, group_kind), fields(k8s.crd.group_kind = %group_kind))]
    async fn get(
        &self,
        group_kind: &GroupKind,
    ) -> Result<Option<CustomResourceDefinition>, Self::Error> {
        self.store.wait_until_ready().await.context(WatchStoppedSnafu)?;

        let crd = self
            .store
            .find(|crd| GroupKind::of(crd) == *group_kind)
            .map(|crd| CustomResourceDefinition::clone(&crd));

        tracing::debug!(found = crd.is_some(), "looked up custom resource definition");
        Ok(crd)
    }
}
