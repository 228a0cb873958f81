//! Object store seam between the reconciler and the cluster
//!
//! The reconciler only ever talks to [`GameStore`]. [`KubeStore`] backs it
//! with the Kubernetes API; tests use an in-memory fake or a mock.

use std::fmt::Debug;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Service;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::NamespaceResourceScope;
use kube::api::{Api, DeleteParams, ListParams, Patch, PatchParams, PostParams};
use kube::{Client, Resource};
#[cfg(test)]
use mockall::automock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::crd::{Game, GameStatus, GatewayConfig, UDPRoute};
use crate::error::{is_api_status, Error, Result};

/// Kinds of objects the reconciler creates on behalf of a Game
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ChildKind {
    Deployment,
    Service,
    UdpRoute,
}

impl ChildKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChildKind::Deployment => "Deployment",
            ChildKind::Service => "Service",
            ChildKind::UdpRoute => "UDPRoute",
        }
    }
}

impl std::fmt::Display for ChildKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A concrete child object of one of the managed kinds
#[derive(Clone, Debug, PartialEq)]
pub enum ChildObject {
    Deployment(Deployment),
    Service(Service),
    UdpRoute(UDPRoute),
}

impl ChildObject {
    pub fn kind(&self) -> ChildKind {
        match self {
            ChildObject::Deployment(_) => ChildKind::Deployment,
            ChildObject::Service(_) => ChildKind::Service,
            ChildObject::UdpRoute(_) => ChildKind::UdpRoute,
        }
    }

    pub fn meta(&self) -> &ObjectMeta {
        match self {
            ChildObject::Deployment(d) => &d.metadata,
            ChildObject::Service(s) => &s.metadata,
            ChildObject::UdpRoute(r) => &r.metadata,
        }
    }

    pub fn meta_mut(&mut self) -> &mut ObjectMeta {
        match self {
            ChildObject::Deployment(d) => &mut d.metadata,
            ChildObject::Service(s) => &mut s.metadata,
            ChildObject::UdpRoute(r) => &mut r.metadata,
        }
    }

    pub fn name(&self) -> String {
        self.meta().name.clone().unwrap_or_default()
    }

    pub fn namespace(&self) -> String {
        self.meta().namespace.clone().unwrap_or_default()
    }

    /// Serialize to a JSON value for structural comparison
    pub fn to_value(&self) -> Result<serde_json::Value> {
        let value = match self {
            ChildObject::Deployment(d) => serde_json::to_value(d)?,
            ChildObject::Service(s) => serde_json::to_value(s)?,
            ChildObject::UdpRoute(r) => serde_json::to_value(r)?,
        };
        Ok(value)
    }

    /// Deserialize a JSON value back into the given kind
    pub fn from_value(kind: ChildKind, value: serde_json::Value) -> Result<Self> {
        let object = match kind {
            ChildKind::Deployment => ChildObject::Deployment(serde_json::from_value(value)?),
            ChildKind::Service => ChildObject::Service(serde_json::from_value(value)?),
            ChildKind::UdpRoute => ChildObject::UdpRoute(serde_json::from_value(value)?),
        };
        Ok(object)
    }

    pub fn as_deployment(&self) -> Option<&Deployment> {
        match self {
            ChildObject::Deployment(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_service(&self) -> Option<&Service> {
        match self {
            ChildObject::Service(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_udp_route(&self) -> Option<&UDPRoute> {
        match self {
            ChildObject::UdpRoute(r) => Some(r),
            _ => None,
        }
    }
}

/// Narrow store interface used by the reconciler
///
/// Absence is reported as `None`/`false`, never as an error. Optimistic
/// concurrency failures surface as [`Error::Conflict`].
#[cfg_attr(test, automock)]
#[async_trait]
pub trait GameStore: Send + Sync {
    /// Get a Game by namespace and name
    async fn get_game(&self, namespace: &str, name: &str) -> Result<Option<Game>>;

    /// Replace a Game (metadata and spec), guarded by its resourceVersion
    async fn replace_game(&self, game: &Game) -> Result<Game>;

    /// Write the status subresource of a Game
    async fn patch_game_status(
        &self,
        namespace: &str,
        name: &str,
        status: &GameStatus,
    ) -> Result<()>;

    /// Get the relay GatewayConfig
    async fn get_gateway_config(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<GatewayConfig>>;

    /// Get an object of a managed kind
    async fn get_child(
        &self,
        kind: ChildKind,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ChildObject>>;

    /// Create an object; fails with a conflict if it already exists
    async fn create_child(&self, object: &ChildObject) -> Result<()>;

    /// Replace an object, guarded by its resourceVersion
    async fn replace_child(&self, object: &ChildObject) -> Result<()>;

    /// Delete an object; returns false when it was already gone
    async fn delete_child(&self, kind: ChildKind, namespace: &str, name: &str) -> Result<bool>;

    /// List objects of a kind matching a label selector
    async fn list_children(
        &self,
        kind: ChildKind,
        namespace: &str,
        label_selector: &str,
    ) -> Result<Vec<ChildObject>>;
}

/// [`GameStore`] backed by the Kubernetes API
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
    field_manager: String,
}

impl KubeStore {
    pub fn new(client: Client, field_manager: &str) -> Self {
        Self {
            client,
            field_manager: field_manager.to_string(),
        }
    }

    fn api<K>(&self, namespace: &str) -> Api<K>
    where
        K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>,
    {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn post_params(&self) -> PostParams {
        PostParams {
            field_manager: Some(self.field_manager.clone()),
            ..Default::default()
        }
    }

    async fn get_opt<K>(api: Api<K>, name: &str) -> Result<Option<K>>
    where
        K: Resource + Clone + DeserializeOwned + Debug,
    {
        match api.get(name).await {
            Ok(obj) => Ok(Some(obj)),
            Err(kube::Error::Api(e)) if e.code == 404 => Ok(None),
            Err(e) => Err(Error::KubeError(e)),
        }
    }

    async fn create<K>(&self, api: Api<K>, kind: ChildKind, obj: &K) -> Result<()>
    where
        K: Resource + Clone + Serialize + DeserializeOwned + Debug,
    {
        match api.create(&self.post_params(), obj).await {
            Ok(_) => Ok(()),
            Err(e) if is_api_status(&e, 409) => Err(conflict_for(kind, obj.meta())),
            Err(e) => Err(Error::KubeError(e)),
        }
    }

    async fn replace<K>(&self, api: Api<K>, kind: ChildKind, obj: &K) -> Result<()>
    where
        K: Resource + Clone + Serialize + DeserializeOwned + Debug,
    {
        let name = obj.meta().name.clone().unwrap_or_default();
        match api.replace(&name, &self.post_params(), obj).await {
            Ok(_) => Ok(()),
            Err(e) if is_api_status(&e, 409) => Err(conflict_for(kind, obj.meta())),
            Err(e) => Err(Error::KubeError(e)),
        }
    }

    async fn delete<K>(api: Api<K>, name: &str) -> Result<bool>
    where
        K: Resource + Clone + DeserializeOwned + Debug,
    {
        match api.delete(name, &DeleteParams::default()).await {
            Ok(_) => Ok(true),
            Err(kube::Error::Api(e)) if e.code == 404 => Ok(false),
            Err(e) => Err(Error::KubeError(e)),
        }
    }
}

fn conflict_for(kind: ChildKind, meta: &ObjectMeta) -> Error {
    Error::conflict(
        kind.as_str(),
        meta.namespace.as_deref().unwrap_or_default(),
        meta.name.as_deref().unwrap_or_default(),
    )
}

/// A Game deleted under us is `NotFound`, a stale resourceVersion `Conflict`
fn game_write_error(err: kube::Error, namespace: &str, name: &str) -> Error {
    if is_api_status(&err, 404) {
        Error::not_found("Game", namespace, name)
    } else if is_api_status(&err, 409) {
        Error::conflict("Game", namespace, name)
    } else {
        Error::KubeError(err)
    }
}

#[async_trait]
impl GameStore for KubeStore {
    async fn get_game(&self, namespace: &str, name: &str) -> Result<Option<Game>> {
        Self::get_opt(self.api::<Game>(namespace), name).await
    }

    async fn replace_game(&self, game: &Game) -> Result<Game> {
        let namespace = game.metadata.namespace.clone().unwrap_or_default();
        let name = game.metadata.name.clone().unwrap_or_default();
        let api: Api<Game> = self.api(&namespace);
        api.replace(&name, &self.post_params(), game)
            .await
            .map_err(|e| game_write_error(e, &namespace, &name))
    }

    async fn patch_game_status(
        &self,
        namespace: &str,
        name: &str,
        status: &GameStatus,
    ) -> Result<()> {
        let api: Api<Game> = self.api(namespace);
        let patch = serde_json::json!({ "status": status });
        api.patch_status(
            name,
            &PatchParams::apply(&self.field_manager),
            &Patch::Merge(&patch),
        )
        .await
        .map_err(Error::KubeError)?;
        Ok(())
    }

    async fn get_gateway_config(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<GatewayConfig>> {
        Self::get_opt(self.api::<GatewayConfig>(namespace), name).await
    }

    async fn get_child(
        &self,
        kind: ChildKind,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ChildObject>> {
        let found = match kind {
            ChildKind::Deployment => Self::get_opt(self.api::<Deployment>(namespace), name)
                .await?
                .map(ChildObject::Deployment),
            ChildKind::Service => Self::get_opt(self.api::<Service>(namespace), name)
                .await?
                .map(ChildObject::Service),
            ChildKind::UdpRoute => Self::get_opt(self.api::<UDPRoute>(namespace), name)
                .await?
                .map(ChildObject::UdpRoute),
        };
        Ok(found)
    }

    async fn create_child(&self, object: &ChildObject) -> Result<()> {
        let namespace = object.namespace();
        debug!(kind = %object.kind(), name = %object.name(), namespace = %namespace, "creating child");
        match object {
            ChildObject::Deployment(d) => self.create(self.api(&namespace), object.kind(), d).await,
            ChildObject::Service(s) => self.create(self.api(&namespace), object.kind(), s).await,
            ChildObject::UdpRoute(r) => self.create(self.api(&namespace), object.kind(), r).await,
        }
    }

    async fn replace_child(&self, object: &ChildObject) -> Result<()> {
        let namespace = object.namespace();
        debug!(kind = %object.kind(), name = %object.name(), namespace = %namespace, "replacing child");
        match object {
            ChildObject::Deployment(d) => self.replace(self.api(&namespace), object.kind(), d).await,
            ChildObject::Service(s) => self.replace(self.api(&namespace), object.kind(), s).await,
            ChildObject::UdpRoute(r) => self.replace(self.api(&namespace), object.kind(), r).await,
        }
    }

    async fn delete_child(&self, kind: ChildKind, namespace: &str, name: &str) -> Result<bool> {
        match kind {
            ChildKind::Deployment => Self::delete(self.api::<Deployment>(namespace), name).await,
            ChildKind::Service => Self::delete(self.api::<Service>(namespace), name).await,
            ChildKind::UdpRoute => Self::delete(self.api::<UDPRoute>(namespace), name).await,
        }
    }

    async fn list_children(
        &self,
        kind: ChildKind,
        namespace: &str,
        label_selector: &str,
    ) -> Result<Vec<ChildObject>> {
        let params = ListParams::default().labels(label_selector);
        let items = match kind {
            ChildKind::Deployment => self
                .api::<Deployment>(namespace)
                .list(&params)
                .await?
                .items
                .into_iter()
                .map(ChildObject::Deployment)
                .collect(),
            ChildKind::Service => self
                .api::<Service>(namespace)
                .list(&params)
                .await?
                .items
                .into_iter()
                .map(ChildObject::Service)
                .collect(),
            ChildKind::UdpRoute => self
                .api::<UDPRoute>(namespace)
                .list(&params)
                .await?
                .items
                .into_iter()
                .map(ChildObject::UdpRoute)
                .collect(),
        };
        Ok(items)
    }
}
