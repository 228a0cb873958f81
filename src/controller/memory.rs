//! In-memory [`GameStore`] used by the controller tests
//!
//! Behaves like the API server where the reconciler can observe it:
//! resourceVersion checks on replace, conflicts on duplicate create,
//! finalizer-gated deletion of Games, and status kept across replaces.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{
    LoadBalancerIngress, LoadBalancerStatus, Service, ServiceStatus,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;

use super::store::{ChildKind, ChildObject, GameStore};
use crate::crd::{Game, GameStatus, GatewayConfig};
use crate::error::{Error, Result};

type Key = (String, String);
type ChildKey = (ChildKind, String, String);

/// Mutation counters observed by tests
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Mutations {
    pub creates: usize,
    pub replaces: usize,
    pub deletes: usize,
    pub game_replaces: usize,
    pub status_patches: usize,
}

impl Mutations {
    pub fn total(&self) -> usize {
        self.creates + self.replaces + self.deletes + self.game_replaces + self.status_patches
    }
}

#[derive(Default)]
struct Inner {
    games: BTreeMap<Key, Game>,
    gateway_configs: BTreeMap<Key, GatewayConfig>,
    children: BTreeMap<ChildKey, ChildObject>,
    pending_addresses: BTreeMap<Key, LoadBalancerIngress>,
    forced_conflicts: usize,
    next_version: u64,
    mutations: Mutations,
}

impl Inner {
    fn bump(&mut self) -> String {
        self.next_version += 1;
        self.next_version.to_string()
    }
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

fn key(namespace: &str, name: &str) -> Key {
    (namespace.to_string(), name.to_string())
}

fn ingress(ip: Option<&str>, hostname: Option<&str>) -> LoadBalancerIngress {
    LoadBalancerIngress {
        ip: ip.map(String::from),
        hostname: hostname.map(String::from),
        ..Default::default()
    }
}

fn set_ingress(service: &mut Service, entry: LoadBalancerIngress) {
    service.status = Some(ServiceStatus {
        load_balancer: Some(LoadBalancerStatus {
            ingress: Some(vec![entry]),
        }),
        ..Default::default()
    });
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap()
    }

    pub fn insert_game(&self, mut game: Game) {
        let mut inner = self.lock();
        game.metadata.resource_version = Some(inner.bump());
        let k = key(
            game.metadata.namespace.as_deref().unwrap_or_default(),
            game.metadata.name.as_deref().unwrap_or_default(),
        );
        inner.games.insert(k, game);
    }

    pub fn insert_gateway_config(&self, config: GatewayConfig) {
        let k = key(
            config.metadata.namespace.as_deref().unwrap_or_default(),
            config.metadata.name.as_deref().unwrap_or_default(),
        );
        self.lock().gateway_configs.insert(k, config);
    }

    /// Seed an object without counting it as a mutation
    pub fn insert_child(&self, mut object: ChildObject) {
        let mut inner = self.lock();
        object.meta_mut().resource_version = Some(inner.bump());
        let k = (object.kind(), object.namespace(), object.name());
        inner.children.insert(k, object);
    }

    /// Address the "cloud provider" assigns when the service is created
    pub fn assign_on_create(
        &self,
        namespace: &str,
        name: &str,
        ip: Option<&str>,
        hostname: Option<&str>,
    ) {
        self.lock()
            .pending_addresses
            .insert(key(namespace, name), ingress(ip, hostname));
    }

    /// Assign a load-balancer address to an existing service
    pub fn assign_address(&self, namespace: &str, name: &str, ip: Option<&str>, hostname: Option<&str>) {
        let mut inner = self.lock();
        let k = (ChildKind::Service, namespace.to_string(), name.to_string());
        if let Some(ChildObject::Service(service)) = inner.children.get_mut(&k) {
            set_ingress(service, ingress(ip, hostname));
        }
    }

    /// Make the next `n` replace calls fail with a conflict
    pub fn force_conflicts(&self, n: usize) {
        self.lock().forced_conflicts = n;
    }

    /// Request deletion the way the API server does it
    pub fn request_game_deletion(&self, namespace: &str, name: &str) {
        let mut inner = self.lock();
        let k = key(namespace, name);
        let remove = match inner.games.get_mut(&k) {
            Some(game) if game.metadata.finalizers.as_ref().map_or(true, |f| f.is_empty()) => true,
            Some(game) => {
                game.metadata.deletion_timestamp = Some(Time(chrono::Utc::now()));
                false
            }
            None => false,
        };
        if remove {
            inner.games.remove(&k);
        }
    }

    pub fn game(&self, namespace: &str, name: &str) -> Option<Game> {
        self.lock().games.get(&key(namespace, name)).cloned()
    }

    pub fn child(&self, kind: ChildKind, namespace: &str, name: &str) -> Option<ChildObject> {
        self.lock()
            .children
            .get(&(kind, namespace.to_string(), name.to_string()))
            .cloned()
    }

    pub fn child_count(&self) -> usize {
        self.lock().children.len()
    }

    pub fn mutations(&self) -> Mutations {
        self.lock().mutations
    }

    /// Overwrite a stored child as if someone edited it out of band
    pub fn tamper_child(&self, object: ChildObject) {
        let mut inner = self.lock();
        let k = (object.kind(), object.namespace(), object.name());
        let mut object = object;
        object.meta_mut().resource_version = Some(inner.bump());
        inner.children.insert(k, object);
    }
}

#[async_trait]
impl GameStore for MemoryStore {
    async fn get_game(&self, namespace: &str, name: &str) -> Result<Option<Game>> {
        Ok(self.game(namespace, name))
    }

    async fn replace_game(&self, game: &Game) -> Result<Game> {
        let mut inner = self.lock();
        let namespace = game.metadata.namespace.clone().unwrap_or_default();
        let name = game.metadata.name.clone().unwrap_or_default();
        let k = key(&namespace, &name);

        let stored_version = match inner.games.get(&k) {
            Some(stored) => stored.metadata.resource_version.clone(),
            None => {
                return Err(Error::NotFound {
                    kind: "Game".to_string(),
                    name,
                    namespace,
                })
            }
        };
        if inner.forced_conflicts > 0 || stored_version != game.metadata.resource_version {
            inner.forced_conflicts = inner.forced_conflicts.saturating_sub(1);
            return Err(Error::conflict("Game", &namespace, &name));
        }

        let mut updated = game.clone();
        updated.status = inner.games.get(&k).and_then(|g| g.status.clone());
        updated.metadata.resource_version = Some(inner.bump());
        inner.mutations.game_replaces += 1;

        let released = updated.metadata.deletion_timestamp.is_some()
            && updated.metadata.finalizers.as_ref().map_or(true, |f| f.is_empty());
        if released {
            inner.games.remove(&k);
        } else {
            inner.games.insert(k, updated.clone());
        }
        Ok(updated)
    }

    async fn patch_game_status(
        &self,
        namespace: &str,
        name: &str,
        status: &GameStatus,
    ) -> Result<()> {
        let mut inner = self.lock();
        let version = inner.bump();
        let game = inner
            .games
            .get_mut(&key(namespace, name))
            .ok_or_else(|| Error::NotFound {
                kind: "Game".to_string(),
                name: name.to_string(),
                namespace: namespace.to_string(),
            })?;
        game.status = Some(status.clone());
        game.metadata.resource_version = Some(version);
        inner.mutations.status_patches += 1;
        Ok(())
    }

    async fn get_gateway_config(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<GatewayConfig>> {
        Ok(self.lock().gateway_configs.get(&key(namespace, name)).cloned())
    }

    async fn get_child(
        &self,
        kind: ChildKind,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ChildObject>> {
        Ok(self.child(kind, namespace, name))
    }

    async fn create_child(&self, object: &ChildObject) -> Result<()> {
        let mut inner = self.lock();
        let k = (object.kind(), object.namespace(), object.name());
        if inner.children.contains_key(&k) {
            return Err(Error::conflict(object.kind().as_str(), &k.1, &k.2));
        }
        let mut stored = object.clone();
        stored.meta_mut().resource_version = Some(inner.bump());
        if let ChildObject::Service(service) = &mut stored {
            if let Some(entry) = inner.pending_addresses.get(&key(&k.1, &k.2)) {
                set_ingress(service, entry.clone());
            }
        }
        inner.children.insert(k, stored);
        inner.mutations.creates += 1;
        Ok(())
    }

    async fn replace_child(&self, object: &ChildObject) -> Result<()> {
        let mut inner = self.lock();
        let k = (object.kind(), object.namespace(), object.name());
        let stored = inner.children.get(&k).cloned().ok_or_else(|| Error::NotFound {
            kind: object.kind().as_str().to_string(),
            name: k.2.clone(),
            namespace: k.1.clone(),
        })?;
        if inner.forced_conflicts > 0
            || stored.meta().resource_version != object.meta().resource_version
        {
            inner.forced_conflicts = inner.forced_conflicts.saturating_sub(1);
            return Err(Error::conflict(object.kind().as_str(), &k.1, &k.2));
        }

        let mut updated = object.clone();
        updated.meta_mut().resource_version = Some(inner.bump());
        if let (ChildObject::Service(new), ChildObject::Service(old)) = (&mut updated, &stored) {
            new.status = old.status.clone();
        }
        inner.children.insert(k, updated);
        inner.mutations.replaces += 1;
        Ok(())
    }

    async fn delete_child(&self, kind: ChildKind, namespace: &str, name: &str) -> Result<bool> {
        let mut inner = self.lock();
        let removed = inner
            .children
            .remove(&(kind, namespace.to_string(), name.to_string()))
            .is_some();
        if removed {
            inner.mutations.deletes += 1;
        }
        Ok(removed)
    }

    async fn list_children(
        &self,
        kind: ChildKind,
        namespace: &str,
        label_selector: &str,
    ) -> Result<Vec<ChildObject>> {
        let wanted: Vec<(&str, &str)> = label_selector
            .split(',')
            .filter_map(|pair| pair.split_once('='))
            .collect();
        let inner = self.lock();
        Ok(inner
            .children
            .iter()
            .filter(|((k, ns, _), _)| *k == kind && ns == namespace)
            .filter(|(_, obj)| {
                let labels = obj.meta().labels.clone().unwrap_or_default();
                wanted
                    .iter()
                    .all(|(k, v)| labels.get(*k).map(String::as_str) == Some(*v))
            })
            .map(|(_, obj)| obj.clone())
            .collect())
    }
}
