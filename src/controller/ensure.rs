//! Idempotent create-or-update of a single child resource
//!
//! Dispatch goes through [`ChildSpec`]: one variant per child role, each
//! carrying the values its builder needs. Adding a child kind means adding
//! a variant, a descriptor row and a builder; the reconcile ordering does
//! not change.

use kube::ResourceExt;
use tracing::{debug, info, instrument};

use super::diff;
use super::metrics;
use super::resources::{self, ChildRole, CoordinatorParams, WorkerParams};
use super::retry::{retry_on_conflict, RetryConfig};
use super::store::{ChildKind, ChildObject, GameStore};
use crate::config::OperatorConfig;
use crate::crd::Game;
use crate::error::{Error, Result};

/// Desired state of one child, with its resolved inputs
#[derive(Clone, Debug, PartialEq)]
pub enum ChildSpec {
    UdpRoute,
    CoordinatorDeployment(CoordinatorParams),
    CoordinatorService,
    WorkerService,
    WorkerDeployment(WorkerParams),
    WorkerUdpService,
}

impl ChildSpec {
    pub fn role(&self) -> ChildRole {
        match self {
            ChildSpec::UdpRoute => ChildRole::UdpRoute,
            ChildSpec::CoordinatorDeployment(_) => ChildRole::CoordinatorDeployment,
            ChildSpec::CoordinatorService => ChildRole::CoordinatorService,
            ChildSpec::WorkerService => ChildRole::WorkerService,
            ChildSpec::WorkerDeployment(_) => ChildRole::WorkerDeployment,
            ChildSpec::WorkerUdpService => ChildRole::WorkerUdpService,
        }
    }

    /// Run the matching builder
    pub fn build(&self, game: &Game, config: &OperatorConfig) -> Result<ChildObject> {
        let name = self.role().name_for(&game.name_any());
        let object = match self {
            ChildSpec::UdpRoute => {
                ChildObject::UdpRoute(resources::build_udp_route(game, &name, config)?)
            }
            ChildSpec::CoordinatorDeployment(params) => ChildObject::Deployment(
                resources::build_coordinator_deployment(game, &name, params, config)?,
            ),
            ChildSpec::CoordinatorService => {
                ChildObject::Service(resources::build_coordinator_service(game, &name)?)
            }
            ChildSpec::WorkerService => {
                ChildObject::Service(resources::build_worker_service(game, &name)?)
            }
            ChildSpec::WorkerDeployment(params) => ChildObject::Deployment(
                resources::build_worker_deployment(game, &name, params, config)?,
            ),
            ChildSpec::WorkerUdpService => {
                ChildObject::Service(resources::build_worker_udp_service(game, &name)?)
            }
        };
        Ok(object)
    }
}

/// What `ensure` did to the cluster
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EnsureOutcome {
    Created,
    Updated,
    Unchanged,
}

impl EnsureOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnsureOutcome::Created => "created",
            EnsureOutcome::Updated => "updated",
            EnsureOutcome::Unchanged => "unchanged",
        }
    }
}

/// Converge one child of `game` onto `spec`.
///
/// Absent children are built and created. Present children are rebuilt and
/// replaced only if a field the builder sets has drifted. Conflicts re-read
/// the live object and try again; every other error is returned unchanged.
#[instrument(skip(store, game, spec, config), fields(game = %game.name_any(), role = ?spec.role()))]
pub async fn ensure(
    store: &dyn GameStore,
    game: &Game,
    spec: &ChildSpec,
    config: &OperatorConfig,
) -> Result<EnsureOutcome> {
    let role = spec.role();
    let kind = role.kind();
    let name = role.name_for(&game.name_any());
    let namespace = role.namespace_for(game, config);
    let (name, namespace) = (name.as_str(), namespace.as_str());

    let outcome = retry_on_conflict(&RetryConfig::default(), name, move || {
        ensure_once(store, game, spec, config, kind, namespace, name)
    })
    .await?;

    match outcome {
        EnsureOutcome::Unchanged => debug!(kind = %kind, name = %name, "Up to date"),
        _ => {
            info!(kind = %kind, name = %name, namespace = %namespace, outcome = outcome.as_str(), "Converged child");
            metrics::inc_child_mutation(kind, outcome.as_str());
        }
    }
    Ok(outcome)
}

async fn ensure_once(
    store: &dyn GameStore,
    game: &Game,
    spec: &ChildSpec,
    config: &OperatorConfig,
    kind: ChildKind,
    namespace: &str,
    name: &str,
) -> Result<EnsureOutcome> {
    let Some(live) = store.get_child(kind, namespace, name).await? else {
        let desired = spec.build(game, config)?;
        store.create_child(&desired).await?;
        return Ok(EnsureOutcome::Created);
    };

    // Routes share the gateway namespace; never take over another Game's
    if let Some(owner) = live.as_udp_route().and_then(resources::route_game_namespace) {
        let ours = resources::game_namespace(game);
        if owner != ours {
            return Err(Error::InvalidSpec(format!(
                "{} {}/{} already routes Game {}/{}",
                kind,
                namespace,
                name,
                owner,
                game.name_any()
            )));
        }
    }

    let desired = diff::comparable(&spec.build(game, config)?.to_value()?);
    let mut merged = live.to_value()?;
    if diff::is_subset(&desired, &merged) {
        return Ok(EnsureOutcome::Unchanged);
    }

    debug!(kind = %kind, name = %name, "Live object drifted from desired state");
    diff::merge(&mut merged, &desired);
    let mut updated = ChildObject::from_value(kind, merged)?;
    updated.meta_mut().resource_version = live.meta().resource_version.clone();
    store.replace_child(&updated).await?;
    Ok(EnsureOutcome::Updated)
}
