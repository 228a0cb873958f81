//! Core reconciliation logic for Game resources
//!
//! A Game moves through a small state machine: absent, active without our
//! finalizer, active, deleting with our finalizer, deleting without it. Only
//! the active state builds children; only the deleting state removes any.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::StreamExt;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Service;
use kube::{
    api::{Api, ListParams},
    client::Client,
    runtime::{
        controller::{Action, Controller},
        reflector::ObjectRef,
        watcher::Config,
    },
    ResourceExt,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use super::address::{wait_for_address, AddressPreference, PollPolicy};
use super::ensure::{ensure, ChildSpec};
use super::finalizers::{has_finalizer, is_deleting, with_finalizer, without_finalizer};
use super::gateway;
use super::metrics;
use super::resources::{
    game_namespace, public_url, route_game_namespace, route_selector, ChildRole,
    CoordinatorParams, WorkerParams,
};
use super::retry::{retry_on_conflict, RetryConfig};
use super::store::GameStore;
use crate::config::OperatorConfig;
use crate::crd::{Condition, Game, GamePhase, GameStatus, UDPRoute};
use crate::error::{Error, Result};

/// Shared state for the controller
pub struct ControllerState {
    pub store: Arc<dyn GameStore>,
    pub config: OperatorConfig,
    /// Cancelled on shutdown; aborts address waits
    pub shutdown: CancellationToken,
}

/// How a reconcile pass ended
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The Game no longer exists
    Absent,
    /// The finalizer was recorded; children come on the next pass
    FinalizerAdded,
    /// Every child is in place and the URL is published
    Converged { url: String },
    /// The route was removed and the finalizer released
    CleanedUp,
    /// Deleting, but nothing of ours holds the object
    Released,
}

impl ReconcileOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReconcileOutcome::Absent => "absent",
            ReconcileOutcome::FinalizerAdded => "finalizer_added",
            ReconcileOutcome::Converged { .. } => "converged",
            ReconcileOutcome::CleanedUp => "cleaned_up",
            ReconcileOutcome::Released => "released",
        }
    }

    fn action(&self, config: &OperatorConfig) -> Action {
        match self {
            ReconcileOutcome::Converged { .. } => Action::requeue(config.resync_interval()),
            _ => Action::await_change(),
        }
    }
}

/// Main entry point to start the controller
pub async fn run_controller(client: Client, state: Arc<ControllerState>) -> Result<()> {
    let games: Api<Game> = Api::all(client.clone());

    info!("Starting Game controller");

    // Verify CRD exists
    match games.list(&ListParams::default().limit(1)).await {
        Ok(_) => info!("Game CRD is available"),
        Err(e) => {
            error!("Game CRD not found. Please install the CRD first: {:?}", e);
            return Err(Error::ConfigError("Game CRD not installed".to_string()));
        }
    }

    let routes: Api<UDPRoute> = Api::namespaced(client.clone(), &state.config.gateway_namespace);

    Controller::new(games, Config::default())
        .owns::<Deployment>(Api::all(client.clone()), Config::default())
        .owns::<Service>(Api::all(client.clone()), Config::default())
        .watches(routes, Config::default(), game_ref_for_route)
        .shutdown_on_signal()
        .run(reconcile, error_policy, state)
        .for_each(|res| async move {
            match res {
                Ok((obj, _)) => debug!("Reconciled: {}", obj),
                Err(e) => warn!("Reconcile error: {:?}", e),
            }
        })
        .await;

    info!("Game controller stopped");
    Ok(())
}

/// Map a UDP route back to the Game it was created for.
///
/// Routes carry no owner reference, so the Game is recovered from the route
/// name and the namespace recorded on it.
pub fn game_ref_for_route(route: UDPRoute) -> Option<ObjectRef<Game>> {
    let game = ChildRole::UdpRoute.owner_name(&route.name_any())?.to_string();
    let namespace = route_game_namespace(&route)?;
    Some(ObjectRef::new(&game).within(&namespace))
}

/// Controller callback: reconcile one Game and record the result
#[instrument(skip(game, ctx), fields(name = %game.name_any(), namespace = game.namespace()))]
async fn reconcile(game: Arc<Game>, ctx: Arc<ControllerState>) -> Result<Action> {
    let namespace = game_namespace(&game);
    let name = game.name_any();
    let started = Instant::now();

    let result = reconcile_game(
        ctx.store.as_ref(),
        &ctx.config,
        &ctx.shutdown,
        &namespace,
        &name,
    )
    .await;

    let elapsed = started.elapsed().as_secs_f64();
    match result {
        Ok(outcome) => {
            metrics::observe_reconcile(outcome.as_str(), elapsed);
            Ok(outcome.action(&ctx.config))
        }
        Err(Error::Cancelled) => {
            info!("Reconcile of {}/{} interrupted by shutdown", namespace, name);
            metrics::observe_reconcile("cancelled", elapsed);
            Ok(Action::await_change())
        }
        Err(e) => {
            metrics::observe_reconcile("error", elapsed);
            Err(e)
        }
    }
}

/// Drive one Game through its lifecycle.
///
/// Always starts from a fresh read of the object, so it is safe to call
/// again at any point, including after a partial failure.
#[instrument(skip(store, config, cancel))]
pub async fn reconcile_game(
    store: &dyn GameStore,
    config: &OperatorConfig,
    cancel: &CancellationToken,
    namespace: &str,
    name: &str,
) -> Result<ReconcileOutcome> {
    let Some(game) = store.get_game(namespace, name).await? else {
        debug!("Game {}/{} not found, nothing to do", namespace, name);
        return Ok(ReconcileOutcome::Absent);
    };

    if is_deleting(&game) {
        if !has_finalizer(&game) {
            return Ok(ReconcileOutcome::Released);
        }
        cleanup_game(store, config, &game).await?;
        update_finalizers(store, namespace, name, without_finalizer).await?;
        info!("Released Game {}/{}", namespace, name);
        return Ok(ReconcileOutcome::CleanedUp);
    }

    if !has_finalizer(&game) {
        update_finalizers(store, namespace, name, with_finalizer).await?;
        info!("Added finalizer to Game {}/{}", namespace, name);
        return Ok(ReconcileOutcome::FinalizerAdded);
    }

    match apply_game(store, config, cancel, &game).await {
        Ok(status) => {
            let url = status.url.clone();
            write_status(store, &game, &status).await?;
            info!(url = %url, "Game {}/{} is ready", namespace, name);
            Ok(ReconcileOutcome::Converged { url })
        }
        Err(Error::Cancelled) => Err(Error::Cancelled),
        Err(e) => {
            warn!("Reconcile of Game {}/{} failed: {}", namespace, name, e);
            let status = failure_status(&game, &e);
            if let Err(status_err) = write_status(store, &game, &status).await {
                warn!("Failed to record failure on Game {}/{}: {}", namespace, name, status_err);
            }
            Err(e)
        }
    }
}

/// Create or update every child in dependency order and resolve the URL
#[instrument(skip(store, config, cancel, game), fields(name = %game.name_any()))]
async fn apply_game(
    store: &dyn GameStore,
    config: &OperatorConfig,
    cancel: &CancellationToken,
    game: &Game,
) -> Result<GameStatus> {
    let name = game.name_any();
    let namespace = game_namespace(game);
    let policy = PollPolicy::from_config(config);

    game.spec.validate().map_err(Error::InvalidSpec)?;

    // 1. Route from the shared gateway to the worker's media service
    ensure(store, game, &ChildSpec::UdpRoute, config).await?;

    // 2. Relay credentials and address
    let relay = gateway::lookup_relay(store, config, &policy, cancel).await?;

    // 3. Coordinator and the two load balancers
    let coordinator = CoordinatorParams {
        relay: relay.clone(),
    };
    ensure(store, game, &ChildSpec::CoordinatorDeployment(coordinator), config).await?;
    ensure(store, game, &ChildSpec::CoordinatorService, config).await?;
    ensure(store, game, &ChildSpec::WorkerService, config).await?;

    // 4. Addresses the worker needs
    let coordinator_service = ChildRole::CoordinatorService.name_for(&name);
    let worker_service = ChildRole::WorkerService.name_for(&name);
    let coordinator_address = wait_for_address(
        store,
        &namespace,
        &coordinator_service,
        AddressPreference::Ip,
        &policy,
        cancel,
    )
    .await?;
    let worker_address = wait_for_address(
        store,
        &namespace,
        &worker_service,
        AddressPreference::Ip,
        &policy,
        cancel,
    )
    .await?;

    // 5. Worker and its media endpoint
    let worker = WorkerParams {
        relay,
        coordinator_address: coordinator_address.clone(),
        worker_address: worker_address.clone(),
    };
    ensure(store, game, &ChildSpec::WorkerDeployment(worker), config).await?;
    ensure(store, game, &ChildSpec::WorkerUdpService, config).await?;

    // 6. Public address, hostname preferred
    let public_address = wait_for_address(
        store,
        &namespace,
        &coordinator_service,
        AddressPreference::HostnameThenIp,
        &policy,
        cancel,
    )
    .await?;

    let message = format!("Session reachable at {}", public_url(&public_address));
    Ok(GameStatus {
        url: public_url(&public_address),
        phase: GamePhase::Ready,
        message: Some(message.clone()),
        observed_generation: game.metadata.generation,
        coordinator_address: Some(coordinator_address),
        worker_address: Some(worker_address),
        conditions: vec![Condition::ready(true, GamePhase::Ready.reason(), &message)],
    })
}

/// Remove what the garbage collector cannot: the cross-namespace route
#[instrument(skip(store, config, game), fields(name = %game.name_any()))]
async fn cleanup_game(store: &dyn GameStore, config: &OperatorConfig, game: &Game) -> Result<()> {
    let role = ChildRole::UdpRoute;
    let name = role.name_for(&game.name_any());
    let namespace = role.namespace_for(game, config);
    let ours = game_namespace(game);

    match store.get_child(role.kind(), &namespace, &name).await? {
        None => debug!("{} {}/{} already gone", role.kind(), namespace, name),
        Some(live)
            if live
                .as_udp_route()
                .and_then(route_game_namespace)
                .is_some_and(|owner| owner != ours) =>
        {
            warn!(
                "{} {}/{} routes a Game in another namespace, leaving it",
                role.kind(),
                namespace,
                name
            );
        }
        Some(_) => {
            if store.delete_child(role.kind(), &namespace, &name).await? {
                info!("Deleted {} {}/{}", role.kind(), namespace, name);
            }
        }
    }

    // Routes labelled for this Game under any other name
    let selector = route_selector(game);
    for stray in store.list_children(role.kind(), &namespace, &selector).await? {
        let stray_name = stray.name();
        if store.delete_child(role.kind(), &namespace, &stray_name).await? {
            info!("Deleted stray {} {}/{}", role.kind(), namespace, stray_name);
        }
    }
    Ok(())
}

/// Re-read the Game and apply a finalizer edit, retrying on conflict
async fn update_finalizers(
    store: &dyn GameStore,
    namespace: &str,
    name: &str,
    edit: fn(&Game) -> Option<Game>,
) -> Result<()> {
    retry_on_conflict(&RetryConfig::default(), "game finalizer", move || async move {
        let Some(game) = store.get_game(namespace, name).await? else {
            return Ok(());
        };
        match edit(&game) {
            Some(updated) => match store.replace_game(&updated).await {
                Err(Error::NotFound { .. }) => Ok(()),
                other => other.map(|_| ()),
            },
            None => Ok(()),
        }
    })
    .await
}

/// Status after a failed pass. Addresses resolved earlier are kept.
fn failure_status(game: &Game, error: &Error) -> GameStatus {
    let phase = GamePhase::from_error(error);
    let message = error.status_message();
    GameStatus {
        phase,
        message: Some(message.clone()),
        conditions: vec![Condition::ready(false, phase.reason(), &message)],
        ..game.status.clone().unwrap_or_default()
    }
}

/// Patch the status subresource unless nothing changed
async fn write_status(store: &dyn GameStore, game: &Game, status: &GameStatus) -> Result<()> {
    if game
        .status
        .as_ref()
        .is_some_and(|current| current.same_state(status))
    {
        debug!("Status of {} unchanged", game.name_any());
        return Ok(());
    }
    store
        .patch_game_status(&game_namespace(game), &game.name_any(), status)
        .await
}

/// Error policy determines how to handle reconciliation errors
fn error_policy(game: Arc<Game>, error: &Error, _ctx: Arc<ControllerState>) -> Action {
    error!("Reconciliation error for {}: {:?}", game.name_any(), error);

    // Use shorter retry for retriable errors
    let retry_duration = if error.is_retriable() {
        Duration::from_secs(15)
    } else {
        Duration::from_secs(60)
    };

    Action::requeue(retry_duration)
}
