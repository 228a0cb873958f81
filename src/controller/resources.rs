//! Kubernetes resource builders for Game
//!
//! Every function here is pure: it turns a Game plus resolved parameters
//! into the desired object and never talks to the cluster. Builders fail
//! closed with [`Error::InvalidSpec`] instead of emitting partial objects.

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, EnvVar, PodSpec, PodTemplateSpec, Service, ServicePort,
    ServiceSpec,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta, OwnerReference};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::{Resource, ResourceExt};

use super::gateway::RelayCredentials;
use super::store::ChildKind;
use crate::config::OperatorConfig;
use crate::crd::{BackendRef, Game, ParentRef, RouteRule, UDPRoute, UDPRouteSpec};
use crate::error::{Error, Result};

/// Coordinator control-plane port
pub const COORDINATOR_PORT: i32 = 8000;
/// Port the coordinator LoadBalancer listens on
pub const COORDINATOR_SERVICE_PORT: i32 = 80;
/// Worker control port
pub const WORKER_PORT: i32 = 9000;
/// Worker media (UDP) port
pub const WORKER_MEDIA_PORT: i32 = 8443;
/// TURN relay port
pub const RELAY_PORT: i32 = 3478;

/// Label carrying the per-Game selector value
pub const SELECTOR_LABEL: &str = "app";
/// Namespace of the owning Game, recorded on cross-namespace children
pub const GAME_NAMESPACE_LABEL: &str = "stream.indiegamestream.com/game-namespace";

const MAX_SERVICE_NAME_LEN: usize = 63;

/// One child object of a Game's fixed topology
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChildRole {
    UdpRoute,
    CoordinatorDeployment,
    CoordinatorService,
    WorkerService,
    WorkerDeployment,
    WorkerUdpService,
}

/// Where a child lives
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Placement {
    /// Same namespace as the Game
    OwnerNamespace,
    /// The shared gateway namespace
    GatewayNamespace,
}

/// How a child is garbage collected
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Ownership {
    /// Carries a controller owner reference; cascade-deleted with the Game
    Owned,
    /// Cross-namespace; deleted by name from the finalizer
    Unmanaged,
}

/// Static facts about a child role
#[derive(Debug)]
pub struct ChildDescriptor {
    pub role: ChildRole,
    pub kind: ChildKind,
    pub prefix: &'static str,
    pub placement: Placement,
    pub ownership: Ownership,
}

/// Indexed by `ChildRole as usize`
static CHILDREN: [ChildDescriptor; 6] = [
    ChildDescriptor {
        role: ChildRole::UdpRoute,
        kind: ChildKind::UdpRoute,
        prefix: "udproute",
        placement: Placement::GatewayNamespace,
        ownership: Ownership::Unmanaged,
    },
    ChildDescriptor {
        role: ChildRole::CoordinatorDeployment,
        kind: ChildKind::Deployment,
        prefix: "coordinator-deployment",
        placement: Placement::OwnerNamespace,
        ownership: Ownership::Owned,
    },
    ChildDescriptor {
        role: ChildRole::CoordinatorService,
        kind: ChildKind::Service,
        prefix: "coordinator-lb-svc",
        placement: Placement::OwnerNamespace,
        ownership: Ownership::Owned,
    },
    ChildDescriptor {
        role: ChildRole::WorkerService,
        kind: ChildKind::Service,
        prefix: "worker-lb-svc",
        placement: Placement::OwnerNamespace,
        ownership: Ownership::Owned,
    },
    ChildDescriptor {
        role: ChildRole::WorkerDeployment,
        kind: ChildKind::Deployment,
        prefix: "worker-deployment",
        placement: Placement::OwnerNamespace,
        ownership: Ownership::Owned,
    },
    ChildDescriptor {
        role: ChildRole::WorkerUdpService,
        kind: ChildKind::Service,
        prefix: "worker-udp-svc",
        placement: Placement::OwnerNamespace,
        ownership: Ownership::Owned,
    },
];

impl ChildRole {
    pub const ALL: [ChildRole; 6] = [
        ChildRole::UdpRoute,
        ChildRole::CoordinatorDeployment,
        ChildRole::CoordinatorService,
        ChildRole::WorkerService,
        ChildRole::WorkerDeployment,
        ChildRole::WorkerUdpService,
    ];

    pub fn descriptor(self) -> &'static ChildDescriptor {
        &CHILDREN[self as usize]
    }

    pub fn kind(self) -> ChildKind {
        self.descriptor().kind
    }

    /// Deterministic child name for a Game name
    pub fn name_for(self, game_name: &str) -> String {
        format!("{}-{}", self.descriptor().prefix, game_name)
    }

    pub fn namespace_for(self, game: &Game, config: &OperatorConfig) -> String {
        match self.descriptor().placement {
            Placement::OwnerNamespace => game_namespace(game),
            Placement::GatewayNamespace => config.gateway_namespace.clone(),
        }
    }

    /// Recover the Game name from a child name
    pub fn owner_name(self, child_name: &str) -> Option<&str> {
        child_name
            .strip_prefix(self.descriptor().prefix)
            .and_then(|rest| rest.strip_prefix('-'))
            .filter(|name| !name.is_empty())
    }
}

/// Workload component a child belongs to
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Component {
    Coordinator,
    Worker,
    Relay,
}

impl Component {
    fn as_str(self) -> &'static str {
        match self {
            Component::Coordinator => "coordinator",
            Component::Worker => "worker",
            Component::Relay => "relay",
        }
    }
}

/// Parameters for the coordinator deployment
#[derive(Clone, Debug, PartialEq)]
pub struct CoordinatorParams {
    pub relay: RelayCredentials,
}

/// Parameters for the worker deployment
#[derive(Clone, Debug, PartialEq)]
pub struct WorkerParams {
    pub relay: RelayCredentials,
    pub coordinator_address: String,
    pub worker_address: String,
}

pub(crate) fn game_namespace(game: &Game) -> String {
    game.namespace().unwrap_or_else(|| "default".to_string())
}

/// Public URL of a session from the resolved coordinator address
///
/// The coordinator Service listens on port 80, so the port is left implicit.
pub fn public_url(address: &str) -> String {
    format!("http://{}", address)
}

/// Selector value `{role}-{game}` so Games never share label space
pub fn selector_labels(game: &Game, component: &str) -> BTreeMap<String, String> {
    BTreeMap::from([(
        SELECTOR_LABEL.to_string(),
        format!("{}-{}", component, game.name_any()),
    )])
}

/// Namespace of the Game a route was created for.
///
/// Read from the game-namespace label, falling back to the backend
/// namespace for routes written before the label existed.
pub fn route_game_namespace(route: &UDPRoute) -> Option<String> {
    route
        .labels()
        .get(GAME_NAMESPACE_LABEL)
        .cloned()
        .or_else(|| {
            route
                .spec
                .rules
                .iter()
                .flat_map(|rule| rule.backend_refs.iter())
                .map(|backend| backend.namespace.clone())
                .next()
        })
}

/// Label selector matching every route created for `game`
pub fn route_selector(game: &Game) -> String {
    format!(
        "app.kubernetes.io/instance={},{}={}",
        game.name_any(),
        GAME_NAMESPACE_LABEL,
        game_namespace(game)
    )
}

/// Get the standard labels for a Game's resources
fn standard_labels(game: &Game, component: Component) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert(
        "app.kubernetes.io/name".to_string(),
        "indiestream-game".to_string(),
    );
    labels.insert("app.kubernetes.io/instance".to_string(), game.name_any());
    labels.insert(
        "app.kubernetes.io/component".to_string(),
        component.as_str().to_string(),
    );
    labels.insert(
        "app.kubernetes.io/managed-by".to_string(),
        "indiestream-operator".to_string(),
    );
    labels
}

/// Create an OwnerReference for garbage collection
fn owner_reference(game: &Game) -> Result<OwnerReference> {
    let uid = game.metadata.uid.clone().ok_or_else(|| {
        Error::InvalidSpec(format!(
            "Game {} has no uid and cannot own child resources",
            game.name_any()
        ))
    })?;
    Ok(OwnerReference {
        api_version: Game::api_version(&()).to_string(),
        kind: Game::kind(&()).to_string(),
        name: game.name_any(),
        uid,
        controller: Some(true),
        block_owner_deletion: Some(true),
    })
}

fn validate(game: &Game) -> Result<()> {
    if game.metadata.name.as_deref().unwrap_or_default().is_empty() {
        return Err(Error::InvalidSpec("Game has no name".to_string()));
    }
    game.spec.validate().map_err(Error::InvalidSpec)
}

fn owned_meta(game: &Game, name: &str, component: Component) -> Result<ObjectMeta> {
    Ok(ObjectMeta {
        name: Some(name.to_string()),
        namespace: Some(game_namespace(game)),
        labels: Some(standard_labels(game, component)),
        owner_references: Some(vec![owner_reference(game)?]),
        ..Default::default()
    })
}

fn env(name: &str, value: impl Into<String>) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: Some(value.into()),
        ..Default::default()
    }
}

fn ice_server_env(relay: &RelayCredentials) -> Vec<EnvVar> {
    vec![
        env("CLOUD_GAME_WEBRTC_ICESERVERS_0_URLS", relay.url()),
        env("CLOUD_GAME_WEBRTC_ICESERVERS_0_USERNAME", relay.username.clone()),
        env("CLOUD_GAME_WEBRTC_ICESERVERS_0_CREDENTIAL", relay.password.clone()),
    ]
}

fn pod_template(labels: BTreeMap<String, String>, container: Container) -> PodTemplateSpec {
    PodTemplateSpec {
        metadata: Some(ObjectMeta {
            labels: Some(labels),
            ..Default::default()
        }),
        spec: Some(PodSpec {
            containers: vec![container],
            ..Default::default()
        }),
    }
}

fn deployment(
    game: &Game,
    name: &str,
    component: Component,
    replicas: i32,
    container: Container,
) -> Result<Deployment> {
    let selector = selector_labels(game, component.as_str());
    let mut pod_labels = standard_labels(game, component);
    pod_labels.extend(selector.clone());

    Ok(Deployment {
        metadata: owned_meta(game, name, component)?,
        spec: Some(DeploymentSpec {
            replicas: Some(replicas),
            selector: LabelSelector {
                match_labels: Some(selector),
                ..Default::default()
            },
            template: pod_template(pod_labels, container),
            ..Default::default()
        }),
        status: None,
    })
}

// ============================================================================
// Coordinator
// ============================================================================

pub fn build_coordinator_deployment(
    game: &Game,
    name: &str,
    params: &CoordinatorParams,
    config: &OperatorConfig,
) -> Result<Deployment> {
    validate(game)?;
    params.relay.validate()?;

    let mut env_vars = vec![
        env(
            "CLOUD_GAME_COORDINATOR_SERVER_ADDRESS",
            format!(":{}", COORDINATOR_PORT),
        ),
        env("GAME_TITLE", game.spec.title.clone()),
    ];
    env_vars.extend(ice_server_env(&params.relay));

    let container = Container {
        name: Component::Coordinator.as_str().to_string(),
        image: Some(config.coordinator_image.clone()),
        command: Some(vec!["coordinator".to_string()]),
        args: Some(vec![format!("--v={}", config.workload_verbosity)]),
        ports: Some(vec![ContainerPort {
            name: Some("http".to_string()),
            container_port: COORDINATOR_PORT,
            protocol: Some("TCP".to_string()),
            ..Default::default()
        }]),
        env: Some(env_vars),
        ..Default::default()
    };

    deployment(
        game,
        name,
        Component::Coordinator,
        config.coordinator_replicas,
        container,
    )
}

pub fn build_coordinator_service(game: &Game, name: &str) -> Result<Service> {
    validate(game)?;
    service(
        game,
        name,
        Component::Coordinator,
        ServicePort {
            name: Some("http".to_string()),
            port: COORDINATOR_SERVICE_PORT,
            target_port: Some(IntOrString::Int(COORDINATOR_PORT)),
            protocol: Some("TCP".to_string()),
            ..Default::default()
        },
        "LoadBalancer",
    )
}

// ============================================================================
// Worker
// ============================================================================

pub fn build_worker_deployment(
    game: &Game,
    name: &str,
    params: &WorkerParams,
    config: &OperatorConfig,
) -> Result<Deployment> {
    validate(game)?;
    params.relay.validate()?;
    if params.coordinator_address.trim().is_empty() {
        return Err(Error::InvalidSpec(
            "worker deployment requires a resolved coordinator address".to_string(),
        ));
    }
    if params.worker_address.trim().is_empty() {
        return Err(Error::InvalidSpec(
            "worker deployment requires a resolved public address".to_string(),
        ));
    }

    let mut env_vars = vec![
        env("CLOUD_GAME_WORKER_SERVER_ADDRESS", format!(":{}", WORKER_PORT)),
        env(
            "CLOUD_GAME_WORKER_NETWORK_COORDINATORADDRESS",
            format!("{}:{}", params.coordinator_address, COORDINATOR_SERVICE_PORT),
        ),
        env(
            "CLOUD_GAME_WORKER_NETWORK_PUBLICADDRESS",
            params.worker_address.clone(),
        ),
        env("CLOUD_GAME_WEBRTC_SINGLEPORT", WORKER_MEDIA_PORT.to_string()),
        env("GAME_TITLE", game.spec.title.clone()),
        env("GAME_FILE_NAME", game.spec.file_name.clone()),
    ];
    env_vars.extend(ice_server_env(&params.relay));

    let container = Container {
        name: Component::Worker.as_str().to_string(),
        image: Some(config.worker_image.clone()),
        command: Some(vec!["worker".to_string()]),
        args: Some(vec![format!("--v={}", config.workload_verbosity)]),
        ports: Some(vec![
            ContainerPort {
                name: Some("control".to_string()),
                container_port: WORKER_PORT,
                protocol: Some("TCP".to_string()),
                ..Default::default()
            },
            ContainerPort {
                name: Some("media".to_string()),
                container_port: WORKER_MEDIA_PORT,
                protocol: Some("UDP".to_string()),
                ..Default::default()
            },
        ]),
        env: Some(env_vars),
        ..Default::default()
    };

    deployment(
        game,
        name,
        Component::Worker,
        config.worker_replicas,
        container,
    )
}

pub fn build_worker_service(game: &Game, name: &str) -> Result<Service> {
    validate(game)?;
    service(
        game,
        name,
        Component::Worker,
        ServicePort {
            name: Some("control".to_string()),
            port: WORKER_PORT,
            target_port: Some(IntOrString::Int(WORKER_PORT)),
            protocol: Some("TCP".to_string()),
            ..Default::default()
        },
        "LoadBalancer",
    )
}

/// Media endpoint behind the relay; reached through the UDP route only
pub fn build_worker_udp_service(game: &Game, name: &str) -> Result<Service> {
    validate(game)?;
    service(
        game,
        name,
        Component::Worker,
        ServicePort {
            name: Some("media".to_string()),
            port: WORKER_MEDIA_PORT,
            target_port: Some(IntOrString::Int(WORKER_MEDIA_PORT)),
            protocol: Some("UDP".to_string()),
            ..Default::default()
        },
        "ClusterIP",
    )
}

fn service(
    game: &Game,
    name: &str,
    component: Component,
    port: ServicePort,
    type_: &str,
) -> Result<Service> {
    if name.len() > MAX_SERVICE_NAME_LEN {
        return Err(Error::InvalidSpec(format!(
            "service name {} exceeds {} characters; shorten the Game name",
            name, MAX_SERVICE_NAME_LEN
        )));
    }

    Ok(Service {
        metadata: owned_meta(game, name, component)?,
        spec: Some(ServiceSpec {
            type_: Some(type_.to_string()),
            selector: Some(selector_labels(game, component.as_str())),
            ports: Some(vec![port]),
            ..Default::default()
        }),
        status: None,
    })
}

// ============================================================================
// UDPRoute
// ============================================================================

/// Route binding the shared gateway to the worker's media service.
///
/// Lives in the gateway namespace, so it carries no owner reference and is
/// removed by the finalizer instead of the garbage collector.
pub fn build_udp_route(game: &Game, name: &str, config: &OperatorConfig) -> Result<UDPRoute> {
    validate(game)?;

    let mut route = UDPRoute::new(
        name,
        UDPRouteSpec {
            parent_refs: vec![ParentRef {
                name: config.gateway_name.clone(),
                namespace: config.gateway_namespace.clone(),
            }],
            rules: vec![RouteRule {
                backend_refs: vec![BackendRef {
                    name: ChildRole::WorkerUdpService.name_for(&game.name_any()),
                    namespace: game_namespace(game),
                }],
            }],
        },
    );
    route.metadata.namespace = Some(config.gateway_namespace.clone());
    let mut labels = standard_labels(game, Component::Relay);
    labels.insert(GAME_NAMESPACE_LABEL.to_string(), game_namespace(game));
    route.metadata.labels = Some(labels);
    Ok(route)
}
