//! Shared builders for controller tests

use k8s_openapi::api::core::v1::{
    LoadBalancerIngress, LoadBalancerStatus, Service, ServiceStatus,
};
use kube::api::ObjectMeta;

use super::gateway::RelayCredentials;
use super::memory::MemoryStore;
use super::store::ChildObject;
use crate::crd::{Game, GameSpec, GatewayConfig, GatewayConfigSpec};

pub const RELAY_IP: &str = "10.0.0.9";

pub fn test_game(name: &str, title: &str, file_name: &str) -> Game {
    let mut game = Game::new(
        name,
        GameSpec {
            title: title.to_string(),
            file_name: file_name.to_string(),
        },
    );
    game.metadata.namespace = Some("default".to_string());
    game.metadata.uid = Some(format!("uid-{}", name));
    game.metadata.generation = Some(1);
    game
}

pub fn relay() -> RelayCredentials {
    RelayCredentials {
        username: "user-1".to_string(),
        password: "pass-1".to_string(),
        auth_type: "static".to_string(),
        realm: "stunner.l7mp.io".to_string(),
        relay_address: RELAY_IP.to_string(),
    }
}

pub fn gateway_config(auth_type: &str) -> GatewayConfig {
    let mut config = GatewayConfig::new(
        "stunner-gatewayconfig",
        GatewayConfigSpec {
            user_name: "user-1".to_string(),
            password: "pass-1".to_string(),
            auth_type: auth_type.to_string(),
            realm: "stunner.l7mp.io".to_string(),
        },
    );
    config.metadata.namespace = Some("stunner".to_string());
    config
}

pub fn gateway_service(ip: Option<&str>) -> ChildObject {
    ChildObject::Service(Service {
        metadata: ObjectMeta {
            name: Some("udp-gateway".to_string()),
            namespace: Some("stunner".to_string()),
            ..Default::default()
        },
        spec: None,
        status: ip.map(|ip| ServiceStatus {
            load_balancer: Some(LoadBalancerStatus {
                ingress: Some(vec![LoadBalancerIngress {
                    ip: Some(ip.to_string()),
                    ..Default::default()
                }]),
            }),
            ..Default::default()
        }),
    })
}

/// Store with the relay installed and ready
pub fn seeded_store() -> MemoryStore {
    let store = MemoryStore::new();
    store.insert_gateway_config(gateway_config("static"));
    store.insert_child(gateway_service(Some(RELAY_IP)));
    store
}

/// Seeded store whose load balancers for `game` get addresses on creation
pub fn provisioning_store(game: &str) -> MemoryStore {
    let store = seeded_store();
    store.assign_on_create(
        "default",
        &format!("coordinator-lb-svc-{}", game),
        Some("34.1.1.1"),
        None,
    );
    store.assign_on_create(
        "default",
        &format!("worker-lb-svc-{}", game),
        Some("34.2.2.2"),
        None,
    );
    store
}
