//! Relay (TURN) configuration lookup
//!
//! The coordinator and worker both need the relay's credentials and its
//! externally reachable address. Both come from objects the operator never
//! writes: the gateway's GatewayConfig and its LoadBalancer Service.

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use super::address::{wait_for_address, AddressPreference, PollPolicy};
use super::resources::RELAY_PORT;
use super::store::{ChildKind, GameStore};
use crate::config::OperatorConfig;
use crate::crd::GatewayConfigSpec;
use crate::error::{Error, Result};

/// Auth modes whose credentials are usable as-is
const STATIC_AUTH_TYPES: [&str; 2] = ["static", "plaintext"];

/// Relay credentials plus the address clients reach it on
#[derive(Clone, Debug, PartialEq)]
pub struct RelayCredentials {
    pub username: String,
    pub password: String,
    pub auth_type: String,
    pub realm: String,
    pub relay_address: String,
}

impl RelayCredentials {
    fn from_spec(spec: &GatewayConfigSpec, relay_address: String) -> Self {
        Self {
            username: spec.user_name.clone(),
            password: spec.password.clone(),
            auth_type: spec.auth_type.clone(),
            realm: spec.realm.clone(),
            relay_address,
        }
    }

    /// ICE server URL handed to the workloads
    pub fn url(&self) -> String {
        relay_url(&self.relay_address)
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.relay_address.is_empty() {
            return Err(Error::DependencyMissing(
                "relay address has not been resolved".to_string(),
            ));
        }
        Ok(())
    }
}

pub fn relay_url(address: &str) -> String {
    format!("turn:{}:{}", address, RELAY_PORT)
}

/// Fetch the gateway's credentials. Absence is a dependency failure, never
/// a crash.
#[instrument(skip(store, config))]
pub async fn get_gateway_config(
    store: &dyn GameStore,
    config: &OperatorConfig,
) -> Result<GatewayConfigSpec> {
    let found = store
        .get_gateway_config(&config.gateway_namespace, &config.gateway_config_name)
        .await?
        .ok_or_else(|| {
            Error::DependencyMissing(format!(
                "GatewayConfig {}/{} not found",
                config.gateway_namespace, config.gateway_config_name
            ))
        })?;

    let spec = found.spec;
    let auth_type = spec.auth_type.to_ascii_lowercase();
    if !auth_type.is_empty() && !STATIC_AUTH_TYPES.contains(&auth_type.as_str()) {
        return Err(Error::DependencyMissing(format!(
            "GatewayConfig {}/{} uses unsupported auth type {}",
            config.gateway_namespace, config.gateway_config_name, spec.auth_type
        )));
    }
    if spec.user_name.is_empty() || spec.password.is_empty() {
        return Err(Error::DependencyMissing(format!(
            "GatewayConfig {}/{} has no static credentials",
            config.gateway_namespace, config.gateway_config_name
        )));
    }
    Ok(spec)
}

/// Credentials plus the relay's resolved public IP
#[instrument(skip(store, config, policy, cancel))]
pub async fn lookup_relay(
    store: &dyn GameStore,
    config: &OperatorConfig,
    policy: &PollPolicy,
    cancel: &CancellationToken,
) -> Result<RelayCredentials> {
    let spec = get_gateway_config(store, config).await?;

    let namespace = &config.gateway_namespace;
    let service = &config.gateway_service;
    if store
        .get_child(ChildKind::Service, namespace, service)
        .await?
        .is_none()
    {
        return Err(Error::DependencyMissing(format!(
            "gateway service {}/{} not found",
            namespace, service
        )));
    }

    debug!("Resolving relay address");
    let relay_address =
        wait_for_address(store, namespace, service, AddressPreference::Ip, policy, cancel).await?;
    info!(relay = %relay_address, "Relay resolved");

    Ok(RelayCredentials::from_spec(&spec, relay_address))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::fixtures::{gateway_config, gateway_service, relay, seeded_store};
    use crate::controller::memory::MemoryStore;

    #[tokio::test(start_paused = true)]
    async fn resolves_credentials_and_address() {
        let store = seeded_store();
        let relay = lookup_relay(
            &store,
            &OperatorConfig::default(),
            &PollPolicy::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(relay.username, "user-1");
        assert_eq!(relay.password, "pass-1");
        assert_eq!(relay.url(), "turn:10.0.0.9:3478");
    }

    #[tokio::test]
    async fn missing_config_is_dependency_error() {
        let store = MemoryStore::new();
        let err = get_gateway_config(&store, &OperatorConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DependencyMissing(_)));
        assert!(err.is_retriable());
    }

    #[tokio::test]
    async fn missing_gateway_service_is_dependency_error() {
        let store = MemoryStore::new();
        store.insert_gateway_config(gateway_config("static"));
        let err = lookup_relay(
            &store,
            &OperatorConfig::default(),
            &PollPolicy::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::DependencyMissing(ref msg) if msg.contains("udp-gateway")));
    }

    #[tokio::test]
    async fn rejects_ephemeral_auth() {
        let store = MemoryStore::new();
        store.insert_gateway_config(gateway_config("ephemeral"));
        store.insert_child(gateway_service(Some("10.0.0.9")));
        let err = get_gateway_config(&store, &OperatorConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DependencyMissing(ref msg) if msg.contains("ephemeral")));
    }

    #[test]
    fn unresolved_relay_is_dependency_error() {
        let mut relay = relay();
        relay.relay_address.clear();
        let err = relay.validate().unwrap_err();
        assert!(matches!(err, Error::DependencyMissing(_)));
        assert!(err.is_retriable());
    }
}
