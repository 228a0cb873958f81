//! Bounded polling for externally assigned service addresses
//!
//! Load balancers get their address from the cloud provider some time after
//! the Service is created. Downstream builders need that address as input,
//! so the reconcile blocks here until it shows up, the window closes, or
//! the operator shuts down.

use std::time::Duration;

use k8s_openapi::api::core::v1::Service;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use super::metrics;
use super::store::{ChildKind, ChildObject, GameStore};
use crate::config::OperatorConfig;
use crate::error::{Error, Result};

/// Which form of address a caller accepts
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AddressPreference {
    /// IP only
    Ip,
    /// Hostname when the provider assigns one, otherwise IP
    HostnameThenIp,
}

/// Polling cadence and bound
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            timeout: Duration::from_secs(20),
        }
    }
}

impl PollPolicy {
    pub fn from_config(config: &OperatorConfig) -> Self {
        Self {
            interval: config.poll_interval(),
            timeout: config.address_timeout(),
        }
    }
}

/// Address currently published on a Service's load-balancer status
pub fn service_address(service: &Service, preference: AddressPreference) -> Option<String> {
    let ingress = service
        .status
        .as_ref()?
        .load_balancer
        .as_ref()?
        .ingress
        .as_ref()?;

    let non_empty = |value: &Option<String>| value.clone().filter(|v| !v.is_empty());

    let hostname = match preference {
        AddressPreference::HostnameThenIp => ingress.iter().find_map(|i| non_empty(&i.hostname)),
        AddressPreference::Ip => None,
    };
    hostname.or_else(|| ingress.iter().find_map(|i| non_empty(&i.ip)))
}

/// Poll a Service until it has an address matching `preference`.
///
/// A Service that does not exist yet is treated like one without an
/// address. Fails with [`Error::Timeout`] once `policy.timeout` elapses and
/// with [`Error::Cancelled`] as soon as `cancel` fires.
#[instrument(skip(store, namespace, name, policy, cancel), fields(namespace = %namespace, service = %name))]
pub async fn wait_for_address(
    store: &dyn GameStore,
    namespace: &str,
    name: &str,
    preference: AddressPreference,
    policy: &PollPolicy,
    cancel: &CancellationToken,
) -> Result<String> {
    let deadline = Instant::now() + policy.timeout;

    loop {
        if cancel.is_cancelled() {
            metrics::inc_address_wait_failure("cancelled");
            return Err(Error::Cancelled);
        }

        let found = store.get_child(ChildKind::Service, namespace, name).await?;
        match found.as_ref().and_then(ChildObject::as_service) {
            Some(service) => {
                if let Some(address) = service_address(service, preference) {
                    debug!(address = %address, "Address assigned");
                    return Ok(address);
                }
                debug!("No address assigned yet");
            }
            None => debug!("Service does not exist yet"),
        }

        let now = Instant::now();
        if now >= deadline {
            warn!(after = ?policy.timeout, "Gave up waiting for an address");
            metrics::inc_address_wait_failure("timeout");
            return Err(Error::Timeout {
                namespace: namespace.to_string(),
                name: name.to_string(),
                after: policy.timeout,
            });
        }

        let wait = policy.interval.min(deadline - now);
        tokio::select! {
            _ = cancel.cancelled() => {
                metrics::inc_address_wait_failure("cancelled");
                return Err(Error::Cancelled);
            }
            _ = tokio::time::sleep(wait) => {}
        }
    }
}
