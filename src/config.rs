//! Operator configuration
//!
//! Everything the reconciler needs that is not part of a Game object lives
//! here and is handed to the controller at construction time.

use std::net::SocketAddr;
use std::time::Duration;

use clap::Args;

use crate::error::{Error, Result};

/// Runtime configuration for the Game controller
#[derive(Args, Clone, Debug)]
pub struct OperatorConfig {
    /// Image running the session coordinator
    #[arg(
        long,
        env = "COORDINATOR_IMAGE",
        default_value = "ghcr.io/indiestream/cloud-game:latest"
    )]
    pub coordinator_image: String,

    /// Image running the emulation/streaming worker
    #[arg(
        long,
        env = "WORKER_IMAGE",
        default_value = "ghcr.io/indiestream/cloud-game:latest"
    )]
    pub worker_image: String,

    /// Verbosity passed to the workloads as `--v=<level>`
    #[arg(long, env = "WORKLOAD_VERBOSITY", default_value_t = 4)]
    pub workload_verbosity: u8,

    /// Namespace holding the shared UDP gateway and its routes
    #[arg(long, env = "GATEWAY_NAMESPACE", default_value = "stunner")]
    pub gateway_namespace: String,

    /// Name of the shared UDP gateway that routes bind to
    #[arg(long, env = "GATEWAY_NAME", default_value = "udp-gateway")]
    pub gateway_name: String,

    /// LoadBalancer service exposing the relay
    #[arg(long, env = "GATEWAY_SERVICE", default_value = "udp-gateway")]
    pub gateway_service: String,

    /// GatewayConfig object carrying the relay credentials
    #[arg(
        long,
        env = "GATEWAY_CONFIG_NAME",
        default_value = "stunner-gatewayconfig"
    )]
    pub gateway_config_name: String,

    /// Coordinator replicas per Game
    #[arg(long, env = "COORDINATOR_REPLICAS", default_value_t = 1)]
    pub coordinator_replicas: i32,

    /// Worker replicas per Game
    #[arg(long, env = "WORKER_REPLICAS", default_value_t = 2)]
    pub worker_replicas: i32,

    /// Seconds between load-balancer address polls
    #[arg(long, env = "ADDRESS_POLL_INTERVAL_SECS", default_value_t = 5)]
    pub address_poll_interval_secs: u64,

    /// Seconds before an address poll gives up
    #[arg(long, env = "ADDRESS_TIMEOUT_SECS", default_value_t = 20)]
    pub address_timeout_secs: u64,

    /// Seconds between periodic reconciles of a converged Game
    #[arg(long, env = "RESYNC_INTERVAL_SECS", default_value_t = 300)]
    pub resync_interval_secs: u64,

    /// Bind address for the metrics and health server
    #[arg(long, env = "METRICS_ADDR", default_value = "0.0.0.0:8080")]
    pub metrics_addr: SocketAddr,

    /// Field manager recorded on server-side writes
    #[arg(long, env = "FIELD_MANAGER", default_value = "indiestream-operator")]
    pub field_manager: String,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            coordinator_image: "ghcr.io/indiestream/cloud-game:latest".to_string(),
            worker_image: "ghcr.io/indiestream/cloud-game:latest".to_string(),
            workload_verbosity: 4,
            gateway_namespace: "stunner".to_string(),
            gateway_name: "udp-gateway".to_string(),
            gateway_service: "udp-gateway".to_string(),
            gateway_config_name: "stunner-gatewayconfig".to_string(),
            coordinator_replicas: 1,
            worker_replicas: 2,
            address_poll_interval_secs: 5,
            address_timeout_secs: 20,
            resync_interval_secs: 300,
            metrics_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            field_manager: "indiestream-operator".to_string(),
        }
    }
}

impl OperatorConfig {
    /// Reject settings the reconciler cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.coordinator_replicas < 1 || self.worker_replicas < 1 {
            return Err(Error::ConfigError(
                "replica counts must be at least 1".to_string(),
            ));
        }
        if self.address_poll_interval_secs == 0 {
            return Err(Error::ConfigError(
                "address poll interval must be greater than 0".to_string(),
            ));
        }
        if self.address_timeout_secs < self.address_poll_interval_secs {
            return Err(Error::ConfigError(
                "address timeout must not be shorter than the poll interval".to_string(),
            ));
        }
        for (field, value) in [
            ("gateway namespace", &self.gateway_namespace),
            ("gateway name", &self.gateway_name),
            ("gateway service", &self.gateway_service),
            ("gateway config name", &self.gateway_config_name),
        ] {
            if value.trim().is_empty() {
                return Err(Error::ConfigError(format!("{} must not be empty", field)));
            }
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.address_poll_interval_secs)
    }

    pub fn address_timeout(&self) -> Duration {
        Duration::from_secs(self.address_timeout_secs)
    }

    pub fn resync_interval(&self) -> Duration {
        Duration::from_secs(self.resync_interval_secs)
    }
}
