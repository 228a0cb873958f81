//! Shared types for Game status reporting

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Lifecycle phase of a Game session
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum GamePhase {
    /// Not reconciled yet
    #[default]
    Pending,
    /// All children exist and the public URL is resolved
    Ready,
    /// A load-balancer address has not been assigned yet
    WaitingForAddress,
    /// A dependency or the cluster API is unavailable; retried
    Degraded,
    /// The spec cannot be realized until it is changed
    Failed,
}

impl GamePhase {
    /// Phase reported after a reconcile aborted with `error`
    pub fn from_error(error: &Error) -> Self {
        match error {
            Error::Timeout { .. } => GamePhase::WaitingForAddress,
            Error::InvalidSpec(_) => GamePhase::Failed,
            _ => GamePhase::Degraded,
        }
    }

    /// Machine-readable reason used on the Ready condition
    pub fn reason(&self) -> &'static str {
        match self {
            GamePhase::Pending => "Pending",
            GamePhase::Ready => "SessionReady",
            GamePhase::WaitingForAddress => "AddressPending",
            GamePhase::Degraded => "DependencyUnavailable",
            GamePhase::Failed => "InvalidSpec",
        }
    }
}

impl std::fmt::Display for GamePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GamePhase::Pending => write!(f, "Pending"),
            GamePhase::Ready => write!(f, "Ready"),
            GamePhase::WaitingForAddress => write!(f, "WaitingForAddress"),
            GamePhase::Degraded => write!(f, "Degraded"),
            GamePhase::Failed => write!(f, "Failed"),
        }
    }
}

/// Condition for status reporting (Kubernetes convention)
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition (e.g., "Ready")
    #[serde(rename = "type")]
    pub type_: String,
    /// Status of the condition: "True", "False", or "Unknown"
    pub status: String,
    /// Last time the condition transitioned
    pub last_transition_time: String,
    /// Machine-readable reason for the condition
    pub reason: String,
    /// Human-readable message
    pub message: String,
}

impl Condition {
    /// Create a new Ready condition
    pub fn ready(status: bool, reason: &str, message: &str) -> Self {
        Self {
            type_: "Ready".to_string(),
            status: if status { "True" } else { "False" }.to_string(),
            last_transition_time: chrono::Utc::now().to_rfc3339(),
            reason: reason.to_string(),
            message: message.to_string(),
        }
    }

    /// Equality ignoring `last_transition_time`
    pub fn same_state(&self, other: &Condition) -> bool {
        self.type_ == other.type_
            && self.status == other.status
            && self.reason == other.reason
            && self.message == other.message
    }
}
