//! Game Custom Resource Definition
//!
//! A Game represents one cloud-gaming session. The operator stands up the
//! coordinator/worker topology for it and publishes the public URL on
//! its status.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{Condition, GamePhase};

/// The Game CRD represents a streamable game session.
///
/// # Example
///
/// ```yaml
/// apiVersion: stream.indiegamestream.com/v1
/// kind: Game
/// metadata:
///   name: g1
///   namespace: default
/// spec:
///   title: Zelda
///   fileName: zelda.rom
/// ```
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "stream.indiegamestream.com",
    version = "v1",
    kind = "Game",
    namespaced,
    status = "GameStatus",
    shortname = "game",
    derive = "PartialEq",
    printcolumn = r#"{"name":"Title","type":"string","jsonPath":".spec.title"}"#,
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"URL","type":"string","jsonPath":".status.url"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct GameSpec {
    /// Display name of the game
    pub title: String,

    /// Asset reference of the game file (ROM/executable) served by the worker
    pub file_name: String,
}

impl GameSpec {
    /// Validate the spec before any child resource is built from it
    pub fn validate(&self) -> Result<(), String> {
        if self.title.trim().is_empty() {
            return Err("spec.title must not be empty".to_string());
        }
        if self.file_name.trim().is_empty() {
            return Err("spec.fileName must not be empty".to_string());
        }
        Ok(())
    }
}

/// Status subresource for Game
///
/// `url` is only ever written by the operator.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GameStatus {
    /// Public access address of the session, empty until resolved
    #[serde(default)]
    pub url: String,

    /// Current lifecycle phase
    #[serde(default)]
    pub phase: GamePhase,

    /// Human-readable message about current state
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Generation of the spec the status was computed from
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    /// Externally assigned address of the coordinator service
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coordinator_address: Option<String>,

    /// Externally assigned address of the worker service
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worker_address: Option<String>,

    /// Readiness conditions following Kubernetes conventions
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

impl GameStatus {
    /// Check if the session is reachable
    pub fn is_ready(&self) -> bool {
        self.phase == GamePhase::Ready && !self.url.is_empty()
    }

    /// Compare two statuses ignoring condition timestamps
    pub fn same_state(&self, other: &GameStatus) -> bool {
        self.url == other.url
            && self.phase == other.phase
            && self.message == other.message
            && self.observed_generation == other.observed_generation
            && self.coordinator_address == other.coordinator_address
            && self.worker_address == other.worker_address
            && self.conditions.len() == other.conditions.len()
            && self
                .conditions
                .iter()
                .zip(other.conditions.iter())
                .all(|(a, b)| a.same_state(b))
    }
}
