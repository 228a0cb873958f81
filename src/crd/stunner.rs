//! STUNner resources consumed and produced by the operator
//!
//! Only the fields the operator reads or writes are modelled. The CRDs
//! themselves are installed by STUNner, never by this operator.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Relay credentials shared by every Game session.
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "stunner.l7mp.io",
    version = "v1",
    kind = "GatewayConfig",
    namespaced,
    derive = "PartialEq"
)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfigSpec {
    #[serde(default)]
    pub user_name: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub auth_type: String,
    #[serde(default)]
    pub realm: String,
}

/// Binds a STUNner gateway to backend services for UDP media traffic.
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "stunner.l7mp.io",
    version = "v1",
    kind = "UDPRoute",
    namespaced,
    derive = "PartialEq"
)]
#[serde(rename_all = "camelCase")]
pub struct UDPRouteSpec {
    pub parent_refs: Vec<ParentRef>,
    pub rules: Vec<RouteRule>,
}

/// Gateway a route attaches to
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct ParentRef {
    pub name: String,
    pub namespace: String,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RouteRule {
    pub backend_refs: Vec<BackendRef>,
}

/// Service receiving the relayed traffic
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct BackendRef {
    pub name: String,
    pub namespace: String,
}
