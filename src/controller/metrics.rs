//! Prometheus metrics for the IndieStream operator

use once_cell::sync::Lazy;
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::histogram::{exponential_buckets, Histogram};
use prometheus_client::registry::Registry;

use super::store::ChildKind;

/// Labels for reconcile outcomes
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct OutcomeLabels {
    pub outcome: String,
}

/// Labels for child resource writes
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct MutationLabels {
    pub kind: String,
    pub action: String,
}

/// Labels for failed address waits
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ReasonLabels {
    pub reason: String,
}

/// Reconciles by outcome
pub static RECONCILE_TOTAL: Lazy<Family<OutcomeLabels, Counter>> = Lazy::new(Family::default);

/// Wall time of a reconcile, address waits included
pub static RECONCILE_DURATION: Lazy<Histogram> =
    Lazy::new(|| Histogram::new(exponential_buckets(0.01, 2.0, 14)));

/// Child resource creates/updates by kind
pub static CHILD_MUTATIONS: Lazy<Family<MutationLabels, Counter>> = Lazy::new(Family::default);

/// Address waits that ended without an address
pub static ADDRESS_WAIT_FAILURES: Lazy<Family<ReasonLabels, Counter>> =
    Lazy::new(Family::default);

/// Global metrics registry
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let mut registry = Registry::default();
    registry.register(
        "indiestream_reconciliations",
        "Game reconciliations by outcome",
        RECONCILE_TOTAL.clone(),
    );
    registry.register(
        "indiestream_reconcile_duration_seconds",
        "Duration of Game reconciliations",
        RECONCILE_DURATION.clone(),
    );
    registry.register(
        "indiestream_child_mutations",
        "Child resource writes by kind and action",
        CHILD_MUTATIONS.clone(),
    );
    registry.register(
        "indiestream_address_wait_failures",
        "Load-balancer address waits that timed out or were cancelled",
        ADDRESS_WAIT_FAILURES.clone(),
    );
    registry
});

/// Record a finished reconcile
pub fn observe_reconcile(outcome: &str, seconds: f64) {
    RECONCILE_TOTAL
        .get_or_create(&OutcomeLabels {
            outcome: outcome.to_string(),
        })
        .inc();
    RECONCILE_DURATION.observe(seconds);
}

/// Record a create or update of a child resource
pub fn inc_child_mutation(kind: ChildKind, action: &str) {
    CHILD_MUTATIONS
        .get_or_create(&MutationLabels {
            kind: kind.as_str().to_string(),
            action: action.to_string(),
        })
        .inc();
}

pub fn inc_address_wait_failure(reason: &str) {
    ADDRESS_WAIT_FAILURES
        .get_or_create(&ReasonLabels {
            reason: reason.to_string(),
        })
        .inc();
}

/// Render the registry in the OpenMetrics text format
pub fn encode_registry() -> Result<String, std::fmt::Error> {
    let mut buffer = String::new();
    prometheus_client::encoding::text::encode(&mut buffer, &REGISTRY)?;
    Ok(buffer)
}
