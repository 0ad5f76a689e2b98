use ra_core::{EntityId, ServiceCall};
use tracing::warn;

/// Target entity ids of a service call, restricted to `domain`
pub(crate) fn target_entities(call: &ServiceCall, domain: &str) -> Vec<EntityId> {
    call.entity_ids()
        .into_iter()
        .filter(|e| {
            let matches = e.is_domain(domain);
            if !matches {
                warn!(entity_id = %e, service = %call.service_id(), "Entity not in service domain");
            }
            matches
        })
        .collect()
}
