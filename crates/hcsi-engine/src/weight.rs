//! Capacity filtering and free-capacity weighting, the last two stages of
//! the selection pipeline (C6) before the selector picks a winner.

use crate::error::SelectError;
use crate::filter::CandidatePool;
use crate::model::{capability, capacity};

/// Final narrowing by request size, run after capability+topology: `thin`
/// (the default) re-asserts `SupportThin` without checking free space —
/// thin pools are allowed to oversubscribe; `thick` additionally requires
/// `FreeCapacity >= required_bytes`.
///
/// # Errors
///
/// Returns [`SelectError::NoAvailablePool`] naming the `"capacity"` stage
/// if every candidate is dropped.
pub fn filter_by_capacity(
    alloc_type: &str,
    required_bytes: i64,
    candidates: Vec<CandidatePool>,
) -> Result<Vec<CandidatePool>, SelectError> {
    let filtered: Vec<CandidatePool> = candidates
        .into_iter()
        .filter(|c| match alloc_type {
            "thick" => c.has_capability(capability::SUPPORT_THICK) && c.pool.free_capacity() >= required_bytes,
            _ => c.has_capability(capability::SUPPORT_THIN),
        })
        .collect();
    if filtered.is_empty() {
        return Err(SelectError::NoAvailablePool {
            filter: "capacity".to_owned(),
            value: required_bytes.to_string(),
            parameters: std::collections::HashMap::new(),
        });
    }
    Ok(filtered)
}

/// Order `candidates` by descending free capacity, most room first, so the
/// selector's top pick spreads new allocations across pools rather than
/// always filling the first one that satisfies every filter.
#[must_use]
pub fn weight_by_free_capacity(mut candidates: Vec<CandidatePool>) -> Vec<CandidatePool> {
    candidates.sort_by(|a, b| {
        b.pool
            .capacities
            .get(capacity::FREE_CAPACITY)
            .cmp(&a.pool.capacities.get(capacity::FREE_CAPACITY))
    });
    candidates
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::{Backend, StoragePool};
    use hcsi_plugin::mock::MockPlugin;
    use std::collections::HashMap;
    use std::sync::Arc;

    fn candidate(name: &str, free: i64) -> CandidatePool {
        let mut pool = StoragePool::new("p1", name, "oceanstor-san");
        pool.capacities.insert(capacity::FREE_CAPACITY.to_owned(), free);
        pool.capabilities.insert(capability::SUPPORT_THICK.to_owned(), true);
        pool.capabilities.insert(capability::SUPPORT_THIN.to_owned(), true);
        let backend = Backend {
            name: name.to_owned(),
            storage: "oceanstor-san".to_owned(),
            available: true,
            content_name: "v1".to_owned(),
            plugin: Arc::new(MockPlugin::new(name)),
            pools: vec![pool.clone()],
            parameters: HashMap::new(),
            supported_topologies: Vec::new(),
            account_name: String::new(),
            metro_domain: String::new(),
            metro_vstore_pair_id: String::new(),
            metro_backend_name: String::new(),
            replica_backend_name: String::new(),
        };
        CandidatePool { backend, pool }
    }

    #[test]
    fn thick_capacity_filter_drops_undersized_pools() {
        let candidates = vec![candidate("b1", 100), candidate("b2", 1000)];
        let filtered = filter_by_capacity("thick", 500, candidates).unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].backend.name, "b2");
    }

    #[test]
    fn thick_capacity_filter_errors_when_all_undersized() {
        let candidates = vec![candidate("b1", 10)];
        assert!(filter_by_capacity("thick", 500, candidates).is_err());
    }

    #[test]
    fn thin_capacity_filter_ignores_free_space() {
        let candidates = vec![candidate("b1", 1)];
        let filtered = filter_by_capacity("thin", 500, candidates).unwrap();
        assert_eq!(filtered.len(), 1);
    }

    #[test]
    fn weighting_orders_most_free_first() {
        let candidates = vec![candidate("b1", 100), candidate("b2", 1000), candidate("b3", 500)];
        let weighted = weight_by_free_capacity(candidates);
        let names: Vec<_> = weighted.iter().map(|c| c.backend.name.clone()).collect();
        assert_eq!(names, vec!["b2", "b3", "b1"]);
    }
}
