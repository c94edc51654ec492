//! Topology-aware filtering and preferred-order reshuffling for the
//! selection pipeline (C6).
//!
//! A requisite topology is "supported" by a backend's declared topology
//! list when (a) at least one declared entry matches every non-protocol
//! key of the requisite exactly, AND (b) if the requisite carries a
//! `topology.kubernetes.io/protocol.*` key, at least one declared entry
//! shares an equal value for that key. (a) and (b) may be satisfied by
//! different declared entries.

use std::collections::HashMap;

use rand::seq::SliceRandom;

use crate::filter::CandidatePool;
use crate::model::TOPOLOGY_PROTOCOL_PREFIX;

/// The `accessibility_requirements` carried on a provisioning request.
#[derive(Debug, Clone, Default)]
pub struct AccessibleTopology {
    pub requisite: Vec<HashMap<String, String>>,
    pub preferred: Vec<HashMap<String, String>>,
}

fn is_protocol_key(key: &str) -> bool {
    key.starts_with(TOPOLOGY_PROTOCOL_PREFIX)
}

fn matches_topology(requirement: &HashMap<String, String>, declared: &[HashMap<String, String>]) -> bool {
    let non_protocol: Vec<(&str, &str)> = requirement
        .iter()
        .filter(|(k, _)| !is_protocol_key(k))
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect();
    let protocol: Vec<(&str, &str)> = requirement
        .iter()
        .filter(|(k, _)| is_protocol_key(k))
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect();

    let non_protocol_ok = declared
        .iter()
        .any(|d| non_protocol.iter().all(|(k, v)| d.get(*k).map(String::as_str) == Some(*v)));
    let protocol_ok = protocol.is_empty()
        || declared
            .iter()
            .any(|d| protocol.iter().any(|(k, v)| d.get(*k).map(String::as_str) == Some(*v)));

    non_protocol_ok && protocol_ok
}

/// Drop candidates whose parent backend declares at least one topology but
/// cannot satisfy any requisite entry. Backends declaring no topology at
/// all are accepted unconditionally.
#[must_use]
pub fn filter_requisite(requisite: &[HashMap<String, String>], candidates: Vec<CandidatePool>) -> Vec<CandidatePool> {
    if requisite.is_empty() {
        return candidates;
    }
    candidates
        .into_iter()
        .filter(|c| {
            c.backend.supported_topologies.is_empty()
                || requisite.iter().any(|r| matches_topology(r, &c.backend.supported_topologies))
        })
        .collect()
}

/// Reorder `candidates` by preferred topology: for each preferred entry in
/// order, the subset of remaining candidates whose backend satisfies it is
/// shuffled uniformly and appended to the result, then removed from the
/// remaining pool; whatever is left after all preferred entries is shuffled
/// and appended last.
#[must_use]
pub fn reorder_preferred(preferred: &[HashMap<String, String>], candidates: Vec<CandidatePool>) -> Vec<CandidatePool> {
    if preferred.is_empty() {
        let mut remaining = candidates;
        remaining.shuffle(&mut rand::thread_rng());
        return remaining;
    }

    let mut remaining = candidates;
    let mut ordered = Vec::with_capacity(remaining.len());

    for pref in preferred {
        let (mut matched, unmatched): (Vec<_>, Vec<_>) = remaining
            .into_iter()
            .partition(|c| matches_topology(pref, &c.backend.supported_topologies));
        matched.shuffle(&mut rand::thread_rng());
        ordered.extend(matched);
        remaining = unmatched;
    }

    remaining.shuffle(&mut rand::thread_rng());
    ordered.extend(remaining);
    ordered
}
