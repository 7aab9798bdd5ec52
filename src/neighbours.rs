//! Peer Neighbour Selection
//!
//! Each net-exporter dials only a few of its peers instead of all of them.
//! Peers are placed on a ring in sorted order and every instance dials the
//! next `n` entries after itself, so a down instance is still dialed by the
//! neighbours behind it while the number of latency series stays bounded.

/// Number of peers each instance dials.
///
/// With 1, a single failed instance can hide the failure of the one after it.
/// With 2, two specific instances must be down before a third goes undialed,
/// without exposing high-cardinality metrics.
pub const DEFAULT_NEIGHBOURS: usize = 2;

/// Select the `n` peers following `self_address` on the sorted ring of
/// `addresses`.
///
/// Returns an empty list when `self_address` is not in `addresses`; a freshly
/// started instance may not be listed in the endpoints yet. When `addresses`
/// holds only `self_address`, the ring wraps onto itself.
pub fn calculate_neighbours(n: usize, self_address: &str, addresses: &[String]) -> Vec<String> {
    let mut ring = addresses.to_vec();
    ring.sort();

    let n = n.min(ring.len());
    let mut neighbours = Vec::new();

    for (i, address) in ring.iter().enumerate() {
        if address != self_address {
            continue;
        }
        for j in 1..=n {
            neighbours.push(ring[(i + j) % ring.len()].clone());
        }
    }

    neighbours
}

// =============================================================================
// Tests
// =============================================================================
