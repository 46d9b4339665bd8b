//! Deduplicating merge of discovered and static routes.

use std::collections::HashMap;

use tracing::{info, warn};

use super::model::{Route, RouteKey};

/// Merge `static_routes` after `discovered`.
///
/// On a key collision the later definition replaces the earlier one in place,
/// so every key keeps the position where it was first seen.
pub fn merge(discovered: Vec<Route>, static_routes: Vec<Route>) -> Vec<Route> {
    let discovered_len = discovered.len();
    let mut positions: HashMap<RouteKey, usize> = HashMap::new();
    let mut merged: Vec<Route> = Vec::with_capacity(discovered_len + static_routes.len());
    let mut duplicates = 0usize;

    for (index, route) in discovered.into_iter().chain(static_routes).enumerate() {
        let from_static = index >= discovered_len;
        match positions.get(&route.key()) {
            Some(&pos) => {
                let existing = &mut merged[pos];
                if *existing == route {
                    duplicates += 1;
                } else if from_static {
                    warn!(
                        "Static route {} {} overrides discovered definition (port {} -> {}, target {} -> {})",
                        route.method,
                        route.path,
                        existing.port,
                        route.port,
                        existing.target_path,
                        route.target_path
                    );
                }
                *existing = route;
            }
            None => {
                positions.insert(route.key(), merged.len());
                merged.push(route);
            }
        }
    }

    if duplicates > 0 {
        info!("Skipped {} duplicate route definition(s)", duplicates);
    }
    merged
}
