//! Expected value of openable containers.
//!
//! Containers drop other containers; the drop graph is not guaranteed
//! acyclic, so values are computed as a bounded fixed point: four
//! iterations of a batched evaluation, each reading the previous
//! iteration's container values. Four is sufficient for the game's actual
//! nesting depth. Market prices take precedence over computed container
//! values wherever both exist.

use std::collections::HashMap;

use toolasha_domain::{DropEntry, ItemHrid};

pub const FIXED_POINT_ITERATIONS: usize = 4;

#[derive(Debug, Clone, Default)]
pub struct ContainerValueInput {
    /// Drop table per openable container.
    pub containers: HashMap<ItemHrid, Vec<DropEntry>>,
    /// Market (or otherwise resolved) prices for leaf items.
    pub base_prices: HashMap<ItemHrid, f64>,
}

/// Expected coin value per single open, for every container in the input.
pub fn expected_values(input: &ContainerValueInput) -> HashMap<ItemHrid, f64> {
    let mut values: HashMap<ItemHrid, f64> =
        input.containers.keys().map(|hrid| (hrid.clone(), 0.0)).collect();

    for _ in 0..FIXED_POINT_ITERATIONS {
        let previous = values.clone();
        for (container, drops) in &input.containers {
            let mut total = 0.0;
            for drop in drops {
                let unit = input
                    .base_prices
                    .get(&drop.item_hrid)
                    .copied()
                    .or_else(|| previous.get(&drop.item_hrid).copied())
                    .unwrap_or(0.0);
                total += drop.expected_count() * unit;
            }
            values.insert(container.clone(), total);
        }
    }
    values
}
