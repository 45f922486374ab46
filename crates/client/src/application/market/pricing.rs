//! Crafting-cost fallback pricing.
//!
//! When a base item has no market entry, calculators fall back to its
//! production cost: recursively priced inputs with the artisan reduction
//! applied, plus the upgrade item's cost, divided by the recipe output
//! count. Recursion is depth-capped; a missing price anywhere in the
//! chain makes the whole cost missing (never zero).

use toolasha_domain::{ClientData, ItemHrid};

/// Artisan input reduction applied to crafting inputs.
pub const ARTISAN_FACTOR: f64 = 0.9;

const MAX_RECIPE_DEPTH: u8 = 5;

/// Production cost of one unit of `hrid`, using `market` for leaf prices.
pub fn production_cost(
    data: &ClientData,
    hrid: &ItemHrid,
    market: &dyn Fn(&ItemHrid) -> Option<f64>,
) -> Option<f64> {
    production_cost_inner(data, hrid, market, MAX_RECIPE_DEPTH)
}

fn price_or_produce(
    data: &ClientData,
    hrid: &ItemHrid,
    market: &dyn Fn(&ItemHrid) -> Option<f64>,
    depth: u8,
) -> Option<f64> {
    if let Some(price) = market(hrid) {
        return Some(price);
    }
    if let Some(cost) = production_cost_inner(data, hrid, market, depth) {
        return Some(cost);
    }
    // Vendor fallback for leaf inputs.
    let detail = data.item(hrid)?;
    (detail.sell_price > 0).then(|| detail.sell_price as f64)
}

fn production_cost_inner(
    data: &ClientData,
    hrid: &ItemHrid,
    market: &dyn Fn(&ItemHrid) -> Option<f64>,
    depth: u8,
) -> Option<f64> {
    if depth == 0 {
        return None;
    }
    let recipe = data.item(hrid)?.crafting_recipe.as_ref()?;

    let mut inputs_cost = 0.0;
    for input in &recipe.input_items {
        let unit = price_or_produce(data, &input.item_hrid, market, depth - 1)?;
        inputs_cost += unit * input.count;
    }
    let mut cost = inputs_cost * ARTISAN_FACTOR;

    if let Some(upgrade) = &recipe.upgrade_item_hrid {
        cost += price_or_produce(data, upgrade, market, depth - 1)?;
    }

    let output_count = if recipe.output_count > 0.0 {
        recipe.output_count
    } else {
        1.0
    };
    Some(cost / output_count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use toolasha_domain::{ItemCount, ItemDetail, Recipe};

    fn dictionary() -> ClientData {
        let mut data = ClientData::default();
        data.item_detail_map.insert(
            ItemHrid::new("/items/cheese"),
            ItemDetail {
                hrid: ItemHrid::new("/items/cheese"),
                name: "Cheese".to_string(),
                sell_price: 4,
                ..Default::default()
            },
        );
        data.item_detail_map.insert(
            ItemHrid::new("/items/cheese_sword"),
            ItemDetail {
                hrid: ItemHrid::new("/items/cheese_sword"),
                name: "Cheese Sword".to_string(),
                crafting_recipe: Some(Recipe {
                    input_items: vec![ItemCount {
                        item_hrid: ItemHrid::new("/items/cheese"),
                        count: 10.0,
                    }],
                    upgrade_item_hrid: None,
                    output_count: 1.0,
                }),
                ..Default::default()
            },
        );
        data
    }

    #[test]
    fn test_cost_from_market_inputs() {
        let data = dictionary();
        let market = |hrid: &ItemHrid| (hrid.as_str() == "/items/cheese").then_some(20.0);
        let cost = production_cost(&data, &ItemHrid::new("/items/cheese_sword"), &market)
            .expect("cost");
        assert!((cost - 10.0 * 20.0 * ARTISAN_FACTOR).abs() < 1e-9);
    }

    #[test]
    fn test_vendor_fallback_for_unpriced_input() {
        let data = dictionary();
        let market = |_: &ItemHrid| None;
        let cost = production_cost(&data, &ItemHrid::new("/items/cheese_sword"), &market)
            .expect("cost");
        assert!((cost - 10.0 * 4.0 * ARTISAN_FACTOR).abs() < 1e-9);
    }

    #[test]
    fn test_no_recipe_means_no_cost() {
        let data = dictionary();
        let market = |_: &ItemHrid| None;
        assert!(production_cost(&data, &ItemHrid::new("/items/cheese"), &market).is_none());
    }

    #[test]
    fn test_upgrade_cost_added_and_output_divided() {
        let mut data = dictionary();
        data.item_detail_map.insert(
            ItemHrid::new("/items/grand_cheese_sword"),
            ItemDetail {
                hrid: ItemHrid::new("/items/grand_cheese_sword"),
                name: "Grand Cheese Sword".to_string(),
                crafting_recipe: Some(Recipe {
                    input_items: vec![ItemCount {
                        item_hrid: ItemHrid::new("/items/cheese"),
                        count: 2.0,
                    }],
                    upgrade_item_hrid: Some(ItemHrid::new("/items/cheese_sword")),
                    output_count: 2.0,
                }),
                ..Default::default()
            },
        );
        let market = |hrid: &ItemHrid| match hrid.as_str() {
            "/items/cheese" => Some(20.0),
            "/items/cheese_sword" => Some(500.0),
            _ => None,
        };
        let cost = production_cost(&data, &ItemHrid::new("/items/grand_cheese_sword"), &market)
            .expect("cost");
        let expected = (2.0 * 20.0 * ARTISAN_FACTOR + 500.0) / 2.0;
        assert!((cost - expected).abs() < 1e-9);
    }

    #[test]
    fn test_cyclic_recipes_terminate() {
        let mut data = ClientData::default();
        for (a, b) in [("/items/a", "/items/b"), ("/items/b", "/items/a")] {
            data.item_detail_map.insert(
                ItemHrid::new(a),
                ItemDetail {
                    hrid: ItemHrid::new(a),
                    name: a.to_string(),
                    crafting_recipe: Some(Recipe {
                        input_items: vec![ItemCount {
                            item_hrid: ItemHrid::new(b),
                            count: 1.0,
                        }],
                        upgrade_item_hrid: None,
                        output_count: 1.0,
                    }),
                    ..Default::default()
                },
            );
        }
        let market = |_: &ItemHrid| None;
        // Depth cap resolves the cycle to "no price" instead of hanging.
        assert!(production_cost(&data, &ItemHrid::new("/items/a"), &market).is_none());
    }
}
