//! Market price types.
//!
//! A missing entry means "no data"; consumers must distinguish missing from
//! zero. Crossed books (ask < bid) are permitted by the protocol and never
//! normalized away.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::hrid::ItemHrid;

/// Ask/bid pair for one `(item, enhancement level)` entry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketPrice {
    pub ask: f64,
    pub bid: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub as_of: Option<DateTime<Utc>>,
}

/// Which side of the book to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceSide {
    Ask,
    Bid,
}

/// Pricing context; selects the user's configured mode per use site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceContext {
    Profit,
    Networth,
    #[default]
    Default,
}

/// One fetched snapshot: item → enhancement level → price.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketSnapshot {
    #[serde(default)]
    pub prices: HashMap<ItemHrid, HashMap<u8, MarketPrice>>,
    pub fetched_at: DateTime<Utc>,
}

impl MarketSnapshot {
    pub fn new(fetched_at: DateTime<Utc>) -> Self {
        Self {
            prices: HashMap::new(),
            fetched_at,
        }
    }

    /// Price entry for an item at an enhancement level. `/items/coin` is
    /// always 1/1 regardless of snapshot contents.
    pub fn price(&self, hrid: &ItemHrid, enhancement_level: u8) -> Option<MarketPrice> {
        if hrid.is_coin() {
            return Some(MarketPrice {
                ask: 1.0,
                bid: 1.0,
                as_of: None,
            });
        }
        self.prices
            .get(hrid)
            .and_then(|tiers| tiers.get(&enhancement_level))
            .copied()
    }

    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.fetched_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coin_is_always_one() {
        let snapshot = MarketSnapshot::new(Utc::now());
        let price = snapshot.price(&ItemHrid::coin(), 0).expect("coin price");
        assert_eq!(price.ask, 1.0);
        assert_eq!(price.bid, 1.0);
    }

    #[test]
    fn test_missing_entry_is_none() {
        let snapshot = MarketSnapshot::new(Utc::now());
        assert!(snapshot.price(&ItemHrid::new("/items/cheese"), 0).is_none());
    }

    #[test]
    fn test_crossed_book_preserved() {
        let mut snapshot = MarketSnapshot::new(Utc::now());
        let mut tiers = HashMap::new();
        tiers.insert(
            0,
            MarketPrice {
                ask: 90.0,
                bid: 100.0,
                as_of: None,
            },
        );
        snapshot
            .prices
            .insert(ItemHrid::new("/items/cheese"), tiers);

        let price = snapshot
            .price(&ItemHrid::new("/items/cheese"), 0)
            .expect("price");
        assert!(price.ask < price.bid);
    }
}
