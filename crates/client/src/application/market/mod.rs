//! Market data cache.
//!
//! Periodically fetched external JSON snapshot of item ask/bid prices,
//! held in memory with a TTL and mirrored into storage so a restart
//! starts warm. Concurrent fetchers coalesce onto one in-flight request.
//! The pricing surface resolves the book side from the caller's options
//! and the user's per-context settings, then falls back from market to
//! crafting cost to vendor price. No path ever yields NaN or Infinity;
//! missing stays missing.

pub mod pricing;

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use futures_util::future::{BoxFuture, FutureExt, Shared};
use serde::Deserialize;

use toolasha_domain::{ClientData, ItemHrid, MarketPrice, MarketSnapshot, PriceContext, PriceSide};

use crate::application::settings::{setting_keys, SettingsService};
use crate::infrastructure::storage::{keys, DocumentStore};
use crate::ports::outbound::Clock;

/// Options accepted by [`MarketDataCache::get_item_price`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ItemPriceOptions {
    /// Side of the book to read.
    pub side: Option<PriceSide>,
    /// Selects the user's configured pricing mode for this use site.
    pub context: PriceContext,
    /// Overrides `context` entirely.
    pub mode: Option<PriceSide>,
    pub enhancement_level: u8,
}

type FetchFuture = Shared<BoxFuture<'static, Option<Arc<MarketSnapshot>>>>;

pub struct MarketDataCache {
    http: reqwest::Client,
    default_url: String,
    store: Arc<DocumentStore>,
    settings: Arc<SettingsService>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    snapshot: RwLock<Option<Arc<MarketSnapshot>>>,
    in_flight: tokio::sync::Mutex<Option<FetchFuture>>,
    invalidation_hooks: RwLock<Vec<Arc<dyn Fn() + Send + Sync>>>,
}

// Wire shape of the external snapshot; unknown fields ignored, malformed
// entries dropped.
#[derive(Debug, Deserialize)]
struct WireSnapshot {
    #[serde(default, alias = "marketData", alias = "market")]
    market_data: HashMap<String, HashMap<String, WirePrice>>,
    #[serde(default)]
    timestamp: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct WirePrice {
    #[serde(default, alias = "a")]
    ask: Option<f64>,
    #[serde(default, alias = "b")]
    bid: Option<f64>,
}

impl MarketDataCache {
    pub fn new(
        default_url: impl Into<String>,
        ttl: Duration,
        store: Arc<DocumentStore>,
        settings: Arc<SettingsService>,
        clock: Arc<dyn Clock>,
    ) -> Arc<Self> {
        Arc::new(Self {
            http: reqwest::Client::new(),
            default_url: default_url.into(),
            store,
            settings,
            clock,
            ttl,
            snapshot: RwLock::new(None),
            in_flight: tokio::sync::Mutex::new(None),
            invalidation_hooks: RwLock::new(Vec::new()),
        })
    }

    /// Warm the in-memory cache from storage, if a snapshot was persisted
    /// by a previous session.
    pub async fn load_persisted(&self) -> bool {
        let Some(snapshot) = self
            .store
            .get_json::<MarketSnapshot>(keys::KEY_MARKET_DATA, keys::SETTINGS)
            .await
        else {
            return false;
        };
        *self
            .snapshot
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(snapshot));
        true
    }

    /// Install a snapshot directly (restore path and tests).
    pub fn prime(&self, snapshot: MarketSnapshot) {
        *self
            .snapshot
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(snapshot));
    }

    pub fn current_snapshot(&self) -> Option<Arc<MarketSnapshot>> {
        self.snapshot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn fresh_snapshot(&self) -> Option<Arc<MarketSnapshot>> {
        let snapshot = self.current_snapshot()?;
        let age = snapshot.age(self.clock.now());
        (age.num_milliseconds() >= 0 && age.to_std().ok()? <= self.ttl).then_some(snapshot)
    }

    /// Fetch the snapshot. Without `force`, a fresh in-memory snapshot is
    /// returned as-is; otherwise one HTTP request runs, shared by every
    /// concurrent caller. On failure the previous (possibly stale)
    /// snapshot is returned, or `None` when there has never been one.
    pub async fn fetch(self: &Arc<Self>, force: bool) -> Option<Arc<MarketSnapshot>> {
        if !force {
            if let Some(snapshot) = self.fresh_snapshot() {
                return Some(snapshot);
            }
        }

        let (future, created) = {
            let mut in_flight = self.in_flight.lock().await;
            match in_flight.clone() {
                Some(existing) => (existing, false),
                None => {
                    let cache = Arc::clone(self);
                    let future: FetchFuture = async move { cache.do_fetch().await }
                        .boxed()
                        .shared();
                    *in_flight = Some(future.clone());
                    (future, true)
                }
            }
        };

        let result = future.await;
        if created {
            *self.in_flight.lock().await = None;
        }
        result
    }

    async fn do_fetch(self: Arc<Self>) -> Option<Arc<MarketSnapshot>> {
        let url = self
            .settings
            .get_text(setting_keys::MARKET_DATA_URL)
            .filter(|url| !url.is_empty())
            .unwrap_or_else(|| self.default_url.clone());

        let response = match self.http.get(&url).send().await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(%url, "market fetch failed: {e}");
                return self.current_snapshot();
            }
        };
        let wire: WireSnapshot = match response.json().await {
            Ok(wire) => wire,
            Err(e) => {
                tracing::warn!(%url, "market snapshot malformed: {e}");
                return self.current_snapshot();
            }
        };

        let snapshot = Arc::new(self.normalize(wire));
        *self
            .snapshot
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&snapshot));
        self.store
            .set_json_deferred(keys::KEY_MARKET_DATA, snapshot.as_ref(), keys::SETTINGS);
        tracing::debug!(items = snapshot.prices.len(), "market snapshot refreshed");
        Some(snapshot)
    }

    fn normalize(&self, wire: WireSnapshot) -> MarketSnapshot {
        let fetched_at = self.clock.now();
        let as_of = wire
            .timestamp
            .and_then(|ts| chrono::DateTime::from_timestamp(ts, 0));
        let mut snapshot = MarketSnapshot::new(fetched_at);
        for (hrid, tiers) in wire.market_data {
            let mut normalized = HashMap::new();
            for (level, price) in tiers {
                let Ok(level) = level.parse::<u8>() else {
                    continue;
                };
                // Entries missing a side are unusable; missing must stay
                // distinguishable from zero.
                let (Some(ask), Some(bid)) = (price.ask, price.bid) else {
                    continue;
                };
                if !ask.is_finite() || !bid.is_finite() {
                    continue;
                }
                normalized.insert(level, MarketPrice { ask, bid, as_of });
            }
            if !normalized.is_empty() {
                snapshot.prices.insert(ItemHrid::new(hrid), normalized);
            }
        }
        snapshot
    }

    // -------------------------------------------------------------------------
    // Pricing surface
    // -------------------------------------------------------------------------

    /// Raw book entry. `/items/coin` is 1/1 unconditionally, snapshot or
    /// not.
    pub fn get_price(&self, hrid: &ItemHrid, enhancement_level: u8) -> Option<MarketPrice> {
        if hrid.is_coin() {
            return Some(MarketPrice {
                ask: 1.0,
                bid: 1.0,
                as_of: None,
            });
        }
        self.current_snapshot()?.price(hrid, enhancement_level)
    }

    fn resolve_side(&self, options: &ItemPriceOptions) -> PriceSide {
        if let Some(mode) = options.mode {
            return mode;
        }
        if let Some(side) = options.side {
            return side;
        }
        let setting_key = match options.context {
            PriceContext::Profit => setting_keys::PRICING_MODE_PROFIT,
            PriceContext::Networth => setting_keys::PRICING_MODE_NETWORTH,
            PriceContext::Default => return PriceSide::Ask,
        };
        match self.settings.get_text(setting_key).as_deref() {
            Some("bid") => PriceSide::Bid,
            _ => PriceSide::Ask,
        }
    }

    /// Computed price for one unit. Base items (enhancement level 0) fall
    /// back market → production cost → vendor; enhanced items are market
    /// only.
    pub fn get_item_price(
        &self,
        hrid: &ItemHrid,
        options: &ItemPriceOptions,
        client_data: Option<&ClientData>,
    ) -> Option<f64> {
        let side = self.resolve_side(options);
        if let Some(price) = self.get_price(hrid, options.enhancement_level) {
            let value = match side {
                PriceSide::Ask => price.ask,
                PriceSide::Bid => price.bid,
            };
            if value.is_finite() && value >= 0.0 {
                return Some(value);
            }
        }
        if options.enhancement_level > 0 {
            return None;
        }
        let data = client_data?;

        let market = |input: &ItemHrid| {
            self.get_price(input, 0).and_then(|price| {
                let value = match side {
                    PriceSide::Ask => price.ask,
                    PriceSide::Bid => price.bid,
                };
                (value.is_finite() && value >= 0.0).then_some(value)
            })
        };
        if let Some(cost) = pricing::production_cost(data, hrid, &market) {
            return Some(cost);
        }

        let detail = data.item(hrid)?;
        (detail.sell_price > 0).then(|| detail.sell_price as f64)
    }

    // -------------------------------------------------------------------------
    // Invalidation
    // -------------------------------------------------------------------------

    /// Register a hook run when the cache is cleared (derived caches such
    /// as the container expected-value table hang off this).
    pub fn add_invalidation_hook(&self, hook: Arc<dyn Fn() + Send + Sync>) {
        self.invalidation_hooks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(hook);
    }

    /// Clear memory, storage, and derived caches, then refetch.
    pub async fn clear_cache_and_refetch(self: &Arc<Self>) -> Option<Arc<MarketSnapshot>> {
        *self
            .snapshot
            .write()
            .unwrap_or_else(PoisonError::into_inner) = None;
        self.store.delete(keys::KEY_MARKET_DATA, keys::SETTINGS).await;
        let hooks: Vec<Arc<dyn Fn() + Send + Sync>> = self
            .invalidation_hooks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for hook in hooks {
            hook();
        }
        self.fetch(true).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::events::EventBus;
    use crate::infrastructure::testing::ManualClock;
    use chrono::Utc;
    use toolasha_domain::{ItemCount, ItemDetail, Recipe};

    async fn cache_with_clock(clock: Arc<ManualClock>) -> Arc<MarketDataCache> {
        let store = Arc::new(DocumentStore::open_in_memory().await.expect("store"));
        let settings = SettingsService::new(Arc::clone(&store), EventBus::new());
        settings.load_for_character("C1").await;
        MarketDataCache::new(
            "http://127.0.0.1:1/market.json",
            Duration::from_secs(900),
            store,
            settings,
            clock,
        )
    }

    fn snapshot_with(hrid: &str, ask: f64, bid: f64) -> MarketSnapshot {
        let mut snapshot = MarketSnapshot::new(Utc::now());
        let mut tiers = HashMap::new();
        tiers.insert(0, MarketPrice { ask, bid, as_of: None });
        snapshot.prices.insert(ItemHrid::new(hrid), tiers);
        snapshot
    }

    #[tokio::test]
    async fn test_coin_price_without_snapshot() {
        let cache = cache_with_clock(Arc::new(ManualClock::new(Utc::now()))).await;
        let price = cache.get_price(&ItemHrid::coin(), 0).expect("coin");
        assert_eq!(price.ask, 1.0);
        assert_eq!(price.bid, 1.0);
    }

    #[tokio::test]
    async fn test_fresh_snapshot_skips_fetch() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let cache = cache_with_clock(Arc::clone(&clock)).await;
        cache.prime(snapshot_with("/items/cheese", 100.0, 90.0));

        // The URL is unroutable; a fetch attempt would return the stale
        // value, but a fresh snapshot must short-circuit before that.
        let snapshot = cache.fetch(false).await.expect("snapshot");
        assert!(snapshot.prices.contains_key(&ItemHrid::new("/items/cheese")));
    }

    #[tokio::test]
    async fn test_failed_fetch_returns_stale() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let cache = cache_with_clock(Arc::clone(&clock)).await;
        cache.prime(snapshot_with("/items/cheese", 100.0, 90.0));
        clock.advance(chrono::TimeDelta::seconds(3600));

        // Stale, so a real fetch happens against the unroutable URL and
        // fails; the stale snapshot must come back.
        let snapshot = cache.fetch(false).await.expect("stale snapshot");
        assert!(snapshot.prices.contains_key(&ItemHrid::new("/items/cheese")));
    }

    #[tokio::test]
    async fn test_item_price_side_resolution() {
        let cache = cache_with_clock(Arc::new(ManualClock::new(Utc::now()))).await;
        cache.prime(snapshot_with("/items/cheese", 100.0, 90.0));
        let hrid = ItemHrid::new("/items/cheese");

        let ask = cache.get_item_price(
            &hrid,
            &ItemPriceOptions {
                side: Some(PriceSide::Ask),
                ..Default::default()
            },
            None,
        );
        let bid = cache.get_item_price(
            &hrid,
            &ItemPriceOptions {
                mode: Some(PriceSide::Bid),
                side: Some(PriceSide::Ask),
                ..Default::default()
            },
            None,
        );
        assert_eq!(ask, Some(100.0));
        // mode overrides side
        assert_eq!(bid, Some(90.0));
    }

    #[tokio::test]
    async fn test_fallback_chain_production_then_vendor() {
        let cache = cache_with_clock(Arc::new(ManualClock::new(Utc::now()))).await;
        cache.prime(snapshot_with("/items/cheese", 20.0, 18.0));

        let mut data = ClientData::default();
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
        data.item_detail_map.insert(
            ItemHrid::new("/items/trinket"),
            ItemDetail {
                hrid: ItemHrid::new("/items/trinket"),
                name: "Trinket".to_string(),
                sell_price: 7,
                ..Default::default()
            },
        );

        let produced = cache.get_item_price(
            &ItemHrid::new("/items/cheese_sword"),
            &ItemPriceOptions::default(),
            Some(&data),
        );
        assert_eq!(produced, Some(10.0 * 20.0 * pricing::ARTISAN_FACTOR));

        let vendored = cache.get_item_price(
            &ItemHrid::new("/items/trinket"),
            &ItemPriceOptions::default(),
            Some(&data),
        );
        assert_eq!(vendored, Some(7.0));

        let missing = cache.get_item_price(
            &ItemHrid::new("/items/unobtainium"),
            &ItemPriceOptions::default(),
            Some(&data),
        );
        assert_eq!(missing, None);
    }

    #[tokio::test]
    async fn test_enhanced_items_never_fall_back() {
        let cache = cache_with_clock(Arc::new(ManualClock::new(Utc::now()))).await;
        cache.prime(snapshot_with("/items/cheese_sword", 100.0, 90.0));
        let data = ClientData::default();

        let price = cache.get_item_price(
            &ItemHrid::new("/items/cheese_sword"),
            &ItemPriceOptions {
                enhancement_level: 3,
                ..Default::default()
            },
            Some(&data),
        );
        assert_eq!(price, None);
    }

    #[tokio::test]
    async fn test_invalidation_hooks_run_on_clear() {
        use std::sync::atomic::{AtomicU32, Ordering};
        let cache = cache_with_clock(Arc::new(ManualClock::new(Utc::now()))).await;
        cache.prime(snapshot_with("/items/cheese", 1.0, 1.0));
        let hits = Arc::new(AtomicU32::new(0));
        let hits_clone = Arc::clone(&hits);
        cache.add_invalidation_hook(Arc::new(move || {
            hits_clone.fetch_add(1, Ordering::SeqCst);
        }));

        cache.clear_cache_and_refetch().await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_normalize_drops_malformed_entries() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let cache = cache_with_clock(Arc::clone(&clock)).await;
        let wire: WireSnapshot = serde_json::from_str(
            r#"{
                "marketData": {
                    "/items/cheese": {"0": {"a": 10.0, "b": 9.0}, "oops": {"a": 1, "b": 1}},
                    "/items/half": {"0": {"a": 5.0}},
                    "/items/empty": {}
                },
                "timestamp": 1760000000,
                "futureField": true
            }"#,
        )
        .expect("wire parse");
        let snapshot = cache.normalize(wire);

        assert!(snapshot.prices.contains_key(&ItemHrid::new("/items/cheese")));
        assert!(!snapshot.prices.contains_key(&ItemHrid::new("/items/half")));
        assert!(!snapshot.prices.contains_key(&ItemHrid::new("/items/empty")));
        let price = snapshot
            .price(&ItemHrid::new("/items/cheese"), 0)
            .expect("price");
        assert!(price.as_of.is_some());
    }
}
