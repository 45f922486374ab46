//! Market listing-age estimator.
//!
//! Annotates market listings with how old the price information backing
//! them is, from the snapshot's per-entry `asOf` (or the fetch time when
//! entries carry none).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock, Weak};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::application::settings::setting_keys;
use crate::features::{Feature, FeatureContext, FeatureError, FeatureResources};

pub const OVERLAY_CLASS: &str = "toolasha-listing-age";
const MARKET_LISTING_CLASS: &str = "MarketListing";

/// `"<1m"`, `"12m"`, `"3h"`, `"2d"`.
pub fn age_label(as_of: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let minutes = (now - as_of).num_minutes().max(0);
    if minutes < 1 {
        return "<1m".to_string();
    }
    if minutes < 60 {
        return format!("{minutes}m");
    }
    let hours = minutes / 60;
    if hours < 24 {
        return format!("{hours}h");
    }
    format!("{}d", hours / 24)
}

pub struct ListingAge {
    weak: Weak<Self>,
    initialized: AtomicBool,
    resources: FeatureResources,
    ctx: RwLock<Option<FeatureContext>>,
}

impl ListingAge {
    pub fn new() -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            weak: weak.clone(),
            initialized: AtomicBool::new(false),
            resources: FeatureResources::new(),
            ctx: RwLock::new(None),
        })
    }

    fn ctx(&self) -> Option<FeatureContext> {
        self.ctx
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn annotate_listing(&self) {
        let Some(ctx) = self.ctx() else {
            return;
        };
        let Some(snapshot) = ctx.market.current_snapshot() else {
            return;
        };
        let label = age_label(snapshot.fetched_at, ctx.clock.now());
        ctx.overlay.inject(OVERLAY_CLASS, &label);
    }
}

#[async_trait]
impl Feature for ListingAge {
    fn key(&self) -> &'static str {
        setting_keys::MARKET_LISTING_AGE
    }

    fn name(&self) -> &'static str {
        "Market Listing Age"
    }

    fn category(&self) -> &'static str {
        "economy"
    }

    async fn initialize(&self, ctx: &FeatureContext) -> Result<(), FeatureError> {
        if self.initialized.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        *self.ctx.write().unwrap_or_else(PoisonError::into_inner) = Some(ctx.clone());

        let weak = self.weak.clone();
        let handle = ctx.observer.on_class(
            "listing-age",
            MARKET_LISTING_CLASS,
            Arc::new(move |_node| {
                if let Some(feature) = weak.upgrade() {
                    feature.annotate_listing();
                }
                Ok(())
            }),
        );
        self.resources.track_observer(handle);
        Ok(())
    }

    async fn disable(&self) -> Result<(), FeatureError> {
        if !self.initialized.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        self.resources.cleanup_all();
        if let Some(ctx) = self.ctx() {
            ctx.overlay.remove_by_class(OVERLAY_CLASS);
        }
        Ok(())
    }
}
