//! Tooltip guard.
//!
//! Two workarounds for the host game's UI, kept deliberately:
//! - the game's tooltips can get stuck when the element under them is
//!   replaced mid-hover; any scroll dismisses every lingering tooltip.
//! - the item sprite sheet URL is webpack-hashed per deploy, so it is
//!   probed from an already-rendered icon instead of hardcoded.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};

use async_trait::async_trait;

use crate::application::settings::setting_keys;
use crate::features::{Feature, FeatureContext, FeatureError, FeatureResources};

/// The game's tooltip portal class.
const GAME_TOOLTIP_CLASS: &str = "MuiTooltip-popper";

pub struct TooltipGuard {
    weak: Weak<Self>,
    initialized: AtomicBool,
    resources: FeatureResources,
    ctx: RwLock<Option<FeatureContext>>,
    sprite_url: Mutex<Option<String>>,
}

impl TooltipGuard {
    pub fn new() -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            weak: weak.clone(),
            initialized: AtomicBool::new(false),
            resources: FeatureResources::new(),
            ctx: RwLock::new(None),
            sprite_url: Mutex::new(None),
        })
    }

    fn ctx(&self) -> Option<FeatureContext> {
        self.ctx
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn dismiss_stuck_tooltips(&self) {
        let Some(ctx) = self.ctx() else {
            return;
        };
        let removed = ctx.overlay.remove_by_class(GAME_TOOLTIP_CLASS);
        if removed > 0 {
            tracing::debug!(removed, "dismissed stuck tooltips on scroll");
        }
    }

    /// Current sprite sheet URL, probed once from the live page and
    /// cached for the session.
    pub fn sprite_url(&self) -> Option<String> {
        {
            let cached = self
                .sprite_url
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if cached.is_some() {
                return cached.clone();
            }
        }
        let probed = self.ctx()?.overlay.sprite_url();
        if let Some(url) = &probed {
            *self
                .sprite_url
                .lock()
                .unwrap_or_else(PoisonError::into_inner) = Some(url.clone());
        }
        probed
    }
}

#[async_trait]
impl Feature for TooltipGuard {
    fn key(&self) -> &'static str {
        setting_keys::TOOLTIP_GUARD
    }

    fn name(&self) -> &'static str {
        "Tooltip Guard"
    }

    async fn initialize(&self, ctx: &FeatureContext) -> Result<(), FeatureError> {
        if self.initialized.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        *self.ctx.write().unwrap_or_else(PoisonError::into_inner) = Some(ctx.clone());

        let weak = self.weak.clone();
        let handle = ctx.observer.on_scroll(
            "tooltip-guard",
            Arc::new(move || {
                if let Some(guard) = weak.upgrade() {
                    guard.dismiss_stuck_tooltips();
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
        *self
            .sprite_url
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }

    /// Live toggle: flipping the setting enables or disables the guard
    /// without waiting for the next lifecycle cycle.
    fn setup_setting_listener(self: Arc<Self>, ctx: &FeatureContext) {
        let settings = Arc::clone(&ctx.settings);
        let ctx = ctx.clone();
        let weak = self.weak.clone();
        settings.on_setting_change(
            setting_keys::TOOLTIP_GUARD,
            Arc::new(move |value| {
                let Some(guard) = weak.upgrade() else {
                    return Ok(());
                };
                let enabled = value.is_true();
                let ctx = ctx.clone();
                tokio::spawn(async move {
                    let result = if enabled {
                        guard.initialize(&ctx).await
                    } else {
                        guard.disable().await
                    };
                    if let Err(e) = result {
                        tracing::warn!("tooltip guard toggle failed: {e}");
                    }
                });
                Ok(())
            }),
        );
    }
}
