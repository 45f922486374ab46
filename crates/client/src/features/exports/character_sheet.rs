//! Character-sheet URL builder.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;

use toolasha_protocol::build_character_sheet_url;

use crate::application::settings::setting_keys;
use crate::features::{Feature, FeatureContext, FeatureError, FeatureResources};

pub const OVERLAY_CLASS: &str = "toolasha-character-sheet-link";

pub struct CharacterSheetLink {
    initialized: AtomicBool,
    resources: FeatureResources,
    ctx: RwLock<Option<FeatureContext>>,
}

impl CharacterSheetLink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
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

    /// Build the sheet URL for the current character and open it.
    pub fn open_sheet(&self) -> Result<String, FeatureError> {
        let ctx = self.ctx().ok_or(FeatureError::MissingData("context"))?;
        let state = ctx
            .data
            .character_data()
            .ok_or(FeatureError::MissingData("character data"))?;
        let base = ctx
            .settings
            .get_text(setting_keys::CHARACTER_SHEET_BASE_URL)
            .filter(|base| !base.is_empty())
            .ok_or(FeatureError::MissingData("sheet base URL"))?;

        let url = build_character_sheet_url(base.trim_end_matches('/'), &state);
        ctx.clipboard
            .open_url(&url)
            .map_err(|e| FeatureError::failed(format!("open url: {e}")))?;
        Ok(url)
    }
}

#[async_trait]
impl Feature for CharacterSheetLink {
    fn key(&self) -> &'static str {
        setting_keys::CHARACTER_SHEET_LINK
    }

    fn name(&self) -> &'static str {
        "Character Sheet Link"
    }

    fn category(&self) -> &'static str {
        "export"
    }

    async fn initialize(&self, ctx: &FeatureContext) -> Result<(), FeatureError> {
        if self.initialized.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        *self.ctx.write().unwrap_or_else(PoisonError::into_inner) = Some(ctx.clone());
        ctx.overlay.inject(OVERLAY_CLASS, "Character Sheet");
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
