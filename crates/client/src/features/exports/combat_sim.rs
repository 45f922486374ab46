//! Combat-sim multi-player export.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;

use toolasha_protocol::CombatSimExport;

use crate::application::settings::setting_keys;
use crate::features::{Feature, FeatureContext, FeatureError, FeatureResources};
use crate::infrastructure::storage::keys;

pub const OVERLAY_CLASS: &str = "toolasha-combat-sim-export";

pub struct CombatSimExportFeature {
    initialized: AtomicBool,
    resources: FeatureResources,
    ctx: RwLock<Option<FeatureContext>>,
}

impl CombatSimExportFeature {
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

    /// Export the current character: slot "1" populated, "2"–"5" BLANK.
    /// Returns the clipboard payload.
    pub fn export_own(&self) -> Result<String, FeatureError> {
        let ctx = self.ctx().ok_or(FeatureError::MissingData("context"))?;
        let state = ctx
            .data
            .character_data()
            .ok_or(FeatureError::MissingData("character data"))?;

        let export = CombatSimExport::solo(&state);
        let payload = export
            .to_clipboard_string()
            .map_err(|e| FeatureError::failed(format!("export serialization: {e}")))?;
        ctx.clipboard
            .write_text(&payload)
            .map_err(|e| FeatureError::failed(format!("clipboard: {e}")))?;
        ctx.store.set_deferred(
            keys::KEY_CURRENT_PROFILE_ID,
            &state.character.id,
            keys::COMBAT_EXPORT,
        );
        Ok(payload)
    }

    /// Export a shared profile into slot "1".
    pub fn export_profile(&self, character_name: &str) -> Result<String, FeatureError> {
        let ctx = self.ctx().ok_or(FeatureError::MissingData("context"))?;
        let profile = ctx
            .data
            .shared_profile(character_name)
            .ok_or(FeatureError::MissingData("shared profile"))?;

        let state = super::profile_to_state(&profile);
        let export = CombatSimExport::solo(&state);
        let payload = export
            .to_clipboard_string()
            .map_err(|e| FeatureError::failed(format!("export serialization: {e}")))?;
        ctx.clipboard
            .write_text(&payload)
            .map_err(|e| FeatureError::failed(format!("clipboard: {e}")))?;
        Ok(payload)
    }
}

#[async_trait]
impl Feature for CombatSimExportFeature {
    fn key(&self) -> &'static str {
        setting_keys::COMBAT_SIM_EXPORT
    }

    fn name(&self) -> &'static str {
        "Combat Sim Export"
    }

    fn category(&self) -> &'static str {
        "export"
    }

    async fn initialize(&self, ctx: &FeatureContext) -> Result<(), FeatureError> {
        if self.initialized.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        *self.ctx.write().unwrap_or_else(PoisonError::into_inner) = Some(ctx.clone());
        // The export button lives on the profile panel.
        ctx.overlay.inject(OVERLAY_CLASS, "Combat Sim Export");
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

    fn health_check(&self, ctx: &FeatureContext) -> bool {
        ctx.overlay.count_by_class(OVERLAY_CLASS) > 0
    }
}
