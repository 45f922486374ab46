//! Milkonomy export.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;

use toolasha_protocol::MilkonomyExport;

use crate::application::settings::setting_keys;
use crate::features::{Feature, FeatureContext, FeatureError, FeatureResources};

pub const OVERLAY_CLASS: &str = "toolasha-milkonomy-export";

pub struct MilkonomyExportFeature {
    initialized: AtomicBool,
    resources: FeatureResources,
    ctx: RwLock<Option<FeatureContext>>,
}

impl MilkonomyExportFeature {
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

    pub fn export_own(&self) -> Result<String, FeatureError> {
        let ctx = self.ctx().ok_or(FeatureError::MissingData("context"))?;
        let state = ctx
            .data
            .character_data()
            .ok_or(FeatureError::MissingData("character data"))?;
        let color = ctx
            .settings
            .get_text(setting_keys::MILKONOMY_COLOR)
            .unwrap_or_else(|| "#546ddb".to_string());

        let export = MilkonomyExport::from_character(&state, &state.character.name, &color);
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
impl Feature for MilkonomyExportFeature {
    fn key(&self) -> &'static str {
        setting_keys::MILKONOMY_EXPORT
    }

    fn name(&self) -> &'static str {
        "Milkonomy Export"
    }

    fn category(&self) -> &'static str {
        "export"
    }

    async fn initialize(&self, ctx: &FeatureContext) -> Result<(), FeatureError> {
        if self.initialized.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        *self.ctx.write().unwrap_or_else(PoisonError::into_inner) = Some(ctx.clone());
        ctx.overlay.inject(OVERLAY_CLASS, "Milkonomy Export");
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
