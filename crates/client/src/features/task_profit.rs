//! Task profit display.
//!
//! Annotates production task cards with expected profit and duration.
//! Inputs are priced on the profit context's configured side; any missing
//! price taints the result (`has_missing_prices`) and renders the
//! missing marker instead of a number. Never NaN, never Infinity.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock, Weak};

use async_trait::async_trait;

use toolasha_domain::{ActionHrid, PriceContext};

use crate::application::market::ItemPriceOptions;
use crate::application::settings::setting_keys;
use crate::features::{Feature, FeatureContext, FeatureError, FeatureResources};
use crate::infrastructure::storage::keys;
use crate::util::{format_compact_number, format_duration_ms, MISSING_PRICE_MARKER};

pub const OVERLAY_CLASS: &str = "toolasha-task-profit";
const TASK_CARD_CLASS: &str = "TaskCard";

#[derive(Debug, Clone, PartialEq)]
pub struct TaskProfit {
    pub revenue: f64,
    pub cost: f64,
    pub duration_ms: u64,
    pub has_missing_prices: bool,
}

impl TaskProfit {
    pub fn profit(&self) -> Option<f64> {
        (!self.has_missing_prices).then(|| self.revenue - self.cost)
    }

    /// `💰 12.3k | ⏱ 0:20 ▸`, with the missing marker when tainted.
    pub fn label(&self) -> String {
        let money = match self.profit() {
            Some(profit) => format_compact_number(profit),
            None => MISSING_PRICE_MARKER.to_string(),
        };
        format!("💰 {money} | ⏱ {} ▸", format_duration_ms(self.duration_ms))
    }
}

pub struct TaskProfitDisplay {
    weak: Weak<Self>,
    initialized: AtomicBool,
    resources: FeatureResources,
    ctx: RwLock<Option<FeatureContext>>,
}

impl TaskProfitDisplay {
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

    /// Profit for a single execution of a production action.
    pub fn compute_for_action(&self, action_hrid: &ActionHrid) -> Option<TaskProfit> {
        let ctx = self.ctx()?;
        let detail = ctx.data.action_details(action_hrid)?;
        let client_data = ctx.data.init_client_data();
        let client_data = client_data.as_deref();
        let options = ItemPriceOptions {
            context: PriceContext::Profit,
            ..Default::default()
        };

        let mut has_missing_prices = false;
        let mut cost = 0.0;
        for input in &detail.input_items {
            match ctx.market.get_item_price(&input.item_hrid, &options, client_data) {
                Some(price) => cost += price * input.count,
                None => has_missing_prices = true,
            }
        }
        let mut revenue = 0.0;
        for output in &detail.output_items {
            match ctx.market.get_item_price(&output.item_hrid, &options, client_data) {
                Some(price) => revenue += price * output.count,
                None => has_missing_prices = true,
            }
        }

        Some(TaskProfit {
            revenue,
            cost,
            duration_ms: (detail.base_duration_seconds * 1000.0).max(0.0) as u64,
            has_missing_prices,
        })
    }

    /// Accumulate coins spent rerolling a task. Returns the running total
    /// for that task.
    pub async fn record_reroll_spend(&self, task_id: &str, coins: u64) -> u64 {
        let Some(ctx) = self.ctx() else {
            return 0;
        };
        let mut spending: HashMap<String, u64> = ctx
            .store
            .get_json(keys::KEY_TASK_REROLL_DATA, keys::REROLL_SPENDING)
            .await
            .unwrap_or_default();
        let entry = spending.entry(task_id.to_string()).or_insert(0);
        *entry += coins;
        let total = *entry;
        ctx.store
            .set_json_deferred(keys::KEY_TASK_REROLL_DATA, &spending, keys::REROLL_SPENDING);
        total
    }

    pub async fn reroll_spend(&self, task_id: &str) -> u64 {
        let Some(ctx) = self.ctx() else {
            return 0;
        };
        ctx.store
            .get_json::<HashMap<String, u64>>(keys::KEY_TASK_REROLL_DATA, keys::REROLL_SPENDING)
            .await
            .unwrap_or_default()
            .get(task_id)
            .copied()
            .unwrap_or(0)
    }

    fn annotate_card(&self, card_text: &str) {
        let Some(ctx) = self.ctx() else {
            return;
        };
        let Some(client_data) = ctx.data.init_client_data() else {
            return;
        };
        // Task cards carry the action's display name; resolve it back to
        // the action.
        let Some(action_hrid) = client_data
            .action_detail_map
            .values()
            .find(|detail| !detail.name.is_empty() && card_text.contains(&detail.name))
            .map(|detail| detail.hrid.clone())
        else {
            return;
        };
        if let Some(profit) = self.compute_for_action(&action_hrid) {
            ctx.overlay.inject(OVERLAY_CLASS, &profit.label());
        }
    }
}

#[async_trait]
impl Feature for TaskProfitDisplay {
    fn key(&self) -> &'static str {
        setting_keys::TASK_PROFIT_DISPLAY
    }

    fn name(&self) -> &'static str {
        "Task Profit Display"
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
            "task-profit",
            TASK_CARD_CLASS,
            Arc::new(move |node| {
                if let Some(display) = weak.upgrade() {
                    display.annotate_card(&node.text);
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
