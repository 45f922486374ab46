//! The settings schema: every recognized key, its type, default, label,
//! and dependency clause. Feature code references keys through
//! [`setting_keys`]; unknown keys are rejected by the service.

use once_cell::sync::Lazy;

use toolasha_domain::{
    DependencyClause, SettingDef, SettingGroup, SettingType, SettingValue, TemplateFragment,
};

use super::colors;

pub mod setting_keys {
    // Colors
    pub const COLOR_ACCENT: &str = "color_accent";
    pub const COLOR_TEXT_PRIMARY: &str = "color_text_primary";
    pub const COLOR_MAIN: &str = "color_main";

    // Market
    pub const MARKET_DATA_URL: &str = "market_data_url";
    pub const PRICING_MODE_PROFIT: &str = "pricing_mode_profit";
    pub const PRICING_MODE_NETWORTH: &str = "pricing_mode_networth";

    // Feature toggles
    pub const TASK_PROFIT_DISPLAY: &str = "task_profit_display";
    pub const DUNGEON_TRACKER: &str = "dungeon_tracker";
    pub const DUNGEON_TRACKER_BACKFILL: &str = "dungeon_tracker_backfill";
    pub const ENHANCEMENT_TRACKER: &str = "enhancement_tracker";
    pub const COMBAT_STATS: &str = "combat_stats";
    pub const MARKET_LISTING_AGE: &str = "market_listing_age";
    pub const COMBAT_SIM_EXPORT: &str = "combat_sim_export";
    pub const MILKONOMY_EXPORT: &str = "milkonomy_export";
    pub const CHARACTER_SHEET_LINK: &str = "character_sheet_link";
    pub const TOOLTIP_GUARD: &str = "tooltip_guard";
    pub const PARTY_DPS_METER: &str = "party_dps_meter";

    // Dungeon tracker details
    pub const DUNGEON_COMPLETE_MESSAGE: &str = "dungeon_complete_message";

    // Exports
    pub const CHARACTER_SHEET_BASE_URL: &str = "character_sheet_base_url";
    pub const MILKONOMY_COLOR: &str = "milkonomy_color";
}

use setting_keys as k;

/// The full schema, grouped the way the settings panel renders it.
pub static SCHEMA: Lazy<Vec<SettingGroup>> = Lazy::new(|| {
    vec![
        SettingGroup {
            name: "Appearance".to_string(),
            settings: vec![
                SettingDef::color(k::COLOR_ACCENT, "Accent color", colors::DEFAULT_ACCENT),
                SettingDef::color(
                    k::COLOR_TEXT_PRIMARY,
                    "Primary text color",
                    colors::DEFAULT_TEXT_PRIMARY,
                ),
                SettingDef::color(k::COLOR_MAIN, "Script main color", colors::DEFAULT_MAIN),
            ],
        },
        SettingGroup {
            name: "Market".to_string(),
            settings: vec![
                SettingDef::text(k::MARKET_DATA_URL, "Market data URL", "")
                    .with_help("Leave empty to use the built-in endpoint"),
                SettingDef::select(
                    k::PRICING_MODE_PROFIT,
                    "Profit calculations use",
                    "ask",
                    &["ask", "bid"],
                ),
                SettingDef::select(
                    k::PRICING_MODE_NETWORTH,
                    "Networth calculations use",
                    "bid",
                    &["ask", "bid"],
                ),
            ],
        },
        SettingGroup {
            name: "Features".to_string(),
            settings: vec![
                SettingDef::checkbox(k::TASK_PROFIT_DISPLAY, "Task profit display", true),
                SettingDef::checkbox(k::DUNGEON_TRACKER, "Dungeon run tracker", true),
                SettingDef::checkbox(
                    k::DUNGEON_TRACKER_BACKFILL,
                    "Backfill runs from chat history",
                    true,
                )
                .with_dependencies(DependencyClause::all(vec![k::DUNGEON_TRACKER.to_string()])),
                SettingDef::checkbox(k::ENHANCEMENT_TRACKER, "Enhancement tracker", true),
                SettingDef::checkbox(k::COMBAT_STATS, "Combat statistics", true),
                SettingDef::checkbox(k::MARKET_LISTING_AGE, "Market listing age", true),
                SettingDef::checkbox(k::COMBAT_SIM_EXPORT, "Combat sim export", true),
                SettingDef::checkbox(k::MILKONOMY_EXPORT, "Milkonomy export", true),
                SettingDef::checkbox(k::CHARACTER_SHEET_LINK, "Character sheet link", true),
                SettingDef::checkbox(k::TOOLTIP_GUARD, "Tooltip cleanup", true),
                {
                    let mut def = SettingDef::checkbox(k::PARTY_DPS_METER, "Party DPS meter", false);
                    def.not_implemented = true;
                    def
                },
            ],
        },
        SettingGroup {
            name: "Dungeon Tracker".to_string(),
            settings: vec![SettingDef {
                key: k::DUNGEON_COMPLETE_MESSAGE.to_string(),
                setting_type: SettingType::Template,
                default: SettingValue::Template {
                    value: vec![
                        TemplateFragment::Text {
                            value: "Cleared ".to_string(),
                        },
                        TemplateFragment::Variable {
                            key: "dungeon".to_string(),
                            label: "Dungeon".to_string(),
                        },
                        TemplateFragment::Text {
                            value: " in ".to_string(),
                        },
                        TemplateFragment::Variable {
                            key: "time".to_string(),
                            label: "Clear time".to_string(),
                        },
                    ],
                },
                label: "Completion message".to_string(),
                help: None,
                dependencies: Some(DependencyClause::all(vec![k::DUNGEON_TRACKER.to_string()])),
                options: Vec::new(),
                not_implemented: false,
            }],
        },
        SettingGroup {
            name: "Exports".to_string(),
            settings: vec![
                SettingDef::text(
                    k::CHARACTER_SHEET_BASE_URL,
                    "Character sheet site",
                    "https://mwi-sheet.example",
                )
                .with_dependencies(DependencyClause::all(vec![
                    k::CHARACTER_SHEET_LINK.to_string()
                ])),
                SettingDef::color(k::MILKONOMY_COLOR, "Milkonomy profile color", "#546ddb")
                    .with_dependencies(DependencyClause::any(vec![
                        k::MILKONOMY_EXPORT.to_string()
                    ])),
            ],
        },
    ]
});

/// Look a definition up by key.
pub fn find_def(key: &str) -> Option<&'static SettingDef> {
    SCHEMA
        .iter()
        .flat_map(|group| group.settings.iter())
        .find(|def| def.key == key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_keys_are_unique() {
        let mut seen = std::collections::HashSet::new();
        for group in SCHEMA.iter() {
            for def in &group.settings {
                assert!(seen.insert(def.key.clone()), "duplicate key {}", def.key);
            }
        }
    }

    #[test]
    fn test_find_def() {
        assert!(find_def(setting_keys::DUNGEON_TRACKER).is_some());
        assert!(find_def("no_such_setting").is_none());
    }

    #[test]
    fn test_backfill_depends_on_tracker() {
        let def = find_def(setting_keys::DUNGEON_TRACKER_BACKFILL).expect("def");
        let deps = def.dependencies.as_ref().expect("deps");
        assert!(deps.is_satisfied(|key| key == setting_keys::DUNGEON_TRACKER));
        assert!(!deps.is_satisfied(|_| false));
    }
}
