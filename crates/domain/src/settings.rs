//! Settings value model.
//!
//! Settings are schema-defined (the schema itself lives with the client)
//! and persisted per character. A setting is either a toggle, a scalar
//! (text/number/color/select/slider), or a template: a fragment list whose
//! `variable` fragments are substituted at use time from a caller-supplied
//! map.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SettingType {
    Checkbox,
    Text,
    Number,
    Color,
    Select,
    Slider,
    Template,
}

/// Scalar payload for text/number/color/select/slider settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScalarValue {
    Number(f64),
    Text(String),
}

impl ScalarValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Number(_) => None,
            Self::Text(s) => Some(s),
        }
    }
}

/// One fragment of a template setting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TemplateFragment {
    Text { value: String },
    Variable { key: String, label: String },
}

/// A stored setting value.
///
/// The untagged representation matches the persisted document shape:
/// toggles are `{"isTrue": ...}`, templates are `{"value": [fragments]}`,
/// scalars are `{"value": ...}`. Template must be tried before Scalar so a
/// fragment array is not swallowed by the scalar arm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SettingValue {
    Toggle {
        #[serde(rename = "isTrue")]
        is_true: bool,
    },
    Template {
        value: Vec<TemplateFragment>,
    },
    Scalar {
        value: ScalarValue,
    },
}

impl SettingValue {
    pub fn toggle(is_true: bool) -> Self {
        Self::Toggle { is_true }
    }

    pub fn number(value: f64) -> Self {
        Self::Scalar {
            value: ScalarValue::Number(value),
        }
    }

    pub fn text(value: impl Into<String>) -> Self {
        Self::Scalar {
            value: ScalarValue::Text(value.into()),
        }
    }

    pub fn is_true(&self) -> bool {
        matches!(self, Self::Toggle { is_true: true })
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Scalar { value } => value.as_f64(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Scalar { value } => value.as_str(),
            _ => None,
        }
    }

    pub fn as_template(&self) -> Option<&[TemplateFragment]> {
        match self {
            Self::Template { value } => Some(value),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DependencyMode {
    #[default]
    All,
    Any,
}

/// Dependency clause: the setting is active only when the referenced
/// toggles satisfy the mode.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyClause {
    pub mode: DependencyMode,
    pub settings: Vec<String>,
}

impl DependencyClause {
    pub fn all(settings: Vec<String>) -> Self {
        Self {
            mode: DependencyMode::All,
            settings,
        }
    }

    pub fn any(settings: Vec<String>) -> Self {
        Self {
            mode: DependencyMode::Any,
            settings,
        }
    }

    /// Evaluate against a lookup of toggle states.
    pub fn is_satisfied(&self, lookup: impl Fn(&str) -> bool) -> bool {
        match self.mode {
            DependencyMode::All => self.settings.iter().all(|key| lookup(key)),
            DependencyMode::Any => self.settings.iter().any(|key| lookup(key)),
        }
    }
}

/// Schema entry for one recognized setting key.
#[derive(Debug, Clone, PartialEq)]
pub struct SettingDef {
    pub key: String,
    pub setting_type: SettingType,
    pub default: SettingValue,
    pub label: String,
    pub help: Option<String>,
    pub dependencies: Option<DependencyClause>,
    pub options: Vec<String>,
    pub not_implemented: bool,
}

impl SettingDef {
    pub fn checkbox(key: &str, label: &str, default: bool) -> Self {
        Self {
            key: key.to_string(),
            setting_type: SettingType::Checkbox,
            default: SettingValue::toggle(default),
            label: label.to_string(),
            help: None,
            dependencies: None,
            options: Vec::new(),
            not_implemented: false,
        }
    }

    pub fn color(key: &str, label: &str, default: &str) -> Self {
        Self {
            key: key.to_string(),
            setting_type: SettingType::Color,
            default: SettingValue::text(default),
            label: label.to_string(),
            help: None,
            dependencies: None,
            options: Vec::new(),
            not_implemented: false,
        }
    }

    pub fn text(key: &str, label: &str, default: &str) -> Self {
        Self {
            key: key.to_string(),
            setting_type: SettingType::Text,
            default: SettingValue::text(default),
            label: label.to_string(),
            help: None,
            dependencies: None,
            options: Vec::new(),
            not_implemented: false,
        }
    }

    pub fn number(key: &str, label: &str, default: f64) -> Self {
        Self {
            key: key.to_string(),
            setting_type: SettingType::Number,
            default: SettingValue::number(default),
            label: label.to_string(),
            help: None,
            dependencies: None,
            options: Vec::new(),
            not_implemented: false,
        }
    }

    pub fn select(key: &str, label: &str, default: &str, options: &[&str]) -> Self {
        Self {
            key: key.to_string(),
            setting_type: SettingType::Select,
            default: SettingValue::text(default),
            label: label.to_string(),
            help: None,
            dependencies: None,
            options: options.iter().map(|s| s.to_string()).collect(),
            not_implemented: false,
        }
    }

    pub fn with_dependencies(mut self, clause: DependencyClause) -> Self {
        self.dependencies = Some(clause);
        self
    }

    pub fn with_help(mut self, help: &str) -> Self {
        self.help = Some(help.to_string());
        self
    }
}

/// A named group of setting definitions.
#[derive(Debug, Clone, PartialEq)]
pub struct SettingGroup {
    pub name: String,
    pub settings: Vec<SettingDef>,
}

/// Render a template by substituting `variable` fragments from the
/// supplied map. Unknown variables render as their key.
pub fn render_template(fragments: &[TemplateFragment], vars: &HashMap<String, String>) -> String {
    let mut out = String::new();
    for fragment in fragments {
        match fragment {
            TemplateFragment::Text { value } => out.push_str(value),
            TemplateFragment::Variable { key, .. } => match vars.get(key) {
                Some(value) => out.push_str(value),
                None => out.push_str(key),
            },
        }
    }
    out
}
