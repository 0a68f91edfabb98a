use crate::path::FieldPath;
use crate::value::{FormValue, GroupRow};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

/// Input kinds a field can be rendered and validated as
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    #[default]
    Text,
    Textarea,
    Select,
    Password,
    File,
    Checkbox,
    Number,
    Email,
}

impl FieldKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldKind::Text => "text",
            FieldKind::Textarea => "textarea",
            FieldKind::Select => "select",
            FieldKind::Password => "password",
            FieldKind::File => "file",
            FieldKind::Checkbox => "checkbox",
            FieldKind::Number => "number",
            FieldKind::Email => "email",
        }
    }

    /// Value a fresh field of this kind starts with
    pub fn empty_value(&self) -> FormValue {
        match self {
            FieldKind::File => FormValue::Files(Vec::new()),
            FieldKind::Checkbox => FormValue::Bool(false),
            _ => FormValue::empty_text(),
        }
    }
}

/// One choice of a select field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectOption {
    pub label: String,
    pub value: String,
}

/// Static description of one input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldConfig {
    pub name: FieldPath,
    pub label: String,
    #[serde(default, alias = "type")]
    pub kind: FieldKind,
    /// `None` means "not stated": not enforced by validation, but still
    /// counted when gating dynamic-array appends.
    #[serde(default)]
    pub required: Option<bool>,
    #[serde(default)]
    pub min_length: Option<usize>,
    #[serde(default)]
    pub max_length: Option<usize>,
    #[serde(default)]
    pub max_value: Option<f64>,
    /// Mime pattern list, e.g. `image/*,.pdf`
    #[serde(default)]
    pub accept: Option<String>,
    #[serde(default)]
    pub multiple: bool,
    #[serde(default)]
    pub options: Vec<SelectOption>,
    #[serde(default)]
    pub class_name: Option<String>,
    #[serde(default)]
    pub read_only: bool,
    #[serde(default)]
    pub disabled: bool,
    #[serde(default)]
    pub default: Option<serde_json::Value>,
}

impl FieldConfig {
    pub fn new(name: impl Into<FieldPath>, label: impl Into<String>, kind: FieldKind) -> Self {
        FieldConfig {
            name: name.into(),
            label: label.into(),
            kind,
            required: None,
            min_length: None,
            max_length: None,
            max_value: None,
            accept: None,
            multiple: false,
            options: Vec::new(),
            class_name: None,
            read_only: false,
            disabled: false,
            default: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = Some(true);
        self
    }

    pub fn optional(mut self) -> Self {
        self.required = Some(false);
        self
    }

    pub fn min_length(mut self, min: usize) -> Self {
        self.min_length = Some(min);
        self
    }

    pub fn max_length(mut self, max: usize) -> Self {
        self.max_length = Some(max);
        self
    }

    pub fn max_value(mut self, max: f64) -> Self {
        self.max_value = Some(max);
        self
    }

    pub fn accept(mut self, pattern: impl Into<String>) -> Self {
        self.accept = Some(pattern.into());
        self
    }

    pub fn multiple(mut self) -> Self {
        self.multiple = true;
        self
    }

    pub fn with_options<'a>(mut self, options: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        self.options = options
            .into_iter()
            .map(|(label, value)| SelectOption {
                label: label.to_string(),
                value: value.to_string(),
            })
            .collect();
        self
    }

    /// Enforced by validation
    pub fn is_required(&self) -> bool {
        self.required == Some(true)
    }

    /// Counted when deciding whether a dynamic entry is complete
    pub fn gates_append(&self) -> bool {
        self.required != Some(false)
    }

    /// Name as a group-local key (dynamic group fields are flat)
    pub fn group_key(&self) -> String {
        self.name.to_string()
    }

    pub fn option_values(&self) -> Vec<&str> {
        self.options.iter().map(|o| o.value.as_str()).collect()
    }

    /// The configured default, or the kind's empty value
    pub fn initial_value(&self) -> FormValue {
        match &self.default {
            Some(default) => FormValue::from_json(default),
            None => self.kind.empty_value(),
        }
    }
}

/// One tab of a tabbed form
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabConfig {
    pub id: u32,
    pub label: String,
    #[serde(default)]
    pub fields: Vec<FieldConfig>,
    #[serde(default)]
    pub is_dynamic: bool,
    #[serde(default)]
    pub dynamic_field_name: Option<String>,
    #[serde(default)]
    pub dynamic_field_config: Vec<FieldConfig>,
    #[serde(default)]
    pub dynamic_field_limit: Option<usize>,
}

impl TabConfig {
    pub fn new(id: u32, label: impl Into<String>, fields: Vec<FieldConfig>) -> Self {
        TabConfig {
            id,
            label: label.into(),
            fields,
            is_dynamic: false,
            dynamic_field_name: None,
            dynamic_field_config: Vec::new(),
            dynamic_field_limit: None,
        }
    }

    pub fn with_dynamic(
        mut self,
        name: impl Into<String>,
        config: Vec<FieldConfig>,
        limit: Option<usize>,
    ) -> Self {
        self.is_dynamic = true;
        self.dynamic_field_name = Some(name.into());
        self.dynamic_field_config = config;
        self.dynamic_field_limit = limit;
        self
    }

    /// The dynamic section, when this tab is dynamic and fully configured
    pub fn dynamic(&self) -> Option<DynamicConfig<'_>> {
        if !self.is_dynamic || self.dynamic_field_config.is_empty() {
            return None;
        }
        let name = self.dynamic_field_name.as_deref()?;
        Some(DynamicConfig {
            name,
            config: &self.dynamic_field_config,
            limit: self.dynamic_field_limit,
        })
    }
}

/// Borrowed view of a tab's dynamic array configuration
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DynamicConfig<'a> {
    pub name: &'a str,
    pub config: &'a [FieldConfig],
    pub limit: Option<usize>,
}

impl DynamicConfig<'_> {
    pub fn path(&self) -> FieldPath {
        FieldPath::key(self.name)
    }

    pub fn field(&self, key: &str) -> Option<&FieldConfig> {
        self.config.iter().find(|f| f.group_key() == key)
    }

    /// A fresh entry: every group field at its initial value
    pub fn empty_row(&self) -> GroupRow {
        self.config
            .iter()
            .map(|field| (field.group_key(), field.initial_value()))
            .collect()
    }

    pub fn keys(&self) -> impl Iterator<Item = String> + '_ {
        self.config.iter().map(FieldConfig::group_key)
    }
}

/// Complete description of one management form
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormSchema {
    pub name: String,
    #[serde(default)]
    pub title: String,
    /// Used when no tabs are configured
    #[serde(default)]
    pub fields: Vec<FieldConfig>,
    #[serde(default)]
    pub tabs: Vec<TabConfig>,
}

impl FormSchema {
    pub fn flat(name: impl Into<String>, fields: Vec<FieldConfig>) -> Self {
        let name = name.into();
        FormSchema {
            title: name.clone(),
            name,
            fields,
            tabs: Vec::new(),
        }
    }

    pub fn tabbed(name: impl Into<String>, tabs: Vec<TabConfig>) -> Self {
        let name = name.into();
        FormSchema {
            title: name.clone(),
            name,
            fields: Vec::new(),
            tabs,
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    pub fn is_tabbed(&self) -> bool {
        !self.tabs.is_empty()
    }

    pub fn tab(&self, id: u32) -> Option<&TabConfig> {
        self.tabs.iter().find(|t| t.id == id)
    }

    /// Every plain field across all tabs (or the flat field list)
    pub fn all_fields(&self) -> impl Iterator<Item = &FieldConfig> {
        self.fields
            .iter()
            .chain(self.tabs.iter().flat_map(|t| t.fields.iter()))
    }

    pub fn dynamic_sections(&self) -> impl Iterator<Item = DynamicConfig<'_>> {
        self.tabs.iter().filter_map(TabConfig::dynamic)
    }

    pub fn dynamic_section(&self, name: &str) -> Option<DynamicConfig<'_>> {
        self.dynamic_sections().find(|d| d.name == name)
    }

    /// Config of the field stored at `path`, in any tab. Dynamic entries
    /// resolve through their section: `features[2][title]` finds `title`.
    pub fn field_at(&self, path: &FieldPath) -> Option<&FieldConfig> {
        if let Some(field) = self.all_fields().find(|f| &f.name == path) {
            return Some(field);
        }
        self.dynamic_sections().find_map(|section| {
            let array = section.path();
            let index = path.index_after(&array)?;
            let rest = path.strip_prefix(&array.at(index))?;
            section.config.iter().find(|f| f.name == rest)
        })
    }

    /// Configuration faults that must stop a form from mounting
    pub fn check(&self) -> Result<(), SchemaError> {
        check_field_set(&self.fields, "form")?;

        let mut tab_ids = HashSet::new();
        for tab in &self.tabs {
            if tab.id == 0 {
                return Err(SchemaError::InvalidTabId { tab: tab.id });
            }
            if !tab_ids.insert(tab.id) {
                return Err(SchemaError::DuplicateTab { tab: tab.id });
            }

            let scope = format!("tab {}", tab.id);
            check_field_set(&tab.fields, &scope)?;

            if tab.is_dynamic {
                let name = match tab.dynamic_field_name.as_deref() {
                    Some(name) if !name.trim().is_empty() => name,
                    _ => return Err(SchemaError::MissingDynamicConfig { tab: tab.id }),
                };
                if tab.dynamic_field_config.is_empty() {
                    return Err(SchemaError::MissingDynamicConfig { tab: tab.id });
                }
                if FieldPath::parse(name) != FieldPath::key(name) {
                    return Err(SchemaError::InvalidDynamicName {
                        tab: tab.id,
                        name: name.to_string(),
                    });
                }
                if tab.fields.iter().any(|f| f.name.first_key() == Some(name)) {
                    return Err(SchemaError::DuplicateField {
                        scope,
                        name: FieldPath::key(name),
                    });
                }
                if tab.dynamic_field_limit == Some(0) {
                    return Err(SchemaError::ZeroDynamicLimit { tab: tab.id });
                }
                let group_scope = format!("{} group `{}`", scope, name);
                check_field_set(&tab.dynamic_field_config, &group_scope)?;
                if let Some(nested) = tab.dynamic_field_config.iter().find(|f| f.name.len() != 1) {
                    return Err(SchemaError::InvalidFieldName {
                        scope: group_scope,
                        name: nested.name.to_string(),
                    });
                }
            }
        }

        Ok(())
    }
}

fn check_field_set(fields: &[FieldConfig], scope: &str) -> Result<(), SchemaError> {
    let mut seen = HashSet::new();
    for field in fields {
        if field.name.first_key().map_or(true, |key| key.trim().is_empty()) {
            return Err(SchemaError::InvalidFieldName {
                scope: scope.to_string(),
                name: field.name.to_string(),
            });
        }
        if !seen.insert(&field.name) {
            return Err(SchemaError::DuplicateField {
                scope: scope.to_string(),
                name: field.name.clone(),
            });
        }
    }
    Ok(())
}

/// Configuration faults, reported when a form is created
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("duplicate field `{name}` in {scope}")]
    DuplicateField { scope: String, name: FieldPath },
    #[error("invalid field name `{name}` in {scope}")]
    InvalidFieldName { scope: String, name: String },
    #[error("tab {tab} is dynamic but has no dynamic field name or group fields")]
    MissingDynamicConfig { tab: u32 },
    #[error("tab {tab}: dynamic field name `{name}` must be a single plain key")]
    InvalidDynamicName { tab: u32, name: String },
    #[error("tab {tab}: dynamic field limit must be at least 1")]
    ZeroDynamicLimit { tab: u32 },
    #[error("tab id {tab} is invalid, ids start at 1")]
    InvalidTabId { tab: u32 },
    #[error("tab id {tab} is used twice")]
    DuplicateTab { tab: u32 },
}
