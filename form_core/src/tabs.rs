use crate::config::{DynamicConfig, FieldConfig, FormSchema, TabConfig};
use crate::form::FormError;
use std::sync::Arc;

/// Tracks which tab of a form is active and which fields it shows.
///
/// A schema without tabs behaves as one implicit tab: selection is a no-op
/// and the flat field list is always active.
#[derive(Debug, Clone)]
pub struct TabRouter {
    schema: Arc<FormSchema>,
    active: Option<u32>,
}

impl TabRouter {
    pub fn new(schema: Arc<FormSchema>) -> Self {
        let active = schema.tabs.first().map(|t| t.id);
        TabRouter { schema, active }
    }

    /// Back to the first tab
    pub fn reset(&mut self) {
        self.active = self.schema.tabs.first().map(|t| t.id);
    }

    pub fn tabs(&self) -> &[TabConfig] {
        &self.schema.tabs
    }

    pub fn active_tab_id(&self) -> Option<u32> {
        self.active
    }

    pub fn active_tab(&self) -> Option<&TabConfig> {
        self.active.and_then(|id| self.schema.tab(id))
    }

    /// Switch to tab `id`. Returns `false` when the form has no tabs and
    /// nothing changed.
    pub fn select(&mut self, id: u32) -> Result<bool, FormError> {
        if !self.schema.is_tabbed() {
            return Ok(false);
        }
        if self.schema.tab(id).is_none() {
            return Err(FormError::UnknownTab { tab: id });
        }
        self.active = Some(id);
        Ok(true)
    }

    /// The tab `offset` positions away from the active one, wrapping around
    pub fn neighbor(&self, offset: isize) -> Option<u32> {
        let tabs = &self.schema.tabs;
        if tabs.is_empty() {
            return None;
        }
        let current = tabs
            .iter()
            .position(|t| Some(t.id) == self.active)
            .unwrap_or(0) as isize;
        let len = tabs.len() as isize;
        let next = (current + offset).rem_euclid(len) as usize;
        Some(tabs[next].id)
    }

    pub fn active_field_set(&self) -> &[FieldConfig] {
        match self.active_tab() {
            Some(tab) => &tab.fields,
            None => &self.schema.fields,
        }
    }

    pub fn active_dynamic_config(&self) -> Option<DynamicConfig<'_>> {
        self.active_tab().and_then(TabConfig::dynamic)
    }
}
