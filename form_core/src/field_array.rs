use crate::config::FieldConfig;
use crate::form::Form;
use crate::path::FieldPath;
use crate::value::{EntryKey, GroupEntry, GroupRow};
use thiserror::Error;
use tracing::{debug, warn};

/// Why an append or remove was refused. The messages are shown to the user
/// as-is.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GuardError {
    #[error("At least one field is required")]
    LastEntryRequired,
    #[error("Please fill out the previous field completely before adding a new one")]
    IncompleteEntry,
    #[error("You can add at most {limit} entries")]
    LimitReached { limit: usize },
    #[error("There is no entry {index}, the list has {len}")]
    IndexOutOfRange { index: usize, len: usize },
}

/// Editing handle for one dynamic array of a [`Form`].
///
/// Entries are addressed by index for validation and payloads, but each one
/// carries an [`EntryKey`] that stays stable across removals.
pub struct FieldArray<'f> {
    form: &'f mut Form,
    name: String,
    config: Vec<FieldConfig>,
    limit: Option<usize>,
}

impl<'f> FieldArray<'f> {
    pub(crate) fn new(
        form: &'f mut Form,
        name: String,
        config: Vec<FieldConfig>,
        limit: Option<usize>,
    ) -> Self {
        FieldArray {
            form,
            name,
            config,
            limit,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &[FieldConfig] {
        &self.config
    }

    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    pub fn entries(&self) -> &[GroupEntry] {
        self.form.values.entries(&self.name)
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    fn path(&self) -> FieldPath {
        FieldPath::key(self.name.as_str())
    }

    fn empty_row(&self) -> GroupRow {
        self.config
            .iter()
            .map(|field| (field.group_key(), field.initial_value()))
            .collect()
    }

    fn is_complete(&self, entry: &GroupEntry) -> bool {
        self.config
            .iter()
            .filter(|field| field.gates_append())
            .all(|field| {
                entry
                    .get(&field.group_key())
                    .map_or(false, |value| !value.is_blank())
            })
    }

    fn is_blank(&self, entry: &GroupEntry) -> bool {
        let keys: Vec<String> = self.config.iter().map(FieldConfig::group_key).collect();
        entry.is_blank_for(keys.iter().map(String::as_str))
    }

    fn push_empty(&mut self) -> EntryKey {
        let key = self.form.keys.next_key();
        let row = self.empty_row();
        self.form
            .values
            .entries_mut(&self.name)
            .push(GroupEntry::new(key, row));
        key
    }

    fn append_guard(&self) -> Option<GuardError> {
        let entries = self.entries();
        if let Some(limit) = self.limit {
            if entries.len() >= limit {
                return Some(GuardError::LimitReached { limit });
            }
        }
        match entries.last() {
            Some(last) if !self.is_complete(last) => Some(GuardError::IncompleteEntry),
            _ => None,
        }
    }

    /// False while the last entry has a blank gating field or the limit is hit
    pub fn can_append(&self) -> bool {
        self.append_guard().is_none()
    }

    /// Add an entry, blank or prefilled from `row`
    pub fn append(&mut self, row: Option<GroupRow>) -> Result<EntryKey, GuardError> {
        if let Some(refused) = self.append_guard() {
            warn!(array = %self.name, reason = %refused, "append refused");
            return Err(refused);
        }
        let mut fields = self.empty_row();
        fields.extend(row.unwrap_or_default());
        let key = self.form.keys.next_key();
        self.form
            .values
            .entries_mut(&self.name)
            .push(GroupEntry::new(key, fields));
        debug!(array = %self.name, len = self.len(), "entry appended");
        Ok(key)
    }

    /// Remove entry `index`. A lone entry that is still blank cannot be
    /// removed; a lone filled entry is replaced by a blank one. Errors of
    /// later entries move down with them.
    pub fn remove(&mut self, index: usize) -> Result<GroupEntry, GuardError> {
        let len = self.len();
        if index >= len {
            return Err(GuardError::IndexOutOfRange { index, len });
        }
        if len == 1 && self.is_blank(&self.entries()[0]) {
            warn!(array = %self.name, "refused to remove the only entry");
            return Err(GuardError::LastEntryRequired);
        }

        let removed = self.form.values.entries_mut(&self.name).remove(index);
        let path = self.path();
        self.form.errors.shift_after_removal(&path, index);
        self.form.shift_removed_files(&path, index);
        if self.is_empty() {
            self.push_empty();
        }
        debug!(array = %self.name, index, "entry removed");
        Ok(removed)
    }

    /// Replace a lone empty bootstrap entry with persisted rows. Returns
    /// whether anything was loaded; user-entered data is never overwritten.
    pub fn hydrate(&mut self, rows: Vec<GroupRow>) -> bool {
        if rows.is_empty() {
            return false;
        }
        let replaceable = match self.entries() {
            [] => true,
            [only] => self.is_blank(only),
            _ => false,
        };
        if !replaceable {
            debug!(array = %self.name, "hydrate skipped, array already holds data");
            return false;
        }

        let empty = self.empty_row();
        let hydrated: Vec<GroupEntry> = rows
            .into_iter()
            .map(|row| {
                let mut fields = empty.clone();
                fields.extend(row);
                GroupEntry::new(self.form.keys.next_key(), fields)
            })
            .collect();
        debug!(array = %self.name, entries = hydrated.len(), "array hydrated");
        *self.form.values.entries_mut(&self.name) = hydrated;
        self.form.sync_baseline(&self.name);
        true
    }

    /// Seed one empty entry into an empty array. The seeded entry counts as
    /// the loaded state, not as an edit.
    pub fn ensure_bootstrap(&mut self) -> bool {
        if !self.is_empty() {
            return false;
        }
        self.push_empty();
        if self.form.baseline.entries(&self.name).is_empty() {
            self.form.sync_baseline(&self.name);
        }
        true
    }
}
