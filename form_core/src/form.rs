use crate::config::{DynamicConfig, FieldConfig, FieldKind, FormSchema, SchemaError};
use crate::field_array::FieldArray;
use crate::files::{FileDiff, FileFieldState};
use crate::path::{FieldPath, PathSegment};
use crate::payload::{build_payload, Payload};
use crate::tabs::TabRouter;
use crate::validation::{validate, validate_field, Failure, ValidationErrors};
use crate::value::{
    EntryKeys, FileItem, FileRef, FormValue, FormValues, GroupEntry, GroupRow, ValueError,
};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormError {
    #[error("form has no tab with id {tab}")]
    UnknownTab { tab: u32 },
    #[error("form has no dynamic field named `{name}`")]
    UnknownArray { name: String },
    #[error(transparent)]
    Value(#[from] ValueError),
}

/// Where a form is in its submit cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitState {
    Idle,
    Submitting,
}

/// A validated snapshot handed to the submit handler
#[derive(Debug, Clone)]
pub struct Submission {
    id: u64,
    values: FormValues,
    payload: Payload,
}

impl Submission {
    pub fn values(&self) -> &FormValues {
        &self.values
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }
}

/// Result of the validation half of a submit
#[derive(Debug)]
pub enum SubmitStart {
    Ready(Submission),
    Invalid(Vec<Failure>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    Submitted,
    Invalid(Vec<Failure>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("a submit is already in progress")]
pub struct SubmitInProgress;

#[derive(Debug, Error)]
pub enum SubmitError<E> {
    #[error(transparent)]
    InProgress(#[from] SubmitInProgress),
    #[error("submit handler failed: {0}")]
    Rejected(E),
}

/// A user edit as reported by the presentation layer
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub name: FieldPath,
    pub value: FormValue,
    /// Urls of stored files the user removed with this edit
    pub removed_files: Vec<String>,
}

impl ChangeEvent {
    pub fn new(name: impl Into<FieldPath>, value: FormValue) -> Self {
        ChangeEvent {
            name: name.into(),
            value,
            removed_files: Vec::new(),
        }
    }

    pub fn with_removed(mut self, urls: impl IntoIterator<Item = String>) -> Self {
        self.removed_files.extend(urls);
        self
    }
}

pub type ChangeHandler = Box<dyn FnMut(&mut Form, ChangeEvent) -> Result<(), ValueError>>;

/// State of one mounted form: values, errors, active tab, dynamic arrays and
/// the submit cycle.
pub struct Form {
    pub(crate) schema: Arc<FormSchema>,
    pub(crate) router: TabRouter,
    pub(crate) values: FormValues,
    pub(crate) baseline: FormValues,
    pub(crate) errors: ValidationErrors,
    pub(crate) removed_files: BTreeMap<FieldPath, Vec<String>>,
    pub(crate) keys: EntryKeys,
    handlers: HashMap<FieldPath, ChangeHandler>,
    pending: Option<u64>,
    submissions: u64,
}

impl fmt::Debug for Form {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Form")
            .field("schema", &self.schema.name)
            .field("active_tab", &self.router.active_tab_id())
            .field("values", &self.values)
            .field("errors", &self.errors)
            .field("removed_files", &self.removed_files)
            .field("handlers", &self.handlers.keys().collect::<Vec<_>>())
            .field("pending", &self.pending)
            .finish()
    }
}

impl Form {
    /// Mount a form for `schema`, failing fast on configuration faults
    pub fn new(schema: FormSchema) -> Result<Self, SchemaError> {
        Self::from_shared(Arc::new(schema))
    }

    pub fn from_shared(schema: Arc<FormSchema>) -> Result<Self, SchemaError> {
        schema.check()?;
        let mut form = Form {
            router: TabRouter::new(Arc::clone(&schema)),
            schema,
            values: FormValues::new(),
            baseline: FormValues::new(),
            errors: ValidationErrors::new(),
            removed_files: BTreeMap::new(),
            keys: EntryKeys::default(),
            handlers: HashMap::new(),
            pending: None,
            submissions: 0,
        };
        let defaults = default_values(&form.schema);
        form.initialize(defaults);
        Ok(form)
    }

    pub fn schema(&self) -> &FormSchema {
        &self.schema
    }

    /// Reset values, errors, active tab and submit state. Safe to call again
    /// when fetched data arrives after a first mount.
    pub fn initialize(&mut self, defaults: FormValues) {
        self.values = defaults;
        self.errors.clear();
        self.removed_files.clear();
        self.router.reset();
        self.pending = None;

        let schema = Arc::clone(&self.schema);
        for section in schema.dynamic_sections() {
            self.normalize_array(section);
        }
        if let Some(mut array) = self.active_field_array() {
            array.ensure_bootstrap();
        }

        self.baseline = self.values.clone();
        debug!(form = %self.schema.name, tab = ?self.router.active_tab_id(), "form initialized");
    }

    /// Turn a plain list of row maps into keyed entries
    fn normalize_array(&mut self, section: DynamicConfig<'_>) {
        let entries = match self.values.remove(section.name) {
            None | Some(FormValue::Null) => return,
            Some(FormValue::Entries(entries)) => entries,
            Some(FormValue::List(rows)) => rows
                .into_iter()
                .filter_map(|row| match row {
                    FormValue::Map(fields) => {
                        Some(GroupEntry::new(self.keys.next_key(), fields))
                    }
                    _ => None,
                })
                .collect(),
            Some(other) => {
                warn!(
                    form = %self.schema.name,
                    array = section.name,
                    found = other.type_name(),
                    "dropping non-list value seeded into a dynamic field"
                );
                Vec::new()
            }
        };
        *self.values.entries_mut(section.name) = entries;
    }

    pub fn values(&self) -> &FormValues {
        &self.values
    }

    pub fn get_value(&self, path: &FieldPath) -> Option<&FormValue> {
        self.values.get(path)
    }

    /// Write without validating
    pub fn set_value(&mut self, path: &FieldPath, value: FormValue) -> Result<(), ValueError> {
        self.values.set(path, value)
    }

    /// Write, then re-validate just this field
    pub fn set_value_validated(
        &mut self,
        path: &FieldPath,
        value: FormValue,
    ) -> Result<Option<Failure>, ValueError> {
        self.values.set(path, value)?;
        Ok(self.revalidate(path))
    }

    /// Validate the active field at `path` alone, setting or clearing its
    /// error
    pub fn revalidate(&mut self, path: &FieldPath) -> Option<Failure> {
        let field = self.field_for_path(path)?;
        let failure = validate_field(
            &field,
            path,
            self.values.get(path),
            self.removed_files_for(path),
        );
        match &failure {
            Some(failure) => self.errors.insert(path.clone(), failure.message.clone()),
            None => {
                self.errors.remove(path);
            }
        }
        failure
    }

    /// Config of the active field (plain or dynamic-group) living at `path`
    pub fn field_for_path(&self, path: &FieldPath) -> Option<FieldConfig> {
        if let Some(field) = self.router.active_field_set().iter().find(|f| &f.name == path) {
            return Some(field.clone());
        }
        let section = self.router.active_dynamic_config()?;
        let array = section.path();
        let index = path.index_after(&array)?;
        let rest = path.strip_prefix(&array.at(index))?;
        section.config.iter().find(|f| f.name == rest).cloned()
    }

    pub fn errors(&self) -> &ValidationErrors {
        &self.errors
    }

    pub fn error(&self, path: &FieldPath) -> Option<&str> {
        self.errors.get(path)
    }

    pub fn set_error(&mut self, path: FieldPath, message: impl Into<String>) {
        self.errors.insert(path, message);
    }

    pub fn clear_error(&mut self, path: &FieldPath) {
        self.errors.remove(path);
    }

    pub fn clear_all_errors(&mut self) {
        self.errors.clear();
    }

    pub fn router(&self) -> &TabRouter {
        &self.router
    }

    pub fn active_tab_id(&self) -> Option<u32> {
        self.router.active_tab_id()
    }

    /// Switch tabs. Errors belong to the tab that produced them, so every
    /// switch clears them.
    pub fn select_tab(&mut self, id: u32) -> Result<(), FormError> {
        if !self.router.select(id)? {
            return Ok(());
        }
        self.errors.clear();
        if let Some(mut array) = self.active_field_array() {
            array.ensure_bootstrap();
        }
        debug!(form = %self.schema.name, tab = id, "tab selected");
        Ok(())
    }

    pub fn active_field_set(&self) -> &[FieldConfig] {
        self.router.active_field_set()
    }

    pub fn active_dynamic_config(&self) -> Option<DynamicConfig<'_>> {
        self.router.active_dynamic_config()
    }

    /// The dynamic array `name`, wherever its tab is
    pub fn field_array(&mut self, name: &str) -> Result<FieldArray<'_>, FormError> {
        let schema = Arc::clone(&self.schema);
        let section = schema
            .dynamic_section(name)
            .ok_or_else(|| FormError::UnknownArray {
                name: name.to_string(),
            })?;
        Ok(FieldArray::new(
            self,
            section.name.to_string(),
            section.config.to_vec(),
            section.limit,
        ))
    }

    /// The dynamic array of the active tab, if it has one
    pub fn active_field_array(&mut self) -> Option<FieldArray<'_>> {
        let name = self.router.active_dynamic_config()?.name.to_string();
        self.field_array(&name).ok()
    }

    pub(crate) fn sync_baseline(&mut self, name: &str) {
        let entries = self.values.entries(name).to_vec();
        *self.baseline.entries_mut(name) = entries;
    }

    /// Whether anything changed since the last initialize or successful submit
    pub fn is_dirty(&self) -> bool {
        self.values != self.baseline
    }

    fn removed_files_for(&self, path: &FieldPath) -> &[String] {
        self.removed_files.get(path).map_or(&[], Vec::as_slice)
    }

    pub fn removed_files(&self, path: &FieldPath) -> &[String] {
        self.removed_files_for(path)
    }

    /// Add urls to a file field's removal side-channel
    pub fn record_removed_files(&mut self, path: &FieldPath, urls: impl IntoIterator<Item = String>) {
        let removed = self.removed_files.entry(path.clone()).or_default();
        for url in urls {
            if !removed.contains(&url) {
                removed.push(url);
            }
        }
    }

    pub(crate) fn shift_removed_files(&mut self, array: &FieldPath, removed: usize) {
        let position = array.len();
        let previous = std::mem::take(&mut self.removed_files);
        for (path, urls) in previous {
            match path.index_after(array) {
                Some(index) if index == removed => {}
                Some(index) if index > removed => {
                    self.removed_files
                        .insert(path.with_index_at(position, index - 1), urls);
                }
                _ => {
                    self.removed_files.insert(path, urls);
                }
            }
        }
    }

    pub fn file_state(&self, path: &FieldPath) -> FileFieldState {
        let items = self
            .values
            .get(path)
            .and_then(FormValue::as_files)
            .unwrap_or(&[]);
        FileFieldState::from_items(items, self.removed_files_for(path))
    }

    pub fn file_diff(&self, path: &FieldPath) -> FileDiff {
        self.file_state(path).into_diff()
    }

    /// Route changes of `name` through `handler` instead of the default write
    pub fn register_change_handler<F>(&mut self, name: impl Into<FieldPath>, handler: F)
    where
        F: FnMut(&mut Form, ChangeEvent) -> Result<(), ValueError> + 'static,
    {
        self.handlers.insert(name.into(), Box::new(handler));
    }

    /// Apply a user edit: the field's registered handler if any, else a plain
    /// write plus the removal side-channel
    pub fn notify_change(&mut self, event: ChangeEvent) -> Result<(), ValueError> {
        if let Some(mut handler) = self.handlers.remove(&event.name) {
            let name = event.name.clone();
            let result = handler(self, event);
            self.handlers.entry(name).or_insert(handler);
            return result;
        }
        self.values.set(&event.name, event.value)?;
        if !event.removed_files.is_empty() {
            self.record_removed_files(&event.name, event.removed_files);
        }
        Ok(())
    }

    /// Failures of the active field set and the active dynamic array
    pub fn validate_active(&self) -> Vec<Failure> {
        let mut results = Vec::new();
        for field in self.router.active_field_set() {
            results.push(validate_field(
                field,
                &field.name,
                self.values.get(&field.name),
                self.removed_files_for(&field.name),
            ));
        }

        if let Some(section) = self.router.active_dynamic_config() {
            let array = section.path();
            for (index, entry) in self.values.entries(section.name).iter().enumerate() {
                for field in section.config {
                    let path = array.at(index).join(&field.name);
                    results.push(validate_field(
                        field,
                        &path,
                        entry.get(&field.group_key()),
                        self.removed_files_for(&path),
                    ));
                }
            }
        }

        validate(results)
    }

    /// Run validation and replace the stored errors with its result
    pub fn validate(&mut self) -> Vec<Failure> {
        let failures = self.validate_active();
        self.errors.clear();
        self.errors.extend_failures(&failures);
        failures
    }

    pub fn submit_state(&self) -> SubmitState {
        if self.pending.is_some() {
            SubmitState::Submitting
        } else {
            SubmitState::Idle
        }
    }

    /// Validate and, when clean, enter the submitting state. The returned
    /// submission must be handed back to [`Form::finish_submit`].
    pub fn begin_submit(&mut self) -> Result<SubmitStart, SubmitInProgress> {
        if self.pending.is_some() {
            warn!(form = %self.schema.name, "submit ignored, one is already pending");
            return Err(SubmitInProgress);
        }

        let failures = self.validate();
        if !failures.is_empty() {
            debug!(form = %self.schema.name, failures = failures.len(), "submit blocked by validation");
            return Ok(SubmitStart::Invalid(failures));
        }

        self.submissions += 1;
        self.pending = Some(self.submissions);
        Ok(SubmitStart::Ready(Submission {
            id: self.submissions,
            values: self.values.clone(),
            payload: build_payload(self),
        }))
    }

    /// Leave the submitting state. A submission from before the last
    /// initialize is ignored.
    pub fn finish_submit(&mut self, submission: Submission, saved: bool) {
        if self.pending != Some(submission.id) {
            debug!(form = %self.schema.name, "stale submission finished");
            return;
        }
        self.pending = None;
        if saved {
            self.baseline = submission.values;
        }
    }

    /// Validate, then hand the submission to `on_valid`. Its error is relayed
    /// untouched.
    pub fn submit<F, E>(&mut self, on_valid: F) -> Result<SubmitOutcome, SubmitError<E>>
    where
        F: FnOnce(&Submission) -> Result<(), E>,
    {
        let submission = match self.begin_submit()? {
            SubmitStart::Ready(submission) => submission,
            SubmitStart::Invalid(failures) => return Ok(SubmitOutcome::Invalid(failures)),
        };

        let result = on_valid(&submission);
        let saved = result.is_ok();
        self.finish_submit(submission, saved);

        match result {
            Ok(()) => Ok(SubmitOutcome::Submitted),
            Err(err) => {
                warn!(form = %self.schema.name, "submit handler rejected the submission");
                Err(SubmitError::Rejected(err))
            }
        }
    }
}

/// Add-mode values: every plain field at its default
pub fn default_values(schema: &FormSchema) -> FormValues {
    let mut values = FormValues::new();
    for field in schema.all_fields() {
        if let Err(err) = values.set(&field.name, field.initial_value()) {
            debug!(field = %field.name, %err, "default skipped");
        }
    }
    values
}

/// Values and persisted dynamic rows extracted from a fetched entity
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntitySeed {
    pub values: FormValues,
    pub groups: Vec<(String, Vec<GroupRow>)>,
}

impl EntitySeed {
    /// Initialize `form` and hydrate each dynamic array once
    pub fn apply(self, form: &mut Form) {
        form.initialize(self.values);
        for (name, rows) in self.groups {
            if let Ok(mut array) = form.field_array(&name) {
                array.hydrate(rows);
            }
        }
    }
}

/// Edit-mode values, converted field by field according to the schema
pub fn seed_from_entity(entity: &Value, schema: &FormSchema) -> EntitySeed {
    let mut values = default_values(schema);
    for field in schema.all_fields() {
        let Some(raw) = json_lookup(entity, &field.name) else {
            continue;
        };
        if let Err(err) = values.set(&field.name, convert_json(field, raw)) {
            debug!(field = %field.name, %err, "entity value skipped");
        }
    }

    let groups = schema
        .dynamic_sections()
        .filter_map(|section| {
            let rows = entity.get(section.name)?.as_array()?;
            let rows = rows
                .iter()
                .filter_map(Value::as_object)
                .map(|object| {
                    section
                        .config
                        .iter()
                        .map(|field| {
                            let key = field.group_key();
                            let value = object
                                .get(&key)
                                .map_or_else(|| field.initial_value(), |raw| convert_json(field, raw));
                            (key, value)
                        })
                        .collect::<GroupRow>()
                })
                .collect::<Vec<_>>();
            Some((section.name.to_string(), rows))
        })
        .collect();

    EntitySeed { values, groups }
}

fn json_lookup<'a>(value: &'a Value, path: &FieldPath) -> Option<&'a Value> {
    path.segments()
        .iter()
        .try_fold(value, |current, segment| match (current, segment) {
            (Value::Object(map), PathSegment::Key(key)) => map.get(key),
            (Value::Object(map), PathSegment::Index(index)) => map.get(&index.to_string()),
            (Value::Array(items), PathSegment::Index(index)) => items.get(*index),
            _ => None,
        })
}

pub(crate) fn convert_json(field: &FieldConfig, raw: &Value) -> FormValue {
    match field.kind {
        FieldKind::File => {
            let refs: Vec<FileItem> = match raw {
                Value::Array(items) => items
                    .iter()
                    .filter_map(FileRef::from_json)
                    .map(FileItem::Existing)
                    .collect(),
                other => FileRef::from_json(other)
                    .map(FileItem::Existing)
                    .into_iter()
                    .collect(),
            };
            FormValue::Files(refs)
        }
        FieldKind::Number => match raw {
            Value::Number(n) => n.as_f64().map_or(FormValue::empty_text(), FormValue::Number),
            Value::String(s) => s
                .trim()
                .parse::<f64>()
                .map_or_else(|_| FormValue::Text(s.clone()), FormValue::Number),
            _ => FormValue::empty_text(),
        },
        FieldKind::Checkbox => match raw {
            Value::Bool(b) => FormValue::Bool(*b),
            Value::String(s) => FormValue::Bool(matches!(s.trim(), "true" | "1" | "on" | "yes")),
            Value::Number(n) => FormValue::Bool(n.as_f64().map_or(false, |n| n != 0.0)),
            _ => FormValue::Bool(false),
        },
        _ => match raw {
            Value::Null => FormValue::empty_text(),
            Value::String(s) => FormValue::Text(s.clone()),
            Value::Number(n) => FormValue::Text(n.to_string()),
            Value::Bool(b) => FormValue::Text(b.to_string()),
            other => FormValue::from_json(other),
        },
    }
}
