use crate::path::{FieldPath, PathSegment};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Pointer to a file that was persisted before this edit session
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileRef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    pub url: String,
}

impl FileRef {
    pub fn new(id: u64, url: impl Into<String>) -> Self {
        FileRef {
            id: Some(id),
            url: url.into(),
        }
    }

    /// Accepts `"url"` or `{ "id": 1, "url": "..." }`
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::String(url) if !url.trim().is_empty() => Some(FileRef {
                id: None,
                url: url.clone(),
            }),
            Value::Object(_) => serde_json::from_value(value.clone()).ok(),
            _ => None,
        }
    }
}

/// A newly attached file, not yet uploaded
#[derive(Clone, PartialEq, Eq)]
pub struct Upload {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl Upload {
    pub fn new(
        file_name: impl Into<String>,
        content_type: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Self {
        Upload {
            file_name: file_name.into(),
            content_type: content_type.into(),
            bytes,
        }
    }
}

impl fmt::Debug for Upload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Upload")
            .field("file_name", &self.file_name)
            .field("content_type", &self.content_type)
            .field("size", &self.bytes.len())
            .finish()
    }
}

/// One element of a file field's value
#[derive(Debug, Clone, PartialEq)]
pub enum FileItem {
    Existing(FileRef),
    New(Upload),
}

/// Synthetic identity of a dynamic group entry, unique within one form mount
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryKey(u64);

impl EntryKey {
    pub fn get(self) -> u64 {
        self.0
    }
}

/// Hands out entry keys in increasing order
#[derive(Debug, Default)]
pub struct EntryKeys {
    next: u64,
}

impl EntryKeys {
    pub fn next_key(&mut self) -> EntryKey {
        self.next += 1;
        EntryKey(self.next)
    }
}

/// Field values of one dynamic group, keyed by the group's field names
pub type GroupRow = BTreeMap<String, FormValue>;

/// One element of a dynamic array
#[derive(Debug, Clone, PartialEq)]
pub struct GroupEntry {
    pub key: EntryKey,
    pub fields: GroupRow,
}

impl GroupEntry {
    pub fn new(key: EntryKey, fields: GroupRow) -> Self {
        GroupEntry { key, fields }
    }

    pub fn get(&self, name: &str) -> Option<&FormValue> {
        self.fields.get(name)
    }

    /// Every listed field is unset or blank
    pub fn is_blank_for<'a>(&self, names: impl IntoIterator<Item = &'a str>) -> bool {
        names
            .into_iter()
            .all(|name| self.fields.get(name).map_or(true, FormValue::is_blank))
    }

    pub fn to_json(&self) -> Value {
        Value::Object(
            self.fields
                .iter()
                .map(|(name, value)| (name.clone(), value.to_json()))
                .collect(),
        )
    }
}

/// A node in the form's value tree
#[derive(Debug, Clone, Default, PartialEq)]
pub enum FormValue {
    #[default]
    Null,
    Text(String),
    Number(f64),
    Bool(bool),
    Files(Vec<FileItem>),
    List(Vec<FormValue>),
    Map(BTreeMap<String, FormValue>),
    Entries(Vec<GroupEntry>),
}

impl FormValue {
    pub fn text(value: impl Into<String>) -> Self {
        FormValue::Text(value.into())
    }

    pub fn empty_text() -> Self {
        FormValue::Text(String::new())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FormValue::Null)
    }

    /// Blank in the sense of "the user has not provided anything": unset,
    /// whitespace-only text, an unchecked box, or an empty collection.
    pub fn is_blank(&self) -> bool {
        match self {
            FormValue::Null => true,
            FormValue::Text(text) => text.trim().is_empty(),
            FormValue::Number(n) => n.is_nan(),
            FormValue::Bool(checked) => !checked,
            FormValue::Files(items) => items.is_empty(),
            FormValue::List(items) => items.is_empty(),
            FormValue::Map(map) => map.is_empty(),
            FormValue::Entries(entries) => entries.is_empty(),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FormValue::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            FormValue::Number(n) => Some(*n),
            FormValue::Text(text) => text.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_files(&self) -> Option<&[FileItem]> {
        match self {
            FormValue::Files(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_entries(&self) -> Option<&[GroupEntry]> {
        match self {
            FormValue::Entries(entries) => Some(entries),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            FormValue::Null => "null",
            FormValue::Text(_) => "text",
            FormValue::Number(_) => "number",
            FormValue::Bool(_) => "bool",
            FormValue::Files(_) => "files",
            FormValue::List(_) => "list",
            FormValue::Map(_) => "map",
            FormValue::Entries(_) => "entries",
        }
    }

    /// Plain-string rendering used for multipart parts and text inputs
    pub fn display_string(&self) -> String {
        match self {
            FormValue::Null => String::new(),
            FormValue::Text(text) => text.clone(),
            FormValue::Number(n) => format_number(*n),
            FormValue::Bool(b) => b.to_string(),
            other => other.to_json().to_string(),
        }
    }

    /// Untyped conversion; file refs and dynamic entries need the schema and
    /// are produced by [`crate::form::seed_from_entity`] instead.
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => FormValue::Null,
            Value::Bool(b) => FormValue::Bool(*b),
            Value::Number(n) => n.as_f64().map_or(FormValue::Null, FormValue::Number),
            Value::String(s) => FormValue::Text(s.clone()),
            Value::Array(items) => FormValue::List(items.iter().map(FormValue::from_json).collect()),
            Value::Object(map) => FormValue::Map(
                map.iter()
                    .map(|(k, v)| (k.clone(), FormValue::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// New uploads are rendered as their file names; they travel as
    /// multipart parts, never inside JSON.
    pub fn to_json(&self) -> Value {
        match self {
            FormValue::Null => Value::Null,
            FormValue::Text(text) => Value::String(text.clone()),
            FormValue::Number(n) => number_to_json(*n),
            FormValue::Bool(b) => Value::Bool(*b),
            FormValue::Files(items) => Value::Array(
                items
                    .iter()
                    .map(|item| match item {
                        FileItem::Existing(file_ref) => {
                            serde_json::to_value(file_ref).unwrap_or(Value::Null)
                        }
                        FileItem::New(upload) => Value::String(upload.file_name.clone()),
                    })
                    .collect(),
            ),
            FormValue::List(items) => Value::Array(items.iter().map(FormValue::to_json).collect()),
            FormValue::Map(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect::<Map<_, _>>(),
            ),
            FormValue::Entries(entries) => {
                Value::Array(entries.iter().map(GroupEntry::to_json).collect())
            }
        }
    }
}

impl From<&str> for FormValue {
    fn from(value: &str) -> Self {
        FormValue::Text(value.to_string())
    }
}

impl From<String> for FormValue {
    fn from(value: String) -> Self {
        FormValue::Text(value)
    }
}

impl From<bool> for FormValue {
    fn from(value: bool) -> Self {
        FormValue::Bool(value)
    }
}

impl From<f64> for FormValue {
    fn from(value: f64) -> Self {
        FormValue::Number(value)
    }
}

pub(crate) fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

fn number_to_json(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        Value::Number(Number::from(n as i64))
    } else {
        Number::from_f64(n).map_or(Value::Null, Value::Number)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValueError {
    #[error("empty field path")]
    EmptyPath,
    #[error("cannot write below `{path}`: it holds a {found} value")]
    NotAContainer { path: FieldPath, found: &'static str },
    #[error("`{path}` has no entry at index {index}")]
    MissingEntry { path: FieldPath, index: usize },
}

/// The value tree of one form, rooted at a map of top-level names
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FormValues {
    root: BTreeMap<String, FormValue>,
}

impl FormValues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Path lookup; `None` for anything unset or unreachable
    pub fn get(&self, path: &FieldPath) -> Option<&FormValue> {
        let (head, tail) = path.segments().split_first()?;
        let slot = self.root.get(&root_key(head))?;
        lookup(slot, tail)
    }

    /// Write `value` at `path`, creating intermediate maps and lists
    pub fn set(&mut self, path: &FieldPath, value: FormValue) -> Result<(), ValueError> {
        let (head, tail) = path
            .segments()
            .split_first()
            .ok_or(ValueError::EmptyPath)?;
        let slot = self.root.entry(root_key(head)).or_default();
        assign(slot, tail, value, path, 1)
    }

    #[cfg(test)]
    pub(crate) fn with(mut self, path: &str, value: impl Into<FormValue>) -> Self {
        self.set(&FieldPath::parse(path), value.into()).unwrap();
        self
    }

    pub fn remove(&mut self, name: &str) -> Option<FormValue> {
        self.root.remove(name)
    }

    pub fn top_level(&self) -> impl Iterator<Item = (&String, &FormValue)> {
        self.root.iter()
    }

    pub fn entries(&self, name: &str) -> &[GroupEntry] {
        self.root
            .get(name)
            .and_then(FormValue::as_entries)
            .unwrap_or(&[])
    }

    /// The entries slot for a top-level dynamic array, replacing whatever
    /// non-array value sat there
    pub fn entries_mut(&mut self, name: &str) -> &mut Vec<GroupEntry> {
        let slot = self.root.entry(name.to_string()).or_default();
        if !matches!(slot, FormValue::Entries(_)) {
            *slot = FormValue::Entries(Vec::new());
        }
        let FormValue::Entries(entries) = slot else {
            unreachable!("slot was just set to entries")
        };
        entries
    }

    pub fn to_json(&self) -> Value {
        Value::Object(
            self.root
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect(),
        )
    }
}

fn root_key(segment: &PathSegment) -> String {
    match segment {
        PathSegment::Key(key) => key.clone(),
        PathSegment::Index(index) => index.to_string(),
    }
}

fn lookup<'a>(value: &'a FormValue, segments: &[PathSegment]) -> Option<&'a FormValue> {
    let Some((head, tail)) = segments.split_first() else {
        return Some(value);
    };
    match (value, head) {
        (FormValue::Map(map), PathSegment::Key(key)) => lookup(map.get(key)?, tail),
        (FormValue::Map(map), PathSegment::Index(index)) => {
            lookup(map.get(&index.to_string())?, tail)
        }
        (FormValue::List(items), PathSegment::Index(index)) => lookup(items.get(*index)?, tail),
        (FormValue::Entries(entries), PathSegment::Index(index)) => {
            let entry = entries.get(*index)?;
            match tail.split_first() {
                Some((PathSegment::Key(key), rest)) => lookup(entry.fields.get(key)?, rest),
                _ => None,
            }
        }
        _ => None,
    }
}

fn assign(
    slot: &mut FormValue,
    segments: &[PathSegment],
    value: FormValue,
    full: &FieldPath,
    depth: usize,
) -> Result<(), ValueError> {
    let Some((head, tail)) = segments.split_first() else {
        *slot = value;
        return Ok(());
    };

    if slot.is_null() {
        *slot = match head {
            PathSegment::Key(_) => FormValue::Map(BTreeMap::new()),
            PathSegment::Index(_) => FormValue::List(Vec::new()),
        };
    }

    match (slot, head) {
        (FormValue::Map(map), segment) => {
            let child = map.entry(root_key(segment)).or_default();
            assign(child, tail, value, full, depth + 1)
        }
        (FormValue::List(items), PathSegment::Index(index)) => {
            if *index >= items.len() {
                items.resize(*index + 1, FormValue::Null);
            }
            assign(&mut items[*index], tail, value, full, depth + 1)
        }
        (FormValue::Entries(entries), PathSegment::Index(index)) => {
            let entry = entries
                .get_mut(*index)
                .ok_or_else(|| ValueError::MissingEntry {
                    path: full.prefix(depth),
                    index: *index,
                })?;
            match tail.split_first() {
                Some((PathSegment::Key(key), rest)) => {
                    let child = entry.fields.entry(key.clone()).or_default();
                    assign(child, rest, value, full, depth + 2)
                }
                _ => Err(ValueError::NotAContainer {
                    path: full.prefix(depth + 1),
                    found: "entry",
                }),
            }
        }
        (other, _) => Err(ValueError::NotAContainer {
            path: full.prefix(depth),
            found: other.type_name(),
        }),
    }
}
