use form_core::payload::{set_json_path, text_part_json, EXISTING_IMAGES, NEW_IMAGES, REMOVED_IMAGES};
use form_core::{
    EntityId, EntityStore, FieldPath, FileRef, FormSchema, PartValue, Payload, PathSegment, Upload,
};
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no entity with id {id}")]
    NotFound { id: EntityId },
    #[error("IO error on '{}': {source}", .path.display())]
    Io {
        source: std::io::Error,
        path: PathBuf,
    },
    #[error("invalid JSON in '{}': {source}", .path.display())]
    Serde {
        source: serde_json::Error,
        path: PathBuf,
    },
    #[error("malformed part `{key}`: {message}")]
    InvalidPart { key: String, message: String },
}

/// One collection of entities stored as `<root>/<collection>/<id>.json`.
/// Uploaded files land in `<root>/uploads/` and are referenced by url.
/// With a schema attached, multipart text parts are stored typed by field kind.
#[derive(Debug, Clone)]
pub struct JsonStore {
    dir: PathBuf,
    uploads: PathBuf,
    collection: String,
    schema: Option<Arc<FormSchema>>,
}

/// What a multipart body says about one file field
#[derive(Debug, Default)]
struct FileUpdate {
    multiple: bool,
    existing: Option<Vec<FileRef>>,
    added: Vec<FileRef>,
    removed: Vec<String>,
}

impl JsonStore {
    pub fn open(root: &Path, collection: &str) -> Result<Self, StoreError> {
        let store = JsonStore {
            dir: root.join(collection),
            uploads: root.join("uploads"),
            collection: collection.to_string(),
            schema: None,
        };
        create_dir(&store.dir)?;
        create_dir(&store.uploads)?;
        Ok(store)
    }

    pub fn with_schema(mut self, schema: Arc<FormSchema>) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    fn entity_path(&self, id: EntityId) -> PathBuf {
        self.dir.join(format!("{}.json", id))
    }

    /// Ids of every stored entity, ascending
    pub fn ids(&self) -> Result<Vec<EntityId>, StoreError> {
        let entries = fs::read_dir(&self.dir).map_err(|e| io_error(e, &self.dir))?;
        let mut ids = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| io_error(e, &self.dir))?.path();
            if path.extension().map_or(false, |ext| ext == "json") {
                if let Some(id) = path
                    .file_stem()
                    .and_then(|stem| stem.to_str())
                    .and_then(|stem| stem.parse().ok())
                {
                    ids.push(id);
                }
            }
        }
        ids.sort_unstable();
        Ok(ids)
    }

    pub fn delete(&mut self, id: EntityId) -> Result<(), StoreError> {
        let path = self.entity_path(id);
        if !path.exists() {
            return Err(StoreError::NotFound { id });
        }
        fs::remove_file(&path).map_err(|e| io_error(e, &path))?;
        info!(collection = %self.collection, id, "entity deleted");
        Ok(())
    }

    fn next_id(&self) -> Result<EntityId, StoreError> {
        Ok(self.ids()?.last().map_or(1, |last| last + 1))
    }

    fn write(&self, id: EntityId, entity: &Value) -> Result<(), StoreError> {
        let path = self.entity_path(id);
        let content = serde_json::to_string_pretty(entity).map_err(|e| StoreError::Serde {
            source: e,
            path: path.clone(),
        })?;
        fs::write(&path, content).map_err(|e| io_error(e, &path))
    }

    fn save_upload(&self, upload: &Upload) -> Result<FileRef, StoreError> {
        let id = self.last_upload_id()? + 1;
        let name = format!("{}-{}", id, sanitize_file_name(&upload.file_name));
        let path = self.uploads.join(&name);
        fs::write(&path, &upload.bytes).map_err(|e| io_error(e, &path))?;
        debug!(file = %path.display(), bytes = upload.bytes.len(), "upload stored");
        Ok(FileRef::new(id, format!("/uploads/{}", name)))
    }

    /// Highest `<id>-` prefix among stored uploads, 0 when there are none
    fn last_upload_id(&self) -> Result<u64, StoreError> {
        let entries = fs::read_dir(&self.uploads).map_err(|e| io_error(e, &self.uploads))?;
        let mut last = 0;
        for entry in entries {
            let entry = entry.map_err(|e| io_error(e, &self.uploads))?;
            let name = entry.file_name();
            if let Some(id) = name
                .to_str()
                .and_then(|name| name.split_once('-'))
                .and_then(|(prefix, _)| prefix.parse::<u64>().ok())
            {
                last = last.max(id);
            }
        }
        Ok(last)
    }

    /// Text part as stored: typed by its field when the schema knows it
    fn text_value(&self, path: &FieldPath, text: &str) -> Value {
        self.schema
            .as_deref()
            .and_then(|schema| schema.field_at(path))
            .map_or_else(|| Value::String(text.to_string()), |field| text_part_json(field, text))
    }

    fn apply_payload(&self, entity: &mut Value, payload: &Payload) -> Result<(), StoreError> {
        let parts = match payload {
            Payload::Json(Value::Object(fields)) => {
                for (key, value) in fields {
                    set_key(entity, key, value.clone());
                }
                return Ok(());
            }
            Payload::Json(other) => {
                return Err(StoreError::InvalidPart {
                    key: String::new(),
                    message: format!("expected a JSON object, got {}", other),
                })
            }
            Payload::Multipart(parts) => parts,
        };

        // Arrays sent as indexed parts replace the stored array wholesale.
        let arrays: BTreeSet<String> = parts
            .iter()
            .filter_map(|part| {
                let path = FieldPath::parse(&part.key);
                match path.segments() {
                    [PathSegment::Key(name), PathSegment::Index(_), ..] => Some(name.clone()),
                    _ => None,
                }
            })
            .collect();
        for name in &arrays {
            set_key(entity, name, Value::Array(Vec::new()));
        }

        let mut files: BTreeMap<FieldPath, FileUpdate> = BTreeMap::new();
        for part in parts {
            let path = FieldPath::parse(&part.key);
            let (base, suffix) = split_file_suffix(&path);
            match (suffix, &part.value) {
                (Some(NEW_IMAGES), PartValue::File(upload)) => {
                    let update = files.entry(base).or_default();
                    update.multiple = true;
                    update.added.push(self.save_upload(upload)?);
                }
                (Some(EXISTING_IMAGES), PartValue::Text(text)) => {
                    let update = files.entry(base).or_default();
                    let refs = match parse_json_part(&part.key, text)? {
                        Value::Array(items) => {
                            update.multiple = true;
                            items.iter().filter_map(FileRef::from_json).collect()
                        }
                        single => FileRef::from_json(&single).into_iter().collect(),
                    };
                    update.existing = Some(refs);
                }
                (Some(REMOVED_IMAGES), PartValue::Text(text)) => {
                    let urls = parse_json_array(&part.key, text)?
                        .iter()
                        .filter_map(|url| url.as_str().map(str::to_string))
                        .collect();
                    files.entry(base).or_default().removed = urls;
                }
                (_, PartValue::File(upload)) => {
                    let stored = self.save_upload(upload)?;
                    files.entry(path).or_default().added.push(stored);
                }
                (_, PartValue::Text(text)) => {
                    let value = self.text_value(&path, text);
                    set_json_path(entity, &path, value);
                }
            }
        }

        for (path, update) in files {
            let current = json_get(entity, &path).cloned().unwrap_or(Value::Null);
            set_json_path(entity, &path, update.resolve(&current));
        }
        Ok(())
    }
}

impl FileUpdate {
    /// The field's stored value after this update
    fn resolve(self, current: &Value) -> Value {
        let to_json = |file_ref: &FileRef| serde_json::to_value(file_ref).unwrap_or(Value::Null);
        if self.multiple {
            let kept = match self.existing {
                Some(existing) => existing,
                None => match current {
                    Value::Array(items) => items.iter().filter_map(FileRef::from_json).collect(),
                    _ => Vec::new(),
                },
            };
            return Value::Array(
                kept.iter()
                    .filter(|file_ref| !self.removed.contains(&file_ref.url))
                    .chain(self.added.iter())
                    .map(to_json)
                    .collect(),
            );
        }
        if let Some(added) = self.added.last() {
            return to_json(added);
        }
        if let Some(existing) = self.existing {
            return existing
                .first()
                .filter(|file_ref| !self.removed.contains(&file_ref.url))
                .map_or(Value::Null, to_json);
        }
        match FileRef::from_json(current) {
            Some(file_ref) if self.removed.contains(&file_ref.url) => Value::Null,
            _ => current.clone(),
        }
    }
}

impl EntityStore for JsonStore {
    type Error = StoreError;

    fn fetch_by_id(&self, id: EntityId) -> Result<Option<Value>, StoreError> {
        let path = self.entity_path(id);
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path).map_err(|e| io_error(e, &path))?;
        let entity = serde_json::from_str(&content).map_err(|e| StoreError::Serde {
            source: e,
            path: path.clone(),
        })?;
        Ok(Some(entity))
    }

    fn add(&mut self, payload: &Payload) -> Result<Value, StoreError> {
        let id = self.next_id()?;
        let mut entity = json!({ "id": id });
        self.apply_payload(&mut entity, payload)?;
        set_key(&mut entity, "id", json!(id));
        self.write(id, &entity)?;
        info!(collection = %self.collection, id, "entity created");
        Ok(entity)
    }

    fn update(&mut self, id: EntityId, payload: &Payload) -> Result<Value, StoreError> {
        let mut entity = self.fetch_by_id(id)?.ok_or(StoreError::NotFound { id })?;
        self.apply_payload(&mut entity, payload)?;
        set_key(&mut entity, "id", json!(id));
        self.write(id, &entity)?;
        info!(collection = %self.collection, id, "entity updated");
        Ok(entity)
    }

    fn list(&self) -> Result<Vec<Value>, StoreError> {
        let mut entities = Vec::new();
        for id in self.ids()? {
            if let Some(entity) = self.fetch_by_id(id)? {
                entities.push(entity);
            }
        }
        Ok(entities)
    }
}

/// Top-level write; a non-object entity becomes an object
fn set_key(entity: &mut Value, key: &str, value: Value) {
    set_json_path(entity, &FieldPath::key(key), value);
}

fn create_dir(path: &Path) -> Result<(), StoreError> {
    fs::create_dir_all(path).map_err(|e| io_error(e, path))
}

fn io_error(source: std::io::Error, path: &Path) -> StoreError {
    StoreError::Io {
        source,
        path: path.to_path_buf(),
    }
}

/// `gallery.newImages` splits into `gallery` and `newImages`
fn split_file_suffix(path: &FieldPath) -> (FieldPath, Option<&'static str>) {
    let suffix = match path.segments().last() {
        Some(PathSegment::Key(key)) => [NEW_IMAGES, EXISTING_IMAGES, REMOVED_IMAGES]
            .into_iter()
            .find(|suffix| key == suffix),
        _ => None,
    };
    match suffix {
        Some(suffix) => (path.prefix(path.len() - 1), Some(suffix)),
        None => (path.clone(), None),
    }
}

fn parse_json_part(key: &str, text: &str) -> Result<Value, StoreError> {
    serde_json::from_str(text).map_err(|e| StoreError::InvalidPart {
        key: key.to_string(),
        message: e.to_string(),
    })
}

fn parse_json_array(key: &str, text: &str) -> Result<Vec<Value>, StoreError> {
    match parse_json_part(key, text)? {
        Value::Array(items) => Ok(items),
        other => Err(StoreError::InvalidPart {
            key: key.to_string(),
            message: format!("expected a JSON array, got {}", other),
        }),
    }
}

fn json_get<'a>(value: &'a Value, path: &FieldPath) -> Option<&'a Value> {
    path.segments()
        .iter()
        .try_fold(value, |current, segment| match segment {
            PathSegment::Key(key) => current.get(key.as_str()),
            PathSegment::Index(index) => current.get(*index),
        })
}

fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.trim_matches('.').is_empty() {
        "upload".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use form_core::{build_payload, seed_from_entity, FileItem, Form, FormValue, Part};
    use tempfile::TempDir;

    fn banners() -> Arc<FormSchema> {
        Arc::new(FormSchema::from_toml_str(include_str!("../schemas/banners.toml")).unwrap())
    }

    fn store() -> (TempDir, JsonStore) {
        let dir = TempDir::new().unwrap();
        let store = JsonStore::open(dir.path(), "blogs").unwrap();
        (dir, store)
    }

    #[test]
    fn test_add_and_fetch_json() {
        let (_dir, mut store) = store();
        let created = store
            .add(&Payload::Json(json!({ "title": "Digital boards", "views": 3 })))
            .unwrap();
        assert_eq!(created["id"], json!(1));

        let fetched = store.fetch_by_id(1).unwrap().unwrap();
        assert_eq!(fetched["title"], json!("Digital boards"));
        assert_eq!(store.ids().unwrap(), vec![1]);
        assert!(store.fetch_by_id(2).unwrap().is_none());
    }

    #[test]
    fn test_ids_increase() {
        let (_dir, mut store) = store();
        store.add(&Payload::Json(json!({}))).unwrap();
        let second = store.add(&Payload::Json(json!({}))).unwrap();
        assert_eq!(second["id"], json!(2));
        assert_eq!(store.list().unwrap().len(), 2);
    }

    #[test]
    fn test_update_unknown_id() {
        let (_dir, mut store) = store();
        let err = store.update(7, &Payload::Json(json!({}))).unwrap_err();
        assert!(matches!(err, StoreError::NotFound { id: 7 }));
    }

    #[test]
    fn test_multipart_update_reconciles_images() {
        let (dir, mut store) = store();
        store
            .add(&Payload::Json(json!({
                "title": "Old",
                "gallery": [{ "id": 1, "url": "a" }, { "id": 2, "url": "b" }],
                "features": [{ "title": "x" }, { "title": "y" }]
            })))
            .unwrap();

        let payload = Payload::Multipart(vec![
            Part::text("title", "New"),
            Part::file("gallery.newImages", Upload::new("c d.png", "image/png", vec![1, 2])),
            Part::text("gallery.existingImages", r#"[{"id":2,"url":"b"}]"#),
            Part::text("gallery.removedImages", r#"["a"]"#),
            Part::text("features[0][title]", "only"),
        ]);
        let updated = store.update(1, &payload).unwrap();

        assert_eq!(updated["title"], json!("New"));
        let gallery = updated["gallery"].as_array().unwrap();
        assert_eq!(gallery.len(), 2);
        assert_eq!(gallery[0]["url"], json!("b"));
        assert_eq!(gallery[1]["url"], json!("/uploads/1-c_d.png"));
        assert!(dir.path().join("uploads").join("1-c_d.png").exists());
        assert_eq!(updated["features"], json!([{ "title": "only" }]));
    }

    #[test]
    fn test_single_file_replaced_and_removed() {
        let (_dir, mut store) = store();
        store
            .add(&Payload::Json(json!({ "logo": { "id": 4, "url": "/uploads/old.svg" } })))
            .unwrap();

        let removed = store
            .update(
                1,
                &Payload::Multipart(vec![Part::text("logo.removedImages", r#"["/uploads/old.svg"]"#)]),
            )
            .unwrap();
        assert_eq!(removed["logo"], Value::Null);

        let replaced = store
            .update(
                1,
                &Payload::Multipart(vec![Part::file("logo", Upload::new("new.svg", "image/svg+xml", vec![]))]),
            )
            .unwrap();
        assert_eq!(replaced["logo"]["url"], json!("/uploads/1-new.svg"));
    }

    #[test]
    fn test_form_save_keeps_untouched_refs() {
        let dir = TempDir::new().unwrap();
        let schema = banners();
        let mut store = JsonStore::open(dir.path(), "banners")
            .unwrap()
            .with_schema(Arc::clone(&schema));
        store
            .add(&Payload::Json(json!({
                "heroBanner": {
                    "heading": "Glow",
                    "images": [{ "id": 1, "url": "/uploads/a.png" }, { "id": 2, "url": "/uploads/b.png" }]
                },
                "smallBoxes": [
                    { "label": "Reach", "value": 5, "icon": { "id": 9, "url": "/uploads/icon.svg" } },
                    { "label": "Sites", "value": 12, "icon": null }
                ]
            })))
            .unwrap();

        let mut form = Form::from_shared(Arc::clone(&schema)).unwrap();
        let stored = store.fetch_by_id(1).unwrap().unwrap();
        seed_from_entity(&stored, form.schema()).apply(&mut form);

        let images = FieldPath::parse("heroBanner.images");
        form.set_value(
            &images,
            FormValue::Files(vec![
                FileItem::Existing(FileRef::new(2, "/uploads/b.png")),
                FileItem::New(Upload::new("c.png", "image/png", vec![3])),
            ]),
        )
        .unwrap();
        form.record_removed_files(&images, ["/uploads/a.png".to_string()]);

        let payload = build_payload(&form);
        assert!(payload.is_multipart());
        let saved = store.update(1, &payload).unwrap();

        assert_eq!(saved["heroBanner"]["heading"], json!("Glow"));
        assert_eq!(
            saved["smallBoxes"],
            json!([
                { "label": "Reach", "value": 5, "icon": { "id": 9, "url": "/uploads/icon.svg" } },
                { "label": "Sites", "value": 12 }
            ])
        );

        let mut reloaded = Form::from_shared(schema).unwrap();
        seed_from_entity(&saved, reloaded.schema()).apply(&mut reloaded);
        assert_eq!(reloaded.values().entries("smallBoxes").len(), 2);
        assert_eq!(
            reloaded.get_value(&FieldPath::parse("smallBoxes.0.icon")),
            Some(&FormValue::Files(vec![FileItem::Existing(FileRef::new(9, "/uploads/icon.svg"))]))
        );
        assert_eq!(
            reloaded.get_value(&images),
            Some(&FormValue::Files(vec![
                FileItem::Existing(FileRef::new(2, "/uploads/b.png")),
                FileItem::Existing(FileRef::new(1, "/uploads/1-c.png")),
            ]))
        );
    }

    #[test]
    fn test_single_existing_ref_part() {
        let (_dir, mut store) = store();
        store
            .add(&Payload::Json(json!({ "logo": { "id": 4, "url": "/uploads/old.svg" } })))
            .unwrap();
        let kept = store
            .update(
                1,
                &Payload::Multipart(vec![Part::text(
                    "logo.existingImages",
                    r#"{"id":4,"url":"/uploads/old.svg"}"#,
                )]),
            )
            .unwrap();
        assert_eq!(kept["logo"], json!({ "id": 4, "url": "/uploads/old.svg" }));
    }

    #[test]
    fn test_text_parts_typed_by_schema() {
        let dir = TempDir::new().unwrap();
        let schema = FormSchema::flat(
            "settings",
            vec![
                form_core::FieldConfig::new("limit", "Limit", form_core::FieldKind::Number),
                form_core::FieldConfig::new("active", "Active", form_core::FieldKind::Checkbox),
                form_core::FieldConfig::new("code", "Code", form_core::FieldKind::Text),
            ],
        );
        let parts = Payload::Multipart(vec![
            Part::text("limit", "5"),
            Part::text("active", "false"),
            Part::text("code", "007"),
            Part::text("extra", "12"),
        ]);

        let mut typed = JsonStore::open(dir.path(), "settings")
            .unwrap()
            .with_schema(Arc::new(schema));
        let saved = typed.add(&parts).unwrap();
        assert_eq!(saved["limit"], json!(5));
        assert_eq!(saved["active"], json!(false));
        assert_eq!(saved["code"], json!("007"));
        assert_eq!(saved["extra"], json!("12"));

        let mut untyped = JsonStore::open(dir.path(), "raw").unwrap();
        assert_eq!(untyped.add(&parts).unwrap()["limit"], json!("5"));
    }

    #[test]
    fn test_upload_ids_skip_past_existing_files() {
        let (dir, store) = store();
        let uploads = dir.path().join("uploads");
        fs::write(uploads.join("1-a.png"), b"a").unwrap();
        fs::write(uploads.join("3-b.png"), b"b").unwrap();
        fs::write(uploads.join("notes.txt"), b"").unwrap();

        let stored = store
            .save_upload(&Upload::new("b.png", "image/png", vec![7]))
            .unwrap();
        assert_eq!(stored.url, "/uploads/4-b.png");
        assert_eq!(fs::read(uploads.join("3-b.png")).unwrap(), b"b");
    }

    #[test]
    fn test_malformed_existing_images() {
        let (_dir, mut store) = store();
        let err = store
            .add(&Payload::Multipart(vec![Part::text("gallery.existingImages", "{")]))
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidPart { .. }));
    }

    #[test]
    fn test_delete() {
        let (_dir, mut store) = store();
        store.add(&Payload::Json(json!({}))).unwrap();
        store.delete(1).unwrap();
        assert!(store.ids().unwrap().is_empty());
        assert!(matches!(store.delete(1), Err(StoreError::NotFound { id: 1 })));
    }

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("my photo.png"), "my_photo.png");
        assert_eq!(sanitize_file_name(".."), "upload");
    }
}
