use crate::config::{FieldConfig, FieldKind};
use crate::files::FileFieldState;
use crate::form::{convert_json, Form};
use crate::path::{FieldPath, PathSegment};
use crate::value::{FileRef, FormValue, Upload};
use serde_json::{Map, Value};

/// Key suffix of a multi-file field's new uploads
pub const NEW_IMAGES: &str = "newImages";
/// Key suffix of a file field's surviving stored refs: an array for multi-file
/// fields, one ref object for single-file fields
pub const EXISTING_IMAGES: &str = "existingImages";
/// Key suffix of a file field's removed urls
pub const REMOVED_IMAGES: &str = "removedImages";

#[derive(Debug, Clone, PartialEq)]
pub enum PartValue {
    Text(String),
    File(Upload),
}

/// One multipart entry
#[derive(Debug, Clone, PartialEq)]
pub struct Part {
    pub key: String,
    pub value: PartValue,
}

impl Part {
    pub fn text(key: impl Into<String>, value: impl Into<String>) -> Self {
        Part {
            key: key.into(),
            value: PartValue::Text(value.into()),
        }
    }

    pub fn file(key: impl Into<String>, upload: Upload) -> Self {
        Part {
            key: key.into(),
            value: PartValue::File(upload),
        }
    }
}

/// Body of a create/update request
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Json(Value),
    Multipart(Vec<Part>),
}

impl Payload {
    pub fn is_multipart(&self) -> bool {
        matches!(self, Payload::Multipart(_))
    }

    pub fn parts(&self) -> &[Part] {
        match self {
            Payload::Multipart(parts) => parts,
            Payload::Json(_) => &[],
        }
    }

    /// First text part under `key`
    pub fn text(&self, key: &str) -> Option<&str> {
        self.parts().iter().find_map(|part| match &part.value {
            PartValue::Text(text) if part.key == key => Some(text.as_str()),
            _ => None,
        })
    }

    /// Every upload under `key`
    pub fn files<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a Upload> + 'a {
        self.parts().iter().filter_map(move |part| match &part.value {
            PartValue::File(upload) if part.key == key => Some(upload),
            _ => None,
        })
    }
}

/// Flatten the whole form, every tab included, into a request body. JSON
/// unless some file field has uploads or removals.
pub fn build_payload(form: &Form) -> Payload {
    let sections: Vec<Section> = collect_sections(form);
    let has_file_changes = sections
        .iter()
        .any(|s| s.field.kind == FieldKind::File && form.file_state(&s.path).has_changes());

    if has_file_changes {
        Payload::Multipart(multipart_parts(form, &sections))
    } else {
        Payload::Json(json_body(form, &sections))
    }
}

/// A non-disabled field together with the concrete path of one of its values
struct Section<'a> {
    field: &'a FieldConfig,
    path: FieldPath,
    array: Option<&'a str>,
}

fn collect_sections(form: &Form) -> Vec<Section<'_>> {
    let schema = form.schema();
    let mut sections: Vec<Section<'_>> = schema
        .all_fields()
        .filter(|field| !field.disabled)
        .map(|field| Section {
            field,
            path: field.name.clone(),
            array: None,
        })
        .collect();

    for dynamic in schema.dynamic_sections() {
        let array = dynamic.path();
        for index in 0..form.values().entries(dynamic.name).len() {
            for field in dynamic.config.iter().filter(|f| !f.disabled) {
                sections.push(Section {
                    field,
                    path: array.at(index).join(&field.name),
                    array: Some(dynamic.name),
                });
            }
        }
    }
    sections
}

fn multipart_parts(form: &Form, sections: &[Section<'_>]) -> Vec<Part> {
    let mut parts = Vec::new();
    for section in sections {
        let key = section.path.to_form_key();
        if section.field.kind == FieldKind::File {
            file_parts(&mut parts, &key, section.field, form.file_state(&section.path));
            continue;
        }
        match form.get_value(&section.path) {
            None | Some(FormValue::Null) => {}
            Some(value) => parts.push(Part::text(key, value.display_string())),
        }
    }
    parts
}

fn file_parts(parts: &mut Vec<Part>, key: &str, field: &FieldConfig, state: FileFieldState) {
    let diff = state.into_diff();
    if field.multiple {
        for upload in diff.new_files {
            parts.push(Part::file(suffixed(key, NEW_IMAGES), upload));
        }
        parts.push(Part::text(
            suffixed(key, EXISTING_IMAGES),
            refs_json(&diff.existing_images).to_string(),
        ));
    } else if let Some(upload) = diff.new_files.into_iter().next() {
        parts.push(Part::file(key, upload));
    } else if let Some(kept) = diff
        .existing_images
        .first()
        .and_then(|file_ref| serde_json::to_value(file_ref).ok())
    {
        // A lone ref travels as an object so the receiver keeps it single.
        parts.push(Part::text(suffixed(key, EXISTING_IMAGES), kept.to_string()));
    }
    if !diff.removed_images.is_empty() {
        parts.push(Part::text(
            suffixed(key, REMOVED_IMAGES),
            Value::from(diff.removed_images).to_string(),
        ));
    }
}

/// `gallery` becomes `gallery.newImages`, `features[0][image]` becomes
/// `features[0][image][newImages]`
fn suffixed(key: &str, suffix: &str) -> String {
    if key.ends_with(']') {
        format!("{}[{}]", key, suffix)
    } else {
        format!("{}.{}", key, suffix)
    }
}

fn refs_json(refs: &[FileRef]) -> Value {
    Value::Array(
        refs.iter()
            .filter_map(|file_ref| serde_json::to_value(file_ref).ok())
            .collect(),
    )
}

fn json_body(form: &Form, sections: &[Section<'_>]) -> Value {
    let mut body = Value::Object(Map::new());
    for dynamic in form.schema().dynamic_sections() {
        if form.get_value(&dynamic.path()).is_some() {
            set_json_path(&mut body, &dynamic.path(), Value::Array(Vec::new()));
        }
    }
    for section in sections {
        let value = match form.get_value(&section.path) {
            Some(value) => field_json(section.field, value),
            None if section.array.is_some() => field_json(section.field, &section.field.initial_value()),
            None => continue,
        };
        set_json_path(&mut body, &section.path, value);
    }
    body
}

fn field_json(field: &FieldConfig, value: &FormValue) -> Value {
    match (field.kind, value) {
        (FieldKind::File, FormValue::Files(items)) => {
            let refs = FileFieldState::from_items(items, &[]).existing;
            if field.multiple {
                refs_json(&refs)
            } else {
                refs.first()
                    .and_then(|file_ref| serde_json::to_value(file_ref).ok())
                    .unwrap_or(Value::Null)
            }
        }
        _ => value.to_json(),
    }
}

/// Stored form of a multipart text part, typed by the field it belongs to:
/// numbers for number fields, booleans for checkboxes, strings otherwise
pub fn text_part_json(field: &FieldConfig, text: &str) -> Value {
    match convert_json(field, &Value::String(text.to_string())) {
        FormValue::Null => Value::Null,
        value => value.to_json(),
    }
}

/// Write `value` into a JSON tree at `path`, creating objects for keys and
/// arrays for indices
pub fn set_json_path(target: &mut Value, path: &FieldPath, value: Value) {
    set_segments(target, path.segments(), value);
}

fn set_segments(target: &mut Value, segments: &[PathSegment], value: Value) {
    let Some((head, rest)) = segments.split_first() else {
        *target = value;
        return;
    };
    match head {
        PathSegment::Key(key) => {
            if !target.is_object() {
                *target = Value::Object(Map::new());
            }
            if let Value::Object(map) = target {
                let slot = map.entry(key.clone()).or_insert(Value::Null);
                set_segments(slot, rest, value);
            }
        }
        PathSegment::Index(index) => {
            if let Value::Object(map) = target {
                let slot = map.entry(index.to_string()).or_insert(Value::Null);
                set_segments(slot, rest, value);
                return;
            }
            if !target.is_array() {
                *target = Value::Array(Vec::new());
            }
            if let Value::Array(items) = target {
                if items.len() <= *index {
                    items.resize(*index + 1, Value::Null);
                }
                set_segments(&mut items[*index], rest, value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FormSchema, TabConfig};
    use crate::value::FileItem;
    use serde_json::json;

    fn banner_schema() -> FormSchema {
        let mut hidden = FieldConfig::new("internalNote", "Internal note", FieldKind::Text);
        hidden.disabled = true;
        FormSchema::tabbed(
            "banners",
            vec![
                TabConfig::new(
                    1,
                    "Homepage",
                    vec![
                        FieldConfig::new("homepage.bannerOne.title", "Title", FieldKind::Text),
                        FieldConfig::new("homepage.bannerOne.images", "Images", FieldKind::File)
                            .multiple()
                            .accept("image/*"),
                        FieldConfig::new("priority", "Priority", FieldKind::Number),
                        hidden,
                    ],
                ),
                TabConfig::new(2, "About", vec![]).with_dynamic(
                    "smallBoxes",
                    vec![
                        FieldConfig::new("label", "Label", FieldKind::Text).required(),
                        FieldConfig::new("icon", "Icon", FieldKind::File),
                    ],
                    Some(4),
                ),
            ],
        )
    }

    fn images() -> FieldPath {
        FieldPath::parse("homepage.bannerOne.images")
    }

    #[test]
    fn test_json_when_no_file_changes() {
        let mut form = Form::new(banner_schema()).unwrap();
        form.set_value(&FieldPath::parse("homepage.bannerOne.title"), "Summer".into())
            .unwrap();
        form.set_value(&FieldPath::key("priority"), FormValue::Number(3.0))
            .unwrap();
        form.set_value(&FieldPath::key("internalNote"), "secret".into())
            .unwrap();
        form.set_value(
            &images(),
            FormValue::Files(vec![FileItem::Existing(FileRef::new(7, "/u/a.png"))]),
        )
        .unwrap();

        let Payload::Json(body) = build_payload(&form) else {
            panic!("expected a json payload");
        };
        assert_eq!(body["homepage"]["bannerOne"]["title"], json!("Summer"));
        assert_eq!(body["priority"], json!(3));
        assert_eq!(
            body["homepage"]["bannerOne"]["images"],
            json!([{ "id": 7, "url": "/u/a.png" }])
        );
        assert!(body.get("internalNote").is_none());
    }

    #[test]
    fn test_multipart_keys() {
        let mut form = Form::new(banner_schema()).unwrap();
        form.set_value(&FieldPath::parse("homepage.bannerOne.title"), "Summer".into())
            .unwrap();
        form.set_value(
            &images(),
            FormValue::Files(vec![
                FileItem::Existing(FileRef::new(1, "a")),
                FileItem::Existing(FileRef::new(2, "b")),
                FileItem::New(Upload::new("c.png", "image/png", vec![9])),
            ]),
        )
        .unwrap();
        form.record_removed_files(&images(), ["a".to_string()]);

        form.select_tab(2).unwrap();
        form.set_value(&FieldPath::parse("smallBoxes.0.label"), "Reach".into())
            .unwrap();

        let payload = build_payload(&form);
        assert!(payload.is_multipart());
        assert_eq!(payload.text("homepage.bannerOne.title"), Some("Summer"));
        assert_eq!(
            payload.files("homepage.bannerOne.images.newImages").count(),
            1
        );
        assert_eq!(
            payload.text("homepage.bannerOne.images.existingImages"),
            Some(r#"[{"id":2,"url":"b"}]"#)
        );
        assert_eq!(
            payload.text("homepage.bannerOne.images.removedImages"),
            Some(r#"["a"]"#)
        );
        assert_eq!(payload.text("smallBoxes[0][label]"), Some("Reach"));
        assert_eq!(payload.text("internalNote"), None);
    }

    #[test]
    fn test_single_file_in_group_goes_under_its_own_key() {
        let mut form = Form::new(banner_schema()).unwrap();
        form.select_tab(2).unwrap();
        form.set_value(
            &FieldPath::parse("smallBoxes.0.icon"),
            FormValue::Files(vec![FileItem::New(Upload::new("i.svg", "image/svg+xml", vec![]))]),
        )
        .unwrap();
        let payload = build_payload(&form);
        assert_eq!(payload.files("smallBoxes[0][icon]").count(), 1);
    }

    #[test]
    fn test_unchanged_single_file_in_group_keeps_its_ref() {
        let mut form = Form::new(banner_schema()).unwrap();
        form.set_value(
            &images(),
            FormValue::Files(vec![FileItem::New(Upload::new("hero.png", "image/png", vec![1]))]),
        )
        .unwrap();
        form.select_tab(2).unwrap();
        form.set_value(&FieldPath::parse("smallBoxes.0.label"), "Reach".into())
            .unwrap();
        form.set_value(
            &FieldPath::parse("smallBoxes.0.icon"),
            FormValue::Files(vec![FileItem::Existing(FileRef::new(9, "/uploads/icon.svg"))]),
        )
        .unwrap();

        let payload = build_payload(&form);
        assert!(payload.is_multipart());
        assert_eq!(
            payload.text("smallBoxes[0][icon][existingImages]"),
            Some(r#"{"id":9,"url":"/uploads/icon.svg"}"#)
        );
        assert_eq!(payload.files("smallBoxes[0][icon]").count(), 0);
    }

    #[test]
    fn test_text_part_json_follows_kind() {
        let number = FieldConfig::new("value", "Value", FieldKind::Number);
        let check = FieldConfig::new("active", "Active", FieldKind::Checkbox);
        let text = FieldConfig::new("label", "Label", FieldKind::Text);
        assert_eq!(text_part_json(&number, "5"), json!(5));
        assert_eq!(text_part_json(&number, "2.5"), json!(2.5));
        assert_eq!(text_part_json(&number, "lots"), json!("lots"));
        assert_eq!(text_part_json(&check, "false"), json!(false));
        assert_eq!(text_part_json(&check, "true"), json!(true));
        assert_eq!(text_part_json(&text, "5"), json!("5"));
    }

    #[test]
    fn test_json_includes_dynamic_rows() {
        let mut form = Form::new(banner_schema()).unwrap();
        form.select_tab(2).unwrap();
        form.set_value(&FieldPath::parse("smallBoxes.0.label"), "Reach".into())
            .unwrap();
        let Payload::Json(body) = build_payload(&form) else {
            panic!("expected a json payload");
        };
        assert_eq!(body["smallBoxes"], json!([{ "label": "Reach", "icon": null }]));
    }

    #[test]
    fn test_set_json_path_builds_arrays() {
        let mut body = json!({});
        set_json_path(&mut body, &FieldPath::parse("features[1][title]"), json!("x"));
        assert_eq!(body, json!({ "features": [null, { "title": "x" }] }));
    }
}
