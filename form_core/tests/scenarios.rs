use form_core::{
    seed_from_entity, ChangeEvent, FieldConfig, FieldKind, FieldPath, FileItem, FileRef, Form,
    FormSchema, FormValue, GuardError, Payload, SubmitOutcome, TabConfig, Upload,
};
use serde_json::json;
use std::cell::Cell;

fn features_schema() -> FormSchema {
    FormSchema::tabbed(
        "blogs",
        vec![TabConfig::new(1, "Features", vec![]).with_dynamic(
            "features",
            vec![
                FieldConfig::new("icon", "Icon", FieldKind::Text),
                FieldConfig::new("title", "Title", FieldKind::Text),
            ],
            None,
        )],
    )
}

#[test]
fn scenario_a_min_length_blocks_submit() {
    let schema = FormSchema::flat(
        "newsletters",
        vec![FieldConfig::new("name", "Name", FieldKind::Text)
            .required()
            .min_length(5)],
    );
    let mut form = Form::new(schema).unwrap();
    form.set_value(&FieldPath::key("name"), FormValue::text("ab"))
        .unwrap();

    let called = Cell::new(false);
    let outcome = form
        .submit(|_| -> Result<(), String> {
            called.set(true);
            Ok(())
        })
        .unwrap();

    let SubmitOutcome::Invalid(failures) = outcome else {
        panic!("expected validation failures");
    };
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].field, FieldPath::key("name"));
    assert_eq!(failures[0].message, "Name must be at least 5 characters");
    assert!(!called.get());
    assert_eq!(
        form.error(&FieldPath::key("name")),
        Some("Name must be at least 5 characters")
    );
}

#[test]
fn scenario_b_append_after_filling_last_entry() {
    let mut form = Form::new(features_schema()).unwrap();
    let array = form.field_array("features").unwrap();
    assert_eq!(array.len(), 1);
    assert!(!array.can_append());

    form.set_value(&FieldPath::parse("features.0.icon"), FormValue::text("x"))
        .unwrap();
    form.set_value(&FieldPath::parse("features.0.title"), FormValue::text("y"))
        .unwrap();

    let mut array = form.field_array("features").unwrap();
    assert!(array.can_append());
    array.append(None).unwrap();
    assert_eq!(array.len(), 2);
}

#[test]
fn scenario_c_lone_blank_entry_cannot_be_removed() {
    let mut form = Form::new(features_schema()).unwrap();
    let mut array = form.field_array("features").unwrap();
    let err = array.remove(0).unwrap_err();
    assert_eq!(err, GuardError::LastEntryRequired);
    assert_eq!(err.to_string(), "At least one field is required");
    assert_eq!(array.len(), 1);
}

#[test]
fn scenario_d_existing_image_satisfies_required() {
    let schema = FormSchema::flat(
        "banners",
        vec![FieldConfig::new("image", "Image", FieldKind::File)
            .required()
            .multiple()
            .accept("image/*")],
    );
    let mut form = Form::new(schema).unwrap();
    let seed = seed_from_entity(
        &json!({ "id": 4, "image": [{ "id": 1, "url": "/uploads/a.png" }] }),
        form.schema(),
    );
    seed.apply(&mut form);

    assert!(form.validate().is_empty());
    assert_eq!(form.file_state(&FieldPath::key("image")).total(), 1);
}

#[test]
fn tab_switch_round_trip_clears_errors() {
    let schema = FormSchema::tabbed(
        "footer_info",
        vec![
            TabConfig::new(
                1,
                "Contact",
                vec![FieldConfig::new("phone", "Phone", FieldKind::Text).required()],
            ),
            TabConfig::new(
                2,
                "Social",
                vec![FieldConfig::new("facebook", "Facebook", FieldKind::Text)],
            ),
        ],
    );
    let mut form = Form::new(schema).unwrap();
    form.validate();
    assert!(form.error(&FieldPath::key("phone")).is_some());

    form.select_tab(2).unwrap();
    form.select_tab(1).unwrap();
    assert!(form.errors().is_empty());
}

#[test]
fn file_differ_round_trip_through_change_event() {
    let schema = FormSchema::flat(
        "blogs",
        vec![FieldConfig::new("images", "Images", FieldKind::File).multiple()],
    );
    let mut form = Form::new(schema).unwrap();
    let images = FieldPath::key("images");
    form.set_value(
        &images,
        FormValue::Files(vec![
            FileItem::Existing(FileRef::new(1, "a")),
            FileItem::Existing(FileRef::new(2, "b")),
        ]),
    )
    .unwrap();

    form.notify_change(
        ChangeEvent::new(
            "images",
            FormValue::Files(vec![
                FileItem::Existing(FileRef::new(2, "b")),
                FileItem::New(Upload::new("c.jpg", "image/jpeg", vec![1, 2, 3])),
            ]),
        )
        .with_removed(["a".to_string()]),
    )
    .unwrap();

    let diff = form.file_diff(&images);
    assert_eq!(diff.existing_images, vec![FileRef::new(2, "b")]);
    assert_eq!(diff.removed_images, vec!["a".to_string()]);
    assert_eq!(diff.new_files.len(), 1);

    let mut sent = None;
    form.submit(|submission| -> Result<(), String> {
        sent = Some(submission.payload().clone());
        Ok(())
    })
    .unwrap();
    let Some(Payload::Multipart(parts)) = sent else {
        panic!("expected a multipart payload");
    };
    assert!(parts.iter().any(|p| p.key == "images.newImages"));
    assert!(!form.is_dirty());
}

#[test]
fn edit_mode_hydrates_dynamic_rows_once() {
    let mut form = Form::new(features_schema()).unwrap();
    let entity = json!({
        "id": 9,
        "features": [
            { "icon": "sun", "title": "Daylight visibility" },
            { "icon": "moon", "title": "Backlit at night" }
        ]
    });
    seed_from_entity(&entity, form.schema()).apply(&mut form);

    let array = form.field_array("features").unwrap();
    assert_eq!(array.len(), 2);
    assert_eq!(
        array.entries()[1].get("title"),
        Some(&FormValue::text("Backlit at night"))
    );
    assert!(!form.is_dirty());
}
