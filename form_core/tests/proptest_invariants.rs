//! Property tests for validation, dynamic-array gating and the file differ.

use form_core::{
    FieldConfig, FieldKind, FieldPath, FileFieldState, FileItem, FileRef, Form, FormSchema,
    FormValue, GroupRow, GuardError, TabConfig, Upload,
};
use proptest::prelude::*;
use std::collections::BTreeSet;

fn non_file_kind() -> impl Strategy<Value = FieldKind> {
    prop_oneof![
        Just(FieldKind::Text),
        Just(FieldKind::Textarea),
        Just(FieldKind::Password),
        Just(FieldKind::Email),
        Just(FieldKind::Select),
        Just(FieldKind::Number),
        Just(FieldKind::Checkbox),
    ]
}

fn blank_text() -> impl Strategy<Value = String> {
    "[ \t\n]{0,6}"
}

fn array_form(required: &[Option<bool>]) -> Form {
    let config = required
        .iter()
        .enumerate()
        .map(|(i, flag)| {
            let mut field = FieldConfig::new(format!("f{}", i), format!("Field {}", i), FieldKind::Text);
            field.required = *flag;
            field
        })
        .collect();
    let schema = FormSchema::tabbed(
        "blogs",
        vec![TabConfig::new(1, "Sizes", vec![]).with_dynamic("sizes", config, None)],
    );
    Form::new(schema).unwrap()
}

fn row(filled: &[bool]) -> GroupRow {
    filled
        .iter()
        .enumerate()
        .map(|(i, filled)| {
            let value = if *filled { "value" } else { "" };
            (format!("f{}", i), FormValue::text(value))
        })
        .collect()
}

proptest! {
    #[test]
    fn required_blank_yields_exactly_one_failure(kind in non_file_kind(), blank in blank_text()) {
        let field = FieldConfig::new("subject", "Subject", kind)
            .required()
            .min_length(3)
            .with_options([("One", "one")]);
        let mut form = Form::new(FormSchema::flat("newsletters", vec![field])).unwrap();
        form.set_value(&FieldPath::key("subject"), FormValue::Text(blank)).unwrap();

        let failures = form.validate();
        prop_assert_eq!(failures.len(), 1);
        prop_assert_eq!(&failures[0].message, "Subject is required");
    }

    #[test]
    fn can_append_tracks_gating_fields(
        fields in prop::collection::vec((prop::option::of(any::<bool>()), any::<bool>()), 1..6)
    ) {
        let required: Vec<Option<bool>> = fields.iter().map(|(r, _)| *r).collect();
        let filled: Vec<bool> = fields.iter().map(|(_, f)| *f).collect();
        let mut form = array_form(&required);
        let mut array = form.field_array("sizes").unwrap();
        prop_assert!(array.hydrate(vec![row(&filled)]));

        let expected = fields
            .iter()
            .filter(|(required, _)| *required != Some(false))
            .all(|(_, filled)| *filled);
        prop_assert_eq!(array.can_append(), expected);
    }

    #[test]
    fn removing_from_a_longer_array_never_refuses(len in 2usize..7, pick in any::<prop::sample::Index>()) {
        let mut form = array_form(&[None, None]);
        let mut array = form.field_array("sizes").unwrap();
        array.hydrate((0..len).map(|_| row(&[true, true])).collect());

        let index = pick.index(len);
        prop_assert!(array.remove(index).is_ok());
        prop_assert_eq!(array.len(), len - 1);
    }

    #[test]
    fn refused_remove_then_refused_append_keeps_length(extra in 0usize..3) {
        let required = vec![None; extra + 1];
        let mut form = array_form(&required);
        let mut array = form.field_array("sizes").unwrap();

        prop_assert_eq!(array.remove(0), Err(GuardError::LastEntryRequired));
        prop_assert_eq!(array.append(None), Err(GuardError::IncompleteEntry));
        prop_assert_eq!(array.len(), 1);
    }

    #[test]
    fn file_differ_accounts_for_every_original_ref(
        urls in prop::collection::btree_set("[a-z]{1,6}", 0..8),
        removed_mask in prop::collection::vec(any::<bool>(), 8),
        new_count in 0usize..4,
    ) {
        let originals: Vec<String> = urls.into_iter().collect();
        let removed: Vec<String> = originals
            .iter()
            .zip(&removed_mask)
            .filter(|(_, removed)| **removed)
            .map(|(url, _)| url.clone())
            .collect();

        let mut items: Vec<FileItem> = originals
            .iter()
            .enumerate()
            .map(|(i, url)| FileItem::Existing(FileRef::new(i as u64, url.as_str())))
            .collect();
        items.extend((0..new_count).map(|i| {
            FileItem::New(Upload::new(format!("new{}.png", i), "image/png", vec![]))
        }));

        let state = FileFieldState::from_items(&items, &removed);
        prop_assert_eq!(state.total(), originals.len() - removed.len() + new_count);

        let diff = state.into_diff();
        let kept: BTreeSet<&str> = diff.existing_images.iter().map(|r| r.url.as_str()).collect();
        let dropped: BTreeSet<&str> = diff.removed_images.iter().map(String::as_str).collect();
        prop_assert!(kept.is_disjoint(&dropped));

        let union: BTreeSet<&str> = kept.union(&dropped).copied().collect();
        let expected: BTreeSet<&str> = originals.iter().map(String::as_str).collect();
        prop_assert_eq!(union, expected);
        prop_assert_eq!(diff.new_files.len(), new_count);
    }
}
