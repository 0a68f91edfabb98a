use crate::config::{FieldConfig, FieldKind};
use crate::files::FileFieldState;
use crate::path::FieldPath;
use crate::value::{FormValue, Upload};
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::OnceLock;
use thiserror::Error;

/// A field-scoped validation failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct Failure {
    pub field: FieldPath,
    pub message: String,
}

impl Failure {
    pub fn new(field: FieldPath, message: impl Into<String>) -> Self {
        Failure {
            field,
            message: message.into(),
        }
    }
}

/// What a validator is looking at: where the value lives and what the user
/// calls it
#[derive(Debug, Clone, Copy)]
pub struct Subject<'a> {
    pub path: &'a FieldPath,
    pub label: &'a str,
}

impl<'a> Subject<'a> {
    pub fn new(path: &'a FieldPath, label: &'a str) -> Self {
        Subject { path, label }
    }

    fn fail(&self, message: String) -> Option<Failure> {
        Some(Failure::new(self.path.clone(), message))
    }
}

pub fn is_required(value: &FormValue, subject: Subject) -> Option<Failure> {
    if value.is_blank() {
        return subject.fail(format!("{} is required", subject.label));
    }
    None
}

/// Required check for file fields: satisfied by any surviving stored ref or
/// any new upload
pub fn has_files(state: &FileFieldState, subject: Subject) -> Option<Failure> {
    if state.total() == 0 {
        return subject.fail(format!("{} is required", subject.label));
    }
    None
}

pub fn min_length(value: &FormValue, subject: Subject, min: usize) -> Option<Failure> {
    let text = value.as_text()?;
    if text.chars().count() < min {
        return subject.fail(format!(
            "{} must be at least {} characters",
            subject.label, min
        ));
    }
    None
}

pub fn max_length(value: &FormValue, subject: Subject, max: usize) -> Option<Failure> {
    let text = value.as_text()?;
    if text.chars().count() > max {
        return subject.fail(format!(
            "{} must be at most {} characters",
            subject.label, max
        ));
    }
    None
}

fn email_regex() -> &'static Regex {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    EMAIL.get_or_init(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern compiles"))
}

pub fn is_valid_email(value: &FormValue, subject: Subject) -> Option<Failure> {
    let text = value.as_text()?.trim();
    if !text.is_empty() && !email_regex().is_match(text) {
        return subject.fail(format!("{} must be a valid email address", subject.label));
    }
    None
}

pub fn is_valid_enum(value: &FormValue, subject: Subject, allowed: &[&str]) -> Option<Failure> {
    let text = value.as_text()?;
    if allowed.is_empty() || text.is_empty() || allowed.contains(&text) {
        return None;
    }
    subject.fail(format!(
        "{} must be one of: {}",
        subject.label,
        allowed.join(", ")
    ))
}

/// Does `upload` satisfy an accept pattern such as `image/*,.pdf`?
pub fn accepts(accept: &str, upload: &Upload) -> bool {
    let content_type = upload.content_type.to_ascii_lowercase();
    let file_name = upload.file_name.to_ascii_lowercase();
    accept
        .split(',')
        .map(|p| p.trim().to_ascii_lowercase())
        .filter(|p| !p.is_empty())
        .any(|pattern| {
            if pattern.starts_with('.') {
                file_name.ends_with(&pattern)
            } else if let Some(family) = pattern.strip_suffix("/*") {
                content_type
                    .split_once('/')
                    .map_or(false, |(major, _)| major == family)
            } else {
                pattern == "*" || pattern == "*/*" || pattern == content_type
            }
        })
}

pub fn is_valid_file_type(file: &Upload, subject: Subject, accept: &str) -> Option<Failure> {
    if accepts(accept, file) {
        return None;
    }
    subject.fail(format!(
        "{} must be a file of type {}",
        subject.label, accept
    ))
}

pub fn is_numeric(value: &FormValue, subject: Subject) -> Option<Failure> {
    match value {
        FormValue::Number(n) if n.is_finite() => None,
        FormValue::Text(text) if text.trim().is_empty() => None,
        FormValue::Text(text) if text.trim().parse::<f64>().is_ok() => None,
        FormValue::Null => None,
        _ => subject.fail(format!("{} must be a number", subject.label)),
    }
}

pub fn max_value(value: &FormValue, subject: Subject, max: f64) -> Option<Failure> {
    let n = value.as_number()?;
    if n > max {
        return subject.fail(format!(
            "{} must be at most {}",
            subject.label,
            crate::value::format_number(max)
        ));
    }
    None
}

/// Drop the passes, keep the failures
pub fn validate(results: impl IntoIterator<Item = Option<Failure>>) -> Vec<Failure> {
    results.into_iter().flatten().collect()
}

/// The individual checks a field kind runs, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Check {
    Required,
    MinLength,
    MaxLength,
    Email,
    Enum,
    FileType,
    Numeric,
    MaxValue,
}

impl FieldKind {
    pub fn checks(&self) -> &'static [Check] {
        use Check::*;
        match self {
            FieldKind::Text | FieldKind::Textarea | FieldKind::Password => {
                &[Required, MinLength, MaxLength]
            }
            FieldKind::Email => &[Required, MinLength, MaxLength, Email],
            FieldKind::Select => &[Required, Enum],
            FieldKind::File => &[Required, FileType],
            FieldKind::Number => &[Required, Numeric, MaxValue],
            FieldKind::Checkbox => &[Required],
        }
    }
}

/// Validate one field, returning its first failure.
///
/// `removed` is the file field's removal side-channel; it is ignored for
/// other kinds. Disabled fields are never validated. A blank optional field
/// skips every other check.
pub fn validate_field(
    field: &FieldConfig,
    path: &FieldPath,
    value: Option<&FormValue>,
    removed: &[String],
) -> Option<Failure> {
    if field.disabled {
        return None;
    }
    let subject = Subject::new(path, &field.label);
    let null = FormValue::Null;
    let value = value.unwrap_or(&null);

    if field.kind == FieldKind::File {
        let state = FileFieldState::from_items(value.as_files().unwrap_or(&[]), removed);
        if state.total() == 0 {
            return if field.is_required() {
                has_files(&state, subject)
            } else {
                None
            };
        }
        return field.kind.checks().iter().find_map(|check| match check {
            Check::FileType => field.accept.as_deref().and_then(|accept| {
                state
                    .new_files
                    .iter()
                    .find_map(|upload| is_valid_file_type(upload, subject, accept))
            }),
            _ => None,
        });
    }

    if value.is_blank() {
        return if field.is_required() {
            is_required(value, subject)
        } else {
            None
        };
    }

    let options = field.option_values();
    field.kind.checks().iter().find_map(|check| match check {
        Check::Required => None,
        Check::MinLength => field.min_length.and_then(|n| min_length(value, subject, n)),
        Check::MaxLength => field.max_length.and_then(|n| max_length(value, subject, n)),
        Check::Email => is_valid_email(value, subject),
        Check::Enum => is_valid_enum(value, subject, &options),
        Check::FileType => None,
        Check::Numeric => is_numeric(value, subject),
        Check::MaxValue => field.max_value.and_then(|n| max_value(value, subject, n)),
    })
}

/// Per-field messages of the last validation pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors {
    by_field: BTreeMap<FieldPath, String>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: &FieldPath) -> Option<&str> {
        self.by_field.get(path).map(String::as_str)
    }

    pub fn insert(&mut self, path: FieldPath, message: impl Into<String>) {
        self.by_field.insert(path, message.into());
    }

    pub fn remove(&mut self, path: &FieldPath) -> Option<String> {
        self.by_field.remove(path)
    }

    pub fn clear(&mut self) {
        self.by_field.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.by_field.is_empty()
    }

    pub fn len(&self) -> usize {
        self.by_field.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&FieldPath, &str)> {
        self.by_field.iter().map(|(k, v)| (k, v.as_str()))
    }

    /// Keeps the first failure recorded per field
    pub fn extend_failures<'a>(&mut self, failures: impl IntoIterator<Item = &'a Failure>) {
        for failure in failures {
            self.by_field
                .entry(failure.field.clone())
                .or_insert_with(|| failure.message.clone());
        }
    }

    /// Re-key errors after entry `removed` of `array` was deleted: that
    /// entry's errors go away, later entries move down by one.
    pub fn shift_after_removal(&mut self, array: &FieldPath, removed: usize) {
        let position = array.len();
        let previous = std::mem::take(&mut self.by_field);
        for (path, message) in previous {
            match path.index_after(array) {
                Some(index) if index == removed => {}
                Some(index) if index > removed => {
                    self.by_field
                        .insert(path.with_index_at(position, index - 1), message);
                }
                _ => {
                    self.by_field.insert(path, message);
                }
            }
        }
    }

    /// All messages, one line each, for a notification surface
    pub fn summary(&self) -> String {
        self.by_field
            .values()
            .cloned()
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{FileItem, FileRef};

    fn path(name: &str) -> FieldPath {
        FieldPath::parse(name)
    }

    #[test]
    fn test_required_whitespace() {
        let p = path("name");
        let failure = is_required(&FormValue::text("   "), Subject::new(&p, "Name")).unwrap();
        assert_eq!(failure.message, "Name is required");
        assert!(is_required(&FormValue::text("x"), Subject::new(&p, "Name")).is_none());
    }

    #[test]
    fn test_length_bounds() {
        let p = path("name");
        let s = Subject::new(&p, "Name");
        assert_eq!(
            min_length(&FormValue::text("ab"), s, 5).unwrap().message,
            "Name must be at least 5 characters"
        );
        assert!(min_length(&FormValue::text("abcde"), s, 5).is_none());
        assert_eq!(
            max_length(&FormValue::text("abcdef"), s, 3).unwrap().message,
            "Name must be at most 3 characters"
        );
    }

    #[test]
    fn test_email() {
        let p = path("email");
        let s = Subject::new(&p, "Email");
        assert!(is_valid_email(&FormValue::text("ops@billboard.io"), s).is_none());
        assert!(is_valid_email(&FormValue::text("ops@billboard"), s).is_some());
        assert!(is_valid_email(&FormValue::text("not an email"), s).is_some());
    }

    #[test]
    fn test_enum() {
        let p = path("status");
        let s = Subject::new(&p, "Status");
        let allowed = ["draft", "published"];
        assert!(is_valid_enum(&FormValue::text("draft"), s, &allowed).is_none());
        assert_eq!(
            is_valid_enum(&FormValue::text("archived"), s, &allowed)
                .unwrap()
                .message,
            "Status must be one of: draft, published"
        );
    }

    #[test]
    fn test_accept_patterns() {
        let png = Upload::new("a.PNG", "image/png", vec![]);
        let pdf = Upload::new("terms.pdf", "application/pdf", vec![]);
        assert!(accepts("image/*", &png));
        assert!(!accepts("image/*", &pdf));
        assert!(accepts("image/*, .pdf", &pdf));
        assert!(accepts("image/png", &png));
        assert!(accepts(".png", &png));
        assert!(!accepts("image/jpeg", &png));
    }

    #[test]
    fn test_numeric_and_max() {
        let p = path("price");
        let s = Subject::new(&p, "Price");
        assert!(is_numeric(&FormValue::text("12.5"), s).is_none());
        assert_eq!(
            is_numeric(&FormValue::text("twelve"), s).unwrap().message,
            "Price must be a number"
        );
        assert_eq!(
            max_value(&FormValue::Number(150.0), s, 100.0)
                .unwrap()
                .message,
            "Price must be at most 100"
        );
    }

    #[test]
    fn test_validate_filters_passes() {
        let p = path("a");
        let s = Subject::new(&p, "A");
        let failures = validate([
            is_required(&FormValue::text("ok"), s),
            min_length(&FormValue::text("ok"), s, 5),
            max_length(&FormValue::text("ok"), s, 10),
        ]);
        assert_eq!(failures.len(), 1);
    }

    #[test]
    fn test_blank_required_short_circuits() {
        let field = FieldConfig::new("email", "Email", FieldKind::Email)
            .required()
            .min_length(5);
        let failure = validate_field(&field, &field.name, Some(&FormValue::text(" ")), &[]).unwrap();
        assert_eq!(failure.message, "Email is required");
    }

    #[test]
    fn test_first_failure_wins() {
        let field = FieldConfig::new("email", "Email", FieldKind::Email)
            .required()
            .min_length(10);
        let failure = validate_field(&field, &field.name, Some(&FormValue::text("a@b")), &[]).unwrap();
        assert_eq!(failure.message, "Email must be at least 10 characters");
    }

    #[test]
    fn test_blank_optional_skips_checks() {
        let field = FieldConfig::new("nickname", "Nickname", FieldKind::Text).min_length(3);
        assert!(validate_field(&field, &field.name, None, &[]).is_none());
    }

    #[test]
    fn test_file_required_satisfied_by_existing_ref() {
        let field = FieldConfig::new("cover", "Cover", FieldKind::File)
            .required()
            .accept("image/*");
        let value = FormValue::Files(vec![FileItem::Existing(FileRef::new(1, "/u/a.png"))]);
        assert!(validate_field(&field, &field.name, Some(&value), &[]).is_none());

        let removed = vec!["/u/a.png".to_string()];
        let failure = validate_field(&field, &field.name, Some(&value), &removed).unwrap();
        assert_eq!(failure.message, "Cover is required");
    }

    #[test]
    fn test_file_type_checked_on_new_files_only() {
        let field = FieldConfig::new("cover", "Cover", FieldKind::File).accept("image/*");
        let value = FormValue::Files(vec![
            FileItem::Existing(FileRef::new(1, "/u/old.bin")),
            FileItem::New(Upload::new("doc.pdf", "application/pdf", vec![1])),
        ]);
        let failure = validate_field(&field, &field.name, Some(&value), &[]).unwrap();
        assert_eq!(failure.message, "Cover must be a file of type image/*");
    }

    #[test]
    fn test_disabled_fields_skipped() {
        let mut field = FieldConfig::new("slug", "Slug", FieldKind::Text).required();
        field.disabled = true;
        assert!(validate_field(&field, &field.name, None, &[]).is_none());
    }

    #[test]
    fn test_error_shift_after_removal() {
        let array = FieldPath::key("features");
        let mut errors = ValidationErrors::new();
        errors.insert(array.at(0).child("title"), "zero");
        errors.insert(array.at(1).child("title"), "one");
        errors.insert(array.at(2).child("icon"), "two");
        errors.insert(FieldPath::key("name"), "name");

        errors.shift_after_removal(&array, 1);

        assert_eq!(errors.get(&array.at(0).child("title")), Some("zero"));
        assert_eq!(errors.get(&array.at(1).child("title")), None);
        assert_eq!(errors.get(&array.at(1).child("icon")), Some("two"));
        assert_eq!(errors.get(&array.at(2).child("icon")), None);
        assert_eq!(errors.get(&FieldPath::key("name")), Some("name"));
        assert_eq!(errors.len(), 3);
    }
}
