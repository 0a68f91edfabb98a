use super::{hint, render_error_line, render_field_line, render_section_header};
use crate::app::{App, EditRow, Editing};
use form_core::{FieldConfig, FieldKind, FileItem, Form, FormValue};
use ratatui::{
    style::{Color, Modifier, Style},
    text::{Line, Span},
};

/// Short human rendering of a field value
pub fn value_summary(field: &FieldConfig, value: Option<&FormValue>) -> String {
    let null = FormValue::Null;
    let value = value.unwrap_or(&null);
    match (field.kind, value) {
        (FieldKind::Checkbox, FormValue::Bool(true)) => "[x]".to_string(),
        (FieldKind::Checkbox, _) => "[ ]".to_string(),
        (FieldKind::Select, value) => {
            let current = value.display_string();
            field
                .options
                .iter()
                .find(|option| option.value == current)
                .map_or_else(|| "(choose)".to_string(), |option| format!("< {} >", option.label))
        }
        (FieldKind::File, FormValue::Files(items)) if !items.is_empty() => items
            .iter()
            .map(|item| match item {
                FileItem::Existing(file_ref) => file_ref.url.clone(),
                FileItem::New(upload) => format!("{} (new)", upload.file_name),
            })
            .collect::<Vec<_>>()
            .join(", "),
        (FieldKind::File, _) => "(none)".to_string(),
        (FieldKind::Password, value) => "*".repeat(value.display_string().chars().count()),
        (_, value) => value.display_string(),
    }
}

/// `1:Details | 2:Features` with the active tab highlighted
pub fn render_tab_strip(form: &Form) -> Option<Line<'static>> {
    let tabs = form.router().tabs();
    if tabs.is_empty() {
        return None;
    }
    let active = form.active_tab_id();
    let mut spans = Vec::new();
    for (i, tab) in tabs.iter().enumerate() {
        if i > 0 {
            spans.push(Span::styled(" | ", Style::default().fg(Color::DarkGray)));
        }
        let style = if Some(tab.id) == active {
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD | Modifier::UNDERLINED)
        } else {
            Style::default().fg(Color::Gray)
        };
        spans.push(Span::styled(tab.label.clone(), style));
    }
    Some(Line::from(spans))
}

pub fn render_edit_form(editing: &Editing, app: &App) -> Vec<Line<'static>> {
    let form = &editing.form;
    let mut lines = Vec::new();
    if let Some(strip) = render_tab_strip(form) {
        lines.push(strip);
        lines.push(Line::from(""));
    }

    let dynamic = form.active_dynamic_config();
    let mut last_entry = None;
    for (row_idx, row) in app.edit_rows().iter().enumerate() {
        match row {
            EditRow::Field { path, field, entry } => {
                if let (Some(index), Some(section)) = (entry, dynamic) {
                    if last_entry != Some(*index) {
                        lines.push(Line::from(""));
                        lines.push(render_section_header(&format!("{} #{}", section.name, index + 1)));
                        last_entry = Some(*index);
                    }
                }

                let locked = field.read_only || field.disabled;
                let is_current = app.field_index == row_idx;
                let value = if is_current && !locked && takes_text(field.kind) {
                    app.text_input
                        .display_with_cursor(field.kind == FieldKind::Password)
                } else {
                    value_summary(field, form.get_value(path))
                };
                let label = if field.is_required() {
                    format!("{}*", field.label)
                } else {
                    field.label.clone()
                };

                let mut line = render_field_line(&label, &value, row_idx, app, locked);
                if locked {
                    line.spans.push(hint("read only"));
                } else if is_current {
                    match field.kind {
                        FieldKind::Select => line.spans.push(hint("Up/Down: choose")),
                        FieldKind::Checkbox => line.spans.push(hint("Space: toggle")),
                        FieldKind::File => line.spans.push(hint("Enter: attach, x: remove last")),
                        _ => {}
                    }
                }
                lines.push(line);

                if let Some(message) = form.error(path) {
                    lines.push(render_error_line(message));
                }
            }
            EditRow::AddEntry => {
                let count = dynamic.map_or(0, |section| form.values().entries(section.name).len());
                let limit = dynamic
                    .and_then(|section| section.limit)
                    .map_or_else(String::new, |limit| format!(" {}/{}", count, limit));
                lines.push(Line::from(""));
                lines.push(render_field_line("[+ Add entry]", &limit, row_idx, app, false));
            }
        }
    }

    if lines.is_empty() {
        lines.push(Line::from("This form has no fields"));
    }
    lines
}

/// Kinds edited through the text input
pub fn takes_text(kind: FieldKind) -> bool {
    matches!(
        kind,
        FieldKind::Text | FieldKind::Textarea | FieldKind::Password | FieldKind::Email | FieldKind::Number
    )
}
