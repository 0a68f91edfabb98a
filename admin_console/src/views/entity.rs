use super::form::value_summary;
use super::{preview_line, preview_line_colored, render_section_header};
use form_core::{seed_from_entity, EntityId, FieldConfig, FormSchema};
use ratatui::{
    style::{Color, Modifier, Style},
    text::{Line, Span},
};
use serde_json::Value;

pub fn render_preview(schema: &FormSchema, id: EntityId, entity: Option<&Value>) -> Vec<Line<'static>> {
    let Some(entity) = entity else {
        return vec![Line::from(format!("{} #{} not found", schema.title, id))];
    };
    let seed = seed_from_entity(entity, schema);

    let mut lines = vec![
        Line::from(Span::styled(
            format!("{} #{}", schema.title, id),
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
    ];

    let push_fields = |lines: &mut Vec<Line<'static>>, fields: &[FieldConfig]| {
        for field in fields {
            let summary = value_summary(field, seed.values.get(&field.name));
            if summary.is_empty() {
                lines.push(preview_line_colored(&field.label, "-", Color::DarkGray));
            } else {
                lines.push(preview_line(&field.label, &summary));
            }
        }
    };

    if schema.is_tabbed() {
        for tab in &schema.tabs {
            lines.push(render_section_header(&tab.label));
            push_fields(&mut lines, &tab.fields);
            if let Some(section) = tab.dynamic() {
                let rows = seed
                    .groups
                    .iter()
                    .find(|(name, _)| name == section.name)
                    .map_or(&[][..], |(_, rows)| rows.as_slice());
                lines.push(preview_line_colored(
                    &format!("  {}", section.name),
                    &format!("{} entries", rows.len()),
                    Color::Yellow,
                ));
                for row in rows {
                    let summary: Vec<String> = section
                        .config
                        .iter()
                        .map(|field| value_summary(field, row.get(&field.group_key())))
                        .filter(|s| !s.is_empty())
                        .collect();
                    lines.push(Line::from(vec![
                        Span::raw("    - "),
                        Span::styled(summary.join(" / "), Style::default().fg(Color::White)),
                    ]));
                }
            }
            lines.push(Line::from(""));
        }
    } else {
        push_fields(&mut lines, &schema.fields);
    }

    lines
}
