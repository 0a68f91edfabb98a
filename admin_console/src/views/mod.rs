pub mod entity;
pub mod form;

use crate::app::App;
use ratatui::{
    style::{Color, Modifier, Style},
    text::{Line, Span},
};

/// Helper to render a field line in the edit form
pub fn render_field_line(
    label: &str,
    value: &str,
    row_idx: usize,
    app: &App,
    locked: bool,
) -> Line<'static> {
    let is_current = app.field_index == row_idx;

    let label_style = Style::default().fg(Color::Gray);
    let value_style = if locked {
        Style::default().fg(Color::DarkGray)
    } else if is_current {
        Style::default()
            .fg(Color::Cyan)
            .add_modifier(Modifier::BOLD)
    } else {
        Style::default()
    };

    let focus_marker = if is_current { "> " } else { "  " };

    Line::from(vec![
        Span::styled(focus_marker.to_string(), Style::default().fg(Color::Cyan)),
        Span::styled(format!("{}: ", label), label_style),
        Span::styled(value.to_string(), value_style),
    ])
}

/// Inline validation message under a field
pub fn render_error_line(message: &str) -> Line<'static> {
    Line::from(Span::styled(
        format!("    ! {}", message),
        Style::default().fg(Color::Red),
    ))
}

/// Helper to render a section header
pub fn render_section_header(title: &str) -> Line<'static> {
    Line::from(Span::styled(
        title.to_string(),
        Style::default()
            .fg(Color::Yellow)
            .add_modifier(Modifier::BOLD | Modifier::UNDERLINED),
    ))
}

/// Dimmed hint appended to the focused row
pub fn hint(text: &str) -> Span<'static> {
    Span::styled(format!(" [{}]", text), Style::default().fg(Color::DarkGray))
}

/// Helper for preview key-value line
pub fn preview_line(label: &str, value: &str) -> Line<'static> {
    Line::from(vec![
        Span::styled(format!("{}: ", label), Style::default().fg(Color::Gray)),
        Span::raw(value.to_string()),
    ])
}

/// Helper for preview key-value line with colored value
pub fn preview_line_colored(label: &str, value: &str, color: Color) -> Line<'static> {
    Line::from(vec![
        Span::styled(format!("{}: ", label), Style::default().fg(Color::Gray)),
        Span::styled(value.to_string(), Style::default().fg(color)),
    ])
}
