use crate::input::{TextInputState, ValidationMode};
use crate::store::{JsonStore, StoreError};
use crate::views;
use form_core::{
    seed_from_entity, ChangeEvent, EntityId, EntityStore, FieldConfig, FieldKind, FieldPath,
    FileItem, Form, FormSchema, FormValue, SchemaCatalog, SubmitError, SubmitOutcome, Upload,
};
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Tabs},
    Frame,
};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Browse,
    Edit,
    Create,
}

/// One management screen: a schema and the collection it edits
#[derive(Debug)]
pub struct Screen {
    pub schema: Arc<FormSchema>,
    pub store: JsonStore,
    pub list_state: ListState,
    pub ids: Vec<EntityId>,
}

impl Screen {
    fn new(schema: Arc<FormSchema>, store: JsonStore) -> Self {
        let mut list_state = ListState::default();
        list_state.select(Some(0));
        Self {
            schema,
            store,
            list_state,
            ids: Vec::new(),
        }
    }

    pub fn selected_id(&self) -> Option<EntityId> {
        self.list_state
            .selected()
            .and_then(|i| self.ids.get(i).copied())
    }

    pub fn title(&self) -> &str {
        if self.schema.title.is_empty() {
            &self.schema.name
        } else {
            &self.schema.title
        }
    }
}

/// The form being edited and the entity it came from
#[derive(Debug)]
pub struct Editing {
    pub form: Form,
    pub entity_id: Option<EntityId>,
}

/// A focusable line of the edit form
#[derive(Debug, Clone, PartialEq)]
pub enum EditRow {
    Field {
        path: FieldPath,
        field: FieldConfig,
        /// Dynamic entry index, for group fields
        entry: Option<usize>,
    },
    AddEntry,
}

pub struct App {
    pub screens: Vec<Screen>,
    pub current: usize,
    pub mode: Mode,

    pub editing: Option<Editing>,
    pub field_index: usize,
    pub text_input: TextInputState,
    pub message: Option<String>,
    pub preview: Option<Value>,

    // Popups
    pub show_discard_confirm: bool,
    pub show_delete_confirm: bool,
    pub show_file_input: bool,
    pub file_input: TextInputState,

    // Schema or store load error
    pub load_error: Option<String>,
}

impl App {
    pub fn new(schema_dir: &Path, data_dir: &Path) -> Self {
        let (screens, load_error) = match Self::load_screens(schema_dir, data_dir) {
            Ok(screens) => (screens, None),
            Err(e) => {
                error!(error = %e, "admin console failed to load");
                (Vec::new(), Some(e))
            }
        };

        let mut app = Self {
            screens,
            current: 0,
            mode: Mode::Browse,
            editing: None,
            field_index: 0,
            text_input: TextInputState::default(),
            message: None,
            preview: None,
            show_discard_confirm: false,
            show_delete_confirm: false,
            show_file_input: false,
            file_input: TextInputState::default(),
            load_error,
        };

        for index in 0..app.screens.len() {
            app.refresh_ids_for(index);
        }
        app.refresh_preview();
        app
    }

    fn load_screens(schema_dir: &Path, data_dir: &Path) -> Result<Vec<Screen>, String> {
        let catalog = SchemaCatalog::load_from_dir(schema_dir)
            .map_err(|e| format!("{}\n\n{}", e.error_message(), e.location_description()))?;
        if catalog.is_empty() {
            return Err(format!("No schemas found in {}", schema_dir.display()));
        }

        let mut screens = Vec::new();
        for name in catalog.names() {
            let Some(schema) = catalog.get(name) else {
                continue;
            };
            let store = JsonStore::open(data_dir, name)
                .map_err(|e| e.to_string())?
                .with_schema(Arc::clone(&schema));
            screens.push(Screen::new(schema, store));
        }
        info!(screens = screens.len(), "schemas loaded");
        Ok(screens)
    }

    fn refresh_ids_for(&mut self, index: usize) {
        let Some(screen) = self.screens.get_mut(index) else {
            return;
        };
        match screen.store.ids() {
            Ok(ids) => screen.ids = ids,
            Err(e) => {
                warn!(collection = screen.store.collection(), error = %e, "listing failed");
                self.message = Some(e.to_string());
            }
        }
        let len = screen.ids.len();
        match screen.list_state.selected() {
            Some(i) if i >= len && len > 0 => screen.list_state.select(Some(len - 1)),
            None if len > 0 => screen.list_state.select(Some(0)),
            _ => {}
        }
    }

    fn refresh_preview(&mut self) {
        self.preview = self.current_screen().and_then(|screen| {
            let id = screen.selected_id()?;
            match screen.store.fetch_by_id(id) {
                Ok(entity) => entity,
                Err(e) => {
                    warn!(id, error = %e, "preview fetch failed");
                    None
                }
            }
        });
    }

    pub fn current_screen(&self) -> Option<&Screen> {
        self.screens.get(self.current)
    }

    fn current_screen_mut(&mut self) -> Option<&mut Screen> {
        self.screens.get_mut(self.current)
    }

    pub fn clear_message(&mut self) {
        self.message = None;
    }

    pub fn switch_screen(&mut self, index: usize) {
        if self.mode == Mode::Browse && index < self.screens.len() {
            self.current = index;
            self.refresh_preview();
        }
    }

    pub fn list_up(&mut self) {
        if let Some(screen) = self.current_screen_mut() {
            if let Some(selected) = screen.list_state.selected() {
                if selected > 0 {
                    screen.list_state.select(Some(selected - 1));
                }
            }
        }
        self.refresh_preview();
    }

    pub fn list_down(&mut self) {
        if let Some(screen) = self.current_screen_mut() {
            let len = screen.ids.len();
            if let Some(selected) = screen.list_state.selected() {
                if selected < len.saturating_sub(1) {
                    screen.list_state.select(Some(selected + 1));
                }
            } else if len > 0 {
                screen.list_state.select(Some(0));
            }
        }
        self.refresh_preview();
    }

    pub fn enter_edit_mode(&mut self) {
        let Some(screen) = self.current_screen() else {
            return;
        };
        let Some(id) = screen.selected_id() else {
            return;
        };

        let entity = match screen.store.fetch_by_id(id) {
            Ok(Some(entity)) => entity,
            Ok(None) => {
                self.message = Some(format!("{} #{} no longer exists", screen.title(), id));
                self.refresh_ids_for(self.current);
                return;
            }
            Err(e) => {
                self.message = Some(e.to_string());
                return;
            }
        };

        match Form::from_shared(Arc::clone(&screen.schema)) {
            Ok(mut form) => {
                seed_from_entity(&entity, form.schema()).apply(&mut form);
                self.start_editing(Editing {
                    form,
                    entity_id: Some(id),
                });
                self.mode = Mode::Edit;
            }
            Err(e) => self.message = Some(e.to_string()),
        }
    }

    pub fn enter_create_mode(&mut self) {
        let Some(screen) = self.current_screen() else {
            return;
        };
        match Form::from_shared(Arc::clone(&screen.schema)) {
            Ok(form) => {
                self.start_editing(Editing {
                    form,
                    entity_id: None,
                });
                self.mode = Mode::Create;
            }
            Err(e) => self.message = Some(e.to_string()),
        }
    }

    fn start_editing(&mut self, editing: Editing) {
        self.editing = Some(editing);
        self.field_index = 0;
        self.update_text_input_for_field();
    }

    /// Esc in the edit form: leave at once, or ask first when there are edits
    pub fn cancel_edit(&mut self) {
        if self.editing.as_ref().map_or(false, |e| e.form.is_dirty()) {
            self.show_discard_confirm = true;
        } else {
            self.exit_edit();
        }
    }

    pub fn exit_edit(&mut self) {
        self.editing = None;
        self.show_discard_confirm = false;
        self.mode = Mode::Browse;
        self.refresh_preview();
    }

    /// Validate the form and hand its payload to the collection store
    pub fn submit(&mut self) {
        let Some(editing) = self.editing.as_mut() else {
            return;
        };
        let Some(screen) = self.screens.get_mut(self.current) else {
            return;
        };
        let entity_id = editing.entity_id;
        let mut saved_id = None;

        let result = editing.form.submit(|submission| -> Result<(), StoreError> {
            let entity = match entity_id {
                Some(id) => screen.store.update(id, submission.payload())?,
                None => screen.store.add(submission.payload())?,
            };
            saved_id = entity.get("id").and_then(Value::as_u64);
            Ok(())
        });

        match result {
            Ok(SubmitOutcome::Submitted) => {
                let title = screen.title().to_string();
                self.message = Some(match saved_id {
                    Some(id) => format!("Saved {} #{}", title, id),
                    None => format!("Saved {}", title),
                });
                self.refresh_ids_for(self.current);
                if let (Some(id), Some(screen)) = (saved_id, self.current_screen_mut()) {
                    if let Some(pos) = screen.ids.iter().position(|i| *i == id) {
                        screen.list_state.select(Some(pos));
                    }
                }
                self.exit_edit();
            }
            Ok(SubmitOutcome::Invalid(failures)) => {
                let first = failures.first().map(|f| f.field.clone());
                self.message = Some(match failures.first() {
                    Some(failure) if failures.len() > 1 => {
                        format!("{} (and {} more)", failure.message, failures.len() - 1)
                    }
                    Some(failure) => failure.message.clone(),
                    None => "Please fix the highlighted fields".to_string(),
                });
                if let Some(path) = first {
                    self.focus_path(&path);
                }
            }
            Err(SubmitError::InProgress(e)) => self.message = Some(e.to_string()),
            Err(SubmitError::Rejected(e)) => {
                error!(error = %e, "save failed");
                self.message = Some(format!("Save failed: {}", e));
            }
        }
    }

    pub fn request_delete(&mut self) {
        if self.current_screen().and_then(Screen::selected_id).is_some() {
            self.show_delete_confirm = true;
        }
    }

    pub fn confirm_delete(&mut self) {
        self.show_delete_confirm = false;
        let Some(screen) = self.current_screen_mut() else {
            return;
        };
        let Some(id) = screen.selected_id() else {
            return;
        };
        let title = screen.title().to_string();
        self.message = Some(match screen.store.delete(id) {
            Ok(()) => format!("Deleted {} #{}", title, id),
            Err(e) => e.to_string(),
        });
        self.refresh_ids_for(self.current);
        self.refresh_preview();
    }

    // Edit form rows

    /// Focusable rows of the active tab: its fields, then each dynamic entry's
    /// fields, then the add-entry row
    pub fn edit_rows(&self) -> Vec<EditRow> {
        let Some(editing) = &self.editing else {
            return Vec::new();
        };
        let form = &editing.form;
        let mut rows: Vec<EditRow> = form
            .active_field_set()
            .iter()
            .map(|field| EditRow::Field {
                path: field.name.clone(),
                field: field.clone(),
                entry: None,
            })
            .collect();

        if let Some(section) = form.active_dynamic_config() {
            let array = section.path();
            for index in 0..form.values().entries(section.name).len() {
                for field in section.config {
                    rows.push(EditRow::Field {
                        path: array.at(index).join(&field.name),
                        field: field.clone(),
                        entry: Some(index),
                    });
                }
            }
            rows.push(EditRow::AddEntry);
        }
        rows
    }

    fn current_row(&self) -> Option<EditRow> {
        self.edit_rows().into_iter().nth(self.field_index)
    }

    /// The focused field, when it accepts edits
    fn current_field(&self) -> Option<(FieldPath, FieldConfig)> {
        match self.current_row()? {
            EditRow::Field { path, field, .. } if !field.read_only && !field.disabled => {
                Some((path, field))
            }
            _ => None,
        }
    }

    fn current_kind(&self) -> Option<FieldKind> {
        self.current_field().map(|(_, field)| field.kind)
    }

    pub fn is_add_entry_row(&self) -> bool {
        matches!(self.current_row(), Some(EditRow::AddEntry))
    }

    pub fn is_select_field(&self) -> bool {
        self.current_kind() == Some(FieldKind::Select)
    }

    pub fn is_checkbox_field(&self) -> bool {
        self.current_kind() == Some(FieldKind::Checkbox)
    }

    pub fn is_file_field(&self) -> bool {
        self.current_kind() == Some(FieldKind::File)
    }

    fn focus_path(&mut self, path: &FieldPath) {
        if let Some(pos) = self
            .edit_rows()
            .iter()
            .position(|row| matches!(row, EditRow::Field { path: p, .. } if p == path))
        {
            self.field_index = pos;
            self.update_text_input_for_field();
        }
    }

    // Field navigation
    pub fn next_field(&mut self) {
        let count = self.edit_rows().len();
        if self.field_index < count.saturating_sub(1) {
            self.field_index += 1;
            self.update_text_input_for_field();
        }
    }

    pub fn prev_field(&mut self) {
        if self.field_index > 0 {
            self.field_index -= 1;
            self.update_text_input_for_field();
        }
    }

    fn clamp_field_index(&mut self) {
        let count = self.edit_rows().len();
        self.field_index = self.field_index.min(count.saturating_sub(1));
        self.update_text_input_for_field();
    }

    fn update_text_input_for_field(&mut self) {
        let value = match (&self.editing, self.current_row()) {
            (Some(editing), Some(EditRow::Field { path, .. })) => editing
                .form
                .get_value(&path)
                .map(FormValue::display_string)
                .unwrap_or_default(),
            _ => String::new(),
        };
        self.text_input = TextInputState::new(value);
    }

    /// Move to the previous or next form tab
    pub fn switch_form_tab(&mut self, offset: isize) {
        let Some(editing) = self.editing.as_mut() else {
            return;
        };
        let Some(id) = editing.form.router().neighbor(offset) else {
            return;
        };
        if let Err(e) = editing.form.select_tab(id) {
            self.message = Some(e.to_string());
            return;
        }
        self.field_index = 0;
        self.update_text_input_for_field();
    }

    // Dynamic entries

    pub fn append_entry(&mut self) {
        let Some(editing) = self.editing.as_mut() else {
            return;
        };
        let Some(mut array) = editing.form.active_field_array() else {
            self.message = Some("This tab has no repeating entries".to_string());
            return;
        };
        match array.append(None) {
            Ok(_) => {
                let index = array.len() - 1;
                let path = FieldPath::key(array.name()).at(index);
                let first = array
                    .config()
                    .first()
                    .map(|field| path.join(&field.name));
                if let Some(first) = first {
                    self.focus_path(&first);
                }
            }
            Err(e) => self.message = Some(e.to_string()),
        }
    }

    pub fn remove_entry(&mut self) {
        let Some(EditRow::Field {
            entry: Some(index), ..
        }) = self.current_row()
        else {
            self.message = Some("Move to an entry to remove it".to_string());
            return;
        };
        let Some(editing) = self.editing.as_mut() else {
            return;
        };
        let Some(mut array) = editing.form.active_field_array() else {
            return;
        };
        match array.remove(index) {
            Ok(_) => self.message = Some(format!("Removed entry #{}", index + 1)),
            Err(e) => self.message = Some(e.to_string()),
        }
        self.clamp_field_index();
    }

    // Value editing

    fn write_value(&mut self, path: &FieldPath, value: FormValue) {
        let Some(editing) = self.editing.as_mut() else {
            return;
        };
        if let Err(e) = editing.form.set_value_validated(path, value) {
            warn!(field = %path, error = %e, "value rejected");
            self.message = Some(e.to_string());
        }
    }

    fn apply_text_input(&mut self) {
        let Some((path, field)) = self.current_field() else {
            return;
        };
        let text = self.text_input.value().to_string();
        let value = match field.kind {
            FieldKind::Number => text
                .trim()
                .parse::<f64>()
                .map_or_else(|_| FormValue::Text(text.clone()), FormValue::Number),
            _ => FormValue::Text(text),
        };
        self.write_value(&path, value);
    }

    fn accepts_text(&self) -> Option<FieldKind> {
        self.current_kind()
            .filter(|kind| views::form::takes_text(*kind))
    }

    pub fn text_input_char(&mut self, c: char) {
        let Some(kind) = self.accepts_text() else {
            return;
        };
        if ValidationMode::for_kind(kind).validate(c) {
            self.text_input.insert(c);
            self.apply_text_input();
        }
    }

    pub fn text_input_backspace(&mut self) {
        if self.accepts_text().is_some() {
            self.text_input.backspace();
            self.apply_text_input();
        }
    }

    pub fn text_input_delete(&mut self) {
        if self.accepts_text().is_some() {
            self.text_input.delete();
            self.apply_text_input();
        }
    }

    pub fn text_input_left(&mut self) {
        self.text_input.move_left();
    }

    pub fn text_input_right(&mut self) {
        self.text_input.move_right();
    }

    pub fn text_input_home(&mut self) {
        self.text_input.move_home();
    }

    pub fn text_input_end(&mut self) {
        self.text_input.move_end();
    }

    /// Step through a select field's options, wrapping around
    pub fn cycle_option(&mut self, step: isize) {
        let Some((path, field)) = self.current_field() else {
            return;
        };
        if field.options.is_empty() {
            return;
        }
        let current = self
            .editing
            .as_ref()
            .and_then(|e| e.form.get_value(&path))
            .map(FormValue::display_string)
            .unwrap_or_default();
        let len = field.options.len() as isize;
        let next = match field.options.iter().position(|o| o.value == current) {
            Some(pos) => (pos as isize + step).rem_euclid(len),
            None if step < 0 => len - 1,
            None => 0,
        };
        let value = field.options[next as usize].value.clone();
        self.write_value(&path, FormValue::Text(value));
    }

    pub fn toggle_checkbox(&mut self) {
        let Some((path, _)) = self.current_field() else {
            return;
        };
        let checked = self
            .editing
            .as_ref()
            .and_then(|e| e.form.get_value(&path))
            .map_or(false, |v| matches!(v, FormValue::Bool(true)));
        self.write_value(&path, FormValue::Bool(!checked));
    }

    // File attachments

    pub fn open_file_input(&mut self) {
        if self.is_file_field() {
            self.file_input = TextInputState::default();
            self.show_file_input = true;
        }
    }

    /// Attach the file named in the path popup to the focused file field
    pub fn confirm_file_input(&mut self) {
        self.show_file_input = false;
        let Some((path, field)) = self.current_field() else {
            return;
        };
        let source = Path::new(self.file_input.value().trim()).to_path_buf();
        let bytes = match std::fs::read(&source) {
            Ok(bytes) => bytes,
            Err(e) => {
                self.message = Some(format!("Cannot read {}: {}", source.display(), e));
                return;
            }
        };
        let file_name = source
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "upload".to_string());
        let upload = Upload::new(file_name, content_type_for(&source), bytes);

        let mut items = self.current_files(&path);
        let mut removed = Vec::new();
        if !field.multiple {
            removed = existing_urls(&items);
            items.clear();
        }
        items.push(FileItem::New(upload));
        self.change_files(&path, items, removed);
    }

    /// Drop the last file of the focused file field
    pub fn remove_last_file(&mut self) {
        let Some((path, _)) = self.current_field() else {
            return;
        };
        let mut items = self.current_files(&path);
        let removed = match items.pop() {
            Some(FileItem::Existing(file_ref)) => vec![file_ref.url],
            Some(FileItem::New(_)) => Vec::new(),
            None => return,
        };
        self.change_files(&path, items, removed);
    }

    fn current_files(&self, path: &FieldPath) -> Vec<FileItem> {
        self.editing
            .as_ref()
            .and_then(|e| e.form.get_value(path))
            .and_then(FormValue::as_files)
            .map(<[FileItem]>::to_vec)
            .unwrap_or_default()
    }

    fn change_files(&mut self, path: &FieldPath, items: Vec<FileItem>, removed: Vec<String>) {
        let Some(editing) = self.editing.as_mut() else {
            return;
        };
        let event = ChangeEvent::new(path.clone(), FormValue::Files(items)).with_removed(removed);
        match editing.form.notify_change(event) {
            Ok(()) => {
                editing.form.revalidate(path);
            }
            Err(e) => self.message = Some(e.to_string()),
        }
    }

    // Rendering
    pub fn render(&mut self, f: &mut Frame) {
        if let Some(ref error) = self.load_error {
            self.render_load_error(f, error.clone());
            return;
        }

        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3), // Screen tabs
                Constraint::Min(0),    // Main content
                Constraint::Length(3), // Help bar
            ])
            .split(f.area());

        self.render_tabs(f, chunks[0]);
        self.render_main(f, chunks[1]);
        self.render_help(f, chunks[2]);

        if self.show_discard_confirm {
            self.render_discard_confirm(f);
        }
        if self.show_delete_confirm {
            self.render_delete_confirm(f);
        }
        if self.show_file_input {
            self.render_file_input(f);
        }
    }

    fn render_load_error(&self, f: &mut Frame, error: String) {
        let area = centered_rect(60, 40, f.area());
        f.render_widget(Clear, area);

        let mut text = vec![
            Line::from(Span::styled(
                "Schema Error",
                Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
            )),
            Line::from(""),
        ];
        text.extend(error.lines().map(|line| Line::from(line.to_string())));
        text.push(Line::from(""));
        text.push(Line::from(Span::styled(
            "Press q to quit",
            Style::default().fg(Color::DarkGray),
        )));

        let paragraph = Paragraph::new(text).block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Red)),
        );
        f.render_widget(paragraph, area);
    }

    fn render_tabs(&self, f: &mut Frame, area: Rect) {
        let titles: Vec<String> = self
            .screens
            .iter()
            .enumerate()
            .map(|(i, screen)| format!("{}:{}", i + 1, screen.title()))
            .collect();

        let tabs = Tabs::new(titles)
            .select(self.current)
            .style(Style::default())
            .highlight_style(
                Style::default()
                    .fg(Color::Cyan)
                    .add_modifier(Modifier::BOLD),
            )
            .divider("|")
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .title(" Admin Console "),
            );

        f.render_widget(tabs, area);
    }

    fn render_main(&mut self, f: &mut Frame, area: Rect) {
        let chunks = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(30), Constraint::Percentage(70)])
            .split(area);

        self.render_list(f, chunks[0]);
        match self.mode {
            Mode::Browse => self.render_detail_preview(f, chunks[1]),
            Mode::Edit | Mode::Create => self.render_edit_form(f, chunks[1]),
        }
    }

    fn render_list(&mut self, f: &mut Frame, area: Rect) {
        let browsing = self.mode == Mode::Browse;
        let Some(screen) = self.screens.get_mut(self.current) else {
            return;
        };

        let items: Vec<ListItem> = screen
            .ids
            .iter()
            .map(|id| ListItem::new(format!("#{}", id)))
            .collect();

        let border_style = if browsing {
            Style::default().fg(Color::Cyan)
        } else {
            Style::default()
        };

        let title = format!(" {} ", screen.title());
        let list = List::new(items)
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .border_style(border_style)
                    .title(title),
            )
            .highlight_style(
                Style::default()
                    .bg(Color::DarkGray)
                    .add_modifier(Modifier::BOLD),
            )
            .highlight_symbol("> ");

        f.render_stateful_widget(list, area, &mut screen.list_state);
    }

    fn render_detail_preview(&self, f: &mut Frame, area: Rect) {
        let content = match self.current_screen() {
            Some(screen) => match screen.selected_id() {
                Some(id) => views::entity::render_preview(&screen.schema, id, self.preview.as_ref()),
                None => vec![Line::from("No entry selected")],
            },
            None => vec![Line::from("No screens")],
        };

        let paragraph =
            Paragraph::new(content).block(Block::default().borders(Borders::ALL).title(" Detail "));
        f.render_widget(paragraph, area);
    }

    fn render_edit_form(&self, f: &mut Frame, area: Rect) {
        let title = match self.editing.as_ref().and_then(|e| e.entity_id) {
            Some(id) => format!(" Edit #{} ", id),
            None => " Create New ".to_string(),
        };

        let content = match &self.editing {
            Some(editing) => views::form::render_edit_form(editing, self),
            None => vec![Line::from("No entry being edited")],
        };

        // Keep the focused row in view
        let focus_line = content
            .iter()
            .position(|line| line.spans.first().map_or(false, |s| s.content == "> "))
            .unwrap_or(0) as u16;
        let height = area.height.saturating_sub(2);
        let scroll = focus_line.saturating_sub(height.saturating_sub(2));

        let paragraph = Paragraph::new(content).scroll((scroll, 0)).block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Cyan))
                .title(title),
        );
        f.render_widget(paragraph, area);
    }

    fn render_help(&self, f: &mut Frame, area: Rect) {
        let help_text = if let Some(ref msg) = self.message {
            Span::styled(msg.clone(), Style::default().fg(Color::Yellow))
        } else {
            match self.mode {
                Mode::Browse => {
                    Span::raw("1-9:Screen | j/k:Nav | e:Edit | n:New | d:Delete | q:Quit")
                }
                Mode::Edit | Mode::Create => Span::raw(
                    "Tab:Next | PgUp/PgDn:Section | Ctrl+A:Add | Ctrl+D:Remove | Ctrl+S:Save | Esc:Cancel",
                ),
            }
        };

        let dirty_indicator = if self.editing.as_ref().map_or(false, |e| e.form.is_dirty()) {
            Span::styled(" [*Modified] ", Style::default().fg(Color::Yellow))
        } else {
            Span::raw("")
        };

        let help = Paragraph::new(Line::from(vec![help_text, dirty_indicator]))
            .block(Block::default().borders(Borders::ALL).title(" Help "));
        f.render_widget(help, area);
    }

    fn render_discard_confirm(&self, f: &mut Frame) {
        let area = centered_rect(40, 20, f.area());
        f.render_widget(Clear, area);

        let text = vec![
            Line::from("You have unsaved changes."),
            Line::from(""),
            Line::from("Discard them? (y/n)"),
        ];

        let paragraph = Paragraph::new(text).block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Yellow))
                .title(" Confirm Discard "),
        );
        f.render_widget(paragraph, area);
    }

    fn render_delete_confirm(&self, f: &mut Frame) {
        let area = centered_rect(40, 20, f.area());
        f.render_widget(Clear, area);

        let label = self
            .current_screen()
            .and_then(|s| s.selected_id().map(|id| format!("{} #{}", s.title(), id)))
            .unwrap_or_else(|| "???".to_string());
        let text = vec![
            Line::from(format!("Delete {}?", label)),
            Line::from(""),
            Line::from("Press y to confirm, n to cancel"),
        ];

        let paragraph = Paragraph::new(text).block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Red))
                .title(" Confirm Delete "),
        );
        f.render_widget(paragraph, area);
    }

    fn render_file_input(&self, f: &mut Frame) {
        let area = centered_rect(50, 15, f.area());
        f.render_widget(Clear, area);

        let text = vec![
            Line::from("Path of the file to attach:"),
            Line::from(""),
            Line::from(Span::styled(
                self.file_input.display_with_cursor(false),
                Style::default().fg(Color::Cyan),
            )),
        ];

        let paragraph = Paragraph::new(text).block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Cyan))
                .title(" Attach File (Enter:Attach | Esc:Cancel) "),
        );
        f.render_widget(paragraph, area);
    }
}

fn existing_urls(items: &[FileItem]) -> Vec<String> {
    items
        .iter()
        .filter_map(|item| match item {
            FileItem::Existing(file_ref) => Some(file_ref.url.clone()),
            FileItem::New(_) => None,
        })
        .collect()
}

/// Mime type guessed from the file extension
pub fn content_type_for(path: &Path) -> String {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "pdf" => "application/pdf",
        "mp4" => "video/mp4",
        "txt" => "text/plain",
        _ => "application/octet-stream",
    }
    .to_string()
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}
