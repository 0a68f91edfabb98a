mod app;
mod input;
mod store;
mod views;

use app::{App, Mode};
use clap::Parser;
use crossterm::{
    event::{
        self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind, KeyModifiers,
    },
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const LOG_FILE: &str = "admin_console.log";

#[derive(Parser, Debug)]
#[command(name = "admin_console", version, about = "Terminal admin console for schema-driven forms")]
struct Args {
    /// Directory of form schema TOML files
    #[arg(long, default_value = "schemas")]
    schemas: PathBuf,

    /// Directory holding stored entities and uploads
    #[arg(long, default_value = "data")]
    data: PathBuf,
}

/// Log to a file; the terminal belongs to the UI.
/// Filter with `ADMIN_CONSOLE_LOG`, e.g. `ADMIN_CONSOLE_LOG=form_core=debug`.
fn init_logging() -> io::Result<()> {
    let file = File::create(LOG_FILE)?;
    let filter = EnvFilter::try_from_env("ADMIN_CONSOLE_LOG")
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(Mutex::new(file)).with_ansi(false))
        .init();
    Ok(())
}

fn main() -> Result<(), io::Error> {
    let args = Args::parse();
    init_logging()?;
    info!(schemas = %args.schemas.display(), data = %args.data.display(), "starting admin console");

    let app = App::new(&args.schemas, &args.data);

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = run_app(&mut terminal, app);

    // Restore terminal
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        println!("Error: {err:?}");
    }

    Ok(())
}

fn run_app(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>, mut app: App) -> io::Result<()> {
    loop {
        terminal.draw(|f| app.render(f))?;

        if let Event::Key(key) = event::read()? {
            if key.kind != KeyEventKind::Press {
                continue;
            }

            app.clear_message();

            // Ctrl+C always quits
            if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
                return Ok(());
            }

            if key.code == KeyCode::Char('q') && (app.mode == Mode::Browse || app.load_error.is_some()) {
                return Ok(());
            }

            if app.show_discard_confirm {
                match key.code {
                    KeyCode::Char('y') | KeyCode::Char('Y') => app.exit_edit(),
                    KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => {
                        app.show_discard_confirm = false;
                    }
                    _ => {}
                }
                continue;
            }

            if app.show_delete_confirm {
                match key.code {
                    KeyCode::Char('y') | KeyCode::Char('Y') => app.confirm_delete(),
                    KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => {
                        app.show_delete_confirm = false;
                    }
                    _ => {}
                }
                continue;
            }

            if app.show_file_input {
                match key.code {
                    KeyCode::Enter => app.confirm_file_input(),
                    KeyCode::Esc => app.show_file_input = false,
                    KeyCode::Backspace => app.file_input.backspace(),
                    KeyCode::Delete => app.file_input.delete(),
                    KeyCode::Left => app.file_input.move_left(),
                    KeyCode::Right => app.file_input.move_right(),
                    KeyCode::Home => app.file_input.move_home(),
                    KeyCode::End => app.file_input.move_end(),
                    KeyCode::Char(c) => app.file_input.insert(c),
                    _ => {}
                }
                continue;
            }

            if app.load_error.is_some() {
                continue;
            }

            match app.mode {
                Mode::Browse => handle_browse_mode(&mut app, key.code),
                Mode::Edit | Mode::Create => handle_edit_mode(&mut app, key.code, key.modifiers),
            }
        }
    }
}

fn handle_browse_mode(app: &mut App, code: KeyCode) {
    match code {
        // Screen switching with number keys
        KeyCode::Char(c @ '1'..='9') => {
            if let Some(digit) = c.to_digit(10) {
                app.switch_screen(digit as usize - 1);
            }
        }

        // List navigation
        KeyCode::Up | KeyCode::Char('k') => app.list_up(),
        KeyCode::Down | KeyCode::Char('j') => app.list_down(),

        // Actions
        KeyCode::Enter | KeyCode::Char('e') => app.enter_edit_mode(),
        KeyCode::Char('n') => app.enter_create_mode(),
        KeyCode::Char('d') | KeyCode::Delete => app.request_delete(),

        _ => {}
    }
}

fn handle_edit_mode(app: &mut App, code: KeyCode, modifiers: KeyModifiers) {
    if modifiers.contains(KeyModifiers::CONTROL) {
        match code {
            KeyCode::Char('s') => app.submit(),
            KeyCode::Char('a') => app.append_entry(),
            KeyCode::Char('d') => app.remove_entry(),
            KeyCode::Up | KeyCode::Char('k') => app.prev_field(),
            KeyCode::Down | KeyCode::Char('j') => app.next_field(),
            _ => {}
        }
        return;
    }

    match code {
        KeyCode::Esc => app.cancel_edit(),
        KeyCode::Tab => app.next_field(),
        KeyCode::BackTab => app.prev_field(),
        KeyCode::PageDown => app.switch_form_tab(1),
        KeyCode::PageUp => app.switch_form_tab(-1),

        KeyCode::Enter if app.is_add_entry_row() => app.append_entry(),

        // Select fields
        KeyCode::Up if app.is_select_field() => app.cycle_option(-1),
        KeyCode::Down if app.is_select_field() => app.cycle_option(1),
        KeyCode::Enter if app.is_select_field() => app.cycle_option(1),

        KeyCode::Char(' ') | KeyCode::Enter if app.is_checkbox_field() => app.toggle_checkbox(),

        // File fields
        KeyCode::Enter if app.is_file_field() => app.open_file_input(),
        KeyCode::Char('x') | KeyCode::Delete if app.is_file_field() => app.remove_last_file(),

        KeyCode::Up => app.prev_field(),
        KeyCode::Down | KeyCode::Enter => app.next_field(),

        // Text input
        KeyCode::Char(c) => app.text_input_char(c),
        KeyCode::Backspace => app.text_input_backspace(),
        KeyCode::Delete => app.text_input_delete(),
        KeyCode::Left => app.text_input_left(),
        KeyCode::Right => app.text_input_right(),
        KeyCode::Home => app.text_input_home(),
        KeyCode::End => app.text_input_end(),

        _ => {}
    }
}
