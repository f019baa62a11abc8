use std::io::Stdout;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use ratatui::backend::CrosstermBackend;
use ratatui::Terminal;

use crate::config::AppConfig;
use crate::journaling::AutoSaveEvent;
use crate::session::{Dispatch, EditOp, Intent, Session, SessionOptions, TabRejection};
use crate::storage::StoreHandle;
use crate::ui;

mod actions;
pub mod state;

pub use actions::{editor_command, Command};
pub use state::{AppState, ControlsRow, EmojiPicker, OverlayState, RenameOverlay};

const OPACITY_STEP: i64 = 5;

pub struct App {
    pub config: Arc<AppConfig>,
    session: Session,
    state: AppState,
    should_quit: bool,
    tick_rate: Duration,
}

impl App {
    pub fn new(config: Arc<AppConfig>, store: StoreHandle) -> Result<Self> {
        let session = Session::open(store, SessionOptions::from_config(&config))
            .context("loading scratchpad session")?;
        let tick_rate = config.ui.tick_rate();
        Ok(Self {
            config,
            session,
            state: AppState::default(),
            should_quit: false,
            tick_rate,
        })
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn ui_state(&self) -> &AppState {
        &self.state
    }

    pub fn should_quit(&self) -> bool {
        self.should_quit
    }

    pub fn run(&mut self) -> Result<()> {
        let mut terminal = setup_terminal()?;
        let result = self.event_loop(&mut terminal);
        self.shutdown();
        restore_terminal(&mut terminal)?;
        result
    }

    fn event_loop(&mut self, terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
        loop {
            let now = Instant::now();
            terminal
                .draw(|frame| ui::draw_app(frame, &self.session, &self.state))
                .context("rendering frame")?;

            if self.should_quit {
                break;
            }

            let mut timeout = self.tick_rate;
            if let Some(deadline) = self.session.next_deadline() {
                timeout = timeout.min(deadline.saturating_duration_since(now));
            }

            if event::poll(timeout).context("polling for terminal events")? {
                match event::read().context("reading terminal event")? {
                    Event::Key(key) => self.handle_key(key, Instant::now()),
                    Event::Paste(text) => {
                        self.dispatch(Intent::Edit(EditOp::InsertStr(text)), Instant::now());
                    }
                    _ => {}
                }
            }

            self.on_tick(Instant::now());
        }
        Ok(())
    }

    pub fn on_tick(&mut self, now: Instant) {
        if let Some(event) = self.session.tick(now) {
            self.handle_autosave_event(event);
        }
        self.state.expire_flash(now);
    }

    /// Writes anything still waiting on the debounce before the app exits.
    pub fn shutdown(&mut self) {
        if let Some(event) = self.session.shutdown() {
            self.handle_autosave_event(event);
        }
    }

    pub fn handle_key(&mut self, key: KeyEvent, now: Instant) {
        if key.kind != KeyEventKind::Press {
            return;
        }

        if self.handle_overlay_key(key, now) {
            return;
        }

        if self.handle_controls_key(key, now) {
            return;
        }

        if let Some(command) = editor_command(key) {
            self.state.set_status_message(None::<String>);
            self.handle_command(command, now);
        }
    }

    fn handle_command(&mut self, command: Command, now: Instant) {
        match command {
            Command::Intent(intent) => {
                self.dispatch(intent, now);
            }
            Command::NextTab => self.switch_relative(1, now),
            Command::PreviousTab => self.switch_relative(-1, now),
            Command::JumpToTab(index) => {
                if let Some(tab) = self.session.state().tabs().get(index) {
                    let id = tab.id.clone();
                    self.dispatch(Intent::SwitchTab(id), now);
                }
            }
            Command::CloseActiveTab => {
                if let Some(id) = self.session.state().active_tab_id().cloned() {
                    self.dispatch(Intent::RemoveTab(id), now);
                }
            }
            Command::RenameActiveTab => {
                if let Some(tab) = self.session.state().active_tab() {
                    let (id, label) = (tab.id.clone(), tab.label.clone());
                    self.state.open_rename(id, &label);
                }
            }
            Command::ConfirmClear => self.state.open_confirm_clear(),
            Command::ToggleEmoji => {
                self.state.toggle_emoji();
            }
            Command::ToggleOpacityRow => self.state.toggle_opacity_row(),
            Command::ToggleColorRow => {
                let current = self.session.preferences().text_color.as_str().to_string();
                self.state.toggle_color_row(&current);
            }
            Command::Quit => self.should_quit = true,
        }
    }

    fn switch_relative(&mut self, delta: isize, now: Instant) {
        if let Some(id) = self.session.state().neighbour(delta).cloned() {
            self.dispatch(Intent::SwitchTab(id), now);
        }
    }

    fn dispatch(&mut self, intent: Intent, now: Instant) -> Dispatch {
        let manual = intent == Intent::ManualSave;
        let outcome = self.session.dispatch(intent, now);
        match &outcome {
            Dispatch::Saved(event) => {
                if manual && event.is_saved() {
                    self.state.flash_saved(now);
                }
                self.handle_autosave_event(event.clone());
            }
            Dispatch::Rejected(reason) => {
                self.state
                    .set_status_message(Some(rejection_message(reason)));
            }
            Dispatch::Applied | Dispatch::Unchanged => {}
        }
        outcome
    }

    fn handle_autosave_event(&mut self, event: AutoSaveEvent) {
        if let AutoSaveEvent::Error { message, .. } = event {
            self.state
                .set_status_message(Some(format!("Save failed: {message}")));
        }
    }

    fn handle_overlay_key(&mut self, key: KeyEvent, now: Instant) -> bool {
        match self.state.overlay() {
            Some(OverlayState::Rename(_)) => {
                match key.code {
                    KeyCode::Esc => {
                        self.state.close_overlay();
                    }
                    KeyCode::Enter => self.submit_rename(now),
                    KeyCode::Backspace => {
                        if let Some(draft) = self.state.rename_overlay_mut() {
                            draft.label.pop();
                        }
                    }
                    KeyCode::Char(ch) if actions::is_text_input(&key) => {
                        if let Some(draft) = self.state.rename_overlay_mut() {
                            if draft.label.chars().count() < state::MAX_LABEL_LEN {
                                draft.label.push(ch);
                            }
                        }
                    }
                    _ => {}
                }
                true
            }
            Some(OverlayState::ConfirmClear) => {
                match key.code {
                    KeyCode::Esc | KeyCode::Char('n') => {
                        self.state.close_overlay();
                    }
                    KeyCode::Enter | KeyCode::Char('y') => {
                        self.state.close_overlay();
                        self.dispatch(Intent::ClearContent, now);
                    }
                    _ => {}
                }
                true
            }
            Some(OverlayState::Emoji(_)) => {
                match key.code {
                    KeyCode::Esc => {
                        self.state.close_overlay();
                    }
                    KeyCode::Enter => {
                        let chosen = self
                            .state
                            .emoji_picker_mut()
                            .and_then(|picker| picker.selected_emoji());
                        self.state.close_overlay();
                        if let Some(emoji) = chosen {
                            self.dispatch(Intent::Edit(EditOp::InsertStr(emoji.to_string())), now);
                        }
                    }
                    KeyCode::Left | KeyCode::Right | KeyCode::Up | KeyCode::Down => {
                        let (dx, dy) = match key.code {
                            KeyCode::Left => (-1, 0),
                            KeyCode::Right => (1, 0),
                            KeyCode::Up => (0, -1),
                            _ => (0, 1),
                        };
                        if let Some(picker) = self.state.emoji_picker_mut() {
                            picker.move_selection(dx, dy);
                        }
                    }
                    KeyCode::Backspace => {
                        if let Some(picker) = self.state.emoji_picker_mut() {
                            picker.pop_query();
                        }
                    }
                    KeyCode::Char(ch) if actions::is_text_input(&key) => {
                        if let Some(picker) = self.state.emoji_picker_mut() {
                            picker.push_query(ch);
                        }
                    }
                    _ => {
                        self.state.close_overlay();
                        // Any other chord closes the panel; Ctrl-E stops there.
                        return editor_command(key) == Some(Command::ToggleEmoji);
                    }
                }
                true
            }
            None => false,
        }
    }

    fn handle_controls_key(&mut self, key: KeyEvent, now: Instant) -> bool {
        match self.state.controls() {
            Some(ControlsRow::Opacity) => {
                let current = i64::from(self.session.preferences().opacity.get());
                match key.code {
                    KeyCode::Esc => {
                        self.state.close_controls();
                    }
                    KeyCode::Left | KeyCode::Char('-') => {
                        self.dispatch(Intent::SetOpacity(current - OPACITY_STEP), now);
                    }
                    KeyCode::Right | KeyCode::Char('+') | KeyCode::Char('=') => {
                        self.dispatch(Intent::SetOpacity(current + OPACITY_STEP), now);
                    }
                    _ => return false,
                }
                true
            }
            Some(ControlsRow::Color { .. }) => {
                match key.code {
                    KeyCode::Esc => {
                        self.state.close_controls();
                    }
                    KeyCode::Enter => {
                        let raw = self.state.color_input_mut().cloned().unwrap_or_default();
                        if self.dispatch(Intent::SetColor(raw), now) == Dispatch::Applied {
                            self.state.close_controls();
                        }
                    }
                    KeyCode::Backspace => {
                        if let Some(input) = self.state.color_input_mut() {
                            input.pop();
                        }
                    }
                    KeyCode::Char(ch) if actions::is_text_input(&key) => {
                        if let Some(input) = self.state.color_input_mut() {
                            if input.len() < 7 {
                                input.push(ch);
                            }
                        }
                    }
                    _ => return false,
                }
                true
            }
            None => {
                if key.code == KeyCode::Esc {
                    self.state.set_status_message(None::<String>);
                    return true;
                }
                false
            }
        }
    }

    fn submit_rename(&mut self, now: Instant) {
        let Some(OverlayState::Rename(draft)) = self.state.overlay().cloned() else {
            return;
        };
        self.state.close_overlay();
        if let Dispatch::Rejected(TabRejection::EmptyLabel) =
            self.dispatch(Intent::RenameTab(draft.tab_id, draft.label), now)
        {
            // A blank rename is just a cancel.
            self.state.set_status_message(None::<String>);
        }
    }
}

fn rejection_message(reason: &TabRejection) -> String {
    match reason {
        TabRejection::LastTab => "At least one tab has to stay open".to_string(),
        other => {
            let text = other.to_string();
            let mut chars = text.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => text,
            }
        }
    }
}

fn setup_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>> {
    enable_raw_mode().context("enabling raw mode")?;
    let mut stdout = std::io::stdout();
    execute!(stdout, EnterAlternateScreen, event::EnableBracketedPaste)
        .context("switching to alternate screen")?;
    let backend = CrosstermBackend::new(stdout);
    let terminal = Terminal::new(backend).context("creating terminal backend")?;
    Ok(terminal)
}

fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
    terminal.show_cursor().ok();
    disable_raw_mode().context("disabling raw mode")?;
    execute!(
        terminal.backend_mut(),
        event::DisableBracketedPaste,
        LeaveAlternateScreen
    )
    .context("restoring screen state")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::keys;
    use crate::storage::MemoryStore;
    use crossterm::event::KeyModifiers;
    use serde_json::json;

    fn app() -> (App, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let app = App::new(Arc::new(AppConfig::default()), store.clone()).expect("app opens");
        (app, store)
    }

    fn press(app: &mut App, code: KeyCode, modifiers: KeyModifiers, now: Instant) {
        app.handle_key(KeyEvent::new(code, modifiers), now);
    }

    fn type_text(app: &mut App, text: &str, now: Instant) {
        for ch in text.chars() {
            press(app, KeyCode::Char(ch), KeyModifiers::NONE, now);
        }
    }

    #[test]
    fn typing_then_waiting_autosaves_once() {
        let (mut app, store) = app();
        let now = Instant::now();
        type_text(&mut app, "hello", now);
        assert_eq!(app.ui_state().save_label(&app.session().autosave_status()), "Unsaved…");
        app.on_tick(now + Duration::from_millis(699));
        assert!(store.writes().is_empty());
        app.on_tick(now + Duration::from_millis(700));
        assert_eq!(store.writes().len(), 1);
        assert_eq!(store.value(keys::TABS).unwrap()[0]["content"], json!("hello"));
    }

    #[test]
    fn ctrl_s_saves_and_flashes() {
        let (mut app, store) = app();
        let now = Instant::now();
        type_text(&mut app, "draft", now);
        press(&mut app, KeyCode::Char('s'), KeyModifiers::CONTROL, now);
        assert_eq!(store.writes().len(), 1);
        assert_eq!(app.ui_state().save_label(&app.session().autosave_status()), "Saved!");
        app.on_tick(now + Duration::from_secs(2));
        assert_eq!(store.writes().len(), 1);
        assert_eq!(app.ui_state().save_label(&app.session().autosave_status()), "All saved");
    }

    #[test]
    fn rename_modal_prefills_and_commits() {
        let (mut app, _store) = app();
        let now = Instant::now();
        press(&mut app, KeyCode::F(2), KeyModifiers::NONE, now);
        assert!(matches!(
            app.ui_state().overlay(),
            Some(OverlayState::Rename(draft)) if draft.label == "Note 1"
        ));
        for _ in 0.."Note 1".len() {
            press(&mut app, KeyCode::Backspace, KeyModifiers::NONE, now);
        }
        type_text(&mut app, "Todo", now);
        press(&mut app, KeyCode::Enter, KeyModifiers::NONE, now);
        assert!(app.ui_state().overlay().is_none());
        assert_eq!(app.session().state().tabs()[0].label, "Todo");
        // Typing inside the modal never reached the editor.
        assert_eq!(app.session().editor().buffer(), "");
    }

    #[test]
    fn clear_requires_confirmation() {
        let (mut app, _store) = app();
        let now = Instant::now();
        type_text(&mut app, "keep me", now);
        press(&mut app, KeyCode::Char('l'), KeyModifiers::CONTROL, now);
        press(&mut app, KeyCode::Esc, KeyModifiers::NONE, now);
        assert_eq!(app.session().editor().buffer(), "keep me");

        press(&mut app, KeyCode::Char('l'), KeyModifiers::CONTROL, now);
        press(&mut app, KeyCode::Enter, KeyModifiers::NONE, now);
        assert_eq!(app.session().editor().buffer(), "");
        assert!(!app.session().is_dirty());
    }

    #[test]
    fn emoji_picker_inserts_at_cursor() {
        let (mut app, _store) = app();
        let now = Instant::now();
        type_text(&mut app, "ab", now);
        press(&mut app, KeyCode::Left, KeyModifiers::NONE, now);
        press(&mut app, KeyCode::Char('e'), KeyModifiers::CONTROL, now);
        press(&mut app, KeyCode::Right, KeyModifiers::NONE, now);
        press(&mut app, KeyCode::Enter, KeyModifiers::NONE, now);
        assert_eq!(app.session().editor().buffer(), "a😂b");
        assert!(app.ui_state().overlay().is_none());
        assert!(app.session().is_dirty());
    }

    #[test]
    fn closing_last_tab_reports_status() {
        let (mut app, store) = app();
        press(&mut app, KeyCode::Char('w'), KeyModifiers::CONTROL, Instant::now());
        assert_eq!(app.session().state().len(), 1);
        assert_eq!(
            app.ui_state().status_message(),
            Some("At least one tab has to stay open")
        );
        assert!(store.writes().is_empty());
    }

    #[test]
    fn opacity_row_steps_and_persists() {
        let (mut app, store) = app();
        let now = Instant::now();
        press(&mut app, KeyCode::Char('o'), KeyModifiers::CONTROL, now);
        press(&mut app, KeyCode::Left, KeyModifiers::NONE, now);
        press(&mut app, KeyCode::Left, KeyModifiers::NONE, now);
        assert_eq!(app.session().preferences().opacity.get(), 90);
        assert_eq!(store.value(keys::OPACITY), Some(json!(90)));
        // Typing still reaches the editor while the row is open.
        type_text(&mut app, "x", now);
        assert_eq!(app.session().editor().buffer(), "x");
    }

    #[test]
    fn color_row_applies_on_enter() {
        let (mut app, store) = app();
        let now = Instant::now();
        press(&mut app, KeyCode::Char('k'), KeyModifiers::CONTROL, now);
        type_text(&mut app, "#33aa77", now);
        press(&mut app, KeyCode::Enter, KeyModifiers::NONE, now);
        assert_eq!(app.session().preferences().text_color.as_str(), "#33aa77");
        assert_eq!(store.value(keys::TEXT_COLOR), Some(json!("#33aa77")));
        assert!(app.ui_state().controls().is_none());
    }

    #[test]
    fn tab_navigation_wraps() {
        let (mut app, _store) = app();
        let now = Instant::now();
        press(&mut app, KeyCode::Char('t'), KeyModifiers::CONTROL, now);
        type_text(&mut app, "two", now);
        press(&mut app, KeyCode::Right, KeyModifiers::ALT, now);
        assert_eq!(app.session().state().active_index(), Some(0));
        assert_eq!(app.session().editor().buffer(), "");
        press(&mut app, KeyCode::Char('2'), KeyModifiers::ALT, now);
        assert_eq!(app.session().editor().buffer(), "two");
    }
}
