//! The scratchpad core: session state, tab operations, the visible editor
//! and the autosave controller, driven through [`Intent`]s.
//!
//! Everything runs on the caller's thread, one intent at a time. Time is
//! passed in explicitly so debounce behaviour does not depend on a clock.

use std::time::{Duration, Instant};

use anyhow::Result;

use crate::config::{AppConfig, Theme};
use crate::journaling::autosave::wall_clock;
use crate::journaling::{AutoSaveEvent, AutoSaveStatus, AutosaveController, SaveTrigger};
use crate::storage::StoreHandle;

pub mod editor;
pub mod state;
pub mod tabs;

pub use editor::{EditOp, EditorState, Motion};
pub use state::{keys, load, Opacity, Preferences, SessionState, Tab, TabId, TextColor};
pub use tabs::{Removal, TabRejection};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    AddTab,
    RemoveTab(TabId),
    RenameTab(TabId, String),
    SwitchTab(TabId),
    Edit(EditOp),
    MoveCursor(Motion),
    SetTheme(Theme),
    ToggleTheme,
    SetOpacity(i64),
    SetColor(String),
    ManualSave,
    ClearContent,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    Applied,
    /// Applied, and tab data was written as part of it.
    Saved(AutoSaveEvent),
    /// Nothing to do (an edit or motion that changed nothing).
    Unchanged,
    Rejected(TabRejection),
}

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub debounce: Duration,
    pub flush_on_exit: bool,
    pub default_theme: Theme,
}

impl SessionOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            debounce: config.autosave.debounce_duration(),
            flush_on_exit: config.autosave.flush_on_exit,
            default_theme: config.ui.default_theme,
        }
    }
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

pub struct Session {
    state: SessionState,
    editor: EditorState,
    autosave: AutosaveController,
    store: StoreHandle,
    flush_on_exit: bool,
}

impl Session {
    /// Loads the persisted session and shows the active tab, clean.
    pub fn open(store: StoreHandle, options: SessionOptions) -> Result<Self> {
        let state = load(&*store, options.default_theme)?;
        let content = state
            .active_tab()
            .map(|tab| tab.content.clone())
            .unwrap_or_default();
        tracing::debug!(tabs = state.len(), "session loaded");
        Ok(Self {
            state,
            editor: EditorState::new(content),
            autosave: AutosaveController::new(options.debounce),
            store,
            flush_on_exit: options.flush_on_exit,
        })
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn editor(&self) -> &EditorState {
        &self.editor
    }

    pub fn preferences(&self) -> &Preferences {
        self.state.preferences()
    }

    pub fn autosave_status(&self) -> AutoSaveStatus {
        self.autosave.status()
    }

    pub fn is_dirty(&self) -> bool {
        self.autosave.is_dirty()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.autosave.next_deadline()
    }

    pub fn dispatch(&mut self, intent: Intent, now: Instant) -> Dispatch {
        let outcome = match intent {
            Intent::AddTab => self.add_tab(),
            Intent::RemoveTab(id) => self.remove_tab(&id),
            Intent::RenameTab(id, label) => self.rename_tab(&id, &label),
            Intent::SwitchTab(id) => self.switch_tab(&id),
            Intent::Edit(op) => {
                if self.editor.apply(op) {
                    self.autosave.note_edit(now);
                    Dispatch::Applied
                } else {
                    Dispatch::Unchanged
                }
            }
            Intent::MoveCursor(motion) => {
                if self.editor.apply_motion(motion) {
                    Dispatch::Applied
                } else {
                    Dispatch::Unchanged
                }
            }
            Intent::SetTheme(theme) => self.set_theme(theme),
            Intent::ToggleTheme => self.set_theme(self.state.prefs.theme.toggle()),
            Intent::SetOpacity(percent) => self.set_opacity(percent),
            Intent::SetColor(raw) => self.set_color(&raw),
            Intent::ManualSave => {
                self.flush_editor();
                Dispatch::Saved(self.persist_tabs(SaveTrigger::Manual))
            }
            Intent::ClearContent => {
                self.editor.clear();
                self.flush_editor();
                Dispatch::Saved(self.persist_tabs(SaveTrigger::Structural))
            }
        };
        if let Dispatch::Rejected(reason) = &outcome {
            tracing::debug!(%reason, "intent rejected");
        }
        outcome
    }

    /// Performs the debounced write once its deadline has passed.
    pub fn tick(&mut self, now: Instant) -> Option<AutoSaveEvent> {
        if !self.autosave.poll(now) {
            return None;
        }
        self.flush_editor();
        Some(self.persist_tabs(SaveTrigger::Debounced))
    }

    /// Called when the session ends. Writes an edit still waiting on the
    /// debounce unless `flush_on_exit` is off.
    pub fn shutdown(&mut self) -> Option<AutoSaveEvent> {
        if !self.autosave.has_pending() && !self.autosave.is_dirty() {
            return None;
        }
        if !self.flush_on_exit {
            tracing::warn!("closing with an unsaved edit, flush_on_exit is disabled");
            self.autosave.cancel_pending();
            return None;
        }
        self.flush_editor();
        Some(self.persist_tabs(SaveTrigger::Shutdown))
    }

    fn add_tab(&mut self) -> Dispatch {
        self.flush_editor();
        let id = self.state.add_tab();
        self.editor.clear();
        tracing::debug!(%id, "tab added");
        Dispatch::Saved(self.persist_tabs(SaveTrigger::Structural))
    }

    fn remove_tab(&mut self, id: &TabId) -> Dispatch {
        self.flush_editor();
        let removal = match self.state.remove_tab(id) {
            Ok(removal) => removal,
            Err(reason) => return Dispatch::Rejected(reason),
        };
        if let Some(next) = &removal.activated {
            let content = self
                .state
                .tab(next)
                .map(|tab| tab.content.clone())
                .unwrap_or_default();
            self.editor.set_content(&content);
        }
        tracing::debug!(%id, index = removal.index, "tab removed");
        Dispatch::Saved(self.persist_tabs(SaveTrigger::Structural))
    }

    fn rename_tab(&mut self, id: &TabId, label: &str) -> Dispatch {
        self.flush_editor();
        if let Err(reason) = self.state.rename_tab(id, label) {
            return Dispatch::Rejected(reason);
        }
        Dispatch::Saved(self.persist_tabs(SaveTrigger::Structural))
    }

    fn switch_tab(&mut self, id: &TabId) -> Dispatch {
        self.flush_editor();
        if let Err(reason) = self.state.set_active(id) {
            return Dispatch::Rejected(reason);
        }
        let content = self
            .state
            .active_tab()
            .map(|tab| tab.content.clone())
            .unwrap_or_default();
        self.editor.set_content(&content);
        self.autosave.reset_clean();
        Dispatch::Applied
    }

    fn set_theme(&mut self, theme: Theme) -> Dispatch {
        self.state.prefs.theme = theme;
        self.persist_preference(keys::THEME);
        Dispatch::Applied
    }

    fn set_opacity(&mut self, percent: i64) -> Dispatch {
        self.state.prefs.opacity = Opacity::new(percent);
        self.persist_preference(keys::OPACITY);
        Dispatch::Applied
    }

    fn set_color(&mut self, raw: &str) -> Dispatch {
        match TextColor::parse(raw) {
            Ok(color) => {
                self.state.prefs.text_color = color;
                self.persist_preference(keys::TEXT_COLOR);
                Dispatch::Applied
            }
            Err(reason) => Dispatch::Rejected(reason),
        }
    }

    fn flush_editor(&mut self) {
        let buffer = self.editor.buffer();
        if let Some(tab) = self.state.active_tab_mut() {
            if tab.content != buffer {
                tab.content.clear();
                tab.content.push_str(buffer);
            }
        }
    }

    /// Writes `tabs` and `activeTabId` now. Any pending debounced write is
    /// cancelled since this write already carries the flushed content.
    fn persist_tabs(&mut self, trigger: SaveTrigger) -> AutoSaveEvent {
        self.autosave.cancel_pending();
        let result = self
            .state
            .tab_entries()
            .and_then(|entries| self.store.set(entries));
        match result {
            Ok(()) => {
                let timestamp = wall_clock();
                self.autosave.mark_saved(timestamp);
                tracing::debug!(?trigger, "tabs persisted");
                AutoSaveEvent::Saved { trigger, timestamp }
            }
            Err(err) => {
                tracing::error!(?err, ?trigger, "failed to persist tabs");
                let message = format!("{err:#}");
                self.autosave.mark_failed(message.clone());
                AutoSaveEvent::Error { trigger, message }
            }
        }
    }

    fn persist_preference(&self, key: &str) {
        let Some(entries) = self.state.preference_entry(key) else {
            return;
        };
        if let Err(err) = self.store.set(entries) {
            tracing::error!(?err, key, "failed to persist preference");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use assert_matches::assert_matches;
    use serde_json::json;
    use std::sync::Arc;

    fn open(store: &Arc<MemoryStore>) -> Session {
        Session::open(store.clone(), SessionOptions::default()).expect("session opens")
    }

    fn type_text(session: &mut Session, text: &str, now: Instant) {
        for ch in text.chars() {
            session.dispatch(Intent::Edit(EditOp::Insert(ch)), now);
        }
    }

    #[test]
    fn fresh_session_is_clean_with_seed_tab() {
        let store = Arc::new(MemoryStore::new());
        let session = open(&store);
        assert_eq!(session.state().len(), 1);
        assert_eq!(session.editor().buffer(), "");
        assert!(!session.autosave_status().is_dirty());
        assert!(store.writes().is_empty());
    }

    #[test]
    fn switching_flushes_outgoing_and_shows_incoming() {
        let store = Arc::new(MemoryStore::new());
        let mut session = open(&store);
        let now = Instant::now();
        let first = session.state().tabs()[0].id.clone();
        session.dispatch(Intent::AddTab, now);
        type_text(&mut session, "second", now);
        assert!(session.is_dirty());

        assert_eq!(session.dispatch(Intent::SwitchTab(first), now), Dispatch::Applied);
        assert_eq!(session.editor().buffer(), "");
        assert!(!session.is_dirty());
        assert_eq!(session.state().tabs()[1].content, "second");
        assert!(session.next_deadline().is_some());
    }

    #[test]
    fn switching_to_unknown_tab_is_rejected() {
        let store = Arc::new(MemoryStore::new());
        let mut session = open(&store);
        assert_matches!(
            session.dispatch(Intent::SwitchTab(TabId::from("ghost")), Instant::now()),
            Dispatch::Rejected(TabRejection::NotFound(_))
        );
    }

    #[test]
    fn clear_content_persists_empty_tab_immediately() {
        let store = Arc::new(MemoryStore::new());
        let mut session = open(&store);
        let now = Instant::now();
        type_text(&mut session, "scratch", now);
        let outcome = session.dispatch(Intent::ClearContent, now);
        assert_matches!(outcome, Dispatch::Saved(event) if event.is_saved());
        assert_eq!(session.editor().buffer(), "");
        assert!(!session.is_dirty());
        assert_eq!(store.value(keys::TABS).unwrap()[0]["content"], json!(""));
        assert_eq!(session.tick(now + Duration::from_secs(5)), None);
    }

    #[test]
    fn invalid_colour_leaves_preferences_untouched() {
        let store = Arc::new(MemoryStore::new());
        let mut session = open(&store);
        let outcome = session.dispatch(Intent::SetColor("chartreuse".into()), Instant::now());
        assert_matches!(outcome, Dispatch::Rejected(TabRejection::InvalidColor(_)));
        assert!(session.preferences().text_color.is_default());
        assert!(store.writes().is_empty());
    }

    #[test]
    fn toggle_theme_persists_only_theme_key() {
        let store = Arc::new(MemoryStore::new());
        let mut session = open(&store);
        session.dispatch(Intent::ToggleTheme, Instant::now());
        assert_eq!(session.preferences().theme, Theme::Light);
        let writes = store.writes();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].keys().collect::<Vec<_>>(), vec![keys::THEME]);
        assert_eq!(writes[0][keys::THEME], json!("light"));
    }

    #[test]
    fn shutdown_flushes_pending_edit() {
        let store = Arc::new(MemoryStore::new());
        let mut session = open(&store);
        type_text(&mut session, "last words", Instant::now());
        let event = session.shutdown().expect("pending edit is written");
        assert_eq!(event.trigger(), SaveTrigger::Shutdown);
        assert_eq!(
            store.value(keys::TABS).unwrap()[0]["content"],
            json!("last words")
        );
        assert_eq!(session.shutdown(), None);
    }

    #[test]
    fn shutdown_without_flush_drops_pending_edit() {
        let store = Arc::new(MemoryStore::new());
        let options = SessionOptions {
            flush_on_exit: false,
            ..SessionOptions::default()
        };
        let mut session = Session::open(store.clone(), options).unwrap();
        type_text(&mut session, "lost", Instant::now());
        assert_eq!(session.shutdown(), None);
        assert!(store.writes().is_empty());
    }

    struct FailingStore;

    impl crate::storage::KeyValueStore for FailingStore {
        fn get(&self, _keys: &[&str]) -> Result<crate::storage::StoreMap> {
            Ok(Default::default())
        }

        fn set(&self, _entries: crate::storage::StoreMap) -> Result<()> {
            anyhow::bail!("read-only store")
        }
    }

    #[test]
    fn failed_write_keeps_session_dirty() {
        let mut session = Session::open(Arc::new(FailingStore), SessionOptions::default()).unwrap();
        let now = Instant::now();
        type_text(&mut session, "x", now);
        let outcome = session.dispatch(Intent::ManualSave, now);
        assert_matches!(outcome, Dispatch::Saved(AutoSaveEvent::Error { ref message, .. }) if message.contains("read-only"));
        assert!(session.is_dirty());
        assert_eq!(session.autosave_status().label(), "Save failed");
    }
}
