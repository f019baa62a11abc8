use std::time::{Duration, Instant};

use crate::emoji;
use crate::journaling::AutoSaveStatus;
use crate::session::TabId;

/// How long "Saved!" stays in the status bar after a manual save.
pub const SAVED_FLASH: Duration = Duration::from_millis(1400);
pub const MAX_LABEL_LEN: usize = 120;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenameOverlay {
    pub tab_id: TabId,
    pub label: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EmojiPicker {
    pub query: String,
    pub selected: usize,
}

impl EmojiPicker {
    pub fn matches(&self) -> Vec<&'static str> {
        emoji::filter(&self.query)
    }

    pub fn selected_emoji(&self) -> Option<&'static str> {
        self.matches().get(self.selected).copied()
    }

    pub fn move_selection(&mut self, dx: isize, dy: isize) {
        let len = self.matches().len();
        self.selected = emoji::move_selection(self.selected, len, dx, dy);
    }

    pub fn push_query(&mut self, ch: char) {
        self.query.push(ch);
        self.selected = 0;
    }

    pub fn pop_query(&mut self) {
        self.query.pop();
        self.selected = 0;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OverlayState {
    Rename(RenameOverlay),
    ConfirmClear,
    Emoji(EmojiPicker),
}

/// The two mutually exclusive rows of the controls panel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlsRow {
    Opacity,
    Color { input: String },
}

/// Presentation-only state; everything persisted lives in the session.
#[derive(Debug, Clone, Default)]
pub struct AppState {
    overlay: Option<OverlayState>,
    controls: Option<ControlsRow>,
    status_message: Option<String>,
    saved_flash_until: Option<Instant>,
}

impl AppState {
    pub fn overlay(&self) -> Option<&OverlayState> {
        self.overlay.as_ref()
    }

    pub fn overlay_mut(&mut self) -> Option<&mut OverlayState> {
        self.overlay.as_mut()
    }

    pub fn open_rename(&mut self, tab_id: TabId, label: &str) {
        self.overlay = Some(OverlayState::Rename(RenameOverlay {
            tab_id,
            label: label.to_string(),
        }));
    }

    pub fn rename_overlay_mut(&mut self) -> Option<&mut RenameOverlay> {
        match self.overlay.as_mut() {
            Some(OverlayState::Rename(draft)) => Some(draft),
            _ => None,
        }
    }

    pub fn open_confirm_clear(&mut self) {
        self.overlay = Some(OverlayState::ConfirmClear);
    }

    /// Opens the picker with an empty search, or closes it if already open.
    pub fn toggle_emoji(&mut self) -> bool {
        if matches!(self.overlay, Some(OverlayState::Emoji(_))) {
            self.overlay = None;
            false
        } else {
            self.overlay = Some(OverlayState::Emoji(EmojiPicker::default()));
            true
        }
    }

    pub fn emoji_picker_mut(&mut self) -> Option<&mut EmojiPicker> {
        match self.overlay.as_mut() {
            Some(OverlayState::Emoji(picker)) => Some(picker),
            _ => None,
        }
    }

    pub fn close_overlay(&mut self) -> bool {
        self.overlay.take().is_some()
    }

    pub fn controls(&self) -> Option<&ControlsRow> {
        self.controls.as_ref()
    }

    pub fn toggle_opacity_row(&mut self) {
        self.controls = match self.controls {
            Some(ControlsRow::Opacity) => None,
            _ => Some(ControlsRow::Opacity),
        };
    }

    /// `current` prefills the input with the colour in effect.
    pub fn toggle_color_row(&mut self, current: &str) {
        self.controls = match self.controls {
            Some(ControlsRow::Color { .. }) => None,
            _ => Some(ControlsRow::Color {
                input: current.to_string(),
            }),
        };
    }

    pub fn color_input_mut(&mut self) -> Option<&mut String> {
        match self.controls.as_mut() {
            Some(ControlsRow::Color { input }) => Some(input),
            _ => None,
        }
    }

    pub fn close_controls(&mut self) -> bool {
        self.controls.take().is_some()
    }

    pub fn status_message(&self) -> Option<&str> {
        self.status_message.as_deref()
    }

    pub fn set_status_message<S: Into<String>>(&mut self, message: Option<S>) {
        self.status_message = message.map(Into::into);
    }

    pub fn flash_saved(&mut self, now: Instant) {
        self.saved_flash_until = Some(now + SAVED_FLASH);
    }

    pub fn expire_flash(&mut self, now: Instant) {
        if self.saved_flash_until.is_some_and(|until| now >= until) {
            self.saved_flash_until = None;
        }
    }

    pub fn save_label(&self, status: &AutoSaveStatus) -> &'static str {
        if self.saved_flash_until.is_some() && !status.is_dirty() {
            "Saved!"
        } else {
            status.label()
        }
    }
}
