use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use crate::session::{EditOp, Intent, Motion};

/// What a key press in the editor asks for: either a session intent or a
/// presentation-only command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Intent(Intent),
    NextTab,
    PreviousTab,
    JumpToTab(usize),
    CloseActiveTab,
    RenameActiveTab,
    ConfirmClear,
    ToggleEmoji,
    ToggleOpacityRow,
    ToggleColorRow,
    Quit,
}

impl From<Intent> for Command {
    fn from(intent: Intent) -> Self {
        Command::Intent(intent)
    }
}

pub fn editor_command(key: KeyEvent) -> Option<Command> {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    let alt = key.modifiers.contains(KeyModifiers::ALT);

    if ctrl {
        let command = match key.code {
            KeyCode::Char('s') => Intent::ManualSave.into(),
            KeyCode::Char('t') => Intent::AddTab.into(),
            KeyCode::Char('d') => Intent::ToggleTheme.into(),
            KeyCode::Char('w') => Command::CloseActiveTab,
            KeyCode::Char('l') => Command::ConfirmClear,
            KeyCode::Char('e') => Command::ToggleEmoji,
            KeyCode::Char('o') => Command::ToggleOpacityRow,
            KeyCode::Char('k') => Command::ToggleColorRow,
            KeyCode::Char('q') | KeyCode::Char('c') => Command::Quit,
            KeyCode::PageUp => Command::PreviousTab,
            KeyCode::PageDown => Command::NextTab,
            KeyCode::Left => Intent::MoveCursor(Motion::WordLeft).into(),
            KeyCode::Right => Intent::MoveCursor(Motion::WordRight).into(),
            KeyCode::Home => Intent::MoveCursor(Motion::BufferStart).into(),
            KeyCode::End => Intent::MoveCursor(Motion::BufferEnd).into(),
            _ => return None,
        };
        return Some(command);
    }

    if alt {
        return match key.code {
            KeyCode::Left => Some(Command::PreviousTab),
            KeyCode::Right => Some(Command::NextTab),
            KeyCode::Char(ch @ '1'..='9') => Some(Command::JumpToTab(ch as usize - '1' as usize)),
            _ => None,
        };
    }

    let command = match key.code {
        KeyCode::F(2) => Command::RenameActiveTab,
        KeyCode::Enter => Intent::Edit(EditOp::Newline).into(),
        KeyCode::Backspace => Intent::Edit(EditOp::Backspace).into(),
        KeyCode::Delete => Intent::Edit(EditOp::Delete).into(),
        KeyCode::Tab => Intent::Edit(EditOp::Insert('\t')).into(),
        KeyCode::Left => Intent::MoveCursor(Motion::Left).into(),
        KeyCode::Right => Intent::MoveCursor(Motion::Right).into(),
        KeyCode::Up => Intent::MoveCursor(Motion::Up).into(),
        KeyCode::Down => Intent::MoveCursor(Motion::Down).into(),
        KeyCode::Home => Intent::MoveCursor(Motion::Home).into(),
        KeyCode::End => Intent::MoveCursor(Motion::End).into(),
        KeyCode::Char(ch) if !key.modifiers.contains(KeyModifiers::SUPER) => {
            Intent::Edit(EditOp::Insert(ch)).into()
        }
        _ => return None,
    };
    Some(command)
}

/// True for plain character input (shift allowed), used by text fields.
pub fn is_text_input(key: &KeyEvent) -> bool {
    matches!(key.code, KeyCode::Char(_))
        && !key
            .modifiers
            .intersects(KeyModifiers::CONTROL | KeyModifiers::ALT | KeyModifiers::SUPER)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(code: KeyCode, modifiers: KeyModifiers) -> KeyEvent {
        KeyEvent::new(code, modifiers)
    }

    #[test]
    fn control_chords_map_to_commands() {
        assert_eq!(
            editor_command(key(KeyCode::Char('s'), KeyModifiers::CONTROL)),
            Some(Command::Intent(Intent::ManualSave))
        );
        assert_eq!(
            editor_command(key(KeyCode::Char('w'), KeyModifiers::CONTROL)),
            Some(Command::CloseActiveTab)
        );
        assert_eq!(editor_command(key(KeyCode::Char('z'), KeyModifiers::CONTROL)), None);
    }

    #[test]
    fn alt_digits_jump_to_tabs() {
        assert_eq!(
            editor_command(key(KeyCode::Char('3'), KeyModifiers::ALT)),
            Some(Command::JumpToTab(2))
        );
        assert_eq!(editor_command(key(KeyCode::Char('0'), KeyModifiers::ALT)), None);
    }

    #[test]
    fn shifted_characters_are_typed() {
        assert_eq!(
            editor_command(key(KeyCode::Char('A'), KeyModifiers::SHIFT)),
            Some(Command::Intent(Intent::Edit(EditOp::Insert('A'))))
        );
        assert!(is_text_input(&key(KeyCode::Char('#'), KeyModifiers::SHIFT)));
        assert!(!is_text_input(&key(KeyCode::Char('x'), KeyModifiers::CONTROL)));
    }
}
