use std::ops::Range;

use unicode_segmentation::UnicodeSegmentation;

/// A content-changing edit. Applying one that leaves the buffer as it was
/// is not an edit event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditOp {
    Insert(char),
    InsertStr(String),
    Newline,
    Backspace,
    Delete,
    /// Replace the whole buffer, leaving the cursor at the end.
    Replace(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Motion {
    Left,
    Right,
    Up,
    Down,
    Home,
    End,
    WordLeft,
    WordRight,
    BufferStart,
    BufferEnd,
}

/// The visible editor: text of the active tab plus a byte cursor that
/// always sits on a grapheme boundary.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EditorState {
    text: String,
    caret: usize,
    /// Column that vertical motion tries to return to.
    sticky_column: Option<usize>,
}

impl EditorState {
    pub fn new(text: String) -> Self {
        Self {
            caret: text.len(),
            text,
            sticky_column: None,
        }
    }

    pub fn buffer(&self) -> &str {
        &self.text
    }

    pub fn cursor(&self) -> usize {
        self.caret
    }

    pub fn char_count(&self) -> usize {
        self.text.chars().count()
    }

    /// Shows another tab's content; the cursor moves to the end.
    pub fn set_content(&mut self, content: &str) {
        self.text.replace_range(.., content);
        self.caret = self.text.len();
        self.sticky_column = None;
    }

    pub fn clear(&mut self) -> bool {
        let changed = !self.text.is_empty();
        self.set_content("");
        changed
    }

    /// Returns whether the buffer changed.
    pub fn apply(&mut self, op: EditOp) -> bool {
        match op {
            EditOp::Insert(ch) => self.insert_str(ch.encode_utf8(&mut [0u8; 4])),
            EditOp::InsertStr(text) => self.insert_str(&text),
            EditOp::Newline => self.insert_str("\n"),
            EditOp::Backspace => {
                let from = grapheme_before(&self.text, self.caret);
                self.splice(from..self.caret, "")
            }
            EditOp::Delete => {
                let to = grapheme_after(&self.text, self.caret);
                self.splice(self.caret..to, "")
            }
            EditOp::Replace(text) => {
                if text == self.text {
                    return false;
                }
                self.set_content(&text);
                true
            }
        }
    }

    /// Returns whether the cursor moved.
    pub fn apply_motion(&mut self, motion: Motion) -> bool {
        let (target, sticky) = self.resolve(motion);
        if target == self.caret {
            return false;
        }
        self.caret = target;
        self.sticky_column = sticky;
        true
    }

    fn insert_str(&mut self, text: &str) -> bool {
        self.splice(self.caret..self.caret, text)
    }

    /// Replaces `range` with `text` and leaves the cursor after it.
    fn splice(&mut self, range: Range<usize>, text: &str) -> bool {
        if range.is_empty() && text.is_empty() {
            return false;
        }
        let start = range.start;
        self.text.replace_range(range, text);
        self.caret = start + text.len();
        self.sticky_column = None;
        true
    }

    /// Where `motion` would put the cursor, and the sticky column after it.
    fn resolve(&self, motion: Motion) -> (usize, Option<usize>) {
        let text = self.text.as_str();
        let here = self.caret;
        match motion {
            Motion::Left => (grapheme_before(text, here), None),
            Motion::Right => (grapheme_after(text, here), None),
            Motion::Home => (line_bounds(text, here).start, Some(0)),
            Motion::End => {
                let line = line_bounds(text, here);
                (line.end, Some(columns(&text[line])))
            }
            Motion::Up | Motion::Down => {
                let line = line_bounds(text, here);
                let column = self
                    .sticky_column
                    .unwrap_or_else(|| columns(&text[line.start..here]));
                let target = match motion {
                    Motion::Up if line.start == 0 => 0,
                    Motion::Up => offset_at_column(text, line_bounds(text, line.start - 1), column),
                    _ if line.end == text.len() => text.len(),
                    _ => offset_at_column(text, line_bounds(text, line.end + 1), column),
                };
                (target, Some(column))
            }
            Motion::WordLeft => {
                let blank_run = scan_back(text, here, is_blank);
                (scan_back(text, blank_run, |g| !is_blank(g)), None)
            }
            Motion::WordRight => {
                let word_run = scan_forward(text, here, |g| !is_blank(g));
                (scan_forward(text, word_run, is_blank), None)
            }
            Motion::BufferStart => (0, None),
            Motion::BufferEnd => (text.len(), None),
        }
    }
}

fn is_blank(grapheme: &str) -> bool {
    grapheme.trim().is_empty()
}

/// Walks left from `from` while graphemes satisfy `keep_going`.
fn scan_back(text: &str, from: usize, keep_going: impl Fn(&str) -> bool) -> usize {
    text[..from]
        .grapheme_indices(true)
        .rev()
        .take_while(|(_, g)| keep_going(g))
        .last()
        .map(|(idx, _)| idx)
        .unwrap_or(from)
}

/// Walks right from `from` while graphemes satisfy `keep_going`.
fn scan_forward(text: &str, from: usize, keep_going: impl Fn(&str) -> bool) -> usize {
    text[from..]
        .graphemes(true)
        .take_while(|g| keep_going(g))
        .fold(from, |offset, g| offset + g.len())
}

fn grapheme_before(text: &str, offset: usize) -> usize {
    text[..offset]
        .grapheme_indices(true)
        .next_back()
        .map_or(0, |(idx, _)| idx)
}

fn grapheme_after(text: &str, offset: usize) -> usize {
    text[offset..]
        .graphemes(true)
        .next()
        .map_or(text.len(), |g| offset + g.len())
}

/// Byte range of the line containing `offset`, without its newline.
fn line_bounds(text: &str, offset: usize) -> Range<usize> {
    let start = text[..offset].rfind('\n').map_or(0, |idx| idx + 1);
    let end = text[offset..].find('\n').map_or(text.len(), |idx| offset + idx);
    start..end
}

fn columns(segment: &str) -> usize {
    segment.graphemes(true).count()
}

fn offset_at_column(text: &str, line: Range<usize>, column: usize) -> usize {
    text[line.clone()]
        .grapheme_indices(true)
        .nth(column)
        .map_or(line.end, |(idx, _)| line.start + idx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backspace_removes_whole_grapheme() {
        let mut editor = EditorState::new("ok 👍🏽".to_string());
        assert!(editor.apply(EditOp::Backspace));
        assert_eq!(editor.buffer(), "ok ");
        assert_eq!(editor.cursor(), 3);
    }

    #[test]
    fn insert_str_lands_at_cursor() {
        let mut editor = EditorState::new("ab".to_string());
        editor.apply_motion(Motion::Left);
        assert!(editor.apply(EditOp::InsertStr("🔥".into())));
        assert_eq!(editor.buffer(), "a🔥b");
        assert_eq!(editor.cursor(), 1 + "🔥".len());
    }

    #[test]
    fn replace_with_same_text_is_not_an_edit() {
        let mut editor = EditorState::new("same".to_string());
        assert!(!editor.apply(EditOp::Replace("same".into())));
        assert!(editor.apply(EditOp::Replace("other".into())));
        assert_eq!(editor.cursor(), 5);
    }

    #[test]
    fn word_navigation_skips_whitespace() {
        let mut editor = EditorState::new("alpha  beta".to_string());
        assert!(editor.apply_motion(Motion::WordLeft));
        assert_eq!(editor.cursor(), 7);
        assert!(editor.apply_motion(Motion::WordLeft));
        assert_eq!(editor.cursor(), 0);
        assert!(editor.apply_motion(Motion::WordRight));
        assert_eq!(editor.cursor(), 7);
    }

    #[test]
    fn vertical_motion_keeps_preferred_column() {
        let mut editor = EditorState::new("abcdef\nab\nabcdef".to_string());
        assert!(editor.apply_motion(Motion::Up));
        assert_eq!(editor.cursor(), 9);
        assert!(editor.apply_motion(Motion::Up));
        assert_eq!(editor.cursor(), 6);
        assert!(editor.apply_motion(Motion::BufferStart));
        assert!(!editor.apply_motion(Motion::Left));
    }

    #[test]
    fn char_count_counts_characters_not_bytes() {
        let editor = EditorState::new("héllo".to_string());
        assert_eq!(editor.char_count(), 5);
    }
}
