pub const GRID_COLUMNS: usize = 10;

pub const EMOJIS: &[&str] = &[
    "😀", "😂", "😊", "😍", "🥰", "😎", "🤔", "😅", "😭", "🙏",
    "👍", "👎", "❤️", "💔", "🔥", "⚡", "✨", "🎉", "🎊", "🎈",
    "📝", "📌", "📎", "💡", "🔑", "🏆", "⭐", "🌟", "💫", "🚀",
    "💻", "📱", "🖥️", "⌨️", "📷", "🎵", "🎶", "🎸", "🎹", "🥁",
    "🍕", "🍔", "🍣", "☕", "🍺", "🥂", "🎂", "🍰", "🍩", "🍫",
    "🌍", "🌈", "☀️", "🌙", "⛅", "❄️", "🌊", "🏔️", "🌺", "🌸",
    "😴", "🤯", "😤", "🥳", "🤩", "👻", "💀", "🤖", "👾", "🎃",
    "🐶", "🐱", "🦊", "🐻", "🐼", "🦁", "🐸", "🦋", "🌻", "🌴",
    "✅", "❌", "⚠️", "ℹ️", "🔴", "🟡", "🟢", "🔵", "⬛", "⬜",
    "👋", "✌️", "👏", "💪", "🤝", "🫡", "🫶", "👌", "🤌", "☝️",
];

/// Emojis whose text contains the trimmed query; everything for a blank query.
pub fn filter(query: &str) -> Vec<&'static str> {
    let needle = query.trim();
    if needle.is_empty() {
        return EMOJIS.to_vec();
    }
    EMOJIS
        .iter()
        .copied()
        .filter(|emoji| emoji.contains(needle))
        .collect()
}

/// Moves a grid selection by `(dx, dy)` cells, staying inside `len` items.
pub fn move_selection(selected: usize, len: usize, dx: isize, dy: isize) -> usize {
    if len == 0 {
        return 0;
    }
    let target = selected as isize + dx + dy * GRID_COLUMNS as isize;
    target.clamp(0, len as isize - 1) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_query_lists_everything() {
        assert_eq!(filter("  ").len(), EMOJIS.len());
        assert_eq!(EMOJIS.len(), 100);
    }

    #[test]
    fn query_matches_by_substring() {
        assert_eq!(filter("🔥"), vec!["🔥"]);
        // Variation selectors are part of the text, so a bare sun still matches.
        assert_eq!(filter("☀"), vec!["☀️"]);
        assert!(filter("zebra").is_empty());
    }

    #[test]
    fn selection_stays_in_bounds() {
        assert_eq!(move_selection(0, 100, -1, 0), 0);
        assert_eq!(move_selection(5, 100, 0, 1), 15);
        assert_eq!(move_selection(95, 100, 0, 1), 99);
        assert_eq!(move_selection(3, 0, 1, 1), 0);
    }
}
