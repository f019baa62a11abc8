use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, Borders, Clear, Paragraph, Wrap};
use ratatui::Frame;
use time::{macros::format_description, OffsetDateTime};
use unicode_segmentation::UnicodeSegmentation;
use unicode_width::UnicodeWidthStr;

use crate::app::state::{AppState, ControlsRow, EmojiPicker, OverlayState};
use crate::config::Palette;
use crate::emoji::GRID_COLUMNS;
use crate::journaling::AutoSaveStatus;
use crate::session::{EditorState, Session};

const MAX_TAB_LABEL_WIDTH: usize = 18;

pub fn draw_app(frame: &mut Frame, session: &Session, state: &AppState) {
    let prefs = session.preferences();
    let palette = prefs.theme.palette();
    let base = Style::default()
        .bg(palette.background_color())
        .fg(palette.blend(palette.text, prefs.opacity.get()));
    frame.render_widget(Block::default().style(base), frame.size());

    let controls_height = if state.controls().is_some() { 1 } else { 0 };
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Length(controls_height),
            Constraint::Min(3),
            Constraint::Length(2),
        ])
        .split(frame.size());

    frame.render_widget(
        Paragraph::new(build_tab_bar(session, &palette, vertical[0].width)),
        vertical[0],
    );

    if let Some(row) = state.controls() {
        frame.render_widget(
            Paragraph::new(build_controls_line(session, row, &palette)),
            vertical[1],
        );
    }

    draw_editor(frame, session, &palette, vertical[2]);

    let status = build_status_lines(session, state, &palette);
    frame.render_widget(Paragraph::new(status), vertical[3]);

    render_overlay(frame, state, &palette);
}

fn draw_editor(frame: &mut Frame, session: &Session, palette: &Palette, area: Rect) {
    let prefs = session.preferences();
    let text_rgb = prefs.text_color.rgb().unwrap_or(palette.text);
    let text_style = Style::default()
        .fg(palette.blend(text_rgb, prefs.opacity.get()))
        .bg(palette.background_color());

    let editor = session.editor();
    let title = session
        .state()
        .active_tab()
        .map(|tab| tab.label.clone())
        .unwrap_or_default();
    let border_color = if session.is_dirty() {
        palette.unsaved
    } else {
        palette.muted
    };
    let block = Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color));

    let cursor = editor_cursor_position(editor, area);
    let scroll = cursor
        .map(|(_, row)| row.saturating_sub(area.height.saturating_sub(3)))
        .unwrap_or(0);

    let body: Text = if editor.buffer().is_empty() {
        Text::from(Line::from(Span::styled(
            "Start typing…",
            Style::default().fg(palette.muted).add_modifier(Modifier::ITALIC),
        )))
    } else {
        Text::from(editor.buffer().to_string())
    };

    let paragraph = Paragraph::new(body)
        .style(text_style)
        .block(block)
        .wrap(Wrap { trim: false })
        .scroll((scroll, 0));
    frame.render_widget(paragraph, area);

    if let Some((col, row)) = cursor {
        // `scroll` never exceeds `row`, so the visible row stays inside the block.
        frame.set_cursor(
            area.x.saturating_add(1 + col),
            area.y.saturating_add(1 + (row - scroll)),
        );
    }
}

fn build_tab_bar(session: &Session, palette: &Palette, width: u16) -> Line<'static> {
    let state = session.state();
    let mut spans = Vec::with_capacity(state.len() * 2);
    let mut used = 0usize;
    for (idx, tab) in state.tabs().iter().enumerate() {
        let active = state.active_tab_id() == Some(&tab.id);
        let mut label = format!(" {} {} ", idx + 1, truncate_label(&tab.label, MAX_TAB_LABEL_WIDTH));
        if active && session.is_dirty() {
            label.push_str("● ");
        }
        used += UnicodeWidthStr::width(label.as_str()) + 1;
        if used > width as usize && !active {
            spans.push(Span::styled("…", Style::default().fg(palette.muted)));
            break;
        }
        let style = if active {
            Style::default()
                .fg(palette.accent)
                .bg(palette.surface)
                .add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(palette.muted)
        };
        spans.push(Span::styled(label, style));
        spans.push(Span::raw(" "));
    }
    Line::from(spans)
}

fn build_controls_line(session: &Session, row: &ControlsRow, palette: &Palette) -> Line<'static> {
    let label_style = Style::default()
        .fg(palette.accent)
        .add_modifier(Modifier::BOLD);
    let hint_style = Style::default().fg(palette.muted);
    match row {
        ControlsRow::Opacity => {
            let percent = session.preferences().opacity.get();
            Line::from(vec![
                Span::styled("Opacity ", label_style),
                Span::raw(opacity_gauge(percent, 16)),
                Span::raw(format!(" {percent}%")),
                Span::styled("   ←/→ adjust • Esc close", hint_style),
            ])
        }
        ControlsRow::Color { input } => {
            let mut display = input.clone();
            display.push('▌');
            let swatch = session
                .preferences()
                .text_color
                .rgb()
                .map(|(r, g, b)| Span::styled(" ■ ", Style::default().fg(Color::Rgb(r, g, b))))
                .unwrap_or_else(|| Span::raw(" "));
            Line::from(vec![
                Span::styled("Text colour ", label_style),
                Span::raw(display),
                swatch,
                Span::styled(
                    "  #rrggbb, empty for default • Enter apply • Esc close",
                    hint_style,
                ),
            ])
        }
    }
}

fn build_status_lines(session: &Session, state: &AppState, palette: &Palette) -> Text<'static> {
    let prefs = session.preferences();
    let status = session.autosave_status();
    let save_label = state.save_label(&status);
    let save_style = match (&status, save_label) {
        (_, "Saved!") => Style::default()
            .fg(palette.accent)
            .add_modifier(Modifier::BOLD),
        (AutoSaveStatus::Dirty { .. }, _) | (AutoSaveStatus::Error { .. }, _) => {
            Style::default().fg(palette.unsaved)
        }
        _ => Style::default().fg(palette.muted),
    };

    let mut spans = vec![
        Span::styled(
            format_char_count(session.editor().char_count()),
            Style::default().add_modifier(Modifier::BOLD),
        ),
        Span::raw(" | "),
        Span::styled(save_label.to_string(), save_style),
    ];
    if let AutoSaveStatus::Clean {
        last_saved_at: Some(ts),
    } = status
    {
        spans.push(Span::styled(
            format!(" {}", format_time_short(ts)),
            Style::default().fg(palette.muted),
        ));
    }
    spans.push(Span::raw(format!(
        " | Theme: {} | Opacity: {}% | Colour: {}",
        prefs.theme,
        prefs.opacity.get(),
        prefs.text_color.label()
    )));

    if let Some(message) = state.status_message() {
        spans.push(Span::raw(" | "));
        spans.push(Span::styled(
            message.to_string(),
            Style::default().fg(palette.accent),
        ));
    }

    let hints = format!(
        "Ctrl-S save • Ctrl-T new • Ctrl-W close • Alt-←/→ tabs • F2 rename • Ctrl-L clear • Ctrl-E emoji • Ctrl-D {} • Ctrl-O opacity • Ctrl-K colour • Ctrl-Q quit",
        prefs.theme.toggle_hint()
    );

    Text::from(vec![
        Line::from(spans),
        Line::from(Span::styled(hints, Style::default().fg(palette.muted))),
    ])
}

/// "1 char", "12 chars", "1,234 chars".
pub fn format_char_count(count: usize) -> String {
    let digits = count.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (idx, ch) in digits.chars().enumerate() {
        if idx > 0 && (digits.len() - idx) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    let unit = if count == 1 { "char" } else { "chars" };
    format!("{grouped} {unit}")
}

fn format_time_short(dt: OffsetDateTime) -> String {
    dt.format(&format_description!("[hour]:[minute]:[second]"))
        .unwrap_or_else(|_| dt.unix_timestamp().to_string())
}

fn truncate_label(label: &str, max_width: usize) -> String {
    if UnicodeWidthStr::width(label) <= max_width {
        return label.to_string();
    }
    let mut out = String::new();
    let mut width = 0;
    for grapheme in label.graphemes(true) {
        let w = UnicodeWidthStr::width(grapheme);
        if width + w + 1 > max_width {
            break;
        }
        out.push_str(grapheme);
        width += w;
    }
    out.push('…');
    out
}

fn opacity_gauge(percent: u8, cells: usize) -> String {
    let filled = (usize::from(percent) * cells + 50) / 100;
    let mut gauge = String::with_capacity(cells * 3);
    gauge.push_str(&"█".repeat(filled));
    gauge.push_str(&"░".repeat(cells - filled.min(cells)));
    gauge
}

/// Cursor column and unscrolled row inside the editor block's borders.
fn editor_cursor_position(editor: &EditorState, area: Rect) -> Option<(u16, u16)> {
    let inner_width = area.width.saturating_sub(2);
    let inner_height = area.height.saturating_sub(2);
    if inner_width == 0 || inner_height == 0 {
        return None;
    }

    let mut row = 0usize;
    let mut col = 0usize;
    let width_limit = inner_width as usize;
    let buffer = editor.buffer();
    let cursor = editor.cursor().min(buffer.len());

    for grapheme in buffer[..cursor].graphemes(true) {
        if grapheme == "\n" || grapheme == "\r\n" {
            row += 1;
            col = 0;
            continue;
        }
        let glyph_width = UnicodeWidthStr::width(grapheme);
        if glyph_width > 0 && col + glyph_width > width_limit {
            row += 1;
            col = 0;
        }
        col += glyph_width;
    }

    let col = col.min(width_limit.saturating_sub(1)) as u16;
    let row = row.min(u16::MAX as usize) as u16;
    Some((col, row))
}

fn render_overlay(frame: &mut Frame, state: &AppState, palette: &Palette) {
    let hint = Style::default().fg(palette.muted);
    let border = Style::default().fg(palette.accent);
    let surface = Style::default().bg(palette.surface);
    match state.overlay() {
        Some(OverlayState::Rename(draft)) => {
            let area = centered_rect(50, 25, frame.size());
            frame.render_widget(Clear, area);
            let mut display = draft.label.clone();
            display.push('▌');
            let paragraph = Paragraph::new(vec![
                Line::from(Span::styled(
                    "Rename tab",
                    Style::default().add_modifier(Modifier::BOLD),
                )),
                Line::from(""),
                Line::from(display),
                Line::from(""),
                Line::from(Span::styled("Enter to save • Esc to cancel", hint)),
            ])
            .style(surface)
            .block(
                Block::default()
                    .title("Rename")
                    .borders(Borders::ALL)
                    .border_style(border),
            )
            .wrap(Wrap { trim: false });
            frame.render_widget(paragraph, area);
        }
        Some(OverlayState::ConfirmClear) => {
            let area = centered_rect(50, 25, frame.size());
            frame.render_widget(Clear, area);
            let paragraph = Paragraph::new(vec![
                Line::from(Span::styled(
                    "Clear this tab?",
                    Style::default().add_modifier(Modifier::BOLD),
                )),
                Line::from(""),
                Line::from("Everything written in this tab will be removed."),
                Line::from(""),
                Line::from(Span::styled("Enter or y clear • Esc cancel", hint)),
            ])
            .style(surface)
            .block(
                Block::default()
                    .title("Confirm Clear")
                    .borders(Borders::ALL)
                    .border_style(Style::default().fg(palette.unsaved)),
            )
            .wrap(Wrap { trim: false });
            frame.render_widget(paragraph, area);
        }
        Some(OverlayState::Emoji(picker)) => {
            let area = centered_rect(60, 60, frame.size());
            frame.render_widget(Clear, area);
            let paragraph = Paragraph::new(build_emoji_grid(picker, palette))
                .style(surface)
                .block(
                    Block::default()
                        .title("Emoji")
                        .borders(Borders::ALL)
                        .border_style(border),
                );
            frame.render_widget(paragraph, area);
        }
        None => {}
    }
}

fn build_emoji_grid(picker: &EmojiPicker, palette: &Palette) -> Vec<Line<'static>> {
    let mut query = picker.query.clone();
    query.push('▌');
    let mut lines = vec![
        Line::from(vec![
            Span::styled("Search: ", Style::default().fg(palette.accent)),
            Span::raw(query),
        ]),
        Line::from(""),
    ];

    let matches = picker.matches();
    if matches.is_empty() {
        lines.push(Line::from(Span::styled(
            "No matches",
            Style::default().fg(palette.muted),
        )));
    }
    for (row, chunk) in matches.chunks(GRID_COLUMNS).enumerate() {
        let spans = chunk
            .iter()
            .enumerate()
            .map(|(col, emoji)| {
                let style = if row * GRID_COLUMNS + col == picker.selected {
                    Style::default()
                        .bg(palette.accent)
                        .add_modifier(Modifier::BOLD)
                } else {
                    Style::default()
                };
                Span::styled(format!(" {emoji} "), style)
            })
            .collect::<Vec<_>>();
        lines.push(Line::from(spans));
    }

    lines.push(Line::from(""));
    lines.push(Line::from(Span::styled(
        "Arrows move • Enter insert • Esc close",
        Style::default().fg(palette.muted),
    )));
    lines
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints(
            [
                Constraint::Percentage((100 - percent_y) / 2),
                Constraint::Percentage(percent_y),
                Constraint::Percentage((100 - percent_y) / 2),
            ]
            .as_ref(),
        )
        .split(area);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints(
            [
                Constraint::Percentage((100 - percent_x) / 2),
                Constraint::Percentage(percent_x),
                Constraint::Percentage((100 - percent_x) / 2),
            ]
            .as_ref(),
        )
        .split(vertical[1])[1]
}
