//! Transcript pane rendering

use crate::ui::theme::DEFAULT_THEME;
use ratatui::{
    layout::Rect,
    style::Style,
    widgets::{Block, Borders, List, ListItem, Padding, Paragraph},
    Frame,
};

/// Render the game transcript, wrapped to the pane width
pub fn render_transcript_pane(
    frame: &mut Frame,
    area: Rect,
    transcript: &str,
    scroll_offset: &mut usize,
) {
    let block = Block::default()
        .title(" Transcript ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(DEFAULT_THEME.border_normal));

    if transcript.is_empty() {
        let paragraph = Paragraph::new("(no output)")
            .block(block)
            .style(Style::default().fg(DEFAULT_THEME.comment));
        frame.render_widget(paragraph, area);
        return;
    }

    let block = block.padding(Padding::new(1, 0, 0, 0));
    let width = area.width.saturating_sub(3).max(1) as usize; // borders and padding
    let lines = wrap_text(transcript, width);

    let total_items = lines.len();
    let visible_height = area.height.saturating_sub(2).max(1) as usize;

    if total_items > visible_height {
        let max_scroll = total_items - visible_height;
        *scroll_offset = (*scroll_offset).min(max_scroll);
    } else {
        *scroll_offset = 0;
    }

    let visible_items: Vec<ListItem> = lines
        .into_iter()
        .skip(*scroll_offset)
        .take(visible_height)
        .map(|line| ListItem::new(line).style(Style::default().fg(DEFAULT_THEME.fg)))
        .collect();

    let list = List::new(visible_items).block(block);
    frame.render_widget(list, area);
}

/// Break text into lines no wider than `width`, preferring word boundaries
pub fn wrap_text(text: &str, width: usize) -> Vec<String> {
    let mut out = Vec::new();
    for paragraph in text.split('\n') {
        let mut line = String::new();
        let mut line_len = 0;
        for word in paragraph.split(' ') {
            let word_len = word.chars().count();
            if line_len > 0 && line_len + 1 + word_len > width {
                out.push(std::mem::take(&mut line));
                line_len = 0;
            }
            if line_len > 0 {
                line.push(' ');
                line_len += 1;
            }
            let mut chars = word.chars().peekable();
            while chars.peek().is_some() {
                if line_len == width {
                    out.push(std::mem::take(&mut line));
                    line_len = 0;
                }
                if let Some(c) = chars.next() {
                    line.push(c);
                    line_len += 1;
                }
            }
        }
        out.push(line);
    }
    // a trailing newline leaves an empty last line
    if text.ends_with('\n') {
        out.pop();
    }
    out
}
