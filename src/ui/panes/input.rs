//! Input line rendering

use crate::interpreter::host::HostRequest;
use crate::ui::theme::DEFAULT_THEME;
use ratatui::{
    layout::Rect,
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
    Frame,
};

pub fn render_input_line(
    frame: &mut Frame,
    area: Rect,
    prompt: &str,
    input: &str,
    pending: Option<&HostRequest>,
) {
    let focused = pending.is_some();
    let border_style = if focused {
        Style::default()
            .fg(DEFAULT_THEME.border_focused)
            .add_modifier(Modifier::BOLD)
    } else {
        Style::default().fg(DEFAULT_THEME.border_normal)
    };
    let title = match pending {
        Some(HostRequest::ReadKey) => " Press a key ",
        _ => " Input ",
    };
    let block = Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(border_style);

    let mut spans = vec![
        Span::styled(prompt.trim_end(), Style::default().fg(DEFAULT_THEME.comment)),
        Span::raw(" "),
        Span::styled(input, Style::default().fg(DEFAULT_THEME.input)),
    ];
    if focused {
        spans.push(Span::styled(
            "█",
            Style::default().fg(DEFAULT_THEME.border_focused),
        ));
    }

    frame.render_widget(Paragraph::new(Line::from(spans)).block(block), area);
}
