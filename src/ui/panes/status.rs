//! Location line and status bar rendering

use crate::ui::app::STATUS_CHANNELS;
use crate::ui::theme::DEFAULT_THEME;
use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::Paragraph,
    Frame,
};
use rustc_hash::FxHashMap;

/// Render the location line: LOCN on the left, score and time on the right
pub fn render_location_line(frame: &mut Frame, area: Rect, channels: &FxHashMap<String, String>) {
    let bar_style = Style::default()
        .bg(DEFAULT_THEME.primary)
        .fg(Color::Black);
    let channel = |name: &str| {
        channels
            .get(name)
            .map(|text| text.trim().to_string())
            .unwrap_or_default()
    };

    let left = Paragraph::new(Line::from(Span::styled(
        format!(" {} ", channel(STATUS_CHANNELS[0])),
        bar_style.add_modifier(Modifier::BOLD),
    )))
    .style(bar_style)
    .alignment(Alignment::Left);

    let mut right_spans = Vec::new();
    for &name in &STATUS_CHANNELS[1..] {
        let text = channel(name);
        if !text.is_empty() {
            right_spans.push(Span::styled(format!(" {}: {} ", name, text), bar_style));
        }
    }
    let right = Paragraph::new(Line::from(right_spans))
        .style(bar_style)
        .alignment(Alignment::Right);

    frame.render_widget(left, area);
    frame.render_widget(right, area);
}

/// Render the status bar at the bottom
pub fn render_status_bar(
    frame: &mut Frame,
    area: Rect,
    message: &str,
    is_error: bool,
    is_waiting: bool,
) {
    let layout = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(area);

    let state_text = if is_error {
        " HALTED "
    } else if is_waiting {
        " INPUT "
    } else {
        " RUN "
    };

    let left_spans = vec![
        Span::styled(
            state_text,
            Style::default()
                .bg(if is_error {
                    DEFAULT_THEME.error
                } else if is_waiting {
                    DEFAULT_THEME.secondary
                } else {
                    DEFAULT_THEME.success
                })
                .fg(Color::Black)
                .add_modifier(Modifier::BOLD),
        ),
        Span::styled(
            " | ",
            Style::default()
                .bg(DEFAULT_THEME.current_line_bg)
                .fg(DEFAULT_THEME.comment),
        ),
        Span::styled(
            format!(" {} ", message),
            Style::default()
                .bg(DEFAULT_THEME.current_line_bg)
                .fg(if is_error {
                    DEFAULT_THEME.error
                } else {
                    DEFAULT_THEME.fg
                }),
        ),
    ];

    let left_paragraph = Paragraph::new(Line::from(left_spans))
        .style(Style::default().bg(DEFAULT_THEME.current_line_bg))
        .alignment(Alignment::Left);

    frame.render_widget(left_paragraph, layout[0]);

    let key_style = Style::default().bg(DEFAULT_THEME.comment).fg(Color::Black);
    let desc_style = Style::default()
        .bg(DEFAULT_THEME.current_line_bg)
        .fg(DEFAULT_THEME.fg);
    let sep_style = Style::default()
        .bg(DEFAULT_THEME.current_line_bg)
        .fg(DEFAULT_THEME.comment);

    let right_spans = vec![
        Span::styled(" ↵ ", key_style),
        Span::styled(" submit ", desc_style),
        Span::styled("│", sep_style),
        Span::styled(" ", desc_style),
        Span::styled(" ↑/↓ ", key_style),
        Span::styled(" scroll ", desc_style),
        Span::styled("│", sep_style),
        Span::styled(" ", desc_style),
        Span::styled(" Tab ", key_style),
        Span::styled(" machine ", desc_style),
        Span::styled("│", sep_style),
        Span::styled(" ", desc_style),
        Span::styled(" Esc ", key_style),
        Span::styled(" quit ", desc_style),
    ];

    let right_paragraph = Paragraph::new(Line::from(right_spans))
        .style(Style::default().bg(DEFAULT_THEME.current_line_bg))
        .alignment(Alignment::Right);

    frame.render_widget(right_paragraph, layout[1]);
}
