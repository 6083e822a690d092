//! Machine pane: registers and engine state

use crate::interpreter::engine::Engine;
use crate::ui::theme::DEFAULT_THEME;
use ratatui::{
    layout::Rect,
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Padding, Paragraph},
    Frame,
};

fn row<'a>(name: &'a str, value: String) -> Line<'a> {
    Line::from(vec![
        Span::styled(
            format!("{:<10}", name),
            Style::default().fg(DEFAULT_THEME.register),
        ),
        Span::styled(value, Style::default().fg(DEFAULT_THEME.number)),
    ])
}

pub fn render_machine_pane(frame: &mut Frame, area: Rect, engine: &Engine) {
    let block = Block::default()
        .title(" Machine ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(DEFAULT_THEME.border_focused))
        .padding(Padding::new(1, 1, 0, 0));

    let (mode, rock) = engine.io_system().mode_and_rock();
    let mut lines = vec![
        row("PC", format!("{:#010x}", engine.pc())),
        row("FP", format!("{:#x}", engine.fp())),
        row("SP", format!("{:#x}", engine.sp())),
        row("frameLen", format!("{}", engine.frame_len())),
        row("localsPos", format!("{}", engine.locals_pos())),
        row("mode", engine.exec_mode().to_string()),
        row("iosys", format!("{} ({:#x})", mode, rock)),
        row("channel", engine.current_channel().to_string()),
        row("endMem", format!("{:#x}", engine.image().end_mem())),
        row("heap", format!("{} blocks", engine.heap_blocks())),
        row("undo", format!("{} saved", engine.undo_depth())),
        row("veneer", format!("{} routines", engine.veneer().intercept_count())),
        Line::from(""),
    ];

    let next = engine
        .disassemble_current()
        .unwrap_or_else(|| "(printing)".to_string());
    lines.push(Line::from(Span::styled(
        "next",
        Style::default()
            .fg(DEFAULT_THEME.channel)
            .add_modifier(Modifier::BOLD),
    )));
    lines.push(Line::from(Span::styled(
        next,
        Style::default().fg(DEFAULT_THEME.fg),
    )));

    frame.render_widget(Paragraph::new(lines).block(block), area);
}
