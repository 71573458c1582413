//! UI rendering for the debugger.

use super::app::DebuggerApp;
use crate::cpu::CondFlag;
use ratatui::{
    prelude::*,
    style::{Color, Modifier, Style},
    widgets::{Block, Borders, List, ListItem, Paragraph},
};

/// Main draw function.
pub fn draw(frame: &mut Frame, app: &DebuggerApp) {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(55), Constraint::Percentage(45)])
        .split(frame.area());

    // Left side: code, registers, status
    let left_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(10),
            Constraint::Length(6),
            Constraint::Length(3),
        ])
        .split(chunks[0]);

    draw_disassembly(frame, left_chunks[0], app);
    draw_registers(frame, left_chunks[1], app);
    draw_status(frame, left_chunks[2], app);

    // Right side: memory, program console, help
    let right_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(8),
            Constraint::Length(8),
            Constraint::Length(4),
        ])
        .split(chunks[1]);

    draw_memory(frame, right_chunks[0], app);
    draw_console(frame, right_chunks[1], app);
    draw_help(frame, right_chunks[2]);
}

/// Draw the disassembly view around the PC.
fn draw_disassembly(frame: &mut Frame, area: Rect, app: &DebuggerApp) {
    let rows = app.disassembly((area.height as usize).saturating_sub(2));

    let items: Vec<ListItem> = rows
        .iter()
        .map(|(addr, text, is_current)| {
            let prefix = if *is_current { "▶" } else { " " };
            let bp = if app.breakpoints.contains(addr) { "●" } else { " " };

            let style = if *is_current {
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
            } else if app.breakpoints.contains(addr) {
                Style::default().fg(Color::Red)
            } else {
                Style::default()
            };

            ListItem::new(format!("{bp}{prefix} x{addr:04X}: {text}")).style(style)
        })
        .collect();

    let list = List::new(items).block(
        Block::default()
            .title(" Disassembly ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan)),
    );

    frame.render_widget(list, area);
}

/// Draw the register file, flags, and run state.
fn draw_registers(frame: &mut Frame, area: Rect, app: &DebuggerApp) {
    let regs = &app.cpu.regs;

    let gpr_line = |range: std::ops::Range<u16>| {
        let spans: Vec<Span> = range
            .flat_map(|r| {
                vec![
                    Span::raw(format!("R{r}: ")),
                    Span::styled(
                        format!("x{:04X}  ", regs.read(r)),
                        Style::default().fg(Color::White),
                    ),
                ]
            })
            .collect();
        Line::from(spans)
    };

    let content = vec![
        gpr_line(0..4),
        gpr_line(4..8),
        Line::from(vec![
            Span::raw("PC: "),
            Span::styled(format!("x{:04X}", regs.pc), Style::default().fg(Color::Yellow)),
            Span::raw("   COND: "),
            Span::styled(format!("{:?}", regs.cond), cond_style(regs.cond)),
        ]),
        Line::from(vec![
            Span::raw("Cycles: "),
            Span::styled(
                format!("{}", app.cpu.cycles),
                Style::default().fg(Color::Cyan),
            ),
            Span::raw("   State: "),
            Span::styled(
                format!("{:?}", app.cpu.state),
                if app.cpu.is_running() {
                    Style::default().fg(Color::Green)
                } else {
                    Style::default().fg(Color::Red)
                },
            ),
        ]),
    ];

    let paragraph = Paragraph::new(content).block(
        Block::default()
            .title(" Registers ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Green)),
    );

    frame.render_widget(paragraph, area);
}

/// Draw the scrollable memory view.
fn draw_memory(frame: &mut Frame, area: Rect, app: &DebuggerApp) {
    let visible_rows = (area.height as usize).saturating_sub(2);
    let start = app.mem_scroll;

    let items: Vec<ListItem> = (0..visible_rows as u16)
        .filter_map(|i| start.checked_add(i))
        .map(|addr| {
            let value = app.cpu.mem.peek(addr);
            let is_pc = addr == app.cpu.regs.pc;

            let style = if is_pc {
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
            } else if value != 0 {
                Style::default().fg(Color::White)
            } else {
                Style::default().fg(Color::DarkGray)
            };

            ListItem::new(format!("x{addr:04X}: x{value:04X} ({})", value as i16)).style(style)
        })
        .collect();

    let list = List::new(items).block(
        Block::default()
            .title(" Memory ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Magenta)),
    );

    frame.render_widget(list, area);
}

/// Draw the program's console output.
fn draw_console(frame: &mut Frame, area: Rect, app: &DebuggerApp) {
    let log = app.console_log();

    // Show the tail that fits the pane.
    let visible_rows = (area.height as usize).saturating_sub(2);
    let lines: Vec<&str> = log.lines().collect();
    let tail_start = lines.len().saturating_sub(visible_rows);
    let text: Vec<Line> = lines[tail_start..].iter().map(|l| Line::from(*l)).collect();

    let title = if app.waiting_for_input() {
        " Console (waiting for key) "
    } else {
        " Console "
    };

    let paragraph = Paragraph::new(text).block(
        Block::default()
            .title(title)
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Blue)),
    );

    frame.render_widget(paragraph, area);
}

/// Draw the status bar.
fn draw_status(frame: &mut Frame, area: Rect, app: &DebuggerApp) {
    let status = Paragraph::new(app.status.clone())
        .style(Style::default().fg(Color::White))
        .block(
            Block::default()
                .title(" Status ")
                .borders(Borders::ALL),
        );

    frame.render_widget(status, area);
}

/// Draw the help panel.
fn draw_help(frame: &mut Frame, area: Rect) {
    let help = Paragraph::new(vec![
        Line::from("s: Step  r: Run  Esc: Pause  b: Breakpoint  x: Reset"),
        Line::from("↑↓/PgUp/PgDn: Scroll memory  q: Quit  (typed keys feed the program)"),
    ])
    .style(Style::default().fg(Color::DarkGray))
    .block(Block::default().title(" Help ").borders(Borders::ALL));

    frame.render_widget(help, area);
}

/// Color for a condition flag.
fn cond_style(flag: CondFlag) -> Style {
    match flag {
        CondFlag::Positive => Style::default().fg(Color::Green),
        CondFlag::Zero => Style::default().fg(Color::Gray),
        CondFlag::Negative => Style::default().fg(Color::Red),
    }
}
