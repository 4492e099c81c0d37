use ratatui::{
    Frame,
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{
        Block, Borders, Paragraph, Scrollbar, ScrollbarOrientation, ScrollbarState, Wrap,
    },
};
use crate::app::{App, BackendStatus, InputMode};
use crate::markdown;

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();

    // Main layout: header, body, footer
    let [header_area, body_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(0),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(app, frame, header_area);
    render_chat(app, frame, body_area);
    render_footer(app, frame, footer_area);
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let (status_text, status_color) = match app.backend_status {
        BackendStatus::Unknown => ("●  unknown", Color::Gray),
        BackendStatus::Checking => ("●  checking", Color::Yellow),
        BackendStatus::Online => ("●  online", Color::Green),
        BackendStatus::Offline => ("●  offline", Color::Red),
    };

    let title = Line::from(vec![
        Span::styled(" Agent Chat ", Style::default().fg(Color::Cyan).bold()),
        Span::styled(app.base_url.as_str().to_string(), Style::default().fg(Color::White)),
        Span::raw(" "),
        Span::styled(status_text, Style::default().fg(status_color)),
        Span::raw(" "),
        Span::styled(
            format!("v{}", env!("CARGO_PKG_VERSION")),
            Style::default().fg(Color::Gray),
        ),
    ]);

    let header = Paragraph::new(title).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(header, area);
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    let (mode_text, mode_style) = match app.input_mode {
        InputMode::Normal => (" VIEW ", Style::default().bg(Color::Blue).fg(Color::White)),
        InputMode::Editing => (" ASK ", Style::default().bg(Color::Yellow).fg(Color::Black)),
    };

    // Key style: dark background with bright text for visibility on both light/dark terminals
    let key_style = Style::default().bg(Color::DarkGray).fg(Color::White);
    let label_style = Style::default().bg(Color::Black).fg(Color::White);

    let hints = match app.input_mode {
        InputMode::Editing => vec![
            Span::styled(" Enter ", key_style),
            Span::styled(" send ", label_style),
            Span::styled(" Esc ", key_style),
            Span::styled(" stop typing ", label_style),
            Span::styled(" Ctrl-C ", key_style),
            Span::styled(" quit ", label_style),
        ],
        InputMode::Normal => {
            let mut hints = vec![
                Span::styled(" j/k ", key_style),
                Span::styled(" scroll ", label_style),
                Span::styled(" i ", key_style),
                Span::styled(" ask ", label_style),
            ];
            if app.session.in_progress() {
                hints.extend(vec![
                    Span::styled(" x ", key_style),
                    Span::styled(" stop ", label_style),
                ]);
            } else {
                hints.extend(vec![
                    Span::styled(" Enter ", key_style),
                    Span::styled(" resend ", label_style),
                ]);
            }
            hints.extend(vec![
                Span::styled(" r ", key_style),
                Span::styled(
                    if app.hide_reasoning { " show reasoning " } else { " hide reasoning " },
                    label_style,
                ),
                Span::styled(" h ", key_style),
                Span::styled(" health ", label_style),
                Span::styled(" q ", key_style),
                Span::styled(" quit ", label_style),
            ]);
            hints
        }
    };

    let footer_content = Line::from(
        vec![
            Span::styled(mode_text, mode_style),
            Span::styled(" ", label_style),
        ]
        .into_iter()
        .chain(hints)
        .collect::<Vec<_>>(),
    );

    let footer = Paragraph::new(footer_content).style(Style::default().bg(Color::Black));
    frame.render_widget(footer, area);
}

fn render_chat(app: &mut App, frame: &mut Frame, area: Rect) {
    // Response on top, query input at the bottom
    let [response_area, input_area] = Layout::vertical([
        Constraint::Min(0),
        Constraint::Length(3),
    ])
    .areas(area);

    render_response(app, frame, response_area);
    render_input(app, frame, input_area);
}

fn render_response(app: &mut App, frame: &mut Frame, area: Rect) {
    // Store area for mouse hit-testing
    app.response_area = Some(area);

    let focused = app.input_mode == InputMode::Normal;
    let border_color = if focused { Color::Cyan } else { Color::DarkGray };

    let mut title = vec![Span::raw(" Response ")];
    if app.session.in_progress() {
        // Animated ellipsis: cycles through ".", "..", "..."
        let dots = ".".repeat(usize::from(app.animation_frame) + 1);
        title.push(Span::styled(
            format!("Streaming{dots:<3} "),
            Style::default().fg(Color::Yellow).add_modifier(Modifier::ITALIC),
        ));
    }
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(Line::from(title));

    let display = app.display_text();
    let lines = if display.is_empty() && !app.session.in_progress() {
        vec![Line::from(Span::styled(
            "Type a question below and press Enter.",
            Style::default().fg(Color::DarkGray),
        ))]
    } else {
        markdown::render(&display)
    };

    // Count rows with the same word wrapping the widget renders with
    let inner = block.inner(area);
    let response = Paragraph::new(Text::from(lines)).wrap(Wrap { trim: false });
    let rows = u16::try_from(response.line_count(inner.width)).unwrap_or(u16::MAX);
    app.update_response_layout(rows, inner.height);

    let response = response.block(block).scroll((app.response_scroll, 0));
    frame.render_widget(response, area);

    if app.total_response_lines > app.response_height {
        let mut scrollbar_state = ScrollbarState::new(usize::from(
            app.total_response_lines - app.response_height,
        ))
        .position(usize::from(app.response_scroll));
        let scrollbar = Scrollbar::new(ScrollbarOrientation::VerticalRight)
            .begin_symbol(None)
            .end_symbol(None);
        frame.render_stateful_widget(scrollbar, area, &mut scrollbar_state);
    }
}

fn render_input(app: &App, frame: &mut Frame, area: Rect) {
    let editing = app.input_mode == InputMode::Editing;
    let border_color = if editing { Color::Yellow } else { Color::DarkGray };

    let input_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(" Ask (Enter to send) ");

    // Calculate visible portion of input with horizontal scrolling
    // Inner width = total width - 2 (for borders)
    let inner_width = area.width.saturating_sub(2) as usize;
    let cursor_pos = app.query_cursor;

    // Calculate scroll offset to keep cursor visible
    let scroll_offset = if inner_width == 0 {
        0
    } else if cursor_pos >= inner_width {
        cursor_pos - inner_width + 1
    } else {
        0
    };

    // Get the visible slice of the input
    let visible_text: String = app
        .session
        .query
        .chars()
        .skip(scroll_offset)
        .take(inner_width)
        .collect();

    let input = Paragraph::new(visible_text)
        .style(Style::default().fg(Color::Cyan))
        .block(input_block);

    frame.render_widget(input, area);

    // Show cursor when editing
    if editing {
        let cursor_x = (cursor_pos - scroll_offset) as u16;
        frame.set_cursor_position((area.x + cursor_x + 1, area.y + 1));
    }
}
