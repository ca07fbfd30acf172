use ratatui::{
    Frame,
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, List, ListItem, Paragraph, Wrap},
};
use codetalk_core::diagram::{is_diagram_message, DIAGRAM_HEADER};
use codetalk_core::export::cli_instructions;
use codetalk_core::viewer::RENDER_FALLBACK_SVG;
use codetalk_core::{Author, MessageId, SplitPage, ViewMode, ViewerState};
use crate::app::{App, InputMode, MenuAction};

fn parse_markdown_line(text: &str) -> Line<'static> {
    let mut spans: Vec<Span<'static>> = Vec::new();
    let mut rest = text;

    // **bold** and `code` spans; anything unclosed stays literal
    while let Some(start) = rest.find(['*', '`']) {
        let (marker, style) = if rest[start..].starts_with("**") {
            ("**", Style::default().add_modifier(Modifier::BOLD))
        } else if rest[start..].starts_with('`') {
            ("`", Style::default().fg(Color::Magenta))
        } else {
            spans.push(Span::raw(rest[..=start].to_string()));
            rest = &rest[start + 1..];
            continue;
        };

        let body_start = start + marker.len();
        match rest[body_start..].find(marker) {
            Some(len) if len > 0 => {
                if start > 0 {
                    spans.push(Span::raw(rest[..start].to_string()));
                }
                spans.push(Span::styled(rest[body_start..body_start + len].to_string(), style));
                rest = &rest[body_start + len + marker.len()..];
            }
            _ => {
                spans.push(Span::raw(rest[..body_start].to_string()));
                rest = &rest[body_start..];
            }
        }
    }

    if !rest.is_empty() {
        spans.push(Span::raw(rest.to_string()));
    }

    if spans.is_empty() {
        Line::default()
    } else {
        Line::from(spans)
    }
}

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

    app.diagram_area = None;
    match app.active_diagram() {
        Some(id) if app.viewers.get(id).is_some_and(|s| s.maximized) => {
            render_artifact(app, frame, body_area, id);
        }
        Some(id) => {
            let [chat_area, artifact_area] = Layout::horizontal([
                Constraint::Percentage(40),
                Constraint::Percentage(60),
            ])
            .areas(body_area);
            render_chat_panel(app, frame, chat_area);
            render_artifact(app, frame, artifact_area, id);
        }
        None => render_chat_panel(app, frame, body_area),
    }

    render_footer(app, frame, footer_area);

    if app.is_menu_open() {
        render_menu(app, frame, body_area);
    } else {
        app.menu_area = None;
    }
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let identity = app.session.identity();

    let title = Line::from(vec![
        Span::styled(" codetalk ", Style::default().fg(Color::Cyan).bold()),
        Span::styled(
            format!("{} | {} | {} ", app.app_name(), identity.user_id, identity.session_id),
            Style::default().fg(Color::Gray),
        ),
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
        InputMode::Normal => (" NORMAL ", Style::default().bg(Color::Blue).fg(Color::White)),
        InputMode::Editing => (" INSERT ", Style::default().bg(Color::Yellow).fg(Color::Black)),
    };

    // Key style: dark background with bright text for visibility on both light/dark terminals
    let key_style = Style::default().bg(Color::DarkGray).fg(Color::White);
    let label_style = Style::default().fg(Color::White);

    let diagram = app.selected_viewer().filter(|s| s.is_diagram());
    let hints: Vec<(&str, &str)> = if app.input_mode == InputMode::Editing {
        vec![("Enter", "send"), ("Esc", "normal")]
    } else if app.is_menu_open() {
        vec![("j/k", "move"), ("Enter", "choose"), ("Esc", "close")]
    } else if let Some(state) = diagram {
        let mut hints = vec![("b", "back"), ("m", "maximize"), ("p", "save svg")];
        if state.mode == ViewMode::DiagramSplit {
            hints.push(("Tab", "text/cli"));
        }
        hints.extend([("+/-", "zoom"), ("drag", "pan"), ("o", "options")]);
        hints
    } else if app.selected.is_some() {
        vec![
            ("o", "options"),
            ("d", "diagram"),
            ("v", "split"),
            ("t/s/c", "save"),
            ("Esc", "deselect"),
            ("i", "type"),
        ]
    } else {
        vec![("i", "type"), ("j/k", "select reply"), ("X", "clear"), ("q", "quit")]
    };

    let mut spans = vec![Span::styled(mode_text, mode_style), Span::raw(" ")];
    for (key, label) in hints {
        spans.push(Span::styled(format!(" {} ", key), key_style));
        spans.push(Span::styled(format!(" {} ", label), label_style));
    }
    if let Some(status) = &app.status {
        spans.push(Span::styled(format!("  {}", status), Style::default().fg(Color::Green)));
    }

    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn render_chat_panel(app: &mut App, frame: &mut Frame, area: Rect) {
    let [chat_area, input_area] = Layout::vertical([
        Constraint::Min(0),
        Constraint::Length(3),
    ])
    .areas(area);

    // Store chat area dimensions for scroll calculations (inner size minus borders)
    app.chat_height = chat_area.height.saturating_sub(2);
    app.chat_width = chat_area.width.saturating_sub(2);

    render_chat(app, frame, chat_area);
    render_input(app, frame, input_area);
}

fn render_chat(app: &App, frame: &mut Frame, area: Rect) {
    let border_color = if app.input_mode == InputMode::Normal { Color::Cyan } else { Color::DarkGray };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(" Chat ");

    if app.messages().is_empty() {
        let hint = Paragraph::new(Text::from(Span::styled(
            "Ask about the codebase, e.g. \"show the class diagram for the orders module\"",
            Style::default().fg(Color::DarkGray),
        )))
        .wrap(Wrap { trim: true })
        .block(block);
        frame.render_widget(hint, area);
        return;
    }

    let mut lines: Vec<Line> = Vec::new();
    for msg in app.messages() {
        let selected = app.selected == Some(msg.id);
        match msg.author {
            Author::User => {
                lines.push(Line::from(Span::styled(
                    "You:",
                    Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
                )));
                lines.push(Line::from(msg.text.clone()));
            }
            Author::Agent => {
                let mut header = vec![Span::styled(
                    "Agent:",
                    Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
                )];
                if selected {
                    header.push(Span::styled(
                        " [selected, o for options]",
                        Style::default().fg(Color::Black).bg(Color::Yellow),
                    ));
                }
                lines.push(Line::from(header));

                if msg.is_placeholder() {
                    // Animated ellipsis: cycles through ".", "..", "..."
                    let dots = ".".repeat((app.animation_frame as usize) + 1);
                    lines.push(Line::from(Span::styled(
                        dots,
                        Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
                    )));
                } else if is_diagram_message(&msg.text) {
                    lines.push(Line::from(Span::styled(
                        "[class diagram, select and press d to view]",
                        Style::default().fg(Color::Magenta),
                    )));
                } else {
                    lines.extend(msg.text.lines().map(parse_markdown_line));
                }
            }
        }
        lines.push(Line::default());
    }

    let chat = Paragraph::new(Text::from(lines))
        .block(block)
        .wrap(Wrap { trim: false })
        .scroll((app.chat_scroll, 0));
    frame.render_widget(chat, area);
}

fn render_input(app: &App, frame: &mut Frame, area: Rect) {
    let editing = app.input_mode == InputMode::Editing;
    let border_color = if editing { Color::Yellow } else { Color::DarkGray };

    let send_label = if app.is_connecting() {
        Span::styled(" Connecting... ", Style::default().fg(Color::DarkGray).italic())
    } else if app.session.is_loading() {
        Span::styled(" Generating... ", Style::default().fg(Color::DarkGray).italic())
    } else if app.can_send() {
        Span::styled(" Send [Enter] ", Style::default().fg(Color::Green).bold())
    } else {
        Span::styled(" Send ", Style::default().fg(Color::DarkGray))
    };

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(" Message ")
        .title_top(Line::from(send_label).right_aligned());

    // Horizontal scroll keeps the cursor inside the box
    let inner_width = area.width.saturating_sub(2) as usize;
    let cursor_pos = app.input_cursor;
    let scroll_offset = if inner_width == 0 {
        0
    } else if cursor_pos >= inner_width {
        cursor_pos - inner_width + 1
    } else {
        0
    };

    let visible_text: String = app.input
        .chars()
        .skip(scroll_offset)
        .take(inner_width)
        .collect();

    let input = Paragraph::new(visible_text)
        .style(Style::default().fg(Color::Cyan))
        .block(block);
    frame.render_widget(input, area);

    if editing {
        let cursor_x = (cursor_pos - scroll_offset) as u16;
        frame.set_cursor_position((area.x + cursor_x + 1, area.y + 1));
    }
}

fn render_artifact(app: &mut App, frame: &mut Frame, area: Rect, id: MessageId) {
    let Some(state) = app.viewers.get(id).cloned() else {
        return;
    };
    let source = app.diagram_source(id).unwrap_or_default();

    let [toolbar_area, content_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(0),
    ])
    .areas(area);

    render_toolbar(&state, frame, toolbar_area);

    let diagram_area = if state.mode == ViewMode::DiagramSplit {
        let [text_area, diagram_area] = Layout::horizontal([
            Constraint::Percentage(50),
            Constraint::Percentage(50),
        ])
        .areas(content_area);

        let (title, body) = match state.split_page {
            SplitPage::CliInstructions => (" CLI Instructions ", cli_instructions(&source)),
            SplitPage::OriginalText => (
                " Original Text ",
                app.session
                    .conversation()
                    .get(id)
                    .map(|m| m.text.clone())
                    .unwrap_or_default(),
            ),
        };
        let text = Paragraph::new(body)
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .border_style(Style::default().fg(Color::DarkGray))
                    .title(title),
            )
            .wrap(Wrap { trim: false });
        frame.render_widget(text, text_area);
        diagram_area
    } else {
        content_area
    };

    app.diagram_area = Some(diagram_area);
    render_diagram(&state, &source, frame, diagram_area);
}

fn render_toolbar(state: &ViewerState, frame: &mut Frame, area: Rect) {
    let key_style = Style::default().bg(Color::DarkGray).fg(Color::White);
    let off_style = Style::default().fg(Color::DarkGray);

    let mut spans = vec![
        Span::styled(" b ", key_style),
        Span::raw(" Back "),
    ];

    if state.mode == ViewMode::DiagramSplit {
        let other = match state.split_page {
            SplitPage::CliInstructions => "Original Text",
            SplitPage::OriginalText => "CLI Instructions",
        };
        spans.push(Span::styled(" Tab ", key_style));
        spans.push(Span::raw(format!(" {} ", other)));
    }

    // Split view only offers zoom once maximized
    if state.mode == ViewMode::DiagramSingle || state.maximized {
        spans.push(Span::styled(" - ", if state.can_zoom_out() { key_style } else { off_style }));
        spans.push(Span::styled(
            format!(" {}% ", state.zoom_percent()),
            Style::default().fg(Color::Cyan).bold(),
        ));
        spans.push(Span::styled(" + ", if state.can_zoom_in() { key_style } else { off_style }));
        spans.push(Span::raw(" "));
    }

    spans.push(Span::styled(" m ", key_style));
    spans.push(Span::raw(if state.maximized { " Restore " } else { " Maximize " }));
    spans.push(Span::styled(" p ", if state.rendered_image.is_some() { key_style } else { off_style }));
    spans.push(Span::raw(" Save SVG "));

    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn render_diagram(state: &ViewerState, source: &str, frame: &mut Frame, area: Rect) {
    let border_color = if state.is_dragging() { Color::Yellow } else { Color::Cyan };
    let mut block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(" Class Diagram ");

    let body = match state.rendered_image.as_deref() {
        None if state.is_rendering() => Text::from(Span::styled(
            "Rendering diagram...",
            Style::default().fg(Color::DarkGray).italic(),
        )),
        None => Text::from(Span::styled(
            "No diagram rendered",
            Style::default().fg(Color::DarkGray),
        )),
        Some(RENDER_FALLBACK_SVG) => Text::from(Span::styled(
            "Error rendering diagram",
            Style::default().fg(Color::Red),
        )),
        Some(svg) => {
            block = block.title_top(
                Line::from(Span::styled(
                    format!(" svg {} bytes ", svg.len()),
                    Style::default().fg(Color::DarkGray),
                ))
                .right_aligned(),
            );
            diagram_preview(source, state.zoom)
        }
    };

    let diagram = Paragraph::new(body)
        .block(block)
        .scroll((state.pan.y, state.pan.x));
    frame.render_widget(diagram, area);
}

/// Terminal preview of a class diagram: one box per class, one arrow per
/// relationship. Zoom widens the boxes and the gaps between them.
fn diagram_preview(source: &str, zoom: f32) -> Text<'static> {
    let padding = ((zoom * 4.0).round() as usize).saturating_sub(2);
    let gap = zoom.floor() as usize;
    let class_style = Style::default().fg(Color::Yellow).bold();
    let edge_style = Style::default().fg(Color::Cyan);

    let mut lines: Vec<Line> = Vec::new();
    for raw in source.lines() {
        let line = raw.trim();
        if line.is_empty() || line == DIAGRAM_HEADER {
            continue;
        }

        if let Some(name) = line.strip_prefix("class ") {
            let name = name.trim_end_matches('{').trim();
            let width = name.chars().count() + padding * 2;
            let pad = " ".repeat(padding);
            lines.push(Line::styled(format!("┌{}┐", "─".repeat(width)), class_style));
            lines.push(Line::styled(format!("│{}{}{}│", pad, name, pad), class_style));
            lines.push(Line::styled(format!("└{}┘", "─".repeat(width)), class_style));
        } else if let Some((edge, label)) = relationship_parts(line) {
            let shaft = "─".repeat(2 + padding);
            let mut spans = vec![Span::styled(format!("{} {}▶ {}", edge.0, shaft, edge.1), edge_style)];
            if let Some(label) = label {
                spans.push(Span::styled(format!("  {}", label), Style::default().fg(Color::DarkGray)));
            }
            lines.push(Line::from(spans));
        } else if line.starts_with("%%") {
            lines.push(Line::styled(line.to_string(), Style::default().fg(Color::DarkGray).italic()));
        } else {
            lines.push(Line::raw(line.to_string()));
        }

        lines.extend(std::iter::repeat(Line::default()).take(gap));
    }

    Text::from(lines)
}

/// Split `A --> B : label` into its endpoints and optional label
fn relationship_parts(line: &str) -> Option<((String, String), Option<String>)> {
    const ARROWS: [&str; 6] = ["-->", "..>", "--|>", "..|>", "--*", "--o"];
    let (arrow, index) = ARROWS
        .iter()
        .filter_map(|a| line.find(a).map(|i| (*a, i)))
        .min_by_key(|(_, i)| *i)?;

    let from = line[..index].trim().to_string();
    let rest = &line[index + arrow.len()..];
    let (to, label) = match rest.split_once(':') {
        Some((to, label)) => (to.trim().to_string(), Some(label.trim().to_string())),
        None => (rest.trim().to_string(), None),
    };
    if from.is_empty() || to.is_empty() {
        return None;
    }
    Some(((from, to), label))
}

fn render_menu(app: &mut App, frame: &mut Frame, area: Rect) {
    // Popup anchored to the right of the chat pane
    let popup_width = 32.min(area.width.saturating_sub(2));
    let popup_height = (MenuAction::ALL.len() as u16 + 2).min(area.height);
    let popup_x = area.x + (area.width.saturating_sub(popup_width)) / 2;
    let popup_y = area.y + (area.height.saturating_sub(popup_height)) / 2;
    let popup_area = Rect::new(popup_x, popup_y, popup_width, popup_height);
    app.menu_area = Some(popup_area);

    // Clear the area behind the popup
    frame.render_widget(Clear, popup_area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .title(" Options ");

    let items: Vec<ListItem> = MenuAction::ALL
        .iter()
        .map(|action| ListItem::new(format!(" {} ", action.label())))
        .collect();

    let list = List::new(items)
        .block(block)
        .highlight_style(
            Style::default()
                .bg(Color::Blue)
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("> ");

    frame.render_stateful_widget(list, popup_area, &mut app.menu_state);
}
