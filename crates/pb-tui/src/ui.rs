use chrono::Local;
use pb_engine::{BoardPhase, DropZone};
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Clear, Paragraph};
use ratatui::Frame;

use crate::app::{App, BoardLayout};

/// Master render function: pipeline bar, board columns, status bar, toasts.
pub fn render(frame: &mut Frame, app: &mut App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // pipeline bar
            Constraint::Min(0),    // board
            Constraint::Length(1), // status bar
        ])
        .split(frame.area());

    render_header(frame, app, chunks[0]);
    render_board(frame, app, chunks[1]);
    render_status(frame, app, chunks[2]);
    render_ghost(frame, app);
    app.toasts.render(frame, frame.area());
}

fn render_header(frame: &mut Frame, app: &App, area: Rect) {
    let mut spans = Vec::new();
    let current = app.engine.pipeline().map(|p| p.id);
    for (i, pipeline) in app.pipelines.iter().enumerate() {
        let style = if Some(pipeline.id) == current {
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(Color::DarkGray)
        };
        spans.push(Span::styled(format!(" {}:{} ", i + 1, pipeline.name), style));
    }

    let filter = &app.engine.filter;
    let mut flags = Vec::new();
    if app.input_mode || !filter.query.trim().is_empty() {
        flags.push(format!("search:\"{}\"", filter.query));
    }
    if filter.only_unassigned {
        flags.push("unassigned".to_string());
    }
    if filter.created_today {
        flags.push("today".to_string());
    }
    if filter.recently_updated {
        flags.push("recent".to_string());
    }
    if !flags.is_empty() {
        spans.push(Span::styled(
            format!("  [{}]", flags.join(" ")),
            Style::default().fg(Color::Yellow),
        ));
    }

    let block = Block::default()
        .borders(Borders::BOTTOM)
        .title(" pipeboard ")
        .title_style(Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD));
    frame.render_widget(Paragraph::new(Line::from(spans)).block(block), area);
}

fn render_board(frame: &mut Frame, app: &mut App, area: Rect) {
    // Resolve the current drop target against the previous frame's zones
    // before they are rebuilt.
    let target = app.engine.drop_target(&app.board_view());

    app.engine.set_viewport_width(area.width as f32);
    let visible = app.engine.visible_stages().to_vec();

    let mut layout = BoardLayout {
        board_area: frect(area),
        ..Default::default()
    };

    if visible.is_empty() {
        let message = match app.engine.phase() {
            BoardPhase::Idle => "No pipeline selected".to_string(),
            BoardPhase::Loading => "Loading pipeline…".to_string(),
            BoardPhase::LoadFailed(err) => format!("Could not load pipeline: {err}"),
            BoardPhase::Ready => "This pipeline has no stages".to_string(),
        };
        frame.render_widget(
            Paragraph::new(message).style(Style::default().fg(Color::DarkGray)),
            area,
        );
        app.layout = layout;
        return;
    }

    let now = Local::now();
    let filtered = app.engine.filtered_view(&now);
    let dragged = app.engine.drag_session().map(|s| s.dragged_lead_id);

    let constraints: Vec<Constraint> =
        (0..visible.len()).map(|_| Constraint::Ratio(1, visible.len() as u32)).collect();
    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints(constraints)
        .split(area);

    for (i, stage) in visible.iter().enumerate() {
        let column = columns[i];
        layout.zones.push(DropZone {
            stage_id: stage.id,
            rect: frect(column),
        });

        let color = stage_color(&stage.color);
        let leads = filtered.stage(stage.id);
        let is_target = target == Some(stage.id);
        let border_style = if is_target {
            Style::default().fg(color).add_modifier(Modifier::BOLD | Modifier::REVERSED)
        } else {
            Style::default().fg(color)
        };
        let block = Block::default()
            .borders(Borders::ALL)
            .title(format!(" {} ({}) ", stage.name, leads.len()))
            .border_style(border_style);
        let inner = block.inner(column);
        frame.render_widget(block, column);

        // Cards: three rows each, clipped to the column.
        for (slot, lead) in leads.iter().enumerate() {
            let y = inner.y + (slot as u16) * 3;
            if y + 3 > inner.bottom() {
                break;
            }
            let card_rect = Rect::new(inner.x, y, inner.width, 3);
            layout.cards.push((lead.id, frect(card_rect)));

            let style = if dragged == Some(lead.id) {
                Style::default().fg(Color::DarkGray).add_modifier(Modifier::DIM)
            } else {
                Style::default()
            };
            let assignee = lead
                .assigned_user
                .as_ref()
                .map(|u| u.display_name.as_str())
                .unwrap_or("unassigned");
            let meta = format!("{} · {}", lead.score, assignee);
            let card = Paragraph::new(vec![
                Line::from(Span::styled(lead.full_name.clone(), style.add_modifier(Modifier::BOLD))),
                Line::from(Span::styled(meta, style.fg(Color::DarkGray))),
            ])
            .block(Block::default().borders(Borders::TOP).border_style(style));
            frame.render_widget(card, card_rect);
        }
    }

    app.layout = layout;
    // Visible columns always fit the board; traversal happens by paging.
    app.scroll_x = 0.0;
    app.scroll_max = 0.0;
}

/// A one-line card ghost that follows the pointer during a drag.
fn render_ghost(frame: &mut Frame, app: &App) {
    let Some(session) = app.engine.drag_session() else {
        return;
    };
    let Some(lead) = app.engine.store().lead(session.dragged_lead_id) else {
        return;
    };
    let area = frame.area();
    let text = format!("≡ {}", lead.full_name);
    let width = (text.chars().count() as u16 + 2).min(area.width);
    let x = (session.pointer.x as u16).min(area.width.saturating_sub(width));
    let y = (session.pointer.y as u16).min(area.height.saturating_sub(1));
    let ghost_rect = Rect::new(x, y, width, 1);

    frame.render_widget(Clear, ghost_rect);
    frame.render_widget(
        Paragraph::new(text).style(
            Style::default()
                .fg(Color::Black)
                .bg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        ),
        ghost_rect,
    );
}

fn render_status(frame: &mut Frame, app: &App, area: Rect) {
    let mut right = Vec::new();
    if app.engine.has_in_flight() {
        right.push(Span::styled("saving… ", Style::default().fg(Color::Yellow)));
    }
    if app.page_scroll_frozen {
        right.push(Span::styled("scroll frozen ", Style::default().fg(Color::DarkGray)));
    }

    let help = if app.input_mode {
        " type to search · Enter/Esc done".to_string()
    } else {
        " q quit · / search · u/t/r filters · c clear · ←/→ page · x external edit · drag cards · right-click assigns"
            .to_string()
    };

    let mut spans = vec![Span::styled(help, Style::default().fg(Color::DarkGray))];
    if !right.is_empty() {
        spans.push(Span::raw("  "));
        spans.extend(right);
    }
    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn frect(r: Rect) -> pb_engine::Rect {
    pb_engine::Rect::new(r.x as f32, r.y as f32, r.width as f32, r.height as f32)
}

fn stage_color(hex: &str) -> Color {
    let h = hex.trim_start_matches('#');
    if h.len() == 6 {
        if let (Ok(r), Ok(g), Ok(b)) = (
            u8::from_str_radix(&h[0..2], 16),
            u8::from_str_radix(&h[2..4], 16),
            u8::from_str_radix(&h[4..6], 16),
        ) {
            return Color::Rgb(r, g, b);
        }
    }
    Color::Gray
}
