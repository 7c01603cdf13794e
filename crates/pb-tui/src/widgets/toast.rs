use std::collections::VecDeque;
use std::time::{Duration, Instant};

use pb_engine::{Notice, NoticeLevel};
use ratatui::layout::Rect;
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Clear, Paragraph, Wrap};
use ratatui::Frame;

fn level_color(level: NoticeLevel) -> Color {
    match level {
        NoticeLevel::Info => Color::Cyan,
        NoticeLevel::Success => Color::Green,
        NoticeLevel::Warning => Color::Yellow,
        NoticeLevel::Error => Color::Red,
    }
}

fn level_icon(level: NoticeLevel) -> &'static str {
    match level {
        NoticeLevel::Info => "i",
        NoticeLevel::Success => "*",
        NoticeLevel::Warning => "!",
        NoticeLevel::Error => "x",
    }
}

#[derive(Debug, Clone)]
pub struct Toast {
    pub notice: Notice,
    pub created: Instant,
    pub duration: Duration,
}

impl Toast {
    pub fn new(notice: Notice, duration: Duration) -> Self {
        Self {
            notice,
            created: Instant::now(),
            duration,
        }
    }

    pub fn expired(&self) -> bool {
        self.created.elapsed() >= self.duration
    }

    /// Fraction of display time remaining, from 1.0 down to 0.0.
    fn remaining_fraction(&self) -> f64 {
        let elapsed = self.created.elapsed().as_secs_f64();
        let total = self.duration.as_secs_f64();
        if total <= 0.0 {
            return 0.0;
        }
        (1.0 - (elapsed / total)).max(0.0)
    }
}

const MAX_TOASTS: usize = 4;
const TOAST_WIDTH: u16 = 42;
const TOAST_HEIGHT: u16 = 3;

/// Stack of engine notices rendered in the bottom-right corner.
pub struct ToastManager {
    toasts: VecDeque<Toast>,
    duration: Duration,
}

impl ToastManager {
    pub fn new(duration: Duration) -> Self {
        Self {
            toasts: VecDeque::new(),
            duration,
        }
    }

    /// Queue a notice; the oldest toast drops off past the cap.
    pub fn push(&mut self, notice: Notice) {
        self.toasts.push_back(Toast::new(notice, self.duration));
        if self.toasts.len() > MAX_TOASTS {
            self.toasts.pop_front();
        }
    }

    /// Drop expired toasts.
    pub fn tick(&mut self) {
        self.toasts.retain(|t| !t.expired());
    }

    #[allow(dead_code)]
    pub fn len(&self) -> usize {
        self.toasts.len()
    }

    #[allow(dead_code)]
    pub fn is_empty(&self) -> bool {
        self.toasts.is_empty()
    }

    pub fn render(&self, frame: &mut Frame, area: Rect) {
        if self.toasts.is_empty() {
            return;
        }

        let width = TOAST_WIDTH.min(area.width);

        for (i, toast) in self.toasts.iter().rev().enumerate() {
            let y_offset = (i as u16 + 1) * TOAST_HEIGHT;
            if y_offset > area.height {
                break;
            }

            let x = area.x + area.width.saturating_sub(width);
            let y = area.y + area.height.saturating_sub(y_offset);
            let toast_rect = Rect::new(x, y, width, TOAST_HEIGHT);

            frame.render_widget(Clear, toast_rect);

            let color = level_color(toast.notice.level);
            let icon = level_icon(toast.notice.level);

            let bar_width = (width as usize).saturating_sub(4);
            let filled = ((bar_width as f64) * toast.remaining_fraction()).round() as usize;
            let progress = format!(
                "{}{}",
                "━".repeat(filled),
                " ".repeat(bar_width.saturating_sub(filled))
            );

            let lines = vec![
                Line::from(vec![
                    Span::styled(
                        format!(" [{}] ", icon),
                        Style::default().fg(color).add_modifier(Modifier::BOLD),
                    ),
                    Span::raw(toast.notice.message.as_str()),
                ]),
                Line::from(Span::styled(format!("  {}", progress), Style::default().fg(color))),
            ];

            let block = Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(color));

            frame.render_widget(
                Paragraph::new(lines).block(block).wrap(Wrap { trim: true }),
                toast_rect,
            );
        }
    }
}
