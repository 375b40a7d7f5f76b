//! Conversation Rendering
//!
//! Turns a [`Snapshot`] into wrapped, styled terminal lines and draws them
//! together with a one-line status bar. Nothing here holds a reference into
//! the store: every frame renders from the snapshot it was handed.

use std::ops::Range;

use ratatui::layout::{Constraint, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::Paragraph;
use ratatui::Frame;
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use streambuf_core::{Message, MessageKind, NotifierStats, Snapshot};

/// Accent used for assistant messages
pub const ASSISTANT_COLOR: Color = Color::Rgb(255, 0, 255);

/// Cursor drawn after a message that is still streaming
pub const STREAMING_CURSOR: char = '_';

/// What the status bar reports
#[derive(Clone, Copy, Debug, Default)]
pub struct StatusInfo {
    /// Current notifier version
    pub version: u64,
    /// Notifier counters
    pub stats: NotifierStats,
    /// Frames drawn so far
    pub frames: u64,
    /// Whether a reply is currently streaming
    pub streaming: bool,
}

/// Scroll position of the conversation pane
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Viewport {
    /// Lines scrolled up from the bottom (0 = follow the latest output)
    pub scroll_offset: usize,
    /// Lines the last frame produced
    pub total_lines: usize,
}

impl Viewport {
    /// Scroll towards older output
    pub fn scroll_up(&mut self, lines: usize) {
        let max_scroll = self.total_lines.saturating_sub(1);
        self.scroll_offset = (self.scroll_offset + lines).min(max_scroll);
    }

    /// Scroll towards newer output
    pub fn scroll_down(&mut self, lines: usize) {
        self.scroll_offset = self.scroll_offset.saturating_sub(lines);
    }

    /// Jump back to the latest output
    pub fn follow(&mut self) {
        self.scroll_offset = 0;
    }

    /// Which of `total` lines fit in `height` rows, clamping the offset
    pub fn visible_range(&mut self, total: usize, height: usize) -> Range<usize> {
        self.total_lines = total;
        let max_scroll = total.saturating_sub(height);
        self.scroll_offset = self.scroll_offset.min(max_scroll);

        let end = total - self.scroll_offset;
        end.saturating_sub(height)..end
    }
}

/// Speaker prefix and base style for a message kind
fn prefix_and_style(kind: &MessageKind) -> (String, Style) {
    match kind {
        MessageKind::User => ("You: ".to_string(), Style::default().fg(Color::Green)),
        MessageKind::Assistant => (
            "Assistant: ".to_string(),
            Style::default().fg(ASSISTANT_COLOR),
        ),
        MessageKind::System => (String::new(), Style::default().fg(Color::DarkGray)),
        MessageKind::Tool { name } => (
            format!("[{name}] "),
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::ITALIC),
        ),
    }
}

/// Wrap one message to `width` columns
pub fn message_lines(message: &Message, width: usize) -> Vec<Line<'static>> {
    let (prefix, style) = prefix_and_style(&message.kind);
    let mut text = format!("{prefix}{}", message.content);
    if message.streaming {
        text.push(STREAMING_CURSOR);
    }

    let options = textwrap::Options::new(width.max(1))
        .wrap_algorithm(textwrap::WrapAlgorithm::FirstFit);
    textwrap::wrap(&text, options)
        .into_iter()
        .map(|line| Line::from(Span::styled(line.into_owned(), style)))
        .collect()
}

/// Wrap a whole snapshot, with a blank line after each message
pub fn conversation_lines(snapshot: &Snapshot, width: usize) -> Vec<Line<'static>> {
    let mut lines = Vec::new();
    for message in snapshot.iter() {
        lines.extend(message_lines(message, width));
        lines.push(Line::default());
    }
    lines
}

/// Status bar text, cut to `width` columns
pub fn status_text(status: &StatusInfo, viewport: &Viewport, width: usize) -> String {
    let state = if status.streaming { "streaming" } else { "idle" };
    let scroll = if viewport.scroll_offset > 0 {
        format!(" [^{} lines]", viewport.scroll_offset)
    } else {
        String::new()
    };

    let text = format!(
        " {state} | v{} | raw {} | frames {} | n next, c clear, Esc quit{scroll}",
        status.version, status.stats.raw_notifications, status.frames
    );

    if text.width() <= width {
        return text;
    }
    let mut cut = String::new();
    let mut used = 0;
    for ch in text.chars() {
        let ch_width = UnicodeWidthChar::width(ch).unwrap_or(0);
        if used + ch_width > width {
            break;
        }
        used += ch_width;
        cut.push(ch);
    }
    cut
}

/// Draw the conversation pane and status bar
pub fn render(frame: &mut Frame, snapshot: &Snapshot, viewport: &mut Viewport, status: &StatusInfo) {
    let [conversation, status_bar] =
        Layout::vertical([Constraint::Min(1), Constraint::Length(1)]).areas(frame.area());

    render_conversation(frame, conversation, snapshot, viewport);

    let text = status_text(status, viewport, status_bar.width as usize);
    frame.render_widget(
        Paragraph::new(text).style(Style::default().fg(Color::DarkGray)),
        status_bar,
    );
}

fn render_conversation(frame: &mut Frame, area: Rect, snapshot: &Snapshot, viewport: &mut Viewport) {
    let width = area.width.saturating_sub(1) as usize;
    let lines = conversation_lines(snapshot, width);
    let range = viewport.visible_range(lines.len(), area.height as usize);

    let visible: Vec<Line<'static>> = lines.into_iter().skip(range.start).take(range.len()).collect();
    frame.render_widget(Paragraph::new(visible), area);
}
