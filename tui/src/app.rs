//! Main Application
//!
//! The App struct manages the TUI lifecycle as a thin display client:
//! - Event loop (keyboard, mouse, resize)
//! - TurnController for sends and stream consumption
//! - Pure transcript formatting for rendering
//!
//! Every frame the app drains pending stream events through the
//! controller, reacts to the signals that come back, and re-renders
//! from the controller's current transcript value.

use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossterm::event::{
    self, Event, EventStream, KeyCode, KeyEventKind, KeyModifiers, MouseEventKind,
};
use futures::StreamExt;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::Rect;
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Paragraph, Wrap};
use ratatui::Terminal;

use council_core::{CouncilConfig, HttpCouncilApi, SendError, TurnController};

use crate::display;

/// Input box height (lines) for text wrapping
const INPUT_HEIGHT: u16 = 3;

/// Main application state
pub struct App {
    /// Is the app still running?
    running: bool,
    /// Orchestrates sends and stream consumption
    controller: TurnController,
    /// User input buffer
    input_buffer: String,
    /// Scroll offset (lines from bottom, 0 = latest)
    scroll_offset: usize,
    /// Total rendered lines (for scroll bounds)
    total_lines: usize,
    /// Transient status message (errors, rejections)
    status: Option<String>,
    /// Terminal size
    size: (u16, u16),
}

impl App {
    /// Create a new App instance over the environment-configured backend.
    pub fn new() -> anyhow::Result<Self> {
        let size = crossterm::terminal::size()?;
        let config = CouncilConfig::from_env();
        tracing::info!(backend = %config.base_url(), "starting council tui");
        let api = HttpCouncilApi::new(config);

        Ok(Self {
            running: true,
            controller: TurnController::new(Arc::new(api)),
            input_buffer: String::new(),
            scroll_offset: 0,
            total_lines: 0,
            status: None,
            size,
        })
    }

    /// Main event loop
    pub async fn run(
        &mut self,
        terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    ) -> anyhow::Result<()> {
        // ~10 FPS is plenty for text streaming
        let frame_duration = Duration::from_millis(100);

        // Create async event stream for non-blocking terminal events
        let mut event_stream = EventStream::new();

        // Track startup phases so a slow backend never blocks input
        enum StartupPhase {
            NeedList,
            NeedSelect,
            Done,
        }
        let mut startup_phase = StartupPhase::NeedList;

        // Render initial frame immediately so user sees UI
        self.render(terminal)?;

        while self.running {
            let frame_start = Instant::now();

            tokio::select! {
                biased;

                // Terminal events first
                maybe_event = event_stream.next() => {
                    if let Some(Ok(event)) = maybe_event {
                        match event {
                            // Only handle Press events (not Release or Repeat)
                            Event::Key(key) if key.kind == KeyEventKind::Press => {
                                self.handle_key(key).await;
                            }
                            Event::Mouse(mouse) => self.handle_mouse(mouse),
                            Event::Resize(w, h) => self.size = (w, h),
                            _ => {}
                        }
                    }
                }

                // Frame tick - advance startup, then fall through to render
                _ = tokio::time::sleep(Duration::from_millis(16)) => {
                    match startup_phase {
                        StartupPhase::NeedList => {
                            // Short timeout so a dead backend only costs a frame
                            if tokio::time::timeout(
                                Duration::from_millis(50),
                                self.controller.refresh_conversations(),
                            )
                            .await
                            .is_ok()
                            {
                                startup_phase = StartupPhase::NeedSelect;
                            }
                        }
                        StartupPhase::NeedSelect => {
                            let newest = self.controller.conversations().last().map(|s| s.id.clone());
                            match newest {
                                Some(id) => self.controller.select_conversation(id).await,
                                None => self.controller.new_conversation().await,
                            }
                            startup_phase = StartupPhase::Done;
                        }
                        StartupPhase::Done => {}
                    }
                }
            }

            // Drain pending stream events and react to the signals
            let signals = self.controller.poll_events();
            if signals.refresh_conversations {
                self.controller.refresh_conversations().await;
            }
            if let Some(message) = signals.stream_error {
                self.status = Some(format!("Stream error: {message}"));
            }
            if signals.rolled_back {
                self.status = Some("Connection lost; message not sent".to_string());
            }

            self.render(terminal)?;

            // Frame rate limiting
            let elapsed = frame_start.elapsed();
            if elapsed < frame_duration {
                tokio::time::sleep(frame_duration - elapsed).await;
            }
        }

        Ok(())
    }

    /// Handle keyboard input
    async fn handle_key(&mut self, key: event::KeyEvent) {
        match key.code {
            // Quit
            KeyCode::Esc => {
                self.running = false;
            }
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.running = false;
            }

            // New conversation
            KeyCode::Char('n') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.controller.new_conversation().await;
                self.status = None;
                self.scroll_offset = 0;
            }

            // Cycle through conversations
            KeyCode::Tab => {
                if let Some(id) = self.next_conversation() {
                    self.controller.select_conversation(id).await;
                    self.scroll_offset = 0;
                }
            }

            // Submit message
            KeyCode::Enter => {
                if !self.input_buffer.is_empty() {
                    let message = std::mem::take(&mut self.input_buffer);
                    match self.controller.send(&message).await {
                        Ok(()) => {
                            self.status = None;
                            self.scroll_offset = 0;
                        }
                        Err(SendError::Busy) => {
                            // Rejected, not queued; give the input back
                            self.input_buffer = message;
                            self.status = Some("Still answering; wait for this turn".to_string());
                        }
                        Err(error) => {
                            self.input_buffer = message;
                            self.status = Some(error.to_string());
                        }
                    }
                }
            }

            // Typing
            KeyCode::Char(c) => {
                self.input_buffer.push(c);
            }
            KeyCode::Backspace => {
                self.input_buffer.pop();
            }

            // Conversation scrolling
            KeyCode::PageUp => {
                let page_size = usize::from(self.size.1.saturating_sub(INPUT_HEIGHT + 1) / 2);
                let max_scroll = self.total_lines.saturating_sub(1);
                self.scroll_offset = (self.scroll_offset + page_size).min(max_scroll);
            }
            KeyCode::PageDown => {
                let page_size = usize::from(self.size.1.saturating_sub(INPUT_HEIGHT + 1) / 2);
                self.scroll_offset = self.scroll_offset.saturating_sub(page_size);
            }
            KeyCode::Home if key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.scroll_offset = self.total_lines.saturating_sub(1);
            }
            KeyCode::End if key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.scroll_offset = 0;
            }

            _ => {}
        }
    }

    /// Handle mouse input
    fn handle_mouse(&mut self, mouse: event::MouseEvent) {
        match mouse.kind {
            MouseEventKind::ScrollUp => {
                if self.scroll_offset < self.total_lines.saturating_sub(1) {
                    self.scroll_offset += 3;
                }
            }
            MouseEventKind::ScrollDown => {
                self.scroll_offset = self.scroll_offset.saturating_sub(3);
            }
            _ => {}
        }
    }

    /// The conversation after the selected one, wrapping around.
    fn next_conversation(&self) -> Option<council_core::ConversationId> {
        let summaries = self.controller.conversations();
        if summaries.is_empty() {
            return None;
        }
        let current = self
            .controller
            .selected()
            .and_then(|id| summaries.iter().position(|s| s.id == *id));
        let next = match current {
            Some(index) => (index + 1) % summaries.len(),
            None => 0,
        };
        Some(summaries[next].id.clone())
    }

    /// Render one frame
    fn render(
        &mut self,
        terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    ) -> anyhow::Result<()> {
        terminal.draw(|frame| {
            let area = frame.area();
            let conversation_area = Rect::new(
                0,
                0,
                area.width,
                area.height.saturating_sub(INPUT_HEIGHT + 1),
            );
            let input_area = Rect::new(
                0,
                area.height.saturating_sub(INPUT_HEIGHT + 1),
                area.width,
                INPUT_HEIGHT,
            );
            let status_area = Rect::new(0, area.height.saturating_sub(1), area.width, 1);

            let lines = display::transcript_lines(self.controller.transcript());
            self.total_lines = wrapped_line_count(&lines, conversation_area.width);

            // Anchor to the bottom, then back off by the scroll offset
            let visible = usize::from(conversation_area.height);
            let scroll = self
                .total_lines
                .saturating_sub(visible)
                .saturating_sub(self.scroll_offset);
            let conversation = Paragraph::new(lines)
                .wrap(Wrap { trim: false })
                .scroll((u16::try_from(scroll).unwrap_or(u16::MAX), 0));
            frame.render_widget(conversation, conversation_area);

            let input = Paragraph::new(format!("> {}", self.input_buffer))
                .wrap(Wrap { trim: false })
                .style(Style::default().fg(Color::Cyan));
            frame.render_widget(input, input_area);

            frame.render_widget(self.status_line(), status_area);
        })?;
        Ok(())
    }

    /// The one-line status bar: transient errors win, then streaming
    /// progress, then the key hints.
    fn status_line(&self) -> Paragraph<'_> {
        let (text, style) = if let Some(status) = &self.status {
            (
                status.as_str(),
                Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
            )
        } else if let Some(progress) = display::streaming_status(self.controller.transcript()) {
            (progress, Style::default().fg(Color::Magenta))
        } else {
            (
                "Enter: send | Tab: switch | Ctrl-N: new | Esc: quit",
                Style::default().fg(Color::DarkGray),
            )
        };
        Paragraph::new(Line::from(Span::styled(text.to_string(), style)))
    }
}

/// Count the lines `text` occupies once wrapped to `width` columns.
fn wrapped_line_count(lines: &[Line], width: u16) -> usize {
    if width == 0 {
        return 0;
    }
    lines
        .iter()
        .map(|line| {
            let text: String = line.spans.iter().map(|s| s.content.as_ref()).collect();
            if text.is_empty() {
                1
            } else {
                textwrap::wrap(&text, usize::from(width)).len()
            }
        })
        .sum()
}
