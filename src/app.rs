use std::sync::Arc;

use ratatui::layout::Rect;
use tokio::sync::mpsc;
use url::Url;

use crate::client::ChatTransport;
use crate::config::{Config, Settings};
use crate::reasoning::strip_reasoning;
use crate::session::{ChatSession, StreamEvent};
use crate::tui::AppEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Editing,
}

/// Result of the last `/api/chat/health` probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendStatus {
    Unknown,
    Checking,
    Online,
    Offline,
}

pub struct App {
    // Core state
    pub should_quit: bool,
    pub input_mode: InputMode,

    // Query input and controller
    pub session: ChatSession,
    pub query_cursor: usize, // cursor position (chars) in session.query

    // Response pane
    pub response_scroll: u16,
    pub follow_output: bool,
    pub response_height: u16,      // Inner height of the response pane
    pub total_response_lines: u16, // Wrapped line count from the last render
    pub response_area: Option<Rect>,

    // Display options
    pub hide_reasoning: bool,
    pub persist_settings: bool,

    // Animation state
    pub animation_frame: u8, // 0-2 for ellipsis animation

    // Backend
    pub base_url: Url,
    pub backend_status: BackendStatus,
    transport: Arc<dyn ChatTransport>,
    events: mpsc::UnboundedSender<AppEvent>,
}

impl App {
    pub fn new(
        settings: &Settings,
        transport: Arc<dyn ChatTransport>,
        stream_events: mpsc::UnboundedSender<StreamEvent>,
        events: mpsc::UnboundedSender<AppEvent>,
    ) -> Self {
        Self {
            should_quit: false,
            input_mode: InputMode::Editing,

            session: ChatSession::new(Arc::clone(&transport), stream_events),
            query_cursor: 0,

            response_scroll: 0,
            follow_output: true,
            response_height: 0,
            total_response_lines: 0,
            response_area: None,

            hide_reasoning: settings.hide_reasoning,
            persist_settings: false,

            animation_frame: 0,

            base_url: settings.base_url.clone(),
            backend_status: BackendStatus::Unknown,
            transport,
            events,
        }
    }

    pub fn submit_query(&mut self) {
        self.session.submit();
        self.response_scroll = 0;
        self.follow_output = true;
        self.animation_frame = 0;
    }

    pub fn cancel_query(&mut self) {
        self.session.cancel();
    }

    pub fn apply_stream_event(&mut self, event: StreamEvent) {
        self.session.apply(event);
    }

    /// Probe the backend in the background; the result arrives as
    /// `AppEvent::Backend`.
    pub fn check_backend(&mut self) {
        self.backend_status = BackendStatus::Checking;
        let probe = self.transport.health();
        let events = self.events.clone();
        tokio::spawn(async move {
            let status = match probe.await {
                Ok(reply) => {
                    tracing::info!(reply = reply.trim(), "backend health check passed");
                    BackendStatus::Online
                }
                Err(err) => {
                    tracing::warn!(error = %format!("{err:#}"), "backend health check failed");
                    BackendStatus::Offline
                }
            };
            let _ = events.send(AppEvent::Backend(status));
        });
    }

    /// Response text as it should be displayed.
    pub fn display_text(&self) -> String {
        if self.hide_reasoning {
            strip_reasoning(self.session.response(), self.session.in_progress())
        } else {
            self.session.response().to_string()
        }
    }

    pub fn toggle_reasoning(&mut self) {
        self.hide_reasoning = !self.hide_reasoning;
        if self.persist_settings {
            if let Err(err) = Config::save_hide_reasoning(self.hide_reasoning) {
                tracing::warn!(error = %format!("{err:#}"), "could not save settings");
            }
        }
    }

    /// Tick animation frame (called by Tick event)
    pub fn tick_animation(&mut self) {
        if self.session.in_progress() {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
    }

    fn max_scroll(&self) -> u16 {
        self.total_response_lines.saturating_sub(self.response_height)
    }

    pub fn scroll_down(&mut self, lines: u16) {
        let max = self.max_scroll();
        self.response_scroll = self.response_scroll.saturating_add(lines).min(max);
        // Reaching the bottom resumes following the stream
        self.follow_output = self.response_scroll >= max;
    }

    pub fn scroll_up(&mut self, lines: u16) {
        self.response_scroll = self.response_scroll.saturating_sub(lines);
        self.follow_output = false;
    }

    pub fn scroll_half_page_down(&mut self) {
        self.scroll_down((self.response_height / 2).max(1));
    }

    pub fn scroll_half_page_up(&mut self) {
        self.scroll_up((self.response_height / 2).max(1));
    }

    pub fn scroll_to_top(&mut self) {
        self.response_scroll = 0;
        self.follow_output = self.max_scroll() == 0;
    }

    pub fn scroll_to_bottom(&mut self) {
        self.response_scroll = self.max_scroll();
        self.follow_output = true;
    }

    /// Record the wrapped size of the response from the last render.
    pub fn update_response_layout(&mut self, total_lines: u16, height: u16) {
        self.total_response_lines = total_lines;
        self.response_height = height;
        if self.follow_output {
            self.response_scroll = self.max_scroll();
        } else {
            self.response_scroll = self.response_scroll.min(self.max_scroll());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::fake::ScriptedTransport;
    use crate::session::StreamUpdate;

    fn settings() -> Settings {
        Config::new().resolve(None).unwrap()
    }

    fn test_app(
        transport: Arc<ScriptedTransport>,
    ) -> (App, mpsc::UnboundedReceiver<StreamEvent>, mpsc::UnboundedReceiver<AppEvent>) {
        let (stream_tx, stream_rx) = mpsc::unbounded_channel();
        let (app_tx, app_rx) = mpsc::unbounded_channel();
        let app = App::new(&settings(), transport, stream_tx, app_tx);
        (app, stream_rx, app_rx)
    }

    #[tokio::test]
    async fn test_display_text_respects_reasoning_toggle() {
        let transport = ScriptedTransport::new(vec![Ok("<think>plan</think>Answer")]);
        let (mut app, mut stream_rx, _app_rx) = test_app(transport);

        app.submit_query();
        while app.session.in_progress() {
            let event = stream_rx.recv().await.unwrap();
            app.apply_stream_event(event);
        }

        assert!(app.hide_reasoning);
        assert_eq!(app.display_text(), "Answer");
        app.toggle_reasoning();
        assert_eq!(app.display_text(), "<think>plan</think>Answer");
        // The buffer itself is never filtered
        assert_eq!(app.session.response(), "<think>plan</think>Answer");
    }

    #[tokio::test]
    async fn test_literal_opener_hidden_only_while_streaming() {
        let transport = ScriptedTransport::new(vec![Ok("Wrap the plan in `<think>` tags.")]);
        let (mut app, mut stream_rx, _app_rx) = test_app(transport);

        app.submit_query();
        let event = stream_rx.recv().await.unwrap();
        app.apply_stream_event(event);
        assert!(app.session.in_progress());
        assert_eq!(app.display_text(), "Wrap the plan in `");

        let event = stream_rx.recv().await.unwrap();
        app.apply_stream_event(event);
        assert!(!app.session.in_progress());
        assert_eq!(app.display_text(), "Wrap the plan in `<think>` tags.");
    }

    #[tokio::test]
    async fn test_check_backend_reports_status() {
        let (mut app, _stream_rx, mut app_rx) = test_app(ScriptedTransport::new(vec![]));
        app.check_backend();
        assert_eq!(app.backend_status, BackendStatus::Checking);
        match app_rx.recv().await.unwrap() {
            AppEvent::Backend(status) => assert_eq!(status, BackendStatus::Online),
            other => panic!("unexpected event {other:?}"),
        }

        let (mut app, _stream_rx, mut app_rx) =
            test_app(ScriptedTransport::unhealthy());
        app.check_backend();
        match app_rx.recv().await.unwrap() {
            AppEvent::Backend(status) => assert_eq!(status, BackendStatus::Offline),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_scrolling_follows_stream_until_user_scrolls_up() {
        let (mut app, _stream_rx, _app_rx) = test_app(ScriptedTransport::hanging());
        app.submit_query();

        app.update_response_layout(50, 10);
        assert_eq!(app.response_scroll, 40);

        app.scroll_up(5);
        assert!(!app.follow_output);
        app.update_response_layout(60, 10);
        assert_eq!(app.response_scroll, 35);

        app.scroll_down(100);
        assert!(app.follow_output);
        assert_eq!(app.response_scroll, 50);

        app.scroll_to_top();
        assert_eq!(app.response_scroll, 0);
        assert!(!app.follow_output);
        app.scroll_to_bottom();
        assert_eq!(app.response_scroll, 50);
    }

    #[tokio::test]
    async fn test_submit_resets_scroll_and_ignores_stale_events() {
        let (mut app, _stream_rx, _app_rx) = test_app(ScriptedTransport::hanging());
        app.submit_query();
        let first = app.session.current_request().unwrap();
        app.update_response_layout(30, 10);
        app.scroll_up(10);

        app.submit_query();
        assert!(app.follow_output);
        assert_eq!(app.response_scroll, 0);

        app.apply_stream_event(StreamEvent {
            request: first,
            update: StreamUpdate::Progress("stale".into()),
        });
        assert_eq!(app.session.response(), "");
    }

    #[tokio::test]
    async fn test_tick_only_animates_while_streaming() {
        let (mut app, _stream_rx, _app_rx) = test_app(ScriptedTransport::hanging());
        app.tick_animation();
        assert_eq!(app.animation_frame, 0);

        app.submit_query();
        app.tick_animation();
        app.tick_animation();
        assert_eq!(app.animation_frame, 2);
        app.tick_animation();
        assert_eq!(app.animation_frame, 0);

        app.cancel_query();
        app.tick_animation();
        assert_eq!(app.animation_frame, 0);
    }
}
