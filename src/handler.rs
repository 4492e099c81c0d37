use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseEvent, MouseEventKind};
use ratatui::layout::Rect;
use crate::app::{App, InputMode};
use crate::tui::AppEvent;

/// Convert a character index to a byte index for UTF-8 safe string operations
fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

pub fn handle_event(app: &mut App, event: AppEvent) -> Result<()> {
    match event {
        AppEvent::Key(key) => handle_key(app, key),
        AppEvent::Mouse(mouse) => handle_mouse(app, mouse),
        // Layout is recomputed on the next draw
        AppEvent::Resize => {}
        AppEvent::Tick => app.tick_animation(),
        AppEvent::Stream(event) => app.apply_stream_event(event),
        AppEvent::Backend(status) => app.backend_status = status,
    }
    Ok(())
}

fn handle_key(app: &mut App, key: KeyEvent) {
    // Global keys that work in any mode
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        app.should_quit = true;
        return;
    }

    match app.input_mode {
        InputMode::Normal => handle_normal_mode(app, key),
        InputMode::Editing => handle_editing_mode(app, key),
    }
}

fn handle_normal_mode(app: &mut App, key: KeyEvent) {
    match key.code {
        // Quit
        KeyCode::Char('q') => app.should_quit = true,

        // Back to the input line
        KeyCode::Char('i') | KeyCode::Tab => app.input_mode = InputMode::Editing,

        // Half-page scroll
        KeyCode::Char('d') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            app.scroll_half_page_down();
        }
        KeyCode::Char('u') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            app.scroll_half_page_up();
        }

        // Response scrolling
        KeyCode::Char('j') | KeyCode::Down => app.scroll_down(1),
        KeyCode::Char('k') | KeyCode::Up => app.scroll_up(1),
        KeyCode::PageDown => app.scroll_down(app.response_height.max(1)),
        KeyCode::PageUp => app.scroll_up(app.response_height.max(1)),
        KeyCode::Char('g') | KeyCode::Home => app.scroll_to_top(),
        KeyCode::Char('G') | KeyCode::End => app.scroll_to_bottom(),

        // Stream control
        KeyCode::Char('x') => app.cancel_query(),
        KeyCode::Enter => app.submit_query(),

        // Display and backend
        KeyCode::Char('r') => app.toggle_reasoning(),
        KeyCode::Char('h') => app.check_backend(),

        _ => {}
    }
}

fn handle_editing_mode(app: &mut App, key: KeyEvent) {
    let query = &mut app.session.query;
    match key.code {
        KeyCode::Esc => {
            app.input_mode = InputMode::Normal;
        }
        KeyCode::Enter => {
            // Empty queries are sent as-is; an in-flight request is replaced
            app.submit_query();
        }
        KeyCode::Backspace => {
            if app.query_cursor > 0 {
                app.query_cursor -= 1;
                let byte_pos = char_to_byte_index(query, app.query_cursor);
                query.remove(byte_pos);
            }
        }
        KeyCode::Delete => {
            let char_count = query.chars().count();
            if app.query_cursor < char_count {
                let byte_pos = char_to_byte_index(query, app.query_cursor);
                query.remove(byte_pos);
            }
        }
        KeyCode::Left => {
            app.query_cursor = app.query_cursor.saturating_sub(1);
        }
        KeyCode::Right => {
            let char_count = query.chars().count();
            app.query_cursor = (app.query_cursor + 1).min(char_count);
        }
        KeyCode::Home => {
            app.query_cursor = 0;
        }
        KeyCode::End => {
            app.query_cursor = query.chars().count();
        }
        KeyCode::Char(c) => {
            let byte_pos = char_to_byte_index(query, app.query_cursor);
            query.insert(byte_pos, c);
            app.query_cursor += 1;
        }
        _ => {}
    }
}

/// Check if a point is within a rectangle
fn point_in_rect(x: u16, y: u16, rect: Rect) -> bool {
    x >= rect.x && x < rect.x + rect.width && y >= rect.y && y < rect.y + rect.height
}

fn handle_mouse(app: &mut App, mouse: MouseEvent) {
    let in_response = app
        .response_area
        .map(|r| point_in_rect(mouse.column, mouse.row, r))
        .unwrap_or(false);
    if !in_response {
        return;
    }

    match mouse.kind {
        MouseEventKind::ScrollDown => app.scroll_down(3),
        MouseEventKind::ScrollUp => app.scroll_up(3),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::BackendStatus;
    use crate::client::fake::ScriptedTransport;
    use crate::config::Config;
    use crate::session::{StreamEvent, StreamUpdate, BACKEND_ERROR_MESSAGE};
    use std::sync::Arc;
    use tokio::sync::mpsc;

    fn key(code: KeyCode) -> AppEvent {
        AppEvent::Key(KeyEvent::new(code, KeyModifiers::NONE))
    }

    fn ctrl(c: char) -> AppEvent {
        AppEvent::Key(KeyEvent::new(KeyCode::Char(c), KeyModifiers::CONTROL))
    }

    fn type_text(app: &mut App, text: &str) {
        for c in text.chars() {
            handle_event(app, key(KeyCode::Char(c))).unwrap();
        }
    }

    fn test_app(
        transport: Arc<ScriptedTransport>,
    ) -> (App, mpsc::UnboundedReceiver<StreamEvent>) {
        let settings = Config::new().resolve(None).unwrap();
        let (stream_tx, stream_rx) = mpsc::unbounded_channel();
        let (app_tx, _app_rx) = mpsc::unbounded_channel();
        (App::new(&settings, transport, stream_tx, app_tx), stream_rx)
    }

    /// Route stream events through the handler until the request settles.
    async fn run_to_completion(app: &mut App, rx: &mut mpsc::UnboundedReceiver<StreamEvent>) {
        while app.session.in_progress() {
            let event = rx.recv().await.unwrap();
            handle_event(app, AppEvent::Stream(event)).unwrap();
        }
    }

    #[test]
    fn test_char_to_byte_index() {
        assert_eq!(char_to_byte_index("héllo", 0), 0);
        assert_eq!(char_to_byte_index("héllo", 2), 3);
        assert_eq!(char_to_byte_index("héllo", 10), 6);
    }

    #[tokio::test]
    async fn test_editing_is_utf8_safe() {
        let (mut app, _rx) = test_app(ScriptedTransport::hanging());
        assert_eq!(app.input_mode, InputMode::Editing);

        type_text(&mut app, "héllo");
        handle_event(&mut app, key(KeyCode::Left)).unwrap();
        handle_event(&mut app, key(KeyCode::Left)).unwrap();
        handle_event(&mut app, key(KeyCode::Backspace)).unwrap();
        assert_eq!(app.session.query, "hélo");

        handle_event(&mut app, key(KeyCode::Home)).unwrap();
        handle_event(&mut app, key(KeyCode::Delete)).unwrap();
        type_text(&mut app, "ñ");
        assert_eq!(app.session.query, "ñélo");
        assert_eq!(app.query_cursor, 1);

        handle_event(&mut app, key(KeyCode::End)).unwrap();
        type_text(&mut app, "!");
        assert_eq!(app.session.query, "ñélo!");

        handle_event(&mut app, key(KeyCode::Right)).unwrap();
        assert_eq!(app.query_cursor, 5);
    }

    #[tokio::test]
    async fn test_enter_streams_response() {
        let transport = ScriptedTransport::new(vec![Ok("H"), Ok("Hel"), Ok("Hello")]);
        let (mut app, mut rx) = test_app(transport.clone());

        type_text(&mut app, "hello");
        handle_event(&mut app, key(KeyCode::Enter)).unwrap();
        assert!(app.session.in_progress());
        assert_eq!(app.session.response(), "");

        run_to_completion(&mut app, &mut rx).await;
        assert_eq!(app.session.response(), "Hello");
        assert!(!app.session.in_progress());
        // The query stays in the input line after sending
        assert_eq!(app.session.query, "hello");
        assert_eq!(transport.seen(), vec!["hello".to_string()]);
    }

    #[tokio::test]
    async fn test_enter_with_empty_query_still_sends() {
        let transport = ScriptedTransport::new(vec![Err("connection refused")]);
        let (mut app, mut rx) = test_app(transport.clone());

        handle_event(&mut app, key(KeyCode::Enter)).unwrap();
        run_to_completion(&mut app, &mut rx).await;

        assert_eq!(app.session.response(), BACKEND_ERROR_MESSAGE);
        assert!(!app.session.in_progress());
        assert_eq!(transport.seen(), vec![String::new()]);
    }

    #[tokio::test]
    async fn test_normal_mode_keys() {
        let (mut app, _rx) = test_app(ScriptedTransport::hanging());

        handle_event(&mut app, key(KeyCode::Esc)).unwrap();
        assert_eq!(app.input_mode, InputMode::Normal);

        // Typing in normal mode does not edit the query
        handle_event(&mut app, key(KeyCode::Char('j'))).unwrap();
        assert_eq!(app.session.query, "");

        handle_event(&mut app, key(KeyCode::Enter)).unwrap();
        assert!(app.session.in_progress());
        handle_event(&mut app, key(KeyCode::Char('x'))).unwrap();
        assert!(!app.session.in_progress());

        let hidden = app.hide_reasoning;
        handle_event(&mut app, key(KeyCode::Char('r'))).unwrap();
        assert_eq!(app.hide_reasoning, !hidden);

        handle_event(&mut app, key(KeyCode::Char('i'))).unwrap();
        assert_eq!(app.input_mode, InputMode::Editing);

        // 'q' is just text while editing
        handle_event(&mut app, key(KeyCode::Char('q'))).unwrap();
        assert!(!app.should_quit);
        assert_eq!(app.session.query, "q");

        handle_event(&mut app, key(KeyCode::Esc)).unwrap();
        handle_event(&mut app, key(KeyCode::Char('q'))).unwrap();
        assert!(app.should_quit);
    }

    #[tokio::test]
    async fn test_ctrl_c_quits_from_editing() {
        let (mut app, _rx) = test_app(ScriptedTransport::hanging());
        handle_event(&mut app, ctrl('c')).unwrap();
        assert!(app.should_quit);
    }

    #[tokio::test]
    async fn test_backend_and_tick_events() {
        let (mut app, _rx) = test_app(ScriptedTransport::hanging());
        handle_event(&mut app, AppEvent::Backend(BackendStatus::Offline)).unwrap();
        assert_eq!(app.backend_status, BackendStatus::Offline);

        app.submit_query();
        handle_event(&mut app, AppEvent::Tick).unwrap();
        assert_eq!(app.animation_frame, 1);

        let scroll = app.response_scroll;
        handle_event(&mut app, AppEvent::Resize).unwrap();
        assert_eq!(app.response_scroll, scroll);
        assert!(app.session.in_progress());
    }

    #[tokio::test]
    async fn test_stale_stream_events_ignored_after_resubmit() {
        let (mut app, _rx) = test_app(ScriptedTransport::hanging());
        type_text(&mut app, "first");
        handle_event(&mut app, key(KeyCode::Enter)).unwrap();
        let first = app.session.current_request().unwrap();
        handle_event(&mut app, key(KeyCode::Enter)).unwrap();

        let stale = StreamEvent { request: first, update: StreamUpdate::Completed };
        handle_event(&mut app, AppEvent::Stream(stale)).unwrap();
        assert!(app.session.in_progress());
    }

    #[tokio::test]
    async fn test_mouse_scroll_only_inside_response() {
        let (mut app, _rx) = test_app(ScriptedTransport::hanging());
        app.response_area = Some(Rect::new(0, 1, 80, 20));
        app.update_response_layout(100, 18);
        assert_eq!(app.response_scroll, 82);

        let wheel = |kind: MouseEventKind, row: u16| {
            AppEvent::Mouse(MouseEvent {
                kind,
                column: 5,
                row,
                modifiers: KeyModifiers::NONE,
            })
        };

        handle_event(&mut app, wheel(MouseEventKind::ScrollUp, 30)).unwrap();
        assert_eq!(app.response_scroll, 82);

        handle_event(&mut app, wheel(MouseEventKind::ScrollUp, 5)).unwrap();
        assert_eq!(app.response_scroll, 79);
        assert!(!app.follow_output);
    }
}
