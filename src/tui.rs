// src/tui.rs
//
// Full-screen terminal front end: monitor pane, input line and status bar.
// Key handling is split into a pure mapping (map_key) and the session
// actions (App::apply) so both can be tested without a terminal.

use crossterm::event::{Event, EventStream, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use futures::StreamExt;
use ratatui::layout::{Constraint, Layout};
use ratatui::style::{Modifier, Style};
use ratatui::text::Line;
use ratatui::widgets::{Block, Paragraph};
use ratatui::{DefaultTerminal, Frame};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::io::serial::utils::COMMON_BAUD_RATES;
use crate::io::{IODevice, IOState, SerialEvent, StreamEndReason};
use crate::logging;
use crate::sessions::Session;

/// Bytes per row in the hex view
const HEX_WIDTH: usize = 16;

/// Lines moved per PageUp/PageDown
const SCROLL_STEP: usize = 10;

/// Redraw interval when nothing else happens
const TICK: Duration = Duration::from_millis(250);

/// What a key press asks for
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Action {
    None,
    Quit,
    Send,
    Input(char),
    Backspace,
    ToggleConnect,
    ToggleEcho,
    ToggleCrlf,
    TogglePause,
    ToggleHex,
    NextBaudRate,
    SaveOutput,
    NewSession,
    ScrollUp,
    ScrollDown,
}

pub fn map_key(key: &KeyEvent) -> Action {
    if key.modifiers.contains(KeyModifiers::CONTROL) {
        return match key.code {
            KeyCode::Char('q') | KeyCode::Char('c') => Action::Quit,
            KeyCode::Char('o') => Action::ToggleConnect,
            KeyCode::Char('e') => Action::ToggleEcho,
            KeyCode::Char('r') => Action::ToggleCrlf,
            KeyCode::Char('p') => Action::TogglePause,
            KeyCode::Char('x') => Action::ToggleHex,
            KeyCode::Char('b') => Action::NextBaudRate,
            KeyCode::Char('s') => Action::SaveOutput,
            KeyCode::Char('n') => Action::NewSession,
            _ => Action::None,
        };
    }
    match key.code {
        KeyCode::Esc => Action::Quit,
        KeyCode::Enter => Action::Send,
        KeyCode::Backspace => Action::Backspace,
        KeyCode::PageUp => Action::ScrollUp,
        KeyCode::PageDown => Action::ScrollDown,
        KeyCode::Char(c) => Action::Input(c),
        _ => Action::None,
    }
}

pub struct App {
    session: Session,
    input: String,
    status: String,
    hex_view: bool,
    /// Lines scrolled back from the bottom
    scroll: usize,
    output_path: Option<PathBuf>,
    should_quit: bool,
}

impl App {
    pub fn new(session: Session, output_path: Option<PathBuf>) -> Self {
        Self {
            session,
            input: String::new(),
            status: "Ctrl-O connect  Ctrl-B baud  Ctrl-Q quit".to_string(),
            hex_view: false,
            scroll: 0,
            output_path,
            should_quit: false,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn should_quit(&self) -> bool {
        self.should_quit
    }

    /// Carry out an action. Failures land in the status bar.
    pub async fn apply(&mut self, action: Action) {
        let result = match action {
            Action::None => Ok(()),
            Action::Quit => {
                self.should_quit = true;
                Ok(())
            }
            Action::Input(c) => {
                self.input.push(c);
                Ok(())
            }
            Action::Backspace => {
                self.input.pop();
                Ok(())
            }
            Action::Send => self.send_input(),
            Action::ToggleConnect => self.toggle_connect().await,
            Action::ToggleEcho => {
                self.session.set_echo(!self.session.echo());
                self.status = format!("Echo {}", on_off(self.session.echo()));
                Ok(())
            }
            Action::ToggleCrlf => {
                self.session.set_crlf(!self.session.crlf());
                self.status = format!("CRLF {}", on_off(self.session.crlf()));
                Ok(())
            }
            Action::TogglePause => self.toggle_pause().await,
            Action::ToggleHex => {
                self.hex_view = !self.hex_view;
                self.scroll = 0;
                Ok(())
            }
            Action::NextBaudRate => self.next_baud_rate(),
            Action::SaveOutput => self.save_output(),
            Action::NewSession => {
                let r = self.session.new_session().await;
                if r.is_ok() {
                    self.input.clear();
                    self.scroll = 0;
                    self.status = "New session".to_string();
                }
                r
            }
            Action::ScrollUp => {
                // Keep at least the first line on screen
                let max = self.content_lines().len().saturating_sub(1);
                self.scroll = (self.scroll + SCROLL_STEP).min(max);
                Ok(())
            }
            Action::ScrollDown => {
                self.scroll = self.scroll.saturating_sub(SCROLL_STEP);
                Ok(())
            }
        };

        if let Err(e) = result {
            tlog!("[tui] {}", e);
            self.status = e;
        }
    }

    fn send_input(&mut self) -> Result<(), String> {
        let line = std::mem::take(&mut self.input);
        match self.session.send_text(&line) {
            Ok(r) if r.success => {
                self.scroll = 0;
                Ok(())
            }
            Ok(r) => {
                self.input = line;
                Err(r.error.unwrap_or_else(|| "Send failed".to_string()))
            }
            Err(e) => {
                self.input = line;
                Err(e)
            }
        }
    }

    async fn toggle_connect(&mut self) -> Result<(), String> {
        if self.session.is_connected() {
            self.session.disconnect().await?;
            self.status = "Disconnected".to_string();
        } else {
            self.session.connect().await?;
            self.status = format!("Connected to {}", self.session.config().configuration_string());
        }
        Ok(())
    }

    async fn toggle_pause(&mut self) -> Result<(), String> {
        let reader = self.session.reader_mut();
        match reader.state() {
            IOState::Running => {
                reader.pause().await?;
                self.status = "Paused".to_string();
            }
            IOState::Paused => {
                reader.resume().await?;
                self.status = "Resumed".to_string();
            }
            _ => return Err("Not connected".to_string()),
        }
        Ok(())
    }

    /// Step to the next common baud rate, wrapping around
    fn next_baud_rate(&mut self) -> Result<(), String> {
        if self.session.is_connected() {
            return Err("Disconnect before changing the baud rate".to_string());
        }
        let current = self.session.config().baud_rate();
        let next = COMMON_BAUD_RATES
            .iter()
            .copied()
            .find(|&rate| rate > current)
            .unwrap_or(COMMON_BAUD_RATES[0]);
        self.session.config_mut().set_baud_rate(next)?;
        self.status = format!("Baud rate {}", next);
        Ok(())
    }

    fn save_output(&mut self) -> Result<(), String> {
        let path = self.output_path.clone().unwrap_or_else(|| {
            PathBuf::from(
                chrono::Local::now()
                    .format("monicom-%Y%m%d-%H%M%S.txt")
                    .to_string(),
            )
        });
        let written = self.session.save_output(&path)?;
        self.status = format!("Saved {} bytes to {}", written, path.display());
        Ok(())
    }

    /// React to the read loop
    pub fn on_serial_event(&mut self, event: SerialEvent) {
        if let SerialEvent::Ended { reason, error } = event {
            self.status = match (reason, error) {
                (StreamEndReason::Stopped, _) => "Port closed".to_string(),
                (_, Some(e)) => format!("Connection {}: {}", reason, e),
                (_, None) => format!("Connection {}", reason),
            };
        }
    }

    /// Monitor contents split into display lines
    fn content_lines(&self) -> Vec<String> {
        let content = if self.hex_view {
            self.session.monitor().hex_dump(HEX_WIDTH)
        } else {
            self.session.monitor().text(self.session.encoding())
        };
        content.lines().map(printable).collect()
    }

    /// Monitor lines visible in a pane `height` lines tall
    pub fn visible_lines(&self, height: usize) -> Vec<String> {
        let mut lines = self.content_lines();
        let end = lines.len().saturating_sub(self.scroll);
        let start = end.saturating_sub(height);
        lines.truncate(end);
        lines.split_off(start)
    }

    fn draw(&self, frame: &mut Frame) {
        let [monitor_area, input_area, status_area] = Layout::vertical([
            Constraint::Min(3),
            Constraint::Length(3),
            Constraint::Length(1),
        ])
        .areas(frame.area());

        let height = monitor_area.height.saturating_sub(2) as usize;
        let lines: Vec<Line> = self
            .visible_lines(height)
            .into_iter()
            .map(Line::raw)
            .collect();
        let monitor_title = if self.hex_view {
            format!(" {} (hex) ", self.session.title())
        } else {
            format!(" {} ", self.session.title())
        };
        frame.render_widget(
            Paragraph::new(lines).block(Block::bordered().title(monitor_title)),
            monitor_area,
        );

        frame.render_widget(
            Paragraph::new(self.input.as_str()).block(Block::bordered().title(" Send ")),
            input_area,
        );
        let cursor_x = input_area.x + 1 + self.input.chars().count() as u16;
        frame.set_cursor_position((
            cursor_x.min(input_area.right().saturating_sub(2)),
            input_area.y + 1,
        ));

        let status = format!(
            " echo:{} crlf:{} | {}",
            on_off(self.session.echo()),
            on_off(self.session.crlf()),
            self.status
        );
        frame.render_widget(
            Paragraph::new(status).style(Style::default().add_modifier(Modifier::REVERSED)),
            status_area,
        );
    }

    async fn event_loop(
        &mut self,
        terminal: &mut DefaultTerminal,
        serial_events: &mut mpsc::UnboundedReceiver<SerialEvent>,
    ) -> Result<(), String> {
        let mut keys = EventStream::new();
        let mut tick = tokio::time::interval(TICK);

        while !self.should_quit {
            terminal
                .draw(|frame| self.draw(frame))
                .map_err(|e| format!("Failed to draw: {}", e))?;

            tokio::select! {
                maybe_event = keys.next() => match maybe_event {
                    Some(Ok(Event::Key(key))) if key.kind == KeyEventKind::Press => {
                        self.apply(map_key(&key)).await;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(format!("Terminal input error: {}", e)),
                    None => break,
                },
                Some(event) = serial_events.recv() => self.on_serial_event(event),
                _ = tick.tick() => {}
            }
        }
        Ok(())
    }
}

fn on_off(v: bool) -> &'static str {
    if v {
        "on"
    } else {
        "off"
    }
}

/// Control characters would move the cursor; show them as dots
fn printable(line: &str) -> String {
    line.chars()
        .filter(|&c| c != '\r')
        .map(|c| if c.is_control() && c != '\t' { '.' } else { c })
        .collect()
}

/// Run the full-screen terminal until the user quits.
pub async fn run(session: Session, output_path: Option<PathBuf>) -> Result<(), String> {
    let mut app = App::new(session, output_path);
    let mut serial_events = app.session.subscribe();

    // Connect straight away when a port was given
    if app.session.config().port().is_some() {
        app.apply(Action::ToggleConnect).await;
    }

    let mut terminal =
        ratatui::try_init().map_err(|e| format!("Failed to initialise terminal: {}", e))?;
    logging::set_stderr_enabled(false);

    let result = app.event_loop(&mut terminal, &mut serial_events).await;

    let restored = ratatui::try_restore();
    logging::set_stderr_enabled(true);
    app.session.disconnect().await?;

    restored.map_err(|e| format!("Failed to restore terminal: {}", e))?;
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::serial::backend::mock::MockBackend;
    use crate::monitor::MonitorBuffer;
    use std::sync::Arc;

    fn key(code: KeyCode, modifiers: KeyModifiers) -> KeyEvent {
        KeyEvent::new(code, modifiers)
    }

    fn app_with(ports: &[&str]) -> (App, MockBackend) {
        let backend = MockBackend::with_ports(ports);
        let session = Session::with_backend(Arc::new(backend.clone()), MonitorBuffer::new());
        (App::new(session, None), backend)
    }

    #[test]
    fn test_map_key() {
        assert_eq!(map_key(&key(KeyCode::Char('q'), KeyModifiers::CONTROL)), Action::Quit);
        assert_eq!(map_key(&key(KeyCode::Esc, KeyModifiers::NONE)), Action::Quit);
        assert_eq!(map_key(&key(KeyCode::Char('o'), KeyModifiers::CONTROL)), Action::ToggleConnect);
        assert_eq!(map_key(&key(KeyCode::Char('x'), KeyModifiers::CONTROL)), Action::ToggleHex);
        assert_eq!(map_key(&key(KeyCode::Char('q'), KeyModifiers::NONE)), Action::Input('q'));
        assert_eq!(map_key(&key(KeyCode::Char('Q'), KeyModifiers::SHIFT)), Action::Input('Q'));
        assert_eq!(map_key(&key(KeyCode::Enter, KeyModifiers::NONE)), Action::Send);
        assert_eq!(map_key(&key(KeyCode::F(5), KeyModifiers::NONE)), Action::None);
    }

    #[test]
    fn test_printable() {
        assert_eq!(printable("ok\r"), "ok");
        assert_eq!(printable("a\x1b[2Jb"), "a.[2Jb");
        assert_eq!(printable("\tx"), "\tx");
    }

    #[tokio::test]
    async fn test_typing_and_sending() {
        let (mut app, backend) = app_with(&["tui-a"]);
        app.session.set_port("tui-a").unwrap();
        app.apply(Action::ToggleConnect).await;
        assert!(app.session().is_connected());

        for c in "AT".chars() {
            app.apply(Action::Input(c)).await;
        }
        app.apply(Action::Input('X')).await;
        app.apply(Action::Backspace).await;
        app.apply(Action::ToggleCrlf).await;
        app.apply(Action::Send).await;

        assert_eq!(backend.line.written(), b"AT\r\n".to_vec());
        assert!(app.input.is_empty());

        app.apply(Action::ToggleConnect).await;
        assert!(!app.session().is_connected());
        assert_eq!(app.status(), "Disconnected");
    }

    #[tokio::test]
    async fn test_send_while_disconnected_keeps_input() {
        let (mut app, _) = app_with(&["tui-b"]);
        app.apply(Action::Input('h')).await;
        app.apply(Action::Send).await;
        assert_eq!(app.input, "h");
        assert_eq!(app.status(), "Not connected");
    }

    #[tokio::test]
    async fn test_pause_requires_connection() {
        let (mut app, _) = app_with(&["tui-c"]);
        app.apply(Action::TogglePause).await;
        assert_eq!(app.status(), "Not connected");

        app.session.set_port("tui-c").unwrap();
        app.apply(Action::ToggleConnect).await;
        app.apply(Action::TogglePause).await;
        assert_eq!(app.session().state(), IOState::Paused);
        app.apply(Action::TogglePause).await;
        assert_eq!(app.session().state(), IOState::Running);
        app.apply(Action::Quit).await;
        assert!(app.should_quit());
        app.session.disconnect().await.unwrap();
    }

    #[tokio::test]
    async fn test_next_baud_rate_cycles() {
        let (mut app, _) = app_with(&["tui-g"]);
        assert_eq!(app.session().config().baud_rate(), 9600);
        app.apply(Action::NextBaudRate).await;
        assert_eq!(app.session().config().baud_rate(), 19200);
        assert_eq!(app.status(), "Baud rate 19200");

        app.session.config_mut().set_baud_rate(115200).unwrap();
        app.apply(Action::NextBaudRate).await;
        assert_eq!(app.session().config().baud_rate(), 75);

        app.session.set_port("tui-g").unwrap();
        app.apply(Action::ToggleConnect).await;
        app.apply(Action::NextBaudRate).await;
        assert_eq!(app.session().config().baud_rate(), 75);
        assert_eq!(app.status(), "Disconnect before changing the baud rate");
        app.session.disconnect().await.unwrap();
    }

    #[tokio::test]
    async fn test_visible_lines_follow_scroll() {
        let (mut app, _) = app_with(&["tui-d"]);
        let text: String = (0..30).map(|i| format!("line {}\r\n", i)).collect();
        app.session().monitor().append(text.as_bytes());

        let lines = app.visible_lines(5);
        assert_eq!(lines, vec!["line 25", "line 26", "line 27", "line 28", "line 29"]);

        app.apply(Action::ScrollUp).await;
        let lines = app.visible_lines(2);
        assert_eq!(lines, vec!["line 18", "line 19"]);

        app.apply(Action::ScrollDown).await;
        app.apply(Action::ScrollDown).await;
        assert_eq!(app.visible_lines(1), vec!["line 29"]);

        app.apply(Action::ToggleHex).await;
        assert!(app.visible_lines(1)[0].starts_with("000001"));
    }

    #[tokio::test]
    async fn test_scroll_up_stops_at_first_line() {
        let (mut app, _) = app_with(&["tui-h"]);
        let text: String = (0..12).map(|i| format!("row {}\n", i)).collect();
        app.session().monitor().append(text.as_bytes());

        for _ in 0..5 {
            app.apply(Action::ScrollUp).await;
        }
        assert_eq!(app.scroll, 11);
        assert_eq!(app.visible_lines(3), vec!["row 0"]);

        app.apply(Action::ScrollDown).await;
        assert_eq!(app.scroll, 1);

        // Nothing to scroll in an empty monitor
        app.session().monitor().clear();
        app.scroll = 0;
        app.apply(Action::ScrollUp).await;
        assert_eq!(app.scroll, 0);
        assert!(app.visible_lines(3).is_empty());
    }

    #[tokio::test]
    async fn test_save_output_uses_configured_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("saved.txt");
        let backend = MockBackend::with_ports(&["tui-e"]);
        let session = Session::with_backend(Arc::new(backend), MonitorBuffer::new());
        let mut app = App::new(session, Some(path.clone()));

        app.session().monitor().append(b"captured");
        app.apply(Action::SaveOutput).await;
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "captured");
        assert!(app.status().starts_with("Saved 8 bytes"));
    }

    #[test]
    fn test_stream_end_updates_status() {
        let (mut app, _) = app_with(&["tui-f"]);
        app.on_serial_event(SerialEvent::Ended {
            reason: StreamEndReason::Disconnected,
            error: None,
        });
        assert_eq!(app.status(), "Connection disconnected");

        app.on_serial_event(SerialEvent::Ended {
            reason: StreamEndReason::Error,
            error: Some("Read error: gone".to_string()),
        });
        assert_eq!(app.status(), "Connection error: Read error: gone");
    }
}
