//! Main TUI application state and logic

use crate::interpreter::host::{HostReply, HostRequest, RunState};
use crate::interpreter::errors::VmResult;
use crate::interpreter::engine::Engine;
use crate::interpreter::output::ChannelOutput;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind};
use log::{debug, info};
use ratatui::{
    backend::Backend,
    layout::{Constraint, Direction, Layout},
    Frame, Terminal,
};
use rustc_hash::FxHashMap;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

/// Channels shown in the location line, in display order
pub const STATUS_CHANNELS: [&str; 3] = ["LOCN", "SCOR", "TIME"];

/// The main application state
pub struct App {
    /// The running game
    pub engine: Engine,

    /// Where save requests are written and load requests read
    pub save_path: PathBuf,

    /// Everything printed on the MAIN channel, plus echoed input
    pub transcript: String,

    /// Latest text of each status channel
    pub status_channels: FxHashMap<String, String>,

    /// Latest prompt from the PRPT channel
    pub prompt: String,

    /// Line being typed
    pub input: String,

    /// Input request the game is waiting on
    pub pending: Option<HostRequest>,

    pub show_machine: bool,
    pub transcript_scroll: usize,

    /// Whether the app should quit
    pub should_quit: bool,

    /// Status message to display
    pub status_message: String,

    /// Fatal engine error, once one happens
    pub error: Option<String>,
}

impl App {
    pub fn new(engine: Engine, save_path: PathBuf) -> Self {
        App {
            engine,
            save_path,
            transcript: String::new(),
            status_channels: FxHashMap::default(),
            prompt: String::from(">"),
            input: String::new(),
            pending: None,
            show_machine: false,
            transcript_scroll: usize::MAX,
            should_quit: false,
            status_message: String::from("Ready!"),
            error: None,
        }
    }

    /// Bootstrap the game and run to its first input request
    pub fn start(&mut self) {
        let result = self.engine.start();
        self.advance(result);
    }

    /// Run the TUI application
    pub fn run<B: Backend>(&mut self, terminal: &mut Terminal<B>) -> io::Result<()> {
        loop {
            terminal.draw(|f| self.render(f))?;

            if self.should_quit {
                break;
            }

            if event::poll(Duration::from_millis(50))? {
                if let Event::Key(key) = event::read()? {
                    if key.kind == KeyEventKind::Press {
                        self.handle_key_event(key);
                    }
                }
            }
        }

        Ok(())
    }

    /// Feed engine results back until it needs the player or stops.
    /// Save and load requests are answered from the save file.
    fn advance(&mut self, mut result: VmResult<RunState>) {
        loop {
            let batch = self.engine.take_output();
            self.absorb_output(batch);

            let reply = match result {
                Ok(RunState::Halted) => {
                    self.pending = None;
                    self.status_message = "The game has ended. Esc to quit".to_string();
                    return;
                }
                Err(e) => {
                    self.pending = None;
                    self.status_message = format!("Error: {}", e);
                    self.error = Some(e.to_string());
                    return;
                }
                Ok(RunState::Waiting(request)) => match request {
                    HostRequest::Save(data) => HostReply::Saved(self.write_save(&data)),
                    HostRequest::Load => HostReply::Loaded(self.read_save()),
                    HostRequest::SaveUndo(_) => HostReply::UndoSaved(false),
                    HostRequest::RestoreUndo => HostReply::UndoLoaded(None),
                    input => {
                        self.status_message = match input {
                            HostRequest::ReadKey => "Press a key".to_string(),
                            _ => "Waiting for input".to_string(),
                        };
                        self.pending = Some(input);
                        return;
                    }
                },
            };
            result = self.engine.resume_after_wait(reply);
        }
    }

    fn absorb_output(&mut self, batch: ChannelOutput) {
        for (channel, text) in batch {
            match channel.as_str() {
                "MAIN" => self.transcript.push_str(&text),
                "PRPT" => self.prompt = text,
                name if STATUS_CHANNELS.contains(&name) => {
                    self.status_channels.insert(channel, text);
                }
                _ => debug!("{} channel: {:?}", channel, text),
            }
        }
        self.transcript_scroll = usize::MAX;
    }

    fn write_save(&mut self, data: &[u8]) -> bool {
        match fs::write(&self.save_path, data) {
            Ok(()) => {
                info!("saved to {}", self.save_path.display());
                true
            }
            Err(e) => {
                self.status_message = format!("Save failed: {}", e);
                false
            }
        }
    }

    fn read_save(&mut self) -> Option<Vec<u8>> {
        match fs::read(&self.save_path) {
            Ok(data) => Some(data),
            Err(e) => {
                self.status_message = format!("Load failed: {}", e);
                None
            }
        }
    }

    /// Render the UI
    fn render(&mut self, frame: &mut Frame) {
        let size = frame.area();

        // location line, panes, input line, status bar
        let rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(1),
                Constraint::Min(0),
                Constraint::Length(3),
                Constraint::Length(1),
            ])
            .split(size);

        super::panes::render_location_line(frame, rows[0], &self.status_channels);

        let transcript_area = if self.show_machine {
            let columns = Layout::default()
                .direction(Direction::Horizontal)
                .constraints([Constraint::Percentage(65), Constraint::Percentage(35)])
                .split(rows[1]);
            super::panes::render_machine_pane(frame, columns[1], &self.engine);
            columns[0]
        } else {
            rows[1]
        };

        super::panes::render_transcript_pane(
            frame,
            transcript_area,
            &self.transcript,
            &mut self.transcript_scroll,
        );

        super::panes::render_input_line(
            frame,
            rows[2],
            &self.prompt,
            &self.input,
            self.pending.as_ref(),
        );

        super::panes::render_status_bar(
            frame,
            rows[3],
            &self.status_message,
            self.error.is_some(),
            self.pending.is_some(),
        );
    }

    /// Handle keyboard events
    fn handle_key_event(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Esc => {
                self.should_quit = true;
            }
            KeyCode::Tab => {
                self.show_machine = !self.show_machine;
            }
            KeyCode::Up => {
                self.transcript_scroll = self.transcript_scroll.saturating_sub(1);
            }
            KeyCode::Down => {
                self.transcript_scroll = self.transcript_scroll.saturating_add(1);
            }
            KeyCode::PageUp => {
                self.transcript_scroll = self.transcript_scroll.saturating_sub(10);
            }
            KeyCode::PageDown => {
                self.transcript_scroll = self.transcript_scroll.saturating_add(10);
            }
            KeyCode::Enter => match self.pending {
                Some(HostRequest::ReadLine { .. }) => self.submit_line(),
                Some(HostRequest::ReadKey) => self.submit_key('\n'),
                _ => {}
            },
            KeyCode::Backspace => {
                self.input.pop();
            }
            KeyCode::Char(c) => match self.pending {
                Some(HostRequest::ReadLine { max_len }) => {
                    if self.input.chars().count() < max_len as usize {
                        self.input.push(c);
                    }
                }
                Some(HostRequest::ReadKey) => self.submit_key(c),
                _ => {}
            },
            _ => {}
        }
    }

    fn submit_line(&mut self) {
        let line = std::mem::take(&mut self.input);
        self.transcript.push_str(&line);
        self.transcript.push('\n');
        self.pending = None;
        self.status_message = "Running".to_string();
        let result = self.engine.resume_after_wait(HostReply::Line(Some(line)));
        self.advance(result);
    }

    fn submit_key(&mut self, key: char) {
        self.pending = None;
        let result = self.engine.resume_after_wait(HostReply::Key(Some(key)));
        self.advance(result);
    }
}
