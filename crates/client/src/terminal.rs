//! Terminal front end: line commands in, transcript out.
//!
//! The streaming assistant message is redrawn in place; anything else that
//! happens while it is live is held back until it is finalized.

use std::io;

use chatdock_client::transcript::Message;
use chatdock_client::{ConnectionState, GenerationState, SessionEvent};
use chatdock_protocol::Role;
use console::{measure_text_width, style, Term};

pub const HELP: &str = "commands: /stop /clear /history /ping /reconnect /quit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Send(String),
    Stop,
    Clear,
    History,
    Ping,
    Reconnect,
    Quit,
    Help,
    Unknown(String),
}

impl Command {
    /// `None` for a blank line.
    pub fn parse(line: &str) -> Option<Command> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        let Some(name) = line.strip_prefix('/') else {
            return Some(Command::Send(line.to_string()));
        };
        Some(match name {
            "stop" => Command::Stop,
            "clear" => Command::Clear,
            "history" => Command::History,
            "ping" => Command::Ping,
            "reconnect" => Command::Reconnect,
            "quit" | "exit" => Command::Quit,
            "help" => Command::Help,
            other => Command::Unknown(other.to_string()),
        })
    }
}

pub struct TerminalView {
    term: Term,
    /// Rows occupied by the live streaming message.
    live_rows: usize,
    deferred: Vec<String>,
}

impl TerminalView {
    pub fn new() -> Self {
        Self {
            term: Term::stdout(),
            live_rows: 0,
            deferred: Vec::new(),
        }
    }

    pub fn banner(&self, url: &str) -> io::Result<()> {
        self.term
            .write_line(&format!("{} {}", style("chatdock").bold(), style(url).dim()))?;
        self.term.write_line(&style(HELP).dim().to_string())
    }

    pub fn status(&mut self, text: &str) -> io::Result<()> {
        let line = style(text).dim().to_string();
        if self.live_rows > 0 {
            self.deferred.push(line);
            Ok(())
        } else {
            self.term.write_line(&line)
        }
    }

    pub fn error(&mut self, text: &str) -> io::Result<()> {
        let line = style(text).red().to_string();
        if self.live_rows > 0 {
            self.deferred.push(line);
            Ok(())
        } else {
            self.term.write_line(&line)
        }
    }

    pub fn render(&mut self, event: &SessionEvent) -> io::Result<()> {
        match event {
            SessionEvent::ServerHello { message, .. } => self.status(message),
            SessionEvent::ConnectionChanged(ConnectionState::Connected) => {
                self.status("connected")
            }
            SessionEvent::ConnectionChanged(ConnectionState::Disconnected) => {
                self.error("disconnected (use /reconnect)")
            }
            SessionEvent::GenerationChanged(GenerationState::Completing) => {
                self.status("stopping…")
            }
            SessionEvent::GenerationChanged(_) => Ok(()),
            SessionEvent::MessageAppended(message) if message.streaming => {
                self.draw_live(message)
            }
            SessionEvent::MessageAppended(message) => self.write_message(message),
            SessionEvent::MessageUpdated(message) => self.draw_live(message),
            SessionEvent::MessageFinalized(message) => {
                self.draw_live(message)?;
                self.live_rows = 0;
                for line in std::mem::take(&mut self.deferred) {
                    self.term.write_line(&line)?;
                }
                Ok(())
            }
            SessionEvent::TranscriptCleared => {
                self.term.clear_screen()?;
                self.status("history cleared")
            }
            SessionEvent::HistoryReceived { entries, diverged } => {
                self.status(&format!("server history: {} messages", entries.len()))?;
                for entry in entries {
                    self.status(&format!("  {}: {}", entry.role.as_str(), entry.content))?;
                }
                if *diverged {
                    self.error("server history differs from this transcript; /clear to resync")?;
                }
                Ok(())
            }
            SessionEvent::Visualization(data) => {
                let kind = data
                    .get("visualization_type")
                    .and_then(|v| v.as_str())
                    .unwrap_or("unknown");
                self.status(&format!("[visualization: {kind}]"))
            }
            SessionEvent::Pong { timestamp } => {
                let rtt = timestamp
                    .map(|sent| chrono::Utc::now().timestamp_millis() - sent)
                    .map(|ms| format!(" ({ms} ms)"))
                    .unwrap_or_default();
                self.status(&format!("pong{rtt}"))
            }
            SessionEvent::Failed(_) => Ok(()),
        }
    }

    fn write_message(&mut self, message: &Message) -> io::Result<()> {
        let text = format_message(message);
        if self.live_rows > 0 {
            self.deferred.push(text);
            return Ok(());
        }
        self.term.write_line(&text)
    }

    fn draw_live(&mut self, message: &Message) -> io::Result<()> {
        if self.live_rows > 0 {
            self.term.clear_last_lines(self.live_rows)?;
        }
        let text = format_message(message);
        let (_, width) = self.term.size();
        self.term.write_line(&text)?;
        self.live_rows = rows_for(&text, width as usize);
        Ok(())
    }
}

fn format_message(message: &Message) -> String {
    let prefix = match (message.role, message.is_error) {
        (_, true) => style("error ›").red().bold(),
        (Role::User, false) => style("you ›").cyan().bold(),
        (Role::Assistant, false) => style("assistant ›").green().bold(),
    };
    format!("{prefix} {}", message.display_content)
}

/// Terminal rows taken by `text` once soft-wrapped at `width` columns.
fn rows_for(text: &str, width: usize) -> usize {
    let width = width.max(1);
    text.split('\n')
        .map(|line| measure_text_width(line).div_ceil(width).max(1))
        .sum()
}
