//! chatdock terminal client
//!
//! Reads lines from stdin, sends them as chat messages, and redraws the
//! streaming reply in place.

mod terminal;

use std::time::Duration;

use anyhow::Context;
use chatdock_client::logging::init_logging;
use chatdock_client::{ChatSession, SessionChannel, SessionConfig, SessionError, SessionEvent};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;
use tracing::info;

use terminal::{Command, TerminalView, HELP};

const DEFAULT_URL: &str = "ws://127.0.0.1:8080/ws";

#[derive(Parser)]
#[command(name = "chatdock")]
#[command(about = "Chat with a streaming chatdock server from the terminal")]
#[command(version)]
struct Cli {
    /// WebSocket endpoint of the chat server
    #[arg(long, env = "CHATDOCK_URL", default_value = DEFAULT_URL)]
    url: String,

    /// Give up on a generation after this many seconds without server events
    #[arg(long, env = "CHATDOCK_STALL_TIMEOUT_SECS")]
    stall_timeout_secs: Option<u64>,

    /// Log filter (stderr), e.g. "debug" or "chatdock_client=trace"
    #[arg(long, env = "CHATDOCK_LOG_FILTER")]
    log_filter: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_filter.as_deref())?;

    let config = SessionConfig {
        stall_timeout: cli.stall_timeout_secs.map(Duration::from_secs),
    };
    let mut session = ChatSession::connect(&cli.url, config)
        .await
        .with_context(|| format!("failed to connect to {}", cli.url))?;
    let mut events = session.subscribe();

    info!(
        component = "client",
        event = "client.started",
        url = %cli.url,
        "Terminal client started"
    );

    let mut view = TerminalView::new();
    view.banner(&cli.url)?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let connected = session.is_connected();
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let Some(command) = Command::parse(&line) else { continue };

                let result = match command {
                    Command::Send(text) => session.send(&text).await,
                    Command::Stop => session.request_stop().await,
                    Command::Clear => session.request_clear().await,
                    Command::History => session.request_history().await,
                    Command::Ping => session.ping().await,
                    Command::Reconnect => {
                        match SessionChannel::connect(&cli.url).await {
                            Ok(channel) => {
                                session.reconnect(channel).await;
                                Ok(())
                            }
                            Err(e) => Err(SessionError::from(e)),
                        }
                    }
                    Command::Quit => break,
                    Command::Help => {
                        view.status(HELP)?;
                        Ok(())
                    }
                    Command::Unknown(name) => {
                        view.error(&format!("unknown command /{name}; {HELP}"))?;
                        Ok(())
                    }
                };

                if let Err(e) = result {
                    view.error(&e.to_string())?;
                }
            }
            _ = session.next_event(), if connected => {}
        }

        drain_events(&mut events, &mut view)?;
    }

    Ok(())
}

fn drain_events(
    events: &mut broadcast::Receiver<SessionEvent>,
    view: &mut TerminalView,
) -> anyhow::Result<()> {
    loop {
        match events.try_recv() {
            Ok(event) => view.render(&event)?,
            Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                view.error(&format!("display fell behind, skipped {skipped} updates"))?;
            }
            Err(_) => return Ok(()),
        }
    }
}
