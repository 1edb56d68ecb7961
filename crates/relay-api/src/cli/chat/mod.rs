//! Console front end for the relay.
//!
//! `relayd chat` runs a single-chat session; `relayd serve` reads
//! `chat_id: text` lines so several chats can be driven from one terminal.
//! Both feed the pipeline through [`ConsoleTransport`].

pub mod commands;
pub mod transport;

use anyhow::Result;
use console::style;
use tokio::io::{AsyncBufReadExt, BufReader};

use relay_core::pipeline::Admission;
use relay_types::message::InboundMessage;

use self::commands::{ChatCommand, ConsoleInput};
use crate::state::AppState;

pub use transport::ConsoleTransport;

/// Why a console loop stopped reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleExit {
    /// stdin reached end of file.
    Eof,
    /// The user typed `/exit`.
    Requested,
}

/// Hand one message to the pipeline and report refusals on stderr.
async fn submit(state: &AppState, message: InboundMessage) {
    match state.pipeline.handle_inbound(message).await {
        Ok(Admission::Queued) => tracing::debug!("message queued"),
        Ok(Admission::Cached) => tracing::debug!("message answered from cache"),
        Ok(Admission::RateLimited) => tracing::debug!("message rate limited"),
        Err(err) => eprintln!("  {} {err}", style("✗").red()),
    }
}

/// Apply a console command. Returns `true` when the loop should stop.
fn run_command(state: &AppState, command: ChatCommand, routed: bool) -> bool {
    match command {
        ChatCommand::Help => commands::print_help(routed),
        ChatCommand::Stats => {
            crate::cli::status::print_status(&state.pipeline.status(), Some(state.uptime_secs()));
        }
        ChatCommand::Exit => return true,
        ChatCommand::Unknown(cmd) => {
            eprintln!(
                "  {} Unknown command '{}'. Type {} for help.",
                style("?").yellow(),
                cmd,
                style("/help").cyan()
            );
        }
    }
    false
}

/// Read `chat_id: text` lines from stdin until EOF or `/exit`.
pub async fn run_routed_console(state: AppState) -> Result<ConsoleExit> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        match commands::parse_routed(&line) {
            ConsoleInput::Message(message) => submit(&state, message).await,
            ConsoleInput::Command(command) => {
                if run_command(&state, command, true) {
                    return Ok(ConsoleExit::Requested);
                }
            }
            ConsoleInput::Empty => {}
            ConsoleInput::Invalid(reason) => {
                eprintln!("  {} {reason}", style("✗").red());
            }
        }
    }

    Ok(ConsoleExit::Eof)
}

/// Interactive single-chat session. Drains the pipeline before returning.
pub async fn run_chat(state: AppState, chat_id: &str) -> Result<()> {
    println!();
    println!(
        "  {} relay chat ({}) via {}",
        style("⚡").bold(),
        style(chat_id).cyan(),
        style(&state.config.backend.url).dim()
    );
    println!(
        "  {}",
        style("Type /help for commands, Ctrl+D or /exit to leave").dim()
    );
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match commands::parse_body(chat_id, &line) {
            ConsoleInput::Message(message) => submit(&state, message).await,
            ConsoleInput::Command(command) => {
                if run_command(&state, command, false) {
                    break;
                }
            }
            ConsoleInput::Empty => {}
            ConsoleInput::Invalid(reason) => {
                eprintln!("  {} {reason}", style("✗").red());
            }
        }
    }

    println!("  {}", style("Waiting for pending replies...").dim());
    state.pipeline.shutdown().await;
    println!("  Goodbye.");
    Ok(())
}
