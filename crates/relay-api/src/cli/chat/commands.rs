//! Console line parsing.
//!
//! A console line is either a slash command, or the body of an inbound
//! message. In `serve` mode every line is prefixed with the chat it belongs
//! to (`chat_id: body`); in `chat` mode the chat is fixed.
//!
//! Bodies starting with `/image` or `/doc` become image and document
//! messages; anything else is text.

use console::style;

use relay_types::message::{InboundMessage, MessageKind};

/// Slash commands that control the console itself.
#[derive(Debug, PartialEq)]
pub enum ChatCommand {
    /// Show available commands.
    Help,
    /// Print live pipeline statistics.
    Stats,
    /// Exit the console session.
    Exit,
    /// Unknown command.
    Unknown(String),
}

/// What a console line asks for.
#[derive(Debug)]
pub enum ConsoleInput {
    Message(InboundMessage),
    Command(ChatCommand),
    Empty,
    /// Line could not be understood; the string says why.
    Invalid(String),
}

/// Parse a message body for a known chat. The chat ID doubles as the sender.
pub fn parse_body(chat_id: &str, body: &str) -> ConsoleInput {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return ConsoleInput::Empty;
    }

    if !trimmed.starts_with('/') {
        return ConsoleInput::Message(InboundMessage::text(chat_id, chat_id, trimmed));
    }

    let (cmd, arg) = match trimmed.split_once(' ') {
        Some((cmd, arg)) => (cmd.to_lowercase(), arg.trim()),
        None => (trimmed.to_lowercase(), ""),
    };

    match cmd.as_str() {
        "/image" | "/img" => ConsoleInput::Message(InboundMessage::new(
            MessageKind::Image,
            chat_id,
            chat_id,
            arg,
        )),
        "/doc" | "/document" => {
            if arg.is_empty() {
                ConsoleInput::Invalid("/doc requires a file name".to_string())
            } else {
                ConsoleInput::Message(InboundMessage::new(
                    MessageKind::Document,
                    chat_id,
                    chat_id,
                    arg,
                ))
            }
        }
        "/help" | "/h" | "/?" => ConsoleInput::Command(ChatCommand::Help),
        "/stats" => ConsoleInput::Command(ChatCommand::Stats),
        "/exit" | "/quit" | "/q" => ConsoleInput::Command(ChatCommand::Exit),
        other => ConsoleInput::Command(ChatCommand::Unknown(other.to_string())),
    }
}

/// Parse a `chat_id: body` line. Bare slash commands need no chat prefix.
pub fn parse_routed(line: &str) -> ConsoleInput {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return ConsoleInput::Empty;
    }
    if trimmed.starts_with('/') {
        return match parse_body("console", trimmed) {
            ConsoleInput::Message(_) | ConsoleInput::Invalid(_) => {
                ConsoleInput::Invalid("message lines must start with `chat_id:`".to_string())
            }
            other => other,
        };
    }

    match trimmed.split_once(':') {
        Some((chat_id, body)) if !chat_id.trim().is_empty() && !chat_id.contains(' ') => {
            parse_body(chat_id.trim(), body)
        }
        _ => ConsoleInput::Invalid("expected `chat_id: text`".to_string()),
    }
}

/// Print the help text listing all available commands.
pub fn print_help(routed: bool) {
    println!();
    println!("  {}", style("Available commands:").bold());
    println!();
    if routed {
        println!("  {}   {}", style("<chat>: text").cyan(), "Send text to a chat");
    }
    println!("  {} {}", style("/image [caption]").cyan(), "Send an image");
    println!("  {}    {}", style("/doc <name>").cyan(), "Send a document");
    println!("  {}          {}", style("/stats").cyan(), "Show pipeline statistics");
    println!("  {}           {}", style("/help").cyan(), "Show this help message");
    println!("  {}           {}", style("/exit").cyan(), "Leave the console");
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(input: ConsoleInput) -> InboundMessage {
        match input {
            ConsoleInput::Message(m) => m,
            other => panic!("expected message, got {other:?}"),
        }
    }

    #[test]
    fn test_plain_text_is_text_message() {
        let m = message(parse_body("alice", "  hello there "));
        assert_eq!(m.kind, MessageKind::Text);
        assert_eq!(m.content, "hello there");
        assert_eq!(m.chat_id, "alice");
        assert_eq!(m.sender_id, "alice");
    }

    #[test]
    fn test_image_and_doc_prefixes() {
        let image = message(parse_body("c", "/image sunset"));
        assert_eq!(image.kind, MessageKind::Image);
        assert_eq!(image.content, "sunset");

        let bare_image = message(parse_body("c", "/IMAGE"));
        assert_eq!(bare_image.kind, MessageKind::Image);
        assert_eq!(bare_image.content, "");

        let doc = message(parse_body("c", "/doc report.pdf"));
        assert_eq!(doc.kind, MessageKind::Document);
        assert_eq!(doc.content, "report.pdf");

        assert!(matches!(parse_body("c", "/doc"), ConsoleInput::Invalid(_)));
    }

    #[test]
    fn test_commands() {
        assert!(matches!(
            parse_body("c", "/help"),
            ConsoleInput::Command(ChatCommand::Help)
        ));
        assert!(matches!(
            parse_body("c", "/q"),
            ConsoleInput::Command(ChatCommand::Exit)
        ));
        assert!(matches!(
            parse_body("c", "/stats"),
            ConsoleInput::Command(ChatCommand::Stats)
        ));
        match parse_body("c", "/foo bar") {
            ConsoleInput::Command(ChatCommand::Unknown(cmd)) => assert_eq!(cmd, "/foo"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_routed_lines() {
        let m = message(parse_routed("bob: what's up: nothing"));
        assert_eq!(m.chat_id, "bob");
        assert_eq!(m.content, "what's up: nothing");

        let doc = message(parse_routed("team-7: /doc notes.txt"));
        assert_eq!(doc.chat_id, "team-7");
        assert_eq!(doc.kind, MessageKind::Document);

        assert!(matches!(
            parse_routed("/stats"),
            ConsoleInput::Command(ChatCommand::Stats)
        ));
        assert!(matches!(parse_routed("/image cat"), ConsoleInput::Invalid(_)));
        assert!(matches!(parse_routed("no prefix here"), ConsoleInput::Invalid(_)));
        assert!(matches!(parse_routed(": empty chat"), ConsoleInput::Invalid(_)));
        assert!(matches!(parse_routed("   "), ConsoleInput::Empty));
        assert!(matches!(parse_routed("alice:   "), ConsoleInput::Empty));
    }
}
