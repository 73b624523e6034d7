//! Line-based console transport.
//!
//! Input lines look like `alice: feeling tense` for typed text and
//! `alice #rating:7` for a button press. Output is one JSON object per line.

use anyhow::{bail, Result};
use async_trait::async_trait;
use calmline_core::ports::OutboundPort;
use protocol::{Event, Message, OutboundAction};
use serde::Serialize;
use std::io::Write;
use tracing::debug;

pub fn parse_line(line: &str) -> Result<Option<Event>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with("//") {
        return Ok(None);
    }
    let split = line.find(|c| c == ':' || c == '#');
    let Some(at) = split else {
        bail!("expected `user: text` or `user #button`, got {:?}", line);
    };
    let user = line[..at].trim();
    let rest = line[at + 1..].trim();
    if user.is_empty() {
        bail!("missing user id in {:?}", line);
    }
    if rest.is_empty() {
        bail!("empty payload for user {}", user);
    }
    let event = match &line[at..=at] {
        "#" => Event::button(user, rest),
        _ => Event::text(user, rest),
    };
    Ok(Some(event))
}

#[derive(Serialize)]
struct Envelope<'a> {
    user_id: &'a str,
    #[serde(flatten)]
    message: Message,
}

/// Prints actions to stdout as JSON lines.
#[derive(Clone, Default)]
pub struct ConsoleOutbound;

#[async_trait]
impl OutboundPort for ConsoleOutbound {
    async fn send(&self, user_id: &str, action: OutboundAction) -> Result<()> {
        let line = serde_json::to_string(&Envelope { user_id, message: Message::Action(action) })?;
        debug!(user_id, "outbound action");
        let mut out = std::io::stdout().lock();
        writeln!(out, "{}", line)?;
        out.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use protocol::EventKind;

    #[test]
    fn parses_text_and_buttons() {
        let text = parse_line("alice: feeling tense: before a meeting").unwrap().unwrap();
        assert_eq!(text.user_id, "alice");
        assert_eq!(text.kind, EventKind::Text);
        assert_eq!(text.payload, "feeling tense: before a meeting");

        let button = parse_line("  bob #rating:7 ").unwrap().unwrap();
        assert_eq!(button.user_id, "bob");
        assert_eq!(button.kind, EventKind::ButtonChoice);
        assert_eq!(button.payload, "rating:7");
    }

    #[test]
    fn skips_blank_and_comment_lines() {
        assert!(parse_line("   ").unwrap().is_none());
        assert!(parse_line("// demo script").unwrap().is_none());
    }

    #[test]
    fn rejects_malformed_lines() {
        assert!(parse_line("no separator here").is_err());
        assert!(parse_line(": orphan").is_err());
        assert!(parse_line("carol:   ").is_err());
    }

    #[test]
    fn envelope_carries_user_and_type() {
        let json = serde_json::to_value(Envelope {
            user_id: "dana",
            message: Message::Action(OutboundAction::completion("done")),
        })
        .unwrap();
        assert_eq!(json["user_id"], "dana");
        assert_eq!(json["type"], "action");
        assert_eq!(json["kind"], "completion");
    }
}
