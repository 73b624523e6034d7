//! Decides what an event means while a session is active.
//!
//! System commands are checked before anything else, so a user can always get
//! out of a flow even when the text would also be a valid answer.

use protocol::Event;

use crate::flows::InputShape;
use crate::session::FlowKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Cancel,
    Menu,
    /// Start the current flow over.
    Restart,
    Start(FlowKind),
}

impl Command {
    pub fn parse(event: &Event) -> Option<Command> {
        let raw = event.payload.trim().to_lowercase();
        match raw.as_str() {
            "/cancel" | "cancel" | "menu:cancel" => Some(Command::Cancel),
            "/menu" | "menu" | "/start" | "menu:main" => Some(Command::Menu),
            "/restart" => Some(Command::Restart),
            other => FlowKind::from_trigger(other).map(Command::Start),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Hand the event to the current state.
    Continue,
    /// Drop the session. `then` is the flow to start instead, if any.
    Abort { then: Option<FlowKind> },
    /// Not an answer to the current question; keep the session as it is.
    Reject,
}

pub fn resolve(event: &Event, current: FlowKind, expected: &InputShape) -> Resolution {
    if let Some(command) = Command::parse(event) {
        return match command {
            Command::Cancel | Command::Menu => Resolution::Abort { then: None },
            Command::Restart => Resolution::Abort { then: Some(current) },
            Command::Start(kind) => Resolution::Abort { then: Some(kind) },
        };
    }
    if expected.admits(event.kind, &event.payload) {
        Resolution::Continue
    } else {
        Resolution::Reject
    }
}
