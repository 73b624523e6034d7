use serde::{Deserialize, Serialize};
use std::fmt;

/// The mutually exclusive conversational contexts a user can be in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowKind {
    QuickCheckIn,
    FullCheckIn,
    Venting,
    PanicFlow,
    SupportChat,
}

impl FlowKind {
    pub const ALL: [FlowKind; 5] = [
        FlowKind::QuickCheckIn,
        FlowKind::FullCheckIn,
        FlowKind::Venting,
        FlowKind::PanicFlow,
        FlowKind::SupportChat,
    ];

    /// Slash command that starts this flow.
    pub fn command(&self) -> &'static str {
        match self {
            FlowKind::QuickCheckIn => "/quick",
            FlowKind::FullCheckIn => "/full",
            FlowKind::Venting => "/vent",
            FlowKind::PanicFlow => "/panic",
            FlowKind::SupportChat => "/support",
        }
    }

    /// Id of the idle-menu button that starts this flow.
    pub fn menu_id(&self) -> &'static str {
        match self {
            FlowKind::QuickCheckIn => "menu:quick",
            FlowKind::FullCheckIn => "menu:full",
            FlowKind::Venting => "menu:vent",
            FlowKind::PanicFlow => "menu:panic",
            FlowKind::SupportChat => "menu:support",
        }
    }

    pub fn menu_label(&self) -> &'static str {
        match self {
            FlowKind::QuickCheckIn => "Quick check-in",
            FlowKind::FullCheckIn => "Full check-in",
            FlowKind::Venting => "I need to vent",
            FlowKind::PanicFlow => "I'm panicking",
            FlowKind::SupportChat => "Need someone to listen?",
        }
    }

    /// Resolve a typed command or menu button into a flow.
    pub fn from_trigger(trigger: &str) -> Option<FlowKind> {
        let trigger = trigger.trim().to_lowercase();
        if trigger == "/checkin" {
            return Some(FlowKind::QuickCheckIn);
        }
        Self::ALL
            .into_iter()
            .find(|k| k.command() == trigger || k.menu_id() == trigger)
    }
}

impl fmt::Display for FlowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlowKind::QuickCheckIn => write!(f, "quick_check_in"),
            FlowKind::FullCheckIn => write!(f, "full_check_in"),
            FlowKind::Venting => write!(f, "venting"),
            FlowKind::PanicFlow => write!(f, "panic_flow"),
            FlowKind::SupportChat => write!(f, "support_chat"),
        }
    }
}

/// Identifier of a state inside a flow definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StateId(pub &'static str);

impl StateId {
    pub fn as_str(&self) -> &'static str {
        self.0
    }
}

impl fmt::Display for StateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn triggers_resolve() {
        assert_eq!(FlowKind::from_trigger("/panic"), Some(FlowKind::PanicFlow));
        assert_eq!(FlowKind::from_trigger(" /Quick "), Some(FlowKind::QuickCheckIn));
        assert_eq!(FlowKind::from_trigger("/checkin"), Some(FlowKind::QuickCheckIn));
        assert_eq!(FlowKind::from_trigger("menu:support"), Some(FlowKind::SupportChat));
        assert_eq!(FlowKind::from_trigger("panic"), None);
    }
}
