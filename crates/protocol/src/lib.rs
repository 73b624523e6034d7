use serde::{Deserialize, Serialize};

/// Protocol version (bumped when breaking changes are introduced)
pub const VERSION: u8 = 1;

/// Top-level message envelope exchanged with transports.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    Event(Event),
    Action(OutboundAction),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Text,
    ButtonChoice,
}

/// Something the user did: typed a message or pressed a button.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub v: Option<u8>,
    pub user_id: String,
    pub kind: EventKind,
    pub payload: String, // button id for ButtonChoice
}

impl Event {
    pub fn text<U: Into<String>, S: Into<String>>(user_id: U, payload: S) -> Self {
        Self { v: Some(VERSION), user_id: user_id.into(), kind: EventKind::Text, payload: payload.into() }
    }

    pub fn button<U: Into<String>, S: Into<String>>(user_id: U, choice_id: S) -> Self {
        Self { v: Some(VERSION), user_id: user_id.into(), kind: EventKind::ButtonChoice, payload: choice_id.into() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Prompt,
    Completion,
    Rejection,
}

/// A button the transport should render.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Choice {
    pub id: String,
    pub label: String,
}

impl Choice {
    pub fn new<I: Into<String>, L: Into<String>>(id: I, label: L) -> Self {
        Self { id: id.into(), label: label.into() }
    }
}

/// What the transport should show the user next.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundAction {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub v: Option<u8>,
    pub kind: ActionKind,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub choices: Option<Vec<Choice>>,
}

impl OutboundAction {
    fn new<S: Into<String>>(kind: ActionKind, text: S) -> Self {
        Self { v: Some(VERSION), kind, text: text.into(), choices: None }
    }

    pub fn prompt<S: Into<String>>(text: S) -> Self {
        Self::new(ActionKind::Prompt, text)
    }

    pub fn completion<S: Into<String>>(text: S) -> Self {
        Self::new(ActionKind::Completion, text)
    }

    pub fn rejection<S: Into<String>>(text: S) -> Self {
        Self::new(ActionKind::Rejection, text)
    }

    /// Attach buttons. An empty list leaves the action without a keyboard.
    pub fn with_choices(mut self, choices: Vec<Choice>) -> Self {
        self.choices = if choices.is_empty() { None } else { Some(choices) };
        self
    }

    pub fn choice_ids(&self) -> Vec<&str> {
        self.choices
            .as_deref()
            .map(|c| c.iter().map(|c| c.id.as_str()).collect())
            .unwrap_or_default()
    }

    pub fn has_choice(&self, id: &str) -> bool {
        self.choice_ids().contains(&id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_envelope_is_tagged() {
        let msg = Message::Event(Event::button("42", "panic:yes"));
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "event");
        assert_eq!(json["kind"], "button_choice");
        assert_eq!(json["payload"], "panic:yes");
    }

    #[test]
    fn action_without_choices_omits_keyboard() {
        let action = OutboundAction::completion("done").with_choices(Vec::new());
        let json = serde_json::to_string(&action).unwrap();
        assert!(!json.contains("choices"));

        let parsed: OutboundAction = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, action);
    }

    #[test]
    fn choice_lookup() {
        let action = OutboundAction::prompt("pick")
            .with_choices(vec![Choice::new("a", "A"), Choice::new("b", "B")]);
        assert_eq!(action.choice_ids(), vec!["a", "b"]);
        assert!(action.has_choice("b"));
        assert!(!action.has_choice("c"));
    }
}
