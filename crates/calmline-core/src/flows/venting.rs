use super::{ChoiceSpec, FlowDefinition, InputShape, Next, PromptSpec, StepSpec, TerminalSpec};
use crate::session::{Answers, FlowKind, StateId};

pub const CONTENT: StateId = StateId("content");
pub const SAVE_CHOICE: StateId = StateId("save_choice");
pub const DONE: StateId = StateId("done");

pub const FIELDS: &[&str] = &["content", "save_choice"];

pub const SAVE_OPTIONS: &[ChoiceSpec] = &[
    ChoiceSpec { id: "vent:save", value: "save", label: "Save it", aliases: &["yes", "keep"] },
    ChoiceSpec { id: "vent:discard", value: "discard", label: "Let it go", aliases: &["no", "delete"] },
];

/// Venting is only stored when the user asked for it.
pub fn wants_saved(answers: &Answers) -> bool {
    answers.text("save_choice") == Some("save")
}

pub fn definition() -> FlowDefinition {
    FlowDefinition {
        kind: FlowKind::Venting,
        initial: CONTENT,
        steps: vec![
            StepSpec {
                id: CONTENT,
                prompt: PromptSpec::Text("I'm listening. Write whatever you need to get off your chest."),
                input: InputShape::FreeText,
                field: Some("content"),
                next: Next::Goto(SAVE_CHOICE),
                on_enter: None,
            },
            StepSpec {
                id: SAVE_CHOICE,
                prompt: PromptSpec::Text("Thank you for sharing. Should I keep this so you can look back on it later?"),
                input: InputShape::Choice(SAVE_OPTIONS),
                field: Some("save_choice"),
                next: Next::Finish(DONE),
                on_enter: None,
            },
        ],
        terminals: vec![TerminalSpec { id: DONE, outcome_field: None, persist: wants_saved, exhausted: false }],
        fields: FIELDS,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::AnswerValue;

    #[test]
    fn only_save_persists() {
        let mut answers = Answers::new();
        answers.insert("save_choice", AnswerValue::Choice("discard".into()));
        assert!(!wants_saved(&answers));
        answers.insert("save_choice", AnswerValue::Choice("save".into()));
        assert!(wants_saved(&answers));
    }
}
