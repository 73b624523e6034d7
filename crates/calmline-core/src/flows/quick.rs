use super::{always, rating_step, FlowDefinition, InputShape, Next, PromptSpec, StepSpec, TerminalSpec};
use crate::session::{FlowKind, StateId};

pub const DESCRIPTION: StateId = StateId("description");
pub const RATING: StateId = StateId("distress_rating");
pub const DONE: StateId = StateId("done");

pub const FIELDS: &[&str] = &["description", "distress_rating"];

pub fn definition() -> FlowDefinition {
    FlowDefinition {
        kind: FlowKind::QuickCheckIn,
        initial: DESCRIPTION,
        steps: vec![
            StepSpec {
                id: DESCRIPTION,
                prompt: PromptSpec::Text("What's going on? Describe it in a few words."),
                input: InputShape::FreeText,
                field: Some("description"),
                next: Next::Goto(RATING),
                on_enter: None,
            },
            rating_step(RATING, Next::Finish(DONE)),
        ],
        terminals: vec![TerminalSpec { id: DONE, outcome_field: None, persist: always, exhausted: false }],
        fields: FIELDS,
    }
}
