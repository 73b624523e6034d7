use super::{always, rating_step, ChoiceSpec, FlowDefinition, InputShape, Next, PromptSpec, StepSpec, TerminalSpec};
use crate::session::{FlowKind, StateId};

pub const DESCRIPTION: StateId = StateId("description");
pub const RATING: StateId = StateId("distress_rating");
pub const LOCATION: StateId = StateId("location");
pub const PEOPLE: StateId = StateId("people_around");
pub const WEATHER: StateId = StateId("weather");
pub const DONE: StateId = StateId("done");

pub const FIELDS: &[&str] = &["description", "distress_rating", "location", "people_around", "weather"];

pub const LOCATIONS: &[ChoiceSpec] = &[
    ChoiceSpec { id: "location:home", value: "home", label: "Home", aliases: &["house"] },
    ChoiceSpec { id: "location:work", value: "work", label: "Work", aliases: &["office", "job"] },
    ChoiceSpec { id: "location:studies", value: "studies", label: "Studies", aliases: &["school", "university", "class"] },
    ChoiceSpec { id: "location:public", value: "public", label: "Public place", aliases: &["outside", "street", "mall"] },
    ChoiceSpec { id: "location:transport", value: "transport", label: "On the way", aliases: &["bus", "train", "car"] },
    ChoiceSpec { id: "location:other", value: "other", label: "Somewhere else", aliases: &[] },
];

pub const PEOPLE_AROUND: &[ChoiceSpec] = &[
    ChoiceSpec { id: "people:alone", value: "alone", label: "Alone", aliases: &["nobody", "no one"] },
    ChoiceSpec { id: "people:family", value: "family", label: "Family", aliases: &[] },
    ChoiceSpec { id: "people:friends", value: "friends", label: "Friends", aliases: &["friend"] },
    ChoiceSpec { id: "people:colleagues", value: "colleagues", label: "Colleagues", aliases: &["coworkers"] },
    ChoiceSpec { id: "people:strangers", value: "strangers", label: "Strangers", aliases: &["crowd"] },
];

pub const WEATHER_OPTIONS: &[ChoiceSpec] = &[
    ChoiceSpec { id: "weather:sunny", value: "sunny", label: "Sunny", aliases: &["sun"] },
    ChoiceSpec { id: "weather:cloudy", value: "cloudy", label: "Cloudy", aliases: &["grey", "gray"] },
    ChoiceSpec { id: "weather:rainy", value: "rainy", label: "Rainy", aliases: &["rain"] },
    ChoiceSpec { id: "weather:hot", value: "hot", label: "Hot", aliases: &[] },
    ChoiceSpec { id: "weather:cold", value: "cold", label: "Cold", aliases: &[] },
];

pub fn definition() -> FlowDefinition {
    FlowDefinition {
        kind: FlowKind::FullCheckIn,
        initial: DESCRIPTION,
        steps: vec![
            StepSpec {
                id: DESCRIPTION,
                prompt: PromptSpec::Text("Let's do a full check-in. What's happening right now?"),
                input: InputShape::FreeText,
                field: Some("description"),
                next: Next::Goto(RATING),
                on_enter: None,
            },
            rating_step(RATING, Next::Goto(LOCATION)),
            StepSpec {
                id: LOCATION,
                prompt: PromptSpec::Text("Where are you?"),
                input: InputShape::Choice(LOCATIONS),
                field: Some("location"),
                next: Next::Goto(PEOPLE),
                on_enter: None,
            },
            StepSpec {
                id: PEOPLE,
                prompt: PromptSpec::Text("Who's around you?"),
                input: InputShape::Choice(PEOPLE_AROUND),
                field: Some("people_around"),
                next: Next::Goto(WEATHER),
                on_enter: None,
            },
            StepSpec {
                id: WEATHER,
                prompt: PromptSpec::Text("And what's the weather like?"),
                input: InputShape::Choice(WEATHER_OPTIONS),
                field: Some("weather"),
                next: Next::Finish(DONE),
                on_enter: None,
            },
        ],
        terminals: vec![TerminalSpec { id: DONE, outcome_field: None, persist: always, exhausted: false }],
        fields: FIELDS,
    }
}
