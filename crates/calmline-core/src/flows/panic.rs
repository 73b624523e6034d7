//! Panic de-escalation: the one flow that branches and loops.
//!
//! `rating` is a decision node re-entered after every technique. It ends in
//! `offer_more` when the user improved, hands out another technique while the
//! attempt budget lasts, and finishes in `exhausted` once it is spent.

use super::{
    always, ChoiceSpec, EntryEffect, FlowDefinition, InputShape, Next, PromptSpec, StepSpec, TerminalSpec,
    Transition,
};
use crate::config::FlowConfig;
use crate::session::{AnswerValue, FlowKind, Session, StateId};

pub const ASK_BREATHING: StateId = StateId("ask_breathing");
pub const BREATHING: StateId = StateId("breathing");
pub const TECHNIQUE: StateId = StateId("technique");
pub const RATING: StateId = StateId("rating");
pub const OFFER_MORE: StateId = StateId("offer_more");
pub const CALM: StateId = StateId("calm");
pub const EXHAUSTED: StateId = StateId("exhausted");

pub const FIELDS: &[&str] = &[
    "breathing_accepted",
    "latest_rating",
    "initial_rating",
    "techniques_offered",
    "outcome",
];

pub const STOP_ID: &str = "panic:stop";
pub const DONE_ID: &str = "panic:done";

const BREATHING_OFFER: &[ChoiceSpec] = &[
    ChoiceSpec { id: "panic:yes", value: "yes", label: "Yes", aliases: &["y", "ok", "okay", "sure"] },
    ChoiceSpec { id: "panic:no", value: "no", label: "No, thanks", aliases: &["n", "no"] },
];

const STOP: &[ChoiceSpec] = &[ChoiceSpec {
    id: STOP_ID,
    value: "stop",
    label: "Stop",
    aliases: &["enough", "skip"],
}];

const DONE: &[ChoiceSpec] = &[ChoiceSpec {
    id: DONE_ID,
    value: "done",
    label: "Done",
    aliases: &["finished", "did it", "ok"],
}];

const MORE_OR_ENOUGH: &[ChoiceSpec] = &[
    ChoiceSpec { id: "panic:enough", value: "enough", label: "That's enough", aliases: &["no", "stop"] },
    ChoiceSpec { id: "panic:more", value: "more", label: "One more exercise", aliases: &["yes", "another"] },
];

/// A scripted coping action.
#[derive(Debug, PartialEq, Eq)]
pub struct Technique {
    pub id: &'static str,
    pub label: &'static str,
    pub instruction: &'static str,
}

pub const TECHNIQUES: &[Technique] = &[
    Technique {
        id: "cold_water",
        label: "Cold water on your face",
        instruction: "Go and splash cold water on your face. It quiets the body's alarm quickly.",
    },
    Technique {
        id: "countdown",
        label: "Count back from 100 in sevens",
        instruction: "Count back from 100 in steps of seven: 100… 93… 86… at your own pace.",
    },
    Technique {
        id: "pressure_point",
        label: "Press between thumb and index finger",
        instruction: "Press firmly on the soft spot between your thumb and index finger for thirty seconds.",
    },
    Technique {
        id: "movement",
        label: "Get up and move",
        instruction: "Stand up and move around for a minute or two. Moving lets the tension out.",
    },
    Technique {
        id: "cold_drink",
        label: "Sip cold water",
        instruction: "Drink a glass of cold water in small, slow sips.",
    },
];

pub fn technique(id: &str) -> Option<&'static Technique> {
    TECHNIQUES.iter().find(|t| t.id == id)
}

/// Next technique to offer: the first in pool order not yet offered in the
/// current pass over the pool. Once every technique was offered the pool
/// starts over.
pub fn next_technique(offered: &[&str]) -> &'static Technique {
    let in_cycle = offered.len() % TECHNIQUES.len();
    let current_cycle = &offered[offered.len() - in_cycle..];
    TECHNIQUES
        .iter()
        .find(|t| !current_cycle.contains(&t.id))
        .unwrap_or(&TECHNIQUES[0])
}

fn offer_technique(session: &mut Session) {
    let scratch = &mut session.metadata.panic;
    let next = next_technique(&scratch.offered);
    scratch.offered.push(next.id);
    scratch.current = Some(next.id);
    sync_offered(session);
}

fn sync_offered(session: &mut Session) {
    let offered = session.metadata.panic.offered.iter().map(|s| s.to_string()).collect();
    session.answers.insert("techniques_offered", AnswerValue::List(offered));
}

/// Spend one attempt, then offer another technique or give up.
fn spend_attempt(session: &mut Session, config: &FlowConfig) -> Transition {
    session.metadata.panic.attempts += 1;
    if session.metadata.panic.attempts >= config.attempt_cap {
        return Transition::Finish(EXHAUSTED);
    }
    offer_technique(session);
    Transition::Advance(TECHNIQUE)
}

fn decide_breathing(value: &AnswerValue, session: &mut Session, _: &FlowConfig) -> Transition {
    if value.as_str() == Some("yes") {
        return Transition::Advance(BREATHING);
    }
    offer_technique(session);
    Transition::Advance(TECHNIQUE)
}

/// The decision node.
pub fn evaluate_rating(value: &AnswerValue, session: &mut Session, config: &FlowConfig) -> Transition {
    let rating = value.as_integer().unwrap_or_default().clamp(0, i64::from(u8::MAX)) as u8;
    let previous = session.metadata.panic.last_rating();
    session.metadata.panic.ratings.push(rating);
    if previous.is_none() {
        session.answers.insert("initial_rating", AnswerValue::Integer(i64::from(rating)));
    }
    sync_offered(session);

    let dropped = previous
        .map(|p| p.saturating_sub(rating) >= config.improvement_delta)
        .unwrap_or(false);
    if rating <= config.low_threshold || dropped {
        return Transition::Advance(OFFER_MORE);
    }
    if previous.is_none() {
        // The first rating only sets the baseline.
        offer_technique(session);
        return Transition::Advance(TECHNIQUE);
    }
    spend_attempt(session, config)
}

fn after_offer(value: &AnswerValue, session: &mut Session, config: &FlowConfig) -> Transition {
    if value.as_str() == Some("enough") {
        return Transition::Finish(CALM);
    }
    spend_attempt(session, config)
}

fn offer_prompt(_: &Session, config: &FlowConfig) -> String {
    let b = &config.breathing;
    format!(
        "I'm here with you. Would you like to breathe together at a {}-{}-{} pace?",
        b.inhale.as_secs(),
        b.hold.as_secs(),
        b.exhale.as_secs()
    )
}

fn breathing_prompt(_: &Session, config: &FlowConfig) -> String {
    let b = &config.breathing;
    format!(
        "Let's breathe together: in for {}, hold for {}, out for {}. Follow my messages, and press Stop whenever you like.",
        b.inhale.as_secs(),
        b.hold.as_secs(),
        b.exhale.as_secs()
    )
}

fn technique_prompt(session: &Session, _: &FlowConfig) -> String {
    let instruction = session
        .metadata
        .panic
        .current
        .and_then(technique)
        .map(|t| t.instruction)
        .unwrap_or("Take a slow breath and look around you.");
    format!("{}\nPress Done when you've finished.", instruction)
}

fn rating_prompt(_: &Session, config: &FlowConfig) -> String {
    format!(
        "How is the anxiety now? Pick a number from {} to {}.",
        config.rating_min, config.rating_max
    )
}

pub fn definition() -> FlowDefinition {
    FlowDefinition {
        kind: FlowKind::PanicFlow,
        initial: ASK_BREATHING,
        steps: vec![
            StepSpec {
                id: ASK_BREATHING,
                prompt: PromptSpec::Dynamic(offer_prompt),
                input: InputShape::Choice(BREATHING_OFFER),
                field: Some("breathing_accepted"),
                next: Next::Branch { select: decide_breathing, targets: &[BREATHING, TECHNIQUE] },
                on_enter: None,
            },
            StepSpec {
                id: BREATHING,
                prompt: PromptSpec::Dynamic(breathing_prompt),
                input: InputShape::Choice(STOP),
                field: None,
                next: Next::Goto(RATING),
                on_enter: Some(EntryEffect::Breathing { resume: RATING }),
            },
            StepSpec {
                id: TECHNIQUE,
                prompt: PromptSpec::Dynamic(technique_prompt),
                input: InputShape::Choice(DONE),
                field: None,
                next: Next::Goto(RATING),
                on_enter: None,
            },
            StepSpec {
                id: RATING,
                prompt: PromptSpec::Dynamic(rating_prompt),
                input: InputShape::Rating,
                field: Some("latest_rating"),
                next: Next::Branch { select: evaluate_rating, targets: &[OFFER_MORE, TECHNIQUE, EXHAUSTED] },
                on_enter: None,
            },
            StepSpec {
                id: OFFER_MORE,
                prompt: PromptSpec::Text(
                    "Well done, that's a real improvement. Is this enough for now, or would you like one more exercise?",
                ),
                input: InputShape::Choice(MORE_OR_ENOUGH),
                field: None,
                next: Next::Branch { select: after_offer, targets: &[CALM, TECHNIQUE, EXHAUSTED] },
                on_enter: None,
            },
        ],
        terminals: vec![
            TerminalSpec { id: CALM, outcome_field: Some("outcome"), persist: always, exhausted: false },
            TerminalSpec { id: EXHAUSTED, outcome_field: Some("outcome"), persist: always, exhausted: true },
        ],
        fields: FIELDS,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rating_session(ratings: &[u8]) -> Session {
        let mut session = Session::new("u", FlowKind::PanicFlow, RATING);
        session.metadata.panic.ratings = ratings.to_vec();
        session
    }

    fn rate(session: &mut Session, rating: i64) -> Transition {
        session.answers.insert("latest_rating", AnswerValue::Integer(rating));
        evaluate_rating(&AnswerValue::Integer(rating), session, &FlowConfig::default())
    }

    #[test]
    fn pool_skips_offered_and_cycles() {
        assert_eq!(next_technique(&[]).id, "cold_water");
        assert_eq!(next_technique(&["cold_water"]).id, "countdown");
        assert_eq!(next_technique(&["countdown", "cold_water"]).id, "pressure_point");

        let all: Vec<&str> = TECHNIQUES.iter().map(|t| t.id).collect();
        assert_eq!(next_technique(&all).id, "cold_water");

        let mut wrapped = all.clone();
        wrapped.push("cold_water");
        assert_eq!(next_technique(&wrapped).id, "countdown");
    }

    #[test]
    fn baseline_offers_without_spending_an_attempt() {
        let mut session = rating_session(&[]);
        assert!(matches!(rate(&mut session, 9), Transition::Advance(TECHNIQUE)));
        assert_eq!(session.metadata.panic.attempts, 0);
        assert_eq!(session.answers.integer("initial_rating"), Some(9));
        assert_eq!(session.metadata.panic.current, Some("cold_water"));
    }

    #[test]
    fn low_rating_goes_to_offer_more() {
        let mut session = rating_session(&[]);
        assert!(matches!(rate(&mut session, 3), Transition::Advance(OFFER_MORE)));
        assert!(session.metadata.panic.offered.is_empty());
        assert!(session.answers.contains("techniques_offered"));
    }

    #[test]
    fn big_drop_goes_to_offer_more() {
        let mut session = rating_session(&[9]);
        assert!(matches!(rate(&mut session, 7), Transition::Advance(OFFER_MORE)));
        assert_eq!(session.metadata.panic.attempts, 0);
    }

    #[test]
    fn small_drop_spends_attempt_until_cap() {
        let mut session = rating_session(&[9]);
        session.metadata.panic.offered = vec!["cold_water"];
        assert!(matches!(rate(&mut session, 8), Transition::Advance(TECHNIQUE)));
        assert_eq!(session.metadata.panic.attempts, 1);
        assert_eq!(session.metadata.panic.current, Some("countdown"));

        assert!(matches!(rate(&mut session, 8), Transition::Finish(EXHAUSTED)));
        assert_eq!(session.metadata.panic.attempts, 2);
    }

    #[test]
    fn definition_validates() {
        definition().validate().unwrap();
    }
}
