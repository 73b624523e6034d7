//! Declarative flow tables.
//!
//! A flow is a list of steps. Each step says what to ask, what shape of input
//! it takes, which answer field it fills and where to go next. New flows are
//! added as data; the engine never special-cases a flow by name.

pub mod full;
pub mod panic;
pub mod quick;
pub mod venting;

use protocol::{Choice, EventKind, OutboundAction};
use std::collections::{HashMap, HashSet};

use crate::config::FlowConfig;
use crate::error::{DefinitionError, ValidationError};
use crate::session::{AnswerValue, Answers, FlowKind, Session, StateId};

/// One selectable option of a choice step.
#[derive(Debug, Clone, Copy)]
pub struct ChoiceSpec {
    /// Button id, unique inside the flow.
    pub id: &'static str,
    /// Value stored in the answer bag.
    pub value: &'static str,
    pub label: &'static str,
    /// Extra words accepted when the user types instead of pressing.
    pub aliases: &'static [&'static str],
}

impl ChoiceSpec {
    fn matches_text(&self, text: &str) -> bool {
        let text = text.trim().to_lowercase();
        text == self.value
            || text == self.id
            || text == self.label.to_lowercase()
            || self.aliases.iter().any(|a| *a == text)
    }
}

/// Expected input for a step, doubling as validator and transform.
#[derive(Debug, Clone, Copy)]
pub enum InputShape {
    FreeText,
    Rating,
    Choice(&'static [ChoiceSpec]),
}

pub const RATING_PREFIX: &str = "rating:";

impl InputShape {
    /// Whether an event of this kind can be an answer at all. Anything this
    /// rejects is treated as off-topic rather than as a bad answer.
    pub fn admits(&self, kind: EventKind, payload: &str) -> bool {
        match (self, kind) {
            (_, EventKind::Text) => true,
            (InputShape::FreeText, EventKind::ButtonChoice) => false,
            (InputShape::Rating, EventKind::ButtonChoice) => payload.starts_with(RATING_PREFIX),
            (InputShape::Choice(options), EventKind::ButtonChoice) => {
                options.iter().any(|o| o.id == payload)
            }
        }
    }

    pub fn parse(&self, payload: &str, config: &FlowConfig) -> Result<AnswerValue, ValidationError> {
        let payload = payload.trim();
        match self {
            InputShape::FreeText => {
                if payload.is_empty() {
                    return Err(ValidationError::Empty);
                }
                if payload.chars().count() > config.max_text_chars {
                    return Err(ValidationError::TooLong { max: config.max_text_chars });
                }
                Ok(AnswerValue::Text(payload.to_string()))
            }
            InputShape::Rating => {
                let raw = payload.strip_prefix(RATING_PREFIX).unwrap_or(payload);
                let value: i64 = raw.trim().parse().map_err(|_| ValidationError::NotANumber)?;
                let (min, max) = (config.rating_min, config.rating_max);
                if value < i64::from(min) || value > i64::from(max) {
                    return Err(ValidationError::OutOfRange { min, max });
                }
                Ok(AnswerValue::Integer(value))
            }
            InputShape::Choice(options) => options
                .iter()
                .find(|o| o.id == payload || o.matches_text(payload))
                .map(|o| AnswerValue::Choice(o.value.to_string()))
                .ok_or(ValidationError::UnknownOption),
        }
    }

    pub fn choices(&self, config: &FlowConfig) -> Vec<Choice> {
        match self {
            InputShape::FreeText => Vec::new(),
            InputShape::Rating => (config.rating_min..=config.rating_max)
                .map(|n| Choice::new(format!("{}{}", RATING_PREFIX, n), n.to_string()))
                .collect(),
            InputShape::Choice(options) => options.iter().map(|o| Choice::new(o.id, o.label)).collect(),
        }
    }
}

#[derive(Clone, Copy)]
pub enum PromptSpec {
    Text(&'static str),
    Dynamic(fn(&Session, &FlowConfig) -> String),
}

/// Where a step goes after a valid answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Advance(StateId),
    Finish(StateId),
}

/// Branch selector: may inspect the answer and update session scratch data.
pub type BranchFn = fn(&AnswerValue, &mut Session, &FlowConfig) -> Transition;

#[derive(Clone, Copy)]
pub enum Next {
    Goto(StateId),
    Finish(StateId),
    Branch { select: BranchFn, targets: &'static [StateId] },
}

/// Work to start when a step is entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryEffect {
    /// Run the breathing sequence, then move to `resume` by itself.
    Breathing { resume: StateId },
}

pub struct StepSpec {
    pub id: StateId,
    pub prompt: PromptSpec,
    pub input: InputShape,
    pub field: Option<&'static str>,
    pub next: Next,
    pub on_enter: Option<EntryEffect>,
}

pub struct TerminalSpec {
    pub id: StateId,
    /// Field that records which terminal was reached.
    pub outcome_field: Option<&'static str>,
    pub persist: fn(&Answers) -> bool,
    /// Reaching this terminal means the flow ran out of attempts.
    pub exhausted: bool,
}

pub fn always(_: &Answers) -> bool {
    true
}

pub struct FlowDefinition {
    pub kind: FlowKind,
    pub initial: StateId,
    pub steps: Vec<StepSpec>,
    pub terminals: Vec<TerminalSpec>,
    /// Exactly the fields a completed record of this flow carries.
    pub fields: &'static [&'static str],
}

impl FlowDefinition {
    pub fn step(&self, id: StateId) -> Option<&StepSpec> {
        self.steps.iter().find(|s| s.id == id)
    }

    pub fn terminal(&self, id: StateId) -> Option<&TerminalSpec> {
        self.terminals.iter().find(|t| t.id == id)
    }

    pub fn is_terminal(&self, id: StateId) -> bool {
        self.terminal(id).is_some()
    }

    /// Prompt for `step`, rendered against the session's current data.
    pub fn render(&self, step: &StepSpec, session: &Session, config: &FlowConfig) -> OutboundAction {
        let text = match step.prompt {
            PromptSpec::Text(text) => text.to_string(),
            PromptSpec::Dynamic(render) => render(session, config),
        };
        OutboundAction::prompt(text).with_choices(step.input.choices(config))
    }

    pub fn validate(&self) -> Result<(), DefinitionError> {
        let flow = self.kind.to_string();
        let mut seen = HashSet::new();
        for id in self.steps.iter().map(|s| s.id).chain(self.terminals.iter().map(|t| t.id)) {
            if !seen.insert(id) {
                return Err(DefinitionError::Duplicate { flow, state: id.to_string() });
            }
        }
        if self.step(self.initial).is_none() {
            return Err(DefinitionError::MissingInitial { flow, state: self.initial.to_string() });
        }
        if self.terminals.is_empty() {
            return Err(DefinitionError::NoTerminal { flow });
        }

        for step in &self.steps {
            for target in successors(step) {
                if self.step(target).is_none() && !self.is_terminal(target) {
                    return Err(DefinitionError::UnknownTarget {
                        flow,
                        from: step.id.to_string(),
                        to: target.to_string(),
                    });
                }
            }
        }

        let branching = self.steps.iter().any(|s| matches!(s.next, Next::Branch { .. }));
        if !branching {
            self.check_acyclic()?;
        }
        Ok(())
    }

    fn check_acyclic(&self) -> Result<(), DefinitionError> {
        fn visit(
            def: &FlowDefinition,
            id: StateId,
            path: &mut Vec<StateId>,
            done: &mut HashSet<StateId>,
        ) -> Result<(), DefinitionError> {
            if done.contains(&id) {
                return Ok(());
            }
            if path.contains(&id) {
                return Err(DefinitionError::Cycle { flow: def.kind.to_string(), state: id.to_string() });
            }
            if let Some(step) = def.step(id) {
                path.push(id);
                for next in successors(step) {
                    visit(def, next, path, done)?;
                }
                path.pop();
            }
            done.insert(id);
            Ok(())
        }

        visit(self, self.initial, &mut Vec::new(), &mut HashSet::new())
    }
}

fn successors(step: &StepSpec) -> Vec<StateId> {
    let mut out = match step.next {
        Next::Goto(id) | Next::Finish(id) => vec![id],
        Next::Branch { targets, .. } => targets.to_vec(),
    };
    if let Some(EntryEffect::Breathing { resume }) = step.on_enter {
        out.push(resume);
    }
    out
}

/// All guided flows, keyed by kind. SupportChat has no table.
pub struct FlowRegistry {
    flows: HashMap<FlowKind, FlowDefinition>,
}

impl FlowRegistry {
    pub fn new(definitions: Vec<FlowDefinition>) -> Result<Self, DefinitionError> {
        let mut flows = HashMap::new();
        for def in definitions {
            def.validate()?;
            flows.insert(def.kind, def);
        }
        Ok(Self { flows })
    }

    pub fn standard() -> Result<Self, DefinitionError> {
        Self::new(vec![
            quick::definition(),
            full::definition(),
            venting::definition(),
            panic::definition(),
        ])
    }

    pub fn get(&self, kind: FlowKind) -> Option<&FlowDefinition> {
        self.flows.get(&kind)
    }
}

/// Shared step for the two check-in flows.
pub(crate) fn rating_step(id: StateId, next: Next) -> StepSpec {
    StepSpec {
        id,
        prompt: PromptSpec::Dynamic(|_, config| {
            format!(
                "How strong is the anxiety right now, from {} (calm) to {} (overwhelming)?",
                config.rating_min, config.rating_max
            )
        }),
        input: InputShape::Rating,
        field: Some("distress_rating"),
        next,
        on_enter: None,
    }
}
