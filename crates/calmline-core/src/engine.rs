use chrono::{DateTime, Utc};
use protocol::{Choice, Event, OutboundAction};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::FlowConfig;
use crate::error::{DefinitionError, FlowError, FlowResult, ValidationError};
use crate::flows::{EntryEffect, FlowDefinition, FlowRegistry, InputShape, Next, StepSpec, Transition};
use crate::interrupt::{self, Command, Resolution};
use crate::ports::{CheckInRepository, OutboundPort, Responder};
use crate::recommend;
use crate::session::{AnswerValue, FlowKind, Session, SessionStore, StateId};
use crate::support::Transcript;
use crate::timed::{TimedRunner, TimedSequence};

/// State a support chat session sits in for its whole life.
pub const SUPPORT_STATE: StateId = StateId("chatting");

const MENU_TEXT: &str = "What would you like to do?";
const OFF_TOPIC: &str = "Please answer the current question first, or send /cancel to stop.";
const SUPPORT_GREETING: &str =
    "I'm here to listen. Tell me what's on your mind. Send /cancel whenever you want to stop.";

/// Expected outcomes that are not errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowSignal {
    /// Input did not fit the current state; the user was re-prompted.
    Validation,
    /// No session and no entry trigger; the idle menu was shown.
    NoActiveSession,
    /// The running session was discarded for a newly requested flow.
    SessionSuperseded,
    /// The user cancelled the running session.
    Cancelled,
    /// Panic flow ran out of attempts.
    AttemptsExhausted,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Handled {
    pub action: OutboundAction,
    pub signal: Option<FlowSignal>,
}

impl Handled {
    fn plain(action: OutboundAction) -> Self {
        Self { action, signal: None }
    }

    fn signalled(action: OutboundAction, signal: FlowSignal) -> Self {
        Self { action, signal: Some(signal) }
    }
}

/// The idle menu: one button per flow.
pub fn menu() -> OutboundAction {
    OutboundAction::prompt(MENU_TEXT).with_choices(
        FlowKind::ALL
            .iter()
            .map(|k| Choice::new(k.menu_id(), k.menu_label()))
            .collect(),
    )
}

fn support_choices() -> Vec<Choice> {
    vec![Choice::new("menu:cancel", "End chat")]
}

/// Prefix a rendered prompt with a hint, keeping its buttons.
fn with_hint(hint: &str, prompt: OutboundAction, rejection: bool) -> OutboundAction {
    let text = format!("{}\n\n{}", hint, prompt.text);
    let action = if rejection { OutboundAction::rejection(text) } else { OutboundAction::prompt(text) };
    action.with_choices(prompt.choices.unwrap_or_default())
}

/// Drives guided flows for every user.
///
/// All work for one event happens while holding that user's session slot, so
/// events for the same user never interleave and events for different users
/// never wait on each other.
pub struct FlowEngine<R, S, O> {
    store: Arc<SessionStore>,
    flows: Arc<FlowRegistry>,
    config: Arc<FlowConfig>,
    repository: R,
    responder: S,
    runner: TimedRunner<O>,
}

impl<R, S, O> FlowEngine<R, S, O>
where
    R: CheckInRepository,
    S: Responder,
    O: OutboundPort + 'static,
{
    pub fn new(repository: R, responder: S, outbound: O) -> Result<Self, DefinitionError> {
        Ok(Self::with_config(
            FlowConfig::default(),
            FlowRegistry::standard()?,
            repository,
            responder,
            outbound,
        ))
    }

    pub fn with_config(
        config: FlowConfig,
        flows: FlowRegistry,
        repository: R,
        responder: S,
        outbound: O,
    ) -> Self {
        let store = Arc::new(SessionStore::new());
        let flows = Arc::new(flows);
        let config = Arc::new(config);
        let runner = TimedRunner::new(store.clone(), flows.clone(), config.clone(), Arc::new(outbound));
        Self { store, flows, config, repository, responder, runner }
    }

    pub fn config(&self) -> &FlowConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }

    /// Snapshot of a user's active session.
    pub async fn session(&self, user_id: &str) -> Option<Session> {
        self.store.get(user_id).await
    }

    pub async fn handle(&self, event: &Event) -> FlowResult<OutboundAction> {
        self.handle_event(event).await.map(|h| h.action)
    }

    pub async fn handle_event(&self, event: &Event) -> FlowResult<Handled> {
        let user_id = event.user_id.as_str();
        let mut slot = self.store.lock(user_id).await;

        let Some(mut session) = slot.take() else {
            return self.handle_idle(&mut slot, event);
        };

        let expected = match self.expected_input(&session) {
            Ok(shape) => shape,
            Err(e) => {
                warn!(user_id, flow = %session.flow, state = %session.state, "dropping broken session: {}", e);
                session.cancel_timed();
                return Err(e);
            }
        };

        match interrupt::resolve(event, session.flow, &expected) {
            Resolution::Abort { then } => {
                session.cancel_timed();
                match then {
                    Some(kind) => {
                        info!(user_id, from = %session.flow, to = %kind, "flow superseded");
                        self.start(&mut slot, user_id, kind, Some(FlowSignal::SessionSuperseded))
                    }
                    None => {
                        info!(user_id, flow = %session.flow, state = %session.state, "flow cancelled");
                        Ok(Handled::signalled(menu(), FlowSignal::Cancelled))
                    }
                }
            }
            Resolution::Reject => {
                debug!(user_id, flow = %session.flow, state = %session.state, "off-topic event rejected");
                let action = self.rejection(&session)?;
                *slot = Some(session);
                Ok(Handled::plain(action))
            }
            Resolution::Continue if session.flow == FlowKind::SupportChat => {
                self.support_turn(&mut slot, session, event).await
            }
            Resolution::Continue => self.advance(&mut slot, session, event).await,
        }
    }

    fn handle_idle(&self, slot: &mut Option<Session>, event: &Event) -> FlowResult<Handled> {
        match Command::parse(event) {
            Some(Command::Start(kind)) => self.start(slot, &event.user_id, kind, None),
            _ => Ok(Handled::signalled(menu(), FlowSignal::NoActiveSession)),
        }
    }

    fn definition(&self, kind: FlowKind) -> FlowResult<&FlowDefinition> {
        self.flows.get(kind).ok_or_else(|| FlowError::UnknownFlow(kind.to_string()))
    }

    fn current_step(&self, session: &Session) -> FlowResult<(&FlowDefinition, &StepSpec)> {
        let def = self.definition(session.flow)?;
        let step = def.step(session.state).ok_or_else(|| FlowError::UnknownState {
            flow: session.flow.to_string(),
            state: session.state.to_string(),
        })?;
        Ok((def, step))
    }

    fn expected_input(&self, session: &Session) -> FlowResult<InputShape> {
        if session.flow == FlowKind::SupportChat {
            return Ok(InputShape::FreeText);
        }
        self.current_step(session).map(|(_, step)| step.input)
    }

    fn rejection(&self, session: &Session) -> FlowResult<OutboundAction> {
        if session.flow == FlowKind::SupportChat {
            return Ok(OutboundAction::rejection(OFF_TOPIC).with_choices(support_choices()));
        }
        let (def, step) = self.current_step(session)?;
        Ok(with_hint(OFF_TOPIC, def.render(step, session, &self.config), true))
    }

    fn start(
        &self,
        slot: &mut Option<Session>,
        user_id: &str,
        kind: FlowKind,
        signal: Option<FlowSignal>,
    ) -> FlowResult<Handled> {
        if kind == FlowKind::SupportChat {
            let mut session = Session::new(user_id, kind, SUPPORT_STATE);
            session.metadata.transcript = Transcript::with_limit(self.config.transcript_limit);
            *slot = Some(session);
            info!(user_id, flow = %kind, "flow started");
            let action = OutboundAction::prompt(SUPPORT_GREETING).with_choices(support_choices());
            return Ok(Handled { action, signal });
        }

        let def = self.definition(kind)?;
        let step = def.step(def.initial).ok_or_else(|| FlowError::UnknownState {
            flow: kind.to_string(),
            state: def.initial.to_string(),
        })?;
        let mut session = Session::new(user_id, kind, def.initial);
        self.enter(&mut session, step);
        let action = def.render(step, &session, &self.config);
        *slot = Some(session);
        info!(user_id, flow = %kind, state = %def.initial, "flow started");
        Ok(Handled { action, signal })
    }

    /// Run a step's entry effect. Must be called with the user's slot locked.
    fn enter(&self, session: &mut Session, step: &StepSpec) {
        if let Some(EntryEffect::Breathing { resume }) = step.on_enter {
            let sequence = TimedSequence::breathing(&self.config.breathing, step.input.choices(&self.config));
            let handle = self.runner.start(&session.user_id, sequence, resume);
            session.metadata.timed = Some(handle);
        }
    }

    async fn advance(&self, slot: &mut Option<Session>, mut session: Session, event: &Event) -> FlowResult<Handled> {
        let (def, step) = self.current_step(&session)?;
        let value = match step.input.parse(&event.payload, &self.config) {
            Ok(value) => value,
            Err(err) => {
                debug!(user_id = %session.user_id, state = %session.state, "invalid input: {}", err);
                let action = self.reprompt(def, step, &session, &err);
                *slot = Some(session);
                return Ok(Handled::signalled(action, FlowSignal::Validation));
            }
        };

        let snapshot = session.clone();
        if let Some(field) = step.field {
            session.answers.insert(field, value.clone());
        }
        session.touch();

        if step.on_enter.is_some() && session.cancel_timed() {
            debug!(user_id = %session.user_id, state = %session.state, "timed sequence stopped early");
        }

        let transition = match step.next {
            Next::Goto(next) => Transition::Advance(next),
            Next::Finish(terminal) => Transition::Finish(terminal),
            Next::Branch { select, .. } => select(&value, &mut session, &self.config),
        };

        match transition {
            Transition::Advance(next) if !def.is_terminal(next) => {
                let next_step = def.step(next).ok_or_else(|| FlowError::UnknownState {
                    flow: session.flow.to_string(),
                    state: next.to_string(),
                })?;
                debug!(user_id = %session.user_id, from = %session.state, to = %next, "advancing");
                session.state = next;
                self.enter(&mut session, next_step);
                let action = def.render(next_step, &session, &self.config);
                *slot = Some(session);
                Ok(Handled::plain(action))
            }
            Transition::Advance(terminal) | Transition::Finish(terminal) => {
                self.finish(slot, session, snapshot, def, terminal).await
            }
        }
    }

    fn reprompt(&self, def: &FlowDefinition, step: &StepSpec, session: &Session, err: &ValidationError) -> OutboundAction {
        with_hint(&err.to_string(), def.render(step, session, &self.config), false)
    }

    async fn finish(
        &self,
        slot: &mut Option<Session>,
        mut session: Session,
        snapshot: Session,
        def: &FlowDefinition,
        id: StateId,
    ) -> FlowResult<Handled> {
        let terminal = def.terminal(id).ok_or_else(|| FlowError::UnknownState {
            flow: session.flow.to_string(),
            state: id.to_string(),
        })?;
        if let Some(field) = terminal.outcome_field {
            session.answers.insert(field, AnswerValue::Choice(id.as_str().to_string()));
        }
        session.state = id;
        session.cancel_timed();

        let record = recommend::commit(&session, &self.config);
        if (terminal.persist)(&record.answers) {
            if let Err(err) = self.repository.save(&record).await {
                warn!(user_id = %session.user_id, flow = %session.flow, "save failed, keeping session: {}", err);
                *slot = Some(snapshot);
                return Err(FlowError::Storage(err));
            }
        } else {
            debug!(user_id = %session.user_id, flow = %session.flow, "record not persisted by policy");
        }

        info!(user_id = %session.user_id, flow = %session.flow, outcome = %id, "flow completed");
        let action = OutboundAction::completion(record.recommendation).with_choices(menu().choices.unwrap_or_default());
        let signal = terminal.exhausted.then_some(FlowSignal::AttemptsExhausted);
        Ok(Handled { action, signal })
    }

    async fn support_turn(&self, slot: &mut Option<Session>, mut session: Session, event: &Event) -> FlowResult<Handled> {
        let text = match InputShape::FreeText.parse(&event.payload, &self.config) {
            Ok(value) => value.to_string(),
            Err(err) => {
                let action = OutboundAction::prompt(err.to_string()).with_choices(support_choices());
                *slot = Some(session);
                return Ok(Handled::signalled(action, FlowSignal::Validation));
            }
        };

        // Pushing may evict the oldest turn, so a failed reply restores the whole transcript.
        let previous = session.metadata.transcript.clone();
        session.touch();
        session.metadata.transcript.push_user(text);
        let reply = self.responder.respond(session.metadata.transcript.entries()).await;
        match reply {
            Ok(reply) => {
                session.metadata.transcript.push_assistant(reply.clone());
                *slot = Some(session);
                Ok(Handled::plain(OutboundAction::prompt(reply).with_choices(support_choices())))
            }
            Err(err) => {
                warn!(user_id = %session.user_id, "responder failed: {:#}", err);
                session.metadata.transcript = previous;
                *slot = Some(session);
                Err(FlowError::Responder(err))
            }
        }
    }

    /// Drop sessions idle past the configured limit. No-op without a limit.
    pub fn sweep_idle(&self, now: DateTime<Utc>) -> Vec<Session> {
        let Some(max_idle) = self.config.session_idle else {
            return Vec::new();
        };
        let mut expired = self.store.sweep_idle(now, max_idle);
        for session in &mut expired {
            session.cancel_timed();
            info!(user_id = %session.user_id, flow = %session.flow, state = %session.state, "idle session expired");
        }
        expired
    }
}
