//! Cancellable timed message sequences (the breathing exercise).
//!
//! A sequence runs as its own task. Every emission happens under the owning
//! user's slot lock after re-checking the cancellation token, so once the
//! engine has cancelled a sequence while holding that lock nothing more is
//! sent. Natural completion and early stop race for a one-shot settle flag;
//! whichever wins moves the session to the resume state.

use protocol::{Choice, OutboundAction};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{BreathingPattern, FlowConfig};
use crate::flows::FlowRegistry;
use crate::ports::OutboundPort;
use crate::session::{Session, SessionStore, StateId};

/// Pause between the intro prompt and the first timed message.
pub const LEAD_IN: Duration = Duration::from_secs(1);

/// A message sent after waiting `delay`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimedStep {
    pub delay: Duration,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimedSequence {
    pub steps: Vec<TimedStep>,
    /// Wait after the last message before the sequence counts as complete.
    pub tail: Duration,
    /// Buttons attached to every message, e.g. an early stop.
    pub choices: Vec<Choice>,
}

impl TimedSequence {
    pub fn breathing(pattern: &BreathingPattern, choices: Vec<Choice>) -> Self {
        let mut steps = Vec::new();
        let mut delay = LEAD_IN;
        for cycle in 1..=pattern.cycles {
            let phases = [
                ("Breathe in", pattern.inhale),
                ("Hold", pattern.hold),
                ("Breathe out", pattern.exhale),
            ];
            for (label, length) in phases {
                steps.push(TimedStep {
                    delay,
                    text: format!("{}: {} s ({}/{})", label, length.as_secs(), cycle, pattern.cycles),
                });
                delay = length;
            }
        }
        Self { steps, tail: delay, choices }
    }

    pub fn total(&self) -> Duration {
        self.steps.iter().map(|s| s.delay).sum::<Duration>() + self.tail
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceOutcome {
    /// Ran to the end and moved the session on.
    Completed,
    /// Stopped by its token.
    Cancelled,
    /// The session it belonged to is gone or runs a different sequence.
    Orphaned,
}

/// Shared handle to a running sequence, stored in the session.
#[derive(Clone)]
pub struct SequenceHandle {
    id: Uuid,
    token: CancellationToken,
    settled: Arc<AtomicBool>,
    task: Arc<Mutex<Option<JoinHandle<SequenceOutcome>>>>,
}

impl fmt::Debug for SequenceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SequenceHandle")
            .field("id", &self.id)
            .field("cancelled", &self.token.is_cancelled())
            .field("settled", &self.is_settled())
            .finish()
    }
}

impl SequenceHandle {
    fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            token: CancellationToken::new(),
            settled: Arc::new(AtomicBool::new(false)),
            task: Arc::new(Mutex::new(None)),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Stop the sequence. Returns true if this call settled it, false if it had
    /// already completed or been cancelled.
    pub fn cancel(&self) -> bool {
        let won = self.try_settle();
        self.token.cancel();
        won
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn is_settled(&self) -> bool {
        self.settled.load(Ordering::Acquire)
    }

    fn try_settle(&self) -> bool {
        self.settled
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Wait for the task to finish. `None` if it was already joined.
    pub async fn join(&self) -> Option<SequenceOutcome> {
        let task = self.task.lock().unwrap_or_else(|p| p.into_inner()).take()?;
        match task.await {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                warn!(sequence = %self.id, "timed sequence task failed: {}", e);
                None
            }
        }
    }

    fn owned_by(&self, session: &Session) -> bool {
        session.metadata.timed.as_ref().map(|h| h.id) == Some(self.id)
    }
}

/// Spawns timed sequences and performs their completion transition.
pub struct TimedRunner<O> {
    store: Arc<SessionStore>,
    flows: Arc<FlowRegistry>,
    config: Arc<FlowConfig>,
    outbound: Arc<O>,
}

impl<O> Clone for TimedRunner<O> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            flows: self.flows.clone(),
            config: self.config.clone(),
            outbound: self.outbound.clone(),
        }
    }
}

impl<O: OutboundPort + 'static> TimedRunner<O> {
    pub fn new(
        store: Arc<SessionStore>,
        flows: Arc<FlowRegistry>,
        config: Arc<FlowConfig>,
        outbound: Arc<O>,
    ) -> Self {
        Self { store, flows, config, outbound }
    }

    /// Spawn `sequence` for `user_id`. The caller must store the returned
    /// handle in the user's session before releasing the slot lock, otherwise
    /// the task finds itself orphaned and exits without sending anything.
    pub fn start(&self, user_id: &str, sequence: TimedSequence, resume: StateId) -> SequenceHandle {
        let handle = SequenceHandle::new();
        debug!(user_id, sequence = %handle.id, total_secs = sequence.total().as_secs(), "starting timed sequence");
        let task = tokio::spawn(self.clone().run(user_id.to_string(), handle.clone(), sequence, resume));
        *handle.task.lock().unwrap_or_else(|p| p.into_inner()) = Some(task);
        handle
    }

    async fn run(
        self,
        user_id: String,
        handle: SequenceHandle,
        sequence: TimedSequence,
        resume: StateId,
    ) -> SequenceOutcome {
        for step in &sequence.steps {
            if !self.wait(&handle, step.delay).await {
                return SequenceOutcome::Cancelled;
            }
            let mut slot = self.store.lock(&user_id).await;
            if handle.is_cancelled() {
                return SequenceOutcome::Cancelled;
            }
            let Some(session) = slot.as_mut().filter(|s| handle.owned_by(s)) else {
                return SequenceOutcome::Orphaned;
            };
            // A running exercise counts as activity for idle expiry.
            session.touch();
            let action = OutboundAction::prompt(step.text.clone()).with_choices(sequence.choices.clone());
            if let Err(e) = self.outbound.send(&user_id, action).await {
                warn!(user_id = %user_id, "failed to send timed message: {}", e);
            }
        }

        if !self.wait(&handle, sequence.tail).await {
            return SequenceOutcome::Cancelled;
        }
        self.complete(&user_id, &handle, resume).await
    }

    /// Sleep for `delay` unless cancelled first. Returns false on cancellation.
    async fn wait(&self, handle: &SequenceHandle, delay: Duration) -> bool {
        tokio::select! {
            _ = handle.token.cancelled() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }

    async fn complete(&self, user_id: &str, handle: &SequenceHandle, resume: StateId) -> SequenceOutcome {
        let mut slot = self.store.lock(user_id).await;
        if handle.is_cancelled() {
            return SequenceOutcome::Cancelled;
        }
        let Some(session) = slot.as_mut().filter(|s| handle.owned_by(s)) else {
            return SequenceOutcome::Orphaned;
        };
        if !handle.try_settle() {
            return SequenceOutcome::Cancelled;
        }

        session.metadata.timed = None;
        session.state = resume;
        session.touch();

        let action = self
            .flows
            .get(session.flow)
            .and_then(|def| def.step(resume).map(|step| def.render(step, session, &self.config)));
        match action {
            Some(action) => {
                info!(user_id, flow = %session.flow, state = %resume, "timed sequence completed");
                if let Err(e) = self.outbound.send(user_id, action).await {
                    warn!(user_id, "failed to send prompt after timed sequence: {}", e);
                }
            }
            None => warn!(user_id, state = %resume, "resume state is not a step of {}", session.flow),
        }
        SequenceOutcome::Completed
    }
}
