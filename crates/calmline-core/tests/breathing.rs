use calmline_core::flows::panic;
use calmline_core::mocks::*;
use calmline_core::timed::{SequenceOutcome, LEAD_IN};
use calmline_core::{BreathingPattern, FlowConfig, FlowEngine, FlowRegistry};
use chrono::Utc;
use protocol::{ActionKind, Event, OutboundAction};
use std::time::Duration;
use tokio::sync::mpsc;

type TestEngine = FlowEngine<InMemoryRepository, ScriptedResponder, ChannelOutbound>;

fn engine() -> (TestEngine, mpsc::Receiver<(String, OutboundAction)>) {
    let (tx, rx) = mpsc::channel(128);
    let engine = FlowEngine::new(InMemoryRepository::new(), ScriptedResponder::new(), ChannelOutbound(tx)).unwrap();
    (engine, rx)
}

fn engine_with_idle(idle: Duration) -> (TestEngine, mpsc::Receiver<(String, OutboundAction)>) {
    let (tx, rx) = mpsc::channel(128);
    let config = FlowConfig { session_idle: Some(idle), ..FlowConfig::default() };
    let engine = FlowEngine::with_config(
        config,
        FlowRegistry::standard().unwrap(),
        InMemoryRepository::new(),
        ScriptedResponder::new(),
        ChannelOutbound(tx),
    );
    (engine, rx)
}

fn drain(rx: &mut mpsc::Receiver<(String, OutboundAction)>) -> Vec<OutboundAction> {
    let mut out = Vec::new();
    while let Ok((_, action)) = rx.try_recv() {
        out.push(action);
    }
    out
}

fn is_rating_prompt(action: &OutboundAction) -> bool {
    action.kind == ActionKind::Prompt && action.has_choice("rating:5")
}

async fn start_breathing(engine: &TestEngine) -> OutboundAction {
    engine.handle(&Event::text("u", "/panic")).await.unwrap();
    engine.handle(&Event::button("u", "panic:yes")).await.unwrap()
}

#[tokio::test(start_paused = true)]
async fn natural_completion_moves_to_rating_once() {
    let (engine, mut rx) = engine();
    let intro = start_breathing(&engine).await;
    assert!(intro.has_choice("panic:stop"));

    let session = engine.session("u").await.unwrap();
    assert_eq!(session.state, panic::BREATHING);
    let handle = session.metadata.timed.expect("sequence running");

    assert_eq!(handle.join().await, Some(SequenceOutcome::Completed));

    let sent = drain(&mut rx);
    assert_eq!(sent.len(), 10, "nine breathing messages and the rating prompt");
    assert!(sent[..9].iter().all(|a| a.has_choice("panic:stop")));
    assert!(sent[0].text.starts_with("Breathe in"));
    assert!(sent[8].text.starts_with("Breathe out"));
    assert!(is_rating_prompt(&sent[9]));

    let session = engine.session("u").await.unwrap();
    assert_eq!(session.state, panic::RATING);
    assert!(session.metadata.timed.is_none());

    // Nothing else trickles in later.
    tokio::time::sleep(Duration::from_secs(120)).await;
    assert!(drain(&mut rx).is_empty());
}

#[tokio::test(start_paused = true)]
async fn early_stop_suppresses_remaining_messages() {
    let (engine, mut rx) = engine();
    start_breathing(&engine).await;
    let handle = engine.session("u").await.unwrap().metadata.timed.unwrap();

    // Lead-in plus one inhale: two messages out.
    let pattern = BreathingPattern::default();
    tokio::time::sleep(LEAD_IN + pattern.inhale + Duration::from_millis(500)).await;

    let stopped = engine.handle(&Event::button("u", "panic:stop")).await.unwrap();
    assert!(is_rating_prompt(&stopped));
    assert_eq!(handle.join().await, Some(SequenceOutcome::Cancelled));

    tokio::time::sleep(pattern.total() * 2).await;
    let sent = drain(&mut rx);
    assert_eq!(sent.len(), 2);
    assert!(!sent.iter().any(is_rating_prompt));

    let session = engine.session("u").await.unwrap();
    assert_eq!(session.state, panic::RATING);
    assert!(session.metadata.timed.is_none());
}

#[tokio::test(start_paused = true)]
async fn stop_racing_completion_reaches_rating_exactly_once() {
    let pattern = BreathingPattern::default();
    let end = LEAD_IN + pattern.total();
    let offsets = [
        end - Duration::from_millis(1),
        end,
        end + Duration::from_millis(1),
    ];
    for offset in offsets {
        let (engine, mut rx) = engine();
        start_breathing(&engine).await;
        let handle = engine.session("u").await.unwrap().metadata.timed.unwrap();

        tokio::time::sleep(offset).await;
        let reply = engine.handle(&Event::button("u", "panic:stop")).await.unwrap();
        let outcome = handle.join().await;
        tokio::time::sleep(Duration::from_secs(60)).await;

        let from_runner = drain(&mut rx).iter().filter(|a| is_rating_prompt(a)).count();
        let from_stop = usize::from(is_rating_prompt(&reply));
        assert_eq!(from_runner + from_stop, 1, "offset {:?}", offset);
        match outcome {
            Some(SequenceOutcome::Completed) => {
                assert_eq!(from_runner, 1);
                assert_eq!(reply.kind, ActionKind::Rejection);
            }
            Some(SequenceOutcome::Cancelled) => assert_eq!(from_stop, 1),
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(engine.session("u").await.unwrap().state, panic::RATING);
    }
}

#[tokio::test(start_paused = true)]
async fn superseded_breathing_goes_quiet() {
    let (engine, mut rx) = engine();
    start_breathing(&engine).await;
    let first = engine.session("u").await.unwrap().metadata.timed.unwrap();
    tokio::time::sleep(Duration::from_secs(3)).await;

    engine.handle(&Event::text("u", "/quick")).await.unwrap();
    assert_eq!(first.join().await, Some(SequenceOutcome::Cancelled));

    let before = drain(&mut rx).len();
    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(before, 1);
    assert!(drain(&mut rx).is_empty());
    assert_eq!(engine.session("u").await.unwrap().state.as_str(), "description");
}

#[tokio::test(start_paused = true)]
async fn idle_sweep_cancels_running_breathing() {
    let (engine, mut rx) = engine_with_idle(Duration::from_secs(60));
    start_breathing(&engine).await;
    let handle = engine.session("u").await.unwrap().metadata.timed.unwrap();

    let expired = engine.sweep_idle(Utc::now() + chrono::Duration::hours(1));
    assert_eq!(expired.len(), 1);
    assert_eq!(expired[0].state, panic::BREATHING);
    assert_eq!(handle.join().await, Some(SequenceOutcome::Cancelled));
    assert!(engine.session("u").await.is_none());

    tokio::time::sleep(Duration::from_secs(120)).await;
    assert!(drain(&mut rx).is_empty());
}

#[tokio::test(start_paused = true)]
async fn breathing_counts_as_activity() {
    let (engine, mut rx) = engine_with_idle(Duration::from_secs(60));
    start_breathing(&engine).await;
    // Last user input an hour ago; only the exercise itself is active.
    if let Some(session) = engine.store().lock("u").await.as_mut() {
        session.last_activity = Utc::now() - chrono::Duration::hours(1);
    }

    tokio::time::sleep(LEAD_IN + Duration::from_millis(100)).await;
    assert_eq!(drain(&mut rx).len(), 1);

    assert!(engine.sweep_idle(Utc::now()).is_empty());
    assert_eq!(engine.session("u").await.unwrap().state, panic::BREATHING);
}
