use calmline_core::flows::{panic, FlowRegistry};
use calmline_core::mocks::*;
use calmline_core::{FlowConfig, FlowEngine, FlowKind, FlowSignal, Handled};
use protocol::{ActionKind, Event};

type TestEngine = FlowEngine<InMemoryRepository, ScriptedResponder, NullOutbound>;

fn engine_with(config: FlowConfig) -> (TestEngine, InMemoryRepository) {
    let repo = InMemoryRepository::new();
    let engine = FlowEngine::with_config(
        config,
        FlowRegistry::standard().unwrap(),
        repo.clone(),
        ScriptedResponder::new(),
        NullOutbound,
    );
    (engine, repo)
}

async fn send(engine: &TestEngine, event: Event) -> Handled {
    engine.handle_event(&event).await.unwrap()
}

#[tokio::test]
async fn rating_drop_and_low_threshold_scenario() {
    let (engine, repo) = engine_with(FlowConfig::default());
    send(&engine, Event::text("u", "/panic")).await;

    let technique = send(&engine, Event::button("u", "panic:no")).await;
    assert!(technique.action.text.contains("cold water on your face"));
    assert!(technique.action.has_choice("panic:done"));
    send(&engine, Event::button("u", "panic:done")).await;

    // Baseline: technique A, no attempt spent.
    let a = send(&engine, Event::text("u", "9")).await;
    assert!(a.action.text.contains("steps of seven"));
    let s = engine.session("u").await.unwrap();
    assert_eq!(s.state, panic::TECHNIQUE);
    assert_eq!(s.metadata.panic.attempts, 0);
    send(&engine, Event::button("u", "panic:done")).await;

    // Drop of one: attempt spent, technique B which is not A.
    let b = send(&engine, Event::text("u", "8")).await;
    assert!(b.action.text.contains("thumb"));
    let s = engine.session("u").await.unwrap();
    assert_eq!(s.metadata.panic.attempts, 1);
    assert_eq!(s.metadata.panic.current, Some("pressure_point"));
    send(&engine, Event::button("u", "panic:done")).await;

    // Low threshold reached: decision node, attempts untouched.
    let offer = send(&engine, Event::text("u", "3")).await;
    assert!(offer.action.has_choice("panic:enough"));
    assert!(offer.action.has_choice("panic:more"));
    let s = engine.session("u").await.unwrap();
    assert_eq!(s.state, panic::OFFER_MORE);
    assert_eq!(s.metadata.panic.attempts, 1);

    let done = send(&engine, Event::button("u", "panic:enough")).await;
    assert_eq!(done.action.kind, ActionKind::Completion);
    assert_eq!(done.signal, None);

    let record = repo.records().pop().unwrap();
    assert_eq!(record.flow, FlowKind::PanicFlow);
    let mut fields = record.answers.fields();
    fields.sort();
    let mut expected = panic::FIELDS.to_vec();
    expected.sort();
    assert_eq!(fields, expected);
    assert_eq!(record.answers.integer("initial_rating"), Some(9));
    assert_eq!(record.answers.integer("latest_rating"), Some(3));
    assert_eq!(record.answers.text("outcome"), Some("calm"));
    assert_eq!(
        record.answers.get("techniques_offered").map(|v| v.to_string()),
        Some("cold_water, countdown, pressure_point".to_string())
    );
}

#[tokio::test]
async fn big_drop_goes_to_decision_node() {
    let (engine, _) = engine_with(FlowConfig::default());
    send(&engine, Event::text("u", "/panic")).await;
    send(&engine, Event::button("u", "panic:no")).await;
    send(&engine, Event::button("u", "panic:done")).await;
    send(&engine, Event::text("u", "9")).await;
    send(&engine, Event::button("u", "panic:done")).await;

    send(&engine, Event::text("u", "7")).await;
    let s = engine.session("u").await.unwrap();
    assert_eq!(s.state, panic::OFFER_MORE);
    assert_eq!(s.metadata.panic.attempts, 0);
}

#[tokio::test]
async fn cap_forces_exhausted_terminal() {
    let (engine, repo) = engine_with(FlowConfig::default());
    send(&engine, Event::text("u", "/panic")).await;
    send(&engine, Event::button("u", "panic:no")).await;

    let mut last = None;
    for _ in 0..3 {
        send(&engine, Event::button("u", "panic:done")).await;
        last = Some(send(&engine, Event::text("u", "9")).await);
    }
    let last = last.unwrap();
    assert_eq!(last.signal, Some(FlowSignal::AttemptsExhausted));
    assert_eq!(last.action.kind, ActionKind::Completion);
    assert!(last.action.text.contains("/support"));
    assert!(engine.session("u").await.is_none());

    let record = repo.records().pop().unwrap();
    assert_eq!(record.answers.text("outcome"), Some("exhausted"));
}

/// Drive a panic session to its end, answering every question automatically.
/// Returns how many techniques were offered.
async fn drive(engine: &TestEngine, accept_breathing: bool, ratings: &[u8]) -> usize {
    let mut next_rating = ratings.iter().cycle();
    send(engine, Event::text("u", "/panic")).await;
    for _ in 0..100 {
        let Some(session) = engine.session("u").await else {
            let records = engine.repository().records();
            let offered = records.last().and_then(|r| r.answers.get("techniques_offered")).cloned();
            return match offered {
                Some(calmline_core::AnswerValue::List(items)) => items.len(),
                _ => 0,
            };
        };
        let event = match session.state {
            panic::ASK_BREATHING if accept_breathing => Event::button("u", "panic:yes"),
            panic::ASK_BREATHING => Event::button("u", "panic:no"),
            panic::BREATHING => Event::button("u", "panic:stop"),
            panic::TECHNIQUE => Event::button("u", "panic:done"),
            panic::RATING => Event::text("u", next_rating.next().unwrap().to_string()),
            panic::OFFER_MORE => Event::button("u", "panic:more"),
            other => panic!("unexpected state {}", other),
        };
        send(engine, event).await;
    }
    panic!("panic flow did not terminate");
}

#[tokio::test]
async fn terminates_within_cap_plus_one_offers() {
    let sequences: &[&[u8]] = &[
        &[9],
        &[10, 9, 8, 7],
        &[2],
        &[9, 5, 9, 5],
        &[5, 6, 7, 8, 9, 10],
        &[0, 10],
    ];
    for cap in 1..=4 {
        for ratings in sequences {
            for accept in [true, false] {
                let config = FlowConfig { attempt_cap: cap, ..FlowConfig::default() };
                let (engine, _) = engine_with(config);
                let offered = drive(&engine, accept, ratings).await;
                assert!(
                    offered <= cap as usize + 1,
                    "cap {} ratings {:?} breathing {}: {} offers",
                    cap,
                    ratings,
                    accept,
                    offered
                );
            }
        }
    }
}
