use calmline_core::flows::FlowRegistry;
use calmline_core::mocks::*;
use calmline_core::support::Role;
use calmline_core::usage::QuotaResponder;
use calmline_core::{FlowConfig, FlowEngine, FlowError, FlowKind, FlowSignal, ResponderQuota};
use protocol::{ActionKind, Event};

#[tokio::test]
async fn chat_forwards_transcript_each_turn() {
    let responder = ScriptedResponder::new().reply("That sounds exhausting.").reply("I'm glad you said it.");
    let engine = FlowEngine::new(InMemoryRepository::new(), responder.clone(), NullOutbound).unwrap();

    let greeting = engine.handle(&Event::button("u", "menu:support")).await.unwrap();
    assert_eq!(greeting.kind, ActionKind::Prompt);
    assert!(greeting.has_choice("menu:cancel"));

    let first = engine.handle(&Event::text("u", "work has been brutal")).await.unwrap();
    assert_eq!(first.text, "That sounds exhausting.");
    let second = engine.handle(&Event::text("u", "and I can't switch off")).await.unwrap();
    assert_eq!(second.text, "I'm glad you said it.");

    let seen = responder.transcripts();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0].len(), 1);
    assert_eq!(seen[1].len(), 3);
    assert_eq!(seen[1][1].role, Role::Assistant);
    assert_eq!(seen[1][2].text, "and I can't switch off");

    let session = engine.session("u").await.unwrap();
    assert_eq!(session.flow, FlowKind::SupportChat);
    assert_eq!(session.metadata.transcript.len(), 4);
}

#[tokio::test]
async fn responder_failure_keeps_session_without_the_turn() {
    let responder = ScriptedResponder::new().reply("hello").fail("upstream timeout");
    let engine = FlowEngine::new(InMemoryRepository::new(), responder, NullOutbound).unwrap();
    engine.handle(&Event::text("u", "/support")).await.unwrap();
    engine.handle(&Event::text("u", "hi")).await.unwrap();

    let err = engine.handle(&Event::text("u", "are you there?")).await.unwrap_err();
    assert!(matches!(err, FlowError::Responder(_)));

    let session = engine.session("u").await.unwrap();
    assert_eq!(session.metadata.transcript.len(), 2);
    assert!(session.metadata.transcript.iter().all(|e| e.text != "are you there?"));
}

#[tokio::test]
async fn failed_reply_on_full_transcript_keeps_history() {
    let config = FlowConfig { transcript_limit: 2, ..FlowConfig::default() };
    let responder = ScriptedResponder::new().reply("r1").fail("upstream timeout");
    let engine = FlowEngine::with_config(
        config,
        FlowRegistry::standard().unwrap(),
        InMemoryRepository::new(),
        responder,
        NullOutbound,
    );
    engine.handle(&Event::text("u", "/support")).await.unwrap();
    engine.handle(&Event::text("u", "a")).await.unwrap();

    let texts = |session: calmline_core::Session| -> Vec<String> {
        session.metadata.transcript.iter().map(|e| e.text.clone()).collect()
    };
    assert_eq!(texts(engine.session("u").await.unwrap()), vec!["a", "r1"]);

    let err = engine.handle(&Event::text("u", "b")).await.unwrap_err();
    assert!(matches!(err, FlowError::Responder(_)));
    assert_eq!(texts(engine.session("u").await.unwrap()), vec!["a", "r1"]);
}

#[tokio::test]
async fn buttons_are_off_topic_and_cancel_ends_chat() {
    let engine = FlowEngine::new(InMemoryRepository::new(), ScriptedResponder::new(), NullOutbound).unwrap();
    engine.handle(&Event::text("u", "/support")).await.unwrap();

    let rejected = engine.handle(&Event::button("u", "location:home")).await.unwrap();
    assert_eq!(rejected.kind, ActionKind::Rejection);

    let ended = engine.handle_event(&Event::button("u", "menu:cancel")).await.unwrap();
    assert_eq!(ended.signal, Some(FlowSignal::Cancelled));
    assert!(engine.session("u").await.is_none());
}

#[tokio::test]
async fn transcript_is_bounded() {
    let config = FlowConfig { transcript_limit: 4, ..FlowConfig::default() };
    let responder = ScriptedResponder::new();
    let engine = FlowEngine::with_config(
        config,
        FlowRegistry::standard().unwrap(),
        InMemoryRepository::new(),
        responder.clone(),
        NullOutbound,
    );
    engine.handle(&Event::text("u", "/support")).await.unwrap();
    for i in 0..5 {
        engine.handle(&Event::text("u", format!("message {}", i))).await.unwrap();
    }
    assert!(responder.transcripts().iter().all(|t| t.len() <= 4));
    assert_eq!(engine.session("u").await.unwrap().metadata.transcript.len(), 4);
}

#[tokio::test]
async fn quota_alerts_then_refuses() {
    let alerts = RecordingAlert::default();
    let quota = ResponderQuota { daily_limit: 2, alert_threshold: 2 };
    let responder = QuotaResponder::new(ScriptedResponder::new(), alerts.clone(), quota);
    let engine = FlowEngine::new(InMemoryRepository::new(), responder, NullOutbound).unwrap();

    engine.handle(&Event::text("u", "/support")).await.unwrap();
    engine.handle(&Event::text("u", "one")).await.unwrap();
    assert!(alerts.alerts().is_empty());
    engine.handle(&Event::text("u", "two")).await.unwrap();
    assert_eq!(alerts.alerts().len(), 1);
    assert!(alerts.alerts()[0].contains("2 calls"));

    let err = engine.handle(&Event::text("u", "three")).await.unwrap_err();
    assert!(matches!(err, FlowError::Responder(_)));
    assert!(err.user_message().contains("support chat"));
    assert_eq!(alerts.alerts().len(), 2);
    assert!(alerts.alerts()[1].contains("limit of 2 calls"));

    engine.handle(&Event::text("u", "four")).await.unwrap_err();
    assert_eq!(alerts.alerts().len(), 2);
}
