use anyhow::Result;
use async_trait::async_trait;
use calmline_core::ports::{AlertPort, Responder};
use calmline_core::support::{Role, TranscriptEntry};
use tracing::warn;

const REPLIES: &[&str] = &[
    "Thank you for telling me. What feels heaviest right now?",
    "That sounds hard. How long has it been like this?",
    "It makes sense to feel that way. What usually helps, even a little?",
    "I'm here and listening. Take your time.",
];

/// Offline support-chat replies, rotated by how far the chat has got.
#[derive(Clone, Default)]
pub struct CannedResponder;

#[async_trait]
impl Responder for CannedResponder {
    async fn respond(&self, transcript: &[TranscriptEntry]) -> Result<String> {
        let turns = transcript.iter().filter(|e| e.role == Role::User).count();
        let reply = REPLIES[turns.saturating_sub(1) % REPLIES.len()];
        Ok(reply.to_string())
    }
}

/// Operator alerts go to the log.
#[derive(Clone, Default)]
pub struct LogAlert;

#[async_trait]
impl AlertPort for LogAlert {
    async fn notify(&self, text: &str) -> Result<()> {
        warn!(target: "calmline_bot::alert", "{}", text);
        Ok(())
    }
}
