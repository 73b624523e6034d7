//! Record building and the recommendation rule table. Nothing here does I/O.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::FlowConfig;
use crate::flows::panic;
use crate::session::{Answers, FlowKind, Session};

/// A finished flow, handed to the repository as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletedRecord {
    pub user_id: String,
    pub timestamp: DateTime<Utc>,
    pub flow: FlowKind,
    pub answers: Answers,
    pub recommendation: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Band {
    Low,
    Mid,
    High,
}

impl Band {
    pub fn of(rating: i64, config: &FlowConfig) -> Band {
        if rating >= i64::from(config.high_threshold) {
            Band::High
        } else if rating <= i64::from(config.low_threshold) {
            Band::Low
        } else {
            Band::Mid
        }
    }

    fn advice(&self) -> &'static str {
        match self {
            Band::High => {
                "That sounds really intense. Try box breathing right now: in for 4, hold for 4, out for 4, \
                 hold for 4, for a couple of minutes. If it keeps coming back this strongly, please consider \
                 talking to a mental-health professional."
            }
            Band::Mid => {
                "Try the 5-4-3-2-1 grounding exercise: name 5 things you can see, 4 you can touch, \
                 3 you can hear, 2 you can smell and 1 you can taste."
            }
            Band::Low => "You're handling this well. Keep noticing how you feel, that already helps.",
        }
    }
}

fn location_addendum(location: &str) -> Option<&'static str> {
    match location {
        "work" => Some("At work, a short walk or a glass of water away from your desk can reset things."),
        "studies" => Some("If it's study stress, split the task into small pieces and take a five minute break."),
        "public" | "transport" => Some("In a busy place, feel your feet on the ground and make every exhale slow."),
        "home" => Some("At home, give yourself a few quiet minutes somewhere comfortable."),
        _ => None,
    }
}

fn people_addendum(people: &str) -> Option<&'static str> {
    match people {
        "alone" => Some("If you can, message someone you trust."),
        "strangers" => Some("It's fine to step away from people for a moment."),
        "colleagues" => Some("You don't owe anyone an explanation for taking a short break."),
        _ => None,
    }
}

/// The recommendation text for a finished flow.
pub fn recommend(flow: FlowKind, answers: &Answers, config: &FlowConfig) -> String {
    match flow {
        FlowKind::QuickCheckIn | FlowKind::FullCheckIn => {
            let mut parts = vec![match answers.integer("distress_rating") {
                Some(rating) => Band::of(rating, config).advice(),
                None => "Thanks for checking in.",
            }];
            if flow == FlowKind::FullCheckIn {
                parts.extend(answers.text("location").and_then(location_addendum));
                parts.extend(answers.text("people_around").and_then(people_addendum));
            }
            parts.join(" ")
        }
        FlowKind::Venting => match answers.text("save_choice") {
            Some("save") => "Saved. You can look back at it whenever you want.".to_string(),
            _ => "Let it go. Nothing was stored.".to_string(),
        },
        FlowKind::PanicFlow => match answers.text("outcome") {
            Some(outcome) if outcome == panic::CALM.as_str() => {
                "You got through it. Be gentle with yourself for the rest of the day.".to_string()
            }
            _ => "These exercises didn't bring enough relief this time. Send /support to talk it through \
                  with me, and if you feel in danger please call your local emergency number."
                .to_string(),
        },
        FlowKind::SupportChat => String::new(),
    }
}

/// Freeze a session into its record.
pub fn commit(session: &Session, config: &FlowConfig) -> CompletedRecord {
    CompletedRecord {
        user_id: session.user_id.clone(),
        timestamp: session.started_at,
        flow: session.flow,
        answers: session.answers.clone(),
        recommendation: recommend(session.flow, &session.answers, config),
    }
}
