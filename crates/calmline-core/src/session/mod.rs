pub mod answers;
pub mod context;
pub mod state;
pub mod store;

pub use answers::{AnswerValue, Answers};
pub use context::{PanicScratch, Session, SessionMetadata};
pub use state::{FlowKind, StateId};
pub use store::{SessionSlot, SessionStore};
