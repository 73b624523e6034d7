use thiserror::Error;

/// Failures reported by a record repository.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("record serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Input did not match the shape the current state expects.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Please type a few words.")]
    Empty,

    #[error("That's a bit long, please keep it under {max} characters.")]
    TooLong { max: usize },

    #[error("Please answer with a number.")]
    NotANumber,

    #[error("Please pick a number from {min} to {max}.")]
    OutOfRange { min: u8, max: u8 },

    #[error("Please pick one of the options below.")]
    UnknownOption,
}

/// A flow table that cannot be executed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DefinitionError {
    #[error("{flow}: initial state '{state}' is not a step")]
    MissingInitial { flow: String, state: String },

    #[error("{flow}: state '{from}' points at unknown state '{to}'")]
    UnknownTarget { flow: String, from: String, to: String },

    #[error("{flow}: no terminal state")]
    NoTerminal { flow: String },

    #[error("{flow}: cycle through '{state}' in a flow without branches")]
    Cycle { flow: String, state: String },

    #[error("{flow}: duplicate state '{state}'")]
    Duplicate { flow: String, state: String },
}

/// Collaborator failures that escape the engine. Everything else is control flow.
#[derive(Debug, Error)]
pub enum FlowError {
    #[error("failed to save completed record: {0}")]
    Storage(#[from] StorageError),

    #[error("conversational responder failed: {0}")]
    Responder(#[source] anyhow::Error),

    #[error("no definition registered for flow {0}")]
    UnknownFlow(String),

    #[error("session is in state '{state}' which {flow} does not define")]
    UnknownState { flow: String, state: String },
}

impl FlowError {
    /// Text safe to show the end user.
    pub fn user_message(&self) -> &'static str {
        match self {
            FlowError::Storage(_) => {
                "I couldn't save that just now. Please send your last answer again."
            }
            FlowError::Responder(_) => {
                "I can't reach the support chat right now. Please try again in a little while."
            }
            FlowError::UnknownFlow(_) | FlowError::UnknownState { .. } => {
                "Something went wrong on my side. Send /menu to start over."
            }
        }
    }
}

pub type FlowResult<T> = Result<T, FlowError>;
