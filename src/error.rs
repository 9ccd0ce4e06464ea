use thiserror::Error;

/// Failures reported by a backend (local table or hosted RPC endpoint).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Remote rejected call ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Could not decode remote response: {0}")]
    Decode(String),

    #[error("Backend storage error: {0}")]
    Storage(String),
}

/// Invalid transitions of the flow sequencer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FlowError {
    #[error("Type {got} is not the current type (current: {current})")]
    NotCurrent { current: u32, got: u32 },

    #[error("Flow is already complete")]
    AlreadyComplete,

    #[error("No continue gate is pending")]
    NoContinueGate,

    #[error("Type {0} is not part of this module's sequence")]
    UnknownType(u32),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProgressError {
    #[error("No signed-in user")]
    NotAuthenticated,

    #[error("Duplicate submission for {module_id}/{game_mode_id} ignored")]
    DuplicateSubmission {
        module_id: String,
        game_mode_id: String,
    },

    #[error("Remote operation failed: {0}")]
    RemoteOperationFailed(#[from] RemoteError),

    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Flow error: {0}")]
    Flow(#[from] FlowError),
}

impl ProgressError {
    /// True for outcomes callers should treat as a no-op rather than a failure.
    pub fn is_benign(&self) -> bool {
        matches!(self, ProgressError::DuplicateSubmission { .. })
    }
}

pub type ProgressResult<T> = Result<T, ProgressError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_duplicates_are_benign() {
        let dup = ProgressError::DuplicateSubmission {
            module_id: "m1".into(),
            game_mode_id: "g1".into(),
        };
        assert!(dup.is_benign());
        assert!(!ProgressError::NotAuthenticated.is_benign());
        assert!(!ProgressError::from(RemoteError::Transport("down".into())).is_benign());
    }

    #[test]
    fn remote_error_message_includes_status() {
        let err = ProgressError::from(RemoteError::Rejected {
            status: 409,
            message: "conflict".into(),
        });
        let msg = err.to_string();
        assert!(msg.contains("409"));
        assert!(msg.contains("conflict"));
    }
}
