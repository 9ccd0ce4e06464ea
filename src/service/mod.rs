pub mod commit;
pub mod debounce;
pub mod history;

use serde::{Deserialize, Serialize};

pub use commit::{BatchCommit, CancelToken, CommitReport, PendingCommit, WaitOutcome};
pub use history::{HistoryService, SubmitRequest};

/// The signed-in user. Absence means every remote operation fails with
/// `NotAuthenticated`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: String,
    pub email: String,
}
