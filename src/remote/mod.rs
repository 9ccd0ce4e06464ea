pub mod local;
pub mod merge;

#[cfg(feature = "network")]
pub mod http;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::RemoteError;
use crate::wizard::{AttachmentRef, PendingAttachment, WizardProgress};

pub use local::LocalBackend;
pub use merge::HistoryMode;

/// Identity of the single aggregate row per user, module and level.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AggregateKey {
    pub user_id: String,
    pub module_id: String,
    pub level_number: u32,
}

impl AggregateKey {
    pub fn new(user_id: &str, module_id: &str, level_number: u32) -> Self {
        Self {
            user_id: user_id.to_string(),
            module_id: module_id.to_string(),
            level_number,
        }
    }
}

/// Server-held cumulative record. `game_mode_ids` and `placed_terms` have
/// set semantics and keep first-insertion order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregatedGameRecord {
    pub id: String,
    pub user_id: String,
    pub module_id: String,
    pub level_number: u32,
    pub game_mode_ids: Vec<String>,
    pub score: u64,
    pub is_completed: bool,
    pub time: u64,
    pub total_terms: usize,
    pub placed_terms: Vec<String>,
    /// Most recent first, at most three entries.
    #[serde(default)]
    pub score_history: Vec<u64>,
    #[serde(default)]
    pub time_history: Vec<u64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AggregatedGameRecord {
    pub fn key(&self) -> AggregateKey {
        AggregateKey::new(&self.user_id, &self.module_id, self.level_number)
    }

    pub fn has_game_mode(&self, game_mode_id: &str) -> bool {
        self.game_mode_ids.iter().any(|m| m == game_mode_id)
    }
}

/// Payload of one upsert call. Scores and times are this submission's
/// values; the backend accumulates them.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateSubmission {
    pub user_id: String,
    pub module_id: String,
    pub level_number: u32,
    pub game_mode_ids: Vec<String>,
    pub score: u64,
    pub is_completed: bool,
    pub time: u64,
    pub total_terms: usize,
    pub placed_terms: Vec<String>,
}

impl AggregateSubmission {
    pub fn key(&self) -> AggregateKey {
        AggregateKey::new(&self.user_id, &self.module_id, self.level_number)
    }
}

/// Current, previous and past-previous values of one history ring.
/// `None` means no data yet, which is not the same as zero.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistorySlots {
    pub current: Option<u64>,
    pub previous: Option<u64>,
    pub past_previous: Option<u64>,
}

impl HistorySlots {
    pub fn from_ring(ring: &[u64]) -> Self {
        Self {
            current: ring.first().copied(),
            previous: ring.get(1).copied(),
            past_previous: ring.get(2).copied(),
        }
    }

    pub fn as_array(&self) -> [Option<u64>; 3] {
        [self.current, self.previous, self.past_previous]
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastThree {
    pub scores: HistorySlots,
    pub times: HistorySlots,
}

impl LastThree {
    pub fn from_record(record: &AggregatedGameRecord) -> Self {
        Self {
            scores: HistorySlots::from_ring(&record.score_history),
            times: HistorySlots::from_ring(&record.time_history),
        }
    }
}

/// Remote procedure surface of the hosted store. Every mutating call is a
/// single merge-aware operation; implementations must never overwrite
/// `game_mode_ids`, cumulative totals or the history rings wholesale.
pub trait AggregateBackend: Send + Sync {
    /// Merge ids and accumulate score/time, leaving history rings untouched.
    fn upsert_aggregate(
        &self,
        submission: &AggregateSubmission,
    ) -> Result<AggregatedGameRecord, RemoteError>;

    /// As `upsert_aggregate`, then shift the new totals into the rings.
    fn upsert_aggregate_with_history(
        &self,
        submission: &AggregateSubmission,
    ) -> Result<AggregatedGameRecord, RemoteError>;

    fn get_last_three_scores(
        &self,
        key: &AggregateKey,
        game_mode_id: &str,
    ) -> Result<LastThree, RemoteError>;

    fn query_aggregate(&self, key: &AggregateKey)
    -> Result<Option<AggregatedGameRecord>, RemoteError>;

    /// Flattened union of `game_mode_ids` over the user's completed records
    /// for a module, across all levels.
    fn query_completed_game_mode_ids(
        &self,
        user_id: &str,
        module_id: &str,
    ) -> Result<Vec<String>, RemoteError>;

    /// Union one id into the tracked set. Creates a zeroed record if none
    /// exists; otherwise touches nothing but the id set.
    fn track_game_mode(
        &self,
        key: &AggregateKey,
        game_mode_id: &str,
    ) -> Result<AggregatedGameRecord, RemoteError>;

    fn mark_completed(
        &self,
        key: &AggregateKey,
        game_mode_id: &str,
    ) -> Result<AggregatedGameRecord, RemoteError>;

    /// Reset utility. Returns the number of rows removed.
    fn delete_aggregate(
        &self,
        user_id: &str,
        module_id: Option<&str>,
        game_mode_id: Option<&str>,
    ) -> Result<usize, RemoteError>;
}

/// Persistence for the save/resume wizard, one row per user.
pub trait WizardBackend: Send + Sync {
    fn load_progress(&self, user_id: &str) -> Result<Option<WizardProgress>, RemoteError>;

    fn save_progress(&self, progress: &WizardProgress) -> Result<WizardProgress, RemoteError>;

    fn upload_attachment(
        &self,
        user_id: &str,
        file: &PendingAttachment,
    ) -> Result<AttachmentRef, RemoteError>;
}
