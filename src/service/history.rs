use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::{ProgressError, ProgressResult};
use crate::remote::{
    AggregateBackend, AggregateKey, AggregateSubmission, AggregatedGameRecord, LastThree,
};
use crate::service::Identity;
use crate::remote::merge::union_into;
use crate::service::debounce::{Debouncer, SubmissionKey};
use crate::session::result::GameTypeResult;
use crate::store::attempts::{BestStats, GameIdentity, LocalAttemptStore};

/// One finished game to fold into the user's aggregate.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubmitRequest {
    pub module_id: String,
    pub level_number: u32,
    pub game_mode_id: String,
    pub score: u64,
    pub is_completed: bool,
    pub time: u64,
    pub total_terms: usize,
    pub placed_terms: Vec<String>,
}

/// The only component that talks to the remote store. Owns debouncing and
/// the local best-effort fallback; merge semantics are delegated to the
/// backend's upsert-with-merge calls.
pub struct HistoryService {
    backend: Arc<dyn AggregateBackend>,
    identity: Option<Identity>,
    debouncer: Debouncer,
    attempts: Option<Mutex<LocalAttemptStore>>,
}

impl HistoryService {
    pub fn new(backend: Arc<dyn AggregateBackend>, debounce_window: Duration) -> Self {
        Self {
            backend,
            identity: None,
            debouncer: Debouncer::new(debounce_window),
            attempts: None,
        }
    }

    pub fn with_debouncer(mut self, debouncer: Debouncer) -> Self {
        self.debouncer = debouncer;
        self
    }

    pub fn with_local_fallback(mut self, attempts: LocalAttemptStore) -> Self {
        self.attempts = Some(Mutex::new(attempts));
        self
    }

    pub fn sign_in(&mut self, identity: Identity) {
        tracing::info!(user = %identity.user_id, "signed in");
        self.identity = Some(identity);
    }

    pub fn sign_out(&mut self) {
        self.identity = None;
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    fn user(&self) -> ProgressResult<&Identity> {
        self.identity.as_ref().ok_or(ProgressError::NotAuthenticated)
    }

    fn key(&self, module_id: &str, level_number: u32) -> ProgressResult<AggregateKey> {
        let user = self.user()?;
        Ok(AggregateKey::new(&user.user_id, module_id, level_number))
    }

    /// Fold one game into the aggregate: cumulative totals, unioned mode
    /// ids and shifted history rings, in a single remote upsert.
    pub fn submit(&self, request: &SubmitRequest) -> ProgressResult<AggregatedGameRecord> {
        if request.module_id.trim().is_empty() || request.game_mode_id.trim().is_empty() {
            return Err(ProgressError::ValidationFailed(
                "module and game mode are required".into(),
            ));
        }
        let user = self.user()?;
        let debounce_key =
            SubmissionKey::new(&user.user_id, &request.module_id, &request.game_mode_id);
        self.acquire(&debounce_key, &request.module_id, &request.game_mode_id)?;

        self.record_local(
            &request.module_id,
            &request.game_mode_id,
            request.level_number,
            request.score,
            request.time,
        );

        let submission = AggregateSubmission {
            user_id: user.user_id.clone(),
            module_id: request.module_id.clone(),
            level_number: request.level_number,
            game_mode_ids: vec![request.game_mode_id.clone()],
            score: request.score,
            is_completed: request.is_completed,
            time: request.time,
            total_terms: request.total_terms,
            placed_terms: request.placed_terms.clone(),
        };
        self.upsert(&debounce_key, &submission)
    }

    /// Commit every sub-game of one module playthrough as a single attempt.
    ///
    /// Scores and times are summed and mode ids unioned before the upsert,
    /// so the history rings move by exactly one slot per attempt.
    pub fn submit_attempt(
        &self,
        module_id: &str,
        level_number: u32,
        results: &[GameTypeResult],
    ) -> ProgressResult<AggregatedGameRecord> {
        if module_id.trim().is_empty() {
            return Err(ProgressError::ValidationFailed("module is required".into()));
        }
        if results.is_empty() {
            return Err(ProgressError::ValidationFailed(
                "an attempt needs at least one game".into(),
            ));
        }
        if results.iter().any(|r| r.game_mode_id.trim().is_empty()) {
            return Err(ProgressError::ValidationFailed(
                "every game needs a game mode".into(),
            ));
        }
        let user = self.user()?;

        let mut game_mode_ids = Vec::new();
        let mut placed_terms = Vec::new();
        for result in results {
            union_into(&mut game_mode_ids, std::slice::from_ref(&result.game_mode_id));
            union_into(&mut placed_terms, &result.placed_terms);
        }
        let mut key_modes = game_mode_ids.clone();
        key_modes.sort();
        let joined_modes = key_modes.join("+");
        let debounce_key = SubmissionKey::new(&user.user_id, module_id, &joined_modes);
        self.acquire(&debounce_key, module_id, &joined_modes)?;

        for result in results {
            self.record_local(
                module_id,
                &result.game_mode_id,
                level_number,
                result.current_score,
                result.time,
            );
        }

        let submission = AggregateSubmission {
            user_id: user.user_id.clone(),
            module_id: module_id.to_string(),
            level_number,
            game_mode_ids,
            score: results.iter().map(|r| r.current_score).sum(),
            is_completed: results.iter().any(|r| r.is_completed),
            time: results.iter().map(|r| r.time).sum(),
            total_terms: results.iter().map(|r| r.total_terms).sum(),
            placed_terms,
        };
        self.upsert(&debounce_key, &submission)
    }

    fn acquire(&self, key: &SubmissionKey, module_id: &str, modes: &str) -> ProgressResult<()> {
        if self.debouncer.try_acquire(key) {
            return Ok(());
        }
        tracing::debug!(module = %module_id, mode = %modes, "duplicate submission ignored");
        Err(ProgressError::DuplicateSubmission {
            module_id: module_id.to_string(),
            game_mode_id: modes.to_string(),
        })
    }

    fn upsert(
        &self,
        debounce_key: &SubmissionKey,
        submission: &AggregateSubmission,
    ) -> ProgressResult<AggregatedGameRecord> {
        match self.backend.upsert_aggregate_with_history(submission) {
            Ok(record) => {
                tracing::info!(
                    module = %record.module_id,
                    level = record.level_number,
                    score = record.score,
                    "aggregate updated"
                );
                Ok(record)
            }
            Err(e) => {
                self.debouncer.release(debounce_key);
                tracing::error!(error = %e, module = %submission.module_id, "submission failed");
                Err(e.into())
            }
        }
    }

    fn record_local(&self, module_id: &str, game_mode_id: &str, level: u32, score: u64, time: u64) {
        let Some(attempts) = &self.attempts else {
            return;
        };
        let identity = GameIdentity::new(module_id, game_mode_id, level);
        match attempts.lock() {
            Ok(mut a) => {
                a.record_attempt(&identity, score, time);
            }
            Err(_) => tracing::warn!("local attempt store lock poisoned, skipping"),
        }
    }

    /// Fill a finished result's best score and history preview from the
    /// local attempt store. Leaves the result as is without a store.
    pub fn annotate(&self, module_id: &str, level_number: u32, result: &mut GameTypeResult) {
        let Some(attempts) = &self.attempts else {
            return;
        };
        let identity = GameIdentity::new(module_id, &result.game_mode_id, level_number);
        if let Ok(a) = attempts.lock() {
            a.annotate(&identity, result);
        }
    }

    /// Local best stats, for display when the remote store is unreachable.
    pub fn local_best(&self, identity: &GameIdentity) -> Option<BestStats> {
        let attempts = self.attempts.as_ref()?.lock().ok()?;
        attempts.best(identity).cloned()
    }

    pub fn get_aggregated(
        &self,
        module_id: &str,
        level_number: u32,
    ) -> ProgressResult<Option<AggregatedGameRecord>> {
        let key = self.key(module_id, level_number)?;
        Ok(self.backend.query_aggregate(&key)?)
    }

    pub fn get_last_three(
        &self,
        module_id: &str,
        level_number: u32,
        game_mode_id: &str,
    ) -> ProgressResult<LastThree> {
        let key = self.key(module_id, level_number)?;
        Ok(self.backend.get_last_three_scores(&key, game_mode_id)?)
    }

    pub fn get_completed_game_mode_ids(
        &self,
        module_id: &str,
    ) -> ProgressResult<BTreeSet<String>> {
        let user = self.user()?;
        let ids = self
            .backend
            .query_completed_game_mode_ids(&user.user_id, module_id)?;
        Ok(ids.into_iter().collect())
    }

    /// Record that a sub-game was finished without committing its score.
    /// Existing totals and history are left alone.
    pub fn track_progression(
        &self,
        module_id: &str,
        level_number: u32,
        game_mode_id: &str,
    ) -> ProgressResult<AggregatedGameRecord> {
        let key = self.key(module_id, level_number)?;
        Ok(self.backend.track_game_mode(&key, game_mode_id)?)
    }

    pub fn mark_completed(
        &self,
        module_id: &str,
        level_number: u32,
        game_mode_id: &str,
    ) -> ProgressResult<AggregatedGameRecord> {
        let key = self.key(module_id, level_number)?;
        Ok(self.backend.mark_completed(&key, game_mode_id)?)
    }

    /// Delete the user's aggregates, optionally narrowed to a module and a
    /// game mode. Returns the number of rows removed.
    pub fn reset(
        &self,
        module_id: Option<&str>,
        game_mode_id: Option<&str>,
    ) -> ProgressResult<usize> {
        let user = self.user()?;
        let removed = self
            .backend
            .delete_aggregate(&user.user_id, module_id, game_mode_id)?;
        tracing::info!(removed, "aggregates reset");
        Ok(removed)
    }
}
