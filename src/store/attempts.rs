use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::remote::merge::push_ring;
use crate::session::result::GameTypeResult;
use crate::store::json_store::{ATTEMPTS_FILE, JsonStore};
use crate::store::schema::AttemptStatsData;

/// Key of the local best-score cache.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct GameIdentity {
    pub module_id: String,
    pub game_mode_id: String,
    pub level_number: u32,
}

impl GameIdentity {
    pub fn new(module_id: &str, game_mode_id: &str, level_number: u32) -> Self {
        Self {
            module_id: module_id.to_string(),
            game_mode_id: game_mode_id.to_string(),
            level_number,
        }
    }

    fn storage_key(&self) -> String {
        format!(
            "{}/{}/level-{}",
            self.module_id, self.game_mode_id, self.level_number
        )
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BestStats {
    pub best_score: u64,
    /// Fastest completion, in seconds.
    pub best_time: Option<u64>,
    pub attempts: u32,
    /// Most recent first, at most three.
    pub recent_scores: Vec<u64>,
    pub recent_times: Vec<u64>,
    pub last_played: Option<DateTime<Utc>>,
}

/// Offline fallback for best score and time per game. Never authoritative
/// when the remote store can be read.
pub struct LocalAttemptStore {
    data: AttemptStatsData,
    store: Option<JsonStore>,
}

impl LocalAttemptStore {
    pub fn new(store: Option<JsonStore>) -> Self {
        let data = match &store {
            Some(s) => {
                let loaded: AttemptStatsData = s.load(ATTEMPTS_FILE);
                if loaded.needs_reset() {
                    AttemptStatsData::default()
                } else {
                    loaded
                }
            }
            None => AttemptStatsData::default(),
        };
        Self { data, store }
    }

    pub fn in_memory() -> Self {
        Self::new(None)
    }

    pub fn record_attempt(&mut self, identity: &GameIdentity, score: u64, time: u64) -> BestStats {
        let stats = self.data.games.entry(identity.storage_key()).or_default();
        stats.best_score = stats.best_score.max(score);
        stats.best_time = Some(stats.best_time.map_or(time, |t| t.min(time)));
        stats.attempts += 1;
        push_ring(&mut stats.recent_scores, score);
        push_ring(&mut stats.recent_times, time);
        stats.last_played = Some(Utc::now());
        let snapshot = stats.clone();
        self.flush();
        snapshot
    }

    pub fn best(&self, identity: &GameIdentity) -> Option<&BestStats> {
        self.data.games.get(&identity.storage_key())
    }

    /// Fill a fresh result's best score and history preview from local
    /// stats, as if this attempt had already been recorded.
    pub fn annotate(&self, identity: &GameIdentity, result: &mut GameTypeResult) {
        let (mut scores, mut times, best) = match self.best(identity) {
            Some(s) => (s.recent_scores.clone(), s.recent_times.clone(), s.best_score),
            None => (Vec::new(), Vec::new(), 0),
        };
        push_ring(&mut scores, result.current_score);
        push_ring(&mut times, result.time);
        result.score = best.max(result.current_score);
        result.score_history = scores;
        result.time_history = times;
    }

    pub fn clear(&mut self) {
        self.data.games.clear();
        self.flush();
    }

    fn flush(&self) {
        if let Some(store) = &self.store
            && let Err(e) = store.save(ATTEMPTS_FILE, &self.data)
        {
            tracing::warn!(error = %e, "could not persist local attempt stats");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn identity() -> GameIdentity {
        GameIdentity::new("eco", "eco-1", 1)
    }

    #[test]
    fn keeps_highest_score_and_fastest_time() {
        let mut attempts = LocalAttemptStore::in_memory();
        attempts.record_attempt(&identity(), 60, 40);
        attempts.record_attempt(&identity(), 90, 55);
        let stats = attempts.record_attempt(&identity(), 70, 30);
        assert_eq!(stats.best_score, 90);
        assert_eq!(stats.best_time, Some(30));
        assert_eq!(stats.attempts, 3);
        assert_eq!(stats.recent_scores, vec![70, 90, 60]);
    }

    #[test]
    fn identities_do_not_mix() {
        let mut attempts = LocalAttemptStore::in_memory();
        attempts.record_attempt(&identity(), 60, 40);
        assert!(attempts.best(&GameIdentity::new("eco", "eco-1", 2)).is_none());
    }

    #[test]
    fn stats_survive_reload_and_clear() {
        let dir = TempDir::new().unwrap();
        let store = JsonStore::with_base_dir(dir.path().to_path_buf()).unwrap();
        {
            let mut attempts = LocalAttemptStore::new(Some(store.clone()));
            attempts.record_attempt(&identity(), 80, 20);
        }
        let mut attempts = LocalAttemptStore::new(Some(store.clone()));
        assert_eq!(attempts.best(&identity()).unwrap().best_score, 80);
        attempts.clear();
        let attempts = LocalAttemptStore::new(Some(store));
        assert!(attempts.best(&identity()).is_none());
    }

    #[test]
    fn annotate_previews_this_attempt() {
        let mut attempts = LocalAttemptStore::in_memory();
        attempts.record_attempt(&identity(), 90, 50);
        let mut result = GameTypeResult {
            game_type_id: 1,
            game_mode_id: "eco-1".into(),
            score: 0,
            current_score: 75,
            total_correct: 3,
            terms: Vec::new(),
            score_history: Vec::new(),
            time_history: Vec::new(),
            time: 42,
            total_terms: 4,
            placed_terms: Vec::new(),
            is_completed: true,
            completed_at: None,
        };
        attempts.annotate(&identity(), &mut result);
        assert_eq!(result.score, 90);
        assert_eq!(result.score_history, vec![75, 90]);
        assert_eq!(result.time_history, vec![42, 50]);
        assert_eq!(attempts.best(&identity()).unwrap().attempts, 1);
    }
}
