use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::session::round::Term;

/// One drop of a term into a category. Unique per
/// `(module_id, game_mode_id, game_type, term_id)`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlacementResult {
    pub term_id: String,
    pub term_text: String,
    pub correct_category: String,
    pub placed_category: String,
    pub is_correct: bool,
    pub timestamp: DateTime<Utc>,
    pub module_id: String,
    pub game_mode_id: String,
    #[serde(rename = "type")]
    pub game_type: u32,
}

impl PlacementResult {
    pub fn scope(&self) -> PlacementScope {
        PlacementScope {
            module_id: self.module_id.clone(),
            game_mode_id: self.game_mode_id.clone(),
            game_type: self.game_type,
        }
    }
}

/// The `(module, game mode, type)` triple placements are grouped under.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PlacementScope {
    pub module_id: String,
    pub game_mode_id: String,
    pub game_type: u32,
}

impl PlacementScope {
    pub fn new(module_id: &str, game_mode_id: &str, game_type: u32) -> Self {
        Self {
            module_id: module_id.to_string(),
            game_mode_id: game_mode_id.to_string(),
            game_type,
        }
    }

    /// Flat key used by the JSON stores.
    pub fn storage_key(&self) -> String {
        format!("{}/{}/{}", self.module_id, self.game_mode_id, self.game_type)
    }
}

/// Result of one completed sub-game type inside a module.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GameTypeResult {
    pub game_type_id: u32,
    pub game_mode_id: String,
    /// Best score seen locally for this type, including this attempt.
    pub score: u64,
    /// Score of this attempt alone.
    pub current_score: u64,
    pub total_correct: usize,
    pub terms: Vec<Term>,
    #[serde(default)]
    pub score_history: Vec<u64>,
    #[serde(default)]
    pub time_history: Vec<u64>,
    pub time: u64,
    pub total_terms: usize,
    pub placed_terms: Vec<String>,
    pub is_completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
}
