use crate::engine::scoring;
use crate::session::result::GameTypeResult;

/// Results gathered during one module attempt, one per game type, in the
/// order types were first finished. Holds no authority; the history
/// service is the system of record.
#[derive(Clone, Debug, Default)]
pub struct ScoreAccumulator {
    results: Vec<GameTypeResult>,
}

impl ScoreAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace any result for the same type, otherwise append.
    pub fn add(&mut self, result: GameTypeResult) {
        self.results.retain(|r| r.game_type_id != result.game_type_id);
        self.results.push(result);
    }

    pub fn get_all(&self) -> Vec<GameTypeResult> {
        self.results.clone()
    }

    pub fn get(&self, game_type_id: u32) -> Option<&GameTypeResult> {
        self.results.iter().find(|r| r.game_type_id == game_type_id)
    }

    pub fn clear(&mut self) {
        self.results.clear();
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn total_score(&self) -> u64 {
        self.results.iter().map(|r| r.current_score).sum()
    }

    pub fn total_time(&self) -> u64 {
        self.results.iter().map(|r| r.time).sum()
    }

    pub fn average_score(&self) -> f64 {
        let scores: Vec<u64> = self.results.iter().map(|r| r.current_score).collect();
        scoring::average(&scores)
    }
}
