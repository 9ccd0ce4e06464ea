use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::content::{Category, GameTypeDefinition};
use crate::engine::scoring;
use crate::error::ProgressError;
use crate::session::result::{GameTypeResult, PlacementResult, PlacementScope};
use crate::store::ledger::PlacementLedger;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Term {
    pub id: String,
    pub text: String,
    pub correct_category: String,
    #[serde(default)]
    pub current_category: Option<String>,
}

/// One playthrough of a sub-game type: the terms on the board and where
/// the learner has dropped them.
pub struct SortingRound {
    pub module_id: String,
    pub game_mode_id: String,
    pub game_type: u32,
    pub terms: Vec<Term>,
    pub categories: Vec<Category>,
}

impl SortingRound {
    pub fn new(module_id: &str, def: &GameTypeDefinition) -> Self {
        let terms = def
            .terms
            .iter()
            .map(|t| Term {
                id: t.id.clone(),
                text: t.text.clone(),
                correct_category: t.category.clone(),
                current_category: None,
            })
            .collect();
        Self {
            module_id: module_id.to_string(),
            game_mode_id: def.game_mode_id.clone(),
            game_type: def.id,
            terms,
            categories: def.categories.clone(),
        }
    }

    pub fn scope(&self) -> PlacementScope {
        PlacementScope::new(&self.module_id, &self.game_mode_id, self.game_type)
    }

    /// Drop a term into a category. Re-dropping moves it.
    pub fn place(
        &mut self,
        term_id: &str,
        category_id: &str,
    ) -> Result<PlacementResult, ProgressError> {
        if !self.categories.iter().any(|c| c.id == category_id) {
            return Err(ProgressError::ValidationFailed(format!(
                "unknown category {category_id}"
            )));
        }
        let term = self
            .terms
            .iter_mut()
            .find(|t| t.id == term_id)
            .ok_or_else(|| ProgressError::ValidationFailed(format!("unknown term {term_id}")))?;
        term.current_category = Some(category_id.to_string());

        Ok(PlacementResult {
            term_id: term.id.clone(),
            term_text: term.text.clone(),
            correct_category: term.correct_category.clone(),
            placed_category: category_id.to_string(),
            is_correct: term.correct_category == category_id,
            timestamp: Utc::now(),
            module_id: self.module_id.clone(),
            game_mode_id: self.game_mode_id.clone(),
            game_type: self.game_type,
        })
    }

    /// Like `place`, but also writes the placement to the ledger so the
    /// board can be rebuilt after a reload.
    pub fn place_recorded(
        &mut self,
        ledger: &mut PlacementLedger,
        term_id: &str,
        category_id: &str,
    ) -> Result<PlacementResult, ProgressError> {
        let result = self.place(term_id, category_id)?;
        ledger.record(result.clone());
        Ok(result)
    }

    /// Re-apply placements saved in the ledger after a reload. Records for
    /// terms or categories no longer on the board are skipped.
    pub fn restore(&mut self, placements: &[PlacementResult]) -> usize {
        let scope = self.scope();
        let mut restored = 0;
        for p in placements.iter().filter(|p| p.scope() == scope) {
            if self.place(&p.term_id, &p.placed_category).is_ok() {
                restored += 1;
            }
        }
        restored
    }

    pub fn placed_count(&self) -> usize {
        self.terms
            .iter()
            .filter(|t| t.current_category.is_some())
            .count()
    }

    pub fn correct_count(&self) -> usize {
        self.terms
            .iter()
            .filter(|t| t.current_category.as_deref() == Some(t.correct_category.as_str()))
            .count()
    }

    pub fn is_complete(&self) -> bool {
        self.placed_count() == self.terms.len()
    }

    pub fn reset(&mut self) {
        for term in &mut self.terms {
            term.current_category = None;
        }
    }

    /// Snapshot the round as a result. `score` starts equal to
    /// `current_score`; the local attempt store fills in bests and history.
    pub fn finish(&self, elapsed_secs: u64) -> GameTypeResult {
        let total_correct = self.correct_count();
        let current_score = scoring::compute_score(total_correct, self.terms.len());
        let is_completed = self.is_complete();
        GameTypeResult {
            game_type_id: self.game_type,
            game_mode_id: self.game_mode_id.clone(),
            score: current_score,
            current_score,
            total_correct,
            terms: self.terms.clone(),
            score_history: Vec::new(),
            time_history: Vec::new(),
            time: elapsed_secs,
            total_terms: self.terms.len(),
            placed_terms: self
                .terms
                .iter()
                .filter(|t| t.current_category.is_some())
                .map(|t| t.id.clone())
                .collect(),
            is_completed,
            completed_at: is_completed.then(Utc::now),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::Catalog;
    use crate::store::ledger::PlacementLedger;

    fn producers_round() -> SortingRound {
        let catalog = Catalog::bundled().unwrap();
        let module = catalog.module("ecosystems").unwrap();
        SortingRound::new(&module.id, module.game_type(1).unwrap())
    }

    #[test]
    fn placing_marks_correctness() {
        let mut round = producers_round();
        let wrong = round.place("fox", "producer").unwrap();
        assert!(!wrong.is_correct);
        let right = round.place("fox", "consumer").unwrap();
        assert!(right.is_correct);
        assert_eq!(round.placed_count(), 1);
        assert_eq!(round.correct_count(), 1);
    }

    #[test]
    fn unknown_term_or_category_is_rejected() {
        let mut round = producers_round();
        assert!(round.place("whale", "consumer").is_err());
        assert!(round.place("fox", "mineral").is_err());
        assert_eq!(round.placed_count(), 0);
    }

    #[test]
    fn finish_scores_the_board() {
        let mut round = producers_round();
        round.place("oak", "producer").unwrap();
        round.place("algae", "producer").unwrap();
        round.place("fox", "consumer").unwrap();
        round.place("rabbit", "producer").unwrap();
        assert!(round.is_complete());

        let result = round.finish(42);
        assert_eq!(result.current_score, 75);
        assert_eq!(result.total_correct, 3);
        assert_eq!(result.total_terms, 4);
        assert_eq!(result.placed_terms.len(), 4);
        assert!(result.is_completed);
        assert!(result.completed_at.is_some());
    }

    #[test]
    fn restore_from_ledger_rebuilds_the_board() {
        let mut ledger = PlacementLedger::in_memory();
        let mut round = producers_round();
        round.place_recorded(&mut ledger, "oak", "producer").unwrap();
        round.place_recorded(&mut ledger, "fox", "producer").unwrap();
        round.place_recorded(&mut ledger, "fox", "consumer").unwrap();

        let mut reloaded = producers_round();
        let restored = reloaded.restore(&ledger.list(&reloaded.scope()));
        assert_eq!(restored, 2);
        assert_eq!(reloaded.placed_count(), 2);
        assert_eq!(reloaded.correct_count(), 2);
    }

    #[test]
    fn reset_clears_placements() {
        let mut round = producers_round();
        round.place("oak", "producer").unwrap();
        round.reset();
        assert_eq!(round.placed_count(), 0);
        assert!(!round.finish(1).is_completed);
    }

    #[test]
    fn restore_skips_placements_from_other_types() {
        let mut ledger = PlacementLedger::in_memory();
        let mut round = producers_round();
        round.place_recorded(&mut ledger, "oak", "producer").unwrap();
        let mut foreign = round.place("fox", "consumer").unwrap();
        foreign.game_type = 2;

        let mut placements = ledger.list(&round.scope());
        placements.push(foreign);
        let mut reloaded = producers_round();
        assert_eq!(reloaded.restore(&placements), 1);
        assert_eq!(reloaded.placed_count(), 1);
    }
}
