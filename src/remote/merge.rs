use chrono::{DateTime, Utc};
use rand::Rng;

use crate::remote::{AggregateKey, AggregateSubmission, AggregatedGameRecord};

/// Number of slots kept in each history ring.
pub const HISTORY_SLOTS: usize = 3;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HistoryMode {
    /// Leave `score_history`/`time_history` as they are.
    Keep,
    /// Prepend the new cumulative totals and drop the oldest slot.
    Shift,
}

pub fn new_record_id() -> String {
    format!("{:016x}", rand::thread_rng().r#gen::<u64>())
}

/// `[new, old_current, old_previous]`, truncated to `HISTORY_SLOTS`.
pub fn push_ring(ring: &mut Vec<u64>, value: u64) {
    ring.insert(0, value);
    ring.truncate(HISTORY_SLOTS);
}

/// Append items not already present, keeping existing order.
pub fn union_into(target: &mut Vec<String>, items: &[String]) {
    for item in items {
        if !target.iter().any(|t| t == item) {
            target.push(item.clone());
        }
    }
}

fn empty_record(key: &AggregateKey, now: DateTime<Utc>) -> AggregatedGameRecord {
    AggregatedGameRecord {
        id: new_record_id(),
        user_id: key.user_id.clone(),
        module_id: key.module_id.clone(),
        level_number: key.level_number,
        game_mode_ids: Vec::new(),
        score: 0,
        is_completed: false,
        time: 0,
        total_terms: 0,
        placed_terms: Vec::new(),
        score_history: Vec::new(),
        time_history: Vec::new(),
        created_at: now,
        updated_at: now,
    }
}

/// Upsert-with-merge for one submission.
///
/// Ids and placed terms are unioned, score and time accumulate onto the
/// previous cumulative totals, completion is sticky, and with
/// `HistoryMode::Shift` the new totals become the current ring slot.
pub fn merge_submission(
    existing: Option<&AggregatedGameRecord>,
    incoming: &AggregateSubmission,
    mode: HistoryMode,
    now: DateTime<Utc>,
) -> AggregatedGameRecord {
    let mut record = match existing {
        Some(r) => r.clone(),
        None => empty_record(&incoming.key(), now),
    };
    debug_assert_eq!(record.key(), incoming.key());

    union_into(&mut record.game_mode_ids, &incoming.game_mode_ids);
    union_into(&mut record.placed_terms, &incoming.placed_terms);
    record.score = record.score.saturating_add(incoming.score);
    record.time = record.time.saturating_add(incoming.time);
    record.is_completed |= incoming.is_completed;
    if incoming.total_terms > 0 {
        record.total_terms = incoming.total_terms;
    }
    if mode == HistoryMode::Shift {
        push_ring(&mut record.score_history, record.score);
        push_ring(&mut record.time_history, record.time);
    }
    record.updated_at = now;
    record
}

/// Progression-only update. A new record gets zero placeholders; an
/// existing record only gains the id, its totals and rings are untouched.
pub fn merge_tracked_mode(
    existing: Option<&AggregatedGameRecord>,
    key: &AggregateKey,
    game_mode_id: &str,
    now: DateTime<Utc>,
) -> AggregatedGameRecord {
    let mut record = match existing {
        Some(r) => r.clone(),
        None => empty_record(key, now),
    };
    union_into(&mut record.game_mode_ids, &[game_mode_id.to_string()]);
    record.updated_at = now;
    record
}

pub fn merge_completion(
    existing: Option<&AggregatedGameRecord>,
    key: &AggregateKey,
    game_mode_id: &str,
    now: DateTime<Utc>,
) -> AggregatedGameRecord {
    let mut record = merge_tracked_mode(existing, key, game_mode_id, now);
    record.is_completed = true;
    record
}

#[cfg(test)]
mod tests {
    use super::*;

    fn submission(mode: &str, score: u64, time: u64) -> AggregateSubmission {
        AggregateSubmission {
            user_id: "u1".into(),
            module_id: "eco".into(),
            level_number: 1,
            game_mode_ids: vec![mode.to_string()],
            score,
            is_completed: false,
            time,
            total_terms: 4,
            placed_terms: vec!["fox".into()],
        }
    }

    fn apply(
        existing: Option<AggregatedGameRecord>,
        s: &AggregateSubmission,
    ) -> AggregatedGameRecord {
        merge_submission(existing.as_ref(), s, HistoryMode::Shift, Utc::now())
    }

    #[test]
    fn test_push_ring_drops_oldest() {
        let mut ring = vec![];
        for v in [50, 125, 215, 300] {
            push_ring(&mut ring, v);
        }
        assert_eq!(ring, vec![300, 215, 125]);
    }

    #[test]
    fn test_scores_accumulate() {
        let r1 = apply(None, &submission("a", 50, 10));
        assert_eq!(r1.score, 50);
        let r2 = apply(Some(r1), &submission("a", 75, 20));
        assert_eq!(r2.score, 125);
        let r3 = apply(Some(r2), &submission("a", 90, 30));
        assert_eq!(r3.score, 215);
        assert_eq!(r3.time, 60);
        assert_eq!(r3.score_history, vec![215, 125, 50]);
        assert_eq!(r3.time_history, vec![60, 30, 10]);
    }

    #[test]
    fn test_keep_mode_leaves_rings_alone() {
        let r1 = apply(None, &submission("a", 50, 10));
        let r2 = merge_submission(
            Some(&r1),
            &submission("a", 25, 5),
            HistoryMode::Keep,
            Utc::now(),
        );
        assert_eq!(r2.score, 75);
        assert_eq!(r2.score_history, vec![50]);
        assert_eq!(r2.time_history, vec![10]);
    }

    #[test]
    fn test_game_mode_ids_never_lose_members() {
        let r1 = apply(None, &submission("a", 10, 1));
        let r2 = apply(Some(r1), &submission("b", 10, 1));
        let r3 = apply(Some(r2), &submission("a", 10, 1));
        assert_eq!(r3.game_mode_ids, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(r3.placed_terms, vec!["fox".to_string()]);
    }

    #[test]
    fn test_completion_is_sticky() {
        let mut done = submission("a", 10, 1);
        done.is_completed = true;
        let r1 = apply(None, &done);
        let r2 = apply(Some(r1), &submission("a", 10, 1));
        assert!(r2.is_completed);
    }

    #[test]
    fn test_track_on_existing_only_touches_ids() {
        let r1 = apply(None, &submission("a", 50, 12));
        let tracked = merge_tracked_mode(Some(&r1), &r1.key(), "b", Utc::now());
        assert_eq!(tracked.score, 50);
        assert_eq!(tracked.time, 12);
        assert_eq!(tracked.score_history, r1.score_history);
        assert_eq!(tracked.id, r1.id);
        assert_eq!(tracked.game_mode_ids, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_track_without_record_creates_placeholder() {
        let key = AggregateKey::new("u1", "eco", 2);
        let r = merge_tracked_mode(None, &key, "a", Utc::now());
        assert_eq!(r.score, 0);
        assert_eq!(r.level_number, 2);
        assert!(r.score_history.is_empty());
        assert!(!r.is_completed);
    }

    #[test]
    fn test_completion_marks_and_unions() {
        let key = AggregateKey::new("u1", "eco", 1);
        let r = merge_completion(None, &key, "a", Utc::now());
        assert!(r.is_completed);
        assert!(r.has_game_mode("a"));
    }

    #[test]
    fn test_zero_total_terms_keeps_previous() {
        let r1 = apply(None, &submission("a", 10, 1));
        let mut s = submission("a", 10, 1);
        s.total_terms = 0;
        let r2 = apply(Some(r1), &s);
        assert_eq!(r2.total_terms, 4);
    }
}
