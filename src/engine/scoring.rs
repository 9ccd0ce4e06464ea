/// Percentage score for a finished round, rounded to the nearest point.
pub fn compute_score(total_correct: usize, total_terms: usize) -> u64 {
    if total_terms == 0 {
        return 0;
    }
    let pct = total_correct.min(total_terms) as f64 / total_terms as f64 * 100.0;
    pct.round() as u64
}

/// Fraction of a module's types the learner has finished.
pub fn completion_ratio(completed_types: usize, total_types: usize) -> f64 {
    if total_types == 0 {
        return 0.0;
    }
    (completed_types as f64 / total_types as f64).clamp(0.0, 1.0)
}

/// Mean of a list of scores, 0 when there is nothing to average.
pub fn average(values: &[u64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<u64>() as f64 / values.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_round_scores_zero() {
        assert_eq!(compute_score(0, 0), 0);
    }

    #[test]
    fn test_score_rounds_to_nearest() {
        assert_eq!(compute_score(2, 3), 67);
        assert_eq!(compute_score(1, 3), 33);
        assert_eq!(compute_score(4, 4), 100);
    }

    #[test]
    fn test_score_never_exceeds_hundred() {
        assert_eq!(compute_score(9, 4), 100);
    }

    #[test]
    fn test_average_of_nothing_is_zero() {
        assert_eq!(average(&[]), 0.0);
        assert!((average(&[10, 40]) - 25.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_completion_ratio() {
        assert_eq!(completion_ratio(0, 0), 0.0);
        assert!((completion_ratio(1, 4) - 0.25).abs() < f64::EPSILON);
    }
}
