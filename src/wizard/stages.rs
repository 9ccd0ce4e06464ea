use std::collections::BTreeMap;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StageKind {
    /// Every listed field must be non-empty.
    Fields,
    /// Summary stage derived from earlier answers; all fields required.
    Synthesis,
    /// Optional file; always satisfied.
    Attachment,
}

pub struct StageDefinition {
    pub number: u8,
    pub title: &'static str,
    pub fields: &'static [&'static str],
    pub kind: StageKind,
}

pub const ALL_STAGES: &[StageDefinition] = &[
    StageDefinition {
        number: 1,
        title: "About you",
        fields: &["full_name", "organization", "role"],
        kind: StageKind::Fields,
    },
    StageDefinition {
        number: 2,
        title: "The problem",
        fields: &["problem"],
        kind: StageKind::Fields,
    },
    StageDefinition {
        number: 3,
        title: "Who it affects",
        fields: &["audience"],
        kind: StageKind::Fields,
    },
    StageDefinition {
        number: 4,
        title: "Goals",
        fields: &["goals"],
        kind: StageKind::Fields,
    },
    StageDefinition {
        number: 5,
        title: "Constraints",
        fields: &["constraints"],
        kind: StageKind::Fields,
    },
    StageDefinition {
        number: 6,
        title: "Ideas",
        fields: &["ideas"],
        kind: StageKind::Fields,
    },
    StageDefinition {
        number: 7,
        title: "Prototype",
        fields: &["prototype"],
        kind: StageKind::Fields,
    },
    StageDefinition {
        number: 8,
        title: "Feedback",
        fields: &["feedback"],
        kind: StageKind::Fields,
    },
    StageDefinition {
        number: 9,
        title: "Synthesis",
        fields: &[
            "summary_problem",
            "summary_audience",
            "summary_goals",
            "summary_constraints",
            "summary_solution",
            "next_steps",
        ],
        kind: StageKind::Synthesis,
    },
    StageDefinition {
        number: 10,
        title: "Supporting file",
        fields: &[],
        kind: StageKind::Attachment,
    },
];

pub const FIRST_STAGE: u8 = 1;
pub const LAST_STAGE: u8 = 10;

/// Stages that count towards the progress percentage.
pub const INPUT_STAGES: &[u8] = &[1, 2, 3, 4, 5, 6, 7, 8];

pub fn stage(number: u8) -> Option<&'static StageDefinition> {
    ALL_STAGES.iter().find(|s| s.number == number)
}

impl StageDefinition {
    pub fn is_satisfied(&self, answers: &BTreeMap<String, String>) -> bool {
        match self.kind {
            StageKind::Attachment => true,
            StageKind::Fields | StageKind::Synthesis => self.fields.iter().all(|f| {
                answers
                    .get(*f)
                    .map(|v| !v.trim().is_empty())
                    .unwrap_or(false)
            }),
        }
    }

    pub fn owns_field(&self, field: &str) -> bool {
        self.fields.contains(&field)
    }
}

pub fn stage_for_field(field: &str) -> Option<&'static StageDefinition> {
    ALL_STAGES.iter().find(|s| s.owns_field(field))
}

/// `completed input stages / input stages * 100`.
pub fn progress_percentage(completed: &[u8]) -> f64 {
    let done = INPUT_STAGES
        .iter()
        .filter(|n| completed.contains(n))
        .count();
    done as f64 / INPUT_STAGES.len() as f64 * 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn answers(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn stage_numbers_are_contiguous() {
        for (i, s) in ALL_STAGES.iter().enumerate() {
            assert_eq!(s.number as usize, i + 1);
        }
        assert_eq!(ALL_STAGES.len(), LAST_STAGE as usize);
    }

    #[test]
    fn first_stage_needs_all_three_fields() {
        let s = stage(1).unwrap();
        assert!(!s.is_satisfied(&answers(&[("full_name", "Ada"), ("organization", "Lab")])));
        assert!(!s.is_satisfied(&answers(&[
            ("full_name", "Ada"),
            ("organization", "Lab"),
            ("role", "   "),
        ])));
        assert!(s.is_satisfied(&answers(&[
            ("full_name", "Ada"),
            ("organization", "Lab"),
            ("role", "Lead"),
        ])));
    }

    #[test]
    fn synthesis_needs_six_fields() {
        let s = stage(9).unwrap();
        assert_eq!(s.fields.len(), 6);
        let mut a = BTreeMap::new();
        for f in &s.fields[..5] {
            a.insert(f.to_string(), "x".to_string());
        }
        assert!(!s.is_satisfied(&a));
        a.insert("next_steps".into(), "ship".into());
        assert!(s.is_satisfied(&a));
    }

    #[test]
    fn attachment_stage_is_always_satisfied() {
        assert!(stage(10).unwrap().is_satisfied(&BTreeMap::new()));
    }

    #[test]
    fn progress_ignores_synthesis_and_attachment() {
        assert_eq!(progress_percentage(&[]), 0.0);
        assert_eq!(progress_percentage(&[1, 2]), 25.0);
        assert_eq!(progress_percentage(&[9, 10]), 0.0);
        assert_eq!(progress_percentage(&[1, 2, 3, 4, 5, 6, 7, 8, 9, 10]), 100.0);
    }

    #[test]
    fn fields_map_back_to_stage() {
        assert_eq!(stage_for_field("role").unwrap().number, 1);
        assert_eq!(stage_for_field("next_steps").unwrap().number, 9);
        assert!(stage_for_field("nope").is_none());
    }
}
