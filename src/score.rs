use log::warn;
use serde::Serialize;

use crate::classify::DEFAULT_CHOICE;
use crate::layout::SheetLayout;

/// Per-subject correct counts, in declared subject order, plus the total.
/// No partial credit, no negative marking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScoreReport {
    pub per_subject: Vec<u32>,
    pub total: u32,
}

/// Counts matching positions per contiguous subject segment. Never fails:
/// both sequences are forced to the layout's length first, so a short or
/// long sheet still scores.
pub fn score(student: &[u8], key: &[u8], layout: &SheetLayout) -> ScoreReport {
    let expected = layout.total_questions();
    if expected == 0 {
        return ScoreReport {
            per_subject: vec![0; layout.num_subjects as usize],
            total: 0,
        };
    }

    let student = align_answers(student, expected, "student sheet");
    let key = align_answers(key, expected, "answer key");

    let segment = layout.questions_per_subject as usize;
    let per_subject = student
        .chunks(segment)
        .zip(key.chunks(segment))
        .map(|(marked, correct)| {
            marked
                .iter()
                .zip(correct)
                .filter(|(a, b)| a == b)
                .count() as u32
        })
        .collect::<Vec<u32>>();
    let total = per_subject.iter().sum();

    ScoreReport { per_subject, total }
}

/// Forces `answers` to exactly `expected` entries: excess is dropped and
/// missing slots fill with the default choice. A mismatch is logged, never
/// fatal.
fn align_answers(answers: &[u8], expected: usize, label: &str) -> Vec<u8> {
    if answers.len() != expected {
        warn!(
            "{label} has {} answers, expected {expected}; truncating/padding with defaults",
            answers.len()
        );
    }
    let mut aligned = answers.to_vec();
    aligned.truncate(expected);
    aligned.resize(expected, DEFAULT_CHOICE);
    aligned
}
