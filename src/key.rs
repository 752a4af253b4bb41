use log::warn;
use serde::Deserialize;

use crate::classify::DEFAULT_CHOICE;
use crate::layout::SheetLayout;

/// Canonical answer key: one 1-based choice index per question, flattened
/// subject by subject in declared column order. Built once per uploaded key
/// and immutable afterward.
pub type AnswerKey = Vec<u8>;

/// One cell of an uploaded answer key, before normalization. Keys arrive
/// from spreadsheet-shaped files, so a cell may hold a letter, a number, an
/// annotated string like `"12 - c"`, or nothing at all.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawEntry {
    Number(f64),
    Text(String),
    Other(serde_json::Value),
}

impl RawEntry {
    pub fn is_null(&self) -> bool {
        matches!(self, RawEntry::Other(serde_json::Value::Null))
    }
}

/// One subject column of a key file: subject name plus its per-question
/// entries in row order.
#[derive(Debug, Clone, Deserialize)]
pub struct SubjectColumn {
    pub name: String,
    pub answers: Vec<RawEntry>,
}

/// On-disk answer key document: ordered subject columns.
#[derive(Debug, Clone, Deserialize)]
pub struct KeyFile {
    pub subjects: Vec<SubjectColumn>,
}

impl KeyFile {
    /// Layout implied by this key: one subject per column, question count
    /// from the tallest column, choice count supplied by the caller.
    pub fn derive_layout(&self, choices_per_question: u32) -> SheetLayout {
        let questions_per_subject = self
            .subjects
            .iter()
            .map(|column| column.answers.len())
            .max()
            .unwrap_or(0) as u32;
        SheetLayout::new(
            self.subjects.len() as u32,
            questions_per_subject,
            choices_per_question,
        )
    }
}

/// Maps one raw key entry to a canonical 1-based choice index. Never fails:
/// anything unrecognized becomes the default choice.
pub fn normalize_entry(entry: &RawEntry, choices_per_question: u32) -> u8 {
    recognize_entry(entry, choices_per_question).unwrap_or(DEFAULT_CHOICE)
}

/// Builds the canonical key from ordered subject columns. Null cells are
/// skipped (not padded); unrecognized cells become the default choice and
/// are counted. Returns the flattened key, the subject names in declared
/// order, and how many cells fell back to the default.
pub fn build_answer_key(
    columns: &[SubjectColumn],
    choices_per_question: u32,
) -> (AnswerKey, Vec<String>, usize) {
    let mut key = Vec::new();
    let mut subject_names = Vec::with_capacity(columns.len());
    let mut defaulted = 0;

    for column in columns {
        subject_names.push(column.name.clone());
        for entry in &column.answers {
            if entry.is_null() {
                continue;
            }
            match recognize_entry(entry, choices_per_question) {
                Some(choice) => key.push(choice),
                None => {
                    defaulted += 1;
                    key.push(DEFAULT_CHOICE);
                }
            }
        }
    }

    if defaulted > 0 {
        warn!("{defaulted} answer key entries were unrecognized and defaulted to choice 1");
    }
    (key, subject_names, defaulted)
}

/// Tries the recognized encodings; `None` means the entry is unrecognized
/// and the caller substitutes the default.
fn recognize_entry(entry: &RawEntry, choices_per_question: u32) -> Option<u8> {
    match entry {
        // Numeric cells truncate toward zero before the range check.
        RawEntry::Number(n) => choice_in_range(*n as i64, choices_per_question),
        RawEntry::Text(text) => recognize_text(text, choices_per_question),
        RawEntry::Other(_) => None,
    }
}

fn recognize_text(text: &str, choices_per_question: u32) -> Option<u8> {
    let cell = text.trim();
    // Spreadsheet cells often embed the question label: "12 - c" means "c".
    let token = match cell.split(" - ").nth(1) {
        Some(rest) => rest.trim(),
        None => cell,
    };

    if let Some(choice) = letter_to_choice(token) {
        return (choice as u32 <= choices_per_question).then_some(choice);
    }
    match token.parse::<i64>() {
        Ok(n) => choice_in_range(n, choices_per_question),
        Err(_) => None,
    }
}

fn letter_to_choice(token: &str) -> Option<u8> {
    let mut chars = token.chars();
    let (Some(letter), None) = (chars.next(), chars.next()) else {
        return None;
    };
    match letter.to_ascii_lowercase() {
        'a' => Some(1),
        'b' => Some(2),
        'c' => Some(3),
        'd' => Some(4),
        _ => None,
    }
}

fn choice_in_range(n: i64, choices_per_question: u32) -> Option<u8> {
    (n >= 1 && n <= choices_per_question as i64).then_some(n as u8)
}
