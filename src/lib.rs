//! Scores photographed optical-mark-recognition answer sheets against an
//! answer key.
//!
//! The pipeline normalizes a photo to a binary ink mask, locates candidate
//! bubbles (by slicing the known reference template or by contour
//! analysis), classifies each question's fill, and scores the resulting
//! answers per subject. Heterogeneous answer-key encodings (letters,
//! numbers, annotated cells) normalize to the same 1-based choice indices
//! before comparison.

pub mod classify;
pub mod debug;
pub mod image_utils;
pub mod key;
pub mod layout;
pub mod locate;
pub mod normalize;
pub mod score;
pub mod session;
pub mod store;
pub mod types;

pub use key::{build_answer_key, normalize_entry, AnswerKey, KeyFile, RawEntry, SubjectColumn};
pub use layout::{SheetLayout, CANONICAL_HEIGHT, FIXED_TEMPLATE_LAYOUT};
pub use score::{score, ScoreReport};
pub use session::{
    normalize_and_extract, Diagnostics, EvalSession, ProcessSheetError, SheetEvaluation,
};
