use std::path::{Path, PathBuf};

use image::GrayImage;
use log::info;
use logging_timer::time;
use serde::Serialize;

use crate::classify::{classify_question, DEFAULT_CHOICE};
use crate::debug::ImageDebugWriter;
use crate::key::{build_answer_key, AnswerKey, SubjectColumn};
use crate::layout::SheetLayout;
use crate::locate::{locator_for_layout, BubbleLocator};
use crate::normalize::{binarize_sheet, normalize};
use crate::score::{score, ScoreReport};

/// Why a sheet could not be processed. Recoverable conditions (layout
/// mismatches, malformed questions, unrecognized key cells) never appear
/// here; they resolve to default answers inside the pipeline.
#[derive(Debug)]
pub enum ProcessSheetError {
    /// The supplied bytes are not a decodable image.
    DecodeError,
    /// The sheet image file could not be opened or decoded.
    ImageOpenError(PathBuf),
}

/// Counts of fallback substitutions made while evaluating one sheet.
/// Informational only; the substitutions themselves always happen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Diagnostics {
    /// Answer key cells that did not map to a valid choice.
    pub defaulted_key_entries: usize,
    /// Contour rows discarded for having the wrong bubble count.
    pub dropped_rows: usize,
    /// Answer slots filled with the default because fewer questions were
    /// located than the layout declares.
    pub padded_answers: usize,
}

/// Everything produced from one sheet image.
#[derive(Debug, Clone)]
pub struct SheetEvaluation {
    pub answers: Vec<u8>,
    pub report: ScoreReport,
    pub diagnostics: Diagnostics,
}

/// Immutable configuration for one evaluation run: the canonical key, the
/// subject names it came with, and the declared sheet layout. Built once
/// per uploaded key and shared by reference across sheets; sheets are
/// independent units of work with no state between them.
pub struct EvalSession {
    layout: SheetLayout,
    key: AnswerKey,
    subject_names: Vec<String>,
    defaulted_key_entries: usize,
    locator: Box<dyn BubbleLocator + Send + Sync>,
}

impl EvalSession {
    pub fn from_columns(columns: &[SubjectColumn], layout: SheetLayout) -> Self {
        let (key, subject_names, defaulted_key_entries) =
            build_answer_key(columns, layout.choices_per_question);
        Self {
            locator: locator_for_layout(&layout),
            layout,
            key,
            subject_names,
            defaulted_key_entries,
        }
    }

    pub fn layout(&self) -> &SheetLayout {
        &self.layout
    }

    pub fn subject_names(&self) -> &[String] {
        &self.subject_names
    }

    pub fn answer_key(&self) -> &[u8] {
        &self.key
    }

    /// Full pipeline for one sheet supplied as encoded PNG/JPEG bytes.
    pub fn process_sheet_bytes(
        &self,
        bytes: &[u8],
        debug: &ImageDebugWriter,
    ) -> Result<SheetEvaluation, ProcessSheetError> {
        let mask = normalize(bytes)?;
        Ok(self.evaluate_mask(&mask, debug))
    }

    /// Same pipeline, reading the sheet image from disk.
    pub fn process_sheet_path(
        &self,
        path: &Path,
        debug: &ImageDebugWriter,
    ) -> Result<SheetEvaluation, ProcessSheetError> {
        let decoded = image::open(path)
            .map_err(|_| ProcessSheetError::ImageOpenError(path.to_path_buf()))?;
        let mask = binarize_sheet(&decoded);
        Ok(self.evaluate_mask(&mask, debug))
    }

    fn evaluate_mask(&self, mask: &GrayImage, debug: &ImageDebugWriter) -> SheetEvaluation {
        debug.write_mask(mask);
        let (answers, stats) =
            extract_answers(mask, &self.layout, self.locator.as_ref(), debug);
        let report = score(&answers, &self.key, &self.layout);
        SheetEvaluation {
            report,
            diagnostics: Diagnostics {
                defaulted_key_entries: self.defaulted_key_entries,
                dropped_rows: stats.dropped_rows,
                padded_answers: stats.padded_answers,
            },
            answers,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct ExtractionStats {
    dropped_rows: usize,
    padded_answers: usize,
}

/// Turns a binarized sheet into a full-length answer sequence with the
/// locator chosen for `layout`. Always returns exactly
/// `layout.total_questions()` answers, whatever the detector found.
#[time]
fn extract_answers(
    mask: &GrayImage,
    layout: &SheetLayout,
    locator: &(dyn BubbleLocator + Send + Sync),
    debug: &ImageDebugWriter,
) -> (Vec<u8>, ExtractionStats) {
    let located = locator.locate(mask);
    debug.write_candidates(mask, &located.candidate_rects);

    let expected = layout.total_questions();
    let mut answers = located
        .questions
        .iter()
        .map(|question| {
            classify_question(
                mask,
                question,
                locator.min_fill_ratio(),
                layout.choices_per_question,
            )
        })
        .collect::<Vec<u8>>();

    let mut stats = ExtractionStats {
        dropped_rows: located.dropped_rows,
        ..ExtractionStats::default()
    };
    if answers.len() != expected {
        info!(
            "located {} questions, expected {expected}; aligning with defaults",
            answers.len()
        );
    }
    if answers.len() < expected {
        stats.padded_answers = expected - answers.len();
    }
    answers.truncate(expected);
    answers.resize(expected, DEFAULT_CHOICE);
    (answers, stats)
}

/// Decode + normalize + locate + classify with no scoring: the student
/// answer sequence for one sheet.
#[time]
pub fn normalize_and_extract(
    bytes: &[u8],
    layout: &SheetLayout,
) -> Result<Vec<u8>, ProcessSheetError> {
    let mask = normalize(bytes)?;
    let locator = locator_for_layout(layout);
    let (answers, _) =
        extract_answers(&mask, layout, locator.as_ref(), &ImageDebugWriter::disabled());
    Ok(answers)
}
