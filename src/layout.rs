use serde::{Deserialize, Serialize};

/// Height in pixels every sheet is resized to before thresholding. Width is
/// derived from the original aspect ratio.
pub const CANONICAL_HEIGHT: u32 = 1200;

/// Declared shape of an answer sheet: how many subject columns it carries,
/// how many questions each subject has, and how many choices per question.
///
/// Layout parameters are supplied by the caller (derived from the uploaded
/// answer key); the pipeline performs no layout inference of its own beyond
/// choosing a locator strategy.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SheetLayout {
    pub num_subjects: u32,
    pub questions_per_subject: u32,
    pub choices_per_question: u32,
}

/// The known reference sheet: five subject bands of twenty questions with
/// four choices each.
pub const FIXED_TEMPLATE_LAYOUT: SheetLayout = SheetLayout {
    num_subjects: 5,
    questions_per_subject: 20,
    choices_per_question: 4,
};

impl SheetLayout {
    pub fn new(num_subjects: u32, questions_per_subject: u32, choices_per_question: u32) -> Self {
        Self {
            num_subjects,
            questions_per_subject,
            choices_per_question,
        }
    }

    /// Total number of answer slots on the sheet.
    pub fn total_questions(&self) -> usize {
        (self.num_subjects * self.questions_per_subject) as usize
    }

    /// Whether this layout matches the reference sheet whose physical
    /// arrangement is known well enough to slice without contour analysis.
    pub fn matches_fixed_template(&self) -> bool {
        *self == FIXED_TEMPLATE_LAYOUT
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_questions_is_product_of_subjects_and_questions() {
        assert_eq!(SheetLayout::new(5, 20, 4).total_questions(), 100);
        assert_eq!(SheetLayout::new(2, 3, 4).total_questions(), 6);
        assert_eq!(SheetLayout::new(0, 20, 4).total_questions(), 0);
    }

    #[test]
    fn only_the_reference_shape_matches_the_fixed_template() {
        assert!(SheetLayout::new(5, 20, 4).matches_fixed_template());
        assert!(!SheetLayout::new(5, 20, 5).matches_fixed_template());
        assert!(!SheetLayout::new(4, 20, 4).matches_fixed_template());
        assert!(!SheetLayout::new(5, 10, 4).matches_fixed_template());
    }
}
