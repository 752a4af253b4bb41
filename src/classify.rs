use image::GrayImage;

use crate::image_utils::foreground_ratio_in_rect;
use crate::locate::Question;

/// Minimum winning fill ratio when regions come from contour detection.
pub const CONTOUR_MIN_FILL: f32 = 0.10;

/// Minimum winning fill ratio for fixed-grid slices, which are larger than a
/// bubble and therefore dilute the mark.
pub const FIXED_GRID_MIN_FILL: f32 = 0.05;

/// The answer substituted whenever nothing is clearly marked or a question
/// is degenerate. Ambiguity always resolves to a defined value, never to an
/// absence.
pub const DEFAULT_CHOICE: u8 = 1;

/// Picks the marked choice for one question: the region with the highest
/// foreground fraction, provided that fraction clears `min_fill`. Questions
/// with the wrong number of regions resolve to the default.
pub fn classify_question(
    mask: &GrayImage,
    question: &Question,
    min_fill: f32,
    expected_choices: u32,
) -> u8 {
    if question.choices.len() != expected_choices as usize {
        return DEFAULT_CHOICE;
    }
    let ratios = question
        .choices
        .iter()
        .map(|region| foreground_ratio_in_rect(mask, &region.bounds))
        .collect::<Vec<f32>>();
    select_choice(&ratios, min_fill)
}

/// Threshold rule over per-choice fill fractions: 1-based index of the
/// maximum, if it exceeds `min_fill`; the default choice otherwise. Ties go
/// to the earliest choice.
pub fn select_choice(ratios: &[f32], min_fill: f32) -> u8 {
    let mut best_index = 0usize;
    let mut best_ratio = f32::NEG_INFINITY;
    for (index, &ratio) in ratios.iter().enumerate() {
        if ratio > best_ratio {
            best_index = index;
            best_ratio = ratio;
        }
    }
    if !ratios.is_empty() && best_ratio > min_fill {
        (best_index + 1) as u8
    } else {
        DEFAULT_CHOICE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image_utils::{BLACK, WHITE};
    use crate::locate::BubbleRegion;
    use imageproc::rect::Rect;

    #[test]
    fn picks_the_only_ratio_above_threshold() {
        assert_eq!(select_choice(&[0.02, 0.08, 0.01, 0.00], 0.05), 2);
    }

    #[test]
    fn all_below_threshold_falls_back_to_default() {
        assert_eq!(select_choice(&[0.02, 0.03, 0.01, 0.00], 0.05), DEFAULT_CHOICE);
    }

    #[test]
    fn empty_ratios_fall_back_to_default() {
        assert_eq!(select_choice(&[], 0.05), DEFAULT_CHOICE);
    }

    #[test]
    fn ties_resolve_to_the_earliest_choice() {
        assert_eq!(select_choice(&[0.4, 0.4, 0.1, 0.1], 0.05), 1);
    }

    #[test]
    fn a_full_region_wins_at_every_position() {
        let choices = 4u32;
        for marked in 0..choices as usize {
            let mut mask = GrayImage::from_pixel(40, 10, BLACK);
            for y in 0..10 {
                for x in (marked as u32 * 10)..(marked as u32 * 10 + 10) {
                    mask.put_pixel(x, y, WHITE);
                }
            }
            let question = Question {
                choices: (0..choices)
                    .map(|c| BubbleRegion::from_rect(Rect::at(c as i32 * 10, 0).of_size(10, 10)))
                    .collect(),
            };
            assert_eq!(
                classify_question(&mask, &question, FIXED_GRID_MIN_FILL, choices),
                (marked + 1) as u8
            );
        }
    }

    #[test]
    fn wrong_cardinality_is_malformed_and_defaults() {
        let mask = GrayImage::from_pixel(40, 10, WHITE);
        let question = Question {
            choices: vec![BubbleRegion::from_rect(Rect::at(0, 0).of_size(10, 10))],
        };
        assert_eq!(classify_question(&mask, &question, 0.05, 4), DEFAULT_CHOICE);
    }
}
