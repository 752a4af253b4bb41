use std::f32::consts::PI;

use image::GrayImage;
use imageproc::contours::{find_contours_with_threshold, BorderType, Contour};
use imageproc::point::Point;
use imageproc::rect::Rect;
use log::{debug, warn};

use crate::classify::{CONTOUR_MIN_FILL, FIXED_GRID_MIN_FILL};
use crate::layout::SheetLayout;

/// A candidate mark location detected on the binarized sheet.
#[derive(Debug, Clone)]
pub struct BubbleRegion {
    /// Sample window for fill measurement.
    pub bounds: Rect,
    pub center: Point<i32>,
    pub area: f32,
    /// Shape outline; empty for fixed-grid slices.
    pub contour: Vec<Point<i32>>,
}

impl BubbleRegion {
    pub fn from_rect(bounds: Rect) -> Self {
        Self {
            center: center_of_rect(&bounds),
            area: (bounds.width() * bounds.height()) as f32,
            bounds,
            contour: Vec::new(),
        }
    }
}

/// An ordered set of candidate choice regions for one answer slot, left to
/// right.
#[derive(Debug, Clone)]
pub struct Question {
    pub choices: Vec<BubbleRegion>,
}

/// Outcome of a locator pass over one sheet.
#[derive(Debug, Clone, Default)]
pub struct LocatedSheet {
    /// Questions in reading order. May be shorter than the layout expects;
    /// the extraction step pads with defaults.
    pub questions: Vec<Question>,
    /// All candidate sample windows, for debug overlays.
    pub candidate_rects: Vec<Rect>,
    /// Contour rows discarded for having the wrong bubble count.
    pub dropped_rows: usize,
}

/// Finds answer regions on a binarized sheet, grouped into questions.
/// Implementations never fail: a sheet where nothing is found simply yields
/// no questions.
pub trait BubbleLocator {
    fn locate(&self, mask: &GrayImage) -> LocatedSheet;

    /// Minimum winning fill ratio for this locator's region shapes.
    fn min_fill_ratio(&self) -> f32;
}

/// Picks the locator for a declared layout: the known reference template is
/// sliced directly, everything else falls back to contour analysis.
pub fn locator_for_layout(layout: &SheetLayout) -> Box<dyn BubbleLocator + Send + Sync> {
    if layout.matches_fixed_template() {
        Box::new(FixedGridLocator::new(*layout))
    } else {
        Box::new(ContourLocator::new(*layout))
    }
}

fn center_of_rect(rect: &Rect) -> Point<i32> {
    Point::new(
        rect.left() + rect.width() as i32 / 2,
        rect.top() + rect.height() as i32 / 2,
    )
}

/// Slices the canvas along the reference sheet's known arrangement: one
/// equal-width vertical band per subject, question rows placed by a
/// piecewise formula over the band height, each row split evenly into
/// choice sub-regions ordered A.. left to right.
pub struct FixedGridLocator {
    layout: SheetLayout,
}

/// The reference sheet groups questions into four vertical quartiles, with
/// boundaries after questions 5, 10 and 15.
const QUARTILE_QUESTIONS: u32 = 5;

/// Denominator for the per-question row pitch within a band.
const ROW_PITCH_DIVISOR: u32 = 25;

impl FixedGridLocator {
    pub fn new(layout: SheetLayout) -> Self {
        Self { layout }
    }

    /// Vertical center of the row slice for a 1-based question index.
    fn question_row_y(height: u32, question: u32) -> i32 {
        let pitch = height / ROW_PITCH_DIVISOR;
        let quartile = (question - 1) / QUARTILE_QUESTIONS;
        let offset_in_quartile = (question - 1) % QUARTILE_QUESTIONS;
        (offset_in_quartile * pitch + quartile * height / 4) as i32
    }
}

impl BubbleLocator for FixedGridLocator {
    fn locate(&self, mask: &GrayImage) -> LocatedSheet {
        let (width, height) = mask.dimensions();
        let band_width = (width / self.layout.num_subjects).max(1);
        let choice_width = (band_width / self.layout.choices_per_question).max(1);
        let pitch = (height / ROW_PITCH_DIVISOR).max(1) as i32;

        let mut located = LocatedSheet::default();
        for subject in 0..self.layout.num_subjects {
            let band_left = (subject * band_width) as i32;
            for question in 1..=self.layout.questions_per_subject {
                let row_y = Self::question_row_y(height, question);
                let row_top = (row_y - pitch / 2).max(0);
                let row_bottom = (row_y + pitch / 2).min(height as i32);
                let row_height = ((row_bottom - row_top).max(1)) as u32;

                let choices = (0..self.layout.choices_per_question)
                    .map(|choice| {
                        let left = band_left + (choice * choice_width) as i32;
                        let bounds = Rect::at(left, row_top).of_size(choice_width, row_height);
                        BubbleRegion::from_rect(bounds)
                    })
                    .collect::<Vec<BubbleRegion>>();
                located
                    .candidate_rects
                    .extend(choices.iter().map(|region| region.bounds));
                located.questions.push(Question { choices });
            }
        }
        located
    }

    fn min_fill_ratio(&self) -> f32 {
        FIXED_GRID_MIN_FILL
    }
}

/// Detects bubbles as near-circular external contours and groups them into
/// question rows by vertical proximity.
pub struct ContourLocator {
    layout: SheetLayout,
}

/// Candidate area bounds, as fractions of the whole image area.
const MIN_AREA_FRACTION: f32 = 0.0001;
const MAX_AREA_FRACTION: f32 = 0.01;

/// 4*pi*area/perimeter^2; 1.0 is a perfect circle.
const MIN_CIRCULARITY: f32 = 0.3;

/// Bounding boxes must be roughly square.
const MIN_ASPECT_RATIO: f32 = 0.6;
const MAX_ASPECT_RATIO: f32 = 1.4;

/// Both bounding dimensions must exceed this many pixels.
const MIN_BUBBLE_DIMENSION: u32 = 10;

/// Bubbles whose centers are within this many pixels of the bubble that
/// opened the current row belong to the same row.
const ROW_TOLERANCE: i32 = 30;

/// The fill sample window extends this far beyond the contour bounds.
const SAMPLE_PADDING: i32 = 2;

impl ContourLocator {
    pub fn new(layout: SheetLayout) -> Self {
        Self { layout }
    }

    /// All bubble-shaped external contours, sorted by (center-y, center-x).
    fn find_bubble_candidates(&self, mask: &GrayImage) -> Vec<BubbleRegion> {
        let image_area = (mask.width() * mask.height()) as f32;
        let contours = find_contours_with_threshold::<i32>(mask, 0);
        let mut candidates = contours
            .iter()
            .filter(|contour| {
                contour.border_type == BorderType::Outer && contour.parent.is_none()
            })
            .filter_map(|contour| bubble_from_contour(contour, image_area))
            .collect::<Vec<BubbleRegion>>();
        debug!("found {} bubble candidates", candidates.len());
        candidates.sort_by_key(|bubble| (bubble.center.y, bubble.center.x));
        candidates
    }

    /// Groups row-sorted candidates into questions. A row is accepted only
    /// if it holds exactly the declared number of choices; other rows are
    /// dropped, not defaulted.
    fn group_into_questions(&self, candidates: Vec<BubbleRegion>) -> LocatedSheet {
        let mut located = LocatedSheet {
            candidate_rects: candidates.iter().map(|b| b.bounds).collect(),
            ..LocatedSheet::default()
        };

        let Some(first) = candidates.first() else {
            return located;
        };
        let choices = self.layout.choices_per_question as usize;
        let mut row_y = first.center.y;
        let mut row: Vec<BubbleRegion> = Vec::new();

        for bubble in candidates {
            if (bubble.center.y - row_y).abs() <= ROW_TOLERANCE {
                row.push(bubble);
            } else {
                close_row(&mut located, std::mem::take(&mut row), choices);
                row_y = bubble.center.y;
                row.push(bubble);
            }
        }
        close_row(&mut located, row, choices);

        if located.dropped_rows > 0 {
            warn!(
                "dropped {} rows with bubble counts != {}",
                located.dropped_rows, choices
            );
        }
        located
    }
}

fn close_row(located: &mut LocatedSheet, mut row: Vec<BubbleRegion>, choices: usize) {
    if row.len() == choices {
        row.sort_by_key(|bubble| bubble.center.x);
        located.questions.push(Question { choices: row });
    } else if !row.is_empty() {
        located.dropped_rows += 1;
    }
}

impl BubbleLocator for ContourLocator {
    fn locate(&self, mask: &GrayImage) -> LocatedSheet {
        let candidates = self.find_bubble_candidates(mask);
        self.group_into_questions(candidates)
    }

    fn min_fill_ratio(&self) -> f32 {
        CONTOUR_MIN_FILL
    }
}

/// Filters one contour through the bubble shape gates; `None` if it cannot
/// be a bubble.
fn bubble_from_contour(contour: &Contour<i32>, image_area: f32) -> Option<BubbleRegion> {
    let area = contour_area(&contour.points);
    if area < image_area * MIN_AREA_FRACTION || area > image_area * MAX_AREA_FRACTION {
        return None;
    }

    let perimeter = contour_perimeter(&contour.points);
    if perimeter == 0.0 {
        return None;
    }
    let circularity = 4.0 * PI * area / (perimeter * perimeter);

    let shape_bounds = contour_bounding_rect(&contour.points)?;
    let aspect_ratio = shape_bounds.width() as f32 / shape_bounds.height() as f32;

    if circularity > MIN_CIRCULARITY
        && (MIN_ASPECT_RATIO..=MAX_ASPECT_RATIO).contains(&aspect_ratio)
        && shape_bounds.width() > MIN_BUBBLE_DIMENSION
        && shape_bounds.height() > MIN_BUBBLE_DIMENSION
    {
        Some(BubbleRegion {
            bounds: pad_rect(&shape_bounds, SAMPLE_PADDING),
            center: center_of_rect(&shape_bounds),
            area,
            contour: contour.points.clone(),
        })
    } else {
        None
    }
}

/// Signed shoelace area of a closed point sequence, made absolute.
fn contour_area(points: &[Point<i32>]) -> f32 {
    if points.len() < 3 {
        return 0.0;
    }
    let mut doubled = 0i64;
    for (i, p) in points.iter().enumerate() {
        let q = &points[(i + 1) % points.len()];
        doubled += p.x as i64 * q.y as i64 - q.x as i64 * p.y as i64;
    }
    doubled.abs() as f32 / 2.0
}

/// Arc length of a closed point sequence.
fn contour_perimeter(points: &[Point<i32>]) -> f32 {
    if points.len() < 2 {
        return 0.0;
    }
    let mut length = 0.0f32;
    for (i, p) in points.iter().enumerate() {
        let q = &points[(i + 1) % points.len()];
        let dx = (p.x - q.x) as f32;
        let dy = (p.y - q.y) as f32;
        length += (dx * dx + dy * dy).sqrt();
    }
    length
}

fn contour_bounding_rect(points: &[Point<i32>]) -> Option<Rect> {
    let first = points.first()?;
    let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
    for p in points {
        min_x = min_x.min(p.x);
        min_y = min_y.min(p.y);
        max_x = max_x.max(p.x);
        max_y = max_y.max(p.y);
    }
    Some(Rect::at(min_x, min_y).of_size((max_x - min_x + 1) as u32, (max_y - min_y + 1) as u32))
}

fn pad_rect(rect: &Rect, padding: i32) -> Rect {
    Rect::at(rect.left() - padding, rect.top() - padding).of_size(
        rect.width() + 2 * padding as u32,
        rect.height() + 2 * padding as u32,
    )
}
