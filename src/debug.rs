use std::path::{Path, PathBuf};

use image::{DynamicImage, GrayImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;
use log::{info, warn};

use crate::image_utils::RAINBOW;

/// Writes intermediate pipeline images next to the input file when enabled;
/// a disabled writer does nothing, so the pipeline can call it
/// unconditionally.
pub struct ImageDebugWriter {
    input_path: Option<PathBuf>,
}

impl ImageDebugWriter {
    pub fn new(input_path: PathBuf) -> Self {
        Self {
            input_path: Some(input_path),
        }
    }

    pub fn disabled() -> Self {
        Self { input_path: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.input_path.is_some()
    }

    /// Path for a debug image labeled `label`, derived from the input path.
    fn output_path(&self, label: &str) -> Option<PathBuf> {
        let base = self.input_path.as_ref()?;
        let mut result = base.clone();
        result.set_file_name(format!(
            "{}_debug_{}.png",
            base.file_stem().unwrap_or_default().to_str().unwrap_or_default(),
            label
        ));
        Some(result)
    }

    /// Writes the binarized sheet mask.
    pub fn write_mask(&self, mask: &GrayImage) {
        let Some(path) = self.output_path("binarized") else {
            return;
        };
        save_image(&DynamicImage::ImageLuma8(mask.clone()), &path);
    }

    /// Writes the mask with every candidate region outlined in color.
    pub fn write_candidates(&self, mask: &GrayImage, candidate_rects: &[Rect]) {
        let Some(path) = self.output_path("candidates") else {
            return;
        };
        let mut canvas = DynamicImage::ImageLuma8(mask.clone()).to_rgb8();
        for (i, rect) in candidate_rects.iter().enumerate() {
            draw_hollow_rect_mut(&mut canvas, *rect, RAINBOW[i % RAINBOW.len()]);
        }
        save_image(&DynamicImage::ImageRgb8(canvas), &path);
    }
}

fn save_image(image: &DynamicImage, path: &Path) {
    match image.save(path) {
        Ok(()) => info!("wrote debug image {}", path.display()),
        Err(e) => warn!("failed to write debug image {}: {}", path.display(), e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image_utils::BLACK;

    #[test]
    fn disabled_writer_writes_nothing() {
        let writer = ImageDebugWriter::disabled();
        assert!(!writer.is_enabled());
        assert!(writer.output_path("binarized").is_none());
        // Must be callable without side effects.
        writer.write_mask(&GrayImage::from_pixel(4, 4, BLACK));
        writer.write_candidates(&GrayImage::from_pixel(4, 4, BLACK), &[]);
    }

    #[test]
    fn enabled_writer_places_images_next_to_the_input() {
        let dir = tempfile::tempdir().expect("tempdir");
        let input = dir.path().join("sheet01.png");
        let writer = ImageDebugWriter::new(input.clone());
        assert!(writer.is_enabled());

        let mask = GrayImage::from_pixel(16, 16, BLACK);
        writer.write_mask(&mask);
        writer.write_candidates(&mask, &[Rect::at(2, 2).of_size(5, 5)]);

        assert!(dir.path().join("sheet01_debug_binarized.png").exists());
        assert!(dir.path().join("sheet01_debug_candidates.png").exists());
    }
}
