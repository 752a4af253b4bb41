use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage};
use imageproc::contrast::{otsu_level, threshold};
use imageproc::distance_transform::Norm;
use imageproc::filter::gaussian_blur_f32;
use imageproc::morphology::close;
use logging_timer::time;

use crate::layout::CANONICAL_HEIGHT;
use crate::session::ProcessSheetError;

/// Tile grid used for local contrast equalization.
const EQUALIZE_TILES: u32 = 8;

/// Histogram clip limit, as a multiple of the mean bin height. Bins above
/// the limit are clipped and the excess redistributed, which keeps
/// near-uniform tiles from amplifying noise.
const EQUALIZE_CLIP_LIMIT: f32 = 2.0;

/// Sigma of the pre-threshold smoothing blur; roughly a 3x3 kernel. Enough
/// to suppress sensor noise without erasing bubble edges.
const SMOOTHING_SIGMA: f32 = 0.8;

/// Radius of the structuring element for the post-threshold closing that
/// fills small gaps inside marks.
const CLOSE_RADIUS: u8 = 1;

/// Decodes raw PNG/JPEG bytes and binarizes the sheet. The only fatal
/// condition in the whole pipeline: bytes that are not a decodable image.
#[time]
pub fn normalize(bytes: &[u8]) -> Result<GrayImage, ProcessSheetError> {
    let decoded = image::load_from_memory(bytes).map_err(|_| ProcessSheetError::DecodeError)?;
    Ok(binarize_sheet(&decoded))
}

/// Turns a decoded photograph into a binary ink mask on the canonical
/// canvas: resize to the canonical height preserving aspect ratio, equalize
/// local contrast against uneven lighting, smooth, Otsu-threshold with ink
/// as foreground, and close small gaps inside marks.
///
/// No perspective or rotation correction is applied; callers are expected to
/// supply an upright, reasonably flat photograph.
#[time]
pub fn binarize_sheet(decoded: &DynamicImage) -> GrayImage {
    let gray = resize_to_canonical_height(&decoded.to_luma8());
    let equalized = equalize_local_contrast(&gray);
    let smoothed = gaussian_blur_f32(&equalized, SMOOTHING_SIGMA);
    let mut mask = threshold(&smoothed, otsu_level(&smoothed));
    // threshold() leaves the bright page as 255; flip so ink is foreground.
    imageops::invert(&mut mask);
    close(&mask, Norm::LInf, CLOSE_RADIUS)
}

fn resize_to_canonical_height(gray: &GrayImage) -> GrayImage {
    let (width, height) = gray.dimensions();
    if height == CANONICAL_HEIGHT {
        return gray.clone();
    }
    let new_width =
        ((CANONICAL_HEIGHT as f32 * width as f32 / height as f32).round() as u32).max(1);
    imageops::resize(gray, new_width, CANONICAL_HEIGHT, FilterType::Triangle)
}

/// Contrast-limited adaptive histogram equalization over a tile grid.
///
/// Each tile gets a clipped-histogram equalization lookup table; per-pixel
/// output is bilinearly interpolated between the four surrounding tile
/// tables so tile seams stay invisible.
fn equalize_local_contrast(gray: &GrayImage) -> GrayImage {
    let (width, height) = gray.dimensions();
    if width < EQUALIZE_TILES || height < EQUALIZE_TILES {
        return gray.clone();
    }

    let tile_width = (width + EQUALIZE_TILES - 1) / EQUALIZE_TILES;
    let tile_height = (height + EQUALIZE_TILES - 1) / EQUALIZE_TILES;

    let mut luts = Vec::with_capacity((EQUALIZE_TILES * EQUALIZE_TILES) as usize);
    for tile_y in 0..EQUALIZE_TILES {
        for tile_x in 0..EQUALIZE_TILES {
            let x0 = tile_x * tile_width;
            let y0 = tile_y * tile_height;
            let x1 = (x0 + tile_width).min(width);
            let y1 = (y0 + tile_height).min(height);

            let mut histogram = [0u32; 256];
            for y in y0..y1 {
                for x in x0..x1 {
                    histogram[gray.get_pixel(x, y).0[0] as usize] += 1;
                }
            }
            luts.push(equalization_lut(&histogram, (x1 - x0) * (y1 - y0)));
        }
    }

    let max_tile = (EQUALIZE_TILES - 1) as f32;
    let mut out = GrayImage::new(width, height);
    for y in 0..height {
        let grid_y = ((y as f32 + 0.5) / tile_height as f32 - 0.5).clamp(0.0, max_tile);
        let tile_y0 = grid_y.floor() as u32;
        let tile_y1 = (tile_y0 + 1).min(EQUALIZE_TILES - 1);
        let weight_y = grid_y - tile_y0 as f32;

        for x in 0..width {
            let grid_x = ((x as f32 + 0.5) / tile_width as f32 - 0.5).clamp(0.0, max_tile);
            let tile_x0 = grid_x.floor() as u32;
            let tile_x1 = (tile_x0 + 1).min(EQUALIZE_TILES - 1);
            let weight_x = grid_x - tile_x0 as f32;

            let value = gray.get_pixel(x, y).0[0] as usize;
            let top_left = luts[(tile_y0 * EQUALIZE_TILES + tile_x0) as usize][value] as f32;
            let top_right = luts[(tile_y0 * EQUALIZE_TILES + tile_x1) as usize][value] as f32;
            let bottom_left = luts[(tile_y1 * EQUALIZE_TILES + tile_x0) as usize][value] as f32;
            let bottom_right = luts[(tile_y1 * EQUALIZE_TILES + tile_x1) as usize][value] as f32;

            let top = top_left + (top_right - top_left) * weight_x;
            let bottom = bottom_left + (bottom_right - bottom_left) * weight_x;
            let interpolated = top + (bottom - top) * weight_y;
            out.put_pixel(x, y, image::Luma([interpolated.round().clamp(0.0, 255.0) as u8]));
        }
    }
    out
}

/// Builds the equalization lookup table for one tile: clip the histogram at
/// the limit, spread the excess evenly, then map through the cumulative
/// distribution.
fn equalization_lut(histogram: &[u32; 256], pixel_count: u32) -> [u8; 256] {
    let mut lut = [0u8; 256];
    if pixel_count == 0 {
        for (i, entry) in lut.iter_mut().enumerate() {
            *entry = i as u8;
        }
        return lut;
    }

    let clip = ((EQUALIZE_CLIP_LIMIT * pixel_count as f32 / 256.0).max(1.0)) as u32;
    let mut clipped = [0u32; 256];
    let mut excess = 0u32;
    for i in 0..256 {
        if histogram[i] > clip {
            excess += histogram[i] - clip;
            clipped[i] = clip;
        } else {
            clipped[i] = histogram[i];
        }
    }
    let bonus = excess / 256;

    let mut cumulative = 0u64;
    for i in 0..256 {
        cumulative += (clipped[i] + bonus) as u64;
        lut[i] = ((255 * cumulative) / pixel_count as u64).min(255) as u8;
    }
    lut
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    /// A light page with a dark block of "ink" in the middle.
    fn synthetic_page(width: u32, height: u32) -> DynamicImage {
        let mut page = GrayImage::from_pixel(width, height, Luma([235u8]));
        for y in height / 3..height / 2 {
            for x in width / 3..width / 2 {
                page.put_pixel(x, y, Luma([15u8]));
            }
        }
        DynamicImage::ImageLuma8(page)
    }

    #[test]
    fn mask_lands_on_the_canonical_canvas() {
        let mask = binarize_sheet(&synthetic_page(300, 600));
        assert_eq!(mask.height(), CANONICAL_HEIGHT);
        // 300/600 aspect ratio carried over to the canonical height.
        assert_eq!(mask.width(), 600);
    }

    #[test]
    fn mask_has_exactly_two_levels_with_ink_as_foreground() {
        let mask = binarize_sheet(&synthetic_page(400, 400));
        assert!(mask.pixels().all(|p| p.0[0] == 0 || p.0[0] == 255));

        // The dark block must come out as foreground, the page as background.
        let center = mask.get_pixel(mask.width() * 5 / 12, mask.height() * 5 / 12);
        assert_eq!(center.0[0], 255);
        let corner = mask.get_pixel(5, 5);
        assert_eq!(corner.0[0], 0);
    }

    #[test]
    fn normalization_is_deterministic() {
        let mut bytes = Vec::new();
        synthetic_page(200, 400)
            .write_to(
                &mut std::io::Cursor::new(&mut bytes),
                image::ImageOutputFormat::Png,
            )
            .expect("png encoding succeeds");

        let first = normalize(&bytes).expect("decodes");
        let second = normalize(&bytes).expect("decodes");
        assert_eq!(first.as_raw(), second.as_raw());
    }

    #[test]
    fn garbage_bytes_are_a_decode_error() {
        assert!(matches!(
            normalize(b"not an image at all"),
            Err(ProcessSheetError::DecodeError)
        ));
    }

    #[test]
    fn equalization_lut_is_monotonic() {
        let mut histogram = [0u32; 256];
        histogram[10] = 500;
        histogram[200] = 500;
        let lut = equalization_lut(&histogram, 1000);
        for i in 1..256 {
            assert!(lut[i] >= lut[i - 1]);
        }
    }
}
