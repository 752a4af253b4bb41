use image::{GrayImage, Luma, Rgb};
use imageproc::rect::Rect;

pub const WHITE: Luma<u8> = Luma([u8::MAX]);
pub const BLACK: Luma<u8> = Luma([u8::MIN]);

/// Overlay palette for debug images; candidate regions cycle through it.
pub const RAINBOW: [Rgb<u8>; 6] = [
    Rgb([255, 0, 0]),
    Rgb([255, 127, 0]),
    Rgb([255, 255, 0]),
    Rgb([0, 255, 0]),
    Rgb([0, 0, 255]),
    Rgb([139, 0, 255]),
];

/// Intersects `rect` with the image bounds, returning half-open pixel ranges.
/// `None` if nothing of the rect lies inside the image.
fn clamped_bounds(mask: &GrayImage, rect: &Rect) -> Option<(u32, u32, u32, u32)> {
    let (width, height) = mask.dimensions();
    let x0 = rect.left().clamp(0, width as i32) as u32;
    let y0 = rect.top().clamp(0, height as i32) as u32;
    let x1 = (rect.left() + rect.width() as i32).clamp(0, width as i32) as u32;
    let y1 = (rect.top() + rect.height() as i32).clamp(0, height as i32) as u32;
    (x1 > x0 && y1 > y0).then_some((x0, y0, x1, y1))
}

/// Counts foreground (nonzero) pixels of `mask` inside `rect`, clamped to
/// the image bounds.
pub fn count_foreground_in_rect(mask: &GrayImage, rect: &Rect) -> u32 {
    let Some((x0, y0, x1, y1)) = clamped_bounds(mask, rect) else {
        return 0;
    };
    let mut count = 0;
    for y in y0..y1 {
        for x in x0..x1 {
            if mask.get_pixel(x, y).0[0] > 0 {
                count += 1;
            }
        }
    }
    count
}

/// Determines the fraction of `rect` (clamped to the image) that is
/// foreground. Degenerate or fully out-of-bounds rects yield 0.
pub fn foreground_ratio_in_rect(mask: &GrayImage, rect: &Rect) -> f32 {
    let Some((x0, y0, x1, y1)) = clamped_bounds(mask, rect) else {
        return 0.0;
    };
    let total = (x1 - x0) * (y1 - y0);
    count_foreground_in_rect(mask, rect) as f32 / total as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mask_with_foreground_block() -> GrayImage {
        let mut mask = GrayImage::from_pixel(20, 20, BLACK);
        for y in 5..10 {
            for x in 5..10 {
                mask.put_pixel(x, y, WHITE);
            }
        }
        mask
    }

    #[test]
    fn counts_only_pixels_inside_the_rect() {
        let mask = mask_with_foreground_block();
        assert_eq!(
            count_foreground_in_rect(&mask, &Rect::at(0, 0).of_size(20, 20)),
            25
        );
        assert_eq!(
            count_foreground_in_rect(&mask, &Rect::at(5, 5).of_size(2, 5)),
            10
        );
        assert_eq!(
            count_foreground_in_rect(&mask, &Rect::at(12, 12).of_size(4, 4)),
            0
        );
    }

    #[test]
    fn ratio_uses_the_clamped_area() {
        let mask = mask_with_foreground_block();
        let ratio = foreground_ratio_in_rect(&mask, &Rect::at(5, 5).of_size(5, 5));
        assert!((ratio - 1.0).abs() < f32::EPSILON);

        // A rect hanging off the left edge only sees background.
        let ratio = foreground_ratio_in_rect(&mask, &Rect::at(-5, 0).of_size(10, 5));
        assert_eq!(ratio, 0.0);
    }

    #[test]
    fn out_of_bounds_rect_is_degenerate() {
        let mask = mask_with_foreground_block();
        assert_eq!(
            foreground_ratio_in_rect(&mask, &Rect::at(100, 100).of_size(5, 5)),
            0.0
        );
    }
}
