//! Drawing primitives for overlays.

use super::geometry::Rect;
use image::{Rgb, RgbImage};

/// Draws a rectangle outline of `width` pixels, inset from `rect`'s edges.
///
/// The rectangle is clipped to the image; parts outside are skipped.
pub fn draw_outline(image: &mut RgbImage, rect: &Rect, width: u32, color: [u8; 3]) {
    let Some(rect) = rect.clamp_to(image.width(), image.height()) else {
        return;
    };
    let width = width.max(1);
    let pixel = Rgb(color);

    for y in rect.y..rect.bottom() {
        for x in rect.x..rect.right() {
            let on_border = x < rect.x + width
                || x + width >= rect.right()
                || y < rect.y + width
                || y + width >= rect.bottom();
            if on_border {
                image.put_pixel(x, y, pixel);
            }
        }
    }
}

/// Blends `color` over every pixel in `rect` with the given opacity
/// (0.0 = unchanged, 1.0 = solid).
pub fn fill_translucent(image: &mut RgbImage, rect: &Rect, color: [u8; 3], alpha: f32) {
    let Some(rect) = rect.clamp_to(image.width(), image.height()) else {
        return;
    };
    let alpha = alpha.clamp(0.0, 1.0);

    for y in rect.y..rect.bottom() {
        for x in rect.x..rect.right() {
            let Rgb(current) = *image.get_pixel(x, y);
            let mut blended = [0u8; 3];
            for c in 0..3 {
                let value = current[c] as f32 * (1.0 - alpha) + color[c] as f32 * alpha;
                blended[c] = value.round().clamp(0.0, 255.0) as u8;
            }
            image.put_pixel(x, y, Rgb(blended));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RED: [u8; 3] = [255, 0, 0];

    #[test]
    fn test_outline_leaves_interior_untouched() {
        let mut image = RgbImage::new(10, 10);
        draw_outline(&mut image, &Rect::new(2, 2, 6, 6), 1, RED);

        assert_eq!(image.get_pixel(2, 2).0, RED);
        assert_eq!(image.get_pixel(7, 5).0, RED);
        assert_eq!(image.get_pixel(4, 4).0, [0, 0, 0]);
        assert_eq!(image.get_pixel(1, 1).0, [0, 0, 0]);
        assert_eq!(image.get_pixel(8, 8).0, [0, 0, 0]);
    }

    #[test]
    fn test_outline_clipped_to_image() {
        let mut image = RgbImage::new(4, 4);
        draw_outline(&mut image, &Rect::new(2, 2, 10, 10), 1, RED);
        assert_eq!(image.get_pixel(2, 3).0, RED);
        draw_outline(&mut image, &Rect::new(50, 50, 2, 2), 1, RED);
    }

    #[test]
    fn test_fill_translucent() {
        let mut image = RgbImage::from_pixel(2, 2, Rgb([0, 0, 200]));
        fill_translucent(&mut image, &Rect::new(0, 0, 1, 1), [255, 255, 0], 0.5);
        assert_eq!(image.get_pixel(0, 0).0, [128, 128, 100]);
        assert_eq!(image.get_pixel(1, 1).0, [0, 0, 200]);
    }
}
