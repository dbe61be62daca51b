//! Synthetic frames used when no live sensor data is available.

use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_line_segment_mut};
use imageproc::rect::Rect;

/// Trace code printed on the staged label, mirroring the bench target used
/// during commissioning.
const STAGED_TRACE_CODE: &str = "20241229001234567890";

/// Deterministic staged frame produced by the simulated industrial sensor.
///
/// Draws a vial silhouette with a white label patch and a stripe field
/// derived from [`STAGED_TRACE_CODE`]. The stripes are not a real symbology,
/// so barcode decoding over this frame finds nothing. Frames smaller than
/// 16x16 stay a bare gray field.
pub fn test_frame(width: u32, height: u32) -> RgbImage {
    let mut image = RgbImage::from_pixel(width, height, Rgb([50, 50, 50]));
    if width < 16 || height < 16 {
        return image;
    }

    let body = Rect::at((width * 5 / 12) as i32, (height * 3 / 8) as i32)
        .of_size((width / 6).max(1), (height / 4).max(1));
    draw_filled_rect_mut(&mut image, body, Rgb([200, 200, 200]));

    let cap = Rect::at((width * 15 / 32) as i32, (height * 2 / 7) as i32)
        .of_size((width / 16).max(1), (height / 12).max(1));
    draw_filled_rect_mut(&mut image, cap, Rgb([180, 180, 180]));

    let label_x = width * 13 / 30;
    let label_y = height * 5 / 12;
    let label_w = (width * 2 / 15).max(1);
    let label_h = (height / 6).max(1);
    draw_filled_rect_mut(
        &mut image,
        Rect::at(label_x as i32, label_y as i32).of_size(label_w, label_h),
        Rgb([255, 255, 255]),
    );

    // Stripe field standing in for the printed code.
    let stripe_top = label_y + label_h / 2;
    let stripe_h = (label_h / 3).max(1);
    let mut x = label_x + 2;
    for digit in STAGED_TRACE_CODE.bytes() {
        let bar_w = ((digit - b'0') % 3 + 1) as u32;
        if x + bar_w >= label_x + label_w {
            break;
        }
        draw_filled_rect_mut(
            &mut image,
            Rect::at(x as i32, stripe_top as i32).of_size(bar_w, stripe_h),
            Rgb([0, 0, 0]),
        );
        x += bar_w + 2;
    }

    image
}

/// Fallback frame marking a missing camera feed: a dark field with a red
/// border and diagonal cross.
pub fn offline_frame(width: u32, height: u32) -> RgbImage {
    let mut image = RgbImage::new(width, height);
    if width < 2 || height < 2 {
        return image;
    }

    let red = Rgb([220, 30, 30]);
    draw_hollow_rect_mut(&mut image, Rect::at(0, 0).of_size(width, height), red);
    draw_line_segment_mut(
        &mut image,
        (0.0, 0.0),
        ((width - 1) as f32, (height - 1) as f32),
        red,
    );
    draw_line_segment_mut(
        &mut image,
        (0.0, (height - 1) as f32),
        ((width - 1) as f32, 0.0),
        red,
    );
    image
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_is_deterministic() {
        let first = test_frame(640, 480);
        let second = test_frame(640, 480);

        assert_eq!(first.as_raw(), second.as_raw());
    }

    #[test]
    fn test_frame_has_gray_background_and_white_label() {
        let frame = test_frame(1920, 1080);

        assert_eq!(frame.dimensions(), (1920, 1080));
        assert_eq!(*frame.get_pixel(0, 0), Rgb([50, 50, 50]));
        // Top edge of the label patch is plain white.
        assert_eq!(*frame.get_pixel(1000, 460), Rgb([255, 255, 255]));
    }

    #[test]
    fn tiny_test_frame_stays_plain() {
        let frame = test_frame(8, 8);

        assert!(frame.pixels().all(|p| *p == Rgb([50, 50, 50])));
    }

    #[test]
    fn offline_frame_is_marked_red() {
        let frame = offline_frame(320, 240);

        assert_eq!(frame.dimensions(), (320, 240));
        assert_eq!(*frame.get_pixel(0, 0), Rgb([220, 30, 30]));
        // Interior away from the cross stays dark.
        assert_eq!(*frame.get_pixel(10, 120), Rgb([0, 0, 0]));
    }
}
