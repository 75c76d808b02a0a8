//! Pure geometry for the layouts.
//!
//! All functions here are pure and testable without any I/O or images.
//! Dimensions are `(width, height)` in pixels.

/// Height of the text bar under the photo, relative to the short edge.
const TEXT_BAR_RATIO: f64 = 0.12;

/// Margin around the photo on blurred-background layouts, relative to the
/// short edge.
const BLUR_MARGIN_RATIO: f64 = 0.06;

/// White frame drawn around the photo on `background_blur_with_white_border`.
const BLUR_BORDER_RATIO: f64 = 0.012;

/// Shadow offset and spread, relative to the short edge.
const SHADOW_RATIO: f64 = 0.015;

fn short_edge((w, h): (u32, u32)) -> u32 {
    w.min(h)
}

fn scaled(edge: u32, ratio: f64) -> u32 {
    ((edge as f64) * ratio).round().max(1.0) as u32
}

/// Height of the bar appended below the photo on watermark layouts.
pub fn text_bar_height(size: (u32, u32)) -> u32 {
    scaled(short_edge(size), TEXT_BAR_RATIO)
}

/// Width of a white margin given as a percentage of the short edge.
/// Zero percent means no margin.
pub fn white_margin(size: (u32, u32), percent: u8) -> u32 {
    if percent == 0 {
        return 0;
    }
    scaled(short_edge(size), f64::from(percent) / 100.0)
}

pub fn blur_margin(size: (u32, u32)) -> u32 {
    scaled(short_edge(size), BLUR_MARGIN_RATIO)
}

pub fn blur_border(size: (u32, u32)) -> u32 {
    scaled(short_edge(size), BLUR_BORDER_RATIO)
}

pub fn shadow_spread(size: (u32, u32)) -> u32 {
    scaled(short_edge(size), SHADOW_RATIO)
}

/// Side of the square canvas that fits the photo without cropping.
pub fn square_canvas(size: (u32, u32)) -> u32 {
    size.0.max(size.1)
}

/// Grow `current` along one axis until it has the aspect ratio of
/// `original`. Never shrinks.
pub fn pad_to_ratio(current: (u32, u32), original: (u32, u32)) -> (u32, u32) {
    let (cw, ch) = current;
    let (ow, oh) = original;
    if ow == 0 || oh == 0 {
        return current;
    }
    let target = ow as f64 / oh as f64;
    let actual = cw as f64 / ch as f64;
    if actual < target {
        // Too narrow: widen.
        ((ch as f64 * target).round() as u32, ch)
    } else if actual > target {
        (cw, (cw as f64 / target).round() as u32)
    } else {
        current
    }
}

/// Dimensions that fit within `max_size` on the long edge, preserving
/// aspect ratio. Never upscales.
pub fn fit_within(size: (u32, u32), max_size: u32) -> (u32, u32) {
    let (w, h) = size;
    let long = w.max(h);
    if long <= max_size || long == 0 {
        return size;
    }
    let scale = max_size as f64 / long as f64;
    (
        ((w as f64 * scale).round() as u32).max(1),
        ((h as f64 * scale).round() as u32).max(1),
    )
}

/// Top-left offset that centres `inner` inside `outer`.
pub fn centre(outer: (u32, u32), inner: (u32, u32)) -> (i64, i64) {
    (
        (i64::from(outer.0) - i64::from(inner.0)) / 2,
        (i64::from(outer.1) - i64::from(inner.1)) / 2,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_bar_uses_short_edge() {
        assert_eq!(text_bar_height((4000, 3000)), 360);
        assert_eq!(text_bar_height((3000, 4000)), 360);
    }

    #[test]
    fn tiny_images_still_get_a_bar() {
        assert_eq!(text_bar_height((4, 4)), 1);
    }

    #[test]
    fn white_margin_is_percentage_of_short_edge() {
        assert_eq!(white_margin((2000, 1000), 3), 30);
        assert_eq!(white_margin((2000, 1000), 0), 0);
    }

    #[test]
    fn square_canvas_fits_long_edge() {
        assert_eq!(square_canvas((1200, 800)), 1200);
        assert_eq!(square_canvas((800, 1200)), 1200);
    }

    #[test]
    fn pad_to_ratio_widens_tall_canvas() {
        // 3:2 original, canvas got taller from a text bar.
        assert_eq!(pad_to_ratio((300, 240), (300, 200)), (360, 240));
    }

    #[test]
    fn pad_to_ratio_heightens_wide_canvas() {
        assert_eq!(pad_to_ratio((400, 200), (300, 200)), (400, 267));
    }

    #[test]
    fn pad_to_ratio_keeps_matching_canvas() {
        assert_eq!(pad_to_ratio((600, 400), (300, 200)), (600, 400));
    }

    #[test]
    fn fit_within_downscales_long_edge() {
        assert_eq!(fit_within((4000, 3000), 1600), (1600, 1200));
        assert_eq!(fit_within((3000, 4000), 1600), (1200, 1600));
    }

    #[test]
    fn fit_within_never_upscales() {
        assert_eq!(fit_within((800, 600), 1600), (800, 600));
    }

    #[test]
    fn centre_offsets() {
        assert_eq!(centre((100, 100), (60, 40)), (20, 30));
    }
}
