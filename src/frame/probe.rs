//! Single-pixel color probes.
//!
//! Every reader in the crate bottoms out here: a probe answers one question
//! about one configured pixel. Probing outside the frame is a programming
//! error (the coordinate tables are validated data) and panics rather than
//! returning a recoverable error.

use super::{Frame, Point};

/// Channel floor for "this pixel is white" after capture quantization.
pub const WHITE_MIN: u8 = 235;
/// Channel ceiling for "this pixel is black" after capture quantization.
pub const BLACK_MAX: u8 = 20;
/// Per-channel midpoint used by the brightness predicate.
pub const BRIGHTNESS_HALFWAY: u8 = 128;
/// Default per-channel tolerance for signature and categorical color probes.
pub const COLOR_TOLERANCE: i16 = 15;

/// An expected RGB color. A channel of `-1` is a wildcard that matches any
/// sampled value, used by signature pixels that only care about some
/// channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpectedColor {
    pub r: i16,
    pub g: i16,
    pub b: i16,
}

impl ExpectedColor {
    pub const WHITE: ExpectedColor = ExpectedColor::rgb(255, 255, 255);

    pub const fn rgb(r: i16, g: i16, b: i16) -> Self {
        Self { r, g, b }
    }
}

fn channel_matches(sampled: u8, expected: i16, tolerance: i16) -> bool {
    if expected < 0 {
        return true;
    }
    let sampled = sampled as i16;
    sampled >= expected - tolerance && sampled <= expected + tolerance
}

/// True iff every channel of the sampled pixel lies within `tolerance` of
/// the expected channel value.
pub fn probe(frame: &Frame, point: Point, expected: ExpectedColor, tolerance: i16) -> bool {
    let pixel = frame.get_pixel(point.x, point.y);
    channel_matches(pixel[0], expected.r, tolerance)
        && channel_matches(pixel[1], expected.g, tolerance)
        && channel_matches(pixel[2], expected.b, tolerance)
}

/// True iff all channels reach the quantized-white floor.
pub fn is_white(frame: &Frame, point: Point) -> bool {
    let pixel = frame.get_pixel(point.x, point.y);
    pixel[0] >= WHITE_MIN && pixel[1] >= WHITE_MIN && pixel[2] >= WHITE_MIN
}

/// True iff all channels are at or below the quantized-black ceiling.
pub fn is_black(frame: &Frame, point: Point) -> bool {
    let pixel = frame.get_pixel(point.x, point.y);
    pixel[0] <= BLACK_MAX && pixel[1] <= BLACK_MAX && pixel[2] <= BLACK_MAX
}

/// True iff a majority of channels sit above the brightness midpoint.
pub fn is_bright(frame: &Frame, point: Point) -> bool {
    let pixel = frame.get_pixel(point.x, point.y);
    let above = (pixel[0] >= BRIGHTNESS_HALFWAY) as u8
        + (pixel[1] >= BRIGHTNESS_HALFWAY) as u8
        + (pixel[2] >= BRIGHTNESS_HALFWAY) as u8;
    above >= 2
}
