//! Pixel geometry for image previews and crop boxes.
//!
//! Two coordinate spaces matter to the widget: the *displayed* space (CSS
//! pixels of the preview `<img>`) and the *natural* space (pixels of the
//! uploaded image). Crop boxes are drawn in displayed space and must be sent
//! to the search API in natural space.

use serde::{Deserialize, Serialize};

/// A width/height pair in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    /// Create a new size.
    #[must_use]
    pub const fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    /// Whether both dimensions are strictly positive and finite.
    #[must_use]
    pub fn is_positive(&self) -> bool {
        self.width.is_finite() && self.height.is_finite() && self.width > 0.0 && self.height > 0.0
    }
}

/// A rectangle with fractional pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    /// Create a new rectangle.
    #[must_use]
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Translate a displayed-space rectangle into natural-space pixels.
    ///
    /// Each coordinate is divided by the matching scale factor and rounded to
    /// the nearest whole pixel. Negative results clamp to zero.
    #[must_use]
    pub fn to_natural(&self, scale: ScaleFactors) -> PixelRect {
        PixelRect {
            x: round_px(self.x / scale.x),
            y: round_px(self.y / scale.y),
            width: round_px(self.width / scale.x),
            height: round_px(self.height / scale.y),
        }
    }
}

/// A rectangle in whole pixels, as sent to the search API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl PixelRect {
    /// Create a new pixel rectangle.
    #[must_use]
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Whether the rectangle covers no pixels.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Ratio of displayed size to natural size, per axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScaleFactors {
    pub x: f64,
    pub y: f64,
}

impl ScaleFactors {
    /// Compute `displayed / natural` for both axes.
    ///
    /// Returns `None` when either size is degenerate, since no meaningful
    /// translation exists for a zero-sized or unloaded image.
    #[must_use]
    pub fn between(natural: Size, displayed: Size) -> Option<Self> {
        if !natural.is_positive() || !displayed.is_positive() {
            return None;
        }
        Some(Self {
            x: displayed.width / natural.width,
            y: displayed.height / natural.height,
        })
    }
}

impl Default for ScaleFactors {
    fn default() -> Self {
        Self { x: 1.0, y: 1.0 }
    }
}

#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    reason = "value is rounded and clamped into u32 range first"
)]
fn round_px(value: f64) -> u32 {
    if !value.is_finite() {
        return 0;
    }
    value.round().clamp(0.0, f64::from(u32::MAX)) as u32
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_scale_factors_between() {
        let scale =
            ScaleFactors::between(Size::new(1000.0, 500.0), Size::new(250.0, 125.0)).unwrap();
        assert!((scale.x - 0.25).abs() < f64::EPSILON);
        assert!((scale.y - 0.25).abs() < f64::EPSILON);
    }

    #[test]
    fn test_scale_factors_reject_degenerate() {
        assert!(ScaleFactors::between(Size::new(0.0, 10.0), Size::new(10.0, 10.0)).is_none());
        assert!(ScaleFactors::between(Size::new(10.0, 10.0), Size::new(10.0, f64::NAN)).is_none());
    }

    #[test]
    fn test_to_natural_matches_formula() {
        // Natural (W,H) = (1200, 800) displayed at (w,h) = (300, 200)
        let scale =
            ScaleFactors::between(Size::new(1200.0, 800.0), Size::new(300.0, 200.0)).unwrap();
        let crop = Rect::new(10.0, 20.0, 100.0, 50.0);
        let natural = crop.to_natural(scale);
        assert_eq!(natural, PixelRect::new(40, 80, 400, 200));
    }

    #[test]
    fn test_to_natural_rounds_to_nearest_pixel() {
        // W/w = 1000/333, H/h = 700/250
        let scale =
            ScaleFactors::between(Size::new(1000.0, 700.0), Size::new(333.0, 250.0)).unwrap();
        let natural = Rect::new(1.0, 3.3, 33.3, 10.1).to_natural(scale);
        assert_eq!(natural.x, (1.0_f64 * 1000.0 / 333.0).round() as u32);
        assert_eq!(natural.y, (3.3_f64 * 700.0 / 250.0).round() as u32);
        assert_eq!(natural.width, (33.3_f64 * 1000.0 / 333.0).round() as u32);
        assert_eq!(natural.height, (10.1_f64 * 700.0 / 250.0).round() as u32);
    }

    #[test]
    fn test_to_natural_clamps_negative() {
        let natural = Rect::new(-5.0, -1.0, 10.0, 10.0).to_natural(ScaleFactors::default());
        assert_eq!(natural, PixelRect::new(0, 0, 10, 10));
    }

    #[test]
    fn test_pixel_rect_is_empty() {
        assert!(PixelRect::new(1, 1, 0, 5).is_empty());
        assert!(!PixelRect::new(0, 0, 1, 1).is_empty());
    }
}
