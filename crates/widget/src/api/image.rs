//! Geometry of the image currently shown in the drawer.

use visual_search_core::{NodeId, PixelRect, Rect, ScaleFactors, Size};

/// The selected image: its natural size, its displayed size and the
/// `<img>` element showing it.
///
/// Scale factors are `displayed / natural` and are recomputed whenever
/// either size changes, so a crop drawn on screen can be mapped back to
/// source pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImageState {
    element: NodeId,
    natural: Size,
    displayed: Size,
    scale: ScaleFactors,
}

impl ImageState {
    /// Record a freshly loaded image.
    ///
    /// Returns `None` until both sizes are known and positive.
    #[must_use]
    pub fn new(element: NodeId, natural: Size, displayed: Size) -> Option<Self> {
        let scale = ScaleFactors::between(natural, displayed)?;
        Some(Self {
            element,
            natural,
            displayed,
            scale,
        })
    }

    /// Update after the image or viewport was resized.
    ///
    /// A degenerate size (e.g. the drawer collapsed) keeps the last good
    /// scale and returns `false`.
    pub fn resize(&mut self, displayed: Size) -> bool {
        match ScaleFactors::between(self.natural, displayed) {
            Some(scale) => {
                self.displayed = displayed;
                self.scale = scale;
                true
            }
            None => false,
        }
    }

    #[must_use]
    pub const fn element(&self) -> NodeId {
        self.element
    }

    #[must_use]
    pub const fn natural(&self) -> Size {
        self.natural
    }

    #[must_use]
    pub const fn displayed(&self) -> Size {
        self.displayed
    }

    #[must_use]
    pub const fn scale(&self) -> ScaleFactors {
        self.scale
    }

    /// Translate an on-screen crop box into natural-image pixels, clamped
    /// to the image bounds.
    #[must_use]
    pub fn to_natural(&self, displayed_crop: Rect) -> PixelRect {
        let raw = displayed_crop.to_natural(self.scale);
        let max_w = dimension(self.natural.width);
        let max_h = dimension(self.natural.height);
        let x = raw.x.min(max_w);
        let y = raw.y.min(max_h);
        PixelRect {
            x,
            y,
            width: raw.width.min(max_w - x),
            height: raw.height.min(max_h - y),
        }
    }

    /// The whole image as a crop rectangle.
    #[must_use]
    pub fn full_crop(&self) -> PixelRect {
        PixelRect::new(0, 0, dimension(self.natural.width), dimension(self.natural.height))
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn dimension(value: f64) -> u32 {
    value.round().clamp(0.0, f64::from(u32::MAX)) as u32
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn state(natural: (f64, f64), displayed: (f64, f64)) -> ImageState {
        ImageState::new(
            NodeId::new(1),
            Size::new(natural.0, natural.1),
            Size::new(displayed.0, displayed.1),
        )
        .unwrap()
    }

    #[test]
    fn test_crop_scales_to_natural_pixels() {
        // 1000x800 shown at 500x400: everything doubles.
        let image = state((1000.0, 800.0), (500.0, 400.0));
        assert_eq!(
            image.to_natural(Rect::new(10.0, 20.0, 100.0, 50.0)),
            PixelRect::new(20, 40, 200, 100)
        );
    }

    #[test]
    fn test_crop_uses_independent_axes_and_rounds() {
        // W/w = 3, H/h = 1.5
        let image = state((900.0, 300.0), (300.0, 200.0));
        assert_eq!(
            image.to_natural(Rect::new(10.2, 10.2, 33.3, 66.7)),
            PixelRect::new(31, 15, 100, 100)
        );
    }

    #[test]
    fn test_crop_is_clamped_to_image() {
        let image = state((100.0, 100.0), (50.0, 50.0));
        assert_eq!(
            image.to_natural(Rect::new(40.0, -5.0, 30.0, 80.0)),
            PixelRect::new(80, 0, 20, 100)
        );
    }

    #[test]
    fn test_resize_recomputes_scale() {
        let mut image = state((1000.0, 1000.0), (500.0, 500.0));
        assert!(image.resize(Size::new(250.0, 250.0)));
        assert_eq!(
            image.to_natural(Rect::new(25.0, 25.0, 50.0, 50.0)),
            PixelRect::new(100, 100, 200, 200)
        );
        assert!(!image.resize(Size::new(0.0, 250.0)));
        assert_eq!(image.displayed(), Size::new(250.0, 250.0));
    }

    #[test]
    fn test_unloaded_image_has_no_state() {
        assert!(ImageState::new(NodeId::new(1), Size::new(0.0, 0.0), Size::new(10.0, 10.0)).is_none());
    }

    #[test]
    fn test_full_crop() {
        assert_eq!(state((640.0, 480.0), (320.0, 240.0)).full_crop(), PixelRect::new(0, 0, 640, 480));
    }
}
