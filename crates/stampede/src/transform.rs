//! View transform derivation for screen-space sprite batching.
//!
//! Instead of a free camera matrix, batches render through a fixed
//! orthographic mapping that puts (0,0) at the top-left of the viewport with
//! +y pointing down, the convention every 2D sprite API uses. A caller
//! transform can still translate/rotate/scale the scene; it is adjusted here
//! so that its authored direction survives the y flip baked into the screen
//! mapping.

use glam::{Mat3, Mat4, Vec2, Vec3};

use crate::error::{BatchError, BatchResult};

/// Viewport extent in pixels. Both dimensions must be non-zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    width: u32,
    height: u32,
}

impl Viewport {
    /// Create a viewport, rejecting degenerate extents.
    pub fn new(width: u32, height: u32) -> BatchResult<Self> {
        if width == 0 || height == 0 {
            return Err(BatchError::InvalidViewport { width, height });
        }
        Ok(Self { width, height })
    }

    /// Viewport width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Viewport height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Extent as floats, for shader-facing math.
    pub fn extent(&self) -> Vec2 {
        Vec2::new(self.width as f32, self.height as f32)
    }
}

/// Derive the batch view transform from a viewport and an optional caller
/// transform (`None` = identity).
///
/// The caller transform gets two fixups before the screen mapping applies:
/// its rotation/scale block is transposed (reversing authored rotation so it
/// comes out the intended way after the y flip) and its y translation is
/// negated. The screen matrix then maps viewport pixels onto the [-1,1]
/// device square with the origin in the top-left corner.
pub fn view_projection(viewport: Viewport, transform: Option<Mat4>) -> Mat4 {
    let caller = transform.unwrap_or(Mat4::IDENTITY);

    // Transpose the 3x3 rotation/scale block in place.
    let reversed = Mat3::from_mat4(caller).transpose();
    let mut adjusted = Mat4::from_mat3(reversed);
    adjusted.w_axis = caller.w_axis;

    // Flip the vertical translation component.
    adjusted.w_axis.y = -adjusted.w_axis.y;

    // Pixel space -> [-1,1] device space, origin at the top-left.
    let extent = viewport.extent();
    let aspect = extent.x / extent.y;
    let scale = 2.0 / extent.y;
    let screen = Mat4::from_translation(Vec3::new(-1.0, 1.0, 0.0))
        * Mat4::from_scale(Vec3::new(scale / aspect, scale, 1.0));

    screen * adjusted
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec4;

    #[test]
    fn test_viewport_rejects_zero_dimensions() {
        assert!(Viewport::new(0, 600).is_err());
        assert!(Viewport::new(800, 0).is_err());
        assert!(Viewport::new(0, 0).is_err());
        assert!(Viewport::new(800, 600).is_ok());
    }

    #[test]
    fn test_identity_screen_mapping() {
        let viewport = Viewport::new(800, 600).unwrap();
        let m = view_projection(viewport, None);

        // The shader negates instance y before applying the matrix, so the
        // matrix itself sees (px, -py). Top-left pixel:
        let origin = m * Vec4::new(0.0, 0.0, 0.0, 1.0);
        assert!((origin.x - -1.0).abs() < 1e-6);
        assert!((origin.y - 1.0).abs() < 1e-6);

        // Bottom-right pixel (800, 600) arrives as (800, -600):
        let corner = m * Vec4::new(800.0, -600.0, 0.0, 1.0);
        assert!((corner.x - 1.0).abs() < 1e-6);
        assert!((corner.y - -1.0).abs() < 1e-6);

        // Viewport centre lands on the device origin.
        let centre = m * Vec4::new(400.0, -300.0, 0.0, 1.0);
        assert!(centre.x.abs() < 1e-6);
        assert!(centre.y.abs() < 1e-6);
    }

    #[test]
    fn test_caller_translation_is_y_flipped() {
        let viewport = Viewport::new(800, 600).unwrap();
        let caller = Mat4::from_translation(Vec3::new(80.0, 60.0, 0.0));
        let m = view_projection(viewport, Some(caller));

        // A caller translation of (80, 60) shifts the origin 80px right and
        // 60px down on screen.
        let origin = m * Vec4::new(0.0, 0.0, 0.0, 1.0);
        assert!((origin.x - (-1.0 + 2.0 * 80.0 / 800.0)).abs() < 1e-6);
        assert!((origin.y - (1.0 - 2.0 * 60.0 / 600.0)).abs() < 1e-6);
    }

    #[test]
    fn test_caller_rotation_is_reversed() {
        let viewport = Viewport::new(400, 400).unwrap();
        let angle = std::f32::consts::FRAC_PI_2;
        let m = view_projection(viewport, Some(Mat4::from_rotation_z(angle)));

        // The rotation block must come through transposed, i.e. as a
        // rotation by -angle.
        let expected = Mat3::from_rotation_z(-angle);
        let actual = Mat3::from_mat4(m);
        // Strip the uniform screen scale (2/400 on both axes here).
        let scale = 2.0 / 400.0;
        for col in 0..3 {
            for row in 0..3 {
                let unscaled = if row < 2 {
                    actual.col(col)[row] / scale
                } else {
                    actual.col(col)[row]
                };
                assert!(
                    (unscaled - expected.col(col)[row]).abs() < 1e-5,
                    "mismatch at ({row}, {col})"
                );
            }
        }
    }

    #[test]
    fn test_square_and_wide_viewports_agree_on_y() {
        // The x scale is written in terms of the aspect ratio; it must still
        // reduce to 2/vw.
        let wide = view_projection(Viewport::new(1600, 400).unwrap(), None);
        assert!((wide.x_axis.x - 2.0 / 1600.0).abs() < 1e-7);
        assert!((wide.y_axis.y - 2.0 / 400.0).abs() < 1e-7);
    }
}
