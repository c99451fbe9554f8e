use ultraviolet::{Mat4, Vec2, Vec3};

/// Margin around a fit document, in view pixels.
pub const MARGIN: f32 = 8.0;

/// An affine transform from document pixels to view pixels: uniform scale, then rotation,
/// then displacement of the document's top-left corner.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ViewTransform {
    pub scale: f32,
    /// Radians, clockwise on screen.
    pub rotation: f32,
    pub disp: Vec2,
}

#[derive(Debug, thiserror::Error)]
pub enum TransformError {
    /// Scale got too close to zero to invert.
    #[error("uninvertable")]
    Uninvertable,
}

impl Default for ViewTransform {
    fn default() -> Self {
        Self {
            scale: 1.0,
            rotation: 0.0,
            disp: Vec2::zero(),
        }
    }
}

impl ViewTransform {
    /// A transform placing the document's center at `view_center`.
    #[must_use]
    pub fn center_on(view_center: Vec2, document_size: Vec2, rotation: f32, scale: f32) -> Self {
        let half = daub_core::element::rotate(document_size * 0.5, rotation) * scale;
        Self {
            scale,
            rotation,
            disp: view_center - half,
        }
    }
    /// The largest unrotated view showing the whole document within `view_size`, less a margin.
    #[must_use]
    pub fn fit(document_size: Vec2, view_size: Vec2) -> Self {
        let room = (view_size - Vec2::broadcast(MARGIN * 2.0)).max_by_component(Vec2::one());
        let scale = (room.x / document_size.x).min(room.y / document_size.y);
        Self::center_on(view_size * 0.5, document_size, 0.0, scale)
    }
    /// Document point to view point.
    #[must_use]
    pub fn project(&self, local: Vec2) -> Vec2 {
        daub_core::element::rotate(local * self.scale, self.rotation) + self.disp
    }
    /// View point to document point.
    pub fn unproject(&self, view: Vec2) -> Result<Vec2, TransformError> {
        if self.scale.abs() < f32::EPSILON {
            return Err(TransformError::Uninvertable);
        }
        Ok(daub_core::element::rotate(view - self.disp, -self.rotation) / self.scale)
    }
    /// Pan by a view space displacement.
    pub fn pan(&mut self, delta: Vec2) {
        self.disp += delta;
    }
    /// Scale such that `view_center` stays put.
    pub fn scale_about(&mut self, view_center: Vec2, scale_by: f32) {
        let local_center = view_center - self.disp;
        self.scale *= scale_by;
        self.disp = view_center - local_center * scale_by;
    }
    /// Rotate such that `view_center` stays put.
    pub fn rotate_about(&mut self, view_center: Vec2, rotate: f32) {
        let local_center = daub_core::element::rotate(view_center - self.disp, rotate);
        self.rotation += rotate;
        self.disp = view_center - local_center;
    }
    #[must_use]
    pub fn matrix(&self) -> Mat4 {
        Mat4::from_translation(Vec3::new(self.disp.x, self.disp.y, 0.0))
            * Mat4::from_rotation_z(self.rotation)
            * Mat4::from_scale(self.scale)
    }
}

/// Maps pixel coordinates of a `width` x `height` target, y down, to clip space.
#[must_use]
pub fn pixel_projection(width: f32, height: f32) -> Mat4 {
    Mat4::from_translation(Vec3::new(-1.0, 1.0, 0.0))
        * Mat4::from_nonuniform_scale(Vec3::new(2.0 / width, -2.0 / height, 1.0))
}

#[cfg(test)]
mod test {
    use super::{pixel_projection, ViewTransform};
    use ultraviolet::{Vec2, Vec4};

    fn close(a: Vec2, b: Vec2) -> bool {
        (a - b).mag() < 1e-3
    }

    #[test]
    fn project_unproject() {
        let mut view =
            ViewTransform::center_on(Vec2::new(400.0, 300.0), Vec2::new(100.0, 50.0), 0.3, 2.0);
        view.pan(Vec2::new(5.0, -3.0));
        view.scale_about(Vec2::new(10.0, 10.0), 1.5);
        view.rotate_about(Vec2::new(200.0, 100.0), -0.7);
        for point in [Vec2::zero(), Vec2::new(100.0, 50.0), Vec2::new(-3.0, 17.0)] {
            let there = view.project(point);
            assert!(close(view.unproject(there).unwrap(), point));
            let m = view.matrix() * Vec4::new(point.x, point.y, 0.0, 1.0);
            assert!(close(Vec2::new(m.x, m.y), there));
        }
    }
    #[test]
    fn anchors_stay_put() {
        let mut view = ViewTransform::default();
        let anchor = Vec2::new(30.0, 40.0);
        let before = view.unproject(anchor).unwrap();
        view.scale_about(anchor, 3.0);
        view.rotate_about(anchor, 1.0);
        assert!(close(view.project(before), anchor));
    }
    #[test]
    fn fit_centers() {
        let view = ViewTransform::fit(Vec2::new(200.0, 100.0), Vec2::new(416.0, 416.0));
        assert!((view.scale - 2.0).abs() < 1e-5);
        assert!(close(view.project(Vec2::new(100.0, 50.0)), Vec2::new(208.0, 208.0)));
    }
    #[test]
    fn projection_corners() {
        let proj = pixel_projection(10.0, 20.0);
        let top_left = proj * Vec4::new(0.0, 0.0, 0.0, 1.0);
        let bottom_right = proj * Vec4::new(10.0, 20.0, 0.0, 1.0);
        assert!(close(Vec2::new(top_left.x, top_left.y), Vec2::new(-1.0, 1.0)));
        assert!(close(Vec2::new(bottom_right.x, bottom_right.y), Vec2::new(1.0, -1.0)));
    }
    #[test]
    fn zero_scale_uninvertable() {
        let view = ViewTransform {
            scale: 0.0,
            ..ViewTransform::default()
        };
        assert!(view.unproject(Vec2::zero()).is_err());
    }
}
