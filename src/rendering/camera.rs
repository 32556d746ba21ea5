use crate::core::bounds::Bounds;
use crate::core::constants::TILE_SIZE;
use crate::core::geo::Point;
use nalgebra::{Matrix3, Point2, Vector2};

/// 2D camera: translation plus uniform scale, mapping untransformed screen
/// space onto the displayed view.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    matrix: Matrix3<f64>,
}

impl Camera {
    pub fn identity() -> Self {
        Self {
            matrix: Matrix3::identity(),
        }
    }

    pub fn matrix(&self) -> &Matrix3<f64> {
        &self.matrix
    }

    /// Uniform scale factor of the transform.
    pub fn scale(&self) -> f64 {
        self.matrix[(0, 0)]
    }

    /// Translation part of the transform.
    pub fn translation(&self) -> Point {
        Point::new(self.matrix[(0, 2)], self.matrix[(1, 2)])
    }

    /// Edge length of a tile on screen.
    pub fn scaled_tile_size(&self) -> f64 {
        TILE_SIZE as f64 * self.scale()
    }

    /// Translates in the camera's own (pre-scale) coordinates.
    pub fn translate(&mut self, dx: f64, dy: f64) {
        self.matrix *= Matrix3::new_translation(&Vector2::new(dx, dy));
    }

    /// Translates in screen coordinates.
    pub fn pre_translate(&mut self, dx: f64, dy: f64) {
        self.matrix = Matrix3::new_translation(&Vector2::new(dx, dy)) * self.matrix;
    }

    /// Scales by `factor` keeping the screen position `pivot` fixed.
    pub fn zoom_about(&mut self, pivot: Point, factor: f64) {
        let to_origin = Matrix3::new_translation(&Vector2::new(-pivot.x, -pivot.y));
        let scale = Matrix3::new_scaling(factor);
        let back = Matrix3::new_translation(&Vector2::new(pivot.x, pivot.y));
        self.matrix = back * scale * to_origin * self.matrix;
    }

    pub fn transform_point(&self, point: Point) -> Point {
        let p = self.matrix.transform_point(&Point2::new(point.x, point.y));
        Point::new(p.x, p.y)
    }

    /// `None` when the transform is singular (scale 0).
    pub fn inverse_transform_point(&self, point: Point) -> Option<Point> {
        let inverse = self.matrix.try_inverse()?;
        let p = inverse.transform_point(&Point2::new(point.x, point.y));
        Some(Point::new(p.x, p.y))
    }

    pub fn transform_bounds(&self, bounds: &Bounds) -> Bounds {
        let mut result = Bounds::empty();
        result.extend(&self.transform_point(bounds.min));
        result.extend(&self.transform_point(bounds.max));
        result
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self::identity()
    }
}
