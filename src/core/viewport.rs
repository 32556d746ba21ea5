use crate::core::bounds::Bounds;
use crate::core::geo::Point;

/// The three nested rectangles the tile grid is computed against.
///
/// `view_port` is what the user sees, `inner_extended` is the region that
/// must be covered with tiles and `outer_extended` is the tolerance region
/// outside of which tiles are evicted. The nesting
/// `view_port ⊆ inner_extended ⊆ outer_extended` always holds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportRects {
    pub view_port: Bounds,
    pub inner_extended: Bounds,
    pub outer_extended: Bounds,
}

impl ViewportRects {
    pub fn new(width: u32, height: u32, inner_extension_px: f64, outer_margin_px: f64) -> Self {
        let view_port = Bounds::from_origin_and_size(0.0, 0.0, width as f64, height as f64);
        let inner_extended = view_port.expanded(inner_extension_px.max(0.0));
        let outer_extended = inner_extended.expanded(outer_margin_px.max(0.0));

        Self {
            view_port,
            inner_extended,
            outer_extended,
        }
    }

    pub fn width(&self) -> f64 {
        self.view_port.width()
    }

    pub fn height(&self) -> f64 {
        self.view_port.height()
    }

    /// Center of the visible area
    pub fn center(&self) -> Point {
        self.view_port.center()
    }

    /// Checks the nesting invariant
    pub fn is_nested(&self) -> bool {
        self.inner_extended.contains_bounds(&self.view_port)
            && self.outer_extended.contains_bounds(&self.inner_extended)
    }
}

impl Default for ViewportRects {
    fn default() -> Self {
        Self::new(0, 0, 0.0, 0.0)
    }
}
