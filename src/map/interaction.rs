use crate::core::constants::{WHEEL_ZOOM_DIVISOR, ZOOM_DRAG_DIVISOR};
use crate::core::geo::Point;
use crate::rendering::camera::Camera;
use std::fmt;

/// What a pointer drag currently does to the camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InteractionState {
    #[default]
    Normal,
    Pan,
    Zoom,
}

impl fmt::Display for InteractionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Normal => "normal",
            Self::Pan => "pan",
            Self::Zoom => "zoom",
        };
        f.write_str(name)
    }
}

/// Drag bookkeeping: the press point and the camera at press time. Every
/// drag position is applied to that saved camera, never incrementally.
#[derive(Debug, Clone, Default)]
pub(crate) struct Interaction {
    state: InteractionState,
    press: Point,
    saved_camera: Camera,
}

impl Interaction {
    pub fn state(&self) -> InteractionState {
        self.state
    }

    pub fn begin(&mut self, state: InteractionState, press: Point, camera: &Camera) {
        self.state = state;
        self.press = press;
        self.saved_camera = *camera;
    }

    pub fn end(&mut self) -> InteractionState {
        std::mem::take(&mut self.state)
    }

    /// Restarts the drag from `press` with `camera`, used after the zoom
    /// level changed underneath a running drag.
    pub fn rebase(&mut self, press: Point, camera: &Camera) {
        if self.state != InteractionState::Normal {
            self.press = press;
            self.saved_camera = *camera;
        }
    }

    /// Camera for the pointer at `to`, or `None` outside a drag.
    pub fn drag(&self, to: Point) -> Option<Camera> {
        let mut camera = self.saved_camera;
        match self.state {
            InteractionState::Normal => return None,
            InteractionState::Pan => {
                let scale = camera.scale();
                if scale == 0.0 {
                    return None;
                }
                camera.translate((to.x - self.press.x) / scale, (to.y - self.press.y) / scale);
            }
            InteractionState::Zoom => {
                camera.zoom_about(self.press, drag_zoom_factor(self.press.y, to.y));
            }
        }
        Some(camera)
    }
}

/// Dragging up zooms in, dragging down zooms out by the inverse amount.
pub fn drag_zoom_factor(press_y: f64, y: f64) -> f64 {
    let factor = 1.0 + (press_y - y).abs() / ZOOM_DRAG_DIVISOR;
    if y > press_y {
        1.0 / factor
    } else {
        factor
    }
}

pub fn wheel_zoom_factor(rotation: f64) -> f64 {
    1.0 + rotation / WHEEL_ZOOM_DIVISOR
}
