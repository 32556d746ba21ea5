pub mod camera;
pub mod repaint;

// Re-export main types
pub use camera::Camera;
pub use repaint::{repaint_channel, RepaintReceiver, RepaintSignal};
