//! Input shaping: turns intent into the bounded values that go on the wire.
//!
//! - [`axis_shaper`] - Pedal axes: slew-limited for keys, smoothed for analog
//! - [`steering`] - Accumulated steering angle with throttle-scaled auto-centering

pub mod axis_shaper;
pub mod steering;

pub use axis_shaper::{AxisDisplay, AxisShaper, AxisState};
pub use steering::SteeringAccumulator;
