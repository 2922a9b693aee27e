//! Operator console core for a remotely driven vehicle.
//!
//! Samples keyboard or analog-device input, shapes it into bounded control
//! commands, sends them over a WebSocket to the vehicle's controller and
//! reconciles the controller's telemetry into an instrument display.

pub mod config;
pub mod controller;
pub mod display;
pub mod network;
pub mod scheduler;
pub mod shaping;
pub mod state;
