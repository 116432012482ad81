//! Utility Module
//!
//! - [`FrameClock`]: per-frame time and time step for the render loop

pub mod time;

pub use time::FrameClock;
