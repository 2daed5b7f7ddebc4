//! ROCK Pi SATA HAT monitor
//!
//! Fan control from the CPU temperature, rotating status pages for the OLED
//! panel, and a single push button whose clicks, double clicks and long
//! presses are mapped onto configurable actions.

pub mod args;
pub mod config;
pub mod daemon;
pub mod dispatch;
pub mod display;
pub mod edge;
pub mod errors;
pub mod fan;
pub mod fan_control;
pub mod gesture;
pub mod logging;
pub mod metrics;
pub mod pages;
pub mod slider;

// Re-export commonly used types
pub use config::Config;
pub use dispatch::{Action, Dispatcher};
pub use errors::{EdgeSourceError, HatError, Result};
pub use fan::{duty_for, FanOverride, ThresholdTable};
pub use gesture::{EdgeEvent, EdgeKind, EdgeSource, Gesture, GestureClassifier, GestureTiming};
pub use pages::Page;
pub use slider::{PageScheduler, SlideSignal};
