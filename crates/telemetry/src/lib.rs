//! Execution tracing for RustedCode turns.
//!
//! The [`TraceRecorder`] keeps one trace per turn with strictly ordered steps
//! and publishes every transition on the event bus. [`EventLogger`] is an
//! independent bus observer that forwards those events to `tracing`.

pub mod model;
pub mod observer;
pub mod recorder;

pub use model::{StepStatus, Trace, TraceStatus, TraceStep};
pub use observer::EventLogger;
pub use recorder::TraceRecorder;
