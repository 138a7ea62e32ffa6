//! # cncsend G-code
//!
//! Streaming, stateful G-code interpretation for a GRBL-class controller:
//! modal state tracking across lines, arc-to-segment discretization, and an
//! incrementally loaded program model with running aggregates.

pub mod arc;
pub mod interpreter;
pub mod modal;
pub mod program;

pub use arc::{ArcDirection, ArcDiscretizer, ArcTessellation};
pub use interpreter::{GcodeInterpreter, MotionRecord};
pub use modal::{resolve, DistanceMode, ModalState, MotionMode, Plane};
pub use program::{ProgramModel, ProgramTotals};
