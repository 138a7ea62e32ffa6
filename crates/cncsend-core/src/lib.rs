//! # cncsend Core
//!
//! Core types shared by the interpreter and communication crates:
//! 3-axis geometry, canonical unit handling, and the error taxonomy.

pub mod error;
pub mod geom;
pub mod units;

pub use error::{Error, ProtocolError, Result};
pub use geom::{Point3, Segment};
pub use units::{Units, MM_PER_INCH};
