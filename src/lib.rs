//! # cncsend
//!
//! A GRBL-class G-code interpreter and flow-controlled sender core:
//! stream a program over serial to a CNC controller while mirroring the
//! machine's reported state.
//!
//! ## Architecture
//!
//! cncsend is organized as a workspace:
//!
//! 1. **cncsend-core** - shared geometry, units and error types
//! 2. **cncsend-gcode** - modal interpreter, arc discretization, program model
//! 3. **cncsend-communication** - serial transport, streaming engine, machine state
//! 4. **cncsend** - configuration and the headless sender binary

pub mod config;

pub use config::AppConfig;

pub use cncsend_core::{Error, Point3, ProtocolError, Result, Segment, Units};

pub use cncsend_gcode::{
    ArcDirection, ArcDiscretizer, ArcTessellation, DistanceMode, GcodeInterpreter, ModalState,
    MotionMode, MotionRecord, Plane, ProgramModel, ProgramTotals,
};

pub use cncsend_communication::{
    frame_command, list_ports, realtime, CommandClass, CommandQueueSet, ConsoleDirection,
    ConsoleEntry, DecodedResponse, EngineConfig, MachineSnapshot, MachineState, MachineStatus,
    ModalEcho, ProtocolEngine, ResponseDecoder, SerialLink, SerialPortInfo, SessionHandle,
    SessionSlot, SettingKind, SettingValue, WireLink,
};

/// Initialize logging with the default configuration
///
/// Structured console output, RUST_LOG environment variable support,
/// INFO level by default.
pub fn init_logging() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let env_filter = EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into());

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stdout)
        .with_target(true)
        .with_level(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();

    Ok(())
}
