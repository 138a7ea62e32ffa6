//! # cncsend communication
//!
//! The device-facing half of cncsend: a wire abstraction over serial ports,
//! the three-queue flow-controlled streaming engine, a GRBL response
//! decoder, and shared machine state that mirrors what the controller last
//! reported.

pub mod decoder;
pub mod engine;
pub mod machine;
pub mod queue;
pub mod serial;
pub mod session;
pub mod settings;
pub mod wire;

pub use decoder::{DecodedResponse, ResponseDecoder};
pub use engine::{CommandClass, ConsoleDirection, ConsoleEntry, EngineConfig, ProtocolEngine};
pub use machine::{MachineSnapshot, MachineState, MachineStatus, ModalEcho};
pub use queue::CommandQueueSet;
pub use serial::{list_ports, SerialLink, SerialPortInfo};
pub use session::{SessionHandle, SessionSlot};
pub use settings::{format_setting_write, setting_kind, SettingKind, SettingValue};
pub use wire::{frame_command, realtime, WireLink};
