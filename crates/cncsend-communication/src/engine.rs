//! Flow-controlled streaming engine
//!
//! One `tick` drains everything the device sent, folds it into the shared
//! machine state, then transmits at most one queued command chosen by
//! priority: immediate first, then the buffer-gated program stream, then
//! hidden polls. The returned duration is how long the session loop should
//! sleep before the next tick; a dwell command stretches it so the poll
//! cadence does not hammer a device that is deliberately waiting.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

use cncsend_core::{ProtocolError, Result};

use crate::decoder::{describe_alarm, describe_error, DecodedResponse, ResponseDecoder};
use crate::machine::{MachineState, MachineStatus};
use crate::queue::CommandQueueSet;
use crate::wire::{frame_command, WireLink};

fn dwell_rex() -> &'static Regex {
    static REX: OnceLock<Regex> = OnceLock::new();
    REX.get_or_init(|| Regex::new(r"G0*4 *P *([0-9]*\.?[0-9]*)").expect("invalid regex pattern"))
}

/// What kind of response a transmitted command will elicit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandClass {
    /// Program or console command, answered with ok/error
    Normal,
    /// `?`, answered with a status frame and no ok
    StatusQuery,
    /// `$G`, answered with a modal echo then ok
    ModalQuery,
    /// `$$`, answered with settings lines then ok
    SettingsQuery,
    /// Raw control bytes, never acknowledged
    Realtime,
}

impl CommandClass {
    pub fn classify(command: &str) -> Self {
        let trimmed = command.trim();
        if trimmed == "?" {
            CommandClass::StatusQuery
        } else if trimmed.eq_ignore_ascii_case("$g") {
            CommandClass::ModalQuery
        } else if trimmed == "$$" || trimmed == "$" {
            CommandClass::SettingsQuery
        } else if trimmed.starts_with("0x")
            || trimmed.starts_with("0X")
            || trimmed == "!"
            || trimmed == "~"
        {
            CommandClass::Realtime
        } else {
            CommandClass::Normal
        }
    }

    /// Whether the device answers this command with ok/error.
    fn acknowledged(&self) -> bool {
        !matches!(self, CommandClass::StatusQuery | CommandClass::Realtime)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConsoleDirection {
    Sent,
    Received,
}

/// One line of the user-visible console transcript. Hidden polls and their
/// machine-readable answers are not recorded here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsoleEntry {
    pub direction: ConsoleDirection,
    pub text: String,
}

/// Engine tuning.
#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    /// Base delay between ticks
    pub poll_interval: Duration,
    /// Minimum planner blocks that must stay free while streaming
    pub buffer_margin_blocks: u32,
    /// Emit `?` and `$G` polls automatically (off in tests)
    pub status_polling: bool,
    /// A `$G` poll is queued every this many status polls
    pub modal_poll_divisor: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            buffer_margin_blocks: 10,
            status_polling: true,
            modal_poll_divisor: 5,
        }
    }
}

/// The streaming protocol engine. Owned by one session loop; everything it
/// shares (queues, machine state, transcript, pause flag) is `Arc`ed out.
pub struct ProtocolEngine {
    link: Box<dyn WireLink>,
    config: EngineConfig,
    queues: Arc<CommandQueueSet>,
    machine: Arc<MachineState>,
    decoder: ResponseDecoder,
    transcript: Arc<Mutex<Vec<ConsoleEntry>>>,
    paused: Arc<AtomicBool>,
    /// Classes of transmitted commands still awaiting ok/error, FIFO
    in_flight: VecDeque<CommandClass>,
    /// Next non-immediate send slot goes to the hidden queue
    hidden_turn: bool,
    poll_count: u32,
}

impl ProtocolEngine {
    pub fn new(
        link: Box<dyn WireLink>,
        config: EngineConfig,
        queues: Arc<CommandQueueSet>,
        machine: Arc<MachineState>,
    ) -> Self {
        Self {
            link,
            config,
            queues,
            machine,
            decoder: ResponseDecoder::new(),
            transcript: Arc::new(Mutex::new(Vec::new())),
            paused: Arc::new(AtomicBool::new(false)),
            in_flight: VecDeque::new(),
            hidden_turn: false,
            poll_count: 0,
        }
    }

    pub fn transcript(&self) -> Arc<Mutex<Vec<ConsoleEntry>>> {
        Arc::clone(&self.transcript)
    }

    pub fn pause_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.paused)
    }

    /// Run one protocol cycle: drain received lines, then transmit at most
    /// one command. Returns the delay until the next tick.
    pub fn tick(&mut self) -> Result<Duration> {
        for line in self.link.receive_lines()? {
            self.handle_line(&line);
        }

        // polls are enqueued before the send decision so telemetry keeps
        // refreshing even while a job streams; dedup bounds the queue
        if self.config.status_polling {
            self.queue_polls();
        }

        let mut delay = self.config.poll_interval;

        if let Some(command) = self.queues.pop_immediate() {
            self.transmit(&command, false)?;
            return Ok(delay);
        }

        // an alarmed device rejects motion; hold the stream until an unlock
        // arrives through the immediate or hidden path
        let alarmed = matches!(self.machine.status(), MachineStatus::Alarm(_));
        let gated_open = !self.paused.load(Ordering::SeqCst)
            && !alarmed
            && self.machine.planner_blocks_free() > self.config.buffer_margin_blocks;

        // alternate program lines and hidden polls while both are waiting,
        // so the Bf headroom the gate runs on never goes stale mid-job
        if self.hidden_turn || !gated_open {
            if let Some(command) = self.queues.pop_hidden() {
                self.hidden_turn = false;
                self.transmit(&command, true)?;
                return Ok(delay);
            }
        }

        if gated_open {
            if let Some(command) = self.queues.pop_normal() {
                self.hidden_turn = true;
                if let Some(seconds) = dwell_seconds(&command) {
                    delay += Duration::from_secs_f64(seconds);
                }
                self.transmit(&command, false)?;
                return Ok(delay);
            }
        }

        if let Some(command) = self.queues.pop_hidden() {
            self.transmit(&command, true)?;
        }

        Ok(delay)
    }

    /// Keep the status picture fresh; `$G` replaces every fifth poll while
    /// no program lines are waiting.
    fn queue_polls(&mut self) {
        self.poll_count += 1;
        let inactive = self.queues.normal_len() == 0;
        if inactive && self.poll_count % self.config.modal_poll_divisor == 0 {
            self.queues.push_hidden("$G");
        } else {
            self.queues.push_hidden("?");
        }
    }

    fn transmit(&mut self, command: &str, quiet: bool) -> Result<()> {
        let class = CommandClass::classify(command);
        let frame = frame_command(command)?;
        self.link.transmit(&frame)?;
        tracing::trace!(command, ?class, "transmitted");
        if class.acknowledged() {
            self.in_flight.push_back(class);
        }
        if !quiet {
            self.record(ConsoleDirection::Sent, command);
        }
        Ok(())
    }

    fn handle_line(&mut self, line: &str) {
        match self.decoder.decode(line) {
            DecodedResponse::Ack => {
                let class = self.in_flight.pop_front();
                // only acks for visible commands reach the console
                if class == Some(CommandClass::Normal) {
                    self.record(ConsoleDirection::Received, line);
                }
            }
            DecodedResponse::DeviceError(code) => {
                self.in_flight.pop_front();
                let err = ProtocolError::DeviceError {
                    code,
                    description: describe_error(code).to_string(),
                };
                tracing::warn!(code, "{err}");
                self.record(ConsoleDirection::Received, &format!("{line} ({err})"));
            }
            DecodedResponse::Alarm(code) => {
                let err = ProtocolError::Alarm {
                    detail: code.map(describe_alarm).unwrap_or("Unknown alarm").to_string(),
                };
                tracing::error!(?code, "{err}");
                self.machine.set_status(MachineStatus::Alarm(code));
                self.record(ConsoleDirection::Received, line);
            }
            DecodedResponse::Status(report) => {
                self.machine.apply_report(&report);
            }
            DecodedResponse::ModalEcho(tokens) => {
                let changed = self
                    .machine
                    .apply_modal_tokens(tokens.iter().map(String::as_str));
                if !changed.is_empty() {
                    tracing::info!(?changed, "modal state changed");
                }
            }
            DecodedResponse::Setting { id, raw } => {
                self.machine.apply_setting(id, &raw);
            }
            DecodedResponse::Welcome(banner) => {
                tracing::info!(banner, "device reset");
                // a controller that boots locked is still in Alarm after the
                // banner; keep the last known status until the next report
                let status = self.machine.status();
                self.machine.reset();
                self.machine.set_status(status);
                self.in_flight.clear();
                self.queues.push_hidden("$$");
                self.queues.push_hidden("$G");
                self.record(ConsoleDirection::Received, &banner);
            }
            DecodedResponse::Feedback(payload) => {
                self.record(ConsoleDirection::Received, &payload);
            }
            DecodedResponse::Other(text) => {
                self.record(ConsoleDirection::Received, &text);
            }
        }
    }

    fn record(&self, direction: ConsoleDirection, text: &str) {
        self.transcript.lock().push(ConsoleEntry {
            direction,
            text: text.to_string(),
        });
    }
}

/// Seconds requested by a `G4 Pn` dwell, if the command is one.
fn dwell_seconds(command: &str) -> Option<f64> {
    dwell_rex()
        .captures(&command.to_uppercase())
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .filter(|s| *s > 0.0)
}
