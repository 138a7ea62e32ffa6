//! Connection session lifecycle
//!
//! A `SessionSlot` owns at most one live connection. Connecting while one
//! is active tears the old one down first, so callers never juggle two
//! engines talking to the same port. The engine loop runs on a tokio task;
//! shutdown goes through a channel with abort as the backstop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::engine::{ConsoleEntry, EngineConfig, ProtocolEngine};
use crate::machine::{MachineSnapshot, MachineState, MachineStatus};
use crate::queue::CommandQueueSet;
use crate::wire::{realtime, WireLink};

/// Cloneable control surface for one live connection.
///
/// All methods are queue pushes or flag flips; none of them block on the
/// device.
#[derive(Clone)]
pub struct SessionHandle {
    queues: Arc<CommandQueueSet>,
    machine: Arc<MachineState>,
    transcript: Arc<Mutex<Vec<ConsoleEntry>>>,
    paused: Arc<AtomicBool>,
}

impl SessionHandle {
    /// Queue one program or console line for flow-controlled sending.
    pub fn send(&self, line: impl Into<String>) {
        self.queues.push_normal(line);
    }

    /// Queue a quiet query (`?`, `$G`, `$$`) that stays out of the console.
    pub fn query(&self, command: impl Into<String>) {
        self.queues.push_hidden(command);
    }

    /// Queue a raw real-time control byte ahead of everything.
    pub fn send_realtime(&self, byte: u8) {
        self.queues.push_immediate(format!("0x{byte:02x}"));
    }

    /// Feed hold: stop releasing program lines and ask the device to pause.
    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
        self.queues.push_immediate("!");
    }

    /// Cycle start: resume the device and the program stream.
    pub fn resume(&self) {
        self.queues.push_immediate("~");
        self.paused.store(false, Ordering::SeqCst);
    }

    /// Abort the running job: flush the queued program, hold, then soft
    /// reset. The reset banner re-triggers the settings and modal polls.
    pub fn stop(&self) {
        let dropped = self.queues.clear_normal();
        tracing::info!(dropped, "job stopped, program queue flushed");
        self.queues.push_immediate("!");
        self.queues.push_immediate(format!("0x{:02x}", realtime::RESET));
        self.paused.store(false, Ordering::SeqCst);
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub fn machine(&self) -> Arc<MachineState> {
        Arc::clone(&self.machine)
    }

    pub fn snapshot(&self) -> MachineSnapshot {
        self.machine.snapshot()
    }

    /// Copy of the console transcript so far.
    pub fn transcript(&self) -> Vec<ConsoleEntry> {
        self.transcript.lock().clone()
    }

    /// Lines still waiting in the program queue.
    pub fn queued_lines(&self) -> usize {
        self.queues.normal_len()
    }
}

struct ActiveSession {
    handle: SessionHandle,
    shutdown: mpsc::Sender<()>,
    task: JoinHandle<()>,
}

/// Holder for the one live session. Reconnect supersedes, disconnect is
/// idempotent.
#[derive(Default)]
pub struct SessionSlot {
    active: Mutex<Option<ActiveSession>>,
}

impl SessionSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start an engine over `link`, replacing any previous session.
    ///
    /// Must be called from within a tokio runtime.
    pub fn connect(&self, link: Box<dyn WireLink>, config: EngineConfig) -> SessionHandle {
        self.disconnect();

        let queues = Arc::new(CommandQueueSet::new());
        let machine = Arc::new(MachineState::new());
        let endpoint = link.describe();
        let mut engine =
            ProtocolEngine::new(link, config, Arc::clone(&queues), Arc::clone(&machine));

        let handle = SessionHandle {
            queues,
            machine: Arc::clone(&machine),
            transcript: engine.transcript(),
            paused: engine.pause_flag(),
        };

        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let loop_queues = Arc::clone(&handle.queues);
        let task = tokio::spawn(async move {
            tracing::info!(endpoint, "session started");
            loop {
                let delay = match engine.tick() {
                    Ok(delay) => delay,
                    Err(e) => {
                        tracing::error!(endpoint, error = %e, "connection lost");
                        loop_queues.clear_all();
                        machine.reset();
                        break;
                    }
                };
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        tracing::info!(endpoint, "session shut down");
                        break;
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        });

        *self.active.lock() = Some(ActiveSession {
            handle: handle.clone(),
            shutdown: shutdown_tx,
            task,
        });
        handle
    }

    /// Tear down the current session, if any. Safe to call repeatedly.
    pub fn disconnect(&self) {
        if let Some(session) = self.active.lock().take() {
            let _ = session.shutdown.try_send(());
            session.task.abort();
            session.handle.queues.clear_all();
            session.handle.machine.set_status(MachineStatus::Disconnected);
        }
    }

    pub fn is_connected(&self) -> bool {
        self.active.lock().is_some()
    }

    /// Handle for the live session, if one exists.
    pub fn handle(&self) -> Option<SessionHandle> {
        self.active.lock().as_ref().map(|s| s.handle.clone())
    }
}

impl Drop for SessionSlot {
    fn drop(&mut self) {
        self.disconnect();
    }
}
