//! Engine behavior against a scripted wire.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use cncsend_communication::{
    CommandQueueSet, ConsoleDirection, EngineConfig, MachineState, MachineStatus, ProtocolEngine,
    WireLink,
};
use cncsend_core::Result;

/// Wire double: hands out scripted incoming lines, records outgoing bytes.
#[derive(Clone, Default)]
struct MockLink {
    incoming: Arc<Mutex<VecDeque<String>>>,
    sent: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl MockLink {
    fn feed(&self, line: &str) {
        self.incoming.lock().push_back(line.to_string());
    }

    fn sent_frames(&self) -> Vec<Vec<u8>> {
        self.sent.lock().clone()
    }

    fn sent_count(&self) -> usize {
        self.sent.lock().len()
    }
}

impl WireLink for MockLink {
    fn transmit(&mut self, data: &[u8]) -> Result<()> {
        self.sent.lock().push(data.to_vec());
        Ok(())
    }

    fn receive_lines(&mut self) -> Result<Vec<String>> {
        Ok(self.incoming.lock().drain(..).collect())
    }

    fn describe(&self) -> String {
        "mock".to_string()
    }
}

fn quiet_config() -> EngineConfig {
    EngineConfig {
        poll_interval: Duration::from_millis(100),
        buffer_margin_blocks: 10,
        status_polling: false,
        modal_poll_divisor: 5,
    }
}

fn rig() -> (MockLink, ProtocolEngine, Arc<CommandQueueSet>, Arc<MachineState>) {
    let link = MockLink::default();
    let queues = Arc::new(CommandQueueSet::new());
    let machine = Arc::new(MachineState::new());
    let engine = ProtocolEngine::new(
        Box::new(link.clone()),
        quiet_config(),
        Arc::clone(&queues),
        Arc::clone(&machine),
    );
    (link, engine, queues, machine)
}

#[test]
fn normal_commands_stream_while_headroom_holds() {
    let (link, mut engine, queues, _machine) = rig();
    queues.push_normal("G0 X1");
    queues.push_normal("G0 X2");

    engine.tick().unwrap();
    engine.tick().unwrap();

    assert_eq!(link.sent_frames(), vec![b"G0 X1\n".to_vec(), b"G0 X2\n".to_vec()]);
}

#[test]
fn low_planner_headroom_gates_the_program_stream() {
    let (link, mut engine, queues, machine) = rig();
    queues.push_normal("G0 X1");
    link.feed("<Run|Bf:5,100>");

    engine.tick().unwrap();

    // the report was folded in before the send decision
    assert_eq!(machine.planner_blocks_free(), 5);
    assert_eq!(link.sent_count(), 0);
    assert_eq!(queues.normal_len(), 1);

    // headroom comes back, the stream resumes
    link.feed("<Run|Bf:14,100>");
    engine.tick().unwrap();
    assert_eq!(link.sent_count(), 1);
}

#[test]
fn immediate_commands_jump_the_gate() {
    let (link, mut engine, queues, _machine) = rig();
    link.feed("<Run|Bf:2,100>");
    queues.push_normal("G0 X1");
    queues.push_immediate("!");

    engine.tick().unwrap();

    // the hold went out even though the program stream is gated
    assert_eq!(link.sent_frames(), vec![b"!\n".to_vec()]);
    assert_eq!(queues.normal_len(), 1);
}

#[test]
fn one_command_per_tick_in_priority_order() {
    let (link, mut engine, queues, _machine) = rig();
    queues.push_immediate("~");
    queues.push_normal("G0 X1");
    queues.push_hidden("?");

    engine.tick().unwrap();
    assert_eq!(link.sent_count(), 1);
    engine.tick().unwrap();
    assert_eq!(link.sent_count(), 2);
    engine.tick().unwrap();

    assert_eq!(
        link.sent_frames(),
        vec![b"~\n".to_vec(), b"G0 X1\n".to_vec(), b"?\n".to_vec()]
    );
}

#[test]
fn dwell_stretches_the_tick_delay() {
    let (_link, mut engine, queues, _machine) = rig();
    queues.push_normal("G4 P2");
    let delay = engine.tick().unwrap();
    assert!(delay >= Duration::from_secs(2));

    queues.push_normal("G0 X1");
    let delay = engine.tick().unwrap();
    assert_eq!(delay, Duration::from_millis(100));
}

#[test]
fn alarm_halts_the_stream_until_unlocked() {
    let (link, mut engine, queues, machine) = rig();
    queues.push_normal("G0 X1");
    queues.push_normal("G0 X2");
    link.feed("ALARM:2");

    engine.tick().unwrap();
    assert_eq!(machine.status(), MachineStatus::Alarm(Some(2)));
    // the program is held, not dropped
    assert_eq!(queues.normal_len(), 2);
    assert_eq!(link.sent_count(), 0);

    // an unlock still gets through the immediate path
    queues.push_immediate("$X");
    engine.tick().unwrap();
    assert_eq!(link.sent_frames(), vec![b"$X\n".to_vec()]);

    // the device reports healthy again and the stream resumes
    link.feed("<Idle|Bf:15,128>");
    engine.tick().unwrap();
    assert_eq!(link.sent_count(), 2);
    assert_eq!(queues.normal_len(), 1);
}

#[test]
fn device_error_is_recoverable_and_described() {
    let (link, mut engine, queues, _machine) = rig();
    queues.push_normal("G1 X1");
    engine.tick().unwrap();
    link.feed("error:22");
    queues.push_normal("G1 X2 F100");
    engine.tick().unwrap();

    // the stream kept going
    assert_eq!(link.sent_count(), 2);
    let transcript = engine.transcript();
    let entries = transcript.lock().clone();
    assert!(entries
        .iter()
        .any(|e| e.direction == ConsoleDirection::Received && e.text.contains("Undefined feed rate")));
}

#[test]
fn hidden_traffic_stays_out_of_the_transcript() {
    let (link, mut engine, queues, machine) = rig();
    queues.push_hidden("$G");
    engine.tick().unwrap();
    link.feed("[GC:G1 G54 G17 G21 G90 G94 M5 M9 T0 F250 S0]");
    link.feed("ok");
    engine.tick().unwrap();

    assert_eq!(machine.modal().motion, "G1");
    assert_eq!(machine.modal().feed, 250.0);
    let transcript = engine.transcript();
    assert!(transcript.lock().is_empty());
    assert_eq!(link.sent_count(), 1);
}

#[test]
fn normal_ack_reaches_the_transcript() {
    let (link, mut engine, queues, _machine) = rig();
    queues.push_normal("G0 X1");
    engine.tick().unwrap();
    link.feed("ok");
    engine.tick().unwrap();

    let transcript = engine.transcript();
    let entries = transcript.lock().clone();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].direction, ConsoleDirection::Sent);
    assert_eq!(entries[0].text, "G0 X1");
    assert_eq!(entries[1].direction, ConsoleDirection::Received);
    assert_eq!(entries[1].text, "ok");
    let _ = link;
}

#[test]
fn welcome_banner_requeues_the_state_polls() {
    let (link, mut engine, queues, machine) = rig();
    link.feed("<Idle|MPos:0.000,0.000,0.000|Bf:15,128>");
    link.feed("Grbl 1.1h ['$' for help]");
    engine.tick().unwrap();

    // the banner wipes the mirror but not the last known status
    assert_eq!(machine.status(), MachineStatus::Idle);
    // the settings dump goes out first, the modal query on the next tick
    engine.tick().unwrap();
    assert_eq!(
        link.sent_frames(),
        vec![b"$$\n".to_vec(), b"$G\n".to_vec()]
    );
    let _ = queues;
}

#[test]
fn reset_of_a_locked_controller_keeps_the_gate_shut() {
    let (link, mut engine, queues, machine) = rig();
    link.feed("ALARM:9");
    engine.tick().unwrap();

    // homing-required firmware is still alarmed after its reset banner
    link.feed("Grbl 1.1h ['$' for help]");
    queues.push_normal("G0 X1");
    engine.tick().unwrap();

    assert_eq!(machine.status(), MachineStatus::Alarm(Some(9)));
    assert!(!link.sent_frames().contains(&b"G0 X1\n".to_vec()));
    assert_eq!(queues.normal_len(), 1);
}

#[test]
fn settings_lines_update_the_mirror() {
    let (link, mut engine, _queues, machine) = rig();
    link.feed("$110=1000.000");
    link.feed("$23=5");
    engine.tick().unwrap();

    use cncsend_communication::SettingValue;
    assert_eq!(machine.setting(110), Some(SettingValue::Float(1000.0)));
    assert_eq!(
        machine.setting(23),
        Some(SettingValue::Mask(vec![true, false, true]))
    );
}

#[test]
fn pause_flag_holds_the_stream_without_dropping_it() {
    let (link, mut engine, queues, _machine) = rig();
    let paused = engine.pause_flag();
    queues.push_normal("G0 X1");
    paused.store(true, std::sync::atomic::Ordering::SeqCst);

    engine.tick().unwrap();
    assert_eq!(link.sent_count(), 0);
    assert_eq!(queues.normal_len(), 1);

    paused.store(false, std::sync::atomic::Ordering::SeqCst);
    engine.tick().unwrap();
    assert_eq!(link.sent_count(), 1);
}

#[test]
fn status_polling_polls_when_idle() {
    let link = MockLink::default();
    let queues = Arc::new(CommandQueueSet::new());
    let machine = Arc::new(MachineState::new());
    let config = EngineConfig {
        status_polling: true,
        modal_poll_divisor: 5,
        ..quiet_config()
    };
    let mut engine = ProtocolEngine::new(
        Box::new(link.clone()),
        config,
        Arc::clone(&queues),
        Arc::clone(&machine),
    );

    for _ in 0..6 {
        engine.tick().unwrap();
    }

    let frames = link.sent_frames();
    let status_polls = frames.iter().filter(|f| f.as_slice() == b"?\n").count();
    let modal_polls = frames.iter().filter(|f| f.as_slice() == b"$G\n").count();
    assert_eq!(status_polls, 5);
    assert_eq!(modal_polls, 1);
}

#[test]
fn status_polls_interleave_with_a_streaming_job() {
    let link = MockLink::default();
    let queues = Arc::new(CommandQueueSet::new());
    let machine = Arc::new(MachineState::new());
    let config = EngineConfig {
        status_polling: true,
        ..quiet_config()
    };
    let mut engine = ProtocolEngine::new(
        Box::new(link.clone()),
        config,
        Arc::clone(&queues),
        Arc::clone(&machine),
    );

    for i in 0..10 {
        queues.push_normal(format!("G1 X{i} F100"));
    }
    for _ in 0..30 {
        engine.tick().unwrap();
    }

    // the whole program went out, with headroom queries mixed in so the
    // Bf gate never runs on stale telemetry
    let frames = link.sent_frames();
    let motion = frames.iter().filter(|f| f.starts_with(b"G1")).count();
    let status_polls = frames.iter().filter(|f| f.as_slice() == b"?\n").count();
    assert_eq!(motion, 10);
    assert!(status_polls >= 10, "only {status_polls} status polls sent");
}
