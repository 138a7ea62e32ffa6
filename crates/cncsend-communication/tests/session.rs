//! Session lifecycle tests over a mock wire.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use cncsend_communication::{EngineConfig, MachineStatus, SessionSlot, WireLink};
use cncsend_core::Result;

#[derive(Clone, Default)]
struct MockLink {
    incoming: Arc<Mutex<VecDeque<String>>>,
    sent: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl MockLink {
    fn sent_frames(&self) -> Vec<Vec<u8>> {
        self.sent.lock().clone()
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

fn fast_config() -> EngineConfig {
    EngineConfig {
        poll_interval: Duration::from_millis(1),
        buffer_margin_blocks: 10,
        status_polling: false,
        modal_poll_divisor: 5,
    }
}

#[tokio::test]
async fn queued_lines_reach_the_wire() {
    let slot = SessionSlot::new();
    let link = MockLink::default();
    let handle = slot.connect(Box::new(link.clone()), fast_config());

    handle.send("G0 X1");
    handle.send("G1 X2 F100");
    tokio::time::sleep(Duration::from_millis(50)).await;

    let frames = link.sent_frames();
    assert!(frames.contains(&b"G0 X1\n".to_vec()));
    assert!(frames.contains(&b"G1 X2 F100\n".to_vec()));
    slot.disconnect();
}

#[tokio::test]
async fn reconnect_supersedes_the_previous_session() {
    let slot = SessionSlot::new();
    let first_link = MockLink::default();
    let first = slot.connect(Box::new(first_link.clone()), fast_config());
    assert!(slot.is_connected());

    let second_link = MockLink::default();
    let second = slot.connect(Box::new(second_link.clone()), fast_config());
    assert!(slot.is_connected());

    // the first session is dead; nothing queued on it goes out anymore
    tokio::time::sleep(Duration::from_millis(20)).await;
    let before = first_link.sent_frames().len();
    first.send("G0 X99");
    second.send("G0 X1");
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(first_link.sent_frames().len(), before);
    assert!(second_link.sent_frames().contains(&b"G0 X1\n".to_vec()));
    assert_eq!(first.snapshot().status, MachineStatus::Disconnected);
    slot.disconnect();
}

#[tokio::test]
async fn disconnect_is_idempotent() {
    let slot = SessionSlot::new();
    let link = MockLink::default();
    let _handle = slot.connect(Box::new(link), fast_config());

    slot.disconnect();
    assert!(!slot.is_connected());
    slot.disconnect();
    assert!(!slot.is_connected());
    assert!(slot.handle().is_none());
}

#[tokio::test]
async fn stop_flushes_and_resets() {
    let slot = SessionSlot::new();
    let link = MockLink::default();
    let handle = slot.connect(Box::new(link.clone()), fast_config());

    // gate the stream shut so the queued program cannot drain
    link.incoming.lock().push_back("<Run|Bf:2,100>".to_string());
    tokio::time::sleep(Duration::from_millis(20)).await;
    handle.send("G1 X100 F10");
    handle.send("G1 X200");
    handle.stop();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(handle.queued_lines(), 0);
    let frames = link.sent_frames();
    assert!(frames.contains(&b"!\n".to_vec()));
    assert!(frames.contains(&vec![0x18]));
    assert!(!frames.contains(&b"G1 X100 F10\n".to_vec()));
    slot.disconnect();
}

#[tokio::test]
async fn pause_and_resume_control_the_stream() {
    let slot = SessionSlot::new();
    let link = MockLink::default();
    let handle = slot.connect(Box::new(link.clone()), fast_config());

    handle.pause();
    assert!(handle.is_paused());
    handle.send("G0 X5");
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(!link.sent_frames().contains(&b"G0 X5\n".to_vec()));
    assert!(link.sent_frames().contains(&b"!\n".to_vec()));

    handle.resume();
    assert!(!handle.is_paused());
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(link.sent_frames().contains(&b"~\n".to_vec()));
    assert!(link.sent_frames().contains(&b"G0 X5\n".to_vec()));
    slot.disconnect();
}

#[tokio::test]
async fn realtime_bytes_go_out_raw() {
    let slot = SessionSlot::new();
    let link = MockLink::default();
    let handle = slot.connect(Box::new(link.clone()), fast_config());

    handle.send_realtime(0x85);
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(link.sent_frames().contains(&vec![0x85]));
    slot.disconnect();
}
