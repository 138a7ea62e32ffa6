//! The three outbound command queues
//!
//! Ordering rules the engine relies on:
//! - Immediate commands jump everything and ignore flow control.
//! - Normal commands are the program stream, released only while the
//!   controller reports planner headroom.
//! - Hidden commands are status and query polls that must not clutter the
//!   console; consecutive duplicates are collapsed so a stalled engine does
//!   not pile up identical polls.

use parking_lot::Mutex;
use std::collections::VecDeque;

/// Shared set of outbound queues. All methods take `&self`; the engine, the
/// session API and callers on other threads push concurrently.
#[derive(Debug, Default)]
pub struct CommandQueueSet {
    immediate: Mutex<VecDeque<String>>,
    normal: Mutex<VecDeque<String>>,
    hidden: Mutex<VecDeque<String>>,
}

impl CommandQueueSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a command ahead of everything else.
    pub fn push_immediate(&self, command: impl Into<String>) {
        self.immediate.lock().push_back(command.into());
    }

    /// Queue a flow-controlled program command.
    ///
    /// A settings write (`$n=value`) silently queues a `$$` settings dump
    /// behind it so the local settings mirror picks up the new value. Jog
    /// commands also contain `=` but are exempt.
    pub fn push_normal(&self, command: impl Into<String>) {
        let command = command.into();
        let wants_echo = command.contains('=') && !command.trim_start().starts_with("$J");
        self.normal.lock().push_back(command);
        if wants_echo {
            self.push_hidden("$$");
        }
    }

    /// Queue a poll, unless it duplicates the newest queued poll.
    pub fn push_hidden(&self, command: impl Into<String>) {
        let command = command.into();
        let mut hidden = self.hidden.lock();
        if hidden.back().map(|c| c.as_str()) != Some(command.as_str()) {
            hidden.push_back(command);
        }
    }

    pub fn pop_immediate(&self) -> Option<String> {
        self.immediate.lock().pop_front()
    }

    pub fn pop_normal(&self) -> Option<String> {
        self.normal.lock().pop_front()
    }

    pub fn pop_hidden(&self) -> Option<String> {
        self.hidden.lock().pop_front()
    }

    pub fn normal_len(&self) -> usize {
        self.normal.lock().len()
    }

    pub fn has_immediate(&self) -> bool {
        !self.immediate.lock().is_empty()
    }

    pub fn is_idle(&self) -> bool {
        self.immediate.lock().is_empty()
            && self.normal.lock().is_empty()
            && self.hidden.lock().is_empty()
    }

    /// Drop the queued program stream. Immediate and hidden queues are kept
    /// so a stop command and its follow-up polls still go out.
    pub fn clear_normal(&self) -> usize {
        let mut normal = self.normal.lock();
        let dropped = normal.len();
        normal.clear();
        dropped
    }

    /// Drop everything.
    pub fn clear_all(&self) {
        self.immediate.lock().clear();
        self.normal.lock().clear();
        self.hidden.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hidden_deduplicates_consecutive_polls() {
        let q = CommandQueueSet::new();
        q.push_hidden("?");
        q.push_hidden("?");
        q.push_hidden("$G");
        q.push_hidden("?");
        assert_eq!(q.pop_hidden().as_deref(), Some("?"));
        assert_eq!(q.pop_hidden().as_deref(), Some("$G"));
        assert_eq!(q.pop_hidden().as_deref(), Some("?"));
        assert_eq!(q.pop_hidden(), None);
    }

    #[test]
    fn settings_write_queues_a_settings_dump() {
        let q = CommandQueueSet::new();
        q.push_normal("$110=1000");
        assert_eq!(q.pop_normal().as_deref(), Some("$110=1000"));
        assert_eq!(q.pop_hidden().as_deref(), Some("$$"));
    }

    #[test]
    fn jog_commands_do_not_trigger_settings_dump() {
        let q = CommandQueueSet::new();
        q.push_normal("$J=G91 X10 F500");
        assert_eq!(q.pop_normal().as_deref(), Some("$J=G91 X10 F500"));
        assert_eq!(q.pop_hidden(), None);
    }

    #[test]
    fn clear_normal_keeps_other_queues() {
        let q = CommandQueueSet::new();
        q.push_immediate("!");
        q.push_normal("G0 X1");
        q.push_normal("G0 X2");
        q.push_hidden("?");
        assert_eq!(q.clear_normal(), 2);
        assert!(q.has_immediate());
        assert_eq!(q.pop_hidden().as_deref(), Some("?"));
        assert_eq!(q.pop_normal(), None);
    }

    #[test]
    fn fifo_order_within_a_queue() {
        let q = CommandQueueSet::new();
        q.push_normal("G0 X1");
        q.push_normal("G0 X2");
        assert_eq!(q.pop_normal().as_deref(), Some("G0 X1"));
        assert_eq!(q.pop_normal().as_deref(), Some("G0 X2"));
    }
}
