//! Interpreted program model
//!
//! Holds the ordered `MotionRecord`s for one loaded program plus running
//! aggregates. Reload swaps the whole record set atomically so readers never
//! observe a half-interpreted program.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use cncsend_core::{Point3, Segment};

use crate::interpreter::{GcodeInterpreter, MotionRecord};
use crate::modal::MotionMode;

/// Running aggregates over a loaded program.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgramTotals {
    /// Interpreted lines, excluding the synthetic seed
    pub line_count: usize,
    /// Lines that command motion
    pub motion_count: usize,
    /// Total commanded path length, millimeters
    pub path_length_mm: f64,
    /// Estimated execution time including dwells, seconds
    pub estimated_seconds: f64,
    /// Extent of all motion, millimeters; None while no motion is loaded
    pub bounding_min: Option<Point3>,
    pub bounding_max: Option<Point3>,
}

impl ProgramTotals {
    fn add(&mut self, record: &MotionRecord) {
        self.line_count += 1;
        if record.is_motion {
            self.motion_count += 1;
        }
        self.path_length_mm += record.path_length;
        self.estimated_seconds += record.estimated_seconds() + record.pause_seconds;
        for segment in &record.segments {
            for point in segment {
                self.bounding_min = Some(match self.bounding_min {
                    Some(min) => min.min(point),
                    None => *point,
                });
                self.bounding_max = Some(match self.bounding_max {
                    Some(max) => max.max(point),
                    None => *point,
                });
            }
        }
    }
}

#[derive(Debug)]
struct Inner {
    source: String,
    records: Vec<MotionRecord>,
    totals: ProgramTotals,
}

impl Inner {
    fn empty() -> Self {
        Self {
            source: String::new(),
            records: vec![MotionRecord::origin()],
            totals: ProgramTotals::default(),
        }
    }
}

/// Shared, reloadable program model.
///
/// Index 0 is always the synthetic origin record so every real line has a
/// predecessor; callers that iterate program lines should start at 1.
#[derive(Debug)]
pub struct ProgramModel {
    interpreter: GcodeInterpreter,
    inner: RwLock<Inner>,
}

impl Default for ProgramModel {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgramModel {
    pub fn new() -> Self {
        Self {
            interpreter: GcodeInterpreter::new(),
            inner: RwLock::new(Inner::empty()),
        }
    }

    pub fn with_interpreter(interpreter: GcodeInterpreter) -> Self {
        Self {
            interpreter,
            inner: RwLock::new(Inner::empty()),
        }
    }

    /// Interpret `source` from scratch and swap it in.
    pub fn load(&self, source: &str) {
        let mut fresh = Inner::empty();
        fresh.source = source.to_string();
        for line in source.lines() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let record = self
                .interpreter
                .interpret(trimmed, fresh.records.last().unwrap_or(&MotionRecord::origin()));
            fresh.totals.add(&record);
            fresh.records.push(record);
        }
        *self.inner.write() = fresh;
    }

    /// Interpret one more line against the current tail and append it.
    pub fn append_line(&self, line: &str) -> MotionRecord {
        let mut inner = self.inner.write();
        let previous = inner.records.last().cloned().unwrap_or_else(MotionRecord::origin);
        let record = self.interpreter.interpret(line, &previous);
        inner.totals.add(&record);
        if !inner.source.is_empty() {
            inner.source.push('\n');
        }
        inner.source.push_str(line);
        inner.records.push(record.clone());
        record
    }

    /// Whether the loaded model no longer matches `source`.
    pub fn is_stale(&self, source: &str) -> bool {
        self.inner.read().source != source
    }

    pub fn totals(&self) -> ProgramTotals {
        self.inner.read().totals
    }

    /// Number of interpreted lines, excluding the seed.
    pub fn len(&self) -> usize {
        self.inner.read().records.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The record at `sequence_index` (0 is the synthetic seed).
    pub fn record(&self, sequence_index: usize) -> Option<MotionRecord> {
        self.inner.read().records.get(sequence_index).cloned()
    }

    /// Snapshot of all records, seed included.
    pub fn records(&self) -> Vec<MotionRecord> {
        self.inner.read().records.clone()
    }

    /// Raw program lines in send order, skipping the seed and blanks.
    pub fn lines(&self) -> Vec<String> {
        self.inner
            .read()
            .records
            .iter()
            .skip(1)
            .map(|r| r.raw_text.clone())
            .collect()
    }

    /// Flattened segments of every motion record in the given motion mode,
    /// for rendering rapids and feeds differently.
    pub fn segments_by_motion(&self, mode: MotionMode) -> Vec<Segment> {
        self.inner
            .read()
            .records
            .iter()
            .filter(|r| r.is_motion && r.modal.motion == mode)
            .flat_map(|r| r.segments.iter().copied())
            .collect()
    }

    /// Flattened segments of every motion record in `[from, to]`, clamped to
    /// the loaded range. Used for partial previews.
    pub fn segments_in_range(&self, from: usize, to: usize) -> Vec<Segment> {
        let inner = self.inner.read();
        let last = inner.records.len().saturating_sub(1);
        let to = to.min(last);
        if from > to {
            return Vec::new();
        }
        inner.records[from..=to]
            .iter()
            .filter(|r| r.is_motion)
            .flat_map(|r| r.segments.iter().copied())
            .collect()
    }
}
