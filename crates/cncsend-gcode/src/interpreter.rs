//! Line-by-line G-code interpretation
//!
//! `GcodeInterpreter::interpret` turns one raw program line plus the
//! previous line's record into a new `MotionRecord`: it resolves modal
//! inheritance, converts coordinates to canonical millimeters, and expands
//! arcs into segments via the discretizer.
//!
//! Leniency policy: a recognized word carrying an unparseable number falls
//! back to inheritance and is logged as a warning. A single bad token never
//! aborts a program load.

use cncsend_core::{Point3, Segment, Units};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

use crate::arc::{ArcDirection, ArcDiscretizer, ArcTessellation};
use crate::modal::{resolve, DistanceMode, ModalState, MotionMode, Plane};

/// Feed rate assumed for rapid moves when estimating duration (units/min).
pub const RAPID_FEED_ESTIMATE: f64 = 500.0;

/// The program line every load is seeded with, so the first real line has a
/// well-defined predecessor.
pub const SEED_LINE: &str = "G0 G90 G17 G21 X0 Y0 Z0 F500";

fn comment_rex() -> &'static Regex {
    static REX: OnceLock<Regex> = OnceLock::new();
    REX.get_or_init(|| Regex::new(r"\([^()]*\)").expect("invalid regex pattern"))
}

fn distance_rex() -> &'static Regex {
    static REX: OnceLock<Regex> = OnceLock::new();
    REX.get_or_init(|| Regex::new(r"G *(9[01])(?:\D|$)").expect("invalid regex pattern"))
}

fn plane_rex() -> &'static Regex {
    static REX: OnceLock<Regex> = OnceLock::new();
    REX.get_or_init(|| Regex::new(r"G *(1[7-9])(?:\D|$)").expect("invalid regex pattern"))
}

fn units_rex() -> &'static Regex {
    static REX: OnceLock<Regex> = OnceLock::new();
    REX.get_or_init(|| Regex::new(r"G *(2[01])(?:\D|$)").expect("invalid regex pattern"))
}

fn motion_rex() -> &'static Regex {
    static REX: OnceLock<Regex> = OnceLock::new();
    REX.get_or_init(|| Regex::new(r"G *(0?[0-3])(?:\D|$)").expect("invalid regex pattern"))
}

fn word_rex() -> &'static Regex {
    static REX: OnceLock<Regex> = OnceLock::new();
    REX.get_or_init(|| {
        Regex::new(r"([XYZIJKF]) *([+-]?[0-9]*\.?[0-9]*)").expect("invalid regex pattern")
    })
}

fn dwell_rex() -> &'static Regex {
    static REX: OnceLock<Regex> = OnceLock::new();
    REX.get_or_init(|| Regex::new(r"G0*4 *P *([+]?[0-9]*\.?[0-9]*)").expect("invalid regex pattern"))
}

/// One interpreted program line.
///
/// Immutable once created; the owning `ProgramModel` rebuilds the whole
/// record set when the source text changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MotionRecord {
    /// Position of this line in the program (the synthetic seed is 0)
    pub sequence_index: usize,
    /// The line as it appeared in the program
    pub raw_text: String,
    /// Concatenated parenthesized comments, verbatim
    pub comment: String,
    /// Modal state after this line (inheritance already applied)
    pub modal: ModalState,
    /// Absolute target position, millimeters
    pub target: Point3,
    /// I/J/K offset from start to arc center, millimeters; only meaningful
    /// for arc motion and never inherited across lines
    pub arc_offset: Point3,
    /// Feed rate as programmed, in the line's units per minute
    pub feed_rate: f64,
    /// G4 dwell duration, seconds
    pub pause_seconds: f64,
    /// Whether this line commands motion
    pub is_motion: bool,
    /// Length of the commanded path, millimeters
    pub path_length: f64,
    /// Discretized path; empty for non-motion lines
    pub segments: Vec<Segment>,
}

impl MotionRecord {
    /// The synthetic record every program starts from: origin position,
    /// default modal state, the seed feed rate.
    pub fn origin() -> Self {
        Self {
            sequence_index: 0,
            raw_text: SEED_LINE.to_string(),
            comment: String::new(),
            modal: ModalState::default(),
            target: Point3::ZERO,
            arc_offset: Point3::ZERO,
            feed_rate: 500.0,
            pause_seconds: 0.0,
            is_motion: false,
            path_length: 0.0,
            segments: Vec::new(),
        }
    }

    /// Estimated execution time in seconds, excluding dwell.
    ///
    /// Rapids assume a fixed traverse feed; inch-mode feeds are converted
    /// before dividing. Zero or unset feed estimates as zero rather than
    /// dividing by it.
    pub fn estimated_seconds(&self) -> f64 {
        if self.path_length == 0.0 {
            return 0.0;
        }
        let feed = if self.modal.motion == MotionMode::Rapid {
            RAPID_FEED_ESTIMATE
        } else {
            self.feed_rate
        };
        let feed_mm_per_min = self.modal.units.to_mm(feed);
        if feed_mm_per_min <= 0.0 {
            return 0.0;
        }
        self.path_length / feed_mm_per_min * 60.0
    }
}

/// Streaming, stateful G-code interpreter.
#[derive(Debug, Clone, Default)]
pub struct GcodeInterpreter {
    discretizer: ArcDiscretizer,
}

impl GcodeInterpreter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tessellation(tessellation: ArcTessellation) -> Self {
        Self {
            discretizer: ArcDiscretizer::new(tessellation),
        }
    }

    /// Interpret one raw line against the previous line's record.
    pub fn interpret(&self, raw_line: &str, previous: &MotionRecord) -> MotionRecord {
        let sequence_index = previous.sequence_index + 1;

        let mut comment = String::new();
        for m in comment_rex().find_iter(raw_line) {
            comment.push_str(m.as_str());
        }
        let code = comment_rex().replace_all(raw_line, "").to_uppercase();

        let modal = ModalState {
            distance: resolve(
                modal_code(distance_rex(), &code).and_then(DistanceMode::from_code),
                previous.modal.distance,
            ),
            plane: resolve(
                modal_code(plane_rex(), &code).and_then(Plane::from_code),
                previous.modal.plane,
            ),
            units: resolve(
                modal_code(units_rex(), &code).and_then(Units::from_code),
                previous.modal.units,
            ),
            motion: resolve(
                modal_code(motion_rex(), &code).and_then(MotionMode::from_code),
                previous.modal.motion,
            ),
        };

        let words = scan_words(&code, sequence_index);

        let mut target = previous.target;
        let mut has_axis = false;
        for (axis, letter) in ['X', 'Y', 'Z'].into_iter().enumerate() {
            if let Some(value) = words.get(letter) {
                has_axis = true;
                let mm = modal.units.to_mm(value);
                let absolute = match modal.distance {
                    DistanceMode::Absolute => mm,
                    DistanceMode::Incremental => target.axis(axis) + mm,
                };
                target.set_axis(axis, absolute);
            }
        }

        let mut arc_offset = Point3::ZERO;
        let mut has_offset = false;
        for (axis, letter) in ['I', 'J', 'K'].into_iter().enumerate() {
            if let Some(value) = words.get(letter) {
                has_offset = true;
                arc_offset.set_axis(axis, modal.units.to_mm(value));
            }
        }

        let feed_rate = resolve(words.get('F'), previous.feed_rate);

        let pause_seconds = dwell_rex()
            .captures(&code)
            .and_then(|c| c.get(1))
            .and_then(|m| parse_token(m.as_str()))
            .unwrap_or(0.0);

        let is_motion = has_axis
            && (matches!(modal.motion, MotionMode::Rapid | MotionMode::Linear) || has_offset);

        let (path_length, segments) = if !is_motion {
            (0.0, Vec::new())
        } else if modal.motion.is_arc() {
            let direction = if modal.motion == MotionMode::ArcCw {
                ArcDirection::Clockwise
            } else {
                ArcDirection::CounterClockwise
            };
            self.discretizer
                .discretize(previous.target, target, arc_offset, direction, modal.plane)
        } else {
            (
                previous.target.distance_to(&target),
                vec![[previous.target, target]],
            )
        };

        MotionRecord {
            sequence_index,
            raw_text: raw_line.to_string(),
            comment,
            modal,
            target,
            arc_offset,
            feed_rate,
            pause_seconds,
            is_motion,
            path_length,
            segments,
        }
    }
}

/// Scanned number words of one line, keyed by letter.
struct Words {
    values: Vec<(char, f64)>,
}

impl Words {
    fn get(&self, letter: char) -> Option<f64> {
        self.values
            .iter()
            .find(|(l, _)| *l == letter)
            .map(|(_, v)| *v)
    }
}

/// Extract a modal group's code when the line mentions it exactly once.
fn modal_code(rex: &Regex, code: &str) -> Option<u8> {
    let mut matches = rex.captures_iter(code);
    let first = matches.next()?;
    if matches.next().is_some() {
        // Repeated group words on one line are ambiguous; inherit instead.
        return None;
    }
    first.get(1)?.as_str().parse::<u8>().ok()
}

/// Collect axis/offset/feed words from a line.
///
/// A letter mentioned more than once is dropped entirely (ambiguous), and a
/// present-but-unparseable value is dropped with a warning so the field
/// falls back to inheritance.
fn scan_words(code: &str, line_number: usize) -> Words {
    let mut seen: Vec<(char, Option<f64>)> = Vec::new();
    for caps in word_rex().captures_iter(code) {
        let letter = caps[1].chars().next().unwrap_or_default();
        let token = &caps[2];
        let value = parse_token(token);
        if value.is_none() {
            tracing::warn!(
                line = line_number,
                word = %letter,
                token,
                "malformed word value, inheriting previous"
            );
        }
        if let Some(entry) = seen.iter_mut().find(|(l, _)| *l == letter) {
            // Duplicate word: ambiguous, treat as absent.
            entry.1 = None;
        } else {
            seen.push((letter, value));
        }
    }
    Words {
        values: seen
            .into_iter()
            .filter_map(|(l, v)| v.map(|v| (l, v)))
            .collect(),
    }
}

/// Parse a numeric token, requiring it to look like a number (digits with
/// optional sign and decimal point) before handing it to the float parser.
fn parse_token(token: &str) -> Option<f64> {
    let digits: String = token.chars().filter(|c| !"+-.".contains(*c)).collect();
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    token.parse::<f64>().ok()
}
