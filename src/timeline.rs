//! timeline.rs
//!
//! Builds the tempo / time-signature timeline from a MIDI file's header
//! track.
//!
//! Timing inside a MIDI file is relative: each event carries a delta in
//! ticks, and the tick length depends on whatever tempo is in effect at that
//! point. This module walks the header track once, accumulating ticks and
//! seconds, and records every tempo and time-signature change stamped with
//! both. Track extraction (see `track.rs`) then replays performance tracks
//! against these lists instead of re-deriving tempo state per track.
//!
//! BPM follows standard MIDI semantics: the tempo meta event stores
//! microseconds per *quarter note*, and the reported BPM is scaled by the
//! effective signature's denominator (a 6/8 bar at 500_000 µs/qn is 240 BPM,
//! not 120).

use anyhow::Result;
use serde::Serialize;

use crate::message::{Message, MessageKind};

#[derive(thiserror::Error, Debug)]
pub enum TimelineError {
    #[error("malformed header: ticks per quarter note must be positive")]
    MalformedHeader,
}

/// A meter signature, e.g. 4/4 or 6/8. Serializes as `[numerator, denominator]`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimeSignature {
    pub numerator: u8,
    pub denominator: u8,
}

impl Default for TimeSignature {
    fn default() -> Self {
        Self {
            numerator: 4,
            denominator: 4,
        }
    }
}

impl Serialize for TimeSignature {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        (self.numerator, self.denominator).serialize(serializer)
    }
}

/// A tempo change, stamped with its absolute position in seconds and ticks.
#[derive(Clone, Copy, Debug, Serialize)]
pub struct TempoChange {
    pub time: f64,
    pub bpm: f64,
    pub tick: u64,
    /// The exact tempo backing `bpm`. Extraction replays from this value
    /// rather than inverting `bpm`, which would need the signature that was
    /// in effect when the entry was recorded. Not part of the JSON output.
    #[serde(skip)]
    pub us_per_qn: f64,
}

/// A time-signature change, stamped like [`TempoChange`].
#[derive(Clone, Copy, Debug, Serialize)]
pub struct TimeSignatureChange {
    pub time: f64,
    #[serde(rename = "beat")]
    pub signature: TimeSignature,
    pub tick: u64,
}

/// The header track's tempo and meter history, ordered by tick.
///
/// Both lists are non-empty after [`build_timeline`]: a default entry at
/// tick 0 is inserted when the header track supplies none, so extraction
/// cursors always have an entry to stand on.
#[derive(Clone, Debug, Serialize)]
pub struct Timeline {
    #[serde(rename = "tempo_data")]
    pub tempos: Vec<TempoChange>,
    #[serde(rename = "beat_data")]
    pub signatures: Vec<TimeSignatureChange>,
}

/// Seed values used before the first explicit tempo / time-signature event.
///
/// Passed explicitly rather than baked in as constants so the builder and
/// extractor stay pure and testable against other seeds.
#[derive(Clone, Copy, Debug)]
pub struct Defaults {
    /// Microseconds per quarter note (500_000 = 120 BPM)
    pub us_per_qn: u32,
    pub signature: TimeSignature,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            us_per_qn: 500_000,
            signature: TimeSignature::default(),
        }
    }
}

/// Output times are rounded to 5 decimal places at record construction;
/// running accumulators keep full precision.
pub(crate) fn round5(seconds: f64) -> f64 {
    (seconds * 100_000.0).round() / 100_000.0
}

pub(crate) fn ticks_to_seconds(ticks: u32, tpq: u16, us_per_qn: f64) -> f64 {
    ticks as f64 * (us_per_qn / 1_000_000.0) / tpq as f64
}

pub(crate) fn us_per_qn_to_bpm(us_per_qn: f64, signature: TimeSignature) -> f64 {
    60_000_000.0 / us_per_qn * signature.denominator as f64 / 4.0
}

/// Scan the header track and record every tempo and time-signature change.
///
/// Each delta is converted to seconds under the tempo in effect *before* the
/// event, so a tempo change takes hold only for events after it. Messages of
/// any other kind advance the clock and are otherwise ignored.
pub fn build_timeline(messages: &[Message], tpq: u16, defaults: Defaults) -> Result<Timeline> {
    if tpq == 0 {
        return Err(TimelineError::MalformedHeader.into());
    }

    let mut time = 0.0_f64;
    let mut tick = 0_u64;
    let mut us_per_qn = defaults.us_per_qn as f64;
    let mut signature = defaults.signature;
    let mut tempos = Vec::new();
    let mut signatures = Vec::new();

    for msg in messages {
        time += ticks_to_seconds(msg.delta, tpq, us_per_qn);
        tick += msg.delta as u64;

        match msg.kind {
            MessageKind::Tempo { us_per_qn: t } => {
                us_per_qn = t as f64;
                tempos.push(TempoChange {
                    time: round5(time),
                    bpm: us_per_qn_to_bpm(us_per_qn, signature),
                    tick,
                    us_per_qn,
                });
            }
            MessageKind::TimeSignature {
                numerator,
                denominator,
            } => {
                signature = TimeSignature {
                    numerator,
                    denominator,
                };
                signatures.push(TimeSignatureChange {
                    time: round5(time),
                    signature,
                    tick,
                });
            }
            _ => {}
        }
    }

    // Non-empty invariant: extraction cursors need an entry covering tick 0
    if tempos.is_empty() {
        tempos.push(TempoChange {
            time: 0.0,
            bpm: us_per_qn_to_bpm(defaults.us_per_qn as f64, defaults.signature),
            tick: 0,
            us_per_qn: defaults.us_per_qn as f64,
        });
    }
    if signatures.is_empty() {
        signatures.push(TimeSignatureChange {
            time: 0.0,
            signature: defaults.signature,
            tick: 0,
        });
    }

    Ok(Timeline { tempos, signatures })
}
