//! track.rs
//!
//! Extracts structured events from one performance track.
//!
//! Each run replays the track from tick 0 with its own clock, converting
//! deltas to seconds under the tempo currently in effect. Tempo and meter
//! state come from the header [`Timeline`]: two cursors advance over its
//! lists whenever the running time reaches the next recorded change, so long
//! tracks never re-scan the lists.
//!
//! Three pieces of pairing state ride along:
//!  - open notes, a per-pitch stack so a note-off closes the most recent
//!    note-on of that pitch (LIFO when the same pitch overlaps itself);
//!  - a FIFO of lyric texts not yet attached to a note;
//!  - the simultaneity group, the note-ons sharing the current instant.
//!    When time next advances, queued lyrics drain onto the group in arrival
//!    order, one per note, and the group resets.

use std::collections::{BTreeMap, HashMap, VecDeque};

use anyhow::Result;
use serde::Serialize;

use crate::message::{Message, MessageKind};
use crate::timeline::{
    Defaults, TempoChange, TimeSignature, TimeSignatureChange, Timeline, TimelineError, round5,
    ticks_to_seconds,
};

#[derive(thiserror::Error, Debug)]
pub enum TrackError {
    #[error("malformed track: {0}")]
    MalformedTrack(&'static str),
}

/// One note, from note-on to its matching note-off.
#[derive(Clone, Debug, Serialize)]
pub struct NoteEvent {
    /// Start time in seconds
    pub time: f64,
    /// Seconds from note-on to note-off; stays 0 when the note is never closed
    #[serde(rename = "note_length")]
    pub length: f64,
    /// Conventional name + octave, e.g. "C3" for key 60
    #[serde(rename = "note")]
    pub pitch: String,
    pub velocity: u8,
    /// Lyric text aligned to this note, empty when none was
    #[serde(rename = "text")]
    pub lyric: String,
    /// Fractional 1-indexed position within the measure
    pub beat_position: f64,
}

/// One controller or pitch-bend reading.
#[derive(Clone, Copy, Debug, Serialize)]
pub struct Sample {
    pub time: f64,
    pub value: i32,
}

/// Everything extracted from one track.
#[derive(Clone, Debug, Default, Serialize)]
pub struct TrackOutput {
    /// Notes in note-on order
    #[serde(rename = "note_data")]
    pub notes: Vec<NoteEvent>,
    /// Controller curves keyed by controller number
    #[serde(rename = "CC_data")]
    pub control_changes: BTreeMap<u8, Vec<Sample>>,
    #[serde(rename = "pitch_bend_data")]
    pub pitch_bends: Vec<Sample>,
}

/// Mutable walk state for one extraction run. Owned per run, so tracks can
/// be processed in parallel against a shared immutable timeline.
struct TrackState {
    time: f64,
    tick: u64,
    us_per_qn: f64,
    tempo_idx: usize,
    sig_idx: usize,
    pending_lyrics: VecDeque<String>,
    simultaneous: Vec<usize>,
    open_notes: HashMap<u8, Vec<usize>>,
}

const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Name + octave for a MIDI key number, middle C (60) being "C3".
fn note_name(key: u8) -> String {
    format!("{}{}", NOTE_NAMES[(key % 12) as usize], key as i32 / 12 - 2)
}

/// Fractional 1-indexed position of `tick` within its measure.
///
/// The reference point is the tick of the active time-signature entry, not a
/// barline, so a mid-measure signature change shifts the phase and positions
/// do not necessarily reset at barlines. Euclidean modulo keeps the result
/// non-negative when the reference tick lies ahead of the current tick
/// (possible when the first signature change sits later in the track).
fn beat_position(tick: u64, sig_tick: u64, tpq: u16, signature: TimeSignature) -> f64 {
    let beats =
        (tick as f64 - sig_tick as f64) / tpq as f64 * (signature.denominator as f64 / 4.0);
    beats.rem_euclid(signature.numerator as f64) + 1.0
}

/// Replay one performance track against the header timeline.
///
/// Orphan note-offs and lyrics still queued at end of track are dropped
/// silently; both are ordinary in real files.
pub fn extract_track(
    messages: &[Message],
    tpq: u16,
    timeline: &Timeline,
    defaults: Defaults,
) -> Result<TrackOutput> {
    if tpq == 0 {
        return Err(TimelineError::MalformedHeader.into());
    }
    let (tempos, sigs) = (&timeline.tempos, &timeline.signatures);
    // The cursors below stop at the last entry of each list, so an empty
    // list is the one way a cursor can run past its end.
    if tempos.is_empty() || sigs.is_empty() {
        return Err(TrackError::MalformedTrack(
            "timeline supplies no tempo or time-signature entry",
        )
        .into());
    }

    // Seed from whatever is in effect at tick 0: the list's first entry when
    // it sits there, the defaults otherwise.
    let seed_tempo = if tempos[0].tick == 0 {
        tempos[0].us_per_qn
    } else {
        defaults.us_per_qn as f64
    };

    let mut state = TrackState {
        time: 0.0,
        tick: 0,
        us_per_qn: seed_tempo,
        tempo_idx: 0,
        sig_idx: 0,
        pending_lyrics: VecDeque::new(),
        simultaneous: Vec::new(),
        open_notes: HashMap::new(),
    };
    let mut out = TrackOutput::default();

    for msg in messages {
        step(msg, tpq, tempos, sigs, &mut state, &mut out);
    }

    Ok(out)
}

fn step(
    msg: &Message,
    tpq: u16,
    tempos: &[TempoChange],
    sigs: &[TimeSignatureChange],
    state: &mut TrackState,
    out: &mut TrackOutput,
) {
    // The delta converts under the tempo in effect before this message
    state.time += ticks_to_seconds(msg.delta, tpq, state.us_per_qn);
    state.tick += msg.delta as u64;

    // Advance the cursors up to the running time. Retempo takes the entry's
    // recorded tempo directly; recovering it from bpm would need the
    // signature the entry was recorded under, which this cursor may trail.
    while state.tempo_idx + 1 < tempos.len() && state.time >= tempos[state.tempo_idx + 1].time {
        state.tempo_idx += 1;
        state.us_per_qn = tempos[state.tempo_idx].us_per_qn;
    }
    while state.sig_idx + 1 < sigs.len() && state.time >= sigs[state.sig_idx + 1].time {
        state.sig_idx += 1;
    }

    // Time moved on: the previous instant's notes take their lyrics, oldest
    // lyric to oldest note, and the group resets whether or not every note
    // got one.
    if msg.delta != 0 && !state.simultaneous.is_empty() {
        for &idx in &state.simultaneous {
            match state.pending_lyrics.pop_front() {
                Some(text) => out.notes[idx].lyric = text,
                None => break,
            }
        }
        state.simultaneous.clear();
    }

    match &msg.kind {
        MessageKind::NoteOn { key, velocity } => {
            let sig = &sigs[state.sig_idx];
            let idx = out.notes.len();
            out.notes.push(NoteEvent {
                time: round5(state.time),
                length: 0.0,
                pitch: note_name(*key),
                velocity: *velocity,
                lyric: String::new(),
                beat_position: beat_position(state.tick, sig.tick, tpq, sig.signature),
            });
            state.simultaneous.push(idx);
            state.open_notes.entry(*key).or_default().push(idx);
        }
        MessageKind::NoteOff { key } => {
            // Most recent open note of this pitch closes first; an orphan
            // note-off is a no-op. A closure that rounds to length 0 leaves
            // the note on the stack: a zero-length note still counts as open
            // and a later note-off of the same pitch re-closes it.
            if let Some(stack) = state.open_notes.get_mut(key) {
                if let Some(&idx) = stack.last() {
                    let note = &mut out.notes[idx];
                    note.length = round5(state.time - note.time);
                    if note.length != 0.0 {
                        stack.pop();
                    }
                }
            }
        }
        MessageKind::Lyric(text) => state.pending_lyrics.push_back(text.clone()),
        MessageKind::ControlChange { controller, value } => {
            out.control_changes.entry(*controller).or_default().push(Sample {
                time: round5(state.time),
                value: *value as i32,
            });
        }
        MessageKind::PitchBend { value } => {
            out.pitch_bends.push(Sample {
                time: round5(state.time),
                value: *value as i32,
            });
        }
        _ => {}
    }
}
