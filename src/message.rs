//! message.rs
//!
//! The boundary between the `midly` decoder and the conversion engine.
//!
//! `midly` hands us borrowed, typed events (`u4`/`u7`/`u24` wrappers, byte
//! slices for text). The engine wants a plain owned sequence it can replay:
//! a type tag, a delta time in ticks, and the handful of payload fields it
//! actually uses. This module flattens one midly track into that shape.
//!
//! Two details matter here:
//!  - Every event keeps its delta, even the kinds the engine ignores. Deltas
//!    accumulate into absolute time, so dropping an ignored event would shift
//!    everything after it.
//!  - A note-on with velocity 0 stays a note-on. Players normalize those to
//!    note-off; this tool reports what the file says.

use midly::{MetaMessage, MidiMessage, TrackEvent, TrackEventKind};

/// One decoded MIDI message with its delta time in ticks.
#[derive(Clone, Debug, PartialEq)]
pub struct Message {
    pub delta: u32,
    pub kind: MessageKind,
}

/// The subset of message payloads the conversion engine consumes.
#[derive(Clone, Debug, PartialEq)]
pub enum MessageKind {
    NoteOn { key: u8, velocity: u8 },
    NoteOff { key: u8 },
    ControlChange { controller: u8, value: u8 },
    /// Bend amount centered on zero: -8192..=8191
    PitchBend { value: i16 },
    /// Tempo in microseconds per quarter note
    Tempo { us_per_qn: u32 },
    TimeSignature { numerator: u8, denominator: u8 },
    Lyric(String),
    TrackName(String),
    /// Anything else. Carried only for its delta.
    Other,
}

/// Flatten a midly track into the engine's message sequence.
pub fn decode_track(events: &[TrackEvent<'_>]) -> Vec<Message> {
    events
        .iter()
        .map(|ev| Message {
            delta: ev.delta.as_int(),
            kind: decode_kind(&ev.kind),
        })
        .collect()
}

fn decode_kind(kind: &TrackEventKind<'_>) -> MessageKind {
    match kind {
        TrackEventKind::Midi { message, .. } => match *message {
            MidiMessage::NoteOn { key, vel } => MessageKind::NoteOn {
                key: key.as_int(),
                velocity: vel.as_int(),
            },
            MidiMessage::NoteOff { key, .. } => MessageKind::NoteOff { key: key.as_int() },
            MidiMessage::Controller { controller, value } => MessageKind::ControlChange {
                controller: controller.as_int(),
                value: value.as_int(),
            },
            // midly's raw bend is 0..16383 with center 8192
            MidiMessage::PitchBend { bend } => MessageKind::PitchBend {
                value: bend.0.as_int() as i16 - 8192,
            },
            _ => MessageKind::Other,
        },
        TrackEventKind::Meta(meta) => match meta {
            MetaMessage::Tempo(t) => MessageKind::Tempo {
                us_per_qn: t.as_int(),
            },
            // SMF stores the denominator as a power of two; 1/128 is the
            // largest value that fits a u8, anything past that is garbage
            MetaMessage::TimeSignature(num, den_pow2, _, _) => MessageKind::TimeSignature {
                numerator: *num,
                denominator: 1u8 << (*den_pow2).min(7),
            },
            MetaMessage::Lyric(text) => {
                MessageKind::Lyric(String::from_utf8_lossy(text).into_owned())
            }
            MetaMessage::TrackName(name) => {
                MessageKind::TrackName(String::from_utf8_lossy(name).into_owned())
            }
            _ => MessageKind::Other,
        },
        _ => MessageKind::Other,
    }
}

/// First non-empty track name in the sequence, if any.
pub fn track_name(messages: &[Message]) -> Option<&str> {
    messages.iter().find_map(|m| match &m.kind {
        MessageKind::TrackName(name) if !name.is_empty() => Some(name.as_str()),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use midly::num::{u4, u7, u14, u24};

    fn midi(delta: u32, message: MidiMessage) -> TrackEvent<'static> {
        TrackEvent {
            delta: delta.into(),
            kind: TrackEventKind::Midi {
                channel: u4::from(0),
                message,
            },
        }
    }

    fn meta(delta: u32, meta: MetaMessage<'static>) -> TrackEvent<'static> {
        TrackEvent {
            delta: delta.into(),
            kind: TrackEventKind::Meta(meta),
        }
    }

    #[test]
    fn decodes_meta_payloads() {
        let events = vec![
            meta(0, MetaMessage::Tempo(u24::from(250_000))),
            meta(0, MetaMessage::TimeSignature(6, 3, 24, 8)),
            meta(0, MetaMessage::Lyric(b"la")),
        ];
        let msgs = decode_track(&events);
        assert_eq!(msgs[0].kind, MessageKind::Tempo { us_per_qn: 250_000 });
        assert_eq!(
            msgs[1].kind,
            MessageKind::TimeSignature {
                numerator: 6,
                denominator: 8
            }
        );
        assert_eq!(msgs[2].kind, MessageKind::Lyric("la".into()));
    }

    #[test]
    fn velocity_zero_note_on_is_not_rewritten() {
        let events = vec![midi(
            0,
            MidiMessage::NoteOn {
                key: u7::from(60),
                vel: u7::from(0),
            },
        )];
        let msgs = decode_track(&events);
        assert_eq!(
            msgs[0].kind,
            MessageKind::NoteOn {
                key: 60,
                velocity: 0
            }
        );
    }

    #[test]
    fn pitch_bend_is_centered() {
        let events = vec![
            midi(0, MidiMessage::PitchBend { bend: midly::PitchBend(u14::from(8192)) }),
            midi(0, MidiMessage::PitchBend { bend: midly::PitchBend(u14::from(0)) }),
            midi(0, MidiMessage::PitchBend { bend: midly::PitchBend(u14::from(16383)) }),
        ];
        let msgs = decode_track(&events);
        assert_eq!(msgs[0].kind, MessageKind::PitchBend { value: 0 });
        assert_eq!(msgs[1].kind, MessageKind::PitchBend { value: -8192 });
        assert_eq!(msgs[2].kind, MessageKind::PitchBend { value: 8191 });
    }

    #[test]
    fn ignored_events_keep_their_delta() {
        let events = vec![meta(17, MetaMessage::EndOfTrack)];
        let msgs = decode_track(&events);
        assert_eq!(msgs[0].delta, 17);
        assert_eq!(msgs[0].kind, MessageKind::Other);
    }

    #[test]
    fn track_name_skips_empty_names() {
        let events = vec![
            meta(0, MetaMessage::TrackName(b"")),
            meta(0, MetaMessage::TrackName(b"Lead")),
        ];
        let msgs = decode_track(&events);
        assert_eq!(track_name(&msgs), Some("Lead"));
        assert_eq!(track_name(&msgs[..1]), None);
    }
}
