//! Standard MIDI File import and export
//!
//! Import merges every track into one time-ordered sequence and converts
//! ticks to wall time through the file's tempo map. Export writes a single
//! track at a fixed 120 BPM.

use midly::num::{u14, u15, u24, u28, u4, u7};
use midly::{Format, Header, MetaMessage, MidiMessage as SmfMessage, Smf, Timing, TrackEvent, TrackEventKind};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, trace};

use super::capture::TimedMessage;
use crate::gateway::{GatewayError, GatewayResult};
use crate::protocol::{format_hex, MidiMessage};

/// Microseconds per quarter note when a file sets no tempo (120 BPM)
pub const DEFAULT_TEMPO: u32 = 500_000;

/// Ticks per quarter note written on export
pub const EXPORT_PPQ: u16 = 480;

/// A time-ordered list of messages ready to play
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sequence {
    pub events: Vec<TimedMessage>,
    pub duration: Duration,
}

impl Sequence {
    pub fn new(events: Vec<TimedMessage>, duration: Duration) -> Self {
        Self { events, duration }
    }
}

/// Tick to wall-time conversion
enum Clock {
    /// Tempo changes as (tick, microseconds per quarter note), sorted
    Metrical { ppq: u64, tempo_map: Vec<(u64, u32)> },
    Timecode { micros_per_tick: f64 },
}

impl Clock {
    fn micros(&self, tick: u64) -> u64 {
        match self {
            Clock::Metrical { ppq, tempo_map } => {
                let mut micros = 0u64;
                let mut last_tick = 0u64;
                let mut tempo = DEFAULT_TEMPO as u64;
                for &(change_tick, change_tempo) in tempo_map {
                    if change_tick >= tick {
                        break;
                    }
                    micros += (change_tick - last_tick) * tempo / ppq;
                    last_tick = change_tick;
                    tempo = change_tempo as u64;
                }
                micros + (tick - last_tick) * tempo / ppq
            }
            Clock::Timecode { micros_per_tick } => (tick as f64 * micros_per_tick) as u64,
        }
    }
}

fn channel_bytes(channel: u4, message: SmfMessage) -> Vec<u8> {
    let ch = channel.as_int();
    match message {
        SmfMessage::NoteOff { key, vel } => vec![0x80 | ch, key.as_int(), vel.as_int()],
        SmfMessage::NoteOn { key, vel } => vec![0x90 | ch, key.as_int(), vel.as_int()],
        SmfMessage::Aftertouch { key, vel } => vec![0xA0 | ch, key.as_int(), vel.as_int()],
        SmfMessage::Controller { controller, value } => {
            vec![0xB0 | ch, controller.as_int(), value.as_int()]
        }
        SmfMessage::ProgramChange { program } => vec![0xC0 | ch, program.as_int()],
        SmfMessage::ChannelAftertouch { vel } => vec![0xD0 | ch, vel.as_int()],
        SmfMessage::PitchBend { bend } => {
            let value = bend.0.as_int();
            vec![0xE0 | ch, (value & 0x7F) as u8, (value >> 7) as u8]
        }
    }
}

/// Parse SMF bytes into a playable sequence
pub fn parse(data: &[u8]) -> GatewayResult<Sequence> {
    let smf = Smf::parse(data)
        .map_err(|e| GatewayError::Backend(format!("invalid MIDI file: {}", e)))?;

    let mut tempo_map = Vec::new();
    let mut raw = Vec::new();
    let mut end_tick = 0u64;

    for track in &smf.tracks {
        let mut tick = 0u64;
        for event in track.iter() {
            tick += event.delta.as_int() as u64;
            match event.kind {
                TrackEventKind::Midi { channel, message } => {
                    raw.push((tick, channel_bytes(channel, message)));
                }
                TrackEventKind::SysEx(body) => {
                    let mut bytes = Vec::with_capacity(body.len() + 1);
                    bytes.push(0xF0);
                    bytes.extend_from_slice(body);
                    raw.push((tick, bytes));
                }
                TrackEventKind::Meta(MetaMessage::Tempo(tempo)) => {
                    tempo_map.push((tick, tempo.as_int()));
                }
                _ => {}
            }
        }
        end_tick = end_tick.max(tick);
    }

    let clock = match smf.header.timing {
        Timing::Metrical(ppq) => {
            tempo_map.sort_by_key(|&(tick, _)| tick);
            Clock::Metrical {
                ppq: ppq.as_int().max(1) as u64,
                tempo_map,
            }
        }
        Timing::Timecode(fps, subframes) => Clock::Timecode {
            micros_per_tick: 1_000_000.0 / (fps.as_f32() as f64 * subframes.max(1) as f64),
        },
    };

    // Stable sort keeps track order for simultaneous events
    raw.sort_by_key(|&(tick, _)| tick);

    let mut events = Vec::with_capacity(raw.len());
    for (tick, bytes) in raw {
        match MidiMessage::try_from(bytes.as_slice()) {
            Ok(message) => events.push(TimedMessage::new(
                Duration::from_micros(clock.micros(tick)),
                message,
            )),
            Err(e) => trace!("Skipping SMF event {}: {}", format_hex(&bytes), e),
        }
    }

    let duration = Duration::from_micros(clock.micros(end_tick));
    debug!(
        "Parsed MIDI file: {} tracks, {} events, {:?}",
        smf.tracks.len(),
        events.len(),
        duration
    );
    Ok(Sequence::new(events, duration))
}

/// Load and parse a file
pub async fn import(path: &Path) -> GatewayResult<Sequence> {
    let data = tokio::fs::read(path).await?;
    parse(&data)
}

fn to_ticks(offset: Duration) -> u64 {
    offset.as_micros() as u64 * EXPORT_PPQ as u64 / DEFAULT_TEMPO as u64
}

fn delta(from: u64, to: u64) -> u28 {
    (to.saturating_sub(from).min(0x0FFF_FFFF) as u32).into()
}

fn track_event_kind(bytes: &[u8]) -> Option<TrackEventKind<'_>> {
    let (&status, data) = bytes.split_first()?;
    // Only system exclusive is storable; common and real-time are not
    if status == 0xF0 {
        return Some(TrackEventKind::SysEx(data));
    }
    let d = |i: usize| -> u7 { data.get(i).copied().unwrap_or(0).into() };
    let channel: u4 = (status & 0x0F).into();
    let message = match status & 0xF0 {
        0x80 => SmfMessage::NoteOff { key: d(0), vel: d(1) },
        0x90 => SmfMessage::NoteOn { key: d(0), vel: d(1) },
        0xA0 => SmfMessage::Aftertouch { key: d(0), vel: d(1) },
        0xB0 => SmfMessage::Controller {
            controller: d(0),
            value: d(1),
        },
        0xC0 => SmfMessage::ProgramChange { program: d(0) },
        0xD0 => SmfMessage::ChannelAftertouch { vel: d(0) },
        0xE0 => {
            let lsb = d(0).as_int() as u16;
            let msb = d(1).as_int() as u16;
            SmfMessage::PitchBend {
                bend: midly::PitchBend(u14::from((msb << 7) | lsb)),
            }
        }
        _ => return None,
    };
    Some(TrackEventKind::Midi { channel, message })
}

/// Encode a sequence as a single-track SMF
pub fn render(sequence: &Sequence) -> GatewayResult<Vec<u8>> {
    let encoded: Vec<(u64, Vec<u8>)> = sequence
        .events
        .iter()
        .map(|event| (to_ticks(event.offset), event.message.encode()))
        .collect();

    let mut track = Vec::with_capacity(encoded.len() + 2);
    track.push(TrackEvent {
        delta: u28::from(0u32),
        kind: TrackEventKind::Meta(MetaMessage::Tempo(u24::from(DEFAULT_TEMPO))),
    });

    let mut last_tick = 0u64;
    for (tick, bytes) in &encoded {
        if let Some(kind) = track_event_kind(bytes) {
            track.push(TrackEvent {
                delta: delta(last_tick, *tick),
                kind,
            });
            last_tick = *tick;
        }
    }

    let end_tick = to_ticks(sequence.duration).max(last_tick);
    track.push(TrackEvent {
        delta: delta(last_tick, end_tick),
        kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
    });

    let mut smf = Smf::new(Header::new(
        Format::SingleTrack,
        Timing::Metrical(u15::from(EXPORT_PPQ)),
    ));
    smf.tracks.push(track);

    let mut out = Vec::new();
    smf.write_std(&mut out)?;
    Ok(out)
}

/// Write a sequence to `path`
pub async fn export(sequence: &Sequence, path: &Path) -> GatewayResult<()> {
    let data = render(sequence)?;
    tokio::fs::write(path, data).await?;
    debug!("Wrote {} events to {}", sequence.events.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::MidiChannel;

    fn note_on(n: u8) -> MidiMessage {
        MidiMessage::note_on(MidiChannel::Channel1, n, 100).unwrap()
    }

    fn build(timing: Timing, events: Vec<TrackEvent<'static>>) -> Vec<u8> {
        let mut smf = Smf::new(Header::new(Format::SingleTrack, timing));
        smf.tracks.push(events);
        let mut out = Vec::new();
        smf.write_std(&mut out).unwrap();
        out
    }

    fn ev(delta: u32, kind: TrackEventKind<'static>) -> TrackEvent<'static> {
        TrackEvent {
            delta: delta.into(),
            kind,
        }
    }

    fn midi_note(key: u8) -> TrackEventKind<'static> {
        TrackEventKind::Midi {
            channel: u4::from(0u8),
            message: SmfMessage::NoteOn {
                key: u7::from(key),
                vel: u7::from(100u8),
            },
        }
    }

    #[test]
    fn test_default_tempo() {
        let data = build(
            Timing::Metrical(u15::from(96u16)),
            vec![
                ev(96, midi_note(60)),
                ev(0, TrackEventKind::Meta(MetaMessage::EndOfTrack)),
            ],
        );
        let sequence = parse(&data).unwrap();
        assert_eq!(
            sequence.events,
            vec![TimedMessage::new(Duration::from_millis(500), note_on(60))]
        );
        assert_eq!(sequence.duration, Duration::from_millis(500));
    }

    #[test]
    fn test_tempo_changes_apply_from_their_tick() {
        let data = build(
            Timing::Metrical(u15::from(96u16)),
            vec![
                ev(96, midi_note(60)),
                // Double speed from beat 1 on
                ev(0, TrackEventKind::Meta(MetaMessage::Tempo(u24::from(250_000u32)))),
                ev(96, midi_note(62)),
                ev(192, TrackEventKind::Meta(MetaMessage::EndOfTrack)),
            ],
        );
        let sequence = parse(&data).unwrap();
        let offsets: Vec<_> = sequence.events.iter().map(|e| e.offset).collect();
        assert_eq!(
            offsets,
            vec![Duration::from_millis(500), Duration::from_millis(750)]
        );
        assert_eq!(sequence.duration, Duration::from_millis(1_250));
    }

    #[test]
    fn test_tracks_are_merged_in_time_order() {
        let mut smf = Smf::new(Header::new(Format::Parallel, Timing::Metrical(u15::from(96u16))));
        smf.tracks.push(vec![
            ev(0, TrackEventKind::Meta(MetaMessage::Tempo(u24::from(1_000_000u32)))),
            ev(192, midi_note(70)),
            ev(0, TrackEventKind::Meta(MetaMessage::EndOfTrack)),
        ]);
        smf.tracks.push(vec![
            ev(96, midi_note(50)),
            ev(0, TrackEventKind::Meta(MetaMessage::EndOfTrack)),
        ]);
        let mut data = Vec::new();
        smf.write_std(&mut data).unwrap();

        let sequence = parse(&data).unwrap();
        assert_eq!(
            sequence.events,
            vec![
                TimedMessage::new(Duration::from_secs(1), note_on(50)),
                TimedMessage::new(Duration::from_secs(2), note_on(70)),
            ]
        );
    }

    #[test]
    fn test_render_then_parse_keeps_messages() {
        let sysex = MidiMessage::try_from(&[0xF0u8, 0x7E, 0x01, 0x02, 0xF7][..]).unwrap();
        let sequence = Sequence::new(
            vec![
                TimedMessage::new(Duration::from_millis(0), note_on(60)),
                TimedMessage::new(
                    Duration::from_millis(250),
                    MidiMessage::control_change(MidiChannel::Channel3, 7, 99).unwrap(),
                ),
                TimedMessage::new(Duration::from_millis(500), sysex),
                TimedMessage::new(
                    Duration::from_millis(1_000),
                    MidiMessage::note_off(MidiChannel::Channel1, 60, 0).unwrap(),
                ),
            ],
            Duration::from_millis(1_500),
        );

        let parsed = parse(&render(&sequence).unwrap()).unwrap();
        assert_eq!(parsed, sequence);
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(matches!(
            parse(b"not a midi file"),
            Err(GatewayError::Backend(_))
        ));
    }
}
