// MIDI output from decoded timelines.
//
// Converts a `Timeline` into a Standard MIDI File for playback. Output is
// SMF Format 1: track 0 carries the tempo, track 1 carries the piano part.
// Event offsets and durations are in quarter-note beats and map to ticks at
// 480 ticks per quarter. Chords start and stop all their pitches together.
// Rests emit nothing; they only advance time.
//
// Uses the `midly` crate for MIDI writing.

use crate::decoder::{Event, Instrument, Timeline};
use crate::error::{GeneratorError, Result};
use midly::{
    Format, Header, MetaMessage, MidiMessage, Smf, Timing, Track, TrackEvent, TrackEventKind,
    num::{u4, u7, u15, u24, u28},
};
use std::path::Path;

/// Ticks per quarter note in MIDI output.
pub const TICKS_PER_QUARTER: u16 = 480;

const PIANO_CHANNEL: u8 = 0;

/// Convert a timeline to MIDI and write it to `path`, replacing any existing
/// file.
pub fn write_midi(timeline: &Timeline, path: &Path) -> Result<()> {
    let write_error = |reason: String| GeneratorError::OutputWriteError {
        path: path.to_path_buf(),
        reason,
    };
    let smf = timeline.to_smf();
    let mut buf = Vec::new();
    smf.write(&mut buf).map_err(|e| write_error(e.to_string()))?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| write_error(e.to_string()))?;
    }
    std::fs::write(path, &buf).map_err(|e| write_error(e.to_string()))?;
    log::info!(
        "wrote {} events ({:.1} beats) to {}",
        timeline.len(),
        timeline.total_duration(),
        path.display()
    );
    Ok(())
}

fn beats_to_ticks(beats: f64) -> u32 {
    (beats * f64::from(TICKS_PER_QUARTER)).round() as u32
}

/// Convert a timeline to an in-memory SMF.
pub fn timeline_to_smf(timeline: &Timeline) -> Smf<'static> {
    let mut smf = Smf::new(Header::new(
        Format::Parallel,
        Timing::Metrical(u15::new(TICKS_PER_QUARTER)),
    ));

    // Track 0: tempo
    let bpm = u32::from(timeline.tempo_bpm.max(1));
    let tempo_track: Track<'static> = vec![
        TrackEvent {
            delta: u28::new(0),
            kind: TrackEventKind::Meta(MetaMessage::Tempo(u24::new(60_000_000 / bpm))),
        },
        TrackEvent {
            delta: u28::new(0),
            kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
        },
    ];
    smf.tracks.push(tempo_track);

    // Track 1: piano. Timed messages are gathered first, then sorted so
    // that note-offs precede note-ons at the same tick.
    let channel = u4::new(PIANO_CHANNEL);
    let velocity = u7::new(timeline.velocity.min(127));
    let mut timed: Vec<(u32, bool, u8)> = Vec::new();
    for event in timeline.events() {
        let start = beats_to_ticks(event.offset());
        let end = beats_to_ticks(event.offset() + event.duration());
        for &pitch in event.pitches() {
            timed.push((start, true, pitch));
            timed.push((end, false, pitch));
        }
    }
    timed.sort_by_key(|&(tick, is_on, _)| (tick, is_on));

    let program = timeline
        .events()
        .iter()
        .find_map(|e| match e {
            Event::Note { instrument, .. } | Event::Chord { instrument, .. } => Some(*instrument),
            Event::Rest { .. } => None,
        })
        .unwrap_or(Instrument::Piano);

    let mut track: Track<'static> = vec![
        TrackEvent {
            delta: u28::new(0),
            kind: TrackEventKind::Meta(MetaMessage::TrackName(program.name().as_bytes())),
        },
        TrackEvent {
            delta: u28::new(0),
            kind: TrackEventKind::Midi {
                channel,
                message: MidiMessage::ProgramChange {
                    program: u7::new(program.program()),
                },
            },
        },
    ];

    let mut last_tick = 0u32;
    for (tick, is_on, pitch) in timed {
        let key = u7::new(pitch.min(127));
        let message = if is_on {
            MidiMessage::NoteOn { key, vel: velocity }
        } else {
            MidiMessage::NoteOff {
                key,
                vel: u7::new(0),
            }
        };
        track.push(TrackEvent {
            delta: u28::new(tick - last_tick),
            kind: TrackEventKind::Midi { channel, message },
        });
        last_tick = tick;
    }

    // Trailing rests still count towards the piece length.
    let end_tick = beats_to_ticks(timeline.total_duration()).max(last_tick);
    track.push(TrackEvent {
        delta: u28::new(end_tick - last_tick),
        kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
    });
    smf.tracks.push(track);

    smf
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note(offset: f64, pitch: u8, duration: f64) -> Event {
        Event::Note {
            offset,
            pitch,
            duration,
            instrument: Instrument::Piano,
        }
    }

    fn sample_timeline() -> Timeline {
        Timeline::new(vec![
            note(0.0, 60, 0.5),
            Event::Chord {
                offset: 0.5,
                pitches: vec![60, 64, 67],
                duration: 1.0,
                instrument: Instrument::Piano,
            },
            Event::Rest {
                offset: 1.5,
                duration: 0.25,
            },
            note(1.75, 62, 2.0),
        ])
    }

    fn note_ons(track: &Track<'_>) -> Vec<(u32, u8, u8)> {
        let mut tick = 0;
        let mut ons = Vec::new();
        for event in track {
            tick += event.delta.as_int();
            if let TrackEventKind::Midi {
                message: MidiMessage::NoteOn { key, vel },
                ..
            } = event.kind
            {
                ons.push((tick, key.as_int(), vel.as_int()));
            }
        }
        ons
    }

    #[test]
    fn smf_has_tempo_and_piano_tracks() {
        let smf = sample_timeline().to_smf();
        assert_eq!(smf.header.format, Format::Parallel);
        assert_eq!(smf.tracks.len(), 2);
        assert!(matches!(
            smf.tracks[0][0].kind,
            TrackEventKind::Meta(MetaMessage::Tempo(t)) if t.as_int() == 500_000
        ));
        assert!(smf.tracks[1].iter().any(|e| matches!(
            e.kind,
            TrackEventKind::Midi {
                message: MidiMessage::ProgramChange { program },
                ..
            } if program.as_int() == 0
        )));
    }

    #[test]
    fn notes_land_on_their_ticks() {
        let smf = sample_timeline().to_smf();
        let ons = note_ons(&smf.tracks[1]);
        assert_eq!(
            ons,
            vec![
                (0, 60, 90),
                (240, 60, 90),
                (240, 64, 90),
                (240, 67, 90),
                (840, 62, 90)
            ]
        );
    }

    #[test]
    fn track_ends_after_last_event() {
        let smf = sample_timeline().to_smf();
        let total: u32 = smf.tracks[1].iter().map(|e| e.delta.as_int()).sum();
        assert_eq!(total, beats_to_ticks(3.75));
        assert!(matches!(
            smf.tracks[1].last().map(|e| e.kind),
            Some(TrackEventKind::Meta(MetaMessage::EndOfTrack))
        ));
    }

    #[test]
    fn write_midi_creates_a_parseable_file() {
        let dir = std::env::temp_dir().join(format!("lofi-midi-test-{}", std::process::id()));
        let path = dir.join("out.mid");
        sample_timeline().write_midi(&path).unwrap();
        let bytes = std::fs::read(&path).unwrap();
        let parsed = Smf::parse(&bytes).unwrap();
        assert_eq!(parsed.tracks.len(), 2);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn unwritable_path_is_an_output_error() {
        let dir = std::env::temp_dir().join(format!("lofi-midi-dir-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        // A directory cannot be overwritten as a file.
        let result = sample_timeline().write_midi(&dir);
        assert!(matches!(result, Err(GeneratorError::OutputWriteError { .. })));
        let _ = std::fs::remove_dir_all(&dir);
    }
}
