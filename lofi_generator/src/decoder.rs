// Symbol sequence -> timed musical events.
//
// Each symbol becomes one event, placed at the running offset (in quarter-
// note beats). The duration is drawn from a fixed weighted table for every
// symbol, then rests are forced to a sixteenth. The next event starts where
// the previous one ends, so offsets never decrease and there are no gaps.
//
// Symbol forms:
//   "60.64.67", "4.9", "11"  chord: tokens 0-11 are pitch classes at
//                            octave 4 (MIDI 60 + n), 12-127 are MIDI numbers
//   "R", "r"                 rest
//   "C4", "E-5", "F#", "bb3" note: letter, accidentals (`#`, `-`, `b`),
//                            optional octave (default 4); C0 (MIDI 12)
//                            through G9 (MIDI 127)
//
// See `midi.rs` for SMF rendering and `corpus.rs` for the inverse mapping.

use crate::error::{GeneratorError, Result};
use lofi_prng::LofiRng;
use std::path::Path;

/// Note lengths the decoder can assign, with their selection weights.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DurationClass {
    Eighth,
    Quarter,
    Half,
    Sixteenth,
}

impl DurationClass {
    pub const ALL: [DurationClass; 4] = [
        DurationClass::Eighth,
        DurationClass::Quarter,
        DurationClass::Half,
        DurationClass::Sixteenth,
    ];

    /// Selection weights, parallel to `ALL`.
    pub const WEIGHTS: [f64; 4] = [0.65, 0.05, 0.05, 0.25];

    /// Length in quarter-note beats.
    pub fn beats(self) -> f64 {
        match self {
            DurationClass::Eighth => 0.5,
            DurationClass::Quarter => 1.0,
            DurationClass::Half => 2.0,
            DurationClass::Sixteenth => 0.25,
        }
    }

    pub fn draw(rng: &mut LofiRng) -> Self {
        rng.choose_weighted(&Self::WEIGHTS)
            .map(|i| Self::ALL[i])
            .unwrap_or(DurationClass::Eighth)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Instrument {
    Piano,
}

impl Instrument {
    /// General MIDI program number.
    pub fn program(self) -> u8 {
        match self {
            Instrument::Piano => 0,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Instrument::Piano => "Piano",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    Note {
        offset: f64,
        pitch: u8,
        duration: f64,
        instrument: Instrument,
    },
    Chord {
        offset: f64,
        pitches: Vec<u8>,
        duration: f64,
        instrument: Instrument,
    },
    Rest {
        offset: f64,
        duration: f64,
    },
}

impl Event {
    pub fn offset(&self) -> f64 {
        match self {
            Event::Note { offset, .. } | Event::Chord { offset, .. } | Event::Rest { offset, .. } => {
                *offset
            }
        }
    }

    pub fn duration(&self) -> f64 {
        match self {
            Event::Note { duration, .. }
            | Event::Chord { duration, .. }
            | Event::Rest { duration, .. } => *duration,
        }
    }

    /// Sounding MIDI pitches; empty for a rest.
    pub fn pitches(&self) -> &[u8] {
        match self {
            Event::Note { pitch, .. } => std::slice::from_ref(pitch),
            Event::Chord { pitches, .. } => pitches,
            Event::Rest { .. } => &[],
        }
    }
}

/// Decoded events in time order, plus the playback settings used when
/// rendering to MIDI.
#[derive(Clone, Debug, PartialEq)]
pub struct Timeline {
    events: Vec<Event>,
    pub tempo_bpm: u16,
    pub velocity: u8,
}

impl Timeline {
    pub const DEFAULT_TEMPO_BPM: u16 = 120;
    pub const DEFAULT_VELOCITY: u8 = 90;

    pub fn new(events: Vec<Event>) -> Self {
        Self {
            events,
            tempo_bpm: Self::DEFAULT_TEMPO_BPM,
            velocity: Self::DEFAULT_VELOCITY,
        }
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// End of the last event, in beats.
    pub fn total_duration(&self) -> f64 {
        self.events
            .last()
            .map(|e| e.offset() + e.duration())
            .unwrap_or(0.0)
    }

    /// In-memory SMF rendering; see `midi.rs` for the track layout.
    pub fn to_smf(&self) -> midly::Smf<'static> {
        crate::midi::timeline_to_smf(self)
    }

    /// Render to a Standard MIDI File at `path`, replacing any existing file.
    pub fn write_midi(&self, path: &Path) -> Result<()> {
        crate::midi::write_midi(self, path)
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct Decoder;

impl Decoder {
    pub fn new() -> Self {
        Decoder
    }

    pub fn decode<S: AsRef<str>>(&self, symbols: &[S], rng: &mut LofiRng) -> Result<Timeline> {
        let mut events = Vec::with_capacity(symbols.len());
        let mut offset = 0.0;
        for symbol in symbols {
            let drawn = DurationClass::draw(rng).beats();
            let event = decode_symbol(symbol.as_ref(), offset, drawn)?;
            offset += event.duration();
            events.push(event);
        }
        Ok(Timeline::new(events))
    }
}

fn decode_symbol(symbol: &str, offset: f64, duration: f64) -> Result<Event> {
    let instrument = Instrument::Piano;
    if is_chord_symbol(symbol) {
        let pitches = symbol
            .split('.')
            .map(|token| chord_pitch(token).ok_or_else(|| invalid(symbol)))
            .collect::<Result<Vec<u8>>>()?;
        return Ok(Event::Chord {
            offset,
            pitches,
            duration,
            instrument,
        });
    }
    if symbol.eq_ignore_ascii_case("r") {
        return Ok(Event::Rest {
            offset,
            duration: DurationClass::Sixteenth.beats(),
        });
    }
    let pitch = parse_pitch_name(symbol).ok_or_else(|| invalid(symbol))?;
    Ok(Event::Note {
        offset,
        pitch,
        duration,
        instrument,
    })
}

fn invalid(symbol: &str) -> GeneratorError {
    GeneratorError::InvalidSymbol(symbol.to_string())
}

fn is_chord_symbol(symbol: &str) -> bool {
    symbol.contains('.') || (!symbol.is_empty() && symbol.bytes().all(|b| b.is_ascii_digit()))
}

fn chord_pitch(token: &str) -> Option<u8> {
    if token.is_empty() || !token.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    match token.parse::<u32>().ok()? {
        n @ 0..=11 => Some(60 + n as u8),
        n @ 12..=127 => Some(n as u8),
        _ => None,
    }
}

/// MIDI number for a pitch name such as `C4`, `E-5`, `F#` or `bb3`.
/// Octaves are non-negative, so anything below C0 is rejected rather than
/// wrapped into octave -1.
pub fn parse_pitch_name(name: &str) -> Option<u8> {
    let mut chars = name.chars().peekable();
    let pitch_class: i32 = match chars.next()?.to_ascii_uppercase() {
        'C' => 0,
        'D' => 2,
        'E' => 4,
        'F' => 5,
        'G' => 7,
        'A' => 9,
        'B' => 11,
        _ => return None,
    };
    let mut alteration = 0i32;
    while let Some(&c) = chars.peek() {
        match c {
            '#' => alteration += 1,
            '-' | 'b' => alteration -= 1,
            _ => break,
        }
        chars.next();
    }
    let rest: String = chars.collect();
    let octave: i32 = if rest.is_empty() {
        4
    } else if rest.bytes().all(|b| b.is_ascii_digit()) {
        rest.parse().ok()?
    } else {
        return None;
    };
    let midi = 12 * (octave + 1) + pitch_class + alteration;
    u8::try_from(midi)
        .ok()
        .filter(|m| (LOWEST_NAMED_PITCH..=127).contains(m))
}

/// MIDI number of C0, the lowest pitch a note symbol can name.
pub const LOWEST_NAMED_PITCH: u8 = 12;

/// Pitch name for a MIDI number, spelled with `#` for C, F and G and `-`
/// for E and B flats. Only pitches from `LOWEST_NAMED_PITCH` up read back
/// through `parse_pitch_name`; the decoder never produces lower ones.
pub fn pitch_name(midi: u8) -> String {
    const NAMES: [&str; 12] = [
        "C", "C#", "D", "E-", "E", "F", "F#", "G", "G#", "A", "B-", "B",
    ];
    let octave = i32::from(midi / 12) - 1;
    format!("{}{}", NAMES[usize::from(midi % 12)], octave)
}
