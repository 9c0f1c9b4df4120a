// Symbol corpus loading and encoding.
//
// The corpus is the ordered list of symbols the network trains on. It is
// stored either as a JSON array of strings (the default) or as plain text
// with one symbol per line (`.txt`, whitespace-only lines skipped). Symbols
// are kept exactly as stored, surrounding whitespace included; the decoder
// is the only place that interprets them.
//
// `encode_event` maps a decoded event back to its symbol, so a generated
// timeline can be appended to a corpus for further training.

use crate::decoder::{Event, Timeline, pitch_name};
use crate::error::{GeneratorError, Result};
use crate::vocab::Symbol;
use std::path::Path;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Corpus {
    symbols: Vec<Symbol>,
}

impl Corpus {
    pub fn new(symbols: Vec<Symbol>) -> Self {
        Self { symbols }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let unavailable = |reason: String| GeneratorError::DataUnavailable {
            path: path.to_path_buf(),
            reason,
        };
        let text = std::fs::read_to_string(path).map_err(|e| unavailable(e.to_string()))?;
        let is_text = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("txt"));
        let symbols = if is_text {
            // `lines` drops only the `\n` / `\r\n` terminator.
            text.lines()
                .filter(|line| !line.trim().is_empty())
                .map(str::to_string)
                .collect()
        } else {
            serde_json::from_str::<Vec<Symbol>>(&text).map_err(|e| unavailable(e.to_string()))?
        };
        log::info!("loaded {} symbols from {}", symbols.len(), path.display());
        Ok(Self { symbols })
    }

    /// Write the corpus as a JSON array.
    pub fn save(&self, path: &Path) -> Result<()> {
        let write_error = |reason: String| GeneratorError::OutputWriteError {
            path: path.to_path_buf(),
            reason,
        };
        let json = serde_json::to_string(&self.symbols).map_err(|e| write_error(e.to_string()))?;
        std::fs::write(path, json).map_err(|e| write_error(e.to_string()))
    }

    pub fn symbols(&self) -> &[Symbol] {
        &self.symbols
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn extend_from_timeline(&mut self, timeline: &Timeline) {
        self.symbols.extend(encode_events(timeline.events()));
    }
}

pub fn encode_event(event: &Event) -> Symbol {
    match event {
        Event::Note { pitch, .. } => pitch_name(*pitch),
        Event::Chord { pitches, .. } => pitches
            .iter()
            .map(|p| p.to_string())
            .collect::<Vec<_>>()
            .join("."),
        Event::Rest { .. } => "R".to_string(),
    }
}

pub fn encode_events(events: &[Event]) -> Vec<Symbol> {
    events.iter().map(encode_event).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::Decoder;
    use lofi_prng::LofiRng;
    use std::path::PathBuf;

    fn temp_file(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("lofi-corpus-{}-{name}", std::process::id()))
    }

    #[test]
    fn json_roundtrip_keeps_order() {
        let path = temp_file("roundtrip.json");
        let corpus = Corpus::new(vec!["E-5".into(), "C4".into(), "60.64.67".into(), "R".into()]);
        corpus.save(&path).unwrap();
        assert_eq!(Corpus::load(&path).unwrap(), corpus);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn text_corpus_skips_blank_lines_and_keeps_symbols_verbatim() {
        let path = temp_file("notes.txt");
        std::fs::write(&path, "C4\r\n\n   \n E4 \nR\n").unwrap();
        let corpus = Corpus::load(&path).unwrap();
        assert_eq!(corpus.symbols(), &["C4", " E4 ", "R"]);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn missing_file_is_unavailable() {
        let result = Corpus::load(Path::new("/nonexistent/lofi/notes.json"));
        assert!(matches!(result, Err(GeneratorError::DataUnavailable { .. })));
    }

    #[test]
    fn malformed_json_is_unavailable() {
        let path = temp_file("bad.json");
        std::fs::write(&path, "{\"notes\": 3}").unwrap();
        assert!(matches!(
            Corpus::load(&path),
            Err(GeneratorError::DataUnavailable { .. })
        ));
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn encoding_inverts_decoding() {
        let symbols = ["C4", "60.64.67", "R", "B-3", "F#5"];
        let timeline = Decoder::new()
            .decode(&symbols, &mut LofiRng::new(4))
            .unwrap();
        assert_eq!(encode_events(timeline.events()), symbols);

        let mut corpus = Corpus::default();
        corpus.extend_from_timeline(&timeline);
        assert_eq!(corpus.len(), 5);
    }

    #[test]
    fn every_decodable_note_survives_encode_and_decode() {
        let names: Vec<String> = (0..=10)
            .flat_map(|octave| {
                ["C-", "C", "Cb", "B#", "G#"]
                    .into_iter()
                    .map(move |letter| format!("{letter}{octave}"))
            })
            .collect();
        let decoder = Decoder::new();
        for name in &names {
            let Ok(first) = decoder.decode(&[name], &mut LofiRng::new(1)) else {
                continue;
            };
            let symbols = encode_events(first.events());
            let second = decoder.decode(&symbols, &mut LofiRng::new(1)).unwrap();
            assert_eq!(
                first.events()[0].pitches(),
                second.events()[0].pitches(),
                "{name} -> {symbols:?}"
            );
        }
    }
}
