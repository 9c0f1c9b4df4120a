// Symbol vocabulary.
//
// Maps each distinct corpus symbol to a dense id in `[0, len)`. Symbols are
// sorted in byte order before ids are assigned, so the same symbol set
// always produces the same map regardless of corpus order.
//
// The fingerprint identifies the exact symbol list (CRC-32 over every symbol
// followed by `\n`, with the vocabulary size in the high 32 bits). Weight
// snapshots record it and refuse to load against a different vocabulary.

use std::collections::BTreeMap;

/// A vocabulary entry: a pitch name, a dotted chord, or the rest marker.
pub type Symbol = String;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Vocabulary {
    symbols: Vec<Symbol>,
    ids: BTreeMap<Symbol, usize>,
    fingerprint: u64,
}

impl Vocabulary {
    pub fn from_symbols<S: AsRef<str>>(corpus: &[S]) -> Self {
        let mut symbols: Vec<Symbol> = corpus.iter().map(|s| s.as_ref().to_string()).collect();
        symbols.sort();
        symbols.dedup();

        let ids = symbols
            .iter()
            .enumerate()
            .map(|(id, symbol)| (symbol.clone(), id))
            .collect();

        let mut hasher = crc32fast::Hasher::new();
        for symbol in &symbols {
            hasher.update(symbol.as_bytes());
            hasher.update(b"\n");
        }
        let fingerprint = ((symbols.len() as u64) << 32) | u64::from(hasher.finalize());

        Self {
            symbols,
            ids,
            fingerprint,
        }
    }

    pub fn id_of(&self, symbol: &str) -> Option<usize> {
        self.ids.get(symbol).copied()
    }

    pub fn symbol_of(&self, id: usize) -> Option<&Symbol> {
        self.symbols.get(id)
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn fingerprint(&self) -> u64 {
        self.fingerprint
    }

    /// Symbols in id order.
    pub fn symbols(&self) -> &[Symbol] {
        &self.symbols
    }
}
