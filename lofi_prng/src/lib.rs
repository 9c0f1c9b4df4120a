// Seedable pseudo-random number generator for the lofi generator.
//
// xoshiro256++ (Blackman & Vigna, 2019) with SplitMix64 seed expansion.
// Every random decision in the workspace draws from a `LofiRng` that the
// caller passes in explicitly: weight initialization, dropout masks, batch
// shuffling, the sampler's starting window and the decoder's duration
// draws. There is no process-wide random state, so a run is reproduced by
// reusing its seed.
//
// The core generator uses only integer arithmetic. Floating-point helpers
// are derived from `next_u64` and are themselves deterministic.

use serde::{Deserialize, Serialize};

/// xoshiro256++ state. Cheap to clone; a clone continues the same stream.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LofiRng {
    s: [u64; 4],
}

impl LofiRng {
    /// Seed a generator from a single `u64`.
    ///
    /// SplitMix64 expands the seed to 256 bits, so nearby seeds still give
    /// unrelated streams.
    pub fn new(seed: u64) -> Self {
        let mut sm = seed;
        Self {
            s: [
                splitmix64(&mut sm),
                splitmix64(&mut sm),
                splitmix64(&mut sm),
                splitmix64(&mut sm),
            ],
        }
    }

    /// Derive an independent child generator.
    ///
    /// Consumes one value from this stream and uses it as the child's seed.
    /// Used to hand separate streams to subsystems (model init, dropout,
    /// shuffling) without their draws interleaving.
    pub fn fork(&mut self) -> Self {
        Self::new(self.next_u64())
    }

    pub fn next_u64(&mut self) -> u64 {
        let result = (self.s[0].wrapping_add(self.s[3]))
            .rotate_left(23)
            .wrapping_add(self.s[0]);

        let t = self.s[1] << 17;

        self.s[2] ^= self.s[0];
        self.s[3] ^= self.s[1];
        self.s[1] ^= self.s[2];
        self.s[0] ^= self.s[3];

        self.s[2] ^= t;
        self.s[3] = self.s[3].rotate_left(45);

        result
    }

    /// Uniform `f32` in [0, 1) from the upper 24 bits.
    pub fn next_f32(&mut self) -> f32 {
        (self.next_u64() >> 40) as f32 / (1u64 << 24) as f32
    }

    /// Uniform `f64` in [0, 1) from the upper 53 bits.
    pub fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Uniform `f32` in `[low, high)`. Panics if `low >= high`.
    pub fn range_f32(&mut self, low: f32, high: f32) -> f32 {
        assert!(low < high, "range_f32: low must be less than high");
        low + self.next_f32() * (high - low)
    }

    /// Uniform integer in `[low, high)` without modulo bias.
    /// Panics if `low >= high`.
    pub fn range_u64(&mut self, low: u64, high: u64) -> u64 {
        assert!(low < high, "range_u64: low must be less than high");
        let range = high - low;
        if range.is_power_of_two() {
            return low + (self.next_u64() & (range - 1));
        }
        let threshold = range.wrapping_neg() % range;
        loop {
            let r = self.next_u64();
            if r >= threshold {
                return low + (r % range);
            }
        }
    }

    /// Uniform `usize` in `[low, high)`. Panics if `low >= high`.
    pub fn range_usize(&mut self, low: usize, high: usize) -> usize {
        self.range_u64(low as u64, high as u64) as usize
    }

    /// Draw an index from a categorical distribution given unnormalized
    /// weights.
    ///
    /// Walks the cumulative weights against a uniform draw scaled by the
    /// total. Returns `None` if `weights` is empty or sums to zero or less.
    /// Negative weights count as zero.
    pub fn choose_weighted(&mut self, weights: &[f64]) -> Option<usize> {
        let total: f64 = weights.iter().map(|w| w.max(0.0)).sum();
        if weights.is_empty() || total <= 0.0 {
            return None;
        }
        let target = self.next_f64() * total;
        let mut cumulative = 0.0;
        for (i, w) in weights.iter().enumerate() {
            cumulative += w.max(0.0);
            if cumulative > target {
                return Some(i);
            }
        }
        // Rounding can leave `target` just past the final cumulative sum.
        weights.iter().rposition(|w| *w > 0.0)
    }

    /// Fisher-Yates shuffle in place.
    pub fn shuffle<T>(&mut self, items: &mut [T]) {
        for i in (1..items.len()).rev() {
            let j = self.range_usize(0, i + 1);
            items.swap(i, j);
        }
    }
}

/// SplitMix64 step, used only to expand a `u64` seed into xoshiro state.
fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9e37_79b9_7f4a_7c15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}
