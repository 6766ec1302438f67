// ============================================================
// Layer 4 — Train/Validation Splitter
// ============================================================
// Shuffles samples with a SEEDED generator and splits them into
//   - Training set:   used to update model weights
//   - Validation set: used to measure performance on unseen data
//
// Why a fixed seed?
//   Benchmarks compare runs against the same validation images.
//   The same seed + ratio + corpus always reproduces the exact
//   same partition, on every machine.
//
// Sizes: round(ratio × N) training, the remainder validation.
// No stratification: class imbalance in the corpus carries over
// into both splits unchanged.
//
// Uses Fisher-Yates shuffle via rand::seq::SliceRandom on a
// StdRng seeded with seed_from_u64.
//
// Reference: Rust Book §8 (Vectors)
//            rand crate documentation

use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use serde::{Deserialize, Serialize};

/// Seed used when none is configured
pub const DEFAULT_SEED: u64 = 42;

/// Fraction of the corpus used for training when none is configured
pub const DEFAULT_SPLIT_RATIO: f64 = 0.8;

/// A partition of `[0, N)` into two disjoint index sets
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Split {
    pub train:      Vec<usize>,
    pub validation: Vec<usize>,
}

impl Split {
    pub fn total(&self) -> usize {
        self.train.len() + self.validation.len()
    }
}

/// Number of training items for `total` items at `train_fraction`
pub fn train_size(total: usize, train_fraction: f64) -> usize {
    let n = ((total as f64) * train_fraction).round();
    // Clamp to valid range to avoid panics on tiny datasets
    (n.max(0.0) as usize).min(total)
}

/// Partition the indices `0..total` into (train, validation).
pub fn split_indices(total: usize, train_fraction: f64, seed: u64) -> Split {
    let indices: Vec<usize> = (0..total).collect();
    let (train, validation) = split_train_val(indices, train_fraction, seed);
    Split { train, validation }
}

/// Shuffle `samples` with `seed` and split into (train, validation).
///
/// # Example
/// ```ignore
/// let (train, val) = split_train_val(all_samples, 0.8, 42);
/// // train has 80% of samples, val has 20%
/// ```
pub fn split_train_val<T>(mut samples: Vec<T>, train_fraction: f64, seed: u64) -> (Vec<T>, Vec<T>) {
    let mut rng = StdRng::seed_from_u64(seed);
    samples.shuffle(&mut rng);

    let total    = samples.len();
    let split_at = train_size(total, train_fraction);

    // split_off(n) removes elements [n..] from the Vec and returns them
    let val = samples.split_off(split_at);

    tracing::debug!(
        "Dataset split: {} training, {} validation ({}% / {}%)",
        samples.len(),
        val.len(),
        (samples.len() * 100) / total.max(1),
        (val.len()     * 100) / total.max(1),
    );

    (samples, val)
}
