// ============================================================
// Layer 3 — Label Vocabularies
// ============================================================
// A LabelVocabulary is the sorted set of distinct values seen
// for one label dimension, plus the value ↔ index bijection.
//
//   raw values:  [20x, 4x, 20x, 10x, 4x]
//   classes:     [4x, 10x, 20x]          (sorted, deduplicated)
//   indices:      0    1    2
//
// Sorting makes the vocabulary independent of the order the
// files were scanned in, so the same corpus content always
// produces the same index meaning.
//
// A vocabulary is immutable once built: there is no insert.
// Formatted examples bake these indices into their prompts and
// targets, so changing them mid-run would corrupt the labels.
//
// Reference: Rust Book §8 (Hash Maps), §10 (Generics)

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{BTreeSet, HashMap};
use std::hash::Hash;

use crate::domain::record::{Focus, Magnification};

// ─── LabelVocabulary ──────────────────────────────────────────────────────────
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelVocabulary<T: Ord + Hash + Clone> {
    /// Distinct values, sorted ascending. Position = class index.
    classes: Vec<T>,
    /// Inverse mapping value → class index
    index: HashMap<T, usize>,
}

impl<T: Ord + Hash + Clone> LabelVocabulary<T> {
    /// Build a vocabulary from raw (possibly repeated) values.
    pub fn from_values(values: impl IntoIterator<Item = T>) -> Self {
        // BTreeSet both deduplicates and sorts in one pass
        let classes: Vec<T> = values
            .into_iter()
            .collect::<BTreeSet<T>>()
            .into_iter()
            .collect();

        let index = classes
            .iter()
            .enumerate()
            .map(|(i, v)| (v.clone(), i))
            .collect();

        Self { classes, index }
    }

    pub fn index_of(&self, value: &T) -> Option<usize> {
        self.index.get(value).copied()
    }

    pub fn value_at(&self, idx: usize) -> Option<&T> {
        self.classes.get(idx)
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn classes(&self) -> &[T] {
        &self.classes
    }

    /// (index, value) pairs in index order
    pub fn iter(&self) -> impl Iterator<Item = (usize, &T)> {
        self.classes.iter().enumerate()
    }
}

// Serialised as the plain sorted class list; the index map is
// rebuilt on load.
impl<T: Ord + Hash + Clone + Serialize> Serialize for LabelVocabulary<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.classes.serialize(serializer)
    }
}

impl<'de, T: Ord + Hash + Clone + Deserialize<'de>> Deserialize<'de> for LabelVocabulary<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let classes = Vec::<T>::deserialize(deserializer)?;
        Ok(Self::from_values(classes))
    }
}

// ─── LabelSpace ───────────────────────────────────────────────────────────────
/// All label dimensions of the corpus. Focus is fixed (binary)
/// and therefore has no vocabulary of its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelSpace {
    pub zoom:   LabelVocabulary<Magnification>,
    pub tissue: LabelVocabulary<String>,
}

/// Number of classes per label dimension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NumClasses {
    pub focus: usize,
    pub zoom:  usize,
    pub tissue: usize,
}

impl LabelSpace {
    pub fn new(zoom: LabelVocabulary<Magnification>, tissue: LabelVocabulary<String>) -> Self {
        Self { zoom, tissue }
    }

    pub fn num_classes(&self) -> NumClasses {
        NumClasses {
            focus:  Focus::ALL.len(),
            zoom:   self.zoom.len(),
            tissue: self.tissue.len(),
        }
    }

    /// "0: adipose\n1: bone\n..."
    pub fn tissue_options(&self) -> String {
        self.tissue
            .iter()
            .map(|(i, name)| format!("{i}: {name}"))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// "0: 4x\n1: 10x\n..."
    pub fn zoom_options(&self) -> String {
        self.zoom
            .iter()
            .map(|(i, zoom)| format!("{i}: {zoom}"))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// "0: focused\n1: unfocused"
    pub fn focus_options(&self) -> String {
        Focus::ALL
            .iter()
            .map(|f| format!("{}: {}", f.index(), f.status()))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
