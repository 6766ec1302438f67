// ============================================================
// Layer 4 — Label Indexer
// ============================================================
// Turns raw labels into dense class indices.
//
//   records (raw)            LabelSpace              indexed
//   ─────────────            ──────────              ───────
//   bone   10x  focused  →   tissue: [bone, skin] →  (1, 0, 0)
//   skin   4x   unfocused    zoom:   [4x, 10x]       (1, 0, 1)
//   ...                                              ...
//
// The vocabularies are built ONCE from the full corpus, before
// the train/validation split, so both splits share the same
// index spaces.
//
// Reference: Rust Book §13 (Iterators and Closures)

use anyhow::{bail, Context, Result};

use crate::domain::record::{ImageRecord, IndexedRecord};
use crate::domain::vocabulary::{LabelSpace, LabelVocabulary};

/// Build the corpus-wide label space from every scanned record.
/// An empty corpus is an error: there would be nothing to classify.
pub fn build_label_space(records: &[ImageRecord]) -> Result<LabelSpace> {
    if records.is_empty() {
        bail!("Cannot build label vocabularies from an empty corpus");
    }

    let zoom   = LabelVocabulary::from_values(records.iter().map(|r| r.zoom_raw));
    let tissue = LabelVocabulary::from_values(records.iter().map(|r| r.type_raw.clone()));

    tracing::info!(
        "Label space: {} tissue types, {} zoom levels",
        tissue.len(),
        zoom.len()
    );
    tracing::debug!("Tissue types: {:?}", tissue.classes());

    Ok(LabelSpace::new(zoom, tissue))
}

/// Map every record into the index spaces of `labels`.
/// Fails on a value the vocabulary has never seen, which can only
/// happen when the label space was built from a different corpus.
pub fn index_records(records: &[ImageRecord], labels: &LabelSpace) -> Result<Vec<IndexedRecord>> {
    records
        .iter()
        .map(|r| {
            let zoom_idx = labels
                .zoom
                .index_of(&r.zoom_raw)
                .with_context(|| format!("Zoom {} of '{}' is not in the vocabulary", r.zoom_raw, r.path.display()))?;
            let type_idx = labels
                .tissue
                .index_of(&r.type_raw)
                .with_context(|| format!("Tissue '{}' of '{}' is not in the vocabulary", r.type_raw, r.path.display()))?;

            Ok(IndexedRecord {
                image_path: r.path.clone(),
                focus_idx:  r.focus.index(),
                zoom_idx,
                type_idx,
            })
        })
        .collect()
}
