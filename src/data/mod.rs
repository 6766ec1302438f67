// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// This layer handles everything from a directory of microscopy
// images all the way to tensor batches, and back from generated
// text to label indices.
//
// The pipeline flows in this order:
//
//   image directory
//       │
//       ▼
//   CorpusScanner     → file names → (focus, zoom, type) records
//       │
//       ▼
//   Indexer           → sorted vocabularies, dense class indices
//       │
//       ▼
//   Splitter          → seeded train / validation partition
//       │
//       ▼
//   ExampleFormatter  → chat-style examples (prompt + target)
//       │
//       ▼
//   ExampleDataset    → implements Burn's Dataset trait
//       │
//       ▼
//   VlmCollator       → images + padded tokens + masked labels
//       │
//       ▼
//   training step / generation
//       │
//       ▼
//   ResponseParser    → generated text → label indices
//
// Each module is responsible for exactly one step.
//
// Reference: Burn Book §4 (Datasets and Dataloaders)
//            Rust Book §13 (Iterators and Closures)

/// Scans an image directory and parses file names into labels
pub mod scanner;

/// Builds label vocabularies and maps records to class indices
pub mod indexer;

/// Seeded train/validation split
pub mod splitter;

/// Builds chat-style training and evaluation examples
pub mod formatter;

/// Implements Burn's Dataset trait for formatted examples
pub mod dataset;

/// Collates examples into padded, label-masked tensor batches
pub mod collator;

/// Parses generated responses back into label indices
pub mod postprocessor;
