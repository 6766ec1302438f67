// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// Concerns that sit outside the pure data pipeline:
//
//   processor.rs       — The vision-text processor
//                        Loads a HuggingFace tokenizer.json,
//                        renders the chat template with minijinja
//                        and preprocesses images into normalised
//                        pixel tensors. Implements the domain's
//                        MultimodalProcessor trait.
//
//   artifact_store.rs  — Prepared dataset persistence
//                        JSONL example splits, the label space
//                        and the prepare config, so later
//                        commands see the same indices.
//
//   metrics.rs         — Evaluation metrics
//                        Per-field and exact-match accuracy of
//                        parsed predictions, logged to CSV.
//
// Reference: Rust Book §7 (Modules)
//            Rust Book §9 (Error Handling with anyhow)

/// Tokenizer, chat template and image preprocessing
pub mod processor;

/// JSON / JSONL persistence of prepared datasets
pub mod artifact_store;

/// Evaluation metrics and CSV logger
pub mod metrics;
