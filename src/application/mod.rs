// ============================================================
// Layer 2 — Application / Use Cases
// ============================================================
// This layer orchestrates the other layers to accomplish one
// goal per use case.
//
// Rules for this layer:
//   - No parsing or tensor code here (that's Layer 4)
//   - No printing here (that's Layer 1)
//   - No direct file formats (that's Layer 6)
//   - Only workflow coordination
//
// Reference: Clean Architecture pattern
//            Rust Book §7 (Module System)

// Scan → index → split → format → persist
pub mod prepare_use_case;

// Processor loading, batch preview and burn data loaders
pub mod collate_use_case;

// Response parsing and scoring
pub mod evaluate_use_case;
