// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Pure Rust structs and traits that define the core concepts
// of the tissue corpus: what an image record is, what a label
// vocabulary is, what a chat-style training example looks like.
//
// Rules for this layer:
//   - NO Burn framework types allowed here
//   - NO file I/O or network calls
//   - Only plain Rust structs, enums, and traits
//
// The data layer (Layer 4) and the infra layer (Layer 6)
// implement the traits declared here.
//
// Reference: Rust Book §5 (Structs), §10 (Traits)

// Scanned image records and their raw labels
pub mod record;

// Sorted class vocabularies with dense indices
pub mod vocabulary;

// Chat-style formatted examples
pub mod example;

// Parsed model predictions
pub mod prediction;

// Core abstractions (traits) that other layers implement
pub mod traits;
