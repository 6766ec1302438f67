// ============================================================
// Layer 3 — Core Traits (Abstractions)
// ============================================================
// The seams between the pipeline and its collaborators:
//
//   CorpusSource        — anything that can produce image records
//                         (CorpusScanner walks a directory)
//   MultimodalProcessor — the text/image processor the collator
//                         depends on (VisionTextProcessor wraps a
//                         HuggingFace tokenizer, a chat template
//                         and image preprocessing)
//
// The collator only sees MultimodalProcessor, so tests can run
// it against a small in-memory tokenizer instead of a real
// model checkpoint.
//
// Reference: Rust Book §10 (Traits: Defining Shared Behaviour)

use anyhow::Result;
use image::RgbImage;

use crate::domain::example::ChatTurn;
use crate::domain::record::ScanReport;

// ─── CorpusSource ─────────────────────────────────────────────────────────────
pub trait CorpusSource {
    /// Scan the source and report every record and every rejected file.
    fn scan(&self) -> Result<ScanReport>;
}

// ─── EncodedPair ──────────────────────────────────────────────────────────────
/// One (text, image) pair after processing, not yet padded.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedPair {
    pub input_ids:      Vec<u32>,
    /// 1 = real token (always 1 before batch padding)
    pub attention_mask: Vec<u32>,
    /// Channel-first pixel data, length = 3 * height * width
    pub pixel_values:   Vec<f32>,
    /// [channels, height, width]
    pub image_shape:    [usize; 3],
}

// ─── MultimodalProcessor ──────────────────────────────────────────────────────
/// Send + Sync because burn's DataLoader workers share the
/// collator (and therefore the processor) across threads.
pub trait MultimodalProcessor: Send + Sync {
    /// Render a conversation into a single prompt string.
    fn apply_chat_template(&self, messages: &[ChatTurn], add_generation_prompt: bool) -> Result<String>;

    /// Tokenize one text together with its image.
    fn encode_pair(&self, text: &str, image: &RgbImage) -> Result<EncodedPair>;

    /// Token id used for right padding
    fn pad_token_id(&self) -> u32;

    /// Token id of the image placeholder in rendered prompts
    fn image_token_id(&self) -> u32;
}
