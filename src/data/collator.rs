// ============================================================
// Layer 4 — Vision-Language Collator
// ============================================================
// Turns a list of FormattedExamples into one rectangular batch:
//
//   1. Load every image as 3-channel RGB
//   2. Render each conversation with the chat template
//   3. Tokenize each (text, image) pair on its own, then
//      right-pad all sequences to the longest one and stack
//      the image tensors along a new batch dimension
//   4. Copy input_ids into labels and replace every position
//      that must not contribute to the loss with -100
//
//   input_ids   [ 2  105  255999  262144  ...  106  0  0 ]
//   labels      [ 2  105   -100    -100   ...  106 -100 -100 ]
//                          │        │               └ padding
//                          │        └ reserved image token
//                          └ image placeholder
//
// Why fail the whole batch on one bad image?
//   Row i of pixel_values, input_ids and labels must describe
//   the same example. Dropping a single image would shift every
//   later row and silently pair images with the wrong labels.
//
// The collator holds no mutable state: each call only reads
// images from disk, so burn's DataLoader may run it on several
// worker threads at once.
//
// Reference: Burn Book §4 (Batcher)
//            Rust Book §8 (Vectors), §16 (Send and Sync)

use burn::{data::dataloader::batcher::Batcher, prelude::*};
use image::RgbImage;
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};
use thiserror::Error;

use crate::domain::example::FormattedExample;
use crate::domain::traits::{EncodedPair, MultimodalProcessor};

/// Label value excluded from the loss
pub const IGNORE_INDEX: i32 = -100;

/// Image-related special token outside the regular vocabulary
/// range. Always masked, whatever the processor reports.
pub const RESERVED_IMAGE_TOKEN_ID: u32 = 262_144;

// ─── Errors ───────────────────────────────────────────────────────────────────
#[derive(Debug, Error)]
pub enum CollateError {
    #[error("collator has no processor configured")]
    MissingProcessor,
    #[error("cannot collate an empty batch")]
    EmptyBatch,
    #[error("cannot load image '{path}': {source}")]
    ImageLoad {
        path:   PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("processor failed on '{path}': {message}")]
    Processor { path: PathBuf, message: String },
    #[error("image '{path}' was processed to shape {found:?}, batch expects {expected:?}")]
    ShapeMismatch {
        path:     PathBuf,
        expected: [usize; 3],
        found:    [usize; 3],
    },
}

// ─── HostBatch ────────────────────────────────────────────────────────────────
/// A collated batch still in host memory, flattened row-major.
/// Kept separate from the tensor batch so the padding and
/// masking logic can be inspected without a backend.
#[derive(Debug, Clone, PartialEq)]
pub struct HostBatch {
    pub batch_size:     usize,
    pub seq_len:        usize,
    /// [channels, height, width] of every image
    pub image_shape:    [usize; 3],
    /// batch_size × channels × height × width
    pub pixel_values:   Vec<f32>,
    /// batch_size × seq_len
    pub input_ids:      Vec<i32>,
    /// batch_size × seq_len, 1 = real token, 0 = padding
    pub attention_mask: Vec<i32>,
    /// batch_size × seq_len, input_ids with masked positions = -100
    pub labels:         Vec<i32>,
}

impl HostBatch {
    /// Row `i` of a flattened [batch_size, seq_len] buffer
    pub fn row<'a>(&self, buffer: &'a [i32], i: usize) -> &'a [i32] {
        &buffer[i * self.seq_len..(i + 1) * self.seq_len]
    }
}

// ─── VlmBatch ─────────────────────────────────────────────────────────────────
/// The tensors consumed by one training step.
/// Every tensor has batch_size as its first dimension.
#[derive(Debug, Clone)]
pub struct VlmBatch<B: Backend> {
    /// [batch_size, channels, height, width]
    pub pixel_values:   Tensor<B, 4>,
    /// [batch_size, seq_len]
    pub input_ids:      Tensor<B, 2, Int>,
    /// [batch_size, seq_len]
    pub attention_mask: Tensor<B, 2, Int>,
    /// [batch_size, seq_len]
    pub labels:         Tensor<B, 2, Int>,
}

impl<B: Backend> VlmBatch<B> {
    pub fn from_host(host: &HostBatch, device: &B::Device) -> Self {
        let [c, h, w] = host.image_shape;
        let dims      = [host.batch_size, host.seq_len];

        let pixel_values = Tensor::<B, 1>::from_floats(host.pixel_values.as_slice(), device)
            .reshape([host.batch_size, c, h, w]);
        let input_ids = Tensor::<B, 1, Int>::from_ints(host.input_ids.as_slice(), device)
            .reshape(dims);
        let attention_mask = Tensor::<B, 1, Int>::from_ints(host.attention_mask.as_slice(), device)
            .reshape(dims);
        let labels = Tensor::<B, 1, Int>::from_ints(host.labels.as_slice(), device)
            .reshape(dims);

        Self { pixel_values, input_ids, attention_mask, labels }
    }
}

// ─── VlmCollator ──────────────────────────────────────────────────────────────
/// Built only through [`VlmCollatorBuilder`], which refuses to
/// produce a collator without a processor.
#[derive(Clone)]
pub struct VlmCollator<B: Backend> {
    processor: Arc<dyn MultimodalProcessor>,
    device:    B::Device,
}

pub struct VlmCollatorBuilder<B: Backend> {
    processor: Option<Arc<dyn MultimodalProcessor>>,
    device:    Option<B::Device>,
}

impl<B: Backend> Default for VlmCollatorBuilder<B> {
    fn default() -> Self {
        Self { processor: None, device: None }
    }
}

impl<B: Backend> VlmCollatorBuilder<B> {
    pub fn processor(mut self, processor: Arc<dyn MultimodalProcessor>) -> Self {
        self.processor = Some(processor);
        self
    }

    pub fn device(mut self, device: B::Device) -> Self {
        self.device = Some(device);
        self
    }

    /// Finish construction. Without a processor there is nothing
    /// to collate with, so this fails up front instead of on the
    /// first batch.
    pub fn build(self) -> Result<VlmCollator<B>, CollateError> {
        let processor = self.processor.ok_or(CollateError::MissingProcessor)?;
        Ok(VlmCollator {
            processor,
            device: self.device.unwrap_or_default(),
        })
    }
}

impl<B: Backend> VlmCollator<B> {
    pub fn builder() -> VlmCollatorBuilder<B> {
        VlmCollatorBuilder::default()
    }

    pub fn new(processor: Arc<dyn MultimodalProcessor>, device: B::Device) -> Self {
        Self { processor, device }
    }

    pub fn device(&self) -> &B::Device {
        &self.device
    }

    /// Collate into tensors on this collator's device.
    pub fn collate(&self, examples: &[FormattedExample]) -> Result<VlmBatch<B>, CollateError> {
        let host = self.collate_host(examples)?;
        Ok(VlmBatch::from_host(&host, &self.device))
    }

    /// Collate into a host-memory batch.
    pub fn collate_host(&self, examples: &[FormattedExample]) -> Result<HostBatch, CollateError> {
        if examples.is_empty() {
            return Err(CollateError::EmptyBatch);
        }

        // ── Step 1: load every image ──────────────────────────────────────────
        let images = examples
            .iter()
            .map(|ex| load_rgb(&ex.image_path))
            .collect::<Result<Vec<_>, _>>()?;

        // ── Step 2: render prompts (no generation prompt for training) ────────
        let texts = examples
            .iter()
            .map(|ex| {
                self.processor
                    .apply_chat_template(&ex.messages, false)
                    .map(|t| t.trim().to_string())
                    .map_err(|e| processor_error(&ex.image_path, e))
            })
            .collect::<Result<Vec<_>, _>>()?;

        // ── Step 3: tokenize each pair independently ──────────────────────────
        let encoded = examples
            .iter()
            .zip(texts.iter().zip(images.iter()))
            .map(|(ex, (text, image))| {
                self.processor
                    .encode_pair(text, image)
                    .map_err(|e| processor_error(&ex.image_path, e))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let batch = pad_and_stack(examples, encoded, self.processor.pad_token_id())?;

        // ── Step 4: labels with non-informative positions masked ──────────────
        let labels = mask_labels(
            &batch.input_ids,
            &[
                self.processor.pad_token_id(),
                self.processor.image_token_id(),
                RESERVED_IMAGE_TOKEN_ID,
            ],
        );

        tracing::debug!(
            "Collated batch: {} examples, seq_len={}, image={:?}",
            batch.batch_size,
            batch.seq_len,
            batch.image_shape,
        );

        Ok(HostBatch { labels, ..batch })
    }
}

/// Lets burn's DataLoader drive the collator.
///
/// # Panics
/// burn's `Batcher::batch` cannot return an error, so a failing
/// batch (unreadable image, processor failure) panics here with
/// the collation error. Call [`VlmCollator::collate`] directly to
/// handle the error instead.
impl<B: Backend> Batcher<FormattedExample, VlmBatch<B>> for VlmCollator<B> {
    fn batch(&self, items: Vec<FormattedExample>) -> VlmBatch<B> {
        match self.collate(&items) {
            Ok(batch) => batch,
            Err(e) => panic!("Batch collation failed: {e}"),
        }
    }
}

// ─── Helpers ──────────────────────────────────────────────────────────────────
fn load_rgb(path: &Path) -> Result<RgbImage, CollateError> {
    image::open(path)
        .map(|img| img.to_rgb8())
        .map_err(|source| CollateError::ImageLoad { path: path.to_path_buf(), source })
}

fn processor_error(path: &Path, e: anyhow::Error) -> CollateError {
    CollateError::Processor { path: path.to_path_buf(), message: format!("{e:#}") }
}

/// Right-pad every sequence to the batch maximum and flatten
/// ids, masks and pixels into row-major buffers. Labels are left
/// empty for the caller to fill.
fn pad_and_stack(
    examples: &[FormattedExample],
    encoded:  Vec<EncodedPair>,
    pad_id:   u32,
) -> Result<HostBatch, CollateError> {
    let batch_size  = encoded.len();
    let seq_len     = encoded.iter().map(|e| e.input_ids.len()).max().unwrap_or(0);
    let image_shape = encoded[0].image_shape;

    let mut input_ids      = Vec::with_capacity(batch_size * seq_len);
    let mut attention_mask = Vec::with_capacity(batch_size * seq_len);
    let mut pixel_values   = Vec::with_capacity(batch_size * image_shape.iter().product::<usize>());

    for (ex, pair) in examples.iter().zip(encoded) {
        if pair.image_shape != image_shape {
            return Err(CollateError::ShapeMismatch {
                path:     ex.image_path.clone(),
                expected: image_shape,
                found:    pair.image_shape,
            });
        }

        let pad = seq_len - pair.input_ids.len();
        input_ids.extend(pair.input_ids.iter().map(|&id| id as i32));
        input_ids.extend(std::iter::repeat(pad_id as i32).take(pad));
        attention_mask.extend(pair.attention_mask.iter().map(|&m| m as i32));
        attention_mask.extend(std::iter::repeat(0).take(pad));
        pixel_values.extend_from_slice(&pair.pixel_values);
    }

    Ok(HostBatch {
        batch_size,
        seq_len,
        image_shape,
        pixel_values,
        input_ids,
        attention_mask,
        labels: Vec::new(),
    })
}

/// Copy of `input_ids` with every id in `masked` set to IGNORE_INDEX
fn mask_labels(input_ids: &[i32], masked: &[u32]) -> Vec<i32> {
    input_ids
        .iter()
        .map(|&id| {
            if masked.iter().any(|&m| m as i32 == id) {
                IGNORE_INDEX
            } else {
                id
            }
        })
        .collect()
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::example::{ChatTurn, ContentPart};
    use anyhow::Result;
    use image::Rgb;

    type TestBackend = burn::backend::NdArray;

    const PAD: u32 = 0;
    const IMAGE: u32 = 5;

    /// Word-per-token processor: "<image>" → IMAGE, "<reserved>" →
    /// the reserved id, anything else → 10 + word length.
    struct StubProcessor;

    impl MultimodalProcessor for StubProcessor {
        fn apply_chat_template(&self, messages: &[ChatTurn], _gen: bool) -> Result<String> {
            let mut out = String::from("  ");
            for turn in messages {
                for part in &turn.content {
                    match part {
                        ContentPart::Image         => out.push_str("<image> "),
                        ContentPart::Text { text } => { out.push_str(text); out.push(' '); }
                    }
                }
            }
            Ok(out)
        }

        fn encode_pair(&self, text: &str, image: &RgbImage) -> Result<EncodedPair> {
            let input_ids: Vec<u32> = text
                .split_whitespace()
                .map(|w| match w {
                    "<image>"    => IMAGE,
                    "<reserved>" => RESERVED_IMAGE_TOKEN_ID,
                    other        => 10 + other.len() as u32,
                })
                .collect();
            let (w, h) = image.dimensions();
            let mut pixel_values = Vec::new();
            for c in 0..3 {
                for y in 0..h {
                    for x in 0..w {
                        pixel_values.push(image.get_pixel(x, y)[c] as f32 / 255.0);
                    }
                }
            }
            Ok(EncodedPair {
                attention_mask: vec![1; input_ids.len()],
                input_ids,
                pixel_values,
                image_shape: [3, h as usize, w as usize],
            })
        }

        fn pad_token_id(&self) -> u32 { PAD }

        fn image_token_id(&self) -> u32 { IMAGE }
    }

    fn collator() -> VlmCollator<TestBackend> {
        VlmCollator::builder()
            .processor(Arc::new(StubProcessor))
            .build()
            .unwrap()
    }

    fn write_image(dir: &Path, name: &str, size: u32) -> PathBuf {
        let path = dir.join(name);
        RgbImage::from_pixel(size, size, Rgb([255, 0, 0])).save(&path).unwrap();
        path
    }

    fn example(path: PathBuf, prompt: &str, answer: Option<&str>) -> FormattedExample {
        let mut messages = vec![ChatTurn::user(vec![ContentPart::Image, ContentPart::text(prompt)])];
        if let Some(a) = answer {
            messages.push(ChatTurn::assistant(a));
        }
        FormattedExample { image_path: path, focus_idx: 0, zoom_idx: 0, type_idx: 0, messages }
    }

    #[test]
    fn test_builder_requires_processor() {
        let result = VlmCollator::<TestBackend>::builder().build();
        assert!(matches!(result, Err(CollateError::MissingProcessor)));
    }

    #[test]
    fn test_empty_batch_is_an_error() {
        assert!(matches!(collator().collate_host(&[]), Err(CollateError::EmptyBatch)));
    }

    #[test]
    fn test_pads_to_longest_and_masks() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_image(dir.path(), "a.png", 4);
        let b = write_image(dir.path(), "b.png", 4);

        let batch = collator()
            .collate_host(&[
                example(a, "one two three", Some("answer <reserved>")),
                example(b, "one", None),
            ])
            .unwrap();

        assert_eq!(batch.batch_size, 2);
        // <image> one two three answer <reserved>
        assert_eq!(batch.seq_len, 6);
        assert_eq!(batch.image_shape, [3, 4, 4]);
        assert_eq!(batch.pixel_values.len(), 2 * 3 * 16);

        assert_eq!(batch.row(&batch.input_ids, 0), &[5, 13, 13, 15, 16, 262_144]);
        assert_eq!(batch.row(&batch.input_ids, 1), &[5, 13, 0, 0, 0, 0]);
        assert_eq!(batch.row(&batch.attention_mask, 1), &[1, 1, 0, 0, 0, 0]);

        assert_eq!(batch.row(&batch.labels, 0), &[-100, 13, 13, 15, 16, -100]);
        assert_eq!(batch.row(&batch.labels, 1), &[-100, 13, -100, -100, -100, -100]);
    }

    #[test]
    fn test_labels_match_ids_where_not_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let examples: Vec<_> = (0..3)
            .map(|i| {
                let p = write_image(dir.path(), &format!("{i}.png"), 2);
                example(p, &"word ".repeat(i + 1), Some("ok"))
            })
            .collect();

        let batch = collator().collate_host(&examples).unwrap();
        for (id, label) in batch.input_ids.iter().zip(&batch.labels) {
            if *label != IGNORE_INDEX {
                assert_eq!(label, id);
            } else {
                assert!([PAD as i32, IMAGE as i32, RESERVED_IMAGE_TOKEN_ID as i32].contains(id));
            }
        }
    }

    #[test]
    fn test_missing_image_fails_the_batch() {
        let dir = tempfile::tempdir().unwrap();
        let good = write_image(dir.path(), "good.png", 2);
        let result = collator().collate_host(&[
            example(good, "x", None),
            example(dir.path().join("gone.png"), "y", None),
        ]);
        match result {
            Err(CollateError::ImageLoad { path, .. }) => assert!(path.ends_with("gone.png")),
            other => panic!("expected ImageLoad, got {other:?}"),
        }
    }

    #[test]
    fn test_mismatched_image_shapes_fail() {
        let dir = tempfile::tempdir().unwrap();
        let small = write_image(dir.path(), "small.png", 2);
        let large = write_image(dir.path(), "large.png", 3);
        let result = collator().collate_host(&[example(small, "x", None), example(large, "y", None)]);
        assert!(matches!(result, Err(CollateError::ShapeMismatch { .. })));
    }

    #[test]
    fn test_tensor_batch_dimensions() {
        let dir = tempfile::tempdir().unwrap();
        let examples: Vec<_> = (0..2)
            .map(|i| example(write_image(dir.path(), &format!("{i}.png"), 4), "a b", None))
            .collect();

        let batch = collator().collate(&examples).unwrap();
        assert_eq!(batch.pixel_values.dims(), [2, 3, 4, 4]);
        assert_eq!(batch.input_ids.dims(), [2, 3]);
        assert_eq!(batch.attention_mask.dims(), [2, 3]);
        assert_eq!(batch.labels.dims(), [2, 3]);

        let labels: Vec<i64> = batch.labels.into_data().convert::<i64>().to_vec().unwrap();
        assert_eq!(labels, vec![-100, 11, 11, -100, 11, 11]);
    }

    #[test]
    fn test_batcher_trait_matches_collate() {
        let dir = tempfile::tempdir().unwrap();
        let ex = example(write_image(dir.path(), "a.png", 2), "a", Some("b"));
        let batch = Batcher::batch(&collator(), vec![ex]);
        assert_eq!(batch.input_ids.dims(), [1, 3]);
    }
}
