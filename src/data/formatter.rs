// ============================================================
// Layer 4 — Example Formatter
// ============================================================
// Converts an IndexedRecord into a chat-style example.
//
//   Train mode:
//     user:      [image] + prompt
//     assistant: target answer, one of two surface forms:
//                  JSON             (probability 0.7 by default)
//                  natural language (the rest)
//
//   Eval mode:
//     user:      [image] + prompt      (no assistant turn; the
//                                       model generates it)
//
// Both target forms encode the same three indices; alternating
// them diversifies output style without changing the labels.
//
// The prompt lists every currently valid (index, name) pair for
// each label dimension. It is generated from the LabelSpace, so
// the answer space the model is shown always matches the classes
// actually present in the corpus.
//
// The JSON/natural-language coin flip draws from an injected,
// seeded generator so formatting is reproducible.
//
// Reference: Rust Book §10 (Generics), rand crate documentation

use anyhow::{bail, Context, Result};
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::sync::Arc;

use crate::domain::example::{ChatTurn, ContentPart, FormattedExample};
use crate::domain::record::{Focus, IndexedRecord, Magnification};
use crate::domain::vocabulary::LabelSpace;

/// Probability of the JSON target form in training mode
pub const DEFAULT_JSON_PROBABILITY: f64 = 0.7;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatMode {
    /// Prompt plus assistant target
    Train,
    /// Prompt only
    Eval,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseStyle {
    Json,
    NaturalLanguage,
}

// ─── Prompt ───────────────────────────────────────────────────────────────────
/// Build the classification prompt from the current label space.
pub fn build_prompt(labels: &LabelSpace) -> String {
    format!(
        "Analyze this histopathology image and provide the following information:\n\
         \n\
         Tissue Type:\n\
         {}\n\
         \n\
         Zoom Level:\n\
         {}\n\
         \n\
         Focus Quality:\n\
         {}\n\
         \n\
         Please respond in the following JSON format:\n\
         {{\n\
         \"tissue_type\": \"X: tissue_name\",\n\
         \"zoom_level\": \"Y: Zx\",\n\
         \"focus_quality\": \"Z: focus_status\"\n\
         }}",
        labels.tissue_options(),
        labels.zoom_options(),
        labels.focus_options(),
    )
}

// ─── Target Templates ─────────────────────────────────────────────────────────
/// Resolved ground truth for one example: indices plus display names
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target<'a> {
    pub type_idx:    usize,
    pub tissue_name: &'a str,
    pub zoom_idx:    usize,
    pub zoom:        Magnification,
    pub focus:       Focus,
}

/// JSON target, keys in the same order as the prompt
pub fn json_response(t: &Target<'_>) -> String {
    format!(
        "{{\n    \"tissue_type\": \"{}: {}\",\n    \"zoom_level\": \"{}: {}\",\n    \"focus_quality\": \"{}: {}\"\n}}",
        t.type_idx,
        t.tissue_name,
        t.zoom_idx,
        t.zoom,
        t.focus.index(),
        t.focus.status(),
    )
}

/// One-sentence natural-language target
pub fn natural_response(t: &Target<'_>) -> String {
    format!(
        "This histopathology image shows {} tissue at {} magnification. The image appears to be {}.",
        t.tissue_name,
        t.zoom,
        t.focus.status(),
    )
}

// ─── ExampleFormatter ─────────────────────────────────────────────────────────
pub struct ExampleFormatter<R: Rng = StdRng> {
    labels:           Arc<LabelSpace>,
    /// Rendered once: the label space is frozen for the formatter's lifetime
    prompt:           String,
    json_probability: f64,
    rng:              R,
}

impl ExampleFormatter<StdRng> {
    /// Formatter with the default 70/30 mix and a seeded StdRng
    pub fn seeded(labels: Arc<LabelSpace>, seed: u64) -> Result<Self> {
        Self::with_rng(labels, StdRng::seed_from_u64(seed), DEFAULT_JSON_PROBABILITY)
    }
}

impl<R: Rng> ExampleFormatter<R> {
    pub fn with_rng(labels: Arc<LabelSpace>, rng: R, json_probability: f64) -> Result<Self> {
        if !(0.0..=1.0).contains(&json_probability) {
            bail!("JSON response probability must be within [0, 1], got {json_probability}");
        }
        let prompt = build_prompt(&labels);
        Ok(Self { labels, prompt, json_probability, rng })
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn labels(&self) -> &LabelSpace {
        &self.labels
    }

    /// Format one record. Fails only if the record's indices do not
    /// belong to this formatter's label space.
    pub fn format(&mut self, record: &IndexedRecord, mode: FormatMode) -> Result<FormattedExample> {
        let user = ChatTurn::user(vec![ContentPart::Image, ContentPart::text(self.prompt.clone())]);

        let mut messages = vec![user];
        if mode == FormatMode::Train {
            let style = self.draw_style();
            messages.push(ChatTurn::assistant(self.render_target(record, style)?));
        }

        Ok(FormattedExample {
            image_path: record.image_path.clone(),
            focus_idx:  record.focus_idx,
            zoom_idx:   record.zoom_idx,
            type_idx:   record.type_idx,
            messages,
        })
    }

    pub fn format_all(&mut self, records: &[IndexedRecord], mode: FormatMode) -> Result<Vec<FormattedExample>> {
        records.iter().map(|r| self.format(r, mode)).collect()
    }

    /// Render the target text for `record` in the given style.
    pub fn render_target(&self, record: &IndexedRecord, style: ResponseStyle) -> Result<String> {
        let tissue_name = self
            .labels
            .tissue
            .value_at(record.type_idx)
            .with_context(|| format!("Tissue index {} out of range", record.type_idx))?;
        let zoom = *self
            .labels
            .zoom
            .value_at(record.zoom_idx)
            .with_context(|| format!("Zoom index {} out of range", record.zoom_idx))?;
        let focus = Focus::from_index(record.focus_idx)
            .with_context(|| format!("Focus index {} out of range", record.focus_idx))?;

        let target = Target {
            type_idx: record.type_idx,
            tissue_name,
            zoom_idx: record.zoom_idx,
            zoom,
            focus,
        };

        Ok(match style {
            ResponseStyle::Json            => json_response(&target),
            ResponseStyle::NaturalLanguage => natural_response(&target),
        })
    }

    fn draw_style(&mut self) -> ResponseStyle {
        if self.rng.gen_bool(self.json_probability) {
            ResponseStyle::Json
        } else {
            ResponseStyle::NaturalLanguage
        }
    }
}
