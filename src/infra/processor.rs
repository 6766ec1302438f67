// ============================================================
// Layer 6 — Vision-Text Processor
// ============================================================
// The concrete MultimodalProcessor used by the collator. It
// bundles three things a vision-language checkpoint ships with:
//
//   tokenizer.json         → HuggingFace `tokenizers` Tokenizer
//   chat template (Jinja)  → rendered with minijinja
//   image preprocessing    → resize, rescale, normalise (image)
//
// Image tokens:
//   The chat template emits a single placeholder token (boi,
//   "begin of image") where the image goes. Before tokenizing,
//   each placeholder is expanded into the full image span:
//
//     <start_of_image>
//       → "\n\n<start_of_image>" + <image_soft_token> × N + "<end_of_image>\n\n"
//
//   so the model sees N soft-token slots for the image features.
//
// All special-token ids are resolved once at construction; a
// tokenizer that lacks one of them is rejected up front.
//
// Reference: HuggingFace tokenizers documentation
//            minijinja documentation

use anyhow::{anyhow, Context, Result};
use image::{imageops::FilterType, RgbImage};
use minijinja::{context, Environment, Value};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};
use tokenizers::Tokenizer;

use crate::domain::example::ChatTurn;
use crate::domain::traits::{EncodedPair, MultimodalProcessor};

/// Gemma-3 style template over the multimodal message layout
pub const DEFAULT_CHAT_TEMPLATE: &str = r#"{{ bos_token }}
{%- for message in messages -%}
<start_of_turn>{{ 'model' if message.role == 'assistant' else message.role }}
{% for part in message.content -%}
{%- if part.type == 'image' -%}{{ boi_token }}
{%- elif part.type == 'text' -%}{{ part.text | trim }}
{%- endif -%}
{%- endfor %}<end_of_turn>
{% endfor -%}
{%- if add_generation_prompt -%}
<start_of_turn>model
{% endif -%}"#;

// ─── ProcessorConfig ──────────────────────────────────────────────────────────
/// Loaded from a JSON file; every field has a default matching
/// a Gemma-3 vision checkpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessorConfig {
    pub tokenizer_path:     PathBuf,
    /// Jinja template file; the built-in template when absent
    pub chat_template_path: Option<PathBuf>,
    pub bos_token:          String,
    pub pad_token:          String,
    /// Image placeholder emitted by the chat template
    pub boi_token:          String,
    pub eoi_token:          String,
    /// Soft token repeated once per image feature slot
    pub image_token:        String,
    pub image_seq_length:   usize,
    /// Images are resized to image_size × image_size
    pub image_size:         u32,
    pub image_mean:         [f32; 3],
    pub image_std:          [f32; 3],
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            tokenizer_path:     PathBuf::from("model/tokenizer.json"),
            chat_template_path: None,
            bos_token:          "<bos>".to_string(),
            pad_token:          "<pad>".to_string(),
            boi_token:          "<start_of_image>".to_string(),
            eoi_token:          "<end_of_image>".to_string(),
            image_token:        "<image_soft_token>".to_string(),
            image_seq_length:   256,
            image_size:         896,
            image_mean:         [0.5; 3],
            image_std:          [0.5; 3],
        }
    }
}

impl ProcessorConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path)
            .with_context(|| format!("Cannot read processor config '{}'", path.display()))?;
        serde_json::from_str(&json)
            .with_context(|| format!("Invalid processor config '{}'", path.display()))
    }
}

// ─── VisionTextProcessor ──────────────────────────────────────────────────────
pub struct VisionTextProcessor {
    tokenizer:       Tokenizer,
    chat_template:   String,
    config:          ProcessorConfig,
    pad_id:          u32,
    boi_id:          u32,
    /// Precomputed replacement for each boi placeholder
    image_expansion: String,
}

impl VisionTextProcessor {
    /// Load the tokenizer (and template, if configured) from disk.
    pub fn from_config(config: ProcessorConfig) -> Result<Self> {
        let tokenizer = Tokenizer::from_file(&config.tokenizer_path).map_err(|e| {
            anyhow!("Cannot load tokenizer from '{}': {}", config.tokenizer_path.display(), e)
        })?;

        let chat_template = match &config.chat_template_path {
            Some(path) => fs::read_to_string(path)
                .with_context(|| format!("Cannot read chat template '{}'", path.display()))?,
            None => DEFAULT_CHAT_TEMPLATE.to_string(),
        };

        tracing::info!("Loaded tokenizer from '{}'", config.tokenizer_path.display());
        Self::from_parts(tokenizer, chat_template, config)
    }

    pub fn from_parts(
        tokenizer:     Tokenizer,
        chat_template: impl Into<String>,
        config:        ProcessorConfig,
    ) -> Result<Self> {
        let token_id = |token: &str| {
            tokenizer
                .token_to_id(token)
                .with_context(|| format!("Tokenizer has no id for special token '{token}'"))
        };
        let pad_id = token_id(&config.pad_token)?;
        let boi_id = token_id(&config.boi_token)?;
        token_id(&config.eoi_token)?;
        token_id(&config.image_token)?;

        let image_expansion = format!(
            "\n\n{}{}{}\n\n",
            config.boi_token,
            config.image_token.repeat(config.image_seq_length),
            config.eoi_token,
        );

        Ok(Self {
            tokenizer,
            chat_template: chat_template.into(),
            config,
            pad_id,
            boi_id,
            image_expansion,
        })
    }

    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    /// Resize, rescale to [0, 1], normalise; channel-first layout.
    pub fn preprocess_image(&self, image: &RgbImage) -> (Vec<f32>, [usize; 3]) {
        let size    = self.config.image_size;
        let resized = image::imageops::resize(image, size, size, FilterType::Triangle);
        let (w, h)  = resized.dimensions();
        let (w, h)  = (w as usize, h as usize);

        let mut pixels = vec![0.0f32; 3 * h * w];
        for (x, y, px) in resized.enumerate_pixels() {
            let (x, y) = (x as usize, y as usize);
            for c in 0..3 {
                let v = px[c] as f32 / 255.0;
                pixels[c * h * w + y * w + x] = (v - self.config.image_mean[c]) / self.config.image_std[c];
            }
        }
        (pixels, [3, h, w])
    }
}

impl MultimodalProcessor for VisionTextProcessor {
    fn apply_chat_template(&self, messages: &[ChatTurn], add_generation_prompt: bool) -> Result<String> {
        let mut env = Environment::new();
        env.add_template("chat", &self.chat_template)
            .map_err(|e| anyhow!("Failed to add chat template: {}", e))?;
        let tmpl = env
            .get_template("chat")
            .map_err(|e| anyhow!("Failed to get chat template: {}", e))?;

        tmpl.render(context! {
            messages              => Value::from_serialize(messages),
            add_generation_prompt => add_generation_prompt,
            bos_token             => self.config.bos_token.clone(),
            boi_token             => self.config.boi_token.clone(),
        })
        .map_err(|e| anyhow!("Failed to render chat template: {}", e))
    }

    fn encode_pair(&self, text: &str, image: &RgbImage) -> Result<EncodedPair> {
        let expanded = text.replace(&self.config.boi_token, &self.image_expansion);
        let encoding = self
            .tokenizer
            .encode(expanded.as_str(), false)
            .map_err(|e| anyhow!("Tokenisation error: {e}"))?;

        let (pixel_values, image_shape) = self.preprocess_image(image);

        Ok(EncodedPair {
            input_ids:      encoding.get_ids().to_vec(),
            attention_mask: encoding.get_attention_mask().to_vec(),
            pixel_values,
            image_shape,
        })
    }

    fn pad_token_id(&self) -> u32 {
        self.pad_id
    }

    fn image_token_id(&self) -> u32 {
        self.boi_id
    }
}


// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::domain::example::ContentPart;
    use image::Rgb;

    fn conversation() -> Vec<ChatTurn> {
        vec![
            ChatTurn::user(vec![ContentPart::Image, ContentPart::text("  What tissue?  ")]),
            ChatTurn::assistant("bone tissue"),
        ]
    }

    #[test]
    fn test_renders_gemma_turns() {
        let p = processor(2, 4);
        let text = p.apply_chat_template(&conversation(), false).unwrap();
        assert_eq!(
            text,
            "<bos><start_of_turn>user\n<start_of_image>What tissue?<end_of_turn>\n\
             <start_of_turn>model\nbone tissue<end_of_turn>\n"
        );
    }

    #[test]
    fn test_generation_prompt_is_appended() {
        let p = processor(2, 4);
        let text = p.apply_chat_template(&conversation()[..1], true).unwrap();
        assert!(text.ends_with("<start_of_turn>model\n"));
    }

    #[test]
    fn test_encode_expands_image_placeholder() {
        let p = processor(3, 4);
        let image = RgbImage::from_pixel(7, 5, Rgb([255, 255, 255]));
        let pair = p.encode_pair("<bos><start_of_image>bone", &image).unwrap();

        assert_eq!(
            pair.input_ids,
            vec![BOS_ID, BOI_ID, SOFT_TOKEN_ID, SOFT_TOKEN_ID, SOFT_TOKEN_ID, EOI_ID, 12]
        );
        assert_eq!(pair.attention_mask, vec![1; 7]);
    }

    #[test]
    fn test_image_is_resized_and_normalised() {
        let p = processor(1, 4);
        let image = RgbImage::from_pixel(9, 3, Rgb([255, 0, 255]));
        let (pixels, shape) = p.preprocess_image(&image);

        assert_eq!(shape, [3, 4, 4]);
        assert_eq!(pixels.len(), 48);
        // mean 0.5, std 0.5: 255 → 1.0, 0 → -1.0
        assert!(pixels[..16].iter().all(|v| (v - 1.0).abs() < 1e-5));
        assert!(pixels[16..32].iter().all(|v| (v + 1.0).abs() < 1e-5));
        assert!(pixels[32..].iter().all(|v| (v - 1.0).abs() < 1e-5));
    }

    #[test]
    fn test_special_token_ids() {
        let p = processor(1, 4);
        assert_eq!(p.pad_token_id(), PAD_ID);
        assert_eq!(p.image_token_id(), BOI_ID);
    }

    #[test]
    fn test_missing_special_token_is_rejected() {
        let config = ProcessorConfig { pad_token: "[PAD]".to_string(), ..ProcessorConfig::default() };
        assert!(VisionTextProcessor::from_parts(tokenizer(), DEFAULT_CHAT_TEMPLATE, config).is_err());
    }

    #[test]
    fn test_config_defaults_fill_missing_fields() {
        let dir  = tempfile::tempdir().unwrap();
        let path = dir.path().join("processor.json");
        fs::write(&path, r#"{"tokenizer_path": "tok.json", "image_size": 448}"#).unwrap();

        let cfg = ProcessorConfig::load(&path).unwrap();
        assert_eq!(cfg.tokenizer_path, PathBuf::from("tok.json"));
        assert_eq!(cfg.image_size, 448);
        assert_eq!(cfg.image_seq_length, 256);
        assert_eq!(cfg.boi_token, "<start_of_image>");
    }
}
