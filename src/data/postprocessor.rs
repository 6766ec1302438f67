// ============================================================
// Layer 4 — Response Postprocessor
// ============================================================
// Parses a generated model response back into the three label
// indices.
//
//   1. Strict path: find JSON objects in the text, in order,
//      and take the first one that parses AND has all three of
//      tissue_type / zoom_level / focus_quality. Each value is
//      an "index: label" string; its leading integer is the
//      answer ("2: bone" → 2, "bone" → -1).
//
//   2. Lenient path (only if no JSON object qualified): look
//      for the class names themselves in free text, e.g.
//      "... shows bone tissue at 10x magnification ..."
//
// Model output is untrusted, so nothing here returns an error:
// a field that cannot be recovered is -1.
//
// full_match = true switches to a stricter mode: the whole
// response must be exactly one JSON object with all three keys,
// there is no free-text fallback, and indices outside the
// label space become -1.
//
// Reference: regex crate documentation
//            serde_json documentation (untyped Value)

use anyhow::{Context, Result};
use regex::Regex;
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::domain::prediction::{LabelPrediction, UNPARSEABLE};
use crate::domain::record::{Focus, Magnification};
use crate::domain::vocabulary::LabelSpace;

/// Balanced-brace objects with at most one level of nesting
const JSON_OBJECT_PATTERN: &str = r"\{[^{}]*(?:\{[^{}]*\}[^{}]*)*\}";

/// "10x", "40 x", "4X"
const MAGNIFICATION_PATTERN: &str = r"(?i)\b(\d+)\s*x\b";

const REQUIRED_KEYS: [&str; 3] = ["tissue_type", "zoom_level", "focus_quality"];

/// Phrases meaning out of focus. Checked before the in-focus
/// phrases because "unfocused" contains "focused".
const UNFOCUSED_PHRASES: [&str; 5] = ["unfocused", "out of focus", "out-of-focus", "not focused", "blurry"];
const FOCUSED_PHRASES: [&str; 3] = ["focused", "in focus", "sharp"];

pub struct ResponseParser {
    labels:        Arc<LabelSpace>,
    json_object:   Regex,
    magnification: Regex,
}

impl ResponseParser {
    pub fn new(labels: Arc<LabelSpace>) -> Result<Self> {
        Ok(Self {
            labels,
            json_object:   Regex::new(JSON_OBJECT_PATTERN).context("Invalid JSON object pattern")?,
            magnification: Regex::new(MAGNIFICATION_PATTERN).context("Invalid magnification pattern")?,
        })
    }

    /// Parse one generated response. Never fails.
    pub fn parse(&self, response: &str, full_match: bool) -> LabelPrediction {
        let text = response.trim();
        if full_match {
            return self.parse_full_match(text);
        }

        for candidate in self.json_object.find_iter(text) {
            if let Some(map) = labelled_object(candidate.as_str()) {
                return prediction_from_map(&map);
            }
        }

        tracing::debug!("No JSON answer in response, falling back to text heuristics");
        LabelPrediction::new(
            self.tissue_from_text(text),
            self.zoom_from_text(text),
            focus_from_text(text),
        )
    }

    fn parse_full_match(&self, text: &str) -> LabelPrediction {
        let Some(map) = labelled_object(text) else {
            return LabelPrediction::unparseable();
        };
        let p = prediction_from_map(&map);
        let counts = self.labels.num_classes();
        LabelPrediction::new(
            within(p.tissue_type, counts.tissue),
            within(p.zoom_level, counts.zoom),
            within(p.focus_quality, counts.focus),
        )
    }

    /// Index of the tissue name that occurs earliest as a whole word
    fn tissue_from_text(&self, text: &str) -> i64 {
        let lower = text.to_lowercase();
        self.labels
            .tissue
            .iter()
            .filter_map(|(i, name)| find_word(&lower, name).map(|pos| (pos, std::cmp::Reverse(name.len()), i)))
            .min()
            .map(|(_, _, i)| i as i64)
            .unwrap_or(UNPARSEABLE)
    }

    /// Index of the first "<n>x" mention that is a known zoom level
    fn zoom_from_text(&self, text: &str) -> i64 {
        self.magnification
            .captures_iter(text)
            .filter_map(|c| c.get(1)?.as_str().parse::<u32>().ok())
            .filter_map(Magnification::from_value)
            .find_map(|m| self.labels.zoom.index_of(&m))
            .map(|i| i as i64)
            .unwrap_or(UNPARSEABLE)
    }
}

// ─── Helpers ──────────────────────────────────────────────────────────────────
/// Parse `s` as a JSON object holding every required key
fn labelled_object(s: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(s) {
        Ok(Value::Object(map)) if REQUIRED_KEYS.iter().all(|k| map.contains_key(*k)) => Some(map),
        _ => None,
    }
}

fn prediction_from_map(map: &Map<String, Value>) -> LabelPrediction {
    LabelPrediction::new(
        extract_index(&map["tissue_type"]),
        extract_index(&map["zoom_level"]),
        extract_index(&map["focus_quality"]),
    )
}

/// Leading integer of an "index: label" value; bare integers
/// are accepted too. Anything else is -1.
pub fn extract_index(value: &Value) -> i64 {
    match value {
        Value::Number(n) => n.as_i64().unwrap_or(UNPARSEABLE),
        Value::String(s) => s
            .split(':')
            .next()
            .and_then(|head| head.trim().parse::<i64>().ok())
            .unwrap_or(UNPARSEABLE),
        _ => UNPARSEABLE,
    }
}

fn within(idx: i64, len: usize) -> i64 {
    if (0..len as i64).contains(&idx) { idx } else { UNPARSEABLE }
}

fn focus_from_text(text: &str) -> i64 {
    let lower = text.to_lowercase();
    if UNFOCUSED_PHRASES.iter().any(|p| lower.contains(p)) {
        Focus::Unfocused.index() as i64
    } else if FOCUSED_PHRASES.iter().any(|p| lower.contains(p)) {
        Focus::Focused.index() as i64
    } else {
        UNPARSEABLE
    }
}

/// Byte position of the first whole-word occurrence of `word`
fn find_word(haystack: &str, word: &str) -> Option<usize> {
    if word.is_empty() {
        return None;
    }
    haystack.match_indices(word).map(|(pos, _)| pos).find(|&pos| {
        let before = haystack[..pos].chars().next_back();
        let after  = haystack[pos + word.len()..].chars().next();
        !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
    })
}
