// ============================================================
// Layer 3 — Parsed Prediction
// ============================================================
// The label triple recovered from a generated model response.
// Each field is a class index, or -1 when that field could not
// be recovered. Model output is untrusted, so "unparseable" is
// a value here rather than an error.

use serde::{Deserialize, Serialize};

/// Sentinel for a field that could not be parsed
pub const UNPARSEABLE: i64 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelPrediction {
    pub tissue_type:   i64,
    pub zoom_level:    i64,
    pub focus_quality: i64,
}

impl LabelPrediction {
    pub fn new(tissue_type: i64, zoom_level: i64, focus_quality: i64) -> Self {
        Self { tissue_type, zoom_level, focus_quality }
    }

    pub fn unparseable() -> Self {
        Self::new(UNPARSEABLE, UNPARSEABLE, UNPARSEABLE)
    }

    /// True when at least one field is the -1 sentinel
    pub fn has_unparseable(&self) -> bool {
        [self.tissue_type, self.zoom_level, self.focus_quality]
            .contains(&UNPARSEABLE)
    }
}

impl Default for LabelPrediction {
    fn default() -> Self {
        Self::unparseable()
    }
}
