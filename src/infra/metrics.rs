// ============================================================
// Layer 6 — Evaluation Metrics
// ============================================================
// Scores parsed predictions against ground-truth label indices
// and records the result to a CSV file.
//
// Metrics per evaluation run:
//   - evaluated:    number of predictions scored
//   - tissue_acc:   fraction with the correct tissue type index
//   - zoom_acc:     fraction with the correct zoom index
//   - focus_acc:    fraction with the correct focus index
//   - exact_match:  fraction with all three fields correct
//   - unparseable:  predictions with at least one -1 field
//
// A -1 field never equals a ground-truth index, so unparseable
// fields simply count as wrong in the accuracies.
//
// Output file: <artifacts>/metrics.csv
//
// Example CSV output:
//   run,evaluated,tissue_acc,zoom_acc,focus_acc,exact_match,unparseable
//   predictions.jsonl,120,0.916667,0.975000,0.941667,0.858333,3
//
// Reference: Rust Book §12 (I/O and File Handling)

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

use crate::domain::prediction::LabelPrediction;

/// Ground-truth indices of one example
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LabelTruth {
    pub type_idx:  usize,
    pub zoom_idx:  usize,
    pub focus_idx: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvalMetrics {
    pub evaluated:   usize,
    pub tissue_acc:  f64,
    pub zoom_acc:    f64,
    pub focus_acc:   f64,
    pub exact_match: f64,
    pub unparseable: usize,
}

impl EvalMetrics {
    pub fn score(pairs: &[(LabelPrediction, LabelTruth)]) -> Self {
        if pairs.is_empty() {
            return Self::default();
        }

        let hit = |pred: i64, truth: usize| pred == truth as i64;
        let (mut tissue, mut zoom, mut focus, mut exact, mut unparseable) = (0, 0, 0, 0, 0);

        for (pred, truth) in pairs {
            let t = hit(pred.tissue_type, truth.type_idx);
            let z = hit(pred.zoom_level, truth.zoom_idx);
            let f = hit(pred.focus_quality, truth.focus_idx);
            tissue += t as usize;
            zoom   += z as usize;
            focus  += f as usize;
            exact  += (t && z && f) as usize;
            unparseable += pred.has_unparseable() as usize;
        }

        let n = pairs.len() as f64;
        Self {
            evaluated:   pairs.len(),
            tissue_acc:  tissue as f64 / n,
            zoom_acc:    zoom as f64 / n,
            focus_acc:   focus as f64 / n,
            exact_match: exact as f64 / n,
            unparseable,
        }
    }
}

/// Appends evaluation rows to a CSV file.
pub struct MetricsLogger {
    csv_path: PathBuf,
}

impl MetricsLogger {
    /// Writes the CSV header if the file doesn't exist yet.
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;

        let csv_path = dir.join("metrics.csv");
        if !csv_path.exists() {
            let mut f = fs::File::create(&csv_path)?;
            writeln!(f, "run,evaluated,tissue_acc,zoom_acc,focus_acc,exact_match,unparseable")?;
            tracing::debug!("Created metrics CSV: '{}'", csv_path.display());
        }

        Ok(Self { csv_path })
    }

    pub fn log(&self, run: &str, m: &EvalMetrics) -> Result<()> {
        let mut f = OpenOptions::new().append(true).open(&self.csv_path)?;

        writeln!(
            f,
            "{},{},{:.6},{:.6},{:.6},{:.6},{}",
            run, m.evaluated, m.tissue_acc, m.zoom_acc, m.focus_acc, m.exact_match, m.unparseable,
        )?;

        tracing::debug!("Logged metrics for '{}': exact_match={:.4}", run, m.exact_match);
        Ok(())
    }

    pub fn csv_path(&self) -> &Path {
        &self.csv_path
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    fn truth(type_idx: usize, zoom_idx: usize, focus_idx: usize) -> LabelTruth {
        LabelTruth { type_idx, zoom_idx, focus_idx }
    }

    #[test]
    fn test_score_counts_fields_independently() {
        let pairs = vec![
            (LabelPrediction::new(2, 1, 0), truth(2, 1, 0)),
            (LabelPrediction::new(2, 0, 0), truth(2, 1, 0)),
            (LabelPrediction::new(-1, 1, -1), truth(0, 1, 1)),
            (LabelPrediction::unparseable(), truth(0, 0, 0)),
        ];
        let m = EvalMetrics::score(&pairs);

        assert_eq!(m.evaluated, 4);
        assert!((m.tissue_acc - 0.5).abs() < 1e-9);
        assert!((m.zoom_acc - 0.5).abs() < 1e-9);
        assert!((m.focus_acc - 0.5).abs() < 1e-9);
        assert!((m.exact_match - 0.25).abs() < 1e-9);
        assert_eq!(m.unparseable, 2);
    }

    #[test]
    fn test_empty_scores_zero() {
        assert_eq!(EvalMetrics::score(&[]), EvalMetrics::default());
    }

    #[test]
    fn test_logger_appends_rows() {
        let dir = tempfile::tempdir().unwrap();
        let logger = MetricsLogger::new(dir.path()).unwrap();
        logger.log("a", &EvalMetrics::default()).unwrap();
        logger.log("b", &EvalMetrics::default()).unwrap();

        // reopening keeps the existing header and rows
        let logger = MetricsLogger::new(dir.path()).unwrap();
        let csv = fs::read_to_string(logger.csv_path()).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("run,evaluated"));
        assert_eq!(lines[2], "b,0,0.000000,0.000000,0.000000,0.000000,0");
    }
}
