// ============================================================
// Layer 2 — EvaluateUseCase
// ============================================================
// Scores generated responses against the ground truth of a
// prepared dataset:
//
//   Step 1: Load the label space and examples    (Layer 6 - infra)
//   Step 2: Read predictions JSONL               (Layer 6 - infra)
//   Step 3: Parse each response into indices     (Layer 4 - data)
//   Step 4: Score and append to metrics.csv      (Layer 6 - infra)
//
// A prediction line looks like:
//   {"image_path": "images/bone-s1-10x-focus.jpg",
//    "generated_text": "{\"tissue_type\": \"1: bone\", ...}"}
//
// Predictions are matched to examples by image path. Lines for
// images that are not part of the prepared dataset are counted
// and skipped.
//
// Reference: Rust Book §8 (Hash Maps)

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Arc,
};

use crate::application::prepare_use_case::PreparedDataset;
use crate::data::postprocessor::ResponseParser;
use crate::domain::prediction::LabelPrediction;
use crate::infra::{
    artifact_store::{read_jsonl, ArtifactStore},
    metrics::{EvalMetrics, LabelTruth, MetricsLogger},
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluateConfig {
    pub artifacts_dir: String,
    pub predictions:   String,
    pub full_match:    bool,
}

impl Default for EvaluateConfig {
    fn default() -> Self {
        Self {
            artifacts_dir: "artifacts".to_string(),
            predictions:   "predictions.jsonl".to_string(),
            full_match:    false,
        }
    }
}

/// One line of a predictions file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRecord {
    pub image_path:     PathBuf,
    pub generated_text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvalReport {
    pub metrics:   EvalMetrics,
    /// Predictions whose image is not in the prepared dataset
    pub unmatched: usize,
}

pub struct EvaluateUseCase {
    store:   ArtifactStore,
    dataset: PreparedDataset,
    parser:  ResponseParser,
}

impl EvaluateUseCase {
    /// Load the prepared dataset saved in `artifacts_dir`.
    pub fn open(artifacts_dir: impl Into<PathBuf>) -> Result<Self> {
        let store   = ArtifactStore::open(artifacts_dir)?;
        let dataset = PreparedDataset::load(&store)?;
        let parser  = ResponseParser::new(Arc::clone(dataset.labels()))?;
        Ok(Self { store, dataset, parser })
    }

    /// Parse a single response with the saved label space.
    pub fn parse(&self, text: &str, full_match: bool) -> LabelPrediction {
        self.parser.parse(text, full_match)
    }

    /// Score a predictions file and log the result to metrics.csv.
    pub fn evaluate(&self, predictions: &Path, full_match: bool) -> Result<EvalReport> {
        let truths: HashMap<&Path, LabelTruth> = self
            .dataset
            .validation()
            .examples()
            .iter()
            .chain(self.dataset.train().examples())
            .map(|ex| {
                let truth = LabelTruth {
                    type_idx:  ex.type_idx,
                    zoom_idx:  ex.zoom_idx,
                    focus_idx: ex.focus_idx,
                };
                (ex.image_path.as_path(), truth)
            })
            .collect();

        let records: Vec<PredictionRecord> = read_jsonl(predictions)?;
        tracing::info!("Scoring {} predictions from '{}'", records.len(), predictions.display());

        let mut pairs     = Vec::with_capacity(records.len());
        let mut unmatched = 0;
        for rec in &records {
            let Some(truth) = truths.get(rec.image_path.as_path()) else {
                tracing::warn!("No prepared example for '{}'", rec.image_path.display());
                unmatched += 1;
                continue;
            };
            let pred = self.parser.parse(&rec.generated_text, full_match);
            tracing::debug!("{} → {:?}", rec.image_path.display(), pred);
            pairs.push((pred, *truth));
        }

        let metrics = EvalMetrics::score(&pairs);
        let run = predictions
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| predictions.display().to_string());
        MetricsLogger::new(self.store.dir())?.log(&run, &metrics)?;

        tracing::info!(
            "Exact match {:.4} over {} predictions ({} unparseable, {} unmatched)",
            metrics.exact_match,
            metrics.evaluated,
            metrics.unparseable,
            unmatched,
        );
        Ok(EvalReport { metrics, unmatched })
    }

    pub fn execute(config: &EvaluateConfig) -> Result<EvalReport> {
        Self::open(&config.artifacts_dir)?.evaluate(Path::new(&config.predictions), config.full_match)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::prepare_use_case::{tests as prepare, PrepareUseCase};
    use crate::data::formatter::{json_response, natural_response, Target};
    use crate::domain::example::FormattedExample;
    use crate::domain::record::Focus;
    use std::{fs, io::Write};

    fn target_for<'a>(ds: &'a PreparedDataset, ex: &FormattedExample) -> Target<'a> {
        Target {
            type_idx:    ex.type_idx,
            tissue_name: ds.labels().tissue.value_at(ex.type_idx).unwrap(),
            zoom_idx:    ex.zoom_idx,
            zoom:        *ds.labels().zoom.value_at(ex.zoom_idx).unwrap(),
            focus:       Focus::from_index(ex.focus_idx).unwrap(),
        }
    }

    fn write_predictions(path: &Path, lines: &[PredictionRecord]) {
        let mut f = fs::File::create(path).unwrap();
        for line in lines {
            writeln!(f, "{}", serde_json::to_string(line).unwrap()).unwrap();
        }
    }

    #[test]
    fn test_evaluate_scores_and_logs() {
        let images = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        prepare::write_corpus(images.path());
        PrepareUseCase::new(prepare::config(images.path(), output.path()))
            .unwrap()
            .execute()
            .unwrap();

        let use_case = EvaluateUseCase::open(output.path()).unwrap();
        let val = use_case.dataset.validation().examples().to_vec();
        assert_eq!(val.len(), 2);

        let predictions = output.path().join("predictions.jsonl");
        write_predictions(&predictions, &[
            PredictionRecord {
                image_path:     val[0].image_path.clone(),
                generated_text: json_response(&target_for(&use_case.dataset, &val[0])),
            },
            PredictionRecord {
                image_path:     val[1].image_path.clone(),
                generated_text: natural_response(&target_for(&use_case.dataset, &val[1])),
            },
            PredictionRecord {
                image_path:     PathBuf::from("elsewhere.jpg"),
                generated_text: "nothing".to_string(),
            },
        ]);

        let report = use_case.evaluate(&predictions, false).unwrap();
        assert_eq!(report.unmatched, 1);
        assert_eq!(report.metrics.evaluated, 2);
        assert!((report.metrics.exact_match - 1.0).abs() < 1e-9);

        // strict mode rejects the free-text answer
        let strict = use_case.evaluate(&predictions, true).unwrap();
        assert!((strict.metrics.exact_match - 0.5).abs() < 1e-9);
        assert_eq!(strict.metrics.unparseable, 1);

        let csv = fs::read_to_string(output.path().join("metrics.csv")).unwrap();
        assert_eq!(csv.lines().count(), 3);
        assert!(csv.lines().nth(1).unwrap().starts_with("predictions.jsonl,2,"));
    }

    #[test]
    fn test_open_without_prepare_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(EvaluateUseCase::open(dir.path()).is_err());
    }
}
