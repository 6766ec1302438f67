// ============================================================
// Layer 2 — PrepareUseCase
// ============================================================
// Orchestrates dataset preparation in order:
//
//   Step 1: Scan the image directory        (Layer 4 - data)
//   Step 2: Build vocabularies, index       (Layer 4 - data)
//   Step 3: Train / validation split        (Layer 4 - data)
//   Step 4: Format chat-style examples      (Layer 4 - data)
//   Step 5: Persist artifacts               (Layer 6 - infra)
//
// Steps 1–4 are pure with respect to the output directory;
// `prepare()` stops there so callers (and tests) can work with
// the in-memory dataset. `execute()` runs all five steps.
//
// Reference: Rust Book §13 (Iterators and Closures)

use anyhow::{bail, Result};
use rand::{rngs::StdRng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::data::{
    dataset::ExampleDataset,
    formatter::{build_prompt, ExampleFormatter, FormatMode, DEFAULT_JSON_PROBABILITY},
    indexer::{build_label_space, index_records},
    scanner::CorpusScanner,
    splitter::{split_train_val, DEFAULT_SEED, DEFAULT_SPLIT_RATIO},
};
use crate::domain::{
    record::ScanReport,
    traits::CorpusSource,
    vocabulary::{LabelSpace, NumClasses},
};
use crate::infra::artifact_store::{ArtifactStore, TRAIN_FILE, VALIDATION_FILE};

// ─── Prepare Configuration ───────────────────────────────────────────────────
// Saved next to the artifacts as prepare_config.json so a prepared
// dataset records how it was produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrepareConfig {
    pub images_dir:       String,
    pub output_dir:       String,
    pub extensions:       Vec<String>,
    pub split_ratio:      f64,
    pub seed:             u64,
    pub json_probability: f64,
}

impl Default for PrepareConfig {
    fn default() -> Self {
        Self {
            images_dir:       "data/images".to_string(),
            output_dir:       "artifacts".to_string(),
            extensions:       vec!["jpg".to_string()],
            split_ratio:      DEFAULT_SPLIT_RATIO,
            seed:             DEFAULT_SEED,
            json_probability: DEFAULT_JSON_PROBABILITY,
        }
    }
}

impl PrepareConfig {
    /// Reject settings that would otherwise fail halfway through a run.
    /// NaN fails the range checks as well.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.split_ratio) {
            bail!("Split ratio must be within [0, 1], got {}", self.split_ratio);
        }
        if !(0.0..=1.0).contains(&self.json_probability) {
            bail!("JSON probability must be within [0, 1], got {}", self.json_probability);
        }
        if self.extensions.is_empty() {
            bail!("At least one image extension is required");
        }
        Ok(())
    }
}

// ─── PreparedDataset ─────────────────────────────────────────────────────────
/// Train and validation splits sharing one frozen label space.
#[derive(Debug, Clone)]
pub struct PreparedDataset {
    labels:     Arc<LabelSpace>,
    train:      ExampleDataset,
    validation: ExampleDataset,
}

impl PreparedDataset {
    pub fn new(labels: Arc<LabelSpace>, train: ExampleDataset, validation: ExampleDataset) -> Self {
        Self { labels, train, validation }
    }

    /// Reload a dataset written by `PrepareUseCase::execute`.
    pub fn load(store: &ArtifactStore) -> Result<Self> {
        let labels     = Arc::new(store.load_labels()?);
        let train      = ExampleDataset::new(store.load_examples(TRAIN_FILE)?);
        let validation = ExampleDataset::new(store.load_examples(VALIDATION_FILE)?);
        Ok(Self { labels, train, validation })
    }

    pub fn labels(&self) -> &Arc<LabelSpace> {
        &self.labels
    }

    pub fn train(&self) -> &ExampleDataset {
        &self.train
    }

    pub fn validation(&self) -> &ExampleDataset {
        &self.validation
    }

    /// Train plus validation size
    pub fn len(&self) -> usize {
        self.train.examples().len() + self.validation.examples().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn num_classes(&self) -> NumClasses {
        self.labels.num_classes()
    }

    /// The user prompt shared by every example
    pub fn prompt(&self) -> String {
        build_prompt(&self.labels)
    }
}

// ─── PrepareUseCase ──────────────────────────────────────────────────────────
pub struct PrepareUseCase {
    config: PrepareConfig,
}

impl PrepareUseCase {
    pub fn new(config: PrepareConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &PrepareConfig {
        &self.config
    }

    /// Step 1 on its own, plus the vocabularies it implies.
    pub fn scan(&self) -> Result<(ScanReport, LabelSpace)> {
        let scanner = CorpusScanner::with_extensions(&self.config.images_dir, &self.config.extensions);
        let report  = scanner.scan()?;
        let labels  = build_label_space(&report.records)?;
        Ok((report, labels))
    }

    /// Steps 1–4: build the dataset in memory.
    pub fn prepare(&self) -> Result<PreparedDataset> {
        let cfg = &self.config;

        // ── Step 1 + 2: scan, build vocabularies, index ──────────────────────
        let (report, labels) = self.scan()?;
        let indexed = index_records(&report.records, &labels)?;
        tracing::info!(
            "Vocabularies: {} tissue types, {} zoom levels",
            labels.tissue.len(),
            labels.zoom.len(),
        );

        // ── Step 3: deterministic split ──────────────────────────────────────
        let (train_records, val_records) = split_train_val(indexed, cfg.split_ratio, cfg.seed);
        tracing::info!(
            "Split: {} train, {} validation",
            train_records.len(),
            val_records.len()
        );

        // ── Step 4: format examples ──────────────────────────────────────────
        // Validation examples carry no assistant turn
        let labels = Arc::new(labels);
        let mut formatter = ExampleFormatter::with_rng(
            Arc::clone(&labels),
            StdRng::seed_from_u64(cfg.seed),
            cfg.json_probability,
        )?;
        let train      = formatter.format_all(&train_records, FormatMode::Train)?;
        let validation = formatter.format_all(&val_records, FormatMode::Eval)?;

        Ok(PreparedDataset::new(
            labels,
            ExampleDataset::new(train),
            ExampleDataset::new(validation),
        ))
    }

    /// Steps 1–5: build the dataset and write it to `output_dir`.
    pub fn execute(&self) -> Result<PreparedDataset> {
        let dataset = self.prepare()?;

        // ── Step 5: persist ──────────────────────────────────────────────────
        let store = ArtifactStore::new(&self.config.output_dir)?;
        store.save_examples(TRAIN_FILE, dataset.train().examples())?;
        store.save_examples(VALIDATION_FILE, dataset.validation().examples())?;
        store.save_labels(dataset.labels())?;
        store.save_config(&self.config)?;

        tracing::info!("Saved prepared dataset to '{}'", self.config.output_dir);
        Ok(dataset)
    }
}
