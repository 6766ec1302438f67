// ============================================================
// Layer 2 — CollateUseCase and Data Loaders
// ============================================================
// Connects a prepared dataset to the collator:
//
//   build_loaders()  — burn DataLoaders over the train and
//                      validation splits. Training batches are
//                      shuffled with a fixed seed; validation
//                      batches keep their order.
//
//   CollateUseCase   — loads the processor, collates the first
//                      validation batch and reports its tensor
//                      shapes. A quick way to check that a
//                      tokenizer / template / image setup works
//                      before starting a long training run.
//
// Reference: Burn Book §4 (Data Loading)

use anyhow::{Context, Result};
use burn::{
    data::dataloader::{DataLoader, DataLoaderBuilder},
    prelude::*,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::application::prepare_use_case::PreparedDataset;
use crate::data::collator::{HostBatch, VlmBatch, VlmCollator, IGNORE_INDEX};
use crate::domain::traits::MultimodalProcessor;
use crate::infra::{
    artifact_store::ArtifactStore,
    processor::{ProcessorConfig, VisionTextProcessor},
};

/// Backend used for previews; CPU is enough to check shapes.
pub type PreviewBackend = burn::backend::NdArray;

// ─── Loaders ─────────────────────────────────────────────────────────────────
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoaderConfig {
    pub train_batch_size: usize,
    pub eval_batch_size:  usize,
    pub shuffle_seed:     u64,
    pub num_workers:      usize,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            train_batch_size: 8,
            eval_batch_size:  8,
            shuffle_seed:     42,
            num_workers:      1,
        }
    }
}

pub struct Loaders<B: Backend> {
    pub train:      Arc<dyn DataLoader<VlmBatch<B>>>,
    pub validation: Arc<dyn DataLoader<VlmBatch<B>>>,
}

/// Build train / validation loaders sharing one collator.
pub fn build_loaders<B: Backend>(
    dataset:  &PreparedDataset,
    collator: VlmCollator<B>,
    cfg:      &LoaderConfig,
) -> Loaders<B> {
    let train = DataLoaderBuilder::new(collator.clone())
        .batch_size(cfg.train_batch_size)
        .shuffle(cfg.shuffle_seed)
        .num_workers(cfg.num_workers)
        .build(dataset.train().clone());

    let validation = DataLoaderBuilder::new(collator)
        .batch_size(cfg.eval_batch_size)
        .num_workers(cfg.num_workers)
        .build(dataset.validation().clone());

    Loaders { train, validation }
}

// ─── Collate Preview ─────────────────────────────────────────────────────────
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollateConfig {
    pub artifacts_dir:    String,
    /// JSON ProcessorConfig; built-in defaults when absent
    pub processor_config: Option<String>,
    pub batch_size:       usize,
}

impl Default for CollateConfig {
    fn default() -> Self {
        Self {
            artifacts_dir:    "artifacts".to_string(),
            processor_config: None,
            batch_size:       8,
        }
    }
}

/// Shapes and masking statistics of one collated batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub pixel_values:   [usize; 4],
    pub input_ids:      [usize; 2],
    pub attention_mask: [usize; 2],
    pub labels:         [usize; 2],
    /// Label positions set to the ignore index
    pub ignored_labels: usize,
    /// Positions added by right padding
    pub padded_tokens:  usize,
}

impl BatchSummary {
    fn new<B: Backend>(host: &HostBatch, batch: &VlmBatch<B>) -> Self {
        Self {
            pixel_values:   batch.pixel_values.dims(),
            input_ids:      batch.input_ids.dims(),
            attention_mask: batch.attention_mask.dims(),
            labels:         batch.labels.dims(),
            ignored_labels: host.labels.iter().filter(|&&l| l == IGNORE_INDEX).count(),
            padded_tokens:  host.attention_mask.iter().filter(|&&m| m == 0).count(),
        }
    }
}

pub struct CollateUseCase {
    config:    CollateConfig,
    processor: Arc<dyn MultimodalProcessor>,
}

impl CollateUseCase {
    /// Load the processor described by the config.
    pub fn new(config: CollateConfig) -> Result<Self> {
        let processor_cfg = match &config.processor_config {
            Some(path) => ProcessorConfig::load(path)?,
            None       => ProcessorConfig::default(),
        };
        let processor = VisionTextProcessor::from_config(processor_cfg)?;
        Ok(Self::with_processor(config, Arc::new(processor)))
    }

    pub fn with_processor(config: CollateConfig, processor: Arc<dyn MultimodalProcessor>) -> Self {
        Self { config, processor }
    }

    /// Collate the first batch of the saved validation split.
    pub fn execute(&self) -> Result<BatchSummary> {
        let store   = ArtifactStore::open(&self.config.artifacts_dir)?;
        let dataset = PreparedDataset::load(&store)?;
        self.preview(&dataset)
    }

    /// Collate the first validation batch of an in-memory dataset,
    /// falling back to the train split when validation is empty.
    pub fn preview(&self, dataset: &PreparedDataset) -> Result<BatchSummary> {
        let examples = if dataset.validation().examples().is_empty() {
            dataset.train().examples()
        } else {
            dataset.validation().examples()
        };
        let first = &examples[..examples.len().min(self.config.batch_size.max(1))];

        let collator = VlmCollator::<PreviewBackend>::builder()
            .processor(Arc::clone(&self.processor))
            .build()?;
        let host  = collator.collate_host(first).context("Failed to collate preview batch")?;
        let batch = VlmBatch::<PreviewBackend>::from_host(&host, collator.device());

        let summary = BatchSummary::new(&host, &batch);
        tracing::info!(
            "Collated {} examples: pixel_values={:?}, input_ids={:?}",
            host.batch_size,
            summary.pixel_values,
            summary.input_ids,
        );
        Ok(summary)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::prepare_use_case::{tests as prepare, PrepareUseCase};
    use crate::infra::processor::test_support;

    const SOFT_TOKENS: usize = 4;
    const IMAGE_SIZE: u32    = 8;

    fn prepared() -> (tempfile::TempDir, PreparedDataset) {
        let images = tempfile::tempdir().unwrap();
        prepare::write_corpus(images.path());
        let cfg = prepare::config(images.path(), images.path());
        let ds  = PrepareUseCase::new(cfg).unwrap().prepare().unwrap();
        (images, ds)
    }

    fn processor() -> Arc<dyn MultimodalProcessor> {
        Arc::new(test_support::processor(SOFT_TOKENS, IMAGE_SIZE))
    }

    #[test]
    fn test_validation_batch_shapes() {
        let (_images, ds) = prepared();
        let use_case = CollateUseCase::with_processor(CollateConfig::default(), processor());

        let s = use_case.preview(&ds).unwrap();
        assert_eq!(s.pixel_values, [2, 3, 8, 8]);
        assert_eq!(s.input_ids[0], 2);
        assert_eq!(s.input_ids, s.attention_mask);
        assert_eq!(s.input_ids, s.labels);
        // soft tokens and the boi placeholder of both rows, plus padding
        assert!(s.ignored_labels >= 2 * (SOFT_TOKENS + 1) + s.padded_tokens);
    }

    #[test]
    fn test_train_batch_masks_every_padded_position() {
        let (_images, ds) = prepared();
        let collator = VlmCollator::<PreviewBackend>::builder()
            .processor(processor())
            .build()
            .unwrap();

        let host = collator.collate_host(ds.train().examples()).unwrap();
        assert_eq!(host.batch_size, 8);
        for (mask, label) in host.attention_mask.iter().zip(&host.labels) {
            if *mask == 0 {
                assert_eq!(*label, IGNORE_INDEX);
            }
        }
        let soft = test_support::SOFT_TOKEN_ID as i32;
        assert!(!host.labels.contains(&soft));
    }

    #[test]
    fn test_loaders_cover_both_splits() {
        let (_images, ds) = prepared();
        let collator = VlmCollator::<PreviewBackend>::builder()
            .processor(processor())
            .build()
            .unwrap();
        let cfg = LoaderConfig { train_batch_size: 3, eval_batch_size: 8, ..LoaderConfig::default() };

        let loaders = build_loaders(&ds, collator, &cfg);

        let train_rows: Vec<usize> = loaders.train.iter().map(|b| b.input_ids.dims()[0]).collect();
        assert_eq!(train_rows.iter().sum::<usize>(), 8);
        assert!(train_rows.iter().all(|&n| n <= 3));

        let val_rows: Vec<usize> = loaders.validation.iter().map(|b| b.input_ids.dims()[0]).collect();
        assert_eq!(val_rows, vec![2]);
    }

    #[test]
    fn test_execute_reads_saved_artifacts() {
        let images = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        prepare::write_corpus(images.path());
        PrepareUseCase::new(prepare::config(images.path(), output.path()))
            .unwrap()
            .execute()
            .unwrap();

        let cfg = CollateConfig {
            artifacts_dir: output.path().display().to_string(),
            batch_size:    1,
            ..CollateConfig::default()
        };
        let s = CollateUseCase::with_processor(cfg, processor()).execute().unwrap();
        assert_eq!(s.pixel_values, [1, 3, 8, 8]);
    }
}
