// ============================================================
// Layer 6 — Artifact Store
// ============================================================
// Persists a prepared dataset so later commands (collate,
// parse, evaluate) work from exactly the same labels and splits
// that `prepare` produced.
//
// What gets saved:
//   1. train.jsonl / validation.jsonl — one FormattedExample per line
//   2. labels.json                    — zoom and tissue vocabularies
//   3. prepare_config.json            — the PrepareConfig of the run
//
// Why save the label space separately?
//   Class indices only mean something relative to the vocabulary
//   they were built from. A generated response "tissue_type: 3"
//   can only be scored against the vocabulary of the run that
//   wrote the prompt, so labels.json travels with the examples.
//
// File layout:
//   artifacts/
//     train.jsonl
//     validation.jsonl
//     labels.json
//     prepare_config.json
//
// Reference: Rust Book §9 (Error Handling)
//            serde_json documentation (JSON Lines)

use anyhow::{Context, Result};
use serde::{de::DeserializeOwned, Serialize};
use std::{
    fs,
    io::{BufRead, BufReader, BufWriter, Write},
    path::{Path, PathBuf},
};

use crate::application::prepare_use_case::PrepareConfig;
use crate::domain::example::FormattedExample;
use crate::domain::vocabulary::LabelSpace;

pub const TRAIN_FILE: &str      = "train.jsonl";
pub const VALIDATION_FILE: &str = "validation.jsonl";
pub const LABELS_FILE: &str     = "labels.json";
pub const CONFIG_FILE: &str     = "prepare_config.json";

/// Reads and writes the artifacts of one prepared dataset.
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    /// Open a store, creating the directory if needed.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Cannot create artifact directory '{}'", dir.display()))?;
        Ok(Self { dir })
    }

    /// Open an existing store; fails if `prepare` has not been run.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        anyhow::ensure!(
            dir.join(LABELS_FILE).exists(),
            "No '{}' in '{}'. Have you run 'prepare' first?",
            LABELS_FILE,
            dir.display()
        );
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    // ─── Examples ─────────────────────────────────────────────────────────────

    pub fn save_examples(&self, file: &str, examples: &[FormattedExample]) -> Result<()> {
        let path = self.dir.join(file);
        write_jsonl(&path, examples)?;
        tracing::debug!("Wrote {} examples to '{}'", examples.len(), path.display());
        Ok(())
    }

    pub fn load_examples(&self, file: &str) -> Result<Vec<FormattedExample>> {
        read_jsonl(&self.dir.join(file))
    }

    // ─── Labels ───────────────────────────────────────────────────────────────

    pub fn save_labels(&self, labels: &LabelSpace) -> Result<()> {
        write_json(&self.dir.join(LABELS_FILE), labels)
    }

    pub fn load_labels(&self) -> Result<LabelSpace> {
        read_json(&self.dir.join(LABELS_FILE))
    }

    // ─── Config ───────────────────────────────────────────────────────────────

    pub fn save_config(&self, cfg: &PrepareConfig) -> Result<()> {
        write_json(&self.dir.join(CONFIG_FILE), cfg)
    }

    pub fn load_config(&self) -> Result<PrepareConfig> {
        read_json(&self.dir.join(CONFIG_FILE))
    }
}

// ─── JSON helpers ─────────────────────────────────────────────────────────────

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json).with_context(|| format!("Cannot write '{}'", path.display()))
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let json = fs::read_to_string(path)
        .with_context(|| format!("Cannot read '{}'", path.display()))?;
    serde_json::from_str(&json).with_context(|| format!("Invalid JSON in '{}'", path.display()))
}

fn write_jsonl<T: Serialize>(path: &Path, items: &[T]) -> Result<()> {
    let file = fs::File::create(path)
        .with_context(|| format!("Cannot create '{}'", path.display()))?;
    let mut out = BufWriter::new(file);
    for item in items {
        serde_json::to_writer(&mut out, item)?;
        out.write_all(b"\n")?;
    }
    out.flush()?;
    Ok(())
}

/// Read one JSON value per non-blank line.
pub fn read_jsonl<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let file = fs::File::open(path)
        .with_context(|| format!("Cannot open '{}'", path.display()))?;

    let mut items = Vec::new();
    for (n, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let item = serde_json::from_str(&line)
            .with_context(|| format!("{}:{}: invalid JSON line", path.display(), n + 1))?;
        items.push(item);
    }
    Ok(items)
}
