// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// Defines the subcommands and all their configurable flags:
//
//   scan      — what the image directory contains
//   prepare   — build and save the train / validation examples
//   collate   — collate one batch to check processor setup
//   parse     — turn one generated response into label indices
//   evaluate  — score a predictions file
//
// Reference: Rust Book §12 (Building a CLI Program)

use clap::{Args, Subcommand};

use crate::application::{
    collate_use_case::CollateConfig, evaluate_use_case::EvaluateConfig,
    prepare_use_case::PrepareConfig,
};
use crate::data::{
    formatter::DEFAULT_JSON_PROBABILITY,
    splitter::{DEFAULT_SEED, DEFAULT_SPLIT_RATIO},
};

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List parsed records, quarantined files and vocabularies
    Scan(ScanArgs),

    /// Scan, index, split and format a dataset, then save it
    Prepare(PrepareArgs),

    /// Collate the first validation batch and print tensor shapes
    Collate(CollateArgs),

    /// Parse one generated response into label indices
    Parse(ParseArgs),

    /// Score a JSONL file of generated responses
    Evaluate(EvaluateArgs),
}

#[derive(Args, Debug)]
pub struct ScanArgs {
    /// Directory containing the labelled images
    #[arg(long, default_value = "data/images")]
    pub images_dir: String,

    /// Accepted image extensions (repeatable)
    #[arg(long = "extension", default_value = "jpg")]
    pub extensions: Vec<String>,
}

/// All arguments for the `prepare` command.
#[derive(Args, Debug)]
pub struct PrepareArgs {
    #[command(flatten)]
    pub scan: ScanArgs,

    /// Where train.jsonl, validation.jsonl and labels.json are written
    #[arg(long, default_value = "artifacts")]
    pub output_dir: String,

    /// Fraction of records used for training
    #[arg(long, default_value_t = DEFAULT_SPLIT_RATIO)]
    pub split_ratio: f64,

    /// Seed for the split shuffle and the response-style draw
    #[arg(long, default_value_t = DEFAULT_SEED)]
    pub seed: u64,

    /// Probability that a training target uses the JSON template
    #[arg(long, default_value_t = DEFAULT_JSON_PROBABILITY)]
    pub json_probability: f64,
}

impl From<ScanArgs> for PrepareConfig {
    fn from(a: ScanArgs) -> Self {
        PrepareConfig {
            images_dir: a.images_dir,
            extensions: a.extensions,
            ..PrepareConfig::default()
        }
    }
}

/// Convert CLI PrepareArgs into the application-layer PrepareConfig.
/// The application layer never sees clap types.
impl From<PrepareArgs> for PrepareConfig {
    fn from(a: PrepareArgs) -> Self {
        PrepareConfig {
            images_dir:       a.scan.images_dir,
            output_dir:       a.output_dir,
            extensions:       a.scan.extensions,
            split_ratio:      a.split_ratio,
            seed:             a.seed,
            json_probability: a.json_probability,
        }
    }
}

#[derive(Args, Debug)]
pub struct CollateArgs {
    /// Directory written by `prepare`
    #[arg(long, default_value = "artifacts")]
    pub artifacts_dir: String,

    /// Processor config JSON (tokenizer path, special tokens, image size)
    #[arg(long)]
    pub processor_config: Option<String>,

    #[arg(long, default_value_t = 8)]
    pub batch_size: usize,
}

impl From<CollateArgs> for CollateConfig {
    fn from(a: CollateArgs) -> Self {
        CollateConfig {
            artifacts_dir:    a.artifacts_dir,
            processor_config: a.processor_config,
            batch_size:       a.batch_size,
        }
    }
}

#[derive(Args, Debug)]
pub struct ParseArgs {
    /// The generated response text
    #[arg(long)]
    pub text: String,

    #[arg(long, default_value = "artifacts")]
    pub artifacts_dir: String,

    /// Require the whole response to be one JSON object
    #[arg(long)]
    pub full_match: bool,
}

#[derive(Args, Debug)]
pub struct EvaluateArgs {
    /// JSONL with one {"image_path", "generated_text"} per line
    #[arg(long)]
    pub predictions: String,

    #[arg(long, default_value = "artifacts")]
    pub artifacts_dir: String,

    /// Require each response to be exactly one JSON object
    #[arg(long)]
    pub full_match: bool,
}

impl From<EvaluateArgs> for EvaluateConfig {
    fn from(a: EvaluateArgs) -> Self {
        EvaluateConfig {
            artifacts_dir: a.artifacts_dir,
            predictions:   a.predictions,
            full_match:    a.full_match,
        }
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Cli;
    use clap::Parser;

    #[test]
    fn test_prepare_defaults_match_config_defaults() {
        let cli = Cli::try_parse_from(["histo_vlm_data", "prepare"]).unwrap();
        let Commands::Prepare(args) = cli.command else { panic!("expected prepare") };
        assert_eq!(PrepareConfig::from(args), PrepareConfig::default());
    }

    #[test]
    fn test_prepare_flags() {
        let cli = Cli::try_parse_from([
            "histo_vlm_data", "prepare",
            "--images-dir", "slides",
            "--extension", "jpg", "--extension", "png",
            "--split-ratio", "0.5",
            "--seed", "7",
        ])
        .unwrap();
        let Commands::Prepare(args) = cli.command else { panic!("expected prepare") };
        let cfg = PrepareConfig::from(args);
        assert_eq!(cfg.images_dir, "slides");
        assert_eq!(cfg.extensions, vec!["jpg", "png"]);
        assert_eq!(cfg.split_ratio, 0.5);
        assert_eq!(cfg.seed, 7);
    }

    #[test]
    fn test_evaluate_requires_predictions() {
        assert!(Cli::try_parse_from(["histo_vlm_data", "evaluate"]).is_err());
    }
}
