// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// Parses command line arguments with clap and routes each
// subcommand to its use case in Layer 2. Printing results for
// the user happens here and nowhere else.
//
// Reference: Rust Book §7 (Modules), §12 (CLI programs)

pub mod commands;

use anyhow::Result;
use clap::Parser;
use commands::{CollateArgs, Commands, EvaluateArgs, ParseArgs, PrepareArgs, ScanArgs};

use crate::application::{
    collate_use_case::CollateUseCase,
    evaluate_use_case::{EvaluateConfig, EvaluateUseCase},
    prepare_use_case::PrepareUseCase,
};

#[derive(Parser, Debug)]
#[command(
    name = "histo_vlm_data",
    version = "0.1.0",
    about = "Prepare labelled histopathology images for vision-language fine-tuning."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Dispatch to the matching use case.
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Scan(args)     => run_scan(args),
            Commands::Prepare(args)  => run_prepare(args),
            Commands::Collate(args)  => run_collate(args),
            Commands::Parse(args)    => run_parse(args),
            Commands::Evaluate(args) => run_evaluate(args),
        }
    }
}

fn run_scan(args: ScanArgs) -> Result<()> {
    let use_case = PrepareUseCase::new(args.into())?;
    let (report, labels) = use_case.scan()?;

    println!("Records:             {}", report.records.len());
    println!("Calibration skipped: {}", report.calibration_skipped);
    println!("Rejected:            {}", report.rejected.len());
    for r in &report.rejected {
        println!("  {}  ({})", r.path.display(), r.reason);
    }
    println!("\nTissue Type:\n{}", labels.tissue_options());
    println!("\nZoom Level:\n{}", labels.zoom_options());
    Ok(())
}

fn run_prepare(args: PrepareArgs) -> Result<()> {
    let use_case = PrepareUseCase::new(args.into())?;
    let dataset  = use_case.execute()?;

    let n = dataset.num_classes();
    println!(
        "Prepared {} examples ({} train, {} validation) in '{}'",
        dataset.len(),
        dataset.train().examples().len(),
        dataset.validation().examples().len(),
        use_case.config().output_dir,
    );
    println!("Classes: focus={}, zoom={}, tissue={}", n.focus, n.zoom, n.tissue);
    println!("\nPrompt:\n{}", dataset.prompt());
    Ok(())
}

fn run_collate(args: CollateArgs) -> Result<()> {
    let summary = CollateUseCase::new(args.into())?.execute()?;

    println!("pixel_values:   {:?}", summary.pixel_values);
    println!("input_ids:      {:?}", summary.input_ids);
    println!("attention_mask: {:?}", summary.attention_mask);
    println!("labels:         {:?}", summary.labels);
    println!("ignored labels: {} ({} padding)", summary.ignored_labels, summary.padded_tokens);
    Ok(())
}

fn run_parse(args: ParseArgs) -> Result<()> {
    let use_case   = EvaluateUseCase::open(&args.artifacts_dir)?;
    let prediction = use_case.parse(&args.text, args.full_match);
    println!("{}", serde_json::to_string_pretty(&prediction)?);
    Ok(())
}

fn run_evaluate(args: EvaluateArgs) -> Result<()> {
    let config: EvaluateConfig = args.into();
    let report = EvaluateUseCase::execute(&config)?;
    let m = &report.metrics;

    println!("Evaluated:   {} ({} unmatched)", m.evaluated, report.unmatched);
    println!("Tissue acc:  {:.4}", m.tissue_acc);
    println!("Zoom acc:    {:.4}", m.zoom_acc);
    println!("Focus acc:   {:.4}", m.focus_acc);
    println!("Exact match: {:.4}", m.exact_match);
    println!("Unparseable: {}", m.unparseable);
    Ok(())
}
