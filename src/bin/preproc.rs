use anyhow::{bail, Result};
use clap::Parser;
use log::info;
use std::path::PathBuf;
use exgprep::{read_participants, FailurePolicy, PipelineConfig, SubjectPreprocessor};

#[derive(Parser)]
#[command(name = "preproc", about = "Batch EEG preprocessing of a BIDS cohort")]
struct Args {
    /// Root of the BIDS dataset (default: config value, else `.`)
    #[arg(long)]
    bids_root: Option<PathBuf>,

    /// Participants manifest (default: <bids-root>/participants.tsv)
    #[arg(long)]
    participants: Option<PathBuf>,

    /// BIDS task label (default: Simon)
    #[arg(long)]
    task: Option<String>,

    /// Raw recording extension, `.set` or `.fif` (default: .set)
    #[arg(long)]
    extension: Option<String>,

    /// JSON file overriding any subset of the pipeline configuration
    #[arg(long)]
    config: Option<PathBuf>,

    /// Only process these subjects (repeatable), instead of the manifest
    #[arg(long = "subject")]
    subjects: Vec<String>,

    /// Report failing subjects and carry on instead of aborting the run
    #[arg(long)]
    keep_going: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut cfg = match &args.config {
        Some(path) => PipelineConfig::from_json_file(path)?,
        None => PipelineConfig::default(),
    };
    if let Some(root) = args.bids_root {
        cfg.bids_root = root;
    }
    if let Some(p) = args.participants {
        cfg.participants = Some(p);
    }
    if let Some(task) = args.task {
        cfg.task = task;
    }
    if let Some(ext) = args.extension {
        cfg.extension = if ext.starts_with('.') { ext } else { format!(".{ext}") };
    }
    if args.keep_going {
        cfg.on_error = FailurePolicy::Continue;
    }

    let subjects = if args.subjects.is_empty() {
        read_participants(&cfg.participants_path())?
    } else {
        args.subjects
    };
    info!(
        "Preprocessing {} subjects of task {} from {}",
        subjects.len(),
        cfg.task,
        cfg.bids_root.display()
    );

    let report = SubjectPreprocessor::new(cfg)?.run_cohort(&subjects)?;
    println!("{report}");
    for (subject, path) in &report.saved {
        println!("  {subject} → {}", path.display());
    }
    for (subject, err) in &report.failed {
        println!("  {subject} FAILED: {err}");
    }
    if !report.is_success() {
        bail!("{} subjects failed", report.failed.len());
    }
    Ok(())
}
