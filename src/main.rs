//! StudioClean - Batch Speech Enhancement CLI

use anyhow::{Context, bail};
use clap::Parser;
use log::{info, warn};
use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use studioclean::archive::{self, Archiver, ZipArchiver};
use studioclean::batch::{JobOutcome, LogProgress};
use studioclean::codec::{AudioSource, SUPPORTED_INPUT_EXTENSIONS};
use studioclean::{Args, BatchScheduler, CancellationToken, Config, init_logging};

/// Every job succeeded.
const EXIT_OK: i32 = 0;
/// Configuration or setup error; nothing was processed.
const EXIT_FATAL: i32 = 1;
/// The batch ran but at least one job failed.
const EXIT_PARTIAL: i32 = 2;

fn main() {
    let args = Args::parse();
    init_logging(args.verbose);

    match run(args) {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            process::exit(EXIT_FATAL);
        }
    }
}

fn run(args: Args) -> anyhow::Result<i32> {
    if args.verbose {
        println!("{}", studioclean::get_library_info());
        println!();
    }

    if let Some(path) = &args.write_config {
        Config::create_default_config(path)
            .with_context(|| format!("Cannot write config to {}", path.display()))?;
        println!("Wrote default config to {}", path.display());
        return Ok(EXIT_OK);
    }

    let config = Config::from_args_and_config(&args).context("Invalid configuration")?;

    if args.check {
        return Ok(run_check(&config));
    }

    let inputs = collect_inputs(&args.inputs)?;
    if inputs.is_empty() {
        bail!("No supported audio files found (accepted: {})", SUPPORTED_INPUT_EXTENSIONS.join(", "));
    }

    if !config.batch.output_format.is_native() && !config.toolchain.probe() {
        warn!(
            "ffmpeg not found at '{}'; {} output will fail. Use --format wav or --ffmpeg <PATH>",
            config.toolchain.ffmpeg.display(),
            config.batch.output_format
        );
    }

    let scheduler = BatchScheduler::new(&config)?;

    println!("=== StudioClean Batch Enhancement ===");
    println!("Files: {}", inputs.len());
    println!("Pipeline: {}", scheduler.pipeline().stage_names().join(" -> "));
    println!("Settings: {}", config.pipeline);
    println!("Workers: {}", scheduler.n_jobs());
    if let Some(dir) = &config.batch.output_dir {
        println!("Output: {} ({})", dir.display(), config.batch.output_format);
    }
    println!("=====================================\n");

    let sources: Vec<AudioSource> = inputs.into_iter().map(AudioSource::from).collect();
    let result = scheduler.run_with(sources, Some(&LogProgress), &CancellationToken::new());

    println!("\n=== Results ===");
    for report in result.in_submission_order() {
        match &report.outcome {
            JobOutcome::Succeeded(output) => {
                let target = output
                    .output_path
                    .as_deref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_default();
                println!(
                    "OK    {} -> {} ({:.2}s, RTF {:.3})",
                    report.input_name, target,
                    output.metrics.processing_time_seconds, output.metrics.real_time_factor
                );
                if args.verbose {
                    if let Some(slowest) = output.metrics.slowest_stage() {
                        println!(
                            "      stages {:.2}s, slowest {} ({:.2}s)",
                            output.metrics.stage_time().as_secs_f64(),
                            slowest.stage,
                            slowest.duration.as_secs_f64()
                        );
                    }
                }
                for skipped in &output.skipped {
                    println!("      degraded: {} skipped ({})", skipped.stage, skipped.reason);
                }
            }
            JobOutcome::Failed(e) => println!("FAIL  {}: {}", report.input_name, e),
        }
    }
    println!(
        "\n{} succeeded, {} failed in {:.2}s",
        result.succeeded_count(),
        result.failed_count(),
        result.elapsed().as_secs_f64()
    );

    if config.batch.archive {
        let items = archive::batch_items(&result);
        if items.is_empty() {
            warn!("Nothing to archive");
        } else if let Some(dir) = &config.batch.output_dir {
            let archive = ZipArchiver::new(dir).archive(&items)?;
            println!("Archive: {}", archive.display());
        }
    }

    Ok(if result.all_succeeded() { EXIT_OK } else { EXIT_PARTIAL })
}

fn run_check(config: &Config) -> i32 {
    let ffmpeg = &config.toolchain.ffmpeg;
    println!("CPU cores: {}", studioclean::config::utils::cpu_count());
    println!("Workers: {} (recommended {})", config.batch.effective_jobs(), studioclean::config::utils::recommended_workers());
    if config.toolchain.probe() {
        println!("ffmpeg: available ({})", ffmpeg.display());
        EXIT_OK
    } else {
        println!("ffmpeg: NOT available ({}); only WAV input/output will work", ffmpeg.display());
        EXIT_FATAL
    }
}

/// Expand directories one level deep, keeping files with a supported extension.
/// Files named explicitly are always kept; the decoder decides about them.
fn collect_inputs(paths: &[PathBuf]) -> anyhow::Result<Vec<PathBuf>> {
    let mut inputs = Vec::new();
    for path in paths {
        if path.is_dir() {
            let mut found: Vec<PathBuf> = fs::read_dir(path)
                .with_context(|| format!("Cannot read directory {}", path.display()))?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| p.is_file() && is_supported(p))
                .collect();
            found.sort();
            info!("{}: {} audio file(s)", path.display(), found.len());
            inputs.extend(found);
        } else if path.exists() {
            inputs.push(path.clone());
        } else {
            bail!("Input does not exist: {}", path.display());
        }
    }
    Ok(inputs)
}

fn is_supported(path: &Path) -> bool {
    path.extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .is_some_and(|e| SUPPORTED_INPUT_EXTENSIONS.contains(&e.as_str()))
}
