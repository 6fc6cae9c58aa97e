//! The `revela analyze` command: calibrate a roll and report the profile.

use std::sync::Arc;
use std::time::Instant;

use clap::Args;
use revela_core::{CacheOutcome, CalibrationProfile, Config, Revela};
use serde::Serialize;

use super::roll::{calibrate, RollArgs};

/// Arguments for the `analyze` command.
#[derive(Args, Debug)]
pub struct AnalyzeArgs {
    #[command(flatten)]
    pub roll: RollArgs,

    /// Print the calibration profile as JSON on stdout
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize)]
struct AnalyzeReport<'a> {
    roll: String,
    frames: usize,
    key: String,
    cached: bool,
    profile: &'a CalibrationProfile,
}

/// Execute the analyze command.
pub async fn execute(config: Config, args: AnalyzeArgs) -> anyhow::Result<()> {
    let revela = Arc::new(Revela::new(config));
    let (roll, _) = args.roll.open(&revela)?;
    let key = revela.coordinator().key_for(&roll)?;

    let start = Instant::now();
    let (roll, profile, outcome) = calibrate(revela, roll).await?;
    let cached = outcome == CacheOutcome::Hit;

    if args.json {
        let report = AnalyzeReport {
            roll: roll.name(),
            frames: roll.len(),
            key: key.to_string(),
            cached,
            profile: &profile,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_summary(&roll.name(), roll.len(), &profile, cached, start.elapsed());
    }
    Ok(())
}

fn print_summary(
    name: &str,
    frames: usize,
    profile: &CalibrationProfile,
    cached: bool,
    elapsed: std::time::Duration,
) {
    let triple = |v: [f64; 3]| format!("{:.4} {:.4} {:.4}", v[0], v[1], v[2]);

    eprintln!();
    eprintln!("  ====================================================");
    eprintln!("    Calibration: {name}");
    eprintln!("  ====================================================");
    eprintln!("    Frames:          {:>8}", frames);
    eprintln!("    Dmin (RGB):      {}", triple(profile.d_min));
    eprintln!("    Dmax (RGB):      {}", triple(profile.d_max));
    eprintln!("    Alignment (RGB): {}", triple(profile.alignment));
    eprintln!("    Extrema density: {:>8.4}", profile.extrema_density);
    eprintln!("    Clip threshold:  {:>8.4}", profile.clip_threshold);
    eprintln!("  ----------------------------------------------------");
    eprintln!(
        "    Source:          {:>8}",
        if cached { "cache" } else { "analysis" }
    );
    eprintln!("    Duration:        {:>7.1}s", elapsed.as_secs_f64());
    eprintln!("  ====================================================");
}
