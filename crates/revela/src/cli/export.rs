//! The `revela export` command: render and encode selected frames.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use clap::Args;
use revela_core::color::OutputSpace;
use revela_core::recipe::DisplayTarget;
use revela_core::{Config, ExportFormat, ExportRecipe, ExportSummary, Revela};

use super::progress::run_blocking;
use super::recipe::parse_selection;
use super::roll::{calibrate, RollArgs};

/// Arguments for the `export` command.
#[derive(Args, Debug)]
pub struct ExportArgs {
    #[command(flatten)]
    pub roll: RollArgs,

    /// Frames to export, 1-based (e.g. 1,3-5); defaults to every frame
    #[arg(long)]
    pub frames: Option<String>,

    /// Output format: jpg, png, tif8, tif16
    #[arg(short, long)]
    pub format: Option<ExportFormat>,

    /// JPEG quality (1-100)
    #[arg(short, long)]
    pub quality: Option<u8>,

    /// Appended to each file name as <stem>_<suffix>; pass "" for none
    #[arg(long)]
    pub suffix: Option<String>,

    /// Output folder (defaults to <roll>/@Exports)
    #[arg(short, long)]
    pub out_dir: Option<PathBuf>,

    /// Destination profile: srgb, display-p3, or a path to an ICC file
    #[arg(long)]
    pub profile: Option<String>,
}

impl ExportArgs {
    /// Command-line flags layered over the recipe file's `[export]` table.
    fn recipe(&self, base: Option<ExportRecipe>) -> anyhow::Result<ExportRecipe> {
        let mut recipe = base.unwrap_or_default();
        if let Some(format) = self.format {
            recipe.format = format;
        }
        if let Some(quality) = self.quality {
            recipe.quality = quality;
        }
        if let Some(suffix) = &self.suffix {
            recipe.filename_suffix = suffix.clone();
        }
        if let Some(dir) = &self.out_dir {
            recipe.output_directory = Some(PathBuf::from(
                shellexpand::tilde(&dir.to_string_lossy()).into_owned(),
            ));
        }
        if let Some(profile) = &self.profile {
            recipe.icc_profile = Some(destination_profile(profile)?);
        }
        recipe.validate()?;
        Ok(recipe)
    }
}

/// ICC bytes for a named display profile or a profile file.
fn destination_profile(name: &str) -> anyhow::Result<Vec<u8>> {
    let generated = match name.to_ascii_lowercase().as_str() {
        "srgb" => Some(DisplayTarget::Srgb),
        "display-p3" | "p3" => Some(DisplayTarget::DisplayP3),
        _ => None,
    };
    match generated {
        Some(target) => Ok(OutputSpace::for_display(target).icc()?),
        None => {
            let path = PathBuf::from(shellexpand::tilde(name).into_owned());
            std::fs::read(&path)
                .with_context(|| format!("Failed to read ICC profile {}", path.display()))
        }
    }
}

/// Execute the export command.
pub async fn execute(config: Config, args: ExportArgs) -> anyhow::Result<()> {
    let revela = Arc::new(Revela::new(config));
    let (roll, recipes) = args.roll.open(&revela)?;
    let recipe = args.recipe(recipes.export)?;
    let selection = match &args.frames {
        Some(spec) => parse_selection(spec, roll.len())?,
        None => (0..roll.len()).collect(),
    };

    let (roll, _, _) = calibrate(revela.clone(), roll).await?;

    let start = Instant::now();
    let summary = run_blocking(move |progress, cancel| {
        let mut roll = roll;
        revela.export(&mut roll, &selection, &recipe, progress, cancel)
    })
    .await?
    .context("Export failed")?;

    for failure in &summary.failed {
        tracing::error!("Failed: {:?} - {}", failure.frame, failure.error);
    }
    if let Some(dir) = summary.exported.first().and_then(|p| p.parent()) {
        tracing::info!("Output written to {:?}", dir);
    }
    print_summary(&summary, start.elapsed());

    if summary.cancelled {
        anyhow::bail!("Export cancelled");
    }
    Ok(())
}

fn print_summary(summary: &ExportSummary, elapsed: std::time::Duration) {
    let exported = summary.exported.len();
    let rate = if elapsed.as_secs_f64() > 0.0 {
        exported as f64 / elapsed.as_secs_f64()
    } else {
        0.0
    };
    let bytes: u64 = summary
        .exported
        .iter()
        .filter_map(|p| file_size(p))
        .sum();

    eprintln!();
    eprintln!("  ====================================");
    eprintln!("               Summary");
    eprintln!("  ====================================");
    eprintln!("    Exported:     {:>8}", exported);
    if !summary.failed.is_empty() {
        eprintln!("    Failed:       {:>8}", summary.failed.len());
    }
    if summary.cancelled {
        eprintln!("    Cancelled:    {:>8}", "yes");
    }
    eprintln!("  ------------------------------------");
    eprintln!("    Written:      {:>7.1} MB", bytes as f64 / 1_000_000.0);
    eprintln!("    Duration:     {:>7.1}s", elapsed.as_secs_f64());
    eprintln!("    Rate:         {:>7.1} frames/sec", rate);
    eprintln!("  ====================================");
}

fn file_size(path: &Path) -> Option<u64> {
    std::fs::metadata(path).ok().map(|m| m.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use revela_core::color::DestinationProfile;

    fn args() -> ExportArgs {
        ExportArgs {
            roll: RollArgs {
                roll: PathBuf::from("/scans/roll"),
                film_type: "Portra400".to_string(),
                recipe: None,
            },
            frames: None,
            format: None,
            quality: None,
            suffix: None,
            out_dir: None,
            profile: None,
        }
    }

    #[test]
    fn test_flags_override_recipe_file() {
        let base = ExportRecipe {
            format: ExportFormat::Png,
            quality: 70,
            ..ExportRecipe::default()
        };
        let mut args = args();
        args.quality = Some(95);
        args.suffix = Some(String::new());

        let recipe = args.recipe(Some(base)).unwrap();
        assert_eq!(recipe.format, ExportFormat::Png);
        assert_eq!(recipe.quality, 95);
        assert_eq!(recipe.file_name("f01"), "f01.png");
    }

    #[test]
    fn test_invalid_quality_is_rejected() {
        let mut args = args();
        args.quality = Some(0);
        assert!(args.recipe(None).is_err());
    }

    #[test]
    fn test_named_profiles_are_usable_destinations() {
        for name in ["srgb", "Display-P3"] {
            let bytes = destination_profile(name).unwrap();
            assert!(DestinationProfile::from_bytes(bytes).is_ok());
        }
    }

    #[test]
    fn test_profile_path_is_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.icc");
        let bytes = destination_profile("srgb").unwrap();
        std::fs::write(&path, &bytes).unwrap();
        assert_eq!(destination_profile(path.to_str().unwrap()).unwrap(), bytes);
        assert!(destination_profile("/no/such/profile.icc").is_err());
    }
}
