//! Roll arguments shared by `analyze`, `preview` and `export`.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Args;
use revela_core::{CacheOutcome, CalibrationProfile, Revela, Roll};

use super::progress::run_blocking;
use super::recipe::RecipeFile;

#[derive(Args, Debug)]
pub struct RollArgs {
    /// Folder holding the roll's scans
    #[arg(required = true)]
    pub roll: PathBuf,

    /// Film stock, used to name the roll
    #[arg(long, default_value = "Unknown")]
    pub film_type: String,

    /// TOML file with [technical], [creative] and [export] tables
    #[arg(long)]
    pub recipe: Option<PathBuf>,
}

impl RollArgs {
    fn folder(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.roll.to_string_lossy()).into_owned())
    }

    /// Open the roll and apply the recipe file, if any.
    pub fn open(&self, revela: &Revela) -> anyhow::Result<(Roll, RecipeFile)> {
        let recipes = match &self.recipe {
            Some(path) => RecipeFile::load(path)?,
            None => RecipeFile::default(),
        };

        let folder = self.folder();
        let mut roll = revela
            .open_roll(&folder, &self.film_type)
            .with_context(|| format!("Cannot open roll {}", folder.display()))?;
        if roll.is_empty() {
            anyhow::bail!(
                "No frames found in {} (extensions: {})",
                folder.display(),
                revela.config().input.extensions.join(", ")
            );
        }
        recipes.apply(&mut roll);

        tracing::info!("Opened roll {} with {} frames", roll.name(), roll.len());
        Ok((roll, recipes))
    }
}

/// Calibrate on a blocking thread and hand the roll back.
pub async fn calibrate(
    revela: Arc<Revela>,
    mut roll: Roll,
) -> anyhow::Result<(Roll, Arc<CalibrationProfile>, CacheOutcome)> {
    let (roll, result) = run_blocking(move |progress, cancel| {
        let result = revela.calibrate(&mut roll, progress, cancel);
        (roll, result)
    })
    .await?;
    let (profile, outcome) = result.context("Calibration failed")?;
    Ok((roll, profile, outcome))
}
