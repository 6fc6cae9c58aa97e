//! The `revela preview` command: render one frame to a PNG.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Args;
use revela_core::color::OutputSpace;
use revela_core::pipeline::encode::encode;
use revela_core::recipe::DisplayMode;
use revela_core::{Config, ExportFormat, RenderReport, Revela};

use super::progress::run_blocking;
use super::recipe::{parse_selection, parse_size};
use super::roll::{calibrate, RollArgs};

/// Arguments for the `preview` command.
#[derive(Args, Debug)]
pub struct PreviewArgs {
    #[command(flatten)]
    pub roll: RollArgs,

    /// Frame number (1-based)
    #[arg(long, default_value = "1")]
    pub frame: String,

    /// Bounding size as WxH or a single long edge (defaults to render.preview_size)
    #[arg(long)]
    pub size: Option<String>,

    /// PNG file to write
    #[arg(short, long, required = true)]
    pub out: PathBuf,
}

/// Execute the preview command.
pub async fn execute(config: Config, args: PreviewArgs) -> anyhow::Result<()> {
    let revela = Arc::new(Revela::new(config));
    let (roll, _) = args.roll.open(&revela)?;

    let index = match parse_selection(&args.frame, roll.len())?.as_slice() {
        [index] => *index,
        _ => anyhow::bail!("--frame takes a single frame number"),
    };
    let max_edge = args.size.as_deref().map(parse_size).transpose()?;

    let (roll, _, _) = calibrate(revela.clone(), roll).await?;

    let out = args.out.clone();
    let report: RenderReport = run_blocking(move |_, _| -> anyhow::Result<RenderReport> {
        let mut roll = roll;
        let report = revela.preview(&mut roll, index, max_edge)?;

        let frame = roll
            .frames_mut()
            .get_mut(index)
            .context("Frame disappeared from the roll")?;
        let rendered = frame
            .processed
            .take()
            .context("Renderer produced no output")?;

        // Tag the PNG with the space the preview was encoded in.
        let space = match frame.creative.display_mode {
            DisplayMode::Displays => OutputSpace::for_display(frame.creative.display_space),
            DisplayMode::Lut => OutputSpace::rec709(),
        };
        let icc = space.icc()?;

        let bytes = encode(&rendered, ExportFormat::Png, 100, Some(&icc), &out)?;
        std::fs::write(&out, bytes)
            .with_context(|| format!("Failed to write {}", out.display()))?;
        Ok(report)
    })
    .await??;

    tracing::info!(
        "Preview {}x{} written to {} (target {:.3}, clip {:.3}{})",
        report.width,
        report.height,
        args.out.display(),
        report.target,
        report.clip_bound,
        if report.rolloff_applied { ", rolloff" } else { "" }
    );
    println!("{}", args.out.display());
    Ok(())
}
