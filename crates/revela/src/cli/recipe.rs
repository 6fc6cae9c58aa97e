//! Recipe files and argument parsing shared by the roll commands.
//!
//! A recipe file is TOML with optional `[technical]`, `[creative]` and
//! `[export]` tables; missing keys take their defaults.

use std::collections::BTreeSet;
use std::path::Path;

use anyhow::Context;
use serde::Deserialize;

use revela_core::{CreativeRecipe, ExportRecipe, Roll, TechnicalRecipe};

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RecipeFile {
    pub technical: Option<TechnicalRecipe>,
    pub creative: Option<CreativeRecipe>,
    pub export: Option<ExportRecipe>,
}

impl RecipeFile {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read recipe {}", path.display()))?;
        Self::from_toml(&content).with_context(|| format!("Invalid recipe {}", path.display()))
    }

    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        let file: RecipeFile = toml::from_str(content)?;
        if let Some(technical) = &file.technical {
            technical.validate()?;
        }
        if let Some(export) = &file.export {
            export.validate()?;
        }
        Ok(file)
    }

    /// Install the technical recipe on the roll and the creative recipe on
    /// every frame.
    pub fn apply(&self, roll: &mut Roll) {
        if let Some(technical) = &self.technical {
            roll.set_technical(technical.clone());
        }
        if let Some(creative) = &self.creative {
            for frame in roll.frames_mut() {
                frame.creative = creative.clone();
            }
        }
    }
}

/// Parse a 1-based frame selection such as `1,3-5` into sorted 0-based
/// indices.
pub fn parse_selection(spec: &str, len: usize) -> anyhow::Result<Vec<usize>> {
    let mut picked = BTreeSet::new();
    for part in spec.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let (start, end) = match part.split_once('-') {
            Some((a, b)) => (parse_frame_number(a)?, parse_frame_number(b)?),
            None => {
                let n = parse_frame_number(part)?;
                (n, n)
            }
        };
        if start > end {
            anyhow::bail!("Frame range {part} is reversed");
        }
        if end > len {
            anyhow::bail!("Frame {end} is out of range: the roll has {len} frames");
        }
        picked.extend(start - 1..end);
    }
    if picked.is_empty() {
        anyhow::bail!("Frame selection {spec:?} is empty");
    }
    Ok(picked.into_iter().collect())
}

fn parse_frame_number(s: &str) -> anyhow::Result<usize> {
    let n: usize = s
        .trim()
        .parse()
        .with_context(|| format!("Invalid frame number {s:?}"))?;
    if n == 0 {
        anyhow::bail!("Frame numbers start at 1");
    }
    Ok(n)
}

/// Long edge for a `WxH` or `N` size argument.
pub fn parse_size(s: &str) -> anyhow::Result<u32> {
    let edge = match s.split_once(['x', 'X']) {
        Some((w, h)) => {
            let w: u32 = w.trim().parse().with_context(|| format!("Invalid width in {s:?}"))?;
            let h: u32 = h.trim().parse().with_context(|| format!("Invalid height in {s:?}"))?;
            w.max(h)
        }
        None => s.trim().parse().with_context(|| format!("Invalid size {s:?}"))?,
    };
    if edge == 0 {
        anyhow::bail!("Size must be positive");
    }
    Ok(edge)
}
