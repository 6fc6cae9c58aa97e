//! 3-D lookup tables in Adobe `.cube` format.

use ndarray::Array4;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::error::{PipelineError, PipelineResult};
use crate::math::max_value;

/// A cubic 3-D LUT, stored as `[blue][green][red][channel]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Lut3d {
    pub title: Option<String>,
    size: usize,
    domain_min: [f32; 3],
    domain_max: [f32; 3],
    table: Array4<f32>,
}

impl Lut3d {
    /// Parse `.cube` text. `name` is only used in error messages.
    pub fn parse_cube(name: &str, text: &str) -> PipelineResult<Self> {
        let err = |message: String| PipelineError::Lut {
            name: name.to_string(),
            message,
        };
        let mut title = None;
        let mut size = None;
        let mut domain_min = [0.0f32; 3];
        let mut domain_max = [1.0f32; 3];
        let mut values = Vec::new();

        for (line_no, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut parts = line.split_whitespace();
            let Some(head) = parts.next() else { continue };
            match head {
                "TITLE" => {
                    title = Some(line["TITLE".len()..].trim().trim_matches('"').to_string());
                }
                "LUT_3D_SIZE" => {
                    let n: usize = parts
                        .next()
                        .and_then(|v| v.parse().ok())
                        .ok_or_else(|| err(format!("line {}: bad LUT_3D_SIZE", line_no + 1)))?;
                    if !(2..=256).contains(&n) {
                        return Err(err(format!("LUT_3D_SIZE {n} out of range")));
                    }
                    size = Some(n);
                }
                "DOMAIN_MIN" | "DOMAIN_MAX" => {
                    let triple = parse_triple(parts)
                        .ok_or_else(|| err(format!("line {}: bad {head}", line_no + 1)))?;
                    if head == "DOMAIN_MIN" {
                        domain_min = triple;
                    } else {
                        domain_max = triple;
                    }
                }
                "LUT_1D_SIZE" => {
                    return Err(err("1-D LUTs are not supported".into()));
                }
                _ if head.starts_with(|c: char| c.is_ascii_digit() || c == '-' || c == '.') => {
                    let rest = std::iter::once(head).chain(parts);
                    let triple = parse_triple(rest)
                        .ok_or_else(|| err(format!("line {}: bad table entry", line_no + 1)))?;
                    values.extend_from_slice(&triple);
                }
                other => {
                    tracing::debug!("Ignoring .cube keyword '{other}' in {name}");
                }
            }
        }

        let size = size.ok_or_else(|| err("missing LUT_3D_SIZE".into()))?;
        let expected = size * size * size * 3;
        if values.len() != expected {
            return Err(err(format!(
                "expected {} entries, found {}",
                expected / 3,
                values.len() / 3
            )));
        }
        if (0..3).any(|c| domain_max[c] <= domain_min[c]) {
            return Err(err("DOMAIN_MAX must exceed DOMAIN_MIN".into()));
        }
        let table = Array4::from_shape_vec((size, size, size, 3), values)
            .map_err(|e| err(e.to_string()))?;
        Ok(Self {
            title,
            size,
            domain_min,
            domain_max,
            table,
        })
    }

    pub fn load(path: &Path) -> PipelineResult<Self> {
        let name = path.display().to_string();
        let text = std::fs::read_to_string(path).map_err(|e| PipelineError::Lut {
            name: name.clone(),
            message: e.to_string(),
        })?;
        Self::parse_cube(&name, &text)
    }

    /// Identity table of the given size over `[0, 1]`.
    pub fn identity(size: usize) -> Self {
        let size = size.max(2);
        let step = 1.0 / (size - 1) as f32;
        let table = Array4::from_shape_fn((size, size, size, 3), |(b, g, r, c)| {
            [r, g, b][c] as f32 * step
        });
        Self {
            title: Some("identity".into()),
            size,
            domain_min: [0.0; 3],
            domain_max: [1.0; 3],
            table,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Trilinear lookup of one RGB triple expressed in the LUT's domain.
    pub fn sample(&self, rgb: [f32; 3]) -> [f32; 3] {
        let n1 = (self.size - 1) as f32;
        let mut base = [0usize; 3];
        let mut frac = [0.0f32; 3];
        for c in 0..3 {
            let span = self.domain_max[c] - self.domain_min[c];
            let pos = ((rgb[c] - self.domain_min[c]) / span).clamp(0.0, 1.0) * n1;
            let i = (pos.floor() as usize).min(self.size - 2);
            base[c] = i;
            frac[c] = pos - i as f32;
        }
        let [r0, g0, b0] = base;
        let [fr, fg, fb] = frac;

        let mut out = [0.0f32; 3];
        for (c, slot) in out.iter_mut().enumerate() {
            let at = |dr: usize, dg: usize, db: usize| self.table[[b0 + db, g0 + dg, r0 + dr, c]];
            let c00 = at(0, 0, 0) + (at(1, 0, 0) - at(0, 0, 0)) * fr;
            let c10 = at(0, 1, 0) + (at(1, 1, 0) - at(0, 1, 0)) * fr;
            let c01 = at(0, 0, 1) + (at(1, 0, 1) - at(0, 0, 1)) * fr;
            let c11 = at(0, 1, 1) + (at(1, 1, 1) - at(0, 1, 1)) * fr;
            let c0 = c00 + (c10 - c00) * fg;
            let c1 = c01 + (c11 - c01) * fg;
            *slot = c0 + (c1 - c0) * fb;
        }
        out
    }

    /// Normalize the buffer by its max into the LUT domain and look every
    /// pixel up.
    pub fn apply(&self, data: &mut [f32]) {
        let max = max_value(data);
        let scale = if max > 0.0 { 1.0 / max } else { 1.0 };
        for px in data.chunks_exact_mut(3) {
            let mut rgb = [0.0f32; 3];
            for c in 0..3 {
                let unit = (px[c] * scale).clamp(0.0, 1.0);
                rgb[c] = self.domain_min[c] + unit * (self.domain_max[c] - self.domain_min[c]);
            }
            px.copy_from_slice(&self.sample(rgb));
        }
    }
}

fn parse_triple<'a>(mut parts: impl Iterator<Item = &'a str>) -> Option<[f32; 3]> {
    let mut out = [0.0f32; 3];
    for slot in out.iter_mut() {
        *slot = parts.next()?.parse().ok()?;
    }
    Some(out)
}

/// Resolves LUT names to tables.
pub trait LutProvider: Send + Sync {
    fn load(&self, name: &str) -> PipelineResult<Arc<Lut3d>>;
}

/// Loads `<dir>/<name>.cube` and keeps every table it has parsed.
pub struct LutDirectory {
    dir: PathBuf,
    cache: Mutex<HashMap<String, Arc<Lut3d>>>,
}

impl LutDirectory {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn path_for(&self, name: &str) -> PathBuf {
        if name.ends_with(".cube") {
            self.dir.join(name)
        } else {
            self.dir.join(format!("{name}.cube"))
        }
    }
}

impl LutProvider for LutDirectory {
    fn load(&self, name: &str) -> PipelineResult<Arc<Lut3d>> {
        if let Ok(cache) = self.cache.lock() {
            if let Some(lut) = cache.get(name) {
                return Ok(Arc::clone(lut));
            }
        }
        let path = self.path_for(name);
        if !path.exists() {
            return Err(PipelineError::Lut {
                name: name.to_string(),
                message: format!("no table at {}", path.display()),
            });
        }
        let lut = Arc::new(Lut3d::load(&path)?);
        tracing::debug!("Loaded {}^3 LUT '{name}' from {:?}", lut.size(), path);
        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(name.to_string(), Arc::clone(&lut));
        }
        Ok(lut)
    }
}
