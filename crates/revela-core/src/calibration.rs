//! Roll-wide calibration results.

use serde::{Deserialize, Serialize};

/// Bin-wise mean histogram of net density over every frame of a roll.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollHistogram {
    /// Bin midpoints
    pub bin_centers: Vec<f64>,
    /// Mean count per bin for the combined (all-channel) signal
    pub values: Vec<f64>,
    /// Mean count per bin for each channel
    pub channel_values: [Vec<f64>; 3],
}

impl RollHistogram {
    pub fn bins(&self) -> usize {
        self.bin_centers.len()
    }
}

/// Calibration statistics for one (roll, technical recipe) pair.
///
/// Produced once by the analyzer and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationProfile {
    /// Per-channel base density
    pub d_min: [f64; 3],
    /// Per-channel maximum density
    pub d_max: [f64; 3],
    pub histogram: RollHistogram,
    /// Per-channel alignment scale factors
    pub alignment: [f64; 3],
    /// Net density at the extrema percentile of the roll histogram
    pub extrema_density: f64,
    /// Net density above which frames are clipped, before target scaling
    pub clip_threshold: f64,
}

impl CalibrationProfile {
    /// Clip bound for a frame normalized to `frame_target`.
    ///
    /// Scales linearly with the target: the ratio bound/target is constant
    /// across every frame of the roll.
    pub fn clip_bound(&self, frame_target: f64) -> f64 {
        if self.extrema_density > 0.0 {
            self.clip_threshold / self.extrema_density * frame_target
        } else {
            frame_target
        }
    }
}
