//! Stateless numeric kernels over interleaved RGB `f32` buffers.
//!
//! - **density**: transmittance to density, net density, normalization, clipping
//! - **histogram**: fixed-range histograms and their roll-wide mean
//! - **alignment**: target density and channel alignment estimators
//! - **tone**: tone curves and highlight rolloff
//! - **lut**: `.cube` 3-D LUTs

pub mod alignment;
pub mod density;
pub mod histogram;
pub mod lut;
pub mod tone;

pub use alignment::{
    align_channels, frame_target, AlignmentEstimator, CoefficientAccumulator, FixedAlignment,
    FixedTarget, NeutralAxisAlignment, PercentileTarget, TargetEstimator,
};
pub use density::{
    clip_above, normalize, samples_to_density, to_net_density, transmittance_to_density,
    RenderingTransform,
};
pub use histogram::{percentile_from_histogram, BinSpec, FrameHistogram, HistogramAccumulator};
pub use lut::{Lut3d, LutDirectory, LutProvider};
pub use tone::{apply_tone_curve, rolloff, rolloff_preserving_max, RolloffParams};
