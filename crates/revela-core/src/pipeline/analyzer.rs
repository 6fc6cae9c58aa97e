//! Roll calibration: three memory-bounded passes over downsampled density
//! proxies.
//!
//! 1. Base and leader density (Dmin/Dmax) from per-frame percentiles.
//! 2. Mean net-density histogram, giving the extrema density and clip threshold.
//! 3. Mean per-channel alignment coefficients.
//!
//! At most one proxy is alive at a time. Every reduction is associative, so
//! the result does not depend on frame order.

use std::cmp::Ordering;
use std::path::Path;
use std::sync::Arc;

use crate::calibration::CalibrationProfile;
use crate::color::source_curves;
use crate::config::AnalysisConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::kernels::{
    frame_target, normalize, percentile_from_histogram, samples_to_density, to_net_density,
    AlignmentEstimator, BinSpec, CoefficientAccumulator, FixedAlignment, FixedTarget,
    FrameHistogram, HistogramAccumulator, TargetEstimator,
};
use crate::math::{channel_percentiles, mean3};
use crate::recipe::{AlignMode, ReferenceMode, TechnicalRecipe};
use crate::roll::Roll;

use super::decode::{FrameSource, Resolution};
use super::memory::{MemoryGuard, MemoryProbe, ProcessMemory};
use super::progress::{CancelToken, ProgressSink, Reporter, Stage};

/// Anything that can turn a roll into a calibration profile.
pub trait RollAnalysis: Send + Sync {
    /// Identifiers of everything besides the recipe that shapes the
    /// statistics (estimators, proxy sampling); part of the cache key.
    fn key_inputs(&self) -> Vec<String>;

    fn analyze(
        &self,
        roll: &mut Roll,
        progress: &dyn ProgressSink,
        cancel: &CancelToken,
    ) -> PipelineResult<CalibrationProfile>;
}

/// Total order on density vectors: channel mean first, then components.
fn compare_vectors(a: &[f64; 3], b: &[f64; 3]) -> Ordering {
    mean3(a).total_cmp(&mean3(b)).then_with(|| {
        a.iter()
            .zip(b)
            .map(|(x, y)| x.total_cmp(y))
            .find(|o| o.is_ne())
            .unwrap_or(Ordering::Equal)
    })
}

/// Running base (lowest) and leader (highest) density vectors.
///
/// Vectors are replaced whole, never mixed channel by channel.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtremaCandidates {
    base: Option<[f64; 3]>,
    leader: Option<[f64; 3]>,
}

impl ExtremaCandidates {
    pub fn offer(&mut self, low: [f64; 3], high: [f64; 3]) {
        if self
            .base
            .map_or(true, |b| compare_vectors(&low, &b) == Ordering::Less)
        {
            self.base = Some(low);
        }
        if self
            .leader
            .map_or(true, |l| compare_vectors(&high, &l) == Ordering::Greater)
        {
            self.leader = Some(high);
        }
    }

    pub fn merge(&mut self, other: &ExtremaCandidates) {
        if let (Some(low), Some(high)) = (other.base, other.leader) {
            self.offer(low, high);
        }
    }

    /// `(d_min, d_max)` once at least one frame was offered.
    pub fn finish(&self) -> Option<([f64; 3], [f64; 3])> {
        Some((self.base?, self.leader?))
    }
}

/// The default [`RollAnalysis`] implementation.
pub struct Analyzer {
    source: Arc<dyn FrameSource>,
    config: AnalysisConfig,
    progress_interval: usize,
    target: Arc<dyn TargetEstimator>,
    alignment: Arc<dyn AlignmentEstimator>,
    memory: Arc<dyn MemoryProbe>,
}

impl Analyzer {
    pub fn new(source: Arc<dyn FrameSource>, config: AnalysisConfig) -> Self {
        Self {
            source,
            config,
            progress_interval: 1,
            target: Arc::new(FixedTarget::default()),
            alignment: Arc::new(FixedAlignment::default()),
            memory: Arc::new(ProcessMemory::new()),
        }
    }

    pub fn with_target_estimator(mut self, target: Arc<dyn TargetEstimator>) -> Self {
        self.target = target;
        self
    }

    pub fn with_alignment_estimator(mut self, alignment: Arc<dyn AlignmentEstimator>) -> Self {
        self.alignment = alignment;
        self
    }

    pub fn with_memory_probe(mut self, memory: Arc<dyn MemoryProbe>) -> Self {
        self.memory = memory;
        self
    }

    pub fn with_progress_interval(mut self, interval: usize) -> Self {
        self.progress_interval = interval.max(1);
        self
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Run all three passes, streaming frame by frame.
    pub fn analyze_roll(
        &self,
        roll: &mut Roll,
        progress: &dyn ProgressSink,
        cancel: &CancelToken,
    ) -> PipelineResult<CalibrationProfile> {
        self.run(roll, progress, cancel, false)
    }

    /// Like [`Analyzer::analyze_roll`], but the extrema pass works in groups
    /// of `batch_size` frames whose local candidates are merged globally.
    pub fn analyze_batched(
        &self,
        roll: &mut Roll,
        progress: &dyn ProgressSink,
        cancel: &CancelToken,
    ) -> PipelineResult<CalibrationProfile> {
        self.run(roll, progress, cancel, true)
    }

    fn run(
        &self,
        roll: &mut Roll,
        progress: &dyn ProgressSink,
        cancel: &CancelToken,
        batched: bool,
    ) -> PipelineResult<CalibrationProfile> {
        if roll.is_empty() {
            return Err(PipelineError::EmptyRoll(roll.folder().to_path_buf()));
        }
        roll.technical().validate()?;
        let recipe = roll.technical().clone();
        let reporter = Reporter::new(progress, self.progress_interval);
        tracing::info!(
            "Analyzing roll {} ({} frames{})",
            roll.name(),
            roll.len(),
            if batched { ", batched" } else { "" }
        );

        let (d_min, d_max) = match recipe.reference_mode {
            ReferenceMode::Manual => {
                tracing::debug!("Manual reference densities, skipping extrema pass");
                (recipe.manual_d_min, recipe.manual_d_max)
            }
            ReferenceMode::Auto if batched => {
                self.extrema_pass_batched(roll, &recipe, &reporter, cancel)?
            }
            ReferenceMode::Auto => self.extrema_pass(roll, &recipe, &reporter, cancel)?,
        };
        tracing::debug!("Dmin={:?} Dmax={:?}", d_min, d_max);

        let histogram = self.histogram_pass(roll, &recipe, d_min, d_max, &reporter, cancel)?;
        let extrema_density = percentile_from_histogram(
            &histogram.values,
            &histogram.bin_centers,
            recipe.extrema_high_density_percentile,
        );
        let high_density = percentile_from_histogram(
            &histogram.values,
            &histogram.bin_centers,
            recipe.high_density_percentile,
        );
        let clip_threshold =
            (extrema_density - high_density) / recipe.interpolation_factor + high_density;
        tracing::debug!(
            "Extrema density {:.4}, high density {:.4}, clip threshold {:.4}",
            extrema_density,
            high_density,
            clip_threshold
        );

        let alignment = match recipe.align_mode {
            AlignMode::Manual => {
                tracing::debug!("Manual alignment, skipping alignment pass");
                recipe.manual_alignment
            }
            AlignMode::Auto => {
                self.alignment_pass(roll, &recipe, d_min, extrema_density, &reporter, cancel)?
            }
        };

        tracing::info!(
            "Calibrated {}: extrema {:.4}, clip {:.4}, alignment {:?}",
            roll.name(),
            extrema_density,
            clip_threshold,
            alignment
        );

        Ok(CalibrationProfile {
            d_min,
            d_max,
            histogram,
            alignment,
            extrema_density,
            clip_threshold,
        })
    }

    /// Load a frame's proxy and convert it to density.
    fn density_proxy(&self, path: &Path, recipe: &TechnicalRecipe) -> PipelineResult<Vec<f32>> {
        let loaded = self.source.load(
            path,
            Resolution::Downsampled {
                max_edge: self.config.proxy_size,
            },
        )?;
        let curves = source_curves(&loaded.profile);
        let mut data = loaded.samples.into_raw();
        samples_to_density(&mut data, &curves, recipe.light_ratio);
        Ok(data)
    }

    fn frame_extrema(
        &self,
        path: &Path,
        recipe: &TechnicalRecipe,
    ) -> PipelineResult<([f64; 3], [f64; 3])> {
        let density = self.density_proxy(path, recipe)?;
        Ok((
            channel_percentiles(&density, recipe.dmin_percentile),
            channel_percentiles(&density, recipe.dmax_percentile),
        ))
    }

    fn extrema_pass(
        &self,
        roll: &mut Roll,
        recipe: &TechnicalRecipe,
        reporter: &Reporter<'_>,
        cancel: &CancelToken,
    ) -> PipelineResult<([f64; 3], [f64; 3])> {
        let guard = MemoryGuard::new(
            self.memory.as_ref(),
            self.config.memory_limit_mb,
            self.config.extrema_check_interval,
        );
        let total = roll.len();
        let mut candidates = ExtremaCandidates::default();

        for index in 0..total {
            cancel.check()?;
            let path = roll.frames()[index].path().to_path_buf();
            let (low, high) = self.frame_extrema(&path, recipe)?;
            candidates.offer(low, high);

            let done = index + 1;
            if guard.due(done) {
                reclaim(roll, &guard, Stage::Extrema);
            }
            reporter.tick(Stage::Extrema, done, total, file_label(&path));
        }

        candidates
            .finish()
            .ok_or_else(|| PipelineError::EmptyRoll(roll.folder().to_path_buf()))
    }

    fn extrema_pass_batched(
        &self,
        roll: &mut Roll,
        recipe: &TechnicalRecipe,
        reporter: &Reporter<'_>,
        cancel: &CancelToken,
    ) -> PipelineResult<([f64; 3], [f64; 3])> {
        // A check after every group.
        let guard = MemoryGuard::new(self.memory.as_ref(), self.config.memory_limit_mb, 1);
        let total = roll.len();
        let batch_size = self.config.batch_size.max(1);
        let mut global = ExtremaCandidates::default();

        let mut start = 0;
        while start < total {
            let end = (start + batch_size).min(total);
            let mut group = ExtremaCandidates::default();
            for index in start..end {
                cancel.check()?;
                let path = roll.frames()[index].path().to_path_buf();
                let (low, high) = self.frame_extrema(&path, recipe)?;
                group.offer(low, high);
                reporter.tick(Stage::Extrema, index + 1, total, file_label(&path));
            }
            global.merge(&group);
            tracing::debug!("Merged extrema of frames {}..{}", start, end);
            reclaim(roll, &guard, Stage::Extrema);
            start = end;
        }

        global
            .finish()
            .ok_or_else(|| PipelineError::EmptyRoll(roll.folder().to_path_buf()))
    }

    fn histogram_pass(
        &self,
        roll: &mut Roll,
        recipe: &TechnicalRecipe,
        d_min: [f64; 3],
        d_max: [f64; 3],
        reporter: &Reporter<'_>,
        cancel: &CancelToken,
    ) -> PipelineResult<crate::calibration::RollHistogram> {
        let guard = MemoryGuard::new(
            self.memory.as_ref(),
            self.config.memory_limit_mb,
            self.config.histogram_check_interval,
        );
        let total = roll.len();
        let mut accumulator = HistogramAccumulator::new(BinSpec::for_density(recipe.bins, d_max));

        for index in 0..total {
            cancel.check()?;
            let path = roll.frames()[index].path().to_path_buf();
            let mut net = self.density_proxy(&path, recipe)?;
            to_net_density(&mut net, d_min);
            let histogram = FrameHistogram::from_interleaved(&net, accumulator.spec());
            drop(net);
            accumulator.add(&histogram);

            let done = index + 1;
            if guard.due(done) {
                reclaim(roll, &guard, Stage::Histogram);
            }
            reporter.tick(Stage::Histogram, done, total, file_label(&path));
        }

        accumulator
            .finish()
            .ok_or_else(|| PipelineError::EmptyRoll(roll.folder().to_path_buf()))
    }

    fn alignment_pass(
        &self,
        roll: &mut Roll,
        recipe: &TechnicalRecipe,
        d_min: [f64; 3],
        extrema_density: f64,
        reporter: &Reporter<'_>,
        cancel: &CancelToken,
    ) -> PipelineResult<[f64; 3]> {
        let guard = MemoryGuard::new(
            self.memory.as_ref(),
            self.config.memory_limit_mb,
            self.config.alignment_check_interval,
        );
        let total = roll.len();
        let mut accumulator = CoefficientAccumulator::default();

        for index in 0..total {
            cancel.check()?;
            let path = roll.frames()[index].path().to_path_buf();
            let mut net = self.density_proxy(&path, recipe)?;
            to_net_density(&mut net, d_min);
            let target = frame_target(recipe, &net, self.target.as_ref());
            normalize(&mut net, extrema_density, target);
            let k = self.alignment.coefficients(&net, recipe.efficiency_power);
            tracing::trace!("{:?}: target {:.4}, coefficients {:?}", path, target, k);
            accumulator.add(k);

            let done = index + 1;
            if guard.due(done) {
                reclaim(roll, &guard, Stage::Alignment);
            }
            reporter.tick(Stage::Alignment, done, total, file_label(&path));
        }

        accumulator
            .finish()
            .ok_or_else(|| PipelineError::EmptyRoll(roll.folder().to_path_buf()))
    }
}

impl RollAnalysis for Analyzer {
    fn key_inputs(&self) -> Vec<String> {
        vec![
            self.target.id(),
            self.alignment.id(),
            format!("proxy:{}", self.config.proxy_size),
        ]
    }

    fn analyze(
        &self,
        roll: &mut Roll,
        progress: &dyn ProgressSink,
        cancel: &CancelToken,
    ) -> PipelineResult<CalibrationProfile> {
        if self.config.batched {
            self.analyze_batched(roll, progress, cancel)
        } else {
            self.analyze_roll(roll, progress, cancel)
        }
    }
}

fn reclaim(roll: &mut Roll, guard: &MemoryGuard<'_>, stage: Stage) {
    if let Some(used) = guard.over_limit() {
        tracing::warn!(
            "Memory usage {} MB exceeds {} MB during {}, releasing frame buffers",
            used,
            guard.limit_mb(),
            stage
        );
        roll.release_all_frames();
    }
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::pipeline::decode::LoadedFrame;
    use crate::pipeline::memory::FixedMemory;
    use crate::pipeline::progress::{NoProgress, ProgressEvent};
    use crate::roll::{Frame, SourceProfile};
    use image::Rgb32FImage;
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::sync::Mutex;

    /// Frames held in memory, keyed by path. Each frame is a uniform patch
    /// plus a gradient so percentiles differ per channel.
    pub(crate) struct MemorySource {
        frames: HashMap<PathBuf, Rgb32FImage>,
        pub(crate) loads: Mutex<usize>,
    }

    impl MemorySource {
        pub(crate) fn new(frames: Vec<(PathBuf, Rgb32FImage)>) -> Self {
            Self {
                frames: frames.into_iter().collect(),
                loads: Mutex::new(0),
            }
        }
    }

    impl FrameSource for MemorySource {
        fn load(&self, path: &Path, resolution: Resolution) -> PipelineResult<LoadedFrame> {
            *self.loads.lock().unwrap() += 1;
            let samples = self
                .frames
                .get(path)
                .cloned()
                .ok_or_else(|| PipelineError::FileNotFound(path.to_path_buf()))?;
            Ok(LoadedFrame {
                samples: crate::pipeline::decode::downsample(samples, resolution),
                profile: SourceProfile::Untagged,
            })
        }
    }

    /// A 16x16 frame whose transmittance varies smoothly around `level`.
    pub(crate) fn synthetic_frame(level: [f32; 3]) -> Rgb32FImage {
        Rgb32FImage::from_fn(16, 16, |x, y| {
            let t = 0.5 + (x + 16 * y) as f32 / 512.0;
            image::Rgb([level[0] * t, level[1] * t, level[2] * t])
        })
    }

    pub(crate) fn synthetic_roll(levels: &[[f32; 3]]) -> (Roll, Arc<MemorySource>) {
        let mut frames = Vec::new();
        let mut images = Vec::new();
        for (i, level) in levels.iter().enumerate() {
            let path = PathBuf::from(format!("/roll/f{i:02}.tif"));
            images.push((path.clone(), synthetic_frame(*level)));
            frames.push(Frame::new(path));
        }
        let roll = Roll::from_frames("/scans/roll", "Portra400", frames);
        (roll, Arc::new(MemorySource::new(images)))
    }

    const LEVELS: [[f32; 3]; 4] = [
        [0.8, 0.6, 0.4],
        [0.3, 0.2, 0.1],
        [0.5, 0.5, 0.5],
        [0.05, 0.04, 0.02],
    ];

    fn analyzer(source: Arc<MemorySource>) -> Analyzer {
        Analyzer::new(source, AnalysisConfig::default()).with_memory_probe(Arc::new(FixedMemory(0)))
    }

    #[test]
    fn test_compare_vectors_mean_then_lexicographic() {
        assert_eq!(
            compare_vectors(&[0.1, 0.2, 0.3], &[0.3, 0.2, 0.2]),
            Ordering::Less
        );
        // equal means
        assert_eq!(
            compare_vectors(&[0.1, 0.3, 0.2], &[0.2, 0.2, 0.2]),
            Ordering::Less
        );
        assert_eq!(
            compare_vectors(&[0.2, 0.2, 0.2], &[0.2, 0.2, 0.2]),
            Ordering::Equal
        );
    }

    #[test]
    fn test_extrema_candidates_whole_vector_replacement() {
        let mut c = ExtremaCandidates::default();
        c.offer([0.3, 0.1, 0.9], [1.0, 2.0, 3.0]);
        c.offer([0.2, 0.5, 0.2], [2.5, 0.5, 2.5]);
        let (d_min, d_max) = c.finish().unwrap();
        // mean 0.3 beats 0.433; vectors stay intact
        assert_eq!(d_min, [0.2, 0.5, 0.2]);
        assert_eq!(d_max, [1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_extrema_tie_break_is_order_independent() {
        let a = ([0.1, 0.3, 0.2], [1.0, 2.0, 3.0]);
        let b = ([0.2, 0.2, 0.2], [3.0, 2.0, 1.0]);
        let mut forward = ExtremaCandidates::default();
        forward.offer(a.0, a.1);
        forward.offer(b.0, b.1);
        let mut backward = ExtremaCandidates::default();
        backward.offer(b.0, b.1);
        backward.offer(a.0, a.1);
        assert_eq!(forward.finish(), backward.finish());
    }

    #[test]
    fn test_empty_roll_is_an_error() {
        let (mut roll, source) = synthetic_roll(&[]);
        let err = analyzer(source)
            .analyze(&mut roll, &NoProgress, &CancelToken::new())
            .unwrap_err();
        assert!(matches!(err, PipelineError::EmptyRoll(_)));
    }

    #[test]
    fn test_profile_invariants() {
        let (mut roll, source) = synthetic_roll(&LEVELS);
        let profile = analyzer(source)
            .analyze(&mut roll, &NoProgress, &CancelToken::new())
            .unwrap();

        for c in 0..3 {
            assert!(profile.d_min[c] < profile.d_max[c]);
        }
        assert_eq!(profile.histogram.bins(), 1024);
        assert!(profile.extrema_density > 0.0);
        assert!(profile.clip_threshold <= profile.extrema_density);
        assert_eq!(profile.alignment, [1.0, 0.9, 0.95]);
    }

    #[test]
    fn test_batched_matches_sequential() {
        let (mut roll, source) = synthetic_roll(&LEVELS);
        let config = AnalysisConfig {
            batch_size: 3,
            ..Default::default()
        };
        let analyzer = Analyzer::new(source, config).with_memory_probe(Arc::new(FixedMemory(0)));
        let sequential = analyzer
            .analyze_roll(&mut roll, &NoProgress, &CancelToken::new())
            .unwrap();
        let batched = analyzer
            .analyze_batched(&mut roll, &NoProgress, &CancelToken::new())
            .unwrap();
        assert_eq!(sequential, batched);
    }

    #[test]
    fn test_manual_modes_skip_passes() {
        let (mut roll, source) = synthetic_roll(&LEVELS);
        roll.set_technical(TechnicalRecipe {
            reference_mode: ReferenceMode::Manual,
            align_mode: AlignMode::Manual,
            ..TechnicalRecipe::default()
        });
        let analyzer = analyzer(source.clone());
        let profile = analyzer
            .analyze(&mut roll, &NoProgress, &CancelToken::new())
            .unwrap();
        assert_eq!(profile.d_min, roll.technical().manual_d_min);
        assert_eq!(profile.d_max, roll.technical().manual_d_max);
        assert_eq!(profile.alignment, [1.0, 0.94, 0.88]);
        // histogram pass only
        assert_eq!(*source.loads.lock().unwrap(), LEVELS.len());
    }

    #[test]
    fn test_cancellation_stops_analysis() {
        let (mut roll, source) = synthetic_roll(&LEVELS);
        let cancel = CancelToken::new();
        cancel.cancel();
        let err = analyzer(source)
            .analyze(&mut roll, &NoProgress, &cancel)
            .unwrap_err();
        assert!(matches!(err, PipelineError::Cancelled));
    }

    #[test]
    fn test_progress_reports_every_stage() {
        let (mut roll, source) = synthetic_roll(&LEVELS);
        let events = Mutex::new(Vec::new());
        let sink = |e: ProgressEvent| events.lock().unwrap().push((e.stage, e.done));
        analyzer(source)
            .with_progress_interval(2)
            .analyze(&mut roll, &sink, &CancelToken::new())
            .unwrap();
        let events = events.into_inner().unwrap();
        assert_eq!(
            events,
            vec![
                (Stage::Extrema, 2),
                (Stage::Extrema, 4),
                (Stage::Histogram, 2),
                (Stage::Histogram, 4),
                (Stage::Alignment, 2),
                (Stage::Alignment, 4),
            ]
        );
    }

    #[test]
    fn test_memory_pressure_releases_frames() {
        let (mut roll, source) = synthetic_roll(&LEVELS);
        for frame in roll.frames_mut() {
            frame.thumbnail = Some(Rgb32FImage::new(2, 2));
        }
        let config = AnalysisConfig {
            memory_limit_mb: 1,
            extrema_check_interval: 1,
            ..Default::default()
        };
        Analyzer::new(source, config)
            .with_memory_probe(Arc::new(FixedMemory(64 * 1024 * 1024)))
            .analyze(&mut roll, &NoProgress, &CancelToken::new())
            .unwrap();
        assert_eq!(roll.memory_usage().frames_with_data, 0);
    }

    #[test]
    fn test_invalid_recipe_is_rejected_before_loading() {
        let broken = [
            TechnicalRecipe {
                bins: 0,
                ..Default::default()
            },
            TechnicalRecipe {
                interpolation_factor: 0.0,
                ..Default::default()
            },
        ];
        for recipe in broken {
            let (mut roll, source) = synthetic_roll(&LEVELS);
            roll.set_technical(recipe);
            let err = analyzer(source.clone())
                .analyze(&mut roll, &NoProgress, &CancelToken::new())
                .unwrap_err();
            assert!(matches!(err, PipelineError::InvalidRecipe(_)), "{err}");
            assert_eq!(*source.loads.lock().unwrap(), 0);
        }
    }

    #[test]
    fn test_proxy_size_is_a_key_input() {
        let (_, source) = synthetic_roll(&LEVELS);
        let small = Analyzer::new(
            source.clone(),
            AnalysisConfig {
                proxy_size: 4,
                ..Default::default()
            },
        );
        let inputs = small.key_inputs();
        assert!(inputs.contains(&"proxy:4".to_string()));
        assert_ne!(inputs, analyzer(source).key_inputs());
    }

    #[test]
    fn test_missing_frame_is_fatal() {
        let (mut roll, _) = synthetic_roll(&LEVELS);
        let empty = Arc::new(MemorySource::new(vec![]));
        let err = analyzer(empty)
            .analyze(&mut roll, &NoProgress, &CancelToken::new())
            .unwrap_err();
        assert!(matches!(err, PipelineError::FileNotFound(_)));
    }
}
