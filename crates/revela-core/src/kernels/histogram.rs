//! Fixed-range histograms over net density and their roll-wide mean.

use crate::calibration::RollHistogram;

/// Closed value range `[lo, hi]` split into `bins` equal bins.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BinSpec {
    pub bins: usize,
    pub lo: f64,
    pub hi: f64,
}

impl BinSpec {
    /// Range used for the roll histogram: `[-0.1, max(d_max) + 0.1]`.
    pub fn for_density(bins: usize, d_max: [f64; 3]) -> Self {
        let top = d_max.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        Self {
            bins,
            lo: -0.1,
            hi: top + 0.1,
        }
    }

    /// Bin index of `v`; the last bin includes `hi`, out-of-range values
    /// (and NaN) fall outside every bin.
    pub fn index(&self, v: f64) -> Option<usize> {
        if !(v >= self.lo && v <= self.hi) || self.hi <= self.lo {
            return None;
        }
        let pos = (v - self.lo) / (self.hi - self.lo) * self.bins as f64;
        Some((pos as usize).min(self.bins - 1))
    }

    /// Midpoints between consecutive bin edges.
    pub fn centers(&self) -> Vec<f64> {
        let width = (self.hi - self.lo) / self.bins as f64;
        (0..self.bins)
            .map(|i| self.lo + width * (i as f64 + 0.5))
            .collect()
    }
}

/// Raw per-bin counts for one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameHistogram {
    pub combined: Vec<f64>,
    pub channels: [Vec<f64>; 3],
}

impl FrameHistogram {
    /// Count an interleaved RGB net-density buffer: every sample into the
    /// combined histogram, and each channel into its own.
    pub fn from_interleaved(data: &[f32], spec: &BinSpec) -> Self {
        let mut combined = vec![0.0; spec.bins];
        let mut channels = [
            vec![0.0; spec.bins],
            vec![0.0; spec.bins],
            vec![0.0; spec.bins],
        ];
        for px in data.chunks_exact(3) {
            for (c, v) in px.iter().enumerate() {
                if let Some(i) = spec.index(f64::from(*v)) {
                    combined[i] += 1.0;
                    channels[c][i] += 1.0;
                }
            }
        }
        Self { combined, channels }
    }
}

/// Bin-wise running sum of frame histograms.
///
/// The mean weighs every frame equally regardless of its pixel count.
/// Accumulators merge associatively, so frames can be counted in any order
/// or in parallel.
#[derive(Debug, Clone)]
pub struct HistogramAccumulator {
    spec: BinSpec,
    frames: u64,
    combined: Vec<f64>,
    channels: [Vec<f64>; 3],
}

impl HistogramAccumulator {
    pub fn new(spec: BinSpec) -> Self {
        Self {
            spec,
            frames: 0,
            combined: vec![0.0; spec.bins],
            channels: [
                vec![0.0; spec.bins],
                vec![0.0; spec.bins],
                vec![0.0; spec.bins],
            ],
        }
    }

    pub fn spec(&self) -> &BinSpec {
        &self.spec
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn add(&mut self, frame: &FrameHistogram) {
        add_into(&mut self.combined, &frame.combined);
        for (sum, counts) in self.channels.iter_mut().zip(&frame.channels) {
            add_into(sum, counts);
        }
        self.frames += 1;
    }

    pub fn merge(&mut self, other: &HistogramAccumulator) {
        add_into(&mut self.combined, &other.combined);
        for (sum, counts) in self.channels.iter_mut().zip(&other.channels) {
            add_into(sum, counts);
        }
        self.frames += other.frames;
    }

    /// Bin-wise mean over every added frame, `None` if nothing was added.
    pub fn finish(self) -> Option<RollHistogram> {
        if self.frames == 0 {
            return None;
        }
        let n = self.frames as f64;
        let mean = |v: Vec<f64>| v.into_iter().map(|x| x / n).collect::<Vec<_>>();
        let [r, g, b] = self.channels;
        Some(RollHistogram {
            bin_centers: self.spec.centers(),
            values: mean(self.combined),
            channel_values: [mean(r), mean(g), mean(b)],
        })
    }
}

fn add_into(sum: &mut [f64], counts: &[f64]) {
    for (s, c) in sum.iter_mut().zip(counts) {
        *s += c;
    }
}

/// Inverse-CDF lookup: the value at `pct` percent of the histogram mass,
/// interpolated linearly between bin centers.
pub fn percentile_from_histogram(values: &[f64], centers: &[f64], pct: f64) -> f64 {
    let total: f64 = values.iter().sum();
    if total <= 0.0 || centers.is_empty() {
        return 0.0;
    }
    let q = (pct / 100.0).clamp(0.0, 1.0);
    let mut cumulative = 0.0;
    let mut previous = 0.0;
    for (i, (v, center)) in values.iter().zip(centers).enumerate() {
        cumulative += v / total;
        if cumulative >= q {
            if i == 0 || cumulative <= previous {
                return *center;
            }
            let t = (q - previous) / (cumulative - previous);
            return centers[i - 1] + (center - centers[i - 1]) * t;
        }
        previous = cumulative;
    }
    centers[centers.len() - 1]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> BinSpec {
        BinSpec {
            bins: 4,
            lo: 0.0,
            hi: 4.0,
        }
    }

    #[test]
    fn test_index_includes_upper_edge_and_drops_outliers() {
        let s = spec();
        assert_eq!(s.index(0.0), Some(0));
        assert_eq!(s.index(0.99), Some(0));
        assert_eq!(s.index(1.0), Some(1));
        assert_eq!(s.index(4.0), Some(3));
        assert_eq!(s.index(4.01), None);
        assert_eq!(s.index(-0.01), None);
        assert_eq!(s.index(f64::NAN), None);
    }

    #[test]
    fn test_centers_are_edge_midpoints() {
        assert_eq!(spec().centers(), vec![0.5, 1.5, 2.5, 3.5]);
    }

    #[test]
    fn test_density_range() {
        let s = BinSpec::for_density(1024, [1.0, 1.8, 1.2]);
        assert!((s.lo + 0.1).abs() < 1e-12);
        assert!((s.hi - 1.9).abs() < 1e-12);
    }

    #[test]
    fn test_frame_histogram_counts_channels() {
        let data = [0.5, 1.5, 2.5, 0.5, 1.5, 3.5];
        let h = FrameHistogram::from_interleaved(&data, &spec());
        assert_eq!(h.combined, vec![2.0, 2.0, 1.0, 1.0]);
        assert_eq!(h.channels[0], vec![2.0, 0.0, 0.0, 0.0]);
        assert_eq!(h.channels[2], vec![0.0, 0.0, 1.0, 1.0]);
    }

    #[test]
    fn test_mean_is_per_frame_not_per_pixel() {
        // frame A: 1 pixel, frame B: 100 pixels; the mean weighs them equally
        let a = FrameHistogram::from_interleaved(&[0.5, 0.5, 0.5], &spec());
        let b_data: Vec<f32> = std::iter::repeat(2.5).take(300).collect();
        let b = FrameHistogram::from_interleaved(&b_data, &spec());

        let mut acc = HistogramAccumulator::new(spec());
        acc.add(&a);
        acc.add(&b);
        let roll = acc.finish().unwrap();
        for i in 0..4 {
            let expected = (a.combined[i] + b.combined[i]) / 2.0;
            assert_eq!(roll.values[i], expected);
        }
        assert_eq!(roll.values, vec![1.5, 0.0, 150.0, 0.0]);
    }

    #[test]
    fn test_merge_matches_sequential_add() {
        let frames: Vec<FrameHistogram> = (0..5)
            .map(|i| {
                let data = vec![i as f32 * 0.7; 3 * (i + 1)];
                FrameHistogram::from_interleaved(&data, &spec())
            })
            .collect();

        let mut sequential = HistogramAccumulator::new(spec());
        frames.iter().for_each(|f| sequential.add(f));

        let mut left = HistogramAccumulator::new(spec());
        let mut right = HistogramAccumulator::new(spec());
        frames[..2].iter().for_each(|f| left.add(f));
        frames[2..].iter().for_each(|f| right.add(f));
        right.merge(&left);

        assert_eq!(sequential.finish(), right.finish());
    }

    #[test]
    fn test_empty_accumulator() {
        assert!(HistogramAccumulator::new(spec()).finish().is_none());
    }

    #[test]
    fn test_percentile_from_histogram() {
        let centers = spec().centers();
        let values = [1.0, 1.0, 1.0, 1.0];
        assert_eq!(percentile_from_histogram(&values, &centers, 25.0), 0.5);
        assert_eq!(percentile_from_histogram(&values, &centers, 100.0), 3.5);
        // halfway between the 2nd and 3rd bins' cumulative mass
        let mid = percentile_from_histogram(&values, &centers, 62.5);
        assert!((mid - 2.0).abs() < 1e-12);
        assert_eq!(percentile_from_histogram(&[0.0; 4], &centers, 50.0), 0.0);
    }

    #[test]
    fn test_percentile_from_histogram_is_monotone() {
        let centers = spec().centers();
        let values = [3.0, 0.0, 5.0, 2.0];
        let mut last = f64::NEG_INFINITY;
        for p in 0..=100 {
            let v = percentile_from_histogram(&values, &centers, p as f64);
            assert!(v >= last);
            last = v;
        }
    }
}
