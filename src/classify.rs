//! Automatic labelling of independent components.
//!
//! [`ComponentClassifier`] assigns one [`ComponentLabel`] per component of an
//! [`IcaFit`]. The labels follow the ICLabel taxonomy; every label other than
//! `brain` and `other` marks the component for removal.
//!
//! [`HeuristicClassifier`] is the default implementation. It reads three
//! kinds of evidence off each component and checks them in a fixed order:
//!
//! ```text
//!  source ─ Welch PSD ──► line ratio      (mains peak vs neighbours)
//!         │           ├─► 1–4 / 1–30 Hz   (slow, blink-like)
//!         │           ├─► 20–45 / 1–20 Hz (broadband high, EMG-like)
//!         │           └─► 1–13 / 1–45 Hz  (low-band dominance, brain-like)
//!         └ autocorr ───► periodicity 0.4–1.5 s, kurtosis (QRS-like)
//!  mixing column ───────► focality, frontal weight
//!
//!  line noise → channel noise → eye → heart → muscle → brain | other
//! ```
use std::cell::RefCell;
use std::f64::consts::PI;
use std::fmt;

use anyhow::Result;
use log::debug;
use ndarray::ArrayView1;
use rustfft::{num_complex::Complex, FftPlanner};
use serde::{Deserialize, Serialize};

use crate::ica::{kurtosis, IcaFit};
use crate::recording::Recording;

thread_local! {
    static FFT_PLANNER: RefCell<FftPlanner<f64>> = RefCell::new(FftPlanner::new());
}

// ── Labels ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentLabel {
    Brain,
    Muscle,
    Eye,
    Heart,
    LineNoise,
    ChannelNoise,
    Other,
}

impl ComponentLabel {
    /// ICLabel class name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ComponentLabel::Brain => "brain",
            ComponentLabel::Muscle => "muscle artifact",
            ComponentLabel::Eye => "eye blink",
            ComponentLabel::Heart => "heart beat",
            ComponentLabel::LineNoise => "line noise",
            ComponentLabel::ChannelNoise => "channel noise",
            ComponentLabel::Other => "other",
        }
    }

    /// Everything except `brain` and `other` is removed.
    pub fn is_artifact(&self) -> bool {
        !matches!(self, ComponentLabel::Brain | ComponentLabel::Other)
    }
}

impl fmt::Display for ComponentLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Indices of the components whose label is an artifact class.
pub fn artifact_indices(labels: &[ComponentLabel]) -> Vec<usize> {
    labels
        .iter()
        .enumerate()
        .filter(|(_, l)| l.is_artifact())
        .map(|(i, _)| i)
        .collect()
}

/// Labels each component of a fitted decomposition.
///
/// Implementations must be deterministic and return exactly
/// `fit.n_components()` labels, in component order.
pub trait ComponentClassifier {
    fn classify(&self, rec: &Recording, fit: &IcaFit) -> Result<Vec<ComponentLabel>>;
}

// ── Heuristic classifier ──────────────────────────────────────────────────

/// Decision thresholds of [`HeuristicClassifier`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Mains used when the recording does not state one.
    pub default_line_freq: f64,
    /// Mean PSD at the mains line over its ±2–5 Hz neighbourhood.
    pub line_noise_ratio: f64,
    /// Largest single-channel share of the scalp map's energy.
    pub channel_focality: f64,
    /// Channels whose unit position has `y` above this count as frontal.
    pub frontal_min_y: f64,
    /// Frontal share of the scalp map's energy.
    pub eye_frontal_fraction: f64,
    /// 1–4 Hz share of the 1–30 Hz power.
    pub eye_low_freq_ratio: f64,
    /// Peak normalised autocorrelation at 0.4–1.5 s lags.
    pub heart_periodicity: f64,
    /// Excess kurtosis of the source.
    pub heart_kurtosis: f64,
    /// Mean PSD at 20–45 Hz over mean PSD at 1–20 Hz.
    pub muscle_ratio: f64,
    /// 1–13 Hz share of the 1–45 Hz power.
    pub brain_low_fraction: f64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            default_line_freq: 60.0,
            line_noise_ratio: 10.0,
            channel_focality: 0.7,
            frontal_min_y: 0.5,
            eye_frontal_fraction: 0.5,
            eye_low_freq_ratio: 0.6,
            heart_periodicity: 0.4,
            heart_kurtosis: 5.0,
            muscle_ratio: 1.5,
            brain_low_fraction: 0.5,
        }
    }
}

/// Per-component evidence the heuristic decides on.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ComponentFeatures {
    pub line_ratio: f64,
    pub focality: f64,
    pub frontal_fraction: f64,
    pub low_freq_ratio: f64,
    pub periodicity: f64,
    pub kurtosis: f64,
    pub high_freq_ratio: f64,
    pub low_band_fraction: f64,
}

/// Spectral, temporal and topographic rules over each component.
#[derive(Debug, Clone, Default)]
pub struct HeuristicClassifier {
    pub cfg: ClassifierConfig,
}

impl HeuristicClassifier {
    pub fn new(cfg: ClassifierConfig) -> Self {
        Self { cfg }
    }

    /// Measure one component: its time course, its scalp map and the
    /// positions of the channels the map is defined on.
    pub fn features(
        &self,
        source: ArrayView1<f64>,
        topo: ArrayView1<f64>,
        positions: &[Option<[f64; 3]>],
        sfreq: f64,
        line_freq: f64,
    ) -> ComponentFeatures {
        let x: Vec<f64> = source.to_vec();
        let (freqs, psd) = welch_psd(&x, sfreq);
        let nyquist = sfreq / 2.0;

        let line_ratio = if line_freq + 5.0 < nyquist {
            let peak = band_mean(&freqs, &psd, &[(line_freq - 1.0, line_freq + 1.0)]);
            let sides = band_mean(
                &freqs,
                &psd,
                &[(line_freq - 5.0, line_freq - 2.0), (line_freq + 2.0, line_freq + 5.0)],
            );
            ratio(peak, sides)
        } else {
            0.0
        };

        let energy: Vec<f64> = topo.iter().map(|a| a * a).collect();
        let total: f64 = energy.iter().sum();
        let focality = if total > 0.0 {
            energy.iter().copied().fold(0.0, f64::max) / total
        } else {
            0.0
        };
        let (mut placed, mut frontal) = (0.0, 0.0);
        for (e, pos) in energy.iter().zip(positions) {
            if let Some(p) = pos {
                placed += e;
                let r = (p[0] * p[0] + p[1] * p[1] + p[2] * p[2]).sqrt();
                if r > 0.0 && p[1] / r > self.cfg.frontal_min_y {
                    frontal += e;
                }
            }
        }

        ComponentFeatures {
            line_ratio,
            focality,
            frontal_fraction: ratio(frontal, placed),
            low_freq_ratio: ratio(
                band_sum(&freqs, &psd, 1.0, 4.0),
                band_sum(&freqs, &psd, 1.0, 30.0),
            ),
            periodicity: periodicity(&x, sfreq, 0.4, 1.5),
            kurtosis: kurtosis(source),
            high_freq_ratio: ratio(
                band_mean(&freqs, &psd, &[(20.0, 45.0)]),
                band_mean(&freqs, &psd, &[(1.0, 20.0)]),
            ),
            low_band_fraction: ratio(
                band_sum(&freqs, &psd, 1.0, 13.0),
                band_sum(&freqs, &psd, 1.0, 45.0),
            ),
        }
    }

    pub fn decide(&self, f: &ComponentFeatures) -> ComponentLabel {
        let c = &self.cfg;
        if f.line_ratio > c.line_noise_ratio {
            ComponentLabel::LineNoise
        } else if f.focality > c.channel_focality {
            ComponentLabel::ChannelNoise
        } else if f.frontal_fraction > c.eye_frontal_fraction && f.low_freq_ratio > c.eye_low_freq_ratio {
            ComponentLabel::Eye
        } else if f.periodicity > c.heart_periodicity && f.kurtosis > c.heart_kurtosis {
            ComponentLabel::Heart
        } else if f.high_freq_ratio > c.muscle_ratio {
            ComponentLabel::Muscle
        } else if f.low_band_fraction > c.brain_low_fraction {
            ComponentLabel::Brain
        } else {
            ComponentLabel::Other
        }
    }
}

impl ComponentClassifier for HeuristicClassifier {
    fn classify(&self, rec: &Recording, fit: &IcaFit) -> Result<Vec<ComponentLabel>> {
        let sources = fit.sources(rec)?;
        let positions: Vec<Option<[f64; 3]>> = fit
            .ch_names
            .iter()
            .map(|n| rec.index_of(n).and_then(|i| rec.channels[i].pos))
            .collect();
        let line_freq = rec.line_freq.unwrap_or(self.cfg.default_line_freq);

        let labels = (0..fit.n_components())
            .map(|k| {
                let f = self.features(sources.row(k), fit.mixing.column(k), &positions, rec.sfreq, line_freq);
                let label = self.decide(&f);
                debug!("IC{k:03}: {label} ({f:.3?})");
                label
            })
            .collect();
        Ok(labels)
    }
}

// ── Spectral helpers ──────────────────────────────────────────────────────

fn ratio(num: f64, den: f64) -> f64 {
    if den > 0.0 {
        num / den
    } else if num > 0.0 {
        f64::INFINITY
    } else {
        0.0
    }
}

fn band_sum(freqs: &[f64], psd: &[f64], lo: f64, hi: f64) -> f64 {
    freqs
        .iter()
        .zip(psd)
        .filter(|(&f, _)| f >= lo && f <= hi)
        .map(|(_, &p)| p)
        .sum()
}

fn band_mean(freqs: &[f64], psd: &[f64], bands: &[(f64, f64)]) -> f64 {
    let (sum, n) = freqs
        .iter()
        .zip(psd)
        .filter(|(&f, _)| bands.iter().any(|&(lo, hi)| f >= lo && f <= hi))
        .fold((0.0, 0usize), |(s, n), (_, &p)| (s + p, n + 1));
    if n == 0 {
        0.0
    } else {
        sum / n as f64
    }
}

/// One-sided Welch PSD (density scaling): periodic Hann windows of the next
/// power of two above 2 s, 50 % overlap, per-segment mean removed.
pub fn welch_psd(x: &[f64], sfreq: f64) -> (Vec<f64>, Vec<f64>) {
    let n = x.len();
    if n < 2 {
        return (Vec::new(), Vec::new());
    }
    let nperseg = ((2.0 * sfreq).ceil() as usize).next_power_of_two().min(n);
    let step = (nperseg - nperseg / 2).max(1);
    let window: Vec<f64> = (0..nperseg)
        .map(|i| 0.5 - 0.5 * (2.0 * PI * i as f64 / nperseg as f64).cos())
        .collect();
    let scale = 1.0 / (sfreq * window.iter().map(|w| w * w).sum::<f64>());
    let n_freqs = nperseg / 2 + 1;

    let fft = FFT_PLANNER.with(|p| p.borrow_mut().plan_fft_forward(nperseg));
    let mut psd = vec![0.0; n_freqs];
    let mut buf = vec![Complex::<f64>::default(); nperseg];
    let mut n_seg = 0usize;
    for start in (0..=n - nperseg).step_by(step) {
        let seg = &x[start..start + nperseg];
        let mean = seg.iter().sum::<f64>() / nperseg as f64;
        for ((b, &v), &w) in buf.iter_mut().zip(seg).zip(&window) {
            *b = Complex::new((v - mean) * w, 0.0);
        }
        fft.process(&mut buf);
        for (k, p) in psd.iter_mut().enumerate() {
            let one_sided = if k == 0 || (nperseg % 2 == 0 && k == nperseg / 2) { 1.0 } else { 2.0 };
            *p += buf[k].norm_sqr() * scale * one_sided;
        }
        n_seg += 1;
    }
    psd.iter_mut().for_each(|p| *p /= n_seg as f64);
    let freqs = (0..n_freqs).map(|k| k as f64 * sfreq / nperseg as f64).collect();
    (freqs, psd)
}

/// Largest normalised autocorrelation at lags between `min_s` and `max_s`
/// seconds.
pub fn periodicity(x: &[f64], sfreq: f64, min_s: f64, max_s: f64) -> f64 {
    let n = x.len();
    let lo = (min_s * sfreq).round() as usize;
    let hi = ((max_s * sfreq).round() as usize).min(n.saturating_sub(1));
    if n < 2 || lo == 0 || lo > hi {
        return 0.0;
    }
    let mean = x.iter().sum::<f64>() / n as f64;
    let n_fft = (2 * n).next_power_of_two();
    let mut buf: Vec<Complex<f64>> = x
        .iter()
        .map(|&v| Complex::new(v - mean, 0.0))
        .chain(std::iter::repeat(Complex::default()))
        .take(n_fft)
        .collect();
    FFT_PLANNER.with(|p| {
        let mut planner = p.borrow_mut();
        planner.plan_fft_forward(n_fft).process(&mut buf);
        buf.iter_mut().for_each(|c| *c = Complex::new(c.norm_sqr(), 0.0));
        planner.plan_fft_inverse(n_fft).process(&mut buf);
    });
    let r0 = buf[0].re;
    if r0 <= 0.0 {
        return 0.0;
    }
    buf[lo..=hi].iter().map(|c| c.re / r0).fold(f64::NEG_INFINITY, f64::max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::montage::Montage;
    use crate::recording::{Channel, ChannelType};
    use ndarray::{Array1, Array2};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    const SFREQ: f64 = 250.0;

    fn noise(n: usize, seed: u64) -> Vec<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..n).map(|_| rng.gen::<f64>() - 0.5).collect()
    }

    fn sine(freq: f64, n: usize) -> Vec<f64> {
        (0..n).map(|t| (2.0 * PI * freq * t as f64 / SFREQ).sin()).collect()
    }

    #[test]
    fn welch_integrates_to_variance() {
        let x = sine(10.0, 20 * SFREQ as usize);
        let (freqs, psd) = welch_psd(&x, SFREQ);
        let df = freqs[1] - freqs[0];
        let power: f64 = psd.iter().sum::<f64>() * df;
        approx::assert_abs_diff_eq!(power, 0.5, epsilon = 0.025);
        let peak = psd
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(k, _)| freqs[k])
            .unwrap();
        assert!((peak - 10.0).abs() < df);
    }

    #[test]
    fn pulse_train_is_periodic_and_peaky() {
        let n = 20 * SFREQ as usize;
        let x: Vec<f64> = (0..n).map(|t| if t % 250 == 0 { 1.0 } else { 0.0 }).collect();
        assert!(periodicity(&x, SFREQ, 0.4, 1.5) > 0.9);
        assert!(kurtosis(ndarray::aview1(&x)) > 100.0);
        assert!(periodicity(&noise(n, 3), SFREQ, 0.4, 1.5) < 0.1);
    }

    #[test]
    fn decision_order() {
        let clf = HeuristicClassifier::default();
        let base = ComponentFeatures::default();
        assert_eq!(clf.decide(&base), ComponentLabel::Other);
        assert_eq!(clf.decide(&ComponentFeatures { low_band_fraction: 0.8, ..base }), ComponentLabel::Brain);
        assert_eq!(clf.decide(&ComponentFeatures { high_freq_ratio: 3.0, ..base }), ComponentLabel::Muscle);
        let heart = ComponentFeatures { periodicity: 0.8, kurtosis: 20.0, ..base };
        assert_eq!(clf.decide(&heart), ComponentLabel::Heart);
        let eye = ComponentFeatures { frontal_fraction: 0.9, low_freq_ratio: 0.9, ..heart };
        assert_eq!(clf.decide(&eye), ComponentLabel::Eye);
        let focal = ComponentFeatures { focality: 0.95, ..eye };
        assert_eq!(clf.decide(&focal), ComponentLabel::ChannelNoise);
        assert_eq!(clf.decide(&ComponentFeatures { line_ratio: 50.0, ..focal }), ComponentLabel::LineNoise);
    }

    #[test]
    fn spectral_features() {
        let clf = HeuristicClassifier::default();
        let n = 30 * SFREQ as usize;
        let topo = Array1::from(vec![1.0, 1.0, 1.0, 1.0]);
        let pos = vec![None; 4];

        let mains: Vec<f64> = sine(60.0, n).iter().zip(noise(n, 1)).map(|(s, w)| s + 0.1 * w).collect();
        let f = clf.features(ndarray::aview1(&mains), topo.view(), &pos, SFREQ, 60.0);
        assert!(f.line_ratio > 100.0);
        approx::assert_abs_diff_eq!(f.focality, 0.25, epsilon = 1e-12);

        let alpha: Vec<f64> = sine(10.0, n).iter().zip(noise(n, 2)).map(|(s, w)| s + 0.1 * w).collect();
        let f = clf.features(ndarray::aview1(&alpha), topo.view(), &pos, SFREQ, 60.0);
        assert!(f.low_band_fraction > 0.9);
        assert_eq!(clf.decide(&f), ComponentLabel::Brain);

        let white = noise(n, 4);
        let f = clf.features(ndarray::aview1(&white), topo.view(), &pos, SFREQ, 60.0);
        assert!(f.line_ratio < 3.0);
        assert_eq!(clf.decide(&f), ComponentLabel::Other);
    }

    #[test]
    fn frontal_weight_uses_positions() {
        let clf = HeuristicClassifier::default();
        let m = Montage::spherical_1020().unwrap();
        let pos: Vec<Option<[f64; 3]>> = ["Fp1", "Fp2", "Pz", "Oz"].iter().map(|n| m.position(n)).collect();
        let topo = Array1::from(vec![1.0, -1.0, 0.1, 0.0]);
        let x = noise(2000, 5);
        let f = clf.features(ndarray::aview1(&x), topo.view(), &pos, SFREQ, 60.0);
        assert!(f.frontal_fraction > 0.99);
    }

    #[test]
    fn classifies_every_component_of_a_fit() {
        let n = 20 * SFREQ as usize;
        let names = ["Fz", "Cz", "Pz"];
        let chs: Vec<Channel> = names.iter().map(|n| Channel::new(*n, ChannelType::Eeg)).collect();
        let mut data = Array2::<f64>::zeros((3, n));
        let s = sine(60.0, n);
        for (c, mut row) in data.rows_mut().into_iter().enumerate() {
            let w = noise(n, 10 + c as u64);
            row.assign(&Array1::from_iter((0..n).map(|t| if c == 0 { s[t] + 0.1 * w[t] } else { w[t] })));
        }
        let rec = Recording::new(SFREQ, chs, data).unwrap();
        let fit = IcaFit {
            ch_names: names.iter().map(|s| s.to_string()).collect(),
            pre_whitener: 1.0,
            pca_mean: Array1::zeros(3),
            unmixing: Array2::eye(3),
            mixing: Array2::eye(3),
            n_iter: 0,
        };
        let labels = HeuristicClassifier::default().classify(&rec, &fit).unwrap();
        assert_eq!(
            labels,
            vec![ComponentLabel::LineNoise, ComponentLabel::ChannelNoise, ComponentLabel::ChannelNoise]
        );
        assert_eq!(artifact_indices(&labels), vec![0, 1, 2]);
    }

    #[test]
    fn artifact_classes() {
        assert!(!ComponentLabel::Brain.is_artifact());
        assert!(!ComponentLabel::Other.is_artifact());
        assert!(ComponentLabel::Eye.is_artifact());
        assert_eq!(ComponentLabel::Muscle.to_string(), "muscle artifact");
        assert_eq!(
            artifact_indices(&[ComponentLabel::Brain, ComponentLabel::Heart, ComponentLabel::Other]),
            vec![1]
        );
    }
}
