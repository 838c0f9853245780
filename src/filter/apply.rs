//! Overlap-add zero-phase FIR convolution.
//!
//! Matches MNE's `_overlap_add_filter` + `_1d_overlap_filter`.
//!
//! Zero-phase is achieved by shifting the output left by `(N-1)/2` samples,
//! NOT by running filtfilt. The edge transient is suppressed by
//! reflect-limited padding of `N-1` samples on each side.
use std::sync::Arc;

use anyhow::{bail, Result};
use ndarray::Array2;
use rustfft::{num_complex::Complex, Fft, FftPlanner};

/// A FIR kernel prepared for overlap-add filtering of signals of one length.
pub struct OverlapAdd {
    n_h: usize,
    n_fft: usize,
    h_fft: Vec<Complex<f64>>,
    fwd: Arc<dyn Fft<f64>>,
    inv: Arc<dyn Fft<f64>>,
}

impl OverlapAdd {
    /// Plan the FFTs for filtering `n_x`-sample signals with `h` (odd length).
    pub fn new(h: &[f64], n_x: usize) -> Result<Self> {
        let n_h = h.len();
        if n_h % 2 == 0 {
            bail!("zero-phase FIR needs an odd number of taps, got {n_h}");
        }
        let n_fft = choose_fft_len(n_h, n_x + 2 * (n_h - 1));
        let mut planner = FftPlanner::<f64>::new();
        let fwd = planner.plan_fft_forward(n_fft);
        let inv = planner.plan_fft_inverse(n_fft);

        let mut h_fft: Vec<Complex<f64>> = h
            .iter()
            .map(|&v| Complex { re: v, im: 0.0 })
            .chain(std::iter::repeat(Complex::default()))
            .take(n_fft)
            .collect();
        fwd.process(&mut h_fft);
        Ok(Self { n_h, n_fft, h_fft, fwd, inv })
    }

    /// Filter a single 1-D signal. Returns a vector of the same length as `x`.
    pub fn filter(&self, x: &[f64]) -> Vec<f64> {
        let n_x = x.len();
        if n_x == 0 {
            return Vec::new();
        }
        let shift = (self.n_h - 1) / 2;
        let n_edge = self.n_h - 1;
        let x_ext = reflect_limited_pad(x, n_edge);
        let n_ext = x_ext.len();

        let n_seg = self.n_fft - self.n_h + 1;
        let inv_scale = 1.0 / self.n_fft as f64;
        let mut x_filtered = vec![0.0; n_ext];
        let mut buf = vec![Complex::<f64>::default(); self.n_fft];

        for start in (0..n_ext).step_by(n_seg) {
            let stop = (start + n_seg).min(n_ext);
            buf.iter_mut().for_each(|b| *b = Complex::default());
            for (b, &v) in buf.iter_mut().zip(&x_ext[start..stop]) {
                b.re = v;
            }

            self.fwd.process(&mut buf);
            for (b, &hf) in buf.iter_mut().zip(&self.h_fft) {
                *b *= hf;
            }
            self.inv.process(&mut buf);

            // Accumulate, shifted left by the group delay.
            let out_start = start.saturating_sub(shift);
            let prod_start = shift.saturating_sub(start);
            let out_end = (out_start + self.n_fft - prod_start).min(n_ext);
            for (o, p) in (out_start..out_end).zip(prod_start..) {
                x_filtered[o] += buf[p].re * inv_scale;
            }
        }

        x_filtered[n_edge..n_edge + n_x].to_vec()
    }
}

/// Apply a zero-phase FIR filter in place to the given rows of `data` ([C, T]).
pub fn apply_fir_zero_phase(data: &mut Array2<f64>, rows: &[usize], h: &[f64]) -> Result<()> {
    if rows.is_empty() || data.ncols() == 0 {
        return Ok(());
    }
    let ola = OverlapAdd::new(h, data.ncols())?;
    for &ch in rows {
        let filtered = ola.filter(&data.row(ch).to_vec());
        data.row_mut(ch).assign(&ndarray::ArrayView1::from(&filtered));
    }
    Ok(())
}

/// Filter one signal with `h`; convenience wrapper over [`OverlapAdd`].
pub fn filter_1d(x: &[f64], h: &[f64]) -> Result<Vec<f64>> {
    Ok(OverlapAdd::new(h, x.len())?.filter(x))
}

// ── Helpers ──────────────────────────────────────────────────────────────────

/// Reflect-limited padding (matches MNE's `_smart_pad`).
///
/// Left:  `pad[i] = 2*x[0] - x[n_pad-i]`  for i in 1..=n_pad
/// Right: `pad[i] = 2*x[-1] - x[-(i+1)]`  for i in 1..=n_pad
///
/// Signals shorter than the pad are extended with zeros beyond the reflection.
fn reflect_limited_pad(x: &[f64], n_pad: usize) -> Vec<f64> {
    let n = x.len();
    let reflect = n_pad.min(n - 1);
    let zeros = n_pad - reflect;

    let mut out = Vec::with_capacity(n + 2 * n_pad);
    out.extend(std::iter::repeat(0.0).take(zeros));
    out.extend((1..=reflect).rev().map(|i| 2.0 * x[0] - x[i]));
    out.extend_from_slice(x);
    let last = x[n - 1];
    out.extend((1..=reflect).map(|i| 2.0 * last - x[n - 1 - i]));
    out.extend(std::iter::repeat(0.0).take(zeros));
    out
}

/// Choose the optimal FFT block size (power of 2 minimising operation count).
///
/// Matches MNE's cost function:
///   `cost = ceil(n_x / (N - n_h + 1)) * N * (log2(N) + 1) + 4e-5 * N * n_x`
fn choose_fft_len(n_h: usize, n_x: usize) -> usize {
    let min_fft = 2 * n_h - 1;
    let max_pow = (n_x as f64).log2().ceil() as u32 + 1;
    let min_pow = (min_fft as f64).log2().ceil() as u32;

    let mut best_n = 1_usize << max_pow.max(min_pow);
    let mut best_cost = f64::INFINITY;
    for pow in min_pow..=max_pow {
        let n = 1_usize << pow;
        if n < min_fft {
            continue;
        }
        let n_seg = (n - n_h + 1) as f64;
        let cost = (n_x as f64 / n_seg).ceil() * n as f64 * (pow as f64 + 1.0)
            + 4e-5 * n as f64 * n_x as f64;
        if cost < best_cost {
            best_cost = cost;
            best_n = n;
        }
    }
    best_n
}
