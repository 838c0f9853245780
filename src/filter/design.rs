//! FIR filter design matching MNE / `scipy.signal.firwin`.
//!
//! Band edges follow `mne.filter.create_filter(fir_design='firwin',
//! fir_window='hamming', phase='zero')`:
//!   • low transition  = min(max(0.25 · l_freq, 2.0), l_freq)
//!   • high transition = min(max(0.25 · h_freq, 2.0), nyq − h_freq)
//!   • filter length N = ceil(3.3 / min_transition · sfreq), rounded to odd
//!   • each gain step is one Hamming-windowed sinc lowpass cut at the middle
//!     of its transition band, sized for that band and centred in N taps
//!
//! ```text
//!  band-pass   h = lp(h_cut) − lp(l_cut)
//!  band-stop   h = δ − Σ [ lp(hi_cut_i) − lp(lo_cut_i) ]
//! ```
use std::f64::consts::PI;

use anyhow::{bail, Result};

/// Length factor of the Hamming window (main-lobe width × transition).
pub const HAMMING_LENGTH_FACTOR: f64 = 3.3;

/// Compute MNE-compatible transition bandwidth for the low (high-pass) edge.
///
/// Rule: `min(max(0.25 * l_freq, 2.0), l_freq)`
pub fn auto_l_trans_bandwidth(l_freq: f64) -> f64 {
    (0.25 * l_freq).max(2.0).min(l_freq)
}

/// Compute MNE-compatible transition bandwidth for the high (low-pass) edge.
///
/// Rule: `min(max(0.25 * h_freq, 2.0), nyq - h_freq)`
pub fn auto_h_trans_bandwidth(h_freq: f64, sfreq: f64) -> f64 {
    (0.25 * h_freq).max(2.0).min(sfreq / 2.0 - h_freq)
}

/// Number of taps for a transition bandwidth: `ceil(3.3 / trans_bw * sfreq)`
/// rounded up to odd.
pub fn auto_filter_length(trans_bw: f64, sfreq: f64) -> usize {
    let n_raw = (HAMMING_LENGTH_FACTOR / trans_bw * sfreq).ceil() as usize;
    n_raw | 1
}

/// Zero-phase band-pass keeping `l_freq..h_freq` Hz.
///
/// Matches `mne.filter.create_filter(x, sfreq, l_freq, h_freq)` with the
/// default `'auto'` lengths and transition bandwidths.
pub fn design_bandpass(l_freq: f64, h_freq: f64, sfreq: f64) -> Result<Vec<f64>> {
    let nyq = sfreq / 2.0;
    if !(l_freq.is_finite() && h_freq.is_finite()) || l_freq <= 0.0 || h_freq >= nyq {
        bail!("band-pass {l_freq}–{h_freq} Hz is outside (0, {nyq}) Hz");
    }
    if l_freq >= h_freq {
        bail!("band-pass low edge {l_freq} Hz is not below high edge {h_freq} Hz");
    }
    let l_tb = auto_l_trans_bandwidth(l_freq);
    let h_tb = auto_h_trans_bandwidth(h_freq, sfreq);
    let n = auto_filter_length(l_tb.min(h_tb), sfreq);

    let mut h = vec![0.0; n];
    add_centered(&mut h, &lowpass_for(h_freq + h_tb / 2.0, h_tb, sfreq), 1.0)?;
    add_centered(&mut h, &lowpass_for(l_freq - l_tb / 2.0, l_tb, sfreq), -1.0)?;
    Ok(h)
}

/// Zero-phase band-stop removing a narrow band around each of `freqs`.
///
/// Mirrors `mne.filter.notch_filter(method='fir')`: the stop band of each
/// frequency is `widths[i]` wide (default `freq / 200`) and the total
/// transition bandwidth `trans_bandwidth` is split evenly over both edges.
pub fn design_notch(
    freqs: &[f64],
    widths: Option<&[f64]>,
    trans_bandwidth: f64,
    sfreq: f64,
) -> Result<Vec<f64>> {
    if freqs.is_empty() {
        bail!("notch needs at least one frequency");
    }
    if let Some(w) = widths {
        if w.len() != freqs.len() {
            bail!("{} notch widths given for {} frequencies", w.len(), freqs.len());
        }
    }
    if trans_bandwidth.is_nan() || trans_bandwidth <= 0.0 {
        bail!("notch transition bandwidth must be positive, got {trans_bandwidth}");
    }
    let nyq = sfreq / 2.0;
    let edge_tb = trans_bandwidth / 2.0;
    let n = auto_filter_length(edge_tb, sfreq);

    let mut h = vec![0.0; n];
    h[n / 2] = 1.0;
    for (i, &f) in freqs.iter().enumerate() {
        let width = widths.map_or(f / 200.0, |w| w[i]);
        let lo = f - width / 2.0 - edge_tb / 2.0;
        let hi = f + width / 2.0 + edge_tb / 2.0;
        if lo - edge_tb / 2.0 <= 0.0 || hi + edge_tb / 2.0 >= nyq {
            bail!("notch at {f} Hz does not fit in (0, {nyq}) Hz");
        }
        add_centered(&mut h, &lowpass_for(hi, edge_tb, sfreq), -1.0)?;
        add_centered(&mut h, &lowpass_for(lo, edge_tb, sfreq), 1.0)?;
    }
    Ok(h)
}

/// Lowpass cut at `cutoff_hz`, sized for one transition band of `trans_bw` Hz
/// (`round(3.3 · sfreq / trans_bw)` made odd).
fn lowpass_for(cutoff_hz: f64, trans_bw: f64, sfreq: f64) -> Vec<f64> {
    let n = (HAMMING_LENGTH_FACTOR * sfreq / trans_bw).round() as usize | 1;
    firwin(n, cutoff_hz, sfreq)
}

/// `h[offset..N-offset] += sign · part`.
fn add_centered(h: &mut [f64], part: &[f64], sign: f64) -> Result<()> {
    if part.len() > h.len() {
        bail!("component filter of {} taps exceeds total length {}", part.len(), h.len());
    }
    let offset = (h.len() - part.len()) / 2;
    for (dst, &v) in h[offset..offset + part.len()].iter_mut().zip(part) {
        *dst += sign * v;
    }
    Ok(())
}

/// Lowpass FIR of odd length `n` with its −6 dB point at `cutoff_hz`,
/// normalised to unit DC gain.
pub fn firwin(n: usize, cutoff_hz: f64, sfreq: f64) -> Vec<f64> {
    let alpha = (n - 1) as f64 / 2.0;
    let fc = cutoff_hz / (sfreq / 2.0);
    let win = hamming(n);

    let mut h: Vec<f64> = (0..n)
        .map(|i| {
            let x = i as f64 - alpha;
            // f(x) = sin(π·fc·x) / (π·x);  lim_{x→0} f(x) = fc
            let sinc = if x == 0.0 { fc } else { (PI * fc * x).sin() / (PI * x) };
            sinc * win[i]
        })
        .collect();

    let s: f64 = h.iter().sum();
    h.iter_mut().for_each(|v| *v /= s);
    h
}

/// Hamming window of length `n`.
pub fn hamming(n: usize) -> Vec<f64> {
    if n == 1 {
        return vec![1.0];
    }
    (0..n)
        .map(|i| 0.54 - 0.46 * (2.0 * PI * i as f64 / (n - 1) as f64).cos())
        .collect()
}

/// Magnitude of the frequency response of `h` at `freq` Hz.
pub fn gain_at(h: &[f64], freq: f64, sfreq: f64) -> f64 {
    let w = 2.0 * PI * freq / sfreq;
    let (re, im) = h.iter().enumerate().fold((0.0, 0.0), |(re, im), (k, &v)| {
        let phi = w * k as f64;
        (re + v * phi.cos(), im - v * phi.sin())
    });
    re.hypot(im)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transition_rules() {
        approx::assert_abs_diff_eq!(auto_l_trans_bandwidth(1.0), 1.0);
        approx::assert_abs_diff_eq!(auto_l_trans_bandwidth(20.0), 5.0);
        approx::assert_abs_diff_eq!(auto_h_trans_bandwidth(45.0, 500.0), 11.25);
        // Capped by the distance to Nyquist.
        approx::assert_abs_diff_eq!(auto_h_trans_bandwidth(100.0, 250.0), 25.0);
        approx::assert_abs_diff_eq!(auto_h_trans_bandwidth(120.0, 250.0), 5.0);
    }

    #[test]
    fn bandpass_length_follows_narrowest_transition() {
        // 1 Hz transition at 500 Hz: ceil(3.3 · 500) = 1650 → 1651.
        let h = design_bandpass(1.0, 45.0, 500.0).unwrap();
        assert_eq!(h.len(), 1651);
    }

    #[test]
    fn bandpass_is_symmetric_with_zero_dc() {
        let h = design_bandpass(1.0, 45.0, 250.0).unwrap();
        let n = h.len();
        for i in 0..n / 2 {
            approx::assert_abs_diff_eq!(h[i], h[n - 1 - i], epsilon = 1e-12);
        }
        approx::assert_abs_diff_eq!(h.iter().sum::<f64>(), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn bandpass_gains() {
        let sfreq = 250.0;
        let h = design_bandpass(1.0, 45.0, sfreq).unwrap();
        approx::assert_abs_diff_eq!(gain_at(&h, 10.0, sfreq), 1.0, epsilon = 0.01);
        approx::assert_abs_diff_eq!(gain_at(&h, 30.0, sfreq), 1.0, epsilon = 0.01);
        // −6 dB at the transition midpoints.
        approx::assert_abs_diff_eq!(gain_at(&h, 0.5, sfreq), 0.5, epsilon = 0.02);
        approx::assert_abs_diff_eq!(gain_at(&h, 50.625, sfreq), 0.5, epsilon = 0.02);
        assert!(gain_at(&h, 70.0, sfreq) < 0.01);
    }

    #[test]
    fn bandpass_rejects_bad_bands() {
        assert!(design_bandpass(0.0, 45.0, 250.0).is_err());
        assert!(design_bandpass(1.0, 125.0, 250.0).is_err());
        assert!(design_bandpass(40.0, 30.0, 250.0).is_err());
    }

    #[test]
    fn notch_kills_line_and_keeps_neighbours() {
        let sfreq = 250.0;
        let h = design_notch(&[60.0], None, 1.0, sfreq).unwrap();
        assert_eq!(h.len() % 2, 1);
        assert!(gain_at(&h, 60.0, sfreq) < 0.01);
        approx::assert_abs_diff_eq!(gain_at(&h, 55.0, sfreq), 1.0, epsilon = 0.01);
        approx::assert_abs_diff_eq!(gain_at(&h, 10.0, sfreq), 1.0, epsilon = 0.01);
    }

    #[test]
    fn notch_beyond_nyquist_fails() {
        assert!(design_notch(&[60.0], None, 1.0, 100.0).is_err());
        assert!(design_notch(&[], None, 1.0, 250.0).is_err());
        assert!(design_notch(&[60.0], Some(&[1.0, 2.0]), 1.0, 250.0).is_err());
    }

    #[test]
    fn lowpass_dc_gain_unity() {
        let h = firwin(101, 10.0, 256.0);
        approx::assert_abs_diff_eq!(h.iter().sum::<f64>(), 1.0, epsilon = 1e-12);
    }
}
