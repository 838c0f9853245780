//! FIR filter design and application.
//!
//! - [`design`]: Hamming-windowed sinc band-pass and band-stop design,
//!   matching `mne.filter.create_filter(fir_window='hamming', phase='zero')`.
//! - [`apply`]: Overlap-add zero-phase convolution, matching MNE's
//!   `_overlap_add_filter` / `_1d_overlap_filter`.
//!
//! [`band_pass`] and [`notch`] run both on a [`Recording`], touching every
//! channel except stimulus channels, and keep `highpass`/`lowpass` up to date.

pub mod apply;
pub mod design;

pub use apply::{apply_fir_zero_phase, filter_1d, OverlapAdd};
pub use design::{
    auto_filter_length, auto_h_trans_bandwidth, auto_l_trans_bandwidth, design_bandpass,
    design_notch, firwin, gain_at, hamming,
};

use anyhow::{Context, Result};
use log::debug;

use crate::config::{BandPass, NotchConfig};
use crate::recording::{ChannelType, Recording};

fn data_channels(rec: &Recording) -> Vec<usize> {
    (0..rec.n_chan())
        .filter(|&i| rec.channels[i].kind != ChannelType::Stim)
        .collect()
}

/// Band-pass `rec` in place to `band` (`raw.filter(l_freq, h_freq)`).
pub fn band_pass(rec: &mut Recording, band: &BandPass) -> Result<()> {
    let h = design_bandpass(band.l_freq, band.h_freq, rec.sfreq)
        .with_context(|| format!("designing {}–{} Hz band-pass", band.l_freq, band.h_freq))?;
    debug!(
        "band-pass {}–{} Hz: {} taps at {} Hz",
        band.l_freq,
        band.h_freq,
        h.len(),
        rec.sfreq
    );
    let rows = data_channels(rec);
    apply_fir_zero_phase(&mut rec.data, &rows, &h)?;
    rec.highpass = rec.highpass.max(band.l_freq);
    rec.lowpass = rec.lowpass.min(band.h_freq);
    Ok(())
}

/// Remove the mains lines in `cfg` from `rec` (`raw.notch_filter(freqs)`).
///
/// An empty frequency list leaves the recording untouched.
pub fn notch(rec: &mut Recording, cfg: &NotchConfig) -> Result<()> {
    if cfg.freqs.is_empty() {
        return Ok(());
    }
    let h = design_notch(&cfg.freqs, cfg.widths.as_deref(), cfg.trans_bandwidth, rec.sfreq)
        .with_context(|| format!("designing notch at {:?} Hz", cfg.freqs))?;
    debug!("notch {:?} Hz: {} taps", cfg.freqs, h.len());
    let rows = data_channels(rec);
    apply_fir_zero_phase(&mut rec.data, &rows, &h)
}
