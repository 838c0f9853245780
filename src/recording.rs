//! In-memory continuous recording.
//!
//! A [`Recording`] is the unit every pipeline stage mutates in place: one
//! subject's fully loaded `[n_chan, n_times]` signal (volts, `f64`) plus the
//! channel metadata MNE keeps in `raw.info` (names, types, scalp positions,
//! the `bads` list and the filter bookkeeping).
use std::collections::HashMap;
use std::fmt;

use anyhow::{bail, Result};
use ndarray::{Array2, Axis};

use crate::fiff::constants::*;

// ── Channel types ─────────────────────────────────────────────────────────

/// Channel type, restricted to the kinds an EEG recording carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelType {
    Eeg,
    Eog,
    Ecg,
    Emg,
    Misc,
    Stim,
}

impl ChannelType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelType::Eeg => "eeg",
            ChannelType::Eog => "eog",
            ChannelType::Ecg => "ecg",
            ChannelType::Emg => "emg",
            ChannelType::Misc => "misc",
            ChannelType::Stim => "stim",
        }
    }

    /// Map a BIDS `channels.tsv` `type` column value.
    ///
    /// Unknown types become `Misc`, as MNE-BIDS does.
    pub fn from_bids(s: &str) -> Self {
        match s.trim().to_ascii_uppercase().as_str() {
            "EEG" => ChannelType::Eeg,
            "EOG" | "HEOG" | "VEOG" => ChannelType::Eog,
            "ECG" => ChannelType::Ecg,
            "EMG" => ChannelType::Emg,
            "TRIG" | "STIM" => ChannelType::Stim,
            _ => ChannelType::Misc,
        }
    }

    /// FIFF channel kind code.
    pub fn fiff_kind(&self) -> i32 {
        match self {
            ChannelType::Eeg => FIFFV_EEG_CH,
            ChannelType::Eog => FIFFV_EOG_CH,
            ChannelType::Ecg => FIFFV_ECG_CH,
            ChannelType::Emg => FIFFV_EMG_CH,
            ChannelType::Misc => FIFFV_MISC_CH,
            ChannelType::Stim => FIFFV_STIM_CH,
        }
    }

    pub fn from_fiff_kind(kind: i32) -> Self {
        match kind {
            FIFFV_EEG_CH => ChannelType::Eeg,
            FIFFV_EOG_CH => ChannelType::Eog,
            FIFFV_ECG_CH => ChannelType::Ecg,
            FIFFV_EMG_CH => ChannelType::Emg,
            FIFFV_STIM_CH => ChannelType::Stim,
            _ => ChannelType::Misc,
        }
    }
}

impl fmt::Display for ChannelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One channel's metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct Channel {
    pub name: String,
    pub kind: ChannelType,
    /// Head-frame position in metres, `None` until a montage is applied.
    pub pos: Option<[f64; 3]>,
}

impl Channel {
    pub fn new(name: impl Into<String>, kind: ChannelType) -> Self {
        Self { name: name.into(), kind, pos: None }
    }
}

// ── Recording ─────────────────────────────────────────────────────────────

/// A fully materialised continuous recording.
#[derive(Debug, Clone)]
pub struct Recording {
    /// Sampling rate in Hz.
    pub sfreq: f64,
    pub channels: Vec<Channel>,
    /// `[n_chan, n_times]` in volts.
    pub data: Array2<f64>,
    /// Names of channels currently marked bad.
    pub bads: Vec<String>,
    /// Effective high-pass edge in Hz (0 = none applied).
    pub highpass: f64,
    /// Effective low-pass edge in Hz (Nyquist = none applied).
    pub lowpass: f64,
    /// Mains frequency, when known.
    pub line_freq: Option<f64>,
}

impl Recording {
    /// Build a recording, checking that the channel list matches the data rows.
    pub fn new(sfreq: f64, channels: Vec<Channel>, data: Array2<f64>) -> Result<Self> {
        if channels.len() != data.nrows() {
            bail!(
                "channel list has {} entries but data has {} rows",
                channels.len(),
                data.nrows()
            );
        }
        if !sfreq.is_finite() || sfreq <= 0.0 {
            bail!("invalid sampling rate {sfreq}");
        }
        Ok(Self {
            sfreq,
            channels,
            data,
            bads: Vec::new(),
            highpass: 0.0,
            lowpass: sfreq / 2.0,
            line_freq: None,
        })
    }

    #[inline]
    pub fn n_chan(&self) -> usize {
        self.channels.len()
    }

    #[inline]
    pub fn n_times(&self) -> usize {
        self.data.ncols()
    }

    pub fn ch_names(&self) -> Vec<&str> {
        self.channels.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.channels.iter().position(|c| c.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index_of(name).is_some()
    }

    pub fn is_bad(&self, name: &str) -> bool {
        self.bads.iter().any(|b| b == name)
    }

    /// Indices of channels of the given type, in channel order.
    pub fn picks(&self, kind: ChannelType) -> Vec<usize> {
        self.channels
            .iter()
            .enumerate()
            .filter(|(_, c)| c.kind == kind)
            .map(|(i, _)| i)
            .collect()
    }

    /// Indices of EEG channels that are not marked bad.
    pub fn good_eeg(&self) -> Vec<usize> {
        self.channels
            .iter()
            .enumerate()
            .filter(|(_, c)| c.kind == ChannelType::Eeg && !self.is_bad(&c.name))
            .map(|(i, _)| i)
            .collect()
    }

    /// Remove the named channels (rows, metadata and bad marks).
    ///
    /// Names that are not present are ignored. Returns the names actually
    /// dropped, in channel order.
    pub fn drop_channels(&mut self, names: &[String]) -> Vec<String> {
        let (keep, dropped): (Vec<usize>, Vec<usize>) =
            (0..self.n_chan()).partition(|&i| !names.contains(&self.channels[i].name));
        if dropped.is_empty() {
            return Vec::new();
        }
        let dropped_names: Vec<String> =
            dropped.iter().map(|&i| self.channels[i].name.clone()).collect();

        self.data = self.data.select(Axis(0), &keep);
        self.channels = keep.iter().map(|&i| self.channels[i].clone()).collect();
        self.bads.retain(|b| !dropped_names.contains(b));
        dropped_names
    }

    /// Change channel types by name. Unknown names are an error, as in MNE.
    pub fn set_channel_types(&mut self, mapping: &HashMap<String, ChannelType>) -> Result<()> {
        for (name, kind) in mapping {
            let idx = self
                .index_of(name)
                .ok_or_else(|| anyhow::anyhow!("channel {name} not found"))?;
            if self.channels[idx].kind != *kind {
                // Positions only make sense for EEG channels.
                if *kind != ChannelType::Eeg {
                    self.channels[idx].pos = None;
                }
                self.channels[idx].kind = *kind;
            }
        }
        Ok(())
    }
}
