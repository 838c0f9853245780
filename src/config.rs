//! Pipeline configuration.
//!
//! [`PipelineConfig`] holds every tunable parameter of the per-subject
//! pipeline.  [`PipelineConfig::default()`] reproduces the constants of the
//! Simon-task cohort run; a JSON file can override any subset of fields.
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::classify::ClassifierConfig;

/// Subject id (`sub-XXX`) → channel names known to be defective.
pub type BadChannelOverrides = BTreeMap<String, Vec<String>>;

/// A FIR band-pass: keep energy between `l_freq` and `h_freq` (Hz).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BandPass {
    pub l_freq: f64,
    pub h_freq: f64,
}

/// FIR notch (band-stop) settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotchConfig {
    /// Centre frequencies in Hz. Empty disables the notch.
    pub freqs: Vec<f64>,
    /// Stop-band widths in Hz; `None` uses `freq / 200` for each frequency.
    pub widths: Option<Vec<f64>>,
    /// Total transition bandwidth in Hz, split across both edges.
    pub trans_bandwidth: f64,
}

impl Default for NotchConfig {
    fn default() -> Self {
        Self { freqs: vec![60.0], widths: None, trans_bandwidth: 1.0 }
    }
}

/// Independent component decomposition settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IcaConfig {
    /// Keep the fewest PCA components whose cumulative explained variance
    /// reaches this fraction.
    pub n_components: f64,
    /// Maximum infomax passes; `None` is "auto" (500).
    pub max_iter: Option<usize>,
    /// Extended infomax (sub- and super-Gaussian sources).
    pub extended: bool,
    /// Seed for the sample permutations; fixes the decomposition.
    pub random_state: u64,
}

impl IcaConfig {
    pub const AUTO_MAX_ITER: usize = 500;

    pub fn max_iter(&self) -> usize {
        self.max_iter.unwrap_or(Self::AUTO_MAX_ITER)
    }
}

impl Default for IcaConfig {
    fn default() -> Self {
        Self { n_components: 0.99, max_iter: None, extended: true, random_state: 715 }
    }
}

/// What the cohort loop does when a subject fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Propagate the first error and stop the run.
    #[default]
    Abort,
    /// Record the failure in the run report and go on with the next subject.
    Continue,
}

/// Configuration for the full cohort preprocessing run.
///
/// All fields are `pub`, so struct-update syntax works:
///
/// ```
/// use exgprep::PipelineConfig;
///
/// let cfg = PipelineConfig {
///     task: "Flanker".into(),
///     ..PipelineConfig::default()
/// };
/// assert_eq!(cfg.ica.random_state, 715);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Root of the BIDS dataset.
    ///
    /// Default: `.`
    pub bids_root: PathBuf,

    /// Participants manifest; `None` means `<bids_root>/participants.tsv`.
    pub participants: Option<PathBuf>,

    /// BIDS task label.
    ///
    /// Default: `Simon`.
    pub task: String,

    /// Raw recording extension (`.set` or `.fif`).
    ///
    /// Default: `.set`.
    pub extension: String,

    /// Folder under `<bids_root>/derivatives/` receiving the artifacts.
    ///
    /// Default: `preprocessed`.
    pub derivatives_name: String,

    /// Non-EEG channels removed when present.
    ///
    /// Default: `I1`, `I2`, `Resp`.
    pub drop_channels: Vec<String>,

    /// Channels known a priori to be defective, per subject.
    ///
    /// Default: `sub-002 → [TP10]`.
    pub bad_channels: BadChannelOverrides,

    /// Band kept before decomposition.
    ///
    /// Default: 1–100 Hz.
    pub first_pass: BandPass,

    /// Band kept after component removal.
    ///
    /// Default: 1–45 Hz.
    pub second_pass: BandPass,

    /// Mains notch applied after the second band-pass.
    pub notch: NotchConfig,

    pub ica: IcaConfig,

    pub classifier: ClassifierConfig,

    /// Default: abort on the first failing subject.
    pub on_error: FailurePolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let mut bad_channels = BadChannelOverrides::new();
        bad_channels.insert("sub-002".into(), vec!["TP10".into()]);
        Self {
            bids_root: PathBuf::from("."),
            participants: None,
            task: "Simon".into(),
            extension: ".set".into(),
            derivatives_name: "preprocessed".into(),
            drop_channels: vec!["I1".into(), "I2".into(), "Resp".into()],
            bad_channels,
            first_pass: BandPass { l_freq: 1.0, h_freq: 100.0 },
            second_pass: BandPass { l_freq: 1.0, h_freq: 45.0 },
            notch: NotchConfig::default(),
            ica: IcaConfig::default(),
            classifier: ClassifierConfig::default(),
            on_error: FailurePolicy::Abort,
        }
    }
}

impl PipelineConfig {
    /// Load a JSON overlay; missing fields keep their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn participants_path(&self) -> PathBuf {
        self.participants
            .clone()
            .unwrap_or_else(|| self.bids_root.join("participants.tsv"))
    }

    /// `<bids_root>/derivatives/<derivatives_name>`.
    pub fn derivatives_root(&self) -> PathBuf {
        self.bids_root.join("derivatives").join(&self.derivatives_name)
    }
}
