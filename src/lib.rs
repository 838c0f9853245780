//! # exgprep — batch EEG preprocessing for BIDS cohorts
//!
//! `exgprep` takes every subject listed in a BIDS `participants.tsv`, cleans
//! the raw EEG recording and writes one FIFF artifact per subject under
//! `derivatives/`. The numerical steps follow
//! [MNE-Python](https://mne.tools) (`raw.filter`, `set_eeg_reference`,
//! `interpolate_bads`, `ICA(method='infomax')`) and are implemented in pure
//! Rust on [ndarray](https://crates.io/crates/ndarray),
//! [RustFFT](https://crates.io/crates/rustfft) and
//! [nalgebra](https://crates.io/crates/nalgebra).
//!
//! ## Pipeline overview
//!
//! ```text
//! participants.tsv ─► sub-XXX
//!   │
//!   ├─ loader::load_subject()      .set/.fdt or .fif + BIDS sidecars (missing → skip)
//!   ├─ sanitize::sanitize()        drop I1/I2/Resp, misc → eeg, 10–20 montage
//!   ├─ interpolate_bads()          per-subject overrides, spherical splines
//!   ├─ filter::band_pass()         FIR 1–100 Hz, zero-phase overlap-add
//!   ├─ set_average_reference()     mean of good EEG removed
//!   ├─ InfomaxIca::fit()           PCA (99 % variance) + extended infomax, seed 715
//!   ├─ HeuristicClassifier         one ICLabel class per component
//!   ├─ IcaFit::apply()             artifact components subtracted
//!   ├─ filter::band_pass/notch()   FIR 1–45 Hz, 60 Hz notch
//!   └─ fiff::write_raw()           derivatives/preprocessed/sub-XXX/
//!                                  sub-XXX_task-Simon_preprocessed.fif
//! ```
//!
//! ## Quick start
//!
//! ```no_run
//! use exgprep::{run, PipelineConfig};
//!
//! let cfg = PipelineConfig { bids_root: "/data/simon".into(), ..PipelineConfig::default() };
//! let report = run(cfg)?;
//! println!("{report}");
//! # Ok::<(), anyhow::Error>(())
//! ```
//!
//! ## Running individual steps
//!
//! Every stage is a plain function over a [`Recording`]:
//!
//! ```no_run
//! use exgprep::{filter, fiff, reference, BandPass};
//!
//! let mut rec = fiff::open_raw("sub-001_task-Simon_eeg.fif")?.into_recording()?;
//! filter::band_pass(&mut rec, &BandPass { l_freq: 1.0, h_freq: 40.0 })?;
//! reference::set_average_reference(&mut rec)?;
//! fiff::write_raw("clean.fif".as_ref(), &rec)?;
//! # Ok::<(), anyhow::Error>(())
//! ```

pub mod bids;
pub mod classify;
pub mod cohort;
pub mod config;
pub mod eeglab;
pub mod fiff;
pub mod filter;
pub mod ica;
pub mod interpolate;
pub mod loader;
pub mod montage;
pub mod pipeline;
pub mod recording;
pub mod reference;
pub mod sanitize;

// ── Crate-root re-exports ─────────────────────────────────────────────────

// config
pub use config::{BadChannelOverrides, BandPass, FailurePolicy, IcaConfig, NotchConfig, PipelineConfig};

// data model
pub use recording::{Channel, ChannelType, Recording};

// layout and loading
pub use bids::{artifact_path, BidsPath};
pub use cohort::read_participants;
pub use loader::load_subject;

// capabilities behind traits
pub use classify::{ClassifierConfig, ComponentClassifier, ComponentLabel, HeuristicClassifier};
pub use ica::{Decomposer, IcaFit, InfomaxIca};

// stages
pub use interpolate::interpolate_bads;
pub use montage::Montage;
pub use reference::set_average_reference;
pub use sanitize::sanitize;

// orchestration
pub use pipeline::{run, Cleaning, RunReport, Stage, SubjectOutcome, SubjectPreprocessor};
