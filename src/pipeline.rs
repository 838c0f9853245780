//! The per-subject preprocessing pipeline and the cohort loop.
//!
//! ```text
//!  Located ─► Loaded ─► Sanitized ─► Interpolated? ─► Filtered (1–100 Hz)
//!     │                                                      │
//!     └─ no file: Skipped                          average reference
//!                                                            │
//!  Saved ◄─ Filtered (1–45 Hz, 60 Hz notch) ◄─ Cleaned ◄─ Labeled ◄─ Decomposed
//! ```
//!
//! Subjects are processed one after another, each recording owned by its
//! own iteration. A failing stage is reported with the subject and stage
//! name; [`FailurePolicy`] decides whether that ends the run.
use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use log::{debug, error, info, warn};

use crate::bids::artifact_path;
use crate::classify::{artifact_indices, ComponentClassifier, ComponentLabel, HeuristicClassifier};
use crate::cohort::read_participants;
use crate::config::{FailurePolicy, PipelineConfig};
use crate::fiff::write_raw;
use crate::ica::{Decomposer, InfomaxIca};
use crate::interpolate::interpolate_bads;
use crate::loader::load_subject;
use crate::montage::Montage;
use crate::recording::Recording;
use crate::reference::set_average_reference;
use crate::sanitize::sanitize;
use crate::{filter, ica};

// ── Stages and outcomes ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Load,
    Sanitize,
    Interpolate,
    FirstPass,
    Reference,
    Decompose,
    Label,
    Clean,
    SecondPass,
    Notch,
    Save,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Load => "load",
            Stage::Sanitize => "sanitize",
            Stage::Interpolate => "interpolate",
            Stage::FirstPass => "first band-pass",
            Stage::Reference => "re-reference",
            Stage::Decompose => "decompose",
            Stage::Label => "label components",
            Stage::Clean => "remove components",
            Stage::SecondPass => "second band-pass",
            Stage::Notch => "notch",
            Stage::Save => "save",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn at<T>(subject: &str, stage: Stage, result: Result<T>) -> Result<T> {
    result.with_context(|| format!("{subject}: stage '{stage}' failed"))
}

/// Terminal state of one subject.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubjectOutcome {
    Saved(PathBuf),
    /// No raw recording was found.
    Skipped,
}

/// What the in-memory stages did to a recording.
#[derive(Debug, Clone, PartialEq)]
pub struct Cleaning {
    pub interpolated: Vec<String>,
    pub labels: Vec<ComponentLabel>,
    /// Indices of the removed components.
    pub excluded: Vec<usize>,
}

/// Result of a cohort run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunReport {
    pub saved: Vec<(String, PathBuf)>,
    pub skipped: Vec<String>,
    /// Subject and the rendered error chain. Only filled with
    /// [`FailurePolicy::Continue`].
    pub failed: Vec<(String, String)>,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} saved, {} skipped, {} failed",
            self.saved.len(),
            self.skipped.len(),
            self.failed.len()
        )
    }
}

// ── Preprocessor ──────────────────────────────────────────────────────────

/// Runs the full pipeline on one subject at a time.
///
/// The decomposition and the component classifier are trait objects so
/// tests and callers can substitute their own:
///
/// ```no_run
/// use exgprep::{PipelineConfig, SubjectPreprocessor};
///
/// let cfg = PipelineConfig { bids_root: "/data/simon".into(), ..PipelineConfig::default() };
/// let report = SubjectPreprocessor::new(cfg)?.run_cohort(&["sub-001".to_string()])?;
/// println!("{report}");
/// # Ok::<(), anyhow::Error>(())
/// ```
pub struct SubjectPreprocessor {
    cfg: PipelineConfig,
    montage: Montage,
    decomposer: Box<dyn Decomposer>,
    classifier: Box<dyn ComponentClassifier>,
}

impl SubjectPreprocessor {
    /// Standard 10–20 montage, extended infomax and the heuristic classifier,
    /// all configured from `cfg`.
    pub fn new(cfg: PipelineConfig) -> Result<Self> {
        Ok(Self {
            montage: Montage::spherical_1020()?,
            decomposer: Box::new(InfomaxIca::new(cfg.ica.clone())),
            classifier: Box::new(HeuristicClassifier::new(cfg.classifier.clone())),
            cfg,
        })
    }

    pub fn with_decomposer(mut self, decomposer: Box<dyn Decomposer>) -> Self {
        self.decomposer = decomposer;
        self
    }

    pub fn with_classifier(mut self, classifier: Box<dyn ComponentClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_montage(mut self, montage: Montage) -> Self {
        self.montage = montage;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.cfg
    }

    /// Load, clean and save one subject.
    pub fn process(&self, subject: &str) -> Result<SubjectOutcome> {
        let Some(mut rec) = at(subject, Stage::Load, load_subject(&self.cfg, subject))? else {
            info!("{subject}: no {} recording, skipped", self.cfg.task);
            return Ok(SubjectOutcome::Skipped);
        };
        let cleaning = self.clean(subject, &mut rec)?;
        debug!(
            "{subject}: removed {} of {} components",
            cleaning.excluded.len(),
            cleaning.labels.len()
        );

        let path = artifact_path(&self.cfg.derivatives_root(), subject, &self.cfg.task);
        at(subject, Stage::Save, save(&path, &rec))?;
        info!("{subject}: saved {}", path.display());
        Ok(SubjectOutcome::Saved(path))
    }

    /// Every stage between loading and saving, applied to `rec` in place.
    pub fn clean(&self, subject: &str, rec: &mut Recording) -> Result<Cleaning> {
        debug!("{subject}: sanitizing");
        at(subject, Stage::Sanitize, sanitize(rec, &self.cfg.drop_channels, &self.montage))?;

        let interpolated = at(subject, Stage::Interpolate, self.fix_known_bads(subject, rec))?;

        debug!("{subject}: filtering and re-referencing");
        at(subject, Stage::FirstPass, filter::band_pass(rec, &self.cfg.first_pass))?;
        at(subject, Stage::Reference, set_average_reference(rec))?;

        let fit = at(subject, Stage::Decompose, self.decomposer.fit(rec))?;
        debug!("{subject}: {} components after {} steps", fit.n_components(), fit.n_iter);
        let labels = at(subject, Stage::Label, self.label(rec, &fit))?;
        let excluded = artifact_indices(&labels);
        debug!("{subject}: excluding components {excluded:?}");
        at(subject, Stage::Clean, fit.apply(rec, &excluded))?;

        at(subject, Stage::SecondPass, filter::band_pass(rec, &self.cfg.second_pass))?;
        at(subject, Stage::Notch, filter::notch(rec, &self.cfg.notch))?;
        Ok(Cleaning { interpolated, labels, excluded })
    }

    /// Mark the subject's configured bad channels and interpolate them.
    fn fix_known_bads(&self, subject: &str, rec: &mut Recording) -> Result<Vec<String>> {
        let Some(listed) = self.cfg.bad_channels.get(subject) else {
            return Ok(Vec::new());
        };
        let (bads, stale): (Vec<String>, Vec<String>) =
            listed.iter().cloned().partition(|name| rec.contains(name));
        if !stale.is_empty() {
            warn!("{subject}: bad-channel override names absent channels {stale:?}");
        }
        if bads.is_empty() {
            return Ok(Vec::new());
        }
        rec.bads = bads.clone();
        info!("Marked {bads:?} as bad.");
        let done = interpolate_bads(rec, true)?;
        info!("Interpolated {done:?}.");
        Ok(done)
    }

    fn label(&self, rec: &Recording, fit: &ica::IcaFit) -> Result<Vec<ComponentLabel>> {
        let labels = self.classifier.classify(rec, fit)?;
        if labels.len() != fit.n_components() {
            bail!(
                "classifier returned {} labels for {} components",
                labels.len(),
                fit.n_components()
            );
        }
        Ok(labels)
    }

    /// Process `subjects` in order, honouring the configured failure policy.
    pub fn run_cohort(&self, subjects: &[String]) -> Result<RunReport> {
        let mut report = RunReport::default();
        for subject in subjects {
            match self.process(subject) {
                Ok(SubjectOutcome::Saved(path)) => report.saved.push((subject.clone(), path)),
                Ok(SubjectOutcome::Skipped) => report.skipped.push(subject.clone()),
                Err(e) => match self.cfg.on_error {
                    FailurePolicy::Abort => return Err(e),
                    FailurePolicy::Continue => {
                        error!("{e:#}");
                        report.failed.push((subject.clone(), format!("{e:#}")));
                    }
                },
            }
        }
        Ok(report)
    }
}

/// Write `rec` to `path`, creating parent directories and replacing any
/// existing file.
fn save(path: &Path, rec: &Recording) -> Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    }
    write_raw(path, rec)
}

/// Run the pipeline over every subject of the participants manifest.
pub fn run(cfg: PipelineConfig) -> Result<RunReport> {
    let subjects = read_participants(&cfg.participants_path())?;
    info!("{} subjects in {}", subjects.len(), cfg.participants_path().display());
    SubjectPreprocessor::new(cfg)?.run_cohort(&subjects)
}
