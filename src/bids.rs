//! BIDS path construction and sidecar parsing.
//!
//! Raw recordings live at
//! `<root>/sub-<label>/eeg/sub-<label>_task-<task>_eeg<ext>`, with the
//! `_channels.tsv` and `_eeg.json` sidecars next to them.  Cleaned
//! artifacts go to
//! `<root>/derivatives/<name>/<subject>/<subject>_task-<task>_preprocessed.fif`.
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::cohort::subject_label;
use crate::recording::ChannelType;

/// Container extension of the cleaned artifacts.
pub const ARTIFACT_EXTENSION: &str = ".fif";

/// Location of one subject's raw recording inside a BIDS tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BidsPath {
    pub root: PathBuf,
    /// Subject label without the `sub-` prefix.
    pub subject: String,
    pub task: String,
    pub datatype: String,
    pub suffix: String,
    /// Extension including the dot, e.g. `.set`.
    pub extension: String,
}

impl BidsPath {
    /// EEG recording path for `subject` (`sub-XXX` or bare label).
    pub fn eeg(root: &Path, subject: &str, task: &str, extension: &str) -> Self {
        Self {
            root: root.to_path_buf(),
            subject: subject_label(subject).to_string(),
            task: task.to_string(),
            datatype: "eeg".into(),
            suffix: "eeg".into(),
            extension: extension.to_string(),
        }
    }

    /// `sub-<label>_task-<task>`.
    pub fn entities(&self) -> String {
        format!("sub-{}_task-{}", self.subject, self.task)
    }

    pub fn basename(&self) -> String {
        format!("{}_{}{}", self.entities(), self.suffix, self.extension)
    }

    pub fn directory(&self) -> PathBuf {
        self.root.join(format!("sub-{}", self.subject)).join(&self.datatype)
    }

    pub fn fpath(&self) -> PathBuf {
        self.directory().join(self.basename())
    }

    /// Sidecar sharing the recording's entities, e.g. `("channels", ".tsv")`.
    pub fn sidecar(&self, suffix: &str, extension: &str) -> PathBuf {
        self.directory()
            .join(format!("{}_{suffix}{extension}", self.entities()))
    }
}

/// `<derivatives_root>/<subject>/<subject>_task-<task>_preprocessed.fif`.
pub fn artifact_path(derivatives_root: &Path, subject: &str, task: &str) -> PathBuf {
    derivatives_root
        .join(subject)
        .join(format!("{subject}_task-{task}_preprocessed{ARTIFACT_EXTENSION}"))
}

// ── Sidecars ──────────────────────────────────────────────────────────────

/// One row of `*_channels.tsv`.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelRow {
    pub name: String,
    pub kind: ChannelType,
    pub bad: bool,
}

/// Parse `*_channels.tsv`. Returns `Ok(None)` when the file does not exist.
pub fn read_channels_tsv(path: &Path) -> Result<Option<Vec<ChannelRow>>> {
    if !path.exists() {
        return Ok(None);
    }
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("opening {}", path.display()))?;
    let headers = reader.headers()?.clone();
    let col = |name: &str| headers.iter().position(|h| h.trim() == name);
    let name_col = col("name")
        .with_context(|| format!("{} has no 'name' column", path.display()))?;
    let type_col = col("type");
    let status_col = col("status");

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.with_context(|| format!("reading {}", path.display()))?;
        let field = |c: Option<usize>| c.and_then(|c| record.get(c)).map(str::trim).unwrap_or("");
        rows.push(ChannelRow {
            name: field(Some(name_col)).to_string(),
            kind: ChannelType::from_bids(field(type_col)),
            bad: field(status_col).eq_ignore_ascii_case("bad"),
        });
    }
    Ok(Some(rows))
}

#[derive(Debug, Deserialize)]
struct EegSidecar {
    #[serde(rename = "PowerLineFrequency")]
    power_line_frequency: Option<serde_json::Value>,
}

/// `PowerLineFrequency` from `*_eeg.json`, if the file exists and states a number.
pub fn read_line_freq(path: &Path) -> Result<Option<f64>> {
    if !path.exists() {
        return Ok(None);
    }
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let sidecar: EegSidecar = serde_json::from_str(&text)
        .with_context(|| format!("parsing {}", path.display()))?;
    // BIDS allows the string "n/a".
    Ok(sidecar.power_line_frequency.and_then(|v| v.as_f64()))
}
