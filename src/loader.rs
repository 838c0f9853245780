//! Locate and load one subject's raw recording from the BIDS tree.
//!
//! The format follows the configured extension (`.set` → [`eeglab`],
//! `.fif` → [`fiff`]). The `_channels.tsv` and `_eeg.json` sidecars are
//! then applied the way `mne_bids.read_raw_bids` does: names, types and
//! `status=bad` marks from the TSV, `PowerLineFrequency` from the JSON.
//!
//! A subject without a recording is not an error: [`load_subject`] returns
//! `Ok(None)`.
use std::collections::HashMap;
use std::path::Path;

use anyhow::{bail, Context, Result};
use log::{debug, warn};

use crate::bids::{read_channels_tsv, read_line_freq, BidsPath, ChannelRow};
use crate::config::PipelineConfig;
use crate::recording::Recording;
use crate::{eeglab, fiff};

/// Load `subject`'s recording, or `None` when the file does not exist.
pub fn load_subject(cfg: &PipelineConfig, subject: &str) -> Result<Option<Recording>> {
    let bids = BidsPath::eeg(&cfg.bids_root, subject, &cfg.task, &cfg.extension);
    let path = bids.fpath();
    if !path.is_file() {
        debug!("{subject}: no recording at {}", path.display());
        return Ok(None);
    }
    let mut rec = read_recording(&path)?;

    if let Some(rows) = read_channels_tsv(&bids.sidecar("channels", ".tsv"))? {
        apply_channels_tsv(&mut rec, &rows)
            .with_context(|| format!("applying channels.tsv of {subject}"))?;
    }
    if let Some(freq) = read_line_freq(&bids.sidecar("eeg", ".json"))? {
        rec.line_freq = Some(freq);
    }
    debug!(
        "{subject}: loaded {} channels × {} samples at {} Hz",
        rec.n_chan(),
        rec.n_times(),
        rec.sfreq
    );
    Ok(Some(rec))
}

/// Read a recording by file extension.
pub fn read_recording(path: &Path) -> Result<Recording> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    let rec = match ext.as_str() {
        "set" => eeglab::read_set(path),
        "fif" => fiff::open_raw(path).and_then(|raw| raw.into_recording()),
        _ => bail!("unsupported recording format: {}", path.display()),
    };
    rec.with_context(|| format!("loading {}", path.display()))
}

/// Rename, retype and mark bad channels from `channels.tsv` rows.
///
/// The TSV lists channels in recording order; when its names differ from
/// the file's, the file's channels are renamed. A TSV with a different
/// channel count is ignored with a warning.
pub fn apply_channels_tsv(rec: &mut Recording, rows: &[ChannelRow]) -> Result<()> {
    if rows.len() != rec.n_chan() {
        warn!(
            "channels.tsv lists {} channels but the recording has {}; ignoring it",
            rows.len(),
            rec.n_chan()
        );
        return Ok(());
    }
    let renamed = rec
        .channels
        .iter()
        .zip(rows)
        .filter(|(ch, row)| ch.name != row.name)
        .count();
    if renamed > 0 {
        debug!("renaming {renamed} channels from channels.tsv");
        for (ch, row) in rec.channels.iter_mut().zip(rows) {
            if let Some(bad) = rec.bads.iter_mut().find(|b| **b == ch.name) {
                *bad = row.name.clone();
            }
            ch.name = row.name.clone();
        }
    }

    let types: HashMap<String, _> = rows.iter().map(|r| (r.name.clone(), r.kind)).collect();
    rec.set_channel_types(&types)?;
    for row in rows.iter().filter(|r| r.bad) {
        if !rec.is_bad(&row.name) {
            rec.bads.push(row.name.clone());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::{Channel, ChannelType};
    use ndarray::Array2;

    fn numbered(n: usize) -> Recording {
        let chs = (1..=n).map(|i| Channel::new(format!("E{i}"), ChannelType::Eeg)).collect();
        Recording::new(100.0, chs, Array2::zeros((n, 10))).unwrap()
    }

    fn row(name: &str, kind: ChannelType, bad: bool) -> ChannelRow {
        ChannelRow { name: name.into(), kind, bad }
    }

    #[test]
    fn tsv_renames_retypes_and_marks_bad() {
        let mut rec = numbered(3);
        let rows = [
            row("Fp1", ChannelType::Eeg, false),
            row("HEOG", ChannelType::Eog, false),
            row("Resp", ChannelType::Misc, true),
        ];
        apply_channels_tsv(&mut rec, &rows).unwrap();
        assert_eq!(rec.ch_names(), vec!["Fp1", "HEOG", "Resp"]);
        assert_eq!(rec.channels[1].kind, ChannelType::Eog);
        assert_eq!(rec.channels[2].kind, ChannelType::Misc);
        assert_eq!(rec.bads, vec!["Resp".to_string()]);
    }

    #[test]
    fn tsv_with_other_count_is_ignored() {
        let mut rec = numbered(3);
        apply_channels_tsv(&mut rec, &[row("Fp1", ChannelType::Eeg, true)]).unwrap();
        assert_eq!(rec.ch_names(), vec!["E1", "E2", "E3"]);
        assert!(rec.bads.is_empty());
    }

    #[test]
    fn missing_subject_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = PipelineConfig { bids_root: dir.path().to_path_buf(), ..PipelineConfig::default() };
        assert!(load_subject(&cfg, "sub-404").unwrap().is_none());
    }

    #[test]
    fn unknown_extension_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.edf");
        std::fs::write(&path, b"0").unwrap();
        assert!(read_recording(&path).is_err());
    }
}
