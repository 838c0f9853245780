mod common;
use anyhow::Result;
use common::{band_power, offset, synthetic_recording, write_bids_fif, write_participants, CAP, SFREQ};
use exgprep::fiff::open_raw;
use exgprep::{
    ComponentClassifier, ComponentLabel, FailurePolicy, IcaConfig, IcaFit, PipelineConfig, Recording,
    ChannelType, SubjectOutcome, SubjectPreprocessor,
};
use std::path::Path;

const SECONDS: f64 = 12.0;

fn config(root: &Path) -> PipelineConfig {
    PipelineConfig {
        bids_root: root.to_path_buf(),
        extension: ".fif".into(),
        ica: IcaConfig { max_iter: Some(100), ..IcaConfig::default() },
        ..PipelineConfig::default()
    }
}

/// sub-001 and sub-002 on disk, sub-003 listed but missing.
fn cohort(root: &Path) {
    write_participants(root, &["sub-001", "sub-002", "sub-003"]);
    write_bids_fif(root, "sub-001", "Simon", &synthetic_recording(SECONDS, 1), &["Fz", "O2"]);
    write_bids_fif(root, "sub-002", "Simon", &synthetic_recording(SECONDS, 2), &["Fz"]);
}

fn read_artifact(path: &Path) -> Recording {
    open_raw(path).unwrap().into_recording().unwrap()
}

// ── Cohort behaviour ──────────────────────────────────────────────────────────

#[test]
fn cohort_saves_present_and_skips_absent() {
    let dir = tempfile::tempdir().unwrap();
    cohort(dir.path());
    let report = exgprep::run(config(dir.path())).unwrap();

    assert_eq!(report.skipped, vec!["sub-003".to_string()]);
    assert!(report.failed.is_empty());
    let saved: Vec<&str> = report.saved.iter().map(|(s, _)| s.as_str()).collect();
    assert_eq!(saved, vec!["sub-001", "sub-002"]);

    let deriv = dir.path().join("derivatives").join("preprocessed");
    for subject in ["sub-001", "sub-002"] {
        let path = deriv.join(subject).join(format!("{subject}_task-Simon_preprocessed.fif"));
        assert!(path.is_file(), "missing {}", path.display());
        let n_files = std::fs::read_dir(deriv.join(subject)).unwrap().count();
        assert_eq!(n_files, 1);
    }
    assert!(!deriv.join("sub-003").exists());
}

#[test]
fn artifacts_have_clean_channel_lists() {
    let dir = tempfile::tempdir().unwrap();
    cohort(dir.path());
    let report = exgprep::run(config(dir.path())).unwrap();

    for (_, path) in &report.saved {
        let rec = read_artifact(path);
        for dropped in ["I1", "I2", "Resp"] {
            assert!(!rec.contains(dropped), "{dropped} in {}", path.display());
        }
        assert!(rec.channels.iter().all(|c| c.kind != ChannelType::Misc));
        assert_eq!(rec.channels[rec.index_of("Fz").unwrap()].kind, ChannelType::Eeg);
        assert_eq!(rec.channels[rec.index_of("HEOG").unwrap()].kind, ChannelType::Eog);
        assert_eq!(rec.n_chan(), CAP.len() + 1);
        assert_eq!(rec.line_freq, Some(60.0));
        approx::assert_abs_diff_eq!(rec.highpass, 1.0);
        approx::assert_abs_diff_eq!(rec.lowpass, 45.0);
    }
}

#[test]
fn overridden_bad_is_interpolated_and_cleared() {
    let dir = tempfile::tempdir().unwrap();
    cohort(dir.path());
    let pre = SubjectPreprocessor::new(config(dir.path())).unwrap();
    let SubjectOutcome::Saved(path) = pre.process("sub-002").unwrap() else {
        panic!("sub-002 was not saved");
    };
    let rec = read_artifact(&path);
    assert!(rec.contains("TP10"));
    assert!(!rec.is_bad("TP10"));
    assert!(rec.bads.is_empty());

    let mut raw = exgprep::load_subject(pre.config(), "sub-002").unwrap().unwrap();
    let cleaning = pre.clean("sub-002", &mut raw).unwrap();
    assert_eq!(cleaning.interpolated, vec!["TP10".to_string()]);
}

#[test]
fn second_run_overwrites_identically() {
    let dir = tempfile::tempdir().unwrap();
    cohort(dir.path());
    let pre = SubjectPreprocessor::new(config(dir.path())).unwrap();
    let SubjectOutcome::Saved(first) = pre.process("sub-001").unwrap() else {
        panic!("sub-001 was not saved");
    };
    let bytes = std::fs::read(&first).unwrap();
    let SubjectOutcome::Saved(second) = pre.process("sub-001").unwrap() else {
        panic!("sub-001 was not saved");
    };
    assert_eq!(first, second);
    assert_eq!(std::fs::read(&second).unwrap(), bytes);
}

#[test]
fn missing_manifest_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    assert!(exgprep::run(config(dir.path())).is_err());
}

// ── Signal properties ─────────────────────────────────────────────────────────

#[test]
fn decomposition_is_deterministic() {
    let pre = SubjectPreprocessor::new(config(Path::new("."))).unwrap();
    let raw = synthetic_recording(SECONDS, 5);
    let (mut a, mut b) = (raw.clone(), raw);
    let ca = pre.clean("sub-005", &mut a).unwrap();
    let cb = pre.clean("sub-005", &mut b).unwrap();
    assert_eq!(ca.labels, cb.labels);
    assert_eq!(ca.excluded, cb.excluded);
    assert_eq!(a.data, b.data);
}

#[test]
fn output_spectrum_is_band_limited() {
    let pre = SubjectPreprocessor::new(config(Path::new("."))).unwrap();
    let raw = synthetic_recording(SECONDS, 6);
    let mut rec = raw.clone();
    pre.clean("sub-006", &mut rec).unwrap();

    let power = |r: &Recording, lo: f64, hi: f64| -> f64 {
        r.channels
            .iter()
            .filter(|c| CAP.contains(&c.name.as_str()))
            .map(|c| {
                let row = r.data.row(r.index_of(&c.name).unwrap()).to_vec();
                band_power(&row, SFREQ, lo, hi)
            })
            .sum()
    };
    let high = power(&rec, 70.0, 120.0) / power(&raw, 70.0, 120.0);
    assert!(high < 1e-3, "70–120 Hz kept {high:.2e} of its power");
    let mains = power(&rec, 59.0, 61.0) / power(&raw, 59.0, 61.0);
    assert!(mains < 1e-3, "60 Hz kept {mains:.2e} of its power");

    for (c, name) in CAP.iter().enumerate() {
        let row = rec.data.row(rec.index_of(name).unwrap());
        let mean = row.sum() / row.len() as f64;
        assert!(mean.abs() < 0.05 * offset(c), "{name}: mean {mean:.2e}");
    }
}

#[test]
fn default_classifier_removes_mains_and_blinks_and_keeps_alpha() {
    let pre = SubjectPreprocessor::new(config(Path::new("."))).unwrap();
    for seed in [1, 2, 5, 6] {
        let mut rec = synthetic_recording(SECONDS, seed);
        let cleaning = pre.clean("sub-010", &mut rec).unwrap();
        let labels = &cleaning.labels;
        let indices = |label: ComponentLabel| -> Vec<usize> {
            labels.iter().enumerate().filter(|(_, l)| **l == label).map(|(i, _)| i).collect()
        };

        let (line, eye, brain) =
            (indices(ComponentLabel::LineNoise), indices(ComponentLabel::Eye), indices(ComponentLabel::Brain));
        assert!(!line.is_empty(), "seed {seed}: no line-noise component in {labels:?}");
        assert!(!eye.is_empty(), "seed {seed}: no eye component in {labels:?}");
        assert!(!brain.is_empty(), "seed {seed}: no brain component in {labels:?}");
        for i in line.iter().chain(&eye) {
            assert!(cleaning.excluded.contains(i), "seed {seed}: artifact {i} kept");
        }
        for i in &brain {
            assert!(!cleaning.excluded.contains(i), "seed {seed}: brain {i} removed");
        }
    }
}

// ── Substituted capabilities ──────────────────────────────────────────────────

struct Fixed(ComponentLabel);

impl ComponentClassifier for Fixed {
    fn classify(&self, _rec: &Recording, fit: &IcaFit) -> Result<Vec<ComponentLabel>> {
        Ok(vec![self.0; fit.n_components()])
    }
}

struct TooFew;

impl ComponentClassifier for TooFew {
    fn classify(&self, _rec: &Recording, _fit: &IcaFit) -> Result<Vec<ComponentLabel>> {
        Ok(vec![ComponentLabel::Brain])
    }
}

#[test]
fn fake_classifier_drives_exclusion() {
    let pre = SubjectPreprocessor::new(config(Path::new(".")))
        .unwrap()
        .with_classifier(Box::new(Fixed(ComponentLabel::Brain)));
    let mut rec = synthetic_recording(SECONDS, 7);
    let cleaning = pre.clean("sub-007", &mut rec).unwrap();
    assert!(cleaning.excluded.is_empty());
    assert!(cleaning.labels.iter().all(|l| *l == ComponentLabel::Brain));

    let pre = pre.with_classifier(Box::new(Fixed(ComponentLabel::Eye)));
    let mut rec = synthetic_recording(SECONDS, 7);
    let cleaning = pre.clean("sub-007", &mut rec).unwrap();
    assert_eq!(cleaning.excluded, (0..cleaning.labels.len()).collect::<Vec<_>>());
}

#[test]
fn failure_policy_abort_vs_continue() {
    let dir = tempfile::tempdir().unwrap();
    cohort(dir.path());
    let subjects: Vec<String> = ["sub-001", "sub-003"].iter().map(|s| s.to_string()).collect();

    let pre = SubjectPreprocessor::new(config(dir.path())).unwrap().with_classifier(Box::new(TooFew));
    let err = pre.run_cohort(&subjects).unwrap_err();
    let text = format!("{err:#}");
    assert!(text.contains("sub-001") && text.contains("label components"), "{text}");

    let cfg = PipelineConfig { on_error: FailurePolicy::Continue, ..config(dir.path()) };
    let pre = SubjectPreprocessor::new(cfg).unwrap().with_classifier(Box::new(TooFew));
    let report = pre.run_cohort(&subjects).unwrap();
    assert!(!report.is_success());
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, "sub-001");
    assert_eq!(report.skipped, vec!["sub-003".to_string()]);
}
