/// Shared helpers: synthetic recordings and on-disk BIDS fixtures.
use exgprep::recording::{Channel, ChannelType, Recording};
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::f64::consts::PI;
use std::path::{Path, PathBuf};

pub const SFREQ: f64 = 250.0;

/// Scalp channels of the synthetic cap, plus channels the pipeline drops.
pub const CAP: &[&str] = &[
    "Fp1", "Fp2", "F3", "Fz", "F4", "C3", "Cz", "C4", "P3", "Pz", "P4", "O1", "O2", "TP9", "TP10",
];

#[allow(unused)]
/// Per-channel DC offset of the synthetic recording, in volts.
pub fn offset(c: usize) -> f64 {
    (c as f64 + 1.0) * 1e-5
}

#[allow(unused)]
/// A continuous recording carrying what a real cap picks up: an alpha
/// rhythm, frontal blinks, mains at 60 Hz, broadband noise up to Nyquist,
/// and a per-channel DC offset. `CAP` is followed by `I1` (EEG), `Resp`
/// (misc) and `HEOG` (EOG).
pub fn synthetic_recording(seconds: f64, seed: u64) -> Recording {
    let mut rng = StdRng::seed_from_u64(seed);
    let n = (seconds * SFREQ) as usize;
    let mut chs: Vec<Channel> = CAP.iter().map(|n| Channel::new(*n, ChannelType::Eeg)).collect();
    chs.push(Channel::new("I1", ChannelType::Eeg));
    chs.push(Channel::new("Resp", ChannelType::Misc));
    chs.push(Channel::new("HEOG", ChannelType::Eog));
    let n_ch = chs.len();

    let alpha: Vec<f64> = (0..n).map(|t| (2.0 * PI * 10.0 * t as f64 / SFREQ).sin()).collect();
    let blink: Vec<f64> = (0..n)
        .map(|t| {
            let phase = (t as f64 / SFREQ) % 3.0;
            (-((phase - 1.5) / 0.1).powi(2)).exp()
        })
        .collect();
    let mut data = Array2::<f64>::zeros((n_ch, n));
    for c in 0..n_ch {
        let frontal = if c < 2 { 4.0 } else { 0.2 };
        let posterior = if (8..13).contains(&c) { 1.0 } else { 0.3 };
        let mains = 0.5 + 0.1 * c as f64;
        for t in 0..n {
            let line = (2.0 * PI * 60.0 * t as f64 / SFREQ + c as f64).sin();
            let v = posterior * alpha[t] + frontal * blink[t] + mains * line + (rng.gen::<f64>() - 0.5);
            data[[c, t]] = 1e-5 * v + offset(c);
        }
    }
    Recording::new(SFREQ, chs, data).expect("valid synthetic recording")
}

#[allow(unused)]
/// Write `participants.tsv` listing `subjects` under `root`.
pub fn write_participants(root: &Path, subjects: &[&str]) {
    let mut text = String::from("participant_id\tage\n");
    for s in subjects {
        text.push_str(&format!("{s}\t30\n"));
    }
    std::fs::write(root.join("participants.tsv"), text).unwrap();
}

#[allow(unused)]
/// Store `rec` as `sub-XXX/eeg/sub-XXX_task-<task>_eeg.fif` with its
/// `channels.tsv` and `eeg.json` sidecars. Channels listed in `misc` are
/// declared `MISC` in the TSV.
pub fn write_bids_fif(root: &Path, subject: &str, task: &str, rec: &Recording, misc: &[&str]) -> PathBuf {
    let dir = root.join(subject).join("eeg");
    std::fs::create_dir_all(&dir).unwrap();
    let base = format!("{subject}_task-{task}");
    let path = dir.join(format!("{base}_eeg.fif"));
    exgprep::fiff::write_raw(&path, rec).unwrap();

    let mut tsv = String::from("name\ttype\tunits\tstatus\n");
    for ch in &rec.channels {
        let kind = if misc.contains(&ch.name.as_str()) {
            "MISC".to_string()
        } else {
            ch.kind.as_str().to_ascii_uppercase()
        };
        tsv.push_str(&format!("{}\t{kind}\tV\tgood\n", ch.name));
    }
    std::fs::write(dir.join(format!("{base}_channels.tsv")), tsv).unwrap();
    std::fs::write(dir.join(format!("{base}_eeg.json")), r#"{"PowerLineFrequency": 60}"#).unwrap();
    path
}

#[allow(unused)]
/// Mean power of `x` between `lo` and `hi` Hz.
pub fn band_power(x: &[f64], sfreq: f64, lo: f64, hi: f64) -> f64 {
    let (freqs, psd) = exgprep::classify::welch_psd(x, sfreq);
    let (sum, n) = freqs
        .iter()
        .zip(&psd)
        .filter(|(&f, _)| f >= lo && f <= hi)
        .fold((0.0, 0usize), |(s, n), (_, &p)| (s + p, n + 1));
    sum / n as f64
}

// ── MAT v5 writer (for EEGLAB fixtures) ───────────────────────────────────

fn mat_element(ty: u32, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(8 + payload.len() + 7);
    out.extend_from_slice(&ty.to_le_bytes());
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(payload);
    while out.len() % 8 != 0 {
        out.push(0);
    }
    out
}

#[allow(unused)]
/// Write a little-endian MAT v5 file of real double matrices
/// (`name`, rows, cols, column-major values).
pub fn write_mat_v5(path: &Path, vars: &[(&str, usize, usize, Vec<f64>)]) {
    const MI_INT8: u32 = 1;
    const MI_INT32: u32 = 5;
    const MI_UINT32: u32 = 6;
    const MI_DOUBLE: u32 = 9;
    const MI_MATRIX: u32 = 14;
    const MX_DOUBLE_CLASS: u32 = 6;

    let mut bytes = Vec::new();
    let mut text = b"MATLAB 5.0 MAT-file, written by exgprep tests".to_vec();
    text.resize(116, b' ');
    bytes.extend_from_slice(&text);
    bytes.extend_from_slice(&[0u8; 8]);
    bytes.extend_from_slice(&0x0100u16.to_le_bytes());
    bytes.extend_from_slice(b"IM");

    for (name, rows, cols, values) in vars {
        assert_eq!(rows * cols, values.len());
        let mut sub = Vec::new();
        let flags: Vec<u8> = [MX_DOUBLE_CLASS, 0].iter().flat_map(|v: &u32| v.to_le_bytes()).collect();
        sub.extend(mat_element(MI_UINT32, &flags));
        let dims: Vec<u8> = [*rows as i32, *cols as i32].iter().flat_map(|v| v.to_le_bytes()).collect();
        sub.extend(mat_element(MI_INT32, &dims));
        sub.extend(mat_element(MI_INT8, name.as_bytes()));
        let data: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        sub.extend(mat_element(MI_DOUBLE, &data));

        bytes.extend_from_slice(&MI_MATRIX.to_le_bytes());
        bytes.extend_from_slice(&(sub.len() as u32).to_le_bytes());
        bytes.extend(sub);
    }
    std::fs::write(path, bytes).unwrap();
}
