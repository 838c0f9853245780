//! Raw FIF writer (`raw.save(fname, overwrite=True)`).
//!
//! Layout:
//!
//! ```text
//! FILE_ID  DIR_POINTER(-1)
//! MEAS
//! ├─ MEAS_INFO   nchan, sfreq, highpass, lowpass, line_freq, ch_info × C
//! │  └─ MNE_BAD_CHANNELS   ch_name_list (only when there are bads)
//! └─ RAW_DATA    first_sample = 0, DATA_BUFFER(float) × ceil(T / buffer)
//! NOP(next = -1)
//! ```
//!
//! Samples are stored as big-endian `f32` volts with `cal = range = 1`.
//! Channel names longer than the 15 bytes a `ch_info` struct holds are
//! truncated, with a `-N` suffix where truncation would collide; the bad
//! list is renamed to match.
use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use log::warn;

use super::constants::*;
use super::info::{ChannelInfo, MeasInfo};
use super::tag::TagWriter;
use crate::recording::{ChannelType, Recording};

/// Longest channel name a `ch_info` struct stores.
pub const MAX_CH_NAME: usize = 15;

/// Stored name of every channel: unchanged when short enough, otherwise cut
/// to [`MAX_CH_NAME`] characters and made unique with `-1`, `-2`, ….
pub fn fiff_ch_names(names: &[&str]) -> Vec<String> {
    let mut taken: HashSet<String> =
        names.iter().filter(|n| n.chars().count() <= MAX_CH_NAME).map(|n| n.to_string()).collect();
    names
        .iter()
        .map(|&name| {
            if name.chars().count() <= MAX_CH_NAME {
                return name.to_string();
            }
            let mut short: String = name.chars().take(MAX_CH_NAME).collect();
            let mut k = 1;
            while taken.contains(&short) {
                let suffix = format!("-{k}");
                let head: String = name.chars().take(MAX_CH_NAME - suffix.len()).collect();
                short = head + &suffix;
                k += 1;
            }
            taken.insert(short.clone());
            short
        })
        .collect()
}

/// Build the measurement info describing `rec`.
pub fn meas_info(rec: &Recording) -> MeasInfo {
    let stored = fiff_ch_names(&rec.ch_names());
    let renamed: HashMap<&str, &str> = rec
        .channels
        .iter()
        .zip(&stored)
        .filter(|(ch, s)| ch.name != **s)
        .map(|(ch, s)| (ch.name.as_str(), s.as_str()))
        .collect();
    if !renamed.is_empty() {
        warn!("channel names truncated to {MAX_CH_NAME} characters: {renamed:?}");
    }

    let chs = rec
        .channels
        .iter()
        .zip(&stored)
        .enumerate()
        .map(|(i, (ch, name))| {
            let mut loc = [0f32; 12];
            if let Some(p) = ch.pos {
                loc[0] = p[0] as f32;
                loc[1] = p[1] as f32;
                loc[2] = p[2] as f32;
            }
            let (coil_type, unit) = match ch.kind {
                ChannelType::Eeg => (FIFFV_COIL_EEG, FIFF_UNIT_V),
                ChannelType::Eog | ChannelType::Ecg | ChannelType::Emg | ChannelType::Misc => {
                    (FIFFV_COIL_NONE, FIFF_UNIT_V)
                }
                ChannelType::Stim => (FIFFV_COIL_NONE, FIFF_UNIT_NONE),
            };
            ChannelInfo {
                scan_no: i as i32 + 1,
                log_no: i as i32 + 1,
                kind: ch.kind.fiff_kind(),
                range: 1.0,
                cal: 1.0,
                coil_type,
                loc,
                unit,
                unit_mul: 0,
                name: name.clone(),
            }
        })
        .collect();
    let bads = rec
        .bads
        .iter()
        .map(|b| renamed.get(b.as_str()).map_or_else(|| b.clone(), |s| s.to_string()))
        .collect();
    MeasInfo {
        sfreq: rec.sfreq,
        highpass: Some(rec.highpass),
        lowpass: Some(rec.lowpass),
        line_freq: rec.line_freq,
        chs,
        bads,
    }
}

/// Serialise `rec` to any sink. `buffer_len` is the number of samples per
/// data buffer.
pub fn write_raw_to<W: Write>(out: W, rec: &Recording, buffer_len: usize) -> Result<W> {
    let mut w = TagWriter::new(out);

    let mut file_id = Vec::with_capacity(20);
    file_id.extend_from_slice(&FIFFC_VERSION.to_be_bytes());
    // machid[2], secs, usecs all zero.
    file_id.extend_from_slice(&[0u8; 16]);
    w.write_tag(FIFF_FILE_ID, FIFFT_ID_STRUCT, &file_id)?;
    w.write_i32(FIFF_DIR_POINTER, -1)?;

    w.start_block(FIFFB_MEAS)?;
    meas_info(rec).write(&mut w)?;

    w.start_block(FIFFB_RAW_DATA)?;
    w.write_i32(FIFF_FIRST_SAMPLE, 0)?;
    let n_times = rec.n_times();
    let step = buffer_len.max(1);
    let mut start = 0;
    while start < n_times {
        let stop = (start + step).min(n_times);
        let block = rec.data.slice(ndarray::s![.., start..stop]);
        let mut payload = Vec::with_capacity(block.len() * 4);
        for t in 0..block.ncols() {
            for v in block.column(t) {
                payload.extend_from_slice(&(*v as f32).to_be_bytes());
            }
        }
        w.write_tag(FIFF_DATA_BUFFER, FIFFT_FLOAT, &payload)?;
        start = stop;
    }
    w.end_block(FIFFB_RAW_DATA)?;
    w.end_block(FIFFB_MEAS)?;
    w.finish()
}

/// Write `rec` to `path`, replacing any existing file. Buffers hold one
/// second of data.
pub fn write_raw(path: &Path, rec: &Recording) -> Result<()> {
    let file = File::create(path).with_context(|| format!("create {}", path.display()))?;
    let buffer_len = rec.sfreq.ceil() as usize;
    write_raw_to(BufWriter::new(file), rec, buffer_len)
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fiff::raw::open_raw;
    use crate::recording::Channel;
    use ndarray::Array2;

    fn sample() -> Recording {
        let mut fz = Channel::new("Fz", ChannelType::Eeg);
        fz.pos = Some([0.0, 0.056, 0.077]);
        let chs = vec![fz, Channel::new("Cz", ChannelType::Eeg), Channel::new("HEOG", ChannelType::Eog)];
        let data = Array2::from_shape_fn((3, 250), |(c, t)| 1e-6 * ((c + 1) as f64) * (t as f64 * 0.1).sin());
        let mut rec = Recording::new(100.0, chs, data).unwrap();
        rec.bads = vec!["Cz".into()];
        rec.highpass = 1.0;
        rec.lowpass = 45.0;
        rec.line_freq = Some(60.0);
        rec
    }

    #[test]
    fn written_file_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x_raw.fif");
        let rec = sample();
        write_raw(&path, &rec).unwrap();

        let raw = open_raw(&path).unwrap();
        // 250 samples in 100-sample buffers.
        assert_eq!(raw.buffers.len(), 3);
        assert_eq!(raw.n_times(), 250);
        let back = raw.into_recording().unwrap();
        assert_eq!(back.ch_names(), vec!["Fz", "Cz", "HEOG"]);
        assert_eq!(back.channels[2].kind, ChannelType::Eog);
        assert_eq!(back.bads, vec!["Cz".to_string()]);
        approx::assert_abs_diff_eq!(back.sfreq, 100.0);
        approx::assert_abs_diff_eq!(back.lowpass, 45.0, epsilon = 1e-6);
        assert_eq!(back.line_freq, Some(60.0));
        let p = back.channels[0].pos.unwrap();
        approx::assert_abs_diff_eq!(p[1], 0.056, epsilon = 1e-7);
        assert!(back.channels[1].pos.is_none());
        for (a, b) in back.data.iter().zip(rec.data.iter()) {
            approx::assert_abs_diff_eq!(*a, *b, epsilon = 1e-12);
        }
    }

    #[test]
    fn bads_land_in_the_mne_bad_channels_block() {
        let mut cursor = std::io::Cursor::new(write_raw_to(Vec::new(), &sample(), 100).unwrap());
        let directory = crate::fiff::scan_directory(&mut cursor).unwrap();
        let tree = crate::fiff::read_tree(&mut cursor, &directory).unwrap();
        let info = tree.find_block(FIFFB_MEAS_INFO).unwrap();
        let block = info.find_block(FIFFB_MNE_BAD_CHANNELS).expect("bad channel block");
        let tag = block.find_tag(FIFF_MNE_CH_NAME_LIST).expect("name list tag");
        assert_eq!(crate::fiff::tag::read_string(&mut cursor, tag).unwrap(), "Cz");
        assert!(info.find_tag(FIFF_BAD_CHS).is_none());
    }

    #[test]
    fn no_bads_no_block() {
        let mut rec = sample();
        rec.bads.clear();
        let mut cursor = std::io::Cursor::new(write_raw_to(Vec::new(), &rec, 100).unwrap());
        let directory = crate::fiff::scan_directory(&mut cursor).unwrap();
        let tree = crate::fiff::read_tree(&mut cursor, &directory).unwrap();
        assert!(tree.find_block(FIFFB_MNE_BAD_CHANNELS).is_none());
    }

    #[test]
    fn long_names_are_truncated_uniquely() {
        let names = fiff_ch_names(&["Fz", "VeryLongChannelName1", "VeryLongChannelName2", "VeryLongChannel"]);
        assert_eq!(names, vec!["Fz", "VeryLongChann-1", "VeryLongChann-2", "VeryLongChannel"]);
        assert!(names.iter().all(|n| n.len() <= MAX_CH_NAME));
    }

    #[test]
    fn long_names_save_and_keep_their_bad_mark() {
        let chs = vec![
            Channel::new("Cz", ChannelType::Eeg),
            Channel::new("EXG1-Reference-Left", ChannelType::Eeg),
            Channel::new("EXG1-Reference-Right", ChannelType::Eeg),
        ];
        let mut rec = Recording::new(100.0, chs, Array2::zeros((3, 50))).unwrap();
        rec.bads = vec!["EXG1-Reference-Right".into()];

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("long_raw.fif");
        write_raw(&path, &rec).unwrap();
        let back = open_raw(&path).unwrap().into_recording().unwrap();
        assert_eq!(back.ch_names(), vec!["Cz", "EXG1-Reference-", "EXG1-Referenc-1"]);
        assert_eq!(back.bads, vec!["EXG1-Referenc-1".to_string()]);
    }

    #[test]
    fn overwrite_replaces_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x_raw.fif");
        std::fs::write(&path, b"stale").unwrap();
        write_raw(&path, &sample()).unwrap();
        write_raw(&path, &sample()).unwrap();
        assert_eq!(open_raw(&path).unwrap().n_times(), 250);
    }
}
