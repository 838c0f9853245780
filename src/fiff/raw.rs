//! Raw FIF reader (`mne.io.read_raw_fif`).
//!
//! 1. Load the tag directory (embedded directory, else scan the chain).
//! 2. Build the block tree and read `MeasInfo`.
//! 3. Collect the data buffers of the raw-data block.
//! 4. On demand, decode all buffers into a calibrated `[n_chan, n_times]` array:
//!
//! ```text
//! data[ch, t] = stored[t, ch] × chs[ch].cal × chs[ch].range
//! ```
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use ndarray::Array2;

use super::constants::*;
use super::info::{read_meas_info, MeasInfo};
use super::tag::{read_i32, TagHeader};
use super::tree::{read_tree, scan_directory, try_load_directory};
use crate::recording::{Channel, ChannelType, Recording};

/// One contiguous run of samples. `tag == None` marks a skipped gap.
#[derive(Debug, Clone)]
pub struct BufferRecord {
    pub tag:    Option<TagHeader>,
    pub n_samp: usize,
}

/// An opened raw FIF file; samples are read by [`RawFif::read_all_data`].
#[derive(Debug, Clone)]
pub struct RawFif {
    pub info:       MeasInfo,
    pub first_samp: u64,
    pub path:       PathBuf,
    pub buffers:    Vec<BufferRecord>,
}

impl RawFif {
    pub fn n_times(&self) -> usize {
        self.buffers.iter().map(|b| b.n_samp).sum()
    }

    /// All samples, calibrated, `[n_chan, n_times]`.
    pub fn read_all_data(&self) -> Result<Array2<f64>> {
        let n_ch = self.info.n_chan();
        let cals = self.info.cals();
        let mut out = Array2::<f64>::zeros((n_ch, self.n_times()));

        let file = File::open(&self.path)
            .with_context(|| format!("open {}", self.path.display()))?;
        let mut reader = BufReader::new(file);

        let mut offset = 0;
        for buf in &self.buffers {
            if let Some(tag) = &buf.tag {
                let block = read_buffer(&mut reader, tag, buf.n_samp, &cals)?;
                out.slice_mut(ndarray::s![.., offset..offset + buf.n_samp])
                    .assign(&block);
            }
            offset += buf.n_samp;
        }
        Ok(out)
    }

    /// Load everything into a [`Recording`].
    pub fn into_recording(self) -> Result<Recording> {
        let data = self.read_all_data()?;
        let channels = self
            .info
            .chs
            .iter()
            .map(|ch| {
                let kind = ChannelType::from_fiff_kind(ch.kind);
                Channel {
                    name: ch.name.clone(),
                    kind,
                    pos: if kind == ChannelType::Eeg { ch.position() } else { None },
                }
            })
            .collect();
        let mut rec = Recording::new(self.info.sfreq, channels, data)?;
        rec.bads = self.info.bads.clone();
        rec.highpass = self.info.highpass.unwrap_or(0.0);
        rec.lowpass = self.info.lowpass.unwrap_or(rec.sfreq / 2.0);
        rec.line_freq = self.info.line_freq;
        Ok(rec)
    }
}

/// Open a FIF file without loading samples.
pub fn open_raw<P: AsRef<Path>>(path: P) -> Result<RawFif> {
    let path = path.as_ref();
    let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let mut reader = BufReader::new(file);

    let directory = match try_load_directory(&mut reader)? {
        Some(d) => d,
        None => scan_directory(&mut reader)?,
    };
    let tree = read_tree(&mut reader, &directory)?;
    let info = read_meas_info(&mut reader, &tree)?;

    let raw_node = tree
        .find_block(FIFFB_MEAS)
        .and_then(|m| m.find_block(FIFFB_RAW_DATA).or_else(|| m.find_block(FIFFB_CONTINUOUS_DATA)))
        .ok_or_else(|| anyhow::anyhow!("no raw-data block in {}", path.display()))?;

    let n_chan = info.n_chan();
    if n_chan == 0 {
        bail!("{} declares zero channels", path.display());
    }

    let mut first_samp = 0u64;
    let mut pending_skip = 0usize;
    let mut buffers = Vec::new();
    for ent in &raw_node.entries {
        match ent.kind {
            FIFF_FIRST_SAMPLE => first_samp = read_i32(&mut reader, ent)?.max(0) as u64,
            FIFF_DATA_SKIP => pending_skip += read_i32(&mut reader, ent)?.max(0) as usize,
            FIFF_DATA_BUFFER => {
                let bps = bytes_per_sample(ent.ftype)
                    .ok_or_else(|| anyhow::anyhow!("unknown buffer type {}", ent.ftype))?;
                let n_samp = ent.size.max(0) as usize / (bps * n_chan);
                if pending_skip > 0 {
                    buffers.push(BufferRecord { tag: None, n_samp: n_samp * pending_skip });
                    pending_skip = 0;
                }
                buffers.push(BufferRecord { tag: Some(*ent), n_samp });
            }
            _ => {}
        }
    }
    if buffers.iter().all(|b| b.tag.is_none()) {
        bail!("no FIFF_DATA_BUFFER tags in {}", path.display());
    }

    Ok(RawFif { info, first_samp, path: path.to_path_buf(), buffers })
}

/// Decode one interleaved `[n_samp, n_chan]` big-endian buffer into `[n_chan, n_samp]`.
fn read_buffer<R: Read + Seek>(
    reader: &mut R,
    tag: &TagHeader,
    n_samp: usize,
    cals: &[f64],
) -> Result<Array2<f64>> {
    let n_chan = cals.len();
    let bps = bytes_per_sample(tag.ftype)
        .ok_or_else(|| anyhow::anyhow!("unsupported buffer type {}", tag.ftype))?;
    reader
        .seek(SeekFrom::Start(tag.data_pos()))
        .with_context(|| format!("seek to buffer data @ {:#x}", tag.data_pos()))?;
    let mut bytes = vec![0u8; n_samp * n_chan * bps];
    reader.read_exact(&mut bytes)?;

    let decode: fn(&[u8]) -> f64 = match tag.ftype {
        FIFFT_FLOAT => |b| f32::from_be_bytes([b[0], b[1], b[2], b[3]]) as f64,
        FIFFT_DOUBLE => |b| f64::from_be_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]),
        FIFFT_INT => |b| i32::from_be_bytes([b[0], b[1], b[2], b[3]]) as f64,
        FIFFT_SHORT | FIFFT_DAU_PACK16 => |b| i16::from_be_bytes([b[0], b[1]]) as f64,
        other => bail!("unsupported buffer type {other}"),
    };

    let mut out = Array2::<f64>::zeros((n_chan, n_samp));
    for (i, sample) in bytes.chunks_exact(bps).enumerate() {
        let (t, c) = (i / n_chan, i % n_chan);
        out[[c, t]] = decode(sample) * cals[c];
    }
    Ok(out)
}
