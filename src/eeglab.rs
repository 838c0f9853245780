//! EEGLAB `.set` reader.
//!
//! Reads continuous datasets saved with flat top-level variables (`srate`,
//! `nbchan`, `pnts`, `trials`, and `data` when it is embedded). The samples
//! come from the embedded `data` matrix or, when present, from the sibling
//! `.fdt` file:
//!
//! ```text
//! .fdt   float32 LE, frame-major:  c0 t0 │ c1 t0 │ … │ cN t0 │ c0 t1 │ …
//! data   [nbchan × pnts] MATLAB column-major (the same order)
//! ```
//!
//! Values are stored in µV and returned in V. Channel names are not read
//! from the file; they default to `E1 … En` and are normally replaced from
//! the BIDS `channels.tsv` sidecar.
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use log::debug;
use matfile::{MatFile, NumericData};
use ndarray::Array2;

use crate::recording::{Channel, ChannelType, Recording};

const UV_TO_V: f64 = 1e-6;
const HDF5_MAGIC: [u8; 8] = [0x89, b'H', b'D', b'F', 0x0d, 0x0a, 0x1a, 0x0a];

/// Scalar header fields of a dataset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SetHeader {
    pub srate: f64,
    pub nbchan: usize,
    pub pnts: usize,
    pub trials: usize,
}

/// Read a continuous EEGLAB dataset into a [`Recording`] of EEG channels.
pub fn read_set(path: &Path) -> Result<Recording> {
    if is_hdf5(path)? {
        bail!(
            "{} is a MATLAB v7.3 (HDF5) file; re-save it with pop_saveset(..., 'version', '7')",
            path.display()
        );
    }
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mat = MatFile::parse(BufReader::new(file))
        .map_err(|e| anyhow!("parsing {}: {e:?}", path.display()))?;
    let header = read_header(&mat)
        .with_context(|| format!("{} holds no flat EEGLAB header", path.display()))?;
    if header.trials > 1 {
        bail!("{} is epoched ({} trials); only continuous data is supported", path.display(), header.trials);
    }

    let fdt = path.with_extension("fdt");
    let samples = if fdt.exists() {
        debug!("reading samples from {}", fdt.display());
        read_fdt(&fdt, header.nbchan, header.pnts)?
    } else {
        let arr = mat
            .find_by_name("data")
            .ok_or_else(|| anyhow!("{} has neither a .fdt file nor a 'data' variable", path.display()))?;
        let size = arr.size();
        if size.len() != 2 || size[0] != header.nbchan || size[1] != header.pnts {
            bail!(
                "'data' in {} is {:?}, expected [{}, {}]",
                path.display(),
                size,
                header.nbchan,
                header.pnts
            );
        }
        numeric_values(arr.data())
    };

    let data = frames_to_array(&samples, header.nbchan, header.pnts)?;
    let channels = (1..=header.nbchan)
        .map(|i| Channel::new(format!("E{i}"), ChannelType::Eeg))
        .collect();
    Recording::new(header.srate, channels, data)
}

fn is_hdf5(path: &Path) -> Result<bool> {
    let mut file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut magic = [0u8; 8];
    Ok(file.read_exact(&mut magic).is_ok() && magic == HDF5_MAGIC)
}

fn read_header(mat: &MatFile) -> Result<SetHeader> {
    let scalar = |name: &str| -> Result<f64> {
        mat.find_by_name(name)
            .and_then(|a| numeric_values(a.data()).first().copied())
            .ok_or_else(|| anyhow!("missing scalar '{name}'"))
    };
    let count = |name: &str| -> Result<usize> {
        let v = scalar(name)?;
        if v < 0.0 || v.fract() != 0.0 {
            bail!("'{name}' = {v} is not a count");
        }
        Ok(v as usize)
    };
    let header = SetHeader {
        srate: scalar("srate")?,
        nbchan: count("nbchan")?,
        pnts: count("pnts")?,
        trials: if mat.find_by_name("trials").is_some() { count("trials")? } else { 1 },
    };
    if header.nbchan == 0 || header.pnts == 0 {
        bail!("empty dataset ({} channels, {} samples)", header.nbchan, header.pnts);
    }
    Ok(header)
}

/// Real part of any numeric MAT array, widened to `f64`.
pub fn numeric_values(data: &NumericData) -> Vec<f64> {
    fn widen<T: Copy + Into<f64>>(v: &[T]) -> Vec<f64> {
        v.iter().map(|&x| x.into()).collect()
    }
    match data {
        NumericData::Double { real, .. } => real.clone(),
        NumericData::Single { real, .. } => widen(real),
        NumericData::Int8 { real, .. } => widen(real),
        NumericData::Int16 { real, .. } => widen(real),
        NumericData::Int32 { real, .. } => widen(real),
        NumericData::Int64 { real, .. } => real.iter().map(|&x| x as f64).collect(),
        NumericData::UInt8 { real, .. } => widen(real),
        NumericData::UInt16 { real, .. } => widen(real),
        NumericData::UInt32 { real, .. } => widen(real),
        NumericData::UInt64 { real, .. } => real.iter().map(|&x| x as f64).collect(),
    }
}

/// Read `n_chan × n_times` float32 LE samples (frame-major) from a `.fdt` file.
pub fn read_fdt(path: &Path, n_chan: usize, n_times: usize) -> Result<Vec<f64>> {
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let expected = n_chan * n_times * 4;
    if bytes.len() < expected {
        bail!(
            "{} has {} bytes, expected {expected} for {n_chan} channels × {n_times} samples",
            path.display(),
            bytes.len()
        );
    }
    Ok(bytes[..expected]
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f64)
        .collect())
}

/// Frame-major µV samples → `[n_chan, n_times]` volts.
fn frames_to_array(samples: &[f64], n_chan: usize, n_times: usize) -> Result<Array2<f64>> {
    if samples.len() != n_chan * n_times {
        bail!("{} samples do not fill {n_chan} × {n_times}", samples.len());
    }
    Ok(Array2::from_shape_fn((n_chan, n_times), |(c, t)| samples[t * n_chan + c] * UV_TO_V))
}
