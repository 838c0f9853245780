//! Measurement info: the `FIFFB_MEAS_INFO` block.
//!
//! Only the fields an EEG recording needs are kept; MEG specifics
//! (projectors, compensation, HPI) are skipped on read and never written.
use std::io::{Read, Seek, Write};

use anyhow::{bail, Result};

use super::constants::*;
use super::tag::*;
use super::tree::Node;

/// Size of a `FIFFT_CH_INFO_STRUCT` payload.
pub const CH_INFO_SIZE: usize = 96;

/// One channel descriptor.
///
/// ```text
///  0  scanno     i32      24  loc        12 × f32
///  4  logno      i32      72  unit       i32
///  8  kind       i32      76  unit_mul   i32
/// 12  range      f32      80  ch_name    16 × u8 (NUL padded)
/// 16  cal        f32
/// 20  coil_type  i32      = 96 bytes, big-endian
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelInfo {
    pub scan_no:   i32,
    pub log_no:    i32,
    pub kind:      i32,
    pub range:     f32,
    pub cal:       f32,
    pub coil_type: i32,
    /// `[x, y, z, …]` in metres; the first three are the electrode position.
    pub loc:       [f32; 12],
    pub unit:      i32,
    pub unit_mul:  i32,
    pub name:      String,
}

impl ChannelInfo {
    /// Factor turning stored samples into physical units.
    #[inline]
    pub fn calibration(&self) -> f64 {
        self.cal as f64 * self.range as f64
    }

    /// Electrode position, `None` when all zeros or non-finite.
    pub fn position(&self) -> Option<[f64; 3]> {
        let p = [self.loc[0] as f64, self.loc[1] as f64, self.loc[2] as f64];
        let valid = p.iter().all(|v| v.is_finite()) && p.iter().any(|&v| v != 0.0);
        valid.then_some(p)
    }

    pub fn from_bytes(raw: &[u8]) -> Result<Self> {
        if raw.len() < CH_INFO_SIZE {
            bail!("ch_info payload too short: {} bytes (need {CH_INFO_SIZE})", raw.len());
        }
        let word = |o: usize| [raw[o], raw[o + 1], raw[o + 2], raw[o + 3]];
        let mut loc = [0f32; 12];
        for (i, v) in loc.iter_mut().enumerate() {
            *v = f32::from_be_bytes(word(24 + 4 * i));
        }
        let name_bytes = &raw[80..96];
        let end = name_bytes.iter().position(|&b| b == 0).unwrap_or(16);
        Ok(Self {
            scan_no:   i32::from_be_bytes(word(0)),
            log_no:    i32::from_be_bytes(word(4)),
            kind:      i32::from_be_bytes(word(8)),
            range:     f32::from_be_bytes(word(12)),
            cal:       f32::from_be_bytes(word(16)),
            coil_type: i32::from_be_bytes(word(20)),
            loc,
            unit:      i32::from_be_bytes(word(72)),
            unit_mul:  i32::from_be_bytes(word(76)),
            name:      name_bytes[..end].iter().map(|&b| b as char).collect(),
        })
    }

    /// Serialise to the on-disk struct. Names longer than 15 bytes are an
    /// error; [`meas_info`](super::write::meas_info) shortens them first.
    pub fn to_bytes(&self) -> Result<[u8; CH_INFO_SIZE]> {
        let name: Vec<u8> = self
            .name
            .chars()
            .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
            .collect();
        if name.len() > 15 {
            bail!("channel name '{}' longer than 15 characters", self.name);
        }
        let mut out = [0u8; CH_INFO_SIZE];
        out[0..4].copy_from_slice(&self.scan_no.to_be_bytes());
        out[4..8].copy_from_slice(&self.log_no.to_be_bytes());
        out[8..12].copy_from_slice(&self.kind.to_be_bytes());
        out[12..16].copy_from_slice(&self.range.to_be_bytes());
        out[16..20].copy_from_slice(&self.cal.to_be_bytes());
        out[20..24].copy_from_slice(&self.coil_type.to_be_bytes());
        for (i, v) in self.loc.iter().enumerate() {
            out[24 + 4 * i..28 + 4 * i].copy_from_slice(&v.to_be_bytes());
        }
        out[72..76].copy_from_slice(&self.unit.to_be_bytes());
        out[76..80].copy_from_slice(&self.unit_mul.to_be_bytes());
        out[80..80 + name.len()].copy_from_slice(&name);
        Ok(out)
    }
}

/// Measurement metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct MeasInfo {
    pub sfreq:     f64,
    pub lowpass:   Option<f64>,
    pub highpass:  Option<f64>,
    pub line_freq: Option<f64>,
    pub chs:       Vec<ChannelInfo>,
    pub bads:      Vec<String>,
}

impl MeasInfo {
    #[inline]
    pub fn n_chan(&self) -> usize {
        self.chs.len()
    }

    pub fn cals(&self) -> Vec<f64> {
        self.chs.iter().map(ChannelInfo::calibration).collect()
    }

    pub fn ch_names(&self) -> Vec<&str> {
        self.chs.iter().map(|c| c.name.as_str()).collect()
    }

    /// Write the `FIFFB_MEAS_INFO` block.
    pub fn write<W: Write>(&self, w: &mut TagWriter<W>) -> Result<()> {
        w.start_block(FIFFB_MEAS_INFO)?;
        w.write_i32(FIFF_NCHAN, self.n_chan() as i32)?;
        w.write_f32(FIFF_SFREQ, self.sfreq as f32)?;
        if let Some(hp) = self.highpass {
            w.write_f32(FIFF_HIGHPASS, hp as f32)?;
        }
        if let Some(lp) = self.lowpass {
            w.write_f32(FIFF_LOWPASS, lp as f32)?;
        }
        if let Some(lf) = self.line_freq {
            w.write_f32(FIFF_LINE_FREQ, lf as f32)?;
        }
        for ch in &self.chs {
            w.write_tag(FIFF_CH_INFO, FIFFT_CH_INFO_STRUCT, &ch.to_bytes()?)?;
        }
        if !self.bads.is_empty() {
            w.start_block(FIFFB_MNE_BAD_CHANNELS)?;
            w.write_string(FIFF_MNE_CH_NAME_LIST, &self.bads.join(":"))?;
            w.end_block(FIFFB_MNE_BAD_CHANNELS)?;
        }
        w.end_block(FIFFB_MEAS_INFO)
    }
}

/// Read `MeasInfo` from the tree of an open file.
pub fn read_meas_info<R: Read + Seek>(reader: &mut R, tree: &Node) -> Result<MeasInfo> {
    let info_node = tree
        .find_block(FIFFB_MEAS)
        .and_then(|m| m.find_block(FIFFB_MEAS_INFO))
        .ok_or_else(|| anyhow::anyhow!("FIFFB_MEAS_INFO block not found"))?;

    let mut n_chan = None::<usize>;
    let mut sfreq = None::<f64>;
    let mut lowpass = None;
    let mut highpass = None;
    let mut line_freq = None;
    let mut chs = Vec::new();
    let mut bads = Vec::new();

    let finite = |v: f32| v.is_finite().then_some(v as f64);

    for ent in &info_node.entries {
        match ent.kind {
            FIFF_NCHAN => n_chan = Some(read_i32(reader, ent)?.max(0) as usize),
            FIFF_SFREQ => sfreq = Some(read_f32(reader, ent)? as f64),
            FIFF_LOWPASS => lowpass = finite(read_f32(reader, ent)?),
            FIFF_HIGHPASS => highpass = finite(read_f32(reader, ent)?),
            FIFF_LINE_FREQ => line_freq = finite(read_f32(reader, ent)?),
            FIFF_CH_INFO => chs.push(ChannelInfo::from_bytes(&read_payload(reader, ent)?)?),
            FIFF_BAD_CHS => bads = split_names(&read_string(reader, ent)?),
            _ => {}
        }
    }
    let bad_block = info_node
        .find_block(FIFFB_MNE_BAD_CHANNELS)
        .and_then(|b| b.find_tag(FIFF_MNE_CH_NAME_LIST));
    if let Some(tag) = bad_block {
        bads = split_names(&read_string(reader, tag)?);
    }

    let n_chan = n_chan.ok_or_else(|| anyhow::anyhow!("FIFF_NCHAN not found"))?;
    let sfreq = sfreq.ok_or_else(|| anyhow::anyhow!("FIFF_SFREQ not found"))?;
    if chs.len() != n_chan {
        bail!("expected {n_chan} ch_info structs, got {}", chs.len());
    }
    Ok(MeasInfo { sfreq, lowpass, highpass, line_freq, chs, bads })
}

fn split_names(list: &str) -> Vec<String> {
    list.split(':')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
