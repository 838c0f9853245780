//! FIFF tag I/O.
//!
//! ```text
//! ┌──────────────┬──────────────┬──────────────┬────────────┐
//! │  kind : i32  │  type : u32  │  size : i32  │ next : i32 │  16 bytes, big-endian
//! ├──────────────┴──────────────┴──────────────┴────────────┤
//! │  <size bytes of payload>                                 │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! `next == 0`: the next tag follows immediately; `next > 0`: absolute
//! offset of the next tag; `next == -1`: end of chain.
use std::io::{Read, Seek, SeekFrom, Write};

use anyhow::{bail, Context, Result};

use super::constants::*;

// ── Reading ───────────────────────────────────────────────────────────────

/// Tag header with its file position; the payload is read on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TagHeader {
    pub kind: i32,
    pub ftype: u32,
    pub size: i32,
    pub next: i32,
    pub pos: u64,
}

impl TagHeader {
    #[inline]
    pub fn data_pos(&self) -> u64 {
        self.pos + 16
    }

    pub fn next_pos(&self) -> Option<u64> {
        match self.next {
            FIFFV_NEXT_SEQ => Some(self.data_pos() + self.size.max(0) as u64),
            n if n > 0 => Some(n as u64),
            _ => None,
        }
    }
}

pub fn read_tag_header<R: Read + Seek>(reader: &mut R, pos: u64) -> Result<TagHeader> {
    reader
        .seek(SeekFrom::Start(pos))
        .with_context(|| format!("seek to tag header @ {pos:#x}"))?;
    let mut buf = [0u8; 16];
    reader
        .read_exact(&mut buf)
        .with_context(|| format!("read tag header @ {pos:#x}"))?;
    let word = |i: usize| [buf[i], buf[i + 1], buf[i + 2], buf[i + 3]];
    Ok(TagHeader {
        kind: i32::from_be_bytes(word(0)),
        ftype: u32::from_be_bytes(word(4)),
        size: i32::from_be_bytes(word(8)),
        next: i32::from_be_bytes(word(12)),
        pos,
    })
}

/// Read the whole payload of `tag`.
pub fn read_payload<R: Read + Seek>(reader: &mut R, tag: &TagHeader) -> Result<Vec<u8>> {
    reader
        .seek(SeekFrom::Start(tag.data_pos()))
        .with_context(|| format!("seek to tag data @ {:#x}", tag.data_pos()))?;
    let mut buf = vec![0u8; tag.size.max(0) as usize];
    reader.read_exact(&mut buf)?;
    Ok(buf)
}

pub fn read_i32<R: Read + Seek>(reader: &mut R, tag: &TagHeader) -> Result<i32> {
    let raw = read_payload(reader, tag)?;
    let Some(b) = raw.get(..4) else { bail!("tag {} too short for i32", tag.kind) };
    Ok(i32::from_be_bytes([b[0], b[1], b[2], b[3]]))
}

pub fn read_f32<R: Read + Seek>(reader: &mut R, tag: &TagHeader) -> Result<f32> {
    let raw = read_payload(reader, tag)?;
    let Some(b) = raw.get(..4) else { bail!("tag {} too short for f32", tag.kind) };
    Ok(f32::from_be_bytes([b[0], b[1], b[2], b[3]]))
}

/// Latin-1 string payload.
pub fn read_string<R: Read + Seek>(reader: &mut R, tag: &TagHeader) -> Result<String> {
    Ok(read_payload(reader, tag)?.iter().map(|&b| b as char).collect())
}

/// Entries of a `FIFFT_DIR_ENTRY_STRUCT` tag. The `next` slot of each
/// entry holds the absolute position of the tag it describes.
pub fn read_directory<R: Read + Seek>(reader: &mut R, tag: &TagHeader) -> Result<Vec<TagHeader>> {
    if tag.ftype != FIFFT_DIR_ENTRY_STRUCT {
        bail!("expected FIFFT_DIR_ENTRY_STRUCT, got {}", tag.ftype);
    }
    let raw = read_payload(reader, tag)?;
    Ok(raw
        .chunks_exact(16)
        .map(|e| TagHeader {
            kind: i32::from_be_bytes([e[0], e[1], e[2], e[3]]),
            ftype: u32::from_be_bytes([e[4], e[5], e[6], e[7]]),
            size: i32::from_be_bytes([e[8], e[9], e[10], e[11]]),
            next: FIFFV_NEXT_NONE,
            pos: u32::from_be_bytes([e[12], e[13], e[14], e[15]]) as u64,
        })
        .collect())
}

// ── Writing ───────────────────────────────────────────────────────────────

/// Sequential tag writer. Every tag is chained with `next = 0` except the
/// terminating `FIFF_NOP` written by [`TagWriter::finish`].
pub struct TagWriter<W: Write> {
    out: W,
}

impl<W: Write> TagWriter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn write_tag(&mut self, kind: i32, ftype: u32, payload: &[u8]) -> Result<()> {
        self.write_raw(kind, ftype, payload, FIFFV_NEXT_SEQ)
    }

    fn write_raw(&mut self, kind: i32, ftype: u32, payload: &[u8], next: i32) -> Result<()> {
        let size = i32::try_from(payload.len())
            .with_context(|| format!("tag {kind} payload of {} bytes is too large", payload.len()))?;
        self.out.write_all(&kind.to_be_bytes())?;
        self.out.write_all(&ftype.to_be_bytes())?;
        self.out.write_all(&size.to_be_bytes())?;
        self.out.write_all(&next.to_be_bytes())?;
        self.out.write_all(payload)?;
        Ok(())
    }

    pub fn write_i32(&mut self, kind: i32, v: i32) -> Result<()> {
        self.write_tag(kind, FIFFT_INT, &v.to_be_bytes())
    }

    pub fn write_f32(&mut self, kind: i32, v: f32) -> Result<()> {
        self.write_tag(kind, FIFFT_FLOAT, &v.to_be_bytes())
    }

    /// Latin-1 string; characters outside the range become `?`.
    pub fn write_string(&mut self, kind: i32, s: &str) -> Result<()> {
        let bytes: Vec<u8> = s
            .chars()
            .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
            .collect();
        self.write_tag(kind, FIFFT_STRING, &bytes)
    }

    pub fn start_block(&mut self, block: i32) -> Result<()> {
        self.write_i32(FIFF_BLOCK_START, block)
    }

    pub fn end_block(&mut self, block: i32) -> Result<()> {
        self.write_i32(FIFF_BLOCK_END, block)
    }

    /// Terminate the chain and hand back the sink.
    pub fn finish(mut self) -> Result<W> {
        self.write_raw(FIFF_NOP, FIFFT_VOID, &[], FIFFV_NEXT_NONE)?;
        self.out.flush()?;
        Ok(self.out)
    }
}
