//! FIFF format constants.
//!
//! Names follow `mne/_fiff/constants.py` so the reader and writer can be
//! cross-checked against MNE.  Only the subset needed to store and reload a
//! continuous EEG recording is listed.
//!
//! Every item in a FIF file is a **tag**: a 16-byte big-endian header
//! (`kind`, `type`, `size`, `next`) followed by `size` payload bytes.  Tags
//! are grouped into nested blocks by `FIFF_BLOCK_START` / `FIFF_BLOCK_END`.

// ── Block kinds ───────────────────────────────────────────────────────────

/// Measurement block, the top-level container for one recording.
pub const FIFFB_MEAS:            i32 = 100;
/// Channel metadata, sampling rate, bads.
pub const FIFFB_MEAS_INFO:       i32 = 101;
/// Raw (continuous) data block.
pub const FIFFB_RAW_DATA:        i32 = 102;
/// Continuous data block written by some acquisition systems.
pub const FIFFB_CONTINUOUS_DATA: i32 = 112;
/// Holds the bad channel list MNE reads into `info['bads']`.
pub const FIFFB_MNE_BAD_CHANNELS: i32 = 359;

// ── Tag kinds: structure ──────────────────────────────────────────────────

pub const FIFF_FILE_ID:      i32 = 100;
/// Byte offset of the embedded tag directory, or -1 when absent.
pub const FIFF_DIR_POINTER:  i32 = 101;
pub const FIFF_BLOCK_START:  i32 = 104;
pub const FIFF_BLOCK_END:    i32 = 105;
/// Padding / terminator tag with no payload.
pub const FIFF_NOP:          i32 = 108;

// ── Tag kinds: measurement info ───────────────────────────────────────────

pub const FIFF_NCHAN:        i32 = 200;
pub const FIFF_SFREQ:        i32 = 201;
pub const FIFF_CH_INFO:      i32 = 203;
pub const FIFF_FIRST_SAMPLE: i32 = 208;
pub const FIFF_LOWPASS:      i32 = 219;
/// Colon-separated bad channel names (older writers).
pub const FIFF_BAD_CHS:      i32 = 220;
pub const FIFF_HIGHPASS:     i32 = 223;
pub const FIFF_LINE_FREQ:    i32 = 235;
/// Colon-separated channel names inside `FIFFB_MNE_BAD_CHANNELS`.
pub const FIFF_MNE_CH_NAME_LIST: i32 = 3502;

// ── Tag kinds: data ───────────────────────────────────────────────────────

/// One buffer of samples, interleaved `[n_samp, n_chan]`.
pub const FIFF_DATA_BUFFER:  i32 = 300;
/// Skip `n` buffers (gap filled with zeros on read).
pub const FIFF_DATA_SKIP:    i32 = 301;

// ── Payload types ─────────────────────────────────────────────────────────

pub const FIFFT_VOID:             u32 = 0;
pub const FIFFT_SHORT:            u32 = 2;
pub const FIFFT_INT:              u32 = 3;
pub const FIFFT_FLOAT:            u32 = 4;
pub const FIFFT_DOUBLE:           u32 = 5;
pub const FIFFT_STRING:           u32 = 10;
pub const FIFFT_DAU_PACK16:       u32 = 16;
/// 96-byte channel info struct.
pub const FIFFT_CH_INFO_STRUCT:   u32 = 30;
/// 20-byte file id struct.
pub const FIFFT_ID_STRUCT:        u32 = 31;
pub const FIFFT_DIR_ENTRY_STRUCT: u32 = 32;

// ── `next` sentinels ──────────────────────────────────────────────────────

/// Next tag follows immediately.
pub const FIFFV_NEXT_SEQ:  i32 = 0;
/// End of the tag chain.
pub const FIFFV_NEXT_NONE: i32 = -1;

// ── Channel kinds ─────────────────────────────────────────────────────────

pub const FIFFV_EEG_CH:  i32 = 2;
pub const FIFFV_STIM_CH: i32 = 3;
pub const FIFFV_EOG_CH:  i32 = 202;
pub const FIFFV_EMG_CH:  i32 = 302;
pub const FIFFV_ECG_CH:  i32 = 402;
pub const FIFFV_MISC_CH: i32 = 502;

// ── Units / coils ─────────────────────────────────────────────────────────

pub const FIFF_UNIT_NONE:   i32 = -1;
pub const FIFF_UNIT_V:      i32 = 107;
pub const FIFFV_COIL_NONE:  i32 = 0;
pub const FIFFV_COIL_EEG:   i32 = 1;

/// `FIFFC_MAJOR_VERSION << 16 | FIFFC_MINOR_VERSION`.
pub const FIFFC_VERSION:    i32 = (1 << 16) | 3;

/// Bytes per sample for data-buffer payload types.
///
/// ```
/// use exgprep::fiff::constants::{bytes_per_sample, FIFFT_FLOAT, FIFFT_SHORT};
/// assert_eq!(bytes_per_sample(FIFFT_FLOAT), Some(4));
/// assert_eq!(bytes_per_sample(FIFFT_SHORT), Some(2));
/// assert_eq!(bytes_per_sample(99), None);
/// ```
pub fn bytes_per_sample(tag_type: u32) -> Option<usize> {
    match tag_type {
        FIFFT_DAU_PACK16 | FIFFT_SHORT => Some(2),
        FIFFT_FLOAT | FIFFT_INT        => Some(4),
        FIFFT_DOUBLE                   => Some(8),
        _                              => None,
    }
}
