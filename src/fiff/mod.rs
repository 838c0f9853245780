//! FIFF container: reader and writer for raw `.fif` recordings compatible
//! with [MNE-Python](https://mne.tools).
//!
//! The pipeline writes one `_preprocessed.fif` artifact per subject and can
//! read `.fif` inputs as well as its own output. Bad channels are stored in
//! the `FIFFB_MNE_BAD_CHANNELS` block MNE reads into `info['bads']`.
//!
//! # Quick start
//! ```no_run
//! use exgprep::fiff::{open_raw, write_raw};
//!
//! let raw = open_raw("sub-001_task-Simon_eeg.fif").unwrap();
//! println!("{} channels @ {} Hz", raw.info.n_chan(), raw.info.sfreq);
//! let rec = raw.into_recording().unwrap();
//! write_raw(std::path::Path::new("copy_eeg.fif"), &rec).unwrap();
//! ```
pub mod constants;
pub mod info;
pub mod raw;
pub mod tag;
pub mod tree;
pub mod write;

pub use info::{read_meas_info, ChannelInfo, MeasInfo};
pub use raw::{open_raw, BufferRecord, RawFif};
pub use tag::{read_tag_header, TagHeader, TagWriter};
pub use tree::{read_tree, scan_directory, try_load_directory, Node};
pub use write::{fiff_ch_names, meas_info, write_raw, write_raw_to, MAX_CH_NAME};
