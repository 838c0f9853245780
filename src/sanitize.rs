//! Channel clean-up before any signal processing.
//!
//! 1. drop the configured non-EEG channels that are present
//! 2. retype every `misc` channel as `eeg`
//! 3. place the EEG channels with a montage, warning about unknown names
use std::collections::HashMap;

use anyhow::Result;
use log::{debug, warn};

use crate::montage::Montage;
use crate::recording::{ChannelType, Recording};

/// Run the three clean-up steps in order.
pub fn sanitize(rec: &mut Recording, drop: &[String], montage: &Montage) -> Result<()> {
    let dropped = rec.drop_channels(drop);
    if !dropped.is_empty() {
        debug!("dropped channels {dropped:?}");
    }
    let retyped = misc_to_eeg(rec)?;
    if !retyped.is_empty() {
        debug!("retyped {} misc channels as eeg", retyped.len());
    }
    let missing = apply_montage(rec, montage);
    if !missing.is_empty() {
        warn!("no montage position for {missing:?}; they are left unplaced");
    }
    Ok(())
}

/// Retype every `misc` channel as `eeg`. Returns the affected names.
pub fn misc_to_eeg(rec: &mut Recording) -> Result<Vec<String>> {
    let mapping: HashMap<String, ChannelType> = rec
        .channels
        .iter()
        .filter(|c| c.kind == ChannelType::Misc)
        .map(|c| (c.name.clone(), ChannelType::Eeg))
        .collect();
    rec.set_channel_types(&mapping)?;
    let mut names: Vec<String> = mapping.into_keys().collect();
    names.sort();
    Ok(names)
}

/// Set EEG channel positions from `montage` (exact name match) and clear
/// them on every other channel. Returns the EEG channels without a position.
pub fn apply_montage(rec: &mut Recording, montage: &Montage) -> Vec<String> {
    let mut missing = Vec::new();
    for ch in &mut rec.channels {
        if ch.kind != ChannelType::Eeg {
            ch.pos = None;
            continue;
        }
        ch.pos = montage.position(&ch.name);
        if ch.pos.is_none() {
            missing.push(ch.name.clone());
        }
    }
    missing
}
