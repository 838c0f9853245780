//! Participants manifest.
//!
//! Reads the BIDS `participants.tsv` and returns the `participant_id`
//! column verbatim, in file order. Duplicates are kept.
use std::path::Path;

use anyhow::{bail, Context, Result};

/// Column holding the `sub-<label>` identifiers.
pub const PARTICIPANT_ID: &str = "participant_id";

/// Read the ordered subject list from a tab-separated manifest.
pub fn read_participants(path: &Path) -> Result<Vec<String>> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("opening participants manifest {}", path.display()))?;

    let headers = reader
        .headers()
        .with_context(|| format!("reading header of {}", path.display()))?
        .clone();
    let Some(col) = headers.iter().position(|h| h.trim() == PARTICIPANT_ID) else {
        bail!("{} has no '{PARTICIPANT_ID}' column", path.display());
    };

    let mut subjects = Vec::new();
    for (row, record) in reader.records().enumerate() {
        let record =
            record.with_context(|| format!("{}: malformed row {}", path.display(), row + 2))?;
        let id = record
            .get(col)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .with_context(|| format!("{}: row {} has no participant id", path.display(), row + 2))?;
        subjects.push(id.to_string());
    }
    Ok(subjects)
}

/// Strip the `sub-` entity prefix: `sub-002` → `002`.
///
/// Takes the text after the last `-`, so a bare label passes through.
pub fn subject_label(subject: &str) -> &str {
    subject.rsplit('-').next().unwrap_or(subject)
}
