//! Average reference: subtract the mean across good EEG channels at each
//! time point from every EEG channel.
//!
//! Matches `raw.set_eeg_reference('average', projection=False)`: channels
//! marked bad do not contribute to the mean but are re-referenced too, and
//! non-EEG channels are left alone.
//!
//! `data[eeg, t] -= mean(data[good_eeg, t])`
use anyhow::{bail, Result};
use ndarray::{Array1, Axis};

use crate::recording::{ChannelType, Recording};

/// Re-reference `rec` in place. Fails when no good EEG channel is left.
pub fn set_average_reference(rec: &mut Recording) -> Result<()> {
    let good = rec.good_eeg();
    if good.is_empty() {
        bail!("average reference needs at least one good EEG channel");
    }
    let means: Array1<f64> = rec.data.select(Axis(0), &good).sum_axis(Axis(0)) / good.len() as f64;
    for ch in rec.picks(ChannelType::Eeg) {
        let mut row = rec.data.row_mut(ch);
        row -= &means;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::Channel;
    use ndarray::Array2;

    fn rec(kinds: &[ChannelType], data: Array2<f64>) -> Recording {
        let chs = kinds
            .iter()
            .enumerate()
            .map(|(i, &k)| Channel::new(format!("E{i}"), k))
            .collect();
        Recording::new(100.0, chs, data).unwrap()
    }

    #[test]
    fn channel_sum_is_zero_after_reference() {
        let data = Array2::from_shape_fn((8, 512), |(c, t)| ((c * 7 + t * 3) as f64).sin());
        let mut r = rec(&[ChannelType::Eeg; 8], data);
        set_average_reference(&mut r).unwrap();
        for &s in r.data.sum_axis(Axis(0)).iter() {
            approx::assert_abs_diff_eq!(s, 0.0, epsilon = 1e-10);
        }
    }

    #[test]
    fn reference_preserves_channel_differences() {
        let data = Array2::from_shape_fn((2, 10), |(c, _)| if c == 0 { 2.0 } else { 4.0 });
        let mut r = rec(&[ChannelType::Eeg; 2], data);
        set_average_reference(&mut r).unwrap();
        for t in 0..10 {
            approx::assert_abs_diff_eq!(r.data[[0, t]] - r.data[[1, t]], -2.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn bads_excluded_from_mean_and_non_eeg_untouched() {
        let data = Array2::from_shape_fn((4, 5), |(c, _)| [1.0, 3.0, 100.0, 7.0][c]);
        let mut r = rec(
            &[ChannelType::Eeg, ChannelType::Eeg, ChannelType::Eeg, ChannelType::Eog],
            data,
        );
        r.bads = vec!["E2".into()];
        set_average_reference(&mut r).unwrap();
        // mean of good EEG = 2
        approx::assert_abs_diff_eq!(r.data[[0, 0]], -1.0);
        approx::assert_abs_diff_eq!(r.data[[1, 0]], 1.0);
        approx::assert_abs_diff_eq!(r.data[[2, 0]], 98.0);
        approx::assert_abs_diff_eq!(r.data[[3, 0]], 7.0);
    }

    #[test]
    fn no_good_eeg_fails() {
        let mut r = rec(&[ChannelType::Eog], Array2::zeros((1, 4)));
        assert!(set_average_reference(&mut r).is_err());
    }
}
