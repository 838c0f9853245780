//! Independent component analysis of the EEG channels.
//!
//! ```text
//! Recording ─ good EEG rows ─ ÷ pre-whitener ─ PCA (99 % var) ─ infomax ─┐
//!                                                                         │
//!   IcaFit { W = unmixing · PCAₙ ,  A = PCAₙᵀ · mixing }  ◄───────────────┘
//!
//!   sources  S = W · (X / pw − μ)
//!   apply    X ← X − pw · A[:, ex] · S[ex]
//! ```
//!
//! [`Decomposer`] is the seam the pipeline fits through; [`InfomaxIca`] is
//! the extended-infomax implementation (`mne.preprocessing.ICA(method='infomax',
//! fit_params=dict(extended=True))`).
pub mod infomax;
pub mod pca;

use anyhow::{anyhow, bail, Context, Result};
use log::debug;
use nalgebra::DMatrix;
use ndarray::{s, Array1, Array2, Axis};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::config::IcaConfig;
use crate::recording::Recording;

pub use infomax::{infomax, kurtosis, kurtosis_columns, InfomaxParams, InfomaxResult};
pub use pca::Pca;

/// Fits a component decomposition to a recording without mutating it.
pub trait Decomposer {
    fn fit(&self, rec: &Recording) -> Result<IcaFit>;
}

/// A fitted decomposition over a fixed set of channels.
#[derive(Debug, Clone)]
pub struct IcaFit {
    /// Channels the decomposition was fitted on, in row order.
    pub ch_names: Vec<String>,
    /// Scalar standardisation applied before PCA.
    pub pre_whitener: f64,
    pub pca_mean: Array1<f64>,
    /// `[n_components, n_ch]`: maps standardised channel data to sources.
    pub unmixing: Array2<f64>,
    /// `[n_ch, n_components]`: column `k` is the scalp map of source `k`.
    pub mixing: Array2<f64>,
    pub n_iter: usize,
}

impl IcaFit {
    pub fn n_components(&self) -> usize {
        self.unmixing.nrows()
    }

    fn rows(&self, rec: &Recording) -> Result<Vec<usize>> {
        self.ch_names
            .iter()
            .map(|n| {
                rec.index_of(n)
                    .ok_or_else(|| anyhow!("channel {n} of the decomposition is missing"))
            })
            .collect()
    }

    fn standardised(&self, rec: &Recording, rows: &[usize]) -> Array2<f64> {
        let x = rec.data.select(Axis(0), rows) / self.pre_whitener;
        x - &self.pca_mean.view().insert_axis(Axis(1))
    }

    /// Source time courses, `[n_components, n_times]`.
    pub fn sources(&self, rec: &Recording) -> Result<Array2<f64>> {
        let rows = self.rows(rec)?;
        Ok(self.unmixing.dot(&self.standardised(rec, &rows)))
    }

    /// Subtract the contribution of the `exclude`d components from `rec`.
    pub fn apply(&self, rec: &mut Recording, exclude: &[usize]) -> Result<()> {
        if exclude.is_empty() {
            return Ok(());
        }
        if let Some(&bad) = exclude.iter().find(|&&k| k >= self.n_components()) {
            bail!("component {bad} out of range ({} components)", self.n_components());
        }
        let rows = self.rows(rec)?;
        let sources = self.unmixing.dot(&self.standardised(rec, &rows));
        let removed = self
            .mixing
            .select(Axis(1), exclude)
            .dot(&sources.select(Axis(0), exclude))
            * self.pre_whitener;
        for (r, &ch) in rows.iter().enumerate() {
            let mut row = rec.data.row_mut(ch);
            row -= &removed.row(r);
        }
        Ok(())
    }
}

/// Extended-infomax decomposition of the good EEG channels.
#[derive(Debug, Clone, Default)]
pub struct InfomaxIca {
    pub cfg: IcaConfig,
}

impl InfomaxIca {
    pub fn new(cfg: IcaConfig) -> Self {
        Self { cfg }
    }
}

impl Decomposer for InfomaxIca {
    fn fit(&self, rec: &Recording) -> Result<IcaFit> {
        let rows = rec.good_eeg();
        if rows.len() < 2 {
            bail!("ICA needs at least 2 good EEG channels, found {}", rows.len());
        }
        let x = rec.data.select(Axis(0), &rows);
        let pre_whitener = x.std(0.0);
        if !(pre_whitener.is_finite() && pre_whitener > 0.0) {
            bail!("EEG data has no variance to decompose");
        }
        let x = x / pre_whitener;

        let pca = Pca::fit(&x).context("PCA before ICA")?;
        let rank = pca.rank();
        let wanted = if self.cfg.n_components >= 1.0 {
            (self.cfg.n_components as usize).min(rows.len())
        } else {
            pca.n_components_for(self.cfg.n_components)
        };
        let n = wanted.max(2).min(rank);
        if n < 2 {
            bail!("EEG data has rank {rank}; ICA needs at least 2 components");
        }
        debug!(
            "ICA: {} channels, {n} PCA components (rank {rank}, requested {})",
            rows.len(),
            self.cfg.n_components
        );

        let params = InfomaxParams {
            extended: self.cfg.extended,
            max_iter: self.cfg.max_iter(),
            ..InfomaxParams::default()
        };
        let mut rng = StdRng::seed_from_u64(self.cfg.random_state);
        let scores = pca.whitened_scores(&x, n);
        let fit = infomax(&scores, &params, &mut rng).context("infomax")?;
        debug!("infomax finished after {} steps", fit.n_iter);

        // Undo the PCA whitening so the unmixing applies to plain PCA scores.
        let mut unmixing = fit.unmixing;
        for (mut col, &ev) in unmixing.columns_mut().into_iter().zip(pca.explained_variance.iter()) {
            col /= ev.sqrt();
        }
        let mixing = pinv(&unmixing)?;

        let pca_n = pca.components.slice(s![..n, ..]);
        Ok(IcaFit {
            ch_names: rows.iter().map(|&i| rec.channels[i].name.clone()).collect(),
            pre_whitener,
            pca_mean: pca.mean.clone(),
            unmixing: unmixing.dot(&pca_n),
            mixing: pca_n.t().dot(&mixing),
            n_iter: fit.n_iter,
        })
    }
}

fn pinv(m: &Array2<f64>) -> Result<Array2<f64>> {
    let (r, c) = m.dim();
    let inv = DMatrix::from_fn(r, c, |i, j| m[[i, j]])
        .pseudo_inverse(1e-15)
        .map_err(|e| anyhow!("pseudo-inverse of the unmixing matrix failed: {e}"))?;
    Ok(Array2::from_shape_fn((c, r), |(i, j)| inv[(i, j)]))
}
