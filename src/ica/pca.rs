//! Principal component analysis ahead of ICA (MNE's `_PCA(whiten=True)`).
//!
//! `x` is `[n_ch, n_times]`. Components are the eigenvectors of the sample
//! covariance `(x − μ)(x − μ)ᵀ / (T − 1)` sorted by decreasing eigenvalue, with
//! the sign fixed so the largest-magnitude loading of each is positive.
use anyhow::{bail, Result};
use nalgebra::{DMatrix, SymmetricEigen};
use ndarray::{s, Array1, Array2, Axis};

/// Eigenvalues below `max_ev × RANK_TOL` count as numerically zero.
const RANK_TOL: f64 = 1e-12;

#[derive(Debug, Clone)]
pub struct Pca {
    /// Per-channel mean, `[n_ch]`.
    pub mean: Array1<f64>,
    /// Components as rows, `[n_ch, n_ch]`.
    pub components: Array2<f64>,
    /// Variance along each component, decreasing.
    pub explained_variance: Array1<f64>,
}

impl Pca {
    pub fn fit(x: &Array2<f64>) -> Result<Self> {
        let (n_ch, n_times) = x.dim();
        if n_times < 2 {
            bail!("PCA needs at least 2 samples, got {n_times}");
        }
        let mean = x
            .mean_axis(Axis(1))
            .ok_or_else(|| anyhow::anyhow!("PCA of an empty array"))?;
        let xc = x - &mean.view().insert_axis(Axis(1));
        let cov = xc.dot(&xc.t()) / (n_times - 1) as f64;

        let eig = SymmetricEigen::new(DMatrix::from_fn(n_ch, n_ch, |i, j| cov[[i, j]]));
        let mut order: Vec<usize> = (0..n_ch).collect();
        order.sort_by(|&a, &b| eig.eigenvalues[b].total_cmp(&eig.eigenvalues[a]));

        let mut components = Array2::<f64>::zeros((n_ch, n_ch));
        let mut explained_variance = Array1::<f64>::zeros(n_ch);
        for (row, &k) in order.iter().enumerate() {
            let v = eig.eigenvectors.column(k);
            let lead = v.iter().copied().fold(0.0_f64, |m, x| if x.abs() > m.abs() { x } else { m });
            let sign = if lead < 0.0 { -1.0 } else { 1.0 };
            for c in 0..n_ch {
                components[[row, c]] = sign * v[c];
            }
            explained_variance[row] = eig.eigenvalues[k].max(0.0);
        }
        Ok(Self { mean, components, explained_variance })
    }

    /// Number of components above numerical zero.
    pub fn rank(&self) -> usize {
        let top = self.explained_variance.get(0).copied().unwrap_or(0.0);
        self.explained_variance.iter().filter(|&&v| v > top * RANK_TOL).count()
    }

    /// Smallest `n` whose cumulative explained-variance ratio reaches `threshold`
    /// (`min((cvar <= threshold).sum() + 1, n_ch)`).
    pub fn n_components_for(&self, threshold: f64) -> usize {
        let total: f64 = self.explained_variance.sum();
        if total <= 0.0 {
            return 0;
        }
        let mut cum = 0.0;
        let below = self
            .explained_variance
            .iter()
            .take_while(|&&v| {
                cum += v;
                cum / total <= threshold
            })
            .count();
        (below + 1).min(self.explained_variance.len())
    }

    /// Whitened scores of the first `n` components, `[n_times, n]`.
    pub fn whitened_scores(&self, x: &Array2<f64>, n: usize) -> Array2<f64> {
        let xc = x - &self.mean.view().insert_axis(Axis(1));
        let mut scores = self.components.slice(s![..n, ..]).dot(&xc).reversed_axes();
        for (mut col, &ev) in scores.columns_mut().into_iter().zip(self.explained_variance.iter()) {
            col /= ev.sqrt();
        }
        scores
    }
}
