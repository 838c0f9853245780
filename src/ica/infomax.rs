//! Extended infomax ICA (Bell & Sejnowski 1995; Lee et al. 1999), following
//! `mne.preprocessing.infomax` step for step.
//!
//! Each pass visits the samples in a random order, block by block:
//!
//! ```text
//!  u  = x_blk · W + 1·bᵀ
//!  W += η · W · (block·I − signs ⊙ (uᵀ tanh u) − uᵀu)      extended
//!  W += η · W · (block·I + uᵀ (1 − 2σ(u)))                 logistic
//! ```
//!
//! The learning rate is annealed when successive weight changes turn by more
//! than `anneal_deg`; a blow-up restarts training from the identity with a
//! smaller rate. In extended mode, the sub-/super-Gaussian `signs` track the
//! kurtosis of the current sources.
use anyhow::{bail, Result};
use log::debug;
use ndarray::{s, Array1, Array2, ArrayView1, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;

#[derive(Debug, Clone, PartialEq)]
pub struct InfomaxParams {
    /// `None`: `0.01 / ln(n_features²)`.
    pub l_rate: Option<f64>,
    /// `None`: `floor(sqrt(n_samples / 3))`.
    pub block: Option<usize>,
    pub w_change: f64,
    pub anneal_deg: f64,
    /// `None`: 0.98 extended, 0.9 logistic.
    pub anneal_step: Option<f64>,
    pub extended: bool,
    pub n_subgauss: usize,
    pub kurt_size: usize,
    pub ext_blocks: usize,
    pub max_iter: usize,
    pub blowup: f64,
    pub blowup_fac: f64,
    pub n_small_angle: Option<usize>,
    pub use_bias: bool,
}

impl Default for InfomaxParams {
    fn default() -> Self {
        Self {
            l_rate: None,
            block: None,
            w_change: 1e-12,
            anneal_deg: 60.0,
            anneal_step: None,
            extended: true,
            n_subgauss: 1,
            kurt_size: 6000,
            ext_blocks: 1,
            max_iter: 200,
            blowup: 1e4,
            blowup_fac: 0.5,
            n_small_angle: Some(20),
            use_bias: true,
        }
    }
}

const MAX_WEIGHT: f64 = 1e8;
const RESTART_FAC: f64 = 0.9;
const MIN_L_RATE: f64 = 1e-10;
const EXTMOMENTUM: f64 = 0.5;
const SIGNSBIAS: f64 = 0.02;
const SIGNCOUNT_THRESHOLD: usize = 25;
const SIGNCOUNT_STEP: usize = 2;

#[derive(Debug, Clone)]
pub struct InfomaxResult {
    /// Unmixing matrix, `[n_features, n_features]`; sources = `unmixing · xᵀ`.
    pub unmixing: Array2<f64>,
    pub n_iter: usize,
}

/// Run infomax on `data` (`[n_samples, n_features]`, whitened).
pub fn infomax(data: &Array2<f64>, params: &InfomaxParams, rng: &mut StdRng) -> Result<InfomaxResult> {
    let (n_samples, n_features) = data.dim();
    if n_features < 2 {
        bail!("infomax needs at least 2 features, got {n_features}");
    }
    let mut l_rate = params
        .l_rate
        .unwrap_or_else(|| 0.01 / ((n_features * n_features) as f64).ln());
    let block = params
        .block
        .unwrap_or_else(|| (n_samples as f64 / 3.0).sqrt().floor() as usize);
    if block == 0 || block > n_samples {
        bail!("infomax block size {block} invalid for {n_samples} samples");
    }
    let anneal_step = params
        .anneal_step
        .unwrap_or(if params.extended { 0.98 } else { 0.9 });
    let nblock = n_samples / block;
    let kurt_size = params.kurt_size.min(n_samples);
    let mut max_iter = params.max_iter;

    let eye = Array2::<f64>::eye(n_features);
    let bi = &eye * block as f64;
    let start_signs = || {
        let mut s = Array1::<f64>::ones(n_features);
        s.slice_mut(s![..params.n_subgauss.min(n_features)]).fill(-1.0);
        s
    };

    let mut weights = eye.clone();
    let mut oldweights = eye.clone();
    let mut bias = Array1::<f64>::zeros(n_features);
    let mut step = 0usize;
    let mut count_small_angle = 0usize;
    let mut blockno = 0usize;
    let mut signcount = 0usize;
    let mut ext_blocks = params.ext_blocks;
    let mut signs = start_signs();
    let mut old_kurt = Array1::<f64>::zeros(n_features);
    let mut oldsigns = Array1::<f64>::zeros(n_features);
    let mut olddelta = Array2::<f64>::ones((n_features, n_features));
    let mut oldchange = 0.0;
    let mut permute: Vec<usize> = (0..n_samples).collect();

    debug!(
        "infomax: {n_samples} samples × {n_features} features, block {block}, l_rate {l_rate:.3e}, extended {}",
        params.extended
    );

    while step < max_iter {
        permute.shuffle(rng);
        let mut wts_blowup = false;

        for blk in 0..nblock {
            let rows = &permute[blk * block..(blk + 1) * block];
            let mut u = data.select(Axis(0), rows).dot(&weights);
            u += &bias.view().insert_axis(Axis(0));

            if params.extended {
                let y = u.mapv(f64::tanh);
                let uty = u.t().dot(&y) * &signs.view().insert_axis(Axis(0));
                let grad = &bi - &uty - &u.t().dot(&u);
                weights = &weights + &(weights.dot(&grad) * l_rate);
                if params.use_bias {
                    bias = &bias + &(y.sum_axis(Axis(0)) * (-2.0 * l_rate));
                }
            } else {
                let y = u.mapv(|v| 1.0 - 2.0 / (1.0 + (-v).exp()));
                let grad = &bi + &u.t().dot(&y);
                weights = &weights + &(weights.dot(&grad) * l_rate);
                if params.use_bias {
                    bias = &bias + &(y.sum_axis(Axis(0)) * l_rate);
                }
            }

            if weights.iter().any(|w| !w.is_finite() || w.abs() > MAX_WEIGHT) {
                wts_blowup = true;
            }
            blockno += 1;
            if wts_blowup {
                break;
            }

            if params.extended && ext_blocks > 0 && blockno % ext_blocks == 0 {
                let act = if kurt_size < n_samples {
                    let rp: Vec<usize> = (0..kurt_size)
                        .map(|_| (rng.gen::<f64>() * (n_samples - 1) as f64).floor() as usize)
                        .collect();
                    data.select(Axis(0), &rp).dot(&weights)
                } else {
                    data.dot(&weights)
                };
                let kurt = kurtosis_columns(&act) * (1.0 - EXTMOMENTUM) + &old_kurt * EXTMOMENTUM;
                old_kurt = kurt.clone();
                signs = kurt.mapv(|k| sign(k + SIGNSBIAS));

                let ndiff = signs.iter().zip(&oldsigns).filter(|(a, b)| a != b).count();
                if ndiff == 0 {
                    signcount += 1;
                } else {
                    signcount = 0;
                }
                oldsigns = signs.clone();
                if signcount >= SIGNCOUNT_THRESHOLD {
                    ext_blocks *= SIGNCOUNT_STEP;
                    signcount = 0;
                }
            }
        }

        if !wts_blowup {
            let delta = &weights - &oldweights;
            step += 1;
            let change: f64 = delta.iter().map(|d| d * d).sum();
            let mut angledelta = 0.0;
            if step > 2 {
                let denom = (change * oldchange).sqrt();
                if denom > 0.0 {
                    let cos = (&delta * &olddelta).sum() / denom;
                    angledelta = cos.clamp(-1.0, 1.0).acos().to_degrees();
                }
            }
            debug!("infomax step {step}: l_rate {l_rate:.3e}, wchange {change:.4e}, angle {angledelta:.2}");

            oldweights = weights.clone();
            if angledelta > params.anneal_deg {
                l_rate *= anneal_step;
                olddelta = delta;
                oldchange = change;
                count_small_angle = 0;
            } else {
                if step == 1 {
                    olddelta = delta;
                    oldchange = change;
                }
                if let Some(limit) = params.n_small_angle {
                    count_small_angle += 1;
                    if count_small_angle > limit {
                        max_iter = step;
                    }
                }
            }

            if step > 2 && change < params.w_change {
                step = max_iter;
            } else if change > params.blowup {
                l_rate *= params.blowup_fac;
            }
        } else {
            step = 0;
            blockno = 1;
            l_rate *= RESTART_FAC;
            weights = eye.clone();
            oldweights = eye.clone();
            olddelta = Array2::zeros((n_features, n_features));
            bias = Array1::zeros(n_features);
            ext_blocks = params.ext_blocks;
            signs = start_signs();
            oldsigns = Array1::zeros(n_features);
            if l_rate > MIN_L_RATE {
                debug!("infomax: weights blew up, restarting with l_rate {l_rate:.3e}");
            } else {
                bail!("infomax diverged: unmixing matrix might not be invertible");
            }
        }
    }

    Ok(InfomaxResult { unmixing: weights.reversed_axes(), n_iter: step })
}

fn sign(v: f64) -> f64 {
    if v > 0.0 {
        1.0
    } else if v < 0.0 {
        -1.0
    } else {
        0.0
    }
}

/// Excess (Fisher) kurtosis, biased estimator; 0 for a constant signal.
pub fn kurtosis(x: ArrayView1<f64>) -> f64 {
    let n = x.len() as f64;
    let mean = x.sum() / n;
    let (m2, m4) = x.iter().fold((0.0, 0.0), |(m2, m4), &v| {
        let d = (v - mean) * (v - mean);
        (m2 + d, m4 + d * d)
    });
    let (m2, m4) = (m2 / n, m4 / n);
    if m2 > 0.0 {
        m4 / (m2 * m2) - 3.0
    } else {
        0.0
    }
}

/// [`kurtosis`] of each column.
pub fn kurtosis_columns(x: &Array2<f64>) -> Array1<f64> {
    Array1::from_iter(x.columns().into_iter().map(kurtosis))
}
