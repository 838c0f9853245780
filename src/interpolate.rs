//! Bad-channel interpolation with spherical splines.
//!
//! Port of MNE's `_interpolate_bads_eeg` (Perrin et al., 1989):
//!
//! 1. Fit a sphere to the EEG positions and project them onto the unit sphere.
//! 2. `g(cos θ) = Σ_{n=1..7} (2n+1) / (n⁴ (n+1)⁴ 4π) · Pₙ(cos θ)`
//! 3. Solve the spline system with a constant term:
//!
//! ```text
//!  C = ┌ G_from + αI   1 ┐      interp = [ G_to_from  1 ] · pinv(C)[:, :-1]
//!      └ 1ᵀ            0 ┘
//! ```
//!
//! 4. `data[bad] = interp · data[good]`, then the bad marks are cleared.
use anyhow::{anyhow, bail, Result};
use log::debug;
use nalgebra::{DMatrix, DVector};
use ndarray::{Array2, Axis};

use crate::recording::{ChannelType, Recording};

const N_LEGENDRE_TERMS: usize = 7;
const STIFFNESS: i32 = 4;
/// Tikhonov term added to the diagonal of `G_from`.
pub const ALPHA: f64 = 1e-5;

/// Interpolate every bad EEG channel from the good EEG channels.
///
/// Returns the interpolated channel names; with `reset_bads` they are
/// removed from `rec.bads`. Bad channels of other types are left alone.
pub fn interpolate_bads(rec: &mut Recording, reset_bads: bool) -> Result<Vec<String>> {
    let bad_idx: Vec<usize> = rec
        .picks(ChannelType::Eeg)
        .into_iter()
        .filter(|&i| rec.is_bad(&rec.channels[i].name))
        .collect();
    if bad_idx.is_empty() {
        return Ok(Vec::new());
    }

    let mut pos_to = Vec::with_capacity(bad_idx.len());
    for &i in &bad_idx {
        let ch = &rec.channels[i];
        let p = ch
            .pos
            .ok_or_else(|| anyhow!("cannot interpolate {}: channel has no position", ch.name))?;
        pos_to.push(p);
    }
    let good_idx: Vec<usize> = rec
        .good_eeg()
        .into_iter()
        .filter(|&i| rec.channels[i].pos.is_some())
        .collect();
    if good_idx.is_empty() {
        bail!("no good EEG channel with a position to interpolate from");
    }
    let pos_from: Vec<[f64; 3]> = good_idx.iter().filter_map(|&i| rec.channels[i].pos).collect();

    let center = fit_sphere_center(pos_from.iter().chain(&pos_to).copied());
    debug!(
        "interpolating {} channels from {} (origin {:.4?})",
        bad_idx.len(),
        good_idx.len(),
        center
    );
    let to_unit = |p: &[f64; 3]| normalize([p[0] - center[0], p[1] - center[1], p[2] - center[2]]);
    let from: Vec<[f64; 3]> = pos_from.iter().map(to_unit).collect();
    let to: Vec<[f64; 3]> = pos_to.iter().map(to_unit).collect();

    let interp = make_interpolation_matrix(&from, &to, ALPHA)?;
    let good = rec.data.select(Axis(0), &good_idx);
    let fixed = interp.dot(&good);
    for (row, &i) in bad_idx.iter().enumerate() {
        rec.data.row_mut(i).assign(&fixed.row(row));
    }

    let names: Vec<String> = bad_idx.iter().map(|&i| rec.channels[i].name.clone()).collect();
    if reset_bads {
        rec.bads.retain(|b| !names.contains(b));
    }
    Ok(names)
}

/// Spline weights mapping values at `from` to values at `to` (unit vectors).
pub fn make_interpolation_matrix(
    from: &[[f64; 3]],
    to: &[[f64; 3]],
    alpha: f64,
) -> Result<Array2<f64>> {
    let n = from.len();
    let mut c = DMatrix::<f64>::zeros(n + 1, n + 1);
    for i in 0..n {
        for j in 0..n {
            c[(i, j)] = calc_g(dot(from[i], from[j]));
        }
        c[(i, i)] += alpha;
        c[(i, n)] = 1.0;
        c[(n, i)] = 1.0;
    }
    let c_inv = c
        .pseudo_inverse(1e-15)
        .map_err(|e| anyhow!("spline system pseudo-inverse failed: {e}"))?;

    let mut out = Array2::<f64>::zeros((to.len(), n));
    for (r, t) in to.iter().enumerate() {
        let lhs: Vec<f64> = from
            .iter()
            .map(|f| calc_g(dot(*t, *f)))
            .chain(std::iter::once(1.0))
            .collect();
        for col in 0..n {
            out[[r, col]] = (0..=n).map(|k| lhs[k] * c_inv[(k, col)]).sum();
        }
    }
    Ok(out)
}

/// `g(x)` of the spherical spline, evaluated with the Legendre recurrence.
fn calc_g(x: f64) -> f64 {
    let x = x.clamp(-1.0, 1.0);
    let (mut p_prev, mut p) = (1.0, x);
    let mut g = 0.0;
    for n in 1..=N_LEGENDRE_TERMS {
        let nf = n as f64;
        let factor = (2.0 * nf + 1.0)
            / (nf.powi(STIFFNESS) * (nf + 1.0).powi(STIFFNESS) * 4.0 * std::f64::consts::PI);
        g += factor * p;
        let p_next = ((2.0 * nf + 1.0) * x * p - nf * p_prev) / (nf + 1.0);
        p_prev = p;
        p = p_next;
    }
    g
}

/// Least-squares sphere centre (`|p|² = 2c·p + d`). Fewer than four points,
/// or a degenerate fit, give the origin.
pub fn fit_sphere_center(points: impl Iterator<Item = [f64; 3]>) -> [f64; 3] {
    let pts: Vec<[f64; 3]> = points.collect();
    if pts.len() < 4 {
        return [0.0; 3];
    }
    let a = DMatrix::from_fn(pts.len(), 4, |r, c| if c < 3 { 2.0 * pts[r][c] } else { 1.0 });
    let b = DVector::from_iterator(pts.len(), pts.iter().map(|p| dot(*p, *p)));
    match a.svd(true, true).solve(&b, 1e-12) {
        Ok(x) if x.iter().all(|v| v.is_finite()) => [x[0], x[1], x[2]],
        _ => [0.0; 3],
    }
}

fn dot(a: [f64; 3], b: [f64; 3]) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

fn normalize(p: [f64; 3]) -> [f64; 3] {
    let r = dot(p, p).sqrt();
    if r == 0.0 {
        p
    } else {
        [p[0] / r, p[1] / r, p[2] / r]
    }
}
