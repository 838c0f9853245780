//! Idealised spherical 10–20 scalp-position template.
//!
//! The label set is that of MNE's `standard_1020`, but the positions are not
//! its digitised coordinates: they are computed on a sphere of radius 95 mm
//! in the head frame (x → right ear, y → nasion, z → vertex), the way the
//! 10–20 system lays them out on an idealised head:
//!
//! ```text
//!             Nz (0°)
//!       Fp1  Fpz  Fp2          midline: sagittal angle s from the nasion,
//!    AF7 …   AFz   … AF8         Nz 0, Fpz 18, AFz 36 … Oz 162, Iz 180
//!   F7 F5 F3 F1 Fz F2 F4 …     ring:    the circle 18° above the equator
//!  T7 C5 C3 C1 Cz C2 C4 … T8     through Fpz, T7, Oz, T8
//!            …                 row k:   slerp from the midline point to the
//!        O1  Oz  O2              ring point at azimuth ±s, t = ceil(k/2)/4
//!             Iz                 (odd k left, even k right)
//! ```
//!
//! Labels ending in 9/10 sit on the nasion–inion equator below the ring.
//! Names match exactly (case-sensitive).
use std::collections::BTreeMap;

use anyhow::{bail, Result};

/// Head radius in metres.
pub const HEAD_RADIUS: f64 = 0.095;

/// Elevation of the Fpz–T7–Oz–T8 circle, degrees.
const RING_ELEVATION: f64 = 18.0;

/// Labels of MNE's `standard_1020` montage, placed by [`template_direction`].
pub const LABELS_1020: &[&str] = &[
    "Fp1", "Fpz", "Fp2", "AF9", "AF7", "AF5", "AF3", "AF1", "AFz", "AF2", "AF4", "AF6", "AF8",
    "AF10", "F9", "F7", "F5", "F3", "F1", "Fz", "F2", "F4", "F6", "F8", "F10", "FT9", "FT7",
    "FC5", "FC3", "FC1", "FCz", "FC2", "FC4", "FC6", "FT8", "FT10", "T9", "T7", "C5", "C3", "C1",
    "Cz", "C2", "C4", "C6", "T8", "T10", "TP9", "TP7", "CP5", "CP3", "CP1", "CPz", "CP2", "CP4",
    "CP6", "TP8", "TP10", "P9", "P7", "P5", "P3", "P1", "Pz", "P2", "P4", "P6", "P8", "P10",
    "PO9", "PO7", "PO5", "PO3", "PO1", "POz", "PO2", "PO4", "PO6", "PO8", "PO10", "O1", "Oz",
    "O2", "O9", "Iz", "O10", "T3", "T5", "T4", "T6", "M1", "M2", "A1", "A2",
];

/// Channel name → head-frame position in metres.
#[derive(Debug, Clone, PartialEq)]
pub struct Montage {
    positions: BTreeMap<String, [f64; 3]>,
}

impl Montage {
    /// Build a montage from explicit positions.
    pub fn new(positions: BTreeMap<String, [f64; 3]>) -> Self {
        Self { positions }
    }

    /// Every label of [`LABELS_1020`] at its spherical template position.
    pub fn spherical_1020() -> Result<Self> {
        let mut positions = BTreeMap::new();
        for &name in LABELS_1020 {
            let Some(unit) = template_direction(name) else {
                bail!("no template rule for {name}");
            };
            positions.insert(name.to_string(), unit.map(|v| v * HEAD_RADIUS));
        }
        Ok(Self { positions })
    }

    pub fn position(&self, name: &str) -> Option<[f64; 3]> {
        self.positions.get(name).copied()
    }

    pub fn ch_names(&self) -> impl Iterator<Item = &str> {
        self.positions.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

// ── Geometry ──────────────────────────────────────────────────────────────

/// Unit vector at `elev` degrees above the equator and `azim` degrees from
/// the nasion towards the right ear.
fn spherical(elev: f64, azim: f64) -> [f64; 3] {
    let (e, a) = (elev.to_radians(), azim.to_radians());
    [e.cos() * a.sin(), e.cos() * a.cos(), e.sin()]
}

/// Midline point at sagittal angle `s` degrees from the nasion.
fn midline(s: f64) -> [f64; 3] {
    let s = s.to_radians();
    [0.0, s.cos(), s.sin()]
}

fn slerp(a: [f64; 3], b: [f64; 3], t: f64) -> [f64; 3] {
    let dot: f64 = a.iter().zip(&b).map(|(x, y)| x * y).sum();
    let omega = dot.clamp(-1.0, 1.0).acos();
    if omega < 1e-9 {
        return a;
    }
    let (wa, wb) = (((1.0 - t) * omega).sin() / omega.sin(), (t * omega).sin() / omega.sin());
    [wa * a[0] + wb * b[0], wa * a[1] + wb * b[1], wa * a[2] + wb * b[2]]
}

/// Sagittal angle of a row prefix, the number of interior steps from the
/// midline to the ring, and whether the row has interior electrodes.
fn row(prefix: &str) -> Option<(f64, u32, bool)> {
    Some(match prefix {
        "Fp" => (18.0, 1, true),
        "AF" => (36.0, 4, true),
        "F" => (54.0, 4, true),
        "FC" => (72.0, 4, true),
        "FT" => (72.0, 4, false),
        "C" => (90.0, 4, true),
        "T" => (90.0, 4, false),
        "CP" => (108.0, 4, true),
        "TP" => (108.0, 4, false),
        "P" => (126.0, 4, true),
        "PO" => (144.0, 4, true),
        "O" => (162.0, 1, true),
        "I" => (180.0, 1, false),
        "N" => (0.0, 1, false),
        _ => return None,
    })
}

/// Unit direction of a 10–20 label, `None` for names outside the system.
pub fn template_direction(name: &str) -> Option<[f64; 3]> {
    let side = |k: u32| if k % 2 == 1 { -1.0 } else { 1.0 };
    match name {
        "T3" => return template_direction("T7"),
        "T4" => return template_direction("T8"),
        "T5" => return template_direction("P7"),
        "T6" => return template_direction("P8"),
        "Iz" => return Some([0.0, -1.0, 0.0]),
        "I1" | "I2" => return Some(spherical(0.0, if name == "I1" { -162.0 } else { 162.0 })),
        "O9" | "O10" => return Some(spherical(-9.0, if name == "O9" { -144.0 } else { 144.0 })),
        "CB1" | "CB2" => return Some(spherical(-18.0, if name == "CB1" { -155.0 } else { 155.0 })),
        "M1" | "M2" => return Some(spherical(-25.0, if name == "M1" { -110.0 } else { 110.0 })),
        "A1" | "A2" => return Some(spherical(-25.0, if name == "A1" { -90.0 } else { 90.0 })),
        _ => {}
    }

    let split = name.find(|c: char| c.is_ascii_digit() || c == 'z')?;
    let (prefix, suffix) = name.split_at(split);
    let (s, steps, interior) = row(prefix)?;

    if suffix == "z" {
        return (prefix != "FT" && prefix != "T" && prefix != "TP").then(|| midline(s));
    }
    let k: u32 = suffix.parse().ok()?;
    let ring = |k: u32| spherical(RING_ELEVATION, side(k) * s);
    match (steps, k) {
        (_, 0) => None,
        (1, 1 | 2) if interior => Some(ring(k)),
        (4, 9 | 10) => Some(spherical(0.0, side(k) * s)),
        (4, 7 | 8) => Some(ring(k)),
        (4, 1..=6) if interior => {
            let t = f64::from(k.div_ceil(2)) / f64::from(steps);
            Some(slerp(midline(s), ring(k), t))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: [f64; 3], b: [f64; 3]) -> bool {
        a.iter().zip(&b).all(|(x, y)| (x - y).abs() < 1e-12)
    }

    #[test]
    fn covers_the_10_20_labels_on_the_sphere() {
        let m = Montage::spherical_1020().unwrap();
        assert_eq!(m.len(), LABELS_1020.len());
        for name in m.ch_names() {
            let p = m.position(name).unwrap();
            let r = (p[0] * p[0] + p[1] * p[1] + p[2] * p[2]).sqrt();
            approx::assert_abs_diff_eq!(r, HEAD_RADIUS, epsilon = 1e-12);
        }
    }

    #[test]
    fn positions_are_scaled_template_directions() {
        let m = Montage::spherical_1020().unwrap();
        for &name in LABELS_1020 {
            let unit = template_direction(name).unwrap();
            assert!(close(m.position(name).unwrap(), unit.map(|v| v * HEAD_RADIUS)), "{name}");
        }
        assert!(m.position("I1").is_none());
    }

    #[test]
    fn landmarks() {
        assert!(close(template_direction("Cz").unwrap(), [0.0, 6.123233995736766e-17, 1.0]));
        let t7 = template_direction("T7").unwrap();
        assert!(t7[0] < -0.9 && t7[1].abs() < 1e-12);
        assert!(close(template_direction("T3").unwrap(), t7));
        assert!(close(template_direction("Fpz").unwrap(), spherical(18.0, 0.0)));
        assert!(close(template_direction("Oz").unwrap(), spherical(18.0, 180.0)));
    }

    #[test]
    fn odd_left_even_right() {
        for (l, r) in [("Fp1", "Fp2"), ("F3", "F4"), ("TP9", "TP10"), ("PO7", "PO8")] {
            let (pl, pr) = (template_direction(l).unwrap(), template_direction(r).unwrap());
            assert!(pl[0] < 0.0 && pr[0] > 0.0, "{l}/{r}");
            approx::assert_abs_diff_eq!(pl[0], -pr[0], epsilon = 1e-12);
            approx::assert_abs_diff_eq!(pl[1], pr[1], epsilon = 1e-12);
        }
    }

    #[test]
    fn rows_move_outward() {
        let x = |n: &str| template_direction(n).unwrap()[0].abs();
        assert!(x("C1") < x("C3") && x("C3") < x("C5") && x("C5") < x("T7"));
    }

    #[test]
    fn unknown_and_miscased_names() {
        assert!(template_direction("FP1").is_none());
        assert!(template_direction("cz").is_none());
        assert!(template_direction("HEOG").is_none());
        assert!(template_direction("T1").is_none());
        assert!(template_direction("O5").is_none());
    }
}
