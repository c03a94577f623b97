//! Material properties shared by constitutive evaluators.
//!
//! A [`MaterialProperties`] value is immutable during an analysis and is
//! shared between many constitutive instances through [`SharedMaterial`].

use std::collections::HashMap;
use std::sync::Arc;

use log::debug;
use nalgebra::{Matrix3, Matrix6, SymmetricEigen, Vector6};
use serde::{Deserialize, Serialize};

use crate::error::{ModelError, Result};

/// Number of independent entries of a symmetric 6×6 stiffness matrix
pub const NUM_STIFFNESS_ENTRIES: usize = 21;

/// Number of entries of the symmetric 2-D conduction tensor
pub const NUM_CONDUCTION_ENTRIES: usize = 3;

/// Reference-counted handle to material data
pub type SharedMaterial = Arc<MaterialProperties>;

/// Symmetric 6×6 stiffness stored as its upper triangle, row by row.
///
/// Entry layout:
/// ```text
/// [ 0  1  2  3  4  5 ]
/// [    6  7  8  9 10 ]
/// [      11 12 13 14 ]
/// [         15 16 17 ]
/// [            18 19 ]
/// [               20 ]
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SymmetricStiffness(pub [f64; NUM_STIFFNESS_ENTRIES]);

impl SymmetricStiffness {
    pub fn zeros() -> Self {
        Self([0.0; NUM_STIFFNESS_ENTRIES])
    }

    /// Position of entry (i, j) in the packed storage
    pub fn index(i: usize, j: usize) -> usize {
        let (i, j) = if i <= j { (i, j) } else { (j, i) };
        6 * i - i * (i.saturating_sub(1)) / 2 + (j - i)
    }

    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.0[Self::index(i, j)]
    }

    /// Packs the upper triangle of `m`; the lower triangle is ignored.
    pub fn from_matrix(m: &Matrix6<f64>) -> Self {
        let mut packed = [0.0; NUM_STIFFNESS_ENTRIES];
        for i in 0..6 {
            for j in i..6 {
                packed[Self::index(i, j)] = m[(i, j)];
            }
        }
        Self(packed)
    }

    pub fn to_matrix(&self) -> Matrix6<f64> {
        Matrix6::from_fn(|i, j| self.get(i, j))
    }

    pub fn scale(&mut self, factor: f64) {
        for c in self.0.iter_mut() {
            *c *= factor;
        }
    }

    /// Computes `C · v` for a Voigt vector.
    pub fn mult(&self, v: &[f64; 6]) -> [f64; 6] {
        let out = self.to_matrix() * Vector6::from_column_slice(v);
        [out[0], out[1], out[2], out[3], out[4], out[5]]
    }

    /// Smallest eigenvalue of the full symmetric matrix
    pub fn min_eigenvalue(&self) -> f64 {
        SymmetricEigen::new(self.to_matrix()).eigenvalues.min()
    }
}

/// Material symmetry class used to build the stiffness
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MaterialSymmetry {
    Isotropic,
    Orthotropic,
    Anisotropic,
}

/// Material data consumed by constitutive evaluators.
///
/// Only the constructors build one, so every instance carries a validated
/// positive-definite stiffness.
#[derive(Debug, Clone, PartialEq)]
pub struct MaterialProperties {
    /// Material name
    pub name: String,
    /// Symmetry class the stiffness was built from
    pub symmetry: MaterialSymmetry,
    /// Density (ρ) [kg/m³]
    pub density: f64,
    /// Specific heat [J/(kg·K)]
    pub specific_heat: f64,
    /// Yield stress used by the von Mises failure index [Pa]
    pub yield_stress: f64,
    stiffness: SymmetricStiffness,
    thermal_strain: [f64; 6],
    conduction: [f64; NUM_CONDUCTION_ENTRIES],
}

impl MaterialProperties {
    /// Isotropic linear elastic material
    ///
    /// ```text
    ///         E (1-ν)              E ν                E
    /// C11 = ────────────   C12 = ────────────   G = ───────
    ///       (1+ν)(1-2ν)          (1+ν)(1-2ν)        2(1+ν)
    /// ```
    pub fn isotropic(
        name: impl Into<String>,
        density: f64,
        young: f64,
        poisson: f64,
        yield_stress: f64,
    ) -> Result<Self> {
        let name = name.into();
        if young <= 0.0 {
            return Err(ModelError::InvalidMaterial(format!(
                "{name}: Young's modulus must be positive, got {young}"
            )));
        }
        if poisson <= -1.0 || poisson >= 0.5 {
            return Err(ModelError::InvalidMaterial(format!(
                "{name}: Poisson's ratio must lie in (-1, 0.5), got {poisson}"
            )));
        }

        let factor = young / ((1.0 + poisson) * (1.0 - 2.0 * poisson));
        let c11 = factor * (1.0 - poisson);
        let c12 = factor * poisson;
        let shear = young / (2.0 * (1.0 + poisson));

        let mut m = Matrix6::zeros();
        for i in 0..3 {
            for j in 0..3 {
                m[(i, j)] = if i == j { c11 } else { c12 };
            }
            m[(i + 3, i + 3)] = shear;
        }

        Self::build(
            name,
            MaterialSymmetry::Isotropic,
            density,
            yield_stress,
            SymmetricStiffness::from_matrix(&m),
        )
    }

    /// Orthotropic material from engineering constants in the material axes.
    ///
    /// The normal block is the inverse of the compliance
    /// ```text
    /// [ 1/E1     -ν12/E1  -ν13/E1 ]
    /// [-ν12/E1    1/E2    -ν23/E2 ]
    /// [-ν13/E1   -ν23/E2   1/E3   ]
    /// ```
    /// and each shear modulus acts only on its own shear strain.
    #[allow(clippy::too_many_arguments)]
    pub fn orthotropic(
        name: impl Into<String>,
        density: f64,
        e1: f64,
        e2: f64,
        e3: f64,
        nu12: f64,
        nu13: f64,
        nu23: f64,
        g23: f64,
        g13: f64,
        g12: f64,
        yield_stress: f64,
    ) -> Result<Self> {
        let name = name.into();
        if e1 <= 0.0 || e2 <= 0.0 || e3 <= 0.0 || g23 <= 0.0 || g13 <= 0.0 || g12 <= 0.0 {
            return Err(ModelError::InvalidMaterial(format!(
                "{name}: moduli must be positive"
            )));
        }

        let compliance = Matrix3::new(
            1.0 / e1,
            -nu12 / e1,
            -nu13 / e1,
            -nu12 / e1,
            1.0 / e2,
            -nu23 / e2,
            -nu13 / e1,
            -nu23 / e2,
            1.0 / e3,
        );
        let normal = compliance.try_inverse().ok_or_else(|| {
            ModelError::InvalidMaterial(format!("{name}: singular orthotropic compliance"))
        })?;

        let mut m = Matrix6::zeros();
        m.fixed_view_mut::<3, 3>(0, 0).copy_from(&normal);
        m[(3, 3)] = g23;
        m[(4, 4)] = g13;
        m[(5, 5)] = g12;

        Self::build(
            name,
            MaterialSymmetry::Orthotropic,
            density,
            yield_stress,
            SymmetricStiffness::from_matrix(&m),
        )
    }

    /// Fully anisotropic material from the 21 packed stiffness entries
    pub fn anisotropic(
        name: impl Into<String>,
        density: f64,
        stiffness: SymmetricStiffness,
        yield_stress: f64,
    ) -> Result<Self> {
        Self::build(
            name.into(),
            MaterialSymmetry::Anisotropic,
            density,
            yield_stress,
            stiffness,
        )
    }

    fn build(
        name: String,
        symmetry: MaterialSymmetry,
        density: f64,
        yield_stress: f64,
        stiffness: SymmetricStiffness,
    ) -> Result<Self> {
        if density < 0.0 {
            return Err(ModelError::InvalidMaterial(format!(
                "{name}: density must be non-negative, got {density}"
            )));
        }
        if yield_stress <= 0.0 {
            return Err(ModelError::InvalidMaterial(format!(
                "{name}: yield stress must be positive, got {yield_stress}"
            )));
        }
        let scale = stiffness.0.iter().fold(0.0_f64, |acc, c| acc.max(c.abs()));
        let min_eig = stiffness.min_eigenvalue();
        if min_eig < -1e-12 * scale {
            return Err(ModelError::InvalidMaterial(format!(
                "{name}: stiffness is not positive semi-definite (min eigenvalue {min_eig:e})"
            )));
        }
        debug!("material '{name}' ({symmetry:?}): density={density}, min eigenvalue={min_eig:e}");

        Ok(Self {
            name,
            symmetry,
            density,
            specific_heat: 0.0,
            yield_stress,
            stiffness,
            thermal_strain: [0.0; 6],
            conduction: [0.0; NUM_CONDUCTION_ENTRIES],
        })
    }

    pub fn with_specific_heat(mut self, specific_heat: f64) -> Self {
        self.specific_heat = specific_heat;
        self
    }

    /// Isotropic expansion: `[α, α, α, 0, 0, 0]`
    pub fn with_thermal_expansion(mut self, alpha: f64) -> Self {
        self.thermal_strain = [alpha, alpha, alpha, 0.0, 0.0, 0.0];
        self
    }

    pub fn with_thermal_strain(mut self, thermal_strain: [f64; 6]) -> Self {
        self.thermal_strain = thermal_strain;
        self
    }

    /// Isotropic in-plane conduction `K = k·I`
    pub fn with_conductivity(self, kappa: f64) -> Self {
        self.with_conduction_2d(kappa, 0.0, kappa)
    }

    pub fn with_conduction_2d(mut self, k11: f64, k12: f64, k22: f64) -> Self {
        self.conduction = [k11, k12, k22];
        self
    }

    pub fn eval_tangent_stiffness_3d(&self) -> SymmetricStiffness {
        self.stiffness
    }

    pub fn eval_thermal_strain_3d(&self) -> [f64; 6] {
        self.thermal_strain
    }

    /// Packed in-plane conduction tensor `[K11, K12, K22]`
    pub fn eval_tangent_heat_flux_2d(&self) -> [f64; NUM_CONDUCTION_ENTRIES] {
        self.conduction
    }

    /// Von Mises failure index `σ_vm / σ_y`
    pub fn von_mises_failure_3d(&self, s: &[f64; 6]) -> f64 {
        von_mises_squared(s).sqrt() / self.yield_stress
    }

    /// Von Mises failure index and its gradient with respect to stress
    pub fn von_mises_failure_3d_stress_sens(&self, s: &[f64; 6], sens: &mut [f64; 6]) -> f64 {
        let fail = self.von_mises_failure_3d(s);
        if fail == 0.0 {
            // the gradient is undefined at zero stress
            *sens = [0.0; 6];
            return 0.0;
        }
        let fac = 1.0 / (2.0 * self.yield_stress * self.yield_stress * fail);
        sens[0] = fac * (2.0 * s[0] - s[1] - s[2]);
        sens[1] = fac * (2.0 * s[1] - s[0] - s[2]);
        sens[2] = fac * (2.0 * s[2] - s[0] - s[1]);
        sens[3] = fac * 6.0 * s[3];
        sens[4] = fac * 6.0 * s[4];
        sens[5] = fac * 6.0 * s[5];
        fail
    }
}

fn von_mises_squared(s: &[f64; 6]) -> f64 {
    0.5 * ((s[0] - s[1]).powi(2) + (s[0] - s[2]).powi(2) + (s[1] - s[2]).powi(2))
        + 3.0 * (s[3] * s[3] + s[4] * s[4] + s[5] * s[5])
}

/// Named collection of shared materials
#[derive(Debug, Clone, Default)]
pub struct MaterialLibrary {
    materials: HashMap<String, SharedMaterial>,
}

impl MaterialLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a material, replacing any material with the same name
    pub fn add_material(&mut self, material: MaterialProperties) -> SharedMaterial {
        let shared = Arc::new(material);
        self.materials
            .insert(shared.name.clone(), Arc::clone(&shared));
        shared
    }

    /// Returns a new handle to the named material
    pub fn get_material(&self, name: &str) -> Option<SharedMaterial> {
        self.materials.get(name).cloned()
    }

    pub fn material_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.materials.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.materials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.materials.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn aluminium() -> MaterialProperties {
        MaterialProperties::isotropic("al", 2700.0, 70e9, 0.3, 270e6).unwrap()
    }

    #[test]
    fn packed_index_covers_upper_triangle() {
        let mut seen = [false; NUM_STIFFNESS_ENTRIES];
        for i in 0..6 {
            for j in i..6 {
                let k = SymmetricStiffness::index(i, j);
                assert!(!seen[k], "index {k} used twice");
                seen[k] = true;
                assert_eq!(k, SymmetricStiffness::index(j, i));
            }
        }
        assert!(seen.iter().all(|&s| s));
        assert_eq!(SymmetricStiffness::index(0, 5), 5);
        assert_eq!(SymmetricStiffness::index(1, 1), 6);
        assert_eq!(SymmetricStiffness::index(2, 2), 11);
        assert_eq!(SymmetricStiffness::index(5, 5), 20);
    }

    #[test]
    fn isotropic_stiffness_matches_closed_form() {
        let mat = aluminium();
        let c = mat.eval_tangent_stiffness_3d();
        let (e, nu) = (70e9, 0.3);
        let c11 = e / (1.0 + nu) / (1.0 - 2.0 * nu) * (1.0 - nu);
        let c12 = e / (1.0 + nu) / (1.0 - 2.0 * nu) * nu;
        let g = e / (2.0 * (1.0 + nu));
        assert!((c.get(0, 0) - c11).abs() < 1e-3);
        assert!((c.get(1, 2) - c12).abs() < 1e-3);
        assert!((c.get(4, 4) - g).abs() < 1e-3);
        assert_eq!(c.get(0, 3), 0.0);
        assert_eq!(c.get(3, 4), 0.0);
    }

    #[test]
    fn orthotropic_reduces_to_isotropic() {
        let (e, nu) = (200e9, 0.25);
        let g = e / (2.0 * (1.0 + nu));
        let ortho =
            MaterialProperties::orthotropic("o", 7800.0, e, e, e, nu, nu, nu, g, g, g, 250e6)
                .unwrap();
        let iso = MaterialProperties::isotropic("i", 7800.0, e, nu, 250e6).unwrap();
        let (a, b) = (
            ortho.eval_tangent_stiffness_3d(),
            iso.eval_tangent_stiffness_3d(),
        );
        for k in 0..NUM_STIFFNESS_ENTRIES {
            let tol = 1e-9 * b.0[k].abs().max(1.0);
            assert!((a.0[k] - b.0[k]).abs() < tol, "entry {k}: {} vs {}", a.0[k], b.0[k]);
        }
    }

    #[test]
    fn rejects_invalid_constants() {
        assert!(matches!(
            MaterialProperties::isotropic("bad", 1.0, -1.0, 0.3, 1.0),
            Err(ModelError::InvalidMaterial(_))
        ));
        assert!(MaterialProperties::isotropic("bad", 1.0, 1.0, 0.5, 1.0).is_err());
        assert!(MaterialProperties::isotropic("bad", -1.0, 1.0, 0.3, 1.0).is_err());

        let mut indefinite = SymmetricStiffness::zeros();
        indefinite.0[SymmetricStiffness::index(0, 0)] = 1.0;
        indefinite.0[SymmetricStiffness::index(1, 1)] = 1.0;
        indefinite.0[SymmetricStiffness::index(0, 1)] = 2.0;
        assert!(MaterialProperties::anisotropic("bad", 1.0, indefinite, 1.0).is_err());
    }

    #[test]
    fn von_mises_uniaxial_equals_stress_ratio() {
        let mat = aluminium();
        let s = [135e6, 0.0, 0.0, 0.0, 0.0, 0.0];
        assert!((mat.von_mises_failure_3d(&s) - 0.5).abs() < 1e-12);

        let shear = [0.0, 0.0, 0.0, 0.0, 0.0, 100e6];
        let expected = 3.0_f64.sqrt() * 100e6 / 270e6;
        assert!((mat.von_mises_failure_3d(&shear) - expected).abs() < 1e-12);
    }

    #[test]
    fn von_mises_stress_sens_matches_finite_difference() {
        let mat = aluminium();
        let s = [120e6, -40e6, 15e6, 22e6, -8e6, 31e6];
        let mut sens = [0.0; 6];
        let f = mat.von_mises_failure_3d_stress_sens(&s, &mut sens);
        assert!((f - mat.von_mises_failure_3d(&s)).abs() < 1e-15);

        let h = 1e2;
        for k in 0..6 {
            let (mut sp, mut sm) = (s, s);
            sp[k] += h;
            sm[k] -= h;
            let fd = (mat.von_mises_failure_3d(&sp) - mat.von_mises_failure_3d(&sm)) / (2.0 * h);
            assert!(
                (fd - sens[k]).abs() <= 1e-6 * sens[k].abs().max(1e-12),
                "component {k}: fd={fd}, analytic={}",
                sens[k]
            );
        }

        let mut zero_sens = [1.0; 6];
        assert_eq!(mat.von_mises_failure_3d_stress_sens(&[0.0; 6], &mut zero_sens), 0.0);
        assert_eq!(zero_sens, [0.0; 6]);
    }

    #[test]
    fn library_shares_one_allocation() {
        let mut library = MaterialLibrary::new();
        let shared = library.add_material(aluminium());
        let a = library.get_material("al").unwrap();
        let b = library.get_material("al").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(Arc::ptr_eq(&a, &shared));
        assert_eq!(Arc::strong_count(&shared), 4);
        drop(a);
        drop(b);
        assert_eq!(Arc::strong_count(&shared), 2);
        assert!(library.get_material("steel").is_none());
        assert_eq!(library.material_names(), vec!["al".to_string()]);
    }
}
