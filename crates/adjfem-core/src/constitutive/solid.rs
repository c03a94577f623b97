//! Linear solid constitutive model with a thickness design variable.
//!
//! `eval_stress` and `eval_heat_flux` return the material response `C·e`
//! and `K·g`. The thickness `t` scales density, specific heat and the two
//! tangent operators handed to the solver, so the design sensitivities of
//! stress and flux are those of `t·C·e` and `t·K·g`. The failure index is
//! evaluated on `C·e` and does not depend on `t`.

use log::{debug, warn};

use super::Constitutive;
use crate::error::{check_len, check_min_len, Result};
use crate::materials::{SharedMaterial, NUM_CONDUCTION_ENTRIES, NUM_STIFFNESS_ENTRIES};

/// Solid constitutive evaluator bound to an optional shared material
#[derive(Debug, Clone)]
pub struct SolidConstitutive {
    properties: Option<SharedMaterial>,
    thickness: f64,
    thickness_dv: Option<usize>,
    thickness_lb: f64,
    thickness_ub: f64,
}

impl SolidConstitutive {
    pub const NUM_STRESSES: usize = 6;

    /// Create a solid constitutive model
    ///
    /// # Arguments
    /// * `properties` - Shared material, or `None` for a zero-stiffness material
    /// * `thickness` - Initial thickness
    /// * `thickness_dv` - Global design variable number of the thickness, if any
    /// * `thickness_lb`, `thickness_ub` - Design variable bounds
    pub fn new(
        properties: Option<SharedMaterial>,
        thickness: f64,
        thickness_dv: Option<usize>,
        thickness_lb: f64,
        thickness_ub: f64,
    ) -> Self {
        if properties.is_none() {
            warn!("solid constitutive created without material properties");
        }
        if !(thickness > 0.0) {
            warn!("solid constitutive created with non-positive thickness {thickness}");
        }
        if !(thickness_lb <= thickness && thickness <= thickness_ub) {
            warn!(
                "solid constitutive thickness {thickness} outside [{thickness_lb}, {thickness_ub}]"
            );
        }
        Self {
            properties,
            thickness,
            thickness_dv,
            thickness_lb,
            thickness_ub,
        }
    }

    /// Unit-thickness model with no design variable
    pub fn with_material(properties: SharedMaterial) -> Self {
        Self::new(Some(properties), 1.0, None, 1.0, 1.0)
    }

    pub fn properties(&self) -> Option<&SharedMaterial> {
        self.properties.as_ref()
    }

    pub fn thickness(&self) -> f64 {
        self.thickness
    }

    pub fn thickness_dv(&self) -> Option<usize> {
        self.thickness_dv
    }

    /// Material stress `C·e`
    fn material_stress(properties: &SharedMaterial, strain: &[f64]) -> [f64; 6] {
        let e = [strain[0], strain[1], strain[2], strain[3], strain[4], strain[5]];
        properties.eval_tangent_stiffness_3d().mult(&e)
    }

    /// Material flux `K·g`
    fn material_flux(properties: &SharedMaterial, grad: &[f64]) -> [f64; 2] {
        let k = properties.eval_tangent_heat_flux_2d();
        [k[0] * grad[0] + k[1] * grad[1], k[1] * grad[0] + k[2] * grad[1]]
    }

    fn check_dv_buffer(&self, what: &'static str, len: usize) -> Result<bool> {
        if self.thickness_dv.is_none() {
            return Ok(false);
        }
        check_min_len(what, len, 1)?;
        Ok(true)
    }
}

impl Constitutive for SolidConstitutive {
    fn num_stresses(&self) -> usize {
        Self::NUM_STRESSES
    }

    fn design_var_nums(&self, _elem_index: usize, dv_nums: Option<&mut [usize]>) -> Result<usize> {
        let Some(index) = self.thickness_dv else {
            return Ok(0);
        };
        if let Some(nums) = dv_nums {
            check_min_len("dv_nums", nums.len(), 1)?;
            nums[0] = index;
        }
        Ok(1)
    }

    fn set_design_vars(&mut self, _elem_index: usize, dvs: &[f64]) -> Result<()> {
        if self.check_dv_buffer("dvs", dvs.len())? {
            let t = dvs[0];
            if t < self.thickness_lb || t > self.thickness_ub {
                debug!(
                    "thickness {t} outside [{}, {}] for design variable {:?}",
                    self.thickness_lb, self.thickness_ub, self.thickness_dv
                );
            }
            self.thickness = t;
        }
        Ok(())
    }

    fn design_vars(&self, _elem_index: usize, dvs: &mut [f64]) -> Result<()> {
        if self.check_dv_buffer("dvs", dvs.len())? {
            dvs[0] = self.thickness;
        }
        Ok(())
    }

    fn design_var_range(&self, _elem_index: usize, lb: &mut [f64], ub: &mut [f64]) -> Result<()> {
        if self.check_dv_buffer("lb", lb.len())? && self.check_dv_buffer("ub", ub.len())? {
            lb[0] = self.thickness_lb;
            ub[0] = self.thickness_ub;
        }
        Ok(())
    }

    fn eval_density(&self, _elem_index: usize, _pt: &[f64], _x: &[f64]) -> f64 {
        match &self.properties {
            Some(props) => self.thickness * props.density,
            None => 0.0,
        }
    }

    fn add_density_dv_sens(
        &self,
        _elem_index: usize,
        scale: f64,
        _pt: &[f64],
        _x: &[f64],
        dfdx: &mut [f64],
    ) -> Result<()> {
        if let Some(props) = &self.properties
            && self.check_dv_buffer("dfdx", dfdx.len())?
        {
            dfdx[0] += scale * props.density;
        }
        Ok(())
    }

    fn eval_specific_heat(&self, _elem_index: usize, _pt: &[f64], _x: &[f64]) -> f64 {
        match &self.properties {
            Some(props) => self.thickness * props.specific_heat,
            None => 0.0,
        }
    }

    fn add_specific_heat_dv_sens(
        &self,
        _elem_index: usize,
        scale: f64,
        _pt: &[f64],
        _x: &[f64],
        dfdx: &mut [f64],
    ) -> Result<()> {
        if let Some(props) = &self.properties
            && self.check_dv_buffer("dfdx", dfdx.len())?
        {
            dfdx[0] += scale * props.specific_heat;
        }
        Ok(())
    }

    fn eval_stress(
        &self,
        _elem_index: usize,
        _pt: &[f64],
        _x: &[f64],
        strain: &[f64],
        stress: &mut [f64],
    ) -> Result<()> {
        check_len("strain", strain.len(), Self::NUM_STRESSES)?;
        check_len("stress", stress.len(), Self::NUM_STRESSES)?;
        match &self.properties {
            Some(props) => stress.copy_from_slice(&Self::material_stress(props, strain)),
            None => stress.fill(0.0),
        }
        Ok(())
    }

    fn eval_tangent_stiffness(
        &self,
        _elem_index: usize,
        _pt: &[f64],
        _x: &[f64],
        c: &mut [f64],
    ) -> Result<()> {
        check_len("tangent stiffness", c.len(), NUM_STIFFNESS_ENTRIES)?;
        match &self.properties {
            Some(props) => {
                let mut stiffness = props.eval_tangent_stiffness_3d();
                stiffness.scale(self.thickness);
                c.copy_from_slice(&stiffness.0);
            }
            None => c.fill(0.0),
        }
        Ok(())
    }

    fn add_stress_dv_sens(
        &self,
        _elem_index: usize,
        scale: f64,
        _pt: &[f64],
        _x: &[f64],
        strain: &[f64],
        psi: &[f64],
        dfdx: &mut [f64],
    ) -> Result<()> {
        check_len("strain", strain.len(), Self::NUM_STRESSES)?;
        check_len("psi", psi.len(), Self::NUM_STRESSES)?;
        if let Some(props) = &self.properties
            && self.check_dv_buffer("dfdx", dfdx.len())?
        {
            let s = Self::material_stress(props, strain);
            let product: f64 = s.iter().zip(psi).map(|(s, p)| s * p).sum();
            dfdx[0] += scale * product;
        }
        Ok(())
    }

    fn eval_thermal_strain(
        &self,
        _elem_index: usize,
        _pt: &[f64],
        _x: &[f64],
        theta: f64,
        strain: &mut [f64],
    ) -> Result<()> {
        check_len("thermal strain", strain.len(), Self::NUM_STRESSES)?;
        match &self.properties {
            Some(props) => {
                for (out, alpha) in strain.iter_mut().zip(props.eval_thermal_strain_3d()) {
                    *out = theta * alpha;
                }
            }
            None => strain.fill(0.0),
        }
        Ok(())
    }

    fn eval_heat_flux(
        &self,
        _elem_index: usize,
        _pt: &[f64],
        _x: &[f64],
        grad: &[f64],
        flux: &mut [f64],
    ) -> Result<()> {
        check_len("gradient", grad.len(), 2)?;
        check_len("flux", flux.len(), 2)?;
        match &self.properties {
            Some(props) => flux.copy_from_slice(&Self::material_flux(props, grad)),
            None => flux.fill(0.0),
        }
        Ok(())
    }

    fn eval_tangent_heat_flux(
        &self,
        _elem_index: usize,
        _pt: &[f64],
        _x: &[f64],
        c: &mut [f64],
    ) -> Result<()> {
        check_len("heat flux tangent", c.len(), NUM_CONDUCTION_ENTRIES)?;
        match &self.properties {
            Some(props) => {
                for (out, k) in c.iter_mut().zip(props.eval_tangent_heat_flux_2d()) {
                    *out = self.thickness * k;
                }
            }
            None => c.fill(0.0),
        }
        Ok(())
    }

    fn add_heat_flux_dv_sens(
        &self,
        _elem_index: usize,
        scale: f64,
        _pt: &[f64],
        _x: &[f64],
        grad: &[f64],
        psi: &[f64],
        dfdx: &mut [f64],
    ) -> Result<()> {
        check_len("gradient", grad.len(), 2)?;
        check_len("psi", psi.len(), 2)?;
        if let Some(props) = &self.properties
            && self.check_dv_buffer("dfdx", dfdx.len())?
        {
            let q = Self::material_flux(props, grad);
            dfdx[0] += scale * (q[0] * psi[0] + q[1] * psi[1]);
        }
        Ok(())
    }

    fn eval_failure(&self, _elem_index: usize, _pt: &[f64], _x: &[f64], strain: &[f64]) -> Result<f64> {
        check_len("strain", strain.len(), Self::NUM_STRESSES)?;
        Ok(match &self.properties {
            Some(props) => props.von_mises_failure_3d(&Self::material_stress(props, strain)),
            None => 0.0,
        })
    }

    fn eval_failure_strain_sens(
        &self,
        _elem_index: usize,
        _pt: &[f64],
        _x: &[f64],
        strain: &[f64],
        dfde: &mut [f64],
    ) -> Result<f64> {
        check_len("strain", strain.len(), Self::NUM_STRESSES)?;
        check_len("dfde", dfde.len(), Self::NUM_STRESSES)?;
        let Some(props) = &self.properties else {
            dfde.fill(0.0);
            return Ok(0.0);
        };

        let s = Self::material_stress(props, strain);
        let mut dfds = [0.0; 6];
        let fail = props.von_mises_failure_3d_stress_sens(&s, &mut dfds);

        // dfde = Cᵀ · ∂f/∂σ, C symmetric
        let pulled = props.eval_tangent_stiffness_3d().mult(&dfds);
        dfde.copy_from_slice(&pulled);
        Ok(fail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::materials::MaterialProperties;
    use std::sync::Arc;

    const PT: [f64; 3] = [0.0; 3];
    const X: [f64; 3] = [0.0; 3];

    fn aluminium() -> SharedMaterial {
        Arc::new(
            MaterialProperties::isotropic("al", 2700.0, 70e9, 0.3, 270e6)
                .unwrap()
                .with_specific_heat(921.0)
                .with_thermal_expansion(23e-6)
                .with_conduction_2d(230.0, 12.0, 180.0),
        )
    }

    fn design_model(t: f64) -> SolidConstitutive {
        SolidConstitutive::new(Some(aluminium()), t, Some(7), 0.5, 4.0)
    }

    #[test]
    fn isotropic_uniaxial_scenario() {
        let con = SolidConstitutive::new(Some(aluminium()), 1.0, None, 1.0, 1.0);
        let strain = [1e-3, 0.0, 0.0, 0.0, 0.0, 0.0];
        let mut stress = [0.0; 6];
        con.eval_stress(0, &PT, &X, &strain, &mut stress).unwrap();

        let (e, nu) = (70e9, 0.3);
        let expected = e / (1.0 + nu) / (1.0 - 2.0 * nu) * (1.0 - nu) * 1e-3;
        assert!((stress[0] - expected).abs() <= 1e-9 * expected);
        assert!((con.eval_density(0, &PT, &X) - 2700.0).abs() < 1e-12);
        assert_eq!(stress[3], 0.0);
    }

    #[test]
    fn stress_is_material_response_and_tangent_scales_with_thickness() {
        let t = 2.5;
        let con = design_model(t);
        let strain = [1e-4, -2e-4, 3e-5, 4e-5, -1e-5, 2e-4];
        let mut stress = [0.0; 6];
        con.eval_stress(0, &PT, &X, &strain, &mut stress).unwrap();

        let material = aluminium().eval_tangent_stiffness_3d().mult(&strain);
        for k in 0..6 {
            assert!((stress[k] - material[k]).abs() <= 1e-9 * material[k].abs().max(1.0));
        }

        let mut c = [0.0; NUM_STIFFNESS_ENTRIES];
        con.eval_tangent_stiffness(0, &PT, &X, &mut c).unwrap();
        let via_tangent = crate::materials::SymmetricStiffness(c).mult(&strain);
        for k in 0..6 {
            assert!((via_tangent[k] - t * material[k]).abs() <= 1e-9 * material[k].abs().max(1.0));
        }
        assert!((con.eval_density(0, &PT, &X) - t * 2700.0).abs() < 1e-9);
        assert!((con.eval_specific_heat(0, &PT, &X) - t * 921.0).abs() < 1e-9);
    }

    #[test]
    fn uniaxial_stress_does_not_depend_on_thickness() {
        let strain = [1e-3, 0.0, 0.0, 0.0, 0.0, 0.0];
        let (mut thin, mut thick) = ([0.0; 6], [0.0; 6]);
        design_model(1.0).eval_stress(0, &PT, &X, &strain, &mut thin).unwrap();
        design_model(2.0).eval_stress(0, &PT, &X, &strain, &mut thick).unwrap();
        assert_eq!(thin, thick);

        let (e, nu) = (70e9, 0.3);
        let expected = e / (1.0 + nu) / (1.0 - 2.0 * nu) * (1.0 - nu) * 1e-3;
        assert!((thick[0] - expected).abs() <= 1e-9 * expected);
    }

    #[test]
    fn design_var_count_query_matches_written_count() {
        let con = design_model(1.0);
        let count = con.design_var_nums(0, None).unwrap();
        let mut nums = [usize::MAX; 4];
        let written = con.design_var_nums(0, Some(&mut nums[..])).unwrap();
        assert_eq!(count, written);
        assert_eq!(nums[0], 7);
        assert_eq!(nums[1], usize::MAX);

        let fixed = SolidConstitutive::with_material(aluminium());
        assert_eq!(fixed.design_var_nums(0, None).unwrap(), 0);
        assert_eq!(fixed.design_var_nums(0, Some(&mut nums[..])).unwrap(), 0);
    }

    #[test]
    fn bounds_survive_out_of_range_updates() {
        let mut con = design_model(1.0);
        con.set_design_vars(0, &[100.0]).unwrap();
        con.set_design_vars(0, &[-3.0]).unwrap();
        con.set_design_vars(0, &[0.0]).unwrap();

        let (mut lb, mut ub) = ([0.0], [0.0]);
        con.design_var_range(0, &mut lb, &mut ub).unwrap();
        assert_eq!(lb[0], 0.5);
        assert_eq!(ub[0], 4.0);

        let mut dvs = [1.0];
        con.design_vars(0, &mut dvs).unwrap();
        assert_eq!(dvs[0], 0.0);
    }

    #[test]
    fn inactive_design_var_is_a_no_op() {
        let mut con = SolidConstitutive::with_material(aluminium());
        con.set_design_vars(0, &[42.0]).unwrap();
        con.set_design_vars(0, &[]).unwrap();
        assert_eq!(con.thickness(), 1.0);

        let mut dvs = [9.0];
        con.design_vars(0, &mut dvs).unwrap();
        assert_eq!(dvs[0], 9.0);

        let mut dfdx = [0.0];
        con.add_density_dv_sens(0, 1.0, &PT, &X, &mut dfdx).unwrap();
        assert_eq!(dfdx[0], 0.0);
    }

    #[test]
    fn active_design_var_rejects_empty_buffers() {
        let mut con = design_model(1.0);
        assert!(con.set_design_vars(0, &[]).is_err());
        let mut empty: [f64; 0] = [];
        assert!(con.add_density_dv_sens(0, 1.0, &PT, &X, &mut empty).is_err());
    }

    #[test]
    fn zero_material_returns_zero_everywhere() {
        let mut con = SolidConstitutive::new(None, 3.0, Some(0), 0.0, 10.0);
        let strain = [1e-3, 2e-3, -1e-3, 5e-4, 1e-4, -2e-4];

        assert_eq!(con.eval_density(0, &PT, &X), 0.0);
        assert_eq!(con.eval_specific_heat(0, &PT, &X), 0.0);

        let mut stress = [1.0; 6];
        con.eval_stress(0, &PT, &X, &strain, &mut stress).unwrap();
        assert_eq!(stress, [0.0; 6]);

        let mut c = [1.0; NUM_STIFFNESS_ENTRIES];
        con.eval_tangent_stiffness(0, &PT, &X, &mut c).unwrap();
        assert!(c.iter().all(|&v| v == 0.0));

        let mut et = [1.0; 6];
        con.eval_thermal_strain(0, &PT, &X, 50.0, &mut et).unwrap();
        assert_eq!(et, [0.0; 6]);

        let mut flux = [1.0; 2];
        con.eval_heat_flux(0, &PT, &X, &[3.0, 4.0], &mut flux).unwrap();
        assert_eq!(flux, [0.0; 2]);

        let mut kc = [1.0; NUM_CONDUCTION_ENTRIES];
        con.eval_tangent_heat_flux(0, &PT, &X, &mut kc).unwrap();
        assert_eq!(kc, [0.0; 3]);

        assert_eq!(con.eval_failure(0, &PT, &X, &strain).unwrap(), 0.0);
        let mut dfde = [1.0; 6];
        assert_eq!(
            con.eval_failure_strain_sens(0, &PT, &X, &strain, &mut dfde).unwrap(),
            0.0
        );
        assert_eq!(dfde, [0.0; 6]);

        let mut dfdx = [0.0];
        con.add_stress_dv_sens(0, 1.0, &PT, &X, &strain, &[1.0; 6], &mut dfdx)
            .unwrap();
        con.add_density_dv_sens(0, 1.0, &PT, &X, &mut dfdx).unwrap();
        assert_eq!(dfdx[0], 0.0);

        // design variables still work without a material
        con.set_design_vars(0, &[2.0]).unwrap();
        assert_eq!(con.thickness(), 2.0);
    }

    #[test]
    fn mismatched_lengths_fail_fast() {
        let con = design_model(1.0);
        let mut stress = [0.0; 6];
        assert!(con.eval_stress(0, &PT, &X, &[0.0; 5], &mut stress).is_err());
        let mut short = [0.0; 3];
        assert!(con.eval_stress(0, &PT, &X, &[0.0; 6], &mut short).is_err());
        let mut c = [0.0; 6];
        assert!(con.eval_tangent_stiffness(0, &PT, &X, &mut c).is_err());
        let mut flux = [0.0; 2];
        assert!(con.eval_heat_flux(0, &PT, &X, &[0.0; 3], &mut flux).is_err());
    }

    #[test]
    fn heat_flux_uses_symmetric_conduction_tensor() {
        let con = design_model(2.0);
        let grad = [3.0, -5.0];
        let mut flux = [0.0; 2];
        con.eval_heat_flux(0, &PT, &X, &grad, &mut flux).unwrap();
        assert!((flux[0] - (230.0 * 3.0 + 12.0 * -5.0)).abs() < 1e-9);
        assert!((flux[1] - (12.0 * 3.0 + 180.0 * -5.0)).abs() < 1e-9);

        let mut c = [0.0; NUM_CONDUCTION_ENTRIES];
        con.eval_tangent_heat_flux(0, &PT, &X, &mut c).unwrap();
        assert_eq!(c, [460.0, 24.0, 360.0]);
    }

    #[test]
    fn thermal_strain_scales_with_theta() {
        let con = design_model(3.0);
        let mut e = [0.0; 6];
        con.eval_thermal_strain(0, &PT, &X, 10.0, &mut e).unwrap();
        assert!((e[0] - 23e-5).abs() < 1e-18);
        assert!((e[2] - 23e-5).abs() < 1e-18);
        assert_eq!(e[3], 0.0);
    }

    #[test]
    fn stress_dv_sens_matches_finite_difference() {
        let t = 1.3;
        let con = design_model(t);
        let strain = [2e-4, -1e-4, 5e-5, 3e-5, -7e-5, 1e-4];
        let psi = [0.3, -1.2, 0.7, 0.25, 2.0, -0.4];
        let mut dfdx = [0.0];
        con.add_stress_dv_sens(0, 2.0, &PT, &X, &strain, &psi, &mut dfdx)
            .unwrap();

        // psiᵀ (C_t e) with C_t the thickness-scaled tangent
        let eval = |t: f64| {
            let mut c = [0.0; NUM_STIFFNESS_ENTRIES];
            design_model(t).eval_tangent_stiffness(0, &PT, &X, &mut c).unwrap();
            let s = crate::materials::SymmetricStiffness(c).mult(&strain);
            s.iter().zip(&psi).map(|(s, p)| s * p).sum::<f64>()
        };
        let h = 1e-6;
        let fd = 2.0 * (eval(t + h) - eval(t - h)) / (2.0 * h);
        assert!((fd - dfdx[0]).abs() <= 1e-6 * fd.abs());
    }

    #[test]
    fn heat_flux_dv_sens_matches_tangent_derivative() {
        let con = design_model(0.8);
        let grad = [3.0, -5.0];
        let psi = [0.5, 2.0];
        let mut dfdx = [0.0];
        con.add_heat_flux_dv_sens(0, 1.0, &PT, &X, &grad, &psi, &mut dfdx)
            .unwrap();
        let q = [230.0 * 3.0 + 12.0 * -5.0, 12.0 * 3.0 + 180.0 * -5.0];
        assert!((dfdx[0] - (q[0] * psi[0] + q[1] * psi[1])).abs() < 1e-9);
    }
}
