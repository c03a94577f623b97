//! JSON case files: materials, element definitions and verification settings.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use adjfem_core::{
    ElementModel, HeatConduction2D, LinearElasticity3D, MaterialLibrary, MaterialProperties,
    QuantityRegistry, QuantityType, SolidConstitutive, SymmetricStiffness, VerificationConfig,
};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::{IoError, Result};

pub const CASE_SCHEMA_VERSION: u32 = 1;

/// Elastic constants of a material, tagged by symmetry class
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ElasticSpec {
    Isotropic {
        young: f64,
        poisson: f64,
    },
    Orthotropic {
        e1: f64,
        e2: f64,
        e3: f64,
        nu12: f64,
        nu13: f64,
        nu23: f64,
        g23: f64,
        g13: f64,
        g12: f64,
    },
    /// Upper triangle of the 6×6 stiffness, row by row
    Anisotropic { stiffness: [f64; 21] },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterialSpec {
    pub name: String,
    pub density: f64,
    pub yield_stress: f64,
    #[serde(flatten)]
    pub elastic: ElasticSpec,
    #[serde(default)]
    pub specific_heat: f64,
    /// Isotropic expansion coefficient
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thermal_expansion: Option<f64>,
    /// Full expansion vector; overrides `thermal_expansion`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thermal_strain: Option<[f64; 6]>,
    /// Isotropic in-plane conductivity
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conductivity: Option<f64>,
    /// `[K11, K12, K22]`; overrides `conductivity`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conduction_2d: Option<[f64; 3]>,
}

impl MaterialSpec {
    pub fn to_properties(&self) -> Result<MaterialProperties> {
        let name = self.name.clone();
        let mut props = match &self.elastic {
            ElasticSpec::Isotropic { young, poisson } => {
                MaterialProperties::isotropic(name, self.density, *young, *poisson, self.yield_stress)?
            }
            ElasticSpec::Orthotropic {
                e1,
                e2,
                e3,
                nu12,
                nu13,
                nu23,
                g23,
                g13,
                g12,
            } => MaterialProperties::orthotropic(
                name,
                self.density,
                *e1,
                *e2,
                *e3,
                *nu12,
                *nu13,
                *nu23,
                *g23,
                *g13,
                *g12,
                self.yield_stress,
            )?,
            ElasticSpec::Anisotropic { stiffness } => MaterialProperties::anisotropic(
                name,
                self.density,
                SymmetricStiffness(*stiffness),
                self.yield_stress,
            )?,
        };

        props = props.with_specific_heat(self.specific_heat);
        if let Some(alpha) = self.thermal_expansion {
            props = props.with_thermal_expansion(alpha);
        }
        if let Some(strain) = self.thermal_strain {
            props = props.with_thermal_strain(strain);
        }
        if let Some(kappa) = self.conductivity {
            props = props.with_conductivity(kappa);
        }
        if let Some([k11, k12, k22]) = self.conduction_2d {
            props = props.with_conduction_2d(k11, k12, k22);
        }
        Ok(props)
    }
}

fn default_thickness() -> f64 {
    1.0
}

/// Constitutive binding of one element
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstitutiveSpec {
    /// Material name; absent means a zero-stiffness material
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub material: Option<String>,
    #[serde(default = "default_thickness")]
    pub thickness: f64,
    /// Global number of the thickness design variable
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub design_var: Option<usize>,
    /// Bounds default to the thickness itself
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lower: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upper: Option<f64>,
}

impl ConstitutiveSpec {
    pub fn build(&self, library: &MaterialLibrary) -> Result<SolidConstitutive> {
        let properties = match &self.material {
            Some(name) => Some(
                library
                    .get_material(name)
                    .ok_or_else(|| IoError::UnknownMaterial(name.clone()))?,
            ),
            None => None,
        };
        Ok(SolidConstitutive::new(
            properties,
            self.thickness,
            self.design_var,
            self.lower.unwrap_or(self.thickness),
            self.upper.unwrap_or(self.thickness),
        ))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum ModelSpec {
    #[serde(rename = "linear_elasticity_3d")]
    LinearElasticity3D {
        #[serde(default)]
        thermal_load: f64,
    },
    #[serde(rename = "heat_conduction_2d")]
    HeatConduction2D,
}

impl ModelSpec {
    pub fn kind(&self) -> &'static str {
        match self {
            ModelSpec::LinearElasticity3D { .. } => "linear_elasticity_3d",
            ModelSpec::HeatConduction2D => "heat_conduction_2d",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub model: ModelSpec,
    pub constitutive: ConstitutiveSpec,
}

/// Element model built from a case file
pub struct BuiltElement {
    pub name: String,
    pub kind: &'static str,
    pub model: Box<dyn ElementModel>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseFile {
    pub schema_version: u32,
    pub name: String,
    pub materials: Vec<MaterialSpec>,
    pub elements: Vec<ElementSpec>,
    #[serde(default)]
    pub verification: VerificationConfig,
    /// Quantity names checked on every element that supports them
    #[serde(default)]
    pub quantities: Vec<String>,
}

impl CaseFile {
    /// Structural checks that do not need the material library
    pub fn validate(&self) -> Result<()> {
        if self.schema_version != CASE_SCHEMA_VERSION {
            return Err(IoError::InvalidCase(format!(
                "unsupported schema_version {} (expected {CASE_SCHEMA_VERSION})",
                self.schema_version
            )));
        }
        let mut names = BTreeSet::new();
        for material in &self.materials {
            if !names.insert(material.name.as_str()) {
                return Err(IoError::InvalidCase(format!(
                    "material '{}' defined twice",
                    material.name
                )));
            }
        }
        for (i, element) in self.elements.iter().enumerate() {
            let con = &element.constitutive;
            if !(con.thickness > 0.0) {
                return Err(IoError::InvalidCase(format!(
                    "element {i}: thickness must be positive, got {}",
                    con.thickness
                )));
            }
            let lb = con.lower.unwrap_or(con.thickness);
            let ub = con.upper.unwrap_or(con.thickness);
            if lb > ub {
                return Err(IoError::InvalidCase(format!(
                    "element {i}: lower bound {lb} exceeds upper bound {ub}"
                )));
            }
            if !(lb <= con.thickness && con.thickness <= ub) {
                return Err(IoError::InvalidCase(format!(
                    "element {i}: thickness {} outside bounds [{lb}, {ub}]",
                    con.thickness
                )));
            }
        }
        let config = &self.verification;
        if !(config.step_size > 0.0) || config.rtol < 0.0 || config.atol < 0.0 {
            return Err(IoError::InvalidCase(
                "verification step and tolerances must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn build_library(&self) -> Result<MaterialLibrary> {
        let mut library = MaterialLibrary::new();
        for spec in &self.materials {
            library.add_material(spec.to_properties()?);
        }
        debug!("case '{}': {} materials", self.name, library.len());
        Ok(library)
    }

    pub fn build_models(&self, library: &MaterialLibrary) -> Result<Vec<BuiltElement>> {
        self.elements
            .iter()
            .enumerate()
            .map(|(i, spec)| {
                let constitutive = spec.constitutive.build(library)?;
                let model: Box<dyn ElementModel> = match spec.model {
                    ModelSpec::LinearElasticity3D { thermal_load } => {
                        Box::new(LinearElasticity3D::with_thermal_load(constitutive, thermal_load))
                    }
                    ModelSpec::HeatConduction2D => Box::new(HeatConduction2D::new(constitutive)),
                };
                Ok(BuiltElement {
                    name: spec
                        .name
                        .clone()
                        .unwrap_or_else(|| format!("element_{i}")),
                    kind: spec.model.kind(),
                    model,
                })
            })
            .collect()
    }

    /// Resolves quantity names against the registry
    pub fn resolve_quantities(&self, registry: &QuantityRegistry) -> Result<Vec<QuantityType>> {
        self.quantities
            .iter()
            .map(|name| {
                registry
                    .lookup(name)
                    .ok_or_else(|| IoError::UnknownQuantity(name.clone()))
            })
            .collect()
    }

    /// Starter case with one element of each model
    pub fn template() -> Self {
        Self {
            schema_version: CASE_SCHEMA_VERSION,
            name: "aluminium_block".to_string(),
            materials: vec![MaterialSpec {
                name: "al".to_string(),
                density: 2700.0,
                yield_stress: 270e6,
                elastic: ElasticSpec::Isotropic {
                    young: 70e9,
                    poisson: 0.3,
                },
                specific_heat: 921.0,
                thermal_expansion: Some(23e-6),
                thermal_strain: None,
                conductivity: Some(230.0),
                conduction_2d: None,
            }],
            elements: vec![
                ElementSpec {
                    name: Some("block".to_string()),
                    model: ModelSpec::LinearElasticity3D { thermal_load: 0.0 },
                    constitutive: ConstitutiveSpec {
                        material: Some("al".to_string()),
                        thickness: 1.0,
                        design_var: Some(0),
                        lower: Some(0.1),
                        upper: Some(10.0),
                    },
                },
                ElementSpec {
                    name: Some("plate".to_string()),
                    model: ModelSpec::HeatConduction2D,
                    constitutive: ConstitutiveSpec {
                        material: Some("al".to_string()),
                        thickness: 0.01,
                        design_var: Some(1),
                        lower: Some(0.001),
                        upper: Some(0.1),
                    },
                },
            ],
            verification: VerificationConfig::default(),
            quantities: vec![
                "failure_index".to_string(),
                "density".to_string(),
                "strain_energy_density".to_string(),
                "temperature".to_string(),
                "heat_flux".to_string(),
            ],
        }
    }
}

pub fn save_case(path: impl AsRef<Path>, case: &CaseFile) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    let bytes = serde_json::to_vec_pretty(case)?;
    fs::write(path, bytes)?;
    Ok(())
}

/// Reads and validates a case file
pub fn load_case(path: impl AsRef<Path>) -> Result<CaseFile> {
    let bytes = fs::read(path)?;
    let case: CaseFile = serde_json::from_slice(&bytes)?;
    case.validate()?;
    Ok(case)
}
