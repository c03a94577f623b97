//! Point-wise quantities of interest.
//!
//! Quantity tags form an open namespace: models match on the tags they
//! support and report [`ModelError::UnsupportedQuantity`] for anything else.
//! The [`QuantityRegistry`] maps tags to stable names and rejects collisions
//! between independently registered quantities.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ModelError, Result};

/// Tag selecting a point-wise quantity of interest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QuantityType(pub u32);

impl QuantityType {
    /// Material failure index (scalar)
    pub const FAILURE_INDEX: Self = Self(1);
    /// Mass per unit volume (scalar)
    pub const DENSITY: Self = Self(2);
    /// Strain energy per unit volume (scalar)
    pub const STRAIN_ENERGY_DENSITY: Self = Self(3);
    /// Temperature (scalar)
    pub const TEMPERATURE: Self = Self(4);
    /// In-plane heat flux (2-vector)
    pub const HEAT_FLUX: Self = Self(5);

    /// First tag free for user-defined quantities
    pub const FIRST_USER_TAG: u32 = 1000;

    /// Largest number of values a point quantity may return
    pub const MAX_LEN: usize = 16;
}

impl fmt::Display for QuantityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Registry entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuantityInfo {
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, Default)]
pub struct QuantityRegistry {
    entries: BTreeMap<QuantityType, QuantityInfo>,
}

impl QuantityRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-populated with the built-in tags
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        let builtin = [
            (QuantityType::FAILURE_INDEX, "failure_index", "material failure index"),
            (QuantityType::DENSITY, "density", "mass per unit volume"),
            (
                QuantityType::STRAIN_ENERGY_DENSITY,
                "strain_energy_density",
                "strain energy per unit volume",
            ),
            (QuantityType::TEMPERATURE, "temperature", "temperature"),
            (QuantityType::HEAT_FLUX, "heat_flux", "in-plane heat flux vector"),
        ];
        for (tag, name, description) in builtin {
            registry.entries.insert(
                tag,
                QuantityInfo {
                    name: name.to_string(),
                    description: description.to_string(),
                },
            );
        }
        registry
    }

    /// Registers a new quantity tag.
    ///
    /// Fails if the tag or the name is already taken.
    pub fn register(
        &mut self,
        tag: QuantityType,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Result<()> {
        let name = name.into();
        if let Some(existing) = self.entries.get(&tag) {
            return Err(ModelError::QuantityCollision {
                tag,
                existing: existing.name.clone(),
            });
        }
        if let Some(existing) = self.lookup(&name) {
            return Err(ModelError::QuantityCollision {
                tag: existing,
                existing: name,
            });
        }
        self.entries.insert(
            tag,
            QuantityInfo {
                name,
                description: description.into(),
            },
        );
        Ok(())
    }

    pub fn info(&self, tag: QuantityType) -> Option<&QuantityInfo> {
        self.entries.get(&tag)
    }

    pub fn name(&self, tag: QuantityType) -> Option<&str> {
        self.entries.get(&tag).map(|info| info.name.as_str())
    }

    /// Finds a tag by name (case-insensitive)
    pub fn lookup(&self, name: &str) -> Option<QuantityType> {
        self.entries
            .iter()
            .find(|(_, info)| info.name.eq_ignore_ascii_case(name))
            .map(|(tag, _)| *tag)
    }

    pub fn iter(&self) -> impl Iterator<Item = (QuantityType, &QuantityInfo)> {
        self.entries.iter().map(|(tag, info)| (*tag, info))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
