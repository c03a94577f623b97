//! Visualization records written by [`crate::ElementModel::output_data`].
//!
//! A record is a flat run of values. Sections appear in a fixed order
//! (nodes, displacements, strains, stresses, extras) and each is present only
//! if its bit is set in the [`OutputFlags`].

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

use serde::{Deserialize, Serialize};

use crate::error::{check_min_len, Result};

/// Bitmask selecting the sections of an output record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OutputFlags(pub u32);

impl OutputFlags {
    pub const NONE: Self = Self(0);
    pub const NODES: Self = Self(2);
    pub const DISPLACEMENTS: Self = Self(4);
    pub const STRAINS: Self = Self(8);
    pub const STRESSES: Self = Self(16);
    pub const EXTRAS: Self = Self(32);
    pub const ALL: Self = Self(2 | 4 | 8 | 16 | 32);

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0 && other.0 != 0
    }
}

impl BitOr for OutputFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for OutputFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// Element class a record belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementType {
    /// 3-D continuum with three displacement components
    Solid,
    /// Planar scalar field such as temperature
    Scalar2D,
}

impl ElementType {
    pub fn as_str(self) -> &'static str {
        match self {
            ElementType::Solid => "solid",
            ElementType::Scalar2D => "scalar_2d",
        }
    }

    /// Component names of one record section, in write order
    pub fn components(self, section: OutputFlags) -> &'static [&'static str] {
        match (self, section) {
            (_, OutputFlags::NODES) => &["x", "y", "z"],
            (ElementType::Solid, OutputFlags::DISPLACEMENTS) => &["u", "v", "w"],
            (ElementType::Solid, OutputFlags::STRAINS) => &["exx", "eyy", "ezz", "gyz", "gxz", "gxy"],
            (ElementType::Solid, OutputFlags::STRESSES) => &["sxx", "syy", "szz", "syz", "sxz", "sxy"],
            (ElementType::Solid, OutputFlags::EXTRAS) => &["failure", "density"],
            (ElementType::Scalar2D, OutputFlags::DISPLACEMENTS) => &["t"],
            (ElementType::Scalar2D, OutputFlags::STRAINS) => &["tx", "ty"],
            (ElementType::Scalar2D, OutputFlags::STRESSES) => &["qx", "qy"],
            (ElementType::Scalar2D, OutputFlags::EXTRAS) => &["density"],
            _ => &[],
        }
    }

    /// Number of values in a record selected by `flags`
    pub fn record_len(self, flags: OutputFlags) -> usize {
        SECTIONS
            .iter()
            .filter(|section| flags.contains(**section))
            .map(|section| self.components(*section).len())
            .sum()
    }

    /// Column names of a record selected by `flags`
    pub fn record_header(self, flags: OutputFlags) -> Vec<&'static str> {
        SECTIONS
            .iter()
            .filter(|section| flags.contains(**section))
            .flat_map(|section| self.components(*section).iter().copied())
            .collect()
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Record sections in write order
pub const SECTIONS: [OutputFlags; 5] = [
    OutputFlags::NODES,
    OutputFlags::DISPLACEMENTS,
    OutputFlags::STRAINS,
    OutputFlags::STRESSES,
    OutputFlags::EXTRAS,
];

/// Appends values to one output record.
///
/// The record must fit both the stride `ld_data` and the buffer; a record
/// that does not fit is rejected before anything is written.
pub(crate) struct RecordWriter<'a> {
    data: &'a mut [f64],
    len: usize,
}

impl<'a> RecordWriter<'a> {
    pub(crate) fn new(
        etype: ElementType,
        flags: OutputFlags,
        ld_data: usize,
        data: &'a mut [f64],
    ) -> Result<Self> {
        let required = etype.record_len(flags);
        check_min_len("data", ld_data.min(data.len()), required)?;
        Ok(Self {
            data: &mut data[..required],
            len: 0,
        })
    }

    pub(crate) fn extend(&mut self, values: &[f64]) {
        let end = self.len + values.len();
        if let Some(dst) = self.data.get_mut(self.len..end) {
            dst.copy_from_slice(values);
            self.len = end;
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }
}
