//! Field identifiers.
//!
//! Every field is addressed by a [`FieldKey`], a `(ParticleType, FieldName)`
//! pair. Both halves are closed enums; names that only exist in a file's own
//! field table (FLASH particle columns, grid variables) are carried as
//! [`FieldName::Named`] and validated against that table when the dataset is
//! opened.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Particle species, or the pseudo-types used for mesh and tracer data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ParticleType {
    Gas,
    Halo,
    Disk,
    Bulge,
    Stars,
    Boundary,
    DarkMatter,
    /// Tracer particles of FLASH outputs.
    Io,
    /// Mesh fields of grid and octree datasets.
    Fluid,
}

/// Gadget particle types in file order (Table 3 of the Gadget-2 guide).
pub const GADGET_TYPES: [ParticleType; 6] = [
    ParticleType::Gas,
    ParticleType::Halo,
    ParticleType::Disk,
    ParticleType::Bulge,
    ParticleType::Stars,
    ParticleType::Boundary,
];

/// Tipsy particle types in file order.
pub const TIPSY_TYPES: [ParticleType; 3] = [
    ParticleType::Gas,
    ParticleType::DarkMatter,
    ParticleType::Stars,
];

impl ParticleType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParticleType::Gas => "Gas",
            ParticleType::Halo => "Halo",
            ParticleType::Disk => "Disk",
            ParticleType::Bulge => "Bulge",
            ParticleType::Stars => "Stars",
            ParticleType::Boundary => "Bndry",
            ParticleType::DarkMatter => "DarkMatter",
            ParticleType::Io => "io",
            ParticleType::Fluid => "fluid",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        let ptype = match name {
            "Gas" | "PartType0" => ParticleType::Gas,
            "Halo" | "PartType1" => ParticleType::Halo,
            "Disk" | "PartType2" => ParticleType::Disk,
            "Bulge" | "PartType3" => ParticleType::Bulge,
            "Stars" | "PartType4" => ParticleType::Stars,
            "Bndry" | "Boundary" | "PartType5" => ParticleType::Boundary,
            "DarkMatter" => ParticleType::DarkMatter,
            "io" => ParticleType::Io,
            "fluid" | "gas" => ParticleType::Fluid,
            _ => return None,
        };
        Some(ptype)
    }
}

impl fmt::Display for ParticleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Physical field names known to the built-in formats.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FieldName {
    Coordinates,
    Velocities,
    ParticleIDs,
    Mass,
    InternalEnergy,
    Density,
    SmoothingLength,
    Temperature,
    Epsilon,
    Metals,
    Phi,
    FormationTime,
    /// A name declared by the file's own field table.
    Named(Arc<str>),
}

impl FieldName {
    /// Declared-name field.
    pub fn named(name: &str) -> Self {
        FieldName::Named(Arc::from(name))
    }

    pub fn as_str(&self) -> &str {
        match self {
            FieldName::Coordinates => "Coordinates",
            FieldName::Velocities => "Velocities",
            FieldName::ParticleIDs => "ParticleIDs",
            FieldName::Mass => "Mass",
            FieldName::InternalEnergy => "InternalEnergy",
            FieldName::Density => "Density",
            FieldName::SmoothingLength => "SmoothingLength",
            FieldName::Temperature => "Temperature",
            FieldName::Epsilon => "Epsilon",
            FieldName::Metals => "Metals",
            FieldName::Phi => "Phi",
            FieldName::FormationTime => "FormationTime",
            FieldName::Named(name) => &**name,
        }
    }

    /// Parse a name, falling back to [`FieldName::Named`].
    pub fn from_name(name: &str) -> Self {
        match name {
            "Coordinates" => FieldName::Coordinates,
            "Velocities" | "Velocity" => FieldName::Velocities,
            "ParticleIDs" => FieldName::ParticleIDs,
            "Mass" | "Masses" => FieldName::Mass,
            "InternalEnergy" => FieldName::InternalEnergy,
            "Density" => FieldName::Density,
            "SmoothingLength" => FieldName::SmoothingLength,
            "Temperature" => FieldName::Temperature,
            "Epsilon" => FieldName::Epsilon,
            "Metals" => FieldName::Metals,
            "Phi" => FieldName::Phi,
            "FormationTime" => FieldName::FormationTime,
            other => FieldName::named(other),
        }
    }

    /// Vector fields carry three components per entity.
    pub fn is_vector(&self) -> bool {
        matches!(self, FieldName::Coordinates | FieldName::Velocities)
    }

    /// Components per entity.
    pub fn width(&self) -> usize {
        if self.is_vector() {
            3
        } else {
            1
        }
    }
}

impl fmt::Display for FieldName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `(type, name)` key used throughout field maps.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldKey {
    pub ptype: ParticleType,
    pub name: FieldName,
}

impl FieldKey {
    pub fn new(ptype: ParticleType, name: FieldName) -> Self {
        Self { ptype, name }
    }

    /// Mesh field key.
    pub fn fluid(name: &str) -> Self {
        Self::new(ParticleType::Fluid, FieldName::named(name))
    }

    pub fn is_vector(&self) -> bool {
        self.name.is_vector()
    }

    pub fn width(&self) -> usize {
        self.name.width()
    }
}

impl fmt::Display for FieldKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.ptype, self.name)
    }
}
