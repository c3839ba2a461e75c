//! Dataset configuration.
//!
//! A dataset is described by a small TOML document:
//!
//! ```toml
//! format = "gadget_binary"
//! files = ["snap_000.0", "snap_000.1"]
//! domain_left_edge = [0.0, 0.0, 0.0]
//! domain_right_edge = [100.0, 100.0, 100.0]
//! endian = "little"
//! region_order = 3
//! ```
//!
//! Optional keys fall back to what the files declare (box size from the
//! Gadget header, byte order detected from record markers, and so on).

use crate::dtype::{Endian, Precision};
use crate::error::{DataError, Result};
use serde::{Deserialize, Serialize};
use simio_index::{DomainBounds, DEFAULT_REGION_ORDER};
use std::path::{Path, PathBuf};

/// Configuration for opening a dataset through the format registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatasetConfig {
    /// Registry name of the format handler (`gadget_binary`, `tipsy`).
    pub format: String,

    /// Data files, in file-id order.
    #[serde(default)]
    pub files: Vec<PathBuf>,

    /// Lower corner of the domain. Required together with the right edge
    /// unless the format declares its own box.
    #[serde(default)]
    pub domain_left_edge: Option<[f64; 3]>,

    #[serde(default)]
    pub domain_right_edge: Option<[f64; 3]>,

    /// Byte order. `None` detects it from the file.
    #[serde(default)]
    pub endian: Option<Endian>,

    /// Float precision of record members. `None` detects it from the file size.
    #[serde(default)]
    pub precision: Option<Precision>,

    /// Region index resolution in bits per axis.
    #[serde(default = "default_region_order")]
    pub region_order: u32,
}

fn default_region_order() -> u32 {
    DEFAULT_REGION_ORDER
}

impl DatasetConfig {
    pub fn new(format: impl Into<String>) -> Self {
        Self {
            format: format.into(),
            files: Vec::new(),
            domain_left_edge: None,
            domain_right_edge: None,
            endian: None,
            precision: None,
            region_order: DEFAULT_REGION_ORDER,
        }
    }

    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.files.push(path.into());
        self
    }

    pub fn with_bounds(mut self, left: [f64; 3], right: [f64; 3]) -> Self {
        self.domain_left_edge = Some(left);
        self.domain_right_edge = Some(right);
        self
    }

    pub fn with_endian(mut self, endian: Endian) -> Self {
        self.endian = Some(endian);
        self
    }

    pub fn with_precision(mut self, precision: Precision) -> Self {
        self.precision = Some(precision);
        self
    }

    pub fn with_region_order(mut self, order: u32) -> Self {
        self.region_order = order;
        self
    }

    /// Parse a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| DataError::Config(format!("invalid dataset config: {}", e)))
    }

    /// Read and parse a TOML file. Relative data paths resolve against the
    /// file's directory.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            DataError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        let mut config = Self::from_toml_str(&content)?;
        if let Some(dir) = path.parent() {
            for file in &mut config.files {
                if file.is_relative() {
                    *file = dir.join(&*file);
                }
            }
        }
        Ok(config)
    }

    /// Configured bounds, or `fallback` when neither edge is set.
    pub fn bounds_or(&self, fallback: Option<DomainBounds>) -> Result<DomainBounds> {
        match (self.domain_left_edge, self.domain_right_edge) {
            (Some(l), Some(r)) => Ok(DomainBounds::new(l, r)?),
            (None, None) => fallback.ok_or_else(|| {
                DataError::Config("domain edges are required for this format".to_string())
            }),
            _ => Err(DataError::Config(
                "domain_left_edge and domain_right_edge must be set together".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal() {
        let config = DatasetConfig::from_toml_str(
            r#"
            format = "tipsy"
            files = ["galaxy.bin"]
            endian = "big"
            "#,
        )
        .unwrap();
        assert_eq!(config.format, "tipsy");
        assert_eq!(config.endian, Some(Endian::Big));
        assert_eq!(config.precision, None);
        assert_eq!(config.region_order, DEFAULT_REGION_ORDER);
    }

    #[test]
    fn test_unknown_key_is_config_error() {
        let err = DatasetConfig::from_toml_str("format = \"tipsy\"\nbogus = 1\n").unwrap_err();
        assert!(matches!(err, DataError::Config(_)));
    }

    #[test]
    fn test_bounds_resolution() {
        let config = DatasetConfig::new("gadget_binary");
        assert!(config.bounds_or(None).is_err());
        assert_eq!(
            config.bounds_or(Some(DomainBounds::unit())).unwrap(),
            DomainBounds::unit()
        );

        let config = config.with_bounds([0.0; 3], [2.0; 3]);
        assert_eq!(config.bounds_or(None).unwrap().right, [2.0; 3]);

        let mut half = DatasetConfig::new("x");
        half.domain_left_edge = Some([0.0; 3]);
        assert!(matches!(half.bounds_or(None), Err(DataError::Config(_))));
    }

    #[test]
    fn test_from_file_resolves_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dataset.toml");
        std::fs::write(&path, "format = \"gadget_binary\"\nfiles = [\"snap.0\"]\n").unwrap();
        let config = DatasetConfig::from_file(&path).unwrap();
        assert_eq!(config.files, vec![dir.path().join("snap.0")]);
    }
}
