//! Format registry.
//!
//! The `FormatRegistry` maps a configuration's `format` name to the handler
//! that opens it. It is built once and passed by reference wherever datasets
//! are opened; there is no global registration.
//!
//! # Example
//!
//! ```no_run
//! use simio_io::{DatasetConfig, FormatRegistry};
//!
//! let registry = FormatRegistry::with_builtin();
//! let config = DatasetConfig::new("gadget_binary").with_file("snap_000.0");
//! let dataset = registry.open(&config)?;
//! # Ok::<(), simio_io::DataError>(())
//! ```

use crate::config::DatasetConfig;
use crate::dataset::Dataset;
use crate::error::{DataError, Result};
use crate::formats::gadget::GadgetHandler;
use crate::formats::tipsy::TipsyHandler;
use rustc_hash::FxHashMap;
use std::sync::Arc;

/// Opens datasets of one on-disk format.
pub trait FormatHandler: Send + Sync {
    /// Name matched against [`DatasetConfig::format`].
    fn name(&self) -> &'static str;

    fn open(&self, config: &DatasetConfig) -> Result<Dataset>;
}

/// Handlers by format name.
#[derive(Default)]
pub struct FormatRegistry {
    handlers: FxHashMap<&'static str, Arc<dyn FormatHandler>>,
}

impl FormatRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every file-based format of this crate.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(GadgetHandler));
        registry.register(Arc::new(TipsyHandler));
        registry
    }

    /// Register a handler, replacing any handler of the same name.
    pub fn register(&mut self, handler: Arc<dyn FormatHandler>) {
        let name = handler.name();
        if self.handlers.insert(name, handler).is_some() {
            tracing::debug!(format = name, "replaced format handler");
        }
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn FormatHandler>> {
        self.handlers.get(name)
    }

    /// Registered format names, sorted.
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.handlers.keys().copied().collect();
        names.sort_unstable();
        names
    }

    /// Open the dataset described by `config`.
    pub fn open(&self, config: &DatasetConfig) -> Result<Dataset> {
        let handler = self
            .get(&config.format)
            .ok_or_else(|| DataError::UnknownFormat(config.format.clone()))?;
        tracing::debug!(
            format = handler.name(),
            files = config.files.len(),
            "opening dataset"
        );
        handler.open(config)
    }
}
