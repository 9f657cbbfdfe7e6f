//! Conversion orchestration
//!
//! A [`Converter`] owns a handle to the template catalog, the source
//! extractor and the engine limits. Its three entry points cover the
//! supported modes:
//!
//! - [`Converter::convert`]: one source into one template
//! - [`Converter::convert_batch`]: one source into many templates, zipped
//! - [`Converter::convert_multi`]: many sources into one template, one row each
//!
//! Every entry point is synchronous; callers run each request on its own
//! worker thread.

mod batch;
mod multi;
pub mod naming;
mod single;

use std::sync::Arc;

use crate::config::EngineLimits;
use crate::excel::{SourceExtractor, WorkbookExtractor};
use crate::templates::TemplateCatalog;

pub use multi::check_capacity;

pub struct Converter {
    catalog: Arc<TemplateCatalog>,
    extractor: Arc<dyn SourceExtractor>,
    limits: EngineLimits,
}

impl Converter {
    /// Converter reading real workbooks with default limits.
    pub fn new(catalog: Arc<TemplateCatalog>) -> Self {
        Self {
            catalog,
            extractor: Arc::new(WorkbookExtractor),
            limits: EngineLimits::default(),
        }
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn SourceExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn with_limits(mut self, limits: EngineLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn catalog(&self) -> &TemplateCatalog {
        &self.catalog
    }

    pub fn limits(&self) -> EngineLimits {
        self.limits
    }
}
