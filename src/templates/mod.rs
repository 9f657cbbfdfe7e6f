//! Template mapping model: loaded once, shared read-only, swapped on reload.

pub mod document;

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use tracing::{info, warn};

use crate::error::{TransferError, TransferResult};
use crate::types::{TemplateInfo, TemplateMapping};

pub use document::TemplateDocument;

/// An immutable snapshot of every configured template, in document order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TemplateSet {
    templates: Vec<TemplateInfo>,
}

impl TemplateSet {
    pub fn new(templates: Vec<TemplateInfo>) -> Self {
        Self { templates }
    }

    pub fn get(&self, id: &str) -> Option<&TemplateInfo> {
        self.templates.iter().find(|t| t.id == id)
    }

    pub fn all(&self) -> &[TemplateInfo] {
        &self.templates
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// Resolve a template for conversion: it must exist, be active and be
    /// mapped.
    pub fn resolve(&self, id: &str) -> TransferResult<(&TemplateInfo, &TemplateMapping)> {
        let template = self
            .get(id)
            .ok_or_else(|| TransferError::TemplateNotFound(id.to_string()))?;
        if !template.is_active {
            return Err(TransferError::TemplateInactive(id.to_string()));
        }
        let mapping = template
            .mapping
            .as_ref()
            .ok_or_else(|| TransferError::MissingMapping(id.to_string()))?;
        Ok((template, mapping))
    }
}

/// Owns the template directory and the current [`TemplateSet`].
///
/// Readers take a cheap `Arc` snapshot; [`reload`](Self::reload) parses the
/// document completely before replacing the snapshot, so a reader never sees
/// a half-loaded set and a failed reload keeps the previous one.
#[derive(Debug)]
pub struct TemplateCatalog {
    templates_dir: PathBuf,
    config_path: PathBuf,
    current: RwLock<Arc<TemplateSet>>,
}

impl TemplateCatalog {
    /// Load `templates_dir/config_file` eagerly.
    pub fn load(templates_dir: impl Into<PathBuf>, config_file: &str) -> TransferResult<Self> {
        let templates_dir = templates_dir.into();
        let config_path = templates_dir.join(config_file);
        let set = read_set(&config_path)?;

        info!(
            path = %config_path.display(),
            templates = set.len(),
            "template configuration loaded"
        );

        Ok(Self {
            templates_dir,
            config_path,
            current: RwLock::new(Arc::new(set)),
        })
    }

    /// Wrap an already-built set; `template_content` reads from `templates_dir`.
    pub fn from_set(templates_dir: impl Into<PathBuf>, set: TemplateSet) -> Self {
        let templates_dir = templates_dir.into();
        let config_path = templates_dir.join(crate::config::DEFAULT_CONFIG_FILE);
        Self {
            templates_dir,
            config_path,
            current: RwLock::new(Arc::new(set)),
        }
    }

    pub fn templates_dir(&self) -> &Path {
        &self.templates_dir
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Current snapshot.
    pub fn snapshot(&self) -> Arc<TemplateSet> {
        match self.current.read() {
            Ok(guard) => Arc::clone(&*guard),
            Err(poisoned) => Arc::clone(&*poisoned.into_inner()),
        }
    }

    /// Re-parse the configuration file and swap it in. Returns the new count.
    pub fn reload(&self) -> TransferResult<usize> {
        let set = match read_set(&self.config_path) {
            Ok(set) => set,
            Err(e) => {
                warn!(error = %e, "template reload failed, keeping previous configuration");
                return Err(e);
            }
        };
        let count = set.len();
        let fresh = Arc::new(set);

        match self.current.write() {
            Ok(mut guard) => *guard = fresh,
            Err(poisoned) => *poisoned.into_inner() = fresh,
        }

        info!(templates = count, "template configuration reloaded");
        Ok(count)
    }

    pub fn get(&self, id: &str) -> Option<TemplateInfo> {
        self.snapshot().get(id).cloned()
    }

    /// Active templates, mapped or not.
    pub fn active_templates(&self) -> Vec<TemplateInfo> {
        self.snapshot()
            .all()
            .iter()
            .filter(|t| t.is_active)
            .cloned()
            .collect()
    }

    /// Active templates that carry a mapping.
    pub fn mapped_templates(&self) -> Vec<TemplateInfo> {
        self.snapshot()
            .all()
            .iter()
            .filter(|t| t.is_usable())
            .cloned()
            .collect()
    }

    /// [`TemplateSet::resolve`] against the current snapshot.
    ///
    /// An operation that also reads the template file should resolve
    /// against one snapshot and call [`read_template`](Self::read_template),
    /// so a concurrent reload cannot mix two configurations.
    pub fn resolve(&self, id: &str) -> TransferResult<(TemplateInfo, TemplateMapping)> {
        let set = self.snapshot();
        let (template, mapping) = set.resolve(id)?;
        Ok((template.clone(), mapping.clone()))
    }

    /// Bytes of the template workbook file.
    pub fn template_content(&self, id: &str) -> TransferResult<Vec<u8>> {
        let template = self
            .get(id)
            .ok_or_else(|| TransferError::TemplateNotFound(id.to_string()))?;
        self.read_template(&template)
    }

    /// Bytes of the workbook file behind an already resolved template.
    pub fn read_template(&self, template: &TemplateInfo) -> TransferResult<Vec<u8>> {
        let path = self.templates_dir.join(&template.filename);
        std::fs::read(&path).map_err(|e| {
            TransferError::Io(std::io::Error::new(
                e.kind(),
                format!(
                    "template file for '{}' not readable at {}: {}",
                    template.id,
                    path.display(),
                    e
                ),
            ))
        })
    }
}

fn read_set(path: &Path) -> TransferResult<TemplateSet> {
    let doc = TemplateDocument::from_path(path).map_err(|e| match e {
        TransferError::Config(_) => e,
        other => TransferError::Config(format!("{}: {}", path.display(), other)),
    })?;
    Ok(TemplateSet::new(doc.into_templates()?))
}
