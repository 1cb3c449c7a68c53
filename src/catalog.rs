use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

use crate::assets;
use crate::models::PosterTemplate;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("template '{0}' not found")]
    NotFound(String),
    #[error("catalog io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("catalog json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// The in-memory template list, optionally mirrored to a JSON file.
///
/// Shared as `Arc<RwLock<TemplateCatalog>>`; admin actions are the only writers.
#[derive(Debug, Clone)]
pub struct TemplateCatalog {
    templates: Vec<PosterTemplate>,
    path: Option<PathBuf>,
}

impl TemplateCatalog {
    pub fn new(templates: Vec<PosterTemplate>) -> Self {
        Self { templates: normalized(templates), path: None }
    }

    /// The list shipped with the binary.
    pub fn builtin() -> Self {
        let templates: Vec<PosterTemplate> = assets::get(assets::DEFAULT_TEMPLATES)
            .and_then(|bytes| serde_json::from_slice(bytes).ok())
            .unwrap_or_default();
        Self::new(templates)
    }

    /// Reads `path` if it holds a valid catalog, otherwise starts from the builtin list.
    /// Later mutations are written back to `path` either way.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let mut catalog = match std::fs::read(path) {
            Ok(bytes) => match serde_json::from_slice::<Vec<PosterTemplate>>(&bytes) {
                Ok(templates) => {
                    info!("📚 Loaded {} templates from {}", templates.len(), path.display());
                    Self::new(templates)
                }
                Err(e) => {
                    warn!("⚠️ {} is not a valid catalog ({}), using builtin templates", path.display(), e);
                    Self::builtin()
                }
            },
            Err(_) => Self::builtin(),
        };
        catalog.path = Some(path.to_path_buf());
        catalog
    }

    pub fn list(&self) -> &[PosterTemplate] {
        &self.templates
    }

    pub fn get(&self, id: &str) -> Option<&PosterTemplate> {
        self.templates.iter().find(|t| t.id == id)
    }

    /// Current cover image reference, if the template has one.
    pub fn cover(&self, id: &str) -> Option<&str> {
        self.get(id)
            .map(|t| t.cover_image.as_str())
            .filter(|c| !c.is_empty())
    }

    /// A copy of this catalog with `reference` prepended to the template's images
    /// and made its cover. `self` is left untouched; commit with [`Self::persist`]
    /// followed by swapping the copy in.
    pub fn promoted(&self, id: &str, reference: &str) -> Result<(Self, PosterTemplate), CatalogError> {
        let mut next = self.clone();
        let template = next
            .templates
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| CatalogError::NotFound(id.to_string()))?;
        template.images.insert(0, reference.to_string());
        template.cover_image = reference.to_string();
        let updated = template.clone();
        Ok((next, updated))
    }

    /// Writes the template list to the backing file, if any.
    pub async fn persist(&self) -> Result<(), CatalogError> {
        if let Some(path) = &self.path {
            tokio::fs::write(path, serde_json::to_vec_pretty(&self.templates)?).await?;
        }
        Ok(())
    }
}

/// Guarantees `images` lists the cover when older catalogs only carried `coverImage`.
fn normalized(mut templates: Vec<PosterTemplate>) -> Vec<PosterTemplate> {
    for t in &mut templates {
        if t.images.is_empty() && !t.cover_image.is_empty() {
            t.images.push(t.cover_image.clone());
        }
        if t.cover_image.is_empty() {
            if let Some(first) = t.images.first() {
                t.cover_image = first.clone();
            }
        }
    }
    templates
}
