use thiserror::Error;
use tracing::info;

use crate::blobs::BlobError;
use crate::catalog::CatalogError;
use crate::error::PipelineError;
use crate::gemini::ImageRequest;
use crate::models::PosterTemplate;
use crate::orchestrator::Studio;
use crate::payload::ImagePayload;
use crate::progress::StageObserver;
use crate::synthesizer::{generate_with_fallback, POSTER_ASPECT_RATIO};

pub const BACKGROUND_SUFFIX: &str = ", movie poster style, cinematic lighting, 8k resolution, photorealistic, \
masterpiece, highly detailed, vertical aspect ratio, no text";

const BLOB_PREFIX: &str = "templates";

#[derive(Debug, Error)]
pub enum AdminError {
    #[error("{0}")]
    Invalid(String),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Blob(#[from] BlobError),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

impl Studio {
    /// Stores an uploaded poster image and promotes it to the template's cover.
    pub async fn upload_template_image(
        &self,
        template_id: &str,
        content_type: &str,
        bytes: &[u8],
    ) -> Result<PosterTemplate, AdminError> {
        if !content_type.starts_with("image/") {
            return Err(AdminError::Invalid(format!("expected an image upload, got {content_type}")));
        }
        if bytes.is_empty() {
            return Err(AdminError::Invalid("uploaded file is empty".into()));
        }
        if bytes.len() > self.config.max_upload_bytes {
            return Err(AdminError::Invalid(format!(
                "upload is {} bytes, the limit is {}",
                bytes.len(),
                self.config.max_upload_bytes
            )));
        }
        self.template(template_id)?;

        info!(template_id, "📤 Uploading {} bytes of {}", bytes.len(), content_type);
        self.store_and_promote(template_id, &ImagePayload::from_bytes(content_type, bytes)).await
    }

    /// Generates a fresh poster background from `prompt` and promotes it to the template's cover.
    pub async fn generate_background(
        &self,
        template_id: &str,
        prompt: &str,
        observer: &dyn StageObserver,
    ) -> Result<PosterTemplate, AdminError> {
        if prompt.trim().is_empty() {
            return Err(AdminError::Invalid("a prompt is required".into()));
        }
        self.template(template_id)?;

        let request = ImageRequest {
            prompt: format!("{}{}", prompt.trim(), BACKGROUND_SUFFIX),
            reference: None,
            aspect_ratio: Some(POSTER_ASPECT_RATIO.to_string()),
        };
        let image = generate_with_fallback(self.model(), &self.chain, &request, observer).await?;
        self.store_and_promote(template_id, &image).await
    }

    async fn store_and_promote(&self, template_id: &str, image: &ImagePayload) -> Result<PosterTemplate, AdminError> {
        let reference = self.blobs.put(BLOB_PREFIX, &blob_stem(template_id), image).await?;
        let _guard = self.catalog_writes.lock().await;
        let (next, updated) = self.catalog.read().promoted(template_id, &reference)?;
        next.persist().await?;
        *self.catalog.write() = next;
        info!(template_id, "🖼️ New cover {}", reference);
        Ok(updated)
    }
}

fn blob_stem(template_id: &str) -> String {
    let stem: String = template_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    if stem.is_empty() { "template".into() } else { stem }
}
