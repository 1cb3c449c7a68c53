use bytes::Bytes;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::payload::{extension_for, ImagePayload, PayloadError};

pub const PUBLIC_PREFIX: &str = "/api/blobs/";

#[derive(Debug, Error)]
pub enum BlobError {
    #[error("invalid blob name '{0}'")]
    InvalidName(String),
    #[error("blob io error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Payload(#[from] PayloadError),
}

/// Uploaded and generated template images, stored on local disk.
#[derive(Debug, Clone)]
pub struct BlobStore {
    root: PathBuf,
}

impl BlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Writes the payload under `<prefix>/<stem>_<6 hex>.<ext>` and returns its public reference.
    pub async fn put(&self, prefix: &str, stem: &str, payload: &ImagePayload) -> Result<String, BlobError> {
        let suffix = Uuid::new_v4().simple().to_string();
        let name = format!("{}/{}_{}.{}", prefix, stem, &suffix[..6], extension_for(payload.mime()));
        let path = self.path_for(&name)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, payload.decode()?).await?;
        info!("💾 Stored blob {}", name);
        Ok(public_ref(&name))
    }

    pub async fn read(&self, name: &str) -> Result<Bytes, BlobError> {
        let path = self.path_for(name)?;
        Ok(Bytes::from(tokio::fs::read(path).await?))
    }

    fn path_for(&self, name: &str) -> Result<PathBuf, BlobError> {
        validate_name(name)?;
        Ok(self.root.join(Path::new(name)))
    }
}

pub fn public_ref(name: &str) -> String {
    format!("{PUBLIC_PREFIX}{name}")
}

fn validate_name(name: &str) -> Result<(), BlobError> {
    let bad = name.is_empty()
        || name.starts_with('/')
        || name.contains('\\')
        || name.split('/').any(|seg| seg.is_empty() || seg == "." || seg == "..");
    if bad {
        return Err(BlobError::InvalidName(name.to_string()));
    }
    Ok(())
}
