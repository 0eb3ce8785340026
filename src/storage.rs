use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use crate::db::{ProfilePatch, Repository};
use crate::store::Store;

/// Blob store collaborator: a named byte payload in, a durable retrieval
/// URL out.
pub trait BlobStore: Send + Sync {
    fn upload(&self, path: &str, bytes: &[u8]) -> Result<String>;
}

/// Filesystem-backed blob store returning `file://` URLs.
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl BlobStore for FsBlobStore {
    fn upload(&self, path: &str, bytes: &[u8]) -> Result<String> {
        let full = self.root.join(path);
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&full, bytes)
            .with_context(|| format!("Failed to write blob {}", full.display()))?;
        Ok(format!("file://{}", full.display()))
    }
}

/// Store a resume blob under the user's prefix and record its URL on the
/// profile. Returns the URL.
pub fn upload_resume(
    blob: &dyn BlobStore,
    repo: &Repository,
    uid: &str,
    filename: &str,
    bytes: &[u8],
) -> Result<String> {
    let ext = Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("pdf");
    let path = format!("resumes/{}/{}.{}", uid, Store::server_now(), ext);
    let url = blob.upload(&path, bytes)?;
    repo.update_user_profile(
        uid,
        &ProfilePatch {
            resume_url: Some(url.clone()),
            ..Default::default()
        },
    )?;
    Ok(url)
}
