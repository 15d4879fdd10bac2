//! Local filesystem implementation of `BlobStore`.
//!
//! Content-addressable: the blob id is the SHA-256 of the bytes plus an
//! extension derived from the content type, so identical uploads dedupe.
//! Files are sharded two levels deep: `ab/cd/abcd…ef.png`.

use std::path::PathBuf;

use async_trait::async_trait;
use bytes::Bytes;
use domains::BlobStore;
use mime::Mime;
use sha2::{Digest, Sha256};
use tokio::fs;
use tracing::debug;

pub struct LocalBlobStore {
    /// Root directory for all uploads (e.g. "./data/blobs")
    root_path: PathBuf,
    /// Public URL prefix (e.g. "/static/blobs")
    url_prefix: String,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>, url_prefix: impl Into<String>) -> Self {
        Self { root_path: root.into(), url_prefix: url_prefix.into().trim_end_matches('/').to_string() }
    }

    fn extension_for(content_type: &Mime) -> Option<&'static str> {
        if content_type.type_() != mime::IMAGE {
            return None;
        }
        match content_type.subtype().as_str() {
            "png" => Some("png"),
            "jpeg" | "jpg" => Some("jpg"),
            "gif" => Some("gif"),
            "webp" => Some("webp"),
            _ => None,
        }
    }

    /// Splits a blob id into its hash, rejecting anything that is not
    /// `<64 hex>.<ext>`. Guards the filesystem path against traversal.
    fn parse_id(blob_id: &str) -> Option<&str> {
        let (hash, ext) = blob_id.split_once('.')?;
        let valid_hash = hash.len() == 64 && hash.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase());
        let valid_ext = matches!(ext, "png" | "jpg" | "gif" | "webp");
        (valid_hash && valid_ext).then_some(hash)
    }

    fn relative_path(hash: &str, blob_id: &str) -> String {
        format!("{}/{}/{}", &hash[0..2], &hash[2..4], blob_id)
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn put(&self, data: Bytes, content_type: Mime) -> anyhow::Result<String> {
        let ext = Self::extension_for(&content_type)
            .ok_or_else(|| anyhow::anyhow!("unsupported content type {content_type}"))?;
        if data.is_empty() {
            anyhow::bail!("empty upload");
        }

        let hash = hex::encode(Sha256::digest(&data));
        let blob_id = format!("{hash}.{ext}");
        let target = self.root_path.join(Self::relative_path(&hash, &blob_id));

        if fs::try_exists(&target).await? {
            debug!(blob_id, "blob already stored");
            return Ok(blob_id);
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&target, &data).await?;
        Ok(blob_id)
    }

    async fn resolve(&self, blob_id: &str) -> Option<String> {
        let hash = Self::parse_id(blob_id)?;
        let relative = Self::relative_path(hash, blob_id);
        match fs::try_exists(self.root_path.join(&relative)).await {
            Ok(true) => Some(format!("{}/{}", self.url_prefix, relative)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stores_and_resolves_content_addressed_blobs() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path(), "/static/blobs/");

        let id = store.put(Bytes::from_static(b"\x89PNG fake"), mime::IMAGE_PNG).await.unwrap();
        let again = store.put(Bytes::from_static(b"\x89PNG fake"), mime::IMAGE_PNG).await.unwrap();
        assert_eq!(id, again);
        assert!(id.ends_with(".png"));

        let url = store.resolve(&id).await.unwrap();
        assert!(url.starts_with("/static/blobs/"));
        assert!(url.ends_with(&id));
    }

    #[tokio::test]
    async fn rejects_non_images_and_bad_ids() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path(), "/b");
        assert!(store.put(Bytes::from_static(b"hi"), mime::TEXT_PLAIN).await.is_err());
        assert!(store.resolve("../../etc/passwd").await.is_none());
        assert!(store.resolve(&format!("{}.png", "0".repeat(64))).await.is_none());
    }
}
