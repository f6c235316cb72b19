//! # rf-storage-local
//! rusty-forum/crates/rf-plugins/rf-storage-local/src/lib.rs
//! Local filesystem implementation of `MediaStore`.
//! Features: size/type validation, content-addressable storage, directory sharding.

use std::path::PathBuf;

use async_trait::async_trait;
use image::ImageFormat;
use rf_core::error::{AppError, Result};
use rf_core::traits::MediaStore;
use sha2::{Digest, Sha256};
use tokio::fs;

/// Default upload ceiling: 5 MiB.
pub const DEFAULT_MAX_BYTES: usize = 5 * 1024 * 1024;

pub struct LocalMediaStore {
    /// Root directory for all uploads (e.g., "./data/uploads")
    root_path: PathBuf,
    /// Public URL prefix (e.g., "/static/uploads")
    url_prefix: String,
    max_bytes: usize,
}

impl LocalMediaStore {
    pub fn new(root: PathBuf, url_prefix: String) -> Self {
        Self {
            root_path: root,
            url_prefix: url_prefix.trim_end_matches('/').to_string(),
            max_bytes: DEFAULT_MAX_BYTES,
        }
    }

    pub fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    /// Generates a sharded relative path: "ab/cd/abcd...hash.ext"
    fn sharded_name(hash: &str, ext: &str) -> String {
        format!("{}/{}/{}.{}", &hash[0..2], &hash[2..4], hash, ext)
    }

    /// Rejects oversized payloads and anything that is not a supported image,
    /// judged by both the declared type and the leading bytes.
    fn validate(&self, data: &[u8], content_type: &str) -> Result<&'static str> {
        if data.len() > self.max_bytes {
            return Err(AppError::invalid(format!(
                "file exceeds the {} byte limit",
                self.max_bytes
            )));
        }

        let declared: mime::Mime = content_type
            .parse()
            .map_err(|_| AppError::invalid("unsupported file type"))?;
        if declared.type_() != mime::IMAGE {
            return Err(AppError::invalid("unsupported file type"));
        }

        match image::guess_format(data) {
            Ok(ImageFormat::Jpeg) => Ok("jpg"),
            Ok(ImageFormat::Png) => Ok("png"),
            Ok(ImageFormat::Gif) => Ok("gif"),
            Ok(ImageFormat::WebP) => Ok("webp"),
            _ => Err(AppError::invalid("unsupported file type")),
        }
    }
}

#[async_trait]
impl MediaStore for LocalMediaStore {
    /// Saves an upload using its SHA-256 hash as the filename.
    /// This automatically deduplicates files.
    async fn save_upload(&self, data: Vec<u8>, content_type: &str) -> Result<String> {
        let ext = self.validate(&data, content_type)?;

        let hash = hex::encode(Sha256::digest(&data));
        let name = Self::sharded_name(&hash, ext);
        let target_path = self.root_path.join(&name);

        if let Some(parent) = target_path.parent() {
            fs::create_dir_all(parent).await.map_err(|err| {
                tracing::error!(path = %parent.display(), error = %err, "cannot create upload directory");
                AppError::ServerBusy
            })?;
        }

        if fs::try_exists(&target_path).await.unwrap_or(false) {
            tracing::debug!(%hash, "upload already stored");
        } else {
            fs::write(&target_path, &data).await.map_err(|err| {
                tracing::error!(path = %target_path.display(), error = %err, "cannot write upload");
                AppError::ServerBusy
            })?;
        }

        Ok(format!("{}/{}", self.url_prefix, name))
    }
}
