use crate::constants::{ALBUM_COVER_DIRECTORY, ARTIST_PHOTO_DIRECTORY};
use crate::error::Result;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Downloaded images under the media root. Stored references are relative.
#[derive(Debug, Clone)]
pub struct MediaStore {
    root: PathBuf,
}

impl MediaStore {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Write `data` at `relative` under the root and return `relative`
    pub async fn save(&self, relative: &str, data: &[u8]) -> Result<String> {
        let path = self.root.join(relative);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, data).await?;
        debug!("Saved {} bytes to {}", data.len(), path.display());
        Ok(relative.to_string())
    }
}

pub fn artist_photo_path(slug: &str) -> String {
    format!("{}/{}.jpg", ARTIST_PHOTO_DIRECTORY, slug)
}

/// Cover file name from a hash of "<artist> <title>", ASCII characters only
pub fn album_cover_path(artist_name: &str, title: &str) -> String {
    let key: String = format!("{} {}", artist_name, title)
        .chars()
        .filter(char::is_ascii)
        .collect();
    let hash = hex::encode(Sha256::digest(key.as_bytes()));
    format!("{}/{}.jpg", ALBUM_COVER_DIRECTORY, hash)
}
