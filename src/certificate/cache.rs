//! On-disk certificate artifacts.
//!
//! ```text
//! {media_root}/certificate/certificate_{student}_{course}_{number}.pdf
//! ```
//!
//! Files are write-once: a certificate never changes after issue, so an
//! existing file is always current. Writes go through a temp file in the same
//! directory followed by a rename, so readers never see a partial PDF.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use crate::models::Certificate;

pub const CERTIFICATE_DIR: &str = "certificate";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Artifact {
    pub file_name: String,
    #[serde(skip)]
    pub path: PathBuf,
    pub url: String,
}

#[derive(Debug, Clone)]
pub struct ArtifactCache {
    dir: PathBuf,
    base_url: String,
}

impl ArtifactCache {
    pub fn new(media_root: impl AsRef<Path>, media_url: &str) -> Self {
        Self {
            dir: media_root.as_ref().join(CERTIFICATE_DIR),
            base_url: media_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn file_name(cert: &Certificate) -> String {
        format!(
            "certificate_{}_{}_{}.pdf",
            cert.student_id, cert.course_id, cert.certification_number
        )
    }

    pub fn artifact(&self, cert: &Certificate) -> Artifact {
        let file_name = Self::file_name(cert);
        Artifact {
            path: self.dir.join(&file_name),
            url: format!("{}/{}/{}", self.base_url, CERTIFICATE_DIR, file_name),
            file_name,
        }
    }

    /// The artifact if its file is already on disk.
    pub async fn lookup(&self, cert: &Certificate) -> Option<Artifact> {
        let artifact = self.artifact(cert);
        match tokio::fs::try_exists(&artifact.path).await {
            Ok(true) => Some(artifact),
            _ => None,
        }
    }
}

/// Atomically place `bytes` at `path`, creating parent directories.
pub fn publish(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "artifact path has no parent"))?;
    fs::create_dir_all(parent)?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp_path = parent.join(format!(".{}.{}.tmp", file_name, Uuid::new_v4().simple()));

    let written = fs::File::create(&temp_path).and_then(|mut f| {
        f.write_all(bytes)?;
        f.sync_all()
    });
    if let Err(e) = written.and_then(|_| fs::rename(&temp_path, path)) {
        let _ = fs::remove_file(&temp_path);
        return Err(e);
    }

    debug!(path = %path.display(), size = bytes.len(), "published certificate artifact");
    Ok(())
}
