//! Certificate issuance: the issuer, the PDF renderer, the render queue and
//! the on-disk artifact cache.

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;
use uuid::Uuid;

use crate::store::StoreError;

pub mod cache;
pub mod font;
pub mod issuer;
pub mod queue;
pub mod render;

pub use cache::{Artifact, ArtifactCache};
pub use issuer::{
    CertificateService, CertificateSummary, CompletionOutcome, IssuedCertificate, NumberGenerator,
};
pub use queue::RenderQueue;
pub use render::{Assets, CertificateFields, Renderer};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    Template,
    Font,
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AssetKind::Template => "certificate template",
            AssetKind::Font => "certificate font",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Student,
    Course,
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RecordKind::Student => "student",
            RecordKind::Course => "course",
        })
    }
}

#[derive(thiserror::Error, Debug)]
pub enum CertificateError {
    #[error("{asset} not found: {}", .path.display())]
    AssetMissing { asset: AssetKind, path: PathBuf },

    #[error("{kind} {id} not found")]
    RecordNotFound { kind: RecordKind, id: Uuid },

    #[error("certificate rendering failed: {0}")]
    RenderFailure(String),

    #[error("storage error: {0}")]
    Storage(#[from] StoreError),

    #[error("render queue is not running")]
    QueueClosed,
}

/// Machine-readable failure kind reported alongside an otherwise successful
/// lesson completion.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    AssetMissing,
    RecordNotFound,
    RenderFailure,
    Storage,
    QueueClosed,
}

impl CertificateError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CertificateError::AssetMissing { .. } => ErrorKind::AssetMissing,
            CertificateError::RecordNotFound { .. } => ErrorKind::RecordNotFound,
            CertificateError::RenderFailure(_) => ErrorKind::RenderFailure,
            CertificateError::Storage(_) => ErrorKind::Storage,
            CertificateError::QueueClosed => ErrorKind::QueueClosed,
        }
    }
}
