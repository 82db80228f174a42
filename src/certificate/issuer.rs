use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use super::{
    Artifact, ArtifactCache, CertificateError, CertificateFields, ErrorKind, RecordKind,
    RenderQueue,
};
use crate::models::Certificate;
use crate::progress::{self, Progress};
use crate::store::{Insertion, Store, StoreError};

const NUMBER_ATTEMPTS: usize = 5;

/// Produces `{PREFIX}-{YYYYMMDD}-{8 hex}` certification numbers.
#[derive(Debug, Clone)]
pub struct NumberGenerator {
    prefix: String,
}

impl NumberGenerator {
    pub fn new(prefix: &str) -> Self {
        // numbers end up in file names
        let prefix: String = prefix
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_uppercase())
            .collect();
        Self {
            prefix: if prefix.is_empty() {
                "CERT".to_string()
            } else {
                prefix
            },
        }
    }

    pub fn generate(&self, issue_date: NaiveDate) -> String {
        let suffix = Uuid::new_v4().simple().to_string().to_uppercase();
        format!(
            "{}-{}-{}",
            self.prefix,
            issue_date.format("%Y%m%d"),
            &suffix[..8]
        )
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct IssuedCertificate {
    pub certificate: Certificate,
    /// False when the record already existed.
    pub created: bool,
    pub artifact: Artifact,
}

/// Result of re-evaluating a student's progress after a lesson completion.
/// `certificate` is `None` while the course is unfinished.
#[derive(Debug)]
pub struct CompletionOutcome {
    pub progress: Progress,
    pub certificate: Option<Result<IssuedCertificate, CertificateError>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CertificateSummary {
    pub id: Uuid,
    pub certification_number: String,
    pub student_id: Uuid,
    pub student_name: String,
    pub course_id: Uuid,
    pub course_name: String,
    pub title: String,
    pub issue_date: NaiveDate,
    pub issue_date_display: String,
    pub download_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorKind>,
}

pub struct CertificateService {
    store: Arc<dyn Store>,
    cache: ArtifactCache,
    queue: RenderQueue,
    numbers: NumberGenerator,
}

impl CertificateService {
    pub fn new(
        store: Arc<dyn Store>,
        cache: ArtifactCache,
        queue: RenderQueue,
        numbers: NumberGenerator,
    ) -> Self {
        Self {
            store,
            cache,
            queue,
            numbers,
        }
    }

    pub fn cache(&self) -> &ArtifactCache {
        &self.cache
    }

    /// Called after a completion row is written. Storage failures while
    /// computing progress are returned as `Err`; certificate failures are
    /// reported inside the outcome so the completion itself still stands.
    pub async fn on_lesson_completed(
        &self,
        student_id: Uuid,
        course_id: Uuid,
    ) -> Result<CompletionOutcome, StoreError> {
        let progress = progress::track(self.store.as_ref(), student_id, course_id).await?;
        if !progress.is_complete() {
            return Ok(CompletionOutcome {
                progress,
                certificate: None,
            });
        }

        let issued = self.issue(student_id, course_id).await;
        if let Err(e) = &issued {
            warn!(%student_id, %course_id, error = %e, "certificate not available yet");
        }
        Ok(CompletionOutcome {
            progress,
            certificate: Some(issued),
        })
    }

    /// Ensure the record exists and its PDF is on disk.
    pub async fn issue(
        &self,
        student_id: Uuid,
        course_id: Uuid,
    ) -> Result<IssuedCertificate, CertificateError> {
        let insertion = self.ensure_record(student_id, course_id).await?;
        let created = insertion.created();
        let certificate = insertion.into_inner();
        if created {
            info!(
                %student_id,
                %course_id,
                certification_number = %certificate.certification_number,
                "certificate issued"
            );
        }

        let artifact = self.ensure_artifact(&certificate).await?;
        Ok(IssuedCertificate {
            certificate,
            created,
            artifact,
        })
    }

    async fn ensure_record(
        &self,
        student_id: Uuid,
        course_id: Uuid,
    ) -> Result<Insertion<Certificate>, CertificateError> {
        if let Some(existing) = self.store.find_certificate(student_id, course_id).await? {
            return Ok(Insertion::Existing(existing));
        }

        let issue_date = Utc::now().date_naive();
        let mut last_clash = String::new();
        for attempt in 1..=NUMBER_ATTEMPTS {
            let candidate = Certificate {
                id: Uuid::new_v4(),
                student_id,
                course_id,
                issue_date,
                certification_number: self.numbers.generate(issue_date),
                created_at: Utc::now(),
            };
            match self.store.insert_certificate_if_absent(&candidate).await {
                Ok(insertion) => return Ok(insertion),
                Err(StoreError::DuplicateKey(key)) => {
                    warn!(attempt, %key, "certification number collision, retrying");
                    last_clash = key;
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(StoreError::DuplicateKey(last_clash).into())
    }

    /// Render the artifact if it is not on disk. The issue date comes from
    /// the record, so a regenerated file matches the original.
    pub async fn ensure_artifact(&self, cert: &Certificate) -> Result<Artifact, CertificateError> {
        if let Some(artifact) = self.cache.lookup(cert).await {
            return Ok(artifact);
        }

        let student = self
            .store
            .find_student(cert.student_id)
            .await?
            .ok_or(CertificateError::RecordNotFound {
                kind: RecordKind::Student,
                id: cert.student_id,
            })?;
        let course = self
            .store
            .find_course(cert.course_id)
            .await?
            .ok_or(CertificateError::RecordNotFound {
                kind: RecordKind::Course,
                id: cert.course_id,
            })?;

        let artifact = self.cache.artifact(cert);
        let fields = CertificateFields {
            student_name: student.full_name(),
            course_name: course.name,
            issue_date: cert.issue_date,
            certification_number: cert.certification_number.clone(),
        };
        self.queue.render(fields, artifact.path.clone()).await?;
        Ok(artifact)
    }

    /// Look up by certification number and make sure the PDF exists.
    pub async fn download(&self, number: &str) -> Result<Option<Artifact>, CertificateError> {
        match self.store.find_certificate_by_number(number).await? {
            Some(cert) => Ok(Some(self.ensure_artifact(&cert).await?)),
            None => Ok(None),
        }
    }

    /// A student's certificates. Download links are only given for files
    /// already on disk; nothing is rendered here.
    pub async fn list_for_student(
        &self,
        student_id: Uuid,
    ) -> Result<Vec<CertificateSummary>, StoreError> {
        let mut out = Vec::new();
        for cert in self.store.list_certificates(student_id).await? {
            let download_url = self.cache.lookup(&cert).await.map(|a| a.url);
            if let Some(summary) = self.summarize(cert, download_url, None).await? {
                out.push(summary);
            }
        }
        Ok(out)
    }

    /// Public verification search. Missing artifacts are regenerated; a
    /// failure leaves that entry without a link.
    pub async fn search(&self, query: &str) -> Result<Vec<CertificateSummary>, StoreError> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }

        let mut out = Vec::new();
        for cert in self.store.search_certificates(query).await? {
            let (download_url, error) = match self.ensure_artifact(&cert).await {
                Ok(artifact) => (Some(artifact.url), None),
                Err(e) => {
                    warn!(
                        certification_number = %cert.certification_number,
                        error = %e,
                        "could not prepare certificate for search result"
                    );
                    (None, Some(e.kind()))
                }
            };
            if let Some(summary) = self.summarize(cert, download_url, error).await? {
                out.push(summary);
            }
        }
        Ok(out)
    }

    async fn summarize(
        &self,
        cert: Certificate,
        download_url: Option<String>,
        error: Option<ErrorKind>,
    ) -> Result<Option<CertificateSummary>, StoreError> {
        let (Some(student), Some(course)) = (
            self.store.find_student(cert.student_id).await?,
            self.store.find_course(cert.course_id).await?,
        ) else {
            warn!(certification_number = %cert.certification_number, "certificate references a missing record");
            return Ok(None);
        };

        Ok(Some(CertificateSummary {
            id: cert.id,
            title: format!("Certificate for {}", course.name),
            issue_date_display: cert.issue_date.format("%B %d, %Y").to_string(),
            certification_number: cert.certification_number,
            student_id: student.id,
            student_name: student.full_name(),
            course_id: course.id,
            course_name: course.name,
            issue_date: cert.issue_date,
            download_url,
            error,
        }))
    }
}
