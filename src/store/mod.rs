//! Repository interfaces over the academy's records.
//!
//! Services receive an `Arc<dyn Store>`; there is no ambient connection.
//! Uniqueness (one completion per student and lesson, one enrollment and one
//! certificate per student and course) is enforced by the implementations'
//! insert-if-absent operations rather than by callers checking first.

use async_trait::async_trait;
use uuid::Uuid;

use crate::models::{
    Certificate, Course, Enrollment, Lesson, LessonCompletion, Payment, PaymentStatus, Purchase,
    RatingSummary, Review, Student,
};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("duplicate key: {0}")]
    DuplicateKey(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Outcome of an insert-if-absent.
#[derive(Debug, Clone, PartialEq)]
pub enum Insertion<T> {
    Created(T),
    Existing(T),
}

impl<T> Insertion<T> {
    pub fn created(&self) -> bool {
        matches!(self, Insertion::Created(_))
    }

    pub fn into_inner(self) -> T {
        match self {
            Insertion::Created(v) | Insertion::Existing(v) => v,
        }
    }
}

#[async_trait]
pub trait Directory: Send + Sync {
    async fn find_student(&self, id: Uuid) -> Result<Option<Student>>;
    async fn find_course(&self, id: Uuid) -> Result<Option<Course>>;
}

#[async_trait]
pub trait LessonStore: Send + Sync {
    async fn find_lesson(&self, id: Uuid) -> Result<Option<Lesson>>;
    async fn count_lessons(&self, course_id: Uuid) -> Result<u32>;
    /// Distinct lessons of `course_id` the student has completed.
    async fn count_completed(&self, student_id: Uuid, course_id: Uuid) -> Result<u32>;
    /// Returns `false` when the student already completed that lesson.
    async fn record_completion(&self, completion: &LessonCompletion) -> Result<bool>;
}

#[async_trait]
pub trait EnrollmentStore: Send + Sync {
    async fn find_enrollment(&self, student_id: Uuid, course_id: Uuid)
        -> Result<Option<Enrollment>>;
    async fn enroll_if_absent(&self, enrollment: &Enrollment) -> Result<Insertion<Enrollment>>;
    async fn list_enrollments(&self, student_id: Uuid) -> Result<Vec<Enrollment>>;
    async fn insert_payment(&self, payment: &Payment) -> Result<()>;
    /// Most recent payment by `payment_date`.
    async fn latest_payment(&self, student_id: Uuid, course_id: Uuid) -> Result<Option<Payment>>;
    async fn update_payment_status(
        &self,
        payment_id: Uuid,
        status: PaymentStatus,
    ) -> Result<Option<Payment>>;
    /// Every payment of a student with its course name, newest first.
    async fn list_purchases(&self, student_id: Uuid) -> Result<Vec<Purchase>>;
}

#[async_trait]
pub trait ReviewStore: Send + Sync {
    async fn insert_review(&self, review: &Review) -> Result<()>;
    async fn find_review(&self, id: Uuid) -> Result<Option<Review>>;
    async fn update_review(&self, id: Uuid, rating: i32, review_text: &str)
        -> Result<Option<Review>>;
    /// Newest first.
    async fn list_reviews(&self, course_id: Uuid) -> Result<Vec<Review>>;
    async fn rating_summary(&self, course_id: Uuid) -> Result<RatingSummary>;
}

#[async_trait]
pub trait CertificateStore: Send + Sync {
    async fn find_certificate(&self, student_id: Uuid, course_id: Uuid)
        -> Result<Option<Certificate>>;
    async fn find_certificate_by_number(&self, number: &str) -> Result<Option<Certificate>>;
    /// Atomic on (student_id, course_id). A clash on the certification number
    /// alone is reported as [`StoreError::DuplicateKey`].
    async fn insert_certificate_if_absent(
        &self,
        certificate: &Certificate,
    ) -> Result<Insertion<Certificate>>;
    async fn list_certificates(&self, student_id: Uuid) -> Result<Vec<Certificate>>;
    /// Case-insensitive substring match over student names and email,
    /// certification number and course name.
    async fn search_certificates(&self, query: &str) -> Result<Vec<Certificate>>;
}

pub trait Store:
    Directory + LessonStore + EnrollmentStore + ReviewStore + CertificateStore
{
}

impl<T> Store for T where
    T: Directory + LessonStore + EnrollmentStore + ReviewStore + CertificateStore
{
}
