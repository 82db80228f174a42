//! In-memory store for tests and `STORAGE=memory` runs.
//!
//! A single lock guards every table so insert-if-absent is atomic.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    CertificateStore, Directory, EnrollmentStore, Insertion, LessonStore, Result, ReviewStore,
    StoreError,
};
use crate::models::{
    Category, Certificate, Course, Enrollment, Lesson, LessonCompletion, Payment, PaymentStatus,
    Purchase, RatingSummary, Review, Student,
};

#[derive(Default)]
struct Tables {
    students: HashMap<Uuid, Student>,
    categories: HashMap<Uuid, Category>,
    courses: HashMap<Uuid, Course>,
    lessons: HashMap<Uuid, Lesson>,
    completions: HashMap<(Uuid, Uuid), LessonCompletion>, // (student, lesson)
    enrollments: HashMap<(Uuid, Uuid), Enrollment>,       // (student, course)
    payments: Vec<Payment>,
    reviews: HashMap<Uuid, Review>,
    certificates: HashMap<(Uuid, Uuid), Certificate>, // (student, course)
}

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_student(
        &self,
        first_name: &str,
        middle_name: Option<&str>,
        last_name: &str,
        email: &str,
    ) -> Student {
        let student = Student {
            id: Uuid::new_v4(),
            first_name: first_name.into(),
            middle_name: middle_name.map(Into::into),
            last_name: last_name.into(),
            email: email.into(),
            created_at: Utc::now(),
        };
        self.tables
            .write()
            .await
            .students
            .insert(student.id, student.clone());
        student
    }

    pub async fn add_category(&self, name: &str, is_free: bool) -> Category {
        let category = Category {
            id: Uuid::new_v4(),
            name: name.into(),
            is_free,
        };
        self.tables
            .write()
            .await
            .categories
            .insert(category.id, category.clone());
        category
    }

    pub async fn add_course(&self, category: &Category, name: &str, course_amount: i64) -> Course {
        let course = Course {
            id: Uuid::new_v4(),
            category_id: category.id,
            name: name.into(),
            course_amount,
            is_free: category.is_free,
            created_at: Utc::now(),
        };
        self.tables
            .write()
            .await
            .courses
            .insert(course.id, course.clone());
        course
    }

    pub async fn add_lesson(&self, course_id: Uuid, title: &str, position: i32) -> Lesson {
        let lesson = Lesson {
            id: Uuid::new_v4(),
            course_id,
            title: title.into(),
            position,
            created_at: Utc::now(),
        };
        self.tables
            .write()
            .await
            .lessons
            .insert(lesson.id, lesson.clone());
        lesson
    }

    /// Number of stored certificates for the pair; the uniqueness tests read this.
    pub async fn certificate_rows(&self, student_id: Uuid, course_id: Uuid) -> usize {
        self.tables
            .read()
            .await
            .certificates
            .values()
            .filter(|c| c.student_id == student_id && c.course_id == course_id)
            .count()
    }
}

fn contains_ci(haystack: &str, needle_lower: &str) -> bool {
    haystack.to_lowercase().contains(needle_lower)
}

#[async_trait]
impl Directory for MemoryStore {
    async fn find_student(&self, id: Uuid) -> Result<Option<Student>> {
        Ok(self.tables.read().await.students.get(&id).cloned())
    }

    async fn find_course(&self, id: Uuid) -> Result<Option<Course>> {
        Ok(self.tables.read().await.courses.get(&id).cloned())
    }
}

#[async_trait]
impl LessonStore for MemoryStore {
    async fn find_lesson(&self, id: Uuid) -> Result<Option<Lesson>> {
        Ok(self.tables.read().await.lessons.get(&id).cloned())
    }

    async fn count_lessons(&self, course_id: Uuid) -> Result<u32> {
        let t = self.tables.read().await;
        Ok(t.lessons.values().filter(|l| l.course_id == course_id).count() as u32)
    }

    async fn count_completed(&self, student_id: Uuid, course_id: Uuid) -> Result<u32> {
        let t = self.tables.read().await;
        let n = t
            .completions
            .values()
            .filter(|c| c.student_id == student_id)
            .filter(|c| {
                t.lessons
                    .get(&c.lesson_id)
                    .is_some_and(|l| l.course_id == course_id)
            })
            .count();
        Ok(n as u32)
    }

    async fn record_completion(&self, completion: &LessonCompletion) -> Result<bool> {
        let mut t = self.tables.write().await;
        let key = (completion.student_id, completion.lesson_id);
        if t.completions.contains_key(&key) {
            return Ok(false);
        }
        t.completions.insert(key, completion.clone());
        Ok(true)
    }
}

#[async_trait]
impl EnrollmentStore for MemoryStore {
    async fn find_enrollment(
        &self,
        student_id: Uuid,
        course_id: Uuid,
    ) -> Result<Option<Enrollment>> {
        Ok(self
            .tables
            .read()
            .await
            .enrollments
            .get(&(student_id, course_id))
            .cloned())
    }

    async fn enroll_if_absent(&self, enrollment: &Enrollment) -> Result<Insertion<Enrollment>> {
        let mut t = self.tables.write().await;
        let key = (enrollment.student_id, enrollment.course_id);
        if let Some(existing) = t.enrollments.get(&key) {
            return Ok(Insertion::Existing(existing.clone()));
        }
        t.enrollments.insert(key, enrollment.clone());
        Ok(Insertion::Created(enrollment.clone()))
    }

    async fn list_enrollments(&self, student_id: Uuid) -> Result<Vec<Enrollment>> {
        let t = self.tables.read().await;
        let mut rows: Vec<Enrollment> = t
            .enrollments
            .values()
            .filter(|e| e.student_id == student_id)
            .cloned()
            .collect();
        rows.sort_by_key(|e| e.created_at);
        Ok(rows)
    }

    async fn insert_payment(&self, payment: &Payment) -> Result<()> {
        self.tables.write().await.payments.push(payment.clone());
        Ok(())
    }

    async fn latest_payment(&self, student_id: Uuid, course_id: Uuid) -> Result<Option<Payment>> {
        let t = self.tables.read().await;
        Ok(t.payments
            .iter()
            .filter(|p| p.student_id == student_id && p.course_id == course_id)
            .max_by_key(|p| p.payment_date)
            .cloned())
    }

    async fn update_payment_status(
        &self,
        payment_id: Uuid,
        status: PaymentStatus,
    ) -> Result<Option<Payment>> {
        let mut t = self.tables.write().await;
        Ok(t.payments.iter_mut().find(|p| p.id == payment_id).map(|p| {
            p.status = status.as_str().to_string();
            p.clone()
        }))
    }

    async fn list_purchases(&self, student_id: Uuid) -> Result<Vec<Purchase>> {
        let t = self.tables.read().await;
        let mut rows: Vec<Purchase> = t
            .payments
            .iter()
            .filter(|p| p.student_id == student_id)
            .filter_map(|p| {
                let course = t.courses.get(&p.course_id)?;
                Some(Purchase {
                    id: p.id,
                    course_id: p.course_id,
                    course_name: course.name.clone(),
                    total_amount: p.total_amount,
                    status: p.status.clone(),
                    payment_date: p.payment_date,
                })
            })
            .collect();
        rows.sort_by(|a, b| b.payment_date.cmp(&a.payment_date));
        Ok(rows)
    }
}

#[async_trait]
impl ReviewStore for MemoryStore {
    async fn insert_review(&self, review: &Review) -> Result<()> {
        self.tables
            .write()
            .await
            .reviews
            .insert(review.id, review.clone());
        Ok(())
    }

    async fn find_review(&self, id: Uuid) -> Result<Option<Review>> {
        Ok(self.tables.read().await.reviews.get(&id).cloned())
    }

    async fn update_review(
        &self,
        id: Uuid,
        rating: i32,
        review_text: &str,
    ) -> Result<Option<Review>> {
        let mut t = self.tables.write().await;
        Ok(t.reviews.get_mut(&id).map(|r| {
            r.rating = rating;
            r.review_text = review_text.to_string();
            r.clone()
        }))
    }

    async fn list_reviews(&self, course_id: Uuid) -> Result<Vec<Review>> {
        let t = self.tables.read().await;
        let mut rows: Vec<Review> = t
            .reviews
            .values()
            .filter(|r| r.course_id == course_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }

    async fn rating_summary(&self, course_id: Uuid) -> Result<RatingSummary> {
        let t = self.tables.read().await;
        let (sum, count) = t
            .reviews
            .values()
            .filter(|r| r.course_id == course_id)
            .fold((0i64, 0i64), |(sum, n), r| (sum + i64::from(r.rating), n + 1));
        Ok(RatingSummary::from_totals(sum, count))
    }
}

#[async_trait]
impl CertificateStore for MemoryStore {
    async fn find_certificate(
        &self,
        student_id: Uuid,
        course_id: Uuid,
    ) -> Result<Option<Certificate>> {
        Ok(self
            .tables
            .read()
            .await
            .certificates
            .get(&(student_id, course_id))
            .cloned())
    }

    async fn find_certificate_by_number(&self, number: &str) -> Result<Option<Certificate>> {
        Ok(self
            .tables
            .read()
            .await
            .certificates
            .values()
            .find(|c| c.certification_number == number)
            .cloned())
    }

    async fn insert_certificate_if_absent(
        &self,
        certificate: &Certificate,
    ) -> Result<Insertion<Certificate>> {
        let mut t = self.tables.write().await;
        let key = (certificate.student_id, certificate.course_id);
        if let Some(existing) = t.certificates.get(&key) {
            return Ok(Insertion::Existing(existing.clone()));
        }
        if t
            .certificates
            .values()
            .any(|c| c.certification_number == certificate.certification_number)
        {
            return Err(StoreError::DuplicateKey(
                "certificates_certification_number_key".into(),
            ));
        }
        t.certificates.insert(key, certificate.clone());
        Ok(Insertion::Created(certificate.clone()))
    }

    async fn list_certificates(&self, student_id: Uuid) -> Result<Vec<Certificate>> {
        let t = self.tables.read().await;
        let mut rows: Vec<Certificate> = t
            .certificates
            .values()
            .filter(|c| c.student_id == student_id)
            .cloned()
            .collect();
        rows.sort_by_key(|c| (c.issue_date, c.created_at));
        Ok(rows)
    }

    async fn search_certificates(&self, query: &str) -> Result<Vec<Certificate>> {
        let needle = query.to_lowercase();
        let t = self.tables.read().await;
        let mut rows: Vec<Certificate> = t
            .certificates
            .values()
            .filter(|c| {
                let student_hit = t.students.get(&c.student_id).is_some_and(|s| {
                    contains_ci(&s.first_name, &needle)
                        || s.middle_name
                            .as_deref()
                            .is_some_and(|m| contains_ci(m, &needle))
                        || contains_ci(&s.last_name, &needle)
                        || contains_ci(&s.email, &needle)
                });
                let course_hit = t
                    .courses
                    .get(&c.course_id)
                    .is_some_and(|co| contains_ci(&co.name, &needle));
                student_hit || course_hit || contains_ci(&c.certification_number, &needle)
            })
            .cloned()
            .collect();
        rows.sort_by(|a, b| (b.issue_date, b.created_at).cmp(&(a.issue_date, a.created_at)));
        Ok(rows)
    }
}
