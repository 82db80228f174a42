//! PostgreSQL store. Schema lives in `migrations/`.

use async_trait::async_trait;
use sqlx::{query, query_as, query_scalar};
use uuid::Uuid;

use super::{
    CertificateStore, Directory, EnrollmentStore, Insertion, LessonStore, Result, ReviewStore,
    StoreError,
};
use crate::db::Db;
use crate::models::{
    Certificate, Course, Enrollment, Lesson, LessonCompletion, Payment, PaymentStatus, Purchase,
    RatingSummary, Review, Student,
};

const COURSE_COLUMNS: &str = r#"
    SELECT c.id, c.category_id, c.name, c.course_amount, cat.is_free, c.created_at
    FROM courses c
    JOIN categories cat ON cat.id = c.category_id
"#;

const REVIEW_COLUMNS: &str = "id, student_id, course_id, rating, review_text, created_at";

const CERTIFICATE_COLUMNS: &str =
    "id, student_id, course_id, issue_date, certification_number, created_at";

pub struct PgStore {
    pool: Db,
}

impl PgStore {
    pub fn new(pool: Db) -> Self {
        Self { pool }
    }
}

fn count(n: i64) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

fn like_pattern(q: &str) -> String {
    let escaped = q
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

fn map_unique(e: sqlx::Error) -> StoreError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            StoreError::DuplicateKey(db.constraint().unwrap_or("unique").to_string())
        }
        _ => StoreError::Database(e),
    }
}

#[async_trait]
impl Directory for PgStore {
    async fn find_student(&self, id: Uuid) -> Result<Option<Student>> {
        let student = query_as::<_, Student>(
            "SELECT id, first_name, middle_name, last_name, email, created_at FROM students WHERE id=$1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(student)
    }

    async fn find_course(&self, id: Uuid) -> Result<Option<Course>> {
        let course = query_as::<_, Course>(&format!("{COURSE_COLUMNS} WHERE c.id=$1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(course)
    }
}

#[async_trait]
impl LessonStore for PgStore {
    async fn find_lesson(&self, id: Uuid) -> Result<Option<Lesson>> {
        let lesson = query_as::<_, Lesson>(
            "SELECT id, course_id, title, position, created_at FROM lessons WHERE id=$1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(lesson)
    }

    async fn count_lessons(&self, course_id: Uuid) -> Result<u32> {
        let n: i64 = query_scalar("SELECT COUNT(*) FROM lessons WHERE course_id=$1")
            .bind(course_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count(n))
    }

    async fn count_completed(&self, student_id: Uuid, course_id: Uuid) -> Result<u32> {
        // join through lessons so a completion row can never count for another course
        let n: i64 = query_scalar(
            r#"
            SELECT COUNT(DISTINCT lc.lesson_id)
            FROM lesson_completions lc
            JOIN lessons l ON l.id = lc.lesson_id
            WHERE lc.student_id=$1 AND l.course_id=$2
            "#,
        )
        .bind(student_id)
        .bind(course_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count(n))
    }

    async fn record_completion(&self, c: &LessonCompletion) -> Result<bool> {
        let res = query(
            r#"
            INSERT INTO lesson_completions (id, student_id, course_id, lesson_id, completion_date)
            VALUES ($1,$2,$3,$4,$5)
            ON CONFLICT (student_id, lesson_id) DO NOTHING
            "#,
        )
        .bind(c.id)
        .bind(c.student_id)
        .bind(c.course_id)
        .bind(c.lesson_id)
        .bind(c.completion_date)
        .execute(&self.pool)
        .await?;
        Ok(res.rows_affected() == 1)
    }
}

#[async_trait]
impl EnrollmentStore for PgStore {
    async fn find_enrollment(
        &self,
        student_id: Uuid,
        course_id: Uuid,
    ) -> Result<Option<Enrollment>> {
        let enrollment = query_as::<_, Enrollment>(
            r#"
            SELECT id, student_id, course_id, enrollment_date, created_at
            FROM enrollments WHERE student_id=$1 AND course_id=$2
            "#,
        )
        .bind(student_id)
        .bind(course_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(enrollment)
    }

    async fn enroll_if_absent(&self, e: &Enrollment) -> Result<Insertion<Enrollment>> {
        let created = query_as::<_, Enrollment>(
            r#"
            INSERT INTO enrollments (id, student_id, course_id, enrollment_date, created_at)
            VALUES ($1,$2,$3,$4,$5)
            ON CONFLICT (student_id, course_id) DO NOTHING
            RETURNING id, student_id, course_id, enrollment_date, created_at
            "#,
        )
        .bind(e.id)
        .bind(e.student_id)
        .bind(e.course_id)
        .bind(e.enrollment_date)
        .bind(e.created_at)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(created) = created {
            return Ok(Insertion::Created(created));
        }
        let existing = query_as::<_, Enrollment>(
            r#"
            SELECT id, student_id, course_id, enrollment_date, created_at
            FROM enrollments WHERE student_id=$1 AND course_id=$2
            "#,
        )
        .bind(e.student_id)
        .bind(e.course_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(Insertion::Existing(existing))
    }

    async fn list_enrollments(&self, student_id: Uuid) -> Result<Vec<Enrollment>> {
        let rows = query_as::<_, Enrollment>(
            r#"
            SELECT id, student_id, course_id, enrollment_date, created_at
            FROM enrollments WHERE student_id=$1 ORDER BY created_at
            "#,
        )
        .bind(student_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn insert_payment(&self, p: &Payment) -> Result<()> {
        query(
            r#"
            INSERT INTO payments
                (id, student_id, course_id, expected_amount, total_amount,
                 sender_phone_number, status, payment_date)
            VALUES ($1,$2,$3,$4,$5,$6,$7,$8)
            "#,
        )
        .bind(p.id)
        .bind(p.student_id)
        .bind(p.course_id)
        .bind(p.expected_amount)
        .bind(p.total_amount)
        .bind(&p.sender_phone_number)
        .bind(&p.status)
        .bind(p.payment_date)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn latest_payment(&self, student_id: Uuid, course_id: Uuid) -> Result<Option<Payment>> {
        let payment = query_as::<_, Payment>(
            r#"
            SELECT id, student_id, course_id, expected_amount, total_amount,
                   sender_phone_number, status, payment_date
            FROM payments WHERE student_id=$1 AND course_id=$2
            ORDER BY payment_date DESC LIMIT 1
            "#,
        )
        .bind(student_id)
        .bind(course_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(payment)
    }

    async fn update_payment_status(
        &self,
        payment_id: Uuid,
        status: PaymentStatus,
    ) -> Result<Option<Payment>> {
        let payment = query_as::<_, Payment>(
            r#"
            UPDATE payments SET status=$2 WHERE id=$1
            RETURNING id, student_id, course_id, expected_amount, total_amount,
                      sender_phone_number, status, payment_date
            "#,
        )
        .bind(payment_id)
        .bind(status.as_str())
        .fetch_optional(&self.pool)
        .await?;
        Ok(payment)
    }

    async fn list_purchases(&self, student_id: Uuid) -> Result<Vec<Purchase>> {
        let rows = query_as::<_, Purchase>(
            r#"
            SELECT p.id, p.course_id, c.name AS course_name, p.total_amount,
                   p.status, p.payment_date
            FROM payments p
            JOIN courses c ON c.id = p.course_id
            WHERE p.student_id=$1
            ORDER BY p.payment_date DESC
            "#,
        )
        .bind(student_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

#[async_trait]
impl ReviewStore for PgStore {
    async fn insert_review(&self, r: &Review) -> Result<()> {
        query(&format!(
            "INSERT INTO reviews ({REVIEW_COLUMNS}) VALUES ($1,$2,$3,$4,$5,$6)"
        ))
        .bind(r.id)
        .bind(r.student_id)
        .bind(r.course_id)
        .bind(r.rating)
        .bind(&r.review_text)
        .bind(r.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_review(&self, id: Uuid) -> Result<Option<Review>> {
        let review = query_as::<_, Review>(&format!(
            "SELECT {REVIEW_COLUMNS} FROM reviews WHERE id=$1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(review)
    }

    async fn update_review(
        &self,
        id: Uuid,
        rating: i32,
        review_text: &str,
    ) -> Result<Option<Review>> {
        let review = query_as::<_, Review>(&format!(
            "UPDATE reviews SET rating=$2, review_text=$3 WHERE id=$1 RETURNING {REVIEW_COLUMNS}"
        ))
        .bind(id)
        .bind(rating)
        .bind(review_text)
        .fetch_optional(&self.pool)
        .await?;
        Ok(review)
    }

    async fn list_reviews(&self, course_id: Uuid) -> Result<Vec<Review>> {
        let rows = query_as::<_, Review>(&format!(
            "SELECT {REVIEW_COLUMNS} FROM reviews WHERE course_id=$1 ORDER BY created_at DESC"
        ))
        .bind(course_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn rating_summary(&self, course_id: Uuid) -> Result<RatingSummary> {
        let (sum, n): (i64, i64) = query_as(
            "SELECT COALESCE(SUM(rating), 0)::BIGINT, COUNT(*) FROM reviews WHERE course_id=$1",
        )
        .bind(course_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(RatingSummary::from_totals(sum, n))
    }
}

#[async_trait]
impl CertificateStore for PgStore {
    async fn find_certificate(
        &self,
        student_id: Uuid,
        course_id: Uuid,
    ) -> Result<Option<Certificate>> {
        let cert = query_as::<_, Certificate>(&format!(
            "SELECT {CERTIFICATE_COLUMNS} FROM certificates WHERE student_id=$1 AND course_id=$2"
        ))
        .bind(student_id)
        .bind(course_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(cert)
    }

    async fn find_certificate_by_number(&self, number: &str) -> Result<Option<Certificate>> {
        let cert = query_as::<_, Certificate>(&format!(
            "SELECT {CERTIFICATE_COLUMNS} FROM certificates WHERE certification_number=$1"
        ))
        .bind(number)
        .fetch_optional(&self.pool)
        .await?;
        Ok(cert)
    }

    async fn insert_certificate_if_absent(
        &self,
        c: &Certificate,
    ) -> Result<Insertion<Certificate>> {
        // ON CONFLICT only covers (student_id, course_id); a number clash still errors
        let created = query_as::<_, Certificate>(&format!(
            r#"
            INSERT INTO certificates ({CERTIFICATE_COLUMNS})
            VALUES ($1,$2,$3,$4,$5,$6)
            ON CONFLICT (student_id, course_id) DO NOTHING
            RETURNING {CERTIFICATE_COLUMNS}
            "#
        ))
        .bind(c.id)
        .bind(c.student_id)
        .bind(c.course_id)
        .bind(c.issue_date)
        .bind(&c.certification_number)
        .bind(c.created_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_unique)?;

        if let Some(created) = created {
            return Ok(Insertion::Created(created));
        }
        let existing = query_as::<_, Certificate>(&format!(
            "SELECT {CERTIFICATE_COLUMNS} FROM certificates WHERE student_id=$1 AND course_id=$2"
        ))
        .bind(c.student_id)
        .bind(c.course_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(Insertion::Existing(existing))
    }

    async fn list_certificates(&self, student_id: Uuid) -> Result<Vec<Certificate>> {
        let rows = query_as::<_, Certificate>(&format!(
            "SELECT {CERTIFICATE_COLUMNS} FROM certificates WHERE student_id=$1 ORDER BY issue_date, created_at"
        ))
        .bind(student_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn search_certificates(&self, q: &str) -> Result<Vec<Certificate>> {
        let rows = query_as::<_, Certificate>(
            r#"
            SELECT ce.id, ce.student_id, ce.course_id, ce.issue_date,
                   ce.certification_number, ce.created_at
            FROM certificates ce
            JOIN students s ON s.id = ce.student_id
            JOIN courses c ON c.id = ce.course_id
            WHERE s.first_name ILIKE $1
               OR s.middle_name ILIKE $1
               OR s.last_name ILIKE $1
               OR s.email ILIKE $1
               OR ce.certification_number ILIKE $1
               OR c.name ILIKE $1
            ORDER BY ce.issue_date DESC, ce.created_at DESC
            "#,
        )
        .bind(like_pattern(q))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("ami"), "%ami%");
        assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
        assert_eq!(like_pattern("a\\b"), "%a\\\\b%");
    }

    #[test]
    fn count_saturates() {
        assert_eq!(count(4), 4);
        assert_eq!(count(i64::MAX), u32::MAX);
    }
}
