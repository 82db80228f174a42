//! Enrollment, manual payments and course access.
//!
//! A student has access to a course when enrolled and the course is free or
//! their latest payment for it is approved.

use chrono::Utc;
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{Course, Enrollment, Payment, PaymentStatus, Purchase, SubmitPaymentReq};
use crate::progress;
use crate::store::{Store, StoreError};

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Access {
    pub is_enrolled: bool,
    pub has_access: bool,
    pub payment_status: Option<PaymentStatus>,
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CourseStatus {
    Active,
    Completed,
    Pending,
    Rejected,
}

#[derive(Serialize, Debug, Clone)]
pub struct EnrolledCourse {
    pub course_id: Uuid,
    pub course_name: String,
    pub payment_status: Option<PaymentStatus>,
    pub total_lessons: u32,
    pub completed_lessons: u32,
    pub progress: f64,
    pub status: CourseStatus,
}

pub(crate) async fn require_course(store: &dyn Store, course_id: Uuid) -> Result<Course, AppError> {
    store
        .find_course(course_id)
        .await?
        .ok_or_else(|| AppError::NotFound("course not found".into()))
}

pub(crate) async fn require_student(store: &dyn Store, student_id: Uuid) -> Result<(), AppError> {
    store
        .find_student(student_id)
        .await?
        .map(|_| ())
        .ok_or_else(|| AppError::NotFound("student not found".into()))
}

fn new_enrollment(student_id: Uuid, course_id: Uuid) -> Enrollment {
    let now = Utc::now();
    Enrollment {
        id: Uuid::new_v4(),
        student_id,
        course_id,
        enrollment_date: now.date_naive(),
        created_at: now,
    }
}

/// Enroll in a free course. A first enrollment also records an approved
/// zero-amount payment so free and paid courses read the same way.
pub async fn enroll_free(
    store: &dyn Store,
    student_id: Uuid,
    course_id: Uuid,
) -> Result<Enrollment, AppError> {
    require_student(store, student_id).await?;
    let course = require_course(store, course_id).await?;
    if !course.is_free {
        return Err(AppError::BadRequest("course is not free".into()));
    }

    let insertion = store
        .enroll_if_absent(&new_enrollment(student_id, course_id))
        .await?;
    if insertion.created() {
        store
            .insert_payment(&Payment {
                id: Uuid::new_v4(),
                student_id,
                course_id,
                expected_amount: 0,
                total_amount: 0,
                sender_phone_number: None,
                status: PaymentStatus::Approved.as_str().to_string(),
                payment_date: Utc::now(),
            })
            .await?;
        info!(%student_id, %course_id, "enrolled in free course");
    }
    Ok(insertion.into_inner())
}

/// Record a manually entered payment as pending and make sure the student is
/// enrolled; access follows once an administrator approves it.
pub async fn submit_payment(store: &dyn Store, req: &SubmitPaymentReq) -> Result<Payment, AppError> {
    if req.amount < 0 {
        return Err(AppError::BadRequest("amount must not be negative".into()));
    }
    require_student(store, req.student_id).await?;
    let course = require_course(store, req.course_id).await?;

    let payment = Payment {
        id: Uuid::new_v4(),
        student_id: req.student_id,
        course_id: req.course_id,
        expected_amount: course.course_amount,
        total_amount: req.amount,
        sender_phone_number: req
            .sender_phone_number
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(Into::into),
        status: PaymentStatus::Pending.as_str().to_string(),
        payment_date: Utc::now(),
    };
    store.insert_payment(&payment).await?;
    store
        .enroll_if_absent(&new_enrollment(req.student_id, req.course_id))
        .await?;
    info!(
        student_id = %req.student_id,
        course_id = %req.course_id,
        amount = req.amount,
        "payment submitted"
    );
    Ok(payment)
}

pub async fn review_payment(
    store: &dyn Store,
    payment_id: Uuid,
    status: PaymentStatus,
) -> Result<Payment, AppError> {
    let payment = store
        .update_payment_status(payment_id, status)
        .await?
        .ok_or_else(|| AppError::NotFound("payment not found".into()))?;
    info!(%payment_id, status = status.as_str(), "payment reviewed");
    Ok(payment)
}

/// Every payment the student has made, newest first.
pub async fn purchase_history(store: &dyn Store, student_id: Uuid) -> Result<Vec<Purchase>, AppError> {
    require_student(store, student_id).await?;
    Ok(store.list_purchases(student_id).await?)
}

pub async fn access(
    store: &dyn Store,
    student_id: Uuid,
    course: &Course,
) -> Result<Access, StoreError> {
    let is_enrolled = store
        .find_enrollment(student_id, course.id)
        .await?
        .is_some();
    let payment_status = store
        .latest_payment(student_id, course.id)
        .await?
        .and_then(|p| p.status());
    let paid = payment_status == Some(PaymentStatus::Approved);
    Ok(Access {
        is_enrolled,
        has_access: is_enrolled && (course.is_free || paid),
        payment_status,
    })
}

fn course_status(access: &Access, complete: bool) -> CourseStatus {
    if access.has_access {
        if complete {
            CourseStatus::Completed
        } else {
            CourseStatus::Active
        }
    } else if access.payment_status == Some(PaymentStatus::Pending) {
        CourseStatus::Pending
    } else {
        CourseStatus::Rejected
    }
}

pub async fn enrolled_courses(
    store: &dyn Store,
    student_id: Uuid,
) -> Result<Vec<EnrolledCourse>, StoreError> {
    let mut out = Vec::new();
    for enrollment in store.list_enrollments(student_id).await? {
        let Some(course) = store.find_course(enrollment.course_id).await? else {
            continue;
        };
        let access = access(store, student_id, &course).await?;
        let progress = progress::track(store, student_id, course.id).await?;
        out.push(EnrolledCourse {
            course_id: course.id,
            course_name: course.name,
            payment_status: access.payment_status,
            total_lessons: progress.total_lessons,
            completed_lessons: progress.completed_lessons,
            progress: progress.percent(),
            status: course_status(&access, progress.is_complete()),
        });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn access(has_access: bool, payment_status: Option<PaymentStatus>) -> Access {
        Access {
            is_enrolled: true,
            has_access,
            payment_status,
        }
    }

    #[test]
    fn status_follows_access_then_payment() {
        let approved = access(true, Some(PaymentStatus::Approved));
        assert_eq!(course_status(&approved, false), CourseStatus::Active);
        assert_eq!(course_status(&approved, true), CourseStatus::Completed);
        assert_eq!(
            course_status(&access(false, Some(PaymentStatus::Pending)), true),
            CourseStatus::Pending
        );
        assert_eq!(
            course_status(&access(false, Some(PaymentStatus::Rejected)), false),
            CourseStatus::Rejected
        );
        assert_eq!(course_status(&access(false, None), false), CourseStatus::Rejected);
    }
}
