use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Response},
    routing::{get, patch, post, put},
    Json, Router,
};
use chrono::Utc;
use http::header;
use serde::Serialize;
use tower_http::services::ServeDir;
use uuid::Uuid;

use crate::{
    certificate::{CertificateSummary, ErrorKind},
    enrollment::{self, CourseStatus, EnrolledCourse},
    error::AppError,
    models::*,
    progress,
    reviews::{self, CourseReviews},
    state::AppState,
};

pub fn router(state: AppState) -> Router {
    let mut router = Router::new()
        // enrollment + payments
        .route("/api/enrollments/free", post(enroll_free))
        .route("/api/payments", post(submit_payment))
        .route("/api/payments/:payment_id", patch(review_payment))
        .route("/api/students/:student_id/courses", get(enrolled_courses))
        .route("/api/students/:student_id/payments", get(purchase_history))
        // reviews
        .route(
            "/api/courses/:course_id/reviews",
            get(course_reviews).post(submit_review),
        )
        .route("/api/reviews/:review_id", put(edit_review))
        // progress
        .route("/api/lessons/complete", post(complete_lesson))
        .route(
            "/api/students/:student_id/courses/:course_id/progress",
            get(course_progress),
        )
        // certificates
        .route(
            "/api/students/:student_id/certificates",
            get(student_certificates),
        )
        .route("/api/certificates/search", get(search_certificates))
        .route(
            "/api/certificates/:certification_number/download",
            get(download_certificate),
        );

    // an absolute MEDIA_URL means media is served by someone else
    if state.media_url.starts_with('/') && state.media_url.len() > 1 {
        router = router.nest_service(&state.media_url, ServeDir::new(&state.media_root));
    }
    router.with_state(state)
}

async fn enroll_free(
    State(st): State<AppState>,
    Json(req): Json<EnrollReq>,
) -> Result<Json<Enrollment>, AppError> {
    let enrollment = enrollment::enroll_free(st.store.as_ref(), req.student_id, req.course_id).await?;
    Ok(Json(enrollment))
}

async fn submit_payment(
    State(st): State<AppState>,
    Json(req): Json<SubmitPaymentReq>,
) -> Result<Json<Payment>, AppError> {
    Ok(Json(enrollment::submit_payment(st.store.as_ref(), &req).await?))
}

async fn review_payment(
    State(st): State<AppState>,
    Path(payment_id): Path<Uuid>,
    Json(req): Json<ReviewPaymentReq>,
) -> Result<Json<Payment>, AppError> {
    Ok(Json(
        enrollment::review_payment(st.store.as_ref(), payment_id, req.status).await?,
    ))
}

#[derive(Serialize)]
struct PurchasesResp {
    purchases: Vec<Purchase>,
}

async fn purchase_history(
    State(st): State<AppState>,
    Path(student_id): Path<Uuid>,
) -> Result<Json<PurchasesResp>, AppError> {
    let purchases = enrollment::purchase_history(st.store.as_ref(), student_id).await?;
    Ok(Json(PurchasesResp { purchases }))
}

async fn submit_review(
    State(st): State<AppState>,
    Path(course_id): Path<Uuid>,
    Json(req): Json<SubmitReviewReq>,
) -> Result<Json<Review>, AppError> {
    Ok(Json(reviews::submit(st.store.as_ref(), course_id, &req).await?))
}

async fn edit_review(
    State(st): State<AppState>,
    Path(review_id): Path<Uuid>,
    Json(req): Json<EditReviewReq>,
) -> Result<Json<Review>, AppError> {
    Ok(Json(reviews::edit(st.store.as_ref(), review_id, &req).await?))
}

async fn course_reviews(
    State(st): State<AppState>,
    Path(course_id): Path<Uuid>,
) -> Result<Json<CourseReviews>, AppError> {
    Ok(Json(reviews::for_course(st.store.as_ref(), course_id).await?))
}

#[derive(Serialize)]
struct EnrolledCoursesResp {
    all_courses: Vec<EnrolledCourse>,
    active_courses: usize,
    completed_courses: usize,
}

async fn enrolled_courses(
    State(st): State<AppState>,
    Path(student_id): Path<Uuid>,
) -> Result<Json<EnrolledCoursesResp>, AppError> {
    let all_courses = enrollment::enrolled_courses(st.store.as_ref(), student_id).await?;
    let count = |status: CourseStatus| all_courses.iter().filter(|c| c.status == status).count();
    Ok(Json(EnrolledCoursesResp {
        active_courses: count(CourseStatus::Active),
        completed_courses: count(CourseStatus::Completed),
        all_courses,
    }))
}

#[derive(Serialize)]
struct CompletionResp {
    success: bool,
    progress: f64,
    completed_lessons: u32,
    total_lessons: u32,
    certificate_url: Option<String>,
    certificate_error: Option<ErrorKind>,
}

async fn complete_lesson(
    State(st): State<AppState>,
    Json(req): Json<CompleteLessonReq>,
) -> Result<Json<CompletionResp>, AppError> {
    let lesson = st
        .store
        .find_lesson(req.lesson_id)
        .await?
        .ok_or_else(|| AppError::NotFound("lesson not found".into()))?;
    if lesson.course_id != req.course_id {
        return Err(AppError::BadRequest("lesson does not belong to this course".into()));
    }
    let course = st
        .store
        .find_course(req.course_id)
        .await?
        .ok_or_else(|| AppError::NotFound("course not found".into()))?;

    let access = enrollment::access(st.store.as_ref(), req.student_id, &course).await?;
    if !access.is_enrolled {
        return Err(AppError::Forbidden("student is not enrolled in this course".into()));
    }
    if !access.has_access {
        return Err(AppError::Forbidden("payment for this course is not approved".into()));
    }

    let recorded = st
        .store
        .record_completion(&LessonCompletion {
            id: Uuid::new_v4(),
            student_id: req.student_id,
            course_id: req.course_id,
            lesson_id: req.lesson_id,
            completion_date: Utc::now(),
        })
        .await?;
    if !recorded {
        return Err(AppError::BadRequest("Lesson already completed.".into()));
    }
    tracing::info!(student_id = %req.student_id, lesson_id = %req.lesson_id, "lesson completed");

    let outcome = st
        .certificates
        .on_lesson_completed(req.student_id, req.course_id)
        .await?;
    let (certificate_url, certificate_error) = match outcome.certificate {
        None => (None, None),
        Some(Ok(issued)) => (Some(issued.artifact.url), None),
        Some(Err(e)) => (None, Some(e.kind())),
    };

    Ok(Json(CompletionResp {
        success: true,
        progress: outcome.progress.percent(),
        completed_lessons: outcome.progress.completed_lessons,
        total_lessons: outcome.progress.total_lessons,
        certificate_url,
        certificate_error,
    }))
}

#[derive(Serialize)]
struct ProgressResp {
    course_id: Uuid,
    course_name: String,
    is_enrolled: bool,
    has_access: bool,
    payment_status: Option<PaymentStatus>,
    progress: f64,
    completed_lessons: u32,
    total_lessons: u32,
    certificate_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    certificate_error: Option<ErrorKind>,
}

async fn course_progress(
    State(st): State<AppState>,
    Path((student_id, course_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<ProgressResp>, AppError> {
    let course = st
        .store
        .find_course(course_id)
        .await?
        .ok_or_else(|| AppError::NotFound("course not found".into()))?;
    let access = enrollment::access(st.store.as_ref(), student_id, &course).await?;
    let progress = progress::track(st.store.as_ref(), student_id, course_id).await?;

    let (mut certificate_url, mut certificate_error) = (None, None);
    // same gate as lesson completion: no certificate without access
    if access.has_access && progress.is_complete() {
        match st.certificates.issue(student_id, course_id).await {
            Ok(issued) => certificate_url = Some(issued.artifact.url),
            Err(e) => {
                tracing::warn!(%student_id, %course_id, error = %e, "certificate unavailable");
                certificate_error = Some(e.kind());
            }
        }
    }

    Ok(Json(ProgressResp {
        course_id: course.id,
        course_name: course.name,
        is_enrolled: access.is_enrolled,
        has_access: access.has_access,
        payment_status: access.payment_status,
        progress: progress.percent(),
        completed_lessons: progress.completed_lessons,
        total_lessons: progress.total_lessons,
        certificate_url,
        certificate_error,
    }))
}

#[derive(Serialize)]
struct CertificatesResp {
    certificates: Vec<CertificateSummary>,
}

async fn student_certificates(
    State(st): State<AppState>,
    Path(student_id): Path<Uuid>,
) -> Result<Json<CertificatesResp>, AppError> {
    let certificates = st.certificates.list_for_student(student_id).await?;
    Ok(Json(CertificatesResp { certificates }))
}

#[derive(Serialize)]
struct SearchResp {
    query: String,
    certificates: Vec<CertificateSummary>,
}

async fn search_certificates(
    State(st): State<AppState>,
    Query(SearchQuery { q }): Query<SearchQuery>,
) -> Result<Json<SearchResp>, AppError> {
    let certificates = st.certificates.search(&q).await?;
    Ok(Json(SearchResp {
        query: q.trim().to_string(),
        certificates,
    }))
}

async fn download_certificate(
    State(st): State<AppState>,
    Path(certification_number): Path<String>,
) -> Result<Response, AppError> {
    let artifact = st
        .certificates
        .download(&certification_number)
        .await?
        .ok_or_else(|| AppError::NotFound("certificate not found".into()))?;
    let bytes = tokio::fs::read(&artifact.path).await?;

    let headers = [
        (header::CONTENT_TYPE, "application/pdf".to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", artifact.file_name),
        ),
    ];
    Ok((headers, bytes).into_response())
}
