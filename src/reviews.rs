//! Course reviews and the rating shown beside each course.

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use crate::enrollment::{require_course, require_student};
use crate::error::AppError;
use crate::models::{EditReviewReq, RatingSummary, Review, SubmitReviewReq};
use crate::store::Store;

const MIN_RATING: i32 = 1;
const MAX_RATING: i32 = 5;

#[derive(Serialize, Debug, Clone)]
pub struct CourseReview {
    #[serde(flatten)]
    pub review: Review,
    pub student_name: String,
}

#[derive(Serialize, Debug, Clone)]
pub struct CourseReviews {
    pub course_id: Uuid,
    pub course_name: String,
    #[serde(flatten)]
    pub summary: RatingSummary,
    pub reviews: Vec<CourseReview>,
}

/// Integer ratings, as a JSON number or a numeric string, within 1..=5.
fn parse_rating(value: Option<&Value>) -> Result<i32, AppError> {
    let value = value.ok_or_else(|| AppError::BadRequest("rating is required".into()))?;
    let rating = match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
    .ok_or_else(|| AppError::BadRequest("rating must be an integer".into()))?;

    i32::try_from(rating)
        .ok()
        .filter(|r| (MIN_RATING..=MAX_RATING).contains(r))
        .ok_or_else(|| {
            AppError::BadRequest(format!("rating must be between {MIN_RATING} and {MAX_RATING}"))
        })
}

fn parse_text(text: Option<&str>) -> Result<String, AppError> {
    match text.map(str::trim) {
        Some(t) if !t.is_empty() => Ok(t.to_string()),
        _ => Err(AppError::BadRequest("review text is required".into())),
    }
}

pub async fn submit(
    store: &dyn Store,
    course_id: Uuid,
    req: &SubmitReviewReq,
) -> Result<Review, AppError> {
    let rating = parse_rating(req.rating.as_ref())?;
    let review_text = parse_text(req.review_text.as_deref())?;
    require_course(store, course_id).await?;
    require_student(store, req.student_id).await?;

    let review = Review {
        id: Uuid::new_v4(),
        student_id: req.student_id,
        course_id,
        rating,
        review_text,
        created_at: Utc::now(),
    };
    store.insert_review(&review).await?;
    info!(student_id = %req.student_id, %course_id, rating, "review submitted");
    Ok(review)
}

/// Change the text and rating of a review. Only its author may edit it.
pub async fn edit(
    store: &dyn Store,
    review_id: Uuid,
    req: &EditReviewReq,
) -> Result<Review, AppError> {
    let rating = parse_rating(req.rating.as_ref())?;
    let review_text = parse_text(req.review_text.as_deref())?;

    let existing = store
        .find_review(review_id)
        .await?
        .ok_or_else(|| AppError::NotFound("review not found".into()))?;
    if existing.student_id != req.student_id {
        return Err(AppError::Forbidden("only the author can edit a review".into()));
    }

    let review = store
        .update_review(review_id, rating, &review_text)
        .await?
        .ok_or_else(|| AppError::NotFound("review not found".into()))?;
    info!(%review_id, rating, "review edited");
    Ok(review)
}

pub async fn for_course(store: &dyn Store, course_id: Uuid) -> Result<CourseReviews, AppError> {
    let course = require_course(store, course_id).await?;
    let summary = store.rating_summary(course_id).await?;

    let mut reviews = Vec::new();
    for review in store.list_reviews(course_id).await? {
        let student_name = store
            .find_student(review.student_id)
            .await?
            .map(|s| s.full_name())
            .unwrap_or_default();
        reviews.push(CourseReview {
            review,
            student_name,
        });
    }

    Ok(CourseReviews {
        course_id: course.id,
        course_name: course.name,
        summary,
        reviews,
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn ratings_accept_integers_and_numeric_strings() {
        assert_eq!(parse_rating(Some(&json!(4))).unwrap(), 4);
        assert_eq!(parse_rating(Some(&json!(" 5 "))).unwrap(), 5);
    }

    #[test]
    fn ratings_reject_everything_else() {
        for bad in [json!(4.5), json!("four"), json!(null), json!(0), json!(6), json!(-1)] {
            let err = parse_rating(Some(&bad)).unwrap_err();
            assert!(matches!(err, AppError::BadRequest(_)), "{bad}");
        }
        assert!(matches!(parse_rating(None), Err(AppError::BadRequest(_))));
    }

    #[test]
    fn review_text_is_trimmed_and_required() {
        assert_eq!(parse_text(Some("  Great pacing ")).unwrap(), "Great pacing");
        assert!(parse_text(Some("   ")).is_err());
        assert!(parse_text(None).is_err());
    }
}
