use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Student {
    pub id: Uuid,
    pub first_name: String,
    pub middle_name: Option<String>,
    pub last_name: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

impl Student {
    /// Name as printed on certificates; blank parts are skipped.
    pub fn full_name(&self) -> String {
        [
            Some(self.first_name.as_str()),
            self.middle_name.as_deref(),
            Some(self.last_name.as_str()),
        ]
        .into_iter()
        .flatten()
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
    }
}

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Category {
    pub id: Uuid,
    pub name: String,
    pub is_free: bool,
}

/// Course row joined with its category's `is_free` flag.
#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Course {
    pub id: Uuid,
    pub category_id: Uuid,
    pub name: String,
    pub course_amount: i64, // minor currency units
    pub is_free: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Lesson {
    pub id: Uuid,
    pub course_id: Uuid,
    pub title: String,
    pub position: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct LessonCompletion {
    pub id: Uuid,
    pub student_id: Uuid,
    pub course_id: Uuid,
    pub lesson_id: Uuid,
    pub completion_date: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Enrollment {
    pub id: Uuid,
    pub student_id: Uuid,
    pub course_id: Uuid,
    pub enrollment_date: NaiveDate,
    pub created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Payment {
    pub id: Uuid,
    pub student_id: Uuid,
    pub course_id: Uuid,
    pub expected_amount: i64,
    pub total_amount: i64,
    pub sender_phone_number: Option<String>,
    pub status: String, // see PaymentStatus
    pub payment_date: DateTime<Utc>,
}

impl Payment {
    pub fn status(&self) -> Option<PaymentStatus> {
        PaymentStatus::parse(&self.status)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Approved,
    Rejected,
}

impl PaymentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Approved => "approved",
            PaymentStatus::Rejected => "rejected",
        }
    }

    pub fn parse(v: &str) -> Option<Self> {
        match v {
            "pending" => Some(PaymentStatus::Pending),
            "approved" => Some(PaymentStatus::Approved),
            "rejected" => Some(PaymentStatus::Rejected),
            _ => None,
        }
    }
}

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Certificate {
    pub id: Uuid,
    pub student_id: Uuid,
    pub course_id: Uuid,
    pub issue_date: NaiveDate,
    pub certification_number: String,
    pub created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Review {
    pub id: Uuid,
    pub student_id: Uuid,
    pub course_id: Uuid,
    pub rating: i32,
    pub review_text: String,
    pub created_at: DateTime<Utc>,
}

/// Average rating (one decimal, 0.0 with no reviews) and review count.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct RatingSummary {
    pub average_rating: f64,
    pub rating_count: u32,
}

impl RatingSummary {
    pub fn from_totals(sum: i64, count: i64) -> Self {
        if count <= 0 {
            return Self {
                average_rating: 0.0,
                rating_count: 0,
            };
        }
        let average = sum as f64 / count as f64;
        Self {
            average_rating: (average * 10.0).round() / 10.0,
            rating_count: u32::try_from(count).unwrap_or(u32::MAX),
        }
    }
}

/// Payment joined with its course's name, for a student's purchase history.
#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Purchase {
    pub id: Uuid,
    pub course_id: Uuid,
    pub course_name: String,
    pub total_amount: i64,
    pub status: String,
    pub payment_date: DateTime<Utc>,
}

// --- request bodies ---

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct EnrollReq {
    pub student_id: Uuid,
    pub course_id: Uuid,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SubmitPaymentReq {
    pub student_id: Uuid,
    pub course_id: Uuid,
    pub amount: i64,
    pub sender_phone_number: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ReviewPaymentReq {
    pub status: PaymentStatus,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CompleteLessonReq {
    pub student_id: Uuid,
    pub course_id: Uuid,
    pub lesson_id: Uuid,
}

/// `rating` is kept loose so form-style strings ("4") are accepted and a bad
/// value is a 400 rather than a body rejection.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SubmitReviewReq {
    pub student_id: Uuid,
    #[serde(default)]
    pub rating: Option<serde_json::Value>,
    #[serde(default)]
    pub review_text: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct EditReviewReq {
    pub student_id: Uuid,
    #[serde(default)]
    pub rating: Option<serde_json::Value>,
    #[serde(default)]
    pub review_text: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn student(middle: Option<&str>) -> Student {
        Student {
            id: Uuid::new_v4(),
            first_name: "Amina".into(),
            middle_name: middle.map(Into::into),
            last_name: "Yusuf".into(),
            email: "amina@example.com".into(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn full_name_skips_missing_middle_name() {
        assert_eq!(student(None).full_name(), "Amina Yusuf");
        assert_eq!(student(Some("  ")).full_name(), "Amina Yusuf");
        assert_eq!(student(Some("Bello")).full_name(), "Amina Bello Yusuf");
    }

    #[test]
    fn payment_status_round_trips_through_text() {
        for status in [
            PaymentStatus::Pending,
            PaymentStatus::Approved,
            PaymentStatus::Rejected,
        ] {
            assert_eq!(PaymentStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(PaymentStatus::parse("refunded"), None);
    }

    #[test]
    fn rating_summary_rounds_to_one_decimal() {
        let s = RatingSummary::from_totals(14, 3); // 4.666..
        assert_eq!(s.average_rating, 4.7);
        assert_eq!(s.rating_count, 3);
        assert_eq!(RatingSummary::from_totals(9, 2).average_rating, 4.5);
        assert_eq!(
            RatingSummary::from_totals(0, 0),
            RatingSummary {
                average_rating: 0.0,
                rating_count: 0
            }
        );
    }
}
