use serde::Serialize;
use uuid::Uuid;

use crate::store::{LessonStore, Result};

/// Lesson counts for one student in one course. Derived on every read,
/// never stored.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub total_lessons: u32,
    pub completed_lessons: u32,
}

impl Progress {
    pub fn new(total_lessons: u32, completed_lessons: u32) -> Self {
        Self {
            total_lessons,
            completed_lessons,
        }
    }

    /// Completion in `[0, 100]`; a course without lessons is at 0.
    pub fn percent(&self) -> f64 {
        if self.total_lessons == 0 {
            return 0.0;
        }
        let done = self.completed_lessons.min(self.total_lessons);
        f64::from(done) / f64::from(self.total_lessons) * 100.0
    }

    pub fn is_complete(&self) -> bool {
        self.total_lessons > 0 && self.completed_lessons == self.total_lessons
    }
}

pub async fn track<S>(store: &S, student_id: Uuid, course_id: Uuid) -> Result<Progress>
where
    S: LessonStore + ?Sized,
{
    let total = store.count_lessons(course_id).await?;
    let completed = store.count_completed(student_id, course_id).await?;
    Ok(Progress::new(total, completed))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_course_is_zero_and_never_complete() {
        let p = Progress::new(0, 0);
        assert_eq!(p.percent(), 0.0);
        assert!(!p.is_complete());
    }

    #[test]
    fn percent_tracks_completed_share() {
        assert_eq!(Progress::new(4, 1).percent(), 25.0);
        assert!((Progress::new(3, 1).percent() - 33.333).abs() < 1e-3);
        assert_eq!(Progress::new(4, 4).percent(), 100.0);
        assert!(Progress::new(4, 4).is_complete());
        assert!(!Progress::new(4, 3).is_complete());
    }

    #[test]
    fn percent_is_clamped() {
        assert_eq!(Progress::new(2, 5).percent(), 100.0);
    }
}
