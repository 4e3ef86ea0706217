//! Enrollment ledger: which students are enrolled in which courses.
//!
//! At most one enrollment exists per (student, course). The pre-check through
//! the gate gives a clean error in the common case; the store's unique
//! constraint still decides under concurrency.

use uuid::Uuid;

use crate::error::AppError;
use crate::models::{Course, CourseSummary, EnrollmentResponse, UserResponse};
use crate::policy::{Action, Actor, EntityKind, Facts, Resource, Student, authorize};
use crate::repository::Repository;

async fn load_course(repo: &dyn Repository, course_id: Uuid) -> Result<Course, AppError> {
    repo.get_course(course_id)
        .await?
        .ok_or_else(|| AppError::not_found("Course not found."))
}

/// enroll
///
/// Creates exactly one enrollment for `student` in the course. Enrolling twice
/// is a `Conflict`, whether caught by the gate or by the store.
pub async fn enroll(
    repo: &dyn Repository,
    student: &Student,
    course_id: Uuid,
) -> Result<EnrollmentResponse, AppError> {
    let actor = Actor::Student(*student);
    let course = load_course(repo, course_id).await?;
    let enrolled = repo.is_enrolled(student.id(), course.id).await?;
    authorize(
        &actor,
        EntityKind::Course,
        Action::Enroll,
        &Facts::of(Resource::Course(&course)).enrolled(enrolled),
    )?;

    let enrollment = repo.create_enrollment(student.id(), course.id).await?;
    tracing::info!(student = %student.id(), course = %course.id, "student enrolled");

    let user = repo
        .get_user(student.id())
        .await?
        .ok_or_else(|| AppError::not_found("User not found."))?;
    let summary = repo
        .course_summary(course.id)
        .await?
        .ok_or_else(|| AppError::not_found("Course not found."))?;

    Ok(EnrollmentResponse {
        id: enrollment.id,
        student: UserResponse::from(user),
        course: summary,
        enrolled_at: enrollment.enrolled_at,
    })
}

/// unenroll
///
/// Not idempotent: removing an enrollment that does not exist is `NotFound`.
pub async fn unenroll(
    repo: &dyn Repository,
    student: &Student,
    course_id: Uuid,
) -> Result<(), AppError> {
    let actor = Actor::Student(*student);
    let course = load_course(repo, course_id).await?;
    let enrolled = repo.is_enrolled(student.id(), course.id).await?;
    authorize(
        &actor,
        EntityKind::Course,
        Action::Unenroll,
        &Facts::of(Resource::Course(&course)).enrolled(enrolled),
    )?;

    // A concurrent unenroll may have won the race since the check above.
    if !repo.delete_enrollment(student.id(), course.id).await? {
        return Err(AppError::not_found("You are not enrolled in this course."));
    }
    tracing::info!(student = %student.id(), course = %course.id, "student unenrolled");
    Ok(())
}

pub async fn is_enrolled(
    repo: &dyn Repository,
    user_id: Uuid,
    course_id: Uuid,
) -> Result<bool, AppError> {
    Ok(repo.is_enrolled(user_id, course_id).await?)
}

pub async fn student_count(repo: &dyn Repository, course_id: Uuid) -> Result<i64, AppError> {
    Ok(repo.student_count(course_id).await?)
}

/// my_courses
///
/// The student's enrolled courses, most recent enrollment first.
pub async fn my_courses(
    repo: &dyn Repository,
    student: &Student,
) -> Result<Vec<CourseSummary>, AppError> {
    Ok(repo.enrolled_courses(student.id()).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CreateCourseRequest, NewUser, Role};
    use crate::repository::InMemoryRepository;
    use std::sync::Arc;

    async fn user(repo: &InMemoryRepository, name: &str, role: Role) -> Actor {
        let created = repo
            .create_user(NewUser {
                username: name.to_string(),
                email: format!("{name}@example.com"),
                password_hash: "x".to_string(),
                first_name: String::new(),
                last_name: String::new(),
                role,
            })
            .await
            .unwrap();
        Actor::from_identity(created.id, role)
    }

    async fn course(repo: &InMemoryRepository, owner: &Actor, title: &str) -> Uuid {
        repo.create_course(
            owner.id().unwrap(),
            CreateCourseRequest {
                title: title.to_string(),
                description: "d".to_string(),
            },
        )
        .await
        .unwrap()
        .id
    }

    #[tokio::test]
    async fn double_enroll_is_conflict_and_keeps_one_row() {
        let repo = InMemoryRepository::new();
        let owner = user(&repo, "owner", Role::Instructor).await;
        let s = user(&repo, "s", Role::Student).await;
        let k = course(&repo, &owner, "Intro").await;

        let first = enroll(&repo, s.student().unwrap(), k).await.unwrap();
        assert_eq!(first.course.student_count, 1);

        let second = enroll(&repo, s.student().unwrap(), k).await;
        assert!(matches!(second, Err(AppError::Conflict(_))));
        assert_eq!(student_count(&repo, k).await.unwrap(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_enrolls_create_a_single_row() {
        let repo = Arc::new(InMemoryRepository::new());
        let owner = user(&repo, "owner", Role::Instructor).await;
        let s = user(&repo, "s", Role::Student).await;
        let k = course(&repo, &owner, "Intro").await;
        let student = *s.student().unwrap();

        let handles: Vec<_> = (0..32)
            .map(|_| {
                let repo = Arc::clone(&repo);
                tokio::spawn(async move { enroll(&*repo, &student, k).await })
            })
            .collect();

        let mut ok = 0;
        let mut conflicts = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => ok += 1,
                Err(AppError::Conflict(_)) => conflicts += 1,
                Err(other) => panic!("unexpected error: {other:?}"),
            }
        }

        assert_eq!(ok, 1);
        assert_eq!(conflicts, 31);
        assert_eq!(student_count(&*repo, k).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn unenroll_without_enrollment_is_not_found() {
        let repo = InMemoryRepository::new();
        let owner = user(&repo, "owner", Role::Instructor).await;
        let s = user(&repo, "s", Role::Student).await;
        let k = course(&repo, &owner, "Intro").await;

        let result = unenroll(&repo, s.student().unwrap(), k).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
        assert_eq!(student_count(&repo, k).await.unwrap(), 0);

        enroll(&repo, s.student().unwrap(), k).await.unwrap();
        unenroll(&repo, s.student().unwrap(), k).await.unwrap();
        assert!(!is_enrolled(&repo, s.id().unwrap(), k).await.unwrap());
    }

    #[tokio::test]
    async fn enroll_in_missing_course_is_not_found() {
        let repo = InMemoryRepository::new();
        let s = user(&repo, "s", Role::Student).await;
        let result = enroll(&repo, s.student().unwrap(), Uuid::new_v4()).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn my_courses_lists_most_recent_first() {
        let repo = InMemoryRepository::new();
        let owner = user(&repo, "owner", Role::Instructor).await;
        let s = user(&repo, "s", Role::Student).await;
        let first = course(&repo, &owner, "First").await;
        let second = course(&repo, &owner, "Second").await;
        course(&repo, &owner, "Unrelated").await;

        enroll(&repo, s.student().unwrap(), first).await.unwrap();
        enroll(&repo, s.student().unwrap(), second).await.unwrap();

        let mine = my_courses(&repo, s.student().unwrap()).await.unwrap();
        let titles: Vec<_> = mine.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(titles, vec!["Second", "First"]);
    }
}
