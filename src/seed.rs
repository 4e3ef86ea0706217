//! Demo data for local runs (`SEED_DEMO=true`).
//!
//! Goes through the regular operations, so the seeded rows satisfy the same
//! validation and authorization rules as user-created ones.

use serde_json::json;

use crate::{
    accounts, courses, ledger,
    config::AppConfig,
    error::AppError,
    models::{CreateChapterRequest, CreateCourseRequest, RegisterUserRequest, UpdateProfileRequest},
    policy::Actor,
    repository::Repository,
};

pub const DEMO_INSTRUCTOR: &str = "instructor";
pub const DEMO_STUDENT: &str = "student";
pub const DEMO_COURSE_TITLE: &str = "Intro to Demo LMS";

async fn demo_user(
    repo: &dyn Repository,
    config: &AppConfig,
    username: &str,
    password: &str,
    role: &str,
) -> Result<Actor, AppError> {
    let session = accounts::register(
        repo,
        config,
        RegisterUserRequest {
            username: username.to_string(),
            email: format!("{username}@example.com"),
            password: password.to_string(),
            first_name: String::new(),
            last_name: String::new(),
            role: role.to_string(),
        },
    )
    .await?;
    let user = session
        .user
        .ok_or_else(|| AppError::Internal("registration returned no user".to_string()))?;
    let actor = Actor::from_identity(user.id, user.profile.role);

    accounts::update_profile(
        repo,
        &actor,
        UpdateProfileRequest {
            bio: Some(format!("Demo {role} account")),
            ..Default::default()
        },
    )
    .await?;
    Ok(actor)
}

fn paragraph(text: &str) -> serde_json::Value {
    json!({ "type": "p", "children": [{ "text": text }] })
}

/// seed_demo
///
/// Creates the demo instructor and student, one course with three chapters
/// (the second one private) and enrolls the student. Returns `false` without
/// touching anything when the demo instructor already exists.
pub async fn seed_demo(repo: &dyn Repository, config: &AppConfig) -> Result<bool, AppError> {
    if repo.find_user_by_username(DEMO_INSTRUCTOR).await?.is_some() {
        tracing::info!("demo data already present, skipping seed");
        return Ok(false);
    }

    let instructor =
        demo_user(repo, config, DEMO_INSTRUCTOR, "InstructorPass123!", "instructor").await?;
    let student = demo_user(repo, config, DEMO_STUDENT, "StudentPass123!", "student").await?;

    let course = courses::create_course(
        repo,
        instructor.instructor()?,
        CreateCourseRequest {
            title: DEMO_COURSE_TITLE.to_string(),
            description: "A short demo course to explore courses, chapters and enrollment."
                .to_string(),
        },
    )
    .await?;

    let chapters = [
        (
            "Welcome (Public)",
            json!([
                { "type": "h2", "children": [{ "text": "Welcome" }] },
                paragraph("This is a public chapter visible to everyone."),
            ]),
            true,
        ),
        (
            "Private Instructor Notes",
            json!([paragraph("This chapter is private and visible only to enrolled students.")]),
            false,
        ),
        (
            "Resources (Public)",
            json!([paragraph("Here are some useful resources and links.")]),
            true,
        ),
    ];
    for (order, (title, content, is_public)) in (1..).zip(chapters) {
        courses::create_chapter(
            repo,
            instructor.instructor()?,
            course.id,
            CreateChapterRequest {
                title: title.to_string(),
                content,
                order,
                is_public,
            },
        )
        .await?;
    }

    ledger::enroll(repo, student.student()?, course.id).await?;

    tracing::info!(course = %course.id, "demo data seeded");
    Ok(true)
}
