//! Postgres-backed repository tests. They need a disposable database:
//!
//! ```sh
//! DATABASE_URL=postgres://... cargo test -- --ignored
//! ```

use course_portal::{
    models::{CreateChapterRequest, CreateCourseRequest, NewUser, Role, UpdateChapterRequest, User},
    policy::ChapterScope,
    repository::{
        CHAPTER_ORDER_UNIQUE, ENROLLMENT_UNIQUE, PostgresRepository, Repository, StoreError,
        USERNAME_UNIQUE,
    },
};
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

// --- Test Context and Setup ---

struct DbTestContext {
    pool: PgPool,
}

impl DbTestContext {
    async fn setup() -> Self {
        dotenv::dotenv().ok();

        let db_url = std::env::var("DATABASE_URL")
            .expect("DATABASE_URL must be set to run integration tests");

        let pool = PgPool::connect(&db_url)
            .await
            .expect("Failed to connect to database for integration tests.");

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .expect("Failed to run database migrations.");

        DbTestContext { pool }
    }

    fn repository(&self) -> PostgresRepository {
        PostgresRepository::new(self.pool.clone())
    }
}

// --- Test Data Helpers ---

/// Unique per call so tests can share one database.
async fn create_test_user(repo: &PostgresRepository, role: Role) -> User {
    let tag = Uuid::new_v4().simple().to_string();
    repo.create_user(NewUser {
        username: format!("{}-{}", role.as_str(), &tag[..12]),
        email: format!("{tag}@test.com"),
        password_hash: "hash".to_string(),
        first_name: String::new(),
        last_name: String::new(),
        role,
    })
    .await
    .expect("Failed to create test user")
}

fn chapter(title: &str, order: i32, is_public: bool) -> CreateChapterRequest {
    CreateChapterRequest {
        title: title.to_string(),
        content: json!([{ "type": "p", "children": [{ "text": title }] }]),
        order,
        is_public,
    }
}

// --- Tests ---

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_duplicate_username_reports_constraint() {
    let ctx = DbTestContext::setup().await;
    let repo = ctx.repository();
    let user = create_test_user(&repo, Role::Student).await;

    let err = repo
        .create_user(NewUser {
            username: user.username.clone(),
            email: format!("{}@other.com", Uuid::new_v4()),
            password_hash: "hash".to_string(),
            first_name: String::new(),
            last_name: String::new(),
            role: Role::Student,
        })
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        StoreError::UniqueViolation { ref constraint } if constraint == USERNAME_UNIQUE
    ));
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_chapter_order_unique_and_scoped_listing() {
    let ctx = DbTestContext::setup().await;
    let repo = ctx.repository();
    let owner = create_test_user(&repo, Role::Instructor).await;
    let course = repo
        .create_course(
            owner.id,
            CreateCourseRequest {
                title: "Intro".to_string(),
                description: "Basics".to_string(),
            },
        )
        .await
        .unwrap();

    repo.create_chapter(course.id, chapter("B", 2, false)).await.unwrap();
    repo.create_chapter(course.id, chapter("A", 1, true)).await.unwrap();

    let err = repo.create_chapter(course.id, chapter("Dup", 1, true)).await.unwrap_err();
    assert!(matches!(
        err,
        StoreError::UniqueViolation { ref constraint } if constraint == CHAPTER_ORDER_UNIQUE
    ));

    let all = repo.list_chapters(course.id, ChapterScope::All).await.unwrap();
    assert_eq!(all.iter().map(|c| c.order).collect::<Vec<_>>(), vec![1, 2]);
    assert_eq!(all[0].content[0]["children"][0]["text"], "A");

    let public = repo.list_chapters(course.id, ChapterScope::PublicOnly).await.unwrap();
    assert_eq!(public.len(), 1);
    assert_eq!(public[0].title, "A");

    let renumbered = repo
        .update_chapter(
            all[1].id,
            UpdateChapterRequest {
                order: Some(3),
                ..Default::default()
            },
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(renumbered.order, 3);
    assert_eq!(renumbered.title, "B");
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_enrollment_unique_and_cascade() {
    let ctx = DbTestContext::setup().await;
    let repo = ctx.repository();
    let owner = create_test_user(&repo, Role::Instructor).await;
    let student = create_test_user(&repo, Role::Student).await;
    let course = repo
        .create_course(
            owner.id,
            CreateCourseRequest {
                title: "Cascade".to_string(),
                description: "Goes away".to_string(),
            },
        )
        .await
        .unwrap();
    let ch = repo.create_chapter(course.id, chapter("Only", 1, true)).await.unwrap();

    repo.create_enrollment(student.id, course.id).await.unwrap();
    let err = repo.create_enrollment(student.id, course.id).await.unwrap_err();
    assert!(matches!(
        err,
        StoreError::UniqueViolation { ref constraint } if constraint == ENROLLMENT_UNIQUE
    ));
    assert_eq!(repo.student_count(course.id).await.unwrap(), 1);

    let summary = repo.course_summary(course.id).await.unwrap().unwrap();
    assert_eq!(summary.student_count, 1);
    assert_eq!(summary.chapter_count, 1);
    assert_eq!(summary.created_by.username, owner.username);

    let mine = repo.enrolled_courses(student.id).await.unwrap();
    assert_eq!(mine.len(), 1);

    assert!(repo.delete_course(course.id).await.unwrap());
    assert!(repo.get_chapter(ch.id).await.unwrap().is_none());
    assert!(!repo.is_enrolled(student.id, course.id).await.unwrap());
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_revoked_tokens_purge_expired() {
    let ctx = DbTestContext::setup().await;
    let repo = ctx.repository();
    let stale = Uuid::new_v4();
    let live = Uuid::new_v4();
    let later = chrono::Utc::now() + chrono::Duration::minutes(60);

    assert!(!repo.is_token_revoked(live).await.unwrap());
    repo.revoke_token(stale, chrono::Utc::now() - chrono::Duration::minutes(5))
        .await
        .unwrap();
    repo.revoke_token(live, later).await.unwrap();
    // Revoking twice is harmless.
    repo.revoke_token(live, later).await.unwrap();

    assert!(repo.is_token_revoked(live).await.unwrap());
    assert!(!repo.is_token_revoked(stale).await.unwrap());
}
