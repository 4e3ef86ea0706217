use crate::models::{
    Chapter, Course, CourseSummary, CourseSummaryRow, CreateChapterRequest, CreateCourseRequest,
    Enrollment, NewUser, UpdateChapterRequest, UpdateCourseRequest, UpdateProfileRequest, User,
};
use crate::policy::ChapterScope;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, query_builder::QueryBuilder};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use uuid::Uuid;

// --- Constraint Names ---
// Shared by the migrations and the in-memory store so both report identical
// uniqueness violations.

pub const USERNAME_UNIQUE: &str = "users_username_key";
pub const EMAIL_UNIQUE: &str = "users_email_key";
pub const CHAPTER_ORDER_UNIQUE: &str = "chapters_course_id_sort_order_key";
pub const ENROLLMENT_UNIQUE: &str = "enrollments_student_id_course_id_key";
pub const CHAPTER_COURSE_FK: &str = "chapters_course_id_fkey";
pub const ENROLLMENT_COURSE_FK: &str = "enrollments_course_id_fkey";

/// StoreError
///
/// Failures of the persistence layer. Uniqueness and reference violations are
/// split out because the core turns them into `Conflict` / `NotFound`; every
/// other failure is passed through untouched.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unique constraint `{constraint}` violated")]
    UniqueViolation { constraint: String },

    #[error("foreign key constraint `{constraint}` violated")]
    ForeignKeyViolation { constraint: String },

    #[error("database error: {0}")]
    Database(#[source] sqlx::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let Some(db_err) = err.as_database_error() {
            let constraint = db_err.constraint().unwrap_or_default().to_string();
            if db_err.is_unique_violation() {
                return StoreError::UniqueViolation { constraint };
            }
            if db_err.is_foreign_key_violation() {
                return StoreError::ForeignKeyViolation { constraint };
            }
        }
        StoreError::Database(err)
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Repository Trait
///
/// Abstract contract for every persistence operation. Handlers and core
/// operations only ever see `Arc<dyn Repository>`, so the Postgres store and the
/// in-memory store are interchangeable.
///
/// Every write that must stay unique (username, email, chapter order per course,
/// enrollment per student and course) is guarded by the store itself and
/// reported as `StoreError::UniqueViolation`; callers never rely on a
/// check-then-insert sequence alone.
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Users ---
    async fn create_user(&self, user: NewUser) -> StoreResult<User>;
    async fn get_user(&self, id: Uuid) -> StoreResult<Option<User>>;
    async fn find_user_by_username(&self, username: &str) -> StoreResult<Option<User>>;
    async fn update_user(&self, id: Uuid, req: UpdateProfileRequest) -> StoreResult<Option<User>>;

    // --- Refresh token blacklist ---
    async fn revoke_token(&self, jti: Uuid, expires_at: DateTime<Utc>) -> StoreResult<()>;
    async fn is_token_revoked(&self, jti: Uuid) -> StoreResult<bool>;

    // --- Courses ---
    // Ordered by creation time, newest first.
    async fn list_courses(&self, instructor_id: Option<Uuid>) -> StoreResult<Vec<CourseSummary>>;
    async fn get_course(&self, id: Uuid) -> StoreResult<Option<Course>>;
    async fn course_summary(&self, id: Uuid) -> StoreResult<Option<CourseSummary>>;
    async fn create_course(&self, owner: Uuid, req: CreateCourseRequest) -> StoreResult<Course>;
    async fn update_course(
        &self,
        id: Uuid,
        req: UpdateCourseRequest,
    ) -> StoreResult<Option<Course>>;
    // Cascades to the course's chapters and enrollments.
    async fn delete_course(&self, id: Uuid) -> StoreResult<bool>;

    // --- Enrollment ledger ---
    async fn create_enrollment(&self, student_id: Uuid, course_id: Uuid) -> StoreResult<Enrollment>;
    async fn delete_enrollment(&self, student_id: Uuid, course_id: Uuid) -> StoreResult<bool>;
    async fn is_enrolled(&self, user_id: Uuid, course_id: Uuid) -> StoreResult<bool>;
    async fn student_count(&self, course_id: Uuid) -> StoreResult<i64>;
    // Ordered by enrollment time, most recent first.
    async fn enrolled_courses(&self, student_id: Uuid) -> StoreResult<Vec<CourseSummary>>;

    // --- Chapters ---
    // Always ordered by `order` ascending.
    async fn list_chapters(
        &self,
        course_id: Uuid,
        scope: ChapterScope,
    ) -> StoreResult<Vec<Chapter>>;
    async fn get_chapter(&self, id: Uuid) -> StoreResult<Option<Chapter>>;
    async fn create_chapter(
        &self,
        course_id: Uuid,
        req: CreateChapterRequest,
    ) -> StoreResult<Chapter>;
    async fn update_chapter(
        &self,
        id: Uuid,
        req: UpdateChapterRequest,
    ) -> StoreResult<Option<Chapter>>;
    async fn delete_chapter(&self, id: Uuid) -> StoreResult<bool>;
}

/// RepositoryState
///
/// The concrete type used to share the persistence layer across the application state.
pub type RepositoryState = Arc<dyn Repository>;

const USER_COLUMNS: &str =
    "id, username, email, password_hash, first_name, last_name, role, bio, created_at";
const COURSE_COLUMNS: &str = "id, title, description, created_by, created_at, updated_at";
const CHAPTER_COLUMNS: &str =
    "id, course_id, title, content, sort_order, is_public, created_at, updated_at";
const ENROLLMENT_COLUMNS: &str = "id, student_id, course_id, enrolled_at";

const COURSE_SUMMARY_SELECT: &str = r#"
    SELECT
        c.id, c.title, c.description, c.created_at,
        u.id AS creator_id, u.username AS creator_username,
        (SELECT COUNT(*) FROM enrollments e WHERE e.course_id = c.id) AS student_count,
        (SELECT COUNT(*) FROM chapters ch WHERE ch.course_id = c.id) AS chapter_count
    FROM courses c
    JOIN users u ON u.id = c.created_by
"#;

/// PostgresRepository
///
/// The concrete implementation of the `Repository` trait, backed by PostgreSQL.
/// Uniqueness is enforced by the constraints declared in `migrations/`.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    /// Creates a new repository instance using the initialized connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Repository for PostgresRepository {
    async fn create_user(&self, user: NewUser) -> StoreResult<User> {
        let sql = format!(
            "INSERT INTO users \
             (id, username, email, password_hash, first_name, last_name, role, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, NOW()) RETURNING {USER_COLUMNS}"
        );
        let created = sqlx::query_as::<_, User>(&sql)
            .bind(Uuid::new_v4())
            .bind(user.username)
            .bind(user.email)
            .bind(user.password_hash)
            .bind(user.first_name)
            .bind(user.last_name)
            .bind(user.role)
            .fetch_one(&self.pool)
            .await?;
        Ok(created)
    }

    async fn get_user(&self, id: Uuid) -> StoreResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        Ok(sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn find_user_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE username = $1");
        Ok(sqlx::query_as::<_, User>(&sql)
            .bind(username)
            .fetch_optional(&self.pool)
            .await?)
    }

    /// update_user
    ///
    /// Uses `COALESCE` so only fields present in the request change.
    async fn update_user(&self, id: Uuid, req: UpdateProfileRequest) -> StoreResult<Option<User>> {
        let sql = format!(
            r#"
            UPDATE users
            SET email = COALESCE($2, email),
                first_name = COALESCE($3, first_name),
                last_name = COALESCE($4, last_name),
                bio = COALESCE($5, bio)
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        );
        Ok(sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .bind(req.email)
            .bind(req.first_name)
            .bind(req.last_name)
            .bind(req.bio)
            .fetch_optional(&self.pool)
            .await?)
    }

    /// revoke_token
    ///
    /// Also purges entries whose token has expired, so the blacklist stays
    /// bounded by the refresh TTL.
    async fn revoke_token(&self, jti: Uuid, expires_at: DateTime<Utc>) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM revoked_tokens WHERE expires_at < NOW()")
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "INSERT INTO revoked_tokens (jti, expires_at) VALUES ($1, $2) \
             ON CONFLICT (jti) DO NOTHING",
        )
        .bind(jti)
        .bind(expires_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn is_token_revoked(&self, jti: Uuid) -> StoreResult<bool> {
        Ok(sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM revoked_tokens WHERE jti = $1)",
        )
        .bind(jti)
        .fetch_one(&self.pool)
        .await?)
    }

    /// list_courses
    ///
    /// Optional instructor filter, built with QueryBuilder so the filter value is
    /// always a bound parameter.
    async fn list_courses(&self, instructor_id: Option<Uuid>) -> StoreResult<Vec<CourseSummary>> {
        let mut builder: QueryBuilder<sqlx::Postgres> = QueryBuilder::new(COURSE_SUMMARY_SELECT);

        if let Some(instructor) = instructor_id {
            builder.push(" WHERE c.created_by = ");
            builder.push_bind(instructor);
        }

        builder.push(" ORDER BY c.created_at DESC");

        let rows = builder
            .build_query_as::<CourseSummaryRow>()
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(CourseSummary::from).collect())
    }

    async fn get_course(&self, id: Uuid) -> StoreResult<Option<Course>> {
        let sql = format!("SELECT {COURSE_COLUMNS} FROM courses WHERE id = $1");
        Ok(sqlx::query_as::<_, Course>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn course_summary(&self, id: Uuid) -> StoreResult<Option<CourseSummary>> {
        let mut builder: QueryBuilder<sqlx::Postgres> = QueryBuilder::new(COURSE_SUMMARY_SELECT);
        builder.push(" WHERE c.id = ");
        builder.push_bind(id);

        let row = builder
            .build_query_as::<CourseSummaryRow>()
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(CourseSummary::from))
    }

    async fn create_course(&self, owner: Uuid, req: CreateCourseRequest) -> StoreResult<Course> {
        let sql = format!(
            "INSERT INTO courses (id, title, description, created_by, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, NOW(), NOW()) RETURNING {COURSE_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, Course>(&sql)
            .bind(Uuid::new_v4())
            .bind(req.title)
            .bind(req.description)
            .bind(owner)
            .fetch_one(&self.pool)
            .await?)
    }

    async fn update_course(
        &self,
        id: Uuid,
        req: UpdateCourseRequest,
    ) -> StoreResult<Option<Course>> {
        let sql = format!(
            r#"
            UPDATE courses
            SET title = COALESCE($2, title),
                description = COALESCE($3, description),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {COURSE_COLUMNS}
            "#
        );
        Ok(sqlx::query_as::<_, Course>(&sql)
            .bind(id)
            .bind(req.title)
            .bind(req.description)
            .fetch_optional(&self.pool)
            .await?)
    }

    /// delete_course
    ///
    /// Chapters and enrollments go with it through `ON DELETE CASCADE`.
    async fn delete_course(&self, id: Uuid) -> StoreResult<bool> {
        let res = sqlx::query("DELETE FROM courses WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    /// create_enrollment
    ///
    /// A plain INSERT: a duplicate (student, course) pair hits the unique
    /// constraint and comes back as `UniqueViolation`, never as a silent no-op.
    async fn create_enrollment(
        &self,
        student_id: Uuid,
        course_id: Uuid,
    ) -> StoreResult<Enrollment> {
        let sql = format!(
            "INSERT INTO enrollments (id, student_id, course_id, enrolled_at) \
             VALUES ($1, $2, $3, NOW()) RETURNING {ENROLLMENT_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, Enrollment>(&sql)
            .bind(Uuid::new_v4())
            .bind(student_id)
            .bind(course_id)
            .fetch_one(&self.pool)
            .await?)
    }

    async fn delete_enrollment(&self, student_id: Uuid, course_id: Uuid) -> StoreResult<bool> {
        let res = sqlx::query("DELETE FROM enrollments WHERE student_id = $1 AND course_id = $2")
            .bind(student_id)
            .bind(course_id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn is_enrolled(&self, user_id: Uuid, course_id: Uuid) -> StoreResult<bool> {
        Ok(sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM enrollments WHERE student_id = $1 AND course_id = $2)",
        )
        .bind(user_id)
        .bind(course_id)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn student_count(&self, course_id: Uuid) -> StoreResult<i64> {
        Ok(
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM enrollments WHERE course_id = $1")
                .bind(course_id)
                .fetch_one(&self.pool)
                .await?,
        )
    }

    async fn enrolled_courses(&self, student_id: Uuid) -> StoreResult<Vec<CourseSummary>> {
        let mut builder: QueryBuilder<sqlx::Postgres> = QueryBuilder::new(COURSE_SUMMARY_SELECT);
        builder.push(" JOIN enrollments mine ON mine.course_id = c.id AND mine.student_id = ");
        builder.push_bind(student_id);
        builder.push(" ORDER BY mine.enrolled_at DESC");

        let rows = builder
            .build_query_as::<CourseSummaryRow>()
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(CourseSummary::from).collect())
    }

    async fn list_chapters(
        &self,
        course_id: Uuid,
        scope: ChapterScope,
    ) -> StoreResult<Vec<Chapter>> {
        let mut builder: QueryBuilder<sqlx::Postgres> =
            QueryBuilder::new(format!("SELECT {CHAPTER_COLUMNS} FROM chapters WHERE course_id = "));
        builder.push_bind(course_id);

        if scope == ChapterScope::PublicOnly {
            builder.push(" AND is_public = true");
        }

        builder.push(" ORDER BY sort_order ASC");

        Ok(builder
            .build_query_as::<Chapter>()
            .fetch_all(&self.pool)
            .await?)
    }

    async fn get_chapter(&self, id: Uuid) -> StoreResult<Option<Chapter>> {
        let sql = format!("SELECT {CHAPTER_COLUMNS} FROM chapters WHERE id = $1");
        Ok(sqlx::query_as::<_, Chapter>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    /// create_chapter
    ///
    /// Relies on the (course_id, sort_order) unique constraint to reject a
    /// duplicate order, including under concurrent inserts.
    async fn create_chapter(
        &self,
        course_id: Uuid,
        req: CreateChapterRequest,
    ) -> StoreResult<Chapter> {
        let sql = format!(
            "INSERT INTO chapters \
             (id, course_id, title, content, sort_order, is_public, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, NOW(), NOW()) RETURNING {CHAPTER_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, Chapter>(&sql)
            .bind(Uuid::new_v4())
            .bind(course_id)
            .bind(req.title)
            .bind(req.content)
            .bind(req.order)
            .bind(req.is_public)
            .fetch_one(&self.pool)
            .await?)
    }

    async fn update_chapter(
        &self,
        id: Uuid,
        req: UpdateChapterRequest,
    ) -> StoreResult<Option<Chapter>> {
        let sql = format!(
            r#"
            UPDATE chapters
            SET title = COALESCE($2, title),
                content = COALESCE($3, content),
                sort_order = COALESCE($4, sort_order),
                is_public = COALESCE($5, is_public),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {CHAPTER_COLUMNS}
            "#
        );
        Ok(sqlx::query_as::<_, Chapter>(&sql)
            .bind(id)
            .bind(req.title)
            .bind(req.content)
            .bind(req.order)
            .bind(req.is_public)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn delete_chapter(&self, id: Uuid) -> StoreResult<bool> {
        let res = sqlx::query("DELETE FROM chapters WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }
}

// --- In-Memory Implementation ---

#[derive(Default)]
struct MemoryState {
    users: Vec<User>,
    courses: Vec<Course>,
    chapters: Vec<Chapter>,
    enrollments: Vec<Enrollment>,
    revoked: HashMap<Uuid, DateTime<Utc>>,
}

impl MemoryState {
    fn summary(&self, course: &Course) -> CourseSummary {
        let creator_username = self
            .users
            .iter()
            .find(|u| u.id == course.created_by)
            .map(|u| u.username.clone())
            .unwrap_or_default();
        CourseSummary::from(CourseSummaryRow {
            id: course.id,
            title: course.title.clone(),
            description: course.description.clone(),
            creator_id: course.created_by,
            creator_username,
            created_at: course.created_at,
            student_count: self
                .enrollments
                .iter()
                .filter(|e| e.course_id == course.id)
                .count() as i64,
            chapter_count: self.chapters.iter().filter(|c| c.course_id == course.id).count() as i64,
        })
    }

    fn order_taken(&self, course_id: Uuid, order: i32, except: Option<Uuid>) -> bool {
        self.chapters
            .iter()
            .any(|c| c.course_id == course_id && c.order == order && Some(c.id) != except)
    }
}

/// InMemoryRepository
///
/// A `Repository` kept entirely in process memory, used by the test-suite and
/// for database-less local runs. All state sits behind one async mutex, so every
/// operation (including its uniqueness check) is a single atomic step, the same
/// guarantee the Postgres constraints give.
#[derive(Default)]
pub struct InMemoryRepository {
    state: Mutex<MemoryState>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

fn unique(constraint: &str) -> StoreError {
    StoreError::UniqueViolation {
        constraint: constraint.to_string(),
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn create_user(&self, user: NewUser) -> StoreResult<User> {
        let mut state = self.state.lock().await;
        if state.users.iter().any(|u| u.username == user.username) {
            return Err(unique(USERNAME_UNIQUE));
        }
        if state.users.iter().any(|u| u.email == user.email) {
            return Err(unique(EMAIL_UNIQUE));
        }
        let created = User {
            id: Uuid::new_v4(),
            username: user.username,
            email: user.email,
            password_hash: user.password_hash,
            first_name: user.first_name,
            last_name: user.last_name,
            role: user.role,
            bio: None,
            created_at: Utc::now(),
        };
        state.users.push(created.clone());
        Ok(created)
    }

    async fn get_user(&self, id: Uuid) -> StoreResult<Option<User>> {
        let state = self.state.lock().await;
        Ok(state.users.iter().find(|u| u.id == id).cloned())
    }

    async fn find_user_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        let state = self.state.lock().await;
        Ok(state.users.iter().find(|u| u.username == username).cloned())
    }

    async fn update_user(&self, id: Uuid, req: UpdateProfileRequest) -> StoreResult<Option<User>> {
        let mut state = self.state.lock().await;
        if let Some(email) = &req.email {
            if state.users.iter().any(|u| u.id != id && &u.email == email) {
                return Err(unique(EMAIL_UNIQUE));
            }
        }
        let Some(user) = state.users.iter_mut().find(|u| u.id == id) else {
            return Ok(None);
        };
        if let Some(email) = req.email {
            user.email = email;
        }
        if let Some(first_name) = req.first_name {
            user.first_name = first_name;
        }
        if let Some(last_name) = req.last_name {
            user.last_name = last_name;
        }
        if let Some(bio) = req.bio {
            user.bio = Some(bio);
        }
        Ok(Some(user.clone()))
    }

    async fn revoke_token(&self, jti: Uuid, expires_at: DateTime<Utc>) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        let now = Utc::now();
        state.revoked.retain(|_, exp| *exp > now);
        state.revoked.entry(jti).or_insert(expires_at);
        Ok(())
    }

    async fn is_token_revoked(&self, jti: Uuid) -> StoreResult<bool> {
        let state = self.state.lock().await;
        Ok(state.revoked.contains_key(&jti))
    }

    async fn list_courses(&self, instructor_id: Option<Uuid>) -> StoreResult<Vec<CourseSummary>> {
        let state = self.state.lock().await;
        // Newest first; walking the insertion order backwards keeps ties stable.
        let mut courses: Vec<&Course> = state
            .courses
            .iter()
            .rev()
            .filter(|c| instructor_id.is_none_or(|id| c.created_by == id))
            .collect();
        courses.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(courses.into_iter().map(|c| state.summary(c)).collect())
    }

    async fn get_course(&self, id: Uuid) -> StoreResult<Option<Course>> {
        let state = self.state.lock().await;
        Ok(state.courses.iter().find(|c| c.id == id).cloned())
    }

    async fn course_summary(&self, id: Uuid) -> StoreResult<Option<CourseSummary>> {
        let state = self.state.lock().await;
        Ok(state.courses.iter().find(|c| c.id == id).map(|c| state.summary(c)))
    }

    async fn create_course(&self, owner: Uuid, req: CreateCourseRequest) -> StoreResult<Course> {
        let mut state = self.state.lock().await;
        let now = Utc::now();
        let course = Course {
            id: Uuid::new_v4(),
            title: req.title,
            description: req.description,
            created_by: owner,
            created_at: now,
            updated_at: now,
        };
        state.courses.push(course.clone());
        Ok(course)
    }

    async fn update_course(
        &self,
        id: Uuid,
        req: UpdateCourseRequest,
    ) -> StoreResult<Option<Course>> {
        let mut state = self.state.lock().await;
        let Some(course) = state.courses.iter_mut().find(|c| c.id == id) else {
            return Ok(None);
        };
        if let Some(title) = req.title {
            course.title = title;
        }
        if let Some(description) = req.description {
            course.description = description;
        }
        course.updated_at = Utc::now();
        Ok(Some(course.clone()))
    }

    async fn delete_course(&self, id: Uuid) -> StoreResult<bool> {
        let mut state = self.state.lock().await;
        let before = state.courses.len();
        state.courses.retain(|c| c.id != id);
        if state.courses.len() == before {
            return Ok(false);
        }
        state.chapters.retain(|c| c.course_id != id);
        state.enrollments.retain(|e| e.course_id != id);
        Ok(true)
    }

    async fn create_enrollment(
        &self,
        student_id: Uuid,
        course_id: Uuid,
    ) -> StoreResult<Enrollment> {
        let mut state = self.state.lock().await;
        if !state.courses.iter().any(|c| c.id == course_id) {
            return Err(StoreError::ForeignKeyViolation {
                constraint: ENROLLMENT_COURSE_FK.to_string(),
            });
        }
        if state
            .enrollments
            .iter()
            .any(|e| e.student_id == student_id && e.course_id == course_id)
        {
            return Err(unique(ENROLLMENT_UNIQUE));
        }
        let enrollment = Enrollment {
            id: Uuid::new_v4(),
            student_id,
            course_id,
            enrolled_at: Utc::now(),
        };
        state.enrollments.push(enrollment.clone());
        Ok(enrollment)
    }

    async fn delete_enrollment(&self, student_id: Uuid, course_id: Uuid) -> StoreResult<bool> {
        let mut state = self.state.lock().await;
        let before = state.enrollments.len();
        state
            .enrollments
            .retain(|e| !(e.student_id == student_id && e.course_id == course_id));
        Ok(state.enrollments.len() < before)
    }

    async fn is_enrolled(&self, user_id: Uuid, course_id: Uuid) -> StoreResult<bool> {
        let state = self.state.lock().await;
        Ok(state
            .enrollments
            .iter()
            .any(|e| e.student_id == user_id && e.course_id == course_id))
    }

    async fn student_count(&self, course_id: Uuid) -> StoreResult<i64> {
        let state = self.state.lock().await;
        Ok(state.enrollments.iter().filter(|e| e.course_id == course_id).count() as i64)
    }

    async fn enrolled_courses(&self, student_id: Uuid) -> StoreResult<Vec<CourseSummary>> {
        let state = self.state.lock().await;
        let mut mine: Vec<&Enrollment> = state
            .enrollments
            .iter()
            .rev()
            .filter(|e| e.student_id == student_id)
            .collect();
        mine.sort_by(|a, b| b.enrolled_at.cmp(&a.enrolled_at));
        Ok(mine
            .into_iter()
            .filter_map(|e| state.courses.iter().find(|c| c.id == e.course_id))
            .map(|c| state.summary(c))
            .collect())
    }

    async fn list_chapters(
        &self,
        course_id: Uuid,
        scope: ChapterScope,
    ) -> StoreResult<Vec<Chapter>> {
        let state = self.state.lock().await;
        let mut chapters: Vec<Chapter> = state
            .chapters
            .iter()
            .filter(|c| c.course_id == course_id)
            .filter(|c| scope == ChapterScope::All || c.is_public)
            .cloned()
            .collect();
        chapters.sort_by_key(|c| c.order);
        Ok(chapters)
    }

    async fn get_chapter(&self, id: Uuid) -> StoreResult<Option<Chapter>> {
        let state = self.state.lock().await;
        Ok(state.chapters.iter().find(|c| c.id == id).cloned())
    }

    async fn create_chapter(
        &self,
        course_id: Uuid,
        req: CreateChapterRequest,
    ) -> StoreResult<Chapter> {
        let mut state = self.state.lock().await;
        if !state.courses.iter().any(|c| c.id == course_id) {
            return Err(StoreError::ForeignKeyViolation {
                constraint: CHAPTER_COURSE_FK.to_string(),
            });
        }
        if state.order_taken(course_id, req.order, None) {
            return Err(unique(CHAPTER_ORDER_UNIQUE));
        }
        let now = Utc::now();
        let chapter = Chapter {
            id: Uuid::new_v4(),
            course_id,
            title: req.title,
            content: req.content,
            order: req.order,
            is_public: req.is_public,
            created_at: now,
            updated_at: now,
        };
        state.chapters.push(chapter.clone());
        Ok(chapter)
    }

    async fn update_chapter(
        &self,
        id: Uuid,
        req: UpdateChapterRequest,
    ) -> StoreResult<Option<Chapter>> {
        let mut state = self.state.lock().await;
        let Some(course_id) = state.chapters.iter().find(|c| c.id == id).map(|c| c.course_id) else {
            return Ok(None);
        };
        if let Some(order) = req.order {
            if state.order_taken(course_id, order, Some(id)) {
                return Err(unique(CHAPTER_ORDER_UNIQUE));
            }
        }
        let Some(chapter) = state.chapters.iter_mut().find(|c| c.id == id) else {
            return Ok(None);
        };
        if let Some(title) = req.title {
            chapter.title = title;
        }
        if let Some(content) = req.content {
            chapter.content = content;
        }
        if let Some(order) = req.order {
            chapter.order = order;
        }
        if let Some(is_public) = req.is_public {
            chapter.is_public = is_public;
        }
        chapter.updated_at = Utc::now();
        Ok(Some(chapter.clone()))
    }

    async fn delete_chapter(&self, id: Uuid) -> StoreResult<bool> {
        let mut state = self.state.lock().await;
        let before = state.chapters.len();
        state.chapters.retain(|c| c.id != id);
        Ok(state.chapters.len() < before)
    }
}
