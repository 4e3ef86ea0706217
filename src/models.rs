use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

// --- Identity ---

/// Role
///
/// Closed set of roles a user can hold. Chosen at registration and never changed
/// afterwards. Stored in the `user_role` Postgres enum.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS, ToSchema, sqlx::Type,
)]
#[ts(export)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "user_role", rename_all = "lowercase")]
pub enum Role {
    Instructor,
    Student,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Instructor => "instructor",
            Role::Student => "student",
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "instructor" => Ok(Role::Instructor),
            "student" => Ok(Role::Student),
            other => Err(format!(
                "Role must be either 'instructor' or 'student', got '{other}'."
            )),
        }
    }
}

/// User
///
/// Canonical identity record from the `users` table. The password hash never
/// leaves the server: it is skipped during serialization.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
    pub bio: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Insert payload for a new user. The password is already hashed at this point.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
}

// --- Courses & Chapters (Mapped to Database) ---

/// Course
///
/// Row of the `courses` table. `created_by` is the owning instructor.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow)]
#[ts(export)]
pub struct Course {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub created_by: Uuid,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
}

/// Chapter
///
/// Row of the `chapters` table. `content` is an opaque rich-text document
/// (an ordered tree of typed nodes) that the server stores and returns as-is.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow)]
#[ts(export)]
pub struct Chapter {
    pub id: Uuid,
    #[serde(rename = "course")]
    pub course_id: Uuid,
    pub title: String,
    #[ts(type = "unknown")]
    #[schema(value_type = Object)]
    pub content: Value,

    /// Maps SQL column "sort_order" to Rust field "order".
    /// `order` is a reserved word in SQL, so the column carries a different name.
    #[sqlx(rename = "sort_order")]
    pub order: i32,
    pub is_public: bool,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
}

/// Enrollment
///
/// Join record between a student and a course. Unique per (student, course).
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow)]
#[ts(export)]
pub struct Enrollment {
    pub id: Uuid,
    pub student_id: Uuid,
    pub course_id: Uuid,
    #[ts(type = "string")]
    pub enrolled_at: DateTime<Utc>,
}

// --- Request Payloads (Input Schemas) ---

/// RegisterUserRequest
///
/// Input payload for POST /auth/register. `role` is kept as a raw string so an
/// unknown value surfaces as a field-level validation error.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct RegisterUserRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    pub role: String,
}

/// LoginRequest
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// RefreshRequest
///
/// Body of both POST /auth/token/refresh and POST /auth/logout.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct RefreshRequest {
    pub refresh: String,
}

/// CreateCourseRequest
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct CreateCourseRequest {
    pub title: String,
    pub description: String,
}

/// UpdateCourseRequest
///
/// Partial update payload for PUT/PATCH /courses/{id}. Only provided fields change.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UpdateCourseRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// CreateChapterRequest
///
/// Input payload for POST /courses/{id}/chapters. The target course comes from
/// the path.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct CreateChapterRequest {
    pub title: String,
    #[serde(default = "empty_document")]
    #[ts(type = "unknown")]
    #[schema(value_type = Object)]
    pub content: Value,
    pub order: i32,
    #[serde(default)]
    pub is_public: bool,
}

/// NewChapterRequest
///
/// Input payload for POST /chapters, where the target course is named by the
/// payload rather than the URL.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct NewChapterRequest {
    pub course: Uuid,
    #[serde(flatten)]
    pub chapter: CreateChapterRequest,
}

/// UpdateChapterRequest
///
/// Partial update payload for PUT/PATCH /chapters/{id}. A chapter cannot be
/// moved to another course.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UpdateChapterRequest {
    /// Accepted only when it names the chapter's current course.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub course: Option<Uuid>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[ts(type = "unknown")]
    #[schema(value_type = Option<Object>)]
    pub content: Option<Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub order: Option<i32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_public: Option<bool>,
}

/// UpdateProfileRequest
///
/// Partial update payload for PATCH /profile. Username and role are immutable.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UpdateProfileRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
}

fn empty_document() -> Value {
    Value::Array(Vec::new())
}

// --- Response Schemas (Output) ---

/// ProfileInfo
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct ProfileInfo {
    pub role: Role,
    pub bio: Option<String>,
}

/// UserResponse
///
/// Full user record returned to the user themselves and embedded in course details.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct UserResponse {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub profile: ProfileInfo,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
            profile: ProfileInfo {
                role: user.role,
                bio: user.bio,
            },
        }
    }
}

/// PublicUser
///
/// Output of GET /users/{id}. No email, no bio.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct PublicUser {
    pub id: Uuid,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
}

impl From<User> for PublicUser {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            first_name: user.first_name,
            last_name: user.last_name,
            role: user.role,
        }
    }
}

/// SessionTokens
///
/// Access/refresh pair handed out on registration, login and refresh.
/// `user` is present on registration and login only.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct SessionTokens {
    pub access: String,
    pub refresh: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<UserResponse>,
}

/// UserRef
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, PartialEq)]
#[ts(export)]
pub struct UserRef {
    pub id: Uuid,
    pub username: String,
}

/// CourseSummary
///
/// List item for GET /courses and GET /my-courses.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct CourseSummary {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub created_by: UserRef,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    pub student_count: i64,
    pub chapter_count: i64,
}

/// Flat row shape of a course summary query; joined columns are renamed
/// because `id` is ambiguous between the course and its creator.
#[derive(Debug, Clone, FromRow)]
pub struct CourseSummaryRow {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub creator_id: Uuid,
    pub creator_username: String,
    pub created_at: DateTime<Utc>,
    pub student_count: i64,
    pub chapter_count: i64,
}

impl From<CourseSummaryRow> for CourseSummary {
    fn from(row: CourseSummaryRow) -> Self {
        Self {
            id: row.id,
            title: row.title,
            description: row.description,
            created_by: UserRef {
                id: row.creator_id,
                username: row.creator_username,
            },
            created_at: row.created_at,
            student_count: row.student_count,
            chapter_count: row.chapter_count,
        }
    }
}

/// CourseDetail
///
/// Output of GET /courses/{id} and of course create/update. `is_enrolled` is
/// computed for the requesting actor and is false for anonymous requests.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct CourseDetail {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub created_by: UserResponse,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
    pub student_count: i64,
    pub is_enrolled: bool,
}

/// ChapterSummary
///
/// List item for chapter listings. Content is left out.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, PartialEq)]
#[ts(export)]
pub struct ChapterSummary {
    pub id: Uuid,
    pub title: String,
    pub order: i32,
    pub is_public: bool,
}

impl From<Chapter> for ChapterSummary {
    fn from(chapter: Chapter) -> Self {
        Self {
            id: chapter.id,
            title: chapter.title,
            order: chapter.order,
            is_public: chapter.is_public,
        }
    }
}

/// ChapterDetail
///
/// Output of GET /chapters/{id}: the full chapter plus the parent course title.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct ChapterDetail {
    #[serde(flatten)]
    pub chapter: Chapter,
    pub course_title: String,
}

/// EnrollmentResponse
///
/// Output of POST /courses/{id}/enroll.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct EnrollmentResponse {
    pub id: Uuid,
    pub student: UserResponse,
    pub course: CourseSummary,
    #[ts(type = "string")]
    pub enrolled_at: DateTime<Utc>,
}

/// MessageResponse
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct MessageResponse {
    pub message: String,
}
