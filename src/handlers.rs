use crate::{
    AppState, accounts,
    auth::{AuthUser, CurrentActor},
    courses,
    error::{AppError, ErrorBody},
    ledger,
    models::{
        ChapterDetail, ChapterSummary, CourseDetail, CourseSummary, CreateChapterRequest,
        CreateCourseRequest, EnrollmentResponse, LoginRequest, MessageResponse, NewChapterRequest,
        PublicUser, RefreshRequest, RegisterUserRequest, SessionTokens, UpdateChapterRequest,
        UpdateCourseRequest, UpdateProfileRequest, UserResponse,
    },
};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::Deserialize;
use uuid::Uuid;

// --- Filter Structs ---

/// CourseFilter
///
/// Query parameters for GET /courses.
#[derive(Debug, Default, Deserialize, utoipa::IntoParams)]
pub struct CourseFilter {
    /// Only courses created by this instructor.
    pub instructor: Option<Uuid>,
}

/// ChapterFilter
///
/// Query parameters for GET /chapters. Without `course_id` the listing is empty.
#[derive(Debug, Default, Deserialize, utoipa::IntoParams)]
pub struct ChapterFilter {
    pub course_id: Option<Uuid>,
}

// --- Accounts ---

/// register_user
///
/// [Public Route] Creates an instructor or student account and returns it with
/// a first token pair.
#[utoipa::path(
    post,
    path = "/auth/register",
    request_body = RegisterUserRequest,
    responses(
        (status = 201, description = "User created", body = SessionTokens),
        (status = 400, description = "Invalid input", body = ErrorBody)
    )
)]
pub async fn register_user(
    State(state): State<AppState>,
    Json(payload): Json<RegisterUserRequest>,
) -> Result<(StatusCode, Json<SessionTokens>), AppError> {
    let tokens = accounts::register(&*state.repo, &state.config, payload).await?;
    Ok((StatusCode::CREATED, Json(tokens)))
}

/// login
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Token pair", body = SessionTokens),
        (status = 401, description = "Bad credentials", body = ErrorBody)
    )
)]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<SessionTokens>, AppError> {
    Ok(Json(accounts::authenticate(&*state.repo, &state.config, payload).await?))
}

/// refresh_token
///
/// [Public Route] Exchanges a refresh token for a new access token.
#[utoipa::path(
    post,
    path = "/auth/token/refresh",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "New access token", body = SessionTokens),
        (status = 401, description = "Invalid or revoked refresh token", body = ErrorBody)
    )
)]
pub async fn refresh_token(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> Result<Json<SessionTokens>, AppError> {
    Ok(Json(accounts::refresh(&*state.repo, &state.config, &payload.refresh).await?))
}

/// logout
///
/// [Authenticated Route] Blacklists the given refresh token.
#[utoipa::path(
    post,
    path = "/auth/logout",
    request_body = RefreshRequest,
    responses(
        (status = 204, description = "Refresh token revoked"),
        (status = 401, description = "Invalid token", body = ErrorBody)
    )
)]
pub async fn logout(
    user: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> Result<StatusCode, AppError> {
    accounts::revoke(&*state.repo, &state.config, &user.actor(), &payload.refresh).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// get_profile
#[utoipa::path(
    get,
    path = "/profile",
    responses((status = 200, description = "Current user", body = UserResponse))
)]
pub async fn get_profile(
    user: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<UserResponse>, AppError> {
    Ok(Json(accounts::get_profile(&*state.repo, &user.actor()).await?))
}

/// update_profile
///
/// [Authenticated Route] Partial update of email, names and bio.
#[utoipa::path(
    patch,
    path = "/profile",
    request_body = UpdateProfileRequest,
    responses(
        (status = 200, description = "Updated user", body = UserResponse),
        (status = 400, description = "Invalid input", body = ErrorBody)
    )
)]
pub async fn update_profile(
    user: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<UpdateProfileRequest>,
) -> Result<Json<UserResponse>, AppError> {
    Ok(Json(accounts::update_profile(&*state.repo, &user.actor(), payload).await?))
}

/// get_public_user
#[utoipa::path(
    get,
    path = "/users/{id}",
    params(("id" = Uuid, Path, description = "User id")),
    responses(
        (status = 200, description = "Public profile", body = PublicUser),
        (status = 404, description = "Not found", body = ErrorBody)
    )
)]
pub async fn get_public_user(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<PublicUser>, AppError> {
    Ok(Json(accounts::get_public_user(&*state.repo, id).await?))
}

// --- Courses ---

/// list_courses
///
/// [Public Route] All courses, newest first.
#[utoipa::path(
    get,
    path = "/courses",
    params(CourseFilter),
    responses((status = 200, description = "Courses", body = [CourseSummary]))
)]
pub async fn list_courses(
    State(state): State<AppState>,
    Query(filter): Query<CourseFilter>,
) -> Result<Json<Vec<CourseSummary>>, AppError> {
    Ok(Json(courses::list_courses(&*state.repo, filter.instructor).await?))
}

/// get_course
///
/// [Public Route] Course detail; `is_enrolled` reflects the caller.
#[utoipa::path(
    get,
    path = "/courses/{id}",
    params(("id" = Uuid, Path, description = "Course id")),
    responses(
        (status = 200, description = "Course", body = CourseDetail),
        (status = 404, description = "Not found", body = ErrorBody)
    )
)]
pub async fn get_course(
    CurrentActor(actor): CurrentActor,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<CourseDetail>, AppError> {
    Ok(Json(courses::get_course(&*state.repo, &actor, id).await?))
}

/// create_course
///
/// [Authenticated Route] Instructors only.
#[utoipa::path(
    post,
    path = "/courses",
    request_body = CreateCourseRequest,
    responses(
        (status = 201, description = "Course created", body = CourseDetail),
        (status = 403, description = "Not an instructor", body = ErrorBody)
    )
)]
pub async fn create_course(
    user: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<CreateCourseRequest>,
) -> Result<(StatusCode, Json<CourseDetail>), AppError> {
    let actor = user.actor();
    let course = courses::create_course(&*state.repo, actor.instructor()?, payload).await?;
    Ok((StatusCode::CREATED, Json(course)))
}

/// update_course
///
/// [Authenticated Route] Owner only. PUT and PATCH both apply a partial update.
#[utoipa::path(
    patch,
    path = "/courses/{id}",
    params(("id" = Uuid, Path, description = "Course id")),
    request_body = UpdateCourseRequest,
    responses(
        (status = 200, description = "Course updated", body = CourseDetail),
        (status = 403, description = "Not the owner", body = ErrorBody),
        (status = 404, description = "Not found", body = ErrorBody)
    )
)]
pub async fn update_course(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateCourseRequest>,
) -> Result<Json<CourseDetail>, AppError> {
    Ok(Json(courses::update_course(&*state.repo, &user.actor(), id, payload).await?))
}

/// delete_course
///
/// [Authenticated Route] Owner only; chapters and enrollments go with it.
#[utoipa::path(
    delete,
    path = "/courses/{id}",
    params(("id" = Uuid, Path, description = "Course id")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 403, description = "Not the owner", body = ErrorBody),
        (status = 404, description = "Not found", body = ErrorBody)
    )
)]
pub async fn delete_course(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    courses::delete_course(&*state.repo, &user.actor(), id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// --- Enrollment ---

/// enroll
///
/// [Authenticated Route] Students only; enrolling twice is a 409.
#[utoipa::path(
    post,
    path = "/courses/{id}/enroll",
    params(("id" = Uuid, Path, description = "Course id")),
    responses(
        (status = 201, description = "Enrolled", body = EnrollmentResponse),
        (status = 403, description = "Not a student", body = ErrorBody),
        (status = 404, description = "Course not found", body = ErrorBody),
        (status = 409, description = "Already enrolled", body = ErrorBody)
    )
)]
pub async fn enroll(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<(StatusCode, Json<EnrollmentResponse>), AppError> {
    let actor = user.actor();
    let enrollment = ledger::enroll(&*state.repo, actor.student()?, id).await?;
    Ok((StatusCode::CREATED, Json(enrollment)))
}

/// unenroll
#[utoipa::path(
    delete,
    path = "/courses/{id}/unenroll",
    params(("id" = Uuid, Path, description = "Course id")),
    responses(
        (status = 200, description = "Unenrolled", body = MessageResponse),
        (status = 404, description = "Not enrolled", body = ErrorBody)
    )
)]
pub async fn unenroll(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<MessageResponse>, AppError> {
    let actor = user.actor();
    ledger::unenroll(&*state.repo, actor.student()?, id).await?;
    Ok(Json(MessageResponse {
        message: "Successfully unenrolled from course.".to_string(),
    }))
}

/// my_courses
///
/// [Authenticated Route] The student's courses, most recent enrollment first.
#[utoipa::path(
    get,
    path = "/my-courses",
    responses((status = 200, description = "Enrolled courses", body = [CourseSummary]))
)]
pub async fn my_courses(
    user: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<CourseSummary>>, AppError> {
    let actor = user.actor();
    Ok(Json(ledger::my_courses(&*state.repo, actor.student()?).await?))
}

// --- Chapters ---

/// list_course_chapters
///
/// [Public Route] Chapters of one course, filtered for the caller.
#[utoipa::path(
    get,
    path = "/courses/{id}/chapters",
    params(("id" = Uuid, Path, description = "Course id")),
    responses((status = 200, description = "Visible chapters", body = [ChapterSummary]))
)]
pub async fn list_course_chapters(
    CurrentActor(actor): CurrentActor,
    State(state): State<AppState>,
    Path(course_id): Path<Uuid>,
) -> Result<Json<Vec<ChapterSummary>>, AppError> {
    Ok(Json(courses::list_chapters(&*state.repo, &actor, course_id).await?))
}

/// list_chapters
#[utoipa::path(
    get,
    path = "/chapters",
    params(ChapterFilter),
    responses((status = 200, description = "Visible chapters", body = [ChapterSummary]))
)]
pub async fn list_chapters(
    CurrentActor(actor): CurrentActor,
    State(state): State<AppState>,
    Query(filter): Query<ChapterFilter>,
) -> Result<Json<Vec<ChapterSummary>>, AppError> {
    let Some(course_id) = filter.course_id else {
        return Ok(Json(Vec::new()));
    };
    Ok(Json(courses::list_chapters(&*state.repo, &actor, course_id).await?))
}

/// get_chapter
///
/// [Public Route] Public chapters for anyone; private ones for the owner and
/// enrolled students.
#[utoipa::path(
    get,
    path = "/chapters/{id}",
    params(("id" = Uuid, Path, description = "Chapter id")),
    responses(
        (status = 200, description = "Chapter", body = ChapterDetail),
        (status = 401, description = "Private chapter, anonymous caller", body = ErrorBody),
        (status = 403, description = "Not enrolled", body = ErrorBody),
        (status = 404, description = "Not found", body = ErrorBody)
    )
)]
pub async fn get_chapter(
    CurrentActor(actor): CurrentActor,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ChapterDetail>, AppError> {
    Ok(Json(courses::get_chapter(&*state.repo, &actor, id).await?))
}

/// create_course_chapter
///
/// [Authenticated Route] Course owner only; the course comes from the path.
#[utoipa::path(
    post,
    path = "/courses/{id}/chapters",
    params(("id" = Uuid, Path, description = "Course id")),
    request_body = CreateChapterRequest,
    responses(
        (status = 201, description = "Chapter created", body = ChapterDetail),
        (status = 403, description = "Not the course owner", body = ErrorBody),
        (status = 409, description = "Order already taken", body = ErrorBody)
    )
)]
pub async fn create_course_chapter(
    user: AuthUser,
    State(state): State<AppState>,
    Path(course_id): Path<Uuid>,
    Json(payload): Json<CreateChapterRequest>,
) -> Result<(StatusCode, Json<ChapterDetail>), AppError> {
    let actor = user.actor();
    let chapter =
        courses::create_chapter(&*state.repo, actor.instructor()?, course_id, payload).await?;
    Ok((StatusCode::CREATED, Json(chapter)))
}

/// create_chapter
///
/// [Authenticated Route] Same as `create_course_chapter`, with the course named
/// in the payload.
#[utoipa::path(
    post,
    path = "/chapters",
    request_body = NewChapterRequest,
    responses(
        (status = 201, description = "Chapter created", body = ChapterDetail),
        (status = 403, description = "Not the course owner", body = ErrorBody),
        (status = 409, description = "Order already taken", body = ErrorBody)
    )
)]
pub async fn create_chapter(
    user: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<NewChapterRequest>,
) -> Result<(StatusCode, Json<ChapterDetail>), AppError> {
    let actor = user.actor();
    let chapter = courses::create_chapter(
        &*state.repo,
        actor.instructor()?,
        payload.course,
        payload.chapter,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(chapter)))
}

/// update_chapter
#[utoipa::path(
    patch,
    path = "/chapters/{id}",
    params(("id" = Uuid, Path, description = "Chapter id")),
    request_body = UpdateChapterRequest,
    responses(
        (status = 200, description = "Chapter updated", body = ChapterDetail),
        (status = 403, description = "Not the course owner", body = ErrorBody),
        (status = 404, description = "Not found", body = ErrorBody),
        (status = 409, description = "Order already taken", body = ErrorBody)
    )
)]
pub async fn update_chapter(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateChapterRequest>,
) -> Result<Json<ChapterDetail>, AppError> {
    Ok(Json(courses::update_chapter(&*state.repo, &user.actor(), id, payload).await?))
}

/// delete_chapter
#[utoipa::path(
    delete,
    path = "/chapters/{id}",
    params(("id" = Uuid, Path, description = "Chapter id")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 403, description = "Not the course owner", body = ErrorBody),
        (status = 404, description = "Not found", body = ErrorBody)
    )
)]
pub async fn delete_chapter(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    courses::delete_chapter(&*state.repo, &user.actor(), id).await?;
    Ok(StatusCode::NO_CONTENT)
}
