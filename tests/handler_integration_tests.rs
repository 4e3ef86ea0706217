use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode, header},
};
use course_portal::{
    AppConfig, AppState, InMemoryRepository, create_router,
    models::{ChapterSummary, CourseSummary},
    repository::RepositoryState,
};
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceExt;
use uuid::Uuid;

// --- Test Harness ---

fn app() -> Router {
    let state = AppState {
        repo: Arc::new(InMemoryRepository::new()) as RepositoryState,
        config: AppConfig::default(),
    };
    create_router(state)
}

async fn call(
    app: &Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let request = match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::to_vec(&json).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

/// Registers through the API and returns (user id, access token).
async fn signup(app: &Router, username: &str, role: &str) -> (Uuid, String) {
    let (status, body) = call(
        app,
        Method::POST,
        "/auth/register",
        None,
        Some(json!({
            "username": username,
            "email": format!("{username}@example.com"),
            "password": "password123",
            "role": role,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "register failed: {body}");
    let id = body["user"]["id"].as_str().unwrap().parse().unwrap();
    (id, body["access"].as_str().unwrap().to_string())
}

async fn new_course(app: &Router, token: &str, title: &str) -> Uuid {
    let (status, body) = call(
        app,
        Method::POST,
        "/courses",
        Some(token),
        Some(json!({ "title": title, "description": "Course description" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "create course failed: {body}");
    body["id"].as_str().unwrap().parse().unwrap()
}

async fn new_chapter(
    app: &Router,
    token: &str,
    course: Uuid,
    title: &str,
    order: i32,
    public: bool,
) -> (StatusCode, Value) {
    call(
        app,
        Method::POST,
        &format!("/courses/{course}/chapters"),
        Some(token),
        Some(json!({
            "title": title,
            "content": [{ "type": "p", "children": [{ "text": title }] }],
            "order": order,
            "is_public": public,
        })),
    )
    .await
}

async fn chapter_titles(app: &Router, token: Option<&str>, course: Uuid) -> Vec<String> {
    let (status, body) =
        call(app, Method::GET, &format!("/courses/{course}/chapters"), token, None).await;
    assert_eq!(status, StatusCode::OK);
    let chapters: Vec<ChapterSummary> = serde_json::from_value(body).unwrap();
    chapters.into_iter().map(|c| c.title).collect()
}

// --- Tests ---

#[tokio::test]
async fn test_health() {
    let app = app();
    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_intro_course_visibility_scenario() {
    let app = app();
    let (_, instructor) = signup(&app, "i", "instructor").await;
    let (_, enrolled) = signup(&app, "s", "student").await;
    let (_, outsider) = signup(&app, "t", "student").await;

    let course = new_course(&app, &instructor, "Intro").await;
    let (status, _) = new_chapter(&app, &instructor, course, "A", 1, true).await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, private) = new_chapter(&app, &instructor, course, "B", 2, false).await;
    assert_eq!(status, StatusCode::CREATED);
    let private_id = private["id"].as_str().unwrap().to_string();

    let (status, enrollment) =
        call(&app, Method::POST, &format!("/courses/{course}/enroll"), Some(&enrolled), None).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(enrollment["course"]["student_count"], 1);

    assert_eq!(chapter_titles(&app, Some(&enrolled), course).await, vec!["A", "B"]);
    assert_eq!(chapter_titles(&app, None, course).await, vec!["A"]);
    assert_eq!(chapter_titles(&app, Some(&outsider), course).await, vec!["A"]);
    assert_eq!(chapter_titles(&app, Some(&instructor), course).await, vec!["A", "B"]);

    // Flat listing by query parameter gives the same answer.
    let (_, flat) =
        call(&app, Method::GET, &format!("/chapters?course_id={course}"), None, None).await;
    assert_eq!(flat.as_array().unwrap().len(), 1);

    // Single reads of the private chapter.
    let uri = format!("/chapters/{private_id}");
    assert_eq!(call(&app, Method::GET, &uri, None, None).await.0, StatusCode::UNAUTHORIZED);
    assert_eq!(call(&app, Method::GET, &uri, Some(&outsider), None).await.0, StatusCode::FORBIDDEN);
    let (status, detail) = call(&app, Method::GET, &uri, Some(&enrolled), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(detail["course"], course.to_string());
    assert_eq!(detail["course_title"], "Intro");
    assert_eq!(detail["content"][0]["children"][0]["text"], "B");
}

#[tokio::test]
async fn test_chapter_listing_edge_cases() {
    let app = app();
    let (status, body) =
        call(&app, Method::GET, &format!("/courses/{}/chapters", Uuid::new_v4()), None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));

    let (status, body) = call(&app, Method::GET, "/chapters", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));

    let (status, _) =
        call(&app, Method::GET, &format!("/chapters/{}", Uuid::new_v4()), None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_non_owner_instructor_cannot_add_chapter() {
    let app = app();
    let (_, owner) = signup(&app, "i", "instructor").await;
    let (_, other) = signup(&app, "j", "instructor").await;
    let course = new_course(&app, &owner, "Intro").await;

    let (status, body) = new_chapter(&app, &other, course, "Hijack", 1, true).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["message"], "You can only create chapters for your own courses.");

    // Same rule when the course is named in the payload.
    let (status, _) = call(
        &app,
        Method::POST,
        "/chapters",
        Some(&other),
        Some(json!({ "course": course, "title": "Hijack", "order": 1 })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    assert!(chapter_titles(&app, Some(&owner), course).await.is_empty());
}

#[tokio::test]
async fn test_duplicate_order_conflict() {
    let app = app();
    let (_, owner) = signup(&app, "i", "instructor").await;
    let course = new_course(&app, &owner, "Intro").await;

    assert_eq!(new_chapter(&app, &owner, course, "First", 1, true).await.0, StatusCode::CREATED);
    let (status, body) = new_chapter(&app, &owner, course, "Second", 1, true).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "conflict");

    assert_eq!(chapter_titles(&app, None, course).await, vec!["First"]);
}

#[tokio::test]
async fn test_enrollment_lifecycle() {
    let app = app();
    let (_, owner) = signup(&app, "i", "instructor").await;
    let (_, student) = signup(&app, "s", "student").await;
    let course = new_course(&app, &owner, "Intro").await;
    let enroll = format!("/courses/{course}/enroll");
    let unenroll = format!("/courses/{course}/unenroll");

    // Instructors cannot enroll.
    assert_eq!(
        call(&app, Method::POST, &enroll, Some(&owner), None).await.0,
        StatusCode::FORBIDDEN
    );

    assert_eq!(
        call(&app, Method::POST, &enroll, Some(&student), None).await.0,
        StatusCode::CREATED
    );
    assert_eq!(
        call(&app, Method::POST, &enroll, Some(&student), None).await.0,
        StatusCode::CONFLICT
    );

    let (_, mine) = call(&app, Method::GET, "/my-courses", Some(&student), None).await;
    let mine: Vec<CourseSummary> = serde_json::from_value(mine).unwrap();
    assert_eq!(mine.len(), 1);
    assert_eq!(mine[0].student_count, 1);

    let (_, detail) =
        call(&app, Method::GET, &format!("/courses/{course}"), Some(&student), None).await;
    assert_eq!(detail["is_enrolled"], true);

    assert_eq!(call(&app, Method::DELETE, &unenroll, Some(&student), None).await.0, StatusCode::OK);
    let (status, body) = call(&app, Method::DELETE, &unenroll, Some(&student), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "You are not enrolled in this course.");

    let (_, mine) = call(&app, Method::GET, "/my-courses", Some(&student), None).await;
    assert_eq!(mine, json!([]));
}

#[tokio::test]
async fn test_course_round_trip_and_cascade() {
    let app = app();
    let (owner_id, owner) = signup(&app, "i", "instructor").await;
    let (_, student) = signup(&app, "s", "student").await;
    let course = new_course(&app, &owner, "Intro").await;
    let (_, chapter) = new_chapter(&app, &owner, course, "A", 1, true).await;
    let chapter_id = chapter["id"].as_str().unwrap().to_string();
    call(&app, Method::POST, &format!("/courses/{course}/enroll"), Some(&student), None).await;

    let (_, listed) =
        call(&app, Method::GET, &format!("/courses?instructor={owner_id}"), None, None).await;
    let listed: Vec<CourseSummary> = serde_json::from_value(listed).unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].title, "Intro");
    assert_eq!(listed[0].description, "Course description");
    assert_eq!(listed[0].created_by.id, owner_id);
    assert_eq!(listed[0].chapter_count, 1);

    let (_, other_listing) = call(
        &app,
        Method::GET,
        &format!("/courses?instructor={}", Uuid::new_v4()),
        None,
        None,
    )
    .await;
    assert_eq!(other_listing, json!([]));

    // Only the owner may delete.
    assert_eq!(
        call(&app, Method::DELETE, &format!("/courses/{course}"), Some(&student), None).await.0,
        StatusCode::FORBIDDEN
    );
    assert_eq!(
        call(&app, Method::DELETE, &format!("/courses/{course}"), Some(&owner), None).await.0,
        StatusCode::NO_CONTENT
    );

    assert_eq!(
        call(&app, Method::GET, &format!("/courses/{course}"), None, None).await.0,
        StatusCode::NOT_FOUND
    );
    assert_eq!(
        call(&app, Method::GET, &format!("/chapters/{chapter_id}"), None, None).await.0,
        StatusCode::NOT_FOUND
    );
    let (_, mine) = call(&app, Method::GET, "/my-courses", Some(&student), None).await;
    assert_eq!(mine, json!([]));
}

#[tokio::test]
async fn test_chapter_update_and_delete() {
    let app = app();
    let (_, owner) = signup(&app, "i", "instructor").await;
    let (_, student) = signup(&app, "s", "student").await;
    let course = new_course(&app, &owner, "Intro").await;
    let (_, chapter) = new_chapter(&app, &owner, course, "Draft", 1, false).await;
    let uri = format!("/chapters/{}", chapter["id"].as_str().unwrap());

    let (status, _) =
        call(&app, Method::PATCH, &uri, Some(&student), Some(json!({ "is_public": true }))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, updated) = call(
        &app,
        Method::PATCH,
        &uri,
        Some(&owner),
        Some(json!({ "title": "Final", "is_public": true })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["title"], "Final");
    assert_eq!(updated["order"], 1);
    assert_eq!(updated["is_public"], true);

    let (status, body) =
        call(&app, Method::PUT, &uri, Some(&owner), Some(json!({ "order": 0 }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["fields"][0]["field"], "order");

    assert_eq!(call(&app, Method::DELETE, &uri, None, None).await.0, StatusCode::UNAUTHORIZED);
    assert_eq!(
        call(&app, Method::DELETE, &uri, Some(&owner), None).await.0,
        StatusCode::NO_CONTENT
    );
    assert_eq!(call(&app, Method::GET, &uri, Some(&owner), None).await.0, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_registration_validation() {
    let app = app();
    let (status, body) = call(
        &app,
        Method::POST,
        "/auth/register",
        None,
        Some(json!({
            "username": "",
            "email": "invalid",
            "password": "short",
            "role": "admin",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "invalid_request");
    let fields: Vec<&str> = body["fields"]
        .as_array()
        .unwrap()
        .iter()
        .map(|f| f["field"].as_str().unwrap())
        .collect();
    assert_eq!(fields, vec!["username", "email", "password", "role"]);

    signup(&app, "ada", "student").await;
    let (status, body) = call(
        &app,
        Method::POST,
        "/auth/register",
        None,
        Some(json!({
            "username": "other",
            "email": "ada@example.com",
            "password": "password123",
            "role": "student",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["fields"][0]["field"], "email");
}

#[tokio::test]
async fn test_login_refresh_logout() {
    let app = app();
    signup(&app, "ada", "student").await;

    let (status, _) = call(
        &app,
        Method::POST,
        "/auth/login",
        None,
        Some(json!({ "username": "ada", "password": "nope-nope" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, session) = call(
        &app,
        Method::POST,
        "/auth/login",
        None,
        Some(json!({ "username": "ada", "password": "password123" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(session["user"]["username"], "ada");
    let access = session["access"].as_str().unwrap();
    let refresh = session["refresh"].as_str().unwrap();

    let (status, refreshed) = call(
        &app,
        Method::POST,
        "/auth/token/refresh",
        None,
        Some(json!({ "refresh": refresh })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(refreshed["refresh"], refresh);
    assert!(refreshed["access"].is_string());

    let (status, _) = call(
        &app,
        Method::POST,
        "/auth/logout",
        Some(access),
        Some(json!({ "refresh": refresh })),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = call(
        &app,
        Method::POST,
        "/auth/token/refresh",
        None,
        Some(json!({ "refresh": refresh })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_profile_and_public_user() {
    let app = app();
    let (id, token) = signup(&app, "ada", "instructor").await;

    let (status, updated) = call(
        &app,
        Method::PATCH,
        "/profile",
        Some(&token),
        Some(json!({ "first_name": "Ada", "bio": "Engines", "username": "ignored" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["username"], "ada");
    assert_eq!(updated["first_name"], "Ada");
    assert_eq!(updated["profile"]["bio"], "Engines");

    let (status, public) = call(&app, Method::GET, &format!("/users/{id}"), None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(public["role"], "instructor");
    assert!(public.get("email").is_none());
}
