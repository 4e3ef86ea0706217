//! Course and chapter operations.
//!
//! Each operation takes the actor explicitly and follows the same order:
//! capability, entity lookup, gate rule, payload validation, store write.

use uuid::Uuid;

use crate::error::{AppError, FieldError};
use crate::models::{
    Chapter, ChapterDetail, ChapterSummary, Course, CourseDetail, CourseSummary,
    CreateChapterRequest, CreateCourseRequest, UpdateChapterRequest, UpdateCourseRequest,
    UserResponse,
};
use crate::ledger;
use crate::policy::{
    Action, Actor, EntityKind, Facts, Instructor, Resource, authorize,
    filter_chapters_for_listing, listing_scope,
};
use crate::repository::Repository;

const MAX_TITLE_LEN: usize = 200;

// --- Validation ---

fn check_title(title: &str, errors: &mut Vec<FieldError>) {
    if title.trim().is_empty() {
        errors.push(FieldError::new("title", "This field may not be blank."));
    } else if title.chars().count() > MAX_TITLE_LEN {
        errors.push(FieldError::new(
            "title",
            format!("Ensure this field has no more than {MAX_TITLE_LEN} characters."),
        ));
    }
}

fn check_description(description: &str, errors: &mut Vec<FieldError>) {
    if description.trim().is_empty() {
        errors.push(FieldError::new("description", "This field may not be blank."));
    }
}

fn check_order(order: i32, errors: &mut Vec<FieldError>) {
    if order < 1 {
        errors.push(FieldError::new("order", "Order must be a positive integer."));
    }
}

fn finish(errors: Vec<FieldError>) -> Result<(), AppError> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(AppError::Validation(errors))
    }
}

pub fn validate_new_course(req: &CreateCourseRequest) -> Result<(), AppError> {
    let mut errors = Vec::new();
    check_title(&req.title, &mut errors);
    check_description(&req.description, &mut errors);
    finish(errors)
}

pub fn validate_course_update(req: &UpdateCourseRequest) -> Result<(), AppError> {
    let mut errors = Vec::new();
    if let Some(title) = &req.title {
        check_title(title, &mut errors);
    }
    if let Some(description) = &req.description {
        check_description(description, &mut errors);
    }
    finish(errors)
}

pub fn validate_new_chapter(req: &CreateChapterRequest) -> Result<(), AppError> {
    let mut errors = Vec::new();
    check_title(&req.title, &mut errors);
    check_order(req.order, &mut errors);
    finish(errors)
}

/// Partial chapter update. `course`, when present, must name the chapter's
/// current course.
pub fn validate_chapter_update(
    chapter: &Chapter,
    req: &UpdateChapterRequest,
) -> Result<(), AppError> {
    let mut errors = Vec::new();
    if req.course.is_some_and(|course| course != chapter.course_id) {
        errors.push(FieldError::new(
            "course",
            "A chapter cannot be moved to another course.",
        ));
    }
    if let Some(title) = &req.title {
        check_title(title, &mut errors);
    }
    if let Some(order) = req.order {
        check_order(order, &mut errors);
    }
    finish(errors)
}

// --- Lookups ---

async fn load_course(repo: &dyn Repository, id: Uuid) -> Result<Course, AppError> {
    repo.get_course(id)
        .await?
        .ok_or_else(|| AppError::not_found("Course not found."))
}

/// Loads a chapter together with its parent course.
async fn load_chapter(repo: &dyn Repository, id: Uuid) -> Result<(Chapter, Course), AppError> {
    let chapter = repo
        .get_chapter(id)
        .await?
        .ok_or_else(|| AppError::not_found("Chapter not found."))?;
    let course = load_course(repo, chapter.course_id).await?;
    Ok((chapter, course))
}

/// Enrollment of the actor in `course`, looked up only when it can matter.
async fn actor_enrolled(
    repo: &dyn Repository,
    actor: &Actor,
    course: &Course,
) -> Result<bool, AppError> {
    match actor.id() {
        Some(id) if id != course.created_by => ledger::is_enrolled(repo, id, course.id).await,
        _ => Ok(false),
    }
}

async fn course_detail(
    repo: &dyn Repository,
    actor: &Actor,
    course: Course,
) -> Result<CourseDetail, AppError> {
    let owner = repo
        .get_user(course.created_by)
        .await?
        .ok_or_else(|| AppError::not_found("Course owner not found."))?;
    let student_count = ledger::student_count(repo, course.id).await?;
    let is_enrolled = match actor.id() {
        Some(id) => ledger::is_enrolled(repo, id, course.id).await?,
        None => false,
    };
    Ok(CourseDetail {
        id: course.id,
        title: course.title,
        description: course.description,
        created_by: UserResponse::from(owner),
        created_at: course.created_at,
        updated_at: course.updated_at,
        student_count,
        is_enrolled,
    })
}

// --- Courses ---

/// list_courses
///
/// Public listing, newest first, optionally restricted to one instructor.
pub async fn list_courses(
    repo: &dyn Repository,
    instructor_id: Option<Uuid>,
) -> Result<Vec<CourseSummary>, AppError> {
    Ok(repo.list_courses(instructor_id).await?)
}

pub async fn get_course(
    repo: &dyn Repository,
    actor: &Actor,
    id: Uuid,
) -> Result<CourseDetail, AppError> {
    let course = load_course(repo, id).await?;
    authorize(actor, EntityKind::Course, Action::Read, &Facts::of(Resource::Course(&course)))?;
    course_detail(repo, actor, course).await
}

/// create_course
///
/// Instructor-only through the `Instructor` capability; the creator becomes the
/// permanent owner.
pub async fn create_course(
    repo: &dyn Repository,
    instructor: &Instructor,
    req: CreateCourseRequest,
) -> Result<CourseDetail, AppError> {
    let actor = Actor::Instructor(*instructor);
    authorize(&actor, EntityKind::Course, Action::Create, &Facts::default())?;
    validate_new_course(&req)?;

    let course = repo.create_course(instructor.id(), req).await?;
    tracing::info!(course = %course.id, owner = %instructor.id(), "course created");
    course_detail(repo, &actor, course).await
}

pub async fn update_course(
    repo: &dyn Repository,
    actor: &Actor,
    id: Uuid,
    req: UpdateCourseRequest,
) -> Result<CourseDetail, AppError> {
    actor.authenticated()?;
    let course = load_course(repo, id).await?;
    authorize(actor, EntityKind::Course, Action::Update, &Facts::of(Resource::Course(&course)))?;
    validate_course_update(&req)?;

    let updated = repo
        .update_course(course.id, req)
        .await?
        .ok_or_else(|| AppError::not_found("Course not found."))?;
    tracing::info!(course = %updated.id, "course updated");
    course_detail(repo, actor, updated).await
}

/// delete_course
///
/// Removes the course with its chapters and enrollments.
pub async fn delete_course(repo: &dyn Repository, actor: &Actor, id: Uuid) -> Result<(), AppError> {
    actor.authenticated()?;
    let course = load_course(repo, id).await?;
    authorize(actor, EntityKind::Course, Action::Delete, &Facts::of(Resource::Course(&course)))?;

    if !repo.delete_course(course.id).await? {
        return Err(AppError::not_found("Course not found."));
    }
    tracing::info!(course = %course.id, "course deleted");
    Ok(())
}

// --- Chapters ---

/// list_chapters
///
/// Course-level gate: the owner and enrolled students see every chapter, anyone
/// else only the public ones. A missing course gives an empty list.
///
/// The store query is narrowed by the listing scope; the policy filter decides
/// which rows are returned.
pub async fn list_chapters(
    repo: &dyn Repository,
    actor: &Actor,
    course_id: Uuid,
) -> Result<Vec<ChapterSummary>, AppError> {
    let course = repo.get_course(course_id).await?;
    let Some(found) = course.as_ref() else {
        return Ok(Vec::new());
    };
    authorize(
        actor,
        EntityKind::Chapter,
        Action::List,
        &Facts::of(Resource::Course(found)),
    )?;

    let enrolled = actor_enrolled(repo, actor, found).await?;
    let rows = repo
        .list_chapters(found.id, listing_scope(actor, found, enrolled))
        .await?;
    let visible = filter_chapters_for_listing(actor, course.as_ref(), enrolled, rows);
    Ok(visible.into_iter().map(ChapterSummary::from).collect())
}

/// get_chapter
///
/// Single-item read: public chapters for anyone, otherwise the owner or an
/// enrolled student.
pub async fn get_chapter(
    repo: &dyn Repository,
    actor: &Actor,
    id: Uuid,
) -> Result<ChapterDetail, AppError> {
    let (chapter, course) = load_chapter(repo, id).await?;
    let enrolled = if chapter.is_public {
        false
    } else {
        actor_enrolled(repo, actor, &course).await?
    };
    authorize(
        actor,
        EntityKind::Chapter,
        Action::Read,
        &Facts::of(Resource::Chapter { chapter: &chapter, course: &course }).enrolled(enrolled),
    )?;

    Ok(ChapterDetail {
        chapter,
        course_title: course.title,
    })
}

/// create_chapter
///
/// Only the owner of the target course may add chapters to it. A duplicate
/// `order` within the course is a `Conflict` raised by the store.
pub async fn create_chapter(
    repo: &dyn Repository,
    instructor: &Instructor,
    course_id: Uuid,
    req: CreateChapterRequest,
) -> Result<ChapterDetail, AppError> {
    let actor = Actor::Instructor(*instructor);
    let course = load_course(repo, course_id).await?;
    authorize(&actor, EntityKind::Chapter, Action::Create, &Facts::of(Resource::Course(&course)))?;
    validate_new_chapter(&req)?;

    let chapter = repo.create_chapter(course.id, req).await?;
    tracing::info!(
        chapter = %chapter.id,
        course = %course.id,
        order = chapter.order,
        "chapter created"
    );
    Ok(ChapterDetail {
        chapter,
        course_title: course.title,
    })
}

pub async fn update_chapter(
    repo: &dyn Repository,
    actor: &Actor,
    id: Uuid,
    req: UpdateChapterRequest,
) -> Result<ChapterDetail, AppError> {
    actor.authenticated()?;
    let (chapter, course) = load_chapter(repo, id).await?;
    authorize(
        actor,
        EntityKind::Chapter,
        Action::Update,
        &Facts::of(Resource::Chapter { chapter: &chapter, course: &course }),
    )?;
    validate_chapter_update(&chapter, &req)?;

    let updated = repo
        .update_chapter(chapter.id, req)
        .await?
        .ok_or_else(|| AppError::not_found("Chapter not found."))?;
    tracing::info!(chapter = %updated.id, "chapter updated");
    Ok(ChapterDetail {
        chapter: updated,
        course_title: course.title,
    })
}

pub async fn delete_chapter(
    repo: &dyn Repository,
    actor: &Actor,
    id: Uuid,
) -> Result<(), AppError> {
    actor.authenticated()?;
    let (chapter, course) = load_chapter(repo, id).await?;
    authorize(
        actor,
        EntityKind::Chapter,
        Action::Delete,
        &Facts::of(Resource::Chapter { chapter: &chapter, course: &course }),
    )?;

    if !repo.delete_chapter(chapter.id).await? {
        return Err(AppError::not_found("Chapter not found."));
    }
    tracing::info!(chapter = %chapter.id, course = %course.id, "chapter deleted");
    Ok(())
}
