//! Authorization core: who may read or write which course and chapter.
//!
//! Three layers live here:
//!
//! * the **ownership model** ([`Resource::owner_of`]): a course is owned by its
//!   creator, a chapter by the owner of its course;
//! * the **visibility policy** ([`can_read_chapter`], [`can_write`],
//!   [`listing_scope`]): pure functions of an [`Actor`] and a few facts about the
//!   target;
//! * the **authorization gate** ([`authorize`]): a declarative table mapping
//!   `(EntityKind, Action)` to an ordered list of predicate steps, evaluated with
//!   short-circuiting.
//!
//! Nothing in this module touches the store. Callers look up the entity and the
//! enrollment fact first and pass them in as [`Facts`].

use uuid::Uuid;

use crate::error::AppError;
use crate::models::{Chapter, Course, Role};

// --- Actors & Capabilities ---

/// Capability held by an authenticated instructor.
///
/// Only [`Actor::from_identity`] can build one, so an operation that takes
/// `&Instructor` is unreachable for students and anonymous callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instructor {
    id: Uuid,
}

impl Instructor {
    pub fn id(&self) -> Uuid {
        self.id
    }
}

/// Capability held by an authenticated student.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Student {
    id: Uuid,
}

impl Student {
    pub fn id(&self) -> Uuid {
        self.id
    }
}

/// Actor
///
/// The identity context of a request. Threaded explicitly into every core
/// operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actor {
    Anonymous,
    Instructor(Instructor),
    Student(Student),
}

impl Actor {
    /// Build the actor for an authenticated user of the given role.
    pub fn from_identity(id: Uuid, role: Role) -> Self {
        match role {
            Role::Instructor => Actor::Instructor(Instructor { id }),
            Role::Student => Actor::Student(Student { id }),
        }
    }

    pub fn id(&self) -> Option<Uuid> {
        match self {
            Actor::Anonymous => None,
            Actor::Instructor(i) => Some(i.id),
            Actor::Student(s) => Some(s.id),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        !matches!(self, Actor::Anonymous)
    }

    /// The authenticated user id, or `Unauthenticated`.
    pub fn authenticated(&self) -> Result<Uuid, AppError> {
        self.id().ok_or_else(AppError::unauthenticated)
    }

    /// The instructor capability, or `Unauthenticated` / `Forbidden`.
    pub fn instructor(&self) -> Result<&Instructor, AppError> {
        match self {
            Actor::Instructor(instructor) => Ok(instructor),
            Actor::Anonymous => Err(AppError::unauthenticated()),
            Actor::Student(_) => Err(AppError::forbidden(
                "Only instructors can perform this action.",
            )),
        }
    }

    /// The student capability, or `Unauthenticated` / `Forbidden`.
    pub fn student(&self) -> Result<&Student, AppError> {
        match self {
            Actor::Student(student) => Ok(student),
            Actor::Anonymous => Err(AppError::unauthenticated()),
            Actor::Instructor(_) => Err(AppError::forbidden(
                "Only students can perform this action.",
            )),
        }
    }
}

// --- Ownership Model ---

/// Resource
///
/// The closed set of ownable entities. A chapter is always carried together
/// with its parent course, since ownership is delegated and never stored on
/// the chapter itself.
#[derive(Debug, Clone, Copy)]
pub enum Resource<'a> {
    Course(&'a Course),
    Chapter {
        chapter: &'a Chapter,
        course: &'a Course,
    },
}

impl Resource<'_> {
    pub fn owner_of(&self) -> Uuid {
        match self {
            Resource::Course(course) => course.created_by,
            Resource::Chapter { chapter, course } => {
                debug_assert_eq!(chapter.course_id, course.id);
                course.created_by
            }
        }
    }

    pub fn kind(&self) -> EntityKind {
        match self {
            Resource::Course(_) => EntityKind::Course,
            Resource::Chapter { .. } => EntityKind::Chapter,
        }
    }

    fn is_public(&self) -> bool {
        match self {
            Resource::Course(_) => false,
            Resource::Chapter { chapter, .. } => chapter.is_public,
        }
    }
}

// --- Authorization Gate ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Course,
    Chapter,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    List,
    Read,
    Create,
    Update,
    Delete,
    Enroll,
    Unenroll,
}

impl Action {
    pub fn is_read_only(self) -> bool {
        matches!(self, Action::List | Action::Read)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Predicate {
    Authenticated,
    IsOwner,
    IsEnrolled,
    /// The target is public and the action does not write.
    IsPublicRead,
}

/// The error kind a failed step produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Denial {
    Unauthenticated,
    Forbidden,
    NotFound,
    Conflict,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Allow immediately when the predicate holds.
    Grant(Predicate),
    /// Deny when the predicate does not hold.
    Require(Predicate, Denial),
    /// Deny when the predicate holds.
    Reject(Predicate, Denial),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Allow,
    Deny(Denial),
}

/// Rule
///
/// Ordered steps plus the verdict reached when no step decided.
#[derive(Debug, Clone, Copy)]
pub struct Rule {
    pub steps: &'static [Step],
    pub otherwise: Verdict,
}

const OPEN: Rule = Rule {
    steps: &[],
    otherwise: Verdict::Allow,
};

const SIGNED_IN: Rule = Rule {
    steps: &[Step::Require(Predicate::Authenticated, Denial::Unauthenticated)],
    otherwise: Verdict::Allow,
};

const OWNER_ONLY: Rule = Rule {
    steps: &[
        Step::Require(Predicate::Authenticated, Denial::Unauthenticated),
        Step::Require(Predicate::IsOwner, Denial::Forbidden),
    ],
    otherwise: Verdict::Allow,
};

const CHAPTER_READ: Rule = Rule {
    steps: &[
        Step::Grant(Predicate::IsPublicRead),
        Step::Require(Predicate::Authenticated, Denial::Unauthenticated),
        Step::Grant(Predicate::IsOwner),
        Step::Grant(Predicate::IsEnrolled),
    ],
    otherwise: Verdict::Deny(Denial::Forbidden),
};

const ENROLL: Rule = Rule {
    steps: &[
        Step::Require(Predicate::Authenticated, Denial::Unauthenticated),
        Step::Reject(Predicate::IsEnrolled, Denial::Conflict),
    ],
    otherwise: Verdict::Allow,
};

const UNENROLL: Rule = Rule {
    steps: &[
        Step::Require(Predicate::Authenticated, Denial::Unauthenticated),
        Step::Require(Predicate::IsEnrolled, Denial::NotFound),
    ],
    otherwise: Verdict::Allow,
};

/// The dispatch table.
///
/// Role requirements (instructor-only creation, student-only enrollment) are not
/// listed: they are enforced by the `Instructor` / `Student` capability types the
/// operations take.
pub fn rule_for(kind: EntityKind, action: Action) -> Rule {
    use Action::*;
    match (kind, action) {
        (_, List) => OPEN,
        (EntityKind::Course, Read) => OPEN,
        (EntityKind::Chapter, Read) => CHAPTER_READ,
        (EntityKind::Course, Create) => SIGNED_IN,
        (EntityKind::Chapter, Create) => OWNER_ONLY,
        (_, Update | Delete) => OWNER_ONLY,
        (EntityKind::Course, Enroll) => ENROLL,
        (EntityKind::Course, Unenroll) => UNENROLL,
        // Chapters are never enrolled in directly.
        (EntityKind::Chapter, Enroll | Unenroll) => Rule {
            steps: &[],
            otherwise: Verdict::Deny(Denial::Forbidden),
        },
    }
}

/// Facts
///
/// What the gate needs to know about the target, gathered by the caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Facts {
    /// Resolved owner of the target (see [`Resource::owner_of`]).
    pub owner: Option<Uuid>,
    /// Whether the actor is enrolled in the target's course.
    pub enrolled: bool,
    pub public: bool,
}

impl Facts {
    pub fn of(resource: Resource<'_>) -> Self {
        Self {
            owner: Some(resource.owner_of()),
            enrolled: false,
            public: resource.is_public(),
        }
    }

    pub fn enrolled(mut self, enrolled: bool) -> Self {
        self.enrolled = enrolled;
        self
    }
}

fn holds(predicate: Predicate, actor: &Actor, action: Action, facts: &Facts) -> bool {
    match predicate {
        Predicate::Authenticated => actor.is_authenticated(),
        Predicate::IsOwner => actor.id().is_some() && actor.id() == facts.owner,
        Predicate::IsEnrolled => actor.is_authenticated() && facts.enrolled,
        Predicate::IsPublicRead => facts.public && action.is_read_only(),
    }
}

/// Evaluate the rule for `(kind, action)` step by step; the first step that
/// decides wins.
pub fn evaluate(actor: &Actor, kind: EntityKind, action: Action, facts: &Facts) -> Verdict {
    let rule = rule_for(kind, action);
    for step in rule.steps {
        match *step {
            Step::Grant(p) if holds(p, actor, action, facts) => return Verdict::Allow,
            Step::Require(p, denial) if !holds(p, actor, action, facts) => {
                return Verdict::Deny(denial);
            }
            Step::Reject(p, denial) if holds(p, actor, action, facts) => {
                return Verdict::Deny(denial);
            }
            _ => {}
        }
    }
    rule.otherwise
}

/// authorize
///
/// Gate entry point: `evaluate` turned into a `Result` carrying the matching
/// `AppError`.
pub fn authorize(
    actor: &Actor,
    kind: EntityKind,
    action: Action,
    facts: &Facts,
) -> Result<(), AppError> {
    match evaluate(actor, kind, action, facts) {
        Verdict::Allow => Ok(()),
        Verdict::Deny(denial) => {
            tracing::debug!(?kind, ?action, ?denial, actor = ?actor.id(), "authorization denied");
            Err(denial_error(kind, action, denial))
        }
    }
}

fn denial_error(kind: EntityKind, action: Action, denial: Denial) -> AppError {
    match denial {
        Denial::Unauthenticated => AppError::unauthenticated(),
        Denial::Forbidden => AppError::forbidden(match (kind, action) {
            (EntityKind::Chapter, Action::Read) => {
                "You must be enrolled in this course to view this chapter."
            }
            (EntityKind::Chapter, Action::Create) => {
                "You can only create chapters for your own courses."
            }
            _ => "You do not have permission to perform this action.",
        }),
        Denial::NotFound => AppError::not_found(match action {
            Action::Unenroll => "You are not enrolled in this course.",
            _ => "Not found.",
        }),
        Denial::Conflict => AppError::conflict(match action {
            Action::Enroll => "You are already enrolled in this course.",
            _ => "Conflict.",
        }),
    }
}

// --- Visibility Policy ---

/// Single-chapter read: public chapters are readable by anyone; otherwise the
/// actor must own the course or be enrolled in it.
///
/// Yes/no form of the `(Chapter, Read)` rule. Operations call [`authorize`]
/// instead, which also says whether a denial is 401 or 403.
pub fn can_read_chapter(actor: &Actor, chapter: &Chapter, course: &Course, enrolled: bool) -> bool {
    let facts = Facts::of(Resource::Chapter { chapter, course }).enrolled(enrolled);
    evaluate(actor, EntityKind::Chapter, Action::Read, &facts) == Verdict::Allow
}

/// Update/delete of a course or chapter: owner only.
///
/// Yes/no form of the `Update`/`Delete` rules; see [`can_read_chapter`].
pub fn can_write(actor: &Actor, resource: Resource<'_>) -> bool {
    evaluate(actor, resource.kind(), Action::Update, &Facts::of(resource)) == Verdict::Allow
}

/// Which chapters of a course a listing returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChapterScope {
    All,
    PublicOnly,
}

/// Chapter-list gate, evaluated once per course rather than once per chapter:
/// the owner and enrolled students see every chapter, everyone else only the
/// public ones.
pub fn listing_scope(actor: &Actor, course: &Course, enrolled: bool) -> ChapterScope {
    let facts = Facts::of(Resource::Course(course)).enrolled(enrolled);
    let member = holds(Predicate::IsOwner, actor, Action::List, &facts)
        || holds(Predicate::IsEnrolled, actor, Action::List, &facts);
    if member {
        ChapterScope::All
    } else {
        ChapterScope::PublicOnly
    }
}

/// filter_chapters_for_listing
///
/// Applies the listing rule to an already loaded set of chapters. A missing
/// course yields an empty list, not an error. The result is always sorted by
/// `order`.
pub fn filter_chapters_for_listing(
    actor: &Actor,
    course: Option<&Course>,
    enrolled: bool,
    chapters: Vec<Chapter>,
) -> Vec<Chapter> {
    let Some(course) = course else {
        return Vec::new();
    };
    let scope = listing_scope(actor, course, enrolled);
    let mut visible: Vec<Chapter> = chapters
        .into_iter()
        .filter(|c| c.course_id == course.id)
        .filter(|c| scope == ChapterScope::All || c.is_public)
        .collect();
    visible.sort_by_key(|c| c.order);
    visible
}
