//! Who may do what. Every mutating course or account operation asks
//! [`authorize`] before it writes anything.

use crate::data::course::Course;
use crate::data::user::User;
use crate::error::ServiceError;

#[derive(Debug, Clone, Copy)]
pub enum Action<'a> {
    CreateCourse,
    UpdateCourse(&'a Course),
    DeleteCourse(&'a Course),
    AddLesson(&'a Course),
    ViewLesson(&'a Course),
    DeleteAccount(&'a User),
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Denial {
    NotInstructor,
    NotOwner,
    NotEnrolled,
    NotAccountHolder,
}

impl std::fmt::Display for Denial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Denial::NotInstructor => write!(f, "only instructors can author courses"),
            Denial::NotOwner => write!(f, "only the course instructor can change it"),
            Denial::NotEnrolled => write!(f, "lesson content requires enrollment"),
            Denial::NotAccountHolder => write!(f, "accounts can only be deleted by their holder"),
        }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Access {
    Allow,
    Deny(Denial),
}

impl Access {
    pub fn require(self) -> Result<(), ServiceError> {
        match self {
            Access::Allow => Ok(()),
            Access::Deny(reason) => Err(ServiceError::Forbidden(reason)),
        }
    }
}

pub fn authorize(actor: &User, action: Action<'_>) -> Access {
    let owns = |course: &Course| {
        if !actor.user_role.can_author() {
            Access::Deny(Denial::NotInstructor)
        } else if !course.is_owned_by(actor.id) {
            Access::Deny(Denial::NotOwner)
        } else {
            Access::Allow
        }
    };

    match action {
        Action::CreateCourse if actor.user_role.can_author() => Access::Allow,
        Action::CreateCourse => Access::Deny(Denial::NotInstructor),
        Action::UpdateCourse(course) | Action::DeleteCourse(course) | Action::AddLesson(course) => {
            owns(course)
        }
        Action::ViewLesson(course) => {
            if course.is_owned_by(actor.id) || course.has_student(actor.id) {
                Access::Allow
            } else {
                Access::Deny(Denial::NotEnrolled)
            }
        }
        Action::DeleteAccount(target) if target.id == actor.id => Access::Allow,
        Action::DeleteAccount(_) => Access::Deny(Denial::NotAccountHolder),
    }
}
