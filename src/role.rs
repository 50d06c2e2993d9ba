use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(
    Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Instructor,
}

impl Role {
    /// Indicates whether user with role can create and edit courses
    pub fn can_author(self) -> bool {
        self == Role::Instructor
    }
}

impl std::default::Default for Role {
    fn default() -> Self {
        Role::Student
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Student => write!(f, "student"),
            Role::Instructor => write!(f, "instructor"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_instructors_author() {
        assert!(Role::Instructor.can_author());
        assert!(!Role::Student.can_author());
    }

    #[test]
    fn role_names_match_serialized_form() {
        for role in [Role::Student, Role::Instructor] {
            assert_eq!(
                serde_json::to_value(role).expect("serializable"),
                serde_json::Value::from(role.to_string())
            );
        }
        assert_eq!(
            serde_json::to_string(&Role::Instructor).expect("serializable"),
            "\"instructor\""
        );
    }
}
