//! Domain operations. Route handlers translate HTTP into these calls; every
//! write that touches more than one record runs inside one
//! [`Transaction`](crate::data::store::Transaction).

use crate::data::store::Transaction;
use crate::error::{ServiceError, StorageError};

pub mod access;
pub mod accounts;
pub mod courses;
pub mod enrollment;

/// Commits `tx` if `result` is a success, aborts it otherwise.
pub(crate) async fn finish<T>(
    tx: Box<dyn Transaction + '_>,
    result: Result<T, ServiceError>,
) -> Result<T, ServiceError> {
    match result {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(e) => {
            tracing::debug!("Aborting unit of work: {}", e);
            if let Err(abort) = tx.abort().await {
                tracing::error!("Unable to roll back after '{}': {}", e, abort);
                return Err(StorageError::Rollback {
                    cause: e.to_string(),
                    reason: abort.to_string(),
                }
                .into());
            }
            Err(e)
        }
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use std::sync::Arc;

    use crate::data::course::db::CourseCreateData;
    use crate::data::course::{Course, Level};
    use crate::data::store::{MemoryStore, UserRepository};
    use crate::data::user::User;
    use crate::role::Role;
    use crate::security::Security;

    pub fn store() -> Arc<MemoryStore> {
        Arc::new(MemoryStore::new())
    }

    pub async fn user(store: &MemoryStore, name: &str, role: Role) -> User {
        let user = User::new(
            format!("{}@example.com", name),
            name,
            "password123",
            role,
            &Security::ephemeral(4),
        );
        store.create_user(&user).await.expect("fixture user");
        user
    }

    pub fn course_data(title: &str) -> CourseCreateData {
        CourseCreateData {
            title: title.to_string(),
            description: "A course about things".to_string(),
            thumbnail: None,
            category: "Programming".to_string(),
            level: Level::Beginner,
            duration: 90,
            price: 19.99,
        }
    }

    /// Stores a course owned by `instructor` with both sides of the ownership
    /// link in place.
    pub async fn course(store: &MemoryStore, instructor: &User, title: &str) -> Course {
        let course = course_data(title).into_course(instructor);
        let mut owner = instructor.clone();
        owner.created_courses.push(course.id);
        store.put_user(owner).await;
        store.put_course(course.clone()).await;
        course
    }
}
