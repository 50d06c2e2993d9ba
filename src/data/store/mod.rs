//! Persistence ports. Repositories cover single-record reads and writes, a
//! [`Transaction`] covers everything that touches more than one record.

use std::sync::Arc;

use uuid::Uuid;

use crate::data::course::{Course, CourseQuery, Lesson};
use crate::data::course::db::CourseUpdateData;
use crate::data::user::{User, UserPatch};
use crate::error::StorageError;
use crate::middleware::paging::PageState;

pub mod filter;
pub mod memory;
pub mod mongo;

pub use memory::MemoryStore;
pub use mongo::MongoStore;

pub type SharedStore = Arc<dyn Store>;

#[rocket::async_trait]
pub trait UserRepository: Send + Sync {
    async fn get_user(&self, id: Uuid) -> Result<Option<User>, StorageError>;

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StorageError>;
    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, StorageError>;

    async fn list_users(&self, page: PageState) -> Result<Vec<User>, StorageError>;

    /// Fails with [`StorageError::Duplicate`] if the email or username is taken.
    async fn create_user(&self, user: &User) -> Result<(), StorageError>;

    async fn update_user(&self, id: Uuid, patch: &UserPatch) -> Result<Option<User>, StorageError>;
}

#[rocket::async_trait]
pub trait CourseRepository: Send + Sync {
    async fn get_course(&self, id: Uuid) -> Result<Option<Course>, StorageError>;

    /// Newest first.
    async fn list_courses(
        &self,
        query: &CourseQuery,
        page: PageState,
    ) -> Result<Vec<Course>, StorageError>;

    async fn create_course(&self, course: &Course) -> Result<(), StorageError>;

    /// Only touches the fields present in `patch`. Enrollment and lessons are
    /// never overwritten.
    async fn update_course(
        &self,
        id: Uuid,
        patch: &CourseUpdateData,
    ) -> Result<Option<Course>, StorageError>;

    async fn push_lesson(&self, id: Uuid, lesson: &Lesson) -> Result<bool, StorageError>;
}

/// Unit of work over both collections. Writes made through it become visible
/// to others on [`Transaction::commit`] and are undone by
/// [`Transaction::abort`]. Dropping without either is equivalent to abort for
/// transactional backends only, so callers always finish explicitly.
///
/// Membership writes return whether the record changed, which doubles as the
/// in-transaction re-validation of the caller's earlier read.
#[rocket::async_trait]
pub trait Transaction: Send {
    async fn user(&mut self, id: Uuid) -> Result<Option<User>, StorageError>;
    async fn course(&mut self, id: Uuid) -> Result<Option<Course>, StorageError>;

    async fn insert_course(&mut self, course: &Course) -> Result<(), StorageError>;
    async fn remove_course(&mut self, id: Uuid) -> Result<Option<Course>, StorageError>;
    async fn remove_user(&mut self, id: Uuid) -> Result<Option<User>, StorageError>;

    async fn add_student(&mut self, course: Uuid, user: Uuid) -> Result<bool, StorageError>;
    async fn remove_student(&mut self, course: Uuid, user: Uuid) -> Result<bool, StorageError>;

    async fn add_enrolled_course(&mut self, user: Uuid, course: Uuid) -> Result<bool, StorageError>;
    async fn remove_enrolled_course(
        &mut self,
        user: Uuid,
        course: Uuid,
    ) -> Result<bool, StorageError>;

    async fn add_created_course(&mut self, user: Uuid, course: Uuid) -> Result<bool, StorageError>;
    async fn remove_created_course(
        &mut self,
        user: Uuid,
        course: Uuid,
    ) -> Result<bool, StorageError>;

    /// Removes `course` from the enrolled courses of every user. Returns the
    /// number of users changed.
    async fn forget_course(&mut self, course: Uuid) -> Result<u64, StorageError>;

    async fn commit(self: Box<Self>) -> Result<(), StorageError>;
    async fn abort(self: Box<Self>) -> Result<(), StorageError>;
}

#[rocket::async_trait]
pub trait Store: UserRepository + CourseRepository {
    async fn begin(&self) -> Result<Box<dyn Transaction + '_>, StorageError>;
}
