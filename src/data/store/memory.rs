use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use super::{CourseRepository, Store, Transaction, UserRepository};
use crate::data::course::db::CourseUpdateData;
use crate::data::course::{Course, CourseQuery, Lesson};
use crate::data::user::{User, UserPatch};
use crate::error::StorageError;
use crate::middleware::paging::PageState;
use crate::util::{insert_unique, remove_all};

#[derive(Debug, Clone, Default)]
struct Collections {
    users: HashMap<Uuid, User>,
    courses: HashMap<Uuid, Course>,
}

impl Collections {
    fn user_mut(&mut self, id: Uuid) -> Option<&mut User> {
        self.users.get_mut(&id)
    }

    fn course_mut(&mut self, id: Uuid) -> Option<&mut Course> {
        self.courses.get_mut(&id)
    }

    fn check_unique(&self, user: &User) -> Result<(), StorageError> {
        for existing in self.users.values().filter(|it| it.id != user.id) {
            if existing.email == user.email {
                return Err(StorageError::Duplicate("email"));
            }
            if existing.username == user.username {
                return Err(StorageError::Duplicate("username"));
            }
        }
        Ok(())
    }
}

/// Counts writes down to an injected failure.
#[derive(Debug, Default)]
struct FaultPlan {
    countdown: AtomicUsize,
}

impl FaultPlan {
    fn tick(&self, operation: &'static str) -> Result<(), StorageError> {
        match self
            .countdown
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        {
            Ok(1) => {
                tracing::warn!("injecting storage fault on {}", operation);
                Err(StorageError::Injected(operation))
            }
            _ => Ok(()),
        }
    }
}

/// In-process store. Units of work are serialized behind one lock and write to
/// a staged copy of the collections that replaces the live one on commit.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<Collections>>,
    faults: Arc<FaultPlan>,
}

impl MemoryStore {
    pub fn new() -> MemoryStore {
        MemoryStore::default()
    }

    /// Makes the `n`-th write from now fail with [`StorageError::Injected`].
    /// `0` disarms a pending fault.
    pub fn fail_nth_write(&self, n: usize) {
        self.faults.countdown.store(n, Ordering::SeqCst);
    }

    /// Inserts a record as-is, bypassing uniqueness checks and faults.
    pub async fn put_user(&self, user: User) {
        self.state.lock().await.users.insert(user.id, user);
    }

    pub async fn put_course(&self, course: Course) {
        self.state.lock().await.courses.insert(course.id, course);
    }
}

#[rocket::async_trait]
impl UserRepository for MemoryStore {
    async fn get_user(&self, id: Uuid) -> Result<Option<User>, StorageError> {
        Ok(self.state.lock().await.users.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StorageError> {
        let state = self.state.lock().await;
        Ok(state.users.values().find(|it| it.email == email).cloned())
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, StorageError> {
        let state = self.state.lock().await;
        Ok(state
            .users
            .values()
            .find(|it| it.username == username)
            .cloned())
    }

    async fn list_users(&self, page: PageState) -> Result<Vec<User>, StorageError> {
        let state = self.state.lock().await;
        let mut users: Vec<User> = state.users.values().cloned().collect();
        users.sort_by(|a, b| a.username.cmp(&b.username));
        Ok(page.window(users))
    }

    async fn create_user(&self, user: &User) -> Result<(), StorageError> {
        let mut state = self.state.lock().await;
        state.check_unique(user)?;
        self.faults.tick("create_user")?;
        state.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn update_user(&self, id: Uuid, patch: &UserPatch) -> Result<Option<User>, StorageError> {
        let mut state = self.state.lock().await;
        let mut updated = match state.users.get(&id) {
            Some(user) => user.clone(),
            None => return Ok(None),
        };
        if let Some(username) = &patch.username {
            updated.username = username.clone();
        }
        if let Some(avatar) = &patch.avatar {
            updated.avatar = avatar.clone();
        }
        state.check_unique(&updated)?;
        self.faults.tick("update_user")?;
        state.users.insert(id, updated.clone());
        Ok(Some(updated))
    }
}

#[rocket::async_trait]
impl CourseRepository for MemoryStore {
    async fn get_course(&self, id: Uuid) -> Result<Option<Course>, StorageError> {
        Ok(self.state.lock().await.courses.get(&id).cloned())
    }

    async fn list_courses(
        &self,
        query: &CourseQuery,
        page: PageState,
    ) -> Result<Vec<Course>, StorageError> {
        let state = self.state.lock().await;
        let mut courses: Vec<Course> = state
            .courses
            .values()
            .filter(|it| query.matches(it))
            .cloned()
            .collect();
        courses.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        Ok(page.window(courses))
    }

    async fn create_course(&self, course: &Course) -> Result<(), StorageError> {
        let mut state = self.state.lock().await;
        self.faults.tick("create_course")?;
        state.courses.insert(course.id, course.clone());
        Ok(())
    }

    async fn update_course(
        &self,
        id: Uuid,
        patch: &CourseUpdateData,
    ) -> Result<Option<Course>, StorageError> {
        let mut state = self.state.lock().await;
        if !state.courses.contains_key(&id) {
            return Ok(None);
        }
        self.faults.tick("update_course")?;
        Ok(state.course_mut(id).map(|course| {
            patch.apply(course);
            course.clone()
        }))
    }

    async fn push_lesson(&self, id: Uuid, lesson: &Lesson) -> Result<bool, StorageError> {
        let mut state = self.state.lock().await;
        if !state.courses.contains_key(&id) {
            return Ok(false);
        }
        self.faults.tick("push_lesson")?;
        Ok(state
            .course_mut(id)
            .map(|course| {
                course.lessons.push(lesson.clone());
                course.updated_at = chrono::Utc::now();
            })
            .is_some())
    }
}

#[rocket::async_trait]
impl Store for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn Transaction + '_>, StorageError> {
        let guard = self.state.clone().lock_owned().await;
        let staged = guard.clone();
        Ok(Box::new(MemoryTransaction {
            guard,
            staged,
            faults: self.faults.clone(),
        }))
    }
}

pub struct MemoryTransaction {
    guard: OwnedMutexGuard<Collections>,
    staged: Collections,
    faults: Arc<FaultPlan>,
}

impl MemoryTransaction {
    fn user_list(
        &mut self,
        user: Uuid,
        operation: &'static str,
        edit: impl FnOnce(&mut User) -> bool,
    ) -> Result<bool, StorageError> {
        self.faults.tick(operation)?;
        Ok(self.staged.user_mut(user).map(edit).unwrap_or(false))
    }

    fn course_list(
        &mut self,
        course: Uuid,
        operation: &'static str,
        edit: impl FnOnce(&mut Course) -> bool,
    ) -> Result<bool, StorageError> {
        self.faults.tick(operation)?;
        Ok(self
            .staged
            .course_mut(course)
            .map(|it| {
                let changed = edit(it);
                if changed {
                    it.updated_at = chrono::Utc::now();
                }
                changed
            })
            .unwrap_or(false))
    }
}

#[rocket::async_trait]
impl Transaction for MemoryTransaction {
    async fn user(&mut self, id: Uuid) -> Result<Option<User>, StorageError> {
        Ok(self.staged.users.get(&id).cloned())
    }

    async fn course(&mut self, id: Uuid) -> Result<Option<Course>, StorageError> {
        Ok(self.staged.courses.get(&id).cloned())
    }

    async fn insert_course(&mut self, course: &Course) -> Result<(), StorageError> {
        self.faults.tick("insert_course")?;
        self.staged.courses.insert(course.id, course.clone());
        Ok(())
    }

    async fn remove_course(&mut self, id: Uuid) -> Result<Option<Course>, StorageError> {
        self.faults.tick("remove_course")?;
        Ok(self.staged.courses.remove(&id))
    }

    async fn remove_user(&mut self, id: Uuid) -> Result<Option<User>, StorageError> {
        self.faults.tick("remove_user")?;
        Ok(self.staged.users.remove(&id))
    }

    async fn add_student(&mut self, course: Uuid, user: Uuid) -> Result<bool, StorageError> {
        self.course_list(course, "add_student", |it| {
            insert_unique(&mut it.enrolled_students, user)
        })
    }

    async fn remove_student(&mut self, course: Uuid, user: Uuid) -> Result<bool, StorageError> {
        self.course_list(course, "remove_student", |it| {
            remove_all(&mut it.enrolled_students, &user)
        })
    }

    async fn add_enrolled_course(&mut self, user: Uuid, course: Uuid) -> Result<bool, StorageError> {
        self.user_list(user, "add_enrolled_course", |it| {
            insert_unique(&mut it.enrolled_courses, course)
        })
    }

    async fn remove_enrolled_course(
        &mut self,
        user: Uuid,
        course: Uuid,
    ) -> Result<bool, StorageError> {
        self.user_list(user, "remove_enrolled_course", |it| {
            remove_all(&mut it.enrolled_courses, &course)
        })
    }

    async fn add_created_course(&mut self, user: Uuid, course: Uuid) -> Result<bool, StorageError> {
        self.user_list(user, "add_created_course", |it| {
            insert_unique(&mut it.created_courses, course)
        })
    }

    async fn remove_created_course(
        &mut self,
        user: Uuid,
        course: Uuid,
    ) -> Result<bool, StorageError> {
        self.user_list(user, "remove_created_course", |it| {
            remove_all(&mut it.created_courses, &course)
        })
    }

    async fn forget_course(&mut self, course: Uuid) -> Result<u64, StorageError> {
        self.faults.tick("forget_course")?;
        let changed = self
            .staged
            .users
            .values_mut()
            .map(|it| remove_all(&mut it.enrolled_courses, &course))
            .filter(|changed| *changed)
            .count();
        Ok(changed as u64)
    }

    async fn commit(self: Box<Self>) -> Result<(), StorageError> {
        let MemoryTransaction {
            mut guard, staged, ..
        } = *self;
        *guard = staged;
        Ok(())
    }

    async fn abort(self: Box<Self>) -> Result<(), StorageError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::role::Role;
    use crate::security::Security;

    fn user(name: &str) -> User {
        User::new(
            format!("{}@example.com", name),
            name,
            "password123",
            Role::Student,
            &Security::ephemeral(4),
        )
    }

    #[tokio::test]
    async fn committed_writes_become_visible() {
        let store = MemoryStore::new();
        let alice = user("alice");
        store.create_user(&alice).await.expect("user created");

        let course = Uuid::new_v4();
        let mut tx = store.begin().await.expect("transaction");
        assert!(tx.add_enrolled_course(alice.id, course).await.expect("write"));
        assert!(!tx.add_enrolled_course(alice.id, course).await.expect("write"));
        tx.commit().await.expect("commit");

        let stored = store.get_user(alice.id).await.expect("read").expect("user");
        assert_eq!(stored.enrolled_courses, vec![course]);
    }

    #[tokio::test]
    async fn aborted_writes_are_discarded() {
        let store = MemoryStore::new();
        let alice = user("alice");
        store.create_user(&alice).await.expect("user created");

        let mut tx = store.begin().await.expect("transaction");
        tx.add_enrolled_course(alice.id, Uuid::new_v4())
            .await
            .expect("write");
        assert!(tx.remove_user(alice.id).await.expect("write").is_some());
        tx.abort().await.expect("abort");

        let stored = store.get_user(alice.id).await.expect("read").expect("user");
        assert!(stored.enrolled_courses.is_empty());
    }

    #[tokio::test]
    async fn injected_fault_hits_requested_write_once() {
        let store = MemoryStore::new();
        let alice = user("alice");
        store.create_user(&alice).await.expect("user created");
        store.fail_nth_write(2);

        let mut tx = store.begin().await.expect("transaction");
        tx.add_created_course(alice.id, Uuid::new_v4())
            .await
            .expect("first write passes");
        assert!(matches!(
            tx.add_created_course(alice.id, Uuid::new_v4()).await,
            Err(StorageError::Injected("add_created_course"))
        ));
        assert!(tx.add_created_course(alice.id, Uuid::new_v4()).await.is_ok());
        tx.abort().await.expect("abort");
    }

    #[tokio::test]
    async fn unique_email_and_username() {
        let store = MemoryStore::new();
        store.create_user(&user("alice")).await.expect("user created");

        let mut same_name = user("alice");
        same_name.email = "other@example.com".to_string();
        assert!(matches!(
            store.create_user(&same_name).await,
            Err(StorageError::Duplicate("username"))
        ));
        assert!(matches!(
            store.create_user(&user("alice")).await,
            Err(StorageError::Duplicate("email"))
        ));
    }

    #[tokio::test]
    async fn user_patch_updates_avatar() {
        let store = MemoryStore::new();
        let alice = user("alice");
        store.create_user(&alice).await.expect("user created");

        let patch = UserPatch {
            avatar: Some(Some("https://cdn.example.com/a.png".to_string())),
            ..Default::default()
        };
        let updated = store
            .update_user(alice.id, &patch)
            .await
            .expect("update")
            .expect("user exists");
        assert_eq!(updated.avatar.as_deref(), Some("https://cdn.example.com/a.png"));

        assert!(store
            .update_user(Uuid::new_v4(), &patch)
            .await
            .expect("update")
            .is_none());
    }
}
