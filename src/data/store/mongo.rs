use bson::{doc, Bson, Document};
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::options::{
    Acknowledgment, FindOneAndUpdateOptions, FindOptions, IndexOptions, ReadConcern,
    ReturnDocument, TransactionOptions, WriteConcern,
};
use mongodb::{Client, ClientSession, Collection, Database, IndexModel};
use rocket::futures::TryStreamExt;
use uuid::Uuid;

use super::filter;
use super::{CourseRepository, Store, Transaction, UserRepository};
use crate::data::course::db::CourseUpdateData;
use crate::data::course::{Course, CourseQuery, Lesson, COURSE_COLLECTION_NAME};
use crate::data::user::{User, UserPatch, USER_COLLECTION_NAME};
use crate::error::StorageError;
use crate::middleware::paging::PageState;

const DUPLICATE_KEY: i32 = 11000;

fn map_duplicate(e: mongodb::error::Error) -> StorageError {
    let message = match e.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(w)) if w.code == DUPLICATE_KEY => {
            Some(w.message.clone())
        }
        ErrorKind::Command(c) if c.code == DUPLICATE_KEY => Some(c.message.clone()),
        _ => None,
    };

    match message {
        Some(m) if m.contains("username") => StorageError::Duplicate("username"),
        Some(_) => StorageError::Duplicate("email"),
        None => StorageError::Database(e),
    }
}

fn after_update() -> FindOneAndUpdateOptions {
    FindOneAndUpdateOptions::builder()
        .return_document(ReturnDocument::After)
        .build()
}

#[derive(Debug, Clone)]
pub struct MongoStore {
    client: Client,
    db: Database,
    transactions: bool,
}

impl MongoStore {
    /// Connects and prepares indexes. `transactions` forces the unit of work
    /// mode; when `None` it's derived from the deployment topology.
    pub async fn connect(
        uri: &str,
        db_name: &str,
        transactions: Option<bool>,
    ) -> Result<MongoStore, StorageError> {
        tracing::info!("Connecting to MongoDB: {}", uri);
        let client = Client::with_uri_str(uri).await?;

        tracing::info!("Using MongoDB database: {}", db_name);
        let db = client.database(db_name);

        let transactions = match transactions {
            Some(forced) => forced,
            None => supports_transactions(&client).await?,
        };
        if transactions {
            tracing::info!("Multi-document transactions enabled.");
        } else {
            tracing::warn!(
                "MongoDB deployment doesn't support transactions. Falling back to compensating writes."
            );
        }

        let store = MongoStore {
            client,
            db,
            transactions,
        };
        store.ensure_indexes().await?;

        Ok(store)
    }

    fn users(&self) -> Collection<User> {
        self.db.collection(USER_COLLECTION_NAME)
    }

    fn courses(&self) -> Collection<Course> {
        self.db.collection(COURSE_COLLECTION_NAME)
    }

    async fn ensure_indexes(&self) -> Result<(), StorageError> {
        let unique = IndexOptions::builder().unique(true).build();

        for key in ["email", "username"] {
            self.users()
                .create_index(
                    IndexModel::builder()
                        .keys(doc! { key: 1 })
                        .options(unique.clone())
                        .build(),
                    None,
                )
                .await?;
        }

        self.users()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "enrolled_courses": 1 })
                    .build(),
                None,
            )
            .await?;
        self.courses()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "created_at": -1 })
                    .build(),
                None,
            )
            .await?;

        tracing::debug!("MongoDB indexes ready");
        Ok(())
    }
}

/// Transactions need a replica set or a sharded cluster.
async fn supports_transactions(client: &Client) -> Result<bool, StorageError> {
    let hello = client
        .database("admin")
        .run_command(doc! { "hello": 1 }, None)
        .await?;

    Ok(hello.contains_key("setName") || matches!(hello.get_str("msg"), Ok("isdbgrid")))
}

#[rocket::async_trait]
impl UserRepository for MongoStore {
    async fn get_user(&self, id: Uuid) -> Result<Option<User>, StorageError> {
        Ok(self.users().find_one(filter::by_id(id), None).await?)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StorageError> {
        Ok(self.users().find_one(filter::by_email(email), None).await?)
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, StorageError> {
        Ok(self
            .users()
            .find_one(filter::by_username(username), None)
            .await?)
    }

    async fn list_users(&self, page: PageState) -> Result<Vec<User>, StorageError> {
        let options = FindOptions::builder()
            .sort(doc! { "username": 1 })
            .skip(page.skip())
            .limit(page.page_length as i64)
            .build();

        Ok(self
            .users()
            .find(None, options)
            .await?
            .try_collect()
            .await?)
    }

    async fn create_user(&self, user: &User) -> Result<(), StorageError> {
        self.users()
            .insert_one(user, None)
            .await
            .map_err(map_duplicate)?;
        Ok(())
    }

    async fn update_user(&self, id: Uuid, patch: &UserPatch) -> Result<Option<User>, StorageError> {
        let mut set = Document::new();
        let mut unset = Document::new();
        if let Some(username) = &patch.username {
            set.insert("username", username.clone());
        }
        match &patch.avatar {
            Some(Some(avatar)) => {
                set.insert("avatar", avatar.clone());
            }
            Some(None) => {
                unset.insert("avatar", "");
            }
            None => {}
        }

        let mut update = Document::new();
        if !set.is_empty() {
            update.insert("$set", set);
        }
        if !unset.is_empty() {
            update.insert("$unset", unset);
        }
        if update.is_empty() {
            return self.get_user(id).await;
        }

        self.users()
            .find_one_and_update(filter::by_id(id), update, after_update())
            .await
            .map_err(map_duplicate)
    }
}

#[rocket::async_trait]
impl CourseRepository for MongoStore {
    async fn get_course(&self, id: Uuid) -> Result<Option<Course>, StorageError> {
        Ok(self.courses().find_one(filter::by_id(id), None).await?)
    }

    async fn list_courses(
        &self,
        query: &CourseQuery,
        page: PageState,
    ) -> Result<Vec<Course>, StorageError> {
        let options = FindOptions::builder()
            .sort(doc! { "created_at": -1, "_id": 1 })
            .skip(page.skip())
            .limit(page.page_length as i64)
            .build();

        Ok(self
            .courses()
            .find(filter::course_query(query)?, options)
            .await?
            .try_collect()
            .await?)
    }

    async fn create_course(&self, course: &Course) -> Result<(), StorageError> {
        self.courses().insert_one(course, None).await?;
        Ok(())
    }

    async fn update_course(
        &self,
        id: Uuid,
        patch: &CourseUpdateData,
    ) -> Result<Option<Course>, StorageError> {
        Ok(self
            .courses()
            .find_one_and_update(filter::by_id(id), filter::course_update(patch)?, after_update())
            .await?)
    }

    async fn push_lesson(&self, id: Uuid, lesson: &Lesson) -> Result<bool, StorageError> {
        let update = filter::touch(doc! { "$push": { "lessons": bson::to_bson(lesson)? } })?;
        let result = self
            .courses()
            .update_one(filter::by_id(id), update, None)
            .await?;
        Ok(result.matched_count > 0)
    }
}

#[rocket::async_trait]
impl Store for MongoStore {
    async fn begin(&self) -> Result<Box<dyn Transaction + '_>, StorageError> {
        let session = if self.transactions {
            let mut session = self.client.start_session(None).await?;
            let options = TransactionOptions::builder()
                .read_concern(ReadConcern::snapshot())
                .write_concern(WriteConcern::builder().w(Acknowledgment::Majority).build())
                .build();
            session.start_transaction(options).await?;
            Some(session)
        } else {
            None
        };

        Ok(Box::new(MongoTransaction {
            db: self.db.clone(),
            session,
            compensations: vec![],
        }))
    }
}

/// Inverse of a write, replayed on abort when the deployment has no
/// transactions.
#[derive(Debug, Clone)]
enum Compensation {
    Update {
        collection: &'static str,
        filter: Document,
        update: Document,
        many: bool,
    },
    Delete {
        collection: &'static str,
        filter: Document,
    },
    Insert {
        collection: &'static str,
        document: Document,
    },
}

impl Compensation {
    /// Undoes adding `value` to the `field` list of record `id`.
    fn added(collection: &'static str, id: Uuid, field: &str, value: Uuid) -> Compensation {
        Compensation::Update {
            collection,
            filter: filter::by_id(id),
            update: filter::pull(field, value),
            many: false,
        }
    }

    fn removed(collection: &'static str, id: Uuid, field: &str, value: Uuid) -> Compensation {
        Compensation::Update {
            collection,
            filter: filter::by_id(id),
            update: filter::add_to_set(field, value),
            many: false,
        }
    }

    /// Puts `course` back into the enrollments of every user in `affected`.
    fn forgotten(course: Uuid, affected: Vec<Bson>) -> Compensation {
        Compensation::Update {
            collection: USER_COLLECTION_NAME,
            filter: doc! { "_id": { "$in": affected } },
            update: filter::add_to_set("enrolled_courses", course),
            many: true,
        }
    }
}

pub struct MongoTransaction {
    db: Database,
    session: Option<ClientSession>,
    compensations: Vec<Compensation>,
}

impl MongoTransaction {
    fn collection(&self, name: &'static str) -> Collection<Document> {
        self.db.collection(name)
    }

    fn record(&mut self, compensation: Compensation) {
        if self.session.is_none() {
            self.compensations.push(compensation);
        }
    }

    async fn find<T>(&mut self, name: &'static str, id: Uuid) -> Result<Option<T>, StorageError>
    where
        T: serde::de::DeserializeOwned + Unpin + Send + Sync,
    {
        let collection = self.db.collection::<T>(name);
        let found = match self.session.as_mut() {
            Some(session) => {
                collection
                    .find_one_with_session(filter::by_id(id), None, session)
                    .await?
            }
            None => collection.find_one(filter::by_id(id), None).await?,
        };
        Ok(found)
    }

    async fn update(
        &mut self,
        name: &'static str,
        filter: Document,
        update: Document,
        many: bool,
    ) -> Result<u64, StorageError> {
        let collection = self.collection(name);
        let result = match (self.session.as_mut(), many) {
            (Some(session), false) => {
                collection
                    .update_one_with_session(filter, update, None, session)
                    .await?
            }
            (Some(session), true) => {
                collection
                    .update_many_with_session(filter, update, None, session)
                    .await?
            }
            (None, false) => collection.update_one(filter, update, None).await?,
            (None, true) => collection.update_many(filter, update, None).await?,
        };
        Ok(result.modified_count)
    }

    /// Adds `value` to the `field` list of record `id` unless already present.
    async fn add_member(
        &mut self,
        name: &'static str,
        id: Uuid,
        field: &'static str,
        value: Uuid,
        touch: bool,
    ) -> Result<bool, StorageError> {
        let mut update = filter::push(field, value);
        if touch {
            update = filter::touch(update)?;
        }

        let changed = self
            .update(name, filter::by_id_without(id, field, value), update, false)
            .await?
            > 0;
        if changed {
            self.record(Compensation::added(name, id, field, value));
        }
        Ok(changed)
    }

    async fn remove_member(
        &mut self,
        name: &'static str,
        id: Uuid,
        field: &'static str,
        value: Uuid,
        touch: bool,
    ) -> Result<bool, StorageError> {
        let mut update = filter::pull(field, value);
        if touch {
            update = filter::touch(update)?;
        }

        let changed = self
            .update(name, filter::by_id_with(id, field, value), update, false)
            .await?
            > 0;
        if changed {
            self.record(Compensation::removed(name, id, field, value));
        }
        Ok(changed)
    }

    async fn delete(&mut self, name: &'static str, id: Uuid) -> Result<Option<Document>, StorageError> {
        let collection = self.collection(name);
        let removed = match self.session.as_mut() {
            Some(session) => {
                collection
                    .find_one_and_delete_with_session(filter::by_id(id), None, session)
                    .await?
            }
            None => collection.find_one_and_delete(filter::by_id(id), None).await?,
        };
        if let Some(document) = &removed {
            self.record(Compensation::Insert {
                collection: name,
                document: document.clone(),
            });
        }
        Ok(removed)
    }

    async fn undo(&self, compensation: Compensation) -> Result<(), StorageError> {
        match compensation {
            Compensation::Update {
                collection,
                filter,
                update,
                many,
            } => {
                let collection = self.collection(collection);
                if many {
                    collection.update_many(filter, update, None).await?;
                } else {
                    collection.update_one(filter, update, None).await?;
                }
            }
            Compensation::Delete { collection, filter } => {
                self.collection(collection).delete_one(filter, None).await?;
            }
            Compensation::Insert {
                collection,
                document,
            } => {
                self.collection(collection).insert_one(document, None).await?;
            }
        }
        Ok(())
    }
}

#[rocket::async_trait]
impl Transaction for MongoTransaction {
    async fn user(&mut self, id: Uuid) -> Result<Option<User>, StorageError> {
        self.find(USER_COLLECTION_NAME, id).await
    }

    async fn course(&mut self, id: Uuid) -> Result<Option<Course>, StorageError> {
        self.find(COURSE_COLLECTION_NAME, id).await
    }

    async fn insert_course(&mut self, course: &Course) -> Result<(), StorageError> {
        let collection = self.db.collection::<Course>(COURSE_COLLECTION_NAME);
        match self.session.as_mut() {
            Some(session) => {
                collection
                    .insert_one_with_session(course, None, session)
                    .await?;
            }
            None => {
                collection.insert_one(course, None).await?;
            }
        }
        self.record(Compensation::Delete {
            collection: COURSE_COLLECTION_NAME,
            filter: filter::by_id(course.id),
        });
        Ok(())
    }

    async fn remove_course(&mut self, id: Uuid) -> Result<Option<Course>, StorageError> {
        match self.delete(COURSE_COLLECTION_NAME, id).await? {
            Some(document) => Ok(Some(bson::from_document(document)?)),
            None => Ok(None),
        }
    }

    async fn remove_user(&mut self, id: Uuid) -> Result<Option<User>, StorageError> {
        match self.delete(USER_COLLECTION_NAME, id).await? {
            Some(document) => Ok(Some(bson::from_document(document)?)),
            None => Ok(None),
        }
    }

    async fn add_student(&mut self, course: Uuid, user: Uuid) -> Result<bool, StorageError> {
        self.add_member(COURSE_COLLECTION_NAME, course, "enrolled_students", user, true)
            .await
    }

    async fn remove_student(&mut self, course: Uuid, user: Uuid) -> Result<bool, StorageError> {
        self.remove_member(COURSE_COLLECTION_NAME, course, "enrolled_students", user, true)
            .await
    }

    async fn add_enrolled_course(&mut self, user: Uuid, course: Uuid) -> Result<bool, StorageError> {
        self.add_member(USER_COLLECTION_NAME, user, "enrolled_courses", course, false)
            .await
    }

    async fn remove_enrolled_course(
        &mut self,
        user: Uuid,
        course: Uuid,
    ) -> Result<bool, StorageError> {
        self.remove_member(USER_COLLECTION_NAME, user, "enrolled_courses", course, false)
            .await
    }

    async fn add_created_course(&mut self, user: Uuid, course: Uuid) -> Result<bool, StorageError> {
        self.add_member(USER_COLLECTION_NAME, user, "created_courses", course, false)
            .await
    }

    async fn remove_created_course(
        &mut self,
        user: Uuid,
        course: Uuid,
    ) -> Result<bool, StorageError> {
        self.remove_member(USER_COLLECTION_NAME, user, "created_courses", course, false)
            .await
    }

    async fn forget_course(&mut self, course: Uuid) -> Result<u64, StorageError> {
        let selector = filter::containing("enrolled_courses", course);
        let collection = self.collection(USER_COLLECTION_NAME);

        let affected: Vec<Bson> = match self.session.as_mut() {
            Some(session) => {
                collection
                    .distinct_with_session("_id", selector.clone(), None, session)
                    .await?
            }
            None => collection.distinct("_id", selector.clone(), None).await?,
        };
        if affected.is_empty() {
            return Ok(0);
        }

        let changed = self
            .update(
                USER_COLLECTION_NAME,
                selector,
                filter::pull("enrolled_courses", course),
                true,
            )
            .await?;
        self.record(Compensation::forgotten(course, affected));
        Ok(changed)
    }

    async fn commit(mut self: Box<Self>) -> Result<(), StorageError> {
        match self.session.as_mut() {
            Some(session) => {
                if let Err(e) = session.commit_transaction().await {
                    tracing::warn!("Commit failed, aborting transaction: {}", e);
                    if let Err(abort) = session.abort_transaction().await {
                        tracing::debug!("Abort after failed commit also failed: {}", abort);
                    }
                    return Err(e.into());
                }
            }
            None => self.compensations.clear(),
        }
        Ok(())
    }

    async fn abort(mut self: Box<Self>) -> Result<(), StorageError> {
        if let Some(session) = self.session.as_mut() {
            session.abort_transaction().await?;
            return Ok(());
        }

        let mut failure: Option<StorageError> = None;
        while let Some(compensation) = self.compensations.pop() {
            tracing::debug!("Compensating write: {:?}", compensation);
            if let Err(e) = self.undo(compensation).await {
                tracing::error!("Compensating write failed: {}", e);
                failure.get_or_insert(e);
            }
        }

        match failure {
            Some(e) => Err(StorageError::Rollback {
                cause: "compensating writes".to_string(),
                reason: e.to_string(),
            }),
            None => Ok(()),
        }
    }
}
