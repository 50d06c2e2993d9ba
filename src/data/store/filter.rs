//! BSON filter and update documents shared by the MongoDB store.

use bson::spec::BinarySubtype;
use bson::{doc, Binary, Bson, Document};
use chrono::Utc;
use uuid::Uuid;

use crate::data::course::db::CourseUpdateData;
use crate::data::course::CourseQuery;
use crate::error::StorageError;

#[inline]
pub fn uuid(id: Uuid) -> Bson {
    Bson::Binary(Binary {
        subtype: BinarySubtype::Uuid,
        bytes: id.as_bytes().to_vec(),
    })
}

#[inline]
pub fn by_id(id: Uuid) -> Document {
    doc! { "_id": uuid(id) }
}

#[inline]
pub fn by_email(email: impl Into<String>) -> Document {
    doc! { "email": email.into() }
}

#[inline]
pub fn by_username(username: impl Into<String>) -> Document {
    doc! { "username": username.into() }
}

/// Matches `id` only while `value` is absent from the `field` list.
pub fn by_id_without(id: Uuid, field: &str, value: Uuid) -> Document {
    let mut filter = by_id(id);
    filter.insert(field, doc! { "$ne": uuid(value) });
    filter
}

/// Matches `id` only while `value` is in the `field` list.
pub fn by_id_with(id: Uuid, field: &str, value: Uuid) -> Document {
    let mut filter = by_id(id);
    filter.insert(field, uuid(value));
    filter
}

pub fn containing(field: &str, value: Uuid) -> Document {
    doc! { field: uuid(value) }
}

pub fn push(field: &str, value: Uuid) -> Document {
    doc! { "$push": { field: uuid(value) } }
}

pub fn add_to_set(field: &str, value: Uuid) -> Document {
    doc! { "$addToSet": { field: uuid(value) } }
}

pub fn pull(field: &str, value: Uuid) -> Document {
    doc! { "$pull": { field: uuid(value) } }
}

/// Adds an `updated_at` bump to an update document.
pub fn touch(mut update: Document) -> Result<Document, StorageError> {
    update.insert("$set", doc! { "updated_at": now()? });
    Ok(update)
}

pub fn course_query(query: &CourseQuery) -> Result<Document, StorageError> {
    let mut filter = Document::new();
    if let Some(category) = &query.category {
        filter.insert("category", category.clone());
    }
    if let Some(level) = query.level {
        filter.insert("level", bson::to_bson(&level)?);
    }
    if let Some(instructor) = query.instructor {
        filter.insert("instructor", uuid(instructor));
    }
    Ok(filter)
}

pub fn course_update(patch: &CourseUpdateData) -> Result<Document, StorageError> {
    let mut set = doc! { "updated_at": now()? };
    if let Some(title) = &patch.title {
        set.insert("title", title.trim());
    }
    if let Some(description) = &patch.description {
        set.insert("description", description.clone());
    }
    if let Some(thumbnail) = &patch.thumbnail {
        set.insert("thumbnail", thumbnail.clone());
    }
    if let Some(category) = &patch.category {
        set.insert("category", category.trim());
    }
    if let Some(level) = patch.level {
        set.insert("level", bson::to_bson(&level)?);
    }
    if let Some(duration) = patch.duration {
        set.insert("duration", bson::to_bson(&duration)?);
    }
    if let Some(price) = patch.price {
        set.insert("price", price);
    }
    Ok(doc! { "$set": set })
}

fn now() -> Result<Bson, StorageError> {
    Ok(bson::to_bson(&Utc::now())?)
}
