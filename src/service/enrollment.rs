//! Enrollment keeps `Course::enrolled_students` and `User::enrolled_courses`
//! mirrored. Both sides are written in one unit of work or not at all.

use uuid::Uuid;

use super::finish;
use crate::data::store::{Store, Transaction};
use crate::data::user::UserResponse;
use crate::error::{ResourceKind, ServiceError};

#[tracing::instrument(skip(store))]
pub async fn enroll(
    store: &dyn Store,
    user: Uuid,
    course: Uuid,
) -> Result<UserResponse, ServiceError> {
    let mut tx = store.begin().await?;
    let result = enroll_in(tx.as_mut(), user, course).await;
    let enrolled = finish(tx, result).await?;

    tracing::info!("User {} enrolled in course {}", user, course);
    Ok(enrolled)
}

#[tracing::instrument(skip(store))]
pub async fn unenroll(
    store: &dyn Store,
    user: Uuid,
    course: Uuid,
) -> Result<UserResponse, ServiceError> {
    let mut tx = store.begin().await?;
    let result = unenroll_from(tx.as_mut(), user, course).await;
    let unenrolled = finish(tx, result).await?;

    tracing::info!("User {} left course {}", user, course);
    Ok(unenrolled)
}

async fn enroll_in(
    tx: &mut (dyn Transaction + '_),
    user: Uuid,
    course: Uuid,
) -> Result<UserResponse, ServiceError> {
    let target = tx
        .course(course)
        .await?
        .ok_or_else(|| ServiceError::not_found(ResourceKind::Course, course))?;
    if target.has_student(user) {
        return Err(ServiceError::AlreadyEnrolled { user, course });
    }
    if tx.user(user).await?.is_none() {
        return Err(ServiceError::not_found(ResourceKind::User, user));
    }

    // conditional on the user still being absent
    if !tx.add_student(course, user).await? {
        return Err(ServiceError::AlreadyEnrolled { user, course });
    }
    tx.add_enrolled_course(user, course).await?;

    updated_user(tx, user).await
}

async fn unenroll_from(
    tx: &mut (dyn Transaction + '_),
    user: Uuid,
    course: Uuid,
) -> Result<UserResponse, ServiceError> {
    let target = tx
        .course(course)
        .await?
        .ok_or_else(|| ServiceError::not_found(ResourceKind::Course, course))?;
    if !target.has_student(user) {
        return Err(ServiceError::NotEnrolled { user, course });
    }

    if !tx.remove_student(course, user).await? {
        return Err(ServiceError::NotEnrolled { user, course });
    }
    tx.remove_enrolled_course(user, course).await?;

    updated_user(tx, user).await
}

async fn updated_user(
    tx: &mut (dyn Transaction + '_),
    user: Uuid,
) -> Result<UserResponse, ServiceError> {
    match tx.user(user).await? {
        Some(it) => Ok(UserResponse::from(it)),
        None => Err(ServiceError::not_found(ResourceKind::User, user)),
    }
}
