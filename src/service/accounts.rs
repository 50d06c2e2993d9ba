use uuid::Uuid;

use super::access::{authorize, Action};
use super::finish;
use crate::config::Config;
use crate::data::store::{Store, Transaction, UserRepository};
use crate::data::user::db::{UserLoginData, UserSignupData};
use crate::data::user::{User, UserPatch, UserResponse};
use crate::error::{ResourceKind, ServiceError, StorageError};
use crate::middleware::paging::PageState;
use crate::role::Role;
use crate::security::Security;
use crate::util::is_web_url;

const BAD_CREDENTIALS: &str = "Bad credentials.";

#[tracing::instrument(skip(store, config, security))]
pub async fn register(
    store: &dyn Store,
    config: &Config,
    security: &Security,
    data: UserSignupData,
) -> Result<User, ServiceError> {
    data.validate()?;

    let role = data.role.unwrap_or_default();
    if role == Role::Instructor && !config.allow_instructor_signup {
        return Err(ServiceError::invalid(
            "role",
            "Instructor accounts can't be self-registered.",
        ));
    }

    let user = User::new(
        data.email.trim(),
        data.username.trim(),
        &data.password,
        role,
        security,
    );
    match store.create_user(&user).await {
        Ok(()) => {}
        Err(StorageError::Duplicate(field)) => {
            return Err(ServiceError::Conflict(format!(
                "An account with this {} already exists.",
                field
            )))
        }
        Err(other) => return Err(other.into()),
    }

    tracing::info!("Registered {} '{}'", user.user_role, user.username);
    Ok(user)
}

#[tracing::instrument(skip(store))]
pub async fn login(
    store: &dyn Store,
    data: &UserLoginData,
) -> Result<User, ServiceError> {
    data.validate()?;

    let identifier = data.identifier.trim();
    let found = if data.is_email() {
        store.find_user_by_email(identifier).await?
    } else {
        store.find_user_by_username(identifier).await?
    };

    match found {
        Some(user) if user.pw_hash.verify(&data.password) => {
            tracing::debug!("User {} logged in", user.id);
            Ok(user)
        }
        _ => Err(ServiceError::Unauthorized(BAD_CREDENTIALS)),
    }
}

pub async fn get_user(store: &dyn Store, id: Uuid) -> Result<UserResponse, ServiceError> {
    store
        .get_user(id)
        .await?
        .map(UserResponse::from)
        .ok_or_else(|| ServiceError::not_found(ResourceKind::User, id))
}

pub async fn list_users(
    store: &dyn Store,
    page: PageState,
) -> Result<Vec<UserResponse>, ServiceError> {
    let users = store.list_users(page).await?;
    Ok(users.into_iter().map(UserResponse::from).collect())
}

#[tracing::instrument(skip(store))]
pub async fn set_avatar(
    store: &dyn Store,
    id: Uuid,
    url: &str,
) -> Result<UserResponse, ServiceError> {
    let url = url.trim();
    if !is_web_url(url) {
        return Err(ServiceError::invalid("url", "Avatar must be an http(s) URL."));
    }

    let patch = UserPatch {
        avatar: Some(Some(url.to_string())),
        ..Default::default()
    };
    store
        .update_user(id, &patch)
        .await?
        .map(UserResponse::from)
        .ok_or_else(|| ServiceError::not_found(ResourceKind::User, id))
}

#[tracing::instrument(skip(store))]
pub async fn clear_avatar(store: &dyn Store, id: Uuid) -> Result<UserResponse, ServiceError> {
    let user = store
        .get_user(id)
        .await?
        .ok_or_else(|| ServiceError::not_found(ResourceKind::User, id))?;
    if user.avatar.is_none() {
        return Err(ServiceError::not_found(ResourceKind::Avatar, id));
    }

    let patch = UserPatch {
        avatar: Some(None),
        ..Default::default()
    };
    store
        .update_user(id, &patch)
        .await?
        .map(UserResponse::from)
        .ok_or_else(|| ServiceError::not_found(ResourceKind::User, id))
}

/// Removes an account and its enrollments. Instructors have to delete their
/// courses first.
#[tracing::instrument(skip(store))]
pub async fn delete_account(
    store: &dyn Store,
    actor: Uuid,
    target: Uuid,
) -> Result<UserResponse, ServiceError> {
    let mut tx = store.begin().await?;
    let result = remove_account(tx.as_mut(), actor, target).await;
    let removed = finish(tx, result).await?;

    tracing::info!("Account {} deleted", target);
    Ok(removed)
}

async fn remove_account(
    tx: &mut (dyn Transaction + '_),
    actor: Uuid,
    target: Uuid,
) -> Result<UserResponse, ServiceError> {
    let actor = tx
        .user(actor)
        .await?
        .ok_or_else(|| ServiceError::not_found(ResourceKind::User, actor))?;
    let user = tx
        .user(target)
        .await?
        .ok_or_else(|| ServiceError::not_found(ResourceKind::User, target))?;
    authorize(&actor, Action::DeleteAccount(&user)).require()?;

    if !user.created_courses.is_empty() {
        return Err(ServiceError::Conflict(format!(
            "Account still owns {} course(s).",
            user.created_courses.len()
        )));
    }

    for course in &user.enrolled_courses {
        tx.remove_student(*course, user.id).await?;
    }
    tx.remove_user(user.id).await?;

    Ok(UserResponse::from(user))
}
