use chrono::{DateTime, Utc};
use rocket::http::{Cookie, CookieJar, Status};
use rocket::serde::json::Json;
use rocket::State;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::config::Config;
use crate::data::store::SharedStore;
use crate::data::user::db::{AvatarData, UserLoginData, UserSignupData};
use crate::data::user::{User, UserResponse};
use crate::resp::jwt::{UserRoleToken, AUTH_COOKIE_NAME};
use crate::resp::problem::Problem;
use crate::security::Security;
use crate::service::accounts;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AuthResponse {
    /// Bearer token for the `Authorization` header.
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub user: UserResponse,
}

fn issue_token(
    user: User,
    config: &Config,
    security: &Security,
    cookies: &CookieJar<'_>,
) -> Result<Json<AuthResponse>, Problem> {
    let urt = UserRoleToken::new(&user, config.token_lifetime());
    let token = urt.encode_jwt(security)?;
    cookies.add(urt.cookie(token.clone()));

    Ok(Json(AuthResponse {
        token,
        expires_at: urt.expires_at(),
        user: UserResponse::from(user),
    }))
}

/// Create an account and sign in
#[utoipa::path(
    request_body = UserSignupData,
    responses(
        (status = 201, description = "Account created", body = AuthResponse),
        (status = 400, description = "Invalid sign-up data", body = Problem),
        (status = 409, description = "Email or username taken", body = Problem),
    )
)]
#[post("/auth/register", format = "json", data = "<data>")]
#[tracing::instrument(skip(cookies, store, config, security))]
pub async fn register(
    data: Json<UserSignupData>,
    cookies: &CookieJar<'_>,
    store: &State<SharedStore>,
    config: &State<Config>,
    security: &State<Security>,
) -> Result<(Status, Json<AuthResponse>), Problem> {
    let user = accounts::register(
        store.inner().as_ref(),
        config.inner(),
        security.inner(),
        data.into_inner(),
    )
    .await?;

    Ok((Status::Created, issue_token(user, config, security, cookies)?))
}

/// Sign in with email or username
#[utoipa::path(
    request_body = UserLoginData,
    responses(
        (status = 200, description = "Signed in", body = AuthResponse),
        (status = 401, description = "Bad credentials", body = Problem),
    )
)]
#[post("/auth/login", format = "json", data = "<data>")]
#[tracing::instrument(skip(cookies, store, config, security))]
pub async fn login(
    data: Json<UserLoginData>,
    cookies: &CookieJar<'_>,
    store: &State<SharedStore>,
    config: &State<Config>,
    security: &State<Security>,
) -> Result<Json<AuthResponse>, Problem> {
    let user = accounts::login(store.inner().as_ref(), &data).await?;

    issue_token(user, config, security, cookies)
}

/// Currently signed in user
#[utoipa::path(
    responses(
        (status = 200, description = "Current user", body = UserResponse),
        (status = 401, description = "Missing or invalid token", body = Problem),
    ),
    security(("jwt" = []))
)]
#[get("/auth/me")]
#[tracing::instrument(skip(store))]
pub async fn me(auth: UserRoleToken, store: &State<SharedStore>) -> Result<Json<UserResponse>, Problem> {
    Ok(Json(accounts::get_user(store.inner().as_ref(), auth.user).await?))
}

/// Set avatar to an uploaded image URL
#[utoipa::path(
    request_body = AvatarData,
    responses(
        (status = 200, description = "Avatar set", body = UserResponse),
        (status = 400, description = "Not an http(s) URL", body = Problem),
    ),
    security(("jwt" = []))
)]
#[put("/auth/avatar", format = "json", data = "<data>")]
#[tracing::instrument(skip(store))]
pub async fn avatar_set(
    data: Json<AvatarData>,
    auth: UserRoleToken,
    store: &State<SharedStore>,
) -> Result<Json<UserResponse>, Problem> {
    Ok(Json(
        accounts::set_avatar(store.inner().as_ref(), auth.user, &data.url).await?,
    ))
}

/// Remove avatar
#[utoipa::path(
    responses(
        (status = 200, description = "Avatar removed", body = UserResponse),
        (status = 404, description = "No avatar set", body = Problem),
    ),
    security(("jwt" = []))
)]
#[delete("/auth/avatar")]
#[tracing::instrument(skip(store))]
pub async fn avatar_clear(
    auth: UserRoleToken,
    store: &State<SharedStore>,
) -> Result<Json<UserResponse>, Problem> {
    Ok(Json(
        accounts::clear_avatar(store.inner().as_ref(), auth.user).await?,
    ))
}

/// Drops the auth cookie. Bearer tokens stay valid until they expire.
pub fn forget_token(cookies: &CookieJar<'_>) {
    cookies.remove(Cookie::from(AUTH_COOKIE_NAME));
}
