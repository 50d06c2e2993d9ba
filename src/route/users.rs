use rocket::http::CookieJar;
use rocket::serde::json::Json;
use rocket::State;
use uuid::Uuid;

use crate::data::store::SharedStore;
use crate::data::user::UserResponse;
use crate::middleware::paging::PageState;
use crate::resp::jwt::UserRoleToken;
use crate::resp::problem::Problem;
use crate::route::auth::forget_token;
use crate::service::accounts;

/// List users by username
#[utoipa::path(
    params(
        ("page" = Option<u32>, Query, description = "Zero based page index"),
        ("len" = Option<u32>, Query, description = "Page length"),
    ),
    responses(
        (status = 200, description = "Page of users", body = Vec<UserResponse>),
        (status = 401, description = "Missing or invalid token", body = Problem),
    ),
    security(("jwt" = []))
)]
#[get("/users")]
#[tracing::instrument(skip(store))]
pub async fn user_list(
    _auth: UserRoleToken,
    page: PageState,
    store: &State<SharedStore>,
) -> Result<Json<Vec<UserResponse>>, Problem> {
    Ok(Json(accounts::list_users(store.inner().as_ref(), page).await?))
}

/// Public profile of a user
#[utoipa::path(
    params(("id" = Uuid, Path, description = "User id")),
    responses(
        (status = 200, description = "User", body = UserResponse),
        (status = 404, description = "No such user", body = Problem),
    ),
    security(("jwt" = []))
)]
#[get("/users/<id>")]
#[tracing::instrument(skip(store))]
pub async fn user_get(
    id: Uuid,
    _auth: UserRoleToken,
    store: &State<SharedStore>,
) -> Result<Json<UserResponse>, Problem> {
    Ok(Json(accounts::get_user(store.inner().as_ref(), id).await?))
}

/// Delete own account
///
/// Enrollments are removed with it. Accounts that still own courses can't be
/// deleted.
#[utoipa::path(
    params(("id" = Uuid, Path, description = "User id")),
    responses(
        (status = 200, description = "Deleted user", body = UserResponse),
        (status = 403, description = "Not the account holder", body = Problem),
        (status = 409, description = "Account still owns courses", body = Problem),
    ),
    security(("jwt" = []))
)]
#[delete("/users/<id>")]
#[tracing::instrument(skip(cookies, store))]
pub async fn user_delete(
    id: Uuid,
    auth: UserRoleToken,
    cookies: &CookieJar<'_>,
    store: &State<SharedStore>,
) -> Result<Json<UserResponse>, Problem> {
    let removed = accounts::delete_account(store.inner().as_ref(), auth.user, id).await?;
    forget_token(cookies);

    Ok(Json(removed))
}

#[cfg(test)]
mod user_endpoints {
    use rocket::http::Status;
    use uuid::Uuid;

    use crate::data::user::UserResponse;
    use crate::role::Role;
    use crate::route::tests::{bearer, client, create_course, register};

    #[rocket::async_test]
    async fn v1_user_get_requires_auth() {
        let client = client().await;
        let sam = register(&client, "sam", Role::Student).await;
        let kim = register(&client, "kim", Role::Student).await;

        let anonymous = client
            .get(format!("/api/v1/users/{}", sam.user.id))
            .header(rocket::http::Header::new("Authorization", "Bearer nope"))
            .dispatch()
            .await;
        assert_eq!(anonymous.status(), Status::Unauthorized);

        let seen: UserResponse = client
            .get(format!("/api/v1/users/{}", sam.user.id))
            .header(bearer(&kim.token))
            .dispatch()
            .await
            .into_json()
            .await
            .expect("user json");
        assert_eq!(seen.username, "sam");

        let missing = client
            .get(format!("/api/v1/users/{}", Uuid::new_v4()))
            .header(bearer(&kim.token))
            .dispatch()
            .await;
        assert_eq!(missing.status(), Status::NotFound);
    }

    #[rocket::async_test]
    async fn v1_user_list_is_paged() {
        let client = client().await;
        let sam = register(&client, "sam", Role::Student).await;
        register(&client, "kim", Role::Student).await;
        register(&client, "amy", Role::Student).await;

        let page: Vec<UserResponse> = client
            .get("/api/v1/users?len=2&page=1")
            .header(bearer(&sam.token))
            .dispatch()
            .await
            .into_json()
            .await
            .expect("users json");
        let names: Vec<_> = page.iter().map(|it| it.username.as_str()).collect();
        assert_eq!(names, vec!["sam"]);
    }

    #[rocket::async_test]
    async fn v1_user_delete_only_for_same_user() {
        let client = client().await;
        let sam = register(&client, "sam", Role::Student).await;
        let kim = register(&client, "kim", Role::Student).await;

        let other = client
            .delete(format!("/api/v1/users/{}", sam.user.id))
            .header(bearer(&kim.token))
            .dispatch()
            .await;
        assert_eq!(other.status(), Status::Forbidden);

        let own = client
            .delete(format!("/api/v1/users/{}", sam.user.id))
            .header(bearer(&sam.token))
            .dispatch()
            .await;
        assert_eq!(own.status(), Status::Ok);
        let removed: UserResponse = own.into_json().await.expect("user json");
        assert_eq!(removed.id, sam.user.id);
    }

    #[rocket::async_test]
    async fn v1_instructor_with_courses_cannot_leave() {
        let client = client().await;
        let ivy = register(&client, "ivy", Role::Instructor).await;
        create_course(&client, &ivy.token, "Rust").await;

        let response = client
            .delete(format!("/api/v1/users/{}", ivy.user.id))
            .header(bearer(&ivy.token))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Conflict);
    }
}
