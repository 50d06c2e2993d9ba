use std::collections::BTreeMap;

use rocket::http::Status;
use rocket::{Build, Catcher, Request, Rocket, Route};

pub mod auth;
pub mod courses;
pub mod users;

use auth::*;
use courses::*;
use users::*;

use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    data::{
        course::{self as cd, db as cdb},
        user::db::{AvatarData, UserLoginData, UserSignupData},
        user::UserResponse,
    },
    resp::{jwt::doc::JWTAuth, problem::problems, problem::Problem},
    role::Role,
};

#[derive(OpenApi)]
#[openapi(
    paths(
        register,
        login,
        me,
        avatar_set,
        avatar_clear,
        user_list,
        user_get,
        user_delete,
        course_list,
        course_get,
        course_create,
        course_update,
        course_delete,
        course_enroll,
        course_unenroll,
        lesson_create,
        lesson_get
    ),
    components(schemas(
        Role,
        UserResponse,
        UserLoginData,
        UserSignupData,
        AvatarData,
        AuthResponse,
        cd::Level,
        cd::ResourceKind,
        cd::Resource,
        cd::Question,
        cd::Quiz,
        cd::LessonSummary,
        cd::LessonResponse,
        cd::CourseResponse,
        cdb::CourseCreateData,
        cdb::CourseUpdateData,
        cdb::LessonCreateData,
        Problem
    )),
    modifiers(&JWTAuth, &V1_PREFIX)
)]
pub struct ApiDocV1;

pub struct PathPrefix(pub &'static str);
static V1_PREFIX: PathPrefix = PathPrefix("/api/v1");

impl utoipa::Modify for PathPrefix {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let mut new_paths = BTreeMap::new();

        for (path, item) in std::mem::take(&mut openapi.paths.paths) {
            new_paths.insert(format!("{}{}", self.0, path), item);
        }

        openapi.paths.paths = new_paths;
    }
}

pub fn api_v1() -> Vec<Route> {
    routes![
        register,
        login,
        me,
        avatar_set,
        avatar_clear,
        user_list,
        user_get,
        user_delete,
        course_list,
        course_get,
        course_create,
        course_update,
        course_delete,
        course_enroll,
        course_unenroll,
        lesson_create,
        lesson_get
    ]
}

#[catch(401)]
fn unauthorized() -> Problem {
    problems::auth_problem("Missing, expired or malformed auth token.")
}

#[catch(404)]
fn not_found(req: &Request<'_>) -> Problem {
    Problem::new_untyped(Status::NotFound, "Resource not found.")
        .detail(format!("No route for '{}'.", req.uri()))
        .clone()
}

#[catch(422)]
fn unprocessable() -> Problem {
    problems::parse_problem()
        .detail("Request body doesn't match the expected format.")
        .clone()
}

#[catch(default)]
fn any_status(status: Status, _: &Request<'_>) -> Problem {
    Problem::new_untyped(status, status.reason().unwrap_or("Unknown error."))
}

pub fn catchers_v1() -> Vec<Catcher> {
    catchers![unauthorized, not_found, unprocessable, any_status]
}

pub fn mount_api(rocket: Rocket<Build>) -> Rocket<Build> {
    rocket
        .mount("/api/v1", api_v1())
        .register("/", catchers_v1())
        .mount(
            "/",
            SwaggerUi::new("/swagger/<_..>").url("/api/v1/openapi.json", ApiDocV1::openapi()),
        )
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Arc;

    use rocket::http::{ContentType, Header, Status};
    use rocket::local::asynchronous::Client;
    use serde_json::json;

    use super::auth::AuthResponse;
    use crate::config::Config;
    use crate::data::course::CourseResponse;
    use crate::data::store::MemoryStore;
    use crate::role::Role;
    use crate::security::Security;

    pub async fn client() -> Client {
        let rocket = crate::build(
            Config::in_memory(),
            Security::ephemeral(4),
            Arc::new(MemoryStore::new()),
        )
        .expect("invalid backend");

        Client::tracked(rocket).await.expect("invalid backend")
    }

    pub fn bearer(token: &str) -> Header<'static> {
        Header::new("Authorization", format!("Bearer {}", token))
    }

    pub async fn register(client: &Client, name: &str, role: Role) -> AuthResponse {
        let response = client
            .post("/api/v1/auth/register")
            .header(ContentType::JSON)
            .body(
                json!({
                    "email": format!("{}@example.com", name),
                    "username": name,
                    "password": "password123",
                    "role": role,
                })
                .to_string(),
            )
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Created, "registration failed");

        response.into_json().await.expect("invalid auth json")
    }

    pub async fn create_course(client: &Client, token: &str, title: &str) -> CourseResponse {
        let response = client
            .post("/api/v1/courses")
            .header(ContentType::JSON)
            .header(bearer(token))
            .body(
                json!({
                    "title": title,
                    "description": "Learn by doing",
                    "category": "Programming",
                    "level": "Beginner",
                    "duration": 60,
                    "price": 25.0
                })
                .to_string(),
            )
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Created, "course creation failed");

        response.into_json().await.expect("invalid course json")
    }

    #[rocket::async_test]
    async fn v1_openapi_is_served() {
        let client = client().await;

        let response = client.get("/api/v1/openapi.json").dispatch().await;
        assert_eq!(response.status(), Status::Ok);
        let doc: serde_json::Value = response.into_json().await.expect("openapi json");
        assert!(doc["paths"]["/api/v1/courses/{id}/enroll"].is_object());
        assert!(doc["components"]["securitySchemes"]["jwt"].is_object());
    }

    #[rocket::async_test]
    async fn v1_unknown_routes_are_problems() {
        let client = client().await;

        let response = client.get("/api/v1/nothing-here").dispatch().await;
        assert_eq!(response.status(), Status::NotFound);
        assert_eq!(
            response.content_type(),
            Some(ContentType::new("application", "problem+json"))
        );
    }
}
