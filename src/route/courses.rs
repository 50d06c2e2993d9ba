use rocket::http::Status;
use rocket::serde::json::Json;
use rocket::State;
use uuid::Uuid;

use crate::data::course::db::{CourseCreateData, CourseUpdateData, LessonCreateData};
use crate::data::course::{CourseQuery, CourseResponse, LessonResponse, Level};
use crate::data::store::SharedStore;
use crate::data::user::UserResponse;
use crate::middleware::paging::PageState;
use crate::resp::jwt::UserRoleToken;
use crate::resp::problem::Problem;
use crate::service::{courses, enrollment};

/// List courses, newest first
#[utoipa::path(
    params(
        ("category" = Option<String>, Query, description = "Exact category"),
        ("level" = Option<Level>, Query, description = "Course level"),
        ("instructor" = Option<Uuid>, Query, description = "Owning instructor"),
        ("page" = Option<u32>, Query, description = "Zero based page index"),
        ("len" = Option<u32>, Query, description = "Page length"),
    ),
    responses(
        (status = 200, description = "Page of courses", body = Vec<CourseResponse>),
    )
)]
#[get("/courses?<category>&<level>&<instructor>")]
#[tracing::instrument(skip(store))]
pub async fn course_list(
    category: Option<String>,
    level: Option<Level>,
    instructor: Option<Uuid>,
    page: PageState,
    store: &State<SharedStore>,
) -> Result<Json<Vec<CourseResponse>>, Problem> {
    let query = CourseQuery {
        category,
        level,
        instructor,
    };

    Ok(Json(
        courses::list_courses(store.inner().as_ref(), &query, page).await?,
    ))
}

/// Course details with lesson summaries
#[utoipa::path(
    params(("id" = Uuid, Path, description = "Course id")),
    responses(
        (status = 200, description = "Course", body = CourseResponse),
        (status = 404, description = "No such course", body = Problem),
    )
)]
#[get("/courses/<id>")]
#[tracing::instrument(skip(store))]
pub async fn course_get(
    id: Uuid,
    store: &State<SharedStore>,
) -> Result<Json<CourseResponse>, Problem> {
    Ok(Json(courses::get_course(store.inner().as_ref(), id).await?))
}

/// Create a course owned by the caller
#[utoipa::path(
    request_body = CourseCreateData,
    responses(
        (status = 201, description = "Course created", body = CourseResponse),
        (status = 400, description = "Invalid course data", body = Problem),
        (status = 403, description = "Caller isn't an instructor", body = Problem),
    ),
    security(("jwt" = []))
)]
#[post("/courses", format = "json", data = "<data>")]
#[tracing::instrument(skip(store))]
pub async fn course_create(
    data: Json<CourseCreateData>,
    auth: UserRoleToken,
    store: &State<SharedStore>,
) -> Result<(Status, Json<CourseResponse>), Problem> {
    let course = courses::create_course(store.inner().as_ref(), auth.user, data.into_inner()).await?;

    Ok((Status::Created, Json(course)))
}

/// Update editable course fields
#[utoipa::path(
    request_body = CourseUpdateData,
    params(("id" = Uuid, Path, description = "Course id")),
    responses(
        (status = 200, description = "Updated course", body = CourseResponse),
        (status = 403, description = "Caller doesn't own the course", body = Problem),
        (status = 404, description = "No such course", body = Problem),
    ),
    security(("jwt" = []))
)]
#[put("/courses/<id>", format = "json", data = "<data>")]
#[tracing::instrument(skip(store))]
pub async fn course_update(
    id: Uuid,
    data: Json<CourseUpdateData>,
    auth: UserRoleToken,
    store: &State<SharedStore>,
) -> Result<Json<CourseResponse>, Problem> {
    Ok(Json(
        courses::update_course(store.inner().as_ref(), auth.user, id, data.into_inner()).await?,
    ))
}

/// Delete a course and unlink it from its students
#[utoipa::path(
    params(("id" = Uuid, Path, description = "Course id")),
    responses(
        (status = 200, description = "Deleted course", body = CourseResponse),
        (status = 403, description = "Caller doesn't own the course", body = Problem),
        (status = 404, description = "No such course", body = Problem),
    ),
    security(("jwt" = []))
)]
#[delete("/courses/<id>")]
#[tracing::instrument(skip(store))]
pub async fn course_delete(
    id: Uuid,
    auth: UserRoleToken,
    store: &State<SharedStore>,
) -> Result<Json<CourseResponse>, Problem> {
    Ok(Json(
        courses::delete_course(store.inner().as_ref(), auth.user, id).await?,
    ))
}

/// Enroll the caller in a course
#[utoipa::path(
    params(("id" = Uuid, Path, description = "Course id")),
    responses(
        (status = 200, description = "Caller after enrolling", body = UserResponse),
        (status = 404, description = "No such course", body = Problem),
        (status = 409, description = "Already enrolled", body = Problem),
        (status = 503, description = "Storage conflict, safe to retry", body = Problem),
    ),
    security(("jwt" = []))
)]
#[post("/courses/<id>/enroll")]
#[tracing::instrument(skip(store))]
pub async fn course_enroll(
    id: Uuid,
    auth: UserRoleToken,
    store: &State<SharedStore>,
) -> Result<Json<UserResponse>, Problem> {
    Ok(Json(
        enrollment::enroll(store.inner().as_ref(), auth.user, id).await?,
    ))
}

/// Leave a course
#[utoipa::path(
    params(("id" = Uuid, Path, description = "Course id")),
    responses(
        (status = 200, description = "Caller after leaving", body = UserResponse),
        (status = 404, description = "No such course", body = Problem),
        (status = 409, description = "Not enrolled", body = Problem),
        (status = 503, description = "Storage conflict, safe to retry", body = Problem),
    ),
    security(("jwt" = []))
)]
#[post("/courses/<id>/unenroll")]
#[tracing::instrument(skip(store))]
pub async fn course_unenroll(
    id: Uuid,
    auth: UserRoleToken,
    store: &State<SharedStore>,
) -> Result<Json<UserResponse>, Problem> {
    Ok(Json(
        enrollment::unenroll(store.inner().as_ref(), auth.user, id).await?,
    ))
}

/// Append a lesson to a course
#[utoipa::path(
    request_body = LessonCreateData,
    params(("id" = Uuid, Path, description = "Course id")),
    responses(
        (status = 201, description = "Lesson added", body = LessonResponse),
        (status = 400, description = "Invalid lesson data", body = Problem),
        (status = 403, description = "Caller doesn't own the course", body = Problem),
    ),
    security(("jwt" = []))
)]
#[post("/courses/<id>/lessons", format = "json", data = "<data>")]
#[tracing::instrument(skip(store))]
pub async fn lesson_create(
    id: Uuid,
    data: Json<LessonCreateData>,
    auth: UserRoleToken,
    store: &State<SharedStore>,
) -> Result<(Status, Json<LessonResponse>), Problem> {
    let lesson =
        courses::add_lesson(store.inner().as_ref(), auth.user, id, data.into_inner()).await?;

    Ok((Status::Created, Json(lesson)))
}

/// Full lesson content, for the instructor and enrolled students
#[utoipa::path(
    params(
        ("id" = Uuid, Path, description = "Course id"),
        ("lesson" = Uuid, Path, description = "Lesson id"),
    ),
    responses(
        (status = 200, description = "Lesson", body = LessonResponse),
        (status = 403, description = "Caller isn't enrolled", body = Problem),
        (status = 404, description = "No such course or lesson", body = Problem),
    ),
    security(("jwt" = []))
)]
#[get("/courses/<id>/lessons/<lesson>")]
#[tracing::instrument(skip(store))]
pub async fn lesson_get(
    id: Uuid,
    lesson: Uuid,
    auth: UserRoleToken,
    store: &State<SharedStore>,
) -> Result<Json<LessonResponse>, Problem> {
    Ok(Json(
        courses::get_lesson(store.inner().as_ref(), auth.user, id, lesson).await?,
    ))
}

#[cfg(test)]
mod course_endpoints {
    use rocket::http::{ContentType, Status};
    use serde_json::{json, Value};
    use uuid::Uuid;

    use crate::data::course::{CourseResponse, LessonResponse};
    use crate::data::user::UserResponse;
    use crate::role::Role;
    use crate::route::tests::{bearer, client, create_course, register};

    fn lesson_body() -> String {
        json!({
            "title": "Intro",
            "description": "Getting started",
            "duration": 12,
            "video_url": "https://videos.example.com/intro.mp4",
            "resources": [
                { "title": "Slides", "type": "pdf", "url": "https://cdn.example.com/intro.pdf" }
            ],
            "quizzes": [
                {
                    "title": "Check",
                    "questions": [
                        { "text": "2 + 2?", "options": ["3", "4"], "correct_answer": 1 }
                    ]
                }
            ]
        })
        .to_string()
    }

    #[rocket::async_test]
    async fn v1_full_enrollment_flow() {
        let client = client().await;
        let ivy = register(&client, "ivy", Role::Instructor).await;
        let sam = register(&client, "sam", Role::Student).await;
        let course = create_course(&client, &ivy.token, "Rust").await;

        let lesson = client
            .post(format!("/api/v1/courses/{}/lessons", course.id))
            .header(ContentType::JSON)
            .header(bearer(&ivy.token))
            .body(lesson_body())
            .dispatch()
            .await;
        assert_eq!(lesson.status(), Status::Created);
        let lesson: LessonResponse = lesson.into_json().await.expect("lesson json");
        let lesson_uri = format!("/api/v1/courses/{}/lessons/{}", course.id, lesson.id);

        let locked = client
            .get(&lesson_uri)
            .header(bearer(&sam.token))
            .dispatch()
            .await;
        assert_eq!(locked.status(), Status::Forbidden);

        let enrolled = client
            .post(format!("/api/v1/courses/{}/enroll", course.id))
            .header(bearer(&sam.token))
            .dispatch()
            .await;
        assert_eq!(enrolled.status(), Status::Ok);
        let enrolled: UserResponse = enrolled.into_json().await.expect("user json");
        assert_eq!(enrolled.enrolled_courses, vec![course.id]);

        let again = client
            .post(format!("/api/v1/courses/{}/enroll", course.id))
            .header(bearer(&sam.token))
            .dispatch()
            .await;
        assert_eq!(again.status(), Status::Conflict);

        let detail: CourseResponse = client
            .get(format!("/api/v1/courses/{}", course.id))
            .dispatch()
            .await
            .into_json()
            .await
            .expect("course json");
        assert_eq!(detail.enrolled_students, vec![sam.user.id]);
        assert_eq!(detail.lessons.len(), 1);

        let visible: LessonResponse = client
            .get(&lesson_uri)
            .header(bearer(&sam.token))
            .dispatch()
            .await
            .into_json()
            .await
            .expect("lesson json");
        assert_eq!(visible.quizzes[0].questions[0].correct_answer, 1);

        let left = client
            .post(format!("/api/v1/courses/{}/unenroll", course.id))
            .header(bearer(&sam.token))
            .dispatch()
            .await;
        assert_eq!(left.status(), Status::Ok);
        let left: UserResponse = left.into_json().await.expect("user json");
        assert!(left.enrolled_courses.is_empty());

        let not_enrolled = client
            .post(format!("/api/v1/courses/{}/unenroll", course.id))
            .header(bearer(&sam.token))
            .dispatch()
            .await;
        assert_eq!(not_enrolled.status(), Status::Conflict);
    }

    #[rocket::async_test]
    async fn v1_enroll_unknown_course() {
        let client = client().await;
        let sam = register(&client, "sam", Role::Student).await;

        let response = client
            .post(format!("/api/v1/courses/{}/enroll", Uuid::new_v4()))
            .header(bearer(&sam.token))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::NotFound);
        let problem: Value = response.into_json().await.expect("problem json");
        assert_eq!(problem["resource"], "course");
    }

    #[rocket::async_test]
    async fn v1_authoring_is_owner_only() {
        let client = client().await;
        let ivy = register(&client, "ivy", Role::Instructor).await;
        let ian = register(&client, "ian", Role::Instructor).await;
        let sam = register(&client, "sam", Role::Student).await;
        let course = create_course(&client, &ivy.token, "Rust").await;
        let uri = format!("/api/v1/courses/{}", course.id);

        let student_create = client
            .post("/api/v1/courses")
            .header(ContentType::JSON)
            .header(bearer(&sam.token))
            .body(
                json!({
                    "title": "Sneaky",
                    "description": "Nope",
                    "category": "Programming",
                    "level": "Beginner",
                    "duration": 10,
                    "price": 0.0
                })
                .to_string(),
            )
            .dispatch()
            .await;
        assert_eq!(student_create.status(), Status::Forbidden);

        let update = client
            .put(&uri)
            .header(ContentType::JSON)
            .header(bearer(&ian.token))
            .body(json!({ "title": "Hijacked" }).to_string())
            .dispatch()
            .await;
        assert_eq!(update.status(), Status::Forbidden);

        let delete = client.delete(&uri).header(bearer(&ian.token)).dispatch().await;
        assert_eq!(delete.status(), Status::Forbidden);

        let owner_update: CourseResponse = client
            .put(&uri)
            .header(ContentType::JSON)
            .header(bearer(&ivy.token))
            .body(json!({ "title": "Rust 2" }).to_string())
            .dispatch()
            .await
            .into_json()
            .await
            .expect("course json");
        assert_eq!(owner_update.title, "Rust 2");

        let owner_delete = client.delete(&uri).header(bearer(&ivy.token)).dispatch().await;
        assert_eq!(owner_delete.status(), Status::Ok);
        let gone = client.get(&uri).dispatch().await;
        assert_eq!(gone.status(), Status::NotFound);
    }

    #[rocket::async_test]
    async fn v1_course_list_filters() {
        let client = client().await;
        let ivy = register(&client, "ivy", Role::Instructor).await;
        let ian = register(&client, "ian", Role::Instructor).await;
        create_course(&client, &ivy.token, "Rust").await;
        create_course(&client, &ivy.token, "Go").await;
        let other = create_course(&client, &ian.token, "Zig").await;

        let all: Vec<CourseResponse> = client
            .get("/api/v1/courses")
            .dispatch()
            .await
            .into_json()
            .await
            .expect("courses json");
        assert_eq!(all.len(), 3);

        let by_ian: Vec<CourseResponse> = client
            .get(format!("/api/v1/courses?instructor={}", ian.user.id))
            .dispatch()
            .await
            .into_json()
            .await
            .expect("courses json");
        assert_eq!(by_ian.len(), 1);
        assert_eq!(by_ian[0].id, other.id);

        let paged: Vec<CourseResponse> = client
            .get("/api/v1/courses?len=2&page=1")
            .dispatch()
            .await
            .into_json()
            .await
            .expect("courses json");
        assert_eq!(paged.len(), 1);

        let advanced: Vec<CourseResponse> = client
            .get("/api/v1/courses?level=Advanced")
            .dispatch()
            .await
            .into_json()
            .await
            .expect("courses json");
        assert!(advanced.is_empty());
    }
}
