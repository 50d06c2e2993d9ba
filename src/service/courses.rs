//! Course catalog and authoring. The acting user is always re-read from the
//! store before [`authorize`] sees it.

use uuid::Uuid;

use super::access::{authorize, Action};
use super::finish;
use crate::data::course::db::{CourseCreateData, CourseUpdateData, LessonCreateData};
use crate::data::course::{CourseQuery, CourseResponse, Lesson, LessonResponse};
use crate::data::store::{CourseRepository, Store, Transaction, UserRepository};
use crate::data::user::User;
use crate::error::{ResourceKind, ServiceError};
use crate::middleware::paging::PageState;

async fn actor(store: &dyn Store, id: Uuid) -> Result<User, ServiceError> {
    store
        .get_user(id)
        .await?
        .ok_or_else(|| ServiceError::not_found(ResourceKind::User, id))
}

pub async fn list_courses(
    store: &dyn Store,
    query: &CourseQuery,
    page: PageState,
) -> Result<Vec<CourseResponse>, ServiceError> {
    let courses = store.list_courses(query, page).await?;
    Ok(courses.into_iter().map(CourseResponse::from).collect())
}

pub async fn get_course(store: &dyn Store, id: Uuid) -> Result<CourseResponse, ServiceError> {
    store
        .get_course(id)
        .await?
        .map(CourseResponse::from)
        .ok_or_else(|| ServiceError::not_found(ResourceKind::Course, id))
}

#[tracing::instrument(skip(store))]
pub async fn create_course(
    store: &dyn Store,
    instructor: Uuid,
    data: CourseCreateData,
) -> Result<CourseResponse, ServiceError> {
    data.validate()?;

    let mut tx = store.begin().await?;
    let result = insert_owned(tx.as_mut(), instructor, data).await;
    let course = finish(tx, result).await?;

    tracing::info!("Instructor {} created course {}", instructor, course.id);
    Ok(course)
}

async fn insert_owned(
    tx: &mut (dyn Transaction + '_),
    instructor: Uuid,
    data: CourseCreateData,
) -> Result<CourseResponse, ServiceError> {
    let owner = tx
        .user(instructor)
        .await?
        .ok_or_else(|| ServiceError::not_found(ResourceKind::User, instructor))?;
    authorize(&owner, Action::CreateCourse).require()?;

    let course = data.into_course(&owner);
    tx.insert_course(&course).await?;
    tx.add_created_course(owner.id, course.id).await?;

    Ok(CourseResponse::from(course))
}

#[tracing::instrument(skip(store))]
pub async fn update_course(
    store: &dyn Store,
    actor_id: Uuid,
    course_id: Uuid,
    patch: CourseUpdateData,
) -> Result<CourseResponse, ServiceError> {
    patch.validate()?;

    let actor = actor(store, actor_id).await?;
    let course = store
        .get_course(course_id)
        .await?
        .ok_or_else(|| ServiceError::not_found(ResourceKind::Course, course_id))?;
    authorize(&actor, Action::UpdateCourse(&course)).require()?;

    if patch.is_empty() {
        return Ok(CourseResponse::from(course));
    }

    let updated = store
        .update_course(course_id, &patch)
        .await?
        .ok_or_else(|| ServiceError::not_found(ResourceKind::Course, course_id))?;

    tracing::info!("Course {} updated", course_id);
    Ok(CourseResponse::from(updated))
}

/// Deletes a course along with every reference to it: enrolled users lose it
/// from their enrolled courses and the instructor from their created ones.
#[tracing::instrument(skip(store))]
pub async fn delete_course(
    store: &dyn Store,
    actor_id: Uuid,
    course_id: Uuid,
) -> Result<CourseResponse, ServiceError> {
    let mut tx = store.begin().await?;
    let result = remove_everywhere(tx.as_mut(), actor_id, course_id).await;
    let removed = finish(tx, result).await?;

    tracing::info!("Course {} deleted", course_id);
    Ok(removed)
}

async fn remove_everywhere(
    tx: &mut (dyn Transaction + '_),
    actor_id: Uuid,
    course_id: Uuid,
) -> Result<CourseResponse, ServiceError> {
    let actor = tx
        .user(actor_id)
        .await?
        .ok_or_else(|| ServiceError::not_found(ResourceKind::User, actor_id))?;
    let course = tx
        .course(course_id)
        .await?
        .ok_or_else(|| ServiceError::not_found(ResourceKind::Course, course_id))?;
    authorize(&actor, Action::DeleteCourse(&course)).require()?;

    let removed = tx
        .remove_course(course_id)
        .await?
        .ok_or_else(|| ServiceError::not_found(ResourceKind::Course, course_id))?;
    let students = tx.forget_course(course_id).await?;
    tracing::debug!("Unlinked course {} from {} students", course_id, students);
    tx.remove_created_course(removed.instructor, course_id)
        .await?;

    Ok(CourseResponse::from(removed))
}

#[tracing::instrument(skip(store))]
pub async fn add_lesson(
    store: &dyn Store,
    actor_id: Uuid,
    course_id: Uuid,
    data: LessonCreateData,
) -> Result<LessonResponse, ServiceError> {
    data.validate()?;

    let actor = actor(store, actor_id).await?;
    let course = store
        .get_course(course_id)
        .await?
        .ok_or_else(|| ServiceError::not_found(ResourceKind::Course, course_id))?;
    authorize(&actor, Action::AddLesson(&course)).require()?;

    let lesson = Lesson::from(data);
    if !store.push_lesson(course_id, &lesson).await? {
        return Err(ServiceError::not_found(ResourceKind::Course, course_id));
    }

    tracing::info!("Lesson {} added to course {}", lesson.id, course_id);
    Ok(LessonResponse::new(course_id, lesson))
}

pub async fn get_lesson(
    store: &dyn Store,
    actor_id: Uuid,
    course_id: Uuid,
    lesson_id: Uuid,
) -> Result<LessonResponse, ServiceError> {
    let actor = actor(store, actor_id).await?;
    let course = store
        .get_course(course_id)
        .await?
        .ok_or_else(|| ServiceError::not_found(ResourceKind::Course, course_id))?;
    authorize(&actor, Action::ViewLesson(&course)).require()?;

    match course.lesson(lesson_id) {
        Some(lesson) => Ok(LessonResponse::new(course_id, lesson.clone())),
        None => Err(ServiceError::not_found(ResourceKind::Lesson, lesson_id)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::course::Level;
    use crate::role::Role;
    use crate::service::access::Denial;
    use crate::service::{enrollment, fixtures};

    fn lesson_data(title: &str) -> LessonCreateData {
        LessonCreateData {
            title: title.to_string(),
            description: "Watch and learn".to_string(),
            duration: 15,
            video_url: "https://videos.example.com/intro.mp4".to_string(),
            resources: vec![],
            quizzes: vec![],
        }
    }

    #[tokio::test]
    async fn instructor_creates_owned_course() {
        let store = fixtures::store();
        let ivy = fixtures::user(&store, "ivy", Role::Instructor).await;

        let course = create_course(&*store, ivy.id, fixtures::course_data("Rust"))
            .await
            .expect("created");

        assert_eq!(course.instructor, ivy.id);
        assert_eq!(course.instructor_name, "ivy");
        assert!(course.enrolled_students.is_empty());
        let owner = store.get_user(ivy.id).await.expect("read").expect("owner");
        assert_eq!(owner.created_courses, vec![course.id]);
    }

    #[tokio::test]
    async fn students_cannot_create_courses() {
        let store = fixtures::store();
        let sam = fixtures::user(&store, "sam", Role::Student).await;

        assert!(matches!(
            create_course(&*store, sam.id, fixtures::course_data("Rust")).await,
            Err(ServiceError::Forbidden(Denial::NotInstructor))
        ));
        let listed = list_courses(&*store, &CourseQuery::default(), PageState::default())
            .await
            .expect("listed");
        assert!(listed.is_empty());
    }

    #[tokio::test]
    async fn invalid_course_is_rejected_before_writing() {
        let store = fixtures::store();
        let ivy = fixtures::user(&store, "ivy", Role::Instructor).await;
        let mut data = fixtures::course_data("Rust");
        data.price = -1.0;

        assert!(matches!(
            create_course(&*store, ivy.id, data).await,
            Err(ServiceError::Invalid { field: "price", .. })
        ));
        let owner = store.get_user(ivy.id).await.expect("read").expect("owner");
        assert!(owner.created_courses.is_empty());
    }

    #[tokio::test]
    async fn non_owner_cannot_change_course() {
        let store = fixtures::store();
        let ivy = fixtures::user(&store, "ivy", Role::Instructor).await;
        let ian = fixtures::user(&store, "ian", Role::Instructor).await;
        let course = fixtures::course(&store, &ivy, "Rust").await;

        let patch = CourseUpdateData {
            title: Some("Hijacked".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            update_course(&*store, ian.id, course.id, patch).await,
            Err(ServiceError::Forbidden(Denial::NotOwner))
        ));
        assert!(matches!(
            delete_course(&*store, ian.id, course.id).await,
            Err(ServiceError::Forbidden(Denial::NotOwner))
        ));
        assert!(matches!(
            add_lesson(&*store, ian.id, course.id, lesson_data("Intro")).await,
            Err(ServiceError::Forbidden(Denial::NotOwner))
        ));

        let stored = store
            .get_course(course.id)
            .await
            .expect("read")
            .expect("course survives");
        assert_eq!(stored.title, "Rust");
        assert!(stored.lessons.is_empty());
    }

    #[tokio::test]
    async fn update_keeps_enrollment_and_lessons() {
        let store = fixtures::store();
        let ivy = fixtures::user(&store, "ivy", Role::Instructor).await;
        let sam = fixtures::user(&store, "sam", Role::Student).await;
        let course = fixtures::course(&store, &ivy, "Rust").await;
        add_lesson(&*store, ivy.id, course.id, lesson_data("Intro"))
            .await
            .expect("lesson added");
        enrollment::enroll(&*store, sam.id, course.id)
            .await
            .expect("enrolled");

        let updated = update_course(
            &*store,
            ivy.id,
            course.id,
            CourseUpdateData {
                title: Some("Rust in Practice".to_string()),
                level: Some(Level::Advanced),
                ..Default::default()
            },
        )
        .await
        .expect("updated");

        assert_eq!(updated.title, "Rust in Practice");
        assert_eq!(updated.level, Level::Advanced);
        assert_eq!(updated.enrolled_students, vec![sam.id]);
        assert_eq!(updated.lessons.len(), 1);
    }

    #[tokio::test]
    async fn delete_cascades_to_users() {
        let store = fixtures::store();
        let ivy = fixtures::user(&store, "ivy", Role::Instructor).await;
        let sam = fixtures::user(&store, "sam", Role::Student).await;
        let kim = fixtures::user(&store, "kim", Role::Student).await;
        let rust = fixtures::course(&store, &ivy, "Rust").await;
        let go = fixtures::course(&store, &ivy, "Go").await;
        enrollment::enroll(&*store, sam.id, rust.id).await.expect("sam");
        enrollment::enroll(&*store, kim.id, rust.id).await.expect("kim");
        enrollment::enroll(&*store, kim.id, go.id).await.expect("kim go");

        let removed = delete_course(&*store, ivy.id, rust.id)
            .await
            .expect("deleted");
        assert_eq!(removed.id, rust.id);

        assert!(store.get_course(rust.id).await.expect("read").is_none());
        let sam = store.get_user(sam.id).await.expect("read").expect("sam");
        let kim = store.get_user(kim.id).await.expect("read").expect("kim");
        let ivy = store.get_user(ivy.id).await.expect("read").expect("ivy");
        assert!(sam.enrolled_courses.is_empty());
        assert_eq!(kim.enrolled_courses, vec![go.id]);
        assert_eq!(ivy.created_courses, vec![go.id]);
    }

    #[tokio::test]
    async fn failed_cascade_keeps_course() {
        let store = fixtures::store();
        let ivy = fixtures::user(&store, "ivy", Role::Instructor).await;
        let sam = fixtures::user(&store, "sam", Role::Student).await;
        let rust = fixtures::course(&store, &ivy, "Rust").await;
        enrollment::enroll(&*store, sam.id, rust.id).await.expect("sam");

        store.fail_nth_write(2);
        assert!(delete_course(&*store, ivy.id, rust.id).await.is_err());

        let course = store.get_course(rust.id).await.expect("read").expect("kept");
        assert_eq!(course.enrolled_students, vec![sam.id]);
        let sam = store.get_user(sam.id).await.expect("read").expect("sam");
        assert_eq!(sam.enrolled_courses, vec![rust.id]);
    }

    #[tokio::test]
    async fn lessons_gated_by_enrollment() {
        let store = fixtures::store();
        let ivy = fixtures::user(&store, "ivy", Role::Instructor).await;
        let sam = fixtures::user(&store, "sam", Role::Student).await;
        let course = fixtures::course(&store, &ivy, "Rust").await;
        let lesson = add_lesson(&*store, ivy.id, course.id, lesson_data("Intro"))
            .await
            .expect("lesson added");

        assert!(matches!(
            get_lesson(&*store, sam.id, course.id, lesson.id).await,
            Err(ServiceError::Forbidden(Denial::NotEnrolled))
        ));

        enrollment::enroll(&*store, sam.id, course.id)
            .await
            .expect("enrolled");
        let seen = get_lesson(&*store, sam.id, course.id, lesson.id)
            .await
            .expect("visible");
        assert_eq!(seen.title, "Intro");
        assert_eq!(seen.course, course.id);

        assert!(matches!(
            get_lesson(&*store, ivy.id, course.id, Uuid::new_v4()).await,
            Err(ServiceError::NotFound {
                kind: ResourceKind::Lesson,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn listing_filters_and_summarizes() {
        let store = fixtures::store();
        let ivy = fixtures::user(&store, "ivy", Role::Instructor).await;
        let rust = fixtures::course(&store, &ivy, "Rust").await;
        add_lesson(&*store, ivy.id, rust.id, lesson_data("Intro"))
            .await
            .expect("lesson added");

        let mut design = fixtures::course_data("Layout");
        design.category = "Design".to_string();
        create_course(&*store, ivy.id, design).await.expect("created");

        let query = CourseQuery {
            category: Some("Programming".to_string()),
            ..Default::default()
        };
        let listed = list_courses(&*store, &query, PageState::default())
            .await
            .expect("listed");
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, rust.id);
        assert_eq!(listed[0].lessons[0].title, "Intro");

        let all = list_courses(&*store, &CourseQuery::default(), PageState::new(0, 1))
            .await
            .expect("listed");
        assert_eq!(all.len(), 1);
        assert!(get_course(&*store, Uuid::new_v4()).await.is_err());
    }
}
