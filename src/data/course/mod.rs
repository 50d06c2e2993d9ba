use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

pub mod db;

pub static COURSE_COLLECTION_NAME: &str = "courses";

#[derive(
    Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize, ToSchema, FromFormField,
)]
pub enum Level {
    Beginner,
    Intermediate,
    Advanced,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Pdf,
    Link,
    Document,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Resource {
    pub title: String,
    #[serde(rename = "type")]
    pub kind: ResourceKind,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Question {
    pub text: String,
    pub options: Vec<String>,
    /// Index into `options`.
    pub correct_answer: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Quiz {
    pub title: String,
    #[serde(default)]
    pub questions: Vec<Question>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lesson {
    #[serde(with = "bson::serde_helpers::uuid_1_as_binary")]
    pub id: Uuid,
    pub title: String,
    pub description: String,
    /// Minutes.
    pub duration: u32,
    pub video_url: String,
    #[serde(default)]
    pub resources: Vec<Resource>,
    #[serde(default)]
    pub quizzes: Vec<Quiz>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Course {
    #[serde(rename = "_id", with = "bson::serde_helpers::uuid_1_as_binary")]
    pub id: Uuid,
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub thumbnail: Option<String>,
    #[serde(with = "bson::serde_helpers::uuid_1_as_binary")]
    pub instructor: Uuid,
    pub instructor_name: String,
    pub category: String,
    pub level: Level,
    /// Minutes.
    pub duration: u32,
    pub price: f64,
    #[serde(default)]
    pub rating: f64,
    #[serde(default)]
    pub reviews: u32,
    #[serde(default)]
    pub lessons: Vec<Lesson>,
    #[serde(default, with = "crate::util::uuid_vec_as_binary")]
    pub enrolled_students: Vec<Uuid>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl Course {
    pub fn has_student(&self, user: Uuid) -> bool {
        self.enrolled_students.contains(&user)
    }

    pub fn is_owned_by(&self, user: Uuid) -> bool {
        self.instructor == user
    }

    pub fn lesson(&self, id: Uuid) -> Option<&Lesson> {
        self.lessons.iter().find(|it| it.id == id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct LessonSummary {
    pub id: Uuid,
    pub title: String,
    pub duration: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct LessonResponse {
    pub id: Uuid,
    pub course: Uuid,
    pub title: String,
    pub description: String,
    pub duration: u32,
    pub video_url: String,
    pub resources: Vec<Resource>,
    pub quizzes: Vec<Quiz>,
}

impl LessonResponse {
    pub fn new(course: Uuid, lesson: Lesson) -> LessonResponse {
        LessonResponse {
            id: lesson.id,
            course,
            title: lesson.title,
            description: lesson.description,
            duration: lesson.duration,
            video_url: lesson.video_url,
            resources: lesson.resources,
            quizzes: lesson.quizzes,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CourseResponse {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub thumbnail: Option<String>,
    pub instructor: Uuid,
    pub instructor_name: String,
    pub category: String,
    pub level: Level,
    pub duration: u32,
    pub price: f64,
    pub rating: f64,
    pub reviews: u32,
    pub lessons: Vec<LessonSummary>,
    pub enrolled_students: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Course> for CourseResponse {
    fn from(course: Course) -> Self {
        CourseResponse {
            id: course.id,
            title: course.title,
            description: course.description,
            thumbnail: course.thumbnail,
            instructor: course.instructor,
            instructor_name: course.instructor_name,
            category: course.category,
            level: course.level,
            duration: course.duration,
            price: course.price,
            rating: course.rating,
            reviews: course.reviews,
            lessons: course
                .lessons
                .into_iter()
                .map(|it| LessonSummary {
                    id: it.id,
                    title: it.title,
                    duration: it.duration,
                })
                .collect(),
            enrolled_students: course.enrolled_students,
            created_at: course.created_at,
            updated_at: course.updated_at,
        }
    }
}

/// Filters for course listings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CourseQuery {
    pub category: Option<String>,
    pub level: Option<Level>,
    pub instructor: Option<Uuid>,
}

impl CourseQuery {
    pub fn matches(&self, course: &Course) -> bool {
        self.category
            .as_ref()
            .map_or(true, |it| it == &course.category)
            && self.level.map_or(true, |it| it == course.level)
            && self.instructor.map_or(true, |it| it == course.instructor)
    }
}
