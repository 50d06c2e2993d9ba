use chrono::Utc;
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

use super::{Course, Level, Lesson, Quiz, Resource};
use crate::data::user::User;
use crate::error::ServiceError;
use crate::util::is_web_url;

fn require_text(field: &'static str, value: &str) -> Result<(), ServiceError> {
    if value.trim().is_empty() {
        return Err(ServiceError::invalid(field, "Must not be empty."));
    }
    Ok(())
}

fn require_url(field: &'static str, value: &str) -> Result<(), ServiceError> {
    if !is_web_url(value) {
        return Err(ServiceError::invalid(field, "Must be an http(s) URL."));
    }
    Ok(())
}

fn require_price(value: f64) -> Result<(), ServiceError> {
    if !value.is_finite() || value < 0.0 {
        return Err(ServiceError::invalid("price", "Must be a non-negative number."));
    }
    Ok(())
}

fn require_duration(field: &'static str, value: u32) -> Result<(), ServiceError> {
    if value == 0 {
        return Err(ServiceError::invalid(field, "Must be greater than zero."));
    }
    Ok(())
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CourseCreateData {
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub thumbnail: Option<String>,
    pub category: String,
    pub level: Level,
    pub duration: u32,
    pub price: f64,
}

impl CourseCreateData {
    pub fn validate(&self) -> Result<(), ServiceError> {
        require_text("title", &self.title)?;
        require_text("description", &self.description)?;
        require_text("category", &self.category)?;
        if let Some(thumbnail) = &self.thumbnail {
            require_url("thumbnail", thumbnail)?;
        }
        require_duration("duration", self.duration)?;
        require_price(self.price)
    }

    /// Builds a course owned by `instructor`. Ownership never comes from the payload.
    pub fn into_course(self, instructor: &User) -> Course {
        let now = Utc::now();
        Course {
            id: Uuid::new_v4(),
            title: self.title.trim().to_string(),
            description: self.description,
            thumbnail: self.thumbnail,
            instructor: instructor.id,
            instructor_name: instructor.username.clone(),
            category: self.category.trim().to_string(),
            level: self.level,
            duration: self.duration,
            price: self.price,
            rating: 0.0,
            reviews: 0,
            lessons: vec![],
            enrolled_students: vec![],
            created_at: now,
            updated_at: now,
        }
    }
}

/// Editable course fields; absent fields stay untouched.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, ToSchema)]
pub struct CourseUpdateData {
    pub title: Option<String>,
    pub description: Option<String>,
    pub thumbnail: Option<String>,
    pub category: Option<String>,
    pub level: Option<Level>,
    pub duration: Option<u32>,
    pub price: Option<f64>,
}

impl CourseUpdateData {
    pub fn validate(&self) -> Result<(), ServiceError> {
        if let Some(title) = &self.title {
            require_text("title", title)?;
        }
        if let Some(description) = &self.description {
            require_text("description", description)?;
        }
        if let Some(category) = &self.category {
            require_text("category", category)?;
        }
        if let Some(thumbnail) = &self.thumbnail {
            require_url("thumbnail", thumbnail)?;
        }
        if let Some(duration) = self.duration {
            require_duration("duration", duration)?;
        }
        if let Some(price) = self.price {
            require_price(price)?;
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        *self == CourseUpdateData::default()
    }

    pub fn apply(&self, course: &mut Course) {
        if let Some(title) = &self.title {
            course.title = title.trim().to_string();
        }
        if let Some(description) = &self.description {
            course.description = description.clone();
        }
        if let Some(thumbnail) = &self.thumbnail {
            course.thumbnail = Some(thumbnail.clone());
        }
        if let Some(category) = &self.category {
            course.category = category.trim().to_string();
        }
        if let Some(level) = self.level {
            course.level = level;
        }
        if let Some(duration) = self.duration {
            course.duration = duration;
        }
        if let Some(price) = self.price {
            course.price = price;
        }
        course.updated_at = Utc::now();
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct LessonCreateData {
    pub title: String,
    pub description: String,
    pub duration: u32,
    pub video_url: String,
    #[serde(default)]
    pub resources: Vec<Resource>,
    #[serde(default)]
    pub quizzes: Vec<Quiz>,
}

impl LessonCreateData {
    pub fn validate(&self) -> Result<(), ServiceError> {
        require_text("title", &self.title)?;
        require_text("description", &self.description)?;
        require_duration("duration", self.duration)?;
        require_url("video_url", &self.video_url)?;

        for resource in &self.resources {
            require_text("resources.title", &resource.title)?;
            require_url("resources.url", &resource.url)?;
        }

        for quiz in &self.quizzes {
            require_text("quizzes.title", &quiz.title)?;
            for question in &quiz.questions {
                require_text("quizzes.questions.text", &question.text)?;
                if question.options.is_empty() {
                    return Err(ServiceError::invalid(
                        "quizzes.questions.options",
                        "A question needs at least one option.",
                    ));
                }
                if question.correct_answer as usize >= question.options.len() {
                    return Err(ServiceError::invalid(
                        "quizzes.questions.correct_answer",
                        format!(
                            "Answer index {} is out of range for {} options.",
                            question.correct_answer,
                            question.options.len()
                        ),
                    ));
                }
            }
        }

        Ok(())
    }
}

impl From<LessonCreateData> for Lesson {
    fn from(data: LessonCreateData) -> Self {
        Lesson {
            id: Uuid::new_v4(),
            title: data.title.trim().to_string(),
            description: data.description,
            duration: data.duration,
            video_url: data.video_url,
            resources: data.resources,
            quizzes: data.quizzes,
        }
    }
}
