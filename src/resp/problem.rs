use std::fmt::{Display, Formatter};
use std::io::Cursor;

use rocket::http::{ContentType, Status};
use rocket::response::Responder;
use rocket::{response, Request, Response};
use serde::Serialize;
use serde_json::{Map, Value};
use utoipa::ToSchema;

use crate::error::{ServiceError, StorageError};

/// Implements [RFC7807](https://tools.ietf.org/html/rfc7807).
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct Problem {
    #[serde(skip)]
    pub status: Status,
    pub type_uri: String,
    pub title: String,

    pub detail: Option<String>,
    pub instance_uri: Option<String>,

    #[schema(value_type = Object)]
    pub body: Map<String, Value>,
}

impl Default for Problem {
    fn default() -> Self {
        Problem {
            status: Status::InternalServerError,
            type_uri: "about:blank".to_string(),
            title: "Problem".to_string(),
            detail: None,
            instance_uri: None,
            body: Map::new(),
        }
    }
}

impl Problem {
    pub fn new_untyped(status: Status, title: impl ToString) -> Problem {
        Problem {
            status,
            type_uri: "about:blank".to_string(),
            title: title.to_string(),
            ..Default::default()
        }
    }

    pub fn detail(&mut self, value: impl ToString) -> &mut Problem {
        self.detail = Some(value.to_string());
        self
    }

    /// Values that fail to serialize are stored as `null`.
    pub fn insert<V: Serialize>(&mut self, key: impl ToString, value: V) -> &mut Problem {
        self.body.insert(
            key.to_string(),
            serde_json::to_value(value).unwrap_or(Value::Null),
        );
        self
    }

    pub fn insert_str(&mut self, key: impl ToString, value: impl ToString) -> &mut Problem {
        self.body
            .insert(key.to_string(), Value::String(value.to_string()));
        self
    }
}

impl Display for Problem {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.status, self.title)
    }
}

impl std::error::Error for Problem {}

impl<'r> Responder<'r, 'static> for Problem {
    fn respond_to(self, req: &'r Request<'_>) -> response::Result<'static> {
        let mut body = self.body;

        // Following are required by rfc7807
        body.insert(String::from("type"), Value::from(self.type_uri));
        body.insert(String::from("title"), Value::from(self.title));

        // Optional parameters as specified by rfc7807
        if let Some(detail) = self.detail {
            body.insert(String::from("detail"), Value::from(detail));
        }
        body.insert(String::from("status"), Value::from(self.status.code));
        body.insert(
            String::from("instance"),
            Value::from(self.instance_uri.unwrap_or_else(|| req.uri().to_string())),
        );

        let body_string = Value::Object(body).to_string();

        Response::build()
            .status(self.status)
            .header(ContentType::new("application", "problem+json"))
            .raw_header("Content-Language", "en")
            .sized_body(body_string.len(), Cursor::new(body_string))
            .ok()
    }
}

pub mod problems {
    use crate::resp::problem::Problem;
    use rocket::http::Status;

    #[inline]
    pub fn parse_problem() -> Problem {
        Problem::new_untyped(
            Status::BadRequest,
            "There was a problem parsing part of the request.",
        )
    }

    /// Storage refused the request for now. When the commit outcome is unknown
    /// the changes may already be stored.
    pub fn unavailable(commit_outcome_unknown: bool) -> Problem {
        let detail = if commit_outcome_unknown {
            "The changes may or may not have been stored. Check the current state before retrying."
        } else {
            "Nothing was changed. The request can be retried."
        };

        Problem::new_untyped(
            Status::ServiceUnavailable,
            "Storage is temporarily unavailable.",
        )
        .detail(detail)
        .insert("retryable", true)
        .insert("commit_unknown", commit_outcome_unknown)
        .clone()
    }

    #[inline]
    pub fn auth_problem(detail: impl ToString) -> Problem {
        Problem::new_untyped(Status::Unauthorized, "Unable to authorize user.")
            .detail(detail)
            .clone()
    }
}

impl From<ServiceError> for Problem {
    fn from(e: ServiceError) -> Self {
        match e {
            ServiceError::NotFound { kind, id } => {
                Problem::new_untyped(Status::NotFound, format!("The {} doesn't exist.", kind))
                    .insert_str("resource", kind)
                    .insert("id", id)
                    .clone()
            }
            ServiceError::AlreadyEnrolled { user, course } => Problem::new_untyped(
                Status::Conflict,
                "User is already enrolled in this course.",
            )
            .insert("user", user)
            .insert("course", course)
            .clone(),
            ServiceError::NotEnrolled { user, course } => {
                Problem::new_untyped(Status::Conflict, "User is not enrolled in this course.")
                    .insert("user", user)
                    .insert("course", course)
                    .clone()
            }
            ServiceError::Forbidden(reason) => {
                Problem::new_untyped(Status::Forbidden, "Operation not permitted.")
                    .detail(reason)
                    .clone()
            }
            ServiceError::Conflict(reason) => {
                Problem::new_untyped(Status::Conflict, "Request conflicts with stored data.")
                    .detail(reason)
                    .clone()
            }
            ServiceError::Invalid { field, reason } => {
                Problem::new_untyped(Status::BadRequest, "Submitted data is invalid.")
                    .insert_str("field", field)
                    .detail(reason)
                    .clone()
            }
            ServiceError::Unauthorized(reason) => problems::auth_problem(reason),
            ServiceError::Storage(e) => Problem::from(e),
        }
    }
}

impl From<StorageError> for Problem {
    fn from(e: StorageError) -> Self {
        if e.is_transient() {
            tracing::warn!("Transient storage failure: {}", e);
            return problems::unavailable(e.commit_outcome_unknown());
        }

        tracing::error!("Storage failure: {}", e);
        match e {
            StorageError::Database(e) => Problem::from(e),
            StorageError::Serialize(_) | StorageError::Deserialize(_) => Problem::new_untyped(
                Status::InternalServerError,
                "There was a problem with handling MongoDB bson.",
            ),
            StorageError::Duplicate(field) => {
                Problem::new_untyped(Status::Conflict, "Request conflicts with stored data.")
                    .insert_str("field", field)
                    .clone()
            }
            StorageError::Rollback { .. } => Problem::new_untyped(
                Status::InternalServerError,
                "Partial changes couldn't be rolled back.",
            ),
            StorageError::Injected(_) => {
                Problem::new_untyped(Status::InternalServerError, "Storage failure.")
            }
        }
    }
}

impl From<mongodb::error::Error> for Problem {
    fn from(e: mongodb::error::Error) -> Self {
        use mongodb::error::ErrorKind;

        fn mongodb_problem() -> Problem {
            Problem::new_untyped(
                Status::InternalServerError,
                "MongoDB failed while processing request.",
            )
        }

        fn access_problem() -> Problem {
            Problem::new_untyped(
                Status::InternalServerError,
                "Server was unable to access MongoDB.",
            )
        }

        fn bad_db_request() -> Problem {
            Problem::new_untyped(
                Status::InternalServerError,
                "MongoDB was unable to process bad server request.",
            )
        }

        match e.kind.as_ref() {
            ErrorKind::InvalidArgument { .. } => bad_db_request(),
            ErrorKind::Authentication { .. } => access_problem(),
            ErrorKind::BulkWrite(_) => bad_db_request(),
            ErrorKind::Command(_) => bad_db_request(),
            ErrorKind::DnsResolve { .. } => access_problem(),
            ErrorKind::InvalidTlsConfig { .. } => access_problem(),
            ErrorKind::IncompatibleServer { .. } => access_problem(),
            ErrorKind::Write(_) => mongodb_problem()
                .detail("A write error occurred. Submitted data might not be properly stored.")
                .clone(),
            _ => mongodb_problem(),
        }
    }
}

impl From<jsonwebtoken::errors::Error> for Problem {
    fn from(e: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match e.into_kind() {
            ErrorKind::ExpiredSignature => problems::auth_problem("Expired JWT signature."),
            _ => problems::auth_problem("Error while handling JWT."),
        }
    }
}
