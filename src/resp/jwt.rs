use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rocket::http::{Cookie, Status};
use rocket::outcome::Outcome::{Error, Success};
use rocket::request::{self, FromRequest, Request};
use rocket::time::OffsetDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::data::user::User;
use crate::resp::problem::problems::auth_problem;
use crate::resp::problem::Problem;
use crate::role::Role;
use crate::security::Security;

pub static AUTH_COOKIE_NAME: &str = "jwt_auth";

/// Claims of an auth token. The role is informational, handlers re-read the
/// user before acting on it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRoleToken {
    #[serde(with = "chrono::serde::ts_seconds")]
    iat: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_seconds")]
    exp: DateTime<Utc>,
    pub user: Uuid,
    pub role: Role,
}

impl UserRoleToken {
    pub fn new(user: &User, lifetime: Duration) -> UserRoleToken {
        let now = Utc::now();
        UserRoleToken {
            iat: now,
            exp: now + lifetime,
            user: user.id,
            role: user.user_role,
        }
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.exp
    }

    pub fn encode_jwt(&self, security: &Security) -> Result<String, jsonwebtoken::errors::Error> {
        let header = Header::new(Algorithm::HS256);
        let key = EncodingKey::from_secret(&security.jwt_secret);

        encode(&header, &self, &key)
    }

    pub fn cookie(&self, token: String) -> Cookie<'static> {
        Cookie::build((AUTH_COOKIE_NAME, token))
            .secure(true)
            .expires(OffsetDateTime::from_unix_timestamp(self.exp.timestamp()).ok())
            .path("/")
            .http_only(true)
            .build()
    }
}

pub fn decode_jwt(token: &str, security: &Security) -> Result<UserRoleToken, Problem> {
    decode::<UserRoleToken>(
        token,
        &DecodingKey::from_secret(&security.jwt_secret),
        &Validation::new(Algorithm::HS256),
    )
    .map(|data| data.claims)
    .map_err(Problem::from)
}

/// Bearer header first, `jwt_auth` cookie otherwise.
fn raw_token(req: &Request<'_>) -> Option<String> {
    if let Some(header) = req.headers().get_one("Authorization") {
        if let Some(token) = header.strip_prefix("Bearer ") {
            tracing::trace!("extracted jwt auth from authorization header");
            return Some(token.trim().to_string());
        }
    }

    req.cookies().get(AUTH_COOKIE_NAME).map(|jwt| {
        tracing::trace!("extracted jwt auth from cookie");
        jwt.value().to_string()
    })
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for UserRoleToken {
    type Error = Problem;

    async fn from_request(req: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        let security = match req.rocket().state::<Security>() {
            Some(it) => it,
            None => {
                tracing::error!("security state isn't managed");
                return Error((
                    Status::InternalServerError,
                    Problem::new_untyped(Status::InternalServerError, "Server misconfigured."),
                ));
            }
        };

        let token = match raw_token(req) {
            Some(it) => it,
            None => {
                return Error((
                    Status::Unauthorized,
                    auth_problem("No bearer token or auth cookie."),
                ))
            }
        };

        match decode_jwt(&token, security) {
            Ok(claims) => {
                tracing::debug!("decoded user roles token for user: {}", claims.user);
                Success(claims)
            }
            Err(problem) => {
                tracing::debug!("unable to decode auth token: {}", problem);
                Error((Status::Unauthorized, problem))
            }
        }
    }
}

pub mod doc {
    use utoipa::openapi::security::*;

    #[derive(Clone, Copy)]
    pub struct JWTAuth;

    impl From<JWTAuth> for SecurityScheme {
        fn from(_: JWTAuth) -> SecurityScheme {
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            )
        }
    }

    impl utoipa::Modify for JWTAuth {
        fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
            if let Some(c) = openapi.components.as_mut() {
                c.add_security_scheme("jwt", *self)
            }
        }
    }
}
