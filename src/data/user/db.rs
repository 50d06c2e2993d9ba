use serde::Deserialize;
use utoipa::ToSchema;

use crate::error::ServiceError;
use crate::role::Role;

#[derive(Clone, Deserialize, ToSchema)]
pub struct UserSignupData {
    #[schema(format = "email")]
    pub email: String,
    pub username: String,
    #[schema(format = "password")]
    pub password: String,
    #[serde(default)]
    pub role: Option<Role>,
}

impl std::fmt::Debug for UserSignupData {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "UserSignupInfo:{}", self.username)
    }
}

impl UserSignupData {
    pub fn validate(&self) -> Result<(), ServiceError> {
        let email = self.email.trim();
        match email.split_once('@') {
            Some((local, domain)) if !local.is_empty() && !domain.is_empty() => {}
            _ => return Err(ServiceError::invalid("email", "Not a valid e-mail address.")),
        }

        if self.username.trim().len() < 3 {
            return Err(ServiceError::invalid(
                "username",
                "Username must be at least 3 characters (bytes) long.",
            ));
        }

        if self.username.len() > 32 {
            return Err(ServiceError::invalid(
                "username",
                "Username can't be longer than 32 (bytes) characters.",
            ));
        }

        if self.username.contains('@') {
            return Err(ServiceError::invalid(
                "username",
                "Username can't contain '@'.",
            ));
        }

        if self.password.len() < 8 {
            return Err(ServiceError::invalid(
                "password",
                "Password must be at least 8 characters (bytes) long.",
            ));
        }

        if self.password.len() > 1024 {
            return Err(ServiceError::invalid(
                "password",
                "Passwords longer than 1024 characters aren't supported.",
            ));
        }

        Ok(())
    }
}

#[derive(Clone, Deserialize, ToSchema)]
pub struct UserLoginData {
    /// Email or username.
    pub identifier: String,
    #[schema(format = "password")]
    pub password: String,
}

impl std::fmt::Debug for UserLoginData {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "UserLoginInfo:{}", self.identifier)
    }
}

impl UserLoginData {
    pub fn is_email(&self) -> bool {
        self.identifier.contains('@')
    }

    pub fn validate(&self) -> Result<(), ServiceError> {
        if self.identifier.is_empty() || self.password.is_empty() || self.password.len() > 1024
        {
            return Err(ServiceError::Unauthorized("Bad credentials."));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct AvatarData {
    /// Location of the uploaded image on the asset host.
    pub url: String,
}
