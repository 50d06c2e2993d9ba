use std::path::{Path, PathBuf};
use std::{env, fs};

use crate::error::ConfigurationError;

const USER_AUTH_SECRET: &str = "user_auth.secret";
const SECRET_LENGTH: usize = 64;

pub type Salt = [u8; 16];

/// Secrets used to hash passwords and sign auth tokens.
#[derive(Clone)]
pub struct Security {
    pub jwt_secret: Vec<u8>,
    pub password_cost: u32,
}

impl std::fmt::Debug for Security {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Security")
            .field("jwt_secret", &"<redacted>")
            .field("password_cost", &self.password_cost)
            .finish()
    }
}

#[inline]
fn security_dir() -> PathBuf {
    PathBuf::from(env::var("SECURITY_DIR").unwrap_or_else(|_| "./security".to_string()))
}

impl Security {
    pub fn load(password_cost: u32) -> Result<Security, ConfigurationError> {
        if let Ok(secret) = env::var("JWT_SECRET") {
            if !secret.is_empty() {
                tracing::info!("Using JWT signing secret from environment.");
                return Ok(Security::new(secret.into_bytes(), password_cost));
            }
        }

        Security::load_from(security_dir(), password_cost)
    }

    pub fn load_from(dir: impl AsRef<Path>, password_cost: u32) -> Result<Security, ConfigurationError> {
        let dir = dir.as_ref();
        let secret_path = dir.join(USER_AUTH_SECRET);

        tracing::info!("Loading JWT signing secret...");
        let secret = match fs::read(&secret_path) {
            Ok(secret) if !secret.is_empty() => {
                tracing::info!("Loaded JWT signing secret.");
                secret
            }
            _ if cfg!(feature = "generate-security") => {
                tracing::info!(
                    "JWT signing secret not found in '{}'. Generating a new one.",
                    secret_path.display()
                );
                fs::create_dir_all(dir)?;
                let secret = random_secret();
                fs::write(&secret_path, &secret)?;
                secret
            }
            _ => return Err(ConfigurationError::MissingSecurity(secret_path)),
        };

        Ok(Security::new(secret, password_cost))
    }

    /// Secrets that only live as long as the process.
    pub fn ephemeral(password_cost: u32) -> Security {
        Security::new(random_secret(), password_cost)
    }

    fn new(jwt_secret: Vec<u8>, password_cost: u32) -> Security {
        Security {
            jwt_secret,
            password_cost: password_cost.clamp(4, 31),
        }
    }
}

fn random_secret() -> Vec<u8> {
    (0..SECRET_LENGTH).map(|_| rand::random::<u8>()).collect()
}

pub fn random_salt() -> Salt {
    rand::random()
}
