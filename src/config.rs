use crate::error::ConfigurationError;
use crate::util;
use std::env;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Mongodb,
    Memory,
}

fn default_storage() -> StorageBackend {
    match env::var("STORAGE_BACKEND").as_deref() {
        Ok("memory") => StorageBackend::Memory,
        _ => StorageBackend::Mongodb,
    }
}

fn default_mongodb_uri() -> String {
    env::var("MONGODB_URI").unwrap_or_else(|_| "mongodb://localhost:27017".to_string())
}

fn default_mongodb_db() -> String {
    env::var("MONGODB_DB_NAME").unwrap_or_else(|_| "edulearn".to_string())
}

fn default_mongodb_transactions() -> Option<bool> {
    env::var("MONGODB_TRANSACTIONS")
        .ok()
        .and_then(|it| it.parse().ok())
}

const MAX_TOKEN_LIFETIME_MINUTES: i64 = 365 * 24 * 60;

fn default_token_lifetime_minutes() -> i64 {
    60
}

#[cfg(debug_assertions)]
pub(crate) fn default_password_cost() -> u32 {
    8
}
#[cfg(not(debug_assertions))]
pub(crate) fn default_password_cost() -> u32 {
    12
}

fn default_allow_instructor_signup() -> bool {
    true
}

fn default_page_length() -> u32 {
    20
}

fn default_max_page_length() -> u32 {
    100
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(skip)]
    file_path: PathBuf,

    #[serde(default = "default_storage")]
    pub storage: StorageBackend,

    #[serde(default = "default_mongodb_uri")]
    pub mongodb_uri: String,
    #[serde(default = "default_mongodb_db")]
    pub mongodb_db: String,
    /// Forces multi-document transactions on or off. Detected from the
    /// deployment topology when unset.
    #[serde(default = "default_mongodb_transactions")]
    pub mongodb_transactions: Option<bool>,

    #[serde(default = "default_token_lifetime_minutes")]
    pub token_lifetime_minutes: i64,
    /// bcrypt cost factor, 4..=31.
    #[serde(default = "default_password_cost")]
    pub password_cost: u32,
    #[serde(default = "default_allow_instructor_signup")]
    pub allow_instructor_signup: bool,

    #[serde(default = "default_page_length")]
    pub default_page_length: u32,
    #[serde(default = "default_max_page_length")]
    pub max_page_length: u32,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            file_path: config_dir().join("settings.yml"),
            storage: default_storage(),
            mongodb_uri: default_mongodb_uri(),
            mongodb_db: default_mongodb_db(),
            mongodb_transactions: default_mongodb_transactions(),
            token_lifetime_minutes: default_token_lifetime_minutes(),
            password_cost: default_password_cost(),
            allow_instructor_signup: default_allow_instructor_signup(),
            default_page_length: default_page_length(),
            max_page_length: default_max_page_length(),
        }
    }
}

#[inline]
fn config_dir() -> PathBuf {
    PathBuf::from(env::var("CONFIG_DIR").unwrap_or_else(|_| "./config".to_string()))
}

impl Config {
    pub fn load() -> Result<Config, ConfigurationError> {
        let config_file = util::find_first_subpath(
            config_dir(),
            &["settings.yml", "settings.yaml"],
            Path::exists,
        )
        .ok_or_else(|| ConfigurationError::NotFound(config_dir()))?;

        let file = File::open(&config_file)?;
        let mut config: Config = serde_yaml::from_reader(BufReader::new(file))?;
        config.file_path = config_file;

        Ok(config)
    }

    pub fn from_yaml(yaml: &str) -> Result<Config, ConfigurationError> {
        let mut config: Config = serde_yaml::from_str(yaml)?;
        config.file_path = config_dir().join("settings.yml");
        Ok(config)
    }

    pub fn save(&self) -> Result<(), ConfigurationError> {
        if let Some(parent) = self.file_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = File::create(&self.file_path)?;
        let mut out = BufWriter::new(file);
        serde_yaml::to_writer(&mut out, self)?;
        out.flush()?;
        Ok(())
    }

    /// Between a minute and a year.
    pub fn token_lifetime(&self) -> chrono::Duration {
        chrono::Duration::minutes(
            self.token_lifetime_minutes
                .clamp(1, MAX_TOKEN_LIFETIME_MINUTES),
        )
    }

    /// Configuration for in-process use, backed by the memory store.
    pub fn in_memory() -> Config {
        Config {
            storage: StorageBackend::Memory,
            password_cost: 4,
            ..Config::default()
        }
    }
}
