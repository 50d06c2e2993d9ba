use chrono::{DateTime, Utc};
use crypto::bcrypt::bcrypt;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use utoipa::ToSchema;
use uuid::Uuid;

pub mod db;

use crate::role::Role;
use crate::security::{random_salt, Salt, Security};

pub static USER_COLLECTION_NAME: &str = "users";

/// Salted bcrypt digest. The cost it was made with is kept alongside, so
/// changing `password_cost` only affects new hashes.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct PasswordHash {
    salt: Salt,
    hash: [u8; 24],
    #[serde(default = "crate::config::default_password_cost")]
    cost: u32,
}

impl PasswordHash {
    pub fn new(password: impl AsRef<str>, security: &Security) -> PasswordHash {
        let salt = random_salt();
        let cost = security.password_cost;
        PasswordHash {
            salt,
            hash: digest(password.as_ref(), &salt, cost),
            cost,
        }
    }

    pub fn verify(&self, password: impl AsRef<str>) -> bool {
        let candidate = digest(password.as_ref(), &self.salt, self.cost);
        // compare without early exit
        candidate
            .iter()
            .zip(self.hash.iter())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }
}

// SHA-256 first: bcrypt only reads 72 bytes of input.
fn digest(password: &str, salt: &Salt, cost: u32) -> [u8; 24] {
    let mut out: [u8; 24] = [0; 24];

    let mut sha = Sha256::new();
    sha2::Digest::update(&mut sha, password.as_bytes());

    bcrypt(cost, salt, sha.finalize().as_slice(), &mut out);

    out
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "_id", with = "bson::serde_helpers::uuid_1_as_binary")]
    pub id: Uuid,
    pub email: String,
    pub username: String,
    pub pw_hash: PasswordHash,
    pub user_role: Role,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default, with = "crate::util::uuid_vec_as_binary")]
    pub enrolled_courses: Vec<Uuid>,
    #[serde(default, with = "crate::util::uuid_vec_as_binary")]
    pub created_courses: Vec<Uuid>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn new(
        email: impl ToString,
        username: impl ToString,
        password: impl AsRef<str>,
        role: Role,
        security: &Security,
    ) -> User {
        let id = Uuid::new_v4();
        tracing::info!("Creating a new user with UUID: {}", id);

        User {
            id,
            email: email.to_string(),
            username: username.to_string(),
            pw_hash: PasswordHash::new(password, security),
            user_role: role,
            avatar: None,
            enrolled_courses: vec![],
            created_courses: vec![],
            created_at: Utc::now(),
        }
    }
}

/// Public projection of a [`User`], never carries the password hash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct UserResponse {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub role: Role,
    pub avatar: Option<String>,
    pub enrolled_courses: Vec<Uuid>,
    pub created_courses: Vec<Uuid>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        UserResponse {
            id: user.id,
            username: user.username,
            email: user.email,
            role: user.user_role,
            avatar: user.avatar,
            enrolled_courses: user.enrolled_courses,
            created_courses: user.created_courses,
        }
    }
}

/// Editable user fields. `avatar: Some(None)` clears the avatar.
#[derive(Debug, Clone, Default)]
pub struct UserPatch {
    pub username: Option<String>,
    pub avatar: Option<Option<String>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::{spec::BinarySubtype, Bson};

    #[test]
    fn password_hash_verifies_only_original_password() {
        let security = Security::ephemeral(4);
        let hash = PasswordHash::new("correct horse battery", &security);

        assert!(hash.verify("correct horse battery"));
        assert!(!hash.verify("correct horse battery "));
        assert_ne!(
            hash,
            PasswordHash::new("correct horse battery", &security),
            "salts must differ between hashes"
        );
    }

    #[test]
    fn password_survives_cost_change() {
        let hash = PasswordHash::new("password123", &Security::ephemeral(4));
        let stricter = Security::ephemeral(6);

        assert!(hash.verify("password123"));
        assert!(PasswordHash::new("password123", &stricter).verify("password123"));

        let stored = bson::to_document(&hash).expect("hash must serialize");
        let decoded: PasswordHash = bson::from_document(stored).expect("hash must deserialize");
        assert_eq!(decoded.cost, 4);
        assert!(decoded.verify("password123"));
    }

    #[test]
    fn ids_are_stored_as_uuid_binaries() {
        let security = Security::ephemeral(4);
        let mut user = User::new("a@example.com", "alice", "password123", Role::Student, &security);
        let course = Uuid::new_v4();
        user.enrolled_courses.push(course);

        let document = bson::to_document(&user).expect("user must be serializable to BSON");

        match document.get("_id") {
            Some(Bson::Binary(bin)) => assert_eq!(bin.subtype, BinarySubtype::Uuid),
            other => panic!("unexpected _id representation: {:?}", other),
        }
        match document.get_array("enrolled_courses").map(|it| it.as_slice()) {
            Ok([Bson::Binary(bin)]) => {
                assert_eq!(bin.subtype, BinarySubtype::Uuid);
                assert_eq!(bin.bytes, course.as_bytes().to_vec());
            }
            other => panic!("unexpected enrolled_courses representation: {:?}", other),
        }

        let decoded: User = bson::from_document(document).expect("user must deserialize");
        assert_eq!(decoded.id, user.id);
        assert_eq!(decoded.enrolled_courses, vec![course]);
    }

    #[test]
    fn response_hides_password() {
        let security = Security::ephemeral(4);
        let user = User::new("b@example.com", "bob_b", "password123", Role::Instructor, &security);
        let json = serde_json::to_value(UserResponse::from(user)).expect("serializable");

        assert!(json.get("pw_hash").is_none());
        assert_eq!(json["role"], "instructor");
    }
}
