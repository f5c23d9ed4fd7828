use chrono::Utc;
use std::fmt;
use uuid::Uuid;

pub const DEFAULT_PROVIDER: &str = "google";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserStatus {
    Enabled,
    Disabled,
}

impl UserStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserStatus::Enabled => "enabled",
            UserStatus::Disabled => "disabled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "enabled" => Some(UserStatus::Enabled),
            "disabled" => Some(UserStatus::Disabled),
            _ => None,
        }
    }
}

/// A user as stored, read back with its store-assigned id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: i64,
    pub uuid: String,
    pub email: String,
    pub external_id: Option<String>,
    pub provider: String,
    pub status: UserStatus,
    pub created: String,
}

impl fmt::Display for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "user {:?} {:?}", self.uuid, self.email)
    }
}

/// A user about to be inserted.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub uuid: String,
    pub email: String,
    pub provider: String,
    pub status: UserStatus,
    pub created: String,
}

impl NewUser {
    /// An enabled user with a fresh uuid, registered with the default provider.
    pub fn new(email: &str) -> Self {
        NewUser {
            uuid: Uuid::new_v4().to_string(),
            email: email.to_string(),
            provider: DEFAULT_PROVIDER.to_string(),
            status: UserStatus::Enabled,
            created: Utc::now().to_rfc3339(),
        }
    }
}
