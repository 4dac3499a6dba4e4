use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Default, Ord, PartialOrd, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        UserId(s.to_owned())
    }
}

/// Who is asking, as seen by the current request. Never persisted as-is.
#[derive(Debug, Clone, Default)]
pub struct UserInfo {
    pub id: UserId,
    pub agent: String,
    pub ip: String,
}

/// Payload of the origin change webhook.
#[derive(Debug, Clone, Serialize)]
pub struct OriginChange {
    pub user_id: UserId,
    pub ip: String,
}
