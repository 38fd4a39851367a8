use serde::{Deserialize, Serialize};

use crate::ids::UserId;

/// Display-safe projection of a user: never carries email or credentials.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: UserId,
    pub username: String,
    pub profile_image_url: Option<String>,
}

impl UserSummary {
    /// Stand-in for an id the user directory no longer knows.
    pub fn placeholder(id: UserId) -> Self {
        Self {
            id,
            username: "Unknown user".to_string(),
            profile_image_url: None,
        }
    }
}
