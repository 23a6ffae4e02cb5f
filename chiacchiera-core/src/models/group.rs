use serde::{Deserialize, Serialize};

/// Gruppo (chat room) esposto sul wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub group_id: String,
    pub name: String,
    pub creator_id: String,
    /// userId dei membri, creatore incluso.
    pub members: Vec<String>,
    pub created_at: String, // RFC3339 UTC
}

impl Group {
    pub fn has_member(&self, user_id: &str) -> bool {
        self.members.iter().any(|m| m == user_id)
    }
}
