use serde::{Deserialize, Serialize};

/// A user as the backend serializes it. Field spellings differ between the
/// WebSocket push path and the REST path, so aliases cover both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub username: String,
    #[serde(default, alias = "firstname")]
    pub first_name: String,
    #[serde(default, alias = "lastname")]
    pub last_name: String,
    #[serde(default, alias = "profile_pic", alias = "profilePic")]
    pub avatar: Option<String>,
}

impl User {
    /// A placeholder for a sender whose profile has not been resolved yet.
    pub fn unknown(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            username: String::new(),
            first_name: String::new(),
            last_name: String::new(),
            avatar: None,
        }
    }

    pub fn display_name(&self) -> String {
        let full = format!("{} {}", self.first_name, self.last_name);
        let full = full.trim();
        if !full.is_empty() {
            full.to_string()
        } else if !self.username.is_empty() {
            self.username.clone()
        } else {
            "Unknown".to_string()
        }
    }
}
