use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ResponseType {
    Ephemeral,
    InChannel,
}

/// Reply to a slash command
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommandResponse {
    pub response_type: ResponseType,
    pub text: String,
}

impl CommandResponse {
    pub fn ephemeral(text: impl Into<String>) -> Self {
        Self {
            response_type: ResponseType::Ephemeral,
            text: text.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CommandRequest {
    /// Namespace of the caller; scopes the single-tenant KV operations
    pub owner_id: String,
    /// Raw command line, e.g. `/kv get mykey`
    pub command: String,
}
