use serde::{Deserialize, Serialize};

/// A stored key in the shared table. `(owner_id, key)` is unique.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub owner_id: String,
    pub key: String,
    /// Only populated by point lookups
    pub value: Option<Vec<u8>>,
}

impl Entry {
    pub fn new(owner_id: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            owner_id: owner_id.into(),
            key: key.into(),
            value: None,
        }
    }

    pub fn with_value(mut self, value: Vec<u8>) -> Self {
        self.value = Some(value);
        self
    }

    /// Value rendered as text for display; invalid UTF-8 is replaced
    pub fn value_text(&self) -> Option<String> {
        self.value
            .as_ref()
            .map(|v| String::from_utf8_lossy(v).into_owned())
    }
}

/// Keys of one owner, in listing order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerKeys {
    pub owner_id: String,
    pub keys: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EntryResponse {
    pub owner_id: String,
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl From<Entry> for EntryResponse {
    fn from(entry: Entry) -> Self {
        let value = entry.value_text();
        Self {
            owner_id: entry.owner_id,
            key: entry.key,
            value,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ListAllResponse {
    pub total_keys: usize,
    pub owners: Vec<OwnerKeys>,
}
