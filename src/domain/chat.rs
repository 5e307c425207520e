use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const PARTICIPANTS_FIELD: &str = "participants";
pub const PARTICIPANTS_INFO_FIELD: &str = "participantsInfo";
pub const LAST_MESSAGE_FIELD: &str = "lastMessage";
pub const UPDATED_AT_FIELD: &str = "updatedAt";

/// Raw chat document as delivered by the store.
///
/// Fields are kept as untyped JSON so a malformed document never fails a whole
/// snapshot; readers pick what they need and fall back on their own.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatDocument {
    pub id: String,
    pub data: Value,
}

impl ChatDocument {
    pub fn new(id: impl Into<String>, data: Value) -> Self {
        Self {
            id: id.into(),
            data,
        }
    }

    pub fn has_participant(&self, user_id: &str) -> bool {
        self.data
            .get(PARTICIPANTS_FIELD)
            .and_then(Value::as_array)
            .is_some_and(|participants| {
                participants
                    .iter()
                    .any(|participant| participant.as_str() == Some(user_id))
            })
    }

    /// Raw `participantsInfo` entries. Absent or non-array values read as empty.
    pub fn participants_info_raw(&self) -> &[Value] {
        self.data
            .get(PARTICIPANTS_INFO_FIELD)
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn last_message(&self) -> Option<&str> {
        self.data.get(LAST_MESSAGE_FIELD).and_then(Value::as_str)
    }

    pub fn updated_at_unix_ms(&self) -> Option<i64> {
        let value = self.data.get(UPDATED_AT_FIELD)?;
        value
            .as_i64()
            .or_else(|| value.as_f64().map(|ms| ms as i64))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantInfo {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

impl ParticipantInfo {
    /// Parses one raw entry; entries that do not match the wire shape yield `None`.
    pub fn from_raw(raw: &Value) -> Option<Self> {
        serde_json::from_value(raw.clone()).ok()
    }
}

/// Display-ready row derived from one chat document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatPreview {
    pub chat_id: String,
    pub other_user_name: String,
    pub other_user_image: Option<String>,
    pub last_message: String,
    pub updated_at_unix_ms: i64,
}

/// Signed-in user as seen by the sync layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    pub display_name: String,
    pub image: Option<String>,
}

impl Identity {
    pub fn new(user_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            display_name: display_name.into(),
            image: None,
        }
    }

    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = Some(image.into());
        self
    }

    /// Two identities need the same live query iff user id and image match.
    pub fn same_subscription(&self, other: &Identity) -> bool {
        self.user_id == other.user_id && self.image == other.image
    }
}
