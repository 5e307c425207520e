use std::{collections::BTreeMap, fs, path::Path};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{infra::error::AppError, store::memory::InMemoryDocumentStore};

/// On-disk seed for the in-memory store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreFixture {
    #[serde(default)]
    pub chats: Vec<Value>,
    #[serde(default)]
    pub messages: BTreeMap<String, Vec<String>>,
}

impl StoreFixture {
    pub fn load(path: &Path) -> Result<Self, AppError> {
        let raw = fs::read_to_string(path).map_err(|source| AppError::FixtureRead {
            path: path.to_path_buf(),
            source,
        })?;

        serde_json::from_str(&raw).map_err(|source| AppError::FixtureParse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn save(&self, path: &Path) -> Result<(), AppError> {
        let raw = serde_json::to_string_pretty(self).map_err(AppError::FixtureEncode)?;

        fs::write(path, raw).map_err(|source| AppError::FixtureWrite {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Loads chats into `store`. Chats without a string `id` are skipped.
    pub fn seed(&self, store: &InMemoryDocumentStore) -> usize {
        let mut seeded = 0;
        for chat in &self.chats {
            let Some((id, data)) = split_id(chat) else {
                tracing::warn!("fixture chat without string id skipped");
                continue;
            };
            store.insert_chat(id, data);
            seeded += 1;
        }

        for (chat_id, message_ids) in &self.messages {
            for message_id in message_ids {
                store.insert_message(chat_id.clone(), message_id.clone());
            }
        }

        seeded
    }

    pub fn capture(store: &InMemoryDocumentStore) -> Self {
        let chats = store
            .chats()
            .into_iter()
            .map(|document| {
                let mut data = document.data;
                if let Some(fields) = data.as_object_mut() {
                    fields.insert("id".to_owned(), Value::String(document.id));
                }
                data
            })
            .collect();

        Self {
            chats,
            messages: store.messages(),
        }
    }
}

fn split_id(chat: &Value) -> Option<(String, Value)> {
    let mut data = chat.clone();
    let fields = data.as_object_mut()?;
    let id = match fields.remove("id")? {
        Value::String(id) => id,
        _ => return None,
    };

    Some((id, data))
}
