use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::usecases::{
    delete_chat::DEFAULT_MAX_PARALLEL_DELETES, project_chats::DEFAULT_FALLBACK_NAME,
};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct AppConfig {
    pub logging: LogConfig,
    pub sync: SyncConfig,
    pub delete: DeleteConfig,
    pub store: StoreConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LogConfig {
    pub level: String,
    /// Write logs to `chatsync.log` in this directory instead of stderr.
    pub directory: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            directory: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SyncConfig {
    /// Shown when a chat has no resolvable other participant.
    pub fallback_name: String,
    pub initial_load_timeout_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            fallback_name: DEFAULT_FALLBACK_NAME.to_owned(),
            initial_load_timeout_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeleteConfig {
    pub max_parallel_deletes: usize,
}

impl Default for DeleteConfig {
    fn default() -> Self {
        Self {
            max_parallel_deletes: DEFAULT_MAX_PARALLEL_DELETES,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct StoreConfig {
    pub fixture_path: Option<PathBuf>,
}
