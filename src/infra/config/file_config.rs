use std::path::PathBuf;

use serde::Deserialize;

use crate::infra::config::{AppConfig, DeleteConfig, LogConfig, StoreConfig, SyncConfig};

#[derive(Debug, Deserialize, Default)]
pub struct FileConfig {
    pub logging: Option<FileLogConfig>,
    pub sync: Option<FileSyncConfig>,
    pub delete: Option<FileDeleteConfig>,
    pub store: Option<FileStoreConfig>,
}

impl FileConfig {
    pub fn merge_into(self, config: &mut AppConfig) {
        if let Some(logging) = self.logging {
            logging.merge_into(&mut config.logging);
        }

        if let Some(sync) = self.sync {
            sync.merge_into(&mut config.sync);
        }

        if let Some(delete) = self.delete {
            delete.merge_into(&mut config.delete);
        }

        if let Some(store) = self.store {
            store.merge_into(&mut config.store);
        }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct FileLogConfig {
    pub level: Option<String>,
    pub directory: Option<PathBuf>,
}

impl FileLogConfig {
    fn merge_into(self, config: &mut LogConfig) {
        if let Some(level) = self.level {
            config.level = level;
        }

        if let Some(directory) = self.directory {
            config.directory = Some(directory);
        }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct FileSyncConfig {
    pub fallback_name: Option<String>,
    pub initial_load_timeout_ms: Option<u64>,
}

impl FileSyncConfig {
    fn merge_into(self, config: &mut SyncConfig) {
        if let Some(fallback_name) = self.fallback_name {
            config.fallback_name = fallback_name;
        }

        if let Some(timeout_ms) = self.initial_load_timeout_ms {
            config.initial_load_timeout_ms = timeout_ms;
        }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct FileDeleteConfig {
    pub max_parallel_deletes: Option<usize>,
}

impl FileDeleteConfig {
    fn merge_into(self, config: &mut DeleteConfig) {
        if let Some(max_parallel_deletes) = self.max_parallel_deletes {
            config.max_parallel_deletes = max_parallel_deletes.max(1);
        }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct FileStoreConfig {
    pub fixture_path: Option<PathBuf>,
}

impl FileStoreConfig {
    fn merge_into(self, config: &mut StoreConfig) {
        if let Some(fixture_path) = self.fixture_path {
            config.fixture_path = Some(fixture_path);
        }
    }
}
