use std::{path::PathBuf, sync::Arc};

use tracing_appender::non_blocking::WorkerGuard;

use crate::{
    infra::{config::AppConfig, error::AppError},
    store::{fixture::StoreFixture, memory::InMemoryDocumentStore},
};

pub struct AppContext {
    pub config: AppConfig,
    pub store: Arc<InMemoryDocumentStore>,
    pub fixture_path: Option<PathBuf>,
    _log_guard: Option<WorkerGuard>,
}

impl AppContext {
    pub fn new(
        config: AppConfig,
        store: Arc<InMemoryDocumentStore>,
        fixture_path: Option<PathBuf>,
    ) -> Self {
        Self {
            config,
            store,
            fixture_path,
            _log_guard: None,
        }
    }

    pub fn with_log_guard(mut self, guard: Option<WorkerGuard>) -> Self {
        self._log_guard = guard;
        self
    }

    /// Writes the store back to the fixture file, if one was loaded.
    pub fn persist_store(&self) -> Result<(), AppError> {
        match &self.fixture_path {
            Some(path) => StoreFixture::capture(&self.store).save(path),
            None => Ok(()),
        }
    }
}
