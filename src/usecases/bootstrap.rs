use std::{path::Path, sync::Arc};

use crate::{
    infra::{self, error::AppError},
    store::{fixture::StoreFixture, memory::InMemoryDocumentStore},
    usecases::context::AppContext,
};

pub fn bootstrap(
    config_path: Option<&Path>,
    fixture_path: Option<&Path>,
) -> Result<AppContext, AppError> {
    let context = build_context(config_path, fixture_path)?;
    let guard = infra::logging::init(&context.config.logging)?;

    Ok(context.with_log_guard(guard))
}

fn build_context(
    config_path: Option<&Path>,
    fixture_path: Option<&Path>,
) -> Result<AppContext, AppError> {
    let config = infra::config::load(config_path)?;
    let fixture_path = fixture_path
        .map(Path::to_path_buf)
        .or_else(|| config.store.fixture_path.clone());

    let store = Arc::new(InMemoryDocumentStore::new());
    if let Some(path) = fixture_path.as_deref() {
        let seeded = StoreFixture::load(path)?.seed(&store);
        tracing::debug!(seeded, path = %path.display(), "store seeded from fixture");
    }

    Ok(AppContext::new(config, store, fixture_path))
}
