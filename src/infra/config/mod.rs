mod app_config;
mod file_config;
mod loader;

pub use app_config::{AppConfig, DeleteConfig, LogConfig, StoreConfig, SyncConfig};
pub use loader::load;
