//! Use case layer: chat projection, live sync, and deletion workflows.

pub mod bootstrap;
pub mod context;
pub mod delete_chat;
pub mod project_chats;
pub mod sync_session;
