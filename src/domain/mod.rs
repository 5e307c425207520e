//! Domain layer: chat documents, previews, and the published list state.

pub mod chat;
pub mod chat_list_state;
