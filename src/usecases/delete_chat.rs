use std::sync::Arc;

use futures::{stream, StreamExt};
use thiserror::Error;

use crate::store::contracts::{DocumentStore, StoreError};

pub const DEFAULT_MAX_PARALLEL_DELETES: usize = 8;

const CHAT_DELETE_MESSAGES_FAILED: &str = "CHAT_DELETE_MESSAGES_FAILED";
const CHAT_DELETE_PARENT_FAILED: &str = "CHAT_DELETE_PARENT_FAILED";
const CHAT_DELETE_COMPLETED: &str = "CHAT_DELETE_COMPLETED";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteChatOutcome {
    pub chat_id: String,
    pub messages_deleted: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeleteChatError {
    #[error("chat {chat_id} does not exist")]
    NotFound { chat_id: String },
    #[error("failed to look up chat: {0}")]
    Lookup(#[source] StoreError),
    #[error("failed to enumerate chat messages: {0}")]
    MessageEnumeration(#[source] StoreError),
    #[error("{failed} of {total} messages of chat {chat_id} could not be deleted: {source}")]
    MessagesRemain {
        chat_id: String,
        failed: usize,
        total: usize,
        #[source]
        source: StoreError,
    },
    #[error("messages deleted but chat record removal failed: {0}")]
    ParentDelete(#[source] StoreError),
}

impl DeleteChatError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "CHAT_DELETE_NOT_FOUND",
            Self::Lookup(_) => "CHAT_DELETE_LOOKUP_FAILED",
            Self::MessageEnumeration(_) => "CHAT_DELETE_ENUMERATION_FAILED",
            Self::MessagesRemain { .. } => "CHAT_DELETE_MESSAGES_REMAIN",
            Self::ParentDelete(_) => "CHAT_DELETE_PARENT_FAILED",
        }
    }

    pub fn user_message(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "This chat no longer exists.",
            Self::MessagesRemain { .. } => {
                "Some messages could not be deleted. The chat was kept; please try again."
            }
            _ => "Could not delete the chat. Please try again.",
        }
    }
}

/// Removes a chat and its messages, children first.
///
/// Not atomic: a failed message delete stops the operation before the parent
/// record is touched, leaving whatever was already removed gone.
#[derive(Debug, Clone)]
pub struct ChatDeleter<S>
where
    S: DocumentStore,
{
    store: Arc<S>,
    max_parallel_deletes: usize,
}

impl<S> ChatDeleter<S>
where
    S: DocumentStore,
{
    pub fn new(store: Arc<S>, max_parallel_deletes: usize) -> Self {
        Self {
            store,
            max_parallel_deletes: max_parallel_deletes.max(1),
        }
    }

    pub async fn delete_chat_with_messages(
        &self,
        chat_id: &str,
    ) -> Result<DeleteChatOutcome, DeleteChatError> {
        let exists = self
            .store
            .get_chat(chat_id)
            .await
            .map_err(DeleteChatError::Lookup)?
            .is_some();
        if !exists {
            return Err(DeleteChatError::NotFound {
                chat_id: chat_id.to_owned(),
            });
        }

        let message_ids = self
            .store
            .list_message_ids(chat_id)
            .await
            .map_err(DeleteChatError::MessageEnumeration)?;
        let total = message_ids.len();

        let results: Vec<Result<(), StoreError>> = stream::iter(message_ids)
            .map(|message_id| {
                let store = Arc::clone(&self.store);
                async move { store.delete_message(chat_id, &message_id).await }
            })
            .buffer_unordered(self.max_parallel_deletes)
            .collect()
            .await;

        let mut errors = results.into_iter().filter_map(Result::err);
        if let Some(first) = errors.next() {
            let failed = 1 + errors.count();
            tracing::warn!(
                code = CHAT_DELETE_MESSAGES_FAILED,
                chat_id,
                failed,
                total,
                error = %first,
                "message deletion incomplete; chat record kept"
            );
            return Err(DeleteChatError::MessagesRemain {
                chat_id: chat_id.to_owned(),
                failed,
                total,
                source: first,
            });
        }

        if let Err(error) = self.store.delete_chat(chat_id).await {
            tracing::warn!(
                code = CHAT_DELETE_PARENT_FAILED,
                chat_id,
                error = %error,
                "messages deleted but chat record removal failed"
            );
            return Err(DeleteChatError::ParentDelete(error));
        }

        tracing::info!(
            code = CHAT_DELETE_COMPLETED,
            chat_id,
            messages_deleted = total,
            "chat deleted with messages"
        );

        Ok(DeleteChatOutcome {
            chat_id: chat_id.to_owned(),
            messages_deleted: total,
        })
    }
}
