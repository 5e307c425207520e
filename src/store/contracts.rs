use std::{
    pin::Pin,
    task::{Context, Poll},
};

use async_trait::async_trait;
use futures::Stream;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::domain::chat::{ChatDocument, PARTICIPANTS_FIELD, UPDATED_AT_FIELD};

pub const CHATS_COLLECTION: &str = "chats";
pub const MESSAGES_COLLECTION: &str = "messages";

#[cfg_attr(not(test), allow(dead_code))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

/// Filtered, ordered live query over the chats collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatQuery {
    pub collection: &'static str,
    pub array_contains_field: &'static str,
    pub array_contains_value: String,
    pub order_by: &'static str,
    pub direction: SortDirection,
}

impl ChatQuery {
    pub fn for_participant(user_id: impl Into<String>) -> Self {
        Self {
            collection: CHATS_COLLECTION,
            array_contains_field: PARTICIPANTS_FIELD,
            array_contains_value: user_id.into(),
            order_by: UPDATED_AT_FIELD,
            direction: SortDirection::Descending,
        }
    }
}

/// Full result set of a live query at one point in time.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ChatSnapshot {
    pub documents: Vec<ChatDocument>,
}

pub type SnapshotEvent = Result<ChatSnapshot, StoreError>;

/// Handle to one live query. Dropping it tears the subscription down.
#[derive(Debug)]
pub struct ChatSubscription {
    receiver: mpsc::UnboundedReceiver<SnapshotEvent>,
}

impl ChatSubscription {
    pub fn new(receiver: mpsc::UnboundedReceiver<SnapshotEvent>) -> Self {
        Self { receiver }
    }
}

impl ChatSubscription {
    /// Replaces `event` with the newest event already queued behind it. A queued
    /// error wins, since errors end the subscription.
    pub fn skip_to_latest(&mut self, event: SnapshotEvent) -> SnapshotEvent {
        let mut latest = event;
        while latest.is_ok() {
            match self.receiver.try_recv() {
                Ok(next) => latest = next,
                Err(_) => break,
            }
        }
        latest
    }
}

impl Stream for ChatSubscription {
    type Item = SnapshotEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("permission denied")]
    PermissionDenied,
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("document not found: {0}")]
    NotFound(String),
    #[error("invalid document data: {0}")]
    InvalidData(String),
}

impl StoreError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::PermissionDenied => "STORE_PERMISSION_DENIED",
            Self::Unavailable(_) => "STORE_UNAVAILABLE",
            Self::NotFound(_) => "STORE_NOT_FOUND",
            Self::InvalidData(_) => "STORE_INVALID_DATA",
        }
    }
}

#[async_trait]
pub trait DocumentStore: Send + Sync + 'static {
    async fn subscribe_chats(&self, query: ChatQuery) -> Result<ChatSubscription, StoreError>;

    async fn get_chat(&self, chat_id: &str) -> Result<Option<ChatDocument>, StoreError>;

    /// Replaces the whole `participantsInfo` array and nothing else.
    async fn update_participants_info(
        &self,
        chat_id: &str,
        participants_info: Vec<Value>,
    ) -> Result<(), StoreError>;

    async fn list_message_ids(&self, chat_id: &str) -> Result<Vec<String>, StoreError>;

    async fn delete_message(&self, chat_id: &str, message_id: &str) -> Result<(), StoreError>;

    async fn delete_chat(&self, chat_id: &str) -> Result<(), StoreError>;
}
