use std::{
    cmp::Ordering,
    collections::{BTreeMap, BTreeSet},
    sync::{Arc, Mutex, MutexGuard},
};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::{
    domain::chat::{ChatDocument, PARTICIPANTS_INFO_FIELD},
    store::contracts::{
        ChatQuery, ChatSnapshot, ChatSubscription, DocumentStore, SnapshotEvent, SortDirection,
        StoreError,
    },
};

const MEMORY_STORE_LOCK_POISONED: &str = "memory store lock poisoned";

/// In-process document store with live snapshot fan-out.
///
/// Every mutation re-evaluates each live query and pushes the full result set,
/// which is the same contract a remote store offers.
#[derive(Clone, Debug, Default)]
pub struct InMemoryDocumentStore {
    inner: Arc<Mutex<MemoryState>>,
}

#[derive(Debug, Default)]
struct MemoryState {
    chats: BTreeMap<String, Value>,
    messages: BTreeMap<String, BTreeSet<String>>,
    subscribers: Vec<Subscriber>,
    faults: Faults,
    participant_updates: usize,
    deletions: Vec<DeleteOp>,
}

/// Delete call as the store saw it, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteOp {
    Message { chat_id: String, message_id: String },
    Chat { chat_id: String },
}

#[derive(Debug)]
struct Subscriber {
    query: ChatQuery,
    tx: mpsc::UnboundedSender<SnapshotEvent>,
}

#[derive(Debug, Default)]
struct Faults {
    failing_message_deletes: BTreeSet<String>,
    fail_participant_updates: bool,
    fail_subscriptions: Option<StoreError>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_chat(&self, chat_id: impl Into<String>, data: Value) {
        self.mutate(|state| {
            state.chats.insert(chat_id.into(), data);
        });
    }

    pub fn insert_message(&self, chat_id: impl Into<String>, message_id: impl Into<String>) {
        let chat_id = chat_id.into();
        let message_id = message_id.into();
        if let Ok(mut state) = self.lock() {
            state.messages.entry(chat_id).or_default().insert(message_id);
        }
    }

    pub fn chats(&self) -> Vec<ChatDocument> {
        self.lock()
            .map(|state| {
                state
                    .chats
                    .iter()
                    .map(|(id, data)| ChatDocument::new(id.clone(), data.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn messages(&self) -> BTreeMap<String, Vec<String>> {
        self.lock()
            .map(|state| {
                state
                    .messages
                    .iter()
                    .filter(|(_, ids)| !ids.is_empty())
                    .map(|(chat_id, ids)| (chat_id.clone(), ids.iter().cloned().collect()))
                    .collect()
            })
            .unwrap_or_default()
    }

    #[cfg_attr(not(test), allow(dead_code))]
    pub fn participant_update_count(&self) -> usize {
        self.lock()
            .map(|state| state.participant_updates)
            .unwrap_or_default()
    }

    #[cfg_attr(not(test), allow(dead_code))]
    pub fn chat_delete_attempts(&self) -> usize {
        self.lock()
            .map(|state| {
                state
                    .deletions
                    .iter()
                    .filter(|op| matches!(op, DeleteOp::Chat { .. }))
                    .count()
            })
            .unwrap_or_default()
    }

    /// Completed message deletes and every chat delete attempt, in order.
    #[cfg_attr(not(test), allow(dead_code))]
    pub fn deletions(&self) -> Vec<DeleteOp> {
        self.lock()
            .map(|state| state.deletions.clone())
            .unwrap_or_default()
    }

    #[cfg_attr(not(test), allow(dead_code))]
    pub fn live_subscriber_count(&self) -> usize {
        self.lock()
            .map(|mut state| {
                state.subscribers.retain(|sub| !sub.tx.is_closed());
                state.subscribers.len()
            })
            .unwrap_or_default()
    }

    #[cfg_attr(not(test), allow(dead_code))]
    pub fn fail_message_delete(&self, message_id: impl Into<String>) {
        if let Ok(mut state) = self.lock() {
            state.faults.failing_message_deletes.insert(message_id.into());
        }
    }

    #[cfg_attr(not(test), allow(dead_code))]
    pub fn fail_participant_updates(&self, fail: bool) {
        if let Ok(mut state) = self.lock() {
            state.faults.fail_participant_updates = fail;
        }
    }

    #[cfg_attr(not(test), allow(dead_code))]
    pub fn fail_subscriptions(&self, error: Option<StoreError>) {
        if let Ok(mut state) = self.lock() {
            state.faults.fail_subscriptions = error;
        }
    }

    /// Sends a terminal error to every live subscriber and drops them.
    #[cfg_attr(not(test), allow(dead_code))]
    pub fn break_subscriptions(&self, error: StoreError) {
        if let Ok(mut state) = self.lock() {
            for subscriber in state.subscribers.drain(..) {
                let _ = subscriber.tx.send(Err(error.clone()));
            }
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>, StoreError> {
        self.inner
            .lock()
            .map_err(|_| StoreError::Unavailable(MEMORY_STORE_LOCK_POISONED.to_owned()))
    }

    fn mutate<F>(&self, mutator: F)
    where
        F: FnOnce(&mut MemoryState),
    {
        if let Ok(mut state) = self.lock() {
            mutator(&mut state);
            state.notify_subscribers();
        }
    }
}

impl MemoryState {
    fn evaluate(&self, query: &ChatQuery) -> ChatSnapshot {
        let mut documents: Vec<ChatDocument> = self
            .chats
            .iter()
            .map(|(id, data)| ChatDocument::new(id.clone(), data.clone()))
            .filter(|document| document.has_participant(&query.array_contains_value))
            .collect();

        // stable sort keeps id order for equal timestamps
        documents.sort_by(|left, right| {
            compare_updated_at(
                left.updated_at_unix_ms(),
                right.updated_at_unix_ms(),
                query.direction,
            )
        });

        ChatSnapshot { documents }
    }

    fn notify_subscribers(&mut self) {
        let snapshots: Vec<ChatSnapshot> = self
            .subscribers
            .iter()
            .map(|sub| self.evaluate(&sub.query))
            .collect();

        let mut snapshots = snapshots.into_iter();
        self.subscribers.retain(|sub| {
            snapshots
                .next()
                .is_some_and(|snapshot| sub.tx.send(Ok(snapshot)).is_ok())
        });
    }
}

fn compare_updated_at(left: Option<i64>, right: Option<i64>, direction: SortDirection) -> Ordering {
    match (left, right) {
        (Some(left), Some(right)) => match direction {
            SortDirection::Ascending => left.cmp(&right),
            SortDirection::Descending => right.cmp(&left),
        },
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn subscribe_chats(&self, query: ChatQuery) -> Result<ChatSubscription, StoreError> {
        let mut state = self.lock()?;
        if let Some(error) = state.faults.fail_subscriptions.clone() {
            return Err(error);
        }

        tracing::debug!(
            collection = query.collection,
            filter = query.array_contains_field,
            order_by = query.order_by,
            "live query registered"
        );

        let (tx, rx) = mpsc::unbounded_channel();
        let initial = state.evaluate(&query);
        // receiver is still held here, so the send cannot fail
        let _ = tx.send(Ok(initial));
        state.subscribers.push(Subscriber { query, tx });

        Ok(ChatSubscription::new(rx))
    }

    async fn get_chat(&self, chat_id: &str) -> Result<Option<ChatDocument>, StoreError> {
        let state = self.lock()?;
        Ok(state
            .chats
            .get(chat_id)
            .map(|data| ChatDocument::new(chat_id, data.clone())))
    }

    async fn update_participants_info(
        &self,
        chat_id: &str,
        participants_info: Vec<Value>,
    ) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        if state.faults.fail_participant_updates {
            return Err(StoreError::Unavailable("participant update rejected".to_owned()));
        }

        let data = state
            .chats
            .get_mut(chat_id)
            .ok_or_else(|| StoreError::NotFound(chat_id.to_owned()))?;
        let fields = data
            .as_object_mut()
            .ok_or_else(|| StoreError::InvalidData(format!("chat {chat_id} is not an object")))?;
        fields.insert(
            PARTICIPANTS_INFO_FIELD.to_owned(),
            Value::Array(participants_info),
        );

        state.participant_updates += 1;
        state.notify_subscribers();
        Ok(())
    }

    async fn list_message_ids(&self, chat_id: &str) -> Result<Vec<String>, StoreError> {
        let state = self.lock()?;
        Ok(state
            .messages
            .get(chat_id)
            .map(|ids| ids.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn delete_message(&self, chat_id: &str, message_id: &str) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        if state.faults.failing_message_deletes.contains(message_id) {
            return Err(StoreError::Unavailable(format!(
                "message {message_id} delete rejected"
            )));
        }

        if let Some(ids) = state.messages.get_mut(chat_id) {
            ids.remove(message_id);
        }
        state.deletions.push(DeleteOp::Message {
            chat_id: chat_id.to_owned(),
            message_id: message_id.to_owned(),
        });
        Ok(())
    }

    async fn delete_chat(&self, chat_id: &str) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        state.deletions.push(DeleteOp::Chat {
            chat_id: chat_id.to_owned(),
        });

        // delete-by-id: messages under the chat are left alone
        if state.chats.remove(chat_id).is_none() {
            return Err(StoreError::NotFound(chat_id.to_owned()));
        }
        state.notify_subscribers();
        Ok(())
    }
}
