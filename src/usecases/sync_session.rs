use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use futures::StreamExt;
use thiserror::Error;
use tokio::{sync::watch, task::JoinHandle};

use crate::{
    domain::{
        chat::Identity,
        chat_list_state::{ChatListState, SyncFailure},
    },
    store::contracts::{ChatQuery, ChatSubscription, DocumentStore, StoreError},
    usecases::project_chats::ChatProjector,
};

const CHAT_SUBSCRIPTION_STARTED: &str = "CHAT_SUBSCRIPTION_STARTED";
const CHAT_SUBSCRIPTION_STOPPED: &str = "CHAT_SUBSCRIPTION_STOPPED";
const CHAT_SUBSCRIPTION_CLOSED: &str = "CHAT_SUBSCRIPTION_CLOSED";
const CHAT_SUBSCRIPTION_FAILED: &str = "CHAT_SUBSCRIPTION_FAILED";
const CHAT_SNAPSHOT_STALE_DISCARDED: &str = "CHAT_SNAPSHOT_STALE_DISCARDED";
const CHAT_PROJECTION_FAILED: &str = "CHAT_PROJECTION_FAILED";

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("failed to open chat subscription: {0}")]
    Subscription(#[source] StoreError),
}

impl SyncError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Subscription(error) => error.code(),
        }
    }

    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Subscription(StoreError::PermissionDenied) => {
                "You do not have access to these chats."
            }
            Self::Subscription(_) => "Could not load chats. Check your connection and try again.",
        }
    }
}

/// Owns the live chat subscription of one signed-in identity.
///
/// At most one subscription task runs at a time. Each task is bound to a
/// generation number and may only publish while that generation is current;
/// `stop` bumps the generation under the same lock publishing uses, so once it
/// returns a torn-down task can no longer touch the published state.
pub struct SyncSession<S>
where
    S: DocumentStore,
{
    store: Arc<S>,
    projector: Arc<ChatProjector>,
    publisher: Publisher,
    active: Option<ActiveSubscription>,
}

struct ActiveSubscription {
    identity: Identity,
    task: JoinHandle<()>,
}

#[derive(Clone)]
struct Publisher {
    inner: Arc<Mutex<PublisherState>>,
}

struct PublisherState {
    generation: u64,
    tx: watch::Sender<ChatListState>,
}

impl Publisher {
    fn new() -> Self {
        let (tx, _rx) = watch::channel(ChatListState::default());
        Self {
            inner: Arc::new(Mutex::new(PublisherState { generation: 0, tx })),
        }
    }

    fn subscribe(&self) -> Option<watch::Receiver<ChatListState>> {
        self.inner.lock().ok().map(|state| state.tx.subscribe())
    }

    fn current(&self) -> ChatListState {
        match self.inner.lock() {
            Ok(state) => {
                let current = state.tx.borrow().clone();
                current
            }
            Err(_) => ChatListState::default(),
        }
    }

    /// Invalidates every earlier generation and applies `mutator` as the first
    /// update of the new one.
    fn advance<F>(&self, mutator: F) -> u64
    where
        F: FnOnce(&mut ChatListState),
    {
        match self.inner.lock() {
            Ok(mut state) => {
                state.generation = state.generation.wrapping_add(1);
                state.tx.send_modify(mutator);
                state.generation
            }
            Err(_) => 0,
        }
    }

    /// Applies `mutator` only if `generation` is still current.
    fn publish<F>(&self, generation: u64, mutator: F) -> bool
    where
        F: FnOnce(&mut ChatListState),
    {
        match self.inner.lock() {
            Ok(state) if state.generation == generation => {
                state.tx.send_modify(mutator);
                true
            }
            _ => false,
        }
    }
}

impl<S> SyncSession<S>
where
    S: DocumentStore,
{
    pub fn new(store: Arc<S>, projector: ChatProjector) -> Self {
        Self {
            store,
            projector: Arc::new(projector),
            publisher: Publisher::new(),
            active: None,
        }
    }

    pub fn state(&self) -> ChatListState {
        self.publisher.current()
    }

    pub fn subscribe(&self) -> Option<watch::Receiver<ChatListState>> {
        self.publisher.subscribe()
    }

    /// Opens the live query for `identity`, replacing any running one.
    ///
    /// With no identity the session goes idle. An identity matching the active
    /// subscription on user id and image keeps the running subscription.
    pub async fn start(&mut self, identity: Option<Identity>) -> Result<(), SyncError> {
        if let (Some(active), Some(next)) = (self.active.as_mut(), identity.as_ref()) {
            if active.identity.same_subscription(next) && !active.task.is_finished() {
                active.identity.clone_from(next);
                return Ok(());
            }
        }

        self.teardown();

        let Some(identity) = identity else {
            self.publisher.advance(ChatListState::set_idle);
            return Ok(());
        };

        let generation = self.publisher.advance(ChatListState::set_loading);
        let query = ChatQuery::for_participant(identity.user_id.clone());

        let subscription = match self.store.subscribe_chats(query).await {
            Ok(subscription) => subscription,
            Err(error) => {
                tracing::warn!(
                    code = CHAT_SUBSCRIPTION_FAILED,
                    user_id = %identity.user_id,
                    error_code = error.code(),
                    error = %error,
                    "chat subscription could not be opened"
                );
                self.publisher
                    .publish(generation, |state| state.set_failed(failure_from(&error)));
                return Err(SyncError::Subscription(error));
            }
        };

        tracing::info!(
            code = CHAT_SUBSCRIPTION_STARTED,
            user_id = %identity.user_id,
            display_name = %identity.display_name,
            generation,
            "chat subscription started"
        );

        let task = tokio::spawn(run_subscription(
            Arc::clone(&self.store),
            Arc::clone(&self.projector),
            identity.clone(),
            subscription,
            self.publisher.clone(),
            generation,
        ));
        self.active = Some(ActiveSubscription { identity, task });

        Ok(())
    }

    /// Tears down the running subscription, if any. Safe to call repeatedly.
    pub fn stop(&mut self) {
        if self.teardown() {
            self.publisher.advance(ChatListState::finish_loading);
        }
    }

    /// Resolves once the published state is no longer loading, or after `timeout`.
    pub async fn wait_until_loaded(&self, timeout: Duration) -> ChatListState {
        if let Some(mut rx) = self.subscribe() {
            let _ = tokio::time::timeout(timeout, rx.wait_for(|state| !state.is_loading())).await;
        }

        self.state()
    }

    fn teardown(&mut self) -> bool {
        let Some(active) = self.active.take() else {
            return false;
        };

        // invalidate before abort so an in-flight projection cannot publish
        self.publisher.advance(|_| {});
        active.task.abort();

        tracing::info!(
            code = CHAT_SUBSCRIPTION_STOPPED,
            user_id = %active.identity.user_id,
            "chat subscription stopped"
        );
        true
    }
}

impl<S> Drop for SyncSession<S>
where
    S: DocumentStore,
{
    fn drop(&mut self) {
        self.teardown();
    }
}

async fn run_subscription<S>(
    store: Arc<S>,
    projector: Arc<ChatProjector>,
    identity: Identity,
    mut subscription: ChatSubscription,
    publisher: Publisher,
    generation: u64,
) where
    S: DocumentStore,
{
    while let Some(event) = subscription.next().await {
        // snapshots are full result sets, so only the newest one matters
        let snapshot = match subscription.skip_to_latest(event) {
            Ok(snapshot) => snapshot,
            Err(error) => {
                tracing::warn!(
                    code = CHAT_SUBSCRIPTION_FAILED,
                    user_id = %identity.user_id,
                    error_code = error.code(),
                    error = %error,
                    "chat subscription failed; not retrying"
                );
                publisher.publish(generation, |state| state.set_failed(failure_from(&error)));
                return;
            }
        };

        let chat_count = snapshot.documents.len();
        match projector
            .project(Arc::clone(&store), &identity, snapshot)
            .await
        {
            Ok(previews) => {
                if !publisher.publish(generation, |state| state.set_ready(previews)) {
                    tracing::debug!(
                        code = CHAT_SNAPSHOT_STALE_DISCARDED,
                        generation,
                        "discarded projection from a torn-down subscription"
                    );
                    return;
                }
                tracing::debug!(chat_count, generation, "chat projection published");
            }
            Err(error) => {
                tracing::warn!(
                    code = CHAT_PROJECTION_FAILED,
                    error_code = error.code(),
                    error = %error,
                    "chat projection failed; keeping previous previews"
                );
                publisher.publish(generation, ChatListState::finish_loading);
            }
        }
    }

    tracing::info!(
        code = CHAT_SUBSCRIPTION_CLOSED,
        user_id = %identity.user_id,
        "chat subscription closed by store"
    );
    publisher.publish(generation, ChatListState::finish_loading);
}

fn failure_from(error: &StoreError) -> SyncFailure {
    SyncFailure {
        code: error.code().to_owned(),
        message: error.to_string(),
        at_unix_ms: chrono::Utc::now().timestamp_millis(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{
        domain::{chat::ChatDocument, chat_list_state::ChatListUiState},
        store::memory::InMemoryDocumentStore,
        test_support::{chat_data, identity},
    };

    const WAIT: Duration = Duration::from_secs(2);

    fn session(store: &Arc<InMemoryDocumentStore>) -> SyncSession<InMemoryDocumentStore> {
        SyncSession::new(Arc::clone(store), ChatProjector::default())
    }

    async fn wait_for<F>(
        session: &SyncSession<InMemoryDocumentStore>,
        predicate: F,
    ) -> ChatListState
    where
        F: Fn(&ChatListState) -> bool,
    {
        let mut rx = session.subscribe().expect("publisher available");
        let _ = tokio::time::timeout(WAIT, rx.wait_for(|state| predicate(state))).await;
        session.state()
    }

    fn chat_ids(state: &ChatListState) -> Vec<String> {
        state
            .previews()
            .iter()
            .map(|preview| preview.chat_id.clone())
            .collect()
    }

    #[tokio::test]
    async fn no_identity_stays_idle() {
        let store = Arc::new(InMemoryDocumentStore::new());
        let mut session = session(&store);

        session.start(None).await.expect("idle start");

        let state = session.state();
        assert_eq!(state.ui_state(), ChatListUiState::Idle);
        assert!(!state.is_loading());
        assert!(state.previews().is_empty());
        assert_eq!(store.live_subscriber_count(), 0);
    }

    #[tokio::test]
    async fn publishes_only_chats_of_the_viewer_in_recency_order() {
        let store = Arc::new(InMemoryDocumentStore::new());
        store.insert_chat("c1", chat_data(&["A", "B"], 100));
        store.insert_chat("c2", chat_data(&["A", "C"], 300));
        store.insert_chat("c3", chat_data(&["B", "C"], 200));
        let mut session = session(&store);

        session.start(Some(identity("A", None))).await.expect("start");
        let state = session.wait_until_loaded(WAIT).await;

        assert_eq!(state.ui_state(), ChatListUiState::Ready);
        assert_eq!(chat_ids(&state), vec!["c2", "c1"]);
    }

    #[tokio::test]
    async fn live_changes_replace_the_projection() {
        let store = Arc::new(InMemoryDocumentStore::new());
        store.insert_chat("c1", chat_data(&["A", "B"], 100));
        let mut session = session(&store);
        session.start(Some(identity("A", None))).await.expect("start");
        session.wait_until_loaded(WAIT).await;

        store.insert_chat("c2", chat_data(&["A", "C"], 200));
        let state = wait_for(&session, |state| state.previews().len() == 2).await;

        assert_eq!(chat_ids(&state), vec!["c2", "c1"]);
    }

    #[tokio::test]
    async fn repair_write_converges_to_single_update() {
        let store = Arc::new(InMemoryDocumentStore::new());
        store.insert_chat(
            "c1",
            json!({
                "participants": ["A", "B"],
                "participantsInfo": [
                    {"id": "A", "name": "Alice"},
                    {"id": "B", "name": "Bob", "image": "old.png"}
                ],
                "updatedAt": 100
            }),
        );
        let mut session = session(&store);

        session
            .start(Some(identity("B", Some("new.png"))))
            .await
            .expect("start");
        let state = session.wait_until_loaded(WAIT).await;
        // the repair triggers one more snapshot, which must not repair again
        let _ = wait_for(&session, |_| store.participant_update_count() == 1).await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(state.previews()[0].other_user_name, "Alice");
        assert_eq!(state.previews()[0].updated_at_unix_ms, 100);
        assert_eq!(store.participant_update_count(), 1);
    }

    #[tokio::test]
    async fn subscription_open_failure_is_reported_in_state() {
        let store = Arc::new(InMemoryDocumentStore::new());
        store.fail_subscriptions(Some(StoreError::PermissionDenied));
        let mut session = session(&store);

        let err = session
            .start(Some(identity("A", None)))
            .await
            .expect_err("must fail");

        assert_eq!(err.code(), "STORE_PERMISSION_DENIED");
        assert!(!err.user_message().is_empty());
        let state = session.state();
        assert_eq!(state.ui_state(), ChatListUiState::Failed);
        assert!(!state.is_loading());
    }

    #[tokio::test]
    async fn stream_error_is_terminal_and_keeps_previews() {
        let store = Arc::new(InMemoryDocumentStore::new());
        store.insert_chat("c1", chat_data(&["A", "B"], 100));
        let mut session = session(&store);
        session.start(Some(identity("A", None))).await.expect("start");
        session.wait_until_loaded(WAIT).await;

        store.break_subscriptions(StoreError::Unavailable("network lost".into()));
        let state = wait_for(&session, |state| state.ui_state() == ChatListUiState::Failed).await;

        assert_eq!(state.ui_state(), ChatListUiState::Failed);
        assert_eq!(chat_ids(&state), vec!["c1"]);
        assert_eq!(
            state.last_error().map(|failure| failure.code.as_str()),
            Some("STORE_UNAVAILABLE")
        );

        store.insert_chat("c2", chat_data(&["A", "C"], 200));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(chat_ids(&session.state()), vec!["c1"]);
    }

    #[tokio::test]
    async fn restart_after_failure_opens_fresh_subscription() {
        let store = Arc::new(InMemoryDocumentStore::new());
        store.insert_chat("c1", chat_data(&["A", "B"], 100));
        let mut session = session(&store);
        session.start(Some(identity("A", None))).await.expect("start");
        session.wait_until_loaded(WAIT).await;
        store.break_subscriptions(StoreError::Unavailable("network lost".into()));
        wait_for(&session, |state| state.ui_state() == ChatListUiState::Failed).await;

        session.start(Some(identity("A", None))).await.expect("restart");
        let state = session.wait_until_loaded(WAIT).await;

        assert_eq!(state.ui_state(), ChatListUiState::Ready);
        assert_eq!(store.live_subscriber_count(), 1);
    }

    #[tokio::test]
    async fn identity_change_replaces_subscription() {
        let store = Arc::new(InMemoryDocumentStore::new());
        store.insert_chat("ab", chat_data(&["A", "B"], 100));
        store.insert_chat("bc", chat_data(&["B", "C"], 200));
        let mut session = session(&store);

        session.start(Some(identity("A", None))).await.expect("start A");
        session.wait_until_loaded(WAIT).await;
        session.start(Some(identity("C", None))).await.expect("start C");
        let state = session.wait_until_loaded(WAIT).await;

        assert_eq!(chat_ids(&state), vec!["bc"]);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(store.live_subscriber_count(), 1);
    }

    #[tokio::test]
    async fn same_identity_keeps_running_subscription() {
        let store = Arc::new(InMemoryDocumentStore::new());
        store.insert_chat("c1", chat_data(&["A", "B"], 100));
        let mut session = session(&store);
        session.start(Some(identity("A", Some("a.png")))).await.expect("start");
        session.wait_until_loaded(WAIT).await;

        let renamed = Identity::new("A", "Renamed").with_image("a.png");
        session.start(Some(renamed)).await.expect("restart");

        assert_eq!(session.state().ui_state(), ChatListUiState::Ready);
        assert_eq!(store.live_subscriber_count(), 1);
    }

    #[tokio::test]
    async fn image_change_resubscribes_and_repairs() {
        let store = Arc::new(InMemoryDocumentStore::new());
        store.insert_chat("c1", chat_data(&["A", "B"], 100));
        let mut session = session(&store);
        session.start(Some(identity("A", None))).await.expect("start");
        session.wait_until_loaded(WAIT).await;
        assert_eq!(store.participant_update_count(), 0);

        session
            .start(Some(identity("A", Some("fresh.png"))))
            .await
            .expect("restart");
        session.wait_until_loaded(WAIT).await;
        let _ = wait_for(&session, |_| store.participant_update_count() > 0).await;

        let chat = store.chats().into_iter().next().expect("chat");
        assert_eq!(
            chat.participants_info_raw()[0].get("image"),
            Some(&json!("fresh.png"))
        );
    }

    #[tokio::test]
    async fn stopped_session_ignores_later_snapshots() {
        let store = Arc::new(InMemoryDocumentStore::new());
        store.insert_chat("c1", chat_data(&["A", "B"], 100));
        let mut session = session(&store);
        session.start(Some(identity("A", None))).await.expect("start");
        session.wait_until_loaded(WAIT).await;

        session.stop();
        session.stop();
        store.insert_chat("c2", chat_data(&["A", "C"], 200));
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(chat_ids(&session.state()), vec!["c1"]);
        assert_eq!(store.live_subscriber_count(), 0);
    }

    #[tokio::test]
    async fn queued_snapshots_collapse_to_one_repair_per_chat() {
        let store = Arc::new(InMemoryDocumentStore::new());
        store.insert_chat(
            "c1",
            json!({
                "participants": ["A", "B"],
                "participantsInfo": [
                    {"id": "A", "name": "Alice"},
                    {"id": "B", "name": "Bob", "image": "old.png"}
                ],
                "updatedAt": 100
            }),
        );
        let mut session = session(&store);

        session
            .start(Some(identity("B", Some("new.png"))))
            .await
            .expect("start");
        // lands behind the initial snapshot before the task gets to run
        store.insert_chat("c2", chat_data(&["B", "C"], 200));
        let state = wait_for(&session, |state| state.previews().len() == 2).await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(chat_ids(&state), vec!["c2", "c1"]);
        assert_eq!(store.participant_update_count(), 2);
    }

    /// Delegates to the memory store but panics on participant updates, which
    /// aborts the per-chat projection task.
    struct PanickingRepairStore {
        inner: InMemoryDocumentStore,
    }

    #[async_trait::async_trait]
    impl DocumentStore for PanickingRepairStore {
        async fn subscribe_chats(
            &self,
            query: ChatQuery,
        ) -> Result<ChatSubscription, StoreError> {
            self.inner.subscribe_chats(query).await
        }

        async fn get_chat(
            &self,
            chat_id: &str,
        ) -> Result<Option<ChatDocument>, StoreError> {
            self.inner.get_chat(chat_id).await
        }

        async fn update_participants_info(
            &self,
            chat_id: &str,
            _participants_info: Vec<serde_json::Value>,
        ) -> Result<(), StoreError> {
            panic!("participant update for {chat_id} blew up");
        }

        async fn list_message_ids(&self, chat_id: &str) -> Result<Vec<String>, StoreError> {
            self.inner.list_message_ids(chat_id).await
        }

        async fn delete_message(&self, chat_id: &str, message_id: &str) -> Result<(), StoreError> {
            self.inner.delete_message(chat_id, message_id).await
        }

        async fn delete_chat(&self, chat_id: &str) -> Result<(), StoreError> {
            self.inner.delete_chat(chat_id).await
        }
    }

    fn panicking_session(
        memory: &InMemoryDocumentStore,
    ) -> SyncSession<PanickingRepairStore> {
        let store = Arc::new(PanickingRepairStore {
            inner: memory.clone(),
        });
        SyncSession::new(store, ChatProjector::default())
    }

    #[tokio::test]
    async fn aborted_projection_keeps_previous_previews() {
        let memory = InMemoryDocumentStore::new();
        memory.insert_chat(
            "c1",
            json!({
                "participants": ["A", "B"],
                "participantsInfo": [
                    {"id": "A", "name": "Alice", "image": "a.png"},
                    {"id": "B", "name": "Bob"}
                ],
                "updatedAt": 100
            }),
        );
        let mut session = panicking_session(&memory);
        session
            .start(Some(identity("A", Some("a.png"))))
            .await
            .expect("start");
        let loaded = session.wait_until_loaded(WAIT).await;
        assert_eq!(chat_ids(&loaded), vec!["c1"]);

        // A has no image in c2, so projecting it needs a repair, which panics
        memory.insert_chat("c2", chat_data(&["A", "C"], 200));
        tokio::time::sleep(Duration::from_millis(100)).await;

        let state = session.state();
        assert_eq!(chat_ids(&state), vec!["c1"]);
        assert_eq!(state.ui_state(), ChatListUiState::Ready);
        assert!(!state.is_loading());
    }

    #[tokio::test]
    async fn aborted_initial_projection_still_ends_loading() {
        let memory = InMemoryDocumentStore::new();
        memory.insert_chat("c1", chat_data(&["A", "B"], 100));
        let mut session = panicking_session(&memory);

        session
            .start(Some(identity("A", Some("a.png"))))
            .await
            .expect("start");
        let state = session.wait_until_loaded(WAIT).await;

        assert!(!state.is_loading());
        assert!(state.previews().is_empty());
        assert_eq!(state.ui_state(), ChatListUiState::Empty);
    }

    #[test]
    fn stale_generation_cannot_publish() {
        let publisher = Publisher::new();
        let first = publisher.advance(ChatListState::set_loading);
        let second = publisher.advance(ChatListState::set_loading);

        assert!(!publisher.publish(first, ChatListState::finish_loading));
        assert!(publisher.current().is_loading());
        assert!(publisher.publish(second, ChatListState::finish_loading));
        assert!(!publisher.current().is_loading());
    }
}
