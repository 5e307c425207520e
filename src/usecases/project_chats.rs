use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;
use tokio::task::{JoinError, JoinSet};

use crate::{
    domain::chat::{ChatDocument, ChatPreview, Identity, ParticipantInfo},
    store::contracts::{ChatSnapshot, DocumentStore},
};

pub const DEFAULT_FALLBACK_NAME: &str = "unknown";

const CHAT_REPAIR_WRITE_FAILED: &str = "CHAT_REPAIR_WRITE_FAILED";
const CHAT_REPAIR_WRITE_APPLIED: &str = "CHAT_REPAIR_WRITE_APPLIED";

/// Pending write that brings the viewer's own avatar in sync with the identity.
#[derive(Debug, Clone, PartialEq)]
pub struct RepairWrite {
    pub chat_id: String,
    pub participants_info: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatPlan {
    pub preview: ChatPreview,
    pub repair: Option<RepairWrite>,
}

#[derive(Debug, Error)]
pub enum ProjectionError {
    #[error("chat projection task did not complete: {0}")]
    TaskAborted(#[source] JoinError),
}

impl ProjectionError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::TaskAborted(_) => "CHAT_PROJECTION_ABORTED",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChatProjector {
    fallback_name: String,
}

impl Default for ChatProjector {
    fn default() -> Self {
        Self::new(DEFAULT_FALLBACK_NAME)
    }
}

impl ChatProjector {
    pub fn new(fallback_name: impl Into<String>) -> Self {
        Self {
            fallback_name: fallback_name.into(),
        }
    }

    /// Projects every chat of the snapshot concurrently and returns previews in
    /// snapshot order. Repair writes are issued along the way; their failures
    /// are logged and never fail the projection.
    pub async fn project<S>(
        &self,
        store: Arc<S>,
        identity: &Identity,
        snapshot: ChatSnapshot,
    ) -> Result<Vec<ChatPreview>, ProjectionError>
    where
        S: DocumentStore,
    {
        let total = snapshot.documents.len();
        let now_unix_ms = chrono::Utc::now().timestamp_millis();
        let mut tasks = JoinSet::new();

        for (index, document) in snapshot.documents.into_iter().enumerate() {
            let plan = plan_chat(&document, identity, &self.fallback_name, now_unix_ms);
            let store = Arc::clone(&store);
            tasks.spawn(async move {
                if let Some(repair) = plan.repair {
                    apply_repair(store.as_ref(), repair).await;
                }
                (index, plan.preview)
            });
        }

        let mut slots: Vec<Option<ChatPreview>> = vec![None; total];
        while let Some(joined) = tasks.join_next().await {
            let (index, preview) = joined.map_err(ProjectionError::TaskAborted)?;
            if let Some(slot) = slots.get_mut(index) {
                *slot = Some(preview);
            }
        }

        Ok(slots.into_iter().flatten().collect())
    }
}

/// Pure part of the projection: derives the preview and decides whether the
/// viewer's stored avatar has drifted from the identity.
pub fn plan_chat(
    document: &ChatDocument,
    identity: &Identity,
    fallback_name: &str,
    now_unix_ms: i64,
) -> ChatPlan {
    let raw_info = document.participants_info_raw();
    let entries: Vec<ParticipantInfo> = raw_info
        .iter()
        .filter_map(ParticipantInfo::from_raw)
        .collect();

    let my_info = entries.iter().find(|entry| entry.id == identity.user_id);
    let other_info = entries.iter().find(|entry| entry.id != identity.user_id);

    let repair = match (my_info, identity.image.as_deref()) {
        (Some(mine), Some(image)) if mine.image.as_deref() != Some(image) => {
            replace_image(raw_info, &identity.user_id, image).map(|participants_info| {
                RepairWrite {
                    chat_id: document.id.clone(),
                    participants_info,
                }
            })
        }
        _ => None,
    };

    let preview = ChatPreview {
        chat_id: document.id.clone(),
        other_user_name: other_info
            .map(|info| info.name.clone())
            .unwrap_or_else(|| fallback_name.to_owned()),
        other_user_image: other_info.and_then(|info| info.image.clone()),
        last_message: document.last_message().unwrap_or_default().to_owned(),
        updated_at_unix_ms: document.updated_at_unix_ms().unwrap_or(now_unix_ms),
    };

    ChatPlan { preview, repair }
}

fn replace_image(raw_info: &[Value], user_id: &str, image: &str) -> Option<Vec<Value>> {
    let mut updated = raw_info.to_vec();
    let entry = updated
        .iter_mut()
        .find(|entry| entry.get("id").and_then(Value::as_str) == Some(user_id))?;
    let fields = entry.as_object_mut()?;
    fields.insert("image".to_owned(), Value::String(image.to_owned()));

    Some(updated)
}

async fn apply_repair<S>(store: &S, repair: RepairWrite)
where
    S: DocumentStore + ?Sized,
{
    match store
        .update_participants_info(&repair.chat_id, repair.participants_info)
        .await
    {
        Ok(()) => tracing::debug!(
            code = CHAT_REPAIR_WRITE_APPLIED,
            chat_id = %repair.chat_id,
            "participant image repaired"
        ),
        Err(error) => tracing::warn!(
            code = CHAT_REPAIR_WRITE_FAILED,
            chat_id = %repair.chat_id,
            error_code = error.code(),
            error = %error,
            "participant image repair failed; keeping stale image until next snapshot"
        ),
    }
}
