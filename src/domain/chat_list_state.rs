use super::chat::ChatPreview;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatListUiState {
    Idle,
    Loading,
    Ready,
    Empty,
    Failed,
}

impl ChatListUiState {
    pub fn as_label(self) -> &'static str {
        match self {
            Self::Idle => "CHAT_LIST_IDLE",
            Self::Loading => "CHAT_LIST_LOADING",
            Self::Ready => "CHAT_LIST_READY",
            Self::Empty => "CHAT_LIST_EMPTY",
            Self::Failed => "CHAT_LIST_FAILED",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncFailure {
    pub code: String,
    pub message: String,
    pub at_unix_ms: i64,
}

/// Projection published to consumers. Previews are only ever replaced whole.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatListState {
    ui_state: ChatListUiState,
    previews: Vec<ChatPreview>,
    last_error: Option<SyncFailure>,
}

impl Default for ChatListState {
    fn default() -> Self {
        Self {
            ui_state: ChatListUiState::Idle,
            previews: Vec::new(),
            last_error: None,
        }
    }
}

impl ChatListState {
    pub fn ui_state(&self) -> ChatListUiState {
        self.ui_state
    }

    pub fn is_loading(&self) -> bool {
        self.ui_state == ChatListUiState::Loading
    }

    pub fn previews(&self) -> &[ChatPreview] {
        &self.previews
    }

    pub fn last_error(&self) -> Option<&SyncFailure> {
        self.last_error.as_ref()
    }

    pub fn set_idle(&mut self) {
        self.ui_state = ChatListUiState::Idle;
        self.previews.clear();
        self.last_error = None;
    }

    pub fn set_loading(&mut self) {
        self.ui_state = ChatListUiState::Loading;
        self.previews.clear();
        self.last_error = None;
    }

    pub fn set_ready(&mut self, previews: Vec<ChatPreview>) {
        self.ui_state = if previews.is_empty() {
            ChatListUiState::Empty
        } else {
            ChatListUiState::Ready
        };
        self.previews = previews;
        self.last_error = None;
    }

    /// Leaves the loading state without touching the current previews.
    pub fn finish_loading(&mut self) {
        if !self.is_loading() {
            return;
        }

        self.ui_state = if self.previews.is_empty() {
            ChatListUiState::Empty
        } else {
            ChatListUiState::Ready
        };
    }

    pub fn set_failed(&mut self, failure: SyncFailure) {
        self.ui_state = ChatListUiState::Failed;
        self.last_error = Some(failure);
    }
}
