use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};

use crate::{
    cli::{Cli, Command, DeleteArgs, WatchArgs},
    domain::{
        chat::{ChatPreview, Identity},
        chat_list_state::ChatListState,
    },
    usecases::{
        bootstrap,
        context::AppContext,
        delete_chat::ChatDeleter,
        project_chats::ChatProjector,
        sync_session::SyncSession,
    },
};

pub fn run(cli: Cli) -> Result<()> {
    let context = bootstrap::bootstrap(cli.config.as_deref(), cli.fixture.as_deref())?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;

    match cli.command {
        Command::Watch(args) => runtime.block_on(watch(&context, args)),
        Command::Delete(args) => runtime.block_on(delete(&context, args)),
    }
}

async fn watch(context: &AppContext, args: WatchArgs) -> Result<()> {
    let identity = identity_from(&args);
    let projector = ChatProjector::new(context.config.sync.fallback_name.clone());
    let mut session = SyncSession::new(Arc::clone(&context.store), projector);

    if let Err(error) = session.start(Some(identity)).await {
        notify_failure(error.code(), error.user_message());
        return Err(error.into());
    }

    let wait_ms = args
        .wait_ms
        .unwrap_or(context.config.sync.initial_load_timeout_ms);
    let state = session
        .wait_until_loaded(Duration::from_millis(wait_ms))
        .await;
    session.stop();

    if state.is_loading() {
        tracing::warn!(wait_ms, "chat list still loading when wait expired");
    }
    if let Some(failure) = state.last_error() {
        notify_failure(&failure.code, &failure.message);
    }

    for line in preview_lines(&state) {
        println!("{line}");
    }

    context.persist_store()?;
    Ok(())
}

async fn delete(context: &AppContext, args: DeleteArgs) -> Result<()> {
    let deleter = ChatDeleter::new(
        Arc::clone(&context.store),
        context.config.delete.max_parallel_deletes,
    );

    let result = deleter.delete_chat_with_messages(&args.chat).await;
    // partial deletes are real state too
    context.persist_store()?;

    match result {
        Ok(outcome) => {
            println!(
                "Deleted chat {} and {} message(s).",
                outcome.chat_id, outcome.messages_deleted
            );
            Ok(())
        }
        Err(error) => {
            notify_failure(error.code(), error.user_message());
            Err(error.into())
        }
    }
}

fn identity_from(args: &WatchArgs) -> Identity {
    let identity = Identity::new(
        args.user.clone(),
        args.name.clone().unwrap_or_else(|| args.user.clone()),
    );
    match &args.image {
        Some(image) => identity.with_image(image.clone()),
        None => identity,
    }
}

fn notify_failure(code: &str, message: &str) {
    eprintln!("{code}: {message}");
}

fn preview_lines(state: &ChatListState) -> Vec<String> {
    if state.previews().is_empty() {
        return vec![format!("({})", state.ui_state().as_label())];
    }

    state.previews().iter().map(preview_line).collect()
}

fn preview_line(preview: &ChatPreview) -> String {
    let updated_at = DateTime::<Utc>::from_timestamp_millis(preview.updated_at_unix_ms)
        .map(|at| at.to_rfc3339())
        .unwrap_or_else(|| preview.updated_at_unix_ms.to_string());
    let last_message = if preview.last_message.is_empty() {
        "-"
    } else {
        preview.last_message.as_str()
    };

    format!(
        "{}\t{}\t{}\t{}\t{}",
        preview.chat_id,
        preview.other_user_name,
        preview.other_user_image.as_deref().unwrap_or("-"),
        last_message,
        updated_at
    )
}
