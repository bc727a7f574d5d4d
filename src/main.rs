use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

use chatsync::config::APP_NAME;
use chatsync::{build_gateway, Settings, StoreState, SyncController};

/// Headless session: opens a fresh conversation, sends each argument as a
/// message and prints the transcript once every reply is in (or timed out).
#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let settings = Settings::from_env()?;
    tracing::info!("Starting {} with {} backend", APP_NAME, settings.backend.as_str());

    let gateway = build_gateway(&settings)?;
    let mut controller = SyncController::new(gateway, settings.response_timeout());
    let mut rx = controller.store().subscribe();

    if let Err(e) = controller.list_conversations().await {
        tracing::warn!("Starting without a conversation list: {}", e);
    }
    controller
        .create_conversation(None)
        .await
        .context("Failed to create conversation")?;

    for prompt in std::env::args().skip(1) {
        if let Err(e) = controller.send_message(&prompt).await {
            tracing::error!("Message not sent: {}", e);
            continue;
        }
        rx.wait_for(|s| !s.waiting_for_response())
            .await
            .context("Store closed while waiting for a reply")?;
    }

    print_transcript(&controller.store().snapshot());
    controller.shutdown().await;
    Ok(())
}

fn print_transcript(state: &StoreState) {
    if let Some(conversation) = state.active_conversation() {
        println!("# {} ({})", conversation.title, conversation.id);
    }
    for message in state.messages() {
        println!(
            "[{}] {}: {}",
            message.timestamp.format("%H:%M:%S"),
            message.role.as_str(),
            message.content
        );
    }
    if let Some(error) = state.last_error() {
        eprintln!("last error: {}", error);
    }
}
