//! Shared test helpers for in-crate handler and dispatcher tests.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::bot::Dispatcher;
use crate::channel::{Destination, LocalChannel};
use crate::config::{BotConfig, ChannelBackend, ChannelConfig, Config};
use crate::service::FileService;
use crate::storage::{IndexStore, MessageId};
use crate::telegram::BotApi;
use crate::AppState;

/// Create a test AppState with a temporary index and local channel.
pub fn test_state(temp_dir: &tempfile::TempDir) -> Arc<AppState> {
    test_state_with_limit(temp_dir, 10 * 1024 * 1024)
}

/// Like [`test_state`], with a chosen upload size limit.
pub fn test_state_with_limit(temp_dir: &tempfile::TempDir, max_upload_size: u64) -> Arc<AppState> {
    let database_path = temp_dir.path().join("files.db");
    let channel_dir = temp_dir.path().join("channel");

    let config = Config {
        bot: BotConfig::default(),
        channel: ChannelConfig {
            backend: ChannelBackend::Local,
            channel_id: None,
            local_path: channel_dir.to_string_lossy().to_string(),
        },
        database_path: database_path.to_string_lossy().to_string(),
        bind_address: "127.0.0.1:0".to_string(),
        max_upload_size,
        backend_timeout: Duration::from_secs(5),
    };

    let index = IndexStore::open(&database_path).expect("Failed to open test index");
    let channel = LocalChannel::new(&channel_dir).expect("Failed to create test channel");
    let service = FileService::new(index, Arc::new(channel), config.backend_timeout);

    Arc::new(AppState {
        config,
        service: Arc::new(service),
    })
}

/// Dispatcher over `state` whose Bot API points nowhere; only usable for
/// paths that don't talk to Telegram.
pub fn test_dispatcher(state: &Arc<AppState>, miniapp_url: Option<&str>) -> Dispatcher {
    let api = BotApi::new("http://127.0.0.1:9", "test-token", Duration::from_secs(1))
        .expect("Failed to build test Bot API client");
    Dispatcher::new(
        Arc::new(api),
        Arc::clone(&state.service),
        state.config.max_upload_size,
        miniapp_url.map(str::to_string),
        Duration::from_secs(1),
    )
}

/// Where the local channel in `test_state` redelivers `message_id` to `chat_id`.
pub fn delivery_path(temp_dir: &tempfile::TempDir, chat_id: &str, message_id: MessageId) -> PathBuf {
    LocalChannel::new(temp_dir.path().join("channel"))
        .expect("Failed to reopen test channel")
        .delivery_path(&Destination::new(chat_id), message_id)
}
