use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use channel_drive::{
    api,
    bot::Dispatcher,
    channel::{BlobChannel, LocalChannel, TelegramChannel},
    config::{ChannelBackend, Config},
    service::FileService,
    storage::IndexStore,
    telegram::BotApi,
    AppState,
};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());

    let log_format = std::env::var("LOG_FORMAT").unwrap_or_default();
    match log_format.to_lowercase().as_str() {
        "gcp" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_stackdriver::layer())
                .init();
        }
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_target(true)
                        .with_span_list(false),
                )
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }

    info!(version = env!("CARGO_PKG_VERSION"), "channel-drive starting");

    let config = Config::load()?;

    let index = IndexStore::open(&config.database_path)?;
    info!("Index ready at: {}", config.database_path);

    let bot_api = match config.bot.token.as_deref() {
        Some(token) => Some(Arc::new(BotApi::new(
            &config.bot.api_url,
            token,
            config.backend_timeout,
        )?)),
        None => None,
    };

    // Initialize channel backend
    let channel: Arc<dyn BlobChannel> = match config.channel.backend {
        ChannelBackend::Local => {
            let channel = LocalChannel::new(&config.channel.local_path)?;
            info!(
                "Using local channel backend at: {}",
                config.channel.local_path
            );
            Arc::new(channel)
        }
        ChannelBackend::Telegram => {
            let api = bot_api
                .clone()
                .ok_or_else(|| anyhow::anyhow!("BOT_TOKEN is required for the telegram backend"))?;
            let channel_id = config
                .channel
                .channel_id
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("CHANNEL_ID is required for the telegram backend"))?;
            info!("Using Telegram channel backend, channel: {}", channel_id);
            Arc::new(TelegramChannel::new(api, channel_id))
        }
    };

    let service = Arc::new(FileService::new(index, channel, config.backend_timeout));

    // Chat front end runs next to the HTTP API when a bot token is configured
    let dispatcher_handle = bot_api.map(|api| {
        Dispatcher::new(
            api,
            Arc::clone(&service),
            config.max_upload_size,
            config.bot.miniapp_url.clone(),
            config.bot.poll_timeout,
        )
        .start()
    });

    let state = Arc::new(AppState {
        config: config.clone(),
        service,
    });

    let app = api::create_router(Arc::clone(&state));
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    info!("Listening on: {}", config.bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(handle) = dispatcher_handle {
        info!("Stopping bot dispatcher");
        handle.abort();
    }

    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, draining connections");
}
