use std::sync::Arc;

use deploywatch::chain::{connect_http, ChainClient};
use deploywatch::config::{Config, LoggingConfig, NotifyTarget};
use deploywatch::filter::MethodFilter;
use deploywatch::listener::ChainListener;
use deploywatch::notifier::{ChatNotifier, LogNotifier, Notifier};
use deploywatch::pipeline::Pipeline;
use deploywatch::poller::ApiPoller;
use deploywatch::publisher::RedisNotifier;
use deploywatch::registry::Registry;
use deploywatch::subscription::WsBlockFeed;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    let config = Config::from_env()?;
    init_tracing(&config.logging);

    info!("deploywatch v{} starting", env!("CARGO_PKG_VERSION"));

    let filter = Arc::new(MethodFilter::load(config.allowed_methods.selector_source())?);
    info!(selectors = filter.snapshot().len(), "Allowed-method filter loaded");

    let registry = Arc::new(Registry::open(config.registry.clone())?);

    let notifier = build_notifier(&config).await?;
    let pipeline = Arc::new(Pipeline::new(registry, notifier));

    let chain: Arc<dyn ChainClient> = Arc::new(connect_http(&config.rpc_url, config.fetch_timeout)?);
    let feed = Arc::new(WsBlockFeed::new(config.ws_url.clone()).with_connect_timeout(config.fetch_timeout));

    let shutdown = CancellationToken::new();

    let listener = ChainListener::new(
        feed,
        chain.clone(),
        filter.clone(),
        pipeline.clone(),
        shutdown.clone(),
    )
    .with_reconnect_policy(config.reconnect.clone())
    .with_idle_timeout(config.block_idle_timeout);

    let poller = ApiPoller::new(
        &config.index_api_url,
        config.fetch_timeout,
        chain,
        filter,
        pipeline,
        shutdown.clone(),
    )?
    .with_interval(config.poll_interval)
    .with_excluded_labels(&config.excluded_labels)
    .with_unknown_method_policy(config.unknown_method_policy);

    let listener_task = tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            let result = listener.run().await;
            if let Err(e) = &result {
                error!(error = %e, "Chain listener failed, shutting down");
                shutdown.cancel();
            }
            result
        }
    });
    let poller_task = tokio::spawn(async move { poller.run().await });

    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                warn!(error = %e, "Failed to listen for Ctrl-C");
            }
            info!("Shutdown signal received");
            shutdown.cancel();
        }
        _ = shutdown.cancelled() => {}
    }

    // Both loops stop between items, so no admission is cut short
    let listener_result = listener_task.await?;
    poller_task.await?;

    info!("deploywatch stopped");
    listener_result.map_err(Into::into)
}

fn init_tracing(logging: &LoggingConfig) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&logging.level));

    if logging.json {
        tracing_subscriber::fmt().json().with_env_filter(env_filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }
}

async fn build_notifier(config: &Config) -> anyhow::Result<Arc<dyn Notifier>> {
    let notifier: Arc<dyn Notifier> = match &config.notify {
        NotifyTarget::Chat { api_url, chat_id } => {
            info!(chat_id = %chat_id, "Notifications go to chat");
            Arc::new(ChatNotifier::new(api_url.clone(), chat_id.clone(), config.fetch_timeout)?)
        }
        NotifyTarget::Redis { url, channel } => match RedisNotifier::connect(url, channel.clone(), config.fetch_timeout).await {
            Ok(publisher) => {
                info!(channel = %channel, "Notifications go to Redis");
                Arc::new(publisher)
            }
            Err(e) => {
                warn!(error = %e, "Failed to connect to Redis, notifications go to the log");
                Arc::new(LogNotifier)
            }
        },
        NotifyTarget::Log => {
            info!("No notification destination configured, notifications go to the log");
            Arc::new(LogNotifier)
        }
    };
    Ok(notifier)
}
