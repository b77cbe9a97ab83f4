use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use livewatch::{
    actors::{history::HistoryHandle, poller::PollerHandle, refresh::RefreshHandle},
    cache::StateCache,
    config::{Config, StorageConfig, TransportConfig, read_config_file},
    directory::{Directory, StaticSessions, SubscriptionStore},
    engine::PollEngine,
    monitors::cadence::CadencePolicy,
    notify::{
        DiscordSession, HttpCoverFetcher, NotificationFanout, OneBotSession, Renderer,
        TransportSession,
    },
    source::{BilibiliClient, LiveSource},
    storage::{HistoryBackend, MemoryBackend},
    util::{get_config_path, get_cookie},
};
use tracing::{debug, info, level_filters::LevelFilter, trace, warn};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Parser)]
struct Args {
    /// Config file
    #[arg(short, default_value_t = get_config_path())]
    file: String,
}

fn init() {
    let filter = filter::Targets::new().with_targets(vec![
        ("livewatch", LevelFilter::TRACE),
        ("livewatch_hub", LevelFilter::TRACE),
    ]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init();
    let args = Args::parse();
    trace!("started with args: {args:?}");

    let mut config = read_config_file(&args.file)
        .with_context(|| format!("failed to read config file {}", args.file))?;
    if let Some(cookie) = get_cookie() {
        debug!("using cookie from environment");
        config.source.cookie = Some(cookie);
    }

    let source: Arc<dyn LiveSource> = Arc::new(BilibiliClient::new(
        &config.source,
        config.network.proxy.as_deref(),
    )?);

    match source.verify_credential().await {
        Ok(identity) => info!("logged in upstream as {} ({})", identity.name, identity.uid),
        Err(e) => warn!("credential check failed, continuing without login: {e}"),
    }

    let directory = Arc::new(Directory::from_config(&config));
    let sessions = build_sessions(&config)?;
    info!("{} transport sessions configured", sessions.len());

    let history = spawn_history(&config).await?;
    let timeout = Duration::from_secs(config.source.timeout_secs);
    let renderer = Renderer::new(Arc::new(HttpCoverFetcher::new(timeout)?));
    let cache = Arc::new(StateCache::new());

    let engine = PollEngine::new(
        source.clone(),
        cache.clone(),
        history.clone(),
        NotificationFanout::new(directory.clone(), directory.clone()),
        directory.clone(),
        Arc::new(sessions),
        renderer,
    );

    let subscribed = directory.subscribed_entities().await?;
    let report = cache.init_all(source.as_ref(), &subscribed).await;
    for (entity, error) in &report.failed {
        warn!("room {entity} will be bootstrapped on its first poll: {error}");
    }

    let policy = CadencePolicy::from_config(&config.polling, config.network.proxy.as_deref());
    let poller = PollerHandle::spawn(engine.clone(), policy);
    let refresh = RefreshHandle::spawn(engine, config.host_refresh_at);

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    info!("shutting down");

    poller.shutdown().await?;
    refresh.shutdown().await?;
    history.shutdown().await?;

    Ok(())
}

fn build_sessions(config: &Config) -> anyhow::Result<StaticSessions> {
    let timeout = Duration::from_secs(config.source.timeout_secs);

    let sessions = config
        .transports
        .iter()
        .map(|transport| -> anyhow::Result<Arc<dyn TransportSession>> {
            Ok(match transport {
                TransportConfig::Onebot(onebot) => Arc::new(OneBotSession::new(onebot, timeout)?),
                TransportConfig::Discord(discord) => {
                    Arc::new(DiscordSession::new(discord, timeout)?)
                }
            })
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    Ok(StaticSessions::new(sessions))
}

async fn spawn_history(config: &Config) -> anyhow::Result<HistoryHandle> {
    let storage = config.history.clone().unwrap_or_default();

    let (backend, retention_days): (Box<dyn HistoryBackend>, _) = match storage {
        StorageConfig::None => {
            info!("history kept in memory only");
            (Box::new(MemoryBackend::new()), None)
        }
        #[cfg(feature = "storage-sqlite")]
        StorageConfig::Sqlite {
            path,
            retention_days,
        } => {
            let backend = livewatch::storage::sqlite::SqliteBackend::new(&path)
                .await
                .with_context(|| format!("failed to open history database {}", path.display()))?;
            (Box::new(backend), retention_days)
        }
        #[cfg(not(feature = "storage-sqlite"))]
        StorageConfig::Sqlite { .. } => {
            warn!("built without SQLite support, history kept in memory only");
            (Box::new(MemoryBackend::new()), None)
        }
    };

    match backend.health_check().await {
        Ok(health) if health.healthy => {
            info!("history backend {} ready ({})", health.backend, health.detail)
        }
        Ok(health) => warn!("history backend {} unhealthy: {}", health.backend, health.detail),
        Err(e) => warn!("history health check failed: {e}"),
    }

    Ok(HistoryHandle::spawn(backend, retention_days))
}
