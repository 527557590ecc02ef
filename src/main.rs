use anyhow::{Context, Result};
use azaan_relay::notify::fcm;
use azaan_relay::{
    create_router, AppState, Config, FfmpegTranscoder, ListenerDirectory, LogOnlyPushSender,
    NotificationFanout, PushSender, SegmentStore, SessionManager,
};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// How long shutdown waits for live broadcasts to tear down
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Parser)]
#[command(name = "azaan-relay", version, about = "Live azaan broadcast relay")]
struct Args {
    /// Config file (extension optional)
    #[arg(short, long, default_value = "config/azaan-relay")]
    config: String,

    /// Override the HTTP port
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let mut cfg = Config::load(&args.config)?;
    if let Some(port) = args.port {
        cfg.service.http.port = port;
    }

    info!("{} v{}", cfg.service.name, env!("CARGO_PKG_VERSION"));

    let store = SegmentStore::new(&cfg.hls.root);
    store.init().await?;

    let directory = Arc::new(match &cfg.directory.snapshot_path {
        Some(path) => ListenerDirectory::open(path.clone())
            .await
            .context("Failed to load token snapshot")?,
        None => ListenerDirectory::in_memory(),
    });

    let push: Arc<dyn PushSender> = match (cfg.push.enabled, &cfg.push.service_account_path) {
        (true, Some(key_path)) => Arc::new(
            fcm::connect(cfg.push.project_id.clone(), key_path)
                .await
                .context("Failed to set up FCM")?,
        ),
        (true, None) => {
            warn!("push.enabled is set but push.service_account_path is missing, logging only");
            Arc::new(LogOnlyPushSender)
        }
        (false, _) => Arc::new(LogOnlyPushSender),
    };

    let manager = Arc::new(SessionManager::new(
        store,
        Arc::new(FfmpegTranscoder::new(cfg.transcoder.clone())),
        directory,
        NotificationFanout::new(push),
        cfg.hls.clone(),
    ));

    let app = create_router(AppState::new(Arc::clone(&manager)));

    let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("Listening on http://{}", addr);
    info!(
        "HLS available at {}",
        cfg.hls.playback_url("{venueId}")
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for shutdown signal: {}", e);
                std::future::pending::<()>().await;
            }
            info!("Shutdown requested");
            manager.shutdown(SHUTDOWN_TIMEOUT).await;
        })
        .await?;

    info!("Server stopped");
    Ok(())
}
