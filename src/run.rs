use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::cli::RunArgs;
use docpull::config::{Config, ConfigError};
use docpull::logging::Logger;
use docpull::observability::init_tracing;
use docpull::orchestrator::Orchestrator;

type AnyError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub async fn run(args: RunArgs) -> Result<(), AnyError> {
    let mut config = Config::load_with(args.config.clone())?;
    args.apply(&mut config);
    config.validate().map_err(ConfigError::from)?;

    init_tracing(config.logging.level);
    let logger = Logger::new(config.logging.level);
    let mut orchestrator = Orchestrator::from_config(config, logger)?;

    let (tx, rx) = mpsc::channel(4);
    let signals = tokio::spawn(forward_signals(tx));
    let result = orchestrator.run(rx).await;
    signals.abort();

    let summary = result?;
    info!(
        run_id = %summary.run_id,
        total = summary.total,
        fetched = summary.fetched,
        not_fetched = summary.not_fetched,
        interrupted = summary.interrupted,
        "Run complete"
    );

    Ok(())
}

/// Forward every SIGINT/SIGTERM to the orchestrator, which acts on the first
async fn forward_signals(tx: mpsc::Sender<()>) {
    #[cfg(unix)]
    let mut sigterm = {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(stream) => Some(stream),
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                None
            }
        }
    };

    loop {
        #[cfg(unix)]
        let terminate = async {
            match sigterm.as_mut() {
                Some(stream) => {
                    stream.recv().await;
                }
                None => std::future::pending::<()>().await,
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            res = tokio::signal::ctrl_c() => {
                if let Err(e) = res {
                    warn!(error = %e, "Failed to listen for Ctrl+C");
                    return;
                }
            }
            _ = terminate => {}
        }

        info!("Shutdown signal received");
        if tx.send(()).await.is_err() {
            return;
        }
    }
}
