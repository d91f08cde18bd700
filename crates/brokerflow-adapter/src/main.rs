//! Brokerflow adapter
//!
//! Runs one message pump for one AmqpSource resource. A fatal broker error
//! exits the process non-zero; the platform restarts it with backoff.

use anyhow::{Context, Result};
use brokerflow_adapter::{
    parse_source_address, AdapterConfig, AmqpSource, EventFactory, HttpEventPoster, Pump,
};
use clap::Parser;
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let config = AdapterConfig::parse();
    init_logging(&config);

    config.validate().context("invalid configuration")?;
    let address = parse_source_address(&config.source_uri)
        .context("invalid SOURCE_URI")?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        source = %address.canonical,
        sink = %config.sink_uri,
        credit = config.credit,
        "starting adapter"
    );

    let source = AmqpSource::connect(&address, config.credit).await?;
    let poster = HttpEventPoster::new(&config.sink_uri, config.post_timeout())?;
    let events = EventFactory::new(address.canonical.clone());

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    tokio::spawn(wait_for_signal(shutdown_tx));

    let mut pump = Pump::new(source, poster, events);
    let result = pump.run(shutdown_rx).await;

    if let Err(ref e) = result {
        warn!(error = %e, "pump terminated");
    }
    pump.into_source().close().await;
    result?;

    info!("adapter stopped");
    Ok(())
}

fn init_logging(config: &AdapterConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone()));

    let subscriber = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);

    if config.log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

/// Signal SIGTERM/SIGINT into the pump's shutdown channel.
async fn wait_for_signal(shutdown_tx: broadcast::Sender<()>) {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            warn!(error = %e, "failed to install SIGTERM handler");
            return;
        }
    };

    tokio::select! {
        _ = sigterm.recv() => info!("SIGTERM received"),
        _ = tokio::signal::ctrl_c() => info!("interrupt received"),
    }

    let _ = shutdown_tx.send(());
}
