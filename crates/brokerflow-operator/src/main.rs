//! Brokerflow Kubernetes Operator
//!
//! Watches AmqpSource resources and keeps one adapter workload per source
//! forwarding broker messages to the resolved sink.

use anyhow::{bail, Context, Result};
use brokerflow_operator::controller;
use clap::Parser;
use kube::Client;
use std::net::SocketAddr;
use tracing::{info, Level};
use tracing_subscriber::fmt::format::FmtSpan;

/// Brokerflow Kubernetes Operator
#[derive(Parser, Debug)]
#[command(name = "brokerflow-operator")]
#[command(about = "Kubernetes operator for AmqpSource connector resources")]
#[command(version)]
struct Args {
    /// Feature gate for this controller; nothing runs unless set
    #[arg(long, env = "AMQP_SOURCE_ENABLED", default_value = "false")]
    enabled: bool,

    /// Container image for the adapter workload. Required when enabled.
    #[arg(long, env = "AMQP_ADAPTER_IMAGE")]
    adapter_image: Option<String>,

    /// Metrics server address
    #[arg(long, env = "METRICS_ADDR", default_value = "0.0.0.0:8080")]
    metrics_addr: SocketAddr,

    /// Health probe address
    #[arg(long, env = "HEALTH_ADDR", default_value = "0.0.0.0:8081")]
    health_addr: SocketAddr,

    /// Namespace to watch (empty for cluster-wide)
    #[arg(long, env = "WATCH_NAMESPACE", default_value = "")]
    namespace: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: Level,

    /// Enable JSON log format
    #[arg(long, env = "LOG_JSON", default_value = "false")]
    log_json: bool,

    /// Print CRD YAML and exit
    #[arg(long)]
    print_crd: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_crd {
        print_crd()?;
        return Ok(());
    }

    init_logging(&args);

    if !args.enabled {
        info!("AmqpSource controller disabled, exiting");
        return Ok(());
    }

    let Some(adapter_image) = args.adapter_image.clone() else {
        bail!("required configuration 'AMQP_ADAPTER_IMAGE' not set");
    };

    info!(
        version = env!("CARGO_PKG_VERSION"),
        adapter_image = %adapter_image,
        namespace = if args.namespace.is_empty() {
            "all"
        } else {
            &args.namespace
        },
        "Starting brokerflow operator"
    );

    let metrics_addr = args.metrics_addr;
    tokio::spawn(async move {
        if let Err(e) = start_metrics_server(metrics_addr).await {
            tracing::error!(error = %e, "Metrics server failed");
        }
    });

    let health_addr = args.health_addr;
    tokio::spawn(async move {
        if let Err(e) = start_health_server(health_addr).await {
            tracing::error!(error = %e, "Health server failed");
        }
    });

    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;

    let namespace = if args.namespace.is_empty() {
        None
    } else {
        Some(args.namespace)
    };

    controller::run_controller(client, adapter_image, namespace)
        .await
        .context("Controller failed")?;

    Ok(())
}

/// Initialize logging subsystem
fn init_logging(args: &Args) {
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(args.log_level)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(true);

    if args.log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

/// Start the Prometheus metrics server
async fn start_metrics_server(addr: SocketAddr) -> Result<()> {
    use metrics_exporter_prometheus::PrometheusBuilder;

    info!(address = %addr, "Starting metrics server");

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("Failed to install Prometheus exporter")?;

    std::future::pending::<()>().await;

    Ok(())
}

/// Start the health probe server
async fn start_health_server(addr: SocketAddr) -> Result<()> {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    info!(address = %addr, "Starting health server");

    let listener = TcpListener::bind(addr)
        .await
        .context("Failed to bind health server")?;

    loop {
        let (mut socket, _) = listener.accept().await?;

        tokio::spawn(async move {
            let mut buf = [0; 1024];
            if socket.read(&mut buf).await.is_ok() {
                let response = "HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nOK";
                let _ = socket.write_all(response.as_bytes()).await;
            }
        });
    }
}

/// Print the CRD YAML for installation
fn print_crd() -> Result<()> {
    use kube::CustomResourceExt;

    let crd = brokerflow_operator::crd::AmqpSource::crd();
    println!("{}", serde_yaml::to_string(&crd)?);

    Ok(())
}
