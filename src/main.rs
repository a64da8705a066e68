//! `devtools-proxy` binary.
//!
//! Parses the command line, wires the record sinks and runs the proxy until
//! Ctrl+C (or until the first session ends with `--once`).

mod cli;

use std::{io, net::TcpListener as StdTcpListener, process::ExitCode, sync::Arc};

use clap::Parser;
use devtools_proxy::{
    config::{BackpressurePolicy, ConfigError, ProxyConfig},
    server::{ProxyServer, ServerError},
    sink::{SinkFactory, SinkRegistry, TextFormat, TextSinkFactory, TracingSinkFactory},
};
use log::{error, info};
use thiserror::Error;

#[derive(Debug, Error)]
enum StartupError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("could not listen on {addr}: {source}")]
    Listen {
        addr: String,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Server(#[from] ServerError),
    #[cfg(feature = "metrics")]
    #[error("could not start metrics exporter: {0}")]
    Metrics(#[from] metrics_exporter_prometheus::BuildError),
}

fn config_from(cli: &cli::Cli) -> ProxyConfig {
    ProxyConfig {
        listen: cli.listen.clone(),
        remote: cli.remote.clone(),
        include: cli.include.clone(),
        exclude: cli.exclude.clone(),
        show_requests: cli.show_requests,
        distribute_logs: cli.distribute_logs,
        truncate_len: cli.truncate_len(),
        channel_capacity: cli.channel_capacity,
        backpressure: if cli.drop_when_full {
            BackpressurePolicy::DropNewest
        } else {
            BackpressurePolicy::default()
        },
        once: cli.once,
        ..ProxyConfig::default()
    }
}

fn sink_factory(cli: &cli::Cli) -> Arc<dyn SinkFactory> {
    if cli.structured {
        Arc::new(TracingSinkFactory)
    } else {
        let format = TextFormat {
            microseconds: cli.microseconds,
            delta: cli.delta,
        };
        Arc::new(TextSinkFactory::new(cli.log_dir.clone(), format, cli.quiet))
    }
}

fn install_metrics(cli: &cli::Cli) -> Result<(), StartupError> {
    let Some(addr) = cli.metrics_listen else {
        return Ok(());
    };
    #[cfg(feature = "metrics")]
    {
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()?;
        info!("serving metrics: addr={addr}");
    }
    #[cfg(not(feature = "metrics"))]
    log::warn!("metrics support not compiled in, ignoring --metrics-listen {addr}");
    Ok(())
}

async fn run(cli: cli::Cli) -> Result<(), StartupError> {
    let config = config_from(&cli);
    config.validate()?;
    install_metrics(&cli)?;

    let registry = Arc::new(SinkRegistry::new(sink_factory(&cli)));
    let listener = StdTcpListener::bind(config.listen.as_str()).map_err(|source| {
        StartupError::Listen {
            addr: config.listen.clone(),
            source,
        }
    })?;
    let remote = config.remote.clone();
    let server = ProxyServer::new(Arc::new(config), registry).bind_existing_listener(listener)?;
    if let Some(addr) = server.local_addr() {
        info!("listening: addr={addr}, remote={remote}");
    }
    server.run().await?;
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    // Applications embedding the library should install their own subscriber.
    tracing_subscriber::fmt::init();

    match run(cli::Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}
