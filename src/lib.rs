//! Container Telemetry: collects performance metrics and lifecycle events for the containers
//! of a Docker host and writes them to a telemetry sink.
//!
//! Containers that ship their own telemetry SDK announce an instrumentation key through a
//! discovery file. Their metrics are left to the SDK, and their lifecycle events are tagged
//! with that key.
pub mod collector;
pub mod config;
pub mod container;
pub mod convert;
pub mod error;
pub mod fanout;
pub mod runtime;
pub mod sink;
pub mod state;

use std::sync::Arc;

use collector::Collector;
use config::Config;
use convert::DockerConversion;
use runtime::docker::DockerRuntime;
use sink::StdoutSink;

/// Runs the collector against the local Docker daemon until interrupted.
///
/// Records are written as JSON lines to stdout.
///
/// # Errors
///
/// Possible errors include:
/// - Invalid configuration in the environment (e.g., `SAMPLES_IN_EACH_METRIC=1`).
/// - A Docker socket path the client cannot be set up for.
/// - Failure to subscribe to the Docker event stream.
pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env()?;
    log::debug!("Configuration: {:?}", config);

    let runtime = Arc::new(DockerRuntime::new(
        &config.docker_socket,
        config.call_timeout,
    )?);
    let mut collector = Collector::new(
        runtime,
        Arc::new(DockerConversion),
        Arc::new(StdoutSink),
        &config,
    )?;
    collector.start()?;

    let interrupted = tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            true
        }
        result = collector.join() => {
            result?;
            false
        }
    };

    if interrupted {
        log::info!("received interrupt");
        collector.stop();
        collector.join().await?;
    }
    Ok(())
}
