/// Entry point for the container telemetry collector.
///
/// Connects to the Docker daemon, then emits container metrics every collection interval and
/// an enriched record for every container lifecycle event, as JSON lines on stdout.
///
/// # Errors
///
/// Returns an error if the configuration is invalid or the Docker event stream cannot be
/// subscribed to.
///
/// # Examples
///
/// ```bash
/// RUST_LOG=info DOCKER_SOCKET=/var/run/docker.sock cargo run
/// ```
#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    container_telemetry::run().await
}
