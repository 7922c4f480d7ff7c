use std::sync::Arc;
use std::time::Duration;

use chrono::DateTime;
use tokio::sync::watch;

use super::{Error, Result};
use crate::config::Config;
use crate::container::ContainerID;
use crate::convert::{Conversion, Properties};
use crate::runtime::{self, ContainerRuntime, InspectionRecord, RuntimeEvent};
use crate::sink::{Record, Sink};
use crate::state::ContainerStateCache;

/// Event statuses that are turned into records; everything else is ignored.
pub const TRACKED_STATUSES: [&str; 6] = ["start", "stop", "die", "restart", "pause", "unpause"];

/// Consumes the runtime's lifecycle event stream and emits one enriched record per tracked
/// event, in stream order.
pub struct EventCollectionLoop<R, C, S> {
    runtime: Arc<R>,
    cache: Arc<ContainerStateCache<R>>,
    conversion: Arc<C>,
    sink: Arc<S>,
    call_timeout: Duration,
}

impl<R, C, S> EventCollectionLoop<R, C, S>
where
    R: ContainerRuntime,
    C: Conversion,
    S: Sink,
{
    pub fn new(
        runtime: Arc<R>,
        cache: Arc<ContainerStateCache<R>>,
        conversion: Arc<C>,
        sink: Arc<S>,
        config: &Config,
    ) -> Self {
        Self {
            runtime,
            cache,
            conversion,
            sink,
            call_timeout: config.call_timeout,
        }
    }

    /// Subscribes to the event stream and processes it until the stream ends or `shutdown`
    /// flips to `true`.
    ///
    /// # Errors
    ///
    /// Fails if the subscription or the host name cannot be obtained. An event that cannot be
    /// processed is logged and skipped.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let mut events =
            runtime::bounded("events", self.call_timeout, self.runtime.events()).await?;
        let host = runtime::bounded("host_name", self.call_timeout, self.runtime.host_name())
            .await?;
        log::info!("listening for container events on `{}`", host);

        loop {
            let stopped = *shutdown.borrow_and_update();
            if stopped {
                break;
            }
            let event = tokio::select! {
                event = events.recv() => event,
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
            };
            let Some(event) = event else {
                log::info!("runtime event stream closed");
                return Ok(());
            };
            if let Err(err) = self.handle(&host, &event).await {
                log::warn!(
                    "skipping `{}` event: {}",
                    event.status().unwrap_or_default(),
                    err
                );
            }
        }

        log::info!("event collection stopped");
        Ok(())
    }

    /// Processes a single event. Returns `false` if its status is not tracked.
    pub async fn handle(&self, host: &str, event: &RuntimeEvent) -> Result<bool> {
        let Some(status) = event
            .status()
            .filter(|status| TRACKED_STATUSES.contains(status))
        else {
            return Ok(false);
        };
        let id = event
            .container_id()
            .ok_or_else(|| Error::MissingContainerId {
                status: status.to_owned(),
            })?;
        let id = ContainerID::new(id)?;

        let inspection =
            runtime::bounded("inspect", self.call_timeout, self.runtime.inspect(&id)).await?;
        let mut properties = self.conversion.properties_from_inspection(&inspection, host);
        let key = self.cache.resolve_key(&inspection.id).await;
        add_lifecycle_properties(&mut properties, status, &inspection);

        self.sink.emit(Record::Event {
            name: format!("docker-container-{status}"),
            ikey: key.map(|key| key.to_string()).unwrap_or_default(),
            properties,
        });
        Ok(true)
    }
}

fn add_lifecycle_properties(properties: &mut Properties, status: &str, inspection: &InspectionRecord) {
    let state = &inspection.state;
    let mut set = |name: &str, value: String| {
        properties.insert(name.to_owned(), value);
    };

    set("docker-status", status.to_owned());
    set("docker-Created", inspection.created.clone());
    set("docker-StartedAt", state.started_at.clone());
    set("docker-RestartCount", inspection.restart_count.to_string());

    if !matches!(status, "stop" | "die") {
        return;
    }
    set("docker-FinishedAt", state.finished_at.clone());
    set("docker-ExitCode", state.exit_code.to_string());
    set("docker-Error", state.error.clone().unwrap_or_default());

    let Some(seconds) = seconds_between(&state.started_at, &state.finished_at) else {
        log::debug!(
            "cannot compute duration of container `{}` from `{}` to `{}`",
            inspection.id,
            state.started_at,
            state.finished_at
        );
        return;
    };
    set("docker-duration-seconds", seconds.to_string());
    set("docker-duration-minutes", (seconds / 60.0).to_string());
    set("docker-duration-hours", (seconds / 3600.0).to_string());
    set("docker-duration-days", (seconds / 86400.0).to_string());
}

fn seconds_between(started_at: &str, finished_at: &str) -> Option<f64> {
    let started_at = DateTime::parse_from_rfc3339(started_at).ok()?;
    let finished_at = DateTime::parse_from_rfc3339(finished_at).ok()?;
    let elapsed = finished_at - started_at;

    Some(match elapsed.num_microseconds() {
        Some(micros) => micros as f64 / 1_000_000.0,
        None => elapsed.num_seconds() as f64,
    })
}
