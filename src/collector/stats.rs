use std::sync::Arc;
use std::time::Duration;

use tokio::sync::OnceCell;

use super::Result;
use crate::config::Config;
use crate::container::ContainerID;
use crate::convert::Conversion;
use crate::fanout::FanOut;
use crate::runtime::{self, ContainerRuntime};
use crate::sink::{Record, Sink};
use crate::state::ContainerStateCache;

/// One periodic pass that samples and emits performance metrics for every container the
/// collector reports on.
pub struct StatsCollectionCycle<R, C, S> {
    runtime: Arc<R>,
    cache: Arc<ContainerStateCache<R>>,
    conversion: Arc<C>,
    sink: Arc<S>,
    own_id: OnceCell<Option<ContainerID>>,
    fan_out: FanOut,
    samples: usize,
    call_timeout: Duration,
}

impl<R, C, S> StatsCollectionCycle<R, C, S>
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
            own_id: OnceCell::new(),
            fan_out: FanOut::new(config.max_parallelism),
            samples: config.samples_in_each_metric,
            call_timeout: config.call_timeout,
        }
    }

    /// Runs one cycle and returns the number of metric records emitted.
    ///
    /// # Errors
    ///
    /// Fails only if the host name or the container listing cannot be fetched. Failures for
    /// single containers are logged and skipped.
    pub async fn run(&self) -> Result<usize> {
        let own_id = self.own_id().await;
        let host = runtime::bounded("host_name", self.call_timeout, self.runtime.host_name())
            .await?;
        let containers = runtime::bounded(
            "list_containers",
            self.call_timeout,
            self.runtime.list_containers(),
        )
        .await?;
        self.cache.refresh(&containers).await;

        let selected = self.cache.reported_by_collector(own_id.as_ref());
        log::debug!(
            "collecting stats for {} of {} containers",
            selected.len(),
            containers.len()
        );

        let runtime = Arc::clone(&self.runtime);
        let (samples, timeout) = (self.samples, self.call_timeout);
        let results = self
            .fan_out
            .apply("collect stats", selected, move |container| {
                let runtime = Arc::clone(&runtime);
                async move {
                    runtime::bounded("stats", timeout, runtime.stats(&container, samples)).await
                }
            })
            .await;

        let mut emitted = 0;
        for (container, samples) in results {
            let Some(samples) = samples.filter(|samples| samples.len() > 1) else {
                log::trace!("not enough stats samples for container `{}`", container.id);
                continue;
            };
            let properties = self.conversion.properties_from_container(&container, &host);
            for metric in self.conversion.stats_to_metrics(&samples) {
                self.sink.emit(Record::Metric {
                    metric,
                    properties: properties.clone(),
                });
                emitted += 1;
            }
        }

        Ok(emitted)
    }

    /// The collector's own container id, looked up once. A failed lookup is retried on the
    /// next cycle.
    async fn own_id(&self) -> Option<ContainerID> {
        let lookup = self
            .own_id
            .get_or_try_init(|| async {
                let own_id = runtime::bounded(
                    "own_container_id",
                    self.call_timeout,
                    self.runtime.own_container_id(),
                )
                .await?;
                match &own_id {
                    Some(id) => log::info!("collector runs in container `{}`", id),
                    None => log::info!("collector runs on the host"),
                }
                Ok::<_, runtime::Error>(own_id)
            })
            .await;

        match lookup {
            Ok(own_id) => own_id.clone(),
            Err(err) => {
                log::warn!("failed to determine own container id: {}", err);
                None
            }
        }
    }
}
