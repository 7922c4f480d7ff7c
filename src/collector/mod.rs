//! The two collection paths and the lifecycle that drives them.
//!
//! [`StatsCollectionCycle`] runs on a fixed interval and [`EventCollectionLoop`] consumes the
//! runtime's event stream. Both share one [`ContainerStateCache`].

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::config::Config;
use crate::convert::Conversion;
use crate::runtime::ContainerRuntime;
use crate::sink::Sink;
use crate::state::ContainerStateCache;

mod error;
mod events;
mod stats;

pub use error::{Error, Result};
pub use events::{EventCollectionLoop, TRACKED_STATUSES};
pub use stats::StatsCollectionCycle;

pub struct Collector<R, C, S> {
    cache: Arc<ContainerStateCache<R>>,
    stats: Arc<StatsCollectionCycle<R, C, S>>,
    events: Arc<EventCollectionLoop<R, C, S>>,
    collect_interval: Duration,
    shutdown: Arc<watch::Sender<bool>>,
    join_handles: Vec<JoinHandle<Result<()>>>,
}

impl<R, C, S> Collector<R, C, S>
where
    R: ContainerRuntime,
    C: Conversion,
    S: Sink,
{
    /// Wires up both collection paths around a shared cache.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `config` is invalid.
    pub fn new(runtime: Arc<R>, conversion: Arc<C>, sink: Arc<S>, config: &Config) -> Result<Self> {
        config.validate()?;

        let cache = Arc::new(ContainerStateCache::new(Arc::clone(&runtime), config));
        let stats = StatsCollectionCycle::new(
            Arc::clone(&runtime),
            Arc::clone(&cache),
            Arc::clone(&conversion),
            Arc::clone(&sink),
            config,
        );
        let events = EventCollectionLoop::new(runtime, Arc::clone(&cache), conversion, sink, config);
        let (shutdown, _) = watch::channel(false);
        let shutdown = Arc::new(shutdown);

        Ok(Self {
            cache,
            stats: Arc::new(stats),
            events: Arc::new(events),
            collect_interval: config.collect_interval,
            shutdown,
            join_handles: Vec::default(),
        })
    }

    pub fn cache(&self) -> &Arc<ContainerStateCache<R>> {
        &self.cache
    }

    /// Spawns the periodic stats task and the event task. Once the event task ends, for
    /// whatever reason, the stats task is stopped as well.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyStarted`] if the tasks are already running.
    pub fn start(&mut self) -> Result<()> {
        if !self.join_handles.is_empty() {
            return Err(Error::AlreadyStarted);
        }
        self.shutdown.send_replace(false);

        self.join_handles.push(tokio::spawn(stats_task(
            Arc::clone(&self.stats),
            self.collect_interval,
            self.shutdown.subscribe(),
        )));
        let events = Arc::clone(&self.events);
        let shutdown = Arc::clone(&self.shutdown);
        self.join_handles.push(tokio::spawn(async move {
            let result = events.run(shutdown.subscribe()).await;
            // the event stream cannot be resumed, so the stats task goes down with it
            shutdown.send_replace(true);
            result
        }));
        log::info!(
            "collector started, collecting stats every {:?}",
            self.collect_interval
        );

        Ok(())
    }

    /// Signals both tasks to stop. Use [`Collector::join`] to wait for them.
    pub fn stop(&self) {
        log::info!("stopping collector");
        self.shutdown.send_replace(true);
    }

    /// Waits for every spawned task and returns the first failure.
    ///
    /// Cancel safe: a handle is only released once its task has finished.
    ///
    /// # Errors
    ///
    /// Returns the error a task ended with, or [`Error::Task`] if it panicked.
    pub async fn join(&mut self) -> Result<()> {
        let mut outcome = Ok(());
        while let Some(handle) = self.join_handles.first_mut() {
            let result = match handle.await {
                Ok(result) => result,
                Err(err) => Err(Error::from(err)),
            };
            self.join_handles.remove(0);
            if let Err(err) = result {
                log::error!("collector task ended with an error: {}", err);
                if outcome.is_ok() {
                    outcome = Err(err);
                }
            }
        }

        outcome
    }
}

async fn stats_task<R, C, S>(
    cycle: Arc<StatsCollectionCycle<R, C, S>>,
    collect_interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()>
where
    R: ContainerRuntime,
    C: Conversion,
    S: Sink,
{
    let mut interval = tokio::time::interval(collect_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let stopped = *shutdown.borrow_and_update();
        if stopped {
            break;
        }
        tokio::select! {
            _ = interval.tick() => {}
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
                continue;
            }
        }

        tokio::select! {
            result = cycle.run() => match result {
                Ok(emitted) => log::debug!("stats cycle emitted {} metrics", emitted),
                Err(err) => log::error!("stats cycle failed: {}", err),
            },
            _ = shutdown.changed() => {}
        }
    }

    log::info!("stats collection stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::DockerConversion;
    use crate::runtime::StatsSample;
    use crate::runtime::fake::FakeRuntime;
    use crate::sink::{ChannelSink, Record};

    fn sample(second: u32) -> StatsSample {
        let mut sample = StatsSample::default();
        sample.read = format!("2024-01-01T10:00:{second:02}Z");
        sample.memory_stats.usage = Some(100);
        sample
    }

    fn collector(
        runtime: &Arc<FakeRuntime>,
    ) -> (
        Collector<FakeRuntime, DockerConversion, ChannelSink>,
        tokio::sync::mpsc::UnboundedReceiver<Record>,
    ) {
        let (sink, rx) = ChannelSink::new();
        let collector = Collector::new(
            Arc::clone(runtime),
            Arc::new(DockerConversion),
            Arc::new(sink),
            &Config::default(),
        )
        .unwrap();
        (collector, rx)
    }

    #[test]
    fn test_rejects_invalid_config() {
        let runtime = Arc::new(FakeRuntime::default());
        let (sink, _rx) = ChannelSink::new();
        let result = Collector::new(
            runtime,
            Arc::new(DockerConversion),
            Arc::new(sink),
            &Config::default().with_samples_in_each_metric(1),
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_collect_and_stop() {
        let runtime = Arc::new(FakeRuntime::default());
        runtime.set_containers(&["abc"]);
        runtime.set_stats("abc", vec![sample(0), sample(1)]);
        let _events = runtime.event_sender();
        let (mut collector, mut rx) = collector(&runtime);

        collector.start().unwrap();
        assert!(matches!(collector.start(), Err(Error::AlreadyStarted)));

        // first tick fires immediately; initial resolution takes four retry delays
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(collector.cache().contains(&crate::runtime::fake::id("abc")));
        assert!(matches!(rx.try_recv(), Ok(Record::Metric { .. })));

        collector.stop();
        collector.join().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_event_stream_stops_collector() {
        let runtime = Arc::new(FakeRuntime::default());
        let events = runtime.event_sender();
        let (mut collector, _rx) = collector(&runtime);

        collector.start().unwrap();
        drop(events);

        collector.join().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_join_reports_event_subscription_failure() {
        let runtime = Arc::new(FakeRuntime::default());
        let (mut collector, _rx) = collector(&runtime);

        collector.start().unwrap();
        collector.stop();

        assert!(matches!(collector.join().await, Err(Error::Runtime(_))));
    }
}
