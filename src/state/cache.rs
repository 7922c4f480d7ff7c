use std::collections::HashSet;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::time::Instant;

use super::discovery::KeyDiscovery;
use super::entry::ResolutionEntry;
use crate::config::{Config, ResolutionPolicy};
use crate::container::{ContainerDescriptor, ContainerID, InstrumentationKey};
use crate::fanout::FanOut;
use crate::runtime::{self, ContainerRuntime};

/// Outcome of registering a listed container with the cache.
#[derive(Debug)]
enum Registration {
    /// First sighting; run the full retry loop.
    New,
    /// Known but unresolved and still within the discovery window; try once more.
    Retry,
    /// Another task is still running the first-sighting loop for this container.
    Pending,
    Resolved(InstrumentationKey),
    GivenUp,
}

/// Tracks, per container, whether it reports its own telemetry under an instrumentation key.
///
/// The map is shared between the periodic stats cycle and the event loop. Entries are only ever
/// touched through per-key [`DashMap`] operations and no map guard is held across an `.await`,
/// so discovery calls and retry sleeps never block other containers.
#[derive(Debug)]
pub struct ContainerStateCache<R> {
    runtime: Arc<R>,
    entries: DashMap<ContainerID, ResolutionEntry>,
    discovery: KeyDiscovery,
    policy: ResolutionPolicy,
    fan_out: FanOut,
    call_timeout: Duration,
}

impl<R: ContainerRuntime> ContainerStateCache<R> {
    pub fn new(runtime: Arc<R>, config: &Config) -> Self {
        Self {
            runtime,
            entries: DashMap::default(),
            discovery: KeyDiscovery::new(&config.sdk_file, config.call_timeout),
            policy: config.resolution,
            fan_out: FanOut::new(config.max_parallelism),
            call_timeout: config.call_timeout,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: &ContainerID) -> bool {
        self.entries.contains_key(id)
    }

    /// Returns the cached instrumentation key without triggering any resolution.
    pub fn key(&self, id: &ContainerID) -> Option<InstrumentationKey> {
        self.entries
            .get(id)
            .and_then(|entry| entry.instrumentation_key.clone())
    }

    /// Returns a snapshot of the entry for `id`.
    pub fn entry(&self, id: &ContainerID) -> Option<ResolutionEntry> {
        self.entries.get(id).map(|entry| entry.clone())
    }

    /// Reconciles the cache with a fresh container listing, then resolves every container whose
    /// key is still unknown.
    pub async fn refresh(self: &Arc<Self>, current: &[ContainerDescriptor]) {
        self.evict_missing(current);

        let cache = Arc::clone(self);
        let resolved = self
            .fan_out
            .apply("resolve instrumentation key", current.to_vec(), move |container| {
                let cache = Arc::clone(&cache);
                async move { Ok::<_, Infallible>(cache.resolve(container).await) }
            })
            .await;
        log::debug!(
            "refreshed {} containers, {} report on their own, {} cached",
            resolved.len(),
            resolved
                .iter()
                .filter(|(_, key)| matches!(key, Some(Some(_))))
                .count(),
            self.entries.len()
        );
    }

    /// Returns the key for `id`, refreshing the whole cache first if the container has not been
    /// seen yet.
    pub async fn resolve_key(self: &Arc<Self>, id: &ContainerID) -> Option<InstrumentationKey> {
        if !self.contains(id) {
            log::debug!("container `{}` not cached yet, refreshing", id);
            match runtime::bounded(
                "list_containers",
                self.call_timeout,
                self.runtime.list_containers(),
            )
            .await
            {
                Ok(containers) => self.refresh(&containers).await,
                Err(err) => log::warn!("failed to list containers: {}", err),
            }
        }

        self.key(id)
    }

    /// Containers the collector has to report for: its own container and every container
    /// without a resolved key. Containers pending eviction are left out.
    pub fn reported_by_collector(&self, own_id: Option<&ContainerID>) -> Vec<ContainerDescriptor> {
        self.entries
            .iter()
            .filter(|entry| {
                entry.unregistered_at.is_none()
                    && (!entry.is_resolved() || Some(entry.key()) == own_id)
            })
            .map(|entry| entry.last_descriptor.clone())
            .collect()
    }

    /// Marks containers missing from `current` and drops those missing for longer than the
    /// grace period.
    fn evict_missing(&self, current: &[ContainerDescriptor]) {
        let present: HashSet<&ContainerID> = current.iter().map(|container| &container.id).collect();
        let now = Instant::now();
        let grace_period = self.policy.grace_period;
        self.entries.retain(|id, entry| {
            if present.contains(id) {
                return true;
            }
            match entry.unregistered_at {
                None => {
                    log::debug!("container `{}` missing from listing", id);
                    entry.unregistered_at = Some(now);
                    true
                }
                Some(since) if now.duration_since(since) < grace_period => true,
                Some(_) => {
                    log::debug!("evicting container `{}`", id);
                    false
                }
            }
        });
    }

    async fn resolve(&self, container: ContainerDescriptor) -> Option<InstrumentationKey> {
        match self.register(container.clone()) {
            Registration::Resolved(key) => Some(key),
            Registration::GivenUp | Registration::Pending => None,
            Registration::Retry => {
                let key = self.discovery.discover(&self.runtime, &container).await;
                self.store(&container.id, key)
            }
            Registration::New => {
                let attempts = self.policy.initial_attempts.max(1);
                for attempt in 1..=attempts {
                    if let Some(key) = self.discovery.discover(&self.runtime, &container).await {
                        log::info!(
                            "container `{}` reports with its own instrumentation key",
                            container.id
                        );
                        return self.store(&container.id, Some(key));
                    }
                    if attempt < attempts {
                        tokio::time::sleep(self.policy.retry_delay).await;
                    }
                }
                log::debug!(
                    "no instrumentation key for container `{}` after {} attempts",
                    container.id,
                    attempts
                );
                self.store(&container.id, None)
            }
        }
    }

    fn register(&self, container: ContainerDescriptor) -> Registration {
        match self.entries.entry(container.id.clone()) {
            Entry::Vacant(vacant) => {
                vacant.insert(ResolutionEntry::new(container));
                Registration::New
            }
            Entry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                entry.last_descriptor = container;
                entry.unregistered_at = None;
                match &entry.instrumentation_key {
                    Some(key) => Registration::Resolved(key.clone()),
                    None if entry.initializing => Registration::Pending,
                    None if entry.registered_at.elapsed() < self.policy.give_up_after => {
                        Registration::Retry
                    }
                    None => Registration::GivenUp,
                }
            }
        }
    }

    /// Records the outcome of a discovery attempt and ends the first-sighting loop. A resolved
    /// key is never replaced, so the returned value is whatever the entry holds afterwards.
    fn store(
        &self,
        id: &ContainerID,
        key: Option<InstrumentationKey>,
    ) -> Option<InstrumentationKey> {
        match self.entries.get_mut(id) {
            Some(mut entry) => {
                entry.initializing = false;
                if entry.instrumentation_key.is_none() {
                    entry.instrumentation_key = key;
                }
                entry.instrumentation_key.clone()
            }
            None => key,
        }
    }
}
