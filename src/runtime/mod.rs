//! The container runtime as seen by the collector.
//!
//! [`ContainerRuntime`] is the narrow set of capabilities the collection core consumes. The
//! [`docker`] module implements it against the Docker Engine API; tests substitute in-memory
//! fakes.

use std::future::Future;
use std::time::Duration;

use crate::container::{ContainerDescriptor, ContainerID};

pub mod docker;
mod error;
mod models;
mod own_id;

pub use error::{Error, Result};
pub use models::{
    BlkioEntry, BlkioStats, ContainerConfig, ContainerState, CpuStats, CpuUsage, InspectionRecord,
    MemoryStats, NetworkStats, RuntimeEvent, StatsSample,
};
pub use own_id::{find_container_id, own_container_id_from};

/// Capacity of the channel that carries runtime events to the event loop.
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

pub trait ContainerRuntime: Send + Sync + 'static {
    /// Lists the containers currently running.
    fn list_containers(&self) -> impl Future<Output = Result<Vec<ContainerDescriptor>>> + Send;

    /// Returns the name identifying the host the runtime runs on.
    fn host_name(&self) -> impl Future<Output = Result<String>> + Send;

    /// Reads up to `samples` consecutive stats samples for a container.
    ///
    /// May return fewer samples than requested if the stream ends early.
    fn stats(
        &self,
        container: &ContainerDescriptor,
        samples: usize,
    ) -> impl Future<Output = Result<Vec<StatsSample>>> + Send;

    /// Subscribes to container lifecycle events.
    ///
    /// The returned receiver is a live, non-restartable stream. It ends when the runtime closes
    /// the subscription.
    fn events(
        &self,
    ) -> impl Future<Output = Result<tokio::sync::mpsc::Receiver<RuntimeEvent>>> + Send;

    fn inspect(&self, id: &ContainerID) -> impl Future<Output = Result<InspectionRecord>> + Send;

    /// Runs a command inside a container and returns its standard output.
    ///
    /// # Errors
    ///
    /// Fails when the container cannot be reached or the command exits unsuccessfully.
    fn exec(
        &self,
        container: &ContainerDescriptor,
        command: &[&str],
    ) -> impl Future<Output = Result<String>> + Send;

    /// Returns the id of the container this process runs in, or `None` on the host.
    fn own_container_id(&self) -> impl Future<Output = Result<Option<ContainerID>>> + Send;
}

/// Bounds a runtime call with a timeout; an elapsed timeout is reported as [`Error::Timeout`].
pub async fn bounded<T>(
    operation: &'static str,
    timeout: Duration,
    call: impl Future<Output = Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(Error::Timeout { operation, timeout }),
    }
}

#[cfg(test)]
pub(crate) mod fake;
