use tokio::time::Instant;

use crate::container::{ContainerDescriptor, InstrumentationKey};

/// What the cache knows about one container.
#[derive(Debug, Clone)]
pub struct ResolutionEntry {
    /// Set once resolved and never cleared afterwards.
    pub instrumentation_key: Option<InstrumentationKey>,
    pub registered_at: Instant,
    /// When the container was first found missing from the listing.
    pub unregistered_at: Option<Instant>,
    pub last_descriptor: ContainerDescriptor,
    /// The first-sighting discovery loop is still running.
    pub initializing: bool,
}

impl ResolutionEntry {
    pub fn new(descriptor: ContainerDescriptor) -> Self {
        Self {
            instrumentation_key: None,
            registered_at: Instant::now(),
            unregistered_at: None,
            last_descriptor: descriptor,
            initializing: true,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.instrumentation_key.is_some()
    }
}
