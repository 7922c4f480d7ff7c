//! Per-container instrumentation key resolution.
//!
//! A container that ships its own telemetry SDK drops a discovery file holding its
//! instrumentation key. The collector must not forward metrics for such containers, and it tags
//! their lifecycle events with that key. [`ContainerStateCache`] remembers the answer for every
//! container so it is not re-derived on each cycle.
//!
//! # Resolution rules
//!
//! - A newly seen container gets up to five discovery attempts, one second apart.
//! - An unresolved container is retried once per refresh for sixty seconds after registration,
//!   then given up on until it is evicted and seen again.
//! - A resolved key is never queried again or overwritten.
//! - A container missing from the listing keeps its entry for a sixty second grace period.
mod cache;
mod discovery;
mod entry;

pub use cache::ContainerStateCache;
pub use discovery::KeyDiscovery;
pub use entry::ResolutionEntry;
