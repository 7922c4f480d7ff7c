//! The collector's view of runtime payloads.
//!
//! Only what the collection core and the conversion layer read is kept. The Docker runtime
//! maps the Engine API models onto these.

use std::collections::HashMap;

use crate::container::ContainerID;

/// A container lifecycle event from the runtime's event stream.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RuntimeEvent {
    /// What happened, e.g. `start` or `die`.
    pub action: Option<String>,
    pub actor_id: Option<String>,
    pub attributes: HashMap<String, String>,
    /// Unix timestamp in seconds.
    pub time: i64,
}

impl RuntimeEvent {
    /// Creates a container event with the given action, as the runtime would report it.
    pub fn container(action: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            action: Some(action.into()),
            actor_id: Some(id.into()),
            ..Self::default()
        }
    }

    pub fn status(&self) -> Option<&str> {
        self.action.as_deref().filter(|action| !action.is_empty())
    }

    /// Returns the id of the container the event refers to.
    pub fn container_id(&self) -> Option<&str> {
        self.actor_id.as_deref().filter(|id| !id.is_empty())
    }
}

/// Result of inspecting a single container.
#[derive(Debug, Clone, PartialEq)]
pub struct InspectionRecord {
    pub id: ContainerID,
    pub name: String,
    pub created: String,
    pub image: String,
    pub restart_count: i64,
    pub state: ContainerState,
    pub config: Option<ContainerConfig>,
}

impl InspectionRecord {
    /// Creates a record with an empty state, mostly useful for tests and fakes.
    pub fn new(id: ContainerID) -> Self {
        Self {
            id,
            name: String::new(),
            created: String::new(),
            image: String::new(),
            restart_count: 0,
            state: ContainerState::default(),
            config: None,
        }
    }

    /// Returns the image name the container was started from, falling back to the image id.
    pub fn image_name(&self) -> &str {
        self.config
            .as_ref()
            .map(|config| config.image.as_str())
            .filter(|image| !image.is_empty())
            .unwrap_or(&self.image)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContainerState {
    pub exit_code: i64,
    pub error: Option<String>,
    pub started_at: String,
    pub finished_at: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContainerConfig {
    pub image: String,
}

/// One sample from a container's stats stream.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatsSample {
    /// RFC 3339 timestamp of when the sample was read.
    pub read: String,
    pub cpu_stats: CpuStats,
    pub memory_stats: MemoryStats,
    pub networks: HashMap<String, NetworkStats>,
    pub blkio_stats: BlkioStats,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CpuStats {
    pub cpu_usage: CpuUsage,
    pub system_cpu_usage: Option<u64>,
    pub online_cpus: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CpuUsage {
    pub total_usage: u64,
    pub percpu_usage: Vec<u64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryStats {
    pub usage: Option<u64>,
    pub limit: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NetworkStats {
    pub rx_bytes: u64,
    pub tx_bytes: u64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BlkioStats {
    pub io_service_bytes_recursive: Vec<BlkioEntry>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BlkioEntry {
    pub op: String,
    pub value: u64,
}

impl StatsSample {
    /// Number of CPUs the sample was taken on.
    pub fn cpu_count(&self) -> u32 {
        self.cpu_stats.online_cpus.unwrap_or_else(|| {
            u32::try_from(self.cpu_stats.cpu_usage.percpu_usage.len())
                .unwrap_or(1)
                .max(1)
        })
    }

    /// Total bytes received and transmitted across all interfaces.
    pub fn network_bytes(&self) -> (u64, u64) {
        self.networks.values().fold((0, 0), |(rx, tx), net| {
            (rx.saturating_add(net.rx_bytes), tx.saturating_add(net.tx_bytes))
        })
    }

    /// Total bytes read from and written to block devices.
    pub fn blkio_bytes(&self) -> (u64, u64) {
        self.blkio_stats
            .io_service_bytes_recursive
            .iter()
            .fold((0, 0), |(read, write), entry| {
                if entry.op.eq_ignore_ascii_case("read") {
                    (read.saturating_add(entry.value), write)
                } else if entry.op.eq_ignore_ascii_case("write") {
                    (read, write.saturating_add(entry.value))
                } else {
                    (read, write)
                }
            })
    }
}
