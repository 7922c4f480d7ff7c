//! Conversions from Docker Engine API models to the collector's view of them.

use bollard::container::Stats;
use bollard::models::{ContainerInspectResponse, ContainerSummary, EventMessage};

use crate::container::{self, ContainerDescriptor, ContainerID};
use crate::runtime::{
    BlkioEntry, BlkioStats, ContainerConfig, ContainerState, CpuStats, CpuUsage,
    InspectionRecord, MemoryStats, NetworkStats, RuntimeEvent, StatsSample,
};

fn container_id(id: Option<String>) -> container::Result<ContainerID> {
    ContainerID::new(id.unwrap_or_default())
}

impl TryFrom<ContainerSummary> for ContainerDescriptor {
    type Error = container::Error;

    fn try_from(summary: ContainerSummary) -> container::Result<Self> {
        let mut descriptor = ContainerDescriptor::new(container_id(summary.id)?);
        descriptor.names = summary.names.unwrap_or_default();
        descriptor.image = summary.image.unwrap_or_default();
        descriptor.image_id = summary.image_id.unwrap_or_default();
        descriptor.created = summary.created.unwrap_or_default();
        descriptor.status = summary.status.unwrap_or_default();
        descriptor.labels = summary.labels.unwrap_or_default();
        Ok(descriptor)
    }
}

impl TryFrom<ContainerInspectResponse> for InspectionRecord {
    type Error = container::Error;

    fn try_from(inspect: ContainerInspectResponse) -> container::Result<Self> {
        let state = inspect.state.unwrap_or_default();
        Ok(Self {
            id: container_id(inspect.id)?,
            name: inspect.name.unwrap_or_default(),
            created: inspect.created.unwrap_or_default(),
            image: inspect.image.unwrap_or_default(),
            restart_count: inspect.restart_count.unwrap_or_default(),
            state: ContainerState {
                exit_code: state.exit_code.unwrap_or_default(),
                error: state.error,
                started_at: state.started_at.unwrap_or_default(),
                finished_at: state.finished_at.unwrap_or_default(),
            },
            config: inspect.config.map(|config| ContainerConfig {
                image: config.image.unwrap_or_default(),
            }),
        })
    }
}

impl From<EventMessage> for RuntimeEvent {
    fn from(message: EventMessage) -> Self {
        let actor = message.actor.unwrap_or_default();
        Self {
            action: message.action,
            actor_id: actor.id,
            attributes: actor.attributes.unwrap_or_default(),
            time: message.time.unwrap_or_default(),
        }
    }
}

impl From<Stats> for StatsSample {
    fn from(stats: Stats) -> Self {
        let cpu = stats.cpu_stats;
        Self {
            read: stats.read,
            cpu_stats: CpuStats {
                cpu_usage: CpuUsage {
                    total_usage: cpu.cpu_usage.total_usage,
                    percpu_usage: cpu.cpu_usage.percpu_usage.unwrap_or_default(),
                },
                system_cpu_usage: cpu.system_cpu_usage,
                online_cpus: cpu
                    .online_cpus
                    .and_then(|cpus| u32::try_from(cpus).ok())
                    .filter(|cpus| *cpus > 0),
            },
            memory_stats: MemoryStats {
                usage: stats.memory_stats.usage,
                limit: stats.memory_stats.limit,
            },
            networks: stats
                .networks
                .unwrap_or_default()
                .into_iter()
                .map(|(interface, net)| {
                    (
                        interface,
                        NetworkStats {
                            rx_bytes: net.rx_bytes,
                            tx_bytes: net.tx_bytes,
                        },
                    )
                })
                .collect(),
            blkio_stats: BlkioStats {
                io_service_bytes_recursive: stats
                    .blkio_stats
                    .io_service_bytes_recursive
                    .unwrap_or_default()
                    .into_iter()
                    .map(|entry| BlkioEntry {
                        op: entry.op,
                        value: entry.value,
                    })
                    .collect(),
            },
        }
    }
}
