//! Turns runtime payloads into metrics and property maps.

use std::collections::BTreeMap;

use crate::container::ContainerDescriptor;
use crate::runtime::{InspectionRecord, StatsSample};

mod metrics;
mod properties;

pub use metrics::{
    BLKIO_READ_BYTES_PER_SECOND, BLKIO_WRITE_BYTES_PER_SECOND, CPU_USAGE_PERCENT,
    MEMORY_USAGE_BYTES, MEMORY_USAGE_PERCENT, Metric, NETWORK_RX_BYTES_PER_SECOND,
    NETWORK_TX_BYTES_PER_SECOND,
};
pub use properties::{CONTAINER_ID, CONTAINER_NAME, HOST, IMAGE};

/// Properties attached to every record. Ordered so serialized output is stable.
pub type Properties = BTreeMap<String, String>;

pub trait Conversion: Send + Sync + 'static {
    fn stats_to_metrics(&self, samples: &[StatsSample]) -> Vec<Metric>;

    fn properties_from_container(&self, container: &ContainerDescriptor, host: &str)
    -> Properties;

    fn properties_from_inspection(&self, inspection: &InspectionRecord, host: &str)
    -> Properties;
}

/// Conversion for Docker Engine payloads.
#[derive(Debug, Default, Clone, Copy)]
pub struct DockerConversion;

impl Conversion for DockerConversion {
    fn stats_to_metrics(&self, samples: &[StatsSample]) -> Vec<Metric> {
        metrics::stats_to_metrics(samples)
    }

    fn properties_from_container(
        &self,
        container: &ContainerDescriptor,
        host: &str,
    ) -> Properties {
        properties::identity(host, &container.image, container.id.as_str(), container.name())
    }

    fn properties_from_inspection(
        &self,
        inspection: &InspectionRecord,
        host: &str,
    ) -> Properties {
        properties::identity(
            host,
            inspection.image_name(),
            inspection.id.as_str(),
            inspection.name.trim_start_matches('/'),
        )
    }
}
