//! Turns consecutive stats samples into aggregated metrics.
//!
//! Rates (CPU share, network and block I/O throughput) are computed for every pair of
//! consecutive samples; gauges (memory) are taken from every sample after the first. Each
//! series is then folded into a single [`Metric`].

use chrono::DateTime;

use crate::runtime::StatsSample;

pub const CPU_USAGE_PERCENT: &str = "docker-cpu-usage-percent";
pub const MEMORY_USAGE_BYTES: &str = "docker-memory-usage-bytes";
pub const MEMORY_USAGE_PERCENT: &str = "docker-memory-usage-percent";
pub const NETWORK_RX_BYTES_PER_SECOND: &str = "docker-network-rx-bytes-per-second";
pub const NETWORK_TX_BYTES_PER_SECOND: &str = "docker-network-tx-bytes-per-second";
pub const BLKIO_READ_BYTES_PER_SECOND: &str = "docker-blkio-read-bytes-per-second";
pub const BLKIO_WRITE_BYTES_PER_SECOND: &str = "docker-blkio-write-bytes-per-second";

/// An aggregated metric over a short series of observations.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Metric {
    pub name: String,
    /// Mean of the observations.
    pub value: f64,
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub std_dev: f64,
}

impl Metric {
    /// Folds the observations into a metric; `None` if there are none.
    pub fn aggregate(name: &str, values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let count = values.len();
        let mean = values.iter().sum::<f64>() / count as f64;
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / count as f64;

        Some(Self {
            name: name.to_owned(),
            value: mean,
            count,
            min: values.iter().copied().fold(f64::INFINITY, f64::min),
            max: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            std_dev: variance.sqrt(),
        })
    }
}

#[derive(Debug, Default)]
struct Series {
    cpu_percent: Vec<f64>,
    memory_bytes: Vec<f64>,
    memory_percent: Vec<f64>,
    rx_rate: Vec<f64>,
    tx_rate: Vec<f64>,
    read_rate: Vec<f64>,
    write_rate: Vec<f64>,
}

/// Converts a sample series into metrics. Fewer than two samples produce nothing.
pub fn stats_to_metrics(samples: &[StatsSample]) -> Vec<Metric> {
    if samples.len() < 2 {
        return Vec::new();
    }

    let mut series = Series::default();
    for pair in samples.windows(2) {
        let (prev, cur) = (&pair[0], &pair[1]);

        if let Some(percent) = cpu_percent(prev, cur) {
            series.cpu_percent.push(percent);
        }

        if let Some(usage) = cur.memory_stats.usage {
            series.memory_bytes.push(usage as f64);
            if let Some(limit) = cur.memory_stats.limit.filter(|limit| *limit > 0) {
                series.memory_percent.push(usage as f64 / limit as f64 * 100.0);
            }
        }

        let Some(seconds) = seconds_between(prev, cur) else {
            continue;
        };
        let (prev_rx, prev_tx) = prev.network_bytes();
        let (rx, tx) = cur.network_bytes();
        series.rx_rate.push(rx.saturating_sub(prev_rx) as f64 / seconds);
        series.tx_rate.push(tx.saturating_sub(prev_tx) as f64 / seconds);

        let (prev_read, prev_write) = prev.blkio_bytes();
        let (read, write) = cur.blkio_bytes();
        series.read_rate.push(read.saturating_sub(prev_read) as f64 / seconds);
        series.write_rate.push(write.saturating_sub(prev_write) as f64 / seconds);
    }

    [
        (CPU_USAGE_PERCENT, &series.cpu_percent),
        (MEMORY_USAGE_BYTES, &series.memory_bytes),
        (MEMORY_USAGE_PERCENT, &series.memory_percent),
        (NETWORK_RX_BYTES_PER_SECOND, &series.rx_rate),
        (NETWORK_TX_BYTES_PER_SECOND, &series.tx_rate),
        (BLKIO_READ_BYTES_PER_SECOND, &series.read_rate),
        (BLKIO_WRITE_BYTES_PER_SECOND, &series.write_rate),
    ]
    .into_iter()
    .filter_map(|(name, values)| Metric::aggregate(name, values))
    .collect()
}

fn cpu_percent(prev: &StatsSample, cur: &StatsSample) -> Option<f64> {
    let cpu_delta = cur
        .cpu_stats
        .cpu_usage
        .total_usage
        .checked_sub(prev.cpu_stats.cpu_usage.total_usage)?;
    let system_delta = cur
        .cpu_stats
        .system_cpu_usage?
        .checked_sub(prev.cpu_stats.system_cpu_usage?)?;
    if system_delta == 0 {
        return None;
    }

    Some(cpu_delta as f64 / system_delta as f64 * f64::from(cur.cpu_count()) * 100.0)
}

fn seconds_between(prev: &StatsSample, cur: &StatsSample) -> Option<f64> {
    let prev = DateTime::parse_from_rfc3339(&prev.read).ok()?;
    let cur = DateTime::parse_from_rfc3339(&cur.read).ok()?;
    let seconds = (cur - prev).num_milliseconds() as f64 / 1000.0;

    (seconds > 0.0).then_some(seconds)
}
