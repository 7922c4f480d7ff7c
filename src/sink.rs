//! Destinations for collected telemetry.

use std::io::Write;

use tokio::sync::mpsc;

use crate::convert::{Metric, Properties};

/// One telemetry item handed to a [`Sink`].
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(untagged)]
pub enum Record {
    Metric {
        metric: Metric,
        properties: Properties,
    },
    Event {
        name: String,
        ikey: String,
        properties: Properties,
    },
}

/// Fire-and-forget consumer of telemetry records.
pub trait Sink: Send + Sync + 'static {
    fn emit(&self, record: Record);
}

/// Writes every record as one JSON object per line to stdout.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutSink;

impl Sink for StdoutSink {
    fn emit(&self, record: Record) {
        let line = match serde_json::to_string(&record) {
            Ok(line) => line,
            Err(err) => {
                log::error!("failed to serialize record: {}", err);
                return;
            }
        };
        let mut stdout = std::io::stdout().lock();
        if let Err(err) = writeln!(stdout, "{line}").and_then(|_| stdout.flush()) {
            log::error!("failed to write record to stdout: {}", err);
        }
    }
}

/// Forwards records to an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<Record>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Record>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Sink for ChannelSink {
    fn emit(&self, record: Record) {
        if self.tx.send(record).is_err() {
            log::debug!("record dropped, channel receiver is gone");
        }
    }
}
