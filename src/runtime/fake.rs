//! Scripted in-memory runtime for tests.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::mpsc;

use super::{ContainerRuntime, Error, InspectionRecord, Result, RuntimeEvent, StatsSample};
use crate::container::{ContainerDescriptor, ContainerID};

#[derive(Debug, Default)]
pub(crate) struct FakeRuntime {
    containers: Mutex<Vec<ContainerDescriptor>>,
    discovery_files: Mutex<HashMap<ContainerID, String>>,
    exec_calls: Mutex<HashMap<ContainerID, usize>>,
    stats: Mutex<HashMap<ContainerID, Vec<StatsSample>>>,
    failing_stats: Mutex<HashSet<ContainerID>>,
    stats_calls: Mutex<Vec<ContainerID>>,
    inspections: Mutex<HashMap<ContainerID, InspectionRecord>>,
    events: Mutex<Option<mpsc::Receiver<RuntimeEvent>>>,
    own_id: Mutex<Option<ContainerID>>,
    list_calls: AtomicUsize,
    own_id_calls: AtomicUsize,
}

pub(crate) fn id(raw: &str) -> ContainerID {
    ContainerID::new(raw).unwrap()
}

pub(crate) fn descriptor(raw: &str) -> ContainerDescriptor {
    let mut descriptor = ContainerDescriptor::new(id(raw));
    descriptor.names = vec![format!("/{raw}-name")];
    descriptor.image = format!("{raw}-image");
    descriptor
}

impl FakeRuntime {
    pub fn set_containers(&self, ids: &[&str]) {
        *self.containers.lock().unwrap() = ids.iter().map(|raw| descriptor(raw)).collect();
    }

    pub fn set_discovery_file(&self, raw: &str, content: &str) {
        self.discovery_files
            .lock()
            .unwrap()
            .insert(id(raw), content.to_owned());
    }

    pub fn exec_calls(&self, raw: &str) -> usize {
        self.exec_calls
            .lock()
            .unwrap()
            .get(&id(raw))
            .copied()
            .unwrap_or_default()
    }

    pub fn set_stats(&self, raw: &str, samples: Vec<StatsSample>) {
        self.stats.lock().unwrap().insert(id(raw), samples);
    }

    pub fn fail_stats(&self, raw: &str) {
        self.failing_stats.lock().unwrap().insert(id(raw));
    }

    pub fn stats_calls(&self) -> Vec<ContainerID> {
        self.stats_calls.lock().unwrap().clone()
    }

    pub fn set_inspection(&self, record: InspectionRecord) {
        self.inspections
            .lock()
            .unwrap()
            .insert(record.id.clone(), record);
    }

    pub fn set_own_id(&self, raw: &str) {
        *self.own_id.lock().unwrap() = Some(id(raw));
    }

    pub fn own_id_calls(&self) -> usize {
        self.own_id_calls.load(Ordering::SeqCst)
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    /// Installs a fresh event stream and returns its sending side.
    pub fn event_sender(&self) -> mpsc::Sender<RuntimeEvent> {
        let (tx, rx) = mpsc::channel(16);
        *self.events.lock().unwrap() = Some(rx);
        tx
    }
}

fn not_found(operation: &'static str) -> Error {
    Error::Status {
        operation,
        status: 404,
        message: "no such container".to_owned(),
    }
}

impl ContainerRuntime for FakeRuntime {
    async fn list_containers(&self) -> Result<Vec<ContainerDescriptor>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.containers.lock().unwrap().clone())
    }

    async fn host_name(&self) -> Result<String> {
        Ok("test-host".to_owned())
    }

    async fn stats(
        &self,
        container: &ContainerDescriptor,
        _samples: usize,
    ) -> Result<Vec<StatsSample>> {
        self.stats_calls.lock().unwrap().push(container.id.clone());
        if self.failing_stats.lock().unwrap().contains(&container.id) {
            return Err(not_found("stats"));
        }
        Ok(self
            .stats
            .lock()
            .unwrap()
            .get(&container.id)
            .cloned()
            .unwrap_or_default())
    }

    async fn events(&self) -> Result<mpsc::Receiver<RuntimeEvent>> {
        self.events
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| not_found("events"))
    }

    async fn inspect(&self, id: &ContainerID) -> Result<InspectionRecord> {
        self.inspections
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| not_found("inspect"))
    }

    async fn exec(&self, container: &ContainerDescriptor, _command: &[&str]) -> Result<String> {
        *self
            .exec_calls
            .lock()
            .unwrap()
            .entry(container.id.clone())
            .or_default() += 1;
        self.discovery_files
            .lock()
            .unwrap()
            .get(&container.id)
            .cloned()
            .ok_or_else(|| Error::ExecFailed {
                container_id: container.id.to_string(),
                exit_code: 1,
            })
    }

    async fn own_container_id(&self) -> Result<Option<ContainerID>> {
        self.own_id_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.own_id.lock().unwrap().clone())
    }
}
