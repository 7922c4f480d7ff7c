//! [`ContainerRuntime`] backed by the Docker Engine API on a unix socket.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use bollard::Docker;
use bollard::container::{InspectContainerOptions, ListContainersOptions, LogOutput, StatsOptions};
use bollard::exec::{CreateExecOptions, StartExecResults};
use bollard::system::EventsOptions;
use futures::{Stream, StreamExt, TryStreamExt};
use tokio::sync::mpsc;

use super::{
    ContainerRuntime, EVENT_CHANNEL_CAPACITY, Error, InspectionRecord, Result, RuntimeEvent,
    StatsSample,
};
use crate::container::{ContainerDescriptor, ContainerID};

mod payload;

#[derive(Debug, Clone)]
pub struct DockerRuntime {
    docker: Docker,
    cgroup_path: PathBuf,
    mountinfo_path: PathBuf,
}

impl DockerRuntime {
    /// Creates a client for the daemon listening on `socket_path`.
    ///
    /// No request is made yet; an unreachable daemon shows up on the first call.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connect`] if the client cannot be set up for the socket.
    pub fn new(socket_path: impl AsRef<Path>, call_timeout: Duration) -> Result<Self> {
        let socket_path = socket_path.as_ref();
        let docker = Docker::connect_with_unix(
            &socket_path.to_string_lossy(),
            call_timeout.as_secs().max(1),
            bollard::API_DEFAULT_VERSION,
        )
        .map_err(|source| Error::Connect {
            path: socket_path.to_path_buf(),
            source,
        })?;

        Ok(Self {
            docker,
            cgroup_path: PathBuf::from("/proc/self/cgroup"),
            mountinfo_path: PathBuf::from("/proc/self/mountinfo"),
        })
    }
}

impl ContainerRuntime for DockerRuntime {
    async fn list_containers(&self) -> Result<Vec<ContainerDescriptor>> {
        let summaries = self
            .docker
            .list_containers(None::<ListContainersOptions<String>>)
            .await
            .map_err(Error::docker("list_containers"))?;

        Ok(summaries
            .into_iter()
            .filter_map(|summary| match ContainerDescriptor::try_from(summary) {
                Ok(descriptor) => Some(descriptor),
                Err(err) => {
                    log::warn!("skipping listed container: {}", err);
                    None
                }
            })
            .collect())
    }

    async fn host_name(&self) -> Result<String> {
        let info = self
            .docker
            .info()
            .await
            .map_err(Error::docker("host_name"))?;
        info.name.ok_or_else(|| Error::Payload {
            operation: "host_name",
            message: "system info carries no name".to_owned(),
        })
    }

    async fn stats(
        &self,
        container: &ContainerDescriptor,
        samples: usize,
    ) -> Result<Vec<StatsSample>> {
        let stream = self
            .docker
            .stats(
                container.id.as_str(),
                Some(StatsOptions {
                    stream: true,
                    one_shot: false,
                }),
            )
            .map_ok(StatsSample::from);
        let out = take_samples(stream, samples).await?;
        log::trace!(
            "read {} stats samples for container `{}`",
            out.len(),
            container.id
        );

        Ok(out)
    }

    async fn events(&self) -> Result<mpsc::Receiver<RuntimeEvent>> {
        let options = EventsOptions::<String> {
            filters: HashMap::from([("type".to_owned(), vec!["container".to_owned()])]),
            ..Default::default()
        };
        // the event stream only reports a dead daemon once polled
        self.docker.ping().await.map_err(Error::docker("events"))?;
        let stream = self
            .docker
            .events(Some(options))
            .map_ok(RuntimeEvent::from);

        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        tokio::spawn(forward_events(stream, tx));
        Ok(rx)
    }

    async fn inspect(&self, id: &ContainerID) -> Result<InspectionRecord> {
        let response = self
            .docker
            .inspect_container(id.as_str(), None::<InspectContainerOptions>)
            .await
            .map_err(Error::docker("inspect"))?;

        InspectionRecord::try_from(response).map_err(|err| Error::Payload {
            operation: "inspect",
            message: err.to_string(),
        })
    }

    async fn exec(&self, container: &ContainerDescriptor, command: &[&str]) -> Result<String> {
        let created = self
            .docker
            .create_exec(
                container.id.as_str(),
                CreateExecOptions {
                    cmd: Some(command.iter().map(|arg| (*arg).to_owned()).collect()),
                    attach_stdout: Some(true),
                    attach_stderr: Some(true),
                    ..Default::default()
                },
            )
            .await
            .map_err(Error::docker("create_exec"))?;

        let stdout = match self
            .docker
            .start_exec(&created.id, None)
            .await
            .map_err(Error::docker("start_exec"))?
        {
            StartExecResults::Attached { output, .. } => collect_stdout(output).await?,
            StartExecResults::Detached => String::new(),
        };

        let inspect = self
            .docker
            .inspect_exec(&created.id)
            .await
            .map_err(Error::docker("inspect_exec"))?;
        exec_result(container, inspect.exit_code, stdout)
    }

    async fn own_container_id(&self) -> Result<Option<ContainerID>> {
        super::own_container_id_from(&self.cgroup_path, &self.mountinfo_path).await
    }
}

/// Reads at most `samples` items, fewer if the stream ends first.
async fn take_samples<T, S>(stream: S, samples: usize) -> Result<Vec<T>>
where
    S: Stream<Item = std::result::Result<T, bollard::errors::Error>>,
{
    stream
        .take(samples)
        .map_err(Error::docker("stats"))
        .try_collect()
        .await
}

/// Forwards events until the stream ends, fails, or the receiver goes away. Events that cannot
/// be decoded are skipped.
async fn forward_events<S>(stream: S, tx: mpsc::Sender<RuntimeEvent>)
where
    S: Stream<Item = std::result::Result<RuntimeEvent, bollard::errors::Error>>,
{
    futures::pin_mut!(stream);
    loop {
        match stream.next().await {
            Some(Ok(event)) => {
                if tx.send(event).await.is_err() {
                    log::debug!("event receiver dropped, closing subscription");
                    break;
                }
            }
            Some(Err(err)) if is_decode_failure(&err) => {
                log::warn!("skipping undecodable event: {}", err);
            }
            Some(Err(err)) => {
                log::error!("event stream failed: {}", err);
                break;
            }
            None => {
                log::info!("runtime closed the event stream");
                break;
            }
        }
    }
}

fn is_decode_failure(err: &bollard::errors::Error) -> bool {
    matches!(
        err,
        bollard::errors::Error::JsonDataError { .. } | bollard::errors::Error::JsonSerdeError { .. }
    )
}

/// Concatenates the standard output frames of an attached exec; standard error is dropped.
async fn collect_stdout<S>(output: S) -> Result<String>
where
    S: Stream<Item = std::result::Result<LogOutput, bollard::errors::Error>>,
{
    futures::pin_mut!(output);
    let mut stdout = Vec::new();
    while let Some(frame) = output.next().await {
        if let LogOutput::StdOut { message } = frame.map_err(Error::docker("start_exec"))? {
            stdout.extend_from_slice(&message);
        }
    }

    Ok(String::from_utf8_lossy(&stdout).into_owned())
}

fn exec_result(
    container: &ContainerDescriptor,
    exit_code: Option<i64>,
    stdout: String,
) -> Result<String> {
    match exit_code {
        Some(0) | None => Ok(stdout),
        Some(exit_code) => Err(Error::ExecFailed {
            container_id: container.id.to_string(),
            exit_code,
        }),
    }
}
