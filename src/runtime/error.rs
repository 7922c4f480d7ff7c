use std::path::PathBuf;
use std::time::Duration;

/// Failures reaching the container runtime or a container.
///
/// The collection core absorbs all of these per item: a failed call turns into an absent
/// result for that one container.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to connect to docker at `{path}`: {source}")]
    Connect {
        path: PathBuf,
        #[source]
        source: bollard::errors::Error,
    },
    #[error("runtime answered `{operation}` with status {status}: {message}")]
    Status {
        operation: &'static str,
        status: u16,
        message: String,
    },
    #[error("`{operation}` failed: {source}")]
    Docker {
        operation: &'static str,
        #[source]
        source: bollard::errors::Error,
    },
    #[error("runtime returned an invalid payload for `{operation}`: {message}")]
    Payload {
        operation: &'static str,
        message: String,
    },
    #[error("command in container `{container_id}` exited with code {exit_code}")]
    ExecFailed { container_id: String, exit_code: i64 },
    #[error("call to `{operation}` timed out after {timeout:?}")]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },
    #[error("failed to read `{path}`: {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    /// Maps a Docker client failure of `operation`. Error responses from the daemon keep their
    /// status code.
    pub(crate) fn docker(operation: &'static str) -> impl Fn(bollard::errors::Error) -> Self {
        move |source| match source {
            bollard::errors::Error::DockerResponseServerError {
                status_code,
                message,
            } => Self::Status {
                operation,
                status: status_code,
                message,
            },
            source => Self::Docker { operation, source },
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_response_keeps_status() {
        let err = Error::docker("inspect")(bollard::errors::Error::DockerResponseServerError {
            status_code: 404,
            message: "No such container: abc".to_owned(),
        });
        match err {
            Error::Status {
                operation,
                status,
                message,
            } => {
                assert_eq!(operation, "inspect");
                assert_eq!(status, 404);
                assert_eq!(message, "No such container: abc");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_other_client_failures_are_wrapped() {
        let decode = serde_json::from_str::<u8>("x").unwrap_err();
        let err = Error::docker("events")(bollard::errors::Error::JsonSerdeError { err: decode });
        assert!(matches!(
            err,
            Error::Docker {
                operation: "events",
                ..
            }
        ));
    }
}
