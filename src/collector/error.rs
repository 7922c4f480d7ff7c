use crate::{config, container, runtime};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid collector configuration: {0}")]
    Config(#[from] config::Error),
    #[error(transparent)]
    Runtime(#[from] runtime::Error),
    #[error("`{status}` event carries no container id")]
    MissingContainerId { status: String },
    #[error(transparent)]
    Container(#[from] container::Error),
    #[error("collector task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
    #[error("collector is already running")]
    AlreadyStarted,
}

pub type Result<T> = std::result::Result<T, Error>;
