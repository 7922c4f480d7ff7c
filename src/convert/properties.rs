use super::Properties;

pub const HOST: &str = "Docker host";
pub const IMAGE: &str = "Docker image";
pub const CONTAINER_ID: &str = "Docker container id";
pub const CONTAINER_NAME: &str = "Docker container name";

pub(super) fn identity(host: &str, image: &str, id: &str, name: &str) -> Properties {
    [
        (HOST, host),
        (IMAGE, image),
        (CONTAINER_ID, id),
        (CONTAINER_NAME, name),
    ]
    .into_iter()
    .map(|(key, value)| (key.to_owned(), value.to_owned()))
    .collect()
}
