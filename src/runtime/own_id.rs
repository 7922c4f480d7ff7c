use std::path::Path;

use super::{Error, Result};
use crate::container::ContainerID;

/// Length of a full container id in hex digits.
const FULL_ID_LEN: usize = 64;

/// Determines the id of the container this process runs in.
///
/// `/proc/self/cgroup` names the container on cgroup v1 and on systemd-managed cgroup v2 hosts
/// (`/docker/<id>`, `docker-<id>.scope`). With a private cgroup namespace it only shows `0::/`,
/// so the bind mounts the runtime sets up (`/var/lib/docker/containers/<id>/hostname`, ...) in
/// `/proc/self/mountinfo` are checked next.
///
/// # Returns
///
/// * `Ok(Some(id))` if a full container id was found.
/// * `Ok(None)` if neither file names a container, i.e., the process runs on the host.
///
/// # Errors
///
/// Returns [`Error::ReadFile`] if either file cannot be read.
pub async fn own_container_id_from(
    cgroup_path: impl AsRef<Path>,
    mountinfo_path: impl AsRef<Path>,
) -> Result<Option<ContainerID>> {
    let cgroup = read(cgroup_path.as_ref()).await?;
    if let Some(id) = find_container_id(&cgroup) {
        return Ok(Some(id));
    }

    let mountinfo = read(mountinfo_path.as_ref()).await?;
    Ok(scan_lines(
        mountinfo.lines().filter(|line| line.contains("/containers/")),
    ))
}

/// Finds the first full (64 hex digit) container id in `/proc/<pid>/cgroup` style content.
///
/// # Examples
///
/// ```
/// # use container_telemetry::runtime::find_container_id;
/// let id = "0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef";
/// let cgroup = format!("0::/system.slice/docker-{id}.scope\n");
/// assert_eq!(find_container_id(&cgroup).unwrap().as_str(), id);
/// assert!(find_container_id("0::/\n").is_none());
/// ```
pub fn find_container_id(cgroup: &str) -> Option<ContainerID> {
    scan_lines(cgroup.lines())
}

fn scan_lines<'a>(lines: impl Iterator<Item = &'a str>) -> Option<ContainerID> {
    lines
        .flat_map(|line| line.split(['/', '-', '.', ':', ' ']))
        .find(|part| part.len() == FULL_ID_LEN && is_lowercase_hex(part))
        .and_then(|part| ContainerID::new(part).ok())
}

fn is_lowercase_hex(s: &str) -> bool {
    s.bytes()
        .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

async fn read(path: &Path) -> Result<String> {
    tokio::fs::read_to_string(path).await.map_err(|source| Error::ReadFile {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;

    const ID: &str = "4f1a8e0c9d2b3a4f5e6d7c8b9a0f1e2d3c4b5a6978869504f3e2d1c0b9a8f7e6";

    #[test]
    fn test_cgroup_v1_docker_path() {
        let cgroup = format!(
            "12:memory:/docker/{ID}\n11:cpu,cpuacct:/docker/{ID}\n1:name=systemd:/docker/{ID}\n"
        );
        assert_eq!(find_container_id(&cgroup).unwrap().as_str(), ID);
    }

    #[test]
    fn test_cgroup_v2_systemd_scope() {
        let cgroup = format!("0::/system.slice/docker-{ID}.scope\n");
        assert_eq!(find_container_id(&cgroup).unwrap().as_str(), ID);
    }

    #[test]
    fn test_host_cgroup_has_no_id() {
        assert!(find_container_id("0::/user.slice/user-1000.slice/session-2.scope\n").is_none());
        assert!(find_container_id("").is_none());
    }

    #[test]
    fn test_uppercase_or_short_ids_are_ignored() {
        let upper = ID.to_uppercase();
        assert!(find_container_id(&format!("0::/docker/{upper}\n")).is_none());
        assert!(find_container_id(&format!("0::/docker/{}\n", &ID[..12])).is_none());
    }

    #[tokio::test]
    async fn test_falls_back_to_mountinfo() {
        let mut cgroup = NamedTempFile::new().unwrap();
        writeln!(cgroup, "0::/").unwrap();

        let layer = "a".repeat(64);
        let mut mountinfo = NamedTempFile::new().unwrap();
        writeln!(
            mountinfo,
            "600 580 0:52 / / rw,relatime - overlay overlay rw,lowerdir=/var/lib/docker/overlay2/l/X,upperdir=/var/lib/docker/overlay2/{layer}/diff"
        )
        .unwrap();
        writeln!(
            mountinfo,
            "620 600 254:1 /var/lib/docker/containers/{ID}/hostname /etc/hostname rw,relatime - ext4 /dev/vda1 rw"
        )
        .unwrap();

        let id = own_container_id_from(cgroup.path(), mountinfo.path())
            .await
            .unwrap();
        assert_eq!(id.unwrap().as_str(), ID);
    }

    #[tokio::test]
    async fn test_host_yields_none() {
        let mut cgroup = NamedTempFile::new().unwrap();
        writeln!(cgroup, "0::/init.scope").unwrap();
        let mut mountinfo = NamedTempFile::new().unwrap();
        writeln!(
            mountinfo,
            "22 1 254:1 / / rw,relatime shared:1 - ext4 /dev/vda1 rw"
        )
        .unwrap();

        assert!(
            own_container_id_from(cgroup.path(), mountinfo.path())
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_missing_file_is_error() {
        let err = own_container_id_from("/definitely/does/not/exist", "/nope")
            .await
            .unwrap_err();
        match err {
            Error::ReadFile { path, source } => {
                assert_eq!(path, Path::new("/definitely/does/not/exist"));
                assert_eq!(source.kind(), std::io::ErrorKind::NotFound);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_cgroup_match_skips_mountinfo() {
        let mut cgroup = NamedTempFile::new().unwrap();
        writeln!(cgroup, "0::/docker/{ID}").unwrap();

        let id = own_container_id_from(cgroup.path(), "/definitely/does/not/exist")
            .await
            .unwrap();
        assert_eq!(id.unwrap().as_str(), ID);
    }
}
