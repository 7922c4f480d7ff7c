use std::sync::Arc;
use std::time::Duration;

use crate::container::{ContainerDescriptor, InstrumentationKey};
use crate::runtime::{self, ContainerRuntime};

/// Reads the discovery file inside a container to find its instrumentation key.
#[derive(Debug, Clone)]
pub struct KeyDiscovery {
    command: String,
    timeout: Duration,
}

impl KeyDiscovery {
    pub fn new(sdk_file: &str, timeout: Duration) -> Self {
        let sdk_file = shell_quote(sdk_file);
        Self {
            command: format!("[ -f {sdk_file} ] && cat {sdk_file}"),
            timeout,
        }
    }

    /// Makes a single discovery attempt.
    ///
    /// Any failure to reach the container or run the command counts as "no key", as does a
    /// missing or malformed file.
    pub async fn discover<R: ContainerRuntime>(
        &self,
        runtime: &Arc<R>,
        container: &ContainerDescriptor,
    ) -> Option<InstrumentationKey> {
        let command = ["/bin/sh", "-c", self.command.as_str()];
        match runtime::bounded("exec", self.timeout, runtime.exec(container, &command)).await {
            Ok(content) => InstrumentationKey::from_discovery_file(&content),
            Err(err) => {
                log::debug!(
                    "no discovery file in container `{}`: {}",
                    container.id,
                    err
                );
                None
            }
        }
    }
}

/// Wraps `arg` in single quotes so the shell takes it as one literal word.
fn shell_quote(arg: &str) -> String {
    format!("'{}'", arg.replace('\'', r"'\''"))
}
