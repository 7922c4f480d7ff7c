use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

mod error;

pub use error::{Error, Result};

/// The maximum allowed length for a [`ContainerID`].
const CONTAINER_ID_MAX_LEN: usize = 255;

/// A validated container identifier as reported by the container runtime.
///
/// # Examples
///
/// ```
/// # use container_telemetry::container::{ContainerID, Error};
/// let raw_id = "abc123abc123abc123abc123abc123abc123abc123abc123abc123abc123abcd";
/// let container_id = ContainerID::new(raw_id).unwrap();
/// assert_eq!(container_id.as_ref(), "abc123abc123abc123abc123abc123abc123abc123abc123abc123abc123abcd");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContainerID(Arc<str>);

impl ContainerID {
    /// Creates a new `ContainerID` from the given raw id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidContainerID`] if the input is empty or its length exceeds
    /// [`CONTAINER_ID_MAX_LEN`].
    ///
    /// # Examples
    ///
    /// ```
    /// # use container_telemetry::container::{ContainerID, Error};
    /// assert!(ContainerID::new("abcdef012345").is_ok());
    /// assert!(ContainerID::new("").is_err());
    /// ```
    pub fn new(src: impl AsRef<str>) -> Result<Self> {
        let src = src.as_ref();
        if src.is_empty() || src.len() > CONTAINER_ID_MAX_LEN {
            return Err(Error::InvalidContainerID(src.to_owned()));
        }

        Ok(Self(src.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for ContainerID {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for ContainerID {
    type Error = Error;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ContainerID> for String {
    fn from(value: ContainerID) -> Self {
        value.0.as_ref().to_owned()
    }
}

impl AsRef<str> for ContainerID {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for ContainerID {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContainerID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Instrumentation key a container uses to report its own telemetry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InstrumentationKey(Arc<str>);

impl InstrumentationKey {
    /// Extracts the key from the contents of a discovery file.
    ///
    /// The file is expected to hold a single `name=value` line. The key is the text between the
    /// first `=` and the next one (or the end of the content). Content without a `=`, or with an
    /// empty value, yields `None`.
    ///
    /// # Examples
    ///
    /// ```
    /// # use container_telemetry::container::InstrumentationKey;
    /// let key = InstrumentationKey::from_discovery_file("InstrumentationKey=1234\n").unwrap();
    /// assert_eq!(key.as_str(), "1234");
    /// assert!(InstrumentationKey::from_discovery_file("no separator").is_none());
    /// ```
    pub fn from_discovery_file(content: &str) -> Option<Self> {
        let content = content.trim();
        if content.is_empty() {
            return None;
        }
        let value = content.split('=').nth(1)?.trim();
        if value.is_empty() {
            return None;
        }

        Some(Self(value.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InstrumentationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A running container as listed by the runtime.
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerDescriptor {
    pub id: ContainerID,
    pub names: Vec<String>,
    pub image: String,
    pub image_id: String,
    /// Unix timestamp in seconds.
    pub created: i64,
    pub status: String,
    pub labels: HashMap<String, String>,
}

impl ContainerDescriptor {
    /// Creates a descriptor carrying only an id, mostly useful for tests and fakes.
    pub fn new(id: ContainerID) -> Self {
        Self {
            id,
            names: Vec::default(),
            image: String::new(),
            image_id: String::new(),
            created: 0,
            status: String::new(),
            labels: HashMap::default(),
        }
    }

    /// Returns the primary container name without the leading `/` the runtime adds.
    pub fn name(&self) -> &str {
        self.names
            .first()
            .map(|name| name.trim_start_matches('/'))
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_container_id_rejects_empty_and_oversized() {
        assert!(matches!(
            ContainerID::new(""),
            Err(Error::InvalidContainerID(_))
        ));
        let long = "a".repeat(CONTAINER_ID_MAX_LEN + 1);
        assert!(matches!(
            ContainerID::new(&long),
            Err(Error::InvalidContainerID(_))
        ));
    }

    #[test]
    fn test_key_from_discovery_file() {
        let key = InstrumentationKey::from_discovery_file("ikey=abc-123\n").unwrap();
        assert_eq!(key.as_str(), "abc-123");

        let key = InstrumentationKey::from_discovery_file("ikey=abc=def").unwrap();
        assert_eq!(key.as_str(), "abc");
    }

    #[test]
    fn test_malformed_discovery_file_is_absent() {
        assert!(InstrumentationKey::from_discovery_file("").is_none());
        assert!(InstrumentationKey::from_discovery_file("   \n").is_none());
        assert!(InstrumentationKey::from_discovery_file("ikey").is_none());
        assert!(InstrumentationKey::from_discovery_file("ikey=").is_none());
    }
}
