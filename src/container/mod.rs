use std::borrow::Borrow;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

mod error;

pub use error::{Error, Result};

/// The maximum allowed length for a [`ContainerID`].
const CONTAINER_ID_MAX_LEN: usize = 255;

/// Length of a full (non-abbreviated) Docker container id.
pub const CONTAINER_ID_LEN: usize = 64;

/// Length of the abbreviated container id shown by `docker ps`.
pub const CONTAINER_ID_SHORT_LEN: usize = 12;

/// An operating system process id.
pub type ProcessId = u32;

/// A container identifier.
///
/// Ids observed by the kernel probe are taken from cgroup directory names and
/// are therefore not guaranteed to be Docker ids; use
/// [`ContainerID::is_canonical`] to tell the two apart.
///
/// # Examples
///
/// ```
/// # use ctrace::container::ContainerID;
/// let raw_id = "abc123abc123abc123abc123abc123abc123abc123abc123abc123abc123abcd";
/// let container_id = ContainerID::new(raw_id).unwrap();
/// assert_eq!(container_id.short(), "abc123abc123");
/// assert!(container_id.is_canonical());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContainerID(Arc<str>);

impl ContainerID {
    /// Creates a new `ContainerID` from the given raw id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidContainerID`] if the input is empty or its length
    /// exceeds [`CONTAINER_ID_MAX_LEN`].
    pub fn new(src: impl AsRef<str>) -> Result<Self> {
        let src = src.as_ref();
        if src.is_empty() || src.len() > CONTAINER_ID_MAX_LEN {
            return Err(Error::InvalidContainerID(src.to_owned()));
        }

        Ok(Self(src.into()))
    }

    /// Decodes a NUL-terminated id as stored in the kernel tables.
    ///
    /// Bytes after the first NUL are ignored and invalid UTF-8 is replaced.
    pub fn from_nul_terminated(raw: &[u8]) -> Result<Self> {
        let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
        Self::new(String::from_utf8_lossy(&raw[..end]))
    }

    /// Returns `true` for a full 64 character lowercase hex id.
    pub fn is_canonical(&self) -> bool {
        is_canonical_id(self.0.as_bytes())
    }

    /// Returns the id abbreviated the way the Docker CLI shows it.
    pub fn short(&self) -> &str {
        match self.0.char_indices().nth(CONTAINER_ID_SHORT_LEN) {
            Some((idx, _)) => &self.0[..idx],
            None => &self.0,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Checks whether `src` looks like a full Docker container id.
pub(crate) fn is_canonical_id(src: &[u8]) -> bool {
    src.len() == CONTAINER_ID_LEN
        && src
            .iter()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(b))
}

impl FromStr for ContainerID {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::new(s)
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

#[cfg(test)]
mod tests {
    use super::*;

    const ID: &str = "0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef";

    #[test]
    fn test_new_rejects_empty_and_oversized() {
        assert!(ContainerID::new("").is_err());
        assert!(ContainerID::new("a".repeat(256)).is_err());
        assert!(ContainerID::new("a".repeat(255)).is_ok());
    }

    #[test]
    fn test_from_nul_terminated() {
        let mut raw = [0u8; 65];
        raw[..64].copy_from_slice(ID.as_bytes());
        let id = ContainerID::from_nul_terminated(&raw).unwrap();
        assert_eq!(id.as_str(), ID);

        let id = ContainerID::from_nul_terminated(b"user.slice\0garbage").unwrap();
        assert_eq!(id.as_str(), "user.slice");
        assert!(!id.is_canonical());
    }

    #[test]
    fn test_from_nul_terminated_empty() {
        assert!(ContainerID::from_nul_terminated(&[0u8; 65]).is_err());
    }

    #[test]
    fn test_canonical() {
        assert!(ContainerID::new(ID).unwrap().is_canonical());
        assert!(!ContainerID::new(ID.to_uppercase()).unwrap().is_canonical());
        assert!(!ContainerID::new(&ID[..63]).unwrap().is_canonical());
    }

    #[test]
    fn test_short() {
        assert_eq!(ContainerID::new(ID).unwrap().short(), "0123456789ab");
        assert_eq!(ContainerID::new("abc").unwrap().short(), "abc");
    }
}
