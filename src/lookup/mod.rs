//! Capability and syscall name tables.
//!
//! The kernel probe counts capabilities and syscalls by number. The tables in
//! this module translate between those numbers and the canonical lowercase
//! names used in trace-files and seccomp profiles. They are loaded once from
//! the system headers and shared read-only afterwards.
mod error;
mod headers;
mod table;

use std::fmt;
use std::path::Path;

pub use error::{Error, Result};
pub use headers::{parse_capabilities, parse_syscalls};
pub use table::Lookup;

/// The kind of name stored in a [`Lookup`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameKind {
    Capability,
    Syscall,
}

impl NameKind {
    /// Normalizes a name to its canonical form.
    ///
    /// Names are lowercased; capability names additionally lose their `cap_` prefix.
    pub fn normalize(self, name: &str) -> String {
        let name = name.trim().to_ascii_lowercase();
        match self {
            NameKind::Capability => match name.strip_prefix("cap_") {
                Some(stripped) => stripped.to_owned(),
                None => name,
            },
            NameKind::Syscall => name,
        }
    }
}

impl fmt::Display for NameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NameKind::Capability => f.write_str("capability"),
            NameKind::Syscall => f.write_str("syscall"),
        }
    }
}

/// Both name tables, built once at startup.
#[derive(Debug, Clone)]
pub struct NameRegistry {
    capabilities: Lookup,
    syscalls: Lookup,
}

impl NameRegistry {
    pub fn new(capabilities: Lookup, syscalls: Lookup) -> Self {
        Self {
            capabilities,
            syscalls,
        }
    }

    /// Loads both tables from the given header files.
    ///
    /// # Errors
    ///
    /// Returns an error if a header cannot be read or defines no entries.
    pub fn from_headers(
        capability_header: impl AsRef<Path>,
        syscall_header: impl AsRef<Path>,
    ) -> Result<Self> {
        let capabilities = headers::load(NameKind::Capability, capability_header)?;
        let syscalls = headers::load(NameKind::Syscall, syscall_header)?;
        log::debug!(
            "Loaded {} capabilities and {} syscalls",
            capabilities.len(),
            syscalls.len()
        );
        Ok(Self::new(capabilities, syscalls))
    }

    pub fn capabilities(&self) -> &Lookup {
        &self.capabilities
    }

    pub fn syscalls(&self) -> &Lookup {
        &self.syscalls
    }

    pub fn get(&self, kind: NameKind) -> &Lookup {
        match kind {
            NameKind::Capability => &self.capabilities,
            NameKind::Syscall => &self.syscalls,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_capability() {
        assert_eq!(NameKind::Capability.normalize("CAP_NET_RAW"), "net_raw");
        assert_eq!(NameKind::Capability.normalize("net_raw"), "net_raw");
        assert_eq!(NameKind::Capability.normalize(" Cap_Chown "), "chown");
    }

    #[test]
    fn test_normalize_syscall() {
        assert_eq!(NameKind::Syscall.normalize("GETTIMEOFDAY"), "gettimeofday");
        assert_eq!(NameKind::Syscall.normalize("cap_capable"), "cap_capable");
    }
}
