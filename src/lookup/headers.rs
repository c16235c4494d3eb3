use std::io::BufRead;
use std::path::Path;

use crate::fsutil;

use super::{Error, Lookup, NameKind, Result};

const CAPABILITY_PREFIX: &str = "CAP_";
const SYSCALL_PREFIX: &str = "__NR_";

/// Parses `#define CAP_<NAME> <id>` lines from `linux/capability.h`.
///
/// Definitions whose value is not an integer literal (macros, aliases such as
/// `CAP_LAST_CAP`) are skipped.
pub fn parse_capabilities(reader: impl BufRead) -> std::io::Result<Lookup> {
    parse_defines(reader, NameKind::Capability, CAPABILITY_PREFIX, false)
}

/// Parses `#define __NR_<name> <id>` lines from `asm/unistd_64.h`.
pub fn parse_syscalls(reader: impl BufRead) -> std::io::Result<Lookup> {
    parse_defines(reader, NameKind::Syscall, SYSCALL_PREFIX, true)
}

fn parse_defines(
    reader: impl BufRead,
    kind: NameKind,
    prefix: &str,
    strip_prefix: bool,
) -> std::io::Result<Lookup> {
    let mut entries = Vec::new();
    for line in reader.lines() {
        let line = line?;
        let mut parts = line.split_whitespace();
        if parts.next() != Some("#define") {
            continue;
        }
        let (Some(name), Some(value)) = (parts.next(), parts.next()) else {
            continue;
        };
        let Some(stripped) = name.strip_prefix(prefix) else {
            continue;
        };
        let Ok(id) = value.parse::<u32>() else {
            continue;
        };
        let name = if strip_prefix { stripped } else { name };
        entries.push((id, name.to_owned()));
    }

    Ok(Lookup::new(kind, entries))
}

/// Loads the table of the given kind from a header file.
pub(super) fn load(kind: NameKind, path: impl AsRef<Path>) -> Result<Lookup> {
    let path = path.as_ref();
    let reader = fsutil::open_file_reader(path)?;
    let lookup = match kind {
        NameKind::Capability => parse_capabilities(reader),
        NameKind::Syscall => parse_syscalls(reader),
    }
    .map_err(|source| Error::ReadLine {
        path: path.to_path_buf(),
        source,
    })?;

    if lookup.is_empty() {
        return Err(Error::Empty {
            kind,
            path: path.to_path_buf(),
        });
    }
    Ok(lookup)
}
