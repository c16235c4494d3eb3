//! `docker run` options derived from trace-files.
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::fsutil;

use super::{Error, Result};

/// Expands directories into the files below them, skipping dot-files.
///
/// Other paths are kept as given, whether they exist or not.
pub fn expand_paths<P: AsRef<Path>>(paths: &[P]) -> Result<Vec<PathBuf>> {
    let mut expanded = Vec::new();
    for path in paths {
        let path = path.as_ref();
        if path.is_dir() {
            walk(path, &mut expanded)?;
        } else {
            expanded.push(path.to_path_buf());
        }
    }
    Ok(expanded)
}

fn walk(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    let read_dir_error = |source| Error::ReadDir {
        path: dir.to_path_buf(),
        source,
    };
    let mut entries = std::fs::read_dir(dir)
        .map_err(read_dir_error)?
        .collect::<std::io::Result<Vec<_>>>()
        .map_err(read_dir_error)?;
    entries.sort_by_key(|entry| entry.file_name());

    for entry in entries {
        let path = entry.path();
        if path.is_dir() {
            walk(&path, out)?;
        } else if !entry.file_name().to_string_lossy().starts_with('.') {
            out.push(path);
        }
    }
    Ok(())
}

/// Drops every capability except the given ones.
pub fn cap_options(capabilities: &BTreeSet<String>) -> Vec<String> {
    std::iter::once("--cap-drop=ALL".to_owned())
        .chain(
            capabilities
                .iter()
                .map(|capability| format!("--cap-add={}", capability.to_ascii_uppercase())),
        )
        .collect()
}

#[derive(Debug, Serialize)]
struct SeccompRule<'a> {
    action: &'static str,
    names: Vec<&'a str>,
}

/// A seccomp profile allowing exactly the given syscalls.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeccompProfile<'a> {
    default_action: &'static str,
    syscalls: [SeccompRule<'a>; 1],
}

impl<'a> SeccompProfile<'a> {
    pub fn allow(syscalls: &'a BTreeSet<String>) -> Self {
        Self {
            default_action: "SCMP_ACT_ERRNO",
            syscalls: [SeccompRule {
                action: "SCMP_ACT_ALLOW",
                names: syscalls.iter().map(String::as_str).collect(),
            }],
        }
    }

    /// Renders the profile as JSON indented by four spaces.
    pub fn to_json(&self) -> Result<String> {
        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
        self.serialize(&mut serializer)?;
        buf.push(b'\n');
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }
}

/// Writes the seccomp profile for `syscalls` to `profile_path` and returns the option using it.
pub fn seccomp_option(profile_path: &Path, syscalls: &BTreeSet<String>) -> Result<String> {
    let profile = SeccompProfile::allow(syscalls).to_json()?;
    fsutil::write_file(profile_path, profile)?;
    Ok(format!(
        "--security-opt=seccomp:{}",
        shell_quote(&profile_path.to_string_lossy())
    ))
}

/// Quotes `s` for a POSIX shell, leaving it as is when that is safe.
pub fn shell_quote(s: &str) -> String {
    if s.is_empty() {
        return "''".to_owned();
    }
    let safe = s
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || "@%+=:,./-_".contains(c));
    if safe {
        return s.to_owned();
    }
    format!("'{}'", s.replace('\'', r#"'"'"'"#))
}
