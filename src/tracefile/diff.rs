use std::collections::BTreeSet;
use std::fmt;

use super::{ARCH_SECTION, CAPABILITIES_SECTION, SYSCALLS_SECTION, Tracefile};

/// Section-wise difference between two trace-files.
///
/// Displays every differing section as its header followed by `-name` lines
/// for names only in the first file and `+name` lines for names only in the
/// second, sections separated by a blank line.
#[derive(Debug)]
pub struct TracefileDiff<'a> {
    old: &'a Tracefile,
    new: &'a Tracefile,
}

impl<'a> TracefileDiff<'a> {
    pub fn new(old: &'a Tracefile, new: &'a Tracefile) -> Self {
        Self { old, new }
    }

    pub fn is_empty(&self) -> bool {
        self.old == self.new
    }

    fn sections(&self) -> Vec<(&'static str, Vec<String>)> {
        let mut sections = Vec::new();
        if self.old.arch != self.new.arch {
            let old = BTreeSet::from([self.old.arch.clone()]);
            let new = BTreeSet::from([self.new.arch.clone()]);
            sections.push((ARCH_SECTION, set_diff(&old, &new)));
        }
        if self.old.capabilities != self.new.capabilities {
            sections.push((
                CAPABILITIES_SECTION,
                set_diff(&self.old.capabilities, &self.new.capabilities),
            ));
        }
        if self.old.syscalls != self.new.syscalls {
            sections.push((
                SYSCALLS_SECTION,
                set_diff(&self.old.syscalls, &self.new.syscalls),
            ));
        }
        sections
    }
}

fn set_diff(old: &BTreeSet<String>, new: &BTreeSet<String>) -> Vec<String> {
    let removed = old.difference(new).map(|name| format!("-{name}"));
    let added = new.difference(old).map(|name| format!("+{name}"));
    removed.chain(added).collect()
}

impl fmt::Display for TracefileDiff<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (header, lines)) in self.sections().into_iter().enumerate() {
            if i > 0 {
                write!(f, "\n\n")?;
            }
            f.write_str(header)?;
            for line in lines {
                write!(f, "\n{line}")?;
            }
        }
        Ok(())
    }
}
