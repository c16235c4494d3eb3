use std::path::PathBuf;

use crate::{cgroup, lookup};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to load kernel probe `{path}`: {source}")]
    Load {
        path: PathBuf,
        #[source]
        source: Box<aya::EbpfError>,
    },
    #[error("program `{0}` not found in kernel probe")]
    ProgramNotFound(&'static str),
    #[error("program `{program}` has an unexpected type: {source}")]
    ProgramType {
        program: &'static str,
        #[source]
        source: Box<aya::programs::ProgramError>,
    },
    #[error("failed to attach program `{program}` to `{target}`: {source}")]
    Attach {
        program: &'static str,
        target: &'static str,
        #[source]
        source: Box<aya::programs::ProgramError>,
    },
    #[error("map `{0}` not found in kernel probe")]
    MapNotFound(&'static str),
    #[error("failed to access map `{map}`: {source}")]
    Map {
        map: &'static str,
        #[source]
        source: Box<aya::maps::MapError>,
    },
    #[error("failed to seed running containers: {0}")]
    Seed(#[from] cgroup::Error),
    #[error(transparent)]
    Lookup(#[from] lookup::Error),
}

impl Error {
    /// Returns `true` if the probe could not be loaded or attached.
    pub fn is_resource_unavailable(&self) -> bool {
        matches!(
            self,
            Error::Load { .. }
                | Error::ProgramNotFound(_)
                | Error::ProgramType { .. }
                | Error::Attach { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
