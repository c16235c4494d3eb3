use std::path::PathBuf;

use crate::fsutil::FileError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    File(#[from] FileError),
    #[error("failed to list directory `{path}`: {source}")]
    ReadDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode seccomp profile: {0}")]
    Profile(#[from] serde_json::Error),
}
