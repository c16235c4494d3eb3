use std::path::PathBuf;

use crate::fsutil;

use super::NameKind;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("unknown {kind} id {id}")]
    UnknownId { kind: NameKind, id: i64 },
    #[error("unknown {kind} name `{name}`")]
    UnknownName { kind: NameKind, name: String },
    #[error(transparent)]
    File(#[from] fsutil::FileError),
    #[error("failed to read line for file `{path}`: {source}")]
    ReadLine {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("no {kind} definitions found in `{path}`")]
    Empty { kind: NameKind, path: PathBuf },
}

pub type Result<T> = std::result::Result<T, Error>;
