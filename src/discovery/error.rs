use std::path::PathBuf;

use hyper::StatusCode;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("docker socket `{0}` not found, is the daemon running?")]
    SocketNotFound(PathBuf),
    #[error("`{0}` is not a unix socket")]
    NotASocket(PathBuf),
    #[error("failed to inspect docker socket `{path}`: {source}")]
    SocketMetadata {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to build request for `{path}`: {source}")]
    Request {
        path: String,
        #[source]
        source: hyper::http::Error,
    },
    #[error("docker request `{path}` failed: {source}")]
    Http {
        path: String,
        #[source]
        source: hyper_util::client::legacy::Error,
    },
    #[error("failed to read docker response body: {0}")]
    Body(#[from] hyper::Error),
    #[error("docker request `{path}` returned {status}: {message}")]
    Status {
        path: String,
        status: StatusCode,
        message: String,
    },
    #[error("failed to decode docker response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("docker reported an invalid container: {0}")]
    InvalidContainer(#[from] crate::container::Error),
}
