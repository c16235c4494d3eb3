use crate::{discovery, monitor, probe};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Probe(#[from] probe::Error),
    #[error(transparent)]
    Monitor(#[from] monitor::Error),
    #[error("container event stream failed: {0}")]
    Events(#[from] discovery::Error),
}
